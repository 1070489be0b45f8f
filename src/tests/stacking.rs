use insta::assert_snapshot;

use super::*;
use crate::window::WindowId;

fn three_windows(f: &mut Fixture) -> (crate::display::ClientId, [WindowId; 3]) {
    let id = f.add_client();
    let a = f.map_window(id, (100, 100));
    let b = f.map_window(id, (100, 100));
    let c = f.map_window(id, (100, 100));
    (id, [f.window_id(a), f.window_id(b), f.window_id(c)])
}

#[test]
fn new_windows_go_on_top() {
    let mut f = Fixture::new();
    let (_, [a, b, c]) = three_windows(&mut f);

    assert_eq!(f.strata().workspace.stacking_order(), [a, b, c]);
    assert_eq!(f.strata().workspace.active_window(), Some(c));
}

#[test]
fn activation_raises() {
    let mut f = Fixture::new();
    let (id, [a, b, c]) = three_windows(&mut f);

    let surface_a = f.strata().workspace.window(a).unwrap().surface.unwrap();
    let _ = f.client(id).window(surface_a).format_recent_configures();

    f.strata().workspace.activate_window(Some(a), true);
    f.strata().process_workspace_events();
    f.roundtrip(id);

    assert_eq!(f.strata().workspace.stacking_order(), [b, c, a]);
    assert_eq!(f.strata().workspace.active_window(), Some(a));

    let window = f.client(id).window(surface_a);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 100 × 100, states: [ACTIVATED]"
    );
}

#[test]
fn keep_above_stays_on_top() {
    let mut f = Fixture::new();
    let (_, [a, b, c]) = three_windows(&mut f);

    f.strata().workspace.set_keep_above(a, true);
    assert_eq!(f.strata().workspace.stacking_order(), [b, c, a]);

    f.strata().workspace.activate_window(Some(b), true);
    f.strata().process_workspace_events();
    assert_eq!(f.strata().workspace.stacking_order(), [c, b, a]);
    assert_eq!(f.strata().workspace.active_window(), Some(b));

    f.strata().workspace.set_keep_above(a, false);
    f.strata().workspace.set_keep_below(c, true);
    assert_eq!(f.strata().workspace.stacking_order(), [c, a, b]);
}

#[test]
fn closing_active_window_focuses_previous() {
    let mut f = Fixture::new();
    let (_, [a, b, c]) = three_windows(&mut f);

    let surface = f.strata().workspace.window(c).unwrap().surface.unwrap();
    f.strata().destroy_surface(surface);
    f.dispatch();

    assert_eq!(f.strata().workspace.stacking_order(), [a, b]);
    assert_eq!(f.strata().workspace.active_window(), Some(b));
    assert!(f.strata().workspace.window(b).unwrap().active);
}

#[test]
fn lock_screen_hides_everything_but_overlays() {
    let mut f = Fixture::new();
    let id = f.add_client();
    let normal = f.map_window(id, (100, 100));

    let overlay = f.create_window(id);
    f.strata().allow_on_lockscreen(overlay);
    f.commit(overlay);
    f.roundtrip(id);
    f.attach_new_buffer(overlay, (100, 100));
    f.ack_last_and_commit(id, overlay);
    f.roundtrip(id);

    let normal = f.window_id(normal);
    let overlay = f.window_id(overlay);
    f.strata().workspace.activate_window(Some(normal), true);
    f.strata().process_workspace_events();
    assert_eq!(f.strata().workspace.stacking_order(), [overlay, normal]);

    f.strata().set_screen_locked(true);
    assert_eq!(f.strata().workspace.stacking_order(), [normal, overlay]);
    let visible = |f: &mut Fixture, window: WindowId| {
        let strata = f.strata();
        let item = strata.workspace.window(window).unwrap().item.unwrap();
        strata.scene.item(item).unwrap().is_visible()
    };
    assert!(visible(&mut f, overlay));
    assert!(!visible(&mut f, normal));

    f.strata().set_screen_locked(false);
    assert_eq!(f.strata().workspace.stacking_order(), [overlay, normal]);
    assert!(visible(&mut f, normal));
}
