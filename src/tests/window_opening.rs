use insta::assert_snapshot;
use smithay::utils::Rectangle;

use super::*;
use crate::utils::serial::Serial;

#[test]
fn simple() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.create_window(id);
    f.commit(surface);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(window.format_recent_configures(), @"size: 0 × 0, states: []");

    f.attach_new_buffer(surface, (100, 100));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 100 × 100, states: [ACTIVATED]"
    );

    let window = f.window(surface);
    assert!(window.active);
    assert_eq!(
        window.frame_geometry(),
        Rectangle::new((910, 490).into(), (100, 100).into())
    );
    assert!(f.strata().display.errors(id).is_empty());
}

#[test]
fn buffer_before_initial_configure() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.create_window(id);
    f.attach_new_buffer(surface, (100, 100));
    f.commit(surface);
    f.roundtrip(id);

    let errors = f.strata().display.errors(id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].interface, "xdg_surface");
    assert_eq!(errors[0].code, 3);
    assert!(f.strata().window_for_surface(surface).is_none());
}

#[test]
fn ack_of_unknown_serial() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.create_window(id);
    f.commit(surface);
    f.roundtrip(id);

    let serial = f.client(id).window(surface).last_serial();
    f.strata().ack_configure(surface, Serial(serial.0 + 1000));

    let errors = f.strata().display.errors(id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].interface, "xdg_surface");
    assert_eq!(errors[0].code, 4);
}

#[test]
fn other_client_does_not_steal_focus() {
    let mut f = Fixture::new();

    let first = f.add_client();
    let a = f.map_window(first, (100, 100));

    let second = f.add_client();
    let b = f.map_window(second, (100, 100));

    let window = f.client(second).window(b);
    assert_snapshot!(window.format_recent_configures(), @"size: 0 × 0, states: []");

    let a_id = f.window_id(a);
    let b_id = f.window_id(b);
    assert!(f.window(a).active);
    assert!(!f.window(b).active);
    assert!(f.window(b).states.demands_attention);

    // Cascaded from the first window, stacked right under it.
    assert_eq!(
        f.window(b).frame_geometry(),
        Rectangle::new((934, 514).into(), (100, 100).into())
    );
    let order = f.strata().workspace.stacking_order().to_vec();
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert!(pos(b_id) < pos(a_id));
}

#[test]
fn same_client_takes_focus() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let a = f.map_window(id, (100, 100));
    let _ = f.client(id).window(a).format_recent_configures();

    let b = f.map_window(id, (100, 100));

    assert!(!f.window(a).active);
    assert!(f.window(b).active);

    let window = f.client(id).window(a);
    assert_snapshot!(window.format_recent_configures(), @"size: 100 × 100, states: []");
    let window = f.client(id).window(b);
    assert_snapshot!(
        window.format_recent_configures(),
        @r"
    size: 0 × 0, states: []
    size: 100 × 100, states: [ACTIVATED]
    "
    );
}

#[test]
fn unmap_and_map_again() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let _ = f.client(id).window(surface).format_recent_configures();

    // Null buffer commit.
    f.strata().display.attach(surface, None);
    f.commit(surface);
    f.roundtrip(id);

    assert!(f.strata().window_for_surface(surface).is_none());
    assert!(f.strata().unmapped_windows.contains_key(&surface));
    assert_eq!(f.strata().workspace.active_window(), None);

    // Mapping again goes through a fresh initial configure.
    f.commit(surface);
    f.roundtrip(id);
    let window = f.client(id).window(surface);
    assert_snapshot!(window.format_recent_configures(), @"size: 0 × 0, states: []");

    f.attach_new_buffer(surface, (200, 100));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    assert_eq!(
        f.window(surface).frame_geometry(),
        Rectangle::new((860, 490).into(), (200, 100).into())
    );
}

#[test]
fn window_geometry_is_clipped_to_the_surface() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.create_window(id);
    f.commit(surface);
    f.roundtrip(id);

    f.strata()
        .set_window_geometry(surface, Rectangle::new((10, 10).into(), (500, 500).into()));
    f.attach_new_buffer(surface, (100, 100));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    let window = f.window(surface);
    assert_eq!(
        window.window_geometry,
        Rectangle::new((10, 10).into(), (90, 90).into())
    );
    assert_eq!(window.frame_geometry().size, (90, 90).into());
}
