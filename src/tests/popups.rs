use insta::assert_snapshot;
use smithay::utils::{Point, Rectangle};

use super::*;
use crate::display::{ClientEvent, ClientId, SurfaceId};
use crate::utils::serial::Serial;
use crate::window::positioner::Positioner;

fn menu_positioner() -> Positioner {
    Positioner {
        size: (50, 20).into(),
        anchor_rect: Rectangle::new((10, 10).into(), (100, 40).into()),
        ..Positioner::default()
    }
}

fn map_popup(f: &mut Fixture, id: ClientId, parent: SurfaceId) -> SurfaceId {
    let popup = f.create_popup(id, parent, menu_positioner());
    f.commit(popup);
    f.roundtrip(id);

    f.attach_new_buffer(popup, (50, 20));
    f.ack_last_and_commit(id, popup);
    f.roundtrip(id);
    popup
}

#[test]
fn popup_is_placed_relative_to_parent() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let parent = f.map_window(id, (100, 100));
    let popup = f.create_popup(id, parent, menu_positioner());
    f.commit(popup);
    f.roundtrip(id);

    let window = f.client(id).window(popup);
    assert_snapshot!(window.format_recent_configures(), @"popup: 50 × 20 at 35, 20");

    f.attach_new_buffer(popup, (50, 20));
    f.ack_last_and_commit(id, popup);
    f.roundtrip(id);

    assert_eq!(
        f.window(popup).frame_geometry(),
        Rectangle::new((945, 510).into(), (50, 20).into())
    );
    // Popups never take focus from their parent.
    assert!(f.window(parent).active);
    assert!(!f.window(popup).active);
}

#[test]
fn reposition() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let parent = f.map_window(id, (100, 100));
    let popup = map_popup(&mut f, id, parent);
    let _ = f.client(id).window(popup).format_recent_configures();

    let positioner = Positioner {
        offset: Point::from((5, 5)),
        ..menu_positioner()
    };
    f.strata().reposition_popup(popup, positioner, 7);
    f.roundtrip(id);

    let window = f.client(id).window(popup);
    assert_snapshot!(window.format_recent_configures(), @"popup: 50 × 20 at 40, 25");
    assert!(f.client(id).other_events.contains(&ClientEvent::XdgPopupRepositioned {
        surface: popup,
        token: 7,
    }));
}

#[test]
fn stale_grab_dismisses() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let parent = f.map_window(id, (100, 100));
    let popup = map_popup(&mut f, id, parent);

    f.strata().popup_grab(popup, Serial(12345));
    f.roundtrip(id);

    assert!(f.client(id).window(popup).popup_done);
    assert!(f.strata().window_for_surface(popup).is_none());
    assert!(f.strata().window_for_surface(parent).is_some());
}

#[test]
fn destroying_parent_dismisses_popups() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let parent = f.map_window(id, (100, 100));
    let popup = map_popup(&mut f, id, parent);
    let nested = {
        let nested = f.create_popup(id, popup, menu_positioner());
        f.commit(nested);
        f.roundtrip(id);
        f.attach_new_buffer(nested, (50, 20));
        f.ack_last_and_commit(id, nested);
        f.roundtrip(id);
        nested
    };
    assert!(f.strata().window_for_surface(nested).is_some());

    f.strata().destroy_surface(parent);
    f.roundtrip(id);

    assert!(f.client(id).window(popup).popup_done);
    assert!(f.client(id).window(nested).popup_done);
    assert!(f.strata().window_for_surface(popup).is_none());
    assert!(f.strata().window_for_surface(nested).is_none());
}

#[test]
fn popup_without_size_is_an_error() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let parent = f.map_window(id, (100, 100));

    let strata = f.strata();
    let surface = strata.new_surface(id).unwrap();
    let positioner = Positioner {
        size: (0, 20).into(),
        ..menu_positioner()
    };
    assert!(strata.new_popup(surface, Some(parent), positioner).is_none());

    let errors = f.strata().display.errors(id);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].interface, "xdg_wm_base");
}
