use insta::assert_snapshot;
use smithay::utils::Rectangle;

use super::*;
use crate::window::MaximizeMode;

#[test]
fn maximize_and_restore() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let _ = f.client(id).window(surface).format_recent_configures();

    f.strata().request_maximized(surface, true);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 1920 × 1080, states: [MAXIMIZED, ACTIVATED]"
    );

    // Nothing changes until the client commits the new size.
    assert_eq!(f.window(surface).maximize_mode(), MaximizeMode::empty());

    f.attach_new_buffer(surface, (1920, 1080));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    let window = f.window(surface);
    assert_eq!(window.maximize_mode(), MaximizeMode::FULL);
    assert_eq!(
        window.frame_geometry(),
        Rectangle::new((0, 0).into(), (1920, 1080).into())
    );

    f.strata().request_maximized(surface, false);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 100 × 100, states: [ACTIVATED]"
    );

    f.attach_new_buffer(surface, (100, 100));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    let window = f.window(surface);
    assert_eq!(window.maximize_mode(), MaximizeMode::empty());
    assert_eq!(
        window.frame_geometry(),
        Rectangle::new((910, 490).into(), (100, 100).into())
    );
}

#[test]
fn repeated_maximize_is_ignored() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let _ = f.client(id).window(surface).format_recent_configures();

    f.strata().request_maximized(surface, true);
    f.strata().request_maximized(surface, true);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 1920 × 1080, states: [MAXIMIZED, ACTIVATED]"
    );
}

#[test]
fn fullscreen_before_mapping() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.create_window(id);
    f.strata().request_fullscreen(surface, true);
    f.commit(surface);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 1920 × 1080, states: [FULLSCREEN]"
    );

    f.attach_new_buffer(surface, (1920, 1080));
    f.ack_last_and_commit(id, surface);
    f.roundtrip(id);

    let window = f.client(id).window(surface);
    assert_snapshot!(
        window.format_recent_configures(),
        @"size: 1920 × 1080, states: [FULLSCREEN, ACTIVATED]"
    );

    let window = f.window(surface);
    assert!(window.is_fullscreen());
    assert_eq!(
        window.frame_geometry(),
        Rectangle::new((0, 0).into(), (1920, 1080).into())
    );
}
