use std::time::Duration;

use super::*;

#[test]
fn unanswered_ping_marks_unresponsive() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    assert_eq!(f.client(id).pings.len(), 1);
    assert!(!f.window(surface).unresponsive);

    f.advance_time(Duration::from_millis(400));
    f.dispatch();
    assert!(!f.window(surface).unresponsive);

    f.advance_time(Duration::from_millis(100));
    f.dispatch();
    assert!(f.window(surface).unresponsive);

    let serial = f.client(id).pings[0];
    f.strata().pong(id, serial);
    assert!(!f.window(surface).unresponsive);
}

#[test]
fn unknown_pong_is_ignored() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let serial = f.client(id).pings[0];

    f.advance_time(Duration::from_millis(500));
    f.dispatch();

    f.strata()
        .pong(id, crate::utils::serial::Serial(serial.0 + 1000));
    assert!(f.window(surface).unresponsive);
}

#[test]
fn close_without_response_disconnects() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let serial = f.client(id).pings[0];
    f.strata().pong(id, serial);

    let window = f.window_id(surface);
    f.strata().close_window(window);
    f.roundtrip(id);
    assert!(f.client(id).window(surface).close_requested);
    assert_eq!(f.client(id).pings.len(), 2);

    f.advance_time(Duration::from_millis(1000));
    f.dispatch();

    assert!(f.strata().window_for_surface(surface).is_none());
    assert!(!f.strata().display.client(id).unwrap().connected);
}

#[test]
fn close_with_response_keeps_the_client() {
    let mut f = Fixture::new();

    let id = f.add_client();
    let surface = f.map_window(id, (100, 100));
    let window = f.window_id(surface);

    f.strata().close_window(window);
    f.roundtrip(id);

    for serial in f.client(id).pings.clone() {
        f.strata().pong(id, serial);
    }

    f.advance_time(Duration::from_millis(1000));
    f.dispatch();

    assert_eq!(f.strata().window_for_surface(surface), Some(window));
    assert!(f.strata().display.client(id).unwrap().connected);
    assert!(!f.window(surface).unresponsive);
}
