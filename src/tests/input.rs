use smithay::backend::input::KeyState;

use super::*;
use crate::input::keymap::Keymap;
use crate::input::shortcuts::ShortcutAction;

const KEY_LEFTCTRL: u32 = 29;
const KEY_F2: u32 = 60;

fn set_us_keymap(f: &mut Fixture) {
    let config = strata_config::Keyboard {
        xkb: strata_config::Xkb {
            layout: String::from("us"),
            ..Default::default()
        },
        ..Default::default()
    };
    let keymap = Keymap::new(&config, false, |_| None).unwrap();
    let strata = f.strata();
    strata.seat.set_keymap(&mut strata.display, keymap);
}

#[test]
fn ctrl_f2_switches_desktop() {
    let mut f = Fixture::new();
    set_us_keymap(&mut f);
    f.strata().workspace.set_desktop_count(4);

    let strata = f.strata();
    strata.handle_keyboard_key(KEY_LEFTCTRL, KeyState::Pressed, 1);
    strata.handle_keyboard_key(KEY_F2, KeyState::Pressed, 2);
    strata.handle_keyboard_key(KEY_F2, KeyState::Released, 3);
    strata.handle_keyboard_key(KEY_LEFTCTRL, KeyState::Released, 4);

    assert_eq!(f.strata().workspace.current_desktop(), 2);
}

#[test]
fn desktop_switching_wraps_around() {
    let mut f = Fixture::new();
    f.strata().workspace.set_desktop_count(3);

    f.strata().do_shortcut(ShortcutAction::PreviousDesktop);
    assert_eq!(f.strata().workspace.current_desktop(), 3);

    f.strata().do_shortcut(ShortcutAction::NextDesktop);
    assert_eq!(f.strata().workspace.current_desktop(), 1);
}

#[test]
fn pointer_focus_follows_the_topmost_window() {
    let mut f = Fixture::new();
    f.add_output(1, (1920, 1080));
    let id = f.add_client();
    let _a = f.map_window(id, (100, 100));
    let b = f.map_window(id, (100, 100));

    let geometry = f.window(b).frame_geometry();
    let center = geometry.loc + geometry.size.downscale(2).to_point();
    f.strata().handle_pointer_motion(center.to_f64(), 1);

    assert_eq!(f.strata().seat.pointer_focus(), Some(b));

    f.strata()
        .handle_pointer_motion((-1000., -1000.).into(), 2);
    assert_eq!(f.strata().seat.pointer_focus(), None);
}
