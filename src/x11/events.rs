//! X11 events the window manager reacts to, and routing them to windows.

use bitflags::bitflags;
use smithay::utils::{Logical, Rectangle};
use x11rb::protocol::xproto;
use x11rb::protocol::Event;

use crate::window::{WindowId, WindowKind};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Normal,
    Grab,
    Ungrab,
    WhileGrabbed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyDetail {
    Ancestor,
    Virtual,
    Inferior,
    Nonlinear,
    NonlinearVirtual,
    Pointer,
    PointerRoot,
    None,
}

bitflags! {
    /// Fields set in a `ConfigureRequest`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigureMask: u16 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const WIDTH = 1 << 2;
        const HEIGHT = 1 << 3;
        const BORDER_WIDTH = 1 << 4;
        const SIBLING = 1 << 5;
        const STACK_MODE = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    Above,
    Below,
    TopIf,
    BottomIf,
    Opposite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureRequest {
    pub window: u32,
    pub parent: u32,
    pub geometry: Rectangle<i32, Logical>,
    pub mask: ConfigureMask,
    pub sibling: u32,
    pub stack_mode: StackMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum X11Event {
    MapRequest {
        parent: u32,
        window: u32,
    },
    MapNotify {
        event: u32,
        window: u32,
        override_redirect: bool,
    },
    UnmapNotify {
        event: u32,
        window: u32,
        /// Sent by a client with `SendEvent` rather than generated by the server.
        synthetic: bool,
    },
    DestroyNotify {
        event: u32,
        window: u32,
    },
    ConfigureRequest(ConfigureRequest),
    ConfigureNotify {
        event: u32,
        window: u32,
        geometry: Rectangle<i32, Logical>,
        override_redirect: bool,
    },
    PropertyNotify {
        window: u32,
        atom: u32,
        time: u32,
        deleted: bool,
    },
    FocusIn {
        window: u32,
        mode: NotifyMode,
        detail: NotifyDetail,
    },
    FocusOut {
        window: u32,
        mode: NotifyMode,
        detail: NotifyDetail,
    },
    ClientMessage {
        window: u32,
        message_type: u32,
        data: [u32; 5],
    },
    ButtonPress {
        window: u32,
        time: u32,
        button: u8,
    },
    ButtonRelease {
        window: u32,
        time: u32,
        button: u8,
    },
    KeyPress {
        window: u32,
        time: u32,
    },
    EnterNotify {
        window: u32,
        time: u32,
    },
    DamageNotify {
        drawable: u32,
    },
    ShapeNotify {
        affected_window: u32,
    },
}

impl X11Event {
    /// The window the event is about, used to find the window that handles it.
    pub fn event_window(&self) -> u32 {
        match *self {
            X11Event::FocusIn { window, .. }
            | X11Event::FocusOut { window, .. }
            | X11Event::ButtonPress { window, .. }
            | X11Event::ButtonRelease { window, .. }
            | X11Event::KeyPress { window, .. }
            | X11Event::EnterNotify { window, .. } => window,
            X11Event::MapRequest { window, .. }
            | X11Event::MapNotify { window, .. }
            | X11Event::UnmapNotify { window, .. }
            | X11Event::DestroyNotify { window, .. }
            | X11Event::ConfigureNotify { window, .. }
            | X11Event::PropertyNotify { window, .. }
            | X11Event::ClientMessage { window, .. } => window,
            X11Event::ConfigureRequest(ref request) => request.window,
            X11Event::DamageNotify { drawable } => drawable,
            X11Event::ShapeNotify { affected_window } => affected_window,
        }
    }

    /// Converts the events the window manager cares about.
    pub fn from_x11rb(event: &Event) -> Option<Self> {
        let rv = match event {
            Event::MapRequest(e) => X11Event::MapRequest {
                parent: e.parent,
                window: e.window,
            },
            Event::MapNotify(e) => X11Event::MapNotify {
                event: e.event,
                window: e.window,
                override_redirect: e.override_redirect,
            },
            Event::UnmapNotify(e) => X11Event::UnmapNotify {
                event: e.event,
                window: e.window,
                synthetic: e.response_type & 0x80 != 0,
            },
            Event::DestroyNotify(e) => X11Event::DestroyNotify {
                event: e.event,
                window: e.window,
            },
            Event::ConfigureRequest(e) => X11Event::ConfigureRequest(ConfigureRequest {
                window: e.window,
                parent: e.parent,
                geometry: Rectangle::new(
                    (i32::from(e.x), i32::from(e.y)).into(),
                    (i32::from(e.width), i32::from(e.height)).into(),
                ),
                mask: ConfigureMask::from_bits_truncate(u16::from(e.value_mask)),
                sibling: e.sibling,
                stack_mode: stack_mode(e.stack_mode),
            }),
            Event::ConfigureNotify(e) => X11Event::ConfigureNotify {
                event: e.event,
                window: e.window,
                geometry: Rectangle::new(
                    (i32::from(e.x), i32::from(e.y)).into(),
                    (i32::from(e.width), i32::from(e.height)).into(),
                ),
                override_redirect: e.override_redirect,
            },
            Event::PropertyNotify(e) => X11Event::PropertyNotify {
                window: e.window,
                atom: e.atom,
                time: e.time,
                deleted: e.state == xproto::Property::DELETE,
            },
            Event::FocusIn(e) => X11Event::FocusIn {
                window: e.event,
                mode: notify_mode(e.mode),
                detail: notify_detail(e.detail),
            },
            Event::FocusOut(e) => X11Event::FocusOut {
                window: e.event,
                mode: notify_mode(e.mode),
                detail: notify_detail(e.detail),
            },
            Event::ClientMessage(e) => X11Event::ClientMessage {
                window: e.window,
                message_type: e.type_,
                data: e.data.as_data32(),
            },
            Event::ButtonPress(e) => X11Event::ButtonPress {
                window: e.event,
                time: e.time,
                button: e.detail,
            },
            Event::ButtonRelease(e) => X11Event::ButtonRelease {
                window: e.event,
                time: e.time,
                button: e.detail,
            },
            Event::KeyPress(e) => X11Event::KeyPress {
                window: e.event,
                time: e.time,
            },
            Event::EnterNotify(e) => X11Event::EnterNotify {
                window: e.event,
                time: e.time,
            },
            Event::DamageNotify(e) => X11Event::DamageNotify {
                drawable: e.drawable,
            },
            Event::ShapeNotify(e) => X11Event::ShapeNotify {
                affected_window: e.affected_window,
            },
            _ => return None,
        };
        Some(rv)
    }
}

fn notify_mode(mode: xproto::NotifyMode) -> NotifyMode {
    match mode {
        xproto::NotifyMode::GRAB => NotifyMode::Grab,
        xproto::NotifyMode::UNGRAB => NotifyMode::Ungrab,
        xproto::NotifyMode::WHILE_GRABBED => NotifyMode::WhileGrabbed,
        _ => NotifyMode::Normal,
    }
}

fn notify_detail(detail: xproto::NotifyDetail) -> NotifyDetail {
    match detail {
        xproto::NotifyDetail::ANCESTOR => NotifyDetail::Ancestor,
        xproto::NotifyDetail::VIRTUAL => NotifyDetail::Virtual,
        xproto::NotifyDetail::INFERIOR => NotifyDetail::Inferior,
        xproto::NotifyDetail::NONLINEAR => NotifyDetail::Nonlinear,
        xproto::NotifyDetail::NONLINEAR_VIRTUAL => NotifyDetail::NonlinearVirtual,
        xproto::NotifyDetail::POINTER => NotifyDetail::Pointer,
        xproto::NotifyDetail::POINTER_ROOT => NotifyDetail::PointerRoot,
        _ => NotifyDetail::None,
    }
}

fn stack_mode(mode: xproto::StackMode) -> StackMode {
    match mode {
        xproto::StackMode::BELOW => StackMode::Below,
        xproto::StackMode::TOP_IF => StackMode::TopIf,
        xproto::StackMode::BOTTOM_IF => StackMode::BottomIf,
        xproto::StackMode::OPPOSITE => StackMode::Opposite,
        _ => StackMode::Above,
    }
}

/// Which part of a window an X11 window id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The client window of a managed window.
    Window(WindowId),
    Wrapper(WindowId),
    Frame(WindowId),
    Input(WindowId),
    Unmanaged(WindowId),
}

impl Owner {
    pub fn id(self) -> WindowId {
        match self {
            Owner::Window(id)
            | Owner::Wrapper(id)
            | Owner::Frame(id)
            | Owner::Input(id)
            | Owner::Unmanaged(id) => id,
        }
    }
}

/// Finds the window owning `xid`.
///
/// Client windows are matched first, then wrappers, frames and decoration input windows, and
/// override-redirect windows last.
pub fn find_owner(ws: &Workspace, xid: u32) -> Option<Owner> {
    if xid == 0 {
        return None;
    }

    let managed = |f: &dyn Fn(&crate::window::x11::X11State) -> bool| {
        ws.find_window(|w| {
            w.kind == WindowKind::X11Managed && w.x11.as_ref().is_some_and(f)
        })
    };

    if let Some(id) = managed(&|x| x.window == xid) {
        return Some(Owner::Window(id));
    }
    if let Some(id) = managed(&|x| x.wrapper == xid) {
        return Some(Owner::Wrapper(id));
    }
    if let Some(id) = managed(&|x| x.frame == xid) {
        return Some(Owner::Frame(id));
    }
    if let Some(id) = managed(&|x| x.input == Some(xid)) {
        return Some(Owner::Input(id));
    }
    ws.find_window(|w| {
        w.kind == WindowKind::X11Unmanaged && w.x11.as_ref().is_some_and(|x| x.window == xid)
    })
    .map(Owner::Unmanaged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::x11::X11State;
    use crate::window::Window;
    use crate::workspace::tests::workspace;

    fn managed(ws: &mut Workspace, window: u32, frame: u32, wrapper: u32) -> WindowId {
        let mut w = Window::new(WindowKind::X11Managed);
        w.x11 = Some(X11State::managed(window, frame, wrapper));
        ws.add_window(w)
    }

    #[test]
    fn owners_are_found_in_order() {
        let mut ws = workspace();
        let a = managed(&mut ws, 10, 11, 12);
        ws.window_mut(a).unwrap().x11.as_mut().unwrap().input = Some(13);
        let mut u = Window::new(WindowKind::X11Unmanaged);
        u.x11 = Some(X11State::unmanaged(20));
        let u = ws.add_window(u);

        assert_eq!(find_owner(&ws, 10), Some(Owner::Window(a)));
        assert_eq!(find_owner(&ws, 12), Some(Owner::Wrapper(a)));
        assert_eq!(find_owner(&ws, 11), Some(Owner::Frame(a)));
        assert_eq!(find_owner(&ws, 13), Some(Owner::Input(a)));
        assert_eq!(find_owner(&ws, 20), Some(Owner::Unmanaged(u)));
        assert_eq!(find_owner(&ws, 30), None);
        assert_eq!(find_owner(&ws, 0), None);
    }

    #[test]
    fn client_window_wins_over_frame() {
        let mut ws = workspace();
        // A client that reuses an id another window uses as a frame.
        let a = managed(&mut ws, 40, 41, 42);
        let b = managed(&mut ws, 41, 50, 51);
        assert_eq!(find_owner(&ws, 41), Some(Owner::Window(b)));
        assert_eq!(find_owner(&ws, 40).map(Owner::id), Some(a));
    }

    #[test]
    fn event_window_per_type() {
        let focus = X11Event::FocusIn {
            window: 5,
            mode: NotifyMode::Normal,
            detail: NotifyDetail::Nonlinear,
        };
        assert_eq!(focus.event_window(), 5);
        let unmap = X11Event::UnmapNotify {
            event: 1,
            window: 6,
            synthetic: false,
        };
        assert_eq!(unmap.event_window(), 6);
        let shape = X11Event::ShapeNotify { affected_window: 7 };
        assert_eq!(shape.event_window(), 7);
    }

    #[test]
    fn converts_x11rb_events() {
        let event = Event::UnmapNotify(xproto::UnmapNotifyEvent {
            response_type: xproto::UNMAP_NOTIFY_EVENT | 0x80,
            sequence: 0,
            event: 1,
            window: 6,
            from_configure: false,
        });
        assert_eq!(
            X11Event::from_x11rb(&event),
            Some(X11Event::UnmapNotify {
                event: 1,
                window: 6,
                synthetic: true
            })
        );

        let event = Event::FocusOut(xproto::FocusOutEvent {
            response_type: xproto::FOCUS_OUT_EVENT,
            detail: xproto::NotifyDetail::NONLINEAR_VIRTUAL,
            sequence: 0,
            event: 9,
            mode: xproto::NotifyMode::UNGRAB,
        });
        assert_eq!(
            X11Event::from_x11rb(&event),
            Some(X11Event::FocusOut {
                window: 9,
                mode: NotifyMode::Ungrab,
                detail: NotifyDetail::NonlinearVirtual,
            })
        );
    }
}
