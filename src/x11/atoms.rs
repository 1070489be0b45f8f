//! Atoms the window manager uses.

macro_rules! atoms {
    ($($name:ident,)*) => {
        x11rb::atom_manager! {
            pub Atoms: AtomsCookie {
                $($name,)*
            }
        }

        impl Atoms {
            /// Atoms numbered in declaration order starting at `first`, for connections without a
            /// server behind them.
            pub fn sequential(first: u32) -> Self {
                let mut next = first;
                let mut take = || {
                    let rv = next;
                    next += 1;
                    rv
                };
                Self {
                    $($name: take(),)*
                }
            }

            pub fn name_of(&self, atom: u32) -> Option<&'static str> {
                $(
                    if self.$name == atom {
                        return Some(stringify!($name));
                    }
                )*
                None
            }
        }
    };
}

atoms! {
    UTF8_STRING,
    WM_STATE,
    WM_CHANGE_STATE,
    WM_PROTOCOLS,
    WM_TAKE_FOCUS,
    WM_DELETE_WINDOW,
    WM_CLIENT_LEADER,
    WL_SURFACE_ID,
    WL_SURFACE_SERIAL,
    _NET_SUPPORTED,
    _NET_SUPPORTING_WM_CHECK,
    _NET_ACTIVE_WINDOW,
    _NET_CLIENT_LIST,
    _NET_CLIENT_LIST_STACKING,
    _NET_NUMBER_OF_DESKTOPS,
    _NET_CURRENT_DESKTOP,
    _NET_WORKAREA,
    _NET_WM_NAME,
    _NET_WM_PID,
    _NET_WM_DESKTOP,
    _NET_WM_USER_TIME,
    _NET_WM_USER_TIME_WINDOW,
    _KDE_NET_WM_USER_CREATION_TIME,
    _KDE_NET_WM_DESKTOP_FILE,
    _NET_STARTUP_ID,
    _NET_WM_STATE,
    _NET_WM_STATE_MODAL,
    _NET_WM_STATE_MAXIMIZED_VERT,
    _NET_WM_STATE_MAXIMIZED_HORZ,
    _NET_WM_STATE_HIDDEN,
    _NET_WM_STATE_FULLSCREEN,
    _NET_WM_STATE_ABOVE,
    _NET_WM_STATE_BELOW,
    _NET_WM_STATE_DEMANDS_ATTENTION,
    _NET_WM_STATE_SKIP_TASKBAR,
    _NET_WM_STATE_SKIP_PAGER,
    _NET_WM_WINDOW_TYPE,
    _NET_WM_WINDOW_TYPE_DESKTOP,
    _NET_WM_WINDOW_TYPE_DOCK,
    _NET_WM_WINDOW_TYPE_TOOLBAR,
    _NET_WM_WINDOW_TYPE_MENU,
    _NET_WM_WINDOW_TYPE_UTILITY,
    _NET_WM_WINDOW_TYPE_SPLASH,
    _NET_WM_WINDOW_TYPE_DIALOG,
    _NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
    _NET_WM_WINDOW_TYPE_POPUP_MENU,
    _NET_WM_WINDOW_TYPE_TOOLTIP,
    _NET_WM_WINDOW_TYPE_NOTIFICATION,
    _NET_WM_WINDOW_TYPE_COMBO,
    _NET_WM_WINDOW_TYPE_NORMAL,
    _KDE_NET_WM_WINDOW_TYPE_OVERRIDE,
    _NET_WM_STRUT,
    _NET_WM_STRUT_PARTIAL,
    _NET_WM_SYNC_REQUEST,
    _NET_WM_SYNC_REQUEST_COUNTER,
    _NET_WM_OPAQUE_REGION,
    _NET_WM_WINDOW_OPACITY,
    _NET_CLOSE_WINDOW,
    _MOTIF_WM_HINTS,
    _GTK_FRAME_EXTENTS,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_atoms_are_distinct() {
        let atoms = Atoms::sequential(100);
        assert_eq!(atoms.UTF8_STRING, 100);
        assert_eq!(atoms.WM_STATE, 101);
        assert_eq!(atoms.name_of(atoms._GTK_FRAME_EXTENTS), Some("_GTK_FRAME_EXTENTS"));
        assert_eq!(atoms.name_of(1), None);
    }
}
