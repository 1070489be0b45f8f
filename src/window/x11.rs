//! State of X11 windows.

use super::Margins;

/// `_MOTIF_WM_HINTS` decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotifHints {
    pub has_decorations: bool,
    pub no_border: bool,
    pub movable: bool,
    pub resizable: bool,
    pub minimizable: bool,
    pub maximizable: bool,
    pub closable: bool,
}

const MWM_HINTS_FUNCTIONS: u32 = 1 << 0;
const MWM_HINTS_DECORATIONS: u32 = 1 << 1;

const MWM_FUNC_ALL: u32 = 1 << 0;
const MWM_FUNC_RESIZE: u32 = 1 << 1;
const MWM_FUNC_MOVE: u32 = 1 << 2;
const MWM_FUNC_MINIMIZE: u32 = 1 << 3;
const MWM_FUNC_MAXIMIZE: u32 = 1 << 4;
const MWM_FUNC_CLOSE: u32 = 1 << 5;

impl MotifHints {
    pub fn all() -> Self {
        Self {
            has_decorations: false,
            no_border: false,
            movable: true,
            resizable: true,
            minimizable: true,
            maximizable: true,
            closable: true,
        }
    }

    /// Decodes the property value `[flags, functions, decorations, input_mode, status]`.
    pub fn parse(data: &[u32]) -> Self {
        let mut hints = Self::all();
        let [flags, functions, decorations, ..] = data else {
            return hints;
        };

        if flags & MWM_HINTS_FUNCTIONS != 0 {
            // MWM_FUNC_ALL inverts the meaning of the other bits.
            let set_value = functions & MWM_FUNC_ALL == 0;
            hints.movable = !set_value;
            hints.resizable = !set_value;
            hints.minimizable = !set_value;
            hints.maximizable = !set_value;
            hints.closable = !set_value;
            if functions & MWM_FUNC_MOVE != 0 {
                hints.movable = set_value;
            }
            if functions & MWM_FUNC_RESIZE != 0 {
                hints.resizable = set_value;
            }
            if functions & MWM_FUNC_MINIMIZE != 0 {
                hints.minimizable = set_value;
            }
            if functions & MWM_FUNC_MAXIMIZE != 0 {
                hints.maximizable = set_value;
            }
            if functions & MWM_FUNC_CLOSE != 0 {
                hints.closable = set_value;
            }
        }

        if flags & MWM_HINTS_DECORATIONS != 0 {
            hints.has_decorations = true;
            hints.no_border = *decorations == 0;
        }
        hints
    }
}

/// `WM_STATE` of a managed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MappingState {
    #[default]
    Withdrawn,
    Mapped,
    /// Unmapped by the window manager (minimized or on another desktop), still managed.
    Kept,
}

#[derive(Debug, Clone, Default)]
pub struct X11State {
    /// The client's own window.
    pub window: u32,
    /// Frame the client window is reparented into. Zero for override-redirect windows.
    pub frame: u32,
    /// Wrapper between the frame and the client window.
    pub wrapper: u32,
    /// Input-only window catching clicks on the decoration.
    pub input: Option<u32>,
    pub override_redirect: bool,
    /// `WM_CLIENT_LEADER`, zero when unset.
    pub leader: u32,
    pub user_creation_time: Option<u32>,
    pub startup_id: Option<String>,
    pub mapping_state: MappingState,
    pub motif: MotifHints,
    pub gtk_frame_extents: Option<Margins>,
    pub sync_counter: Option<u32>,
    /// Whether the client sets the `WM_TAKE_FOCUS` protocol.
    pub take_focus: bool,
    /// `WM_HINTS.input`.
    pub input_hint: bool,
    pub blocks_compositing: bool,
}

impl X11State {
    pub fn managed(window: u32, frame: u32, wrapper: u32) -> Self {
        Self {
            window,
            frame,
            wrapper,
            motif: MotifHints::all(),
            input_hint: true,
            ..Default::default()
        }
    }

    pub fn unmanaged(window: u32) -> Self {
        Self {
            window,
            override_redirect: true,
            ..Default::default()
        }
    }

    /// The window that is stacked in the X11 window tree.
    pub fn stacking_window(&self) -> u32 {
        if self.frame != 0 {
            self.frame
        } else {
            self.window
        }
    }
}

/// Decodes `_GTK_FRAME_EXTENTS`, `[left, right, top, bottom]`.
pub fn parse_gtk_frame_extents(data: &[u32]) -> Option<Margins> {
    let [left, right, top, bottom] = data else {
        return None;
    };
    let c = |v: &u32| i32::try_from(*v).unwrap_or(0);
    Some(Margins::new(c(left), c(top), c(right), c(bottom)))
}

/// Converts logical coordinates to the X11 coordinate space.
///
/// With a fractional Xwayland scale the result can be off by a fraction of a pixel, which is
/// logged.
pub fn to_x_native(value: f64, scale: f64) -> i32 {
    let scaled = value * scale;
    let rounded = scaled.round();
    if (scaled - rounded).abs() > 1e-6 {
        trace!("{value} can't be represented exactly in X11 coordinates at scale {scale}");
    }
    rounded as i32
}

pub fn from_x_native(value: i32, scale: f64) -> f64 {
    f64::from(value) / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motif_no_border() {
        let hints = MotifHints::parse(&[MWM_HINTS_DECORATIONS, 0, 0, 0, 0]);
        assert!(hints.has_decorations);
        assert!(hints.no_border);
        assert!(hints.closable);

        let hints = MotifHints::parse(&[MWM_HINTS_DECORATIONS, 0, 1, 0, 0]);
        assert!(!hints.no_border);
    }

    #[test]
    fn motif_functions() {
        let hints = MotifHints::parse(&[MWM_HINTS_FUNCTIONS, MWM_FUNC_MOVE | MWM_FUNC_CLOSE, 0, 0, 0]);
        assert!(hints.movable);
        assert!(hints.closable);
        assert!(!hints.resizable);

        let hints = MotifHints::parse(&[
            MWM_HINTS_FUNCTIONS,
            MWM_FUNC_ALL | MWM_FUNC_RESIZE,
            0,
            0,
            0,
        ]);
        assert!(!hints.resizable);
        assert!(hints.maximizable);
        assert_eq!(MotifHints::parse(&[1]), MotifHints::all());
    }

    #[test]
    fn gtk_frame_extents_order() {
        assert_eq!(
            parse_gtk_frame_extents(&[1, 2, 3, 4]),
            Some(Margins::new(1, 3, 2, 4))
        );
        assert_eq!(parse_gtk_frame_extents(&[1, 2]), None);
    }

    #[test]
    fn x_native_rounding() {
        assert_eq!(to_x_native(10., 2.), 20);
        assert_eq!(to_x_native(10.3, 1.5), 15);
        assert_eq!(from_x_native(15, 1.5), 10.);
    }
}
