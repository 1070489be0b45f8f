//! Server-side decoration state.

use super::Margins;

/// Border sizes of the built-in server-side decoration.
pub const DEFAULT_BORDERS: Margins = Margins {
    left: 4,
    top: 24,
    right: 4,
    bottom: 4,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecorationMode {
    #[default]
    ClientSide,
    ServerSide,
}

/// Decoration attached to a window.
///
/// The window owns its decoration; the decoration knows nothing of the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub borders: Margins,
    /// Whether the window is considered unresponsive, reflected in the title bar.
    pub dimmed: bool,
}

impl Decoration {
    pub fn server_side(borders: Margins) -> Self {
        Self {
            borders,
            dimmed: false,
        }
    }

    pub fn set_borders(&mut self, borders: Margins) -> bool {
        if self.borders == borders {
            return false;
        }
        self.borders = borders;
        true
    }
}

impl Default for Decoration {
    fn default() -> Self {
        Self::server_side(DEFAULT_BORDERS)
    }
}
