use std::fmt::{self, Write as _};

use smithay::utils::{Logical, Rectangle, Size};

use crate::display::{ClientEvent, ClientId, SurfaceId};
use crate::utils::serial::Serial;
use crate::window::xdg::XdgStates;

/// What a test client has received so far.
pub struct Client {
    pub id: ClientId,
    pub windows: Vec<Window>,
    pub pings: Vec<Serial>,
    pub other_events: Vec<ClientEvent>,
}

pub struct Window {
    pub surface: SurfaceId,
    pub configures_received: Vec<(Serial, Configure)>,
    pub configures_looked_at: usize,
    pub close_requested: bool,
    pub popup_done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Configure {
    Toplevel {
        size: Size<i32, Logical>,
        states: XdgStates,
    },
    Popup {
        geometry: Rectangle<i32, Logical>,
    },
}

impl fmt::Display for Configure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Configure::Toplevel { size, states } => {
                write!(f, "size: {} × {}, states: [", size.w, size.h)?;
                for (i, (name, _)) in states.iter_names().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, "]")
            }
            Configure::Popup { geometry } => {
                let (loc, size) = (geometry.loc, geometry.size);
                write!(f, "popup: {} × {} at {}, {}", size.w, size.h, loc.x, loc.y)
            }
        }
    }
}

impl Client {
    pub fn new(id: ClientId) -> Self {
        Self {
            id,
            windows: Vec::new(),
            pings: Vec::new(),
            other_events: Vec::new(),
        }
    }

    pub fn add_window(&mut self, surface: SurfaceId) {
        self.windows.push(Window {
            surface,
            configures_received: Vec::new(),
            configures_looked_at: 0,
            close_requested: false,
            popup_done: false,
        });
    }

    pub fn window(&mut self, surface: SurfaceId) -> &mut Window {
        self.windows
            .iter_mut()
            .find(|w| w.surface == surface)
            .unwrap()
    }

    /// Routes events the compositor sent to this client.
    pub fn receive(&mut self, events: Vec<ClientEvent>) {
        for event in events {
            match event {
                ClientEvent::XdgConfigure {
                    surface,
                    serial,
                    size,
                    states,
                } => self
                    .window(surface)
                    .configures_received
                    .push((serial, Configure::Toplevel { size, states })),
                ClientEvent::XdgPopupConfigure {
                    surface,
                    serial,
                    geometry,
                } => self
                    .window(surface)
                    .configures_received
                    .push((serial, Configure::Popup { geometry })),
                ClientEvent::XdgClose { surface } => self.window(surface).close_requested = true,
                ClientEvent::XdgPopupDone { surface } => self.window(surface).popup_done = true,
                ClientEvent::Ping { serial } => self.pings.push(serial),
                event => self.other_events.push(event),
            }
        }
    }
}

impl Window {
    pub fn last_serial(&self) -> Serial {
        self.configures_received.last().unwrap().0
    }

    pub fn recent_configures(&mut self) -> impl Iterator<Item = &Configure> {
        let start = self.configures_looked_at;
        self.configures_looked_at = self.configures_received.len();
        self.configures_received[start..].iter().map(|(_, c)| c)
    }

    pub fn format_recent_configures(&mut self) -> String {
        let mut buf = String::new();
        for configure in self.recent_configures() {
            if !buf.is_empty() {
                buf.push('\n');
            }
            write!(buf, "{configure}").unwrap();
        }
        buf
    }
}
