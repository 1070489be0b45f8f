//! The seat.
//!
//! The seat tracks which surface each input device is focused on and delivers input events to the
//! owning clients through the [`Display`]. Every event that carries a serial gets a fresh one from
//! the display, so events to one client are ordered by serial.

use glam::{DMat4, DVec3};
use smithay::utils::{Logical, Point};

use crate::display::{ClientEvent, ClientId, Display, Global, Interfaces, SurfaceId};
use crate::protocols::shortcuts_inhibit::ShortcutsInhibitors;
use crate::utils::serial::Serial;

pub mod dnd;
pub mod gestures;
pub mod keyboard;
pub mod keymap;
pub mod pointer;
pub mod shortcuts;
pub mod tablet;
pub mod touch;

use self::dnd::Drag;
use self::gestures::ActiveGesture;
use self::keyboard::KeyboardState;
use self::pointer::PointerState;
use self::shortcuts::GlobalShortcuts;
use self::tablet::TabletState;
use self::touch::TouchState;

/// `wl_seat` version advertised to clients.
pub const SEAT_VERSION: u32 = 8;

/// Surface an input device is focused on.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusSlot {
    pub surface: SurfaceId,
    pub client: ClientId,
    /// Maps global coordinates to surface-local ones.
    pub transform: DMat4,
    /// Serial of the enter event.
    pub serial: Serial,
}

impl FocusSlot {
    pub fn to_local(&self, global: Point<f64, Logical>) -> Point<f64, Logical> {
        let local = self
            .transform
            .transform_point3(DVec3::new(global.x, global.y, 0.));
        Point::from((local.x, local.y))
    }
}

/// Input transformation for a surface whose origin sits at `origin` in global coordinates.
pub fn offset_transform(origin: Point<f64, Logical>) -> DMat4 {
    DMat4::from_translation(DVec3::new(-origin.x, -origin.y, 0.))
}

/// Things that happened on the seat that the compositor reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatEvent {
    DragStarted,
    DragEnded { dropped: bool },
    KeyboardFocusChanged(Option<SurfaceId>),
    LayoutChanged(u32),
}

/// Current clipboard selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub client: ClientId,
    pub mime_types: Vec<String>,
}

#[derive(Debug)]
pub struct Seat {
    pub name: String,
    pub(crate) pointer: PointerState,
    pub(crate) keyboard: KeyboardState,
    pub(crate) touch: TouchState,
    pub(crate) tablet: TabletState,
    pub(crate) drag: Option<Drag>,
    pub(crate) gesture: Option<ActiveGesture>,
    pub(crate) shortcuts_inhibitors: ShortcutsInhibitors,
    pub(crate) shortcuts: GlobalShortcuts,
    /// Surface whose text input is enabled; follows the keyboard focus.
    text_input: Option<(ClientId, SurfaceId)>,
    selection: Option<Selection>,
    events: Vec<SeatEvent>,
}

impl Seat {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer: PointerState::default(),
            keyboard: KeyboardState::default(),
            touch: TouchState::default(),
            tablet: TabletState::default(),
            drag: None,
            gesture: None,
            shortcuts_inhibitors: ShortcutsInhibitors::default(),
            shortcuts: GlobalShortcuts::default(),
            text_input: None,
            selection: None,
            events: Vec::new(),
        }
    }

    pub fn global() -> Global {
        Global::Seat {
            version: SEAT_VERSION,
        }
    }

    pub fn take_events(&mut self) -> Vec<SeatEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: SeatEvent) {
        self.events.push(event);
    }

    pub fn shortcuts_inhibitors(&self) -> &ShortcutsInhibitors {
        &self.shortcuts_inhibitors
    }

    pub fn shortcuts_inhibitors_mut(&mut self) -> &mut ShortcutsInhibitors {
        &mut self.shortcuts_inhibitors
    }

    pub fn global_shortcuts_mut(&mut self) -> &mut GlobalShortcuts {
        &mut self.shortcuts
    }

    /// Whether the compositor must leave keys alone for the focused surface.
    pub fn keyboard_shortcuts_inhibited(&self) -> bool {
        self.keyboard_focus()
            .is_some_and(|surface| self.shortcuts_inhibitors.is_active(surface))
    }

    pub fn text_input_surface(&self) -> Option<SurfaceId> {
        self.text_input.map(|(_, surface)| surface)
    }

    /// Moves text input to the new keyboard focus.
    pub(crate) fn update_text_input(&mut self, display: &mut Display, focus: Option<SurfaceId>) {
        if self.text_input.map(|(_, s)| s) == focus {
            return;
        }

        if let Some((client, surface)) = self.text_input.take() {
            if display.has_bound(client, Interfaces::TEXT_INPUT) {
                display.send(client, ClientEvent::TextInputLeave { surface });
            }
        }

        let Some(surface) = focus else {
            return;
        };
        let Some(client) = display.surface_client(surface) else {
            return;
        };
        if display.has_bound(client, Interfaces::TEXT_INPUT) {
            display.send(client, ClientEvent::TextInputEnter { surface });
        }
        self.text_input = Some((client, surface));
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Sets the clipboard selection and offers it to the client with keyboard focus.
    pub fn set_selection(&mut self, display: &mut Display, selection: Option<Selection>) {
        self.selection = selection;
        if let Some(client) = self.keyboard.focus.as_ref().map(|f| f.client) {
            self.send_selection(display, client);
        }
    }

    pub(crate) fn send_selection(&self, display: &mut Display, client: ClientId) {
        if !display.has_bound(client, Interfaces::DATA_DEVICE) {
            return;
        }
        let mime_types = self.selection.as_ref().map(|s| s.mime_types.clone());
        display.send(client, ClientEvent::Selection { mime_types });
    }

    /// Drops every reference to a destroyed surface.
    ///
    /// A touch sequence on the surface is cancelled, a drag from or to it ends, and its gesture is
    /// forgotten. No leave events are sent since the surface is gone.
    pub fn surface_destroyed(&mut self, display: &mut Display, surface: SurfaceId) {
        if self.pointer.focus.as_ref().is_some_and(|f| f.surface == surface) {
            self.pointer.focus = None;
        }
        if self.pointer.grab_surface == Some(surface) {
            self.pointer.grab_surface = None;
        }
        self.keyboard_surface_destroyed(surface);
        if self.touch.focus.as_ref().is_some_and(|f| f.surface == surface) {
            self.cancel_touch_sequence(display);
        }
        self.drag_surface_destroyed(surface);
        if self.gesture.as_ref().is_some_and(|g| g.focus.surface == surface) {
            self.gesture = None;
        }
        self.tablet_surface_destroyed(surface);
        self.shortcuts_inhibitors.remove(surface);
        if self.text_input.is_some_and(|(_, s)| s == surface) {
            self.text_input = None;
        }
    }

    /// Forgets a disconnected client.
    pub fn client_disconnected(&mut self, display: &mut Display, client: ClientId) {
        if self.selection.as_ref().is_some_and(|s| s.client == client) {
            self.set_selection(display, None);
        }
        if self
            .drag
            .as_ref()
            .and_then(|d| d.source.as_ref())
            .is_some_and(|s| s.client == client)
        {
            self.drag_source_destroyed(display);
        }
        self.shortcuts_inhibitors.client_disconnected(client);
    }
}

fn send_if_bound(display: &mut Display, client: ClientId, interface: Interfaces, event: ClientEvent) {
    if display.has_bound(client, interface) {
        display.send(client, event);
    }
}
