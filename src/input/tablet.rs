//! Tablet v2 tablets and tools.

use std::collections::HashMap;

use glam::DMat4;
use smithay::utils::{Logical, Point};

use super::{FocusSlot, Seat};
use crate::display::{ClientEvent, ClientId, Display, Interfaces, SurfaceId};
use crate::utils::id::define_id;

define_id!(TabletId);
define_id!(TabletToolId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolType {
    Pen,
    Eraser,
    Brush,
    Pencil,
    Airbrush,
    Finger,
    Mouse,
    Lens,
}

/// Identity of a physical tool.
///
/// The same tool can show up on several tablets, so tools are keyed by their hardware serial and
/// hardware id, each assembled from the high and low halves reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolKey {
    pub hardware_serial: u64,
    pub hardware_id: u64,
}

impl ToolKey {
    pub fn new(serial_hi: u32, serial_lo: u32, id_hi: u32, id_lo: u32) -> Self {
        Self {
            hardware_serial: (u64::from(serial_hi) << 32) | u64::from(serial_lo),
            hardware_id: (u64::from(id_hi) << 32) | u64::from(id_lo),
        }
    }
}

#[derive(Debug)]
pub struct Tablet {
    pub id: TabletId,
    pub name: String,
}

#[derive(Debug)]
pub struct Tool {
    pub id: TabletToolId,
    pub key: ToolKey,
    pub tool_type: ToolType,
    /// Surface the tool is in proximity of.
    pub focus: Option<FocusSlot>,
    /// Tablet the tool was last seen on.
    pub last_tablet: Option<TabletId>,
    pub is_down: bool,
}

#[derive(Debug, Default)]
pub struct TabletState {
    tablets: Vec<Tablet>,
    tools: HashMap<TabletToolId, Tool>,
}

impl Seat {
    pub fn tablets(&self) -> &[Tablet] {
        &self.tablet.tablets
    }

    pub fn tool(&self, id: TabletToolId) -> Option<&Tool> {
        self.tablet.tools.get(&id)
    }

    pub fn add_tablet(&mut self, display: &mut Display, name: String) -> TabletId {
        let id = TabletId::next();
        debug!("tablet added: {name}");
        for client in bound_clients(display, Interfaces::TABLET) {
            display.send(
                client,
                ClientEvent::TabletAdded {
                    tablet: id,
                    name: name.clone(),
                },
            );
        }
        self.tablet.tablets.push(Tablet { id, name });
        id
    }

    pub fn remove_tablet(&mut self, display: &mut Display, id: TabletId) {
        self.tablet.tablets.retain(|t| t.id != id);
        for tool in self.tablet.tools.values_mut() {
            if tool.last_tablet == Some(id) {
                tool.last_tablet = None;
            }
        }
        for client in bound_clients(display, Interfaces::TABLET) {
            display.send(client, ClientEvent::TabletRemoved { tablet: id });
        }
    }

    /// Returns the tool with the given identity, announcing it first if it's new.
    pub fn tablet_tool(
        &mut self,
        display: &mut Display,
        key: ToolKey,
        tool_type: ToolType,
    ) -> TabletToolId {
        if let Some(tool) = self.tablet.tools.values().find(|t| t.key == key) {
            return tool.id;
        }

        let id = TabletToolId::next();
        for client in bound_clients(display, Interfaces::TABLET) {
            display.send(client, ClientEvent::ToolAdded { tool: id, tool_type });
        }
        self.tablet.tools.insert(
            id,
            Tool {
                id,
                key,
                tool_type,
                focus: None,
                last_tablet: None,
                is_down: false,
            },
        );
        id
    }

    pub fn remove_tablet_tool(&mut self, display: &mut Display, id: TabletToolId) {
        if self.tablet.tools.remove(&id).is_some() {
            for client in bound_clients(display, Interfaces::TABLET) {
                display.send(client, ClientEvent::ToolRemoved { tool: id });
            }
        }
    }

    /// Sends the current tablets and tools to a client that just bound the tablet manager.
    pub fn announce_tablets(&self, display: &mut Display, client: ClientId) {
        for tablet in &self.tablet.tablets {
            display.send(
                client,
                ClientEvent::TabletAdded {
                    tablet: tablet.id,
                    name: tablet.name.clone(),
                },
            );
        }
        for tool in self.tablet.tools.values() {
            display.send(
                client,
                ClientEvent::ToolAdded {
                    tool: tool.id,
                    tool_type: tool.tool_type,
                },
            );
        }
    }

    /// Moves the tool over `surface` on `tablet`, sending proximity events as needed.
    pub fn tablet_tool_proximity_in(
        &mut self,
        display: &mut Display,
        tool: TabletToolId,
        tablet: TabletId,
        surface: SurfaceId,
        transform: DMat4,
        time: u32,
    ) {
        let Some(client) = display.surface_client(surface) else {
            return;
        };
        let Some(state) = self.tablet.tools.get_mut(&tool) else {
            return;
        };

        let same = state
            .focus
            .as_ref()
            .is_some_and(|f| f.surface == surface)
            && state.last_tablet == Some(tablet);
        if same {
            if let Some(focus) = &mut state.focus {
                focus.transform = transform;
            }
            return;
        }

        if let Some(old) = state.focus.take() {
            display.send(old.client, ClientEvent::ToolProximityOut { tool });
            display.send(old.client, ClientEvent::ToolFrame { tool, time });
        }

        state.last_tablet = Some(tablet);
        if !display.has_bound(client, Interfaces::TABLET) {
            return;
        }

        let serial = display.next_serial();
        display.send(
            client,
            ClientEvent::ToolProximityIn {
                tool,
                serial,
                tablet,
                surface,
            },
        );
        display.send(client, ClientEvent::ToolFrame { tool, time });
        state.focus = Some(FocusSlot {
            surface,
            client,
            transform,
            serial,
        });
    }

    pub fn tablet_tool_proximity_out(
        &mut self,
        display: &mut Display,
        tool: TabletToolId,
        time: u32,
    ) {
        let Some(state) = self.tablet.tools.get_mut(&tool) else {
            return;
        };
        state.is_down = false;
        if let Some(old) = state.focus.take() {
            display.send(old.client, ClientEvent::ToolProximityOut { tool });
            display.send(old.client, ClientEvent::ToolFrame { tool, time });
        }
    }

    pub fn tablet_tool_motion(
        &mut self,
        display: &mut Display,
        tool: TabletToolId,
        position: Point<f64, Logical>,
        pressure: Option<f64>,
        time: u32,
    ) {
        let Some(focus) = self.tablet.tools.get(&tool).and_then(|t| t.focus.as_ref()) else {
            return;
        };
        let client = focus.client;
        display.send(
            client,
            ClientEvent::ToolMotion {
                tool,
                position: focus.to_local(position),
            },
        );
        if let Some(pressure) = pressure {
            display.send(client, ClientEvent::ToolPressure { tool, pressure });
        }
        display.send(client, ClientEvent::ToolFrame { tool, time });
    }

    pub fn tablet_tool_tip(&mut self, display: &mut Display, tool: TabletToolId, down: bool, time: u32) {
        let Some(state) = self.tablet.tools.get_mut(&tool) else {
            return;
        };
        if state.is_down == down {
            return;
        }
        state.is_down = down;
        let Some(client) = state.focus.as_ref().map(|f| f.client) else {
            return;
        };

        if down {
            let serial = display.next_serial();
            display.send(client, ClientEvent::ToolDown { tool, serial });
        } else {
            display.send(client, ClientEvent::ToolUp { tool });
        }
        display.send(client, ClientEvent::ToolFrame { tool, time });
    }

    pub fn tablet_tool_button(
        &mut self,
        display: &mut Display,
        tool: TabletToolId,
        button: u32,
        pressed: bool,
        time: u32,
    ) {
        let Some(client) = self
            .tablet
            .tools
            .get(&tool)
            .and_then(|t| t.focus.as_ref())
            .map(|f| f.client)
        else {
            return;
        };
        let serial = display.next_serial();
        display.send(
            client,
            ClientEvent::ToolButton {
                tool,
                serial,
                button,
                pressed,
            },
        );
        display.send(client, ClientEvent::ToolFrame { tool, time });
    }

    pub(super) fn tablet_surface_destroyed(&mut self, surface: SurfaceId) {
        for tool in self.tablet.tools.values_mut() {
            if tool.focus.as_ref().is_some_and(|f| f.surface == surface) {
                tool.focus = None;
                tool.is_down = false;
            }
        }
    }
}

fn bound_clients(display: &Display, interface: Interfaces) -> Vec<ClientId> {
    display
        .clients()
        .filter(|c| c.bound.contains(interface))
        .map(|c| c.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::offset_transform;

    #[test]
    fn tools_are_keyed_by_hardware() {
        let mut display = Display::new();
        let mut seat = Seat::new("seat0");
        let client = display.create_client(None);
        display.bind(client, Interfaces::TABLET);

        let key = ToolKey::new(1, 2, 0, 7);
        assert_eq!(key.hardware_serial, (1 << 32) | 2);
        let a = seat.tablet_tool(&mut display, key, ToolType::Pen);
        let b = seat.tablet_tool(&mut display, key, ToolType::Pen);
        assert_eq!(a, b);

        let events = display.take_events(client);
        assert_eq!(
            events,
            vec![ClientEvent::ToolAdded {
                tool: a,
                tool_type: ToolType::Pen
            }]
        );
    }

    #[test]
    fn proximity_moves_between_surfaces() {
        let mut display = Display::new();
        let mut seat = Seat::new("seat0");
        let client = display.create_client(None);
        display.bind(client, Interfaces::TABLET);
        let s1 = display.create_surface(client).unwrap();
        let s2 = display.create_surface(client).unwrap();

        let tablet = seat.add_tablet(&mut display, String::from("pad"));
        let tool = seat.tablet_tool(&mut display, ToolKey::new(0, 1, 0, 1), ToolType::Pen);
        display.take_events(client);

        seat.tablet_tool_proximity_in(&mut display, tool, tablet, s1, DMat4::IDENTITY, 1);
        seat.tablet_tool_proximity_in(&mut display, tool, tablet, s1, DMat4::IDENTITY, 2);
        seat.tablet_tool_proximity_in(&mut display, tool, tablet, s2, offset_transform((10., 10.).into()), 3);
        seat.tablet_tool_motion(&mut display, tool, (15., 20.).into(), None, 4);

        let events = display.take_events(client);
        let ClientEvent::ToolProximityIn { surface, .. } = events[0] else {
            panic!("{events:?}");
        };
        assert_eq!(surface, s1);
        assert_eq!(events[2], ClientEvent::ToolProximityOut { tool });
        assert!(matches!(
            events[4],
            ClientEvent::ToolProximityIn { surface, .. } if surface == s2
        ));
        assert_eq!(
            events[6],
            ClientEvent::ToolMotion {
                tool,
                position: (5., 10.).into()
            }
        );
        assert_eq!(seat.tool(tool).unwrap().last_tablet, Some(tablet));
    }
}
