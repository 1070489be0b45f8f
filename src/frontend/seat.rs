//! `wl_seat` and its input devices.
//!
//! Focus, serials and event contents are decided by the compositor's seat; the protocol objects
//! here only record which devices a client created, so queued events reach every one of them.

use smithay::reexports::wayland_server::backend::{ClientId as WlClientId, ObjectId};
use smithay::reexports::wayland_server::protocol::wl_keyboard::{self, WlKeyboard};
use smithay::reexports::wayland_server::protocol::wl_pointer::{self, WlPointer};
use smithay::reexports::wayland_server::protocol::wl_seat::{self, WlSeat};
use smithay::reexports::wayland_server::protocol::wl_touch::{self, WlTouch};
use smithay::reexports::wayland_server::{
    Client, DataInit, Dispatch, DisplayHandle, GlobalDispatch, New, Resource,
};

use super::client_id;
use crate::display::{Interfaces, SurfaceRole};
use crate::strata::State;

enum Device {
    Pointer(WlPointer),
    Keyboard(WlKeyboard),
    Touch(WlTouch),
}

impl State {
    fn device_created(&mut self, client: &Client, device: Device) {
        let Some(id) = client_id(client) else {
            return;
        };
        let strata = &mut self.strata;
        let Some(wire) = strata.frontend.clients.get_mut(&id) else {
            return;
        };
        let interfaces = match device {
            Device::Pointer(pointer) => {
                wire.pointers.push(pointer);
                Interfaces::POINTER
            }
            Device::Keyboard(keyboard) => {
                wire.keyboards.push(keyboard);
                Interfaces::KEYBOARD
            }
            Device::Touch(touch) => {
                wire.touches.push(touch);
                Interfaces::TOUCH
            }
        };
        // Binding the keyboard queues the keymap and repeat info.
        strata.bind(id, interfaces);
    }

    fn device_destroyed(&mut self, client: WlClientId, object: &ObjectId) {
        let Some(wire) = self
            .strata
            .frontend
            .clients
            .values_mut()
            .find(|wire| wire.client.id() == client)
        else {
            return;
        };
        wire.pointers.retain(|p| p.id() != *object);
        wire.keyboards.retain(|k| k.id() != *object);
        wire.touches.retain(|t| t.id() != *object);
    }
}

impl GlobalDispatch<WlSeat, ()> for State {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<WlSeat>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        let seat = data_init.init(resource, ());
        seat.capabilities(
            wl_seat::Capability::Pointer | wl_seat::Capability::Keyboard | wl_seat::Capability::Touch,
        );
        if seat.version() >= 2 {
            seat.name(state.strata.seat.name.clone());
        }
    }
}

impl Dispatch<WlSeat, ()> for State {
    fn request(
        state: &mut Self,
        client: &Client,
        _resource: &WlSeat,
        request: wl_seat::Request,
        _data: &(),
        _handle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_seat::Request::GetPointer { id } => {
                let pointer = data_init.init(id, ());
                state.device_created(client, Device::Pointer(pointer));
            }
            wl_seat::Request::GetKeyboard { id } => {
                let keyboard = data_init.init(id, ());
                state.device_created(client, Device::Keyboard(keyboard));
            }
            wl_seat::Request::GetTouch { id } => {
                let touch = data_init.init(id, ());
                state.device_created(client, Device::Touch(touch));
            }
            wl_seat::Request::Release => (),
            _ => unreachable!(),
        }
    }
}

impl Dispatch<WlPointer, ()> for State {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &WlPointer,
        request: wl_pointer::Request,
        _data: &(),
        _handle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_pointer::Request::SetCursor { surface, .. } => {
                let Some(surface) = surface.and_then(|s| state.strata.frontend.surface_id(&s)) else {
                    return;
                };
                let strata = &mut state.strata;
                if let Err(err) = strata.display.set_role(surface, SurfaceRole::Cursor) {
                    if let Some(client) = strata.display.surface_client(surface) {
                        strata.post_error(client, err);
                    }
                }
            }
            wl_pointer::Request::Release => (),
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut Self, client: WlClientId, resource: &WlPointer, _data: &()) {
        state.device_destroyed(client, &resource.id());
    }
}

impl Dispatch<WlKeyboard, ()> for State {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlKeyboard,
        request: wl_keyboard::Request,
        _data: &(),
        _handle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_keyboard::Request::Release => (),
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut Self, client: WlClientId, resource: &WlKeyboard, _data: &()) {
        state.device_destroyed(client, &resource.id());
    }
}

impl Dispatch<WlTouch, ()> for State {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &WlTouch,
        request: wl_touch::Request,
        _data: &(),
        _handle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            wl_touch::Request::Release => (),
            _ => unreachable!(),
        }
    }

    fn destroyed(state: &mut Self, client: WlClientId, resource: &WlTouch, _data: &()) {
        state.device_destroyed(client, &resource.id());
    }
}
