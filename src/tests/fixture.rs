use std::time::Duration;

use calloop::EventLoop;
use smithay::backend::allocator::Fourcc;
use strata_config::Config;

use super::client::Client;
use crate::backend::graphics::VirtualGraphics;
use crate::backend::{Backend, Headless};
use crate::display::{ClientId, Interfaces, SurfaceId};
use crate::output::OutputId;
use crate::strata::{Environment, State, Strata};
use crate::texture::buffer::{BufferKind, ShmAttributes};
use crate::utils::clock::Clock;
use crate::window::positioner::Positioner;
use crate::window::{Window, WindowId};
use crate::x11::{RecordingConnection, X11Connection as _};

pub struct Fixture {
    pub event_loop: EventLoop<'static, State>,
    pub state: State,
    pub clock: Clock,
    pub clients: Vec<Client>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let event_loop = EventLoop::try_new().unwrap();
        let clock = Clock::with_time(Duration::ZERO);
        let state = State::new(
            config,
            Environment::default(),
            event_loop.handle(),
            event_loop.get_signal(),
            Backend::Headless(Headless::with_graphics(VirtualGraphics::new())),
            clock.clone(),
        )
        .unwrap();

        Self {
            event_loop,
            state,
            clock,
            clients: Vec::new(),
        }
    }

    pub fn dispatch(&mut self) {
        self.event_loop
            .dispatch(Duration::ZERO, &mut self.state)
            .unwrap();
        self.state.refresh_and_flush_clients();
    }

    pub fn strata(&mut self) -> &mut Strata {
        &mut self.state.strata
    }

    pub fn add_output(&mut self, n: u8, size: (u16, u16)) -> OutputId {
        let state = &mut self.state;
        state.backend.headless().add_output(&mut state.strata, n, size)
    }

    pub fn advance_time(&mut self, delta: Duration) {
        self.clock.advance(delta);
    }

    pub fn add_client(&mut self) -> ClientId {
        self.add_client_with_pid(None)
    }

    pub fn add_client_with_pid(&mut self, pid: Option<i32>) -> ClientId {
        let strata = self.strata();
        let id = strata.display.create_client(pid);
        strata.bind(
            id,
            Interfaces::XDG_WM_BASE | Interfaces::KEYBOARD | Interfaces::POINTER,
        );
        self.clients.push(Client::new(id));
        self.roundtrip(id);
        id
    }

    pub fn client(&mut self, id: ClientId) -> &mut Client {
        self.clients.iter_mut().find(|c| c.id == id).unwrap()
    }

    /// Dispatches the compositor, then hands everything it sent to the client.
    pub fn roundtrip(&mut self, id: ClientId) {
        self.dispatch();
        let events = self.strata().display.take_events(id);
        self.client(id).receive(events);
    }

    pub fn create_window(&mut self, id: ClientId) -> SurfaceId {
        let strata = self.strata();
        let surface = strata.new_surface(id).unwrap();
        strata.new_toplevel(surface).unwrap();
        self.client(id).add_window(surface);
        surface
    }

    pub fn create_popup(
        &mut self,
        id: ClientId,
        parent: SurfaceId,
        positioner: Positioner,
    ) -> SurfaceId {
        let strata = self.strata();
        let surface = strata.new_surface(id).unwrap();
        strata.new_popup(surface, Some(parent), positioner).unwrap();
        self.client(id).add_window(surface);
        surface
    }

    pub fn commit(&mut self, surface: SurfaceId) {
        self.strata().commit(surface);
    }

    pub fn attach_new_buffer(&mut self, surface: SurfaceId, size: (i32, i32)) {
        let strata = self.strata();
        let client = strata.display.surface_client(surface).unwrap();
        let buffer = strata.create_buffer(
            client,
            BufferKind::Shm(ShmAttributes {
                format: Fourcc::Argb8888,
                width: size.0,
                height: size.1,
                stride: size.0 * 4,
            }),
        );
        strata.display.attach(surface, Some(buffer));
    }

    pub fn ack_last_and_commit(&mut self, id: ClientId, surface: SurfaceId) {
        let serial = self.client(id).window(surface).last_serial();
        let strata = self.strata();
        strata.ack_configure(surface, serial);
        strata.commit(surface);
    }

    /// Creates a toplevel and maps it with a buffer of the given size.
    pub fn map_window(&mut self, id: ClientId, size: (i32, i32)) -> SurfaceId {
        let surface = self.create_window(id);
        self.commit(surface);
        self.roundtrip(id);

        self.attach_new_buffer(surface, size);
        self.ack_last_and_commit(id, surface);
        self.roundtrip(id);
        surface
    }

    pub fn window_id(&mut self, surface: SurfaceId) -> WindowId {
        self.strata().window_for_surface(surface).unwrap()
    }

    pub fn window(&mut self, surface: SurfaceId) -> &Window {
        let id = self.window_id(surface);
        self.strata().workspace.window(id).unwrap()
    }

    /// Takes over the window management of an in-memory X server.
    pub fn connect_x11(&mut self) {
        self.connect_x11_with(RecordingConnection::new());
    }

    pub fn connect_x11_with(&mut self, conn: RecordingConnection) {
        self.strata().set_x11_connection(Box::new(conn));
    }

    pub fn x11(&mut self) -> &mut RecordingConnection {
        self.strata()
            .x11
            .as_deref_mut()
            .unwrap()
            .as_any_mut()
            .downcast_mut::<RecordingConnection>()
            .unwrap()
    }

    pub fn x11_root(&mut self) -> u32 {
        self.x11().root()
    }
}
