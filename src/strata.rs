use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context as _;
use calloop::{LoopHandle, LoopSignal};
use strata_config::{CompositingBackend, Config, EffectConfig, Effects as EffectsConfig};

use crate::backend::{Backend, CompositingType, RenderBackend};
use crate::compositor::{Compositor, FrameContext, RenderResult};
use crate::display::{ClientId, Display, Global, SurfaceId};
use crate::effects::paint::EffectWindow;
use crate::effects::{fade, Effects};
use crate::frontend::Frontend;
use crate::input::keymap::Keymap;
use crate::input::Seat;
use crate::output::{Output, OutputId, Outputs};
use crate::protocols::decoration::DecorationState;
use crate::protocols::dmabuf::DmabufState;
use crate::protocols::lockscreen_overlay::LockscreenOverlayState;
use crate::protocols::plasma_shell::PlasmaShellState;
use crate::protocols::shortcuts_inhibit::ShortcutsInhibitors;
use crate::protocols::wl_drm::WlDrmState;
use crate::protocols::xwayland_keyboard_grab::XwaylandKeyboardGrabState;
use crate::scene::Scene;
use crate::texture::buffer::BufferStore;
use crate::utils::clock::Clock;
use crate::utils::parse_flag;
use crate::window::rules::WindowRules;
use crate::window::{Window, WindowId};
use crate::workspace::{Workspace, WorkspaceEvent};
use crate::x11::{self, X11Connection};

/// Render node advertised through linux-dmabuf and wl_drm.
pub const MAIN_DEVICE: &str = "/dev/dri/renderD128";

/// Time a client gets to exit after SIGTERM before it is disconnected.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variables the engine reads.
const ENV_VARS: [&str; 12] = [
    "KWIN_COMPOSE",
    "KWIN_EFFECTS_FORCE_ANIMATIONS",
    "KWIN_EXPLICIT_SYNC",
    "KWIN_FORCE_NUM_LOCK_EVALUATION",
    "XKB_DEFAULT_RULES",
    "XKB_DEFAULT_MODEL",
    "XKB_DEFAULT_LAYOUT",
    "XKB_DEFAULT_VARIANT",
    "XKB_DEFAULT_OPTIONS",
    "LC_ALL",
    "LC_CTYPE",
    "LANG",
];

/// Snapshot of the environment the engine was started with.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_vars(
            ENV_VARS
                .iter()
                .filter_map(|name| Some((*name, std::env::var(name).ok()?))),
        )
    }

    pub fn from_vars<'a>(vars: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        Self {
            vars: vars
                .into_iter()
                .map(|(name, value)| (name.to_owned(), value))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn flag(&self, name: &str) -> Option<bool> {
        let value = self.vars.get(name)?;
        let flag = parse_flag(value);
        if flag.is_none() {
            warn!("ignoring invalid value of {name}: {value:?}");
        }
        flag
    }

    /// Applies the environment overrides on top of a parsed config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(compose) = self.vars.get("KWIN_COMPOSE") {
            match compose.as_str() {
                "O2ES" => {
                    config.compositing.backend = CompositingBackend::Opengl;
                    config.compositing.prefer_gles = true;
                }
                c if c.starts_with('O') => config.compositing.backend = CompositingBackend::Opengl,
                c if c.starts_with('Q') => {
                    config.compositing.backend = CompositingBackend::Software;
                }
                c => warn!("ignoring unknown KWIN_COMPOSE value {c:?}"),
            }
        }
        if let Some(force) = self.flag("KWIN_EFFECTS_FORCE_ANIMATIONS") {
            config.debug.force_animations = force;
        }
        if let Some(enabled) = self.flag("KWIN_EXPLICIT_SYNC") {
            config.compositing.explicit_sync = enabled;
        }
        if let Some(force) = self.flag("KWIN_FORCE_NUM_LOCK_EVALUATION") {
            config.debug.force_num_lock_evaluation = force;
        }
    }
}

pub struct State {
    pub backend: Backend,
    pub strata: Strata,
}

pub struct Strata {
    pub config: Rc<RefCell<Config>>,
    pub env: Environment,
    pub event_loop: LoopHandle<'static, State>,
    pub stop_signal: LoopSignal,
    pub clock: Clock,

    pub display: Display,
    pub frontend: Frontend,
    pub buffers: BufferStore,
    pub outputs: Outputs,
    pub scene: Scene,
    pub renderer: Box<dyn RenderBackend>,
    pub compositor: Compositor,
    pub effects: Effects,
    pub workspace: Workspace,
    pub seat: Seat,
    pub x11: Option<Box<dyn X11Connection>>,

    /// Window each mapped toplevel, popup and Xwayland surface belongs to.
    pub surface_windows: HashMap<SurfaceId, WindowId>,
    /// xdg-shell windows that haven't committed a buffer yet.
    pub unmapped_windows: HashMap<SurfaceId, Window>,

    pub decoration_state: DecorationState,
    pub plasma_shell_state: PlasmaShellState,
    pub dmabuf_state: DmabufState,
    pub wl_drm_state: WlDrmState,
    pub xwayland_keyboard_grab_state: XwaylandKeyboardGrabState,
    pub lockscreen_overlay_state: LockscreenOverlayState,

    /// X11 window whose focus out waits one loop cycle for a matching focus in.
    pub(crate) pending_focus_out: Option<WindowId>,
    /// X11 windows with the protocol id of their Xwayland `wl_surface`, waiting to be tied.
    pub pending_xwayland_surfaces: Vec<(u32, u32)>,
    /// Clients sent SIGTERM, with the time they get disconnected at.
    pub(crate) killed_clients: Vec<(ClientId, Duration)>,

    /// Last ambient light level in lux.
    pub light_level: Option<f64>,

    #[cfg(feature = "dbus")]
    pub dbus: Option<crate::dbus::DBusClients>,
}

/// Effect settings adjusted for the renderer in use.
///
/// Animations are not worth it with software compositing unless forced.
fn effects_config_for(config: &Config, compositing: CompositingType) -> EffectsConfig {
    let mut effects = config.effects.clone();
    if compositing == CompositingType::Software && !config.debug.force_animations {
        match effects.effects.iter_mut().find(|e| e.name == fade::NAME) {
            Some(effect) => effect.enabled = false,
            None => effects.effects.push(EffectConfig {
                name: fade::NAME.to_owned(),
                chain_position: None,
                enabled: false,
            }),
        }
    }
    effects
}

impl State {
    pub fn new(
        config: Config,
        env: Environment,
        event_loop: LoopHandle<'static, State>,
        stop_signal: LoopSignal,
        mut backend: Backend,
        clock: Clock,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("State::new");

        let mut config = config;
        env.apply(&mut config);
        let config = Rc::new(RefCell::new(config));

        let mut strata = Strata::new(config, env, event_loop, stop_signal, &mut backend, clock)?;
        backend.init(&mut strata);
        strata.process_workspace_events();

        Ok(Self { backend, strata })
    }

    pub fn refresh_and_flush_clients(&mut self) {
        let _span = tracy_client::span!("State::refresh_and_flush_clients");

        self.strata.refresh();
        self.strata.redraw_queued_outputs();

        if let Some(x11) = self.strata.x11.as_deref_mut() {
            if let Err(err) = x11.flush() {
                warn!("error flushing the X connection: {err}");
            }
        }
        self.strata.flush_frontend();

        // Clear the time so it's fetched afresh next iteration.
        self.strata.clock.clear();
    }

    pub fn reload_config(&mut self, config: Config) {
        self.strata.reload_config(config);
    }
}

impl Strata {
    pub fn new(
        config: Rc<RefCell<Config>>,
        env: Environment,
        event_loop: LoopHandle<'static, State>,
        stop_signal: LoopSignal,
        backend: &mut Backend,
        clock: Clock,
    ) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("Strata::new");

        let config_ = config.borrow();

        let mut display = Display::new();
        for global in [
            Global::Compositor,
            Global::Subcompositor,
            Global::Shm,
            Seat::global(),
            Global::DataDeviceManager,
            Global::XdgWmBase,
            Global::PointerGestures,
            Global::RelativePointerManager,
            Global::TabletManager,
            Global::TextInputManager,
            Global::SinglePixelBufferManager,
            Global::Presentation,
        ] {
            display.advertise(global);
        }
        ShortcutsInhibitors::global(&mut display);
        let frontend = Frontend::new(&event_loop)?;

        let renderer = create_renderer(&config_, backend)?;
        info!("compositing with {}", renderer.name());

        let mut scene = Scene::new();
        scene.set_damage_history(usize::from(config_.compositing.damage_history));

        let explicit_sync =
            config_.compositing.explicit_sync && !config_.debug.disable_explicit_sync;
        let compositor = Compositor::new(explicit_sync);

        let mut effects = Effects::new(clock.clone());
        effects.reconfigure(
            &effects_config_for(&config_, renderer.compositing_type()),
            None,
        );

        let workspace = Workspace::new(&config_);

        let mut seat = Seat::new(backend.seat_name());
        let keyboard = &config_.input.keyboard;
        match Keymap::new(
            keyboard,
            config_.debug.force_num_lock_evaluation,
            |name| env.get(name),
        ) {
            Ok(keymap) => seat.set_keymap(&mut display, keymap),
            Err(err) => warn!("error loading the keymap: {err}"),
        }
        seat.set_keyboard_repeat_info(
            &mut display,
            i32::from(keyboard.repeat_rate),
            i32::from(keyboard.repeat_delay),
        );

        let decoration_state = DecorationState::new(&mut display);
        let plasma_shell_state = PlasmaShellState::new(&mut display);
        let dmabuf_state = DmabufState::new(
            &mut display,
            MAIN_DEVICE.to_owned(),
            renderer.dmabuf_formats(),
        );
        let wl_drm_state = WlDrmState::new(&mut display, MAIN_DEVICE.to_owned());
        let xwayland_keyboard_grab_state = XwaylandKeyboardGrabState::new(&mut display);
        let lockscreen_overlay_state = LockscreenOverlayState::new(&mut display);

        drop(config_);

        Ok(Self {
            config,
            env,
            event_loop,
            stop_signal,
            clock,
            display,
            frontend,
            buffers: BufferStore::new(),
            outputs: Outputs::new(),
            scene,
            renderer,
            compositor,
            effects,
            workspace,
            seat,
            x11: None,
            surface_windows: HashMap::new(),
            unmapped_windows: HashMap::new(),
            decoration_state,
            plasma_shell_state,
            dmabuf_state,
            wl_drm_state,
            xwayland_keyboard_grab_state,
            lockscreen_overlay_state,
            pending_focus_out: None,
            pending_xwayland_surfaces: Vec::new(),
            killed_clients: Vec::new(),
            light_level: None,
            #[cfg(feature = "dbus")]
            dbus: None,
        })
    }

    pub fn on_light_level(&mut self, lux: f64) {
        trace!("ambient light level: {lux} lx");
        self.light_level = Some(lux);
    }

    /// Takes over as the X11 window manager on the connection.
    pub fn set_x11_connection(&mut self, mut conn: Box<dyn X11Connection>) {
        let count = self.workspace.desktop_count();
        let current = self.workspace.current_desktop();
        if let Err(err) = x11::set_desktop_properties(&mut *conn, count, current) {
            warn!("error setting the desktop properties: {err}");
        }
        if let Err(err) = x11::set_active_window_property(&mut *conn, None) {
            warn!("error setting the active window: {err}");
        }
        self.x11 = Some(conn);
        self.adopt_x11_windows();
    }

    pub fn add_output(&mut self, output: Output) -> OutputId {
        let id = output.id;
        debug!("adding output {} at {:?}", output.name, output.geometry);

        if let Err(err) = self.renderer.add_output(&output) {
            warn!("error adding output {} to the renderer: {err}", output.name);
        }
        self.scene.add_delegate(id, output.geometry);
        self.compositor.add_output(id);
        self.outputs.add(output);
        self.display.advertise(Global::Output(id));

        self.workspace.set_output_layout(&self.outputs);
        self.workspace.update_window_outputs(&self.outputs);
        if self.workspace.active_output().is_none() {
            self.workspace.set_active_output(Some(id));
        }
        self.compositor.queue_redraw(id);
        id
    }

    pub fn remove_output(&mut self, id: OutputId) {
        let Some((output, _)) = self.outputs.remove(id) else {
            return;
        };
        debug!("removing output {}", output.name);

        self.renderer.remove_output(id);
        self.scene.remove_delegate(id);
        self.compositor.remove_output(id);
        self.display.withdraw(Global::Output(id));

        self.workspace.set_output_layout(&self.outputs);
        self.workspace.update_window_outputs(&self.outputs);
        if self.workspace.active_output() == Some(id) {
            self.workspace.set_active_output(self.outputs.first());
        }
        self.process_workspace_events();
        self.compositor.queue_redraw_all();
    }

    pub fn queue_redraw_all(&mut self) {
        self.compositor.queue_redraw_all();
    }

    /// Carries out what the workspace asked for, until it asks for nothing more.
    pub fn process_workspace_events(&mut self) {
        loop {
            let events = self.workspace.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.handle_workspace_event(event);
            }
        }
    }

    fn handle_workspace_event(&mut self, event: WorkspaceEvent) {
        trace!("workspace event: {event:?}");
        match event {
            WorkspaceEvent::StackingOrderChanged => {
                let propagation = self.workspace.take_x11_propagation();
                if let (Some(x11), Some(propagation)) = (self.x11.as_deref_mut(), propagation) {
                    if let Err(err) = x11::propagate_stacking(x11, &propagation) {
                        warn!("error propagating the stacking order: {err}");
                    }
                }
                self.compositor.queue_redraw_all();
            }
            WorkspaceEvent::ActiveWindowChanged(id) => {
                let window = id.and_then(|id| self.workspace.window(id));
                if let Some(x11) = self.x11.as_deref_mut() {
                    let xid = window.and_then(|w| w.x11.as_ref()).map(|x| x.window);
                    if let Err(err) = x11::set_active_window_property(x11, xid) {
                        warn!("error setting the active window: {err}");
                    }
                }
                let effect_window = window.map(EffectWindow::new);
                self.effects.window_activated(effect_window.as_ref());
                self.update_activated_states();
                self.compositor.queue_redraw_all();
            }
            WorkspaceEvent::TakeFocus(id) => self.focus_window(id),
            WorkspaceEvent::FocusToNull => {
                self.seat.set_focused_keyboard_surface(&mut self.display, None);
                if let Some(x11) = self.x11.as_deref_mut() {
                    let null_window = self.workspace.support_window.unwrap_or(x11.root());
                    if let Err(err) = x11.set_input_focus(null_window, x11::CURRENT_TIME) {
                        warn!("error resetting the X11 focus: {err}");
                    }
                }
            }
            WorkspaceEvent::DemandsAttentionChanged(id, _) => {
                self.update_net_wm_state(id);
                self.compositor.queue_redraw_all();
            }
            WorkspaceEvent::CurrentDesktopChanged(desktop) => {
                debug!("switched to desktop {desktop}");
                let count = self.workspace.desktop_count();
                if let Some(x11) = self.x11.as_deref_mut() {
                    if let Err(err) = x11::set_desktop_properties(x11, count, desktop) {
                        warn!("error setting the desktop properties: {err}");
                    }
                }
                self.compositor.queue_redraw_all();
            }
            WorkspaceEvent::WorkAreaChanged => self.check_workspace_positions(),
        }
    }

    /// Gives keyboard focus to the window, the way its kind of client expects.
    fn focus_window(&mut self, id: WindowId) {
        let Some(window) = self.workspace.window(id) else {
            return;
        };
        let surface = window.surface;

        if let Some(state) = &window.x11 {
            let (xid, input_hint, take_focus) =
                (state.window, state.input_hint, state.take_focus);
            if let Some(x11) = self.x11.as_deref_mut() {
                let result = x11::focus_window(x11, xid, input_hint, take_focus, x11::CURRENT_TIME);
                if let Err(err) = result {
                    warn!("error focusing X11 window {xid:#x}: {err}");
                }
            }
            if surface.is_some() {
                self.seat.set_focused_keyboard_surface(&mut self.display, surface);
            }
            return;
        }

        self.seat.set_focused_keyboard_surface(&mut self.display, surface);
        if window.wayland.is_some() {
            self.ping_window(id, crate::window::xdg::PingReason::FocusWindow);
        }
    }

    /// Moves windows back into their work area after it changed.
    pub fn check_workspace_positions(&mut self) {
        let ids: Vec<_> = self.workspace.windows().map(|w| w.id).collect();
        for id in ids {
            let Some(window) = self.workspace.window(id) else {
                continue;
            };
            let frame = window.frame_geometry();
            if let Some(rect) = self.workspace.check_workspace_position(id, frame, None) {
                self.request_geometry(id, rect);
            }
        }
    }

    fn refresh(&mut self) {
        let _span = tracy_client::span!("Strata::refresh");

        self.check_pings();
        self.disconnect_killed_clients();
        self.flush_focus_out();
        self.process_workspace_events();

        if let Some(x11) = self.x11.as_deref_mut() {
            if let Err(err) = self.effects.delete_unused_support_properties(x11) {
                warn!("error deleting support properties: {err}");
            }
        }
        self.compositor
            .release_closed(&mut self.scene, &mut self.workspace, &self.effects);

        for event in self.seat.take_events() {
            trace!("seat event: {event:?}");
        }

        self.sync_windows();
    }

    /// Brings the scene up to date with every window.
    fn sync_windows(&mut self) {
        let desktop = self.workspace.current_desktop();
        let locked = self.workspace.screen_locked();
        for window in self.workspace.windows_mut() {
            let visible = window.is_shown()
                && window.is_on_desktop(desktop)
                && (!locked || window.lockscreen_overlay);
            self.compositor
                .sync_window(&mut self.scene, &self.display, window, visible);
        }
    }

    pub fn set_screen_locked(&mut self, locked: bool) {
        self.workspace.set_screen_locked(locked);
        self.process_workspace_events();
        self.sync_windows();
        self.compositor.queue_redraw_all();
    }

    fn disconnect_killed_clients(&mut self) {
        let now = self.clock.now();
        let (due, pending): (Vec<_>, Vec<_>) = self
            .killed_clients
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.killed_clients = pending;

        for (client, _) in due {
            if self.display.is_connected(client) {
                warn!("client {client:?} did not exit after SIGTERM, disconnecting it");
                self.client_disconnected(client);
            }
        }
    }

    pub fn redraw_queued_outputs(&mut self) {
        let _span = tracy_client::span!("Strata::redraw_queued_outputs");

        let mut queued = self.compositor.take_queued();
        for output in self.outputs.iter() {
            if !queued.contains(&output.id) && self.scene.needs_repaint(output.id) {
                queued.push(output.id);
            }
        }

        for id in queued {
            let Some(output) = self.outputs.get(id) else {
                continue;
            };
            let mut ctx = FrameContext {
                scene: &mut self.scene,
                display: &mut self.display,
                workspace: &self.workspace,
                effects: &mut self.effects,
                renderer: &mut *self.renderer,
            };
            if self.compositor.render_output(&mut ctx, output) == RenderResult::Failed {
                warn!("failed to render output {}", output.name);
            }
        }

        self.compositor.poll_frames(&mut *self.renderer);
        if self.effects.has_active_effects() {
            self.compositor.queue_redraw_all();
        }
    }

    pub fn reload_config(&mut self, config: Config) {
        let _span = tracy_client::span!("Strata::reload_config");

        let mut config = config;
        self.env.apply(&mut config);

        self.workspace.reload_config(&config);
        self.effects.reconfigure(
            &effects_config_for(&config, self.renderer.compositing_type()),
            self.x11.as_deref_mut(),
        );
        self.scene
            .set_damage_history(usize::from(config.compositing.damage_history));

        let keyboard = &config.input.keyboard;
        let env = &self.env;
        let result = self.seat.update_keymap(&mut self.display, |keymap| {
            keymap.reconfigure(keyboard, |name| env.get(name))
        });
        if let Err(err) = result {
            warn!("error reloading the keymap: {err}");
        }
        self.seat.set_keyboard_repeat_info(
            &mut self.display,
            i32::from(keyboard.repeat_rate),
            i32::from(keyboard.repeat_delay),
        );

        for window in self.workspace.windows_mut() {
            window.rules = WindowRules::compute(&config, &window.match_props());
        }

        *self.config.borrow_mut() = config;
        self.process_workspace_events();
        self.compositor.queue_redraw_all();
    }
}

/// Creates the renderer, falling through the compositing types in order of preference.
fn create_renderer(
    config: &Config,
    backend: &mut Backend,
) -> anyhow::Result<Box<dyn RenderBackend>> {
    let preferred = match config.compositing.backend {
        CompositingBackend::Opengl => CompositingType::OpenGl,
        CompositingBackend::Software => CompositingType::Software,
    };
    let mut kinds = backend.supported_compositors();
    kinds.sort_by_key(|kind| *kind != preferred);

    let history = usize::from(config.compositing.render_time_history);
    for kind in kinds {
        match backend.create_render_backend(kind, config.compositing.prefer_gles, history) {
            Ok(renderer) => return Ok(renderer),
            Err(err) => warn!("error creating the {kind:?} renderer, trying the next one: {err}"),
        }
    }
    None.context("no compositing type could be initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_overrides() {
        let env = Environment::from_vars([
            ("KWIN_COMPOSE", String::from("O2ES")),
            ("KWIN_EXPLICIT_SYNC", String::from("0")),
            ("KWIN_FORCE_NUM_LOCK_EVALUATION", String::from("1")),
            ("KWIN_EFFECTS_FORCE_ANIMATIONS", String::from("maybe")),
        ]);
        let mut config = Config::default();
        env.apply(&mut config);

        assert_eq!(config.compositing.backend, CompositingBackend::Opengl);
        assert!(config.compositing.prefer_gles);
        assert!(!config.compositing.explicit_sync);
        assert!(config.debug.force_num_lock_evaluation);
        assert!(!config.debug.force_animations);
    }

    #[test]
    fn software_compose() {
        let env = Environment::from_vars([("KWIN_COMPOSE", String::from("Q"))]);
        let mut config = Config::default();
        env.apply(&mut config);
        assert_eq!(config.compositing.backend, CompositingBackend::Software);
        assert!(!config.compositing.prefer_gles);
    }

    #[test]
    fn no_fade_with_software_compositing() {
        let mut config = Config::default();
        let effects = effects_config_for(&config, CompositingType::Software);
        assert!(!effects.is_enabled(fade::NAME));

        let effects = effects_config_for(&config, CompositingType::OpenGl);
        assert!(effects.is_enabled(fade::NAME));

        config.debug.force_animations = true;
        let effects = effects_config_for(&config, CompositingType::Software);
        assert!(effects.is_enabled(fade::NAME));
    }

    #[test]
    fn falls_back_to_software_without_gpu() {
        let mut backend = Backend::Headless(crate::backend::Headless::without_gpu());
        let renderer = create_renderer(&Config::default(), &mut backend).unwrap();
        assert_eq!(renderer.compositing_type(), CompositingType::Software);
    }
}
