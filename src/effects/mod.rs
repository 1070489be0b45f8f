//! Effects and the registry that runs them.

use std::collections::HashMap;
use std::time::Duration;

use strata_config::Effects as EffectsConfig;

use crate::utils::clock::Clock;
use crate::window::WindowId;
use crate::x11::{X11Connection, X11Error};

pub mod dim_inactive;
pub mod fade;
pub mod paint;

use self::paint::{
    EffectWindow, FinalPaint, PaintChain, PaintMask, ScreenPaintData, ScreenPrePaintData,
    WindowPaintData, WindowPrePaintData,
};
use crate::utils::region::Region;

/// How long an unused support property stays on the root window.
pub const SUPPORT_PROPERTY_REMOVAL_DELAY: Duration = Duration::from_secs(2);

/// A loadable effect.
///
/// The paint hooks must pass on to the rest of the chain, otherwise nothing below the effect gets
/// painted. The defaults do only that.
#[allow(unused_variables)]
pub trait Effect {
    /// Whether the effect takes part in painting the next frame.
    fn is_active(&self) -> bool {
        true
    }

    fn pre_paint_screen(
        &mut self,
        chain: &mut PaintChain<'_>,
        data: &mut ScreenPrePaintData,
        present_time: Duration,
    ) {
        chain.pre_paint_screen(data, present_time);
    }

    fn paint_screen(&mut self, chain: &mut PaintChain<'_>, data: &mut ScreenPaintData) {
        chain.paint_screen(data);
    }

    fn post_paint_screen(&mut self, chain: &mut PaintChain<'_>) {
        chain.post_paint_screen();
    }

    fn pre_paint_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        present_time: Duration,
    ) {
        chain.pre_paint_window(window, data, present_time);
    }

    fn paint_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        chain.paint_window(window, mask, region, data);
    }

    fn draw_window(
        &mut self,
        chain: &mut PaintChain<'_>,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        chain.draw_window(window, mask, region, data);
    }

    fn post_paint_window(&mut self, chain: &mut PaintChain<'_>, window: &EffectWindow) {
        chain.post_paint_window(window);
    }

    fn window_added(&mut self, window: &EffectWindow) {}
    /// Returns whether the effect keeps painting the closed window.
    fn window_closed(&mut self, window: &EffectWindow) -> bool {
        false
    }
    fn window_activated(&mut self, window: Option<&EffectWindow>) {}
    /// Whether the effect still paints the closed window.
    fn references_window(&self, id: WindowId) -> bool {
        false
    }

    fn property_notify(&mut self, window: Option<WindowId>, atom: u32) {}
    fn grabbed_keyboard_event(&mut self, key: u32, pressed: bool) {}
}

pub struct LoadedEffect {
    pub name: String,
    pub chain_position: i32,
    pub effect: Box<dyn Effect>,
    /// Snapshot of `is_active` taken when the frame started.
    pub(crate) painting: bool,
}

#[derive(Debug)]
struct SupportProperty {
    atom: u32,
    /// Effects that announced the property.
    effects: Vec<String>,
}

pub struct Effects {
    clock: Clock,
    loaded: Vec<LoadedEffect>,
    fullscreen_effect: Option<String>,
    keyboard_grab: Option<String>,
    mouse_interception: Vec<String>,
    support_properties: HashMap<String, SupportProperty>,
    /// Atoms effects want property notifications for, with a count of interested effects.
    registered_atoms: HashMap<u32, u32>,
    /// Atoms to delete from the root window once the deadline passes.
    unused_properties: Vec<(u32, Duration)>,
}

/// Effects built in with their default chain positions.
const BUILTIN: [(&str, i32); 2] = [(dim_inactive::NAME, 50), (fade::NAME, 60)];

impl Effects {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            loaded: Vec::new(),
            fullscreen_effect: None,
            keyboard_grab: None,
            mouse_interception: Vec::new(),
            support_properties: HashMap::new(),
            registered_atoms: HashMap::new(),
            unused_properties: Vec::new(),
        }
    }

    /// Clock animations and present times are taken from.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Loads or unloads the built-in effects to match the config.
    pub fn reconfigure(&mut self, config: &EffectsConfig, x11: Option<&mut dyn X11Connection>) {
        for (name, default_position) in BUILTIN {
            let enabled = config.is_enabled(name);
            let position = config
                .find(name)
                .and_then(|c| c.chain_position)
                .unwrap_or(default_position);

            if !enabled {
                self.unload(name, None);
                continue;
            }

            match self.loaded.iter().position(|e| e.name == name) {
                Some(index) if self.loaded[index].chain_position == position => (),
                Some(index) => {
                    let effect = self.loaded.remove(index);
                    self.insert(LoadedEffect {
                        chain_position: position,
                        ..effect
                    });
                }
                None => {
                    let effect: Box<dyn Effect> = match name {
                        fade::NAME => Box::new(fade::Fade::new(self.clock.clone())),
                        _ => Box::new(dim_inactive::DimInactive::new(self.clock.clone())),
                    };
                    self.load(name, position, effect);
                }
            }
        }

        if let Some(x11) = x11 {
            if let Err(err) = self.delete_unused_support_properties(x11) {
                warn!("error deleting support properties: {err}");
            }
        }
    }

    pub fn load(&mut self, name: &str, chain_position: i32, effect: Box<dyn Effect>) {
        if self.is_loaded(name) {
            debug!("effect {name} is already loaded");
            return;
        }
        debug!("loading effect {name} at chain position {chain_position}");
        self.insert(LoadedEffect {
            name: name.to_owned(),
            chain_position,
            effect,
            painting: false,
        });
    }

    fn insert(&mut self, effect: LoadedEffect) {
        let index = self
            .loaded
            .partition_point(|e| e.chain_position <= effect.chain_position);
        self.loaded.insert(index, effect);
    }

    /// Unloads the effect and drops everything it held on to.
    pub fn unload(&mut self, name: &str, x11: Option<&mut dyn X11Connection>) -> bool {
        let Some(index) = self.loaded.iter().position(|e| e.name == name) else {
            return false;
        };
        debug!("unloading effect {name}");
        self.loaded.remove(index);

        if self.fullscreen_effect.as_deref() == Some(name) {
            self.fullscreen_effect = None;
        }
        if self.keyboard_grab.as_deref() == Some(name) {
            self.keyboard_grab = None;
        }
        self.mouse_interception.retain(|e| e != name);

        let properties: Vec<String> = self
            .support_properties
            .iter()
            .filter(|(_, p)| p.effects.iter().any(|e| e == name))
            .map(|(property, _)| property.clone())
            .collect();
        for property in properties {
            self.remove_support_property(name, &property);
        }
        if let Some(x11) = x11 {
            if let Err(err) = self.delete_unused_support_properties(x11) {
                warn!("error deleting support properties: {err}");
            }
        }
        true
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|e| e.name == name)
    }

    /// Names of the loaded effects in chain order.
    pub fn loaded_effects(&self) -> Vec<&str> {
        self.loaded.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn has_active_effects(&self) -> bool {
        self.loaded.iter().any(|e| e.effect.is_active())
    }

    /// Decides which effects paint the coming frame.
    pub fn start_paint(&mut self) {
        for effect in &mut self.loaded {
            effect.painting = effect.effect.is_active();
        }
    }

    fn chain<'a>(&'a mut self, sink: &'a mut dyn FinalPaint) -> PaintChain<'a> {
        PaintChain::new(&mut self.loaded, sink)
    }

    pub fn pre_paint_screen(
        &mut self,
        sink: &mut dyn FinalPaint,
        data: &mut ScreenPrePaintData,
        present_time: Duration,
    ) {
        self.chain(sink).pre_paint_screen(data, present_time);
    }

    pub fn paint_screen(&mut self, sink: &mut dyn FinalPaint, data: &mut ScreenPaintData) {
        self.chain(sink).paint_screen(data);
    }

    pub fn post_paint_screen(&mut self, sink: &mut dyn FinalPaint) {
        self.chain(sink).post_paint_screen();
    }

    pub fn pre_paint_window(
        &mut self,
        sink: &mut dyn FinalPaint,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        present_time: Duration,
    ) {
        self.chain(sink).pre_paint_window(window, data, present_time);
    }

    pub fn paint_window(
        &mut self,
        sink: &mut dyn FinalPaint,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        self.chain(sink).paint_window(window, mask, region, data);
    }

    pub fn draw_window(
        &mut self,
        sink: &mut dyn FinalPaint,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        self.chain(sink).draw_window(window, mask, region, data);
    }

    pub fn post_paint_window(&mut self, sink: &mut dyn FinalPaint, window: &EffectWindow) {
        self.chain(sink).post_paint_window(window);
    }

    pub fn window_added(&mut self, window: &EffectWindow) {
        for effect in &mut self.loaded {
            effect.effect.window_added(window);
        }
    }

    /// Returns whether any effect keeps painting the closed window.
    pub fn window_closed(&mut self, window: &EffectWindow) -> bool {
        let mut referenced = false;
        for effect in &mut self.loaded {
            referenced |= effect.effect.window_closed(window);
        }
        referenced
    }

    pub fn window_activated(&mut self, window: Option<&EffectWindow>) {
        for effect in &mut self.loaded {
            effect.effect.window_activated(window);
        }
    }

    pub fn references_window(&self, id: WindowId) -> bool {
        self.loaded.iter().any(|e| e.effect.references_window(id))
    }

    pub fn active_fullscreen_effect(&self) -> Option<&str> {
        self.fullscreen_effect.as_deref()
    }

    pub fn set_active_fullscreen_effect(&mut self, name: Option<&str>) {
        if self.fullscreen_effect.as_deref() == name {
            return;
        }
        debug!("active fullscreen effect: {name:?}");
        self.fullscreen_effect = name.map(str::to_owned);
    }

    /// Gives the effect all keyboard input. Fails while another effect holds the grab.
    pub fn grab_keyboard(&mut self, name: &str) -> bool {
        if self.keyboard_grab.is_some() || !self.is_loaded(name) {
            return false;
        }
        debug!("effect {name} grabbed the keyboard");
        self.keyboard_grab = Some(name.to_owned());
        true
    }

    pub fn ungrab_keyboard(&mut self) {
        self.keyboard_grab = None;
    }

    pub fn keyboard_grab(&self) -> Option<&str> {
        self.keyboard_grab.as_deref()
    }

    /// Hands a key to the effect grabbing the keyboard. Returns whether it was consumed.
    pub fn grabbed_keyboard_event(&mut self, key: u32, pressed: bool) -> bool {
        let Some(grab) = &self.keyboard_grab else {
            return false;
        };
        match self.loaded.iter_mut().find(|e| &e.name == grab) {
            Some(effect) => {
                effect.effect.grabbed_keyboard_event(key, pressed);
                true
            }
            None => false,
        }
    }

    pub fn start_mouse_interception(&mut self, name: &str) {
        if !self.mouse_interception.iter().any(|e| e == name) {
            self.mouse_interception.push(name.to_owned());
        }
    }

    pub fn stop_mouse_interception(&mut self, name: &str) {
        self.mouse_interception.retain(|e| e != name);
    }

    pub fn is_mouse_intercepted(&self) -> bool {
        !self.mouse_interception.is_empty()
    }

    /// Announces a root window property the effect supports.
    ///
    /// The first announcement interns the atom and puts an empty property on the root window.
    /// Returns the atom.
    pub fn announce_support_property(
        &mut self,
        effect: &str,
        property: &str,
        x11: &mut dyn X11Connection,
    ) -> Result<u32, X11Error> {
        let atom = match self.support_properties.get_mut(property) {
            Some(existing) => {
                if !existing.effects.iter().any(|e| e == effect) {
                    existing.effects.push(effect.to_owned());
                    self.register_property_type(existing.atom, true);
                }
                existing.atom
            }
            None => {
                let atom = x11.intern_atom(property)?;
                let root = x11.root();
                x11.change_property8(root, atom, atom, &[])?;
                debug!("effect {effect} announced {property}");
                self.support_properties.insert(
                    property.to_owned(),
                    SupportProperty {
                        atom,
                        effects: vec![effect.to_owned()],
                    },
                );
                self.register_property_type(atom, true);
                atom
            }
        };
        self.unused_properties.retain(|(a, _)| *a != atom);
        Ok(atom)
    }

    /// Drops the effect's interest in the property; the last one schedules its removal.
    pub fn remove_support_property(&mut self, effect: &str, property: &str) {
        let Some(existing) = self.support_properties.get_mut(property) else {
            return;
        };
        let Some(index) = existing.effects.iter().position(|e| e == effect) else {
            return;
        };
        existing.effects.remove(index);
        let atom = existing.atom;
        self.register_property_type(atom, false);

        if existing.effects.is_empty() {
            self.support_properties.remove(property);
            let deadline = self.clock.now() + SUPPORT_PROPERTY_REMOVAL_DELAY;
            trace!("support property {property} unused, removing at {deadline:?}");
            self.unused_properties.push((atom, deadline));
        }
    }

    fn register_property_type(&mut self, atom: u32, register: bool) {
        if register {
            *self.registered_atoms.entry(atom).or_insert(0) += 1;
        } else if let Some(count) = self.registered_atoms.get_mut(&atom) {
            *count -= 1;
            if *count == 0 {
                self.registered_atoms.remove(&atom);
            }
        }
    }

    pub fn is_property_registered(&self, atom: u32) -> bool {
        self.registered_atoms.contains_key(&atom)
    }

    /// When the next unused support property is due for deletion.
    pub fn next_removal_deadline(&self) -> Option<Duration> {
        self.unused_properties.iter().map(|(_, d)| *d).min()
    }

    /// Deletes the unused support properties whose delay has passed.
    pub fn delete_unused_support_properties(
        &mut self,
        x11: &mut dyn X11Connection,
    ) -> Result<(), X11Error> {
        let now = self.clock.now();
        let root = x11.root();
        let mut rv = Ok(());
        self.unused_properties.retain(|(atom, deadline)| {
            if *deadline > now {
                return true;
            }
            if let Err(err) = x11.delete_property(root, *atom) {
                rv = Err(err);
            }
            false
        });
        rv
    }

    /// Forwards a property change to the effects if any of them registered the atom.
    pub fn property_notify(&mut self, window: Option<WindowId>, atom: u32) {
        if !self.is_property_registered(atom) {
            return;
        }
        for effect in &mut self.loaded {
            effect.effect.property_notify(window, atom);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use smithay::utils::Rectangle;
    use strata_config::EffectConfig;

    use super::*;
    use crate::output::OutputId;
    use crate::x11::RecordingConnection;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Probe {
        name: &'static str,
        log: Log,
        active: bool,
    }

    impl Effect for Probe {
        fn is_active(&self) -> bool {
            self.active
        }

        fn paint_screen(&mut self, chain: &mut PaintChain<'_>, data: &mut ScreenPaintData) {
            self.log.borrow_mut().push(format!("{} before", self.name));
            chain.paint_screen(data);
            self.log.borrow_mut().push(format!("{} after", self.name));
        }

        fn paint_window(
            &mut self,
            chain: &mut PaintChain<'_>,
            window: &EffectWindow,
            mask: PaintMask,
            region: &Region,
            data: &mut WindowPaintData,
        ) {
            data.multiply_opacity(0.5);
            chain.paint_window(window, mask, region, data);
        }

        fn property_notify(&mut self, _window: Option<WindowId>, atom: u32) {
            self.log.borrow_mut().push(format!("{} property {atom}", self.name));
        }
    }

    struct Sink {
        log: Log,
        opacity: Option<f64>,
    }

    impl FinalPaint for Sink {
        fn final_paint_screen(&mut self, _data: &mut ScreenPaintData) {
            self.log.borrow_mut().push(String::from("scene"));
        }

        fn final_paint_window(
            &mut self,
            _window: &EffectWindow,
            _mask: PaintMask,
            _region: &Region,
            data: &mut WindowPaintData,
        ) {
            self.opacity = Some(data.opacity);
        }

        fn final_draw_window(
            &mut self,
            _window: &EffectWindow,
            _mask: PaintMask,
            _region: &Region,
            _data: &mut WindowPaintData,
        ) {
        }
    }

    fn recording_effect(log: &Log, name: &'static str, active: bool) -> Box<dyn Effect> {
        Box::new(Probe {
            name,
            log: log.clone(),
            active,
        })
    }

    fn screen_data() -> ScreenPaintData {
        ScreenPaintData {
            output: OutputId::next(),
            mask: PaintMask::empty(),
            region: Region::new(),
        }
    }

    fn window() -> EffectWindow {
        EffectWindow {
            id: WindowId::next(),
            frame: Rectangle::new((0, 0).into(), (10, 10).into()),
            active: false,
            opacity: 1.,
            desktop: false,
            dock: false,
            special: false,
            minimized: false,
            deleted: false,
        }
    }

    #[test]
    fn chain_runs_in_position_order() {
        let log = Log::default();
        let mut effects = Effects::new(Clock::with_time(Duration::ZERO));
        effects.load("b", 20, recording_effect(&log, "b", true));
        effects.load("a", 10, recording_effect(&log, "a", true));
        effects.load("c", 20, recording_effect(&log, "c", true));
        assert_eq!(effects.loaded_effects(), ["a", "b", "c"]);

        let mut sink = Sink {
            log: log.clone(),
            opacity: None,
        };
        effects.start_paint();
        effects.paint_screen(&mut sink, &mut screen_data());
        assert_eq!(
            *log.borrow(),
            ["a before", "b before", "c before", "scene", "c after", "b after", "a after"]
        );
    }

    #[test]
    fn inactive_effects_are_skipped() {
        let log = Log::default();
        let mut effects = Effects::new(Clock::with_time(Duration::ZERO));
        effects.load("a", 10, recording_effect(&log, "a", false));
        effects.load("b", 20, recording_effect(&log, "b", true));

        let mut sink = Sink {
            log: log.clone(),
            opacity: None,
        };
        effects.start_paint();
        effects.paint_screen(&mut sink, &mut screen_data());
        effects.paint_window(
            &mut sink,
            &window(),
            PaintMask::empty(),
            &Region::new(),
            &mut WindowPaintData::default(),
        );
        assert_eq!(*log.borrow(), ["b before", "scene", "b after"]);
        assert_eq!(sink.opacity, Some(0.5));
    }

    #[test]
    fn empty_chain_reaches_scene() {
        let log = Log::default();
        let mut effects = Effects::new(Clock::with_time(Duration::ZERO));
        let mut sink = Sink {
            log: log.clone(),
            opacity: None,
        };
        effects.start_paint();
        effects.paint_screen(&mut sink, &mut screen_data());
        assert_eq!(*log.borrow(), ["scene"]);
    }

    #[test]
    fn keyboard_grab_is_exclusive() {
        let log = Log::default();
        let mut effects = Effects::new(Clock::with_time(Duration::ZERO));
        effects.load("a", 10, recording_effect(&log, "a", true));
        effects.load("b", 20, recording_effect(&log, "b", true));

        assert!(!effects.grabbed_keyboard_event(30, true));
        assert!(effects.grab_keyboard("a"));
        assert!(!effects.grab_keyboard("b"));
        assert!(effects.grabbed_keyboard_event(30, true));

        effects.set_active_fullscreen_effect(Some("a"));
        effects.start_mouse_interception("a");
        effects.unload("a", None);
        assert_eq!(effects.keyboard_grab(), None);
        assert_eq!(effects.active_fullscreen_effect(), None);
        assert!(!effects.is_mouse_intercepted());
        assert!(effects.grab_keyboard("b"));
    }

    #[test]
    fn support_properties_are_refcounted() {
        let log = Log::default();
        let clock = Clock::with_time(Duration::ZERO);
        let mut effects = Effects::new(clock.clone());
        effects.load("a", 10, recording_effect(&log, "a", true));
        effects.load("b", 20, recording_effect(&log, "b", true));
        let mut x11 = RecordingConnection::new();
        let root = x11.root();

        let atom = effects
            .announce_support_property("a", "_KDE_SLIDE", &mut x11)
            .unwrap();
        let again = effects
            .announce_support_property("b", "_KDE_SLIDE", &mut x11)
            .unwrap();
        assert_eq!(atom, again);
        assert_eq!(x11.property8(root, atom), Some(&[][..]));
        assert!(effects.is_property_registered(atom));

        effects.property_notify(None, atom);
        effects.property_notify(None, atom + 1);
        assert_eq!(
            *log.borrow(),
            [format!("a property {atom}"), format!("b property {atom}")]
        );

        effects.remove_support_property("a", "_KDE_SLIDE");
        assert!(effects.is_property_registered(atom));
        assert_eq!(effects.next_removal_deadline(), None);

        effects.unload("b", Some(&mut x11));
        assert!(!effects.is_property_registered(atom));
        assert_eq!(
            effects.next_removal_deadline(),
            Some(SUPPORT_PROPERTY_REMOVAL_DELAY)
        );
        // Still there until the delay passes.
        assert!(x11.property8(root, atom).is_some());

        clock.advance(Duration::from_secs(1));
        effects.delete_unused_support_properties(&mut x11).unwrap();
        assert!(x11.property8(root, atom).is_some());

        clock.advance(Duration::from_secs(1));
        effects.delete_unused_support_properties(&mut x11).unwrap();
        assert!(x11.property8(root, atom).is_none());
        assert_eq!(effects.next_removal_deadline(), None);
    }

    #[test]
    fn reannouncing_cancels_removal() {
        let log = Log::default();
        let clock = Clock::with_time(Duration::ZERO);
        let mut effects = Effects::new(clock.clone());
        effects.load("a", 10, recording_effect(&log, "a", true));
        let mut x11 = RecordingConnection::new();

        effects
            .announce_support_property("a", "_KDE_SLIDE", &mut x11)
            .unwrap();
        effects.remove_support_property("a", "_KDE_SLIDE");
        assert!(effects.next_removal_deadline().is_some());
        effects
            .announce_support_property("a", "_KDE_SLIDE", &mut x11)
            .unwrap();
        assert_eq!(effects.next_removal_deadline(), None);
    }

    #[test]
    fn builtin_effects_follow_config() {
        let clock = Clock::with_time(Duration::ZERO);
        let mut effects = Effects::new(clock);
        let mut config = EffectsConfig::default();
        effects.reconfigure(&config, None);
        assert_eq!(effects.loaded_effects(), ["dim-inactive", "fade"]);

        config.effects.push(EffectConfig {
            name: String::from("fade"),
            chain_position: Some(10),
            enabled: true,
        });
        config.effects.push(EffectConfig {
            name: String::from("dim-inactive"),
            chain_position: None,
            enabled: false,
        });
        effects.reconfigure(&config, None);
        assert_eq!(effects.loaded_effects(), ["fade"]);
    }
}
