//! Window management policy.
//!
//! The workspace owns every live window together with the state that relates windows to each
//! other: stacking order, focus chain, activation, groups and virtual desktops. It doesn't talk to
//! clients directly; side effects that need the display or the X11 connection are queued as
//! [`WorkspaceEvent`]s and carried out by the caller.

use std::collections::HashMap;

use smithay::utils::{Logical, Point, Rectangle};
use strata_config::{Config, FocusStealingPrevention};

use crate::output::{OutputId, Outputs};
use crate::window::deleted::Deleted;
use crate::window::group::{Group, GroupId};
use crate::window::{Layer, Window, WindowId, WindowKind};

pub mod activation;
pub mod areas;
pub mod focus_chain;
pub mod placement;
pub mod stacking;

use self::areas::Areas;
use self::focus_chain::{FocusChain, FocusChainChange};
use self::stacking::{Constraint, X11Propagation};

/// Something the workspace wants done outside of itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    StackingOrderChanged,
    ActiveWindowChanged(Option<WindowId>),
    /// Give the window input focus. X11 windows become active once the server confirms the focus.
    TakeFocus(WindowId),
    /// Nothing has focus anymore.
    FocusToNull,
    DemandsAttentionChanged(WindowId, bool),
    CurrentDesktopChanged(u32),
    WorkAreaChanged,
}

pub struct Workspace {
    windows: HashMap<WindowId, Window>,
    /// Managed X11 windows in the order they were mapped.
    mapping_order: Vec<WindowId>,
    deleted: HashMap<WindowId, Deleted>,
    groups: HashMap<GroupId, Group>,

    pub(crate) unconstrained: Vec<WindowId>,
    pub(crate) stacking_order: Vec<WindowId>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) block_stacking_updates: u32,
    pub(crate) blocked_propagate: bool,
    pub(crate) force_restacking: bool,
    pub(crate) most_recently_raised: Option<WindowId>,
    /// `_NET_SUPPORTING_WM_CHECK` window, bottom of the X11 restack list.
    pub support_window: Option<u32>,
    /// Input-only windows reserving the screen edges.
    pub screen_edge_windows: Vec<u32>,
    pub(crate) propagation: Option<X11Propagation>,

    pub(crate) focus_chain: FocusChain,
    pub(crate) active_window: Option<WindowId>,
    pub(crate) last_active_window: Option<WindowId>,
    pub(crate) should_get_focus: Vec<WindowId>,
    pub(crate) last_active_per_output: HashMap<OutputId, WindowId>,
    pub(crate) block_focus: u32,
    pub(crate) active_output: Option<OutputId>,
    pub(crate) showing_desktop: bool,
    pub(crate) screen_locked: bool,

    current_desktop: u32,
    desktop_count: u32,

    /// Whether the session is being saved; relaxes focus stealing prevention.
    pub session_saving: bool,
    pub(crate) focus_stealing_prevention: FocusStealingPrevention,
    pub(crate) separate_screen_focus: bool,
    pub(crate) next_focus_prefers_mouse: bool,

    pub(crate) areas: Areas,
    events: Vec<WorkspaceEvent>,
}

impl Workspace {
    pub fn new(config: &Config) -> Self {
        let desktop_count = config.virtual_desktops.count.max(1);
        Self {
            windows: HashMap::new(),
            mapping_order: Vec::new(),
            deleted: HashMap::new(),
            groups: HashMap::new(),
            unconstrained: Vec::new(),
            stacking_order: Vec::new(),
            constraints: Vec::new(),
            block_stacking_updates: 0,
            blocked_propagate: false,
            force_restacking: false,
            most_recently_raised: None,
            support_window: None,
            screen_edge_windows: Vec::new(),
            propagation: None,
            focus_chain: FocusChain::new(desktop_count, config.focus.separate_screen_focus),
            active_window: None,
            last_active_window: None,
            should_get_focus: Vec::new(),
            last_active_per_output: HashMap::new(),
            block_focus: 0,
            active_output: None,
            showing_desktop: false,
            screen_locked: false,
            current_desktop: 1,
            desktop_count,
            session_saving: false,
            focus_stealing_prevention: config.focus.focus_stealing_prevention,
            separate_screen_focus: config.focus.separate_screen_focus,
            next_focus_prefers_mouse: config.focus.next_focus_prefers_mouse,
            areas: Areas::default(),
            events: Vec::new(),
        }
    }

    pub fn reload_config(&mut self, config: &Config) {
        self.focus_stealing_prevention = config.focus.focus_stealing_prevention;
        self.separate_screen_focus = config.focus.separate_screen_focus;
        self.next_focus_prefers_mouse = config.focus.next_focus_prefers_mouse;
        self.focus_chain
            .set_separate_screen_focus(config.focus.separate_screen_focus);
        self.set_desktop_count(config.virtual_desktops.count);
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    pub fn windows(&self) -> impl Iterator<Item = &Window> + '_ {
        self.windows.values()
    }

    pub fn windows_mut(&mut self) -> impl Iterator<Item = &mut Window> + '_ {
        self.windows.values_mut()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    pub fn find_window(&self, mut f: impl FnMut(&Window) -> bool) -> Option<WindowId> {
        self.windows.values().find(|w| f(w)).map(|w| w.id)
    }

    pub fn mapping_order(&self) -> &[WindowId] {
        &self.mapping_order
    }

    pub fn deleted(&self, id: WindowId) -> Option<&Deleted> {
        self.deleted.get(&id)
    }

    pub fn deleted_mut(&mut self, id: WindowId) -> Option<&mut Deleted> {
        self.deleted.get_mut(&id)
    }

    /// Drops one reference to a deleted window, forgetting it after the last one.
    pub fn unref_deleted(&mut self, id: WindowId) -> Option<Deleted> {
        let deleted = self.deleted.get_mut(&id)?;
        if deleted.unref() {
            self.deleted.remove(&id)
        } else {
            None
        }
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// Finds or creates the group of X11 windows with the given client leader.
    pub fn group_for_leader(&mut self, leader: u32) -> GroupId {
        if let Some(group) = self.groups.values().find(|g| g.leader == leader) {
            return group.id;
        }
        let group = Group::new(leader);
        let id = group.id;
        self.groups.insert(id, group);
        id
    }

    pub fn take_events(&mut self) -> Vec<WorkspaceEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn push_event(&mut self, event: WorkspaceEvent) {
        self.events.push(event);
    }

    /// Starts managing a window.
    ///
    /// The window goes on top of the unconstrained stacking order. Transient relations and group
    /// membership already set on the window are registered.
    pub fn add_window(&mut self, window: Window) -> WindowId {
        let id = window.id;
        debug!("adding window {id:?} ({:?}, {:?})", window.kind, window.window_type);

        let kind = window.kind;
        let transient_for = window.transient_for;
        let group = window.group;
        let has_struts = !window.struts.is_empty();
        self.windows.insert(id, window);

        if kind == WindowKind::X11Managed {
            self.mapping_order.push(id);
        }
        if let Some(group) = group.and_then(|g| self.groups.get_mut(&g)) {
            group.add_member(id);
        }
        if let Some(parent) = transient_for {
            if let Some(window) = self.windows.get_mut(&id) {
                window.transient_for = None;
            }
            self.set_transient_for(id, Some(parent));
        }

        self.unconstrained.push(id);
        if let Some(window) = self.windows.get(&id) {
            self.focus_chain
                .update(window, FocusChainChange::Update, self.active_window);
        }
        if has_struts {
            self.update_work_area();
        }
        self.update_stacking_order(kind == WindowKind::X11Managed);
        id
    }

    /// Stops managing a window, leaving a [`Deleted`] record behind.
    pub fn remove_window(&mut self, id: WindowId) -> Option<Window> {
        let window = self.windows.get(&id)?;
        debug!("removing window {id:?}");
        let transient_for = window.transient_for;
        let transients = window.transients.clone();
        let group = window.group;
        let kind = window.kind;
        let had_struts = !window.struts.is_empty();
        let was_active = self.active_window == Some(id)
            || self.should_get_focus.last() == Some(&id);

        if was_active {
            self.activate_next_window(Some(id), None);
        }

        // Transients of a closed window become standalone.
        for transient in transients {
            self.set_transient_for(transient, None);
        }
        if transient_for.is_some() {
            self.set_transient_for(id, None);
        }

        if let Some(g) = group {
            if let Some(group) = self.groups.get_mut(&g) {
                group.remove_member(id);
                if group.is_empty() {
                    self.groups.remove(&g);
                }
            }
        }

        self.focus_chain.remove(id);
        self.should_get_focus.retain(|w| *w != id);
        self.last_active_per_output.retain(|_, w| *w != id);
        if self.last_active_window == Some(id) {
            self.last_active_window = None;
        }
        if self.most_recently_raised == Some(id) {
            self.most_recently_raised = None;
        }
        if self.active_window == Some(id) {
            self.active_window = None;
            self.push_event(WorkspaceEvent::ActiveWindowChanged(None));
        }

        self.unconstrained.retain(|w| *w != id);
        self.constraints
            .retain(|c| c.below != id && c.above != id);
        self.mapping_order.retain(|w| *w != id);

        let window = self.windows.remove(&id)?;
        self.deleted.insert(id, Deleted::new(&window));

        if had_struts {
            self.update_work_area();
        }
        self.update_stacking_order(kind == WindowKind::X11Managed);
        Some(window)
    }

    /// Changes the window's transient parent, keeping both sides and the stacking constraint in
    /// sync.
    pub fn set_transient_for(&mut self, id: WindowId, parent: Option<WindowId>) {
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        let old = window.transient_for;
        if old == parent {
            return;
        }
        if parent == Some(id) || parent.is_some_and(|p| self.is_transient_ancestor(id, p)) {
            warn!("refusing transient loop between {id:?} and {parent:?}");
            return;
        }
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        window.transient_for = parent;

        if let Some(old) = old {
            if let Some(old_parent) = self.windows.get_mut(&old) {
                old_parent.transients.retain(|w| *w != id);
            }
            self.unconstrain(old, id);
        }
        if let Some(parent) = parent {
            if let Some(new_parent) = self.windows.get_mut(&parent) {
                if !new_parent.transients.contains(&id) {
                    new_parent.transients.push(id);
                }
            }
            self.constrain(parent, id);
        }
        self.update_stacking_order(false);
    }

    /// Whether `ancestor` is reachable from `id` going down through transients.
    fn is_transient_ancestor(&self, ancestor: WindowId, id: WindowId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.windows.get(&c).and_then(|w| w.transient_for);
        }
        false
    }

    /// Windows the given one is transient for, nearest first.
    pub fn main_windows(&self, id: WindowId) -> Vec<WindowId> {
        let mut result = Vec::new();
        let mut current = self.windows.get(&id).and_then(|w| w.transient_for);
        while let Some(c) = current {
            if result.contains(&c) {
                break;
            }
            result.push(c);
            current = self.windows.get(&c).and_then(|w| w.transient_for);
        }
        result
    }

    /// Whether `transient` is (possibly indirectly) a transient of `id`.
    pub fn has_transient(&self, id: WindowId, transient: WindowId) -> bool {
        self.main_windows(transient).contains(&id)
    }

    /// Finds a modal transient blocking the window.
    pub fn find_modal(&self, id: WindowId) -> Option<WindowId> {
        let window = self.windows.get(&id)?;
        for transient in &window.transients {
            let Some(t) = self.windows.get(transient) else {
                continue;
            };
            if let Some(modal) = self.find_modal(t.id) {
                return Some(modal);
            }
            if t.states.modal {
                return Some(t.id);
            }
        }
        None
    }

    /// Whether two windows are considered parts of the same application.
    ///
    /// With `allow_cross_process` windows of different processes match when they share a desktop
    /// file name.
    pub fn belong_to_same_application(
        &self,
        a: WindowId,
        b: WindowId,
        allow_cross_process: bool,
    ) -> bool {
        if a == b {
            return true;
        }
        let (Some(wa), Some(wb)) = (self.windows.get(&a), self.windows.get(&b)) else {
            return false;
        };

        if self.has_transient(a, b) || self.has_transient(b, a) {
            return true;
        }

        if allow_cross_process
            && !wa.desktop_file_name.is_empty()
            && wa.desktop_file_name == wb.desktop_file_name
        {
            return true;
        }

        if wa.is_x11() && wb.is_x11() {
            if wa.group.is_some() && wa.group == wb.group {
                return true;
            }
            let (Some(xa), Some(xb)) = (&wa.x11, &wb.x11) else {
                return false;
            };
            if (xa.leader == xb.window && xb.leader == xb.window)
                || (xb.leader == xa.window && xa.leader == xa.window)
            {
                return true;
            }
            if wa.pid != wb.pid && !allow_cross_process {
                return false;
            }
            if xa.leader != xb.leader && xa.leader != xa.window && xb.leader != xb.window {
                return false;
            }
            if wa.app_id != wb.app_id {
                return false;
            }
            // Old clients without _NET_WM_PID are considered different.
            return wa.pid.is_some_and(|p| p != 0) && wb.pid.is_some_and(|p| p != 0);
        }

        wa.client.is_some() && wa.client == wb.client
    }

    pub fn current_desktop(&self) -> u32 {
        self.current_desktop
    }

    pub fn desktop_count(&self) -> u32 {
        self.desktop_count
    }

    pub fn set_desktop_count(&mut self, count: u32) {
        let count = count.max(1);
        if count == self.desktop_count {
            return;
        }
        self.desktop_count = count;
        self.focus_chain.set_desktop_count(count);

        // Windows on removed desktops move to the last one.
        let mut moved = Vec::new();
        for window in self.windows.values_mut() {
            if window.desktop > count {
                window.desktop = count;
                moved.push(window.id);
            }
        }
        for id in moved {
            if let Some(window) = self.windows.get(&id) {
                self.focus_chain
                    .update(window, FocusChainChange::Update, self.active_window);
            }
        }
        if self.current_desktop > count {
            self.set_current_desktop(count);
        }
        self.update_work_area();
    }

    pub fn set_current_desktop(&mut self, desktop: u32) -> bool {
        if desktop == 0 || desktop > self.desktop_count || desktop == self.current_desktop {
            return false;
        }
        debug!("switching to desktop {desktop}");
        self.current_desktop = desktop;
        self.focus_chain.set_current_desktop(desktop);

        self.block_focus += 1;
        for window in self.windows.values_mut() {
            if !window.is_client() {
                continue;
            }
            window.hidden = !window.is_on_desktop(desktop);
        }
        self.block_focus -= 1;

        self.push_event(WorkspaceEvent::CurrentDesktopChanged(desktop));

        // The active window may have gone away with its desktop.
        let active_visible = self
            .active_window
            .and_then(|a| self.windows.get(&a))
            .is_some_and(|w| w.is_on_desktop(desktop));
        if !active_visible {
            let output = self.active_output;
            let candidate = self
                .focus_chain
                .get_for_activation(desktop, output, &self.windows)
                .or_else(|| self.find_desktop(desktop, output));
            match candidate {
                Some(c) => self.request_focus(c, false),
                None => self.focus_to_null(),
            }
        }
        self.update_stacking_order(false);
        true
    }

    /// Moves a window to a desktop, or to all of them.
    pub fn set_window_desktop(&mut self, id: WindowId, desktop: Option<u32>) {
        let current = self.current_desktop;
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        match desktop {
            None => window.on_all_desktops = true,
            Some(d) => {
                window.on_all_desktops = false;
                window.desktop = d.clamp(1, self.desktop_count);
            }
        }
        if window.is_client() {
            window.hidden = !window.is_on_desktop(current);
        }
        let hidden = window.hidden;
        if let Some(window) = self.windows.get(&id) {
            self.focus_chain
                .update(window, FocusChainChange::Update, self.active_window);
        }
        if hidden && self.active_window == Some(id) {
            self.activate_next_window(Some(id), None);
        }
        self.update_stacking_order(false);
    }

    pub fn showing_desktop(&self) -> bool {
        self.showing_desktop
    }

    pub fn set_showing_desktop(&mut self, showing: bool) {
        if self.showing_desktop == showing {
            return;
        }
        self.showing_desktop = showing;
        self.with_stacking_blocked(|ws| {
            if showing {
                let desktop = ws.current_desktop;
                if let Some(d) = ws.find_desktop(desktop, ws.active_output) {
                    ws.request_focus(d, false);
                }
            }
        });
    }

    pub fn screen_locked(&self) -> bool {
        self.screen_locked
    }

    /// Only lock screen overlays stay visible while the screen is locked; they go above
    /// everything else.
    pub fn set_screen_locked(&mut self, locked: bool) {
        if self.screen_locked == locked {
            return;
        }
        debug!("screen locked: {locked}");
        self.screen_locked = locked;
        self.update_stacking_order(false);
    }

    pub fn active_output(&self) -> Option<OutputId> {
        self.active_output
    }

    pub fn set_active_output(&mut self, output: Option<OutputId>) {
        self.active_output = output;
    }

    /// Topmost desktop window on the given desktop, optionally restricted to an output.
    pub fn find_desktop(&self, desktop: u32, output: Option<OutputId>) -> Option<WindowId> {
        self.stacking_order.iter().rev().copied().find(|id| {
            self.windows.get(id).is_some_and(|w| {
                w.is_desktop()
                    && w.is_on_desktop(desktop)
                    && w.is_shown()
                    && (output.is_none() || w.output == output)
            })
        })
    }

    /// Topmost shown client window containing the point.
    pub fn window_under(
        &self,
        point: Point<i32, Logical>,
        output: Option<OutputId>,
    ) -> Option<WindowId> {
        self.stacking_order.iter().rev().copied().find(|id| {
            self.windows.get(id).is_some_and(|w| {
                w.is_client()
                    && w.is_shown()
                    && w.is_on_desktop(self.current_desktop)
                    && (output.is_none() || w.output == output)
                    && w.frame_geometry().contains(point)
            })
        })
    }

    /// Recomputes the output each window belongs to from the center of its frame.
    pub fn update_window_outputs(&mut self, outputs: &Outputs) {
        for window in self.windows.values_mut() {
            let frame = window.frame_geometry();
            window.output = outputs.output_for_rect(frame).or(window.output);
        }
    }

    /// Refreshes the focus chain entries of a window after its state changed.
    pub fn update_focus_chain(&mut self, id: WindowId, change: FocusChainChange) {
        if let Some(window) = self.windows.get(&id) {
            self.focus_chain.update(window, change, self.active_window);
        }
    }

    /// Layer of a window computed from its current state, ignoring the cached value.
    pub fn window_layer(&self, id: WindowId) -> Layer {
        self.compute_layer(id)
    }

    /// Every managed window's frame, for placement decisions.
    pub(crate) fn client_frames(&self) -> Vec<(WindowId, Rectangle<i32, Logical>)> {
        self.windows
            .values()
            .filter(|w| w.is_client() && w.is_shown())
            .map(|w| (w.id, w.frame_geometry()))
            .collect()
    }
}
