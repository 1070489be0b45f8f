//! Activation and focus stealing prevention.

use std::cmp::Ordering;

use bitflags::bitflags;
use smithay::utils::{Logical, Point};
use strata_config::FocusStealingPrevention as Fsp;

use super::focus_chain::FocusChainChange;
use super::{Workspace, WorkspaceEvent};
use crate::output::OutputId;
use crate::utils::timestamp_compare;
use crate::window::{WindowId, WindowKind};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActivityFlags: u8 {
        const FOCUS = 1 << 0;
        /// Focus even windows that normally don't take it, like docks.
        const FOCUS_FORCE = 1 << 1;
        const RAISE = 1 << 2;
    }
}

impl Workspace {
    pub fn active_window(&self) -> Option<WindowId> {
        self.active_window
    }

    pub fn last_active_window(&self) -> Option<WindowId> {
        self.last_active_window
    }

    /// The window that is active or about to become active.
    pub fn most_recently_activated_window(&self) -> Option<WindowId> {
        self.should_get_focus.last().copied().or(self.active_window)
    }

    /// Windows that were given focus but haven't confirmed it yet, oldest first.
    pub fn should_get_focus(&self) -> &[WindowId] {
        &self.should_get_focus
    }

    pub fn focus_chain(&self) -> &super::focus_chain::FocusChain {
        &self.focus_chain
    }

    pub fn focus_change_enabled(&self) -> bool {
        self.block_focus == 0
    }

    fn fsp_level(&self, id: WindowId) -> Fsp {
        self.window(id).map_or(self.focus_stealing_prevention, |w| {
            w.rules.check_fsp(self.focus_stealing_prevention)
        })
    }

    fn protection(&self, active: Option<WindowId>) -> Fsp {
        active
            .and_then(|a| self.window(a))
            .map_or(Fsp::None, |a| a.rules.check_fpp(Fsp::Medium))
    }

    /// Decides whether the window may become active.
    ///
    /// `time` is the timestamp of the user action that led to the request, the window's user time
    /// when `None`. `focus_in` is set when the request comes from a focus change the window
    /// performed by itself.
    pub fn allow_window_activation(
        &self,
        id: WindowId,
        time: Option<u32>,
        focus_in: bool,
        ignore_desktop: bool,
    ) -> bool {
        let Some(window) = self.window(id) else {
            return false;
        };
        let time = time.or(window.user_time);
        let level = self.fsp_level(id);

        if self.session_saving && level <= Fsp::Medium {
            return true;
        }

        let mut active = self.most_recently_activated_window();
        if focus_in {
            if self.should_get_focus.contains(&id) {
                // We caused this focus change.
                return true;
            }
            // The previously active window already got its focus out.
            active = self.last_active_window;
        }

        if time == Some(0) && window.rules.refuses_focus() {
            trace!("window rule refuses focus for {id:?}");
            return false;
        }

        let protection = self.protection(active);

        if level == Fsp::None || protection == Fsp::None {
            return true;
        }
        if level == Fsp::Extreme || protection == Fsp::Extreme {
            return false;
        }

        let on_current_desktop = window.is_on_desktop(self.current_desktop());
        if !ignore_desktop && !on_current_desktop {
            return false;
        }

        let Some(active) = active.filter(|a| self.window(*a).is_some_and(|w| !w.is_desktop()))
        else {
            debug!("activation: no window active, allowing {id:?}");
            return true;
        };

        if self.belong_to_same_application(id, active, true) && protection < Fsp::High {
            debug!("activation: {id:?} belongs to the active application");
            return true;
        }

        if !on_current_desktop {
            return false;
        }

        if level > Fsp::Medium && protection > Fsp::Low {
            return false;
        }

        let Some(time) = time else {
            debug!("activation: no timestamp for {id:?}");
            return level < Fsp::Medium && protection < Fsp::High;
        };

        let user_time = self.window(active).and_then(|a| a.user_time);
        let allowed = user_time.map_or(true, |u| timestamp_compare(time, u) != Ordering::Less);
        debug!("activation: {id:?} time {time} vs active {user_time:?}: {allowed}");
        allowed
    }

    /// Decides whether the window may be raised above the active one.
    pub fn allow_full_client_raising(&self, id: WindowId, time: u32) -> bool {
        let level = self.fsp_level(id);
        if self.session_saving && level <= Fsp::Medium {
            return true;
        }
        if level == Fsp::None {
            return true;
        }
        if level == Fsp::Extreme {
            return false;
        }

        let active = self
            .most_recently_activated_window()
            .filter(|a| self.window(*a).is_some_and(|w| !w.is_desktop()));
        let Some(active) = active else {
            return true;
        };
        if self.belong_to_same_application(id, active, true) {
            return true;
        }
        if level == Fsp::High {
            return false;
        }
        let user_time = self.window(active).and_then(|a| a.user_time);
        user_time.map_or(true, |u| timestamp_compare(time, u) != Ordering::Less)
    }

    /// Records a user interaction with the window.
    pub fn update_user_time(&mut self, id: WindowId, time: u32) {
        let Some(window) = self.window_mut(id) else {
            return;
        };
        // Zero means "don't activate", it is not a real interaction.
        if time == 0 {
            return;
        }
        let newer = window
            .user_time
            .map_or(true, |t| timestamp_compare(time, t) == Ordering::Greater);
        if newer {
            window.user_time = Some(time);
        }
        if let Some(group) = window.group {
            if let Some(group) = self.group_mut(group) {
                group.update_user_time(time);
            }
        }
    }

    /// Makes the window the active one, switching desktops and unminimizing as needed.
    pub fn activate_window(&mut self, id: Option<WindowId>, force: bool) {
        let Some(id) = id else {
            self.focus_to_null();
            self.set_active_window(None);
            return;
        };
        let Some(window) = self.window(id) else {
            return;
        };
        let desktop = (!window.is_on_desktop(self.current_desktop())).then_some(window.desktop);
        let minimized = window.is_minimized();

        self.raise_window(id, false);
        if let Some(desktop) = desktop {
            self.block_focus += 1;
            self.set_current_desktop(desktop);
            self.block_focus -= 1;
        }
        if minimized {
            self.set_minimized(id, false);
        }
        if let Some(window) = self.window_mut(id) {
            window.hidden = false;
        }
        self.request_focus(id, force);
    }

    pub fn request_focus(&mut self, id: WindowId, force: bool) {
        let mut flags = ActivityFlags::FOCUS;
        if force {
            flags |= ActivityFlags::FOCUS_FORCE;
        }
        self.take_activity(id, flags);
    }

    pub fn take_activity(&mut self, id: WindowId, mut flags: ActivityFlags) {
        if !self.focus_change_enabled() && Some(id) != self.active_window {
            flags.remove(ActivityFlags::FOCUS);
        }

        let mut id = id;
        if flags.contains(ActivityFlags::FOCUS) {
            if let Some(modal) = self.find_modal(id).filter(|m| *m != id) {
                let (desktop, on_all) = match self.window(id) {
                    Some(w) => (w.desktop, w.on_all_desktops),
                    None => return,
                };
                let modal_on_desktop = self
                    .window(modal)
                    .is_some_and(|m| on_all || m.is_on_desktop(desktop));
                if !modal_on_desktop {
                    self.set_window_desktop(modal, (!on_all).then_some(desktop));
                }
                let activate_modal = self
                    .window(modal)
                    .is_some_and(|m| !m.is_shown() && !m.is_minimized());
                if activate_modal {
                    self.activate_window(Some(modal), false);
                }
                if flags.contains(ActivityFlags::RAISE) {
                    self.raise_window(id, false);
                }
                id = modal;
            }
        }

        let Some(window) = self.window(id) else {
            return;
        };
        if !flags.contains(ActivityFlags::FOCUS_FORCE) && (window.is_dock() || window.is_splash())
        {
            flags.remove(ActivityFlags::FOCUS);
        }

        if flags.contains(ActivityFlags::FOCUS) {
            if !window.is_shown() {
                warn!("take_activity: {id:?} is not shown");
                return;
            }
            self.take_focus(id);
        }

        if flags.contains(ActivityFlags::RAISE) {
            self.raise_window(id, false);
        }

        let output = self.window(id).and_then(|w| w.output);
        if output.is_some() && output != self.active_output {
            self.active_output = output;
        }
    }

    fn take_focus(&mut self, id: WindowId) {
        let Some(window) = self.window(id) else {
            return;
        };
        match window.kind {
            WindowKind::X11Managed => {
                if window.can_accept_focus() || window.x11.as_ref().is_some_and(|x| x.take_focus) {
                    // Active once the server reports the focus in.
                    self.should_get_focus.push(id);
                    self.push_event(WorkspaceEvent::TakeFocus(id));
                } else {
                    self.demand_attention(id, false);
                }
            }
            WindowKind::X11Unmanaged | WindowKind::WaylandPopup => (),
            WindowKind::WaylandToplevel | WindowKind::Internal => {
                if window.wants_input {
                    self.push_event(WorkspaceEvent::TakeFocus(id));
                    self.set_active_window(Some(id));
                }
            }
        }
    }

    pub fn focus_to_null(&mut self) {
        self.push_event(WorkspaceEvent::FocusToNull);
    }

    pub fn set_active_window(&mut self, id: Option<WindowId>) {
        if self.active_window == id {
            return;
        }
        debug!("active window: {id:?}");

        self.with_stacking_blocked(|ws| {
            if let Some(old) = ws.active_window.and_then(|o| ws.window_mut(o)) {
                old.active = false;
            }
            ws.active_window = id;

            if let Some(id) = id {
                let Some(window) = ws.windows.get_mut(&id) else {
                    return;
                };
                window.active = true;
                ws.last_active_window = Some(id);
                if let Some(window) = ws.windows.get(&id) {
                    ws.focus_chain
                        .update(window, FocusChainChange::MakeFirst, Some(id));
                    if let Some(output) = window.output {
                        ws.last_active_per_output.insert(output, id);
                        ws.active_output = Some(output);
                    }
                }
                ws.demand_attention(id, false);
            }

            ws.push_event(WorkspaceEvent::ActiveWindowChanged(id));
        });
    }

    /// Sets the active flag of a window, keeping the workspace's active window consistent.
    pub fn set_window_active(&mut self, id: WindowId, active: bool) {
        let Some(window) = self.window(id) else {
            return;
        };
        if window.active == active {
            return;
        }
        if active {
            self.set_active_window(Some(id));
        } else if self.active_window == Some(id) {
            self.set_active_window(None);
        } else if let Some(window) = self.window_mut(id) {
            window.active = false;
        }
    }

    /// Passes focus on after `id` stops being active, e.g. because it was closed or minimized.
    ///
    /// Returns whether `id` was the (upcoming) active window.
    pub fn activate_next_window(
        &mut self,
        id: Option<WindowId>,
        pointer: Option<Point<i32, Logical>>,
    ) -> bool {
        let is_active = id == self.active_window
            || (id.is_some() && self.should_get_focus.last().copied() == id);
        if !is_active {
            return false;
        }

        if let Some(id) = id {
            if Some(id) == self.active_window {
                self.set_active_window(None);
            }
            self.should_get_focus.retain(|w| *w != id);
        }

        if !self.focus_change_enabled() {
            self.focus_to_null();
            return true;
        }

        let desktop = self.current_desktop();
        let output = id
            .and_then(|id| self.window(id))
            .and_then(|w| w.output)
            .or(self.active_output);

        let mut candidate = None;
        if self.showing_desktop {
            candidate = self.find_desktop(desktop, None);
        }

        if candidate.is_none() && self.next_focus_prefers_mouse {
            if let Some(pointer) = pointer {
                candidate = self.window_under(pointer, output).filter(|c| {
                    Some(*c) != id && self.window(*c).is_some_and(|w| !w.is_desktop())
                });
            }
        }

        if candidate.is_none() {
            if let Some(id) = id {
                let leaders = self.main_windows(id);
                if let [leader] = leaders[..] {
                    let usable = self.window(leader).is_some_and(|l| {
                        self.focus_chain.is_usable_focus_candidate(
                            l,
                            self.window(id),
                            self.active_output,
                        )
                    });
                    if usable {
                        candidate = Some(leader);
                        self.raise_window(leader, false);
                    }
                }
            }
        }

        if candidate.is_none() {
            candidate =
                self.focus_chain
                    .next_for_desktop(id, desktop, &self.windows, self.active_output);
        }

        if candidate.is_none() {
            candidate = self.find_desktop(desktop, None);
        }

        match candidate {
            Some(candidate) => self.request_focus(candidate, false),
            None => self.focus_to_null(),
        }
        true
    }

    /// Focuses the window last active on the output, or the best candidate there.
    pub fn focus_output(&mut self, output: OutputId) {
        self.active_output = Some(output);
        let active_here = self
            .active_window
            .and_then(|a| self.window(a))
            .is_some_and(|w| w.output == Some(output));
        if active_here {
            return;
        }

        let desktop = self.current_desktop();
        let remembered = self.last_active_per_output.get(&output).copied().filter(|id| {
            self.window(*id).is_some_and(|w| {
                w.is_shown() && w.is_on_desktop(desktop) && w.output == Some(output)
            })
        });
        let candidate = remembered
            .or_else(|| {
                self.focus_chain
                    .get_for_activation(desktop, Some(output), &self.windows)
                    .filter(|c| self.window(*c).is_some_and(|w| w.output == Some(output)))
            })
            .or_else(|| self.find_desktop(desktop, Some(output)));
        if let Some(candidate) = candidate {
            self.request_focus(candidate, false);
        }
    }

    /// Drops the window and everything queued before it from the should-get-focus queue.
    pub fn got_focus_in(&mut self, id: WindowId) {
        if let Some(index) = self.should_get_focus.iter().position(|w| *w == id) {
            self.should_get_focus.drain(..=index);
        }
    }

    /// Handles an X11 window reporting that it received focus.
    pub fn handle_focus_in(&mut self, id: WindowId) {
        let Some(window) = self.window(id) else {
            return;
        };
        if window.states.shaded
            || !window.is_shown()
            || !window.is_on_desktop(self.current_desktop())
        {
            return;
        }
        let activate = self.allow_window_activation(id, None, true, false);
        self.got_focus_in(id);
        if activate {
            self.set_window_active(id, true);
        } else if self.restore_focus() {
            self.demand_attention(id, true);
        } else {
            warn!("failed to restore focus, activating {id:?}");
            self.set_window_active(id, true);
        }
    }

    /// Gives focus back to the window that should have it after a refused focus change.
    ///
    /// Returns `false` when there is no window to give it to.
    pub fn restore_focus(&mut self) -> bool {
        let target = self
            .should_get_focus
            .last()
            .copied()
            .or(self.last_active_window);
        let Some(target) = target.filter(|t| self.window(*t).is_some()) else {
            return false;
        };
        self.request_focus(target, false);
        true
    }

    pub fn demand_attention(&mut self, id: WindowId, set: bool) {
        let is_active = self.active_window == Some(id);
        let Some(window) = self.window_mut(id) else {
            return;
        };
        let set = set && !is_active;
        if window.states.demands_attention == set {
            return;
        }
        window.states.demands_attention = set;
        self.push_event(WorkspaceEvent::DemandsAttentionChanged(id, set));
    }

    /// Decides about activating a window that was just mapped.
    ///
    /// A window that may not take focus is stacked below the active one and demands attention
    /// instead.
    pub fn activate_mapped_window(&mut self, id: WindowId) -> bool {
        let Some(window) = self.window(id) else {
            return false;
        };
        let special = window.is_special_window();
        let wants_tab_focus = window.wants_tab_focus();
        let desktop = window.desktop;
        let on_all = window.on_all_desktops;

        let allow = self.allow_window_activation(id, None, false, false);

        if !on_all
            && desktop != self.current_desktop()
            && (allow || self.session_saving)
        {
            self.set_current_desktop(desktop);
        }
        let on_current = on_all || desktop == self.current_desktop();

        if on_current && !allow {
            self.restack_window_under_active(id);
        }

        if allow && on_current {
            if !special && wants_tab_focus {
                self.request_focus(id, false);
                return true;
            }
        } else if !special {
            self.demand_attention(id, true);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Rectangle;
    use strata_config::Config;

    use super::*;
    use crate::display::ClientId;
    use crate::window::{Window, WindowType};
    use crate::workspace::tests::{toplevel, with_type, workspace};

    fn active_with_time(ws: &mut Workspace, time: u32) -> WindowId {
        let a = toplevel(ws);
        ws.window_mut(a).unwrap().client = Some(ClientId::next());
        ws.update_user_time(a, time);
        ws.activate_window(Some(a), false);
        assert_eq!(ws.active_window(), Some(a));
        a
    }

    #[test]
    fn background_window_is_refused() {
        let mut ws = workspace();
        let a = active_with_time(&mut ws, 1000);

        let mut b = Window::new(WindowKind::WaylandToplevel);
        b.ready_for_painting = true;
        b.client = Some(ClientId::next());
        b.user_time = Some(500);
        let b = ws.add_window(b);

        assert!(!ws.allow_window_activation(b, Some(500), false, false));
        assert!(!ws.activate_mapped_window(b));
        assert!(ws.window(b).unwrap().states.demands_attention);
        assert_eq!(ws.active_window(), Some(a));
        // Stacked right below the active window.
        assert_eq!(ws.stacking_order(), &[b, a]);
    }

    #[test]
    fn newer_user_time_is_allowed() {
        let mut ws = workspace();
        active_with_time(&mut ws, 1000);

        let b = toplevel(&mut ws);
        ws.window_mut(b).unwrap().client = Some(ClientId::next());
        ws.window_mut(b).unwrap().user_time = Some(1500);
        assert!(ws.activate_mapped_window(b));
        assert_eq!(ws.active_window(), Some(b));
    }

    #[test]
    fn same_application_is_allowed() {
        let mut ws = workspace();
        let a = active_with_time(&mut ws, 1000);
        ws.window_mut(a).unwrap().desktop_file_name = "org.example.Editor".into();

        let mut b = Window::new(WindowKind::WaylandToplevel);
        b.ready_for_painting = true;
        b.client = Some(ClientId::next());
        b.desktop_file_name = "org.example.Editor".into();
        b.user_time = Some(0);
        let b = ws.add_window(b);

        assert!(ws.belong_to_same_application(a, b, true));
        assert!(ws.allow_window_activation(b, None, false, false));
    }

    #[test]
    fn extreme_level_refuses_everything() {
        let mut config = Config::default();
        config.focus.focus_stealing_prevention = Fsp::Extreme;
        let mut ws = Workspace::new(&config);
        let a = toplevel(&mut ws);
        ws.activate_window(Some(a), false);
        let b = toplevel(&mut ws);
        assert!(!ws.allow_window_activation(b, Some(u32::MAX), false, false));

        ws.session_saving = true;
        assert!(!ws.allow_window_activation(b, Some(u32::MAX), false, false));
    }

    #[test]
    fn no_level_allows_everything() {
        let mut config = Config::default();
        config.focus.focus_stealing_prevention = Fsp::None;
        let mut ws = Workspace::new(&config);
        active_with_time(&mut ws, 1000);
        let b = toplevel(&mut ws);
        assert!(ws.allow_window_activation(b, Some(1), false, false));
    }

    #[test]
    fn desktop_as_active_allows() {
        let mut ws = workspace();
        let desktop = with_type(&mut ws, WindowType::Desktop);
        ws.set_active_window(Some(desktop));
        let b = toplevel(&mut ws);
        assert!(ws.allow_window_activation(b, Some(1), false, false));
    }

    #[test]
    fn full_client_raising() {
        let mut ws = workspace();
        let a = active_with_time(&mut ws, 1000);
        let b = toplevel(&mut ws);
        ws.window_mut(b).unwrap().client = Some(ClientId::next());

        assert!(!ws.allow_full_client_raising(b, 999));
        assert!(ws.allow_full_client_raising(b, 1000));
        assert!(ws.allow_full_client_raising(a, 0));

        ws.session_saving = true;
        assert!(ws.allow_full_client_raising(b, 0));
    }

    #[test]
    fn closing_active_focuses_next_in_chain() {
        let mut ws = workspace();
        let a = toplevel(&mut ws);
        let b = toplevel(&mut ws);
        let c = toplevel(&mut ws);
        ws.activate_window(Some(a), false);
        ws.activate_window(Some(b), false);
        ws.activate_window(Some(c), false);

        ws.remove_window(c);
        assert_eq!(ws.active_window(), Some(b));

        ws.set_minimized(b, true);
        assert_eq!(ws.active_window(), Some(a));
    }

    #[test]
    fn closing_transient_focuses_its_parent() {
        let mut ws = workspace();
        let parent = toplevel(&mut ws);
        let other = toplevel(&mut ws);
        let dialog = toplevel(&mut ws);
        ws.set_transient_for(dialog, Some(parent));
        ws.activate_window(Some(parent), false);
        ws.activate_window(Some(other), false);
        ws.activate_window(Some(dialog), false);

        ws.remove_window(dialog);
        assert_eq!(ws.active_window(), Some(parent));
    }

    #[test]
    fn x11_focus_waits_for_focus_in() {
        let mut ws = workspace();
        let mut window = Window::new(WindowKind::X11Managed);
        window.ready_for_painting = true;
        window.set_frame_geometry(Rectangle::new((0, 0).into(), (10, 10).into()));
        let x = ws.add_window(window);

        ws.request_focus(x, false);
        assert_eq!(ws.active_window(), None);
        assert_eq!(ws.should_get_focus(), &[x]);
        assert_eq!(ws.most_recently_activated_window(), Some(x));
        assert!(ws.take_events().contains(&WorkspaceEvent::TakeFocus(x)));

        ws.handle_focus_in(x);
        assert_eq!(ws.active_window(), Some(x));
        assert!(ws.should_get_focus().is_empty());
    }

    fn x11_window(ws: &mut Workspace) -> WindowId {
        let mut window = Window::new(WindowKind::X11Managed);
        window.ready_for_painting = true;
        window.set_frame_geometry(Rectangle::new((0, 0).into(), (10, 10).into()));
        ws.add_window(window)
    }

    #[test]
    fn refused_focus_in_goes_back_to_last_active() {
        let mut config = Config::default();
        config.focus.focus_stealing_prevention = Fsp::Extreme;
        let mut ws = Workspace::new(&config);
        let a = toplevel(&mut ws);
        ws.activate_window(Some(a), false);
        let x = x11_window(&mut ws);

        ws.handle_focus_in(x);
        assert_eq!(ws.active_window(), Some(a));
        assert!(ws.window(x).unwrap().states.demands_attention);
    }

    #[test]
    fn refused_focus_in_without_anything_to_restore_activates() {
        let mut config = Config::default();
        config.focus.focus_stealing_prevention = Fsp::Extreme;
        let mut ws = Workspace::new(&config);
        let x = x11_window(&mut ws);

        assert!(!ws.restore_focus());
        ws.handle_focus_in(x);
        assert_eq!(ws.active_window(), Some(x));
        assert!(!ws.window(x).unwrap().states.demands_attention);
    }

    #[test]
    fn got_focus_in_drops_older_requests() {
        let mut ws = workspace();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut window = Window::new(WindowKind::X11Managed);
            window.ready_for_painting = true;
            ids.push(ws.add_window(window));
        }
        for id in &ids {
            ws.request_focus(*id, false);
        }
        ws.got_focus_in(ids[1]);
        assert_eq!(ws.should_get_focus(), &[ids[2]]);
    }

    #[test]
    fn modal_takes_focus_instead() {
        let mut ws = workspace();
        let parent = toplevel(&mut ws);
        let modal = toplevel(&mut ws);
        ws.set_transient_for(modal, Some(parent));
        ws.window_mut(modal).unwrap().states.modal = true;

        ws.request_focus(parent, false);
        assert_eq!(ws.active_window(), Some(modal));
    }

    #[test]
    fn docks_only_take_forced_focus() {
        let mut ws = workspace();
        let dock = with_type(&mut ws, WindowType::Dock);
        ws.request_focus(dock, false);
        assert_eq!(ws.active_window(), None);
        ws.request_focus(dock, true);
        assert_eq!(ws.active_window(), Some(dock));
    }
}
