//! Stacking order.
//!
//! Windows are kept in an unconstrained order that raise and lower operations edit. The real
//! stacking order is derived from it by sorting windows into layers and then applying the
//! transient constraints, so that a transient always stays above the window it belongs to.

use std::cmp::Reverse;
use std::collections::VecDeque;

use super::{Workspace, WorkspaceEvent};
use crate::window::xdg::{PanelBehavior, PlasmaRole};
use crate::window::{Layer, Window, WindowId, WindowKind, WindowType};

/// `above` must be stacked above `below`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraint {
    pub below: WindowId,
    pub above: WindowId,
}

/// X11 root window state that has to follow a stacking change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct X11Propagation {
    /// Windows to restack, top to bottom.
    pub restack: Vec<u32>,
    /// New `_NET_CLIENT_LIST`, in mapping order, when the set of windows changed.
    pub client_list: Option<Vec<u32>>,
    /// New `_NET_CLIENT_LIST_STACKING`, bottom to top.
    pub client_list_stacking: Vec<u32>,
}

impl Workspace {
    /// Final stacking order, bottom to top.
    pub fn stacking_order(&self) -> &[WindowId] {
        &self.stacking_order
    }

    pub fn unconstrained_stacking_order(&self) -> &[WindowId] {
        &self.unconstrained
    }

    pub fn most_recently_raised(&self) -> Option<WindowId> {
        self.most_recently_raised
    }

    pub fn take_x11_propagation(&mut self) -> Option<X11Propagation> {
        self.propagation.take()
    }

    /// Layer a window belongs to by its own properties.
    pub fn belongs_to_layer(&self, window: &Window) -> Layer {
        if window.kind == WindowKind::X11Unmanaged {
            return Layer::Unmanaged;
        }
        if window.lockscreen_overlay && self.screen_locked {
            return Layer::Unmanaged;
        }
        if window.is_desktop() {
            return if self.showing_desktop {
                Layer::Above
            } else {
                Layer::Desktop
            };
        }
        if window.is_splash() {
            return Layer::Normal;
        }
        if window.is_dock() || window.window_type == WindowType::AppletPopup {
            if self.showing_desktop {
                return Layer::Notification;
            }
            let panel = window
                .wayland
                .as_ref()
                .filter(|w| w.plasma_role == Some(PlasmaRole::Panel));
            if let Some(panel) = panel {
                return match panel.panel_behavior {
                    PanelBehavior::WindowsCanCover => Layer::Normal,
                    PanelBehavior::AutoHide | PanelBehavior::WindowsGoBelow => Layer::Above,
                    PanelBehavior::AlwaysVisible => Layer::Dock,
                };
            }
            // Keep-below docks can be covered by normal windows, but only by sharing their layer.
            return if window.keep_below() {
                Layer::Normal
            } else if window.keep_above() {
                Layer::Above
            } else {
                Layer::Dock
            };
        }
        if window.is_popup_window() {
            return Layer::Popup;
        }
        match window.window_type {
            WindowType::OnScreenDisplay => return Layer::OnScreenDisplay,
            WindowType::Notification => return Layer::Notification,
            WindowType::CriticalNotification => return Layer::CriticalNotification,
            _ => (),
        }
        if self.showing_desktop && self.belongs_to_desktop(window) {
            return Layer::Above;
        }
        if window.keep_below() {
            return Layer::Below;
        }
        if self.is_active_fullscreen(window) {
            return Layer::Active;
        }
        if window.keep_above() {
            return Layer::Above;
        }
        Layer::Normal
    }

    fn belongs_to_desktop(&self, window: &Window) -> bool {
        self.main_windows(window.id)
            .iter()
            .filter_map(|id| self.window(*id))
            .any(Window::is_desktop)
    }

    /// Whether the window is fullscreen and should cover docks.
    pub fn is_active_fullscreen(&self, window: &Window) -> bool {
        if !window.is_fullscreen() {
            return false;
        }
        let Some(active) = self.most_recently_activated_window() else {
            return false;
        };
        if active == window.id {
            return true;
        }
        let other_output = self
            .window(active)
            .is_some_and(|a| a.output != window.output);
        other_output || self.main_windows(active).contains(&window.id)
    }

    /// Effective layer of a window.
    ///
    /// Members of a group follow a sibling in the active layer on the same output. Transients
    /// never sit below their main window's layer.
    pub fn compute_layer(&self, id: WindowId) -> Layer {
        let Some(window) = self.window(id) else {
            return Layer::Normal;
        };
        let mut layer = self.belongs_to_layer(window);

        if layer < Layer::Active && !window.is_desktop() {
            let promoted = window
                .group
                .and_then(|g| self.group(g))
                .is_some_and(|group| {
                    group.members.iter().any(|member| {
                        *member != id
                            && self.window(*member).is_some_and(|m| {
                                m.output == window.output
                                    && self.belongs_to_layer(m) == Layer::Active
                            })
                    })
                });
            if promoted {
                layer = Layer::Active;
            }
        }

        if let Some(parent) = window.transient_for {
            if window.kind != WindowKind::X11Unmanaged {
                layer = layer.max(self.compute_layer(parent));
            }
        }
        layer
    }

    /// Registers that `above` must stay above `below`.
    pub fn constrain(&mut self, below: WindowId, above: WindowId) {
        if below == above {
            return;
        }
        let constraint = Constraint { below, above };
        if !self.constraints.contains(&constraint) {
            self.constraints.push(constraint);
        }
    }

    pub fn unconstrain(&mut self, below: WindowId, above: WindowId) {
        self.constraints
            .retain(|c| !(c.below == below && c.above == above));
    }

    /// Computes the stacking order from the unconstrained order, layers and constraints.
    pub fn constrained_stacking_order(&self) -> Vec<WindowId> {
        let mut layers: [Vec<WindowId>; Layer::COUNT] = Default::default();
        for id in &self.unconstrained {
            let layer = self
                .window(*id)
                .and_then(|w| w.layer)
                .unwrap_or_else(|| self.compute_layer(*id));
            layers[layer.index()].push(*id);
        }
        let mut stacking: Vec<WindowId> = layers.into_iter().flatten().collect();

        let position = |stacking: &[WindowId], id: WindowId| stacking.iter().position(|w| *w == id);

        // Roots are constraints not affected by any other constraint.
        let mut enqueued = vec![false; self.constraints.len()];
        let mut roots: Vec<usize> = (0..self.constraints.len())
            .filter(|&i| {
                let below = self.constraints[i].below;
                !self.constraints.iter().any(|p| p.above == below)
            })
            .collect();
        // Keep the relative order of transient siblings.
        roots.sort_by_key(|&i| Reverse(position(&stacking, self.constraints[i].above)));
        for &i in &roots {
            enqueued[i] = true;
        }

        let mut queue: VecDeque<usize> = roots.into();
        while let Some(i) = queue.pop_front() {
            let constraint = self.constraints[i];
            let (Some(below_index), Some(above_index)) = (
                position(&stacking, constraint.below),
                position(&stacking, constraint.above),
            ) else {
                continue;
            };
            if above_index < below_index {
                let above = stacking.remove(above_index);
                stacking.insert(below_index, above);
            }

            let mut children: Vec<usize> = (0..self.constraints.len())
                .filter(|&c| self.constraints[c].below == constraint.above)
                .collect();
            children.sort_by_key(|&c| Reverse(position(&stacking, self.constraints[c].above)));
            for child in children {
                if !enqueued[child] {
                    enqueued[child] = true;
                    queue.push_back(child);
                }
            }
        }

        stacking
    }

    /// Recomputes layers and the stacking order.
    ///
    /// With `propagate_new_windows` the X11 client list is republished too. While updates are
    /// blocked this only records whether propagation was requested.
    pub fn update_stacking_order(&mut self, propagate_new_windows: bool) {
        if self.block_stacking_updates > 0 {
            if propagate_new_windows {
                self.blocked_propagate = true;
            }
            return;
        }

        let _span = tracy_client::span!("Workspace::update_stacking_order");

        let layers: Vec<_> = self
            .unconstrained
            .iter()
            .map(|id| (*id, self.compute_layer(*id)))
            .collect();
        for (id, layer) in layers {
            if let Some(window) = self.window_mut(id) {
                window.layer = Some(layer);
            }
        }

        let new_order = self.constrained_stacking_order();
        let changed = self.force_restacking || new_order != self.stacking_order;
        self.force_restacking = false;
        self.stacking_order = new_order;

        if changed || propagate_new_windows {
            trace!("stacking order changed: {:?}", self.stacking_order);
            self.propagate_windows(propagate_new_windows);
            let order = self.stacking_order.clone();
            for (index, id) in order.into_iter().enumerate() {
                if let Some(window) = self.window_mut(id) {
                    window.stacking_index = index;
                }
            }
            self.push_event(WorkspaceEvent::StackingOrderChanged);
        }
    }

    fn propagate_windows(&mut self, propagate_new_windows: bool) {
        let mut restack = Vec::with_capacity(2 * self.stacking_order.len() + 1);
        // Everything goes below the support window and the screen edges.
        restack.extend(self.support_window);
        restack.extend(self.screen_edge_windows.iter().copied());
        for id in self.stacking_order.iter().rev() {
            let Some(x11) = self
                .window(*id)
                .filter(|w| w.kind == WindowKind::X11Managed)
                .and_then(|w| w.x11.as_ref())
            else {
                continue;
            };
            restack.extend(x11.input);
            restack.push(x11.frame);
        }

        let x11_window = |id: &WindowId| {
            self.window(*id)
                .filter(|w| w.kind == WindowKind::X11Managed)
                .and_then(|w| w.x11.as_ref())
                .map(|x| x.window)
        };
        let client_list = propagate_new_windows
            .then(|| self.mapping_order().iter().filter_map(x11_window).collect());
        let client_list_stacking = self.stacking_order.iter().filter_map(x11_window).collect();

        let previous_client_list = self.propagation.take().and_then(|p| p.client_list);
        self.propagation = Some(X11Propagation {
            restack,
            client_list: client_list.or(previous_client_list),
            client_list_stacking,
        });
    }

    /// Increments or decrements the stacking update block counter.
    ///
    /// The order is recomputed when the last block is released.
    pub fn block_stacking_updates(&mut self, block: bool) {
        if block {
            if self.block_stacking_updates == 0 {
                self.blocked_propagate = false;
            }
            self.block_stacking_updates += 1;
        } else {
            self.block_stacking_updates = self.block_stacking_updates.saturating_sub(1);
            if self.block_stacking_updates == 0 {
                let propagate = std::mem::take(&mut self.blocked_propagate);
                self.update_stacking_order(propagate);
            }
        }
    }

    /// Runs `f` with stacking updates blocked, recomputing the order once afterwards.
    pub fn with_stacking_blocked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.block_stacking_updates(true);
        let rv = f(self);
        self.block_stacking_updates(false);
        rv
    }

    /// Sorts windows by their position in the stacking order, bottom to top.
    pub fn ensure_stacking_order(&self, windows: &[WindowId]) -> Vec<WindowId> {
        self.stacking_order
            .iter()
            .copied()
            .filter(|id| windows.contains(id))
            .collect()
    }

    pub fn raise_window(&mut self, id: WindowId, no_group: bool) {
        let Some(window) = self.window(id) else {
            return;
        };
        let special = window.is_special_window();

        self.with_stacking_blocked(|ws| {
            if !no_group {
                for parent in ws.main_windows(id) {
                    ws.raise_window(parent, true);
                }
            }
            ws.unconstrained.retain(|w| *w != id);
            ws.unconstrained.push(id);
            if !special {
                ws.most_recently_raised = Some(id);
            }
        });
    }

    pub fn lower_window(&mut self, id: WindowId, no_group: bool) {
        let Some(window) = self.window(id) else {
            return;
        };
        let group = window.group;
        let transient = window.is_transient();

        self.with_stacking_blocked(|ws| {
            ws.unconstrained.retain(|w| *w != id);
            ws.unconstrained.insert(0, id);

            if !no_group && transient {
                // Lower the rest of the group too, keeping their relative order.
                let members = group
                    .and_then(|g| ws.group(g))
                    .map(|g| g.members.clone())
                    .unwrap_or_default();
                let members = ws.ensure_stacking_order(&members);
                for member in members.into_iter().rev() {
                    if member != id {
                        ws.lower_window(member, true);
                    }
                }
            }

            if ws.most_recently_raised == Some(id) {
                ws.most_recently_raised = None;
            }
        });
    }

    /// Raises the window just above the topmost window of its application.
    pub fn raise_window_within_application(&mut self, id: WindowId) {
        if self.window(id).is_none() {
            return;
        }
        self.with_stacking_blocked(|ws| {
            for index in (0..ws.unconstrained.len()).rev() {
                let other = ws.unconstrained[index];
                if !ws.window(other).is_some_and(Window::is_client) {
                    continue;
                }
                if other == id {
                    // Already the topmost one; don't lower it.
                    return;
                }
                if ws.belong_to_same_application(other, id, false) {
                    ws.unconstrained.retain(|w| *w != id);
                    let position = ws
                        .unconstrained
                        .iter()
                        .position(|w| *w == other)
                        .map_or(ws.unconstrained.len(), |p| p + 1);
                    ws.unconstrained.insert(position, id);
                    return;
                }
            }
        });
    }

    /// Lowers the window just below the bottommost window of its application.
    pub fn lower_window_within_application(&mut self, id: WindowId) {
        if self.window(id).is_none() {
            return;
        }
        self.with_stacking_blocked(|ws| {
            ws.unconstrained.retain(|w| *w != id);
            let position = ws.unconstrained.iter().position(|other| {
                ws.window(*other).is_some_and(Window::is_client)
                    && ws.belong_to_same_application(*other, id, false)
            });
            ws.unconstrained.insert(position.unwrap_or(0), id);
        });
    }

    /// Raises the window unless it is already on top, in which case it is lowered.
    pub fn raise_or_lower_window(&mut self, id: WindowId) {
        let Some(window) = self.window(id) else {
            return;
        };
        let layer = window.layer;
        let desktop = self.current_desktop();
        let topmost = self.stacking_order.iter().rev().copied().find(|other| {
            self.window(*other).is_some_and(|w| {
                w.is_client() && w.is_shown() && w.is_on_desktop(desktop) && w.layer == layer
            })
        });
        if topmost == Some(id) {
            self.lower_window(id, false);
        } else {
            self.raise_window(id, false);
        }
    }

    /// Puts the window right below `under`.
    ///
    /// Unless forced, a window of another application goes below every window of `under`'s
    /// application in the same layer.
    pub fn restack(&mut self, id: WindowId, under: WindowId, force: bool) {
        if !self.unconstrained.contains(&under) {
            return;
        }
        let mut under = Some(under);
        if let Some(u) = under.filter(|u| !force && !self.belong_to_same_application(*u, id, false)) {
            let layer = self.window(id).and_then(|w| w.layer);
            let first = self.unconstrained.iter().copied().find(|other| {
                self.window(*other).is_some_and(|o| o.layer == layer)
                    && self.belong_to_same_application(u, *other, false)
            });
            if let Some(first) = first {
                under = (first != id).then_some(first);
            }
        }

        if let Some(under) = under {
            self.unconstrained.retain(|w| *w != id);
            let position = self
                .unconstrained
                .iter()
                .position(|w| *w == under)
                .unwrap_or(0);
            self.unconstrained.insert(position, id);
        }
        self.update_stacking_order(false);
    }

    /// Stacks a window that may not take focus right below the active one.
    pub fn restack_window_under_active(&mut self, id: WindowId) {
        let layer = self.window(id).and_then(|w| w.layer);
        match self.active_window {
            Some(active)
                if active != id && self.window(active).and_then(|w| w.layer) == layer =>
            {
                self.restack(id, active, false);
            }
            _ => self.raise_window(id, false),
        }
    }

    pub fn set_keep_above(&mut self, id: WindowId, keep_above: bool) {
        let Some(window) = self.window_mut(id) else {
            return;
        };
        let keep_above = window.rules.check_keep_above(keep_above, false);
        if keep_above == window.states.keep_above {
            return;
        }
        window.states.keep_above = keep_above;
        if keep_above {
            window.states.keep_below = false;
        }
        self.update_stacking_order(false);
    }

    pub fn set_keep_below(&mut self, id: WindowId, keep_below: bool) {
        let Some(window) = self.window_mut(id) else {
            return;
        };
        let keep_below = window.rules.check_keep_below(keep_below, false);
        if keep_below == window.states.keep_below {
            return;
        }
        window.states.keep_below = keep_below;
        if keep_below {
            window.states.keep_above = false;
        }
        self.update_stacking_order(false);
    }

    pub fn set_minimized(&mut self, id: WindowId, minimized: bool) {
        let Some(window) = self.window_mut(id) else {
            return;
        };
        if window.states.minimized == minimized {
            return;
        }
        window.states.minimized = minimized;
        let has_struts = !window.struts.is_empty();
        debug!("window {id:?} minimized: {minimized}");

        self.with_stacking_blocked(|ws| {
            if minimized {
                if ws.active_window == Some(id) || ws.should_get_focus.last() == Some(&id) {
                    ws.activate_next_window(Some(id), None);
                }
            } else if let Some(window) = ws.window(id) {
                ws.focus_chain.update(
                    window,
                    super::focus_chain::FocusChainChange::Update,
                    ws.active_window,
                );
            }
            if has_struts {
                ws.update_work_area();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use proptest::prelude::*;
    use proptest_derive::Arbitrary;
    use smithay::utils::Rectangle;

    use super::*;
    use crate::workspace::tests::{toplevel, with_type, workspace};
    use crate::window::WindowType;

    fn dump(ws: &Workspace) -> String {
        ws.stacking_order()
            .iter()
            .map(|id| {
                let w = ws.window(*id).unwrap();
                format!("{:?} {}", w.layer.unwrap(), w.title)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn titled(ws: &mut Workspace, id: WindowId, title: &str) {
        ws.window_mut(id).unwrap().title = title.to_owned();
    }

    #[test]
    fn layers_sort_windows() {
        let mut ws = workspace();
        let dock = with_type(&mut ws, WindowType::Dock);
        titled(&mut ws, dock, "dock");
        let normal = toplevel(&mut ws);
        titled(&mut ws, normal, "normal");
        let desktop = with_type(&mut ws, WindowType::Desktop);
        titled(&mut ws, desktop, "desktop");
        let osd = with_type(&mut ws, WindowType::OnScreenDisplay);
        titled(&mut ws, osd, "osd");
        let below = toplevel(&mut ws);
        titled(&mut ws, below, "below");
        ws.set_keep_below(below, true);
        let above = toplevel(&mut ws);
        titled(&mut ws, above, "above");
        ws.set_keep_above(above, true);
        ws.raise_window(normal, false);

        assert_snapshot!(dump(&ws), @r"
        Desktop desktop
        Below below
        Normal normal
        Dock dock
        Above above
        OnScreenDisplay osd
        ");
    }

    #[test]
    fn transient_stays_above_parent() {
        let mut ws = workspace();
        let parent = toplevel(&mut ws);
        titled(&mut ws, parent, "parent");
        let dialog = toplevel(&mut ws);
        titled(&mut ws, dialog, "dialog");
        let other = toplevel(&mut ws);
        titled(&mut ws, other, "other");
        ws.set_transient_for(dialog, Some(parent));

        ws.raise_window(parent, false);
        assert_snapshot!(dump(&ws), @r"
        Normal other
        Normal parent
        Normal dialog
        ");

        // Raising the transient brings the parent along.
        ws.raise_window(other, false);
        ws.raise_window(dialog, false);
        assert_snapshot!(dump(&ws), @r"
        Normal other
        Normal parent
        Normal dialog
        ");

        ws.lower_window(parent, false);
        assert_eq!(ws.stacking_order(), &[parent, other, dialog]);
    }

    #[test]
    fn transient_inherits_parent_layer() {
        let mut ws = workspace();
        let parent = toplevel(&mut ws);
        let dialog = toplevel(&mut ws);
        ws.set_transient_for(dialog, Some(parent));
        ws.set_keep_above(parent, true);

        assert_eq!(ws.window(dialog).unwrap().layer, Some(Layer::Above));
        assert_eq!(ws.stacking_order(), &[parent, dialog]);
    }

    #[test]
    fn blocked_updates_apply_once() {
        let mut ws = workspace();
        let a = toplevel(&mut ws);
        let b = toplevel(&mut ws);
        ws.take_events();

        ws.block_stacking_updates(true);
        ws.raise_window(a, false);
        ws.block_stacking_updates(true);
        ws.lower_window(b, false);
        ws.block_stacking_updates(false);
        assert_eq!(ws.stacking_order(), &[a, b]);
        ws.block_stacking_updates(false);

        assert_eq!(ws.stacking_order(), &[b, a]);
        assert_eq!(ws.take_events(), vec![WorkspaceEvent::StackingOrderChanged]);
    }

    #[test]
    fn within_application_moves_next_to_siblings() {
        let mut ws = workspace();
        let a1 = toplevel(&mut ws);
        let b = toplevel(&mut ws);
        let a2 = toplevel(&mut ws);
        let c = toplevel(&mut ws);
        let client = crate::display::ClientId::next();
        ws.window_mut(a1).unwrap().client = Some(client);
        ws.window_mut(a2).unwrap().client = Some(client);

        ws.raise_window_within_application(a1);
        assert_eq!(ws.stacking_order(), &[b, a2, a1, c]);

        ws.lower_window_within_application(a1);
        assert_eq!(ws.stacking_order(), &[b, a1, a2, c]);
    }

    #[test]
    fn restack_under_active_goes_below_application() {
        let mut ws = workspace();
        let a = toplevel(&mut ws);
        let b = toplevel(&mut ws);
        ws.activate_window(Some(a), false);
        assert_eq!(ws.stacking_order(), &[b, a]);

        let new = toplevel(&mut ws);
        ws.restack_window_under_active(new);
        assert_eq!(ws.stacking_order(), &[b, new, a]);
    }

    #[test]
    fn group_member_follows_active_fullscreen() {
        let mut ws = workspace();
        let group = ws.group_for_leader(0x200001);
        let mut ids = Vec::new();
        for title in ["x1", "x2"] {
            let mut window = Window::new(WindowKind::X11Managed);
            window.title = title.to_owned();
            window.ready_for_painting = true;
            window.group = Some(group);
            window.set_frame_geometry(Rectangle::new((0, 0).into(), (100, 100).into()));
            ids.push(ws.add_window(window));
        }
        let normal = toplevel(&mut ws);
        titled(&mut ws, normal, "normal");
        let (x1, x2) = (ids[0], ids[1]);

        ws.window_mut(x1).unwrap().states.fullscreen = true;
        ws.set_active_window(Some(x1));
        ws.raise_window(x1, false);

        assert_eq!(ws.compute_layer(x2), Layer::Active);
        assert_snapshot!(dump(&ws), @r"
        Normal normal
        Active x2
        Active x1
        ");
    }

    #[test]
    fn propagation_lists() {
        let mut ws = workspace();
        ws.support_window = Some(0x100);
        ws.screen_edge_windows = vec![0x101];

        let mut ids = Vec::new();
        for n in 0..2 {
            let mut window = Window::new(WindowKind::X11Managed);
            window.x11 = Some(crate::window::x11::X11State::managed(
                0x400000 + n,
                0x500000 + n,
                0x600000 + n,
            ));
            ids.push(ws.add_window(window));
        }
        let mut unmanaged = Window::new(WindowKind::X11Unmanaged);
        unmanaged.x11 = Some(crate::window::x11::X11State::unmanaged(0x700000));
        ws.add_window(unmanaged);

        ws.raise_window(ids[0], false);
        let propagation = ws.take_x11_propagation().unwrap();
        assert_eq!(propagation.restack, vec![0x100, 0x101, 0x500000, 0x500001]);
        assert_eq!(propagation.client_list, Some(vec![0x400000, 0x400001]));
        assert_eq!(propagation.client_list_stacking, vec![0x400001, 0x400000]);
    }

    #[derive(Debug, Clone, Copy, Arbitrary)]
    enum Kind {
        Normal,
        Dock,
        Desktop,
        Notification,
        KeepAbove,
        KeepBelow,
        Fullscreen,
    }

    #[derive(Debug, Clone, Copy, Arbitrary)]
    enum Op {
        Raise(#[proptest(strategy = "0..8usize")] usize),
        Lower(#[proptest(strategy = "0..8usize")] usize),
        Activate(#[proptest(strategy = "0..8usize")] usize),
        RaiseWithinApplication(#[proptest(strategy = "0..8usize")] usize),
    }

    fn build(kinds: &[(Kind, Option<usize>)], ops: &[Op]) -> (Workspace, Vec<WindowId>) {
        let mut ws = workspace();
        let mut ids = Vec::new();
        for (i, (kind, parent)) in kinds.iter().enumerate() {
            let mut window = Window::new(WindowKind::WaylandToplevel);
            window.ready_for_painting = true;
            match kind {
                Kind::Dock => window.window_type = WindowType::Dock,
                Kind::Desktop => window.window_type = WindowType::Desktop,
                Kind::Notification => window.window_type = WindowType::Notification,
                Kind::KeepAbove => window.states.keep_above = true,
                Kind::KeepBelow => window.states.keep_below = true,
                Kind::Fullscreen => window.states.fullscreen = true,
                Kind::Normal => (),
            }
            // Parents always come earlier, which rules out loops.
            window.transient_for = parent.filter(|p| *p < i).map(|p| ids[p]);
            ids.push(ws.add_window(window));
        }
        for op in ops {
            match *op {
                Op::Raise(i) => ws.raise_window(ids[i % ids.len()], false),
                Op::Lower(i) => ws.lower_window(ids[i % ids.len()], false),
                Op::Activate(i) => ws.activate_window(Some(ids[i % ids.len()]), true),
                Op::RaiseWithinApplication(i) => {
                    ws.raise_window_within_application(ids[i % ids.len()])
                }
            }
        }
        (ws, ids)
    }

    fn arbitrary_windows() -> impl Strategy<Value = Vec<(Kind, Option<usize>)>> {
        prop::collection::vec((any::<Kind>(), prop::option::of(0..8usize)), 1..8)
    }

    proptest! {
        #[test]
        fn transients_stack_above_parents(
            kinds in arbitrary_windows(),
            ops in prop::collection::vec(any::<Op>(), 0..16),
        ) {
            let (ws, _) = build(&kinds, &ops);
            let order = ws.stacking_order();
            let position = |id| order.iter().position(|w| *w == id).unwrap();
            for constraint in &ws.constraints {
                prop_assert!(position(constraint.above) > position(constraint.below));
            }
        }

        #[test]
        fn layers_are_monotone(
            kinds in arbitrary_windows(),
            ops in prop::collection::vec(any::<Op>(), 0..16),
        ) {
            let (ws, _) = build(&kinds, &ops);
            let layers: Vec<_> = ws
                .stacking_order()
                .iter()
                .map(|id| ws.compute_layer(*id))
                .collect();
            for pair in layers.windows(2) {
                prop_assert!(pair[0] <= pair[1], "{layers:?}");
            }
        }
    }
}
