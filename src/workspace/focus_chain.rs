//! Focus chains.
//!
//! Every virtual desktop has a chain of the windows that may get focus, with the most recently
//! focused window at the end. A separate most-recently-used chain spans all desktops.

use std::collections::HashMap;

use crate::output::OutputId;
use crate::window::{Window, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChainChange {
    /// Move to the most recently used end.
    MakeFirst,
    /// Move to the least recently used end.
    MakeLast,
    /// Insert if missing, leaving existing positions alone.
    Update,
}

#[derive(Debug)]
pub struct FocusChain {
    /// Chains of desktops `1..=count`, most recent last.
    desktops: Vec<Vec<WindowId>>,
    most_recently_used: Vec<WindowId>,
    current_desktop: u32,
    separate_screen_focus: bool,
}

impl FocusChain {
    pub fn new(desktop_count: u32, separate_screen_focus: bool) -> Self {
        Self {
            desktops: vec![Vec::new(); desktop_count.max(1) as usize],
            most_recently_used: Vec::new(),
            current_desktop: 1,
            separate_screen_focus,
        }
    }

    pub fn set_separate_screen_focus(&mut self, value: bool) {
        self.separate_screen_focus = value;
    }

    pub fn set_current_desktop(&mut self, desktop: u32) {
        self.current_desktop = desktop;
    }

    pub fn set_desktop_count(&mut self, count: u32) {
        self.desktops.resize(count.max(1) as usize, Vec::new());
    }

    pub fn chain(&self, desktop: u32) -> &[WindowId] {
        desktop
            .checked_sub(1)
            .and_then(|i| self.desktops.get(i as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn most_recently_used(&self) -> &[WindowId] {
        &self.most_recently_used
    }

    pub fn contains(&self, id: WindowId, desktop: u32) -> bool {
        self.chain(desktop).contains(&id)
    }

    pub fn update(&mut self, window: &Window, change: FocusChainChange, active: Option<WindowId>) {
        if !window.is_client() || !window.wants_tab_focus() {
            self.remove(window.id);
            return;
        }

        let id = window.id;
        let current = self.current_desktop;
        for (index, chain) in self.desktops.iter_mut().enumerate() {
            let desktop = index as u32 + 1;
            if window.on_all_desktops {
                // Reordering an on-all-desktops window only affects the current desktop.
                if desktop == current && change != FocusChainChange::Update {
                    update_in_chain(chain, id, change, active);
                } else {
                    insert_into_chain(chain, id, active);
                }
            } else if window.is_on_desktop(desktop) {
                update_in_chain(chain, id, change, active);
            } else {
                chain.retain(|w| *w != id);
            }
        }

        update_in_chain(&mut self.most_recently_used, id, change, active);
    }

    pub fn remove(&mut self, id: WindowId) {
        for chain in &mut self.desktops {
            chain.retain(|w| *w != id);
        }
        self.most_recently_used.retain(|w| *w != id);
    }

    /// Most recently used window on the desktop that can be activated.
    pub fn get_for_activation(
        &self,
        desktop: u32,
        output: Option<OutputId>,
        windows: &HashMap<WindowId, Window>,
    ) -> Option<WindowId> {
        self.chain(desktop).iter().rev().copied().find(|id| {
            windows.get(id).is_some_and(|w| {
                !w.states.shaded
                    && w.is_shown()
                    && (!self.separate_screen_focus || output.is_none() || w.output == output)
            })
        })
    }

    /// Whether `candidate` may take focus from `previous`.
    pub fn is_usable_focus_candidate(
        &self,
        candidate: &Window,
        previous: Option<&Window>,
        active_output: Option<OutputId>,
    ) -> bool {
        previous.map_or(true, |p| p.id != candidate.id)
            && !candidate.states.shaded
            && candidate.is_shown()
            && candidate.is_on_desktop(self.current_desktop)
            && (!self.separate_screen_focus
                || candidate.output == previous.map_or(active_output, |p| p.output))
    }

    /// Next window on the desktop to take focus after `reference` goes away.
    pub fn next_for_desktop(
        &self,
        reference: Option<WindowId>,
        desktop: u32,
        windows: &HashMap<WindowId, Window>,
        active_output: Option<OutputId>,
    ) -> Option<WindowId> {
        let previous = reference.and_then(|r| windows.get(&r));
        self.chain(desktop).iter().rev().copied().find(|id| {
            windows
                .get(id)
                .is_some_and(|w| self.is_usable_focus_candidate(w, previous, active_output))
        })
    }

    pub fn first_most_recently_used(&self) -> Option<WindowId> {
        self.most_recently_used.first().copied()
    }

    /// Window used before `reference`, wrapping around.
    pub fn next_most_recently_used(&self, reference: WindowId) -> Option<WindowId> {
        let chain = &self.most_recently_used;
        match chain.iter().position(|w| *w == reference) {
            None => chain.first().copied(),
            Some(0) => chain.last().copied(),
            Some(index) => Some(chain[index - 1]),
        }
    }

    /// Moves `id` right behind `reference`, or behind the last window of the same application.
    ///
    /// `same_application` tells whether a window belongs to `reference`'s application.
    pub fn move_after_window(
        &mut self,
        window: &Window,
        reference: WindowId,
        same_application: impl Fn(WindowId) -> bool,
    ) {
        if !window.wants_tab_focus() {
            return;
        }
        let id = window.id;
        for (index, chain) in self.desktops.iter_mut().enumerate() {
            if window.is_on_desktop(index as u32 + 1) {
                move_after_in_chain(chain, id, reference, &same_application);
            }
        }
        move_after_in_chain(&mut self.most_recently_used, id, reference, &same_application);
    }
}

fn update_in_chain(
    chain: &mut Vec<WindowId>,
    id: WindowId,
    change: FocusChainChange,
    active: Option<WindowId>,
) {
    match change {
        FocusChainChange::MakeFirst => {
            chain.retain(|w| *w != id);
            chain.push(id);
        }
        FocusChainChange::MakeLast => {
            chain.retain(|w| *w != id);
            chain.insert(0, id);
        }
        FocusChainChange::Update => insert_into_chain(chain, id, active),
    }
}

fn insert_into_chain(chain: &mut Vec<WindowId>, id: WindowId, active: Option<WindowId>) {
    if chain.contains(&id) {
        return;
    }
    match active {
        // Right behind the active window, so that it stays the most recent.
        Some(active) if active != id && chain.last() == Some(&active) => {
            chain.insert(chain.len() - 1, id);
        }
        _ => chain.push(id),
    }
}

fn move_after_in_chain(
    chain: &mut Vec<WindowId>,
    id: WindowId,
    reference: WindowId,
    same_application: &impl Fn(WindowId) -> bool,
) {
    if !chain.contains(&reference) {
        return;
    }
    if same_application(id) {
        chain.retain(|w| *w != id);
        if let Some(index) = chain.iter().position(|w| *w == reference) {
            chain.insert(index, id);
        }
    } else {
        chain.retain(|w| *w != id);
        if let Some(index) = chain.iter().rposition(|w| same_application(*w)) {
            chain.insert(index, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::WindowKind;

    fn window() -> Window {
        let mut window = Window::new(WindowKind::WaylandToplevel);
        window.ready_for_painting = true;
        window
    }

    #[test]
    fn new_windows_go_behind_active() {
        let mut chain = FocusChain::new(1, false);
        let a = window();
        let b = window();
        let c = window();

        chain.update(&a, FocusChainChange::MakeFirst, Some(a.id));
        chain.update(&b, FocusChainChange::Update, Some(a.id));
        assert_eq!(chain.chain(1), &[b.id, a.id]);

        chain.update(&c, FocusChainChange::Update, None);
        assert_eq!(chain.chain(1), &[b.id, a.id, c.id]);

        chain.update(&b, FocusChainChange::MakeLast, None);
        chain.update(&a, FocusChainChange::MakeFirst, None);
        assert_eq!(chain.chain(1), &[b.id, c.id, a.id]);
        assert_eq!(chain.most_recently_used(), &[b.id, c.id, a.id]);
    }

    #[test]
    fn windows_without_tab_focus_are_removed() {
        let mut chain = FocusChain::new(1, false);
        let mut a = window();
        chain.update(&a, FocusChainChange::Update, None);
        assert!(chain.contains(a.id, 1));

        a.states.skip_switcher = true;
        chain.update(&a, FocusChainChange::Update, None);
        assert!(!chain.contains(a.id, 1));
        assert!(chain.most_recently_used().is_empty());
    }

    #[test]
    fn on_all_desktops_reorders_current_only() {
        let mut chain = FocusChain::new(2, false);
        let a = window();
        let mut b = window();
        b.on_all_desktops = true;
        let mut c = window();
        c.desktop = 2;

        chain.update(&b, FocusChainChange::Update, None);
        chain.update(&a, FocusChainChange::Update, None);
        chain.update(&c, FocusChainChange::Update, None);
        assert_eq!(chain.chain(1), &[b.id, a.id]);
        assert_eq!(chain.chain(2), &[b.id, c.id]);

        chain.update(&b, FocusChainChange::MakeFirst, None);
        assert_eq!(chain.chain(1), &[a.id, b.id]);
        assert_eq!(chain.chain(2), &[b.id, c.id]);
    }

    #[test]
    fn most_recently_used_wraps() {
        let mut chain = FocusChain::new(1, false);
        let a = window();
        let b = window();
        chain.update(&a, FocusChainChange::MakeFirst, None);
        chain.update(&b, FocusChainChange::MakeFirst, None);

        assert_eq!(chain.next_most_recently_used(b.id), Some(a.id));
        assert_eq!(chain.next_most_recently_used(a.id), Some(b.id));
        assert_eq!(chain.first_most_recently_used(), Some(a.id));
    }

    #[test]
    fn move_after_same_application() {
        let mut chain = FocusChain::new(1, false);
        let a = window();
        let b = window();
        let c = window();
        for w in [&a, &b, &c] {
            chain.update(w, FocusChainChange::MakeFirst, None);
        }

        chain.move_after_window(&c, a.id, |w| w == a.id || w == c.id);
        assert_eq!(chain.chain(1), &[c.id, a.id, b.id]);
    }
}
