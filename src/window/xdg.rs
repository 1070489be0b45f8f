//! State of windows backed by xdg-shell surfaces.

use std::time::Duration;

use bitflags::bitflags;
use smithay::utils::{Logical, Rectangle, Size};

use super::decoration::DecorationMode;
use super::positioner::Positioner;
use super::WindowId;
use crate::utils::serial::Serial;

/// Time after which an unanswered ping counts as timed out.
pub const PING_TIMEOUT: Duration = Duration::from_millis(1000);

bitflags! {
    /// States sent in `xdg_toplevel.configure`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct XdgStates: u32 {
        const MAXIMIZED = 1 << 0;
        const FULLSCREEN = 1 << 1;
        const RESIZING = 1 << 2;
        const ACTIVATED = 1 << 3;
        const TILED_LEFT = 1 << 4;
        const TILED_RIGHT = 1 << 5;
        const TILED_TOP = 1 << 6;
        const TILED_BOTTOM = 1 << 7;
        const SUSPENDED = 1 << 8;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingReason {
    FocusWindow,
    CloseWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub serial: Serial,
    pub reason: PingReason,
    pub sent_at: Duration,
    /// Whether the first half of the timeout has already elapsed.
    pub delayed: bool,
}

/// What happened to the pings of a window at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingUpdate {
    /// A ping is overdue; the window should be marked unresponsive.
    pub delayed: bool,
    /// A ping sent for closing the window timed out; the client may be killed.
    pub kill: bool,
}

/// Role assigned through the Plasma shell protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlasmaRole {
    Normal,
    Desktop,
    Panel,
    OnScreenDisplay,
    Notification,
    ToolTip,
    CriticalNotification,
    AppletPopup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelBehavior {
    #[default]
    AlwaysVisible,
    AutoHide,
    WindowsCanCover,
    WindowsGoBelow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupState {
    pub parent: WindowId,
    pub positioner: Positioner,
    /// Serial of the input event the grab was requested with.
    pub grab: Option<Serial>,
    /// Placement relative to the parent's client area.
    pub relative: Rectangle<i32, Logical>,
    pub reposition_token: Option<u32>,
}

#[derive(Debug, Default)]
pub struct WaylandState {
    /// Whether the initial configure was sent in reply to the first commit.
    pub initial_configure_sent: bool,
    pub decoration_mode: DecorationMode,
    /// Mode the client asked for through xdg-decoration or server-decoration.
    pub requested_decoration: Option<DecorationMode>,
    pub plasma_role: Option<PlasmaRole>,
    pub panel_behavior: PanelBehavior,
    /// Notifications and panels only take focus when they ask for it.
    pub panel_takes_focus: bool,
    pub skip_switcher_requested: bool,
    pub pending_window_geometry: Option<Rectangle<i32, Logical>>,
    pub pending_min_size: Option<Size<i32, Logical>>,
    pub pending_max_size: Option<Size<i32, Logical>>,
    pub popup: Option<PopupState>,
    /// States sent with the last configure.
    pub last_states: XdgStates,
    pub pings: Vec<Ping>,
    /// The client was asked to close and may be killed if it doesn't respond.
    pub close_requested: bool,
}

impl WaylandState {
    pub fn popup(popup: PopupState) -> Self {
        Self {
            popup: Some(popup),
            ..Self::default()
        }
    }

    pub fn add_ping(&mut self, serial: Serial, reason: PingReason, now: Duration) {
        self.pings.push(Ping {
            serial,
            reason,
            sent_at: now,
            delayed: false,
        });
    }

    /// Handles a pong, returning whether it answered one of this window's pings.
    pub fn pong(&mut self, serial: Serial) -> bool {
        let len = self.pings.len();
        self.pings.retain(|p| p.serial != serial);
        self.pings.len() != len
    }

    /// Advances the ping timers.
    ///
    /// Half of the timeout marks the ping as delayed. The full timeout drops it, authorising a kill
    /// when it was sent for closing the window.
    pub fn update_pings(&mut self, now: Duration) -> PingUpdate {
        let mut update = PingUpdate::default();
        self.pings.retain_mut(|ping| {
            let elapsed = now.saturating_sub(ping.sent_at);
            if elapsed >= PING_TIMEOUT {
                if ping.reason == PingReason::CloseWindow {
                    update.kill = true;
                }
                // Both halves elapsed.
                update.delayed = true;
                return false;
            }
            if !ping.delayed && elapsed >= PING_TIMEOUT / 2 {
                ping.delayed = true;
                update.delayed = true;
            }
            true
        });
        update
    }

    /// Earliest time at which [`WaylandState::update_pings`] has something to do.
    pub fn next_ping_deadline(&self) -> Option<Duration> {
        self.pings
            .iter()
            .map(|p| {
                if p.delayed {
                    p.sent_at + PING_TIMEOUT
                } else {
                    p.sent_at + PING_TIMEOUT / 2
                }
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_goes_through_both_halves() {
        let mut state = WaylandState::default();
        state.add_ping(Serial(7), PingReason::FocusWindow, Duration::ZERO);

        assert_eq!(
            state.update_pings(Duration::from_millis(100)),
            PingUpdate::default()
        );
        let update = state.update_pings(Duration::from_millis(500));
        assert!(update.delayed);
        assert!(!update.kill);
        assert_eq!(
            state.next_ping_deadline(),
            Some(Duration::from_millis(1000))
        );

        let update = state.update_pings(Duration::from_millis(1000));
        assert!(!update.kill);
        assert!(state.pings.is_empty());
    }

    #[test]
    fn close_ping_timeout_authorises_kill() {
        let mut state = WaylandState::default();
        state.add_ping(Serial(1), PingReason::CloseWindow, Duration::ZERO);
        assert!(state.update_pings(Duration::from_secs(2)).kill);
    }

    #[test]
    fn pong_clears_matching_ping() {
        let mut state = WaylandState::default();
        state.add_ping(Serial(1), PingReason::FocusWindow, Duration::ZERO);
        assert!(!state.pong(Serial(2)));
        assert!(state.pong(Serial(1)));
        assert!(state.pings.is_empty());
    }
}
