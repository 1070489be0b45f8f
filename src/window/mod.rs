//! Unified window model.
//!
//! Every kind of window (X11 managed and override-redirect, xdg toplevels and popups, windows
//! created by the compositor itself) is a [`Window`] record. Behavior that differs between the
//! kinds is selected by matching on [`WindowKind`] or on the presence of the per-kind state.

use bitflags::bitflags;
use smithay::utils::{Logical, Point, Rectangle, Size};
use strata_config::MatchProps;

use crate::display::{ClientId, SurfaceId};
use crate::output::OutputId;
use crate::scene::item::ItemId;
use crate::utils::id::define_id;

pub mod configure;
pub mod decoration;
pub mod deleted;
pub mod group;
pub mod internal;
pub mod positioner;
pub mod rules;
pub mod x11;
pub mod xdg;

use self::configure::ConfigureQueue;
use self::decoration::Decoration;
use self::group::GroupId;
use self::internal::InternalState;
use self::rules::WindowRules;
use self::x11::X11State;
use self::xdg::WaylandState;

define_id!(WindowId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    X11Managed,
    X11Unmanaged,
    WaylandToplevel,
    WaylandPopup,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowType {
    #[default]
    Normal,
    Desktop,
    Dock,
    Toolbar,
    Menu,
    Dialog,
    Utility,
    Splash,
    Notification,
    OnScreenDisplay,
    Tooltip,
    CriticalNotification,
    ComboBox,
    DropdownMenu,
    PopupMenu,
    AppletPopup,
}

/// Stacking layers, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Desktop,
    Below,
    Normal,
    Dock,
    Above,
    Notification,
    Active,
    Popup,
    CriticalNotification,
    OnScreenDisplay,
    Unmanaged,
}

impl Layer {
    pub const COUNT: usize = 11;

    pub fn index(self) -> usize {
        self as usize
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct MaximizeMode: u8 {
        const VERTICAL = 1 << 0;
        const HORIZONTAL = 1 << 1;
        const FULL = Self::VERTICAL.bits() | Self::HORIZONTAL.bits();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Margins {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn shrink(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        Rectangle::new(
            rect.loc + Point::from((self.left, self.top)),
            Size::from((
                (rect.size.w - self.left - self.right).max(0),
                (rect.size.h - self.top - self.bottom).max(0),
            )),
        )
    }

    pub fn grow(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        Rectangle::new(
            rect.loc - Point::from((self.left, self.top)),
            rect.size + Size::from((self.left + self.right, self.top + self.bottom)),
        )
    }
}

/// Screen edge space reserved by a dock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Struts {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Struts {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStates {
    pub minimized: bool,
    pub shaded: bool,
    pub maximize: MaximizeMode,
    pub fullscreen: bool,
    pub keep_above: bool,
    pub keep_below: bool,
    pub demands_attention: bool,
    pub skip_taskbar: bool,
    pub skip_switcher: bool,
    pub modal: bool,
}

#[derive(Debug)]
pub struct Window {
    pub id: WindowId,
    pub kind: WindowKind,
    pub window_type: WindowType,
    pub surface: Option<SurfaceId>,
    pub client: Option<ClientId>,
    pub pid: Option<i32>,

    /// Wayland app id or X11 resource class.
    pub app_id: String,
    pub title: String,
    pub desktop_file_name: String,

    buffer_geometry: Rectangle<i32, Logical>,
    frame_geometry: Rectangle<i32, Logical>,
    /// Part of the client surface the client considers the window, in surface-local coordinates.
    pub window_geometry: Rectangle<i32, Logical>,
    /// Extents of client-side decorations (shadows) around the frame.
    pub client_frame_extents: Margins,
    pub decoration: Option<Decoration>,

    /// Cached layer, `None` until computed.
    pub layer: Option<Layer>,
    pub desktop: u32,
    pub on_all_desktops: bool,
    pub output: Option<OutputId>,
    pub states: WindowStates,
    pub active: bool,
    pub hidden: bool,
    pub unresponsive: bool,
    pub ready_for_painting: bool,
    pub wants_input: bool,
    pub opacity: f64,

    pub transient_for: Option<WindowId>,
    pub transients: Vec<WindowId>,
    pub group: Option<GroupId>,
    /// Timestamp of the last user interaction, `None` when unknown.
    pub user_time: Option<u32>,

    pub configure: ConfigureQueue,
    pub rules: WindowRules,

    pub restore_geometry: Rectangle<i32, Logical>,
    pub fullscreen_restore_geometry: Rectangle<i32, Logical>,
    pub min_size: Size<i32, Logical>,
    pub max_size: Size<i32, Logical>,
    pub struts: Struts,
    pub stacking_index: usize,
    pub item: Option<ItemId>,
    pub interactive_move_resize: bool,
    /// Allowed to show above the lock screen.
    pub lockscreen_overlay: bool,

    pub(crate) in_maximize: bool,
    pub(crate) in_fullscreen: bool,

    pub x11: Option<X11State>,
    pub wayland: Option<WaylandState>,
    pub internal: Option<InternalState>,
}

impl Window {
    pub fn new(kind: WindowKind) -> Self {
        Self {
            id: WindowId::next(),
            kind,
            window_type: WindowType::Normal,
            surface: None,
            client: None,
            pid: None,
            app_id: String::new(),
            title: String::new(),
            desktop_file_name: String::new(),
            buffer_geometry: Rectangle::default(),
            frame_geometry: Rectangle::default(),
            window_geometry: Rectangle::default(),
            client_frame_extents: Margins::default(),
            decoration: None,
            layer: None,
            desktop: 1,
            on_all_desktops: false,
            output: None,
            states: WindowStates::default(),
            active: false,
            hidden: false,
            unresponsive: false,
            ready_for_painting: false,
            wants_input: true,
            opacity: 1.,
            transient_for: None,
            transients: Vec::new(),
            group: None,
            user_time: None,
            configure: ConfigureQueue::default(),
            rules: WindowRules::default(),
            restore_geometry: Rectangle::default(),
            fullscreen_restore_geometry: Rectangle::default(),
            min_size: Size::from((0, 0)),
            max_size: Size::from((0, 0)),
            struts: Struts::default(),
            stacking_index: 0,
            item: None,
            interactive_move_resize: false,
            lockscreen_overlay: false,
            in_maximize: false,
            in_fullscreen: false,
            x11: None,
            wayland: None,
            internal: None,
        }
    }

    pub fn frame_geometry(&self) -> Rectangle<i32, Logical> {
        self.frame_geometry
    }

    pub fn buffer_geometry(&self) -> Rectangle<i32, Logical> {
        self.buffer_geometry
    }

    /// Border sizes between the frame and the client area.
    pub fn frame_margins(&self) -> Margins {
        self.decoration
            .as_ref()
            .map(|d| d.borders)
            .unwrap_or_default()
    }

    pub fn client_geometry(&self) -> Rectangle<i32, Logical> {
        self.frame_margins().shrink(self.frame_geometry)
    }

    pub fn frame_rect_to_client_rect(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        self.frame_margins().shrink(rect)
    }

    pub fn client_rect_to_frame_rect(&self, rect: Rectangle<i32, Logical>) -> Rectangle<i32, Logical> {
        self.frame_margins().grow(rect)
    }

    /// Sets the frame geometry and derives the buffer geometry from it.
    ///
    /// The buffer is positioned so that the window geometry inside the surface lines up with the
    /// client area.
    pub fn set_frame_geometry(&mut self, rect: Rectangle<i32, Logical>) {
        self.frame_geometry = rect;
        let client = self.client_geometry();
        let buffer_size = if self.buffer_geometry.size.is_empty() {
            client.size
        } else {
            self.buffer_geometry.size
        };
        self.buffer_geometry = Rectangle::new(client.loc - self.window_geometry.loc, buffer_size);
    }

    pub fn set_buffer_size(&mut self, size: Size<i32, Logical>) {
        self.buffer_geometry.size = size;
    }

    pub fn move_to(&mut self, loc: Point<i32, Logical>) {
        let rect = Rectangle::new(loc, self.frame_geometry.size);
        self.set_frame_geometry(rect);
    }

    pub fn is_x11(&self) -> bool {
        matches!(self.kind, WindowKind::X11Managed | WindowKind::X11Unmanaged)
    }

    pub fn is_wayland(&self) -> bool {
        matches!(
            self.kind,
            WindowKind::WaylandToplevel | WindowKind::WaylandPopup
        )
    }

    pub fn is_unmanaged(&self) -> bool {
        self.kind == WindowKind::X11Unmanaged
    }

    pub fn is_internal(&self) -> bool {
        self.kind == WindowKind::Internal
    }

    /// Whether this is a managed, user-facing window, as opposed to unmanaged and popup windows.
    pub fn is_client(&self) -> bool {
        matches!(
            self.kind,
            WindowKind::X11Managed | WindowKind::WaylandToplevel | WindowKind::Internal
        )
    }

    pub fn is_desktop(&self) -> bool {
        self.window_type == WindowType::Desktop
    }

    pub fn is_dock(&self) -> bool {
        self.window_type == WindowType::Dock
    }

    pub fn is_splash(&self) -> bool {
        self.window_type == WindowType::Splash
    }

    pub fn is_normal_window(&self) -> bool {
        self.window_type == WindowType::Normal
    }

    pub fn is_dialog(&self) -> bool {
        self.window_type == WindowType::Dialog
    }

    pub fn is_popup_window(&self) -> bool {
        self.kind == WindowKind::WaylandPopup
            || matches!(
                self.window_type,
                WindowType::ComboBox
                    | WindowType::DropdownMenu
                    | WindowType::PopupMenu
                    | WindowType::Tooltip
            )
    }

    pub fn is_special_window(&self) -> bool {
        matches!(
            self.window_type,
            WindowType::Desktop
                | WindowType::Dock
                | WindowType::Splash
                | WindowType::Toolbar
                | WindowType::Notification
                | WindowType::OnScreenDisplay
                | WindowType::CriticalNotification
        )
    }

    pub fn is_transient(&self) -> bool {
        self.transient_for.is_some()
    }

    pub fn is_minimized(&self) -> bool {
        self.states.minimized
    }

    pub fn is_fullscreen(&self) -> bool {
        self.states.fullscreen
    }

    pub fn maximize_mode(&self) -> MaximizeMode {
        self.states.maximize
    }

    pub fn keep_above(&self) -> bool {
        self.states.keep_above
    }

    pub fn keep_below(&self) -> bool {
        self.states.keep_below
    }

    pub fn is_shown(&self) -> bool {
        !self.states.minimized && !self.hidden
    }

    pub fn is_on_desktop(&self, desktop: u32) -> bool {
        self.on_all_desktops || self.desktop == desktop
    }

    /// Whether the window takes part in the focus chain.
    pub fn wants_tab_focus(&self) -> bool {
        let suitable_type = matches!(
            self.window_type,
            WindowType::Normal | WindowType::Dialog | WindowType::Utility
        );
        suitable_type && self.wants_input && !self.states.skip_switcher
    }

    /// Maximize mode the window will have once its pending configures are applied.
    pub fn requested_maximize_mode(&self) -> MaximizeMode {
        self.configure
            .latest()
            .map_or(self.states.maximize, |c| c.maximize)
    }

    pub fn requested_fullscreen(&self) -> bool {
        self.configure
            .latest()
            .map_or(self.states.fullscreen, |c| c.fullscreen)
    }

    /// Whether the window can receive keyboard focus at all.
    pub fn can_accept_focus(&self) -> bool {
        if !self.is_client() || !self.ready_for_painting {
            return false;
        }
        self.rules.check_accept_focus(self.wants_input, false)
    }

    pub fn match_props(&self) -> MatchProps<'_> {
        let app_id = (!self.app_id.is_empty()).then_some(self.app_id.as_str());
        MatchProps {
            app_id: if self.is_wayland() { app_id } else { None },
            title: Some(self.title.as_str()),
            class: if self.is_x11() { app_id } else { None },
            desktop_file: (!self.desktop_file_name.is_empty())
                .then_some(self.desktop_file_name.as_str()),
        }
    }
}
