pub mod decoration;
pub mod dmabuf;
pub mod lockscreen_overlay;
pub mod plasma_shell;
pub mod shortcuts_inhibit;
pub mod wl_drm;
pub mod xwayland_keyboard_grab;
