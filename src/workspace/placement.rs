//! Initial placement of new windows.

use smithay::utils::{Logical, Point, Rectangle, Size};

use super::areas::ClientAreaOption;
use super::Workspace;
use crate::utils::{center, clamp_rect_into};
use crate::window::WindowId;

/// Offset between cascaded windows.
const CASCADE_STEP: i32 = 24;

impl Workspace {
    /// Computes the frame geometry a newly mapped window should start with.
    ///
    /// `size` is the frame size the window asked for. Returns `None` when a rule dictates the
    /// position, in which case the requested geometry is kept.
    pub fn place_window(
        &self,
        id: WindowId,
        size: Size<i32, Logical>,
    ) -> Option<Rectangle<i32, Logical>> {
        let window = self.window(id)?;
        if window.rules.has_position(true) {
            let loc = window.rules.check_position(window.frame_geometry().loc, true);
            return Some(Rectangle::new(loc, size));
        }

        if window.is_desktop() {
            return Some(self.client_area_for(ClientAreaOption::ScreenArea, id));
        }

        let area = self.placement_area(id);
        if area.is_empty() {
            return None;
        }

        // Transients open over their main window.
        let parent = window
            .transient_for
            .and_then(|p| self.window(p))
            .filter(|p| !p.is_desktop());
        if let Some(parent) = parent {
            let c = center(parent.frame_geometry());
            let rect = Rectangle::new(c - size.downscale(2).to_point(), size);
            return Some(clamp_rect_into(rect, area));
        }

        let mut rect = Rectangle::new(center(area) - size.downscale(2).to_point(), size);
        if window.is_dialog() || window.is_splash() || window.is_dock() {
            return Some(clamp_rect_into(rect, area));
        }

        // Cascade past windows that already sit at the spot.
        let others = self.client_frames();
        let occupied = |loc: Point<i32, Logical>| {
            others
                .iter()
                .any(|(other, frame)| *other != id && frame.loc == loc)
        };
        let step = Point::from((CASCADE_STEP, CASCADE_STEP));
        let mut attempts = 0;
        while occupied(rect.loc) && attempts < 64 {
            rect.loc += step;
            let right = rect.loc.x + rect.size.w;
            let bottom = rect.loc.y + rect.size.h;
            if right > area.loc.x + area.size.w || bottom > area.loc.y + area.size.h {
                rect.loc = area.loc;
            }
            attempts += 1;
        }

        Some(clamp_rect_into(rect, area))
    }

    fn placement_area(&self, id: WindowId) -> Rectangle<i32, Logical> {
        let Some(window) = self.window(id) else {
            return Rectangle::default();
        };
        let desktop = if window.on_all_desktops {
            self.current_desktop()
        } else {
            window.desktop
        };
        // New windows open on the active output.
        let output = self
            .active_output
            .or(window.output)
            .or_else(|| self.areas.outputs.first().map(|(id, _)| *id));
        output.map_or_else(Rectangle::default, |output| {
            self.client_area(ClientAreaOption::PlacementArea, output, desktop)
        })
    }
}

#[cfg(test)]
mod tests {
    use strata_config::Config;

    use super::*;
    use crate::output::{Output, Outputs};
    use crate::window::rules::WindowRules;
    use crate::window::{Window, WindowKind, WindowType};
    use crate::workspace::tests::workspace;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn setup() -> Workspace {
        let mut ws = workspace();
        let mut outputs = Outputs::new();
        outputs.add(Output::new(
            "a".into(),
            (1000, 800).into(),
            1.,
            (0, 0).into(),
        ));
        ws.set_output_layout(&outputs);
        ws
    }

    fn map(ws: &mut Workspace, window: Window, size: (i32, i32)) -> WindowId {
        let id = ws.add_window(window);
        let geometry = ws.place_window(id, size.into()).unwrap();
        ws.window_mut(id).unwrap().set_frame_geometry(geometry);
        id
    }

    #[test]
    fn new_windows_are_centered_and_cascaded() {
        let mut ws = setup();
        let a = map(&mut ws, Window::new(WindowKind::WaylandToplevel), (200, 100));
        let b = map(&mut ws, Window::new(WindowKind::WaylandToplevel), (200, 100));
        let c = map(&mut ws, Window::new(WindowKind::WaylandToplevel), (200, 100));

        assert_eq!(ws.window(a).unwrap().frame_geometry(), rect(400, 350, 200, 100));
        assert_eq!(ws.window(b).unwrap().frame_geometry(), rect(424, 374, 200, 100));
        assert_eq!(ws.window(c).unwrap().frame_geometry(), rect(448, 398, 200, 100));
    }

    #[test]
    fn transients_open_over_parent() {
        let mut ws = setup();
        let mut parent = Window::new(WindowKind::WaylandToplevel);
        parent.set_frame_geometry(rect(0, 0, 400, 400));
        let parent = ws.add_window(parent);

        let mut dialog = Window::new(WindowKind::WaylandToplevel);
        dialog.window_type = WindowType::Dialog;
        dialog.transient_for = Some(parent);
        let dialog = ws.add_window(dialog);

        assert_eq!(
            ws.place_window(dialog, (100, 100).into()),
            Some(rect(150, 150, 100, 100))
        );
    }

    #[test]
    fn rule_position_wins() {
        let mut ws = setup();
        let config = Config::parse(
            "test.kdl",
            r#"
            window-rule {
                match app-id="^pinned$"
                position x=10 y=20
            }
            "#,
        )
        .unwrap();
        let mut window = Window::new(WindowKind::WaylandToplevel);
        window.app_id = "pinned".into();
        window.rules = WindowRules::compute(&config, &window.match_props());
        let id = ws.add_window(window);

        assert_eq!(
            ws.place_window(id, (100, 100).into()),
            Some(rect(10, 20, 100, 100))
        );
    }
}
