//! Work areas.
//!
//! Docks reserve space along the screen edges with struts. The areas left over are where windows
//! get placed and maximized.

use std::collections::HashMap;

use smithay::utils::{Logical, Rectangle};

use super::{Workspace, WorkspaceEvent};
use crate::output::{OutputId, Outputs};
use crate::utils::clamp_rect_into;
use crate::window::{Struts, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAreaOption {
    /// Where new windows get placed.
    PlacementArea,
    /// Where windows may be moved to.
    MovementArea,
    MaximizeArea,
    /// Maximize area ignoring struts.
    MaximizeFullArea,
    FullScreenArea,
    /// Work area across all outputs.
    WorkArea,
    /// Everything, across all outputs.
    FullArea,
    ScreenArea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Default)]
pub struct Areas {
    pub(super) outputs: Vec<(OutputId, Rectangle<i32, Logical>)>,
    /// Per-output areas of desktops `1..=count`.
    screen_areas: Vec<HashMap<OutputId, Rectangle<i32, Logical>>>,
    work_areas: Vec<Rectangle<i32, Logical>>,
}

impl Areas {
    fn full_area(&self) -> Rectangle<i32, Logical> {
        self.outputs
            .iter()
            .map(|(_, g)| *g)
            .reduce(|a, b| a.merge(b))
            .unwrap_or_default()
    }

    fn output_geometry(&self, output: OutputId) -> Option<Rectangle<i32, Logical>> {
        self.outputs
            .iter()
            .find(|(id, _)| *id == output)
            .map(|(_, g)| *g)
    }
}

fn strut_rects(
    struts: Struts,
    full: Rectangle<i32, Logical>,
) -> impl Iterator<Item = (Edge, Rectangle<i32, Logical>)> {
    let right = full.loc.x + full.size.w;
    let bottom = full.loc.y + full.size.h;
    [
        (
            Edge::Left,
            Rectangle::new(full.loc, (struts.left, full.size.h).into()),
        ),
        (
            Edge::Right,
            Rectangle::new(
                (right - struts.right, full.loc.y).into(),
                (struts.right, full.size.h).into(),
            ),
        ),
        (
            Edge::Top,
            Rectangle::new(full.loc, (full.size.w, struts.top).into()),
        ),
        (
            Edge::Bottom,
            Rectangle::new(
                (full.loc.x, bottom - struts.bottom).into(),
                (full.size.w, struts.bottom).into(),
            ),
        ),
    ]
    .into_iter()
    .filter(|(_, rect)| !rect.is_empty())
}

/// Shrinks `area` so that it doesn't overlap the strut along its edge.
fn restrict(
    area: Rectangle<i32, Logical>,
    edge: Edge,
    strut: Rectangle<i32, Logical>,
) -> Rectangle<i32, Logical> {
    let Some(overlap) = area.intersection(strut) else {
        return area;
    };
    let (mut x1, mut y1) = (area.loc.x, area.loc.y);
    let (mut x2, mut y2) = (x1 + area.size.w, y1 + area.size.h);
    match edge {
        Edge::Left => x1 = x1.max(overlap.loc.x + overlap.size.w),
        Edge::Right => x2 = x2.min(overlap.loc.x),
        Edge::Top => y1 = y1.max(overlap.loc.y + overlap.size.h),
        Edge::Bottom => y2 = y2.min(overlap.loc.y),
    }
    Rectangle::from_extremities((x1, y1), (x2.max(x1), y2.max(y1)))
}

impl Workspace {
    /// Takes a new output layout into account.
    pub fn set_output_layout(&mut self, outputs: &Outputs) {
        self.areas.outputs = outputs.iter().map(|o| (o.id, o.geometry)).collect();
        if self
            .active_output
            .is_some_and(|a| outputs.get(a).is_none())
        {
            self.active_output = outputs.first();
        }
        if self.active_output.is_none() {
            self.active_output = outputs.first();
        }
        self.update_window_outputs(outputs);
        self.update_work_area();
    }

    /// Recomputes the work areas from the struts of the current docks.
    pub fn update_work_area(&mut self) {
        let full = self.areas.full_area();
        let mut screen_areas = Vec::with_capacity(self.desktop_count() as usize);
        let mut work_areas = Vec::with_capacity(self.desktop_count() as usize);

        for desktop in 1..=self.desktop_count() {
            let struts: Vec<_> = self
                .windows()
                .filter(|w| {
                    !w.struts.is_empty() && w.is_on_desktop(desktop) && !w.is_minimized()
                })
                .flat_map(|w| strut_rects(w.struts, full))
                .collect();

            let mut work_area = full;
            let mut per_output = HashMap::new();
            for (id, geometry) in &self.areas.outputs {
                let mut area = *geometry;
                for (edge, rect) in &struts {
                    area = restrict(area, *edge, *rect);
                    work_area = restrict(work_area, *edge, *rect);
                }
                per_output.insert(*id, area);
            }
            screen_areas.push(per_output);
            work_areas.push(work_area);
        }

        let changed = screen_areas != self.areas.screen_areas || work_areas != self.areas.work_areas;
        self.areas.screen_areas = screen_areas;
        self.areas.work_areas = work_areas;
        if changed {
            debug!("work areas changed: {:?}", self.areas.work_areas);
            self.push_event(WorkspaceEvent::WorkAreaChanged);
        }
    }

    /// Area of the given kind on an output and desktop.
    pub fn client_area(
        &self,
        option: ClientAreaOption,
        output: OutputId,
        desktop: u32,
    ) -> Rectangle<i32, Logical> {
        let index = desktop.saturating_sub(1) as usize;
        let output_geometry = self.areas.output_geometry(output).unwrap_or_default();
        match option {
            ClientAreaOption::PlacementArea | ClientAreaOption::MaximizeArea => self
                .areas
                .screen_areas
                .get(index)
                .and_then(|areas| areas.get(&output))
                .copied()
                .unwrap_or(output_geometry),
            ClientAreaOption::MaximizeFullArea
            | ClientAreaOption::FullScreenArea
            | ClientAreaOption::MovementArea
            | ClientAreaOption::ScreenArea => output_geometry,
            ClientAreaOption::WorkArea => self
                .areas
                .work_areas
                .get(index)
                .copied()
                .unwrap_or_else(|| self.areas.full_area()),
            ClientAreaOption::FullArea => self.areas.full_area(),
        }
    }

    /// Area of the given kind for a window, on its output and desktop.
    pub fn client_area_for(&self, option: ClientAreaOption, id: WindowId) -> Rectangle<i32, Logical> {
        let Some(window) = self.window(id) else {
            return Rectangle::default();
        };
        let output = window
            .output
            .or(self.active_output)
            .or_else(|| self.areas.outputs.first().map(|(id, _)| *id));
        let desktop = if window.on_all_desktops {
            self.current_desktop()
        } else {
            window.desktop
        };
        match output {
            Some(output) => self.client_area(option, output, desktop),
            None => Rectangle::default(),
        }
    }

    /// Computes where a window has to go after its work area changed.
    ///
    /// `old_area` is the placement area the window was laid out in. A window touching an edge of
    /// the old area keeps touching the same edge. Returns `None` when the frame stays as is.
    pub fn check_workspace_position(
        &self,
        id: WindowId,
        old_frame: Rectangle<i32, Logical>,
        old_area: Option<Rectangle<i32, Logical>>,
    ) -> Option<Rectangle<i32, Logical>> {
        let window = self.window(id)?;
        if !window.is_client() || (window.is_special_window() && !window.is_desktop()) {
            return None;
        }

        let target = if window.is_desktop() {
            self.client_area_for(ClientAreaOption::FullArea, id)
        } else if window.is_fullscreen() {
            self.client_area_for(ClientAreaOption::FullScreenArea, id)
        } else if !window.maximize_mode().is_empty() {
            let area = self.client_area_for(ClientAreaOption::MaximizeArea, id);
            let mut rect = old_frame;
            let mode = window.maximize_mode();
            if mode.contains(crate::window::MaximizeMode::HORIZONTAL) {
                rect.loc.x = area.loc.x;
                rect.size.w = area.size.w;
            }
            if mode.contains(crate::window::MaximizeMode::VERTICAL) {
                rect.loc.y = area.loc.y;
                rect.size.h = area.size.h;
            }
            rect
        } else {
            let area = self.client_area_for(ClientAreaOption::PlacementArea, id);
            let mut rect = old_frame;
            if let Some(old) = old_area {
                let right = |r: Rectangle<i32, Logical>| r.loc.x + r.size.w;
                let bottom = |r: Rectangle<i32, Logical>| r.loc.y + r.size.h;
                if rect.loc.x == old.loc.x {
                    rect.loc.x = area.loc.x;
                } else if right(rect) == right(old) {
                    rect.loc.x = right(area) - rect.size.w;
                }
                if rect.loc.y == old.loc.y {
                    rect.loc.y = area.loc.y;
                } else if bottom(rect) == bottom(old) {
                    rect.loc.y = bottom(area) - rect.size.h;
                }
            }
            if !area.is_empty() {
                rect.size.w = rect.size.w.min(area.size.w);
                rect.size.h = rect.size.h.min(area.size.h);
                rect = clamp_rect_into(rect, area);
            }
            rect
        };

        (target != old_frame).then_some(target)
    }
}

#[cfg(test)]
mod tests {
    use smithay::utils::Rectangle;

    use super::*;
    use crate::output::Output;
    use crate::window::{MaximizeMode, Window, WindowKind, WindowType};
    use crate::workspace::tests::{toplevel, workspace};

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle<i32, Logical> {
        Rectangle::new((x, y).into(), (w, h).into())
    }

    fn two_outputs() -> (Outputs, OutputId, OutputId) {
        let mut outputs = Outputs::new();
        let a = Output::new("a".into(), (1000, 800).into(), 1., (0, 0).into());
        let b = Output::new("b".into(), (1000, 800).into(), 1., (1000, 0).into());
        let (a_id, b_id) = (a.id, b.id);
        outputs.add(a);
        outputs.add(b);
        (outputs, a_id, b_id)
    }

    fn dock(ws: &mut Workspace, struts: Struts) -> WindowId {
        let mut window = Window::new(WindowKind::X11Managed);
        window.window_type = WindowType::Dock;
        window.struts = struts;
        window.on_all_desktops = true;
        ws.add_window(window)
    }

    #[test]
    fn struts_shrink_their_output_only() {
        let mut ws = workspace();
        let (outputs, a, b) = two_outputs();
        ws.set_output_layout(&outputs);

        dock(
            &mut ws,
            Struts {
                left: 40,
                ..Default::default()
            },
        );
        dock(
            &mut ws,
            Struts {
                bottom: 30,
                ..Default::default()
            },
        );

        use ClientAreaOption::*;
        assert_eq!(ws.client_area(MaximizeArea, a, 1), rect(40, 0, 960, 770));
        assert_eq!(ws.client_area(MaximizeArea, b, 1), rect(1000, 0, 1000, 770));
        assert_eq!(ws.client_area(FullScreenArea, a, 1), rect(0, 0, 1000, 800));
        assert_eq!(ws.client_area(WorkArea, a, 2), rect(40, 0, 1960, 770));
        assert_eq!(ws.client_area(FullArea, a, 1), rect(0, 0, 2000, 800));
        assert!(ws.take_events().contains(&WorkspaceEvent::WorkAreaChanged));
    }

    #[test]
    fn minimized_docks_release_struts() {
        let mut ws = workspace();
        let (outputs, a, _) = two_outputs();
        ws.set_output_layout(&outputs);
        let d = dock(
            &mut ws,
            Struts {
                top: 25,
                ..Default::default()
            },
        );
        assert_eq!(
            ws.client_area(ClientAreaOption::PlacementArea, a, 1),
            rect(0, 25, 1000, 775)
        );

        ws.set_minimized(d, true);
        assert_eq!(
            ws.client_area(ClientAreaOption::PlacementArea, a, 1),
            rect(0, 0, 1000, 800)
        );
    }

    #[test]
    fn windows_keep_their_edge() {
        let mut ws = workspace();
        let (outputs, a, _) = two_outputs();
        ws.set_output_layout(&outputs);
        let w = toplevel(&mut ws);
        ws.window_mut(w).unwrap().output = Some(a);

        let old_area = ws.client_area(ClientAreaOption::PlacementArea, a, 1);
        dock(
            &mut ws,
            Struts {
                top: 50,
                ..Default::default()
            },
        );

        // Touching the top edge, so it moves down with it.
        let old = rect(100, 0, 300, 300);
        assert_eq!(
            ws.check_workspace_position(w, old, Some(old_area)),
            Some(rect(100, 50, 300, 300))
        );

        // Bottom edge is kept.
        let old = rect(100, 500, 300, 300);
        assert_eq!(ws.check_workspace_position(w, old, Some(old_area)), None);

        // Too tall windows are shrunk.
        let old = rect(0, 100, 300, 790);
        assert_eq!(
            ws.check_workspace_position(w, old, Some(old_area)),
            Some(rect(0, 50, 300, 750))
        );
    }

    #[test]
    fn maximized_windows_follow_the_area() {
        let mut ws = workspace();
        let (outputs, a, _) = two_outputs();
        ws.set_output_layout(&outputs);
        let w = toplevel(&mut ws);
        ws.window_mut(w).unwrap().output = Some(a);
        ws.window_mut(w).unwrap().states.maximize = MaximizeMode::VERTICAL;

        dock(
            &mut ws,
            Struts {
                bottom: 100,
                ..Default::default()
            },
        );
        assert_eq!(
            ws.check_workspace_position(w, rect(10, 0, 200, 800), None),
            Some(rect(10, 0, 200, 700))
        );
    }
}
