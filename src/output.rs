use std::time::Duration;

use smithay::utils::{Logical, Physical, Point, Rectangle, Size, Transform};

use crate::utils::center;
use crate::utils::id::define_id;

define_id!(OutputId);

#[derive(Debug, Clone)]
pub struct Output {
    pub id: OutputId,
    pub name: String,
    /// Mode size in physical pixels.
    pub mode_size: Size<i32, Physical>,
    /// Refresh rate in mHz.
    pub refresh: u32,
    pub scale: f64,
    pub transform: Transform,
    /// Position and logical size in the global compositor space.
    pub geometry: Rectangle<i32, Logical>,
}

impl Output {
    pub fn new(
        name: String,
        mode_size: Size<i32, Physical>,
        scale: f64,
        position: Point<i32, Logical>,
    ) -> Self {
        let logical = mode_size.to_f64().to_logical(scale).to_i32_round();
        Self {
            id: OutputId::next(),
            name,
            mode_size,
            refresh: 60_000,
            scale,
            transform: Transform::Normal,
            geometry: Rectangle::new(position, logical),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        if self.refresh == 0 {
            return Duration::from_micros(16_667);
        }
        Duration::from_nanos(1_000_000_000_000 / u64::from(self.refresh))
    }
}

/// Ordered list of outputs.
#[derive(Debug, Default)]
pub struct Outputs {
    list: Vec<Output>,
}

/// Change in the output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    Added(OutputId),
    Removed(OutputId),
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, output: Output) -> OutputEvent {
        let id = output.id;
        debug!("output added: {} at {:?}", output.name, output.geometry);
        self.list.push(output);
        OutputEvent::Added(id)
    }

    pub fn remove(&mut self, id: OutputId) -> Option<(Output, OutputEvent)> {
        let idx = self.list.iter().position(|o| o.id == id)?;
        let output = self.list.remove(idx);
        debug!("output removed: {}", output.name);
        Some((output, OutputEvent::Removed(id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Output> + '_ {
        self.list.iter()
    }

    pub fn ids(&self) -> Vec<OutputId> {
        self.list.iter().map(|o| o.id).collect()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.list.iter().find(|o| o.id == id)
    }

    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.list.iter_mut().find(|o| o.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Output> {
        self.list.iter().find(|o| o.name == name)
    }

    pub fn first(&self) -> Option<OutputId> {
        self.list.first().map(|o| o.id)
    }

    pub fn geometry(&self, id: OutputId) -> Option<Rectangle<i32, Logical>> {
        self.get(id).map(|o| o.geometry)
    }

    pub fn output_at(&self, point: Point<f64, Logical>) -> Option<OutputId> {
        self.list
            .iter()
            .find(|o| o.geometry.to_f64().contains(point))
            .map(|o| o.id)
    }

    /// Output a window with the given frame is considered to be on.
    ///
    /// This is the output containing the center of the rectangle, or the closest one when the
    /// center is outside every output.
    pub fn output_for_rect(&self, rect: Rectangle<i32, Logical>) -> Option<OutputId> {
        let c = center(rect);
        if let Some(output) = self.list.iter().find(|o| o.geometry.contains(c)) {
            return Some(output.id);
        }

        self.list
            .iter()
            .min_by_key(|o| {
                let oc = center(o.geometry);
                let d = oc - c;
                i64::from(d.x).pow(2) + i64::from(d.y).pow(2)
            })
            .map(|o| o.id)
    }

    /// Bounding rectangle of all outputs.
    pub fn bounding_rect(&self) -> Rectangle<i32, Logical> {
        self.list
            .iter()
            .map(|o| o.geometry)
            .reduce(|a, b| a.merge(b))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_output_geometry() {
        let output = Output::new("a".into(), (3840, 2160).into(), 2., (0, 0).into());
        assert_eq!(output.geometry.size, Size::from((1920, 1080)));
        assert_eq!(output.refresh_interval(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn output_for_rect_picks_center() {
        let mut outputs = Outputs::new();
        let a = Output::new("a".into(), (1000, 1000).into(), 1., (0, 0).into());
        let b = Output::new("b".into(), (1000, 1000).into(), 1., (1000, 0).into());
        let (a_id, b_id) = (a.id, b.id);
        outputs.add(a);
        outputs.add(b);

        let rect = Rectangle::new((900, 0).into(), (400, 100).into());
        assert_eq!(outputs.output_for_rect(rect), Some(b_id));

        let outside = Rectangle::new((-500, 10).into(), (100, 100).into());
        assert_eq!(outputs.output_for_rect(outside), Some(a_id));

        assert_eq!(
            outputs.bounding_rect(),
            Rectangle::new((0, 0).into(), (2000, 1000).into())
        );
    }
}
