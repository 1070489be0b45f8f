//! Paint chain and the data flowing through it.
//!
//! Painting a frame runs each chain once: the screen chains, then the window chains for every
//! window bottom to top. Every step goes through the painting effects in chain order, each one
//! passing on to the next with the [`PaintChain`] it is handed. After the last effect the
//! [`FinalPaint`] sink of the scene does the actual work.

use std::time::Duration;

use bitflags::bitflags;
use glam::{DMat4, DVec3};
use smithay::utils::{Logical, Rectangle};

use super::LoadedEffect;
use crate::output::OutputId;
use crate::utils::region::Region;
use crate::window::{Window, WindowId};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PaintMask: u32 {
        const WINDOW_OPAQUE = 1 << 0;
        const WINDOW_TRANSLUCENT = 1 << 1;
        const WINDOW_TRANSFORMED = 1 << 2;
        /// Only the given region of the screen is painted.
        const SCREEN_REGION = 1 << 3;
        const SCREEN_TRANSFORMED = 1 << 4;
        const SCREEN_WITH_TRANSFORMED_WINDOWS = 1 << 5;
        const SCREEN_BACKGROUND_FIRST = 1 << 6;
    }
}

#[derive(Debug, Clone)]
pub struct ScreenPrePaintData {
    pub output: OutputId,
    pub mask: PaintMask,
    /// Area that will be repainted; effects may grow it.
    pub paint: Region,
}

#[derive(Debug, Clone)]
pub struct ScreenPaintData {
    pub output: OutputId,
    pub mask: PaintMask,
    pub region: Region,
}

#[derive(Debug, Clone)]
pub struct WindowPrePaintData {
    pub mask: PaintMask,
    pub paint: Region,
    /// Part of the window known to be opaque.
    pub opaque: Region,
}

impl WindowPrePaintData {
    pub fn set_translucent(&mut self) {
        self.mask.remove(PaintMask::WINDOW_OPAQUE);
        self.mask.insert(PaintMask::WINDOW_TRANSLUCENT);
        self.opaque = Region::new();
    }

    pub fn set_transformed(&mut self) {
        self.mask.insert(PaintMask::WINDOW_TRANSFORMED);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPaintData {
    pub opacity: f64,
    pub brightness: f64,
    pub saturation: f64,
    pub translation: DVec3,
    pub scale: DVec3,
}

impl Default for WindowPaintData {
    fn default() -> Self {
        Self {
            opacity: 1.,
            brightness: 1.,
            saturation: 1.,
            translation: DVec3::ZERO,
            scale: DVec3::ONE,
        }
    }
}

impl WindowPaintData {
    pub fn multiply_opacity(&mut self, factor: f64) {
        self.opacity = (self.opacity * factor).clamp(0., 1.);
    }

    pub fn multiply_brightness(&mut self, factor: f64) {
        self.brightness = (self.brightness * factor).max(0.);
    }

    pub fn multiply_saturation(&mut self, factor: f64) {
        self.saturation = (self.saturation * factor).max(0.);
    }

    pub fn is_transformed(&self) -> bool {
        self.translation != DVec3::ZERO || self.scale != DVec3::ONE
    }

    /// Scales about the window origin, then translates.
    pub fn transform(&self) -> DMat4 {
        DMat4::from_translation(self.translation) * DMat4::from_scale(self.scale)
    }
}

/// What effects get to see of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectWindow {
    pub id: WindowId,
    pub frame: Rectangle<i32, Logical>,
    pub active: bool,
    pub opacity: f64,
    pub desktop: bool,
    pub dock: bool,
    pub special: bool,
    pub minimized: bool,
    /// The window is closed and only painted for an effect.
    pub deleted: bool,
}

impl EffectWindow {
    pub fn new(window: &Window) -> Self {
        Self {
            id: window.id,
            frame: window.frame_geometry(),
            active: window.active,
            opacity: window.opacity,
            desktop: window.is_desktop(),
            dock: window.is_dock(),
            special: window.is_special_window(),
            minimized: window.is_minimized(),
            deleted: false,
        }
    }
}

/// Last step of every chain, implemented by the scene.
pub trait FinalPaint {
    fn final_pre_paint_screen(&mut self, _data: &mut ScreenPrePaintData, _present_time: Duration) {
    }
    fn final_paint_screen(&mut self, data: &mut ScreenPaintData);
    fn final_post_paint_screen(&mut self) {}

    fn final_pre_paint_window(&mut self, _window: &EffectWindow, _data: &mut WindowPrePaintData) {}
    fn final_paint_window(
        &mut self,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    );
    fn final_draw_window(
        &mut self,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    );
    fn final_post_paint_window(&mut self, _window: &EffectWindow) {}
}

/// Rest of a paint chain.
pub struct PaintChain<'a> {
    effects: &'a mut [LoadedEffect],
    sink: &'a mut dyn FinalPaint,
}

impl<'a> PaintChain<'a> {
    pub(super) fn new(effects: &'a mut [LoadedEffect], sink: &'a mut dyn FinalPaint) -> Self {
        Self { effects, sink }
    }

    /// Splits off the next painting effect and the chain after it.
    fn next(&mut self) -> Option<(&mut LoadedEffect, PaintChain<'_>)> {
        let index = self.effects.iter().position(|e| e.painting)?;
        let (current, rest) = self.effects[index..].split_first_mut()?;
        let chain = PaintChain {
            effects: rest,
            sink: &mut *self.sink,
        };
        Some((current, chain))
    }

    pub fn pre_paint_screen(&mut self, data: &mut ScreenPrePaintData, present_time: Duration) {
        match self.next() {
            Some((current, mut chain)) => {
                current
                    .effect
                    .pre_paint_screen(&mut chain, data, present_time);
            }
            None => self.sink.final_pre_paint_screen(data, present_time),
        }
    }

    pub fn paint_screen(&mut self, data: &mut ScreenPaintData) {
        match self.next() {
            Some((current, mut chain)) => current.effect.paint_screen(&mut chain, data),
            None => self.sink.final_paint_screen(data),
        }
    }

    pub fn post_paint_screen(&mut self) {
        match self.next() {
            Some((current, mut chain)) => current.effect.post_paint_screen(&mut chain),
            None => self.sink.final_post_paint_screen(),
        }
    }

    pub fn pre_paint_window(
        &mut self,
        window: &EffectWindow,
        data: &mut WindowPrePaintData,
        present_time: Duration,
    ) {
        match self.next() {
            Some((current, mut chain)) => {
                current
                    .effect
                    .pre_paint_window(&mut chain, window, data, present_time);
            }
            None => self.sink.final_pre_paint_window(window, data),
        }
    }

    pub fn paint_window(
        &mut self,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        match self.next() {
            Some((current, mut chain)) => {
                current
                    .effect
                    .paint_window(&mut chain, window, mask, region, data);
            }
            None => self.sink.final_paint_window(window, mask, region, data),
        }
    }

    pub fn draw_window(
        &mut self,
        window: &EffectWindow,
        mask: PaintMask,
        region: &Region,
        data: &mut WindowPaintData,
    ) {
        match self.next() {
            Some((current, mut chain)) => {
                current
                    .effect
                    .draw_window(&mut chain, window, mask, region, data);
            }
            None => self.sink.final_draw_window(window, mask, region, data),
        }
    }

    pub fn post_paint_window(&mut self, window: &EffectWindow) {
        match self.next() {
            Some((current, mut chain)) => current.effect.post_paint_window(&mut chain, window),
            None => self.sink.final_post_paint_window(window),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn translucent_clears_opaque() {
        let mut data = WindowPrePaintData {
            mask: PaintMask::WINDOW_OPAQUE,
            paint: Region::new(),
            opaque: Region::from_rect(Rectangle::new((0, 0).into(), (10, 10).into())),
        };
        data.set_translucent();
        assert_eq!(data.mask, PaintMask::WINDOW_TRANSLUCENT);
        assert!(data.opaque.is_empty());
    }

    #[test]
    fn paint_data_transform() {
        let mut data = WindowPaintData::default();
        assert!(!data.is_transformed());
        data.scale = DVec3::new(2., 2., 1.);
        data.translation = DVec3::new(10., 0., 0.);
        let p = data.transform().transform_point3(DVec3::new(5., 5., 0.));
        assert_abs_diff_eq!(p.x, 20.);
        assert_abs_diff_eq!(p.y, 10.);

        data.multiply_opacity(0.5);
        data.multiply_opacity(3.);
        assert_abs_diff_eq!(data.opacity, 1.);
    }
}
