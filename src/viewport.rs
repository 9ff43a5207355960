// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;

/// Container bounds in host pixels (the coordinate space pointer events use).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ContainerRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Rect anchored at the origin, as for a window's inner area.
    pub fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        !self.is_empty()
            && x >= self.left
            && x <= self.left + self.width
            && y >= self.top
            && y <= self.top + self.height
    }

    /// Maps a client-space point into simulation space: [-1, 1] on both
    /// axes with +Y up. Points outside the rect (a captured drag) clamp to
    /// its edge. Returns `None` for a degenerate rect.
    pub fn normalize(&self, x: f32, y: f32) -> Option<Vec2> {
        if self.is_empty() {
            return None;
        }
        let nx = (x - self.left) / self.width;
        let ny = (y - self.top) / self.height;
        Some(Vec2::new(nx * 2.0 - 1.0, -(ny * 2.0 - 1.0)).clamp(Vec2::NEG_ONE, Vec2::ONE))
    }
}

/// Simulation grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }

    /// `max(1, round(resolution * dimension))` on both axes.
    pub fn scaled(resolution: f32, width: u32, height: u32) -> Self {
        let scale = |d: u32| ((resolution * d as f32).round() as u32).max(1);
        Self { width: scale(width), height: scale(height) }
    }

    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// One cell in uv units.
    pub fn cell_scale(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    pub fn as_vec2(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Tracks the container's size and pixel ratio and derives the drawing
/// buffer and simulation grid sizes from them.
#[derive(Debug, Clone)]
pub struct Viewport {
    rect: ContainerRect,
    scale_factor: f32,
    max_pixel_ratio: f32,
    css_width: u32,
    css_height: u32,
}

impl Viewport {
    pub fn new(max_pixel_ratio: f32) -> Self {
        Self {
            rect: ContainerRect::from_size(1.0, 1.0),
            scale_factor: 1.0,
            max_pixel_ratio: max_pixel_ratio.max(1.0),
            css_width: 1,
            css_height: 1,
        }
    }

    /// Records a new container rect. A zero-sized rect (mid-layout or a
    /// minimised window) is skipped and `false` is returned; the previous
    /// size stays in effect until a valid one arrives.
    pub fn observe(&mut self, rect: ContainerRect, scale_factor: f64) -> bool {
        if rect.is_empty() {
            log::debug!("Ignoring empty container rect {:?}", rect);
            return false;
        }
        let scale_factor = if scale_factor.is_finite() && scale_factor > 0.0 {
            scale_factor as f32
        } else {
            1.0
        };
        self.rect = rect;
        self.scale_factor = scale_factor;
        self.css_width = ((rect.width / scale_factor).floor() as u32).max(1);
        self.css_height = ((rect.height / scale_factor).floor() as u32).max(1);
        true
    }

    pub fn rect(&self) -> ContainerRect {
        self.rect
    }

    pub fn css_size(&self) -> (u32, u32) {
        (self.css_width, self.css_height)
    }

    pub fn aspect(&self) -> f32 {
        self.css_width as f32 / self.css_height as f32
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.scale_factor.min(self.max_pixel_ratio)
    }

    /// Size of the surface the output stage draws into.
    pub fn drawing_buffer(&self) -> (u32, u32) {
        let ratio = self.pixel_ratio();
        let scale = |d: u32| ((d as f32 * ratio).round() as u32).max(1);
        (scale(self.css_width), scale(self.css_height))
    }

    pub fn grid(&self, resolution: f32) -> GridSize {
        GridSize::scaled(resolution, self.css_width, self.css_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn corners_and_center_map_to_simulation_space() {
        let rect = ContainerRect::new(10.0, 20.0, 200.0, 100.0);
        assert_eq!(rect.normalize(10.0, 20.0), Some(Vec2::new(-1.0, 1.0)));
        assert_eq!(rect.normalize(210.0, 120.0), Some(Vec2::new(1.0, -1.0)));
        assert_eq!(rect.normalize(110.0, 70.0), Some(Vec2::ZERO));
    }

    #[test]
    fn points_outside_clamp_to_the_edge() {
        let rect = ContainerRect::from_size(64.0, 64.0);
        assert_eq!(rect.normalize(-200.0, 500.0), Some(Vec2::new(-1.0, -1.0)));
        assert_eq!(rect.normalize(96.0, 16.0), Some(Vec2::new(1.0, 0.5)));
        assert!(!rect.contains(-200.0, 500.0));
        assert!(rect.contains(64.0, 0.0));
    }

    #[test]
    fn empty_rect_is_skipped() {
        let mut viewport = Viewport::new(2.0);
        assert!(viewport.observe(ContainerRect::from_size(800.0, 600.0), 1.0));
        assert!(!viewport.observe(ContainerRect::from_size(0.0, 600.0), 1.0));
        assert_eq!(viewport.css_size(), (800, 600));
        assert_eq!(ContainerRect::from_size(0.0, 10.0).normalize(1.0, 1.0), None);
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let mut viewport = Viewport::new(2.0);
        viewport.observe(ContainerRect::from_size(900.0, 600.0), 3.0);
        assert_eq!(viewport.css_size(), (300, 200));
        assert_eq!(viewport.pixel_ratio(), 2.0);
        assert_eq!(viewport.drawing_buffer(), (600, 400));
    }

    proptest! {
        #[test]
        fn grid_matches_rounded_resolution(
            resolution in 0.0001f32..=1.0,
            width in 1u32..4096,
            height in 1u32..4096,
        ) {
            let grid = GridSize::scaled(resolution, width, height);
            prop_assert_eq!(grid.width, ((resolution * width as f32).round() as u32).max(1));
            prop_assert_eq!(grid.height, ((resolution * height as f32).round() as u32).max(1));
            prop_assert!(grid.width >= 1 && grid.height >= 1);
        }

        #[test]
        fn normalized_points_stay_in_unit_square(
            fx in -3.0f32..=3.0,
            fy in -3.0f32..=3.0,
            width in 1.0f32..5000.0,
            height in 1.0f32..5000.0,
        ) {
            let rect = ContainerRect::new(7.0, 3.0, width, height);
            let p = rect.normalize(7.0 + fx * width, 3.0 + fy * height).unwrap();
            prop_assert!((-1.0..=1.0).contains(&p.x));
            prop_assert!((-1.0..=1.0).contains(&p.y));
        }
    }
}
