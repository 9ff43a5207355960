// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use std::ops::{Add, Mul};

use crate::viewport::GridSize;

/// A row-major field with row 0 at the bottom (uv.y = 0), sampled with
/// the same rules as a clamp-to-edge texture: texel centers at
/// `(i + 0.5) / n`, bilinear filtering between them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T> Grid<T>
where
    T: Copy + Default + Add<Output = T> + Mul<f32, Output = T>,
{
    pub fn new(size: GridSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            data: vec![T::default(); size.cells()],
        }
    }

    pub fn size(&self) -> GridSize {
        GridSize::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Integer fetch with clamped indices.
    pub fn fetch(&self, x: i64, y: i64) -> T {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(cx, cy)
    }

    /// Bilinear lookup at a uv coordinate.
    pub fn sample(&self, uv: Vec2) -> T {
        let p = uv * Vec2::new(self.width as f32, self.height as f32) - Vec2::splat(0.5);
        let base = p.floor();
        let t = p - base;
        let x0 = base.x as i64;
        let y0 = base.y as i64;

        let a = self.fetch(x0, y0);
        let b = self.fetch(x0 + 1, y0);
        let c = self.fetch(x0, y0 + 1);
        let d = self.fetch(x0 + 1, y0 + 1);

        let bottom = a * (1.0 - t.x) + b * t.x;
        let top = c * (1.0 - t.x) + d * t.x;
        bottom * (1.0 - t.y) + top * t.y
    }
}

/// Texel-center uv of cell `(x, y)`.
pub fn cell_uv(size: GridSize, x: u32, y: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / size.width as f32,
        (y as f32 + 0.5) / size.height as f32,
    )
}

pub fn is_border(size: GridSize, x: u32, y: u32) -> bool {
    x == 0 || y == 0 || x + 1 == size.width || y + 1 == size.height
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Grid<f32> {
        let mut grid = Grid::new(GridSize::new(4, 2));
        for y in 0..2 {
            for x in 0..4 {
                grid.set(x, y, x as f32 + 10.0 * y as f32);
            }
        }
        grid
    }

    #[test]
    fn texel_centers_sample_exactly() {
        let grid = ramp();
        let size = grid.size();
        for y in 0..2 {
            for x in 0..4 {
                assert_eq!(grid.sample(cell_uv(size, x, y)), grid.get(x, y));
            }
        }
    }

    #[test]
    fn sampling_clamps_to_edge() {
        let grid = ramp();
        assert_eq!(grid.sample(Vec2::new(-3.0, -3.0)), 0.0);
        assert_eq!(grid.sample(Vec2::new(5.0, 5.0)), 13.0);
        assert_eq!(grid.fetch(-1, 7), 10.0);
    }

    #[test]
    fn bilinear_between_centers() {
        let grid = ramp();
        let mid = grid.sample(Vec2::new(0.25, 0.25));
        assert!((mid - 0.5).abs() < 1e-6);
        let vertical = grid.sample(Vec2::new(0.125, 0.5));
        assert!((vertical - 5.0).abs() < 1e-6);
    }

    #[test]
    fn border_ring() {
        let size = GridSize::new(5, 4);
        assert!(is_border(size, 0, 2));
        assert!(is_border(size, 4, 1));
        assert!(is_border(size, 2, 3));
        assert!(!is_border(size, 2, 2));
    }
}
