// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Reference backend running every pass on the CPU. Sampling follows the
//! GPU kernels exactly, so it doubles as the test oracle and the probe's
//! headless renderer.

use glam::{Vec2, Vec4};
use std::mem;
use std::ops::{Add, Mul};

use super::grid::{cell_uv, is_border, Grid};
use super::{FieldId, FluidBackend, PassDescriptor, PassKind, StepParams};
use crate::error::EtherError;
use crate::output::{shade, to_rgba8, Canvas};
use crate::palette::PaletteTexture;
use crate::settings::EtherSettings;
use crate::viewport::GridSize;

const VECTOR_SLOTS: usize = 4;

pub struct CpuFields {
    size: GridSize,
    vectors: [Grid<Vec2>; VECTOR_SLOTS],
    scalars: [Grid<f32>; 3],
    params: StepParams,
    palette: PaletteTexture,
    background: Vec4,
    output_size: (u32, u32),
    canvas: Option<Canvas>,
    released: bool,
}

impl CpuFields {
    pub fn new(settings: &EtherSettings) -> Self {
        Self {
            size: GridSize::new(1, 1),
            vectors: Default::default(),
            scalars: Default::default(),
            params: bytemuck::Zeroable::zeroed(),
            palette: PaletteTexture::from_stops(&settings.colors),
            background: Vec4::from_array(settings.background_color),
            output_size: (1, 1),
            canvas: None,
            released: false,
        }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn vector(&self, id: FieldId) -> &Grid<Vec2> {
        &self.vectors[vector_index(id)]
    }

    pub fn vector_mut(&mut self, id: FieldId) -> &mut Grid<Vec2> {
        &mut self.vectors[vector_index(id)]
    }

    pub fn scalar(&self, id: FieldId) -> &Grid<f32> {
        &self.scalars[scalar_index(id)]
    }

    pub fn canvas(&self) -> Option<&Canvas> {
        self.canvas.as_ref()
    }

    /// Parameters of the most recent step.
    pub fn params(&self) -> &StepParams {
        &self.params
    }

    /// Divergence of any vector field, computed with the solver's own
    /// stencil and the last step's `dt`.
    pub fn divergence_of(&self, id: FieldId) -> Grid<f32> {
        let mut out = Grid::new(self.size);
        divergence(&self.params, self.vector(id), &mut out);
        out
    }
}

fn vector_index(id: FieldId) -> usize {
    debug_assert!(id.is_vector(), "{:?} is not a vector field", id);
    id.slot().min(VECTOR_SLOTS - 1)
}

fn scalar_index(id: FieldId) -> usize {
    debug_assert!(!id.is_vector(), "{:?} is not a scalar field", id);
    id.slot().saturating_sub(VECTOR_SLOTS)
}

impl FluidBackend for CpuFields {
    fn allocate(&mut self, grid: GridSize) -> Result<(), EtherError> {
        self.size = grid;
        for field in &mut self.vectors {
            *field = Grid::new(grid);
        }
        for field in &mut self.scalars {
            *field = Grid::new(grid);
        }
        if !self.released && self.canvas.is_none() {
            self.canvas = Some(Canvas::new(self.output_size.0, self.output_size.1));
        }
        Ok(())
    }

    fn begin_step(&mut self, params: &StepParams) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        self.params = *params;
        Ok(())
    }

    fn run_pass(&mut self, pass: &PassDescriptor) {
        if self.released {
            return;
        }
        debug_assert!(pass.reads().all(|f| f != pass.output));

        let p = self.params;
        match pass.kind {
            PassKind::Advect => {
                let mut out = mem::take(&mut self.vectors[vector_index(pass.output)]);
                advect(&p, self.vector(pass.primary), &mut out);
                self.vectors[vector_index(pass.output)] = out;
            }
            PassKind::ExternalForce => {
                let mut out = mem::take(&mut self.vectors[vector_index(pass.output)]);
                external_force(&p, self.vector(pass.primary), &mut out);
                self.vectors[vector_index(pass.output)] = out;
            }
            PassKind::Viscous => {
                let mut out = mem::take(&mut self.vectors[vector_index(pass.output)]);
                viscous(&p, self.vector(pass.primary), self.vector(pass.secondary_or_primary()), &mut out);
                self.vectors[vector_index(pass.output)] = out;
            }
            PassKind::Divergence => {
                let mut out = mem::take(&mut self.scalars[scalar_index(pass.output)]);
                divergence(&p, self.vector(pass.primary), &mut out);
                self.scalars[scalar_index(pass.output)] = out;
            }
            PassKind::Poisson => {
                let mut out = mem::take(&mut self.scalars[scalar_index(pass.output)]);
                poisson(&p, self.scalar(pass.primary), self.scalar(pass.secondary_or_primary()), &mut out);
                self.scalars[scalar_index(pass.output)] = out;
            }
            PassKind::Project => {
                let mut out = mem::take(&mut self.vectors[vector_index(pass.output)]);
                project(&p, self.scalar(pass.primary), self.vector(pass.secondary_or_primary()), &mut out);
                self.vectors[vector_index(pass.output)] = out;
            }
        }
    }

    fn end_step(&mut self) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        Ok(())
    }

    fn present(&mut self, velocity: FieldId, target: (u32, u32)) -> Result<(), EtherError> {
        if self.released {
            return Err(EtherError::Disposed);
        }
        self.resize_output(target.0, target.1);
        let Some(mut canvas) = self.canvas.take() else {
            return Err(EtherError::Disposed);
        };

        let field = self.vector(velocity);
        let (w, h) = (canvas.width as f32, canvas.height as f32);
        for (i, px) in canvas.pixels.iter_mut().enumerate() {
            let x = (i as u32 % canvas.width) as f32;
            let y = (i as u32 / canvas.width) as f32;
            // Canvas rows run top-down, the grid is y-up.
            let uv = Vec2::new((x + 0.5) / w, 1.0 - (y + 0.5) / h);
            *px = to_rgba8(shade(field.sample(uv), &self.palette, self.background));
        }

        self.canvas = Some(canvas);
        Ok(())
    }

    fn resize_output(&mut self, width: u32, height: u32) {
        self.output_size = (width.max(1), height.max(1));
        if let Some(canvas) = &mut self.canvas {
            if (canvas.width, canvas.height) != self.output_size {
                *canvas = Canvas::new(self.output_size.0, self.output_size.1);
            }
        }
    }

    fn has_canvas(&self) -> bool {
        self.canvas.is_some()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.vectors = Default::default();
        self.scalars = Default::default();
        self.canvas = None;
        self.released = true;
        log::debug!("CPU fields released");
    }
}

/// Writes every cell of `out`; with bounce off the one-cell border ring is
/// left at zero.
fn fill_cells<T>(out: &mut Grid<T>, bounce: bool, mut kernel: impl FnMut(u32, u32, Vec2) -> T)
where
    T: Copy + Default + Add<Output = T> + Mul<f32, Output = T>,
{
    let size = out.size();
    for y in 0..size.height {
        for x in 0..size.width {
            let value = if !bounce && is_border(size, x, y) {
                T::default()
            } else {
                kernel(x, y, cell_uv(size, x, y))
            };
            out.set(x, y, value);
        }
    }
}

pub fn advect(p: &StepParams, vel: &Grid<Vec2>, out: &mut Grid<Vec2>) {
    let fbo = vel.size().as_vec2();
    let ratio = Vec2::splat(fbo.max_element()) / fbo;
    let step = p.dt * ratio;

    fill_cells(out, p.bounce != 0, |_, _, uv| {
        let spot_old = uv - vel.sample(uv) * step;
        if p.bfecc == 0 {
            return vel.sample(spot_old);
        }
        let spot_new2 = spot_old + vel.sample(spot_old) * step;
        let error = spot_new2 - uv;
        let spot_new3 = uv - error / 2.0;
        let spot_old2 = spot_new3 - vel.sample(spot_new3) * step;
        vel.sample(spot_old2)
    });
}

pub fn external_force(p: &StepParams, vel: &Grid<Vec2>, out: &mut Grid<Vec2>) {
    let center = Vec2::from_array(p.center);
    let scale = Vec2::from_array(p.scale);
    let force = Vec2::from_array(p.force);

    fill_cells(out, p.bounce != 0, |x, y, uv| {
        let local = (uv * 2.0 - Vec2::ONE - center) / scale;
        let d = 1.0 - local.length().min(1.0);
        vel.get(x, y) + force * (d * d)
    });
}

pub fn viscous(p: &StepParams, old: &Grid<Vec2>, prev: &Grid<Vec2>, out: &mut Grid<Vec2>) {
    let k = p.viscosity * p.dt;
    fill_cells(out, p.bounce != 0, |x, y, _| {
        let (x, y) = (x as i64, y as i64);
        let sum = prev.fetch(x + 2, y) + prev.fetch(x - 2, y) + prev.fetch(x, y + 2) + prev.fetch(x, y - 2);
        (old.get(x as u32, y as u32) * 4.0 + sum * k) / (4.0 * (1.0 + k))
    });
}

pub fn divergence(p: &StepParams, vel: &Grid<Vec2>, out: &mut Grid<f32>) {
    fill_cells(out, p.bounce != 0, |x, y, _| {
        let (x, y) = (x as i64, y as i64);
        let x0 = vel.fetch(x - 1, y).x;
        let x1 = vel.fetch(x + 1, y).x;
        let y0 = vel.fetch(x, y - 1).y;
        let y1 = vel.fetch(x, y + 1).y;
        (x1 - x0 + y1 - y0) / 2.0 / p.dt
    });
}

pub fn poisson(p: &StepParams, pressure: &Grid<f32>, div: &Grid<f32>, out: &mut Grid<f32>) {
    fill_cells(out, p.bounce != 0, |x, y, _| {
        let (xi, yi) = (x as i64, y as i64);
        let sum = pressure.fetch(xi + 2, yi)
            + pressure.fetch(xi - 2, yi)
            + pressure.fetch(xi, yi + 2)
            + pressure.fetch(xi, yi - 2);
        sum / 4.0 - div.get(x, y)
    });
}

pub fn project(p: &StepParams, pressure: &Grid<f32>, vel: &Grid<Vec2>, out: &mut Grid<Vec2>) {
    fill_cells(out, p.bounce != 0, |x, y, _| {
        let (xi, yi) = (x as i64, y as i64);
        let grad = Vec2::new(
            pressure.fetch(xi + 1, yi) - pressure.fetch(xi - 1, yi),
            pressure.fetch(xi, yi + 1) - pressure.fetch(xi, yi - 1),
        ) * 0.5;
        vel.get(x, y) - grad * p.dt
    });
}
