// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Stable-fluids solver: a fixed sequence of full-grid passes over
//! double-buffered fields, executed by a pluggable backend.

pub mod cpu;
pub mod gpu;
pub mod grid;
pub mod passes;

use glam::Vec2;

use crate::error::EtherError;
use crate::pointer::PointerSample;
use crate::settings::EtherSettings;
use crate::viewport::GridSize;

pub use passes::{plan_step, FieldId, PassDescriptor, PassKind, StepPlan};

/// The solver-relevant subset of the settings, fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub mouse_force: f32,
    pub cursor_size: f32,
    pub is_viscous: bool,
    pub viscous: f32,
    pub iterations_viscous: u32,
    pub iterations_poisson: u32,
    pub dt: f32,
    pub bfecc: bool,
    pub is_bounce: bool,
}

impl SolverOptions {
    pub fn from_settings(settings: &EtherSettings) -> Self {
        Self {
            mouse_force: settings.mouse_force,
            cursor_size: settings.cursor_size,
            is_viscous: settings.is_viscous,
            viscous: settings.viscous,
            iterations_viscous: settings.iterations_viscous,
            iterations_poisson: settings.iterations_poisson,
            dt: settings.dt,
            bfecc: settings.bfecc,
            is_bounce: settings.is_bounce,
        }
    }
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self::from_settings(&EtherSettings::default())
    }
}

/// Per-tick uniform block shared by every pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StepParams {
    pub fbo_size: [f32; 2],
    pub px: [f32; 2],
    pub force: [f32; 2],
    pub center: [f32; 2],
    pub scale: [f32; 2], // splat half extent in NDC
    pub dt: f32,
    pub viscosity: f32,
    pub bfecc: u32,
    pub bounce: u32,
    pub _pad: [u32; 2],
}

const _: [(); 64] = [(); std::mem::size_of::<StepParams>()];

/// A radial force injection in simulation space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub center: Vec2,
    pub force: Vec2,
}

impl Splat {
    pub const NONE: Splat = Splat { center: Vec2::ZERO, force: Vec2::ZERO };

    pub fn from_pointer(sample: &PointerSample, mouse_force: f32) -> Self {
        Self {
            center: sample.coords,
            force: sample.diff / 2.0 * mouse_force,
        }
    }
}

/// Executes passes on some storage. Implementations own the seven field
/// buffers and the output target.
pub trait FluidBackend {
    /// (Re)creates all fields at `grid`, zero-initialised.
    fn allocate(&mut self, grid: GridSize) -> Result<(), EtherError>;

    fn begin_step(&mut self, params: &StepParams) -> Result<(), EtherError>;

    fn run_pass(&mut self, pass: &PassDescriptor);

    fn end_step(&mut self) -> Result<(), EtherError>;

    /// Shades `velocity` into the output target of `target` pixels.
    fn present(&mut self, velocity: FieldId, target: (u32, u32)) -> Result<(), EtherError>;

    fn resize_output(&mut self, width: u32, height: u32);

    fn has_canvas(&self) -> bool;

    /// Frees every field and the output target. Further calls are no-ops
    /// or errors, never panics.
    fn release(&mut self);
}

pub struct FluidSolver<B: FluidBackend> {
    options: SolverOptions,
    grid: GridSize,
    parity: usize,
    backend: B,
}

impl<B: FluidBackend> FluidSolver<B> {
    pub fn new(mut backend: B, options: SolverOptions, grid: GridSize) -> Result<Self, EtherError> {
        backend.allocate(grid)?;
        log::info!("Fluid grid allocated at {}x{}", grid.width, grid.height);
        Ok(Self { options, grid, parity: 0, backend })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    /// Reallocates the fields when the grid changed. Returns whether it did.
    pub fn resize(&mut self, grid: GridSize) -> Result<bool, EtherError> {
        if grid == self.grid {
            return Ok(false);
        }
        self.backend.allocate(grid)?;
        log::debug!(
            "Fluid grid reallocated {}x{} -> {}x{}",
            self.grid.width,
            self.grid.height,
            grid.width,
            grid.height
        );
        self.grid = grid;
        self.parity = 0;
        Ok(true)
    }

    /// Builds the uniform block for one tick. The splat center is clamped
    /// so the force circle stays two cells inside the grid.
    pub fn step_params(&self, splat: &Splat) -> StepParams {
        let px = self.grid.cell_scale();
        let scale = px * self.options.cursor_size;
        let lo = Vec2::NEG_ONE + scale + px * 2.0;
        let hi = Vec2::ONE - scale - px * 2.0;
        // max/min rather than clamp: lo > hi when the cursor outgrows the grid.
        let center = splat.center.max(lo).min(hi);

        StepParams {
            fbo_size: self.grid.as_vec2().to_array(),
            px: px.to_array(),
            force: splat.force.to_array(),
            center: center.to_array(),
            scale: scale.to_array(),
            dt: self.options.dt,
            viscosity: self.options.viscous,
            bfecc: self.options.bfecc as u32,
            bounce: self.options.is_bounce as u32,
            _pad: [0; 2],
        }
    }

    /// Runs one full tick: advect, splat, diffuse, project.
    pub fn step(&mut self, splat: &Splat) -> Result<(), EtherError> {
        let params = self.step_params(splat);
        let plan = plan_step(&self.options, self.parity);

        self.backend.begin_step(&params)?;
        for pass in &plan.passes {
            self.backend.run_pass(pass);
        }
        self.backend.end_step()?;

        self.parity = plan.next_parity;
        Ok(())
    }

    pub fn current_velocity(&self) -> FieldId {
        FieldId::Velocity(self.parity)
    }

    pub fn present(&mut self, target: (u32, u32)) -> Result<(), EtherError> {
        let velocity = self.current_velocity();
        self.backend.present(velocity, target)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluid::cpu::CpuFields;

    fn solver(grid: GridSize, cursor_size: f32) -> FluidSolver<CpuFields> {
        let settings = EtherSettings { cursor_size, ..Default::default() };
        let backend = CpuFields::new(&settings);
        FluidSolver::new(backend, SolverOptions::from_settings(&settings), grid).unwrap()
    }

    #[test]
    fn splat_center_is_clamped_inside_the_grid() {
        let solver = solver(GridSize::new(100, 50), 10.0);
        let params = solver.step_params(&Splat { center: Vec2::new(1.0, -1.0), force: Vec2::X });
        assert!((params.center[0] - (1.0 - 0.1 - 0.02)).abs() < 1e-6);
        assert!((params.center[1] - (-1.0 + 0.2 + 0.04)).abs() < 1e-6);
        assert_eq!(params.force, [1.0, 0.0]);
    }

    #[test]
    fn oversized_cursor_does_not_panic() {
        let solver = solver(GridSize::new(8, 8), 100.0);
        let params = solver.step_params(&Splat { center: Vec2::new(0.3, 0.3), force: Vec2::ZERO });
        assert!(params.center[0].is_finite());
    }

    #[test]
    fn splat_force_is_half_diff_times_mouse_force() {
        let sample = PointerSample { coords: Vec2::new(0.2, 0.1), diff: Vec2::new(0.1, -0.2) };
        let splat = Splat::from_pointer(&sample, 20.0);
        assert!((splat.force - Vec2::new(1.0, -2.0)).length() < 1e-6);
        assert_eq!(splat.center, sample.coords);
    }

    #[test]
    fn resize_is_a_no_op_for_the_same_grid() {
        let mut solver = solver(GridSize::new(16, 16), 4.0);
        assert!(!solver.resize(GridSize::new(16, 16)).unwrap());
        assert!(solver.resize(GridSize::new(20, 16)).unwrap());
        assert_eq!(solver.grid(), GridSize::new(20, 16));
        assert_eq!(solver.current_velocity(), FieldId::Velocity(0));
    }

    #[test]
    fn step_alternates_velocity_parity() {
        let mut solver = solver(GridSize::new(16, 16), 4.0);
        solver.step(&Splat::NONE).unwrap();
        assert_eq!(solver.current_velocity(), FieldId::Velocity(1));
        solver.step(&Splat::NONE).unwrap();
        assert_eq!(solver.current_velocity(), FieldId::Velocity(0));
    }
}
