// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use std::time::Instant;

use crate::auto_driver::AutoDriver;
use crate::error::EtherError;
use crate::fluid::{FluidBackend, FluidSolver, SolverOptions, Splat};
use crate::lifecycle::{FrameClock, Lifecycle, LoopState};
use crate::pointer::PointerState;
use crate::settings::EtherSettings;
use crate::viewport::{ContainerRect, GridSize, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered,
    /// The loop is paused, halted or disposed; nothing was touched.
    Skipped,
}

/// The fluid background effect: owns the solver, the shared pointer, the
/// idle driver and the frame loop state. Host events go in through the
/// `on_*` hooks, one `frame` call per animation frame drives everything.
pub struct LiquidEther<B: FluidBackend> {
    settings: EtherSettings,
    solver: FluidSolver<B>,
    pointer: PointerState,
    auto: AutoDriver,
    viewport: Viewport,
    container: ContainerRect,
    lifecycle: Lifecycle,
    clock: FrameClock,
}

impl<B: FluidBackend> LiquidEther<B> {
    /// Allocates the simulation for `container` and starts the loop.
    pub fn new(
        backend: B,
        settings: &EtherSettings,
        container: ContainerRect,
        scale_factor: f64,
        now: Instant,
    ) -> Result<Self, EtherError> {
        Self::build(backend, settings, container, scale_factor, now, None)
    }

    /// Same as `new` with a fixed seed for the idle driver's targets.
    pub fn with_seed(
        backend: B,
        settings: &EtherSettings,
        container: ContainerRect,
        scale_factor: f64,
        now: Instant,
        seed: u64,
    ) -> Result<Self, EtherError> {
        Self::build(backend, settings, container, scale_factor, now, Some(seed))
    }

    fn build(
        mut backend: B,
        settings: &EtherSettings,
        container: ContainerRect,
        scale_factor: f64,
        now: Instant,
        seed: Option<u64>,
    ) -> Result<Self, EtherError> {
        let mut settings = settings.clone();
        settings.sanitize();

        let mut viewport = Viewport::new(settings.max_pixel_ratio);
        viewport.observe(container, scale_factor);
        let grid = viewport.grid(settings.resolution);
        let (width, height) = viewport.drawing_buffer();
        backend.resize_output(width, height);

        let solver = FluidSolver::new(backend, SolverOptions::from_settings(&settings), grid)?;
        let pointer = PointerState::new(
            now,
            settings.auto_intensity,
            settings.takeover(),
            settings.still_threshold(),
        );
        let auto = match seed {
            Some(seed) => AutoDriver::with_seed(&settings, now, seed),
            None => AutoDriver::new(&settings, now),
        };

        let mut lifecycle = Lifecycle::new();
        lifecycle.start();
        log::info!(
            "LiquidEther ready: {}x{} canvas, {}x{} grid",
            width,
            height,
            grid.width,
            grid.height
        );

        Ok(Self {
            settings,
            solver,
            pointer,
            auto,
            viewport,
            container,
            lifecycle,
            clock: FrameClock::new(),
        })
    }

    // Lifecycle surface

    pub fn start(&mut self) {
        if self.lifecycle.start() {
            self.clock.reset();
        }
    }

    pub fn pause(&mut self) {
        self.lifecycle.pause();
    }

    /// Reallocates the grid and output for the current container size now.
    /// Returns whether the grid changed.
    pub fn resize(&mut self) -> Result<bool, EtherError> {
        if self.lifecycle.is_disposed() {
            return Err(EtherError::Disposed);
        }
        let (width, height) = self.viewport.drawing_buffer();
        self.solver.backend_mut().resize_output(width, height);
        self.solver.resize(self.viewport.grid(self.settings.resolution))
    }

    /// Releases every GPU resource and the canvas. Later calls into the
    /// engine are ignored.
    pub fn dispose(&mut self) {
        if self.lifecycle.is_disposed() {
            return;
        }
        self.lifecycle.dispose();
        self.auto.force_stop(&mut self.pointer);
        self.solver.backend_mut().release();
        log::info!("LiquidEther disposed");
    }

    // Host signals

    /// New container bounds. Pointer mapping follows immediately; the grid
    /// is reallocated on the next frame.
    pub fn observe_container(&mut self, rect: ContainerRect, scale_factor: f64) {
        if self.lifecycle.is_disposed() {
            return;
        }
        if self.viewport.observe(rect, scale_factor) {
            self.container = rect;
            self.lifecycle.request_resize();
        }
    }

    pub fn on_visibility_change(&mut self, hidden: bool) {
        let was_running = self.lifecycle.is_running();
        self.lifecycle.set_page_hidden(hidden);
        if !was_running && self.lifecycle.is_running() {
            self.clock.reset();
        }
    }

    pub fn on_intersection_change(&mut self, ratio: f32) {
        let was_running = self.lifecycle.is_running();
        self.lifecycle.set_intersection(ratio);
        if !was_running && self.lifecycle.is_running() {
            self.clock.reset();
        }
    }

    pub fn on_pointer_move(&mut self, x: f32, y: f32, now: Instant) {
        if self.lifecycle.is_disposed() {
            return;
        }
        self.pointer.on_pointer_move(&self.container, x, y, now);
        self.auto.force_stop(&mut self.pointer);
    }

    pub fn on_pointer_leave(&mut self) {
        if self.lifecycle.is_disposed() {
            return;
        }
        self.pointer.on_pointer_leave();
    }

    pub fn on_touch_start(&mut self, touches: &[Vec2], now: Instant) {
        if self.lifecycle.is_disposed() {
            return;
        }
        if self.pointer.on_touch_start(&self.container, touches, now) {
            self.auto.force_stop(&mut self.pointer);
        }
    }

    pub fn on_touch_move(&mut self, touches: &[Vec2], now: Instant) {
        if self.lifecycle.is_disposed() {
            return;
        }
        if self.pointer.on_touch_move(&self.container, touches, now) {
            self.auto.force_stop(&mut self.pointer);
        }
    }

    pub fn on_touch_end(&mut self) {
        if self.lifecycle.is_disposed() {
            return;
        }
        self.pointer.on_touch_end();
    }

    // Frame loop

    pub fn wants_frame(&self) -> bool {
        self.lifecycle.wants_frame()
    }

    /// One animation frame: pending resize, idle driver, pointer, solver
    /// step, output. Any failure halts the loop for good.
    pub fn frame(&mut self, now: Instant) -> Result<FrameOutcome, EtherError> {
        if !self.lifecycle.is_running() {
            return Ok(FrameOutcome::Skipped);
        }
        if let Err(err) = self.render_frame(now) {
            self.lifecycle.halt(&err.to_string());
            return Err(err);
        }
        Ok(FrameOutcome::Rendered)
    }

    fn render_frame(&mut self, now: Instant) -> Result<(), EtherError> {
        if self.lifecycle.take_resize() {
            self.resize()?;
        }

        self.auto.update(&mut self.pointer, now);
        let sample = self.pointer.update(now);
        let splat = Splat::from_pointer(&sample, self.settings.mouse_force);

        self.solver.step(&splat)?;
        self.solver.present(self.viewport.drawing_buffer())?;
        self.clock.tick(now);
        Ok(())
    }

    // Accessors

    pub fn settings(&self) -> &EtherSettings {
        &self.settings
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    pub fn auto_driver(&self) -> &AutoDriver {
        &self.auto
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn grid(&self) -> GridSize {
        self.solver.grid()
    }

    pub fn solver(&self) -> &FluidSolver<B> {
        &self.solver
    }

    pub fn state(&self) -> LoopState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub fn is_disposed(&self) -> bool {
        self.lifecycle.is_disposed()
    }

    pub fn has_canvas(&self) -> bool {
        !self.lifecycle.is_disposed() && self.solver.backend().has_canvas()
    }
}

impl<B: FluidBackend> Drop for LiquidEther<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}
