// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use std::time::{Duration, Instant};

use liquid_ether::auto_driver::AutoPhase;
use liquid_ether::fluid::{FieldId, FluidBackend, PassDescriptor, StepParams};
use liquid_ether::lifecycle::LoopState;
use liquid_ether::pointer::Control;
use liquid_ether::viewport::GridSize;
use liquid_ether::{ContainerRect, CpuFields, EtherError, EtherSettings, FrameOutcome, LiquidEther};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn quiet_settings() -> EtherSettings {
    EtherSettings {
        colors: vec!["#ffffff".into()],
        auto_demo: false,
        cursor_size: 12.0,
        iterations_poisson: 8,
        iterations_viscous: 8,
        ..Default::default()
    }
}

fn engine(settings: &EtherSettings, t0: Instant) -> LiquidEther<CpuFields> {
    LiquidEther::with_seed(
        CpuFields::new(settings),
        settings,
        ContainerRect::from_size(64.0, 64.0),
        1.0,
        t0,
        3,
    )
    .unwrap()
}

fn visible_pixels(engine: &LiquidEther<CpuFields>) -> usize {
    let canvas = engine.solver().backend().canvas().expect("canvas");
    canvas.pixels.iter().filter(|px| px[3] > 0).count()
}

#[test]
fn construction_sizes_grid_and_canvas() {
    let t0 = Instant::now();
    let engine = engine(&quiet_settings(), t0);

    assert!(engine.is_running());
    assert!(engine.has_canvas());
    assert_eq!(engine.grid(), GridSize::new(32, 32));
    assert_eq!(engine.viewport().drawing_buffer(), (64, 64));
}

#[test]
fn pointer_stroke_paints_the_canvas() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);

    assert_eq!(engine.frame(t0 + ms(16)).unwrap(), FrameOutcome::Rendered);
    assert_eq!(visible_pixels(&engine), 0);

    engine.on_pointer_move(40.0, 32.0, t0 + ms(20));
    engine.frame(t0 + ms(32)).unwrap();
    engine.on_pointer_move(48.0, 36.0, t0 + ms(40));
    engine.frame(t0 + ms(48)).unwrap();

    assert!(engine.pointer().is_hover_inside());
    assert!(visible_pixels(&engine) > 0);

    let velocity = engine.solver().backend().vector(engine.solver().current_velocity());
    assert!(velocity.data().iter().any(|v| v.length() > 0.01));
}

#[test]
fn dispose_drops_canvas_and_ignores_everything_after() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);
    engine.frame(t0 + ms(16)).unwrap();

    engine.dispose();
    assert!(engine.is_disposed());
    assert!(!engine.has_canvas());
    assert_eq!(engine.state(), LoopState::Disposed);

    engine.on_pointer_move(40.0, 32.0, t0 + ms(20));
    engine.on_touch_start(&[Vec2::new(10.0, 10.0)], t0 + ms(20));
    engine.observe_container(ContainerRect::from_size(128.0, 128.0), 1.0);
    engine.start();

    assert_eq!(engine.pointer().coords(), Vec2::ZERO);
    assert!(!engine.wants_frame());
    assert_eq!(engine.frame(t0 + ms(32)).unwrap(), FrameOutcome::Skipped);
    assert!(matches!(engine.resize(), Err(EtherError::Disposed)));

    // Second dispose is a no-op.
    engine.dispose();
    assert_eq!(engine.state(), LoopState::Disposed);
}

#[test]
fn idle_driver_then_manual_takeover() {
    let t0 = Instant::now();
    let settings = EtherSettings { auto_demo: true, auto_resume_delay: 500, ..quiet_settings() };
    let mut engine = engine(&settings, t0);

    engine.frame(t0 + ms(100)).unwrap();
    assert_eq!(engine.auto_driver().phase(), AutoPhase::Idle);

    engine.frame(t0 + ms(600)).unwrap();
    engine.frame(t0 + ms(616)).unwrap();
    assert!(engine.auto_driver().is_active());
    assert_eq!(engine.pointer().control(), Control::Autonomous);

    // (48, 16) in a 64x64 container is (0.5, 0.5) in simulation space.
    engine.on_pointer_move(48.0, 16.0, t0 + ms(620));
    assert!(!engine.auto_driver().is_active());
    assert!(matches!(engine.pointer().control(), Control::TransitioningToManual(_)));

    engine.frame(t0 + ms(700)).unwrap();
    assert!(matches!(engine.pointer().control(), Control::TransitioningToManual(_)));

    engine.frame(t0 + ms(920)).unwrap();
    assert_eq!(engine.pointer().control(), Control::Manual);
    assert!((engine.pointer().coords() - Vec2::new(0.5, 0.5)).length() < 1e-5);
    assert_eq!(engine.auto_driver().phase(), AutoPhase::Idle);
}

#[test]
fn touch_ignores_multi_finger_gestures() {
    let t0 = Instant::now();
    let settings = EtherSettings { auto_demo: true, auto_resume_delay: 500, ..quiet_settings() };
    let mut engine = engine(&settings, t0);
    engine.frame(t0 + ms(600)).unwrap();
    assert!(engine.auto_driver().is_active());

    let two = [Vec2::new(10.0, 10.0), Vec2::new(50.0, 50.0)];
    engine.on_touch_start(&two, t0 + ms(610));
    assert!(engine.auto_driver().is_active());

    engine.on_touch_start(&[Vec2::new(48.0, 16.0)], t0 + ms(620));
    assert!(!engine.auto_driver().is_active());
    assert!(engine.pointer().is_hover_inside());

    engine.on_touch_end();
    assert!(!engine.pointer().is_hover_inside());
}

#[test]
fn resize_waits_for_next_frame_and_skips_empty_rects() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);

    engine.observe_container(ContainerRect::from_size(128.0, 64.0), 1.0);
    assert_eq!(engine.grid(), GridSize::new(32, 32));
    engine.frame(t0 + ms(16)).unwrap();
    assert_eq!(engine.grid(), GridSize::new(64, 32));

    let canvas = engine.solver().backend().canvas().unwrap();
    assert_eq!((canvas.width, canvas.height), (128, 64));

    engine.observe_container(ContainerRect::from_size(0.0, 0.0), 1.0);
    engine.frame(t0 + ms(32)).unwrap();
    assert_eq!(engine.grid(), GridSize::new(64, 32));

    // Pointer mapping still uses the last valid rect.
    engine.on_pointer_move(96.0, 16.0, t0 + ms(40));
    assert!((engine.pointer().coords() - Vec2::new(0.5, 0.5)).length() < 1e-5);
}

#[test]
fn pointer_dragged_outside_stays_in_simulation_space() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);

    engine.on_pointer_move(-200.0, 500.0, t0 + ms(10));
    assert_eq!(engine.pointer().coords(), Vec2::new(-1.0, -1.0));
    assert!(!engine.pointer().is_hover_inside());

    engine.frame(t0 + ms(16)).unwrap();
    assert!(engine.pointer().coords().abs().max_element() <= 1.0);
}

#[test]
fn oversized_durations_do_not_break_construction() {
    let t0 = Instant::now();
    let settings = EtherSettings {
        takeover_duration: 1e30,
        auto_ramp_duration: 1e30,
        auto_demo: true,
        ..quiet_settings()
    };
    let mut engine = engine(&settings, t0);
    assert_eq!(engine.settings().takeover(), Duration::from_secs(60));
    assert_eq!(engine.frame(t0 + ms(16)).unwrap(), FrameOutcome::Rendered);
}

#[test]
fn pixel_ratio_is_capped() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);

    engine.observe_container(ContainerRect::from_size(192.0, 192.0), 3.0);
    engine.frame(t0 + ms(16)).unwrap();
    assert_eq!(engine.viewport().css_size(), (64, 64));
    assert_eq!(engine.viewport().drawing_buffer(), (128, 128));
    assert_eq!(engine.grid(), GridSize::new(32, 32));
}

#[test]
fn hidden_or_offscreen_pauses_the_loop() {
    let t0 = Instant::now();
    let mut engine = engine(&quiet_settings(), t0);

    engine.on_visibility_change(true);
    assert!(!engine.wants_frame());
    assert_eq!(engine.frame(t0 + ms(16)).unwrap(), FrameOutcome::Skipped);

    engine.on_intersection_change(1.0);
    assert!(!engine.is_running(), "a hidden page stays paused while on screen");

    engine.on_visibility_change(false);
    assert_eq!(engine.frame(t0 + ms(32)).unwrap(), FrameOutcome::Rendered);

    engine.on_intersection_change(0.0);
    assert_eq!(engine.frame(t0 + ms(48)).unwrap(), FrameOutcome::Skipped);
    engine.on_intersection_change(0.3);
    assert_eq!(engine.frame(t0 + ms(64)).unwrap(), FrameOutcome::Rendered);

    engine.pause();
    assert_eq!(engine.state(), LoopState::Stopped);
    engine.start();
    assert!(engine.is_running());
}

/// CPU fields that start failing after a number of steps.
struct FlakyFields {
    inner: CpuFields,
    steps_left: u32,
}

impl FluidBackend for FlakyFields {
    fn allocate(&mut self, grid: GridSize) -> Result<(), EtherError> {
        self.inner.allocate(grid)
    }

    fn begin_step(&mut self, params: &StepParams) -> Result<(), EtherError> {
        self.inner.begin_step(params)
    }

    fn run_pass(&mut self, pass: &PassDescriptor) {
        self.inner.run_pass(pass)
    }

    fn end_step(&mut self) -> Result<(), EtherError> {
        if self.steps_left == 0 {
            return Err(EtherError::GpuFault { message: "device lost".into() });
        }
        self.steps_left -= 1;
        self.inner.end_step()
    }

    fn present(&mut self, velocity: FieldId, target: (u32, u32)) -> Result<(), EtherError> {
        self.inner.present(velocity, target)
    }

    fn resize_output(&mut self, width: u32, height: u32) {
        self.inner.resize_output(width, height)
    }

    fn has_canvas(&self) -> bool {
        self.inner.has_canvas()
    }

    fn release(&mut self) {
        self.inner.release()
    }
}

#[test]
fn backend_failure_halts_the_loop() {
    let t0 = Instant::now();
    let settings = quiet_settings();
    let backend = FlakyFields { inner: CpuFields::new(&settings), steps_left: 2 };
    let mut engine =
        LiquidEther::new(backend, &settings, ContainerRect::from_size(64.0, 64.0), 1.0, t0).unwrap();

    engine.frame(t0 + ms(16)).unwrap();
    engine.frame(t0 + ms(32)).unwrap();
    assert!(matches!(engine.frame(t0 + ms(48)), Err(EtherError::GpuFault { .. })));
    assert_eq!(engine.state(), LoopState::Halted);

    engine.start();
    engine.on_visibility_change(false);
    assert!(!engine.wants_frame());
    assert_eq!(engine.frame(t0 + ms(64)).unwrap(), FrameOutcome::Skipped);

    engine.dispose();
    assert!(!engine.has_canvas());
}
