// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

// Headless solver probe: scripted strokes on the CPU backend, mirrored on
// the GPU when an adapter is available, shaded frame written as PNG.
// Run with: cargo run --bin fluid_probe -- out.png

use glam::Vec2;

use liquid_ether::fluid::{FieldId, FluidBackend, FluidSolver, SolverOptions, Splat};
use liquid_ether::viewport::GridSize;
use liquid_ether::{CpuFields, EtherSettings, GpuFields};

const GRID_SIZE: u32 = 128;
const OUTPUT_SIZE: u32 = 512;
const STROKE_TICKS: usize = 60;

fn max_abs(values: &[f32]) -> f32 {
    values.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

fn max_speed(values: &[Vec2]) -> f32 {
    values.iter().fold(0.0f32, |m, v| m.max(v.length()))
}

/// A circular stroke around the center, one splat per tick.
fn stroke(tick: usize, mouse_force: f32) -> Splat {
    let angle = |t: usize| t as f32 / STROKE_TICKS as f32 * std::f32::consts::TAU;
    let at = |t: usize| Vec2::new(angle(t).cos(), angle(t).sin()) * 0.4;
    let diff = at(tick + 1) - at(tick);
    Splat { center: at(tick + 1), force: diff / 2.0 * mouse_force }
}

fn probe_settings() -> EtherSettings {
    EtherSettings {
        auto_demo: false,
        resolution: 1.0,
        cursor_size: 24.0,
        iterations_poisson: 64,
        ..Default::default()
    }
}

fn run_cpu(settings: &EtherSettings, grid: GridSize) -> anyhow::Result<FluidSolver<CpuFields>> {
    let mut solver = FluidSolver::new(CpuFields::new(settings), SolverOptions::from_settings(settings), grid)?;

    solver.step(&Splat { center: Vec2::ZERO, force: Vec2::new(settings.mouse_force * 0.05, 0.0) })?;
    let before = max_abs(solver.backend().scalar(FieldId::Divergence).data());
    let after = max_abs(solver.backend().divergence_of(solver.current_velocity()).data());
    log::info!("CPU splat: max |div| before projection {:.4}, after {:.4}", before, after);

    for tick in 0..STROKE_TICKS {
        solver.step(&stroke(tick, settings.mouse_force))?;
    }
    let speed = max_speed(solver.backend().vector(solver.current_velocity()).data());
    log::info!("CPU stroke: max |v| {:.4} after {} ticks", speed, STROKE_TICKS + 1);
    Ok(solver)
}

fn run_gpu(settings: &EtherSettings, grid: GridSize, cpu_speed: f32) -> anyhow::Result<()> {
    let backend = match GpuFields::headless(settings) {
        Ok(backend) => backend,
        Err(e) => {
            log::warn!("Skipping GPU probe: {}", e);
            return Ok(());
        }
    };
    log::info!("GPU fields stored as {:?}", backend.field_format());
    let mut solver = FluidSolver::new(backend, SolverOptions::from_settings(settings), grid)?;

    solver.step(&Splat { center: Vec2::ZERO, force: Vec2::new(settings.mouse_force * 0.05, 0.0) })?;
    for tick in 0..STROKE_TICKS {
        solver.step(&stroke(tick, settings.mouse_force))?;
    }
    solver.present((OUTPUT_SIZE, OUTPUT_SIZE))?;

    let velocity = solver.backend().read_velocity_blocking(solver.current_velocity())?;
    let speed = max_speed(&velocity);
    log::info!(
        "GPU stroke: max |v| {:.4} (CPU {:.4}, difference {:.2e})",
        speed,
        cpu_speed,
        (speed - cpu_speed).abs()
    );
    solver.backend_mut().release();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let out_path = std::env::args().nth(1).unwrap_or_else(|| "fluid_probe.png".to_string());
    let settings = probe_settings();
    let grid = GridSize::new(GRID_SIZE, GRID_SIZE);

    let mut cpu = run_cpu(&settings, grid)?;
    let cpu_speed = max_speed(cpu.backend().vector(cpu.current_velocity()).data());

    cpu.present((OUTPUT_SIZE, OUTPUT_SIZE))?;
    match cpu.backend().canvas() {
        Some(canvas) => {
            canvas.to_image().save(&out_path)?;
            log::info!("Wrote {}x{} frame to {}", canvas.width, canvas.height, out_path);
        }
        None => log::warn!("No canvas to write"),
    }
    cpu.backend_mut().release();

    run_gpu(&settings, grid, cpu_speed)
}
