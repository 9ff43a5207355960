// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    event::*,
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
};

use liquid_ether::{ContainerRect, EtherSettings, GpuFields, LiquidEther};

fn load_settings() -> EtherSettings {
    let path = EtherSettings::default_path();
    if !path.exists() {
        log::info!("No settings at {}, using defaults", path.display());
        return EtherSettings::default();
    }
    match EtherSettings::load_from_disk(&path) {
        Ok(settings) => {
            log::info!("Loaded settings from {}", path.display());
            settings
        }
        Err(e) => {
            log::warn!("Failed to load {}: {:#}; using defaults", path.display(), e);
            EtherSettings::default()
        }
    }
}

fn container_of(window: &winit::window::Window) -> ContainerRect {
    let size = window.inner_size();
    ContainerRect::from_size(size.width as f32, size.height as f32)
}

fn main() -> anyhow::Result<()> {
    use env_logger::Env;
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = load_settings();

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        event_loop.create_window(
            winit::window::WindowAttributes::default()
                .with_title("LiquidEther")
                .with_transparent(true)
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720)),
        )?,
    );

    let backend = match GpuFields::windowed(window.clone(), &settings) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Fluid background unavailable: {}", e);
            return Err(e.into());
        }
    };
    let mut engine = LiquidEther::new(
        backend,
        &settings,
        container_of(&window),
        window.scale_factor(),
        Instant::now(),
    )?;

    // Active touch points by id, in window pixels.
    let mut touches: HashMap<u64, Vec2> = HashMap::new();

    event_loop.run(move |event, target| match event {
        Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                engine.dispose();
                target.exit();
            }
            WindowEvent::Resized(physical_size) => {
                let visible = physical_size.width > 0 && physical_size.height > 0;
                engine.observe_container(container_of(&window), window.scale_factor());
                engine.on_intersection_change(if visible { 1.0 } else { 0.0 });
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                engine.observe_container(container_of(&window), scale_factor);
            }
            WindowEvent::Occluded(hidden) => engine.on_visibility_change(hidden),
            WindowEvent::CursorMoved { position, .. } => {
                engine.on_pointer_move(position.x as f32, position.y as f32, Instant::now());
            }
            WindowEvent::CursorLeft { .. } => engine.on_pointer_leave(),
            WindowEvent::Touch(touch) => {
                let point = Vec2::new(touch.location.x as f32, touch.location.y as f32);
                let now = Instant::now();
                match touch.phase {
                    TouchPhase::Started => {
                        touches.insert(touch.id, point);
                        let active: Vec<Vec2> = touches.values().copied().collect();
                        engine.on_touch_start(&active, now);
                    }
                    TouchPhase::Moved => {
                        touches.insert(touch.id, point);
                        let active: Vec<Vec2> = touches.values().copied().collect();
                        engine.on_touch_move(&active, now);
                    }
                    TouchPhase::Ended | TouchPhase::Cancelled => {
                        touches.remove(&touch.id);
                        engine.on_touch_end();
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = engine.frame(Instant::now()) {
                    log::error!("Frame failed, stopping: {}", e);
                }
            }
            _ => {}
        },
        Event::AboutToWait => {
            if engine.wants_frame() {
                window.request_redraw();
            }
        }
        _ => {}
    })?;

    Ok(())
}
