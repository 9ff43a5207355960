// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

use crate::pointer::{smoothstep, Control, PointerState};
use crate::settings::EtherSettings;

const ARRIVAL_EPSILON: f32 = 0.01;
const MAX_FRAME_DELTA: f32 = 0.2;
const FALLBACK_FRAME_DELTA: f32 = 0.016;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPhase {
    Idle,
    Active,
}

/// Wanders a virtual cursor between random targets while the user is idle.
#[derive(Debug, Clone)]
pub struct AutoDriver {
    enabled: bool,
    speed: f32,
    resume_delay: Duration,
    ramp: Duration,
    margin: f32,
    phase: AutoPhase,
    current: Vec2,
    target: Vec2,
    last_time: Instant,
    activation_time: Instant,
    rng: StdRng,
}

impl AutoDriver {
    pub fn new(settings: &EtherSettings, now: Instant) -> Self {
        Self::with_rng(settings, now, StdRng::from_entropy())
    }

    pub fn with_seed(settings: &EtherSettings, now: Instant, seed: u64) -> Self {
        Self::with_rng(settings, now, StdRng::seed_from_u64(seed))
    }

    fn with_rng(settings: &EtherSettings, now: Instant, rng: StdRng) -> Self {
        let mut driver = Self {
            enabled: settings.auto_demo,
            speed: settings.auto_speed,
            resume_delay: settings.resume_delay(),
            ramp: settings.ramp(),
            margin: settings.auto_margin,
            phase: AutoPhase::Idle,
            current: Vec2::ZERO,
            target: Vec2::ZERO,
            last_time: now,
            activation_time: now,
            rng,
        };
        driver.pick_new_target();
        driver
    }

    pub fn phase(&self) -> AutoPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == AutoPhase::Active
    }

    pub fn current(&self) -> Vec2 {
        self.current
    }

    pub fn target(&self) -> Vec2 {
        self.target
    }

    fn pick_new_target(&mut self) {
        let extent = 1.0 - self.margin;
        self.target = Vec2::new(
            self.rng.gen_range(-1.0f32..=1.0) * extent,
            self.rng.gen_range(-1.0f32..=1.0) * extent,
        );
    }

    /// Hard stop, no fade. The pointer keeps whatever blend is running.
    pub fn force_stop(&mut self, pointer: &mut PointerState) {
        if self.phase == AutoPhase::Active {
            log::debug!("Auto driver stopped at {:?}", self.current);
        }
        self.phase = AutoPhase::Idle;
        pointer.release_autonomous();
    }

    pub fn update(&mut self, pointer: &mut PointerState, now: Instant) {
        if !self.enabled {
            return;
        }

        if pointer.idle_time(now) < self.resume_delay {
            if self.phase == AutoPhase::Active || pointer.control() == Control::Autonomous {
                self.force_stop(pointer);
            }
            return;
        }

        // Let a takeover that outlasts the resume delay finish first.
        if matches!(pointer.control(), Control::TransitioningToManual(_)) {
            return;
        }

        if self.phase == AutoPhase::Idle {
            log::debug!("Auto driver activated at {:?}", pointer.coords());
            self.phase = AutoPhase::Active;
            self.current = pointer.coords();
            self.last_time = now;
            self.activation_time = now;
        }

        let mut dt = now.saturating_duration_since(self.last_time).as_secs_f32();
        self.last_time = now;
        if dt > MAX_FRAME_DELTA {
            dt = FALLBACK_FRAME_DELTA;
        }

        let offset = self.target - self.current;
        let dist = offset.length();
        if dist < ARRIVAL_EPSILON {
            self.pick_new_target();
            pointer.set_autonomous(self.current);
            return;
        }

        let ramp = if self.ramp.is_zero() {
            1.0
        } else {
            let t = now.saturating_duration_since(self.activation_time).as_secs_f32()
                / self.ramp.as_secs_f32();
            smoothstep(t.min(1.0))
        };

        let step = (self.speed * dt * ramp).min(dist);
        self.current += offset / dist * step;
        pointer.set_autonomous(self.current);
    }
}
