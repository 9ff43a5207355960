// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use glam::Vec2;
use std::time::{Duration, Instant};

use crate::viewport::ContainerRect;

/// Smoothstep-eased interpolation from the autonomous cursor to the
/// user's pointer, started when manual input interrupts the auto driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeoverBlend {
    pub from: Vec2,
    pub to: Vec2,
    pub start: Instant,
    pub duration: Duration,
}

impl TakeoverBlend {
    /// Blend progress in [0, 1] before easing.
    pub fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start).as_secs_f32();
        (elapsed / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn position(&self, now: Instant) -> Vec2 {
        let k = smoothstep(self.progress(now));
        self.from.lerp(self.to, k)
    }

    pub fn is_finished(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }
}

/// Who currently writes the shared cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Manual,
    Autonomous,
    TransitioningToManual(TakeoverBlend),
}

/// What one tick of force injection needs from the pointer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSample {
    pub coords: Vec2,
    pub diff: Vec2,
}

/// The single shared cursor, written by whichever driver owns it.
#[derive(Debug, Clone)]
pub struct PointerState {
    coords: Vec2,
    coords_old: Vec2,
    diff: Vec2,
    control: Control,
    moved_at: Option<Instant>,
    hover_inside: bool,
    last_user_interaction: Instant,
    auto_intensity: f32,
    takeover_duration: Duration,
    still_threshold: Duration,
}

impl PointerState {
    pub fn new(now: Instant, auto_intensity: f32, takeover_duration: Duration, still_threshold: Duration) -> Self {
        Self {
            coords: Vec2::ZERO,
            coords_old: Vec2::ZERO,
            diff: Vec2::ZERO,
            control: Control::Manual,
            moved_at: None,
            hover_inside: false,
            last_user_interaction: now,
            auto_intensity,
            takeover_duration,
            still_threshold,
        }
    }

    pub fn coords(&self) -> Vec2 {
        self.coords
    }

    pub fn diff(&self) -> Vec2 {
        self.diff
    }

    pub fn control(&self) -> Control {
        self.control
    }

    pub fn is_hover_inside(&self) -> bool {
        self.hover_inside
    }

    pub fn last_user_interaction(&self) -> Instant {
        self.last_user_interaction
    }

    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_user_interaction)
    }

    /// True while the pointer moved within the still threshold, or while the
    /// auto driver is steering it.
    pub fn is_moving(&self, now: Instant) -> bool {
        if self.control == Control::Autonomous {
            return true;
        }
        match self.moved_at {
            Some(at) => now.saturating_duration_since(at) < self.still_threshold,
            None => false,
        }
    }

    pub fn on_pointer_move(&mut self, rect: &ContainerRect, x: f32, y: f32, now: Instant) {
        self.last_user_interaction = now;
        let Some(target) = rect.normalize(x, y) else {
            return;
        };

        match self.control {
            Control::Autonomous => {
                self.begin_takeover(target, now);
                return;
            }
            Control::TransitioningToManual(mut blend) => {
                blend.to = target;
                self.control = Control::TransitioningToManual(blend);
            }
            Control::Manual => self.set_manual(target, now),
        }
        self.hover_inside = rect.contains(x, y);
    }

    pub fn on_pointer_leave(&mut self) {
        self.hover_inside = false;
    }

    /// `touches` lists every active touch point; multi-finger gestures are
    /// left to the page and ignored here.
    /// Returns whether the touch counted as user interaction.
    pub fn on_touch_start(&mut self, rect: &ContainerRect, touches: &[Vec2], now: Instant) -> bool {
        let accepted = self.on_single_touch(rect, touches, now);
        if accepted {
            self.hover_inside = true;
        }
        accepted
    }

    pub fn on_touch_move(&mut self, rect: &ContainerRect, touches: &[Vec2], now: Instant) -> bool {
        self.on_single_touch(rect, touches, now)
    }

    pub fn on_touch_end(&mut self) {
        self.hover_inside = false;
    }

    fn on_single_touch(&mut self, rect: &ContainerRect, touches: &[Vec2], now: Instant) -> bool {
        let [touch] = touches else {
            return false;
        };
        self.last_user_interaction = now;
        let Some(target) = rect.normalize(touch.x, touch.y) else {
            return true;
        };
        match self.control {
            Control::Autonomous => self.begin_takeover(target, now),
            Control::TransitioningToManual(mut blend) => {
                blend.to = target;
                self.control = Control::TransitioningToManual(blend);
            }
            Control::Manual => self.set_manual(target, now),
        }
        true
    }

    fn set_manual(&mut self, target: Vec2, now: Instant) {
        self.coords = target;
        self.moved_at = Some(now);
        self.control = Control::Manual;
    }

    fn begin_takeover(&mut self, target: Vec2, now: Instant) {
        log::debug!("Manual takeover from {:?} to {:?}", self.coords, target);
        self.control = Control::TransitioningToManual(TakeoverBlend {
            from: self.coords,
            to: target,
            start: now,
            duration: self.takeover_duration,
        });
        self.moved_at = Some(now);
    }

    /// Written by the auto driver every tick it owns the cursor.
    pub fn set_autonomous(&mut self, coords: Vec2) {
        self.coords = coords;
        self.control = Control::Autonomous;
    }

    /// Hands control back after the auto driver was stopped. A running
    /// takeover keeps its blend.
    pub fn release_autonomous(&mut self) {
        if self.control == Control::Autonomous {
            self.control = Control::Manual;
        }
    }

    /// Per-tick update: advances a takeover blend and recomputes the
    /// frame-to-frame delta used for force injection.
    pub fn update(&mut self, now: Instant) -> PointerSample {
        if let Control::TransitioningToManual(blend) = self.control {
            if blend.is_finished(now) {
                log::debug!("Takeover finished at {:?}", blend.to);
                self.control = Control::Manual;
                self.coords = blend.to;
                self.coords_old = self.coords;
                self.diff = Vec2::ZERO;
            } else {
                self.coords = blend.position(now);
            }
            self.moved_at = Some(now);
        }

        self.diff = self.coords - self.coords_old;
        self.coords_old = self.coords;

        if self.coords_old == Vec2::ZERO || !self.is_moving(now) {
            self.diff = Vec2::ZERO;
        }
        if self.control == Control::Autonomous {
            self.diff *= self.auto_intensity;
        }

        PointerSample { coords: self.coords, diff: self.diff }
    }
}

pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
