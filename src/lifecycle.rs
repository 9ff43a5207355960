// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use std::time::{Duration, Instant};

const STATS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
    /// Stopped by a frame failure. Only disposal leaves this state.
    Halted,
    Disposed,
}

/// Decides whether animation frames should run, combining the explicit
/// start/pause calls with page visibility and viewport intersection.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    state: LoopState,
    page_hidden: bool,
    intersecting: bool,
    resize_pending: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: LoopState::Stopped,
            page_hidden: false,
            intersecting: true,
            resize_pending: false,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.state == LoopState::Disposed
    }

    pub fn wants_frame(&self) -> bool {
        self.is_running()
    }

    /// Returns true when the loop actually transitioned to running.
    pub fn start(&mut self) -> bool {
        if self.state != LoopState::Stopped {
            return false;
        }
        self.state = LoopState::Running;
        log::debug!("Animation loop started");
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Stopped;
        log::debug!("Animation loop paused");
        true
    }

    pub fn set_page_hidden(&mut self, hidden: bool) {
        if self.is_disposed() {
            return;
        }
        self.page_hidden = hidden;
        if hidden {
            self.pause();
        } else if self.intersecting {
            self.start();
        }
    }

    /// Any ratio above zero counts as visible.
    pub fn set_intersection(&mut self, ratio: f32) {
        if self.is_disposed() {
            return;
        }
        self.intersecting = ratio > 0.0;
        if self.intersecting && !self.page_hidden {
            self.start();
        } else {
            self.pause();
        }
    }

    /// Marks a resize for the next frame; repeated requests coalesce.
    pub fn request_resize(&mut self) {
        if !self.is_disposed() {
            self.resize_pending = true;
        }
    }

    pub fn take_resize(&mut self) -> bool {
        std::mem::take(&mut self.resize_pending)
    }

    pub fn halt(&mut self, reason: &str) {
        if matches!(self.state, LoopState::Halted | LoopState::Disposed) {
            return;
        }
        log::error!("Animation loop halted: {}", reason);
        self.state = LoopState::Halted;
    }

    pub fn dispose(&mut self) {
        self.state = LoopState::Disposed;
        self.resize_pending = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub avg_frame_time_ms: f32,
}

/// Frame rate bookkeeping, reported every half second.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    frame_count: u32,
    frame_time_sum: f32,
    last_frame: Option<Instant>,
    last_report: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now: Instant) -> Option<FrameStats> {
        let since = *self.last_report.get_or_insert(now);
        if let Some(last) = self.last_frame {
            self.frame_time_sum += now.saturating_duration_since(last).as_secs_f32();
        }
        self.last_frame = Some(now);
        self.frame_count += 1;

        let elapsed = now.saturating_duration_since(since);
        if elapsed < STATS_INTERVAL {
            return None;
        }
        let stats = FrameStats {
            fps: self.frame_count as f32 / elapsed.as_secs_f32(),
            avg_frame_time_ms: self.frame_time_sum / self.frame_count as f32 * 1000.0,
        };
        self.frame_count = 0;
        self.frame_time_sum = 0.0;
        self.last_report = Some(now);
        log::debug!("{:.0} FPS | {:.2} ms/frame", stats.fps, stats.avg_frame_time_ms);
        Some(stats)
    }

    /// Forget the last frame so a pause is not counted as one long frame.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_pause_toggle_running() {
        let mut lc = Lifecycle::new();
        assert!(!lc.wants_frame());
        assert!(lc.start());
        assert!(!lc.start());
        assert!(lc.wants_frame());
        assert!(lc.pause());
        assert_eq!(lc.state(), LoopState::Stopped);
    }

    #[test]
    fn visibility_and_intersection_combine() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.set_page_hidden(true);
        assert!(!lc.is_running());

        lc.set_intersection(0.0);
        lc.set_page_hidden(false);
        assert!(!lc.is_running(), "off-screen container stays paused");

        lc.set_intersection(0.01);
        assert!(lc.is_running());

        lc.set_page_hidden(true);
        lc.set_intersection(1.0);
        assert!(!lc.is_running(), "hidden page stays paused");
    }

    #[test]
    fn halted_loop_cannot_restart() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.halt("device lost");
        assert_eq!(lc.state(), LoopState::Halted);
        assert!(!lc.start());
        lc.set_intersection(1.0);
        assert_eq!(lc.state(), LoopState::Halted);
    }

    #[test]
    fn disposal_is_terminal() {
        let mut lc = Lifecycle::new();
        lc.start();
        lc.request_resize();
        lc.dispose();
        assert!(!lc.take_resize());
        assert!(!lc.start());
        lc.set_page_hidden(false);
        lc.request_resize();
        assert!(lc.is_disposed());
        assert!(!lc.take_resize());
    }

    #[test]
    fn resize_requests_coalesce() {
        let mut lc = Lifecycle::new();
        lc.request_resize();
        lc.request_resize();
        lc.request_resize();
        assert!(lc.take_resize());
        assert!(!lc.take_resize());
    }

    #[test]
    fn frame_clock_reports_every_half_second() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new();
        for i in 0..30u64 {
            assert_eq!(clock.tick(t0 + Duration::from_millis(i * 16)), None);
        }
        let stats = clock.tick(t0 + Duration::from_millis(512)).unwrap();
        assert!((stats.fps - 31.0 / 0.512).abs() < 0.1);
        assert!(stats.avg_frame_time_ms > 0.0 && stats.avg_frame_time_ms < 20.0);

        clock.reset();
        assert_eq!(clock.tick(t0 + Duration::from_secs(10)), None);
    }
}
