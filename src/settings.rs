// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const SETTINGS_FILE_NAME: &str = "liquid_ether_settings.json";
pub const SETTINGS_PATH_ENV: &str = "LIQUID_ETHER_SETTINGS";

const MAX_ITERATIONS: u32 = 256;
const MAX_DURATION_SECS: f32 = 60.0;

/// Storage precision for the simulation fields.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldPrecision {
    /// Half floats on mobile-class adapters, full floats elsewhere.
    #[default]
    Auto,
    Half,
    Full,
}

/// Every option the engine recognises. Keys follow the effect's option
/// names so an existing JSON option bag can be loaded as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EtherSettings {
    pub colors: Vec<String>,
    pub mouse_force: f32,
    pub cursor_size: f32,
    pub is_viscous: bool,
    pub viscous: f32,
    pub iterations_viscous: u32,
    pub iterations_poisson: u32,
    pub dt: f32,
    #[serde(rename = "BFECC")]
    pub bfecc: bool,
    pub resolution: f32,
    pub is_bounce: bool,
    pub auto_demo: bool,
    pub auto_speed: f32,
    pub auto_intensity: f32,
    pub takeover_duration: f32, // seconds
    pub auto_resume_delay: u64, // milliseconds
    pub auto_ramp_duration: f32, // seconds
    pub background_color: [f32; 4],
    pub still_threshold_ms: u64,
    pub auto_margin: f32,
    pub max_pixel_ratio: f32,
    pub precision: FieldPrecision,
}

impl Default for EtherSettings {
    fn default() -> Self {
        Self {
            colors: vec!["#5227FF".into(), "#FF9FFC".into(), "#B19EEF".into()],
            mouse_force: 20.0,
            cursor_size: 100.0,
            is_viscous: false,
            viscous: 30.0,
            iterations_viscous: 32,
            iterations_poisson: 32,
            dt: 0.014,
            bfecc: true,
            resolution: 0.5,
            is_bounce: false,
            auto_demo: true,
            auto_speed: 0.5,
            auto_intensity: 2.2,
            takeover_duration: 0.25,
            auto_resume_delay: 3000,
            auto_ramp_duration: 0.6,
            background_color: [0.0, 0.0, 0.0, 0.0], // fully transparent
            still_threshold_ms: 100,
            auto_margin: 0.2,
            max_pixel_ratio: 2.0,
            precision: FieldPrecision::Auto,
        }
    }
}

impl EtherSettings {
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            return PathBuf::from(path);
        }
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub fn load_from_disk(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut settings: Self = serde_json::from_str(&data)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn save_to_disk(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Repairs out-of-range values in place. Nothing here is an error:
    /// a bad option is replaced by something safe and the effect keeps going.
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !(self.resolution > 0.0) {
            self.resolution = defaults.resolution;
        } else if self.resolution > 1.0 {
            self.resolution = 1.0;
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            self.dt = defaults.dt;
        }
        self.iterations_viscous = self.iterations_viscous.clamp(1, MAX_ITERATIONS);
        self.iterations_poisson = self.iterations_poisson.clamp(1, MAX_ITERATIONS);

        self.mouse_force = finite_non_negative(self.mouse_force, defaults.mouse_force);
        self.cursor_size = finite_non_negative(self.cursor_size, defaults.cursor_size).max(1.0);
        self.viscous = finite_non_negative(self.viscous, defaults.viscous);
        self.auto_speed = finite_non_negative(self.auto_speed, defaults.auto_speed);
        self.auto_intensity = finite_non_negative(self.auto_intensity, defaults.auto_intensity);
        self.takeover_duration =
            finite_non_negative(self.takeover_duration, defaults.takeover_duration).min(MAX_DURATION_SECS);
        self.auto_ramp_duration =
            finite_non_negative(self.auto_ramp_duration, defaults.auto_ramp_duration).min(MAX_DURATION_SECS);
        self.auto_margin = finite_non_negative(self.auto_margin, defaults.auto_margin).min(0.9);
        self.max_pixel_ratio = finite_non_negative(self.max_pixel_ratio, defaults.max_pixel_ratio).max(1.0);

        for channel in &mut self.background_color {
            *channel = if channel.is_finite() { channel.clamp(0.0, 1.0) } else { 0.0 };
        }
    }

    pub fn takeover(&self) -> Duration {
        seconds_or(self.takeover_duration, Self::default().takeover_duration)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.auto_resume_delay)
    }

    pub fn ramp(&self) -> Duration {
        seconds_or(self.auto_ramp_duration, Self::default().auto_ramp_duration)
    }

    pub fn still_threshold(&self) -> Duration {
        Duration::from_millis(self.still_threshold_ms)
    }
}

/// Unsanitized values (negative, NaN, beyond `Duration`) fall back.
fn seconds_or(secs: f32, fallback: f32) -> Duration {
    Duration::try_from_secs_f32(secs).unwrap_or_else(|_| Duration::from_secs_f32(fallback))
}

fn finite_non_negative(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        fallback
    }
}
