//! Engine configuration
//!
//! Loaded from TOML; every field is optional and falls back to its default.
//! `validate` rejects structurally broken values. Unknown scale or pattern
//! names are not rejected here: they fall back at lookup time with a warning.

use crate::error::ConfigError;
use crate::mapper::ZoneBounds;
use crate::throttle::DEFAULT_THROTTLE_FRACTION;
use crate::transport::{validate_tempo, DEFAULT_TEMPO_BPM};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Movement speed (normalized units per second) to glide time bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlideConfig {
    /// Speeds above this glide in `fast_glide`
    pub fast_speed: f64,
    /// Speeds above this (and not fast) glide in `medium_glide`
    pub medium_speed: f64,
    pub fast_glide: f64,
    pub medium_glide: f64,
    pub slow_glide: f64,
}

impl Default for GlideConfig {
    fn default() -> Self {
        Self {
            fast_speed: 1.0,
            medium_speed: 0.3,
            fast_glide: 0.05,
            medium_glide: 0.15,
            slow_glide: 0.35,
        }
    }
}

impl GlideConfig {
    /// Faster movement gives a shorter glide.
    pub fn glide_for_speed(&self, speed: f64) -> f64 {
        if speed > self.fast_speed {
            self.fast_glide
        } else if speed > self.medium_speed {
            self.medium_glide
        } else {
            self.slow_glide
        }
    }
}

/// Ranges for position-driven effect modulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Reverb wet level set on start
    pub reverb_wet_initial: f64,
    pub reverb_wet_min: f64,
    pub reverb_wet_max: f64,
    pub reverb_decay: f64,
    pub delay_wet_center: f64,
    pub delay_wet_right: f64,
    pub delay_feedback: f64,
    pub cutoff_min_hz: f64,
    pub cutoff_max_hz: f64,
    /// Ramp applied to modulated parameters, seconds
    pub ramp: f64,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            reverb_wet_initial: 0.2,
            reverb_wet_min: 0.1,
            reverb_wet_max: 0.5,
            reverb_decay: 1.5,
            delay_wet_center: 0.1,
            delay_wet_right: 0.3,
            delay_feedback: 0.1,
            cutoff_min_hz: 800.0,
            cutoff_max_hz: 8000.0,
            ramp: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scale: String,
    pub rhythm_pattern: String,
    /// Drum grid; follows `rhythm_pattern` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drum_pattern: Option<String>,
    pub progression: String,
    pub tempo_bpm: f64,
    pub left_zone_boundary: f64,
    pub right_zone_boundary: f64,
    pub stale_voice_timeout_ms: u64,
    pub drain_delay_ms: u64,
    pub sweep_interval_ms: u64,
    pub loops_per_chord: u32,
    pub throttle_fraction: f64,
    pub min_confidence: f64,
    /// 0-100
    pub master_volume: f64,
    pub glide: GlideConfig,
    pub effects: EffectsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scale: "major".to_string(),
            rhythm_pattern: "basic".to_string(),
            drum_pattern: None,
            progression: "pop".to_string(),
            tempo_bpm: DEFAULT_TEMPO_BPM,
            left_zone_boundary: 0.3,
            right_zone_boundary: 0.7,
            stale_voice_timeout_ms: 2000,
            drain_delay_ms: 1000,
            sweep_interval_ms: 250,
            loops_per_chord: 2,
            throttle_fraction: DEFAULT_THROTTLE_FRACTION,
            min_confidence: 0.0,
            master_volume: 80.0,
            glide: GlideConfig::default(),
            effects: EffectsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zone_bounds().validate()?;
        validate_tempo(self.tempo_bpm)?;

        if self.stale_voice_timeout_ms == 0 {
            return Err(invalid("stale_voice_timeout_ms", "must be greater than zero"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(invalid("sweep_interval_ms", "must be greater than zero"));
        }
        if self.loops_per_chord == 0 {
            return Err(invalid("loops_per_chord", "must be at least 1"));
        }
        if !(self.throttle_fraction.is_finite() && self.throttle_fraction >= 0.0) {
            return Err(invalid("throttle_fraction", "must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence", "must be within 0..=1"));
        }
        if !(0.0..=100.0).contains(&self.master_volume) {
            return Err(invalid("master_volume", "must be within 0..=100"));
        }

        let g = &self.glide;
        if !(g.medium_speed >= 0.0 && g.fast_speed > g.medium_speed) {
            return Err(invalid("glide", "need 0 <= medium_speed < fast_speed"));
        }
        if [g.fast_glide, g.medium_glide, g.slow_glide].iter().any(|t| !(*t >= 0.0)) {
            return Err(invalid("glide", "glide times must be non-negative"));
        }

        let e = &self.effects;
        let wet = [
            e.reverb_wet_initial,
            e.reverb_wet_min,
            e.reverb_wet_max,
            e.delay_wet_center,
            e.delay_wet_right,
        ];
        if wet.iter().any(|w| !(0.0..=1.0).contains(w)) || e.reverb_wet_min > e.reverb_wet_max {
            return Err(invalid("effects", "wet levels must be within 0..=1 with min <= max"));
        }
        if !(e.reverb_decay > 0.0) {
            return Err(invalid("effects.reverb_decay", "must be positive"));
        }
        if !(0.0..1.0).contains(&e.delay_feedback) {
            return Err(invalid("effects.delay_feedback", "must be within 0..1"));
        }
        if !(e.cutoff_min_hz > 0.0 && e.cutoff_min_hz <= e.cutoff_max_hz) {
            return Err(invalid("effects", "need 0 < cutoff_min_hz <= cutoff_max_hz"));
        }
        Ok(())
    }

    pub fn zone_bounds(&self) -> ZoneBounds {
        ZoneBounds {
            left: self.left_zone_boundary,
            right: self.right_zone_boundary,
        }
    }

    pub fn drum_pattern_name(&self) -> &str {
        self.drum_pattern.as_deref().unwrap_or(&self.rhythm_pattern)
    }

    pub fn stale_timeout(&self) -> f64 {
        self.stale_voice_timeout_ms as f64 / 1000.0
    }

    pub fn drain_delay(&self) -> f64 {
        self.drain_delay_ms as f64 / 1000.0
    }

    pub fn sweep_interval(&self) -> f64 {
        self.sweep_interval_ms as f64 / 1000.0
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.to_string(),
    }
}
