//! Error types
//!
//! Every failure the engine can observe is one of these enums. None of them
//! ever escapes the detection-to-music loop: the engine logs them and keeps
//! going (see `engine.rs`).

use crate::tone::VoiceHandle;
use thiserror::Error;

/// A single detection could not be mapped and is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("detection has no class label")]
    MissingClass,

    #[error("detection '{class}' has no bounding box")]
    MissingBoundingBox { class: String },

    #[error("detection '{class}' has a degenerate bounding box ({width}x{height})")]
    DegenerateBoundingBox { class: String, width: f64, height: f64 },

    #[error("detection '{class}' has non-finite coordinates")]
    NonFiniteCoordinates { class: String },

    #[error("frame size {width}x{height} is not usable")]
    InvalidFrame { width: f64, height: f64 },

    #[error("detection '{class}' confidence {confidence:.2} is below the floor {floor:.2}")]
    LowConfidence { class: String, confidence: f64, floor: f64 },
}

/// A Tone Generation Service command failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToneError {
    #[error("unknown voice handle {0}")]
    InvalidHandle(VoiceHandle),

    #[error("voice handle {0} was already disposed")]
    Disposed(VoiceHandle),

    #[error("voice handle {0} is releasing and cannot change pitch")]
    Releasing(VoiceHandle),

    #[error("voice limit of {limit} reached")]
    VoiceLimit { limit: usize },

    #[error("tone service failure: {0}")]
    Backend(String),
}

/// Configuration could not be used as given.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown scale '{requested}', falling back to '{fallback}'")]
    UnknownScale { requested: String, fallback: String },

    #[error("unknown rhythm pattern '{requested}', falling back to '{fallback}'")]
    UnknownRhythmPattern { requested: String, fallback: String },

    #[error("unknown drum pattern '{requested}', falling back to '{fallback}'")]
    UnknownDrumPattern { requested: String, fallback: String },

    #[error("zone boundaries must satisfy 0 < left < right < 1 (got {left} / {right})")]
    InvalidZoneBounds { left: f64, right: f64 },

    #[error("tempo {bpm} BPM is outside {min}..={max}")]
    InvalidTempo { bpm: f64, min: f64, max: f64 },

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A custom catalog entry was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("catalog entry name must not be empty")]
    EmptyName,

    #[error("'{name}' has no entries")]
    Empty { name: String },

    #[error("'{name}': invalid note '{note}'")]
    InvalidNote { name: String, note: String },

    #[error("'{name}': invalid rhythm value '{token}'")]
    InvalidRhythmValue { name: String, token: String },

    #[error("'{name}': invalid drum step '{token}' (expected x, X or ~)")]
    InvalidDrumStep { name: String, token: String },

    #[error("unknown timbre '{0}'")]
    UnknownTimbre(String),
}

/// Offline rendering failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("nothing was rendered")]
    Empty,

    #[error("invalid low-pass filter parameters: {0}")]
    Filter(String),

    #[error("WAV output failed: {0}")]
    Wav(#[from] hound::Error),
}

/// A scripted detection file could not be used.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read detection script: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse detection script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("frame rate must be positive (got {0})")]
    InvalidFps(f64),
}
