//! Detection input
//!
//! Detections arrive from an external detector, one batch per camera frame.
//! Fields the detector may omit are optional here and validated when the
//! detection is normalized.

use crate::error::{MappingError, ScriptError};
use crate::mapper::NormalizedPosition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_FRAME_WIDTH: f64 = 640.0;
pub const DEFAULT_FRAME_HEIGHT: f64 = 480.0;

/// Pixel-space bounding box, serialized as `[x, y, width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([x, y, width, height]: [f64; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

fn default_confidence() -> f64 {
    1.0
}

fn default_frame_width() -> f64 {
    DEFAULT_FRAME_WIDTH
}

fn default_frame_height() -> f64 {
    DEFAULT_FRAME_HEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default, alias = "class")]
    pub class_label: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default = "default_frame_width")]
    pub frame_width: f64,
    #[serde(default = "default_frame_height")]
    pub frame_height: f64,
}

impl Detection {
    pub fn new(class_label: &str, bbox: [f64; 4]) -> Self {
        Self {
            class_label: Some(class_label.to_string()),
            confidence: 1.0,
            bbox: Some(bbox.into()),
            identity: None,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
        }
    }

    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = Some(identity.to_string());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_frame(mut self, width: f64, height: f64) -> Self {
        self.frame_width = width;
        self.frame_height = height;
        self
    }

    /// Class label, or `MissingClass` for a blank or absent label.
    pub fn class(&self) -> Result<&str, MappingError> {
        self.class_label
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(MappingError::MissingClass)
    }

    /// Validate and normalize into the unit square.
    ///
    /// `x` is the left edge of the box, `y` its vertical centre measured from
    /// the bottom of the frame.
    pub fn normalized(&self, min_confidence: f64) -> Result<NormalizedPosition, MappingError> {
        let class = self.class()?.to_string();
        let bbox = self
            .bbox
            .ok_or_else(|| MappingError::MissingBoundingBox { class: class.clone() })?;

        let finite = [bbox.x, bbox.y, bbox.width, bbox.height, self.confidence]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(MappingError::NonFiniteCoordinates { class });
        }
        if !(self.frame_width.is_finite()
            && self.frame_height.is_finite()
            && self.frame_width > 0.0
            && self.frame_height > 0.0)
        {
            return Err(MappingError::InvalidFrame {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        if bbox.width <= 0.0 || bbox.height <= 0.0 {
            return Err(MappingError::DegenerateBoundingBox {
                class,
                width: bbox.width,
                height: bbox.height,
            });
        }
        if self.confidence < min_confidence {
            return Err(MappingError::LowConfidence {
                class,
                confidence: self.confidence,
                floor: min_confidence,
            });
        }

        Ok(NormalizedPosition::new(
            bbox.x / self.frame_width,
            1.0 - (bbox.y + bbox.height / 2.0) / self.frame_height,
        ))
    }
}

/// Prefix of keys derived for detections the detector did not track.
pub const UNTRACKED_PREFIX: char = '~';

/// Identity keys for a batch, in detector order.
///
/// A detection without an identity gets `"~{class}-{n}"`, `n` counting
/// same-class detections earlier in the batch. Detector identities may not
/// use the `~` prefix, so the two kinds of key never collide; such
/// detections, and detections without a class, get `None`.
pub fn identity_keys(batch: &[Detection]) -> Vec<Option<String>> {
    let mut ordinals: HashMap<&str, usize> = HashMap::new();
    batch
        .iter()
        .map(|detection| {
            let class = detection.class().ok()?;
            let n = ordinals.entry(class).or_insert(0);
            let ordinal = *n;
            *n += 1;
            match &detection.identity {
                Some(id) if id.starts_with(UNTRACKED_PREFIX) => {
                    warn!("Ignoring {} with reserved identity {:?}", class, id);
                    None
                }
                Some(id) if !id.trim().is_empty() => Some(id.clone()),
                _ => Some(format!("{UNTRACKED_PREFIX}{class}-{ordinal}")),
            }
        })
        .collect()
}

/// Pull-side interface to a detector.
pub trait DetectionSource {
    /// Detections for the next frame, possibly empty.
    fn next_batch(&mut self) -> Vec<Detection>;

    /// True once the source will produce no more frames.
    fn is_exhausted(&self) -> bool {
        false
    }
}

fn default_fps() -> f64 {
    30.0
}

/// Recorded detections, one batch per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionScript {
    #[serde(default = "default_fps")]
    pub fps: f64,
    #[serde(default)]
    pub frames: Vec<Vec<Detection>>,
}

impl DetectionScript {
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        let script: DetectionScript = serde_json::from_str(json)?;
        if !(script.fps.is_finite() && script.fps > 0.0) {
            return Err(ScriptError::InvalidFps(script.fps));
        }
        Ok(script)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Seconds between frames
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.fps
    }

    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 * self.frame_interval()
    }
}

/// Replays a `DetectionScript` frame by frame.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    frames: std::vec::IntoIter<Vec<Detection>>,
    remaining: usize,
}

impl ScriptedSource {
    pub fn new(script: DetectionScript) -> Self {
        let remaining = script.frames.len();
        Self {
            frames: script.frames.into_iter(),
            remaining,
        }
    }
}

impl DetectionSource for ScriptedSource {
    fn next_batch(&mut self) -> Vec<Detection> {
        match self.frames.next() {
            Some(batch) => {
                self.remaining -= 1;
                batch
            }
            None => Vec::new(),
        }
    }

    fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
