//! Position-to-music mapping
//!
//! Pure functions from a normalized position and class label to a
//! `MusicalEvent`. Vertical position picks the pitch, horizontal position the
//! zone and the rhythm value, the class label the timbre.

use crate::catalog::{Catalog, Timbre};
use crate::error::ConfigError;
use crate::note::Pitch;
use crate::rhythm_value::RhythmValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Fraction of the scale reachable from the bottom to the top of the frame.
/// Keeps the top of the scale out of reach so leads don't shriek.
pub const REGISTER_BIAS: f64 = 0.8;

/// Pitch-index offsets applied by time-seeded variation.
pub const ORNAMENTS: [i32; 4] = [0, 2, 0, -2];

/// Seconds per variation slot
pub const VARIATION_PERIOD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPosition {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPosition {
    /// Clamped into the unit square; NaN becomes 0.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: unit(x),
            y: unit(y),
        }
    }

    pub fn distance(&self, other: &NormalizedPosition) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

fn unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    Left,
    Center,
    Right,
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Zone::Left => "left",
            Zone::Center => "center",
            Zone::Right => "right",
        };
        f.write_str(name)
    }
}

/// Horizontal zone boundaries, `0 < left < right < 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub left: f64,
    pub right: f64,
}

impl Default for ZoneBounds {
    fn default() -> Self {
        Self {
            left: 0.3,
            right: 0.7,
        }
    }
}

impl ZoneBounds {
    pub fn new(left: f64, right: f64) -> Result<Self, ConfigError> {
        let bounds = Self { left, right };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.left.is_finite()
            && self.right.is_finite()
            && 0.0 < self.left
            && self.left < self.right
            && self.right < 1.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidZoneBounds {
                left: self.left,
                right: self.right,
            })
        }
    }

    /// `x < left` is Left, `x > right` is Right, boundaries belong to Center.
    pub fn zone(&self, x: f64) -> Zone {
        if x < self.left {
            Zone::Left
        } else if x > self.right {
            Zone::Right
        } else {
            Zone::Center
        }
    }

    /// Position of `x` inside its zone, in `[0, 1]`.
    fn local(&self, x: f64, zone: Zone) -> f64 {
        let (start, end) = match zone {
            Zone::Left => (0.0, self.left),
            Zone::Center => (self.left, self.right),
            Zone::Right => (self.right, 1.0),
        };
        unit((x - start) / (end - start))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalEvent {
    pub pitch: Pitch,
    pub rhythm_value: RhythmValue,
    pub timbre: Timbre,
    pub zone: Zone,
}

/// `floor(seconds / 2) mod 4`; negative time counts as zero.
pub fn time_seeded_variation(transport_seconds: f64) -> usize {
    if !transport_seconds.is_finite() || transport_seconds <= 0.0 {
        return 0;
    }
    (transport_seconds / VARIATION_PERIOD).floor() as usize % ORNAMENTS.len()
}

#[derive(Debug, Clone)]
pub struct PositionMapper {
    catalog: Arc<Catalog>,
    bounds: ZoneBounds,
}

impl PositionMapper {
    pub fn new(catalog: Arc<Catalog>, bounds: ZoneBounds) -> Self {
        Self { catalog, bounds }
    }

    pub fn bounds(&self) -> ZoneBounds {
        self.bounds
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn map_position(
        &self,
        x: f64,
        y: f64,
        class_label: &str,
        scale_id: &str,
        rhythm_pattern_id: &str,
    ) -> MusicalEvent {
        self.map_with_offset(x, y, class_label, scale_id, rhythm_pattern_id, 0)
    }

    /// As `map_position`, with the pitch index shifted by the ornament for
    /// the current variation slot.
    pub fn map_position_varied(
        &self,
        x: f64,
        y: f64,
        class_label: &str,
        scale_id: &str,
        rhythm_pattern_id: &str,
        transport_seconds: f64,
    ) -> MusicalEvent {
        let offset = ORNAMENTS[time_seeded_variation(transport_seconds)];
        self.map_with_offset(x, y, class_label, scale_id, rhythm_pattern_id, offset)
    }

    fn map_with_offset(
        &self,
        x: f64,
        y: f64,
        class_label: &str,
        scale_id: &str,
        rhythm_pattern_id: &str,
        pitch_offset: i32,
    ) -> MusicalEvent {
        let pos = NormalizedPosition::new(x, y);
        let zone = self.bounds.zone(pos.x);

        let scale = self.catalog.scale(scale_id);
        let pitch = if scale.is_empty() {
            Pitch::from_midi(60)
        } else {
            let index = pitch_index(pos.y, scale.len()) as i32 + pitch_offset;
            scale[index.clamp(0, scale.len() as i32 - 1) as usize]
        };

        let rhythm = self.catalog.rhythm(rhythm_pattern_id);
        let rhythm_value = if rhythm.is_empty() {
            RhythmValue::note(8)
        } else {
            rhythm[rhythm_index(self.bounds.local(pos.x, zone), zone, rhythm.len())]
        };

        MusicalEvent {
            pitch,
            rhythm_value,
            timbre: self.catalog.timbre(class_label),
            zone,
        }
    }
}

/// `floor(y * len * REGISTER_BIAS)`, clamped to the scale.
pub fn pitch_index(y: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let raw = (unit(y) * len as f64 * REGISTER_BIAS).floor() as usize;
    raw.min(len - 1)
}

/// Index into a rhythm pattern for a zone and a position inside that zone.
pub fn rhythm_index(local: f64, zone: Zone, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let third = (len / 3).max(1);
    let (start, end) = match zone {
        Zone::Left => (0, third),
        Zone::Right => (len.saturating_sub(third), len),
        Zone::Center if third < len - third => (third, len - third),
        Zone::Center => (0, len),
    };
    let band = end - start;
    let offset = ((unit(local) * band as f64).floor() as usize).min(band - 1);
    start + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> PositionMapper {
        PositionMapper::new(Arc::new(Catalog::builtin()), ZoneBounds::default())
    }

    #[test]
    fn test_zone_boundaries() {
        let bounds = ZoneBounds::default();
        assert_eq!(bounds.zone(0.29), Zone::Left);
        assert_eq!(bounds.zone(0.3), Zone::Center);
        assert_eq!(bounds.zone(0.7), Zone::Center);
        assert_eq!(bounds.zone(0.71), Zone::Right);
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(ZoneBounds::new(0.7, 0.3).is_err());
        assert!(ZoneBounds::new(0.0, 0.5).is_err());
        assert!(ZoneBounds::new(0.5, 1.0).is_err());
        assert!(ZoneBounds::new(f64::NAN, 0.5).is_err());
        assert!(ZoneBounds::new(0.2, 0.8).is_ok());
    }

    #[test]
    fn test_pitch_index_uses_register_bias() {
        assert_eq!(pitch_index(0.0, 12), 0);
        assert_eq!(pitch_index(0.7917, 12), 7);
        assert_eq!(pitch_index(1.0, 12), 9);
        assert_eq!(pitch_index(1.0, 1), 0);
        assert_eq!(pitch_index(5.0, 12), 9);
    }

    #[test]
    fn test_rhythm_bands() {
        // basic: 8n 4n 2n 1n -> third = 1
        assert_eq!(rhythm_index(0.0, Zone::Left, 4), 0);
        assert_eq!(rhythm_index(1.0, Zone::Left, 4), 0);
        assert_eq!(rhythm_index(0.0, Zone::Center, 4), 1);
        assert_eq!(rhythm_index(0.99, Zone::Center, 4), 2);
        assert_eq!(rhythm_index(0.5, Zone::Right, 4), 3);
        // too short for three bands
        assert_eq!(rhythm_index(0.9, Zone::Center, 2), 1);
        assert_eq!(rhythm_index(0.9, Zone::Right, 1), 0);
    }

    #[test]
    fn test_map_scenario_person() {
        let event = mapper().map_position(50.0 / 640.0, 1.0 - 100.0 / 480.0, "person", "major", "basic");
        assert_eq!(event.zone, Zone::Left);
        assert_eq!(event.pitch, Pitch(60));
        assert_eq!(event.rhythm_value, RhythmValue::note(8));
        assert_eq!(event.timbre, Timbre::Sine);
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let m = mapper();
        for i in 0..50 {
            let x = i as f64 / 49.0;
            let y = 1.0 - x;
            let a = m.map_position(x, y, "cup", "blues", "jazz");
            let b = m.map_position(x, y, "cup", "blues", "jazz");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_unknown_ids_fall_back() {
        let m = mapper();
        let fallback = m.map_position(0.5, 0.5, "giraffe", "nope", "nope");
        let explicit = m.map_position(0.5, 0.5, "person", "major", "basic");
        assert_eq!(fallback, explicit);
    }

    #[test]
    fn test_time_seeded_variation() {
        assert_eq!(time_seeded_variation(0.0), 0);
        assert_eq!(time_seeded_variation(1.99), 0);
        assert_eq!(time_seeded_variation(2.0), 1);
        assert_eq!(time_seeded_variation(7.5), 3);
        assert_eq!(time_seeded_variation(8.0), 0);
        assert_eq!(time_seeded_variation(-3.0), 0);
    }

    #[test]
    fn test_varied_mapping_shifts_pitch() {
        let m = mapper();
        let plain = m.map_position(0.5, 0.5, "person", "major", "basic");
        let up = m.map_position_varied(0.5, 0.5, "person", "major", "basic", 2.5);
        let down = m.map_position_varied(0.5, 0.5, "person", "major", "basic", 6.5);
        let same = m.map_position_varied(0.5, 0.5, "person", "major", "basic", 4.5);
        assert!(up.pitch > plain.pitch);
        assert!(down.pitch < plain.pitch);
        assert_eq!(same, plain);
        assert_eq!(up.rhythm_value, plain.rhythm_value);
    }
}
