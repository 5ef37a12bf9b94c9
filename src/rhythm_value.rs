//! Symbolic duration tokens
//!
//! `4n` is a quarter note, `8n` an eighth, `8n.` a dotted eighth, `8t` an
//! eighth-note triplet and `1m` one 4/4 measure. Durations are resolved to
//! seconds against a tempo so the same token means the same musical length at
//! any BPM.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subdivision {
    /// Straight note value (`n`)
    Note,
    /// Dotted note value (`n.`), 1.5x length
    Dotted,
    /// Triplet note value (`t`), 2/3 length
    Triplet,
    /// Whole measures (`m`)
    Measure,
}

/// A rhythm value token such as `8n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RhythmValue {
    /// 1, 2, 4, 8, 16, 32 or 64 for note values; measure count for `m`.
    pub division: u32,
    pub subdivision: Subdivision,
}

impl RhythmValue {
    pub const fn note(division: u32) -> Self {
        Self {
            division,
            subdivision: Subdivision::Note,
        }
    }

    pub const fn dotted(division: u32) -> Self {
        Self {
            division,
            subdivision: Subdivision::Dotted,
        }
    }

    pub const fn triplet(division: u32) -> Self {
        Self {
            division,
            subdivision: Subdivision::Triplet,
        }
    }

    pub fn parse(token: &str) -> Option<RhythmValue> {
        let token = token.trim();
        let (body, subdivision) = if let Some(body) = token.strip_suffix("n.") {
            (body, Subdivision::Dotted)
        } else if let Some(body) = token.strip_suffix('n') {
            (body, Subdivision::Note)
        } else if let Some(body) = token.strip_suffix('t') {
            (body, Subdivision::Triplet)
        } else if let Some(body) = token.strip_suffix('m') {
            (body, Subdivision::Measure)
        } else {
            return None;
        };

        let division: u32 = body.parse().ok()?;
        let valid = match subdivision {
            Subdivision::Measure => (1..=16).contains(&division),
            _ => matches!(division, 1 | 2 | 4 | 8 | 16 | 32 | 64),
        };
        valid.then_some(RhythmValue {
            division,
            subdivision,
        })
    }

    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        let straight = 4.0 / self.division as f64;
        match self.subdivision {
            Subdivision::Note => straight,
            Subdivision::Dotted => straight * 1.5,
            Subdivision::Triplet => straight * 2.0 / 3.0,
            Subdivision::Measure => 4.0 * self.division as f64,
        }
    }

    /// Length in seconds at the given tempo.
    pub fn seconds(self, tempo_bpm: f64) -> f64 {
        self.beats() * 60.0 / tempo_bpm
    }
}

impl fmt::Display for RhythmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subdivision {
            Subdivision::Note => write!(f, "{}n", self.division),
            Subdivision::Dotted => write!(f, "{}n.", self.division),
            Subdivision::Triplet => write!(f, "{}t", self.division),
            Subdivision::Measure => write!(f, "{}m", self.division),
        }
    }
}

impl Serialize for RhythmValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RhythmValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        RhythmValue::parse(&token)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid rhythm value '{token}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(RhythmValue::parse("8n"), Some(RhythmValue::note(8)));
        assert_eq!(RhythmValue::parse("8n."), Some(RhythmValue::dotted(8)));
        assert_eq!(RhythmValue::parse("4t"), Some(RhythmValue::triplet(4)));
        assert_eq!(
            RhythmValue::parse("1m").map(|r| r.subdivision),
            Some(Subdivision::Measure)
        );
        assert_eq!(RhythmValue::parse("3n"), None);
        assert_eq!(RhythmValue::parse("8x"), None);
        assert_eq!(RhythmValue::parse(""), None);
    }

    #[test]
    fn test_seconds_at_120_bpm() {
        let at = |t: &str| RhythmValue::parse(t).map(|r| r.seconds(120.0)).unwrap_or(f64::NAN);
        assert!((at("4n") - 0.5).abs() < 1e-9);
        assert!((at("8n") - 0.25).abs() < 1e-9);
        assert!((at("16n") - 0.125).abs() < 1e-9);
        assert!((at("8n.") - 0.375).abs() < 1e-9);
        assert!((at("4t") - 1.0 / 3.0).abs() < 1e-9);
        assert!((at("1n") - 2.0).abs() < 1e-9);
        assert!((at("1m") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_display_round_trips_token() {
        for token in ["16n", "8n.", "2t", "4n.", "1m"] {
            assert_eq!(RhythmValue::parse(token).map(|r| r.to_string()), Some(token.to_string()));
        }
    }
}
