//! Note names and pitch conversion
//!
//! Pitches are MIDI note numbers. Names follow scientific pitch notation with
//! `#`/`s` for sharps and `b`/`f` for flats (`C3`, `Eb3`, `F#3`, `fs3`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// MIDI note number type
pub type MidiNote = u8;

lazy_static::lazy_static! {
    static ref PITCH_CLASSES: HashMap<&'static str, i32> = {
        let mut m = HashMap::new();
        m.insert("c", 0);
        m.insert("cs", 1); m.insert("df", 1);
        m.insert("d", 2);
        m.insert("ds", 3); m.insert("ef", 3);
        m.insert("e", 4); m.insert("ff", 4);
        m.insert("es", 5); m.insert("f", 5);
        m.insert("fs", 6); m.insert("gf", 6);
        m.insert("g", 7);
        m.insert("gs", 8); m.insert("af", 8);
        m.insert("a", 9);
        m.insert("as", 10); m.insert("bf", 10);
        m.insert("b", 11); m.insert("cf", -1);
        m.insert("bs", 12);
        m
    };
}

const SHARP_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A note identifier, stored as a MIDI note number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pitch(pub MidiNote);

impl Pitch {
    pub const fn from_midi(midi: MidiNote) -> Self {
        Pitch(midi)
    }

    pub fn midi(self) -> MidiNote {
        self.0
    }

    /// Parse a note name such as `C3`, `Eb3`, `F#2` or `bf4`.
    ///
    /// A bare number is read as a MIDI note. A name without an octave
    /// defaults to octave 4.
    pub fn parse(name: &str) -> Option<Pitch> {
        let trimmed = name.trim();
        if let Ok(n) = trimmed.parse::<MidiNote>() {
            return (n <= 127).then_some(Pitch(n));
        }

        let lower = trimmed.to_lowercase().replace('#', "s");
        let split = lower
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .unwrap_or(lower.len());
        let (class_part, octave_part) = lower.split_at(split);

        // Flats may be written as 'b' after the letter ("eb3"). A bare "b"
        // is the note B.
        let class_key = if class_part.len() == 2 && class_part.ends_with('b') {
            format!("{}f", &class_part[..1])
        } else {
            class_part.to_string()
        };

        let offset = *PITCH_CLASSES.get(class_key.as_str())?;
        let octave: i32 = if octave_part.is_empty() {
            4
        } else {
            octave_part.parse().ok()?
        };

        let midi = (octave + 1) * 12 + offset;
        (0..=127).contains(&midi).then(|| Pitch(midi as MidiNote))
    }

    /// Frequency in Hz (A4 = 440).
    pub fn frequency(self) -> f64 {
        midi_to_freq(self.0)
    }

    /// Shift by semitones, clamped to the MIDI range.
    pub fn transpose(self, semitones: i32) -> Pitch {
        Pitch((self.0 as i32 + semitones).clamp(0, 127) as MidiNote)
    }

    pub fn octave(self) -> i32 {
        self.0 as i32 / 12 - 1
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", SHARP_NAMES[(self.0 % 12) as usize], self.octave())
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pitch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Pitch::parse(&name).ok_or_else(|| serde::de::Error::custom(format!("invalid note '{name}'")))
    }
}

/// Convert MIDI note number to frequency
pub fn midi_to_freq(midi: MidiNote) -> f64 {
    440.0 * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_names() {
        assert_eq!(Pitch::parse("C4"), Some(Pitch(60)));
        assert_eq!(Pitch::parse("C3"), Some(Pitch(48)));
        assert_eq!(Pitch::parse("Eb3"), Some(Pitch(51)));
        assert_eq!(Pitch::parse("F#2"), Some(Pitch(42)));
        assert_eq!(Pitch::parse("fs2"), Some(Pitch(42)));
        assert_eq!(Pitch::parse("Bb4"), Some(Pitch(70)));
        assert_eq!(Pitch::parse("B3"), Some(Pitch(59)));
        assert_eq!(Pitch::parse("a"), Some(Pitch(69)));
        assert_eq!(Pitch::parse("64"), Some(Pitch(64)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Pitch::parse("H2"), None);
        assert_eq!(Pitch::parse(""), None);
        assert_eq!(Pitch::parse("C99"), None);
        assert_eq!(Pitch::parse("200"), None);
    }

    #[test]
    fn test_display_uses_sharps() {
        assert_eq!(Pitch(60).to_string(), "C4");
        assert_eq!(Pitch(51).to_string(), "D#3");
        assert_eq!(Pitch::parse("Bb3").map(|p| p.to_string()), Some("A#3".to_string()));
    }

    #[test]
    fn test_frequency_conversion() {
        assert!((Pitch(69).frequency() - 440.0).abs() < 1e-9);
        assert!((midi_to_freq(57) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_transpose_clamps() {
        assert_eq!(Pitch(60).transpose(-12), Pitch(48));
        assert_eq!(Pitch(120).transpose(24), Pitch(127));
        assert_eq!(Pitch(5).transpose(-12), Pitch(0));
    }
}
