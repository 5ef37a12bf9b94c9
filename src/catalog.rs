//! Scale, rhythm, drum-pattern and timbre tables
//!
//! The builtin tables are static. A `Catalog` starts from them and may be
//! extended with custom entries before it is shared with the engine. Every
//! lookup falls back to a known entry, so mapping never fails on an unknown
//! name.

use crate::error::CatalogError;
use crate::note::Pitch;
use crate::rhythm_value::RhythmValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SCALE: &str = "major";
pub const DEFAULT_RHYTHM: &str = "basic";
pub const DEFAULT_PROGRESSION: &str = "pop";

/// Steps per drum loop
pub const DRUM_STEPS: usize = 8;

/// Oscillator character assigned to a class label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Timbre {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
    FmSine,
    FmTriangle,
    AmSine,
    FatSawtooth,
    Pulse,
}

impl Timbre {
    pub const ALL: [Timbre; 9] = [
        Timbre::Sine,
        Timbre::Square,
        Timbre::Triangle,
        Timbre::Sawtooth,
        Timbre::FmSine,
        Timbre::FmTriangle,
        Timbre::AmSine,
        Timbre::FatSawtooth,
        Timbre::Pulse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Timbre::Sine => "sine",
            Timbre::Square => "square",
            Timbre::Triangle => "triangle",
            Timbre::Sawtooth => "sawtooth",
            Timbre::FmSine => "fmsine",
            Timbre::FmTriangle => "fmtriangle",
            Timbre::AmSine => "amsine",
            Timbre::FatSawtooth => "fatsawtooth",
            Timbre::Pulse => "pulse",
        }
    }
}

impl fmt::Display for Timbre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Timbre {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Timbre::ALL
            .iter()
            .copied()
            .find(|t| t.name() == lower)
            .ok_or_else(|| CatalogError::UnknownTimbre(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumInstrument {
    Kick,
    Snare,
    Hihat,
}

impl DrumInstrument {
    pub const ALL: [DrumInstrument; 3] = [
        DrumInstrument::Kick,
        DrumInstrument::Snare,
        DrumInstrument::Hihat,
    ];

    /// Velocity of a plain `x` step
    pub fn base_velocity(self) -> f32 {
        match self {
            DrumInstrument::Kick => 0.8,
            DrumInstrument::Snare => 0.7,
            DrumInstrument::Hihat => 0.4,
        }
    }
}

impl fmt::Display for DrumInstrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrumInstrument::Kick => "kick",
            DrumInstrument::Snare => "snare",
            DrumInstrument::Hihat => "hihat",
        };
        f.write_str(name)
    }
}

/// Per-instrument step grid. `None` is a rest, `Some(v)` a hit at velocity `v`.
#[derive(Debug, Clone, PartialEq)]
pub struct DrumPattern {
    pub kick: Vec<Option<f32>>,
    pub snare: Vec<Option<f32>>,
    pub hihat: Vec<Option<f32>>,
}

impl DrumPattern {
    /// Build from grid strings: `x` hit, `X` accent, `~` or `.` rest.
    pub fn from_grids(name: &str, kick: &str, snare: &str, hihat: &str) -> Result<Self, CatalogError> {
        Ok(Self {
            kick: parse_grid(name, kick, DrumInstrument::Kick)?,
            snare: parse_grid(name, snare, DrumInstrument::Snare)?,
            hihat: parse_grid(name, hihat, DrumInstrument::Hihat)?,
        })
    }

    pub fn track(&self, instrument: DrumInstrument) -> &[Option<f32>] {
        match instrument {
            DrumInstrument::Kick => &self.kick,
            DrumInstrument::Snare => &self.snare,
            DrumInstrument::Hihat => &self.hihat,
        }
    }

    /// Hits due on `step`; each track wraps on its own length.
    pub fn hits_at(&self, step: usize) -> Vec<(DrumInstrument, f32)> {
        DrumInstrument::ALL
            .iter()
            .filter_map(|&instrument| {
                let track = self.track(instrument);
                if track.is_empty() {
                    return None;
                }
                track[step % track.len()].map(|velocity| (instrument, velocity))
            })
            .collect()
    }
}

fn parse_grid(
    name: &str,
    grid: &str,
    instrument: DrumInstrument,
) -> Result<Vec<Option<f32>>, CatalogError> {
    grid.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            'x' => Ok(Some(instrument.base_velocity())),
            'X' => Ok(Some((instrument.base_velocity() * 1.25).min(1.0))),
            '~' | '.' => Ok(None),
            other => Err(CatalogError::InvalidDrumStep {
                name: name.to_string(),
                token: other.to_string(),
            }),
        })
        .collect()
}

lazy_static::lazy_static! {
    static ref BUILTIN_SCALES: Vec<(&'static str, Vec<&'static str>)> = vec![
        ("major", vec!["C3", "D3", "E3", "F3", "G3", "A3", "B3", "C4", "D4", "E4", "F4", "G4"]),
        ("minor", vec!["C3", "D3", "Eb3", "F3", "G3", "Ab3", "Bb3", "C4", "D4", "Eb4", "F4", "G4"]),
        ("pentatonic", vec!["C3", "D3", "E3", "G3", "A3", "C4", "D4", "E4", "G4", "A4"]),
        ("blues", vec!["C3", "Eb3", "F3", "F#3", "G3", "Bb3", "C4", "Eb4", "F4", "F#4", "G4", "Bb4"]),
    ];

    static ref BUILTIN_RHYTHMS: Vec<(&'static str, Vec<&'static str>)> = vec![
        ("basic", vec!["8n", "4n", "2n", "1n"]),
        ("techno", vec!["16n", "8n", "8n.", "4n"]),
        ("jazz", vec!["8t", "4t", "2t", "1t"]),
        ("latin", vec!["16n", "8n", "8n.", "4n."]),
    ];

    static ref BUILTIN_DRUMS: Vec<(&'static str, [&'static str; 3])> = vec![
        ("basic", ["x~~~x~~~", "~~x~~~x~", "xxxxxxxx"]),
        ("techno", ["x~~xx~~x", "~~x~~~xx", "xxxxxxxx"]),
        ("jazz", ["x~x~~x~x", "~~x~x~~x", "x~x~x~x~"]),
        ("latin", ["x~~x~x~~", "~~x~x~xx", "xxxxxxxx"]),
    ];

    static ref BUILTIN_TIMBRES: Vec<(&'static str, Timbre)> = vec![
        ("person", Timbre::Sine),
        ("bottle", Timbre::Square),
        ("cup", Timbre::Triangle),
        ("book", Timbre::Sawtooth),
        ("cell phone", Timbre::FmSine),
        ("keyboard", Timbre::FmTriangle),
        ("remote", Timbre::AmSine),
        ("mouse", Timbre::FatSawtooth),
        ("laptop", Timbre::Pulse),
    ];

    /// Scale-degree progressions for the bass loop
    static ref BUILTIN_PROGRESSIONS: Vec<(&'static str, Vec<usize>)> = vec![
        ("pop", vec![0, 4, 5, 3]),
        ("blues", vec![0, 3, 0, 4]),
        ("minor", vec![0, 5, 3, 4]),
    ];
}

/// Lookup tables used by the mapper and the rhythm layer.
#[derive(Debug, Clone)]
pub struct Catalog {
    scales: HashMap<String, Vec<Pitch>>,
    rhythms: HashMap<String, Vec<RhythmValue>>,
    drums: HashMap<String, DrumPattern>,
    timbres: HashMap<String, Timbre>,
    progressions: HashMap<String, Vec<usize>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// Catalog populated with the builtin tables only.
    pub fn builtin() -> Self {
        let mut catalog = Catalog {
            scales: HashMap::new(),
            rhythms: HashMap::new(),
            drums: HashMap::new(),
            timbres: HashMap::new(),
            progressions: HashMap::new(),
        };

        // Builtin tables are fixed data; the parsers below accept all of it.
        for (name, notes) in BUILTIN_SCALES.iter() {
            let pitches = notes.iter().filter_map(|n| Pitch::parse(n)).collect();
            catalog.scales.insert(name.to_string(), pitches);
        }
        for (name, tokens) in BUILTIN_RHYTHMS.iter() {
            let values = tokens.iter().filter_map(|t| RhythmValue::parse(t)).collect();
            catalog.rhythms.insert(name.to_string(), values);
        }
        for (name, [kick, snare, hihat]) in BUILTIN_DRUMS.iter() {
            if let Ok(pattern) = DrumPattern::from_grids(name, kick, snare, hihat) {
                catalog.drums.insert(name.to_string(), pattern);
            }
        }
        for (label, timbre) in BUILTIN_TIMBRES.iter() {
            catalog.timbres.insert(label.to_string(), *timbre);
        }
        for (name, degrees) in BUILTIN_PROGRESSIONS.iter() {
            catalog.progressions.insert(name.to_string(), degrees.clone());
        }
        catalog
    }

    pub fn has_scale(&self, name: &str) -> bool {
        self.scales.contains_key(name)
    }

    pub fn has_rhythm(&self, name: &str) -> bool {
        self.rhythms.contains_key(name)
    }

    pub fn has_drum_pattern(&self, name: &str) -> bool {
        self.drums.contains_key(name)
    }

    /// Pitches for `name`, or the major scale when unknown.
    pub fn scale(&self, name: &str) -> &[Pitch] {
        self.scales
            .get(name)
            .or_else(|| self.scales.get(DEFAULT_SCALE))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rhythm values for `name`, or the basic pattern when unknown.
    pub fn rhythm(&self, name: &str) -> &[RhythmValue] {
        self.rhythms
            .get(name)
            .or_else(|| self.rhythms.get(DEFAULT_RHYTHM))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drum grid for `name`, or the basic grid when unknown.
    pub fn drum_pattern(&self, name: &str) -> Option<&DrumPattern> {
        self.drums.get(name).or_else(|| self.drums.get(DEFAULT_RHYTHM))
    }

    /// Timbre for a class label; unknown labels get the default timbre.
    pub fn timbre(&self, class_label: &str) -> Timbre {
        self.timbres
            .get(class_label)
            .or_else(|| self.timbres.get(&class_label.to_lowercase()))
            .copied()
            .unwrap_or_default()
    }

    pub fn progression(&self, name: &str) -> &[usize] {
        self.progressions
            .get(name)
            .or_else(|| self.progressions.get(DEFAULT_PROGRESSION))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn register_scale(&mut self, name: &str, notes: &[&str]) -> Result<(), CatalogError> {
        let name = checked_name(name)?;
        if notes.is_empty() {
            return Err(CatalogError::Empty { name });
        }
        let pitches = notes
            .iter()
            .map(|note| {
                Pitch::parse(note).ok_or_else(|| CatalogError::InvalidNote {
                    name: name.clone(),
                    note: note.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.scales.insert(name, pitches);
        Ok(())
    }

    pub fn register_rhythm(&mut self, name: &str, tokens: &[&str]) -> Result<(), CatalogError> {
        let name = checked_name(name)?;
        if tokens.is_empty() {
            return Err(CatalogError::Empty { name });
        }
        let values = tokens
            .iter()
            .map(|token| {
                RhythmValue::parse(token).ok_or_else(|| CatalogError::InvalidRhythmValue {
                    name: name.clone(),
                    token: token.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.rhythms.insert(name, values);
        Ok(())
    }

    pub fn register_drum_pattern(
        &mut self,
        name: &str,
        kick: &str,
        snare: &str,
        hihat: &str,
    ) -> Result<(), CatalogError> {
        let name = checked_name(name)?;
        let pattern = DrumPattern::from_grids(&name, kick, snare, hihat)?;
        if pattern.kick.is_empty() && pattern.snare.is_empty() && pattern.hihat.is_empty() {
            return Err(CatalogError::Empty { name });
        }
        self.drums.insert(name, pattern);
        Ok(())
    }

    pub fn register_timbre(&mut self, class_label: &str, timbre: &str) -> Result<(), CatalogError> {
        let label = checked_name(class_label)?;
        let timbre = timbre.parse::<Timbre>()?;
        self.timbres.insert(label, timbre);
        Ok(())
    }

    pub fn scale_names(&self) -> Vec<String> {
        sorted_keys(&self.scales)
    }

    pub fn rhythm_names(&self) -> Vec<String> {
        sorted_keys(&self.rhythms)
    }

    pub fn drum_pattern_names(&self) -> Vec<String> {
        sorted_keys(&self.drums)
    }

    /// Class label → timbre pairs, sorted by label.
    pub fn timbre_mappings(&self) -> Vec<(String, Timbre)> {
        let mut pairs: Vec<_> = self.timbres.iter().map(|(k, v)| (k.clone(), *v)).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}

fn checked_name(name: &str) -> Result<String, CatalogError> {
    let name = name.trim();
    if name.is_empty() {
        Err(CatalogError::EmptyName)
    } else {
        Ok(name.to_string())
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_scales() {
        let catalog = Catalog::builtin();
        let major: Vec<u8> = catalog.scale("major").iter().map(|p| p.midi()).collect();
        assert_eq!(major, vec![48, 50, 52, 53, 55, 57, 59, 60, 62, 64, 65, 67]);
        assert_eq!(catalog.scale("pentatonic").len(), 10);
        assert_eq!(catalog.scale("blues")[3], Pitch(54));
    }

    #[test]
    fn test_unknown_names_fall_back() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.scale("lydian"), catalog.scale("major"));
        assert_eq!(catalog.rhythm("polka"), catalog.rhythm("basic"));
        assert_eq!(catalog.drum_pattern("polka"), catalog.drum_pattern("basic"));
        assert_eq!(catalog.timbre("giraffe"), Timbre::Sine);
    }

    #[test]
    fn test_timbre_lookup() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.timbre("bottle"), Timbre::Square);
        assert_eq!(catalog.timbre("cell phone"), Timbre::FmSine);
        assert_eq!(catalog.timbre("Laptop"), Timbre::Pulse);
    }

    #[test]
    fn test_drum_grid_hits() {
        let catalog = Catalog::builtin();
        let basic = catalog.drum_pattern("basic").cloned().unwrap_or_else(|| panic!("basic grid"));
        assert_eq!(basic.kick.len(), DRUM_STEPS);

        let step0: Vec<_> = basic.hits_at(0).into_iter().map(|(i, _)| i).collect();
        assert_eq!(step0, vec![DrumInstrument::Kick, DrumInstrument::Hihat]);

        let step2: Vec<_> = basic.hits_at(2).into_iter().map(|(i, _)| i).collect();
        assert_eq!(step2, vec![DrumInstrument::Snare, DrumInstrument::Hihat]);
    }

    #[test]
    fn test_accent_is_louder() {
        let pattern = DrumPattern::from_grids("accent", "X~x~", "", "").unwrap();
        let accent = pattern.kick[0].unwrap();
        let plain = pattern.kick[2].unwrap();
        assert!(accent > plain);
        assert!(pattern.snare.is_empty());
    }

    #[test]
    fn test_register_custom_entries() {
        let mut catalog = Catalog::builtin();
        catalog.register_scale("dorian", &["D3", "E3", "F3", "G3", "A3", "B3", "C4"]).unwrap();
        assert_eq!(catalog.scale("dorian")[0], Pitch(50));

        catalog.register_rhythm("halting", &["4n.", "8n"]).unwrap();
        assert_eq!(catalog.rhythm("halting").len(), 2);

        catalog.register_timbre("banana", "fatsawtooth").unwrap();
        assert_eq!(catalog.timbre("banana"), Timbre::FatSawtooth);

        assert!(catalog.scale_names().contains(&"dorian".to_string()));
    }

    #[test]
    fn test_register_rejects_malformed_entries() {
        let mut catalog = Catalog::builtin();
        assert_eq!(catalog.register_scale("", &["C3"]), Err(CatalogError::EmptyName));
        assert!(matches!(
            catalog.register_scale("odd", &[]),
            Err(CatalogError::Empty { .. })
        ));
        assert!(matches!(
            catalog.register_scale("odd", &["C3", "Q9"]),
            Err(CatalogError::InvalidNote { .. })
        ));
        assert!(matches!(
            catalog.register_rhythm("odd", &["7n"]),
            Err(CatalogError::InvalidRhythmValue { .. })
        ));
        assert!(matches!(
            catalog.register_drum_pattern("odd", "x?x", "", ""),
            Err(CatalogError::InvalidDrumStep { .. })
        ));
        assert!(matches!(
            catalog.register_timbre("thing", "kazoo"),
            Err(CatalogError::UnknownTimbre(_))
        ));
        assert!(!catalog.has_scale("odd"));
    }

    #[test]
    fn test_progression_fallback() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.progression("pop"), &[0, 4, 5, 3]);
        assert_eq!(catalog.progression("unknown"), catalog.progression("pop"));
    }
}
