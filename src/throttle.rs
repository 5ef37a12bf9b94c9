//! Trigger throttle
//!
//! Enforces a minimum spacing between triggers of the same note key. The
//! spacing follows the active rhythm value, so faster rhythms allow denser
//! triggering.

use crate::mapper::Zone;
use crate::note::Pitch;
use crate::rhythm_value::RhythmValue;
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_THROTTLE_FRACTION: f64 = 0.4;

/// Key a trigger is deduplicated on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NoteKey {
    /// A new voice attacking `pitch` in `zone`
    Attack { pitch: Pitch, zone: Zone },
    /// A pitch change on an existing identity's voice
    Glide { identity: String },
}

impl NoteKey {
    pub fn attack(pitch: Pitch, zone: Zone) -> Self {
        NoteKey::Attack { pitch, zone }
    }

    pub fn glide(identity: &str) -> Self {
        NoteKey::Glide {
            identity: identity.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriggerThrottle {
    /// Last trigger time and the interval it was throttled with
    last_trigger: HashMap<NoteKey, (f64, f64)>,
    min_interval: f64,
    fraction: f64,
}

impl TriggerThrottle {
    pub fn new(fraction: f64) -> Self {
        let mut throttle = Self {
            last_trigger: HashMap::new(),
            min_interval: 0.0,
            fraction,
        };
        throttle.set_rhythm(RhythmValue::note(8), 120.0);
        throttle
    }

    /// Derive the minimum interval from a rhythm value at a tempo.
    pub fn set_rhythm(&mut self, value: RhythmValue, tempo_bpm: f64) {
        self.min_interval = value.seconds(tempo_bpm) * self.fraction;
    }

    pub fn min_interval(&self) -> f64 {
        self.min_interval
    }

    /// Interval for a rhythm value at a tempo, without changing the default.
    pub fn interval_for(&self, value: RhythmValue, tempo_bpm: f64) -> f64 {
        value.seconds(tempo_bpm) * self.fraction
    }

    /// True when `key` may fire at `now`; records the trigger if so.
    pub fn should_trigger(&mut self, key: &NoteKey, now: f64) -> bool {
        self.should_trigger_with(key, now, self.min_interval)
    }

    /// As `should_trigger` with an explicit interval.
    pub fn should_trigger_with(&mut self, key: &NoteKey, now: f64, min_interval: f64) -> bool {
        if let Some(&(last, _)) = self.last_trigger.get(key) {
            if now - last < min_interval {
                debug!("Throttled {:?} ({:.3}s since last, min {:.3}s)", key, now - last, min_interval);
                return false;
            }
        }
        self.last_trigger.insert(key.clone(), (now, min_interval));
        true
    }

    /// Drop keys whose own interval has elapsed.
    pub fn prune(&mut self, now: f64) {
        self.last_trigger
            .retain(|_, (last, interval)| now - *last < *interval);
    }

    pub fn clear(&mut self) {
        self.last_trigger.clear();
    }

    pub fn len(&self) -> usize {
        self.last_trigger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_trigger.is_empty()
    }
}

impl Default for TriggerThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_FRACTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eighth_note_interval() {
        let throttle = TriggerThrottle::default();
        assert!((throttle.min_interval() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_close_triggers_suppressed() {
        let mut throttle = TriggerThrottle::default();
        let key = NoteKey::attack(Pitch(60), Zone::Left);
        assert!(throttle.should_trigger(&key, 1.0));
        assert!(!throttle.should_trigger(&key, 1.05));
        assert!(throttle.should_trigger(&key, 1.2));
    }

    #[test]
    fn test_suppressed_trigger_does_not_reset_clock() {
        let mut throttle = TriggerThrottle::default();
        let key = NoteKey::glide("p1");
        assert!(throttle.should_trigger(&key, 0.0));
        assert!(!throttle.should_trigger(&key, 0.08));
        assert!(throttle.should_trigger(&key, 0.11));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut throttle = TriggerThrottle::default();
        assert!(throttle.should_trigger(&NoteKey::attack(Pitch(60), Zone::Left), 0.0));
        assert!(throttle.should_trigger(&NoteKey::attack(Pitch(60), Zone::Right), 0.0));
        assert!(throttle.should_trigger(&NoteKey::attack(Pitch(62), Zone::Left), 0.0));
        assert!(throttle.should_trigger(&NoteKey::glide("p1"), 0.0));
        assert_eq!(throttle.len(), 4);
    }

    #[test]
    fn test_interval_follows_rhythm_and_tempo() {
        let mut throttle = TriggerThrottle::default();
        throttle.set_rhythm(RhythmValue::note(4), 60.0);
        assert!((throttle.min_interval() - 0.4).abs() < 1e-9);
        assert!((throttle.interval_for(RhythmValue::note(16), 120.0) - 0.05).abs() < 1e-9);

        let key = NoteKey::glide("a");
        assert!(throttle.should_trigger_with(&key, 0.0, 1.0));
        assert!(!throttle.should_trigger_with(&key, 0.5, 1.0));
    }

    #[test]
    fn test_prune_drops_old_keys() {
        let mut throttle = TriggerThrottle::default();
        throttle.should_trigger(&NoteKey::glide("old"), 0.0);
        throttle.should_trigger(&NoteKey::glide("new"), 99.0);
        throttle.prune(99.05);
        assert_eq!(throttle.len(), 1);
    }

    #[test]
    fn test_prune_keeps_key_inside_its_own_interval() {
        let mut throttle = TriggerThrottle::default();
        let key = NoteKey::glide("slow");
        assert!(throttle.should_trigger_with(&key, 0.0, 9.6));
        throttle.prune(7.0);
        assert_eq!(throttle.len(), 1);
        assert!(!throttle.should_trigger_with(&key, 7.0, 9.6));
        throttle.prune(9.6);
        assert!(throttle.is_empty());
    }
}
