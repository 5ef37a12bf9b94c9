//! Position-driven effect modulation
//!
//! The first valid detection of each batch steers the effects bus: height
//! sets the reverb wet level, the zone sets the delay wet level and the
//! horizontal position opens or closes the low-pass filter. Values that did
//! not change since the last send are not sent again.

use crate::config::EffectsConfig;
use crate::mapper::{NormalizedPosition, Zone};
use crate::tone::{EffectChange, EffectKind, EffectParameter, ToneService};
use std::collections::HashMap;
use tracing::warn;

/// Floor for a silent master volume, dB
pub const MUTE_DB: f64 = -80.0;

const EPSILON: f64 = 1e-6;

/// Convert a 0-100 volume level to decibels (100 is 0 dB).
pub fn volume_to_db(level: f64) -> f64 {
    let gain = (level / 100.0).clamp(0.0, 1.0);
    if gain <= 0.0 {
        MUTE_DB
    } else {
        (20.0 * gain.log10()).max(MUTE_DB)
    }
}

pub struct EffectModulator {
    config: EffectsConfig,
    last_sent: HashMap<EffectKind, f64>,
}

impl EffectModulator {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            config,
            last_sent: HashMap::new(),
        }
    }

    /// Effect values for a position, before deduplication.
    pub fn targets(&self, pos: NormalizedPosition, zone: Zone) -> [EffectParameter; 3] {
        let c = &self.config;
        let reverb = c.reverb_wet_min + pos.y * (c.reverb_wet_max - c.reverb_wet_min);
        let delay = match zone {
            Zone::Right => c.delay_wet_right,
            Zone::Left | Zone::Center => c.delay_wet_center,
        };
        let cutoff = c.cutoff_min_hz + pos.x * (c.cutoff_max_hz - c.cutoff_min_hz);
        [
            EffectParameter::ReverbWet(reverb),
            EffectParameter::DelayWet(delay),
            EffectParameter::FilterCutoff(cutoff),
        ]
    }

    /// Steer the effects from a detection position; returns how many
    /// parameters were sent.
    pub fn modulate(&mut self, pos: NormalizedPosition, zone: Zone, tone: &mut dyn ToneService) -> usize {
        let ramp = Some(self.config.ramp);
        self.targets(pos, zone)
            .into_iter()
            .filter(|p| self.send(EffectChange::new(*p, ramp), tone))
            .count()
    }

    /// Initial effect state, sent unconditionally.
    pub fn reset(&mut self, master_volume: f64, tone: &mut dyn ToneService) {
        self.last_sent.clear();
        let c = &self.config;
        let initial = [
            EffectParameter::ReverbDecay(c.reverb_decay),
            EffectParameter::ReverbWet(c.reverb_wet_initial),
            EffectParameter::DelayWet(c.delay_wet_center),
            EffectParameter::DelayFeedback(c.delay_feedback),
            EffectParameter::FilterCutoff(c.cutoff_max_hz),
            EffectParameter::MasterVolume(volume_to_db(master_volume)),
        ];
        for parameter in initial {
            self.send(EffectChange::immediate(parameter), tone);
        }
    }

    /// Zero the wet levels.
    pub fn silence(&mut self, tone: &mut dyn ToneService) {
        for parameter in [EffectParameter::ReverbWet(0.0), EffectParameter::DelayWet(0.0)] {
            self.send(EffectChange::immediate(parameter), tone);
        }
    }

    pub fn set_master_volume(&mut self, level: f64, tone: &mut dyn ToneService) -> bool {
        let change = EffectChange::new(EffectParameter::MasterVolume(volume_to_db(level)), Some(0.05));
        self.send(change, tone)
    }

    fn send(&mut self, change: EffectChange, tone: &mut dyn ToneService) -> bool {
        let kind = change.parameter.kind();
        let value = change.parameter.value();
        if self
            .last_sent
            .get(&kind)
            .is_some_and(|last| (last - value).abs() < EPSILON)
        {
            return false;
        }
        match tone.set_effect(change) {
            Ok(()) => {
                self.last_sent.insert(kind, value);
                true
            }
            Err(e) => {
                warn!("Effect change {:?} failed: {}", change.parameter, e);
                false
            }
        }
    }
}
