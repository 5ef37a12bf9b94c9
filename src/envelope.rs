//! Envelope generators for the offline renderer
//!
//! `ADSREnvelope` shapes pitched voices; its release starts from whatever
//! level the voice had reached, so a voice released mid-attack does not
//! click. `PercEnvelope` shapes drum hits.

use crate::tone::VoiceRole;

/// Envelope state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeState {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ADSRParams {
    pub attack: f32,  // seconds
    pub decay: f32,   // seconds
    pub sustain: f32, // level 0.0-1.0
    pub release: f32, // seconds
}

impl Default for ADSRParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.2,
        }
    }
}

impl ADSRParams {
    /// Envelope shape per voice role.
    pub fn for_role(role: VoiceRole) -> Self {
        match role {
            VoiceRole::Bass => Self {
                attack: 0.02,
                decay: 0.2,
                sustain: 0.6,
                release: 0.4,
            },
            VoiceRole::Lead => Self {
                attack: 0.05,
                decay: 0.2,
                sustain: 0.5,
                release: 0.8,
            },
            // Long swell for the wide right-zone pads
            VoiceRole::Glide => Self {
                attack: 0.3,
                decay: 0.4,
                sustain: 0.7,
                release: 1.0,
            },
        }
    }
}

/// ADSR Envelope generator
#[derive(Debug, Clone)]
pub struct ADSREnvelope {
    params: ADSRParams,
    state: EnvelopeState,
    current_level: f32,
    release_start_level: f32,
    time_in_state: f32,
    sample_rate: f32,
}

impl ADSREnvelope {
    pub fn new(sample_rate: f32, params: ADSRParams) -> Self {
        let mut env = Self {
            params,
            state: EnvelopeState::Idle,
            current_level: 0.0,
            release_start_level: 0.0,
            time_in_state: 0.0,
            sample_rate,
        };
        env.set_adsr(params);
        env
    }

    pub fn set_adsr(&mut self, params: ADSRParams) {
        self.params = ADSRParams {
            attack: params.attack.max(0.001), // Minimum 1ms
            decay: params.decay.max(0.001),
            sustain: params.sustain.clamp(0.0, 1.0),
            release: params.release.max(0.001),
        };
    }

    /// Note on. The current level is kept so a retrigger does not click.
    pub fn trigger(&mut self) {
        self.state = EnvelopeState::Attack;
        self.time_in_state = 0.0;
    }

    /// Note off
    pub fn release(&mut self) {
        if matches!(
            self.state,
            EnvelopeState::Attack | EnvelopeState::Decay | EnvelopeState::Sustain
        ) {
            self.release_start_level = self.current_level;
            self.state = EnvelopeState::Release;
            self.time_in_state = 0.0;
        }
    }

    /// Process one sample
    pub fn process(&mut self) -> f32 {
        let dt = 1.0 / self.sample_rate;
        let p = self.params;

        match self.state {
            EnvelopeState::Idle => {
                self.current_level = 0.0;
            }
            EnvelopeState::Attack => {
                self.time_in_state += dt;
                if self.time_in_state >= p.attack {
                    self.state = EnvelopeState::Decay;
                    self.time_in_state = 0.0;
                    self.current_level = 1.0;
                } else {
                    // Linear rise from wherever we were
                    let step = dt / p.attack;
                    self.current_level = (self.current_level + step).min(1.0);
                }
            }
            EnvelopeState::Decay => {
                self.time_in_state += dt;
                if self.time_in_state >= p.decay {
                    self.state = EnvelopeState::Sustain;
                    self.time_in_state = 0.0;
                    self.current_level = p.sustain;
                } else {
                    let progress = self.time_in_state / p.decay;
                    self.current_level = 1.0 + (p.sustain - 1.0) * progress;
                }
            }
            EnvelopeState::Sustain => {
                self.current_level = p.sustain;
            }
            EnvelopeState::Release => {
                self.time_in_state += dt;
                if self.time_in_state >= p.release {
                    self.state = EnvelopeState::Idle;
                    self.current_level = 0.0;
                } else {
                    let progress = self.time_in_state / p.release;
                    self.current_level = self.release_start_level * (1.0 - progress);
                }
            }
        }

        self.current_level
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != EnvelopeState::Idle
    }
}

/// Percussive envelope (attack then exponential decay)
#[derive(Debug, Clone)]
pub struct PercEnvelope {
    attack: f32,
    decay: f32,
    current_level: f32,
    time: f32,
    sample_rate: f32,
    active: bool,
}

impl PercEnvelope {
    pub fn new(sample_rate: f32, attack: f32, decay: f32) -> Self {
        Self {
            attack: attack.max(0.0001),
            decay: decay.max(0.001),
            current_level: 0.0,
            time: 0.0,
            sample_rate,
            active: false,
        }
    }

    pub fn trigger(&mut self) {
        self.active = true;
        self.time = 0.0;
    }

    pub fn process(&mut self) -> f32 {
        if !self.active {
            return 0.0;
        }

        self.time += 1.0 / self.sample_rate;

        if self.time < self.attack {
            self.current_level = self.time / self.attack;
        } else if self.time < self.attack + self.decay {
            let progress = (self.time - self.attack) / self.decay;
            self.current_level = (-5.0 * progress).exp();
        } else {
            self.current_level = 0.0;
            self.active = false;
        }

        self.current_level
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
