//! Synth voice manager for the offline renderer
//!
//! Holds one oscillator voice per tone-service handle plus a pool of drum
//! voices. Pitched voices glide between frequencies (exponential portamento)
//! and are shaped by an ADSR envelope chosen by their role. Drums are
//! synthesized from a pitch-swept sine (kick) and filtered noise (snare,
//! hihat).

use crate::catalog::{DrumInstrument, Timbre};
use crate::envelope::{ADSREnvelope, ADSRParams, PercEnvelope};
use crate::tone::{VoiceHandle, VoiceRole};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::f32::consts::PI;

/// Per-voice output level before mixing
const VOICE_GAIN: f32 = 0.25;

/// Most drum hits sounding at once; the oldest is dropped beyond this.
const MAX_DRUM_VOICES: usize = 32;

/// Oscillator waveforms; each timbre maps onto one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthWaveform {
    Sine,
    Saw,
    Square,
    Triangle,
    /// Sine with a sine modulator at 2x frequency
    FmSine,
    /// Triangle with a sine modulator at 2x frequency
    FmTriangle,
    /// Sine with slow amplitude modulation
    AmSine,
    /// Three detuned saws
    FatSaw,
    /// 25% duty pulse
    Pulse,
}

impl From<Timbre> for SynthWaveform {
    fn from(timbre: Timbre) -> Self {
        match timbre {
            Timbre::Sine => SynthWaveform::Sine,
            Timbre::Square => SynthWaveform::Square,
            Timbre::Triangle => SynthWaveform::Triangle,
            Timbre::Sawtooth => SynthWaveform::Saw,
            Timbre::FmSine => SynthWaveform::FmSine,
            Timbre::FmTriangle => SynthWaveform::FmTriangle,
            Timbre::AmSine => SynthWaveform::AmSine,
            Timbre::FatSawtooth => SynthWaveform::FatSaw,
            Timbre::Pulse => SynthWaveform::Pulse,
        }
    }
}

fn triangle(phase: f32) -> f32 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

fn saw(phase: f32) -> f32 {
    2.0 * phase - 1.0
}

fn wrap(phase: f32) -> f32 {
    phase - phase.floor()
}

/// A single pitched voice
struct SynthVoice {
    phase: [f32; 3],
    mod_phase: f32,
    frequency: f32,
    glide_from: f32,
    glide_to: f32,
    glide_samples: usize,
    glide_pos: usize,
    waveform: SynthWaveform,
    envelope: ADSREnvelope,
}

impl SynthVoice {
    fn new(sample_rate: f32, frequency: f32, timbre: Timbre, role: VoiceRole) -> Self {
        let mut envelope = ADSREnvelope::new(sample_rate, ADSRParams::for_role(role));
        envelope.trigger();
        Self {
            phase: [0.0; 3],
            mod_phase: 0.0,
            frequency,
            glide_from: frequency,
            glide_to: frequency,
            glide_samples: 0,
            glide_pos: 0,
            waveform: timbre.into(),
            envelope,
        }
    }

    /// Start a glide from the current frequency; zero time jumps.
    fn glide_to(&mut self, frequency: f32, seconds: f32, sample_rate: f32) {
        self.glide_from = self.frequency;
        self.glide_to = frequency;
        self.glide_pos = 0;
        self.glide_samples = (seconds.max(0.0) * sample_rate) as usize;
        if self.glide_samples == 0 {
            self.frequency = frequency;
        }
    }

    fn release(&mut self) {
        self.envelope.release();
    }

    fn is_active(&self) -> bool {
        self.envelope.is_active()
    }

    /// Process one sample
    fn process(&mut self, sample_rate: f32) -> f32 {
        if self.glide_pos < self.glide_samples {
            self.glide_pos += 1;
            let t = self.glide_pos as f32 / self.glide_samples as f32;
            // exponential: equal time per semitone
            self.frequency = self.glide_from * (self.glide_to / self.glide_from).powf(t);
        }

        let level = self.envelope.process();
        if level <= 0.0 && !self.envelope.is_active() {
            return 0.0;
        }

        let f = self.frequency;
        let p = self.phase[0];
        let sample = match self.waveform {
            SynthWaveform::Sine => (2.0 * PI * p).sin(),
            SynthWaveform::Saw => saw(p),
            SynthWaveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            SynthWaveform::Triangle => triangle(p),
            SynthWaveform::FmSine => {
                let m = (2.0 * PI * self.mod_phase).sin();
                (2.0 * PI * p + 1.5 * m).sin()
            }
            SynthWaveform::FmTriangle => {
                let m = (2.0 * PI * self.mod_phase).sin();
                triangle(wrap(p + 0.2 * m))
            }
            SynthWaveform::AmSine => {
                let m = 0.5 + 0.5 * (2.0 * PI * self.mod_phase).sin();
                (2.0 * PI * p).sin() * m
            }
            SynthWaveform::FatSaw => {
                (saw(p) + saw(self.phase[1]) + saw(self.phase[2])) / 3.0
            }
            SynthWaveform::Pulse => {
                if p < 0.25 {
                    1.0
                } else {
                    -1.0
                }
            }
        };

        // Update phases
        let detune = [1.0, 1.007, 0.993];
        for (phase, d) in self.phase.iter_mut().zip(detune) {
            *phase = wrap(*phase + f * d / sample_rate);
        }
        let mod_ratio = match self.waveform {
            SynthWaveform::AmSine => 0.01,
            _ => 2.0,
        };
        self.mod_phase = wrap(self.mod_phase + f * mod_ratio / sample_rate);

        sample * level * VOICE_GAIN
    }
}

/// A sounding drum hit
struct DrumVoice {
    instrument: DrumInstrument,
    envelope: PercEnvelope,
    phase: f32,
    age: usize,
    velocity: f32,
    // one-pole state for noise shaping
    filter_state: f32,
}

impl DrumVoice {
    fn new(instrument: DrumInstrument, velocity: f32, sample_rate: f32) -> Self {
        let decay = match instrument {
            DrumInstrument::Kick => 0.35,
            DrumInstrument::Snare => 0.18,
            DrumInstrument::Hihat => 0.05,
        };
        let mut envelope = PercEnvelope::new(sample_rate, 0.001, decay);
        envelope.trigger();
        Self {
            instrument,
            envelope,
            phase: 0.0,
            age: 0,
            velocity: velocity.clamp(0.0, 1.0),
            filter_state: 0.0,
        }
    }

    fn process(&mut self, sample_rate: f32, rng: &mut StdRng) -> f32 {
        let level = self.envelope.process();
        let t = self.age as f32 / sample_rate;
        self.age += 1;

        let sample = match self.instrument {
            DrumInstrument::Kick => {
                // membrane: pitch falls from 150 Hz to 50 Hz
                let freq = 50.0 + 100.0 * (-t * 30.0).exp();
                self.phase = wrap(self.phase + freq / sample_rate);
                (2.0 * PI * self.phase).sin()
            }
            DrumInstrument::Snare => {
                let noise: f32 = rng.gen_range(-1.0..1.0);
                self.phase = wrap(self.phase + 180.0 / sample_rate);
                0.6 * noise + 0.4 * (2.0 * PI * self.phase).sin()
            }
            DrumInstrument::Hihat => {
                // high-passed noise: noise minus its one-pole lowpass
                let noise: f32 = rng.gen_range(-1.0..1.0);
                self.filter_state += 0.3 * (noise - self.filter_state);
                noise - self.filter_state
            }
        };
        sample * level * self.velocity * 0.5
    }
}

/// Manager for handle-keyed synth voices and drum hits
pub struct SynthVoiceManager {
    voices: BTreeMap<VoiceHandle, SynthVoice>,
    drums: Vec<DrumVoice>,
    sample_rate: f32,
    rng: StdRng,
}

impl SynthVoiceManager {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            voices: BTreeMap::new(),
            drums: Vec::with_capacity(MAX_DRUM_VOICES),
            sample_rate,
            // fixed seed keeps renders reproducible
            rng: StdRng::seed_from_u64(0x5eed),
        }
    }

    pub fn add_voice(&mut self, handle: VoiceHandle, frequency: f32, timbre: Timbre, role: VoiceRole) {
        let voice = SynthVoice::new(self.sample_rate, frequency, timbre, role);
        self.voices.insert(handle, voice);
    }

    pub fn glide(&mut self, handle: VoiceHandle, frequency: f32, seconds: f32) {
        if let Some(voice) = self.voices.get_mut(&handle) {
            voice.glide_to(frequency, seconds, self.sample_rate);
        }
    }

    pub fn release(&mut self, handle: VoiceHandle) {
        if let Some(voice) = self.voices.get_mut(&handle) {
            voice.release();
        }
    }

    /// Drop a voice immediately.
    pub fn remove(&mut self, handle: VoiceHandle) {
        self.voices.remove(&handle);
    }

    pub fn trigger_drum(&mut self, instrument: DrumInstrument, velocity: f32) {
        if self.drums.len() >= MAX_DRUM_VOICES {
            self.drums.remove(0);
        }
        self.drums.push(DrumVoice::new(instrument, velocity, self.sample_rate));
    }

    /// Frequency a voice is sounding at, if it exists.
    pub fn frequency(&self, handle: VoiceHandle) -> Option<f32> {
        self.voices.get(&handle).map(|v| v.frequency)
    }

    /// Process one sample and return the dry mix
    pub fn process(&mut self) -> f32 {
        let sample_rate = self.sample_rate;
        let mut mix = 0.0;

        for voice in self.voices.values_mut() {
            mix += voice.process(sample_rate);
        }

        let rng = &mut self.rng;
        for drum in &mut self.drums {
            mix += drum.process(sample_rate, rng);
        }
        self.drums.retain(|d| d.envelope.is_active());

        mix
    }

    /// Voices still producing sound (released voices count until silent).
    pub fn active_voice_count(&self) -> usize {
        self.voices.values().filter(|v| v.is_active()).count()
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn active_drum_count(&self) -> usize {
        self.drums.len()
    }
}
