//! Offline rendering
//!
//! `RenderToneService` is a tone service that synthesizes into a sample
//! buffer instead of driving a live audio backend. The engine tells it the
//! transport time before each batch of commands (`advance_to`), and it renders
//! everything up to that point before applying them. The mono mix runs
//! through a small effects bus (low-pass, delay, comb reverb, master gain)
//! whose parameters are the ones the effect modulator sends.

use crate::error::{RenderError, ToneError};
use crate::note::Pitch;
use crate::synth_voice_manager::SynthVoiceManager;
use crate::tone::{DrumHit, EffectChange, EffectParameter, ToneService, VoiceHandle, VoiceSpec};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Configuration for rendering audio
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Fade in time in seconds
    pub fade_in: f32,
    /// Fade out time in seconds
    pub fade_out: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            fade_in: 0.01,
            fade_out: 0.05,
        }
    }
}

/// A parameter that moves linearly to its target over a ramp.
#[derive(Debug, Clone, Copy)]
struct Smoothed {
    current: f32,
    target: f32,
    step: f32,
}

impl Smoothed {
    fn new(value: f32) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
        }
    }

    fn set(&mut self, target: f32, ramp_samples: usize) {
        self.target = target;
        if ramp_samples == 0 {
            self.current = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / ramp_samples as f32;
        }
    }

    fn next(&mut self) -> f32 {
        if self.step != 0.0 {
            self.current += self.step;
            let done = (self.step > 0.0 && self.current >= self.target)
                || (self.step < 0.0 && self.current <= self.target);
            if done {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }
}

/// Comb filter delay lengths at 44.1kHz (Freeverb tunings)
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];

/// Delay time of the echo, seconds
const DELAY_TIME: f32 = 0.25;

struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            feedback: 0.0,
        }
    }

    /// Feedback for a -60dB tail after `decay` seconds.
    fn set_decay(&mut self, decay: f32, sample_rate: f32) {
        let loop_time = self.buffer.len() as f32 / sample_rate;
        self.feedback = 10f32.powf(-3.0 * loop_time / decay.max(0.01)).min(0.98);
    }

    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.index];
        self.buffer[self.index] = input + out * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }
}

/// Initial low-pass cutoff, Hz
const INITIAL_CUTOFF: f32 = 8000.0;

/// Butterworth low-pass coefficients with the cutoff kept below Nyquist.
fn lowpass_coefficients(sample_rate: f32, cutoff: f32) -> Result<Coefficients<f32>, RenderError> {
    let cutoff = cutoff.max(20.0).min(sample_rate * 0.45);
    Coefficients::<f32>::from_params(
        biquad::Type::LowPass,
        sample_rate.hz(),
        cutoff.hz(),
        Q_BUTTERWORTH_F32,
    )
    .map_err(|e| RenderError::Filter(format!("{:?}", e)))
}

/// Post-mix effects
struct EffectsBus {
    sample_rate: f32,
    cutoff: Smoothed,
    filter: DirectForm2Transposed<f32>,
    last_cutoff: f32,
    delay_line: Vec<f32>,
    delay_index: usize,
    delay_wet: Smoothed,
    delay_feedback: Smoothed,
    combs: Vec<Comb>,
    reverb_wet: Smoothed,
    master_gain: Smoothed,
}

impl EffectsBus {
    fn new(sample_rate: f32) -> Result<Self, RenderError> {
        let coeffs = lowpass_coefficients(sample_rate, INITIAL_CUTOFF)?;
        let scale = sample_rate / 44100.0;
        let mut combs: Vec<Comb> = COMB_TUNINGS
            .iter()
            .map(|&len| Comb::new((len as f32 * scale) as usize))
            .collect();
        for comb in &mut combs {
            comb.set_decay(1.5, sample_rate);
        }
        Ok(Self {
            sample_rate,
            cutoff: Smoothed::new(INITIAL_CUTOFF),
            filter: DirectForm2Transposed::<f32>::new(coeffs),
            last_cutoff: INITIAL_CUTOFF,
            delay_line: vec![0.0; ((DELAY_TIME * sample_rate) as usize).max(1)],
            delay_index: 0,
            delay_wet: Smoothed::new(0.0),
            delay_feedback: Smoothed::new(0.0),
            combs,
            reverb_wet: Smoothed::new(0.0),
            master_gain: Smoothed::new(1.0),
        })
    }

    fn apply(&mut self, change: EffectChange) {
        let ramp = change
            .ramp
            .map(|r| (r.max(0.0) * self.sample_rate as f64) as usize)
            .unwrap_or(0);
        let value = change.parameter.value() as f32;
        match change.parameter {
            EffectParameter::ReverbWet(_) => self.reverb_wet.set(value, ramp),
            EffectParameter::ReverbDecay(_) => {
                for comb in &mut self.combs {
                    comb.set_decay(value, self.sample_rate);
                }
            }
            EffectParameter::DelayWet(_) => self.delay_wet.set(value, ramp),
            EffectParameter::DelayFeedback(_) => self.delay_feedback.set(value, ramp),
            EffectParameter::FilterCutoff(_) => self.cutoff.set(value, ramp),
            EffectParameter::MasterVolume(db) => {
                self.master_gain.set(10f32.powf(db as f32 / 20.0), ramp)
            }
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        // recompute only when the ramp has moved the cutoff noticeably
        let cutoff = self.cutoff.next();
        if (cutoff - self.last_cutoff).abs() > 0.1 {
            if let Ok(coeffs) = lowpass_coefficients(self.sample_rate, cutoff) {
                self.filter.update_coefficients(coeffs);
                self.last_cutoff = cutoff;
            }
        }
        let dry = self.filter.run(input);

        let echoed = self.delay_line[self.delay_index];
        self.delay_line[self.delay_index] = dry + echoed * self.delay_feedback.next();
        self.delay_index = (self.delay_index + 1) % self.delay_line.len();

        let reverb = self.combs.iter_mut().map(|c| c.process(dry)).sum::<f32>()
            / self.combs.len() as f32;

        let mixed = dry + echoed * self.delay_wet.next() + reverb * self.reverb_wet.next();
        (mixed * self.master_gain.next()).tanh()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum HandleState {
    Live,
    Releasing,
}

/// Tone service that renders into memory
pub struct RenderToneService {
    config: RenderConfig,
    synth: SynthVoiceManager,
    bus: EffectsBus,
    /// Undisposed voices; handles are issued in order, so any lower id
    /// missing here has been disposed
    handles: HashMap<VoiceHandle, HandleState>,
    next_handle: u64,
    samples: Vec<f32>,
    // transport time restarts from zero after a stop
    time_offset: f64,
    last_now: f64,
}

impl RenderToneService {
    pub fn new(config: RenderConfig) -> Result<Self, RenderError> {
        if config.sample_rate == 0 {
            return Err(RenderError::InvalidSampleRate(config.sample_rate));
        }
        let sample_rate = config.sample_rate as f32;
        Ok(Self {
            synth: SynthVoiceManager::new(sample_rate),
            bus: EffectsBus::new(sample_rate)?,
            config,
            handles: HashMap::new(),
            next_handle: 0,
            samples: Vec::new(),
            time_offset: 0.0,
            last_now: 0.0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Seconds rendered so far
    pub fn rendered_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.config.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn render_until(&mut self, sample_count: usize) {
        while self.samples.len() < sample_count {
            let dry = self.synth.process();
            self.samples.push(self.bus.process(dry));
        }
    }

    /// Render a release tail, apply fades and hand back the buffer.
    pub fn finish(mut self, tail_seconds: f64) -> Result<Vec<f32>, RenderError> {
        let tail = (tail_seconds.max(0.0) * self.config.sample_rate as f64) as usize;
        self.render_until(self.samples.len() + tail);
        if self.samples.is_empty() {
            return Err(RenderError::Empty);
        }
        let mut samples = std::mem::take(&mut self.samples);
        apply_fades(&mut samples, &self.config);
        info!(
            "Rendered {:.2}s at {} Hz",
            samples.len() as f64 / self.config.sample_rate as f64,
            self.config.sample_rate
        );
        Ok(samples)
    }

    fn check(&self, handle: VoiceHandle) -> Result<HandleState, ToneError> {
        match self.handles.get(&handle) {
            Some(state) => Ok(*state),
            None if handle.0 < self.next_handle => Err(ToneError::Disposed(handle)),
            None => Err(ToneError::InvalidHandle(handle)),
        }
    }
}

impl ToneService for RenderToneService {
    fn create_voice(&mut self, spec: VoiceSpec) -> Result<VoiceHandle, ToneError> {
        let handle = VoiceHandle(self.next_handle);
        self.next_handle += 1;
        self.synth
            .add_voice(handle, spec.pitch.frequency() as f32, spec.timbre, spec.role);
        self.handles.insert(handle, HandleState::Live);
        Ok(handle)
    }

    fn set_pitch(&mut self, handle: VoiceHandle, pitch: Pitch, glide_seconds: f64) -> Result<(), ToneError> {
        if self.check(handle)? == HandleState::Releasing {
            return Err(ToneError::Releasing(handle));
        }
        self.synth
            .glide(handle, pitch.frequency() as f32, glide_seconds as f32);
        Ok(())
    }

    fn trigger_drum(&mut self, hit: DrumHit) -> Result<(), ToneError> {
        self.synth.trigger_drum(hit.instrument, hit.velocity);
        Ok(())
    }

    fn release(&mut self, handle: VoiceHandle) -> Result<(), ToneError> {
        if self.check(handle)? == HandleState::Live {
            self.synth.release(handle);
            self.handles.insert(handle, HandleState::Releasing);
        }
        Ok(())
    }

    fn dispose(&mut self, handle: VoiceHandle) -> Result<(), ToneError> {
        self.check(handle)?;
        self.synth.remove(handle);
        self.handles.remove(&handle);
        Ok(())
    }

    fn set_effect(&mut self, change: EffectChange) -> Result<(), ToneError> {
        self.bus.apply(change);
        Ok(())
    }

    fn advance_to(&mut self, now: f64) {
        // a restarted transport begins at zero; late events only ever lag slightly
        if now <= 0.0 && self.last_now > 0.0 {
            debug!("Transport rewound from {:.3}s, continuing the render timeline", self.last_now);
            self.time_offset += self.last_now;
            self.last_now = 0.0;
        }
        self.last_now = self.last_now.max(now);
        let absolute = self.time_offset + now;
        let target = (absolute * self.config.sample_rate as f64).round() as usize;
        self.render_until(target);
    }
}

/// Apply fade in and fade out to samples
fn apply_fades(samples: &mut [f32], config: &RenderConfig) {
    let sample_rate = config.sample_rate as f32;

    if config.fade_in > 0.0 {
        let fade_in_samples = (config.fade_in * sample_rate) as usize;
        for (i, sample) in samples.iter_mut().take(fade_in_samples).enumerate() {
            *sample *= i as f32 / fade_in_samples as f32;
        }
    }

    if config.fade_out > 0.0 {
        let fade_out_samples = ((config.fade_out * sample_rate) as usize).min(samples.len());
        let start = samples.len() - fade_out_samples;
        for (i, sample) in samples[start..].iter_mut().enumerate() {
            *sample *= 1.0 - (i + 1) as f32 / fade_out_samples as f32;
        }
    }
}

/// Write samples to a 16-bit mono WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), RenderError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Statistics about rendered audio
#[derive(Debug, Clone)]
pub struct RenderStats {
    pub duration: f32,
    pub sample_count: usize,
    pub rms: f32,
    pub peak: f32,
    pub dc_offset: f32,
    pub zero_crossings: usize,
}

impl RenderStats {
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        let sample_count = samples.len();
        let n = sample_count.max(1) as f32;

        let sum_squares: f32 = samples.iter().map(|x| x * x).sum();
        let rms = (sum_squares / n).sqrt();
        let peak = samples.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        let dc_offset = samples.iter().sum::<f32>() / n;
        let zero_crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();

        Self {
            duration: sample_count as f32 / sample_rate.max(1) as f32,
            sample_count,
            rms,
            peak,
            dc_offset,
            zero_crossings,
        }
    }

    pub fn print_summary(&self) {
        println!("Render Statistics:");
        println!("  Duration:       {:.3} seconds", self.duration);
        println!("  Samples:        {}", self.sample_count);
        println!("  RMS:           {:.3}", self.rms);
        println!("  Peak:          {:.3}", self.peak);
        println!("  DC Offset:     {:.6}", self.dc_offset);
        println!("  Zero Crossings: {}", self.zero_crossings);
    }
}
