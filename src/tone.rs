//! Tone Generation Service interface
//!
//! The engine never synthesizes audio itself. It issues commands through
//! `ToneService`: allocate a voice, glide it, release and dispose it, fire
//! drum hits and change effect parameters. `RecordingToneService` keeps a
//! command log and enforces handle validity; the offline renderer in
//! `render.rs` turns the same commands into samples.

use crate::catalog::{DrumInstrument, Timbre};
use crate::error::ToneError;
use crate::note::Pitch;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

/// Opaque voice handle. Never reused within one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceHandle(pub u64);

impl fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// Musical role of a voice; selects envelope and register in the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceRole {
    Bass,
    Lead,
    Glide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSpec {
    pub timbre: Timbre,
    pub role: VoiceRole,
    pub pitch: Pitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrumHit {
    pub instrument: DrumInstrument,
    /// Transport time in seconds
    pub time: f64,
    /// 0.0-1.0
    pub velocity: f32,
}

/// Effect parameters with their values.
///
/// Wet levels are 0.0-1.0, decay in seconds, cutoff in Hz, master volume in dB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parameter", content = "value", rename_all = "snake_case")]
pub enum EffectParameter {
    ReverbWet(f64),
    ReverbDecay(f64),
    DelayWet(f64),
    DelayFeedback(f64),
    FilterCutoff(f64),
    MasterVolume(f64),
}

/// Which parameter, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    ReverbWet,
    ReverbDecay,
    DelayWet,
    DelayFeedback,
    FilterCutoff,
    MasterVolume,
}

impl EffectParameter {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectParameter::ReverbWet(_) => EffectKind::ReverbWet,
            EffectParameter::ReverbDecay(_) => EffectKind::ReverbDecay,
            EffectParameter::DelayWet(_) => EffectKind::DelayWet,
            EffectParameter::DelayFeedback(_) => EffectKind::DelayFeedback,
            EffectParameter::FilterCutoff(_) => EffectKind::FilterCutoff,
            EffectParameter::MasterVolume(_) => EffectKind::MasterVolume,
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            EffectParameter::ReverbWet(v)
            | EffectParameter::ReverbDecay(v)
            | EffectParameter::DelayWet(v)
            | EffectParameter::DelayFeedback(v)
            | EffectParameter::FilterCutoff(v)
            | EffectParameter::MasterVolume(v) => v,
        }
    }

    /// Reverb decay rebuilds the impulse response and is applied at once.
    pub fn can_ramp(&self) -> bool {
        !matches!(self, EffectParameter::ReverbDecay(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectChange {
    pub parameter: EffectParameter,
    /// Ramp time in seconds; `None` applies immediately.
    pub ramp: Option<f64>,
}

impl EffectChange {
    /// A ramp on a parameter that cannot ramp is dropped.
    pub fn new(parameter: EffectParameter, ramp: Option<f64>) -> Self {
        let ramp = ramp.filter(|r| *r > 0.0 && parameter.can_ramp());
        Self { parameter, ramp }
    }

    pub fn immediate(parameter: EffectParameter) -> Self {
        Self {
            parameter,
            ramp: None,
        }
    }
}

/// Commands understood by a tone generation backend.
pub trait ToneService {
    /// Allocate a voice and start its attack.
    fn create_voice(&mut self, spec: VoiceSpec) -> Result<VoiceHandle, ToneError>;

    /// Glide to `pitch` over `glide_seconds` without re-attacking.
    fn set_pitch(&mut self, handle: VoiceHandle, pitch: Pitch, glide_seconds: f64)
        -> Result<(), ToneError>;

    fn trigger_drum(&mut self, hit: DrumHit) -> Result<(), ToneError>;

    /// Start the release phase. The handle stays valid until `dispose`.
    fn release(&mut self, handle: VoiceHandle) -> Result<(), ToneError>;

    fn dispose(&mut self, handle: VoiceHandle) -> Result<(), ToneError>;

    fn set_effect(&mut self, change: EffectChange) -> Result<(), ToneError>;

    /// Transport time the following commands happen at.
    fn advance_to(&mut self, _now: f64) {}
}

/// One entry of the recorded command log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ToneCall {
    CreateVoice { handle: VoiceHandle, spec: VoiceSpec },
    SetPitch { handle: VoiceHandle, pitch: Pitch, glide: f64 },
    TriggerDrum { hit: DrumHit },
    Release { handle: VoiceHandle },
    Dispose { handle: VoiceHandle },
    SetEffect { change: EffectChange },
}

impl ToneCall {
    pub fn handle(&self) -> Option<VoiceHandle> {
        match self {
            ToneCall::CreateVoice { handle, .. }
            | ToneCall::SetPitch { handle, .. }
            | ToneCall::Release { handle }
            | ToneCall::Dispose { handle } => Some(*handle),
            ToneCall::TriggerDrum { .. } | ToneCall::SetEffect { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToneCommand {
    /// Transport time of the command
    pub time: f64,
    #[serde(flatten)]
    pub call: ToneCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleState {
    Active,
    Releasing,
}

/// Tone service that records every accepted command.
///
/// Rejects commands on unknown, releasing or disposed handles the way a real
/// backend would, and can be told to fail on purpose.
#[derive(Debug, Default)]
pub struct RecordingToneService {
    log: Vec<ToneCommand>,
    live: HashMap<VoiceHandle, HandleState>,
    disposed: HashSet<VoiceHandle>,
    failing: HashSet<VoiceHandle>,
    fail_creates: usize,
    voice_limit: Option<usize>,
    next_handle: u64,
    now: f64,
}

impl RecordingToneService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice_limit(limit: usize) -> Self {
        Self {
            voice_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Every later command on `handle` fails with a backend error.
    pub fn fail_handle(&mut self, handle: VoiceHandle) {
        self.failing.insert(handle);
    }

    /// The next `count` voice allocations fail.
    pub fn fail_next_creates(&mut self, count: usize) {
        self.fail_creates = count;
    }

    pub fn commands(&self) -> &[ToneCommand] {
        &self.log
    }

    pub fn calls(&self) -> impl Iterator<Item = &ToneCall> {
        self.log.iter().map(|c| &c.call)
    }

    pub fn take_commands(&mut self) -> Vec<ToneCommand> {
        std::mem::take(&mut self.log)
    }

    pub fn live_voices(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: VoiceHandle) -> bool {
        self.live.contains_key(&handle)
    }

    pub fn count_where<F>(&self, pred: F) -> usize
    where
        F: Fn(&ToneCall) -> bool,
    {
        self.calls().filter(|c| pred(c)).count()
    }

    /// All commands that name `handle`, in order.
    pub fn history(&self, handle: VoiceHandle) -> Vec<&ToneCall> {
        self.calls().filter(|c| c.handle() == Some(handle)).collect()
    }

    fn record(&mut self, call: ToneCall) {
        debug!("tone @ {:.3}s: {:?}", self.now, call);
        self.log.push(ToneCommand {
            time: self.now,
            call,
        });
    }

    fn check(&self, handle: VoiceHandle) -> Result<HandleState, ToneError> {
        if self.failing.contains(&handle) {
            return Err(ToneError::Backend(format!("injected failure on {handle}")));
        }
        if self.disposed.contains(&handle) {
            return Err(ToneError::Disposed(handle));
        }
        self.live
            .get(&handle)
            .copied()
            .ok_or(ToneError::InvalidHandle(handle))
    }
}

impl ToneService for RecordingToneService {
    fn create_voice(&mut self, spec: VoiceSpec) -> Result<VoiceHandle, ToneError> {
        if self.fail_creates > 0 {
            self.fail_creates -= 1;
            return Err(ToneError::Backend("injected allocation failure".to_string()));
        }
        if let Some(limit) = self.voice_limit {
            if self.live.len() >= limit {
                return Err(ToneError::VoiceLimit { limit });
            }
        }
        let handle = VoiceHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, HandleState::Active);
        self.record(ToneCall::CreateVoice { handle, spec });
        Ok(handle)
    }

    fn set_pitch(
        &mut self,
        handle: VoiceHandle,
        pitch: Pitch,
        glide_seconds: f64,
    ) -> Result<(), ToneError> {
        match self.check(handle)? {
            HandleState::Active => {
                self.record(ToneCall::SetPitch {
                    handle,
                    pitch,
                    glide: glide_seconds,
                });
                Ok(())
            }
            HandleState::Releasing => Err(ToneError::Releasing(handle)),
        }
    }

    fn trigger_drum(&mut self, hit: DrumHit) -> Result<(), ToneError> {
        self.record(ToneCall::TriggerDrum { hit });
        Ok(())
    }

    fn release(&mut self, handle: VoiceHandle) -> Result<(), ToneError> {
        if self.check(handle)? == HandleState::Active {
            self.live.insert(handle, HandleState::Releasing);
            self.record(ToneCall::Release { handle });
        }
        Ok(())
    }

    fn dispose(&mut self, handle: VoiceHandle) -> Result<(), ToneError> {
        self.check(handle)?;
        self.live.remove(&handle);
        self.disposed.insert(handle);
        self.record(ToneCall::Dispose { handle });
        Ok(())
    }

    fn set_effect(&mut self, change: EffectChange) -> Result<(), ToneError> {
        self.record(ToneCall::SetEffect { change });
        Ok(())
    }

    fn advance_to(&mut self, now: f64) {
        self.now = now;
    }
}
