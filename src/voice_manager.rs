//! Voice Manager - one continuous voice per tracked object
//!
//! Each identity seen in the detection stream owns at most one live voice.
//! A voice is created on first sighting, glides to new pitches while the
//! object moves, is released once the object has been gone longer than the
//! staleness timeout and is disposed after the drain delay.
//!
//! ```text
//! NoVoice -> Attacking -> Sustaining (glides) -> Releasing -> Disposed
//! ```
//!
//! Tone service failures never abort a batch: the affected voice is treated
//! as disposed and dropped from the map.

use crate::catalog::Timbre;
use crate::config::{EngineConfig, GlideConfig};
use crate::detection::{identity_keys, Detection};
use crate::mapper::{MusicalEvent, NormalizedPosition, PositionMapper, Zone};
use crate::note::Pitch;
use crate::throttle::{NoteKey, TriggerThrottle};
use crate::tone::{ToneService, VoiceHandle, VoiceRole, VoiceSpec};
use crate::transport::{Transport, TransportEvent};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceState {
    Attacking,
    Sustaining,
    Releasing,
    Disposed,
}

/// Role a new voice plays, by the zone it first appears in.
pub fn role_for_zone(zone: Zone) -> VoiceRole {
    match zone {
        Zone::Left => VoiceRole::Bass,
        Zone::Center => VoiceRole::Lead,
        Zone::Right => VoiceRole::Glide,
    }
}

#[derive(Debug, Clone)]
struct Voice {
    identity: String,
    handle: VoiceHandle,
    current_pitch: Pitch,
    portamento_time: f64,
    last_seen: f64,
    position: NormalizedPosition,
    zone: Zone,
    role: VoiceRole,
    timbre: Timbre,
    state: VoiceState,
}

/// Read-only view of a voice for UI code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceSnapshot {
    pub identity: String,
    pub handle: VoiceHandle,
    pub pitch: Pitch,
    pub zone: Zone,
    pub role: VoiceRole,
    pub timbre: Timbre,
    pub state: VoiceState,
    pub portamento_time: f64,
    pub last_seen: f64,
}

impl From<&Voice> for VoiceSnapshot {
    fn from(v: &Voice) -> Self {
        Self {
            identity: v.identity.clone(),
            handle: v.handle,
            pitch: v.current_pitch,
            zone: v.zone,
            role: v.role,
            timbre: v.timbre,
            state: v.state,
            portamento_time: v.portamento_time,
            last_seen: v.last_seen,
        }
    }
}

pub struct VoiceManager {
    voices: BTreeMap<String, Voice>,
    mapper: PositionMapper,
    throttle: TriggerThrottle,
    glide: GlideConfig,
    scale: String,
    rhythm_pattern: String,
    stale_timeout: f64,
    drain_delay: f64,
    min_confidence: f64,
}

impl VoiceManager {
    pub fn new(mapper: PositionMapper, config: &EngineConfig) -> Self {
        Self {
            voices: BTreeMap::new(),
            mapper,
            throttle: TriggerThrottle::new(config.throttle_fraction),
            glide: config.glide.clone(),
            scale: config.scale.clone(),
            rhythm_pattern: config.rhythm_pattern.clone(),
            stale_timeout: config.stale_timeout(),
            drain_delay: config.drain_delay(),
            min_confidence: config.min_confidence,
        }
    }

    pub fn mapper(&self) -> &PositionMapper {
        &self.mapper
    }

    pub fn set_scale(&mut self, scale: &str) {
        self.scale = scale.to_string();
    }

    pub fn set_rhythm_pattern(&mut self, rhythm_pattern: &str) {
        self.rhythm_pattern = rhythm_pattern.to_string();
    }

    /// Map one detection cycle onto voices.
    ///
    /// Returns the musical event of every detection that could be mapped, in
    /// detector order, whether or not the throttle let it sound.
    pub fn process_batch(
        &mut self,
        batch: &[Detection],
        transport: &mut Transport,
        tone: &mut dyn ToneService,
    ) -> Vec<MusicalEvent> {
        let now = transport.now();
        let tempo = transport.tempo();
        let mut seen = HashSet::new();
        let mut events = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();

        for (detection, key) in batch.iter().zip(identity_keys(batch)) {
            let (pos, class) = match detection.normalized(self.min_confidence) {
                Ok(pos) => (pos, detection.class().unwrap_or_default()),
                Err(e) => {
                    warn!("Skipping detection: {}", e);
                    continue;
                }
            };
            let Some(identity) = key else {
                continue;
            };

            let event = self
                .mapper
                .map_position(pos.x, pos.y, class, &self.scale, &self.rhythm_pattern);
            let interval = self.throttle.interval_for(event.rhythm_value, tempo);
            seen.insert(identity.clone());

            match self.voices.get_mut(&identity) {
                None => {
                    let key = NoteKey::attack(event.pitch, event.zone);
                    if self.throttle.should_trigger_with(&key, now, interval) {
                        let role = role_for_zone(event.zone);
                        let spec = VoiceSpec {
                            timbre: event.timbre,
                            role,
                            pitch: event.pitch,
                        };
                        match tone.create_voice(spec) {
                            Ok(handle) => {
                                debug!(
                                    "{} -> new {:?} voice {} at {} ({})",
                                    identity, role, handle, event.pitch, event.zone
                                );
                                self.voices.insert(
                                    identity.clone(),
                                    Voice {
                                        identity: identity.clone(),
                                        handle,
                                        current_pitch: event.pitch,
                                        portamento_time: 0.0,
                                        last_seen: now,
                                        position: pos,
                                        zone: event.zone,
                                        role,
                                        timbre: event.timbre,
                                        state: VoiceState::Attacking,
                                    },
                                );
                            }
                            Err(e) => warn!("Could not create voice for {}: {}", identity, e),
                        }
                    }
                }
                Some(voice) if voice.state == VoiceState::Releasing => {
                    debug!("{} reappeared while releasing; waiting for disposal", identity);
                }
                Some(voice) => {
                    let elapsed = now - voice.last_seen;
                    let speed = if elapsed > 0.0 {
                        pos.distance(&voice.position) / elapsed
                    } else {
                        0.0
                    };
                    let glide = self.glide.glide_for_speed(speed);

                    if voice.state == VoiceState::Attacking {
                        voice.state = VoiceState::Sustaining;
                        debug!("{} sustaining", identity);
                    }
                    voice.last_seen = voice.last_seen.max(now);
                    voice.position = pos;
                    voice.zone = event.zone;

                    if event.pitch != voice.current_pitch
                        && self
                            .throttle
                            .should_trigger_with(&NoteKey::glide(&identity), now, interval)
                    {
                        match tone.set_pitch(voice.handle, event.pitch, glide) {
                            Ok(()) => {
                                debug!(
                                    "{} glides {} -> {} over {:.2}s (speed {:.2})",
                                    identity, voice.current_pitch, event.pitch, glide, speed
                                );
                                voice.current_pitch = event.pitch;
                                voice.portamento_time = glide;
                            }
                            Err(e) => {
                                warn!("Pitch change failed for {}: {}", identity, e);
                                failed.push(identity.clone());
                            }
                        }
                    }
                }
            }
            events.push(event);
        }

        for identity in failed {
            self.drop_failed(&identity, tone);
        }
        self.release_stale(now, &seen, transport, tone);
        self.throttle.prune(now);
        events
    }

    /// Release every voice that has been gone longer than the timeout.
    pub fn sweep(&mut self, transport: &mut Transport, tone: &mut dyn ToneService) {
        let now = transport.now();
        self.release_stale(now, &HashSet::new(), transport, tone);
    }

    fn release_stale(
        &mut self,
        now: f64,
        seen: &HashSet<String>,
        transport: &mut Transport,
        tone: &mut dyn ToneService,
    ) {
        let stale: Vec<String> = self
            .voices
            .values()
            .filter(|v| {
                matches!(v.state, VoiceState::Attacking | VoiceState::Sustaining)
                    && !seen.contains(&v.identity)
                    && now - v.last_seen > self.stale_timeout
            })
            .map(|v| v.identity.clone())
            .collect();

        for identity in stale {
            let Some(voice) = self.voices.get_mut(&identity) else {
                continue;
            };
            match tone.release(voice.handle) {
                Ok(()) => {
                    voice.state = VoiceState::Releasing;
                    transport.schedule_in(
                        self.drain_delay,
                        TransportEvent::DisposeVoice {
                            identity: identity.clone(),
                            handle: voice.handle,
                        },
                    );
                    debug!(
                        "{} stale for {:.2}s, releasing {}",
                        identity,
                        now - voice.last_seen,
                        voice.handle
                    );
                }
                Err(e) => {
                    warn!("Release failed for {}: {}", identity, e);
                    self.drop_failed(&identity, tone);
                }
            }
        }
    }

    /// Complete a drain: dispose the handle and forget the voice.
    ///
    /// Ignored unless `identity` still maps to a releasing voice with this
    /// handle. Returns the voice's final snapshot when it was disposed.
    pub fn dispose_voice(
        &mut self,
        identity: &str,
        handle: VoiceHandle,
        tone: &mut dyn ToneService,
    ) -> Option<VoiceSnapshot> {
        let matches = self
            .voices
            .get(identity)
            .is_some_and(|v| v.handle == handle && v.state == VoiceState::Releasing);
        if !matches {
            debug!("Ignoring disposal of {} for {}: no longer releasing", handle, identity);
            return None;
        }
        let mut voice = self.voices.remove(identity)?;
        if let Err(e) = tone.dispose(voice.handle) {
            warn!("Dispose failed for {}: {}", identity, e);
        }
        voice.state = VoiceState::Disposed;
        debug!("{} disposed {}", identity, voice.handle);
        Some(VoiceSnapshot::from(&voice))
    }

    /// Release and dispose every voice at once.
    pub fn stop_all(&mut self, tone: &mut dyn ToneService) {
        let voices = std::mem::take(&mut self.voices);
        for (identity, voice) in voices {
            if voice.state != VoiceState::Releasing {
                if let Err(e) = tone.release(voice.handle) {
                    warn!("Release failed for {} during stop: {}", identity, e);
                }
            }
            if let Err(e) = tone.dispose(voice.handle) {
                warn!("Dispose failed for {} during stop: {}", identity, e);
            }
        }
        self.throttle.clear();
    }

    fn drop_failed(&mut self, identity: &str, tone: &mut dyn ToneService) {
        if let Some(voice) = self.voices.remove(identity) {
            if let Err(e) = tone.dispose(voice.handle) {
                debug!("Best-effort dispose of {} failed: {}", voice.handle, e);
            }
            debug!("{} dropped after tone failure", identity);
        }
    }

    pub fn active_voices(&self) -> Vec<VoiceSnapshot> {
        self.voices.values().map(VoiceSnapshot::from).collect()
    }

    pub fn voice(&self, identity: &str) -> Option<VoiceSnapshot> {
        self.voices.get(identity).map(VoiceSnapshot::from)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
