//! Rhythm Layer - drum step sequencer and chord bass loop
//!
//! Runs one step per eighth note on the shared transport. Each step fires
//! the drum hits due on the active grid, plays a chord tone on the bass voice
//! every beat and schedules the following step. The chord moves to the next
//! progression degree every `loops_per_chord` loops.
//!
//! Steps are `TransportEvent::RhythmStep` events tagged with a generation.
//! Restarting or stopping the loop bumps the generation so leftover steps
//! from an earlier run are ignored.

use crate::catalog::{Catalog, Timbre, DRUM_STEPS};
use crate::mapper::time_seeded_variation;
use crate::note::Pitch;
use crate::rhythm_value::RhythmValue;
use crate::tone::{DrumHit, ToneService, VoiceHandle, VoiceRole, VoiceSpec};
use crate::transport::{Transport, TransportEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sequencer resolution
pub const STEP_VALUE: RhythmValue = RhythmValue::note(8);

pub const BASS_TIMBRE: Timbre = Timbre::Triangle;

/// Glide between consecutive bass notes, seconds
const BASS_GLIDE: f64 = 0.02;

/// Chord-tone index (root, third, fifth) per beat, one row per variation slot.
const VOICINGS: [[usize; 4]; 4] = [
    [0, 1, 2, 1],
    [0, 2, 1, 2],
    [0, 0, 2, 1],
    [0, 1, 0, 2],
];

pub struct RhythmLayer {
    catalog: Arc<Catalog>,
    drum_pattern: String,
    scale: String,
    progression: String,
    loops_per_chord: u32,

    current_step: usize,
    current_chord_index: usize,
    loops_since_chord_change: u32,

    generation: u64,
    running: bool,
    bass: Option<VoiceHandle>,
}

impl RhythmLayer {
    pub fn new(
        catalog: Arc<Catalog>,
        drum_pattern: &str,
        scale: &str,
        progression: &str,
        loops_per_chord: u32,
    ) -> Self {
        Self {
            catalog,
            drum_pattern: drum_pattern.to_string(),
            scale: scale.to_string(),
            progression: progression.to_string(),
            loops_per_chord: loops_per_chord.max(1),
            current_step: 0,
            current_chord_index: 0,
            loops_since_chord_change: 0,
            generation: 0,
            running: false,
            bass: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn current_chord_index(&self) -> usize {
        self.current_chord_index
    }

    pub fn loops_since_chord_change(&self) -> u32 {
        self.loops_since_chord_change
    }

    pub fn bass_handle(&self) -> Option<VoiceHandle> {
        self.bass
    }

    pub fn drum_pattern(&self) -> &str {
        &self.drum_pattern
    }

    /// Begin the loop at the current transport time. Requires a running
    /// transport.
    pub fn start(&mut self, transport: &mut Transport) {
        if self.running {
            return;
        }
        if !transport.is_running() {
            warn!("Rhythm layer not started: transport is stopped");
            return;
        }
        self.running = true;
        self.current_step = 0;
        self.current_chord_index = 0;
        self.loops_since_chord_change = 0;
        self.schedule_first_step(transport);
        info!("Rhythm layer started ({} drums)", self.drum_pattern);
    }

    /// Cancel pending steps and silence the bass voice.
    pub fn stop(&mut self, transport: &mut Transport, tone: &mut dyn ToneService) {
        self.generation += 1;
        transport.cancel_where(|e| matches!(e, TransportEvent::RhythmStep { .. }));
        if let Some(handle) = self.bass.take() {
            if let Err(e) = tone.release(handle) {
                warn!("Bass release failed: {}", e);
            }
            if let Err(e) = tone.dispose(handle) {
                warn!("Bass dispose failed: {}", e);
            }
        }
        if self.running {
            self.running = false;
            info!("Rhythm layer stopped");
        }
    }

    /// Switch drum grids; a running loop restarts from step 0 on the new
    /// grid without stopping the transport.
    pub fn set_drum_pattern(&mut self, name: &str, transport: &mut Transport) {
        self.drum_pattern = name.to_string();
        if self.running {
            transport.cancel_where(|e| matches!(e, TransportEvent::RhythmStep { .. }));
            self.current_step = 0;
            self.schedule_first_step(transport);
            info!("Drum loop restarted on '{}'", name);
        }
    }

    pub fn set_scale(&mut self, scale: &str) {
        self.scale = scale.to_string();
    }

    pub fn set_progression(&mut self, progression: &str) {
        self.progression = progression.to_string();
        self.current_chord_index = 0;
        self.loops_since_chord_change = 0;
    }

    fn schedule_first_step(&mut self, transport: &mut Transport) {
        self.generation += 1;
        transport.schedule_at(
            transport.now(),
            TransportEvent::RhythmStep {
                generation: self.generation,
            },
        );
    }

    /// Run the step scheduled for `step_time` and queue the next one.
    pub fn on_step(
        &mut self,
        generation: u64,
        step_time: f64,
        transport: &mut Transport,
        tone: &mut dyn ToneService,
    ) {
        if !self.running || generation != self.generation {
            debug!("Ignoring rhythm step from generation {}", generation);
            return;
        }

        self.fire_drums(step_time, tone);
        if self.current_step % 2 == 0 {
            self.play_bass(self.current_step / 2, step_time, tone);
        }
        self.advance();

        let next = step_time + STEP_VALUE.seconds(transport.tempo());
        transport.schedule_at(next, TransportEvent::RhythmStep { generation });
    }

    fn fire_drums(&self, step_time: f64, tone: &mut dyn ToneService) {
        let Some(pattern) = self.catalog.drum_pattern(&self.drum_pattern) else {
            return;
        };
        for (instrument, velocity) in pattern.hits_at(self.current_step) {
            let hit = DrumHit {
                instrument,
                time: step_time,
                velocity,
            };
            if let Err(e) = tone.trigger_drum(hit) {
                warn!("{} hit at step {} failed: {}", instrument, self.current_step, e);
            }
        }
    }

    fn play_bass(&mut self, beat: usize, step_time: f64, tone: &mut dyn ToneService) {
        let Some(pitch) = self.bass_pitch(beat, step_time) else {
            return;
        };
        match self.bass {
            Some(handle) => {
                if let Err(e) = tone.set_pitch(handle, pitch, BASS_GLIDE) {
                    warn!("Bass note failed, dropping bass voice: {}", e);
                    // best effort; a fresh voice is allocated on the next beat
                    let _ = tone.dispose(handle);
                    self.bass = None;
                }
            }
            None => {
                let spec = VoiceSpec {
                    timbre: BASS_TIMBRE,
                    role: VoiceRole::Bass,
                    pitch,
                };
                match tone.create_voice(spec) {
                    Ok(handle) => {
                        debug!("Bass voice {} allocated", handle);
                        self.bass = Some(handle);
                    }
                    Err(e) => warn!("Could not allocate bass voice: {}", e),
                }
            }
        }
    }

    /// Chord tone for `beat` of the current chord, one octave below the scale.
    pub fn bass_pitch(&self, beat: usize, step_time: f64) -> Option<Pitch> {
        let scale = self.catalog.scale(&self.scale);
        let progression = self.catalog.progression(&self.progression);
        if scale.is_empty() || progression.is_empty() {
            return None;
        }
        let degree = progression[self.current_chord_index % progression.len()];
        let voicing = VOICINGS[time_seeded_variation(step_time)];
        let chord_tone = voicing[beat % voicing.len()];

        let index = degree + 2 * chord_tone;
        let octaves = (index / scale.len()) as i32;
        Some(scale[index % scale.len()].transpose(12 * octaves - 12))
    }

    fn advance(&mut self) {
        self.current_step += 1;
        if self.current_step < DRUM_STEPS {
            return;
        }
        self.current_step = 0;
        self.loops_since_chord_change += 1;
        if self.loops_since_chord_change >= self.loops_per_chord {
            self.loops_since_chord_change = 0;
            let len = self.catalog.progression(&self.progression).len().max(1);
            self.current_chord_index = (self.current_chord_index + 1) % len;
            debug!("Chord advanced to index {}", self.current_chord_index);
        }
    }
}
