//! Engine context
//!
//! Owns every moving part of one detection-to-music session: the transport,
//! the voice manager, the rhythm layer, the effect modulator and the tone
//! service. The host calls `process_frame` once per detection batch and
//! `tick` periodically; both run on the caller's thread and never fail.

use crate::catalog::{Catalog, DEFAULT_RHYTHM, DEFAULT_SCALE};
use crate::config::EngineConfig;
use crate::detection::{Detection, DetectionSource};
use crate::effects::EffectModulator;
use crate::error::ConfigError;
use crate::mapper::{MusicalEvent, PositionMapper};
use crate::rhythm_layer::RhythmLayer;
use crate::tone::ToneService;
use crate::transport::{Transport, TransportEvent};
use crate::voice_manager::{VoiceManager, VoiceSnapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type MusicalEventListener = Box<dyn FnMut(&MusicalEvent)>;

pub struct Engine<T: ToneService> {
    config: EngineConfig,
    catalog: Arc<Catalog>,
    transport: Transport,
    voices: VoiceManager,
    rhythm: RhythmLayer,
    effects: EffectModulator,
    tone: T,
    listeners: Vec<MusicalEventListener>,
}

impl<T: ToneService> Engine<T> {
    /// Engine with the builtin catalog.
    pub fn new(config: EngineConfig, tone: T) -> Result<Self, ConfigError> {
        Self::init(config, Arc::new(Catalog::builtin()), tone)
    }

    /// Validate the configuration and build a stopped engine.
    ///
    /// Unknown scale, rhythm or drum names are replaced by the defaults with
    /// a warning; structurally invalid configuration is an error.
    pub fn init(mut config: EngineConfig, catalog: Arc<Catalog>, tone: T) -> Result<Self, ConfigError> {
        config.validate()?;
        config.scale = resolve_scale(&catalog, &config.scale);
        config.rhythm_pattern = resolve_rhythm(&catalog, &config.rhythm_pattern);
        if let Some(drums) = config.drum_pattern.take() {
            config.drum_pattern = Some(resolve_drums(&catalog, &drums));
        } else if !catalog.has_drum_pattern(&config.rhythm_pattern) {
            config.drum_pattern = Some(resolve_drums(&catalog, &config.rhythm_pattern));
        }

        let mapper = PositionMapper::new(catalog.clone(), config.zone_bounds());
        let voices = VoiceManager::new(mapper, &config);
        let rhythm = RhythmLayer::new(
            catalog.clone(),
            config.drum_pattern_name(),
            &config.scale,
            &config.progression,
            config.loops_per_chord,
        );
        let effects = EffectModulator::new(config.effects.clone());
        let transport = Transport::new(config.tempo_bpm);

        info!(
            "Engine initialized: scale '{}', rhythm '{}', drums '{}', {:.0} BPM",
            config.scale,
            config.rhythm_pattern,
            config.drum_pattern_name(),
            config.tempo_bpm
        );

        Ok(Self {
            config,
            catalog,
            transport,
            voices,
            rhythm,
            effects,
            tone,
            listeners: Vec::new(),
        })
    }

    /// Stop everything and hand back the tone service.
    pub fn teardown(mut self) -> T {
        if self.transport.is_running() {
            self.stop();
        }
        self.listeners.clear();
        info!("Engine torn down");
        self.tone
    }

    /// Start the transport, reset effects and start the rhythm loop.
    pub fn start(&mut self) {
        if self.transport.is_running() {
            return;
        }
        self.transport.start();
        self.tone.advance_to(self.transport.now());
        self.effects.reset(self.config.master_volume, &mut self.tone);
        self.rhythm.start(&mut self.transport);
        self.transport
            .schedule_in(self.config.sweep_interval(), TransportEvent::Sweep);
        info!("Engine started");
    }

    /// Silence every voice, zero the wet levels and reset the transport.
    pub fn stop(&mut self) {
        if !self.transport.is_running() {
            return;
        }
        self.tone.advance_to(self.transport.now());
        self.rhythm.stop(&mut self.transport, &mut self.tone);
        self.voices.stop_all(&mut self.tone);
        self.effects.silence(&mut self.tone);
        self.transport.stop();
        info!("Engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// Map one detection batch. Ignored while stopped.
    pub fn process_frame(&mut self, batch: &[Detection]) -> Vec<MusicalEvent> {
        if !self.transport.is_running() {
            debug!("Dropping batch of {} detections: engine stopped", batch.len());
            return Vec::new();
        }
        self.tone.advance_to(self.transport.now());
        let events = self
            .voices
            .process_batch(batch, &mut self.transport, &mut self.tone);

        for event in &events {
            for listener in self.listeners.iter_mut() {
                listener(event);
            }
        }

        if let Some(pos) = batch
            .iter()
            .find_map(|d| d.normalized(self.config.min_confidence).ok())
        {
            let zone = self.voices.mapper().bounds().zone(pos.x);
            self.effects.modulate(pos, zone, &mut self.tone);
        }
        events
    }

    /// Pull one batch from `source` and process it.
    pub fn poll(&mut self, source: &mut dyn DetectionSource) -> Vec<MusicalEvent> {
        let batch = source.next_batch();
        self.process_frame(&batch)
    }

    /// Advance the transport by `dt` seconds and dispatch everything due.
    pub fn tick(&mut self, dt: f64) {
        for scheduled in self.transport.advance(dt) {
            if !self.transport.accepts(&scheduled) {
                continue;
            }
            self.tone.advance_to(scheduled.time);
            match scheduled.event {
                TransportEvent::RhythmStep { generation } => {
                    self.rhythm
                        .on_step(generation, scheduled.time, &mut self.transport, &mut self.tone);
                }
                TransportEvent::DisposeVoice { identity, handle } => {
                    self.voices.dispose_voice(&identity, handle, &mut self.tone);
                }
                TransportEvent::Sweep => {
                    self.voices.sweep(&mut self.transport, &mut self.tone);
                    self.transport.schedule_at(
                        scheduled.time + self.config.sweep_interval(),
                        TransportEvent::Sweep,
                    );
                }
            }
        }
        self.tone.advance_to(self.transport.now());
    }

    pub fn active_voices(&self) -> Vec<VoiceSnapshot> {
        self.voices.active_voices()
    }

    /// Register a listener called with every mapped detection's event.
    pub fn on_musical_event<F>(&mut self, listener: F)
    where
        F: FnMut(&MusicalEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn set_scale(&mut self, name: &str) {
        let scale = resolve_scale(&self.catalog, name);
        self.voices.set_scale(&scale);
        self.rhythm.set_scale(&scale);
        info!("Scale set to '{}'", scale);
        self.config.scale = scale;
    }

    /// Change the rhythm pattern. Unless a drum pattern was configured
    /// separately, the drum loop follows and restarts on the new grid.
    pub fn set_rhythm_pattern(&mut self, name: &str) {
        let rhythm = resolve_rhythm(&self.catalog, name);
        self.voices.set_rhythm_pattern(&rhythm);
        if self.config.drum_pattern.is_none() {
            self.rhythm.set_drum_pattern(&rhythm, &mut self.transport);
        }
        info!("Rhythm pattern set to '{}'", rhythm);
        self.config.rhythm_pattern = rhythm;
    }

    pub fn set_drum_pattern(&mut self, name: &str) {
        let drums = resolve_drums(&self.catalog, name);
        self.rhythm.set_drum_pattern(&drums, &mut self.transport);
        self.config.drum_pattern = Some(drums);
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), ConfigError> {
        self.transport.set_tempo(bpm)?;
        self.config.tempo_bpm = bpm;
        Ok(())
    }

    /// Master volume, 0-100.
    pub fn set_volume(&mut self, level: f64) {
        let level = if level.is_nan() { 0.0 } else { level.clamp(0.0, 100.0) };
        self.config.master_volume = level;
        self.tone.advance_to(self.transport.now());
        self.effects.set_master_volume(level, &mut self.tone);
        info!("Master volume set to {:.0}", level);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn rhythm(&self) -> &RhythmLayer {
        &self.rhythm
    }

    pub fn tone(&self) -> &T {
        &self.tone
    }

    pub fn tone_mut(&mut self) -> &mut T {
        &mut self.tone
    }
}

fn resolve_scale(catalog: &Catalog, name: &str) -> String {
    if catalog.has_scale(name) {
        return name.to_string();
    }
    warn!(
        "{}",
        ConfigError::UnknownScale {
            requested: name.to_string(),
            fallback: DEFAULT_SCALE.to_string(),
        }
    );
    DEFAULT_SCALE.to_string()
}

fn resolve_rhythm(catalog: &Catalog, name: &str) -> String {
    if catalog.has_rhythm(name) {
        return name.to_string();
    }
    warn!(
        "{}",
        ConfigError::UnknownRhythmPattern {
            requested: name.to_string(),
            fallback: DEFAULT_RHYTHM.to_string(),
        }
    );
    DEFAULT_RHYTHM.to_string()
}

fn resolve_drums(catalog: &Catalog, name: &str) -> String {
    if catalog.has_drum_pattern(name) {
        return name.to_string();
    }
    warn!(
        "{}",
        ConfigError::UnknownDrumPattern {
            requested: name.to_string(),
            fallback: DEFAULT_RHYTHM.to_string(),
        }
    );
    DEFAULT_RHYTHM.to_string()
}
