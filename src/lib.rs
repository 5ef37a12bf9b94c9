//! # Sightsong - Detections to Music
//!
//! Sightsong turns a live stream of object detections into music. Every
//! tracked object gets its own voice: where it sits on screen picks the pitch,
//! the rhythm value and the timbre, and moving it glides the voice to a new
//! pitch instead of re-attacking. Objects that disappear are released and,
//! after a drain delay, disposed. Underneath, a drum machine and a
//! chord-progression bass loop on the transport.
//!
//! ## Core Features
//!
//! - **Position Mapping**: zone (left/center/right) by `x`, pitch by `y`,
//!   rhythm value by zone, timbre by object class
//! - **Voice Lifecycle**: one voice per identity, glides with speed-dependent
//!   portamento, stale voices released and disposed exactly once
//! - **Trigger Throttle**: no note re-triggers faster than a fraction of its
//!   rhythm value
//! - **Rhythm Layer**: 8-step drum grids and a bass following a progression
//! - **Effects**: reverb, delay and filter steered by the lead detection
//! - **Offline Rendering**: a built-in synthesizer renders sessions to WAV
//!
//! ## Quick Start
//!
//! ```rust
//! use sightsong::{Detection, Engine, EngineConfig, RecordingToneService};
//!
//! let mut engine = Engine::new(EngineConfig::default(), RecordingToneService::new()).unwrap();
//! engine.start();
//!
//! // A person in the left third of a 640x480 frame
//! let person = Detection::new("person", [50.0, 50.0, 100.0, 100.0]).with_identity("p1");
//! let events = engine.process_frame(&[person]);
//! assert_eq!(events[0].pitch.to_string(), "C4");
//!
//! engine.tick(0.05);
//! assert_eq!(engine.active_voices().len(), 1);
//!
//! let tone = engine.teardown();
//! assert_eq!(tone.live_voices(), 0);
//! ```
//!
//! ## Architecture
//!
//! The [`Engine`] is a single-threaded context. The host feeds it detection
//! batches with [`Engine::process_frame`] and advances time with
//! [`Engine::tick`]; everything that happens later (drum steps, voice
//! disposal, stale sweeps) is an event on the [`Transport`] queue. Sound is
//! produced by a [`ToneService`]: [`RecordingToneService`] logs commands for
//! tests and inspection, [`RenderToneService`] synthesizes offline.

pub mod catalog;
pub mod config;
pub mod detection;
pub mod effects;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod mapper;
pub mod note;
pub mod render;
pub mod rhythm_layer;
pub mod rhythm_value;
pub mod synth_voice_manager;
pub mod throttle;
pub mod tone;
pub mod transport;
pub mod voice_manager;

pub use catalog::{Catalog, DrumInstrument, DrumPattern, Timbre};
pub use config::EngineConfig;
pub use detection::{Detection, DetectionScript, DetectionSource, ScriptedSource};
pub use engine::Engine;
pub use error::{CatalogError, ConfigError, MappingError, RenderError, ScriptError, ToneError};
pub use mapper::{MusicalEvent, NormalizedPosition, PositionMapper, Zone, ZoneBounds};
pub use note::Pitch;
pub use render::{RenderConfig, RenderStats, RenderToneService};
pub use rhythm_value::RhythmValue;
pub use tone::{
    DrumHit, EffectChange, EffectParameter, RecordingToneService, ToneService, VoiceHandle,
    VoiceRole, VoiceSpec,
};
pub use transport::Transport;
pub use voice_manager::{VoiceSnapshot, VoiceState};
