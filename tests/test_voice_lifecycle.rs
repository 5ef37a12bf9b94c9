//! Voice lifecycle through the engine: creation, glides, staleness, disposal

use sightsong::tone::{ToneCall, ToneCommand};
use sightsong::{Detection, Engine, EngineConfig, RecordingToneService, VoiceHandle, VoiceState};
use std::collections::HashSet;

fn engine() -> Engine<RecordingToneService> {
    let mut engine = Engine::new(EngineConfig::default(), RecordingToneService::new()).unwrap();
    engine.start();
    engine
}

fn tracked(class: &str, id: &str, x: f64, y: f64) -> Detection {
    Detection::new(class, [x, y, 60.0, 60.0]).with_identity(id)
}

fn commands_for(tone: &RecordingToneService, handle: VoiceHandle) -> Vec<ToneCommand> {
    tone.commands()
        .iter()
        .filter(|c| c.call.handle() == Some(handle))
        .cloned()
        .collect()
}

#[test]
fn test_one_voice_per_identity() {
    let mut e = engine();
    let ids = ["a", "b", "c"];

    for frame in 0..60 {
        let batch: Vec<Detection> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let x = (i as f64 * 200.0 + frame as f64 * 7.0) % 600.0;
                let y = (frame as f64 * 13.0 + i as f64 * 90.0) % 400.0;
                tracked("person", id, x, y)
            })
            .collect();
        e.process_frame(&batch);
        e.tick(1.0 / 30.0);

        let voices = e.active_voices();
        let identities: HashSet<_> = voices.iter().map(|v| v.identity.clone()).collect();
        let handles: HashSet<_> = voices.iter().map(|v| v.handle).collect();
        assert_eq!(identities.len(), voices.len());
        assert_eq!(handles.len(), voices.len());
        assert!(voices.len() <= ids.len());
        if let Some(bass) = e.rhythm().bass_handle() {
            assert!(!handles.contains(&bass), "Bass handle shared with a tracked voice");
        }
    }

    // three tracked voices plus the bass
    let creates = e
        .tone()
        .count_where(|c| matches!(c, ToneCall::CreateVoice { .. }));
    assert_eq!(creates, 4);
}

#[test]
fn test_untracked_detections_get_fallback_identities() {
    let mut e = engine();
    let batch = vec![
        Detection::new("cup", [100.0, 100.0, 20.0, 20.0]),
        Detection::new("cup", [300.0, 200.0, 20.0, 20.0]),
        Detection::new("bottle", [500.0, 300.0, 20.0, 20.0]),
    ];
    e.process_frame(&batch);
    let identities: Vec<String> = e.active_voices().into_iter().map(|v| v.identity).collect();
    assert_eq!(identities, vec!["~bottle-0", "~cup-0", "~cup-1"]);
}

#[test]
fn test_stale_voice_released_once_then_disposed_after_drain() {
    let mut e = engine();
    e.process_frame(&[tracked("person", "p1", 50.0, 50.0)]);
    let handle = e.active_voices()[0].handle;

    // object leaves; keep time moving well past timeout + drain
    for _ in 0..100 {
        e.process_frame(&[]);
        e.tick(0.05);
    }

    let history = commands_for(e.tone(), handle);
    let kinds: Vec<_> = history
        .iter()
        .map(|c| match c.call {
            ToneCall::CreateVoice { .. } => "create",
            ToneCall::Release { .. } => "release",
            ToneCall::Dispose { .. } => "dispose",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["create", "release", "dispose"]);

    let released = history[1].time;
    let disposed = history[2].time;
    assert!(released > 2.0, "Released too early at {}", released);
    assert!(disposed - released >= 1.0 - 1e-9, "Drain too short: {}", disposed - released);
    assert!(e.active_voices().is_empty());
}

#[test]
fn test_voice_is_releasing_during_drain() {
    let mut e = engine();
    e.process_frame(&[tracked("person", "p1", 50.0, 50.0)]);
    for _ in 0..50 {
        e.tick(0.05);
    }
    // 2.5s: past the 2s timeout, inside the 1s drain
    let voices = e.active_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].state, VoiceState::Releasing);
}

#[test]
fn test_visible_voice_is_never_released() {
    let mut e = engine();
    for _ in 0..150 {
        e.process_frame(&[tracked("person", "p1", 50.0, 50.0)]);
        e.tick(0.05);
    }
    assert_eq!(e.tone().count_where(|c| matches!(c, ToneCall::Release { .. })), 0);
    assert_eq!(e.active_voices()[0].state, VoiceState::Sustaining);
}

#[test]
fn test_returning_object_gets_fresh_voice_after_disposal() {
    let mut e = engine();
    e.process_frame(&[tracked("person", "p1", 50.0, 50.0)]);
    let first = e.active_voices()[0].handle;
    for _ in 0..80 {
        e.tick(0.05);
    }
    assert!(e.active_voices().is_empty());

    e.process_frame(&[tracked("person", "p1", 50.0, 50.0)]);
    let second = e.active_voices()[0].handle;
    assert_ne!(first, second);
    assert_eq!(e.active_voices()[0].state, VoiceState::Attacking);
}

#[test]
fn test_low_confidence_detection_is_skipped() {
    let config = EngineConfig {
        min_confidence: 0.5,
        ..EngineConfig::default()
    };
    let mut e = Engine::new(config, RecordingToneService::new()).unwrap();
    e.start();
    let events = e.process_frame(&[
        tracked("person", "weak", 50.0, 50.0).with_confidence(0.2),
        tracked("person", "strong", 400.0, 50.0).with_confidence(0.9),
    ]);
    assert_eq!(events.len(), 1);
    let voices = e.active_voices();
    assert_eq!(voices.len(), 1);
    assert_eq!(voices[0].identity, "strong");
}

#[test]
fn test_creation_failure_does_not_abort_batch() {
    let mut tone = RecordingToneService::new();
    tone.fail_next_creates(1);
    let mut e = Engine::new(EngineConfig::default(), tone).unwrap();
    e.start();
    let events = e.process_frame(&[
        tracked("person", "p1", 50.0, 50.0),
        tracked("cup", "c1", 400.0, 50.0),
    ]);
    assert_eq!(events.len(), 2);
    let identities: Vec<String> = e.active_voices().into_iter().map(|v| v.identity).collect();
    assert_eq!(identities, vec!["c1"]);
}
