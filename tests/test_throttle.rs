//! Trigger throttle: standalone and as seen through the engine

use sightsong::mapper::Zone;
use sightsong::throttle::{NoteKey, TriggerThrottle};
use sightsong::tone::ToneCall;
use sightsong::{
    Catalog, Detection, Engine, EngineConfig, Pitch, RecordingToneService, RhythmValue,
};
use std::sync::Arc;

#[test]
fn test_eighth_note_at_120_bpm() {
    let mut throttle = TriggerThrottle::default();
    let interval = throttle.interval_for(RhythmValue::note(8), 120.0);
    assert!((interval - 0.1).abs() < 1e-9);

    let key = NoteKey::attack(Pitch::parse("C4").unwrap(), Zone::Left);
    assert!(throttle.should_trigger_with(&key, 0.0, interval));
    assert!(!throttle.should_trigger_with(&key, 0.05, interval));
    assert!(throttle.should_trigger_with(&key, 0.2, interval));
}

#[test]
fn test_suppressed_attempt_does_not_extend_window() {
    let mut throttle = TriggerThrottle::default();
    let key = NoteKey::glide("p1");
    assert!(throttle.should_trigger_with(&key, 1.0, 0.1));
    assert!(!throttle.should_trigger_with(&key, 1.08, 0.1));
    // measured from the last trigger, not the last attempt
    assert!(throttle.should_trigger_with(&key, 1.11, 0.1));
}

#[test]
fn test_keys_are_independent() {
    let mut throttle = TriggerThrottle::default();
    let c4 = Pitch::parse("C4").unwrap();
    let d4 = Pitch::parse("D4").unwrap();
    assert!(throttle.should_trigger(&NoteKey::attack(c4, Zone::Left), 0.0));
    assert!(throttle.should_trigger(&NoteKey::attack(d4, Zone::Left), 0.0));
    assert!(throttle.should_trigger(&NoteKey::attack(c4, Zone::Right), 0.0));
    assert!(throttle.should_trigger(&NoteKey::glide("p1"), 0.0));
    assert!(!throttle.should_trigger(&NoteKey::attack(c4, Zone::Left), 0.01));
    assert_eq!(throttle.len(), 4);
}

#[test]
fn test_slower_values_throttle_longer() {
    let throttle = TriggerThrottle::default();
    let eighth = throttle.interval_for(RhythmValue::note(8), 120.0);
    let whole = throttle.interval_for(RhythmValue::note(1), 120.0);
    let fast_tempo = throttle.interval_for(RhythmValue::note(8), 240.0);
    assert!(whole > eighth);
    assert!((fast_tempo - eighth / 2.0).abs() < 1e-9);
}

#[test]
fn test_prune_forgets_old_keys() {
    let mut throttle = TriggerThrottle::default();
    throttle.should_trigger(&NoteKey::glide("old"), 0.0);
    throttle.should_trigger(&NoteKey::glide("new"), 9.95);
    throttle.prune(10.0);
    assert_eq!(throttle.len(), 1);
    throttle.clear();
    assert!(throttle.is_empty());
}

#[test]
fn test_long_interval_survives_prune() {
    let mut throttle = TriggerThrottle::default();
    let key = NoteKey::glide("p1");
    // two measures at 20 BPM
    let interval = throttle.interval_for(RhythmValue::parse("2m").unwrap(), 20.0);
    assert!((interval - 9.6).abs() < 1e-9);

    assert!(throttle.should_trigger_with(&key, 0.0, interval));
    throttle.prune(7.0);
    assert!(!throttle.should_trigger_with(&key, 7.0, interval));
    assert!(throttle.should_trigger_with(&key, 9.6, interval));
}

#[test]
fn test_slow_rhythm_spaces_glides_in_engine() {
    let mut catalog = Catalog::builtin();
    catalog.register_rhythm("slow", &["2m"]).unwrap();
    let config = EngineConfig {
        rhythm_pattern: "slow".to_string(),
        tempo_bpm: 20.0,
        ..EngineConfig::default()
    };
    let mut e = Engine::init(config, Arc::new(catalog), RecordingToneService::new()).unwrap();
    e.start();

    for i in 0..400 {
        let y = if i % 2 == 0 { 50.0 } else { 300.0 };
        e.process_frame(&[Detection::new("person", [10.0, y, 60.0, 60.0]).with_identity("p1")]);
        e.tick(0.05);
    }

    let bass = e.rhythm().bass_handle();
    let glides: Vec<f64> = e
        .tone()
        .commands()
        .iter()
        .filter(|c| matches!(c.call, ToneCall::SetPitch { handle, .. } if Some(handle) != bass))
        .map(|c| c.time)
        .collect();
    assert!(glides.len() >= 2, "Glides at {:?}", glides);
    for pair in glides.windows(2) {
        assert!(pair[1] - pair[0] >= 9.6 - 1e-9, "Glides at {:?}", glides);
    }
}

#[test]
fn test_rapid_pitch_changes_are_throttled_in_engine() {
    let mut e = Engine::new(EngineConfig::default(), RecordingToneService::new()).unwrap();
    e.start();

    // left edge, basic rhythm: eighth notes, so glides at most every 0.1s
    let heights = [50.0, 300.0, 50.0, 300.0, 50.0, 300.0];
    for (i, &y) in heights.iter().enumerate() {
        let detection = Detection::new("person", [10.0, y, 60.0, 60.0]).with_identity("p1");
        e.process_frame(&[detection]);
        if i + 1 < heights.len() {
            e.tick(0.04);
        }
    }

    let bass = e.rhythm().bass_handle();
    let glides: Vec<f64> = e
        .tone()
        .commands()
        .iter()
        .filter(|c| matches!(c.call, ToneCall::SetPitch { handle, .. } if Some(handle) != bass))
        .map(|c| c.time)
        .collect();
    // 0.04 glides; 0.08 is too soon; 0.12 matches the sounding pitch; 0.16
    // glides again; 0.20 is too soon
    assert_eq!(glides.len(), 2, "Glides at {:?}", glides);
    assert!(glides[1] - glides[0] >= 0.1 - 1e-9);
    assert_eq!(e.tone().count_where(|c| matches!(c, ToneCall::CreateVoice { .. })), 2);
}
