//! Position-to-music mapping across the whole catalog

use sightsong::mapper::{pitch_index, time_seeded_variation};
use sightsong::{Catalog, PositionMapper, RhythmValue, Timbre, Zone, ZoneBounds};
use std::sync::Arc;

fn mapper() -> PositionMapper {
    PositionMapper::new(Arc::new(Catalog::builtin()), ZoneBounds::default())
}

#[test]
fn test_mapping_is_deterministic() {
    let m = mapper();
    for &(x, y) in &[(0.1, 0.9), (0.5, 0.5), (0.85, 0.05), (0.3, 0.3), (1.0, 0.0)] {
        for class in ["person", "cup", "unknown thing"] {
            let first = m.map_position(x, y, class, "blues", "techno");
            for _ in 0..5 {
                assert_eq!(m.map_position(x, y, class, "blues", "techno"), first);
            }
        }
    }
}

#[test]
fn test_varied_mapping_is_deterministic_for_fixed_clock() {
    let m = mapper();
    for t in [0.0, 1.9, 2.0, 5.5, 7.99, 123.4] {
        let a = m.map_position_varied(0.5, 0.5, "person", "major", "basic", t);
        let b = m.map_position_varied(0.5, 0.5, "person", "major", "basic", t);
        assert_eq!(a, b, "Variation at t={} should be reproducible", t);
    }
}

#[test]
fn test_pitch_always_in_scale() {
    let catalog = Catalog::builtin();
    let m = mapper();
    for scale in catalog.scale_names() {
        let notes = catalog.scale(&scale);
        for i in 0..=100 {
            let y = i as f64 / 100.0;
            let event = m.map_position(0.5, y, "person", &scale, "basic");
            assert!(
                notes.contains(&event.pitch),
                "{} at y={} mapped outside the scale: {}",
                scale,
                y,
                event.pitch
            );
            assert!(pitch_index(y, notes.len()) < notes.len());
        }
    }
}

#[test]
fn test_out_of_range_positions_are_clamped() {
    let m = mapper();
    let catalog = Catalog::builtin();
    let notes = catalog.scale("major");

    let high = m.map_position(-3.0, 7.0, "person", "major", "basic");
    assert_eq!(high.zone, Zone::Left);
    assert!(notes.contains(&high.pitch));

    let nan = m.map_position(f64::NAN, f64::NAN, "person", "major", "basic");
    assert_eq!(nan.zone, Zone::Left);
    assert_eq!(nan.pitch, notes[0]);
}

#[test]
fn test_zone_boundaries() {
    let m = mapper();
    let zone = |x: f64| m.map_position(x, 0.5, "person", "major", "basic").zone;
    assert_eq!(zone(0.29), Zone::Left);
    assert_eq!(zone(0.3), Zone::Center);
    assert_eq!(zone(0.7), Zone::Center);
    assert_eq!(zone(0.71), Zone::Right);
}

#[test]
fn test_custom_zone_bounds() {
    let bounds = ZoneBounds::new(0.2, 0.4).unwrap();
    let m = PositionMapper::new(Arc::new(Catalog::builtin()), bounds);
    assert_eq!(m.map_position(0.3, 0.5, "person", "major", "basic").zone, Zone::Center);
    assert_eq!(m.map_position(0.5, 0.5, "person", "major", "basic").zone, Zone::Right);
    assert!(ZoneBounds::new(0.6, 0.4).is_err());
}

#[test]
fn test_higher_on_screen_is_higher_pitch() {
    let m = mapper();
    let low = m.map_position(0.5, 0.1, "person", "major", "basic");
    let high = m.map_position(0.5, 0.9, "person", "major", "basic");
    assert!(high.pitch > low.pitch);
}

#[test]
fn test_timbre_follows_class() {
    let m = mapper();
    assert_eq!(m.map_position(0.5, 0.5, "cup", "major", "basic").timbre, Timbre::Triangle);
    assert_eq!(m.map_position(0.5, 0.5, "laptop", "major", "basic").timbre, Timbre::Pulse);
    assert_eq!(
        m.map_position(0.5, 0.5, "giraffe", "major", "basic").timbre,
        Timbre::default()
    );
}

#[test]
fn test_unknown_names_fall_back() {
    let m = mapper();
    assert_eq!(
        m.map_position(0.2, 0.6, "person", "lydian", "polka"),
        m.map_position(0.2, 0.6, "person", "major", "basic")
    );
}

#[test]
fn test_left_edge_gets_first_rhythm_value() {
    let m = mapper();
    let event = m.map_position(0.0, 0.5, "person", "major", "basic");
    assert_eq!(event.rhythm_value, RhythmValue::note(8));
}

#[test]
fn test_ornament_shifts_pitch_index() {
    let catalog = Catalog::builtin();
    let notes = catalog.scale("major");
    let m = mapper();
    let base = pitch_index(0.5, notes.len());

    assert_eq!(time_seeded_variation(2.5), 1);
    let varied = m.map_position_varied(0.5, 0.5, "person", "major", "basic", 2.5);
    assert_eq!(varied.pitch, notes[(base + 2).min(notes.len() - 1)]);

    let plain = m.map_position_varied(0.5, 0.5, "person", "major", "basic", 0.5);
    assert_eq!(plain, m.map_position(0.5, 0.5, "person", "major", "basic"));
}
