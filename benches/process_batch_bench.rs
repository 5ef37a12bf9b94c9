//! Benchmarks for the detection-to-music hot path
//!
//! Run with: cargo bench --bench process_batch_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sightsong::{Catalog, Detection, Engine, EngineConfig, PositionMapper, RecordingToneService, ZoneBounds};
use std::sync::Arc;

fn batch(size: usize, frame: usize) -> Vec<Detection> {
    (0..size)
        .map(|i| {
            let x = ((i * 97 + frame * 5) % 600) as f64;
            let y = ((i * 53 + frame * 3) % 440) as f64;
            Detection::new("person", [x, y, 40.0, 40.0]).with_identity(&format!("obj{i}"))
        })
        .collect()
}

fn bench_map_position(c: &mut Criterion) {
    let mapper = PositionMapper::new(Arc::new(Catalog::builtin()), ZoneBounds::default());
    c.bench_function("map_position", |b| {
        b.iter(|| {
            mapper.map_position(
                black_box(0.42),
                black_box(0.67),
                black_box("person"),
                "pentatonic",
                "techno",
            )
        })
    });
}

fn bench_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_frame");

    for size in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut engine = Engine::new(EngineConfig::default(), RecordingToneService::new())
                .expect("default config is valid");
            engine.start();
            let frames: Vec<Vec<Detection>> = (0..64).map(|f| batch(size, f)).collect();
            let mut frame = 0;

            b.iter(|| {
                let events = engine.process_frame(black_box(&frames[frame % frames.len()]));
                engine.tick(1.0 / 30.0);
                engine.tone_mut().take_commands();
                frame += 1;
                events.len()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_map_position, bench_process_frame);
criterion_main!(benches);
