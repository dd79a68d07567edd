use anchor_reloc_capture::{QualityAccumulator, QualityParams};
use anchor_reloc_core::TrackingState;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point3;

/// One frame of feature points on a sunflower spiral, shifted per frame.
fn make_frame(n: usize, frame: usize) -> Vec<Point3<f32>> {
    let shift = frame as f32 * 0.013;
    (0..n)
        .map(|i| {
            let t = (i as f32 + 0.5) / n as f32;
            let r = 0.1 + 4.6 * t.sqrt();
            let theta = i as f32 * 2.399_963 + shift;
            Point3::new(r * theta.cos(), -1.0 + 0.9 * t + shift, r * theta.sin())
        })
        .collect()
}

fn bench_ingest(c: &mut Criterion) {
    let frames: Vec<_> = (0..20).map(|f| make_frame(500, f)).collect();

    c.bench_function("ingest_20x500", |b| {
        b.iter(|| {
            let mut acc = QualityAccumulator::new(Point3::new(0.0, -1.0, 0.0), QualityParams::default());
            for frame in &frames {
                acc.ingest(black_box(frame), &[]);
            }
            black_box(acc.score(TrackingState::Normal))
        })
    });

    let mut warm = QualityAccumulator::new(Point3::new(0.0, -1.0, 0.0), QualityParams::default());
    for frame in &frames {
        warm.ingest(frame, &[]);
    }
    let repeat = make_frame(500, 3);
    // Every point is already known: measures the dedup lookup alone.
    c.bench_function("ingest_duplicate_frame_warm", |b| {
        b.iter(|| black_box(warm.ingest(black_box(&repeat), &[])))
    });
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
