//! Inference benchmark: one event through a fitted real-time detector, and batch scoring.

use anomaly_engine::config::EngineConfig;
use anomaly_engine::detector::{DetectorBackend, HybridDetector, RealTimeDetector};
use anomaly_engine::events::Event;
use anomaly_engine::features::{build_sequences, FeatureVector, FEATURE_DIM};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn vectors(n: usize) -> Vec<FeatureVector> {
    (0..n)
        .map(|i| {
            let mut fv = FeatureVector::zeros();
            for j in 0..FEATURE_DIM {
                fv.values[j] = 1.0 + j as f64 * 0.5 + ((i * 31 + j * 7) % 17) as f64 * 0.01;
            }
            fv
        })
        .collect()
}

fn fitted_hybrid(config: &EngineConfig) -> HybridDetector {
    let mut hybrid = HybridDetector::from_config(config).unwrap();
    hybrid.fit(&build_sequences(&vectors(209), 10, 1)).unwrap();
    hybrid
}

fn bench_process_event(c: &mut Criterion) {
    let config = EngineConfig::default();
    let mut detector = RealTimeDetector::from_config(DetectorBackend::Hybrid(fitted_hybrid(&config)), &config).unwrap();
    let event = Event {
        packet_count: Some(12),
        byte_count: Some(1400),
        duration: Some(1.0),
        protocol: Some("tcp".to_string()),
        ..Event::default()
    };
    for _ in 0..10 {
        detector.process_event(event.clone());
    }

    c.bench_function("realtime_process_event_hybrid", |b| {
        b.iter(|| black_box(detector.process_event(black_box(event.clone()))))
    });
}

fn bench_batch_scores(c: &mut Criterion) {
    let config = EngineConfig::default();
    let hybrid = fitted_hybrid(&config);

    let mut g = c.benchmark_group("hybrid_predict_scores");
    for n in [1usize, 16, 128] {
        let batch = build_sequences(&vectors(n + 9), 10, 1);
        g.bench_function(format!("windows_{n}").as_str(), |b| {
            b.iter(|| black_box(hybrid.predict_scores(black_box(&batch)).unwrap()))
        });
    }
    g.finish();
}

criterion_group!(benches, bench_process_event, bench_batch_scores);
criterion_main!(benches);
