use std::hint::black_box;

use ab_audio::features::FeatureExtractor;
use ab_audio::pipeline::AudioPipeline;
use ab_audio::ring::RingBuffer;
use ab_audio::spectrum::SpectralAnalyzer;
use ab_core::config::{BeatTuning, PipelineConfig, WindowFunction};
use ab_core::traits::FrameSink;
use criterion::{Criterion, criterion_group, criterion_main};

fn tone(len: usize, channels: usize) -> Vec<f64> {
    (0..len * channels)
        .map(|i| {
            let t = (i / channels) as f64 / 44100.0;
            (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_spectrum(c: &mut Criterion) {
    let frame = tone(1024, 1);
    let mut analyzer = SpectralAnalyzer::with_size(8, WindowFunction::Hann, 1024);
    c.bench_function("spectrum_1024_8_bands", |b| {
        b.iter(|| black_box(analyzer.analyze(black_box(&frame))));
    });
}

fn bench_features(c: &mut Criterion) {
    let frame = tone(1024, 1);
    let mut extractor = FeatureExtractor::new(50, BeatTuning::default());
    c.bench_function("features_1024", |b| {
        b.iter(|| black_box(extractor.update(black_box(&frame))));
    });
}

fn bench_ring(c: &mut Criterion) {
    let frame = tone(1024, 1);
    let (mut writer, reader) = RingBuffer::new(88200);
    c.bench_function("ring_append_1024", |b| {
        b.iter(|| writer.append(black_box(&frame)));
    });
    c.bench_function("ring_read_1024", |b| {
        b.iter(|| black_box(reader.snapshot_padded(1024)));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let mono = tone(config.buffer_size, 1);
    let stereo = tone(config.buffer_size, 2);
    let (mut pipeline, reader) = AudioPipeline::new(&config);
    // Budget temps réel : ~23 ms par frame de 1024 @ 44.1kHz
    c.bench_function("pipeline_ingest_1024", |b| {
        b.iter(|| pipeline.ingest(black_box(&mono)));
    });
    c.bench_function("pipeline_on_frame_stereo_1024", |b| {
        b.iter(|| pipeline.on_frame(black_box(&stereo), 2, 44100));
    });
    c.bench_function("pipeline_read_snapshot", |b| {
        b.iter(|| black_box(reader.read_snapshot()));
    });
}

criterion_group!(benches, bench_spectrum, bench_features, bench_ring, bench_pipeline);
criterion_main!(benches);
