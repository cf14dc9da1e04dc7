// Per-block cost of each effect
//
// Run with: cargo bench --bench effects_bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use stomp_core::domain::{BlockProcessor, EffectKind, Parameters};

const SAMPLE_RATE: u32 = 48000;
const FRAMES: usize = 256;

fn stereo_block() -> Vec<i16> {
    (0..FRAMES * 2)
        .map(|i| ((i as f32 * 0.05).sin() * 20000.0) as i16)
        .collect()
}

fn bench_effect_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("effect_block_256_frames");
    group.throughput(Throughput::Elements(FRAMES as u64));

    let input = stereo_block();
    for kind in EffectKind::ALL {
        let mut processor = BlockProcessor::new(SAMPLE_RATE, 2, 2);
        let params = Parameters {
            effect: kind,
            ..Parameters::default()
        };
        let mut output = vec![0i16; FRAMES * 2];

        group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, _| {
            b.iter(|| {
                black_box(processor.process_block(black_box(&input), &mut output, &params));
            });
        });
    }

    group.finish();
}

fn bench_f32_wire(c: &mut Criterion) {
    let input: Vec<f32> = stereo_block().iter().map(|&s| s as f32 / 32768.0).collect();
    let mut output = vec![0.0f32; FRAMES * 2];
    let mut processor = BlockProcessor::new(SAMPLE_RATE, 2, 2);
    let params = Parameters {
        effect: EffectKind::Reverb,
        ..Parameters::default()
    };

    c.bench_function("reverb_block_f32_wire", |b| {
        b.iter(|| {
            black_box(processor.process_block(black_box(&input), &mut output, &params));
        });
    });
}

criterion_group!(benches, bench_effect_block, bench_f32_wire);
criterion_main!(benches);
