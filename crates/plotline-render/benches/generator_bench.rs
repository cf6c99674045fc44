//! Benchmarks for instruction generation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use plotline_compute::{ComputedSet, Plotter};
use plotline_core::{Color, InstanceId, ScaleType, Timeframe, VisibleRange};
use plotline_render::{GeneratorInput, InstructionGenerator};

const M: i64 = 60_000;

fn generate_candle_set(count: usize) -> ComputedSet {
    let mut set = ComputedSet::new();
    let mut price = 100.0_f64;

    for i in 0..count {
        // A somewhat realistic price movement with trends
        let trend = (i as f64 * 0.01).sin() * 10.0;
        let volatility = (i as f64 * 0.1).sin() * 2.0;

        let open = price;
        let close = (open + trend * 0.01 + volatility).max(1.0);
        let high = open.max(close) + volatility.abs() * 0.5;
        let low = open.min(close) - (volatility.abs() * 0.5).max(0.1);

        let mut plot = Plotter::new(i as i64 * M, &mut set);
        plot.plot_candle_labeled(open, high, low, close, Color::GREEN, Color::GREEN);
        plot.plot_line((open + close) / 2.0, Color::BLUE, 1.0);

        price = close;
    }

    set
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let generator = InstructionGenerator::default();

    for size in [100, 500, 1000, 5000].iter() {
        let sets: Vec<ComputedSet> = (0..4).map(|_| generate_candle_set(*size)).collect();

        for scale in [ScaleType::Default, ScaleType::Percent] {
            let input = GeneratorInput {
                sets: sets
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (InstanceId(i as u64), s))
                    .collect(),
                range: VisibleRange::new(0, *size as i64 * M, 50.0, 150.0),
                scale,
                timeframe: Timeframe::MIN1,
                pixels_per_element: 1200.0 / *size as f64,
                width: 1200.0,
                height: 600.0,
            };

            group.throughput(Throughput::Elements(*size as u64 * 4));
            group.bench_with_input(
                BenchmarkId::new(format!("{scale:?}"), size),
                &input,
                |b, input| b.iter(|| generator.generate(black_box(input))),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_generate);
criterion_main!(benches);
