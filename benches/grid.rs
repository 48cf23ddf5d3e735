use criterion::{criterion_group, criterion_main, Criterion};

use adaptir::channels::{Channel, Resonance, Shape};
use adaptir::grid::{Grid, GridMode};
use adaptir::process::{Cuts, Dimension, Particle, ProcessSampler};

use rand_pcg::Pcg64;

fn peak(x: f64) -> f64 {
    ((x - 5.0).powi(2) + 0.01).recip()
}

fn benchmark_grid(budget: usize) {
    let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
    let mut grid = Grid::new(vec![0.0], vec![10.0], budget, GridMode::Cumulant);

    for i in 0..100_000 {
        let value = grid
            .generate(&mut rng)
            .map(|weight| weight * peak(grid.point()[0]))
            .unwrap_or(0.0);
        grid.update(value);

        if i % 100 == 99 {
            grid.adapt();
        }
    }
}

fn benchmark_process() {
    let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
    let z = Channel::new(
        Shape::BreitWigner,
        Resonance::new(91.19, 2.5),
        0.0,
        250_000.0,
    );
    let mut sampler = ProcessSampler::new(
        500.0,
        vec![
            Particle::resonance(Dimension::Channel(z), 0.0, 0.0),
            Particle::stable(0.0),
            Particle::stable(0.0),
        ],
        Cuts::none(),
    )
    .unwrap();

    for _ in 0..100_000 {
        let _ = sampler.generate(&mut rng);
    }
}

fn criterion_grid_benchmark(c: &mut Criterion) {
    c.bench_function("grid_1_bin", |b| b.iter(|| benchmark_grid(1)));
    c.bench_function("grid_500_bins", |b| b.iter(|| benchmark_grid(500)));
    c.bench_function("process_resonance", |b| b.iter(benchmark_process));
}

criterion_group!(benches, criterion_grid_benchmark);
criterion_main!(benches);
