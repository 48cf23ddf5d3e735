use adaptir::callbacks::SinkCallback;
use adaptir::channels::{Channel, Resonance, Shape};
use adaptir::core::estimators::{CrossSection, Estimators};
use adaptir::grid::{Grid, GridMode};
use adaptir::integrators::{MultiChannel, Unweighter};
use adaptir::process::{rambo, Cuts, Dimension, Particle, PhaseSpacePoint, ProcessSampler};

use assert_approx_eq::assert_approx_eq;
use rand_pcg::Pcg64;
use std::f64::consts::PI;

fn rng() -> Pcg64 {
    Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
}

type Generator = MultiChannel<ProcessSampler<f64>, fn(&PhaseSpacePoint<f64>) -> f64, f64>;

/// Angular distribution $1 + \cos^2 \theta$ of a massless pair.
fn angular(point: &PhaseSpacePoint<f64>) -> f64 {
    let p = point.momenta()[0];
    let cos_theta = p[3] / p[0];
    1.0 + cos_theta * cos_theta
}

/// A resonance in the invariant mass of the first two particles.
fn resonant(point: &PhaseSpacePoint<f64>) -> f64 {
    let s = point.invariants()[0];
    let (mass, width) = (91.19_f64, 2.5);
    1e6 / ((s - mass * mass).powi(2) + (mass * width).powi(2))
}

fn pair() -> ProcessSampler<f64> {
    ProcessSampler::new(
        200.0,
        vec![Particle::stable(0.0), Particle::stable(0.0)],
        Cuts::none(),
    )
    .unwrap()
}

#[test]
fn unweighting_ratio() {
    let mut rng = rng();
    let mut generator: Generator = MultiChannel::new();
    generator.push(pair(), angular);

    let max_weight = 2.0 / (8.0 * PI);
    let mut unweighter = Unweighter::new(max_weight);
    let events = 100_000;

    for _ in 0..events {
        let weight = generator.generate_event(&mut rng).unwrap();
        assert!(weight <= max_weight * (1.0 + 1e-12));
        unweighter.accept(weight, &mut rng);
    }

    let xs = generator.cross_section();
    assert!((xs.value() - 4.0 / (3.0 * 8.0 * PI)).abs() < 5.0 * xs.error());

    let expected = xs.value() / max_weight;
    let sigma = (expected * (1.0 - expected) / f64::from(events)).sqrt();

    assert_eq!(unweighter.trials(), 100_000);
    assert!((unweighter.efficiency() - expected).abs() < 5.0 * sigma);
    assert_eq!(unweighter.overweight(), 0);
}

#[test]
fn misses_count_as_trials() {
    let mut rng = rng();
    let e_cm = 100.0;
    let massless = || Particle::stable(0.0);
    let sampler = ProcessSampler::new(
        e_cm,
        vec![massless(), massless(), massless()],
        Cuts::new(20.0, 0.0),
    )
    .unwrap();

    let mut generator: Generator = MultiChannel::new();
    generator.push(sampler, |_| 1.0);

    // every point that passes the cuts has the flat three-body weight
    let max_weight = rambo::massless_volume(3, e_cm * e_cm);
    let mut unweighter = Unweighter::new(max_weight * (1.0 + 1e-9));

    for _ in 0..20_000 {
        assert_eq!(generator.next_unweighted_event(&mut unweighter, &mut rng), Some(0));
    }

    assert_eq!(unweighter.accepted(), 20_000);
    assert_eq!(unweighter.trials(), generator.events());
    assert!(unweighter.trials() > 25_000);

    let xs = generator.cross_section();
    assert_approx_eq!(unweighter.efficiency(), xs.value() / max_weight, 1e-6);
}

#[test]
fn error_law() {
    let a = CrossSection::<f64>::new(1.0, 0.3, 0.01);
    let b = CrossSection::new(2.0, 0.4, 0.02);
    let sum = a + b;

    assert_approx_eq!(sum.value(), 3.0);
    assert_approx_eq!(sum.error(), 0.5);

    let mut generator: Generator = MultiChannel::new();
    generator.push(pair(), angular);
    generator.push(pair(), angular);

    let mut rng = rng();

    for _ in 0..10_000 {
        generator.generate_event(&mut rng).unwrap();
    }

    let parts = generator.process_cross_sections();
    let total = generator.cross_section();

    assert_approx_eq!(total.value(), parts[0].value() + parts[1].value());
    assert_approx_eq!(
        total.error(),
        (parts[0].error().powi(2) + parts[1].error().powi(2)).sqrt()
    );
}

#[test]
fn adaptive_resonance() {
    let mut rng = rng();
    let e_cm = 500.0;
    let channel = Channel::new(
        Shape::BreitWigner,
        Resonance::new(91.19, 2.5),
        0.0,
        e_cm * e_cm,
    );

    // the same final state sampled with an adaptive grid and with a fixed channel, both following
    // the Breit-Wigner shape
    let grid = Grid::with_shape(&channel, 200, GridMode::Cumulant).unwrap();
    let adaptive = ProcessSampler::new(
        e_cm,
        vec![
            Particle::resonance(Dimension::grid(grid), 0.0, 0.0),
            Particle::stable(0.0),
        ],
        Cuts::none(),
    )
    .unwrap();
    let fixed = ProcessSampler::new(
        e_cm,
        vec![
            Particle::resonance(Dimension::Channel(channel), 0.0, 0.0),
            Particle::stable(0.0),
        ],
        Cuts::none(),
    )
    .unwrap();

    let mut generator: Generator = MultiChannel::new();
    generator.push(adaptive, resonant);
    generator.push(fixed, resonant);
    generator.set_adaptation_batch(40);

    let checkpoints = generator.initialise(10, 2000, &mut rng, &SinkCallback {});
    assert_eq!(checkpoints.len(), 10);

    for checkpoint in &checkpoints {
        assert_eq!(checkpoint.estimators().calls(), 4000);
        assert_approx_eq!(checkpoint.alphas().iter().sum::<f64>(), 1.0);
    }

    // about 20000 events of the adaptive sub-process, adapted every 40 of them
    match &generator.process(0).sampler().particles()[0] {
        Particle::Resonance {
            dimension: Dimension::Grid { grid, .. },
            ..
        } => {
            assert!(grid.is_final());
            assert_eq!(grid.leaf_count(), 200);
        }
        _ => unreachable!(),
    }

    generator.enable_max_weight_histogram(1000);

    let accepted = (0..50_000)
        .filter(|_| generator.generate_event(&mut rng).is_ok())
        .count();

    assert_eq!(generator.events(), 50_000);
    assert!(accepted > 49_900);

    // both sub-processes estimate the same cross section
    let parts = generator.process_cross_sections();
    let difference = (parts[0].value() - parts[1].value()).abs();
    assert!(difference < 5.0 * parts[0].error().hypot(parts[1].error()));

    let total = generator.cross_section();
    let stratified = generator.integrate(25_000, &mut rng);
    let tolerance = 5.0 * total.error().hypot(stratified.error());
    assert!((total.value() - stratified.value()).abs() < tolerance);

    let histogram = generator.max_weight_histogram().unwrap();
    assert_eq!(histogram.entries(), accepted);

    let reduced = generator.reduced_max_weight(0.01).unwrap();
    assert!(reduced > 0.0 && reduced <= histogram.largest());
}
