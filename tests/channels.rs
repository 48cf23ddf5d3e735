use adaptir::channels::{Channel, Resonance, Shape};
use adaptir::core::estimators::{BasicEstimators, CrossSectionEstimator, Updateable};

use assert_approx_eq::assert_approx_eq;
use rand_pcg::Pcg64;

fn rng() -> Pcg64 {
    Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
}

#[test]
fn uniform_channel() {
    let mut rng = rng();
    let mut channel = Channel::<f64>::uniform(0.0, 10.0);
    let mut values = CrossSectionEstimator::<f64>::default();

    for _ in 0..100_000 {
        let weight = channel.generate(&mut rng).unwrap();

        assert_approx_eq!(weight, 10.0);
        assert_approx_eq!(channel.fast_weight(), 10.0);
        values.update(channel.value());
    }

    assert!((values.mean() - 5.0).abs() < 5.0 * values.std());
    assert_approx_eq!(values.mean(), 5.0, 0.05);
}

#[test]
fn breit_wigner_channel() {
    let mut rng = rng();
    let (mass, width) = (91.19, 2.5);
    let mut channel = Channel::new(
        Shape::BreitWigner,
        Resonance::new(mass, width),
        0.0,
        10_000.0,
    );

    let bins = 100;
    let bin_width = 10_000.0 / f64::from(bins);
    let mut histogram = vec![0_usize; bins as usize];
    let mut weights = CrossSectionEstimator::default();

    for _ in 0..1_000_000 {
        let weight = channel.generate(&mut rng).unwrap();
        let s = channel.value();

        assert!((0.0..=10_000.0).contains(&s));

        let index = ((s / bin_width) as usize).min(bins as usize - 1);
        histogram[index] += 1;
        weights.update(weight);
    }

    let peak = histogram
        .iter()
        .enumerate()
        .max_by_key(|&(_, &entries)| entries)
        .map(|(index, _)| (index as f64 + 0.5) * bin_width)
        .unwrap();

    assert!((peak - mass * mass).abs() <= bin_width);

    // the weights integrate the constant one over the domain
    let norm = channel.max_cumulant() - channel.min_cumulant();
    assert_approx_eq!(channel.norm(), norm.abs());
    assert!((weights.mean() - 10_000.0).abs() < 5.0 * weights.std());
}

#[test]
fn round_trip() {
    let channels = vec![
        Channel::uniform(-3.0, 7.0),
        Channel::new(
            Shape::BreitWigner,
            Resonance::new(80.4, 2.1),
            1000.0,
            20_000.0,
        ),
        Channel::new(
            Shape::PowerLaw { nu: 0.5 },
            Resonance::massless(),
            1.0,
            100.0,
        ),
        Channel::new(
            Shape::PowerLaw { nu: 1.0 },
            Resonance::stable(10.0),
            200.0,
            900.0,
        ),
        Channel::new(
            Shape::PowerLaw { nu: 2.5 },
            Resonance::stable(10.0),
            0.0,
            50.0,
        ),
    ];

    for channel in &channels {
        assert!(channel.normalisable());

        for i in 1..100 {
            let r = f64::from(i) / 100.0;
            let x = channel.map(r);

            assert!(x >= channel.lower() && x <= channel.upper());
            assert_approx_eq!(channel.inverse_map(x), r, 1e-9);
            assert_approx_eq!(channel.map(channel.inverse_map(x)), x, 1e-9 * x.abs().max(1.0));
        }
    }
}

#[test]
fn refreshed_parameters_are_used() {
    let mut rng = rng();
    let mut channel = Channel::new(Shape::BreitWigner, Resonance::massless(), 0.0, 100.0);

    assert!(!channel.normalisable());
    assert!(channel.generate(&mut rng).is_err());

    channel.refresh_params(Resonance::new(5.0, 1.0));
    assert!(channel.normalisable());
    assert!(channel.generate(&mut rng).is_ok());

    channel.refresh_upper_bound(-1.0);
    assert!(!channel.normalisable());
}
