use adaptir::callbacks::SimpleCumulativeCallback;
use adaptir::channels::{Channel, Resonance, Shape};
use adaptir::config::GeneratorConfig;
use adaptir::integrators::{MultiChannel, Unweighter};
use adaptir::process::{Cuts, Dimension, Particle, PhaseSpacePoint, ProcessSampler};

const E_CM: f64 = 500.0;
const Z_MASS: f64 = 91.19;
const Z_WIDTH: f64 = 2.5;

/// A toy matrix element for $e^+ e^- \to Z(\to \mu^+ \mu^-) \gamma$: a Breit-Wigner resonance in
/// the invariant mass of the muon pair times $1 + \cos^2 \theta$ of the photon.
fn matrix_element(point: &PhaseSpacePoint<f64>) -> f64 {
    let s = point.invariants()[0];
    let photon = point.momenta()[2];
    let cos_theta = photon[3] / photon[0];

    (1.0 + cos_theta * cos_theta) * 1e6
        / ((s - Z_MASS * Z_MASS).powi(2) + (Z_MASS * Z_WIDTH).powi(2))
}

fn sampler(dimension: Dimension<f64>, config: &GeneratorConfig) -> ProcessSampler<f64> {
    ProcessSampler::new(
        E_CM,
        vec![
            Particle::resonance(dimension, 0.106, 0.106),
            Particle::stable(0.0),
        ],
        // photons softer than 1 GeV and collinear pairs are cut
        Cuts::new(1.0, 25.0),
    )
    .unwrap()
    .with_config(config)
}

fn main() {
    env_logger::init();

    let config = GeneratorConfig::from_json(
        r#"{ "seed": 1234, "iterations": 8, "batch": 5000, "adaptation_batch": 50, "bin_budget": 64 }"#,
    )
    .unwrap();
    let mut rng = config.rng();

    let z = Channel::new(
        Shape::BreitWigner,
        Resonance::new(Z_MASS, Z_WIDTH),
        0.0,
        E_CM * E_CM,
    );
    let flat = config.grid(vec![0.0], vec![E_CM * E_CM]);
    let shaped = config.shaped_grid(&z).unwrap();

    let mut generator: MultiChannel<_, fn(&PhaseSpacePoint<f64>) -> f64, _> = MultiChannel::new();
    generator.push(sampler(Dimension::Channel(z), &config), matrix_element);
    generator.push(sampler(Dimension::grid(flat), &config), matrix_element);
    generator.push(sampler(Dimension::grid(shaped), &config), matrix_element);

    generator.initialise_with(&config, &mut rng, &SimpleCumulativeCallback {});

    for _ in 0..200_000 {
        let _ = generator.generate_event(&mut rng);
    }

    println!("\n--------------------------------------");
    println!("Final result: {}", generator.cross_section());
    println!("Direct estimate: {}", generator.direct_cross_section());

    for (index, (xs, process)) in generator
        .process_cross_sections()
        .into_iter()
        .zip(generator.processes())
        .enumerate()
    {
        println!("[channel {}]: {} with alpha {:.4}", index, xs, process.alpha());
    }

    let max_weight = generator
        .reduced_max_weight(config.max_weight_reduction)
        .unwrap_or(1.0);
    let mut unweighter = Unweighter::new(max_weight);

    for _ in 0..1000 {
        generator.next_unweighted_event(&mut unweighter, &mut rng);
    }

    println!(
        "\n1000 unweighted events with maximum weight {:.6e}: efficiency {:.4}, {} overweight",
        max_weight,
        unweighter.efficiency(),
        unweighter.overweight()
    );
}
