//! Phase-space sampler for a single sub-process $e^+ e^- \to X_1 \ldots X_n$.
//!
//! The final state consists of stable particles and resonances, each of which decays isotropically
//! into two stable daughters. The weight of a point is
//!
//! $$ w = w_s \prod_{r} \frac{w_r}{2\pi} \, w_\mathrm{RAMBO} \prod_r \Phi_2(s_r; m_{r,1}, m_{r,2})
//! \, , $$
//!
//! where $w_s$ is the weight of the optionally sampled partonic energy, $w_r$ are the weights of
//! the invariant masses $s_r$ of the resonances, $w_\mathrm{RAMBO}$ is the flat weight of the
//! top-level final state and $\Phi_2 = \lambda^{1/2}(s_r, m_{r,1}^2, m_{r,2}^2) / (8 \pi s_r)$
//! the two-body phase space of each decay.
mod cuts;
mod dimension;
pub mod rambo;

pub use cuts::Cuts;
pub use dimension::Dimension;

use crate::config::GeneratorConfig;
use crate::core::{lit, uniform, Miss, Real, Sampler};
use crate::kinematics::{add, boost, kallen, FourVector};
use log::{trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance of [`ProcessSampler::check_consistency`] unless set otherwise.
const DEFAULT_DRIFT_TOLERANCE: f64 = 1e-8;

/// Errors that occur when a process sampler is constructed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProcessError {
    /// The final state has fewer than two particles.
    #[error("a final state needs at least two particles, got {0}")]
    TooFewParticles(usize),
    /// A mass is negative or not finite.
    #[error("the mass {0} is not valid")]
    InvalidMass(f64),
    /// The collider energy cannot produce the final state.
    #[error("the energy {energy} is below the threshold {threshold}")]
    BelowThreshold {
        /// The collider energy.
        energy: f64,
        /// The sum of the smallest possible final-state masses.
        threshold: f64,
    },
}

/// A particle of the final state.
#[derive(Clone, Debug)]
pub enum Particle<T: Real> {
    /// A particle with a fixed mass.
    Stable {
        /// The mass.
        mass: T,
    },
    /// A particle whose invariant mass squared is sampled and which decays into two stable
    /// particles.
    Resonance {
        /// The sampler of the invariant mass squared.
        dimension: Dimension<T>,
        /// The masses of the two daughters.
        daughters: (T, T),
    },
}

impl<T: Real> Particle<T> {
    /// A particle with mass `mass`.
    pub fn stable(mass: T) -> Self {
        Self::Stable { mass }
    }

    /// A resonance whose invariant mass squared is sampled by `dimension` and which decays into
    /// particles with the masses `first` and `second`.
    pub fn resonance(dimension: Dimension<T>, first: T, second: T) -> Self {
        Self::Resonance {
            dimension,
            daughters: (first, second),
        }
    }

    /// Returns the smallest mass this particle can have.
    pub fn min_mass(&self) -> T {
        match self {
            Self::Stable { mass } => *mass,
            Self::Resonance { daughters, .. } => daughters.0 + daughters.1,
        }
    }

    /// Returns the number of final-state momenta this particle contributes.
    pub fn multiplicity(&self) -> usize {
        match self {
            Self::Stable { .. } => 1,
            Self::Resonance { .. } => 2,
        }
    }
}

/// A point in phase space: the partonic energy squared, the momenta of the incoming and outgoing
/// particles and the invariant masses squared of the top-level final-state particles.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PhaseSpacePoint<T> {
    s: T,
    incoming: [FourVector<T>; 2],
    momenta: Vec<FourVector<T>>,
    invariants: Vec<T>,
}

impl<T: Real> PhaseSpacePoint<T> {
    /// Constructor. The incoming momenta are those of massless beams along the $z$-axis with the
    /// energy squared `s`.
    pub fn new(s: T, momenta: Vec<FourVector<T>>, invariants: Vec<T>) -> Self {
        let half = s.sqrt() / lit::<T>(2.0);

        Self {
            s,
            incoming: [
                [half, T::zero(), T::zero(), half],
                [half, T::zero(), T::zero(), -half],
            ],
            momenta,
            invariants,
        }
    }

    /// Returns the partonic energy squared.
    pub fn s(&self) -> T {
        self.s
    }

    /// Returns the momenta of the incoming particles.
    pub fn incoming(&self) -> &[FourVector<T>; 2] {
        &self.incoming
    }

    /// Returns the momenta of the stable outgoing particles, where resonances are replaced by their
    /// daughters.
    pub fn momenta(&self) -> &[FourVector<T>] {
        &self.momenta
    }

    /// Returns the invariant masses squared of the top-level final-state particles.
    pub fn invariants(&self) -> &[T] {
        &self.invariants
    }
}

/// Samples the phase space of a single sub-process.
#[derive(Clone, Debug)]
pub struct ProcessSampler<T: Real> {
    e_cm: T,
    energy: Option<Dimension<T>>,
    particles: Vec<Particle<T>>,
    cuts: Cuts<T>,
    drift_tolerance: T,
    point: PhaseSpacePoint<T>,
    weight: T,
}

impl<T: Real> ProcessSampler<T> {
    /// Constructs a sampler for the production of `particles` at the collider energy `e_cm`.
    pub fn new(e_cm: T, particles: Vec<Particle<T>>, cuts: Cuts<T>) -> Result<Self, ProcessError> {
        if particles.len() < 2 {
            return Err(ProcessError::TooFewParticles(particles.len()));
        }

        for particle in &particles {
            let masses = match particle {
                Particle::Stable { mass } => [*mass, T::zero()],
                Particle::Resonance { daughters, .. } => [daughters.0, daughters.1],
            };

            for &mass in &masses {
                if !(mass.is_finite() && mass >= T::zero()) {
                    return Err(ProcessError::InvalidMass(
                        mass.to_f64().unwrap_or(f64::NAN),
                    ));
                }
            }
        }

        let threshold = particles
            .iter()
            .fold(T::zero(), |acc, particle| acc + particle.min_mass());

        if !(e_cm > threshold) {
            return Err(ProcessError::BelowThreshold {
                energy: e_cm.to_f64().unwrap_or(f64::NAN),
                threshold: threshold.to_f64().unwrap_or(f64::NAN),
            });
        }

        let momenta = particles.iter().map(Particle::multiplicity).sum();

        Ok(Self {
            e_cm,
            energy: None,
            particles,
            cuts,
            drift_tolerance: lit(DEFAULT_DRIFT_TOLERANCE),
            point: PhaseSpacePoint::new(
                e_cm * e_cm,
                vec![[T::nan(); 4]; momenta],
                Vec::new(),
            ),
            weight: T::zero(),
        })
    }

    /// Samples the partonic energy squared with `dimension` between the threshold and the square
    /// of the collider energy, instead of keeping it fixed.
    pub fn with_energy(mut self, dimension: Dimension<T>) -> Self {
        self.energy = Some(dimension);
        self
    }

    /// Sets the relative tolerance of [`ProcessSampler::check_consistency`].
    pub fn with_drift_tolerance(mut self, tolerance: T) -> Self {
        self.drift_tolerance = tolerance;
        self
    }

    /// Takes the drift tolerance from `config`.
    pub fn with_config(self, config: &GeneratorConfig) -> Self {
        self.with_drift_tolerance(lit(config.drift_tolerance))
    }

    /// Returns the relative tolerance of [`ProcessSampler::check_consistency`].
    pub fn drift_tolerance(&self) -> T {
        self.drift_tolerance
    }

    /// Returns the collider energy.
    pub fn e_cm(&self) -> T {
        self.e_cm
    }

    /// Returns the particles of the final state.
    pub fn particles(&self) -> &[Particle<T>] {
        &self.particles
    }

    /// Returns the cuts.
    pub fn cuts(&self) -> &Cuts<T> {
        &self.cuts
    }

    /// Returns the weight of the point generated last.
    pub fn weight(&self) -> T {
        self.weight
    }

    fn threshold(&self) -> T {
        self.particles
            .iter()
            .fold(T::zero(), |acc, particle| acc + particle.min_mass())
    }

    /// Returns the allowed range of the invariant mass squared of the particle `index`, given the
    /// masses of all previous particles in `masses`. The range is empty if the previous particles
    /// already use up too much of the energy.
    fn mass2_bounds(&self, index: usize, e_partonic: T, masses: &[T]) -> Option<(T, T)> {
        let previous = masses.iter().fold(T::zero(), |acc, &mass| acc + mass);
        let following = self.particles[index + 1..]
            .iter()
            .fold(T::zero(), |acc, particle| acc + particle.min_mass());
        let lower = self.particles[index].min_mass();
        let upper = e_partonic - previous - following;

        if upper > lower {
            Some((lower * lower, upper * upper))
        } else {
            None
        }
    }

    /// Generates a new phase-space point and returns its weight.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        let two_pi = T::PI() + T::PI();
        let threshold = self.threshold();
        let s_max = self.e_cm * self.e_cm;
        let mut weight = T::one();

        let s = if let Some(energy) = &mut self.energy {
            energy.refresh_bounds(threshold * threshold, s_max);
            weight *= energy.generate(rng)?;
            energy.value()
        } else {
            s_max
        };

        if !(s > threshold * threshold) {
            trace!("partonic energy squared {} is below the threshold", s);
            return Err(Miss::Infeasible);
        }

        let e_partonic = s.sqrt();
        let mut masses = Vec::with_capacity(self.particles.len());
        let mut invariants = Vec::with_capacity(self.particles.len());

        for index in 0..self.particles.len() {
            let bounds = self.mass2_bounds(index, e_partonic, &masses);

            let (mass, s_r) = match &mut self.particles[index] {
                Particle::Stable { mass } => (*mass, *mass * *mass),
                Particle::Resonance { dimension, .. } => {
                    let (lower, upper) = bounds.ok_or(Miss::Infeasible)?;
                    dimension.refresh_bounds(lower, upper);
                    weight *= dimension.generate(rng)? / two_pi;
                    let s_r = dimension.value();
                    (s_r.sqrt(), s_r)
                }
            };

            masses.push(mass);
            invariants.push(s_r);
        }

        let (top, flat) = rambo::generate(e_partonic, &masses, rng)?;
        weight *= flat;

        let mut momenta = Vec::with_capacity(self.point.momenta.len());

        for ((particle, p), (&mass, &s_r)) in self
            .particles
            .iter()
            .zip(&top)
            .zip(masses.iter().zip(&invariants))
        {
            match particle {
                Particle::Stable { .. } => momenta.push(*p),
                Particle::Resonance { daughters, .. } => {
                    weight *= two_body_volume(s_r, *daughters)?;
                    let (first, second) = decay(p, mass, *daughters, rng);
                    momenta.push(first);
                    momenta.push(second);
                }
            }
        }

        if !self.cuts.passes(&momenta) {
            trace!("point did not pass the cuts");
            return Err(Miss::Cut);
        }

        if !(weight.is_finite() && weight > T::zero()) {
            return Err(Miss::Infeasible);
        }

        self.point = PhaseSpacePoint::new(s, momenta, invariants);
        self.weight = weight;

        Ok(weight)
    }

    /// Recomputes the weight `generate` assigns to `point`.
    pub fn evaluate_weight(&mut self, point: &PhaseSpacePoint<T>) -> Result<T, Miss> {
        let two_pi = T::PI() + T::PI();
        let threshold = self.threshold();
        let s_max = self.e_cm * self.e_cm;
        let s = point.s;
        let mut weight = T::one();

        if let Some(energy) = &mut self.energy {
            energy.refresh_bounds(threshold * threshold, s_max);
            weight *= energy.weight(s)?;
        } else if s != s_max {
            return Err(Miss::OutOfDomain);
        }

        if !(s > threshold * threshold) {
            return Err(Miss::Infeasible);
        }

        let multiplicity: usize = self.particles.iter().map(Particle::multiplicity).sum();

        if point.invariants.len() != self.particles.len() || point.momenta.len() != multiplicity {
            return Err(Miss::OutOfDomain);
        }

        let e_partonic = s.sqrt();
        let mut masses = Vec::with_capacity(self.particles.len());

        for (index, &s_r) in point.invariants.iter().enumerate() {
            let bounds = self.mass2_bounds(index, e_partonic, &masses);

            let mass = match &mut self.particles[index] {
                Particle::Stable { mass } => *mass,
                Particle::Resonance { dimension, .. } => {
                    let (lower, upper) = bounds.ok_or(Miss::Infeasible)?;
                    dimension.refresh_bounds(lower, upper);
                    weight *= dimension.weight(s_r)? / two_pi;
                    s_r.sqrt()
                }
            };

            masses.push(mass);
        }

        let mut top = Vec::with_capacity(self.particles.len());
        let mut outgoing = point.momenta.iter();

        for (particle, &s_r) in self.particles.iter().zip(&point.invariants) {
            let p = outgoing.next().ok_or(Miss::OutOfDomain)?;

            match particle {
                Particle::Stable { .. } => top.push(*p),
                Particle::Resonance { daughters, .. } => {
                    let q = outgoing.next().ok_or(Miss::OutOfDomain)?;
                    weight *= two_body_volume(s_r, *daughters)?;
                    top.push(add(p, q));
                }
            }
        }

        weight *= rambo::massless_volume(top.len(), s);

        if masses.iter().any(|&mass| mass > T::zero()) {
            weight *= rambo::massive_factor(&top, e_partonic);
        }

        if !self.cuts.passes(&point.momenta) {
            return Err(Miss::Cut);
        }

        if weight.is_finite() && weight > T::zero() {
            Ok(weight)
        } else {
            Err(Miss::Infeasible)
        }
    }

    /// Re-evaluates the weight of the point generated last and compares it with the weight it was
    /// generated with. A relative difference larger than the drift tolerance is logged and makes
    /// this function return `false`.
    pub fn check_consistency(&mut self) -> bool {
        let point = self.point.clone();
        let generated = self.weight;

        let tolerance = self.drift_tolerance * generated.abs();

        match self.evaluate_weight(&point) {
            Ok(evaluated) if (evaluated - generated).abs() <= tolerance => true,
            Ok(evaluated) => {
                warn!(
                    "weight drift: generated {} but evaluated {} for the same point",
                    generated, evaluated
                );
                false
            }
            Err(miss) => {
                warn!("generated point with weight {} evaluates to a miss: {}", generated, miss);
                false
            }
        }
    }

    /// Passes `value` to every adaptive dimension.
    pub fn update(&mut self, value: T) {
        if let Some(energy) = &mut self.energy {
            energy.update(value);
        }

        for particle in &mut self.particles {
            if let Particle::Resonance { dimension, .. } = particle {
                dimension.update(value);
            }
        }
    }

    /// Adapts every adaptive dimension.
    pub fn adapt(&mut self) {
        if let Some(energy) = &mut self.energy {
            energy.adapt();
        }

        for particle in &mut self.particles {
            if let Particle::Resonance { dimension, .. } = particle {
                dimension.adapt();
            }
        }
    }

    /// Returns the point generated last.
    pub fn point(&self) -> &PhaseSpacePoint<T> {
        &self.point
    }
}

impl<T: Real> Sampler<T> for ProcessSampler<T> {
    type Point = PhaseSpacePoint<T>;

    fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        ProcessSampler::generate(self, rng)
    }

    fn point(&self) -> &PhaseSpacePoint<T> {
        &self.point
    }

    fn evaluate_weight(&mut self, point: &PhaseSpacePoint<T>) -> Result<T, Miss> {
        ProcessSampler::evaluate_weight(self, point)
    }

    fn update(&mut self, value: T) {
        ProcessSampler::update(self, value);
    }

    fn adapt(&mut self) {
        ProcessSampler::adapt(self);
    }
}

/// Two-body phase space $\lambda^{1/2}(s, m_1^2, m_2^2) / (8 \pi s)$.
fn two_body_volume<T: Real>(s: T, daughters: (T, T)) -> Result<T, Miss> {
    let (m1, m2) = daughters;
    let lambda = kallen(s, m1 * m1, m2 * m2);

    if lambda > T::zero() {
        Ok(lambda.sqrt() / (lit::<T>(8.0) * T::PI() * s))
    } else {
        Err(Miss::Infeasible)
    }
}

/// Decays `parent` with mass `mass` isotropically into two particles with the masses `daughters`.
fn decay<T: Real, R: Rng + ?Sized>(
    parent: &FourVector<T>,
    mass: T,
    daughters: (T, T),
    rng: &mut R,
) -> (FourVector<T>, FourVector<T>) {
    let (m1, m2) = daughters;
    let two = lit::<T>(2.0);
    let k = kallen(mass * mass, m1 * m1, m2 * m2).max(T::zero()).sqrt() / (two * mass);

    let cos_theta = two * uniform::<T, _>(rng) - T::one();
    let sin_theta = (T::one() - cos_theta * cos_theta).max(T::zero()).sqrt();
    let (sin_phi, cos_phi) = ((T::PI() + T::PI()) * uniform::<T, _>(rng)).sin_cos();
    let n = [sin_theta * cos_phi, sin_theta * sin_phi, cos_theta];

    let first = [(m1 * m1 + k * k).sqrt(), k * n[0], k * n[1], k * n[2]];
    let second = [(m2 * m2 + k * k).sqrt(), -k * n[0], -k * n[1], -k * n[2]];

    (boost(&first, parent, mass), boost(&second, parent, mass))
}
