//! One-dimensional channels, which map a uniform random number onto a physical value, for example
//! an invariant mass squared, using the inversion method.
//!
//! A channel is defined by its [`Shape`], the [`Resonance`] parameters read from the model and the
//! bounds of its domain, $[a, b]$. From these it derives the cumulants $C(a)$ and $C(b)$ of its
//! density, and the normalisation $N = |C(b) - C(a)|$. A channel with $N = 0$ (or a non-finite
//! $N$) is *not normalisable* and refuses to generate.
mod density;
mod pairs;

pub use density::{Density, Side};
pub use pairs::{pair_rule, PairRule};

use crate::core::{uniform, Miss, Real, Sampler};
use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The kind of a channel, which is used to look up the rule that integrates a pair of channels.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ChannelKind {
    /// Flat sampling.
    Uniform,
    /// Sampling of a Breit-Wigner resonance.
    BreitWigner,
    /// Sampling of a power law.
    PowerLaw,
    /// Dirac delta for on-shell particles.
    OnShell,
}

/// The shape of the density a channel samples from.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum Shape<T> {
    /// Constant density.
    Uniform,
    /// $1 / ((s - m^2)^2 + m^2 \Gamma^2)$, which needs both mass and width of the resonance.
    BreitWigner,
    /// $1 / |s - m^2|^\nu$, where a missing mass means a pole at zero.
    PowerLaw {
        /// The exponent $\nu$.
        nu: T,
    },
    /// Always returns $m^2$ with weight one, if it is inside of the domain.
    OnShell,
}

impl<T> Shape<T> {
    /// Returns the kind of this shape.
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Uniform => ChannelKind::Uniform,
            Self::BreitWigner => ChannelKind::BreitWigner,
            Self::PowerLaw { .. } => ChannelKind::PowerLaw,
            Self::OnShell => ChannelKind::OnShell,
        }
    }
}

/// Mass and width of a particle as provided by the model. `None` means massless or without width.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Resonance<T> {
    /// The mass of the particle.
    pub mass: Option<T>,
    /// The width of the particle.
    pub width: Option<T>,
}

impl<T> Resonance<T> {
    /// A particle with both mass and width.
    pub const fn new(mass: T, width: T) -> Self {
        Self {
            mass: Some(mass),
            width: Some(width),
        }
    }

    /// A particle with a mass, but without width.
    pub const fn stable(mass: T) -> Self {
        Self {
            mass: Some(mass),
            width: None,
        }
    }

    /// A massless particle.
    pub const fn massless() -> Self {
        Self {
            mass: None,
            width: None,
        }
    }
}

/// A one-dimensional sampler using the inversion method.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Channel<T> {
    shape: Shape<T>,
    resonance: Resonance<T>,
    density: Density<T>,
    lower: T,
    upper: T,
    min_cumulant: T,
    max_cumulant: T,
    value: T,
}

impl<T: Real> Channel<T> {
    /// Constructs a channel sampling from `shape` in the domain from `lower` to `upper`, using the
    /// parameters of `resonance`.
    pub fn new(shape: Shape<T>, resonance: Resonance<T>, lower: T, upper: T) -> Self {
        let mut channel = Self {
            shape,
            resonance,
            density: Density::Degenerate,
            lower,
            upper,
            min_cumulant: T::zero(),
            max_cumulant: T::zero(),
            value: T::nan(),
        };
        channel.refresh();
        channel
    }

    /// Constructs a flat channel in the domain from `lower` to `upper`.
    pub fn uniform(lower: T, upper: T) -> Self {
        Self::new(Shape::Uniform, Resonance::massless(), lower, upper)
    }

    /// Re-reads mass and width. This must be called whenever the model parameters change.
    pub fn refresh_params(&mut self, resonance: Resonance<T>) {
        self.resonance = resonance;
        self.refresh();
    }

    /// Moves the lower bound of the domain to `lower`.
    pub fn refresh_lower_bound(&mut self, lower: T) {
        self.lower = lower;
        self.refresh();
    }

    /// Moves the upper bound of the domain to `upper`.
    pub fn refresh_upper_bound(&mut self, upper: T) {
        self.upper = upper;
        self.refresh();
    }

    /// Moves both bounds of the domain.
    pub fn refresh_bounds(&mut self, lower: T, upper: T) {
        self.lower = lower;
        self.upper = upper;
        self.refresh();
    }

    fn refresh(&mut self) {
        let mass = self.resonance.mass.unwrap_or_else(T::zero);
        let width = self.resonance.width.unwrap_or_else(T::zero);
        let mass2 = mass * mass;

        self.density = if !(self.lower <= self.upper) {
            Density::Degenerate
        } else {
            match self.shape {
                Shape::Uniform => Density::Uniform,
                Shape::BreitWigner if mass * width == T::zero() => Density::Degenerate,
                Shape::BreitWigner => Density::BreitWigner {
                    mass2,
                    mass_width: mass * width,
                },
                Shape::PowerLaw { nu } => Density::PowerLaw {
                    pole: mass2,
                    nu,
                    side: Side::of(mass2, self.lower, self.upper),
                },
                Shape::OnShell => Density::OnShell { mass2 },
            }
        };

        match self.density {
            Density::OnShell { mass2 } => {
                self.min_cumulant = T::zero();
                self.max_cumulant = if self.lower <= mass2 && mass2 <= self.upper {
                    T::one()
                } else {
                    T::zero()
                };
            }
            Density::PowerLaw { nu, side, .. } if side == Side::Across && nu >= T::one() => {
                // the integral over the pole diverges
                self.min_cumulant = T::neg_infinity();
                self.max_cumulant = T::infinity();
            }
            density => {
                self.min_cumulant = density.cdf(self.lower);
                self.max_cumulant = density.cdf(self.upper);
            }
        }
    }

    /// Returns the shape of this channel.
    pub fn shape(&self) -> &Shape<T> {
        &self.shape
    }

    /// Returns the kind of this channel.
    pub fn kind(&self) -> ChannelKind {
        self.shape.kind()
    }

    /// Returns the resonance parameters this channel was last refreshed with.
    pub fn resonance(&self) -> &Resonance<T> {
        &self.resonance
    }

    /// Returns the density with the current parameters.
    pub fn density(&self) -> &Density<T> {
        &self.density
    }

    /// Returns the lower bound of the domain.
    pub fn lower(&self) -> T {
        self.lower
    }

    /// Returns the upper bound of the domain.
    pub fn upper(&self) -> T {
        self.upper
    }

    /// Returns the cumulant at the lower bound.
    pub fn min_cumulant(&self) -> T {
        self.min_cumulant
    }

    /// Returns the cumulant at the upper bound.
    pub fn max_cumulant(&self) -> T {
        self.max_cumulant
    }

    /// Returns the normalisation $N = |C(b) - C(a)|$, which is the integral of the density over the
    /// domain. It is infinite for a power law with $\nu \geq 1$ and the pole inside the domain.
    pub fn norm(&self) -> T {
        (self.max_cumulant - self.min_cumulant).abs()
    }

    /// Returns `true` if the normalisation is finite and non-zero. Nothing can be generated
    /// otherwise.
    pub fn normalisable(&self) -> bool {
        let norm = self.norm();
        norm.is_finite() && norm > T::zero()
    }

    /// Maps the uniform number `r` from $[0, 1]$ onto the domain.
    pub fn map(&self, r: T) -> T {
        self.density
            .inverse_cdf((self.max_cumulant - self.min_cumulant) * r + self.min_cumulant)
    }

    /// The inverse of `map`. For an on-shell channel every `r` maps to the same value; this returns
    /// zero.
    pub fn inverse_map(&self, x: T) -> T {
        if !self.density.is_continuous() {
            return T::zero();
        }

        (self.density.cdf(x) - self.min_cumulant) / (self.max_cumulant - self.min_cumulant)
    }

    /// Returns the value produced by the last call of `generate`.
    pub fn value(&self) -> T {
        self.value
    }

    /// Returns the weight of the value produced by the last call of `generate`, which is
    /// $N / \rho(x)$, or zero if the channel is not normalisable.
    pub fn fast_weight(&self) -> T {
        if !self.normalisable() {
            return T::zero();
        }

        let weight = self.norm() / self.density.pdf(self.value);

        if weight.is_finite() {
            weight
        } else {
            T::zero()
        }
    }

    /// Generates a new value and returns its weight.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        if !self.normalisable() {
            trace!("channel {:?} is not normalisable", self.kind());
            return Err(Miss::NotNormalisable);
        }

        self.value = self.map(uniform(rng));

        let weight = self.fast_weight();

        if weight > T::zero() {
            Ok(weight)
        } else {
            Err(Miss::NotNormalisable)
        }
    }

    /// Returns the weight `generate` assigns to `x`.
    pub fn weight(&self, x: T) -> Result<T, Miss> {
        if !self.normalisable() {
            return Err(Miss::NotNormalisable);
        }

        if let Density::OnShell { mass2 } = self.density {
            return if x == mass2 {
                Ok(T::one())
            } else {
                Err(Miss::OutOfDomain)
            };
        }

        if x < self.lower || x > self.upper {
            return Err(Miss::OutOfDomain);
        }

        let weight = self.norm() / self.density.pdf(x);

        if weight.is_finite() && weight > T::zero() {
            Ok(weight)
        } else {
            Err(Miss::NotNormalisable)
        }
    }
}

impl<T: Real> Sampler<T> for Channel<T> {
    type Point = T;

    fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        Channel::generate(self, rng)
    }

    fn point(&self) -> &T {
        &self.value
    }

    fn evaluate_weight(&mut self, point: &T) -> Result<T, Miss> {
        self.weight(*point)
    }

    fn update(&mut self, _: T) {}

    fn adapt(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand_pcg::Pcg64;

    #[test]
    fn test_breit_wigner_needs_width() {
        let mut channel = Channel::new(
            Shape::BreitWigner,
            Resonance::stable(91.19),
            0.0,
            10_000.0,
        );
        assert!(!channel.normalisable());
        assert_eq!(channel.fast_weight(), 0.0);

        let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
        assert_eq!(channel.generate(&mut rng), Err(Miss::NotNormalisable));
        assert_eq!(channel.generate(&mut rng), Err(Miss::NotNormalisable));

        channel.refresh_params(Resonance::new(91.19, 2.5));
        assert!(channel.normalisable());
        assert!(channel.generate(&mut rng).is_ok());
    }

    #[test]
    fn test_collapsed_bounds() {
        let mut channel = Channel::uniform(0.0, 10.0);
        channel.refresh_upper_bound(0.0);
        assert!(!channel.normalisable());

        channel.refresh_bounds(5.0, 1.0);
        assert!(!channel.normalisable());
        assert_eq!(channel.weight(3.0), Err(Miss::NotNormalisable));
    }

    #[test]
    fn test_power_law_pole_inside() {
        let mut channel = Channel::<f64>::new(
            Shape::PowerLaw { nu: 1.0 },
            Resonance::stable(2.0),
            1.0,
            10.0,
        );
        assert!(channel.norm().is_infinite());
        assert!(!channel.normalisable());
        assert_eq!(channel.fast_weight(), 0.0);

        // below one the pole is integrable
        let channel = Channel::new(
            Shape::PowerLaw { nu: 0.5 },
            Resonance::stable(2.0),
            1.0,
            10.0,
        );
        assert!(channel.normalisable());
        assert_approx_eq!(channel.norm(), 2.0 * (3.0f64.sqrt() + 6.0f64.sqrt()));
    }

    #[test]
    fn test_power_law_branches_norm() {
        let norm = |nu: f64| {
            Channel::new(
                Shape::PowerLaw { nu },
                Resonance::massless(),
                1.0,
                4.0,
            )
            .norm()
        };

        assert_approx_eq!(norm(0.0), 3.0);
        assert_approx_eq!(norm(1.0), 4.0f64.ln());
        assert_approx_eq!(norm(0.5), 2.0);
        assert_approx_eq!(norm(2.0), 0.75);
        assert_approx_eq!(norm(-1.0), 7.5);
    }

    #[test]
    fn test_on_shell() {
        let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);
        let mut channel = Channel::new(Shape::OnShell, Resonance::stable(3.0), 0.0, 100.0);

        assert_eq!(channel.generate(&mut rng), Ok(1.0));
        assert_eq!(channel.value(), 9.0);
        assert_eq!(channel.weight(9.0), Ok(1.0));
        assert_eq!(channel.weight(9.5), Err(Miss::OutOfDomain));

        channel.refresh_upper_bound(8.0);
        assert!(!channel.normalisable());
        assert_eq!(channel.generate(&mut rng), Err(Miss::NotNormalisable));
    }

    #[test]
    fn test_weight_outside_domain() {
        let channel = Channel::uniform(0.0, 10.0);

        assert_eq!(channel.weight(-1.0), Err(Miss::OutOfDomain));
        assert_eq!(channel.weight(10.5), Err(Miss::OutOfDomain));
        assert_eq!(channel.weight(5.0), Ok(10.0));
    }
}
