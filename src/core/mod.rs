//! The core module
pub mod estimators;

use crate::core::estimators::Estimators;
use num_traits::{Float, FloatConst, FromPrimitive};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Numeric type every sampler in this crate is generic over. It is implemented for every type
/// that fulfills the bounds, in particular for `f32` and `f64`.
pub trait Real:
    Float
    + FloatConst
    + FromPrimitive
    + AddAssign
    + SubAssign
    + MulAssign
    + Debug
    + Display
    + FromStr
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Real for T where
    T: Float
        + FloatConst
        + FromPrimitive
        + AddAssign
        + SubAssign
        + MulAssign
        + Debug
        + Display
        + FromStr
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Converts the literal `x` into `T`.
pub(crate) fn lit<T: Real>(x: f64) -> T {
    T::from_f64(x).unwrap_or_else(T::nan)
}

/// Converts the count `n` into `T`.
pub(crate) fn count<T: Real>(n: usize) -> T {
    T::from_usize(n).unwrap_or_else(T::nan)
}

/// Draws a uniformly distributed number in $[0, 1)$ from `rng`.
pub(crate) fn uniform<T: Real, R: Rng + ?Sized>(rng: &mut R) -> T {
    lit(rng.gen::<f64>())
}

/// Reason why a sampler did not produce a point with a non-zero weight. All of these are expected
/// to happen during a run and are cheap to return; none of them aborts the generation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum Miss {
    /// The sampling domain collapsed or the parameters of the density are contradictory.
    #[error("the sampler is not normalisable")]
    NotNormalisable,
    /// The point is kinematically forbidden, e.g. the energy is below the sum of the masses.
    #[error("the point is kinematically infeasible")]
    Infeasible,
    /// The point was generated but failed the physical cuts.
    #[error("the point did not pass the cuts")]
    Cut,
    /// An externally supplied point lies outside the sampling domain.
    #[error("the point lies outside of the sampling domain")]
    OutOfDomain,
}

/// Common interface of every sampler in this crate: channels, grids and process samplers.
///
/// The calls must be issued in sequence: `update` always refers to the point that was produced by
/// the most recent call of `generate`.
pub trait Sampler<T: Real> {
    /// The type of a generated point.
    type Point: Clone;

    /// Generates a new point using the random numbers from `rng` and returns its weight. The point
    /// itself can be accessed using `point`.
    fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss>;

    /// Returns the point generated by the last successful call of `generate`.
    fn point(&self) -> &Self::Point;

    /// Returns the weight `generate` would have assigned to `point`.
    fn evaluate_weight(&mut self, point: &Self::Point) -> Result<T, Miss>;

    /// Feeds the weighted integrand `value` of the last generated point back into the sampler.
    fn update(&mut self, value: T);

    /// Refines the sampling density using everything passed to `update` so far.
    fn adapt(&mut self);
}

/// Trait which every matrix element must implement. It is the only connection between the phase
/// space generation and the amplitudes.
pub trait MatrixElement<P, T> {
    /// Returns the non-negative integrand (squared matrix element including flux and symmetry
    /// factors) for the phase space point `point`.
    fn evaluate(&self, point: &P) -> T;
}

impl<P, T, F> MatrixElement<P, T> for F
where
    F: Fn(&P) -> T,
{
    fn evaluate(&self, point: &P) -> T {
        self(point)
    }
}

/// A checkpoint saves the state of the generator after an iteration.
/// Checkpoints can be used to restart or resume iterations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Checkpoint<T, R, E> {
    rng_before: R,
    rng_after: R,
    estimators: E,
    alphas: Vec<T>,
}

impl<T, R, E> Checkpoint<T, R, E>
where
    T: Real,
    E: Estimators<T>,
{
    /// Constructor
    pub(crate) fn new(rng_before: R, rng_after: R, estimators: E, alphas: Vec<T>) -> Self {
        Self {
            rng_before,
            rng_after,
            estimators,
            alphas,
        }
    }

    /// Returns the random number generator before generation of this checkpoint.
    pub fn rng_before(&self) -> &R {
        &self.rng_before
    }

    /// Returns the random number generator after generation of this checkpoint
    pub fn rng_after(&self) -> &R {
        &self.rng_after
    }

    /// Returns the estimators of this checkpoint.
    pub fn estimators(&self) -> &E {
        &self.estimators
    }

    /// Returns the relative weights of the sub-processes at the end of this iteration.
    pub fn alphas(&self) -> &[T] {
        &self.alphas
    }

    /// Destructure the checkpoint and return its components.
    pub fn destructure(self) -> (R, R, E, Vec<T>) {
        (self.rng_before, self.rng_after, self.estimators, self.alphas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_pcg::Pcg64;

    #[test]
    fn test_uniform_range() {
        let mut rng = Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96);

        for _ in 0..1000 {
            let r: f64 = uniform(&mut rng);
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn test_closure_matrix_element() {
        let me = |x: &f64| 2.0 * x;

        assert_eq!(me.evaluate(&1.5), 3.0);
    }

    #[test]
    fn test_miss_display() {
        assert_eq!(Miss::Cut.to_string(), "the point did not pass the cuts");
    }
}
