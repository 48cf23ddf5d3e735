//! This module contains everything related to estimators.
use crate::core::{count, Real};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// Basic estimators, like the mean, variance, and the standard deviation.
pub trait BasicEstimators<T: Float> {
    /// Returns the mean value.
    fn mean(&self) -> T;

    /// Returns the variance, $V$.
    fn var(&self) -> T;

    /// Returns the standard deviation, $\sigma = \sqrt{V}$.
    fn std(&self) -> T {
        self.var().sqrt()
    }
}

/// More estimators.
pub trait Estimators<T: Float>: BasicEstimators<T> {
    /// Returns the number of times $N$, the integrand has been called.
    fn calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nf}$, the integrand has been called
    /// and its return value was non-finite.
    fn non_finite_calls(&self) -> usize;

    /// Returns the number of times, $N_\mathrm{nz}$, the integrand has been called
    /// and its return value was non-zero.
    fn non_zero_calls(&self) -> usize;
}

/// Everything that needs to be updated.
pub trait Updateable<T> {
    /// Update this estimator with `value`.
    fn update(&mut self, value: T);
}

/// A cross section together with its statistical uncertainty and the uncertainty of the
/// uncertainty.
///
/// Adding two cross sections assumes they are independent: the values are summed and the errors
/// are combined in quadrature.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct CrossSection<T> {
    value: T,
    error: T,
    error_of_error: T,
}

impl<T: Real> CrossSection<T> {
    /// Constructor.
    pub const fn new(value: T, error: T, error_of_error: T) -> Self {
        Self {
            value,
            error,
            error_of_error,
        }
    }

    /// A vanishing cross section without uncertainty.
    pub fn zero() -> Self {
        Self::new(T::zero(), T::zero(), T::zero())
    }

    /// Returns the estimated value.
    pub fn value(&self) -> T {
        self.value
    }

    /// Returns the statistical error of the value.
    pub fn error(&self) -> T {
        self.error
    }

    /// Returns the statistical error of the error.
    pub fn error_of_error(&self) -> T {
        self.error_of_error
    }

    /// Returns the relative error, $\sigma / |I|$.
    pub fn relative_error(&self) -> T {
        self.error / self.value.abs()
    }

    /// Multiplies all three components with `factor`.
    pub fn scale(self, factor: T) -> Self {
        let factor = factor.abs();
        Self::new(
            self.value * factor,
            self.error * factor,
            self.error_of_error * factor,
        )
    }
}

impl<T: Real> Add for CrossSection<T> {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        let error = self.error.hypot(other.error);
        // propagation of d(error) = (e1 de1 + e2 de2) / error
        let error_of_error = if error > T::zero() {
            (self.error * self.error_of_error).hypot(other.error * other.error_of_error) / error
        } else {
            T::zero()
        };

        Self::new(self.value + other.value, error, error_of_error)
    }
}

impl<T: Real> AddAssign for CrossSection<T> {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl<T: Real> fmt::Display for CrossSection<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} \u{b1} {} (\u{b1} {})",
            self.value, self.error, self.error_of_error
        )
    }
}

/// Online estimator of a cross section, which accumulates the first four central moments of the
/// weighted integrand values with the numerically stable update formulas of Welford and
/// Terriberry. The raw sums are never formed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CrossSectionEstimator<T> {
    calls: usize,
    non_finite_calls: usize,
    non_zero_calls: usize,
    mean: T,
    m2: T,
    m3: T,
    m4: T,
}

impl<T: Real> Default for CrossSectionEstimator<T> {
    fn default() -> Self {
        Self {
            calls: 0,
            non_finite_calls: 0,
            non_zero_calls: 0,
            mean: T::zero(),
            m2: T::zero(),
            m3: T::zero(),
            m4: T::zero(),
        }
    }
}

impl<T: Real> CrossSectionEstimator<T> {
    /// Returns the estimated standard deviation of `std()`.
    pub fn error_of_error(&self) -> T {
        if self.calls < 2 {
            return T::infinity();
        }

        let n = count::<T>(self.calls);
        let one = T::one();
        let three = count::<T>(3);
        let sample_var = self.m2 / (n - one);

        if sample_var == T::zero() {
            return T::zero();
        }

        let moment4 = self.m4 / n;
        let var_of_var = ((moment4 - sample_var * sample_var * (n - three) / (n - one)) / n)
            .max(T::zero());

        var_of_var.sqrt() / (count::<T>(2) * sample_var) * self.std()
    }

    /// Returns the `(value, error, error_of_error)` triple.
    pub fn cross_section(&self) -> CrossSection<T> {
        CrossSection::new(self.mean(), self.std(), self.error_of_error())
    }

    /// Returns the sample skewness of the values.
    pub fn skewness(&self) -> T {
        if self.m2 == T::zero() {
            return T::zero();
        }

        let n = count::<T>(self.calls);
        n.sqrt() * self.m3 / self.m2.powf(count::<T>(3) / count::<T>(2))
    }

    /// The call counters and the moments `[mean, m2, m3, m4]`, in this order.
    pub(crate) fn parts(&self) -> ([usize; 3], [T; 4]) {
        (
            [self.calls, self.non_finite_calls, self.non_zero_calls],
            [self.mean, self.m2, self.m3, self.m4],
        )
    }

    /// The inverse of `parts`.
    pub(crate) fn from_parts(calls: [usize; 3], moments: [T; 4]) -> Self {
        Self {
            calls: calls[0],
            non_finite_calls: calls[1],
            non_zero_calls: calls[2],
            mean: moments[0],
            m2: moments[1],
            m3: moments[2],
            m4: moments[3],
        }
    }
}

impl<T: Real> Updateable<T> for CrossSectionEstimator<T> {
    fn update(&mut self, value: T) {
        self.calls += 1;

        let value = if value == T::zero() {
            value
        } else {
            self.non_zero_calls += 1;

            if value.is_finite() {
                value
            } else {
                self.non_finite_calls += 1;
                T::zero()
            }
        };

        let n1 = count::<T>(self.calls - 1);
        let n = count::<T>(self.calls);
        let delta = value - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1;

        self.mean += delta_n;
        self.m4 += term1 * delta_n2 * (n * n - count::<T>(3) * n + count::<T>(3))
            + count::<T>(6) * delta_n2 * self.m2
            - count::<T>(4) * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - count::<T>(2)) - count::<T>(3) * delta_n * self.m2;
        self.m2 += term1;
    }
}

impl<T: Real> Add for CrossSectionEstimator<T> {
    type Output = Self;

    /// Merges two estimators of the same quantity, as if all values had been passed to a single
    /// estimator.
    fn add(self, other: Self) -> Self {
        if self.calls == 0 {
            return other;
        }

        if other.calls == 0 {
            return self;
        }

        let na = count::<T>(self.calls);
        let nb = count::<T>(other.calls);
        let n = na + nb;
        let delta = other.mean - self.mean;
        let delta2 = delta * delta;
        let three = count::<T>(3);
        let four = count::<T>(4);
        let six = count::<T>(6);

        let mean = self.mean + delta * nb / n;
        let m2 = self.m2 + other.m2 + delta2 * na * nb / n;
        let m3 = self.m3
            + other.m3
            + delta2 * delta * na * nb * (na - nb) / (n * n)
            + three * delta * (na * other.m2 - nb * self.m2) / n;
        let m4 = self.m4
            + other.m4
            + delta2 * delta2 * na * nb * (na * na - na * nb + nb * nb) / (n * n * n)
            + six * delta2 * (na * na * other.m2 + nb * nb * self.m2) / (n * n)
            + four * delta * (na * other.m3 - nb * self.m3) / n;

        Self {
            calls: self.calls + other.calls,
            non_finite_calls: self.non_finite_calls + other.non_finite_calls,
            non_zero_calls: self.non_zero_calls + other.non_zero_calls,
            mean,
            m2,
            m3,
            m4,
        }
    }
}

impl<T: Real> BasicEstimators<T> for CrossSectionEstimator<T> {
    fn mean(&self) -> T {
        self.mean
    }

    /// Returns the variance of the mean, which is infinite with fewer than two calls.
    fn var(&self) -> T {
        if self.calls < 2 {
            return T::infinity();
        }

        let n = count::<T>(self.calls);
        self.m2 / (n - T::one()) / n
    }
}

impl<T: Real> Estimators<T> for CrossSectionEstimator<T> {
    fn calls(&self) -> usize {
        self.calls
    }

    fn non_finite_calls(&self) -> usize {
        self.non_finite_calls
    }

    fn non_zero_calls(&self) -> usize {
        self.non_zero_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn estimator(values: &[f64]) -> CrossSectionEstimator<f64> {
        let mut estimator = CrossSectionEstimator::default();
        values.iter().for_each(|&v| estimator.update(v));
        estimator
    }

    #[test]
    fn test_cross_section_add() {
        let xs_1 = CrossSection::<f64>::new(1.1, 0.3, 0.03);
        let xs_2 = CrossSection::<f64>::new(5.3, 0.4, 0.08);
        let sum = xs_1 + xs_2;

        assert_approx_eq!(sum.value(), 6.4);
        assert_approx_eq!(sum.error(), 0.5);
        assert_approx_eq!(sum.error_of_error(), (0.009f64.powi(2) + 0.032f64.powi(2)).sqrt() / 0.5);
    }

    #[test]
    fn test_cross_section_add_assign() {
        let mut xs = CrossSection::<f64>::new(1.0, 3.0, 0.0);
        xs += CrossSection::new(2.0, 4.0, 0.0);

        assert_eq!(xs.value(), 3.0);
        assert_eq!(xs.error(), 5.0);
        assert_eq!(xs.error_of_error(), 0.0);
    }

    #[test]
    fn test_estimator_mean_var() {
        let values = [1.0, 2.0, 4.0, 7.0, 11.0];
        let est = estimator(&values);
        let mean = values.iter().sum::<f64>() / 5.0;
        let sample_var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;

        assert_eq!(est.calls(), 5);
        assert_approx_eq!(est.mean(), mean);
        assert_approx_eq!(est.var(), sample_var / 5.0);
    }

    #[test]
    fn test_estimator_counts_zero_and_non_finite() {
        let est = estimator(&[0.0, 1.0, f64::INFINITY, f64::NAN, 3.0]);

        assert_eq!(est.calls(), 5);
        assert_eq!(est.non_zero_calls(), 4);
        assert_eq!(est.non_finite_calls(), 2);
        assert_approx_eq!(est.mean(), 0.8);
    }

    #[test]
    fn test_estimator_with_few_calls() {
        let est = estimator(&[2.0]);

        assert!(est.var().is_infinite());
        assert!(est.error_of_error().is_infinite());
    }

    #[test]
    fn test_estimator_merge() {
        let values: Vec<f64> = (0..100).map(|i| ((i * 37) % 23) as f64 * 0.5).collect();
        let full = estimator(&values);
        let merged = estimator(&values[..41]) + estimator(&values[41..]);

        assert_eq!(merged.calls(), full.calls());
        assert_approx_eq!(merged.mean(), full.mean());
        assert_approx_eq!(merged.var(), full.var());
        assert_approx_eq!(merged.error_of_error(), full.error_of_error());
        assert_approx_eq!(merged.skewness(), full.skewness());
    }

    #[test]
    fn test_estimator_stability_with_large_offset() {
        // naive sum-of-squares formulas lose all digits here
        let values: Vec<f64> = (0..1000).map(|i| 1e9 + (i % 2) as f64).collect();
        let est = estimator(&values);

        assert_approx_eq!(est.mean(), 1e9 + 0.5, 1e-6);
        assert_approx_eq!(est.var() * 999.0, 0.25, 1e-9);
    }
}
