//! This module contains the histogram of event weights used to reduce the maximum weight.
use crate::core::{count, Real};
use serde::{Deserialize, Serialize};

/// Histogram of positive event weights over the range from zero to an upper edge, which doubles
/// whenever a larger weight is filled in.
///
/// Every bin keeps the number of weights that fell into it and their sum. When the range doubles,
/// neighbouring bins are merged, so that no count and no sum is lost; the number of bins stays
/// the same.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct WeightHistogram<T> {
    counts: Vec<usize>,
    sums: Vec<T>,
    upper: T,
    largest: T,
}

impl<T: Real> WeightHistogram<T> {
    /// Constructs an empty histogram with `bins` bins.
    ///
    /// # Panics
    ///
    /// Panics if `bins` is zero or odd.
    pub fn new(bins: usize) -> Self {
        assert!(
            bins > 0 && bins % 2 == 0,
            "the number of bins must be even and positive, got {}",
            bins
        );

        Self {
            counts: vec![0; bins],
            sums: vec![T::zero(); bins],
            upper: T::zero(),
            largest: T::zero(),
        }
    }

    /// Returns the number of bins.
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Returns the upper edge of the last bin.
    pub fn upper(&self) -> T {
        self.upper
    }

    /// Returns the largest weight filled in so far.
    pub fn largest(&self) -> T {
        self.largest
    }

    /// Returns the number of weights in each bin.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Returns the sum of the weights in each bin.
    pub fn sums(&self) -> &[T] {
        &self.sums
    }

    /// Returns the number of weights filled in.
    pub fn entries(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Returns the sum of all weights filled in.
    pub fn total(&self) -> T {
        self.sums.iter().fold(T::zero(), |acc, &sum| acc + sum)
    }

    /// Returns the lower edge of the bin `index`.
    pub fn edge(&self, index: usize) -> T {
        self.upper * count(index) / count(self.bins())
    }

    /// Adds `weight` to the histogram. Weights that are not positive and finite are ignored.
    pub fn fill(&mut self, weight: T) {
        if !(weight.is_finite() && weight > T::zero()) {
            return;
        }

        if self.upper == T::zero() {
            self.upper = weight;
        }

        while weight >= self.upper {
            self.rebin();
        }

        let bins = self.bins();
        let index = (weight / self.upper * count(bins))
            .to_usize()
            .unwrap_or(bins - 1)
            .min(bins - 1);

        self.counts[index] += 1;
        self.sums[index] += weight;
        self.largest = self.largest.max(weight);
    }

    /// Doubles the range by merging neighbouring bins.
    fn rebin(&mut self) {
        let half = self.bins() / 2;

        for index in 0..half {
            self.counts[index] = self.counts[2 * index] + self.counts[2 * index + 1];
            self.sums[index] = self.sums[2 * index] + self.sums[2 * index + 1];
        }

        for index in half..self.bins() {
            self.counts[index] = 0;
            self.sums[index] = T::zero();
        }

        self.upper = self.upper + self.upper;
    }

    /// Returns the smallest bin edge $w_\mathrm{max}$ for which the weights above $w_\mathrm{max}$
    /// carry at most the fraction `epsilon` of the sum of all weights. With `epsilon` zero this is
    /// the largest weight.
    pub fn reduced_max_weight(&self, epsilon: T) -> T {
        let total = self.total();

        if total == T::zero() {
            return T::zero();
        }

        let allowed = epsilon * total;
        let mut above = T::zero();

        for index in (0..self.bins()).rev() {
            if above + self.sums[index] > allowed {
                return self.edge(index + 1).min(self.largest);
            }

            above += self.sums[index];
        }

        T::zero()
    }
}
