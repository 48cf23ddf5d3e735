//! Nodes of the bin tree.
use crate::core::{count, Real};
use serde::{Deserialize, Serialize};

/// Number of slots each leaf uses to record the marginal distribution of the update values in
/// every dimension.
pub const STATS_SLOTS: usize = 16;

/// A node of the bin tree, which is either a leaf or has exactly two children that tile its
/// hyper-rectangle.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bin<T> {
    pub(super) lower: Vec<T>,
    pub(super) upper: Vec<T>,
    pub(super) importance: T,
    pub(super) depth: usize,
    pub(super) parent: Option<usize>,
    pub(super) children: Option<(usize, usize)>,
    pub(super) split: Option<(usize, T)>,
    pub(super) stats: Vec<T>,
}

impl<T: Real> Bin<T> {
    pub(super) fn root(lower: Vec<T>, upper: Vec<T>) -> Self {
        let dimensions = lower.len();

        Self {
            lower,
            upper,
            importance: T::one(),
            depth: 0,
            parent: None,
            children: None,
            split: None,
            stats: vec![T::zero(); dimensions * STATS_SLOTS],
        }
    }

    /// Returns the lower corner of this bin.
    pub fn lower(&self) -> &[T] {
        &self.lower
    }

    /// Returns the upper corner of this bin.
    pub fn upper(&self) -> &[T] {
        &self.upper
    }

    /// Returns the accumulated importance. For an inner bin this is the sum of the importances of
    /// its children.
    pub fn importance(&self) -> T {
        self.importance
    }

    /// Returns how often the root had to be split to reach this bin.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the index of the parent bin, or `None` for the root.
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Returns the indices of the left and right child.
    pub fn children(&self) -> Option<(usize, usize)> {
        self.children
    }

    /// Returns the dimension and the position at which this bin was split.
    pub fn split(&self) -> Option<(usize, T)> {
        self.split
    }

    /// Returns `true` if this bin has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// Returns the statistics recorded for dimension `dim`.
    pub fn stats(&self, dim: usize) -> &[T] {
        &self.stats[dim * STATS_SLOTS..(dim + 1) * STATS_SLOTS]
    }

    pub(super) fn record(&mut self, dim: usize, u: T, delta: T) {
        let slot = (u * count::<T>(STATS_SLOTS))
            .floor()
            .to_usize()
            .unwrap_or(0)
            .min(STATS_SLOTS - 1);
        self.stats[dim * STATS_SLOTS + slot] += delta;
    }

    /// Sum of the statistics in dimension `dim`, which is the same for every dimension up to
    /// rounding.
    pub(super) fn stats_mass(&self, dim: usize) -> T {
        self.stats(dim).iter().fold(T::zero(), |acc, &s| acc + s)
    }
}

/// Mass of the piecewise constant histogram `slots` over $[0, 1]$ below `u`.
pub(super) fn mass_below<T: Real>(slots: &[T], u: T) -> T {
    let scaled = u.max(T::zero()).min(T::one()) * count::<T>(slots.len());
    let full = scaled.floor().to_usize().unwrap_or(0).min(slots.len());
    let mut mass = slots[..full].iter().fold(T::zero(), |acc, &s| acc + s);

    if full < slots.len() {
        mass += slots[full] * (scaled - count::<T>(full));
    }

    mass
}

/// Returns the position below which half of the mass of `slots` lies.
pub(super) fn median<T: Real>(slots: &[T]) -> T {
    let total = slots.iter().fold(T::zero(), |acc, &s| acc + s);
    let half = total / count::<T>(2);
    let mut below = T::zero();

    for (i, &slot) in slots.iter().enumerate() {
        if below + slot >= half && slot > T::zero() {
            return (count::<T>(i) + (half - below) / slot) / count::<T>(slots.len());
        }

        below += slot;
    }

    count::<T>(1) / count::<T>(2)
}

/// Maps the part of `slots` between `from` and `to` onto a new histogram with the same number of
/// slots.
pub(super) fn rebin<T: Real>(slots: &[T], from: T, to: T) -> Vec<T> {
    let n = slots.len();
    let width = (to - from) / count::<T>(n);
    let mut previous = mass_below(slots, from);

    (1..=n)
        .map(|j| {
            let next = mass_below(slots, from + width * count::<T>(j));
            let mass = (next - previous).max(T::zero());
            previous = next;
            mass
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_mass_below() {
        let slots: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

        assert_eq!(mass_below(&slots, 0.0), 0.0);
        assert_approx_eq!(mass_below(&slots, 0.375), 2.0);
        assert_approx_eq!(mass_below(&slots, 1.0), 10.0);
    }

    #[test]
    fn test_median() {
        assert_approx_eq!(median::<f64>(&[1.0, 1.0, 1.0, 1.0]), 0.5);
        assert_approx_eq!(median::<f64>(&[0.0, 0.0, 0.0, 2.0]), 0.875);
        assert_approx_eq!(median::<f64>(&[0.0; 4]), 0.5);
    }

    #[test]
    fn test_rebin_keeps_mass() {
        let slots = [1.0, 2.0, 3.0, 4.0];
        let left = rebin(&slots, 0.0, 0.6);
        let right = rebin(&slots, 0.6, 1.0);

        let sum = |v: &[f64]| v.iter().sum::<f64>();
        assert_approx_eq!(sum(&left), mass_below(&slots, 0.6));
        assert_approx_eq!(sum(&left) + sum(&right), 10.0);
        assert_approx_eq!(left[0], 0.6);
    }

    #[test]
    fn test_record_clamps_slot() {
        let mut bin = Bin::root(vec![0.0], vec![1.0]);
        bin.record(0, 1.0, 2.0);
        bin.record(0, 0.0, 1.0);

        assert_eq!(bin.stats(0)[STATS_SLOTS - 1], 2.0);
        assert_eq!(bin.stats(0)[0], 1.0);
        assert_eq!(bin.stats_mass(0), 3.0);
    }
}
