//! The self-refining importance-sampling grid, which partitions a hyper-rectangle into a binary
//! tree of bins.
//!
//! Every bin carries an *importance* $I_b$, the sum of the importances of its children. A point is
//! generated by drawing $\rho \sim U(0, I_\mathrm{root})$ and walking down the tree: if $\rho$ is
//! smaller than the importance of the left child the walk continues there, otherwise $\rho$ is
//! reduced by that importance and the walk continues with the right child. Inside the leaf the
//! point is distributed according to the shape of the grid, which is uniform unless the grid was
//! constructed from a channel. The weight of a point $x$ in the leaf $b$ is therefore
//!
//! $$ w(x) = \frac{I_\mathrm{root}}{I_b} \prod_{d} \frac{C(b_d^+) - C(b_d^-)}{\rho(x_d)} \, , $$
//!
//! where $C$ is the cumulant and $\rho$ the density of the shape.
//!
//! Each `update` adds the observed value (or its square, see [`GridMode`]) to the importance of the
//! leaf that was visited last and to all its ancestors, and records where inside the leaf the
//! value was seen. `adapt` splits the leaf with the largest importance.
mod bin;
mod persist;
mod subgrid;

pub use bin::{Bin, STATS_SLOTS};
pub use persist::GridFormatError;
pub use subgrid::SubGrid;

use crate::channels::{Channel, Density};
use crate::core::estimators::{CrossSectionEstimator, Updateable};
use crate::core::{count, lit, uniform, Miss, Real, Sampler};
use bin::{mass_below, median, rebin};
use log::{debug, error, trace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Smallest share of its parent's importance a child receives.
const MIN_SHARE: f64 = 1e-3;

/// Policy that determines what the importance of a bin measures.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum GridMode {
    /// The importance is the sum of the absolute values, which is proportional to the integral
    /// over the bin. Bins are split at the median of their statistics.
    Cumulant,
    /// The importance is the sum of the squared values, which targets the largest weights. Bins
    /// are split in the middle.
    MaxWeight,
}

impl GridMode {
    fn delta<T: Real>(self, value: T) -> T {
        match self {
            Self::Cumulant => value.abs(),
            Self::MaxWeight => value * value,
        }
    }
}

/// Adaptive grid over a hyper-rectangle.
///
/// A clone has no sub-grid views registered, see [`Grid::clone_view`].
#[derive(Debug, Deserialize, Serialize)]
pub struct Grid<T> {
    mode: GridMode,
    shape: Density<T>,
    lower: Vec<T>,
    upper: Vec<T>,
    budget: usize,
    bins: Vec<Option<Bin<T>>>,
    free: Vec<usize>,
    leaves: usize,
    revision: u64,
    #[serde(default)]
    exhausted: bool,
    #[serde(skip)]
    views: usize,
    current: Option<usize>,
    current_u: Vec<T>,
    point: Vec<T>,
    xsec: CrossSectionEstimator<T>,
}

impl<T: Real> Grid<T> {
    /// Constructs a grid over the hyper-rectangle from `lower` to `upper` with a single bin, that
    /// will be split at most until it has `budget` leaves.
    ///
    /// # Panics
    ///
    /// Panics if `lower` and `upper` have different or zero lengths, or if `budget` is zero.
    pub fn new(lower: Vec<T>, upper: Vec<T>, budget: usize, mode: GridMode) -> Self {
        Self::with_density(Density::Uniform, lower, upper, budget, mode)
    }

    /// Constructs a one-dimensional grid over the domain of `channel` that samples according to
    /// the density of the channel inside of every bin. Fails if the channel is not normalisable or
    /// on-shell.
    pub fn with_shape(channel: &Channel<T>, budget: usize, mode: GridMode) -> Result<Self, Miss> {
        if !channel.normalisable() || !channel.density().is_continuous() {
            return Err(Miss::NotNormalisable);
        }

        Ok(Self::with_density(
            *channel.density(),
            vec![channel.lower()],
            vec![channel.upper()],
            budget,
            mode,
        ))
    }

    fn with_density(
        shape: Density<T>,
        lower: Vec<T>,
        upper: Vec<T>,
        budget: usize,
        mode: GridMode,
    ) -> Self {
        assert_eq!(lower.len(), upper.len(), "mismatching dimensions");
        assert!(!lower.is_empty(), "a grid needs at least one dimension");
        assert!(budget > 0, "the bin budget must be positive");

        let dimensions = lower.len();

        Self {
            mode,
            shape,
            bins: vec![Some(Bin::root(lower.clone(), upper.clone()))],
            lower,
            upper,
            budget,
            free: Vec::new(),
            leaves: 1,
            revision: 0,
            exhausted: false,
            views: 0,
            current: None,
            current_u: Vec::new(),
            point: vec![T::nan(); dimensions],
            xsec: CrossSectionEstimator::default(),
        }
    }

    /// Returns the number of dimensions.
    pub fn dimensions(&self) -> usize {
        self.lower.len()
    }

    /// Returns the splitting policy.
    pub fn mode(&self) -> GridMode {
        self.mode
    }

    /// Returns the maximum number of leaves.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Returns the density used inside every bin.
    pub fn shape(&self) -> &Density<T> {
        &self.shape
    }

    /// Returns the lower corner of the domain.
    pub fn lower(&self) -> &[T] {
        &self.lower
    }

    /// Returns the upper corner of the domain.
    pub fn upper(&self) -> &[T] {
        &self.upper
    }

    /// Returns the number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves
    }

    /// Returns `true` once `adapt` does nothing anymore, either because the bin budget is
    /// exhausted or because no leaf is wide enough to be split.
    pub fn is_final(&self) -> bool {
        self.leaves >= self.budget || self.exhausted
    }

    /// Counter that changes whenever the importance of any bin changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the number of sub-grid views currently registered with this grid.
    pub fn views(&self) -> usize {
        self.views
    }

    /// Returns the bin with index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` does not refer to a bin of the tree.
    pub fn bin(&self, index: usize) -> &Bin<T> {
        match self.bins.get(index) {
            Some(Some(bin)) => bin,
            Some(None) => panic!("bin {} has been freed", index),
            None => panic!(
                "bin index {} out of range for a table of {} bins",
                index,
                self.bins.len()
            ),
        }
    }

    fn bin_mut(&mut self, index: usize) -> &mut Bin<T> {
        let len = self.bins.len();

        match self.bins.get_mut(index) {
            Some(Some(bin)) => bin,
            Some(None) => panic!("bin {} has been freed", index),
            None => panic!("bin index {} out of range for a table of {} bins", index, len),
        }
    }

    /// Returns the indices of all leaves, ordered from the lower to the upper end of the domain in
    /// depth-first order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves = Vec::with_capacity(self.leaves);
        let mut stack = vec![0];

        while let Some(index) = stack.pop() {
            match self.bin(index).children {
                Some((left, right)) => {
                    stack.push(right);
                    stack.push(left);
                }
                None => leaves.push(index),
            }
        }

        leaves
    }

    /// Returns the importance of the root, which is the sum of the importances of all leaves.
    pub fn total_importance(&self) -> T {
        self.bin(0).importance
    }

    /// Returns the cross section accumulated from all values passed to `update`.
    pub fn cross_section(&self) -> &CrossSectionEstimator<T> {
        &self.xsec
    }

    /// Returns the point generated last.
    pub fn point(&self) -> &[T] {
        &self.point
    }

    /// Returns `true` if points can be generated, which requires a non-empty domain.
    pub fn normalisable(&self) -> bool {
        self.lower.iter().zip(&self.upper).all(|(&lower, &upper)| {
            let width = self.shape.cdf(upper) - self.shape.cdf(lower);
            lower < upper && width.is_finite() && width > T::zero()
        })
    }

    /// Returns the leaf that contains `x`, or `None` if `x` lies outside of the domain.
    pub fn find_leaf(&self, x: &[T]) -> Option<usize> {
        if x.len() != self.dimensions()
            || x.iter()
                .zip(self.lower.iter().zip(&self.upper))
                .any(|(&x, (&lower, &upper))| !(lower <= x && x <= upper))
        {
            return None;
        }

        let mut index = 0;

        while let (Some((left, right)), Some((dim, point))) =
            (self.bin(index).children, self.bin(index).split)
        {
            index = if x[dim] < point { left } else { right };
        }

        Some(index)
    }

    /// Returns the importance below `x` of this one-dimensional grid, which is the value of $\rho$
    /// `generate` maps onto `x`.
    ///
    /// # Panics
    ///
    /// Panics if this grid has more than one dimension.
    pub fn cumulant_at(&self, x: T) -> T {
        assert_eq!(self.dimensions(), 1, "cumulants exist for one-dimensional grids only");

        if x <= self.lower[0] {
            return T::zero();
        }

        if x >= self.upper[0] {
            return self.total_importance();
        }

        let mut index = 0;
        let mut cumulant = T::zero();

        while let (Some((left, right)), Some((_, point))) =
            (self.bin(index).children, self.bin(index).split)
        {
            if x < point {
                index = left;
            } else {
                cumulant += self.bin(left).importance;
                index = right;
            }
        }

        cumulant + self.bin(index).importance * self.fraction(index, 0, x)
    }

    /// Position of `x` inside the leaf `index` along `dim`, measured in the cumulant of the shape.
    fn fraction(&self, index: usize, dim: usize, x: T) -> T {
        let bin = self.bin(index);
        let lower = self.shape.cdf(bin.lower[dim]);
        let upper = self.shape.cdf(bin.upper[dim]);

        ((self.shape.cdf(x) - lower) / (upper - lower))
            .max(T::zero())
            .min(T::one())
    }

    /// The inverse of `fraction`.
    fn position(&self, index: usize, dim: usize, u: T) -> T {
        let bin = self.bin(index);
        let lower = self.shape.cdf(bin.lower[dim]);
        let upper = self.shape.cdf(bin.upper[dim]);

        self.shape
            .inverse_cdf(lower + u * (upper - lower))
            .max(bin.lower[dim])
            .min(bin.upper[dim])
    }

    /// Weight of `x` in the leaf `index`, if the importances are normalised to `norm`.
    pub(crate) fn leaf_weight(&self, index: usize, x: &[T], norm: T) -> Result<T, Miss> {
        let bin = self.bin(index);
        let mut weight = norm / bin.importance;

        for (dim, &x) in x.iter().enumerate() {
            let width = self.shape.cdf(bin.upper[dim]) - self.shape.cdf(bin.lower[dim]);
            weight *= width / self.shape.pdf(x);
        }

        if weight.is_finite() && weight > T::zero() {
            Ok(weight)
        } else {
            trace!("weight {} of bin {} is not usable", weight, index);
            Err(Miss::NotNormalisable)
        }
    }

    /// Walks down the tree and returns the leaf $\rho$ falls into, together with the relative
    /// position of $\rho$ inside the leaf.
    fn descend(&self, mut rho: T) -> (usize, T) {
        let mut index = 0;

        while let Some((left, right)) = self.bin(index).children {
            let importance = self.bin(left).importance;

            if rho < importance {
                index = left;
            } else {
                rho -= importance;
                index = right;
            }
        }

        let u = (rho / self.bin(index).importance).max(T::zero()).min(T::one());

        (index, u)
    }

    /// Generates a point with $\rho$ restricted to the range from `smin` to `smax`.
    pub(crate) fn generate_in<R: Rng + ?Sized>(
        &mut self,
        smin: T,
        smax: T,
        rng: &mut R,
    ) -> Result<T, Miss> {
        if !self.normalisable() || !(smax > smin) {
            trace!("grid is not normalisable");
            return Err(Miss::NotNormalisable);
        }

        let rho = smin + (smax - smin) * uniform::<T, _>(rng);
        let (leaf, u) = self.descend(rho);

        let mut fractions = Vec::with_capacity(self.dimensions());
        fractions.push(u);
        for _ in 1..self.dimensions() {
            fractions.push(uniform(rng));
        }

        let point: Vec<_> = fractions
            .iter()
            .enumerate()
            .map(|(dim, &u)| self.position(leaf, dim, u))
            .collect();
        let weight = self.leaf_weight(leaf, &point, smax - smin);

        self.current = Some(leaf);
        self.current_u = fractions;
        self.point = point;

        weight
    }

    /// Generates a new point and returns its weight.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        let total = self.total_importance();
        self.generate_in(T::zero(), total, rng)
    }

    /// Returns the weight `generate` would have assigned to `x`.
    pub fn weight(&self, x: &[T]) -> Result<T, Miss> {
        if !self.normalisable() {
            return Err(Miss::NotNormalisable);
        }

        let leaf = self.find_leaf(x).ok_or(Miss::OutOfDomain)?;
        self.leaf_weight(leaf, x, self.total_importance())
    }

    /// Adds `value`, the weighted integrand of the point generated last, to the statistics of the
    /// leaf it was generated in. Calling this twice for the same point has no further effect.
    pub fn update(&mut self, value: T) {
        let leaf = match self.current.take() {
            Some(leaf) => leaf,
            None => {
                trace!("update without a generated point is ignored");
                return;
            }
        };

        self.xsec.update(value);

        let delta = self.mode.delta(value);

        if !(delta.is_finite() && delta > T::zero()) {
            return;
        }

        let fractions = std::mem::take(&mut self.current_u);
        for (dim, &u) in fractions.iter().enumerate() {
            self.bin_mut(leaf).record(dim, u, delta);
        }

        let mut index = Some(leaf);

        while let Some(i) = index {
            let bin = self.bin_mut(i);
            bin.importance += delta;
            index = bin.parent;
        }

        self.revision += 1;
    }

    /// Splits the leaf with the largest importance into two, unless the budget is exhausted.
    /// Leaves too narrow to be split are passed over in favour of the next important one.
    pub fn adapt(&mut self) {
        if self.is_final() {
            return;
        }

        let mut candidates: Vec<_> = self
            .bins
            .iter()
            .enumerate()
            .filter_map(|(index, bin)| match bin {
                Some(bin) if bin.is_leaf() => Some((index, bin.importance)),
                _ => None,
            })
            .collect();
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        for (index, _) in candidates {
            if self.split(index) {
                return;
            }
        }

        debug!("no bin can be split, the grid stays at {} leaves", self.leaves);
        self.exhausted = true;
    }

    fn split_dimension(&self, index: usize) -> usize {
        let bin = self.bin(index);
        let half = lit::<T>(0.5);
        let mut best = (0, T::zero());

        for dim in 0..self.dimensions() {
            let mass = bin.stats_mass(dim);

            if mass > T::zero() {
                let below = mass_below(bin.stats(dim), half);
                let imbalance = (below + below - mass).abs() / mass;

                if imbalance > best.1 {
                    best = (dim, imbalance);
                }
            }
        }

        if best.1 > T::zero() {
            return best.0;
        }

        // without a preference split the relatively widest side
        (0..self.dimensions())
            .map(|dim| {
                let width = (bin.upper[dim] - bin.lower[dim]) / (self.upper[dim] - self.lower[dim]);
                (dim, width)
            })
            .fold((0, T::neg_infinity()), |best, next| {
                if next.1 > best.1 {
                    next
                } else {
                    best
                }
            })
            .0
    }

    fn split(&mut self, index: usize) -> bool {
        let dim = self.split_dimension(index);
        let slots = count::<T>(STATS_SLOTS);
        let u = match self.mode {
            GridMode::Cumulant => median(self.bin(index).stats(dim)),
            GridMode::MaxWeight => lit(0.5),
        }
        .max(slots.recip())
        .min(T::one() - slots.recip());

        let point = self.position(index, dim, u);
        let parent = self.bin(index).clone();

        if !(parent.lower[dim] < point && point < parent.upper[dim]) {
            trace!("bin {} is too narrow to be split", index);
            return false;
        }

        let mass = parent.stats_mass(dim);
        let fraction = if mass > T::zero() {
            mass_below(parent.stats(dim), u) / mass
        } else {
            T::zero()
        };
        let share = (if mass > T::zero() { fraction } else { u })
            .max(lit(MIN_SHARE))
            .min(T::one() - lit(MIN_SHARE));

        let mut left = Bin {
            lower: parent.lower.clone(),
            upper: parent.upper.clone(),
            importance: parent.importance * share,
            depth: parent.depth + 1,
            parent: Some(index),
            children: None,
            split: None,
            stats: Vec::with_capacity(parent.stats.len()),
        };
        left.upper[dim] = point;

        let mut right = Bin {
            lower: parent.lower.clone(),
            importance: parent.importance - left.importance,
            stats: Vec::with_capacity(parent.stats.len()),
            ..left.clone()
        };
        right.lower[dim] = point;
        right.upper = parent.upper.clone();

        for d in 0..self.dimensions() {
            let stats = parent.stats(d);

            if d == dim {
                left.stats.extend(rebin(stats, T::zero(), u));
                right.stats.extend(rebin(stats, u, T::one()));
            } else {
                left.stats.extend(stats.iter().map(|&s| s * fraction));
                right.stats.extend(stats.iter().map(|&s| s * (T::one() - fraction)));
            }
        }

        let left = self.alloc(left);
        let right = self.alloc(right);

        let bin = self.bin_mut(index);
        bin.children = Some((left, right));
        bin.split = Some((dim, point));
        bin.stats.iter_mut().for_each(|s| *s = T::zero());

        if self.current == Some(index) {
            self.current = None;
        }

        self.leaves += 1;
        self.revision += 1;

        debug!(
            "split bin {} along dimension {} at {} into bins {} and {} ({} leaves)",
            index, dim, point, left, right, self.leaves
        );

        true
    }

    fn alloc(&mut self, bin: Bin<T>) -> usize {
        if let Some(index) = self.free.pop() {
            self.bins[index] = Some(bin);
            index
        } else {
            self.bins.push(Some(bin));
            self.bins.len() - 1
        }
    }

    /// Removes all bins except a fresh root and forgets all statistics. Sub-grid views stay
    /// registered.
    pub fn reset(&mut self) {
        for index in 1..self.bins.len() {
            if self.bins[index].take().is_some() {
                self.free.push(index);
            }
        }

        self.bins[0] = Some(Bin::root(self.lower.clone(), self.upper.clone()));
        self.leaves = 1;
        self.revision += 1;
        self.exhausted = false;
        self.current = None;
        self.current_u.clear();
        self.xsec = CrossSectionEstimator::default();
    }
}

impl<T: Clone> Clone for Grid<T> {
    fn clone(&self) -> Self {
        Self {
            mode: self.mode,
            shape: self.shape.clone(),
            lower: self.lower.clone(),
            upper: self.upper.clone(),
            budget: self.budget,
            bins: self.bins.clone(),
            free: self.free.clone(),
            leaves: self.leaves,
            revision: self.revision,
            exhausted: self.exhausted,
            views: 0,
            current: self.current,
            current_u: self.current_u.clone(),
            point: self.point.clone(),
            xsec: self.xsec.clone(),
        }
    }
}

impl<T> Drop for Grid<T> {
    fn drop(&mut self) {
        if self.views > 0 {
            error!(
                "grid dropped while {} sub-grid view(s) are still registered",
                self.views
            );
        }
    }
}

impl<T: Real> Sampler<T> for Grid<T> {
    type Point = Vec<T>;

    fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        Grid::generate(self, rng)
    }

    fn point(&self) -> &Vec<T> {
        &self.point
    }

    fn evaluate_weight(&mut self, point: &Vec<T>) -> Result<T, Miss> {
        self.weight(point)
    }

    fn update(&mut self, value: T) {
        Grid::update(self, value);
    }

    fn adapt(&mut self) {
        Grid::adapt(self);
    }
}
