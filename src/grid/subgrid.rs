//! Views that restrict a one-dimensional grid to a part of its domain.
use super::Grid;
use crate::core::{Miss, Real};
use log::trace;
use rand::Rng;

/// Restriction of a one-dimensional [`Grid`] to the interval from `lower` to `upper`.
///
/// A view owns no bins: generation, updates and adaptation act on the tree of the grid it was
/// created from, which must be passed to every call. Generation draws $\rho$ only from
/// $[s_\mathrm{min}, s_\mathrm{max}]$, the cumulative importances of the grid at both ends of the
/// interval, and weights are normalised to $s_\mathrm{max} - s_\mathrm{min}$. The offsets are
/// recomputed whenever the bounds move or the importances of the grid have changed.
///
/// A view is registered with its grid until it is given back with [`SubGrid::release`]. Views
/// are not `Clone`; a second view with the same interval is made with [`Grid::clone_view`], which
/// registers it.
#[derive(Debug, PartialEq)]
pub struct SubGrid<T> {
    lower: T,
    upper: T,
    smin: T,
    smax: T,
    revision: u64,
}

impl<T: Real> Grid<T> {
    /// Creates a view restricted to the interval from `lower` to `upper`.
    ///
    /// # Panics
    ///
    /// Panics if this grid has more than one dimension.
    pub fn sub_grid(&mut self, lower: T, upper: T) -> SubGrid<T> {
        assert_eq!(self.dimensions(), 1, "sub-grids exist for one-dimensional grids only");

        self.views += 1;

        let mut view = SubGrid {
            lower,
            upper,
            smin: T::zero(),
            smax: T::zero(),
            revision: self.revision,
        };
        view.refresh_bounds(self, lower, upper);
        view
    }

    /// Creates and registers a view with the same interval as `view`, which may belong to a
    /// different grid, e.g. the one this grid was cloned from.
    pub fn clone_view(&mut self, view: &SubGrid<T>) -> SubGrid<T> {
        self.sub_grid(view.lower, view.upper)
    }
}

impl<T> Grid<T> {
    pub(crate) fn unregister_view(&mut self) {
        self.views = self.views.saturating_sub(1);
    }
}

impl<T: Real> SubGrid<T> {
    /// Returns the lower bound of the interval.
    pub fn lower(&self) -> T {
        self.lower
    }

    /// Returns the upper bound of the interval.
    pub fn upper(&self) -> T {
        self.upper
    }

    /// Returns the cumulative importance of the grid at the lower bound.
    pub fn smin(&self) -> T {
        self.smin
    }

    /// Returns the cumulative importance of the grid at the upper bound.
    pub fn smax(&self) -> T {
        self.smax
    }

    /// Moves the interval. The bounds are clipped to the domain of `grid`.
    pub fn refresh_bounds(&mut self, grid: &Grid<T>, lower: T, upper: T) {
        self.lower = lower.max(grid.lower[0]);
        self.upper = upper.min(grid.upper[0]);
        self.recompute(grid);
    }

    fn recompute(&mut self, grid: &Grid<T>) {
        if self.lower < self.upper {
            self.smin = grid.cumulant_at(self.lower);
            self.smax = grid.cumulant_at(self.upper);
        } else {
            self.smin = T::zero();
            self.smax = T::zero();
        }

        self.revision = grid.revision;
    }

    fn sync(&mut self, grid: &Grid<T>) {
        if self.revision != grid.revision {
            self.recompute(grid);
        }
    }

    /// Returns `true` if the interval is not empty.
    pub fn normalisable(&self) -> bool {
        self.smax > self.smin
    }

    /// Generates a point of `grid` inside the interval and returns its weight. The point is
    /// accessible through [`Grid::point`].
    pub fn generate<R: Rng + ?Sized>(&mut self, grid: &mut Grid<T>, rng: &mut R) -> Result<T, Miss> {
        self.sync(grid);

        if !self.normalisable() {
            trace!("sub-grid [{}, {}] is empty", self.lower, self.upper);
            return Err(Miss::NotNormalisable);
        }

        let weight = grid.generate_in(self.smin, self.smax, rng)?;
        grid.point[0] = grid.point[0].max(self.lower).min(self.upper);

        Ok(weight)
    }

    /// Returns the weight `generate` would have assigned to `x`.
    pub fn weight(&mut self, grid: &Grid<T>, x: T) -> Result<T, Miss> {
        self.sync(grid);

        if !self.normalisable() {
            return Err(Miss::NotNormalisable);
        }

        if x < self.lower || x > self.upper {
            return Err(Miss::OutOfDomain);
        }

        let leaf = grid.find_leaf(&[x]).ok_or(Miss::OutOfDomain)?;
        grid.leaf_weight(leaf, &[x], self.smax - self.smin)
    }

    /// Passes `value` to [`Grid::update`].
    pub fn update(&self, grid: &mut Grid<T>, value: T) {
        grid.update(value);
    }

    /// Passes the call to [`Grid::adapt`].
    pub fn adapt(&self, grid: &mut Grid<T>) {
        grid.adapt();
    }

    /// Unregisters this view from `grid`, which must be the grid it was created from.
    pub fn release(self, grid: &mut Grid<T>) {
        grid.unregister_view();
    }
}
