use crate::channels::Channel;
use crate::core::{Miss, Real};
use crate::grid::{Grid, SubGrid};
use rand::Rng;

/// A kinematic degree of freedom, for example the invariant mass squared of a resonance, whose
/// bounds are moved for every event.
#[derive(Debug)]
pub enum Dimension<T> {
    /// A fixed-shape channel.
    Channel(Channel<T>),
    /// A one-dimensional adaptive grid, sampled through a view whose bounds follow the
    /// kinematics.
    Grid {
        /// The grid.
        grid: Grid<T>,
        /// The view into `grid`.
        view: SubGrid<T>,
    },
}

impl<T: Real> Dimension<T> {
    /// Wraps the one-dimensional `grid`.
    ///
    /// # Panics
    ///
    /// Panics if `grid` has more than one dimension.
    pub fn grid(mut grid: Grid<T>) -> Self {
        let view = grid.sub_grid(grid.lower()[0], grid.upper()[0]);

        Self::Grid { grid, view }
    }

    /// Moves the bounds to `lower` and `upper`. Grids are never extended beyond their domain.
    pub fn refresh_bounds(&mut self, lower: T, upper: T) {
        match self {
            Self::Channel(channel) => channel.refresh_bounds(lower, upper),
            Self::Grid { grid, view } => view.refresh_bounds(grid, lower, upper),
        }
    }

    /// Returns `true` if something can be generated within the current bounds.
    pub fn normalisable(&self) -> bool {
        match self {
            Self::Channel(channel) => channel.normalisable(),
            Self::Grid { view, .. } => view.normalisable(),
        }
    }

    /// Generates a value and returns its weight.
    pub fn generate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        match self {
            Self::Channel(channel) => channel.generate(rng),
            Self::Grid { grid, view } => view.generate(grid, rng),
        }
    }

    /// Returns the value generated last.
    pub fn value(&self) -> T {
        match self {
            Self::Channel(channel) => channel.value(),
            Self::Grid { grid, .. } => grid.point()[0],
        }
    }

    /// Returns the weight `generate` would have assigned to `x` within the current bounds.
    pub fn weight(&mut self, x: T) -> Result<T, Miss> {
        match self {
            Self::Channel(channel) => channel.weight(x),
            Self::Grid { grid, view } => view.weight(grid, x),
        }
    }

    /// Feeds `value` back into the grid. Channels do not adapt.
    pub fn update(&mut self, value: T) {
        if let Self::Grid { grid, view } = self {
            view.update(grid, value);
        }
    }

    /// Adapts the grid. Channels do not adapt.
    pub fn adapt(&mut self) {
        if let Self::Grid { grid, view } = self {
            view.adapt(grid);
        }
    }
}

impl<T: Real> Clone for Dimension<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Channel(channel) => Self::Channel(channel.clone()),
            Self::Grid { grid, view } => {
                let mut grid = grid.clone();
                let view = grid.clone_view(view);

                Self::Grid { grid, view }
            }
        }
    }
}

impl<T> Drop for Dimension<T> {
    fn drop(&mut self) {
        if let Self::Grid { grid, .. } = self {
            grid.unregister_view();
        }
    }
}
