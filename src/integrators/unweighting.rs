//! Conversion of weighted events into events with unit weight.
use crate::core::{count, uniform, Real};
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of events `MultiChannel::next_unweighted_event` tries before it gives up, unless set
/// otherwise.
const DEFAULT_MAX_TRIALS: usize = 1_000_000;

/// Accept-reject unweighting against a maximum weight $w_\mathrm{max}$: an event with weight $w$
/// is accepted with the probability $w / w_\mathrm{max}$.
///
/// An event with $w > w_\mathrm{max}$ is accepted, counted and logged; if this happens often, the
/// maximum weight was chosen too small.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Unweighter<T> {
    max_weight: T,
    max_trials: usize,
    trials: usize,
    accepted: usize,
    overweight: usize,
}

impl<T: Real> Unweighter<T> {
    /// Constructor.
    pub fn new(max_weight: T) -> Self {
        Self {
            max_weight,
            max_trials: DEFAULT_MAX_TRIALS,
            trials: 0,
            accepted: 0,
            overweight: 0,
        }
    }

    /// Sets how many weighted events are tried at most for a single unweighted event.
    pub fn with_max_trials(mut self, max_trials: usize) -> Self {
        self.max_trials = max_trials;
        self
    }

    /// Returns the maximum weight.
    pub fn max_weight(&self) -> T {
        self.max_weight
    }

    /// Returns how many weighted events are tried at most for a single unweighted event.
    pub fn max_trials(&self) -> usize {
        self.max_trials
    }

    /// Returns the number of weighted events seen.
    pub fn trials(&self) -> usize {
        self.trials
    }

    /// Returns the number of accepted events.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Returns the number of accepted events whose weight exceeded the maximum weight.
    pub fn overweight(&self) -> usize {
        self.overweight
    }

    /// Returns the fraction of accepted events.
    pub fn efficiency(&self) -> T {
        count::<T>(self.accepted) / count(self.trials)
    }

    /// Decides whether the event with weight `weight` is kept.
    pub fn accept<R: Rng + ?Sized>(&mut self, weight: T, rng: &mut R) -> bool {
        self.trials += 1;

        if !(weight.is_finite() && weight > T::zero()) {
            return false;
        }

        if weight > self.max_weight {
            self.overweight += 1;
            self.accepted += 1;
            warn!(
                "event weight {} exceeds the maximum weight {} ({} of {} events so far)",
                weight, self.max_weight, self.overweight, self.trials
            );
            return true;
        }

        if uniform::<T, _>(rng) * self.max_weight < weight {
            self.accepted += 1;
            true
        } else {
            false
        }
    }
}
