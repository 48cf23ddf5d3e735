//! Implementation of different callback functions.
use crate::core::estimators::{CrossSectionEstimator, Estimators};
use crate::core::{Checkpoint, Real};

/// Trait for implementing callbacks for iterative MC algorithms
pub trait Callback<T, R, E>
where
    T: Copy,
{
    /// This method is called after each successfully finished iteration and may print information
    /// about it.
    fn print(&self, chkpts: &[Checkpoint<T, R, E>]);
}

/// A callback function that does nothing
pub struct SinkCallback {}

impl<T, R, E> Callback<T, R, E> for SinkCallback
where
    T: Copy,
{
    fn print(&self, _: &[Checkpoint<T, R, E>]) {}
}

/// A callback function that prints the result of each individual iteration together with the
/// channel weights it ended with.
pub struct SimpleCallback {}

impl<T, R> Callback<T, R, CrossSectionEstimator<T>> for SimpleCallback
where
    T: Real,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, CrossSectionEstimator<T>>]) {
        if let Some(chkpt) = chkpts.last() {
            let estimators = chkpt.estimators();
            println!("iteration {} finished.", chkpts.len() - 1);
            println!(
                "this iteration: N={} E={} alphas={:?}",
                estimators.calls(),
                estimators.cross_section(),
                chkpt.alphas()
            );
        }
    }
}

/// Simple cumulative callback that shows the result of the individual iteration together with
/// the cumulative result combining it with the previous iterations.
pub struct SimpleCumulativeCallback {}

impl<T, R> Callback<T, R, CrossSectionEstimator<T>> for SimpleCumulativeCallback
where
    T: Real,
{
    fn print(&self, chkpts: &[Checkpoint<T, R, CrossSectionEstimator<T>>]) {
        let iteration = chkpts.len();

        if iteration == 0 {
            return;
        }

        let last = chkpts[iteration - 1].estimators();

        let cumulative = chkpts
            .iter()
            .map(Checkpoint::estimators)
            .fold(CrossSectionEstimator::default(), |acc, e| acc + e.clone());

        println!(
            "[iteration {}: N={} E={}] [Cumulative: N={}, E={}]",
            iteration - 1,
            last.calls(),
            last.cross_section(),
            cumulative.calls(),
            cumulative.cross_section()
        );
    }
}
