#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! The crate `adaptir` provides adaptive importance sampling of phase space for Monte Carlo event
//! generators: one-dimensional channels for kinematic invariants, a self-refining grid that learns
//! where an integrand is large, a phase-space sampler for single sub-processes and a multi-channel
//! accumulator that estimates cross sections and produces unweighted events.
//!
//! # Features
//!
//! - **Generic numeric type**. Every sampler is generic over its numeric type, which can be `f32`,
//! `f64` or any other type implementing the `Float` trait from `num-traits`, see [`Real`].
//! - **Explicit random numbers**. There is no global random number generator: every call that
//! generates something takes a generator implementing the `Rng` trait from `rand`. Resetting (or
//! deserialising) the generator replays a run exactly.
//! - **Misses are values**. Points that are kinematically forbidden or fail the cuts are common in
//! phase-space generation. They are returned as a [`Miss`] and never abort a run.
//! - **Checkpoints**. The initialisation of a [`integrators::MultiChannel`] returns a
//! [`Checkpoint`] after every iteration, which stores the random number generator before and after
//! the iteration, the estimated cross section and the channel weights. Grids can be saved and
//! restored in a tagged text format.
//! - **Non-finite number filtering**. Non-finite integrand values are counted and replaced by
//! zero.
//!
//! # What is ...?
//!
//! Given a cross section
//!
//! $$ \sigma = \int \mathrm{d} \Phi \, f(\Phi) \, , $$
//!
//! a sampler generates points $\Phi_j$ with a density $g$ and returns the *weight*
//! $w_j = 1 / g(\Phi_j)$, so that
//!
//! $$ \sigma \approx \frac{1}{N} \sum_{j=1}^N w_j f(\Phi_j) \, . $$
//!
//! - a *channel* maps a uniform random number onto a kinematic invariant with the inversion
//! method,
//! - a *grid* partitions a domain into bins and samples each bin with a probability proportional
//! to its *importance*, which is learnt from the values $w f$ fed back with `update`,
//! - *adapting* a grid splits its most important bin,
//! - a *sub-process* is a single final state with its own phase-space sampler and matrix element,
//! - *unweighting* turns weighted events into events of unit weight by accepting each event with
//! the probability $w / w_\mathrm{max}$.

pub mod callbacks;
pub mod channels;
pub mod config;
pub mod core;
pub mod grid;
pub mod histograms;
pub mod integrators;
pub mod kinematics;
pub mod process;

pub use crate::core::*;
