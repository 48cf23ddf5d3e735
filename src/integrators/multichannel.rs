//! Multi-channel accumulation of the cross sections of several sub-processes.
use super::Unweighter;
use crate::callbacks::Callback;
use crate::config::GeneratorConfig;
use crate::core::estimators::{
    BasicEstimators, CrossSection, CrossSectionEstimator, Estimators, Updateable,
};
use crate::core::{count, lit, uniform, Checkpoint, MatrixElement, Miss, Real, Sampler};
use crate::histograms::WeightHistogram;
use log::{debug, info, trace};
use rand::Rng;

/// Smallest channel weight, relative to the uniform weight $1/N$, a sub-process keeps after the
/// channel weights have been adapted.
const MIN_ALPHA_SHARE: f64 = 1e-3;

/// Number of events of a sub-process between two adaptations of its sampler during the
/// initialisation, unless set otherwise.
const DEFAULT_ADAPTATION_BATCH: usize = 100;

/// A sub-process: its phase-space sampler, its matrix element, its channel weight $\alpha$ and the
/// estimator of its cross section.
#[derive(Clone, Debug)]
pub struct SubProcess<S, M, T> {
    sampler: S,
    matrix_element: M,
    alpha: T,
    estimator: CrossSectionEstimator<T>,
}

impl<S, M, T> SubProcess<S, M, T>
where
    S: Sampler<T>,
    M: MatrixElement<S::Point, T>,
    T: Real,
{
    /// Returns the phase-space sampler.
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Returns the matrix element.
    pub fn matrix_element(&self) -> &M {
        &self.matrix_element
    }

    /// Returns the probability with which this sub-process is chosen.
    pub fn alpha(&self) -> T {
        self.alpha
    }

    /// Returns the estimator of the cross section.
    pub fn estimator(&self) -> &CrossSectionEstimator<T> {
        &self.estimator
    }

    /// Generates a point and returns the weighted integrand $w f$, which is also fed back to the
    /// sampler.
    fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        match self.sampler.generate(rng) {
            Ok(weight) => {
                let value = weight * self.matrix_element.evaluate(self.sampler.point());
                self.sampler.update(value);
                Ok(value)
            }
            Err(miss) => {
                trace!("sub-process missed: {}", miss);
                self.sampler.update(T::zero());
                Err(miss)
            }
        }
    }
}

/// Integrator and event generator for the sum of several sub-processes. Each event is generated
/// for a single sub-process, which is chosen with the probability $\alpha_i$, and has the weight
/// $w f / \alpha_i$.
///
/// Every event updates the cross-section estimators of all sub-processes: the chosen one with the
/// weight of the event, all others with zero. The mean of estimator $i$ is therefore the cross
/// section of sub-process $i$ and the total cross section is their sum, with errors combined in
/// quadrature. Since a single event enters all estimators, they are negatively correlated and the
/// quadrature sum overestimates the error of the total; [`MultiChannel::direct_cross_section`]
/// estimates the total from the event weights themselves.
#[derive(Clone, Debug)]
pub struct MultiChannel<S, M, T> {
    processes: Vec<SubProcess<S, M, T>>,
    total: CrossSectionEstimator<T>,
    adaptation_batch: usize,
    histogram: Option<WeightHistogram<T>>,
    last: Option<usize>,
}

impl<S, M, T: Real> Default for MultiChannel<S, M, T> {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            total: CrossSectionEstimator::default(),
            adaptation_batch: DEFAULT_ADAPTATION_BATCH,
            histogram: None,
            last: None,
        }
    }
}

impl<S, M, T> MultiChannel<S, M, T>
where
    S: Sampler<T>,
    M: MatrixElement<S::Point, T>,
    T: Real,
{
    /// Constructs an accumulator without sub-processes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sub-process with channel weight $1/N$; the other channel weights are scaled down
    /// accordingly. All cross-section estimators are reset.
    pub fn push(&mut self, sampler: S, matrix_element: M) {
        let n = count::<T>(self.processes.len() + 1);

        for process in &mut self.processes {
            process.alpha = process.alpha * (n - T::one()) / n;
        }

        self.processes.push(SubProcess {
            sampler,
            matrix_element,
            alpha: n.recip(),
            estimator: CrossSectionEstimator::default(),
        });
        self.reset_estimators();
    }

    /// Removes the sub-process `index` and renormalises the remaining channel weights. All
    /// cross-section estimators are reset.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn remove(&mut self, index: usize) -> SubProcess<S, M, T> {
        let process = self.processes.remove(index);
        let alphas: Vec<_> = self.processes.iter().map(|p| p.alpha).collect();
        self.set_alphas(&alphas);
        self.reset_estimators();
        self.last = None;
        process
    }

    /// Sets after how many of its events the sampler of a sub-process adapts during the
    /// initialisation.
    ///
    /// # Panics
    ///
    /// Panics if `events` is zero.
    pub fn set_adaptation_batch(&mut self, events: usize) {
        assert!(events > 0, "the adaptation batch must be positive");
        self.adaptation_batch = events;
    }

    /// Returns after how many of its events the sampler of a sub-process adapts during the
    /// initialisation.
    pub fn adaptation_batch(&self) -> usize {
        self.adaptation_batch
    }

    /// Returns the sub-processes.
    pub fn processes(&self) -> &[SubProcess<S, M, T>] {
        &self.processes
    }

    /// Returns the sub-process `index`.
    pub fn process(&self, index: usize) -> &SubProcess<S, M, T> {
        &self.processes[index]
    }

    /// Returns the channel weights.
    pub fn alphas(&self) -> Vec<T> {
        self.processes.iter().map(|p| p.alpha).collect()
    }

    /// Returns the index of the sub-process the last event was generated for.
    pub fn last_process(&self) -> Option<usize> {
        self.last
    }

    /// Returns the point of the last event.
    pub fn point(&self) -> Option<&S::Point> {
        self.last.map(|index| self.processes[index].sampler.point())
    }

    /// Sets the channel weights proportional to `weights`, while keeping each of them at least
    /// at `MIN_ALPHA_SHARE` times the uniform weight. If the weights vanish, uniform weights are
    /// used.
    fn set_alphas(&mut self, weights: &[T]) {
        let n = count::<T>(weights.len());
        let total = weights.iter().fold(T::zero(), |acc, &w| acc + w);

        if !(total.is_finite() && total > T::zero()) {
            for process in &mut self.processes {
                process.alpha = n.recip();
            }
            return;
        }

        let floor = lit::<T>(MIN_ALPHA_SHARE) / n;
        let floored: Vec<_> = weights.iter().map(|&w| (w / total).max(floor)).collect();
        let sum = floored.iter().fold(T::zero(), |acc, &w| acc + w);

        for (process, alpha) in self.processes.iter_mut().zip(floored) {
            process.alpha = alpha / sum;
        }
    }

    fn reset_estimators(&mut self) {
        for process in &mut self.processes {
            process.estimator = CrossSectionEstimator::default();
        }

        self.total = CrossSectionEstimator::default();
    }

    /// Chooses a sub-process according to the channel weights.
    fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let mut r = uniform::<T, _>(rng);

        for (index, process) in self.processes.iter().enumerate() {
            if r < process.alpha {
                return index;
            }

            r -= process.alpha;
        }

        // rounding left a tiny remainder
        self.processes.len() - 1
    }

    /// Runs `events` events for each sub-process to obtain a rough estimate of their cross
    /// sections, and sets the channel weights proportional to them. The samplers are not adapted.
    pub fn pre_initialise<R: Rng + ?Sized>(&mut self, events: usize, rng: &mut R) {
        let mut estimates = Vec::with_capacity(self.processes.len());

        for process in &mut self.processes {
            let mut estimator = CrossSectionEstimator::default();

            for _ in 0..events {
                estimator.update(process.sample(rng).unwrap_or_else(|_| T::zero()));
            }

            estimates.push(estimator.mean().abs());
        }

        self.set_alphas(&estimates);

        info!("pre-initialisation finished, channel weights: {:?}", self.alphas());
    }

    /// Adapts the samplers and the channel weights in `iterations` iterations of `batch` events
    /// per sub-process. Within an iteration the sampler of a sub-process adapts after every
    /// [`MultiChannel::adaptation_batch`] of its events; at the end of the iteration the channel
    /// weights are set proportional to the cross sections estimated in this iteration. The total
    /// cross section of each iteration is returned in a checkpoint, which is also passed to
    /// `callback`.
    ///
    /// The cross-section estimators are reset afterwards, since the events of the iterations were
    /// generated with different channel weights and samplers.
    pub fn initialise<R, C>(
        &mut self,
        iterations: usize,
        batch: usize,
        rng: &mut R,
        callback: &C,
    ) -> Vec<Checkpoint<T, R, CrossSectionEstimator<T>>>
    where
        R: Clone + Rng,
        C: Callback<T, R, CrossSectionEstimator<T>>,
    {
        let mut checkpoints = Vec::with_capacity(iterations);
        let events = batch * self.processes.len();

        for iteration in 0..iterations {
            let rng_before = rng.clone();
            let mut total = CrossSectionEstimator::default();
            let mut partial = vec![CrossSectionEstimator::default(); self.processes.len()];
            let mut seen = vec![0_usize; self.processes.len()];

            for _ in 0..events {
                let chosen = self.choose(rng);
                let process = &mut self.processes[chosen];
                let value = process.sample(rng).unwrap_or_else(|_| T::zero()) / process.alpha;

                seen[chosen] += 1;

                if seen[chosen] % self.adaptation_batch == 0 {
                    process.sampler.adapt();
                }

                total.update(value);

                for (index, estimator) in partial.iter_mut().enumerate() {
                    estimator.update(if index == chosen { value } else { T::zero() });
                }
            }

            let estimates: Vec<_> = partial.iter().map(|e| e.mean().abs()).collect();
            self.set_alphas(&estimates);

            debug!(
                "iteration {}: {} with channel weights {:?}",
                iteration,
                total.cross_section(),
                self.alphas()
            );

            checkpoints.push(Checkpoint::new(
                rng_before,
                rng.clone(),
                total,
                self.alphas(),
            ));
            callback.print(&checkpoints);
        }

        self.reset_estimators();
        self.last = None;

        if let Some(checkpoint) = checkpoints.last() {
            info!(
                "initialisation finished after {} iterations: {}",
                iterations,
                checkpoint.estimators().cross_section()
            );
        }

        checkpoints
    }

    /// Runs the pre-initialisation and the initialisation with the parameters in `config`, and
    /// enables the max-weight histogram if `config` asks for one. The adaptation batch is taken
    /// from `config` as well.
    pub fn initialise_with<R, C>(
        &mut self,
        config: &GeneratorConfig,
        rng: &mut R,
        callback: &C,
    ) -> Vec<Checkpoint<T, R, CrossSectionEstimator<T>>>
    where
        R: Clone + Rng,
        C: Callback<T, R, CrossSectionEstimator<T>>,
    {
        self.set_adaptation_batch(config.adaptation_batch);

        if config.pre_initialisation_events > 0 {
            self.pre_initialise(config.pre_initialisation_events, rng);
        }

        let checkpoints = self.initialise(config.iterations, config.batch, rng, callback);

        if config.histogram_bins > 0 {
            self.enable_max_weight_histogram(config.histogram_bins);
        }

        checkpoints
    }

    /// Integrates every sub-process separately with `calls` events and returns the sum of their
    /// cross sections. The channel weights and the estimators are not used.
    pub fn integrate<R: Rng + ?Sized>(&mut self, calls: usize, rng: &mut R) -> CrossSection<T> {
        self.processes
            .iter_mut()
            .map(|process| {
                let mut estimator = CrossSectionEstimator::default();

                for _ in 0..calls {
                    estimator.update(process.sample(rng).unwrap_or_else(|_| T::zero()));
                }

                estimator.cross_section()
            })
            .fold(CrossSection::zero(), |acc, xs| acc + xs)
    }

    /// Generates an event and returns its weight $w f / \alpha_i$. Misses are returned as errors,
    /// but still enter the estimators with a zero weight.
    ///
    /// # Panics
    ///
    /// Panics if there are no sub-processes.
    pub fn generate_event<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<T, Miss> {
        assert!(!self.processes.is_empty(), "no sub-process to generate events for");

        let chosen = self.choose(rng);
        let process = &mut self.processes[chosen];
        let result = process.sample(rng).map(|value| value / process.alpha);
        let value = result.unwrap_or_else(|_| T::zero());

        for (index, process) in self.processes.iter_mut().enumerate() {
            process
                .estimator
                .update(if index == chosen { value } else { T::zero() });
        }

        self.total.update(value);

        if let Some(histogram) = &mut self.histogram {
            histogram.fill(value);
        }

        self.last = result.ok().map(|_| chosen);

        result
    }

    /// Returns the total cross section.
    pub fn cross_section(&self) -> CrossSection<T> {
        self.processes
            .iter()
            .map(|process| process.estimator.cross_section())
            .fold(CrossSection::zero(), |acc, xs| acc + xs)
    }

    /// Returns the total cross section estimated from the weights of the events, without splitting
    /// it into sub-processes. For non-negative matrix elements its error is never larger than the
    /// one of [`MultiChannel::cross_section`].
    pub fn direct_cross_section(&self) -> CrossSection<T> {
        self.total.cross_section()
    }

    /// Returns the cross section of every sub-process.
    pub fn process_cross_sections(&self) -> Vec<CrossSection<T>> {
        self.processes
            .iter()
            .map(|process| process.estimator.cross_section())
            .collect()
    }

    /// Returns the number of events generated since the estimators were last reset.
    pub fn events(&self) -> usize {
        self.total.calls()
    }

    /// Starts recording the weights of all further events in a histogram with `bins` bins.
    pub fn enable_max_weight_histogram(&mut self, bins: usize) {
        self.histogram = Some(WeightHistogram::new(bins));
    }

    /// Returns the max-weight histogram, if it is enabled.
    pub fn max_weight_histogram(&self) -> Option<&WeightHistogram<T>> {
        self.histogram.as_ref()
    }

    /// Returns the weight above which at most the fraction `epsilon` of the cross section lies,
    /// if the max-weight histogram is enabled.
    pub fn reduced_max_weight(&self, epsilon: T) -> Option<T> {
        self.histogram
            .as_ref()
            .map(|histogram| histogram.reduced_max_weight(epsilon))
    }

    /// Generates events until `unweighter` accepts one, and returns the index of its sub-process.
    /// The event is accessible through [`MultiChannel::point`]. Returns `None` if no event was
    /// accepted within the trial limit of `unweighter`. Misses count as rejected trials, so that
    /// the efficiency of `unweighter` is the cross section over the maximum weight.
    pub fn next_unweighted_event<R: Rng + ?Sized>(
        &mut self,
        unweighter: &mut Unweighter<T>,
        rng: &mut R,
    ) -> Option<usize> {
        for _ in 0..unweighter.max_trials() {
            let weight = self.generate_event(rng).unwrap_or_else(|_| T::zero());

            if unweighter.accept(weight, rng) {
                return self.last;
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::SinkCallback;
    use crate::channels::Channel;
    use assert_approx_eq::assert_approx_eq;
    use rand_pcg::Pcg64;

    type Process = MultiChannel<Channel<f64>, fn(&f64) -> f64, f64>;

    fn rng() -> Pcg64 {
        Pcg64::new(0xcafef00dd15ea5e5, 0xa02bdbf7bb3c0a7ac28fa16a64abf96)
    }

    fn linear(x: &f64) -> f64 {
        *x
    }

    fn cubic(x: &f64) -> f64 {
        x * x * x
    }

    fn two_processes() -> Process {
        let mut multi: Process = MultiChannel::new();
        // integrals 1/2 and 4
        multi.push(Channel::uniform(0.0, 1.0), linear);
        multi.push(Channel::uniform(0.0, 2.0), cubic);
        multi
    }

    #[test]
    fn test_push_and_remove() {
        let mut multi = two_processes();
        multi.push(Channel::uniform(0.0, 3.0), linear);

        for &alpha in &multi.alphas() {
            assert_approx_eq!(alpha, 1.0 / 3.0);
        }

        let removed = multi.remove(1);
        assert_eq!(removed.sampler().upper(), 2.0);
        assert_eq!(multi.processes().len(), 2);

        for &alpha in &multi.alphas() {
            assert_approx_eq!(alpha, 0.5);
        }
    }

    #[test]
    fn test_pre_initialise() {
        let mut rng = rng();
        let mut multi = two_processes();

        multi.pre_initialise(10_000, &mut rng);

        let alphas = multi.alphas();
        assert_approx_eq!(alphas[0] + alphas[1], 1.0);
        assert_approx_eq!(alphas[0], 1.0 / 9.0, 0.01);
    }

    #[test]
    fn test_generate_events() {
        let mut rng = rng();
        let mut multi = two_processes();
        let checkpoints = multi.initialise(3, 1000, &mut rng, &SinkCallback {});

        assert_eq!(checkpoints.len(), 3);
        assert_eq!(checkpoints[2].estimators().calls(), 2000);
        assert_eq!(multi.events(), 0);

        for _ in 0..100_000 {
            multi.generate_event(&mut rng).unwrap();
        }

        let xs = multi.cross_section();
        assert!((xs.value() - 4.5).abs() < 5.0 * xs.error());
        assert!(xs.relative_error() < 0.01);

        let parts = multi.process_cross_sections();
        assert!((parts[0].value() - 0.5).abs() < 5.0 * parts[0].error());
        assert!((parts[1].value() - 4.0).abs() < 5.0 * parts[1].error());
        assert_approx_eq!(xs.error(), parts[0].error().hypot(parts[1].error()));

        // the correlation between the sub-processes makes the quadrature sum too pessimistic
        let direct = multi.direct_cross_section();
        assert_approx_eq!(direct.value(), xs.value(), 1e-9 * xs.value());
        assert!(direct.error() <= xs.error());
        assert_eq!(multi.events(), 100_000);
    }

    #[test]
    fn test_samplers_adapt_within_iterations() {
        use crate::grid::{Grid, GridMode};

        type Grids = MultiChannel<Grid<f64>, fn(&Vec<f64>) -> f64, f64>;

        fn peak(x: &Vec<f64>) -> f64 {
            ((x[0] - 0.3).powi(2) + 1e-4).recip()
        }

        let mut rng = rng();
        let mut multi: Grids = MultiChannel::new();
        multi.push(Grid::new(vec![0.0], vec![1.0], 64, GridMode::Cumulant), peak);
        multi.set_adaptation_batch(20);

        multi.initialise(2, 1000, &mut rng, &SinkCallback {});

        // 2000 events in batches of 20
        let grid = multi.process(0).sampler();
        assert!(grid.is_final());
        assert_eq!(grid.leaf_count(), 64);
    }

    #[test]
    fn test_stratified_integration() {
        let mut rng = rng();
        let mut multi = two_processes();
        let xs = multi.integrate(100_000, &mut rng);

        assert!((xs.value() - 4.5).abs() < 5.0 * xs.error());
    }

    #[test]
    fn test_replay_from_checkpoint() {
        let mut rng = rng();
        let mut first = two_processes();
        let checkpoints = first.initialise(2, 500, &mut rng, &SinkCallback {});

        let mut replay_rng = checkpoints[0].rng_before().clone();
        let mut second = two_processes();
        let replayed = second.initialise(2, 500, &mut replay_rng, &SinkCallback {});

        for (a, b) in checkpoints.iter().zip(&replayed) {
            assert_eq!(a.estimators(), b.estimators());
            assert_eq!(a.alphas(), b.alphas());
        }
    }

    #[test]
    fn test_unweighting() {
        let mut rng = rng();
        let mut multi: Process = MultiChannel::new();
        multi.push(Channel::uniform(0.0, 1.0), linear);
        multi.enable_max_weight_histogram(100);

        // the largest weight is one
        let mut unweighter = Unweighter::new(1.0);

        for _ in 0..10_000 {
            assert_eq!(multi.next_unweighted_event(&mut unweighter, &mut rng), Some(0));
            assert!(multi.point().is_some());
        }

        let histogram = multi.max_weight_histogram().unwrap();
        assert_eq!(histogram.entries(), unweighter.trials());
        assert!(multi.reduced_max_weight(0.0).unwrap() <= 1.0);
        assert_eq!(unweighter.overweight(), 0);
        assert_approx_eq!(unweighter.efficiency(), 0.5, 0.02);
    }
}
