//! Run configuration of the event generator.
use crate::channels::Channel;
use crate::core::{Miss, Real};
use crate::grid::{Grid, GridMode};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Stream of the random number generator; only the state is derived from the seed.
const STREAM: u128 = 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96;

/// Errors that occur when loading or validating a [`GeneratorConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("could not read the configuration")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON or has unknown fields.
    #[error("could not parse the configuration")]
    Json(#[from] serde_json::Error),
    /// The number of initialisation iterations is zero.
    #[error("at least one initialisation iteration is needed")]
    ZeroIterations,
    /// The batch size is zero.
    #[error("the batch size must be positive")]
    ZeroBatch,
    /// The number of events between two adaptations is zero.
    #[error("the adaptation batch must be positive")]
    ZeroAdaptationBatch,
    /// The bin budget of the grids is zero.
    #[error("the bin budget must be positive")]
    ZeroBudget,
    /// The max-weight histogram has an odd number of bins.
    #[error("the max-weight histogram needs an even number of bins, got {0}")]
    OddHistogramBins(usize),
    /// The max-weight reduction is not in $[0, 1)$.
    #[error("the max-weight reduction must be in [0, 1), got {0}")]
    Reduction(f64),
}

/// Parameters of a generator run.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Seed of the random number generator.
    pub seed: u64,
    /// Number of events per sub-process used to estimate the initial channel weights.
    pub pre_initialisation_events: usize,
    /// Number of adaptation iterations.
    pub iterations: usize,
    /// Number of events per sub-process and iteration.
    pub batch: usize,
    /// Number of events of a sub-process between two adaptations of its sampler.
    pub adaptation_batch: usize,
    /// Largest number of bins of every grid.
    pub bin_budget: usize,
    /// What the importance of a grid bin measures.
    pub grid_mode: GridMode,
    /// Number of bins of the max-weight histogram; zero disables it.
    pub histogram_bins: usize,
    /// Fraction of the cross section that may lie above the reduced maximum weight.
    pub max_weight_reduction: f64,
    /// Relative tolerance of the weight-consistency check, see
    /// [`ProcessSampler::with_config`](crate::process::ProcessSampler::with_config).
    pub drift_tolerance: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            pre_initialisation_events: 1000,
            iterations: 10,
            batch: 10_000,
            adaptation_batch: 100,
            bin_budget: 500,
            grid_mode: GridMode::Cumulant,
            histogram_bins: 1000,
            max_weight_reduction: 1e-3,
            drift_tolerance: 1e-8,
        }
    }
}

impl GeneratorConfig {
    /// Parses and validates a configuration in JSON format. Missing fields take their default
    /// values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the JSON configuration in the file `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the parameters can be used for a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }

        if self.batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }

        if self.adaptation_batch == 0 {
            return Err(ConfigError::ZeroAdaptationBatch);
        }

        if self.bin_budget == 0 {
            return Err(ConfigError::ZeroBudget);
        }

        if self.histogram_bins % 2 != 0 {
            return Err(ConfigError::OddHistogramBins(self.histogram_bins));
        }

        if !(0.0..1.0).contains(&self.max_weight_reduction) {
            return Err(ConfigError::Reduction(self.max_weight_reduction));
        }

        Ok(())
    }

    /// Returns the random number generator seeded with `seed`.
    pub fn rng(&self) -> Pcg64 {
        Pcg64::new(u128::from(self.seed), STREAM)
    }

    /// Returns a flat grid over the hyper-rectangle from `lower` to `upper` with the configured
    /// bin budget and grid mode.
    pub fn grid<T: Real>(&self, lower: Vec<T>, upper: Vec<T>) -> Grid<T> {
        Grid::new(lower, upper, self.bin_budget, self.grid_mode)
    }

    /// Returns a grid shaped like `channel` with the configured bin budget and grid mode, see
    /// [`Grid::with_shape`].
    pub fn shaped_grid<T: Real>(&self, channel: &Channel<T>) -> Result<Grid<T>, Miss> {
        Grid::with_shape(channel, self.bin_budget, self.grid_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::from_json("{}").unwrap();

        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.grid_mode, GridMode::Cumulant);
    }

    #[test]
    fn test_from_json() {
        let config = GeneratorConfig::from_json(
            r#"{ "seed": 42, "iterations": 3, "grid_mode": "MaxWeight", "histogram_bins": 0 }"#,
        )
        .unwrap();

        assert_eq!(config.seed, 42);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.grid_mode, GridMode::MaxWeight);
        assert_eq!(config.histogram_bins, 0);
        assert_eq!(config.batch, 10_000);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "iterations": 0 }"#),
            Err(ConfigError::ZeroIterations)
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "batch": 0 }"#),
            Err(ConfigError::ZeroBatch)
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "adaptation_batch": 0 }"#),
            Err(ConfigError::ZeroAdaptationBatch)
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "bin_budget": 0 }"#),
            Err(ConfigError::ZeroBudget)
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "histogram_bins": 7 }"#),
            Err(ConfigError::OddHistogramBins(7))
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "max_weight_reduction": 1.0 }"#),
            Err(ConfigError::Reduction(_))
        ));
        assert!(matches!(
            GeneratorConfig::from_json(r#"{ "unknown": 1 }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            GeneratorConfig::load("/nonexistent/adaptir.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_grids() {
        let config = GeneratorConfig::from_json(r#"{ "bin_budget": 32, "grid_mode": "MaxWeight" }"#)
            .unwrap();

        let grid = config.grid(vec![0.0, 0.0], vec![1.0, 2.0]);
        assert_eq!(grid.budget(), 32);
        assert_eq!(grid.mode(), GridMode::MaxWeight);
        assert_eq!(grid.dimensions(), 2);

        let shaped = config.shaped_grid(&Channel::uniform(0.0, 5.0)).unwrap();
        assert_eq!(shaped.budget(), 32);
        assert_eq!(shaped.upper(), &[5.0]);
    }

    #[test]
    fn test_rng_is_reproducible() {
        let config = GeneratorConfig {
            seed: 7,
            ..GeneratorConfig::default()
        };

        let x: f64 = config.rng().gen();
        let y: f64 = config.rng().gen();

        assert_eq!(x, y);
    }
}
