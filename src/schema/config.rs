//! Configuration types for repair runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level repair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Number of generations per trial.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Number of independent trials.
    #[serde(default = "default_trials")]
    pub trials: usize,
    /// Run trials on the rayon pool instead of one after another.
    #[serde(default)]
    pub parallel_trials: bool,
    /// Oracle timeout per test, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Target population size for parent selection.
    /// Defaults to the number of buggy programs.
    #[serde(default)]
    pub population_cap: Option<usize>,
    /// Seed the population with known-correct programs.
    #[serde(default)]
    pub include_corrects: bool,
    /// Fault localization method driving mutation.
    #[serde(default)]
    pub localization: LocalizationMethod,
    /// Scoring constants for divergence-based localization.
    #[serde(default)]
    pub divergence: DivergenceWeights,
    /// Capacity of the oracle and fitness memo tables.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            generations: default_generations(),
            trials: default_trials(),
            parallel_trials: false,
            timeout_secs: default_timeout_secs(),
            population_cap: None,
            include_corrects: false,
            localization: LocalizationMethod::default(),
            divergence: DivergenceWeights::default(),
            cache_capacity: default_cache_capacity(),
            random_seed: None,
        }
    }
}

fn default_generations() -> usize {
    30
}
fn default_trials() -> usize {
    1
}
fn default_timeout_secs() -> f64 {
    1.0
}
fn default_cache_capacity() -> usize {
    4096
}

/// How suspiciousness is computed for the buggy program.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LocalizationMethod {
    /// Compare variable values against the reference run (default).
    #[default]
    Divergence,
    /// Spectrum-based, Tarantula formula.
    Tarantula,
    /// Spectrum-based, Jaccard formula.
    Jaccard,
}

/// Scoring constants for divergence-based localization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DivergenceWeights {
    /// Added when a value diverges under a failing test.
    #[serde(default = "default_fault_weight")]
    pub fault: f64,
    /// Added when a value matches and both runs pass.
    #[serde(default = "default_corroboration_weight")]
    pub corroboration: f64,
    /// Lower bound of the normalized range.
    #[serde(default = "default_floor")]
    pub floor: f64,
    /// Upper bound of the normalized range.
    #[serde(default = "default_ceiling")]
    pub ceiling: f64,
}

impl Default for DivergenceWeights {
    fn default() -> Self {
        Self {
            fault: default_fault_weight(),
            corroboration: default_corroboration_weight(),
            floor: default_floor(),
            ceiling: default_ceiling(),
        }
    }
}

fn default_fault_weight() -> f64 {
    9.0
}
fn default_corroboration_weight() -> f64 {
    1.0
}
fn default_floor() -> f64 {
    0.3
}
fn default_ceiling() -> f64 {
    1.0
}

impl RepairConfig {
    /// Per-test oracle timeout. Saturates for values `validate` rejects.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generations == 0 {
            return Err(ConfigError::InvalidGenerations);
        }
        if self.trials == 0 {
            return Err(ConfigError::InvalidTrials);
        }
        if !self.timeout_secs.is_finite()
            || self.timeout_secs <= 0.0
            || Duration::try_from_secs_f64(self.timeout_secs).is_err()
        {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        if self.population_cap == Some(0) {
            return Err(ConfigError::InvalidPopulationCap);
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity);
        }
        let w = &self.divergence;
        if w.fault < 0.0 || w.corroboration < 0.0 {
            return Err(ConfigError::InvalidWeights(
                "divergence weights must be non-negative".to_string(),
            ));
        }
        if !(w.floor >= 0.0 && w.floor <= w.ceiling) {
            return Err(ConfigError::InvalidWeights(format!(
                "normalization floor ({}) > ceiling ({})",
                w.floor, w.ceiling
            )));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Generation count must be non-zero")]
    InvalidGenerations,
    #[error("Trial count must be non-zero")]
    InvalidTrials,
    #[error("Timeout must be a positive finite number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("Population cap must be non-zero")]
    InvalidPopulationCap,
    #[error("Cache capacity must be non-zero")]
    InvalidCacheCapacity,
    #[error("Invalid divergence weights: {0}")]
    InvalidWeights(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = RepairConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs_f64(config.timeout_secs));
        assert_eq!(config.localization, LocalizationMethod::Divergence);
        assert_eq!(config.divergence.fault, 9.0);
    }

    #[test]
    fn test_invalid_config() {
        let config = RepairConfig {
            timeout_secs: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout(_))
        ));

        for timeout_secs in [f64::INFINITY, f64::NAN, -1.0, 1e30] {
            let config = RepairConfig {
                timeout_secs,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidTimeout(_))
            ));
            assert_eq!(config.timeout(), Duration::MAX);
        }

        let config = RepairConfig {
            divergence: DivergenceWeights {
                floor: 0.9,
                ceiling: 0.2,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization() {
        let config: RepairConfig =
            serde_json::from_str(r#"{"generations": 5, "localization": "Jaccard"}"#).unwrap();
        assert_eq!(config.generations, 5);
        assert_eq!(config.trials, 1);
        assert_eq!(config.localization, LocalizationMethod::Jaccard);

        let json = serde_json::to_string(&config).unwrap();
        let parsed: RepairConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.generations, config.generations);
    }
}
