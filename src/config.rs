use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub ga: GaConfig,
}

/// Parameters of one evolution run.
#[derive(Deserialize, Debug, Clone)]
pub struct GaConfig {
    pub population_size: usize,
    pub num_generations: usize,
    /// Per tree pair, the probability that crossover touches it.
    pub crossover_rate: f64,
    /// Per individual tree, the probability that mutation regrows a subtree.
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub hall_of_fame_size: usize,
    pub seed: u64,
    /// Depth bounds for the initial population's trees.
    pub init_min_depth: usize,
    pub init_max_depth: usize,
    /// Depth bounds for subtrees grafted in by mutation.
    pub mut_min_depth: usize,
    pub mut_max_depth: usize,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ga.validate()
    }
}

impl GaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::Invalid(
                "population_size must be at least 1".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::Invalid(
                "tournament_size must be at least 1".to_string(),
            ));
        }
        for (name, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must lie in [0, 1], got {rate}"
                )));
            }
        }
        if self.init_min_depth > self.init_max_depth {
            return Err(ConfigError::Invalid(
                "init_min_depth must not exceed init_max_depth".to_string(),
            ));
        }
        if self.mut_min_depth > self.mut_max_depth {
            return Err(ConfigError::Invalid(
                "mut_min_depth must not exceed mut_max_depth".to_string(),
            ));
        }
        Ok(())
    }
}
