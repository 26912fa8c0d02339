use std::fs;
use std::path::Path;

use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};

use crate::bootstrap::BootstrapConfig;
use crate::combine::CombineConfig;
use crate::kinetics::InferenceConfig;
use crate::sampling::seeded_rng;
use crate::Result;

/// Settings for an analysis run. Every section of the TOML file is optional.
///
/// ```toml
/// seed = 40
///
/// [bootstrap]
/// fraction = 0.9
/// rounds = 1000
/// estimator = "odr"
///
/// [bootstrap.odr]
/// max_iters = 100
///
/// [inference]
/// samples = 1000
/// mode = "strict"
///
/// [combine]
/// samples_per_dist = 500
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed of the random source every sampling routine draws from
    pub seed: u64,
    pub bootstrap: BootstrapConfig,
    pub inference: InferenceConfig,
    pub combine: CombineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 40,
            bootstrap: BootstrapConfig::default(),
            inference: InferenceConfig::default(),
            combine: CombineConfig::default(),
        }
    }
}

impl Config {
    /// # Errors
    /// Returns [`crate::Error::Toml`] if `contents` is not a valid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), seed = config.seed, "read configuration");
        Ok(config)
    }

    /// A fresh random source seeded from [`Config::seed`]
    pub fn rng(&self) -> Isaac64Rng {
        seeded_rng(self.seed)
    }
}
