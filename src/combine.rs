use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};

use crate::math::{mean, std_dev};
use crate::sampling::{Measurement, NormalDistribution};
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Normal draws taken from each pooled estimate
    pub samples_per_dist: usize,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            samples_per_dist: 1000,
        }
    }
}

/// Pool reported measurements of one quantity with the configured sample count
///
/// # Errors
/// As for [`combine_distributions`].
pub fn combine_measurements(
    measurements: &[Measurement],
    config: &CombineConfig,
    rng: &mut impl Rng,
) -> Result<Measurement> {
    let (means, stds): (Vec<f64>, Vec<f64>) = measurements
        .iter()
        .map(|m| (m.value, m.uncertainty))
        .unzip();
    combine_distributions(&means, &stds, config.samples_per_dist, rng)
}

/// Pool several estimates of one quantity into a single [`Measurement`]
///
/// Each `(means[i], stds[i])` pair is treated as a normal distribution from which
/// `samples_per_dist` values are drawn. The draws are concatenated and the pooled sample's mean
/// and population standard deviation are returned.
///
/// Every source contributes the same number of draws, so sources are weighted equally
/// irrespective of how many observations originally backed them. Callers wanting inverse-variance
/// weighting must adjust `stds` beforehand.
///
/// # Errors
/// - [`Error::LengthMismatch`] if `means` and `stds` differ in length
/// - [`Error::InsufficientData`] if no estimates are given
/// - [`Error::InvalidParameter`] if `samples_per_dist` is zero or any estimate is malformed
pub fn combine_distributions(
    means: &[f64],
    stds: &[f64],
    samples_per_dist: usize,
    rng: &mut impl Rng,
) -> Result<Measurement> {
    if means.len() != stds.len() {
        return Err(Error::LengthMismatch {
            left: means.len(),
            right: stds.len(),
        });
    }
    if means.is_empty() {
        return Err(Error::InsufficientData {
            valid: 0,
            required: 1,
        });
    }
    if samples_per_dist == 0 {
        return Err(Error::InvalidParameter(
            "at least one sample per distribution is required".into(),
        ));
    }

    let mut pooled = Vec::with_capacity(means.len() * samples_per_dist);
    for (mean, std) in means.iter().zip(stds) {
        let draws = NormalDistribution::new(*mean, *std).sample(samples_per_dist, rng)?;
        pooled.extend(draws.iter());
    }

    tracing::debug!(
        sources = means.len(),
        pooled = pooled.len(),
        "combined normal distributions"
    );

    Ok(Measurement {
        value: mean(&pooled)?,
        uncertainty: std_dev(&pooled)?,
    })
}
