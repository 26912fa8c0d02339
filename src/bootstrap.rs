//! Bootstrap distributions of power-law fits and percentile confidence intervals.
//!
//! Each round draws `floor(fraction * n)` pairs uniformly **with replacement** from the `n`
//! finite pairs, log-transforms them and refits. Drawing fewer pairs than the sample holds
//! while still replacing is not the textbook bootstrap. It is kept so that intervals match those
//! reported with the kinetics dataset, and it widens them slightly relative to a full-size
//! resample.

use ndarray_rand::rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::math::{mask_pairs, median, percentiles, Mask};
use crate::powerlaw::{Estimator, OdrOptions, PowerLawFit};
use crate::sampling::child_rngs;
use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Size of each resample as a fraction of the number of valid pairs
    pub fraction: f64,
    /// Number of independent resamples
    pub rounds: usize,
    pub estimator: Estimator,
    pub odr: OdrOptions,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            fraction: 0.9,
            rounds: 1000,
            estimator: Estimator::Odr,
            odr: OdrOptions::default(),
        }
    }
}

/// A two-sided interval `[low, high]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub low: f64,
    pub high: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Percentile confidence interval of `distribution` at `level`
///
/// A `level` of 0.95 takes the 2.5th and 97.5th percentiles.
///
/// # Errors
/// - [`Error::InvalidParameter`] unless `0 < level < 1`
/// - [`Error::InsufficientData`] for an empty distribution
pub fn confidence_interval(distribution: &[f64], level: f64) -> Result<ConfidenceInterval> {
    if !(level > 0. && level < 1.) {
        return Err(Error::InvalidParameter(format!(
            "confidence level {level} is outside (0, 1)"
        )));
    }
    let tail = 100. * (1. - level) / 2.;
    let bounds = percentiles(distribution, &[tail, 100. - tail])?;
    Ok(ConfidenceInterval {
        low: bounds[0],
        high: bounds[1],
    })
}

/// Point estimate and interval for one bootstrapped quantity
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSummary {
    /// The median, which is less sensitive to outlying rounds than the mean
    pub median: f64,
    pub ci: ConfidenceInterval,
}

impl BootstrapSummary {
    /// Summarise the non-NaN `samples`
    ///
    /// # Errors
    /// As for [`confidence_interval`]. A distribution holding only NaN counts as empty.
    pub fn from_samples(samples: &[f64], level: f64) -> Result<Self> {
        let present = samples
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        Ok(Self {
            ci: confidence_interval(&present, level)?,
            median: median(&present)?,
        })
    }
}

/// One fit per bootstrap round, stored column-wise
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapDistribution {
    pub exponents: Vec<f64>,
    pub prefactors: Vec<f64>,
    pub correlations: Vec<f64>,
}

impl BootstrapDistribution {
    fn with_capacity(rounds: usize) -> Self {
        Self {
            exponents: Vec::with_capacity(rounds),
            prefactors: Vec::with_capacity(rounds),
            correlations: Vec::with_capacity(rounds),
        }
    }

    fn push(&mut self, fit: PowerLawFit) {
        self.exponents.push(fit.exponent);
        self.prefactors.push(fit.prefactor);
        self.correlations.push(fit.correlation);
    }

    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    /// # Errors
    /// As for [`confidence_interval`].
    pub fn exponent_summary(&self, level: f64) -> Result<BootstrapSummary> {
        BootstrapSummary::from_samples(&self.exponents, level)
    }

    /// # Errors
    /// As for [`confidence_interval`].
    pub fn prefactor_summary(&self, level: f64) -> Result<BootstrapSummary> {
        BootstrapSummary::from_samples(&self.prefactors, level)
    }

    /// # Errors
    /// As for [`confidence_interval`].
    pub fn correlation_summary(&self, level: f64) -> Result<BootstrapSummary> {
        BootstrapSummary::from_samples(&self.correlations, level)
    }
}

impl FromIterator<PowerLawFit> for BootstrapDistribution {
    fn from_iter<I: IntoIterator<Item = PowerLawFit>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut distribution = Self::with_capacity(iter.size_hint().0);
        for fit in iter {
            distribution.push(fit);
        }
        distribution
    }
}

/// Attempts at drawing a non-degenerate resample before a round is recorded as NaN
const MAX_REDRAWS: usize = 100;

/// Validated inputs shared by every round
struct Resampler {
    xs: Vec<f64>,
    ys: Vec<f64>,
    subset_size: usize,
    estimator: Estimator,
    odr: OdrOptions,
}

impl Resampler {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::float_cmp
    )]
    fn new(xs: &[f64], ys: &[f64], config: &BootstrapConfig) -> Result<Self> {
        if !(config.fraction > 0. && config.fraction <= 1.) {
            return Err(Error::InvalidParameter(format!(
                "bootstrap fraction {} is outside (0, 1]",
                config.fraction
            )));
        }
        if config.rounds == 0 {
            return Err(Error::InvalidParameter(
                "at least one bootstrap round is required".into(),
            ));
        }

        let (xs, ys) = mask_pairs(xs, ys, Mask::Finite)?;
        if xs.len() < 2 {
            return Err(Error::insufficient(xs.len()));
        }

        if xs.iter().all(|x| *x == xs[0]) {
            return Err(Error::DegenerateAxis);
        }

        let subset_size = (config.fraction * xs.len() as f64).floor() as usize;
        if subset_size < 2 {
            return Err(Error::insufficient(subset_size));
        }

        tracing::debug!(
            valid = xs.len(),
            subset_size,
            rounds = config.rounds,
            estimator = ?config.estimator,
            "bootstrapping power-law fit"
        );

        Ok(Self {
            xs,
            ys,
            subset_size,
            estimator: config.estimator,
            odr: config.odr,
        })
    }

    fn resample(&self, rng: &mut impl Rng) -> (Vec<f64>, Vec<f64>) {
        (0..self.subset_size)
            .map(|_| {
                let idx = rng.gen_range(0..self.xs.len());
                (self.xs[idx].ln(), self.ys[idx].ln())
            })
            .unzip()
    }

    /// Fit one resample, redrawing those whose `x` values all coincide
    fn round(&self, rng: &mut impl Rng) -> Result<PowerLawFit> {
        for _ in 0..MAX_REDRAWS {
            let (log_xs, log_ys) = self.resample(rng);
            let result = self.estimator.fit(&log_xs, &log_ys, &self.odr);
            if !matches!(result, Err(Error::DegenerateAxis)) {
                return result;
            }
        }
        tracing::warn!(
            redraws = MAX_REDRAWS,
            subset_size = self.subset_size,
            "no non-degenerate resample found, recording NaN for the round"
        );
        Ok(PowerLawFit {
            exponent: f64::NAN,
            prefactor: f64::NAN,
            correlation: f64::NAN,
        })
    }
}

/// Bootstrap the power-law fit of raw (not log transformed) paired data
///
/// The distribution always holds `config.rounds` fits. A resample whose `x` values all coincide
/// is redrawn, and a round still degenerate after repeated redraws is recorded as NaN, which the
/// summaries skip. Any other fit failure aborts the whole bootstrap.
///
/// # Errors
/// - [`Error::InvalidParameter`] for a fraction outside `(0, 1]` or zero rounds
/// - [`Error::InsufficientData`] if fewer than two finite pairs exist, or a resample would hold
///   fewer than two
/// - [`Error::DegenerateAxis`] if every finite `x` is identical
/// - any other error of the configured estimator
pub fn bootstrap(
    xs: &[f64],
    ys: &[f64],
    config: &BootstrapConfig,
    rng: &mut impl Rng,
) -> Result<BootstrapDistribution> {
    let resampler = Resampler::new(xs, ys, config)?;
    let mut distribution = BootstrapDistribution::with_capacity(config.rounds);
    for _ in 0..config.rounds {
        distribution.push(resampler.round(rng)?);
    }
    Ok(distribution)
}

/// As [`bootstrap`], running rounds on the rayon thread pool
///
/// Each round gets its own random source seeded from `rng`, so the output is reproducible for
/// a given seed and ordered by round.
///
/// # Errors
/// As for [`bootstrap`].
pub fn bootstrap_parallel(
    xs: &[f64],
    ys: &[f64],
    config: &BootstrapConfig,
    rng: &mut impl Rng,
) -> Result<BootstrapDistribution> {
    let resampler = Resampler::new(xs, ys, config)?;
    let fits = child_rngs(rng, config.rounds)
        .into_par_iter()
        .map(|mut rng| resampler.round(&mut rng))
        .collect::<Result<Vec<_>>>()?;
    Ok(fits.into_iter().collect())
}
