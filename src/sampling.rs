use ndarray::Array1;
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A value with its standard uncertainty.
///
/// This is the `(mean, standard deviation)` pair in which kinetic parameters are reported.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub uncertainty: f64,
}

impl Measurement {
    pub const fn new(value: f64, uncertainty: f64) -> Self {
        Self { value, uncertainty }
    }

    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.uncertainty.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// A normal distribution
///
/// Every measured kinetic parameter is assumed to follow a normal distribution characterised by
/// mean $\mu$ and standard deviation $\sigma$
///
/// $$
///     f \left(x\right) = \frac{1}{\sqrt{2 \pi} \sigma} \exp\left[- \frac{1}{2} \left(\frac{x -
///     \mu}{\sigma}\right)^2 \right]
/// $$
pub struct NormalDistribution {
    pub mean: f64,
    pub standard_deviation: f64,
}

impl From<&Measurement> for NormalDistribution {
    fn from(value: &Measurement) -> Self {
        Self {
            mean: value.value,
            standard_deviation: value.uncertainty,
        }
    }
}

impl NormalDistribution {
    pub const fn new(mean: f64, standard_deviation: f64) -> Self {
        Self {
            mean,
            standard_deviation,
        }
    }

    /// Draw `n` independent samples using `rng`
    ///
    /// A zero standard deviation is permitted and yields `n` copies of the mean.
    ///
    /// # Errors
    /// Returns [`Error::InvalidParameter`] if the standard deviation is negative or either
    /// parameter is non-finite.
    pub fn sample(&self, n: usize, rng: &mut impl Rng) -> Result<Array1<f64>> {
        if !self.mean.is_finite() || !self.standard_deviation.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "normal distribution requires finite parameters, got mean {} and standard deviation {}",
                self.mean, self.standard_deviation
            )));
        }
        if self.standard_deviation < 0. {
            return Err(Error::InvalidParameter(format!(
                "standard deviation {} is negative",
                self.standard_deviation
            )));
        }

        let distribution = Normal::new(self.mean, self.standard_deviation)
            .map_err(|e| Error::Distribution(e.to_string()))?;
        Ok(Array1::random_using(n, distribution, rng))
    }
}

/// A random source seeded from `seed`
pub fn seeded_rng(seed: u64) -> Isaac64Rng {
    Isaac64Rng::seed_from_u64(seed)
}

/// Derive `n` independently seeded random sources from `rng`
///
/// Each unit of parallel work takes its own source so that draws are uncorrelated, and the
/// outcome depends only on the state of `rng` rather than on thread scheduling.
pub fn child_rngs(rng: &mut impl Rng, n: usize) -> Vec<Isaac64Rng> {
    (0..n)
        .map(|_| Isaac64Rng::seed_from_u64(rng.gen()))
        .collect()
}
