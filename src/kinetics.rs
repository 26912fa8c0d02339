//! Monte Carlo inference of derived Rubisco kinetic parameters.
//!
//! The five commonly measured parameters are related through the specificity factor
//! $$
//!     S = \frac{v_C K_O}{v_O K_C},
//! $$
//! so an unmeasured oxygenation turnover $v_O$ follows from the other four. The second order
//! rate constants are $k_{on,C} = v_C / K_C$ and $k_{on,O} = v_O / K_O = v_C / (S K_C)$.
//!
//! Each measured parameter is treated as normally distributed with its reported standard
//! deviation. Samples are pushed through the relations above elementwise and each derived
//! quantity is summarised by the median and a percentile interval of its samples.

use std::collections::HashMap;

use ndarray::Array1;
use ndarray_rand::rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bootstrap::{confidence_interval, ConfidenceInterval};
use crate::math::median;
use crate::sampling::{child_rngs, NormalDistribution};
use crate::{Error, Result};

const FIELDS: [&str; 8] = ["vC", "vC_SD", "KC", "KC_SD", "KO", "KO_SD", "S", "S_SD"];

/// Measured kinetic parameters of a single Rubisco, NaN where unmeasured
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KineticRecord {
    /// Carboxylation turnover kcat,C
    #[serde(rename = "vC")]
    pub vc: f64,
    #[serde(rename = "vC_SD")]
    pub vc_sd: f64,
    /// Michaelis constant for CO2
    #[serde(rename = "KC")]
    pub kc: f64,
    #[serde(rename = "KC_SD")]
    pub kc_sd: f64,
    /// Michaelis constant for O2
    #[serde(rename = "KO")]
    pub ko: f64,
    #[serde(rename = "KO_SD")]
    pub ko_sd: f64,
    /// Specificity factor S_C/O
    #[serde(rename = "S")]
    pub s: f64,
    #[serde(rename = "S_SD")]
    pub s_sd: f64,
}

impl KineticRecord {
    /// Build a record from named values, keyed as in the kinetics dataset
    ///
    /// # Errors
    /// Returns [`Error::MissingField`] naming the first of `vC, vC_SD, KC, KC_SD, KO, KO_SD, S,
    /// S_SD` absent from `values`.
    pub fn from_map(values: &HashMap<String, f64>) -> Result<Self> {
        let get = |key: &str| {
            values
                .get(key)
                .copied()
                .ok_or_else(|| Error::MissingField(key.to_owned()))
        };
        Ok(Self {
            vc: get("vC")?,
            vc_sd: get("vC_SD")?,
            kc: get("KC")?,
            kc_sd: get("KC_SD")?,
            ko: get("KO")?,
            ko_sd: get("KO_SD")?,
            s: get("S")?,
            s_sd: get("S_SD")?,
        })
    }

    const fn values(&self) -> [f64; 8] {
        [
            self.vc, self.vc_sd, self.kc, self.kc_sd, self.ko, self.ko_sd, self.s, self.s_sd,
        ]
    }

    /// Whether kcat,C and KC are both present with their uncertainties
    pub fn has_carboxylation_data(&self) -> bool {
        self.values()[..4].iter().all(|v| v.is_finite())
    }

    /// Whether every measured field is present
    pub fn has_complete_data(&self) -> bool {
        self.values().iter().all(|v| v.is_finite())
    }

    /// Names of the fields that are not finite
    pub fn missing_fields(&self) -> Vec<&'static str> {
        FIELDS
            .iter()
            .zip(self.values())
            .filter(|(_, v)| !v.is_finite())
            .map(|(name, _)| *name)
            .collect()
    }
}

/// How records lacking data for some derived parameters are treated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    /// Infer what the record supports and mark the rest [`Inference::Underdetermined`]
    #[default]
    Permissive,
    /// Fail with [`Error::IncompleteRecord`] unless every field is present
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Monte Carlo samples drawn per measured parameter
    pub samples: usize,
    pub confidence_level: f64,
    pub mode: InferenceMode,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            samples: 1000,
            confidence_level: 0.95,
            mode: InferenceMode::Permissive,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferredValue {
    /// Median of the Monte Carlo samples
    pub median: f64,
    pub ci: ConfidenceInterval,
}

impl InferredValue {
    fn from_samples(samples: &Array1<f64>, level: f64) -> Result<Self> {
        let samples = samples.to_vec();
        Ok(Self {
            median: median(&samples)?,
            ci: confidence_interval(&samples, level)?,
        })
    }
}

/// Outcome of inferring one derived parameter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Inference {
    Estimated(InferredValue),
    /// Inference ran, but the record lacks the inputs this parameter depends on
    Underdetermined,
}

impl Inference {
    pub const fn estimate(&self) -> Option<&InferredValue> {
        match self {
            Self::Estimated(value) => Some(value),
            Self::Underdetermined => None,
        }
    }

    pub const fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }
}

/// Parameters derived from a [`KineticRecord`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivedParameters {
    /// kon,C = kcat,C / KC
    pub kon_c: Inference,
    /// Oxygenation turnover kcat,O = KO kcat,C / (S KC)
    pub vo: Inference,
    /// kon,O = kcat,C / (S KC)
    pub kon_o: Inference,
}

/// Infer the derived parameters of `record`
///
/// kon,C needs kcat,C and KC. kcat,O and kon,O additionally need KO and S. Samples are drawn in
/// the order kcat,C, KC, KO, S.
///
/// # Errors
/// - [`Error::InvalidParameter`] if `config.samples` is zero, a reported standard deviation is
///   negative, or the confidence level is outside `(0, 1)`
/// - [`Error::IncompleteRecord`] for an incomplete record in [`InferenceMode::Strict`]
pub fn infer(
    record: &KineticRecord,
    config: &InferenceConfig,
    rng: &mut impl Rng,
) -> Result<DerivedParameters> {
    if config.samples == 0 {
        return Err(Error::InvalidParameter(
            "at least one Monte Carlo sample is required".into(),
        ));
    }
    if config.mode == InferenceMode::Strict && !record.has_complete_data() {
        return Err(Error::IncompleteRecord {
            missing: record.missing_fields(),
        });
    }

    let mut derived = DerivedParameters {
        kon_c: Inference::Underdetermined,
        vo: Inference::Underdetermined,
        kon_o: Inference::Underdetermined,
    };

    if !record.has_carboxylation_data() {
        tracing::debug!(
            missing = ?record.missing_fields(),
            "no carboxylation data, nothing to infer"
        );
        return Ok(derived);
    }

    let n = config.samples;
    let level = config.confidence_level;

    let vc = NormalDistribution::new(record.vc, record.vc_sd).sample(n, rng)?;
    let kc = NormalDistribution::new(record.kc, record.kc_sd).sample(n, rng)?;
    let kon_c = &vc / &kc;
    derived.kon_c = Inference::Estimated(InferredValue::from_samples(&kon_c, level)?);

    if record.has_complete_data() {
        let ko = NormalDistribution::new(record.ko, record.ko_sd).sample(n, rng)?;
        let s = NormalDistribution::new(record.s, record.s_sd).sample(n, rng)?;

        // From S = vC KO / (vO KC)
        let kon_o = &vc / &(&s * &kc);
        let vo = &ko * &kon_o;
        derived.vo = Inference::Estimated(InferredValue::from_samples(&vo, level)?);
        derived.kon_o = Inference::Estimated(InferredValue::from_samples(&kon_o, level)?);
    }

    Ok(derived)
}

/// Infer many records on the rayon thread pool
///
/// Every record draws from its own random source seeded from `rng`. Results are in input order.
///
/// # Errors
/// The first error raised by [`infer`] for any record.
pub fn infer_batch(
    records: &[KineticRecord],
    config: &InferenceConfig,
    rng: &mut impl Rng,
) -> Result<Vec<DerivedParameters>> {
    tracing::info!(records = records.len(), samples = config.samples, "inferring kinetics");
    child_rngs(rng, records.len())
        .into_par_iter()
        .zip(records.par_iter())
        .map(|(mut rng, record)| infer(record, config, &mut rng))
        .collect()
}
