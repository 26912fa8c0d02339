//! Loading and cleaning the per-species Rubisco kinetics dataset.
//!
//! The dataset is a delimited file with one row per measured enzyme variant. Metadata columns
//! identify the variant and its source. Numeric columns hold kinetic parameters, empty where
//! unmeasured. Columns the loader does not know about, such as a leading index, are ignored.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Deserializer};

use crate::kinetics::KineticRecord;
use crate::math::nan_median;
use crate::Result;

/// Reference of Savir et al. 2010, whose compilation duplicates rows of its primary sources
pub const SAVIR_REFERENCE: &str = "20142476";

const fn missing() -> f64 {
    f64::NAN
}

/// Parse a numeric cell, reading empty or unparseable cells as NaN
fn nan_if_missing<'de, D: Deserializer<'de>>(de: D) -> ::std::result::Result<f64, D::Error> {
    csv::invalid_option(de).map(|value: Option<f64>| value.unwrap_or(f64::NAN))
}

/// A row of the kinetics dataset
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct KineticRow {
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub mutant: String,
    #[serde(default)]
    pub isoform: String,
    #[serde(default)]
    pub taxonomy: String,
    #[serde(default)]
    pub short_ref: String,
    #[serde(default)]
    pub pmid_or_doi: String,

    #[serde(rename = "KC", default = "missing", deserialize_with = "nan_if_missing")]
    pub kc: f64,
    #[serde(rename = "KC_SD", default = "missing", deserialize_with = "nan_if_missing")]
    pub kc_sd: f64,
    #[serde(rename = "vC", default = "missing", deserialize_with = "nan_if_missing")]
    pub vc: f64,
    #[serde(rename = "vC_SD", default = "missing", deserialize_with = "nan_if_missing")]
    pub vc_sd: f64,
    #[serde(rename = "S", default = "missing", deserialize_with = "nan_if_missing")]
    pub s: f64,
    #[serde(rename = "S_SD", default = "missing", deserialize_with = "nan_if_missing")]
    pub s_sd: f64,
    #[serde(rename = "KO", default = "missing", deserialize_with = "nan_if_missing")]
    pub ko: f64,
    #[serde(rename = "KO_SD", default = "missing", deserialize_with = "nan_if_missing")]
    pub ko_sd: f64,
    #[serde(rename = "KRuBP", default = "missing", deserialize_with = "nan_if_missing")]
    pub krubp: f64,
    #[serde(rename = "vO", default = "missing", deserialize_with = "nan_if_missing")]
    pub vo: f64,
    #[serde(rename = "kon_C", default = "missing", deserialize_with = "nan_if_missing")]
    pub kon_c: f64,
    #[serde(rename = "kon_O", default = "missing", deserialize_with = "nan_if_missing")]
    pub kon_o: f64,
}

/// A numeric column of the dataset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    Kc,
    KcSd,
    Vc,
    VcSd,
    S,
    SSd,
    Ko,
    KoSd,
    KRubp,
    Vo,
    KonC,
    KonO,
}

impl Column {
    pub const ALL: [Self; 12] = [
        Self::Kc,
        Self::KcSd,
        Self::Vc,
        Self::VcSd,
        Self::S,
        Self::SSd,
        Self::Ko,
        Self::KoSd,
        Self::KRubp,
        Self::Vo,
        Self::KonC,
        Self::KonO,
    ];

    /// Columns on which two rows count as duplicate measurements
    pub const KINETIC: [Self; 8] = [
        Self::Kc,
        Self::KcSd,
        Self::Vc,
        Self::VcSd,
        Self::S,
        Self::SSd,
        Self::Ko,
        Self::KoSd,
    ];
}

impl KineticRow {
    pub const fn get(&self, column: Column) -> f64 {
        match column {
            Column::Kc => self.kc,
            Column::KcSd => self.kc_sd,
            Column::Vc => self.vc,
            Column::VcSd => self.vc_sd,
            Column::S => self.s,
            Column::SSd => self.s_sd,
            Column::Ko => self.ko,
            Column::KoSd => self.ko_sd,
            Column::KRubp => self.krubp,
            Column::Vo => self.vo,
            Column::KonC => self.kon_c,
            Column::KonO => self.kon_o,
        }
    }

    fn set(&mut self, column: Column, value: f64) {
        let slot = match column {
            Column::Kc => &mut self.kc,
            Column::KcSd => &mut self.kc_sd,
            Column::Vc => &mut self.vc,
            Column::VcSd => &mut self.vc_sd,
            Column::S => &mut self.s,
            Column::SSd => &mut self.s_sd,
            Column::Ko => &mut self.ko,
            Column::KoSd => &mut self.ko_sd,
            Column::KRubp => &mut self.krubp,
            Column::Vo => &mut self.vo,
            Column::KonC => &mut self.kon_c,
            Column::KonO => &mut self.kon_o,
        };
        *slot = value;
    }

    /// The measured parameters, as consumed by [`crate::kinetics::infer`]
    pub const fn record(&self) -> KineticRecord {
        KineticRecord {
            vc: self.vc,
            vc_sd: self.vc_sd,
            kc: self.kc,
            kc_sd: self.kc_sd,
            ko: self.ko,
            ko_sd: self.ko_sd,
            s: self.s,
            s_sd: self.s_sd,
        }
    }

    /// Whether KC, KO, kcat,C, kcat,O, kon,C and kon,O are all present
    pub fn is_complete(&self) -> bool {
        [Column::Kc, Column::Ko, Column::Vc, Column::Vo, Column::KonC, Column::KonO]
            .into_iter()
            .all(|column| self.get(column).is_finite())
    }

    fn group_key(&self) -> (&str, &str, &str, &str) {
        (
            self.species.as_str(),
            self.mutant.as_str(),
            self.isoform.as_str(),
            self.taxonomy.as_str(),
        )
    }

    /// Bit patterns of the kinetic columns with NaNs and signed zeros made equal
    fn duplicate_key(&self) -> [u64; 8] {
        Column::KINETIC.map(|column| {
            let value = self.get(column);
            if value.is_nan() {
                f64::NAN.to_bits()
            } else if value == 0. {
                0f64.to_bits()
            } else {
                value.to_bits()
            }
        })
    }
}

/// Read the dataset from a delimited file with a header row
///
/// # Errors
/// Returns an error if the file cannot be read or a row cannot be parsed.
pub fn load_csv(path: &Path) -> Result<Vec<KineticRow>> {
    let file = fs::read(path)?;
    let rows = from_reader(&file[..])?;
    tracing::info!(path = %path.display(), rows = rows.len(), "loaded kinetics dataset");
    Ok(rows)
}

/// Read the dataset from any reader
///
/// # Errors
/// Returns [`crate::Error::Csv`] if a row cannot be parsed.
pub fn from_reader<R: Read>(reader: R) -> Result<Vec<KineticRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let mut rows = vec![];
    for result in rdr.deserialize() {
        let row: KineticRow = result?;
        rows.push(row);
    }
    Ok(rows)
}

/// Keep only rows with every kinetic parameter needed for the pairwise correlations
pub fn filter_complete(rows: &[KineticRow]) -> Vec<KineticRow> {
    rows.iter().filter(|row| row.is_complete()).cloned().collect()
}

/// Drop rows whose kinetic columns exactly repeat an earlier row
///
/// Missing values compare equal to each other, so two rows that leave the same columns empty
/// and agree on the rest are duplicates.
pub fn deduplicate(rows: &[KineticRow]) -> Vec<KineticRow> {
    let mut seen = HashSet::new();
    let deduped = rows
        .iter()
        .filter(|row| seen.insert(row.duplicate_key()))
        .cloned()
        .collect::<Vec<_>>();
    tracing::debug!(
        dropped = rows.len() - deduped.len(),
        kept = deduped.len(),
        "removed duplicate measurements"
    );
    deduped
}

/// Split rows into those citing `reference` and the rest
pub fn split_by_reference(
    rows: &[KineticRow],
    reference: &str,
) -> (Vec<KineticRow>, Vec<KineticRow>) {
    rows.iter()
        .cloned()
        .partition(|row| row.pmid_or_doi == reference)
}

/// Collapse replicate measurements of one variant
///
/// Rows are grouped by species, mutant, isoform and taxonomy. Each numeric column of a group is
/// the median of its present values. Reference columns are cleared as they no longer identify a
/// single source. Groups appear in order of their first row.
pub fn group_median(rows: &[KineticRow]) -> Vec<KineticRow> {
    let groups = rows.iter().into_group_map_by(|row| row.group_key());

    rows.iter()
        .map(KineticRow::group_key)
        .unique()
        .map(|key| {
            let members = &groups[&key];
            let mut merged = KineticRow {
                species: key.0.to_owned(),
                mutant: key.1.to_owned(),
                isoform: key.2.to_owned(),
                taxonomy: key.3.to_owned(),
                ..KineticRow::default()
            };
            for column in Column::ALL {
                let values = members.iter().map(|row| row.get(column)).collect::<Vec<_>>();
                merged.set(column, nan_median(&values));
            }
            merged
        })
        .collect()
}

/// The values of `column` across `rows`
pub fn column(rows: &[KineticRow], column: Column) -> Vec<f64> {
    rows.iter().map(|row| row.get(column)).collect()
}
