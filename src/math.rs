use crate::{Error, Result};

/// Which entries of a paired sample survive masking
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mask {
    /// Drop a pair when either element is NaN. Infinite values are kept.
    NotNan,
    /// Drop a pair when either element is NaN or infinite.
    Finite,
}

impl Mask {
    fn keeps(self, value: f64) -> bool {
        match self {
            Self::NotNan => !value.is_nan(),
            Self::Finite => value.is_finite(),
        }
    }
}

/// Remove every position at which either `xs` or `ys` fails `mask`
///
/// The relative order of surviving pairs is preserved.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] if the two sequences differ in length.
///
/// # Examples
///
/// ```
/// use rubisco_kinetics::math::{mask_pairs, Mask};
///
/// let xs = [1., f64::NAN, 3., f64::INFINITY];
/// let ys = [2., 4., f64::NAN, 8.];
///
/// let (xs, ys) = mask_pairs(&xs, &ys, Mask::NotNan).unwrap();
/// assert_eq!(xs, vec![1., f64::INFINITY]);
/// assert_eq!(ys, vec![2., 8.]);
/// ```
pub fn mask_pairs(xs: &[f64], ys: &[f64], mask: Mask) -> Result<(Vec<f64>, Vec<f64>)> {
    if xs.len() != ys.len() {
        return Err(Error::LengthMismatch {
            left: xs.len(),
            right: ys.len(),
        });
    }

    Ok(xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| mask.keeps(**x) && mask.keeps(**y))
        .map(|(x, y)| (*x, *y))
        .unzip())
}

/// Arithmetic mean of `values`
///
/// # Errors
/// Returns [`Error::InsufficientData`] for an empty slice.
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(Error::InsufficientData {
            valid: 0,
            required: 1,
        });
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (normalised by `n`, not `n - 1`)
///
/// # Errors
/// Returns [`Error::InsufficientData`] for an empty slice.
#[allow(clippy::cast_precision_loss)]
pub fn std_dev(values: &[f64]) -> Result<f64> {
    let centre = mean(values)?;
    let variance =
        values.iter().map(|v| (v - centre).powi(2)).sum::<f64>() / values.len() as f64;
    Ok(variance.sqrt())
}

/// The `p`th percentile of `values`, `p` in `[0, 100]`
///
/// Percentiles are linearly interpolated between the two closest ranks of the sorted data, so
/// that the rank of percentile `p` is $p / 100 \times (n - 1)$.
///
/// # Errors
/// Returns [`Error::InsufficientData`] for an empty slice, or [`Error::InvalidParameter`] if `p`
/// lies outside `[0, 100]`.
///
/// # Examples
///
/// ```
/// use rubisco_kinetics::math::percentile;
///
/// let values = [4., 1., 3., 2.];
/// assert_eq!(percentile(&values, 50.).unwrap(), 2.5);
/// assert_eq!(percentile(&values, 100.).unwrap(), 4.);
/// ```
pub fn percentile(values: &[f64], p: f64) -> Result<f64> {
    Ok(percentiles(values, &[p])?[0])
}

/// Several percentiles of `values`, sorting the data once
///
/// # Errors
/// As for [`percentile`].
pub fn percentiles(values: &[f64], ps: &[f64]) -> Result<Vec<f64>> {
    if values.is_empty() {
        return Err(Error::InsufficientData {
            valid: 0,
            required: 1,
        });
    }
    if let Some(p) = ps.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(Error::InvalidParameter(format!(
            "percentile {p} is outside [0, 100]"
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    Ok(ps.iter().map(|p| interpolate_rank(&sorted, *p)).collect())
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn interpolate_rank(sorted: &[f64], p: f64) -> f64 {
    let rank = p / 100. * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - rank.floor();
    fraction.mul_add(sorted[upper] - sorted[lower], sorted[lower])
}

/// Median of `values`
///
/// # Errors
/// Returns [`Error::InsufficientData`] for an empty slice.
pub fn median(values: &[f64]) -> Result<f64> {
    percentile(values, 50.)
}

/// Median of the non-NaN elements of `values`, NaN if there are none
pub fn nan_median(values: &[f64]) -> f64 {
    let present = values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect::<Vec<_>>();
    median(&present).unwrap_or(f64::NAN)
}

/// Pearson correlation coefficient of two equally long sequences
///
/// Returns NaN when either sequence has zero variance, as the coefficient is undefined.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (Ok(mean_a), Ok(mean_b)) = (mean(a), mean(b)) else {
        return f64::NAN;
    };

    let (sab, saa, sbb) = a.iter().zip(b).fold((0., 0., 0.), |(sab, saa, sbb), (x, y)| {
        let dx = x - mean_a;
        let dy = y - mean_b;
        (dx.mul_add(dy, sab), dx.mul_add(dx, saa), dy.mul_add(dy, sbb))
    });

    if saa == 0. || sbb == 0. {
        return f64::NAN;
    }
    (sab / (saa * sbb).sqrt()).clamp(-1., 1.)
}

/// Coefficient of determination of `predicted` against `actual`
///
/// When `actual` is constant the score is 1 for a perfect prediction and 0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let Ok(centre) = mean(actual) else {
        return f64::NAN;
    };

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|y| (y - centre).powi(2)).sum();

    if ss_tot == 0. {
        return if ss_res == 0. { 1. } else { 0. };
    }
    1. - ss_res / ss_tot
}
