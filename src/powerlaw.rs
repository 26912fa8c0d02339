//! Power-law fits $y = A x^k$ in log-log space.
//!
//! Every routine here expects natural-log transformed inputs, fits the straight line
//! $\ln y = k \ln x + \ln A$ and reports the prefactor as $A = e^{\text{intercept}}$. Three
//! estimators are provided:
//!
//! - [`fit_ols`]: ordinary least squares, minimising vertical residuals only
//! - [`fit_tls`]: total least squares through the first principal axis of the point cloud
//! - [`fit_odr`]: orthogonal distance regression, minimising perpendicular distances with an
//!   iterative solver
//!
//! When both variables carry measurement error OLS underestimates the magnitude of the slope,
//! so TLS and ODR are the estimators of choice for kinetic parameter correlations.

use ndarray::Array2;
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::math::{mask_pairs, mean, pearson, r2_score, Mask};
use crate::odr::Problem;
use crate::{Error, Result};

/// Guards the Student's t statistic against division by zero for perfect correlations
const TINY: f64 = 1e-20;

/// Relative size below which the x component of the principal axis counts as zero
const AXIS_EPS: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OlsFit {
    pub exponent: f64,
    pub prefactor: f64,
    /// Squared Pearson correlation of the log-transformed data
    pub r2: f64,
    /// Two-sided p-value for the null hypothesis of zero slope
    pub p_value: f64,
    /// Standard error of the exponent
    pub std_err: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TlsFit {
    pub exponent: f64,
    pub prefactor: f64,
    pub r2: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OdrFit {
    pub exponent: f64,
    pub prefactor: f64,
    /// Pearson correlation (not squared) between predicted and observed `ln y`
    pub correlation: f64,
}

/// Estimator-independent summary of a fit
///
/// `correlation` holds whatever goodness of fit the producing estimator reports: $r^2$ for
/// [`Estimator::Ols`] and [`Estimator::Tls`], the Pearson correlation for the ODR variants.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerLawFit {
    pub exponent: f64,
    pub prefactor: f64,
    pub correlation: f64,
}

impl PowerLawFit {
    /// Evaluate the fitted power law at `x` on the raw (not log) scale
    pub fn predict(&self, x: f64) -> f64 {
        self.prefactor * x.powf(self.exponent)
    }
}

impl From<OlsFit> for PowerLawFit {
    fn from(fit: OlsFit) -> Self {
        Self {
            exponent: fit.exponent,
            prefactor: fit.prefactor,
            correlation: fit.r2,
        }
    }
}

impl From<TlsFit> for PowerLawFit {
    fn from(fit: TlsFit) -> Self {
        Self {
            exponent: fit.exponent,
            prefactor: fit.prefactor,
            correlation: fit.r2,
        }
    }
}

impl From<OdrFit> for PowerLawFit {
    fn from(fit: OdrFit) -> Self {
        Self {
            exponent: fit.exponent,
            prefactor: fit.prefactor,
            correlation: fit.correlation,
        }
    }
}

/// Options for [`fit_odr`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdrOptions {
    /// Fix the exponent to exactly one and fit only the prefactor
    pub unit_exponent: bool,
    pub max_iters: u64,
    /// Convergence tolerance on the change in cost between iterations
    pub tolerance: f64,
    /// Attach a terminal logger to the solver, reporting every iteration
    pub log_solver: bool,
}

impl Default for OdrOptions {
    fn default() -> Self {
        Self {
            unit_exponent: false,
            max_iters: 100,
            tolerance: f64::EPSILON.sqrt(),
            log_solver: false,
        }
    }
}

/// Fit a power law by ordinary least squares of `log_ys` on `log_xs`
///
/// Pairs where either value is NaN are dropped first. Infinite values are not masked.
///
/// # Errors
/// - [`Error::InsufficientData`] if fewer than two pairs remain
/// - [`Error::DegenerateAxis`] if every remaining `log_x` is identical
#[allow(clippy::float_cmp)]
pub fn fit_ols(log_xs: &[f64], log_ys: &[f64]) -> Result<OlsFit> {
    let (xs, ys) = mask_pairs(log_xs, log_ys, Mask::NotNan)?;
    if xs.len() < 2 {
        return Err(Error::insufficient(xs.len()));
    }

    let mean_x = mean(&xs)?;
    let mean_y = mean(&ys)?;
    let (sxx, syy, sxy) = xs
        .iter()
        .zip(&ys)
        .fold((0., 0., 0.), |(sxx, syy, sxy), (x, y)| {
            let dx = x - mean_x;
            let dy = y - mean_y;
            (dx.mul_add(dx, sxx), dy.mul_add(dy, syy), dx.mul_add(dy, sxy))
        });

    if sxx == 0. {
        return Err(Error::DegenerateAxis);
    }

    let slope = sxy / sxx;
    let intercept = slope.mul_add(-mean_x, mean_y);
    let r = if syy == 0. {
        0.
    } else {
        (sxy / (sxx * syy).sqrt()).clamp(-1., 1.)
    };

    let (p_value, std_err) = if xs.len() == 2 {
        // A line through two points is exact
        let p_value = if ys[0] == ys[1] {
            1.
        } else {
            0.
        };
        (p_value, 0.)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let dof = (xs.len() - 2) as f64;
        let t = r * (dof / ((1. - r) * (1. + r) + TINY)).sqrt();
        let students_t =
            StudentsT::new(0., 1., dof).map_err(|e| Error::Distribution(e.to_string()))?;
        let p_value = 2. * students_t.sf(t.abs());
        let std_err = ((1. - r * r) * syy / sxx / dof).sqrt();
        (p_value, std_err)
    };

    Ok(OlsFit {
        exponent: slope,
        prefactor: intercept.exp(),
        r2: r * r,
        p_value,
        std_err,
    })
}

/// Fit a power law by total least squares
///
/// The fitted line runs along the first principal axis of the centred `(log_x, log_y)` cloud,
/// through the centroid. Pairs with any non-finite value are dropped first.
///
/// # Errors
/// - [`Error::InsufficientData`] if fewer than two pairs remain
/// - [`Error::DegenerateAxis`] if the principal axis is vertical
/// - [`Error::Linalg`] if the eigendecomposition fails
pub fn fit_tls(log_xs: &[f64], log_ys: &[f64]) -> Result<TlsFit> {
    let (xs, ys) = mask_pairs(log_xs, log_ys, Mask::Finite)?;
    if xs.len() < 2 {
        return Err(Error::insufficient(xs.len()));
    }

    let mean_x = mean(&xs)?;
    let mean_y = mean(&ys)?;

    // Scatter matrix of the centred data. Its eigenvectors are the principal axes.
    let mut scatter: Array2<f64> = Array2::zeros((2, 2));
    for (x, y) in xs.iter().zip(&ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        scatter[[0, 0]] += dx * dx;
        scatter[[0, 1]] += dx * dy;
        scatter[[1, 1]] += dy * dy;
    }
    scatter[[1, 0]] = scatter[[0, 1]];

    // Eigenvalues are returned in ascending order
    let (_, axes) = scatter.eigh(UPLO::Lower)?;
    let (axis_x, axis_y) = (axes[[0, 1]], axes[[1, 1]]);

    if axis_x.abs() <= AXIS_EPS * axis_x.hypot(axis_y) {
        return Err(Error::DegenerateAxis);
    }

    let slope = axis_y / axis_x;
    let intercept = slope.mul_add(-mean_x, mean_y);
    let predicted = xs
        .iter()
        .map(|x| slope.mul_add(*x, intercept))
        .collect::<Vec<_>>();

    Ok(TlsFit {
        exponent: slope,
        prefactor: intercept.exp(),
        r2: r2_score(&ys, &predicted),
    })
}

/// Fit a power law by orthogonal distance regression
///
/// Pairs with any non-finite value are dropped, the OLS solution seeds the solver, and the
/// summed squared perpendicular distance of the points from the line is minimised.
///
/// With [`OdrOptions::unit_exponent`] the slope is held at exactly one and only the intercept
/// is optimised. For a fixed slope the perpendicular distance is a constant multiple of the
/// vertical one, so the optimal intercept is the mean of `log_y - log_x`.
///
/// # Errors
/// - [`Error::InsufficientData`] if fewer than two pairs remain
/// - [`Error::DegenerateAxis`] if every remaining `log_x` is identical
/// - [`Error::Solver`] if the minimisation fails
pub fn fit_odr(log_xs: &[f64], log_ys: &[f64], options: &OdrOptions) -> Result<OdrFit> {
    let (xs, ys) = mask_pairs(log_xs, log_ys, Mask::Finite)?;
    if xs.len() < 2 {
        return Err(Error::insufficient(xs.len()));
    }

    let (slope, intercept) = if options.unit_exponent {
        let offsets = xs.iter().zip(&ys).map(|(x, y)| y - x).collect::<Vec<_>>();
        (1., mean(&offsets)?)
    } else {
        let guess = fit_ols(&xs, &ys)?;
        let initial = ndarray::arr1(&[guess.exponent, guess.prefactor.ln()]);
        let solution = Problem::new(&xs, &ys).solve(
            initial,
            options.max_iters,
            options.tolerance,
            options.log_solver,
        )?;
        (solution[0], solution[1])
    };

    let predicted = xs
        .iter()
        .map(|x| slope.mul_add(*x, intercept))
        .collect::<Vec<_>>();

    Ok(OdrFit {
        exponent: slope,
        prefactor: intercept.exp(),
        correlation: pearson(&predicted, &ys),
    })
}

/// The fit used for each round of a bootstrap
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    Ols,
    Tls,
    #[default]
    Odr,
    /// ODR with the exponent fixed to one
    OdrUnitExponent,
}

impl Estimator {
    /// Fit log-transformed data. `odr` only applies to the ODR variants.
    ///
    /// # Errors
    /// Propagates the errors of the underlying fit.
    pub fn fit(self, log_xs: &[f64], log_ys: &[f64], odr: &OdrOptions) -> Result<PowerLawFit> {
        let fit = match self {
            Self::Ols => fit_ols(log_xs, log_ys)?.into(),
            Self::Tls => fit_tls(log_xs, log_ys)?.into(),
            Self::Odr => fit_odr(
                log_xs,
                log_ys,
                &OdrOptions {
                    unit_exponent: false,
                    ..*odr
                },
            )?
            .into(),
            Self::OdrUnitExponent => fit_odr(
                log_xs,
                log_ys,
                &OdrOptions {
                    unit_exponent: true,
                    ..*odr
                },
            )?
            .into(),
        };
        Ok(fit)
    }
}

#[cfg(test)]
mod tests {
    use ndarray_rand::rand::{Rng, SeedableRng};
    use ndarray_rand::rand_distr::{Normal, Uniform};
    use proptest::prelude::*;
    use rand_isaac::Isaac64Rng;

    use super::{fit_odr, fit_ols, fit_tls, Estimator, OdrOptions};
    use crate::Error;

    struct GeneratedPowerLaw {
        log_x: Vec<f64>,
        log_y: Vec<f64>,
    }

    #[allow(clippy::cast_precision_loss)]
    fn generate_power_law(prefactor: f64, exponent: f64, num_samples: usize) -> GeneratedPowerLaw {
        let x = (1..=num_samples)
            .map(|n| 0.5 * n as f64)
            .collect::<Vec<_>>();
        let y = x
            .iter()
            .map(|x| prefactor * x.powf(exponent))
            .collect::<Vec<_>>();
        GeneratedPowerLaw {
            log_x: x.iter().map(|x| x.ln()).collect(),
            log_y: y.iter().map(|y| y.ln()).collect(),
        }
    }

    /// Points on `y = intercept + slope x` with equal gaussian error in both coordinates
    fn generate_noisy_line(
        rng: &mut impl Rng,
        slope: f64,
        intercept: f64,
        noise: f64,
        num_samples: usize,
    ) -> (Vec<f64>, Vec<f64>) {
        let error = Normal::new(0., noise).unwrap();
        let truth = Uniform::new(0., 5.);
        (0..num_samples)
            .map(|_| {
                let x: f64 = rng.sample(truth);
                (
                    x + rng.sample(error),
                    slope.mul_add(x, intercept) + rng.sample(error),
                )
            })
            .unzip()
    }

    #[test]
    fn ordinary_least_squares_recovers_noiseless_power_law() {
        let data = generate_power_law(3.2, 0.75, 20);
        let fit = fit_ols(&data.log_x, &data.log_y).unwrap();

        approx::assert_relative_eq!(fit.exponent, 0.75, max_relative = 1e-10);
        approx::assert_relative_eq!(fit.prefactor, 3.2, max_relative = 1e-10);
        approx::assert_relative_eq!(fit.r2, 1., max_relative = 1e-10);
        assert!(fit.p_value < 1e-10);
        assert!(fit.std_err < 1e-6);
    }

    #[test]
    fn ordinary_least_squares_matches_tabulated_statistics() {
        // y = 1 + 2x with residuals [0.1, -0.2, 0.1, 0.0, 0.0]
        let x = [0., 1., 2., 3., 4.];
        let y = [1.1, 2.8, 5.1, 7., 9.];
        let fit = fit_ols(&x, &y).unwrap();

        // sxx = 10, sxy = 20, syy = 40.06
        approx::assert_relative_eq!(fit.exponent, 2., max_relative = 1e-12);
        approx::assert_relative_eq!(fit.prefactor, 1f64.exp(), max_relative = 1e-12);
        let r2 = 400. / (10. * 40.06);
        approx::assert_relative_eq!(fit.r2, r2, max_relative = 1e-12);
        let std_err = ((1. - r2) * 40.06 / 10. / 3.).sqrt();
        approx::assert_relative_eq!(fit.std_err, std_err, max_relative = 1e-9);
        assert!(fit.p_value > 0. && fit.p_value < 1e-3);
    }

    #[test]
    fn total_least_squares_recovers_noiseless_power_law() {
        let data = generate_power_law(0.4, -1.3, 25);
        let fit = fit_tls(&data.log_x, &data.log_y).unwrap();

        approx::assert_relative_eq!(fit.exponent, -1.3, max_relative = 1e-8);
        approx::assert_relative_eq!(fit.prefactor, 0.4, max_relative = 1e-8);
        approx::assert_relative_eq!(fit.r2, 1., max_relative = 1e-8);
    }

    #[test]
    fn orthogonal_distance_regression_recovers_noiseless_power_law() {
        let data = generate_power_law(12., 1.8, 30);
        let fit = fit_odr(&data.log_x, &data.log_y, &OdrOptions::default()).unwrap();

        approx::assert_relative_eq!(fit.exponent, 1.8, max_relative = 1e-8);
        approx::assert_relative_eq!(fit.prefactor, 12., max_relative = 1e-8);
        approx::assert_relative_eq!(fit.correlation, 1., max_relative = 1e-8);
    }

    #[test]
    fn unit_exponent_is_exactly_one() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let (x, y) = generate_noisy_line(&mut rng, 0.6, 2., 0.3, 50);

        let options = OdrOptions {
            unit_exponent: true,
            ..OdrOptions::default()
        };
        let fit = fit_odr(&x, &y, &options).unwrap();

        assert_eq!(fit.exponent, 1.);
        let offset = y.iter().zip(&x).map(|(y, x)| y - x).sum::<f64>() / 50.;
        approx::assert_relative_eq!(fit.prefactor, offset.exp(), max_relative = 1e-12);
    }

    #[test]
    fn orthogonal_distance_agrees_with_principal_axis() {
        // With equal error in both coordinates the ODR and TLS lines coincide
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let (x, y) = generate_noisy_line(&mut rng, 1.4, 0.5, 0.4, 200);

        let odr = fit_odr(&x, &y, &OdrOptions::default()).unwrap();
        let tls = fit_tls(&x, &y).unwrap();

        approx::assert_relative_eq!(odr.exponent, tls.exponent, max_relative = 1e-3);
        approx::assert_relative_eq!(odr.prefactor, tls.prefactor, max_relative = 1e-3);
    }

    #[test]
    fn ordinary_least_squares_is_attenuated_by_error_in_x() {
        let seed = 40;
        let mut rng = Isaac64Rng::seed_from_u64(seed);
        let (x, y) = generate_noisy_line(&mut rng, 1., 2., 0.5, 500);

        let ols = fit_ols(&x, &y).unwrap();
        let odr = fit_odr(&x, &y, &OdrOptions::default()).unwrap();

        assert!(ols.exponent < odr.exponent);
        approx::assert_abs_diff_eq!(odr.exponent, 1., epsilon = 0.1);
    }

    #[test]
    fn two_points_are_fit_exactly() {
        let fit = fit_ols(&[0., 1.], &[1., 3.]).unwrap();
        approx::assert_relative_eq!(fit.exponent, 2.);
        approx::assert_relative_eq!(fit.r2, 1.);
        assert_eq!(fit.std_err, 0.);
        assert_eq!(fit.p_value, 0.);

        // Distinct values count however close they are
        let tiny = fit_ols(&[0., 1.], &[1e-20, 2e-20]).unwrap();
        assert_eq!(tiny.p_value, 0.);
        let flat = fit_ols(&[0., 1.], &[4., 4.]).unwrap();
        assert_eq!(flat.p_value, 1.);

        let odr = fit_odr(&[0., 1.], &[1., 3.], &OdrOptions::default()).unwrap();
        approx::assert_relative_eq!(odr.exponent, 2., max_relative = 1e-12);
        approx::assert_relative_eq!(odr.prefactor, 1f64.exp(), max_relative = 1e-12);
    }

    #[test]
    fn fewer_than_two_pairs_are_insufficient() {
        let result = fit_ols(&[1., f64::NAN, 3.], &[f64::NAN, 2., 4.]);
        assert!(matches!(
            result,
            Err(Error::InsufficientData {
                valid: 1,
                required: 2
            })
        ));
        assert!(matches!(
            fit_tls(&[1.], &[1.]),
            Err(Error::InsufficientData { .. })
        ));
        assert!(matches!(
            fit_odr(&[f64::INFINITY, 1.], &[1., 1.], &OdrOptions::default()),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn vertical_data_has_no_total_least_squares_slope() {
        let x = [2., 2., 2., 2.];
        let y = [1., 2., 3., 4.];
        assert!(matches!(fit_tls(&x, &y), Err(Error::DegenerateAxis)));
        assert!(matches!(fit_ols(&x, &y), Err(Error::DegenerateAxis)));
    }

    #[test]
    fn estimators_report_their_goodness_of_fit() {
        let data = generate_power_law(2., 0.5, 10);
        let options = OdrOptions::default();
        for estimator in [
            Estimator::Ols,
            Estimator::Tls,
            Estimator::Odr,
            Estimator::OdrUnitExponent,
        ] {
            let fit = estimator.fit(&data.log_x, &data.log_y, &options).unwrap();
            approx::assert_relative_eq!(fit.correlation, 1., max_relative = 1e-8);
            assert!(fit.prefactor > 0.);
        }
    }

    #[test]
    fn fitted_power_laws_evaluate_on_the_raw_scale() {
        let data = generate_power_law(2., 1.5, 10);
        let fit = Estimator::Ols
            .fit(&data.log_x, &data.log_y, &OdrOptions::default())
            .unwrap();
        approx::assert_relative_eq!(fit.predict(4.), 16., max_relative = 1e-10);
    }

    /// Insert NaN into `x` or `y` (alternating) at each requested position
    fn with_missing(
        x: &[f64],
        y: &[f64],
        positions: &[prop::sample::Index],
    ) -> (Vec<f64>, Vec<f64>) {
        let mut x = x.to_vec();
        let mut y = y.to_vec();
        for (ii, position) in positions.iter().enumerate() {
            let at = position.index(x.len() + 1);
            if ii % 2 == 0 {
                x.insert(at, f64::NAN);
                y.insert(at, 1.);
            } else {
                x.insert(at, 1.);
                y.insert(at, f64::NAN);
            }
        }
        (x, y)
    }

    proptest! {
        #[test]
        fn missing_values_do_not_change_fits(
            pairs in prop::collection::vec((0.1f64..10., 0.1f64..10.), 3..30),
            positions in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let (masked_x, masked_y) = with_missing(&x, &y, &positions);

            prop_assert_eq!(fit_ols(&x, &y).ok(), fit_ols(&masked_x, &masked_y).ok());
            prop_assert_eq!(fit_tls(&x, &y).ok(), fit_tls(&masked_x, &masked_y).ok());
            let options = OdrOptions::default();
            prop_assert_eq!(
                fit_odr(&x, &y, &options).ok(),
                fit_odr(&masked_x, &masked_y, &options).ok()
            );
        }

        #[test]
        fn unit_exponent_fits_never_move_the_exponent(
            pairs in prop::collection::vec((-5f64..5., -5f64..5.), 2..40),
        ) {
            let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let options = OdrOptions { unit_exponent: true, ..OdrOptions::default() };
            let fit = fit_odr(&x, &y, &options).unwrap();
            prop_assert_eq!(fit.exponent, 1.);
        }
    }
}
