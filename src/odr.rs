use argmin::core::observers::{ObserverMode, SlogLogger};
use argmin::core::{Executor, Jacobian, Operator};
use argmin::solver::gaussnewton::GaussNewtonLS;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use ndarray::{s, Array1, Array2};

use crate::{Error, Result};

/// Orthogonal distance problem for the straight line $y = m x + b$
///
/// The residual of point $i$ is its signed perpendicular distance from the line
/// $$
///     r_i = \frac{y_i - m x_i - b}{\sqrt{1 + m^2}},
/// $$
/// so a least-squares solve over `[m, b]` minimises the summed squared orthogonal distance.
#[derive(Clone)]
pub(crate) struct Problem {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl Problem {
    pub(crate) fn new(x: &[f64], y: &[f64]) -> Self {
        Self {
            x: Array1::from_vec(x.to_vec()),
            y: Array1::from_vec(y.to_vec()),
        }
    }

    /// Vertical residuals `y - m x - b`
    fn vertical(&self, slope: f64, intercept: f64) -> Array1<f64> {
        &self.y - &self.x.mapv(|x| slope.mul_add(x, intercept))
    }

    fn compute(&self, params: &Array1<f64>) -> Array1<f64> {
        let (slope, intercept) = (params[0], params[1]);
        self.vertical(slope, intercept) / slope.mul_add(slope, 1.).sqrt()
    }

    /// Gradient of the half squared residual norm, $J^T r$
    fn gradient(&self, params: &Array1<f64>) -> Array1<f64> {
        self.jacobian_matrix(params).t().dot(&self.compute(params))
    }

    fn jacobian_matrix(&self, params: &Array1<f64>) -> Array2<f64> {
        let (slope, intercept) = (params[0], params[1]);
        let norm = slope.mul_add(slope, 1.).sqrt();
        let vertical = self.vertical(slope, intercept);

        let mut jacobian = Array2::zeros((self.x.len(), 2));
        // d r / d m = -x / s - e m / s^3
        let d_slope = -&self.x / norm - vertical * (slope / norm.powi(3));
        jacobian.slice_mut(s![.., 0]).assign(&d_slope);
        jacobian.slice_mut(s![.., 1]).fill(-1. / norm);
        jacobian
    }

    /// Run the optimisation from `initial_parameters = [slope, intercept]`
    ///
    /// TODO: the solver and line search are fixed to Gauss-Newton with More-Thuente. These
    /// should become selectable through `OdrOptions`.
    pub(crate) fn solve(
        self,
        initial_parameters: Array1<f64>,
        max_iters: u64,
        tolerance: f64,
        log_solver: bool,
    ) -> Result<Array1<f64>> {
        assert_eq!(initial_parameters.len(), 2);

        // A (near) exact fit leaves a vanishing gradient, which the line search rejects as a
        // non-descent direction.
        let gradient = self.gradient(&initial_parameters);
        if gradient.iter().all(|g| g.abs() <= tolerance) {
            return Ok(initial_parameters);
        }

        let linesearch = MoreThuenteLineSearch::new()
            .with_bounds(0.0, 1.0)
            .map_err(solver_error)?;
        let solver = GaussNewtonLS::new(linesearch)
            .with_tolerance(tolerance)
            .map_err(solver_error)?;

        let mut executor = Executor::new(self, solver)
            .configure(|state| state.param(initial_parameters).max_iters(max_iters));
        if log_solver {
            executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
        }
        let res = executor.run().map_err(solver_error)?;

        let mut state = res.state().clone();
        state
            .take_param()
            .ok_or_else(|| Error::Solver("solver finished without parameters".into()))
    }
}

#[allow(clippy::needless_pass_by_value)]
fn solver_error(e: argmin::core::Error) -> Error {
    Error::Solver(e.to_string())
}

impl Operator for Problem {
    type Param = Array1<f64>;
    type Output = Array1<f64>;

    fn apply(&self, p: &Self::Param) -> ::std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.compute(p))
    }
}

impl Jacobian for Problem {
    type Param = Array1<f64>;
    type Jacobian = Array2<f64>;

    fn jacobian(
        &self,
        p: &Self::Param,
    ) -> ::std::result::Result<Self::Jacobian, argmin::core::Error> {
        Ok(self.jacobian_matrix(p))
    }
}
