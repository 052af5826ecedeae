use super::seed::feasible_seed;
use super::{Bounds, CalibrationResult, CalibrationTrait};
use crate::cost::CostFunction;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, Axis, concatenate};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Costs below this value are treated as an exact fit
const ZERO_COST: f64 = 1e-30;
const INITIAL_LAMBDA: f64 = 1e-3;
const MAX_LAMBDA: f64 = 1e16;
const MIN_LAMBDA: f64 = 1e-12;
/// Lower limit of the Marquardt scaling, relative to its largest element
const DIAGONAL_FLOOR: f64 = 1e-12;
/// Linear systems with a smaller ratio of extreme singular values are treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-12;
const MAX_SVD_ITERATIONS: usize = 1000;

/// Bounded Levenberg-Marquardt least squares
///
/// Minimises the sum of squared weighted residuals. Steps which would cross a bound are cut
/// half-way to it, so every trial point is strictly inside of the bounds. The Jacobian is
/// approximated with forward differences, a backward difference is used where the forward one is
/// infeasible. The damping uses Marquardt's diagonal scaling, so parameters of different
/// magnitudes are treated alike. Damped steps are found with the `nalgebra` SVD.
///
/// Convergence is declared when the relative cost decrease is below `ftol`, the relative step is
/// below `xtol`, the largest gradient component is below `gtol`, or no damping gives a better
/// point.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "LeastSquares")]
pub struct LeastSquaresFit {
    pub niterations: u32,
    pub ftol: NotNan<f64>,
    pub xtol: NotNan<f64>,
    pub gtol: NotNan<f64>,
    /// Grid points per dimension used to replace an infeasible initial guess
    pub seed_grid_size: u32,
}

impl LeastSquaresFit {
    pub fn new(niterations: u32, ftol: f64, xtol: f64, gtol: f64, seed_grid_size: u32) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        assert!(seed_grid_size > 0, "seed_grid_size must be positive");
        let tolerance = |value: f64, name: &str| {
            assert!(
                value.is_finite() && value >= 0.0,
                "{name} must be finite and non-negative"
            );
            NotNan::new(value).expect("finite value is not NaN")
        };
        Self {
            niterations,
            ftol: tolerance(ftol, "ftol"),
            xtol: tolerance(xtol, "xtol"),
            gtol: tolerance(gtol, "gtol"),
            seed_grid_size,
        }
    }

    #[inline]
    pub fn default_niterations() -> u32 {
        200
    }

    #[inline]
    pub fn default_ftol() -> f64 {
        1e-10
    }

    #[inline]
    pub fn default_xtol() -> f64 {
        1e-10
    }

    #[inline]
    pub fn default_gtol() -> f64 {
        1e-10
    }

    #[inline]
    pub fn default_seed_grid_size() -> u32 {
        16
    }
}

impl Default for LeastSquaresFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_ftol(),
            Self::default_xtol(),
            Self::default_gtol(),
            Self::default_seed_grid_size(),
        )
    }
}

impl CalibrationTrait for LeastSquaresFit {
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult {
        let (x, _) = match feasible_seed(cost, x0, self.seed_grid_size as usize) {
            Ok(seed) => seed,
            Err(clipped) => return CalibrationResult::failure(clipped),
        };
        let Some(residuals) = cost.residuals(&x).feasible() else {
            return CalibrationResult::failure(x);
        };
        let (x, success) = self.levenberg_marquardt(cost, Array1::from(x), residuals);
        CalibrationResult::new(cost, x.to_vec(), success)
    }
}

impl LeastSquaresFit {
    fn levenberg_marquardt(
        &self,
        cost: &CostFunction,
        mut x: Array1<f64>,
        mut residuals: Array1<f64>,
    ) -> (Array1<f64>, bool) {
        let bounds = cost.bounds();
        let mut value = residuals.dot(&residuals);
        let mut lambda = INITIAL_LAMBDA;

        for _ in 0..self.niterations {
            if value <= ZERO_COST {
                return (x, true);
            }
            let jacobian = jacobian(cost, &x, &residuals);
            let gradient = jacobian.t().dot(&residuals);
            if gradient.iter().all(|g| g.abs() <= *self.gtol) {
                return (x, true);
            }
            let normal_diagonal = jacobian.map_axis(Axis(0), |column| column.dot(&column));
            let max_diagonal = normal_diagonal.fold(0.0, |acc: f64, &d| acc.max(d));
            let scale = normal_diagonal
                .mapv(|d| d.max(DIAGONAL_FLOOR * max_diagonal).max(f64::MIN_POSITIVE));

            loop {
                let step = damped_step(&jacobian, &residuals, &scale, lambda);
                let trial = step.as_ref().and_then(|step| {
                    let x_new = Array1::from(project(bounds, &x, step));
                    let r_new = cost.residuals(x_new.as_slice()?).feasible()?;
                    let value_new = r_new.dot(&r_new);
                    (value_new < value).then_some((x_new, r_new, value_new))
                });
                match trial {
                    Some((x_new, r_new, value_new)) => {
                        let decrease = value - value_new;
                        let dx = (&x_new - &x).mapv(f64::abs).sum();
                        let x_norm = x.mapv(f64::abs).sum();
                        x = x_new;
                        residuals = r_new;
                        value = value_new;
                        lambda = (lambda / 10.0).max(MIN_LAMBDA);
                        if decrease <= *self.ftol * value || dx <= *self.xtol * (x_norm + *self.xtol)
                        {
                            return (x, true);
                        }
                        break;
                    }
                    None => {
                        lambda *= 10.0;
                        if lambda > MAX_LAMBDA {
                            // no descent direction left
                            return (x, true);
                        }
                    }
                }
            }
        }
        (x, false)
    }
}

fn project(bounds: &Bounds, x: &Array1<f64>, step: &Array1<f64>) -> Vec<f64> {
    match (x.as_slice(), step.as_slice()) {
        (Some(x), Some(step)) => bounds.project_step(x, step),
        _ => bounds.project_step(&x.to_vec(), &step.to_vec()),
    }
}

/// Forward-difference Jacobian of the residuals, `residuals` is the value at `x`
fn jacobian(cost: &CostFunction, x: &Array1<f64>, residuals: &Array1<f64>) -> Array2<f64> {
    let mut jacobian = Array2::zeros((residuals.len(), x.len()));
    for (j, mut column) in jacobian.axis_iter_mut(Axis(1)).enumerate() {
        let h = f64::EPSILON.sqrt() * x[j].abs().max(1e-8);
        for step in [h, -h] {
            let mut shifted = x.to_vec();
            shifted[j] += step;
            if let Some(r) = cost.residuals(&shifted).feasible() {
                column.assign(&((r - residuals) / step));
                break;
            }
        }
    }
    jacobian
}

/// Step `δ` solving `(JᵀJ + λ D) δ = -Jᵀr`
///
/// The normal equations are never formed, `δ` is the least-squares solution of `J δ = -r` stacked
/// on `√(λ D) δ = 0`.
fn damped_step(
    jacobian: &Array2<f64>,
    residuals: &Array1<f64>,
    scale: &Array1<f64>,
    lambda: f64,
) -> Option<Array1<f64>> {
    let damping = Array2::from_diag(&scale.mapv(|s| (lambda * s).sqrt()));
    let a = concatenate(Axis(0), &[jacobian.view(), damping.view()]).ok()?;
    let b = concatenate(
        Axis(0),
        &[(-residuals).view(), Array1::zeros(scale.len()).view()],
    )
    .ok()?;
    solve(&a, &b)
}

/// Least-squares solution of `a x = b` through SVD, `None` for rank-deficient `a`
fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if !a.iter().chain(b.iter()).all(|v| v.is_finite()) {
        return None;
    }
    let (nrows, ncols) = a.dim();
    let svd = DMatrix::from_fn(nrows, ncols, |i, j| a[[i, j]]).try_svd(
        true,
        true,
        f64::EPSILON,
        MAX_SVD_ITERATIONS,
    )?;
    let max_singular = svd.singular_values.iter().fold(0.0, |acc: f64, &s| acc.max(s));
    let min_singular = svd
        .singular_values
        .iter()
        .fold(f64::INFINITY, |acc: f64, &s| acc.min(s));
    if !(min_singular > SINGULAR_TOLERANCE * max_singular) {
        return None;
    }
    let x = svd
        .solve(&DVector::from_iterator(nrows, b.iter().copied()), 0.0)
        .ok()?;
    x.iter()
        .all(|x| x.is_finite())
        .then(|| x.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn linear_system() {
        let a = array![[0.0, 2.0, 1.0], [1.0, -1.0, 0.0], [3.0, 0.0, 1.0]];
        let b = array![5.0, -1.0, 6.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x, array![3.0, 4.0, -3.0], max_relative = 1e-12);
        assert!(solve(&array![[1.0, 2.0], [2.0, 4.0]], &array![1.0, 1.0]).is_none());
    }

    #[test]
    fn overdetermined_system() {
        // y = 2 + 3 x at x = 0, 1, 2
        let a = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0]];
        let b = array![2.0, 5.0, 8.0];
        let x = solve(&a, &b).unwrap();
        assert_relative_eq!(x, array![2.0, 3.0], max_relative = 1e-12);
    }

    #[test]
    fn damped_step_solves_normal_equations() {
        let jacobian = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let residuals = array![1.0, -1.0, 2.0];
        let scale = array![35.0, 56.0];
        let lambda = 0.1;
        let step = damped_step(&jacobian, &residuals, &scale, lambda).unwrap();
        let damped = jacobian.t().dot(&jacobian) + Array2::from_diag(&(lambda * &scale));
        let lhs = damped.dot(&step);
        let rhs = -jacobian.t().dot(&residuals);
        assert_relative_eq!(lhs, rhs, epsilon = 1e-10);
    }

    #[test]
    fn no_feedback_from_default_guess() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let result = LeastSquaresFit::default()
            .calibrate(&cost, fixture.descriptor.initial_guess());
        assert!(result.success);
        assert_params_close(&result.x, &fixture.truth, 0.01);
        assert!(result.cost.unwrap() < 1e-6);
        assert!(result.distribution.is_none());
    }

    #[test]
    fn supernova_from_default_guess() {
        let fixture = supernova_fixture();
        let cost = fixture.default_cost_function();
        let result = LeastSquaresFit::default()
            .calibrate(&cost, fixture.descriptor.initial_guess());
        assert_params_close(&result.x, &fixture.truth, 0.05);
        assert!(result.cost.unwrap() < 1e-6);
    }

    #[test]
    fn supernova_from_out_of_bounds_guess() {
        let fixture = supernova_fixture();
        let cost = fixture.default_cost_function();
        let result = LeastSquaresFit::default().calibrate(&cost, &[1.5, -0.3]);
        assert!(cost.bounds().contains(&result.x));
        assert_params_close(&result.x, &fixture.truth, 0.05);
    }

    #[test]
    fn supernova_with_noise() {
        let fixture = supernova_fixture();
        let fixture = Fixture {
            observation: with_noise(&fixture.observation, 0.01, 0),
            ..fixture
        };
        let cost = fixture.default_cost_function();
        let result = LeastSquaresFit::default()
            .calibrate(&cost, fixture.descriptor.initial_guess());
        assert!(result.success);
        assert_params_close(&result.x, &fixture.truth, 0.1);
        assert!(result.cost.unwrap() > 0.0);
    }

    #[test]
    fn linear_space_absolute_weights() {
        let fixture = supernova_fixture();
        let cost = fixture.cost_function(FittingSpace::Linear, Weighting::Absolute);
        let result = LeastSquaresFit::default().calibrate(&cost, &[0.025, 0.7]);
        assert_params_close(&result.x, &fixture.truth, 0.05);
    }

    #[test]
    fn supernova_black_hole_recovery() {
        let fixture = supernova_black_hole_fixture();
        let cost = fixture.default_cost_function();
        let result = LeastSquaresFit::default().calibrate(&cost, &[0.02, 1.3, 0.7]);
        assert!(result.success);
        assert_params_close(&result.x, &fixture.truth, 0.01);
        assert!(result.cost.unwrap() < 1e-6);
    }

    #[test]
    fn no_feasible_point() {
        let fixture = no_feedback_fixture();
        let descriptor = fixture
            .descriptor
            .clone()
            .with_bound_overrides(&[Some((0.9, 1.0))])
            .unwrap();
        let cost = CostFunction::new(
            fixture.model(),
            &fixture.observation,
            descriptor.bounds().clone(),
            FittingSpace::Log,
            Weighting::Relative,
        );
        let result = LeastSquaresFit::default().calibrate(&cost, &[0.95]);
        assert!(!result.success);
        assert_eq!(result.cost, None);
    }
}
