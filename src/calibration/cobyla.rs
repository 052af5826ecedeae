use super::seed::feasible_seed;
use super::{CalibrationAlgorithm, CalibrationResult, CalibrationTrait, fine_tune};
use crate::cost::CostFunction;

use cobyla::{Func, RhoBeg, StopTols, minimize};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Derivative-free minimisation of the scalar cost with COBYLA
///
/// COBYLA approximates the cost by a linear model over a simplex of trial points, see M.J.D.
/// Powell, "A direct search optimization method that models the objective and constraint
/// functions by linear interpolation" (1994). Bounds are handed to the optimiser as
/// [Bounds::interior_limits](super::Bounds::interior_limits), infeasible trial points get
/// [INFEASIBLE_COST](crate::INFEASIBLE_COST).
///
/// If `fine_tuning_algorithm` is `Some`, the COBYLA optimum is used as its initial guess and its
/// result is returned.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Cobyla")]
pub struct CobylaFit {
    pub niterations: u32,
    pub rhobeg: NotNan<f64>,
    pub ftol_rel: NotNan<f64>,
    /// Grid points per dimension used to replace an infeasible initial guess
    pub seed_grid_size: u32,
    pub fine_tuning_algorithm: Option<Box<CalibrationAlgorithm>>,
}

impl CobylaFit {
    /// `niterations` caps the number of cost evaluations, `rhobeg` is the initial simplex size
    /// and `ftol_rel` is the relative cost tolerance
    pub fn new(
        niterations: u32,
        rhobeg: f64,
        ftol_rel: f64,
        fine_tuning_algorithm: Option<CalibrationAlgorithm>,
    ) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        assert!(rhobeg > 0.0, "rhobeg must be positive");
        assert!(rhobeg.is_finite(), "rhobeg must be finite");
        assert!(ftol_rel >= 0.0, "ftol_rel must be non-negative");
        assert!(ftol_rel.is_finite(), "ftol_rel must be finite");
        Self {
            niterations,
            rhobeg: NotNan::new(rhobeg).expect("rhobeg must be finite and not NaN"),
            ftol_rel: NotNan::new(ftol_rel).expect("ftol_rel must be finite and not NaN"),
            seed_grid_size: Self::default_seed_grid_size(),
            fine_tuning_algorithm: fine_tuning_algorithm.map(|x| x.into()),
        }
    }

    #[inline]
    pub fn default_niterations() -> u32 {
        1000
    }

    #[inline]
    pub fn default_rhobeg() -> f64 {
        0.1
    }

    #[inline]
    pub fn default_ftol_rel() -> f64 {
        1e-10
    }

    #[inline]
    pub fn default_seed_grid_size() -> u32 {
        16
    }

    #[inline]
    pub fn default_fine_tuning_algorithm() -> Option<CalibrationAlgorithm> {
        None
    }
}

impl Default for CobylaFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_rhobeg(),
            Self::default_ftol_rel(),
            Self::default_fine_tuning_algorithm(),
        )
    }
}

impl CalibrationTrait for CobylaFit {
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult {
        let (seed, _) = match feasible_seed(cost, x0, self.seed_grid_size as usize) {
            Ok(seed) => seed,
            Err(clipped) => return CalibrationResult::failure(clipped),
        };

        let objective = |x: &[f64], _: &mut ()| cost.cost_or_sentinel(x);
        let limits = cost.bounds().interior_limits();
        let constraints: Vec<&dyn Func<()>> = vec![];
        let stop_tol = StopTols {
            ftol_rel: self.ftol_rel.into(),
            ..StopTols::default()
        };

        let result = minimize(
            objective,
            &seed,
            &limits,
            &constraints,
            (),
            self.niterations as usize,
            RhoBeg::All(self.rhobeg.into()),
            Some(stop_tol),
        );

        let best = match result {
            Ok((status, x, _)) => {
                let success = matches!(
                    status,
                    cobyla::SuccessStatus::Success
                        | cobyla::SuccessStatus::FtolReached
                        | cobyla::SuccessStatus::XtolReached
                );
                CalibrationResult::new(cost, x, success)
            }
            Err((status, x, _)) => {
                log::debug!("COBYLA stopped with {status:?}");
                CalibrationResult::new(cost, x, false)
            }
        };
        // a failed run may end on an infeasible point
        let best = if best.cost.is_some() {
            best
        } else {
            CalibrationResult::new(cost, seed, false)
        };

        fine_tune(self.fine_tuning_algorithm.as_deref(), cost, best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::LeastSquaresFit;
    use crate::tests::*;

    #[test]
    fn no_feedback() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let result = CobylaFit::default().calibrate(&cost, &[0.45]);
        assert_params_close(&result.x, &fixture.truth, 0.05);
        assert!(cost.bounds().contains(&result.x));
    }

    #[test]
    fn supernova_with_fine_tuning() {
        let fixture = supernova_fixture();
        let cost = fixture.default_cost_function();
        let fitter = CobylaFit::new(2000, 0.1, 1e-10, Some(LeastSquaresFit::default().into()));
        let result = fitter.calibrate(&cost, fixture.descriptor.initial_guess());
        assert_params_close(&result.x, &fixture.truth, 0.05);
        assert!(result.cost.unwrap() < 1e-6);
    }
}
