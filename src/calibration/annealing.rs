use super::seed::feasible_seed;
use super::{Bounds, CalibrationAlgorithm, CalibrationResult, CalibrationTrait, fine_tune};
use crate::cost::CostFunction;

use argmin::core::{
    CostFunction as ArgminCostFunction, Error as ArgminError, Executor, State, TerminationReason,
};
use argmin::solver::simulatedannealing::{Anneal, SimulatedAnnealing};
use ordered_float::NotNan;
use rand::prelude::*;
use rand_distr::StandardNormal;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng as XoshiroSeedableRng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Perturbation width relative to the search box width at the initial temperature
const STEP_FRACTION: f64 = 0.1;

/// Simulated annealing over the search box
///
/// Every step perturbs a single randomly chosen parameter with a normal step, its width shrinks
/// as the square root of the temperature. Proposals leaving the search box are replaced by a
/// uniform draw within it. Infinite bounds are replaced by the finite search box, see
/// [Bounds::search_box].
///
/// The iteration budget is capped by `niterations`, the best point visited is returned. If
/// `fine_tuning_algorithm` is `Some`, the best point is passed to it as an initial guess and its
/// result is returned.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Annealing")]
pub struct AnnealingFit {
    pub niterations: u32,
    pub initial_temperature: NotNan<f64>,
    pub seed: u64,
    pub fine_tuning_algorithm: Option<Box<CalibrationAlgorithm>>,
}

impl AnnealingFit {
    pub fn new(
        niterations: u32,
        initial_temperature: f64,
        seed: u64,
        fine_tuning_algorithm: Option<CalibrationAlgorithm>,
    ) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        assert!(
            initial_temperature.is_finite() && initial_temperature > 0.0,
            "initial_temperature must be positive and finite"
        );
        Self {
            niterations,
            initial_temperature: NotNan::new(initial_temperature)
                .expect("initial_temperature is not NaN"),
            seed,
            fine_tuning_algorithm: fine_tuning_algorithm.map(|x| x.into()),
        }
    }

    #[inline]
    pub fn default_niterations() -> u32 {
        1000
    }

    #[inline]
    pub fn default_initial_temperature() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_seed() -> u64 {
        0
    }

    /// Local polishing of the best annealing point with [LeastSquaresFit](super::LeastSquaresFit)
    #[inline]
    pub fn default_fine_tuning_algorithm() -> Option<CalibrationAlgorithm> {
        Some(super::LeastSquaresFit::default().into())
    }
}

impl Default for AnnealingFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_initial_temperature(),
            Self::default_seed(),
            Self::default_fine_tuning_algorithm(),
        )
    }
}

struct AnnealingProblem<'a> {
    cost: &'a CostFunction,
    search_box: Bounds,
    initial_temperature: f64,
    rng: Mutex<StdRng>,
}

impl ArgminCostFunction for AnnealingProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok(self.cost.cost_or_sentinel(param))
    }
}

impl Anneal for AnnealingProblem<'_> {
    type Param = Vec<f64>;
    type Output = Vec<f64>;
    type Float = f64;

    fn anneal(&self, param: &Self::Param, temperature: f64) -> Result<Self::Output, ArgminError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut x = param.clone();
        let i = rng.random_range(0..x.len());
        let lower = self.search_box.lower()[i];
        let width = self.search_box.upper()[i] - lower;
        let scale = STEP_FRACTION * width * (temperature / self.initial_temperature).sqrt();
        let eps: f64 = rng.sample(StandardNormal);
        let proposal = x[i] + scale * eps;
        x[i] = if proposal > lower && proposal < lower + width {
            proposal
        } else {
            lower + width * rng.random::<f64>()
        };
        Ok(x)
    }
}

impl CalibrationTrait for AnnealingFit {
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult {
        let seed = match feasible_seed(cost, x0, 1) {
            Ok((seed, _)) => seed,
            // starting from an infeasible point is fine for a global search
            Err(clipped) => clipped,
        };
        let problem = AnnealingProblem {
            cost,
            search_box: cost.bounds().search_box(),
            initial_temperature: self.initial_temperature.into_inner(),
            rng: Mutex::new(StdRng::seed_from_u64(self.seed)),
        };
        let solver = match SimulatedAnnealing::new_with_rng(
            self.initial_temperature.into_inner(),
            Xoshiro256PlusPlus::seed_from_u64(self.seed),
        ) {
            Ok(solver) => solver,
            Err(error) => {
                log::error!("cannot create annealing solver: {error}");
                return CalibrationResult::new(cost, seed, false);
            }
        };

        let result = Executor::new(problem, solver)
            .configure(|state| state.param(seed.clone()).max_iters(self.niterations as u64))
            .run();
        let (best, budget_used) = match result {
            Ok(result) => {
                let state = result.state();
                let budget_used = ran_full_schedule(state.get_termination_reason());
                if !budget_used {
                    log::warn!(
                        "annealing stopped before the end of its schedule: {:?}",
                        state.get_termination_status()
                    );
                }
                let best = state.get_best_param().cloned().unwrap_or_else(|| seed.clone());
                (best, budget_used)
            }
            Err(error) => {
                log::warn!("annealing stopped with error: {error}");
                (seed.clone(), false)
            }
        };
        let annealing_result = CalibrationResult::new(cost, best, budget_used);
        let annealing_result = CalibrationResult {
            success: annealing_result.success && annealing_result.cost.is_some(),
            ..annealing_result
        };

        fine_tune(self.fine_tuning_algorithm.as_deref(), cost, annealing_result)
    }
}

/// The whole cooling schedule is `max_iters` long, any other reason to stop cuts it short
fn ran_full_schedule(reason: Option<&TerminationReason>) -> bool {
    matches!(reason, Some(TerminationReason::MaxItersReached))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::LeastSquaresFit;
    use crate::tests::*;

    #[test]
    fn no_feedback_without_fine_tuning() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let fitter = AnnealingFit::new(1000, 1.0, 0, None);
        let result = fitter.calibrate(&cost, &[0.4]);
        assert!(result.success);
        assert_params_close(&result.x, &fixture.truth, 0.1);
    }

    #[test]
    fn no_feedback_with_fine_tuning() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let fitter = AnnealingFit::new(1000, 1.0, 1, Some(LeastSquaresFit::default().into()));
        let result = fitter.calibrate(&cost, &[0.4]);
        assert!(result.success);
        assert_params_close(&result.x, &fixture.truth, 0.01);
    }

    #[test]
    fn only_exhausted_budget_is_success() {
        assert!(ran_full_schedule(Some(&TerminationReason::MaxItersReached)));
        assert!(!ran_full_schedule(None));
        assert!(!ran_full_schedule(Some(&TerminationReason::Interrupt)));
        assert!(!ran_full_schedule(Some(&TerminationReason::Timeout)));
        assert!(!ran_full_schedule(Some(&TerminationReason::SolverExit(
            "stalled".to_string()
        ))));
    }

    #[test]
    fn infeasible_everywhere_is_failure() {
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
        let result = AnnealingFit::new(100, 1.0, 0, None).calibrate(&cost, &[0.95]);
        assert!(!result.success);
        assert_eq!(result.cost, None);
    }

    #[test]
    fn same_seed_same_result() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let fitter = AnnealingFit::new(200, 1.0, 42, None);
        assert_eq!(fitter.calibrate(&cost, &[0.4]), fitter.calibrate(&cost, &[0.4]));
    }
}
