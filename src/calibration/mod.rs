//! Calibration backends
//!
//! # Overview
//!
//! A backend searches the parameter space of a feedback model for the minimum of a
//! [CostFunction]. Every backend gets the same cost function, the same starting point and the
//! same open bounds, and returns a [CalibrationResult]. Backends are configured with plain
//! serializable structs and dispatched through the [CalibrationAlgorithm] enum.
//!
//! # Feasibility
//!
//! The cost function reports infeasible parameters explicitly, either because they are outside of
//! the bounds or because the model cannot be evaluated for some observed point. Backends which
//! expect a plain number or vector use the sentinel adapters of [CostFunction], so infeasible
//! points look like very bad ones and are never selected as the best point.
//!
//! Local backends need a feasible starting point. The seed is first moved strictly inside the
//! bounds. If it is still infeasible, a coarse grid of points over the search box is evaluated and
//! the best feasible grid point is used, a warning is logged in this case. If no grid point is
//! feasible the backend gives up and returns the clipped seed with `success = false` and no cost.
//!
//! # Backends
//!
//! - [LeastSquaresFit]: projected Levenberg-Marquardt on the residual vector, the default.
//! - [CobylaFit]: derivative-free COBYLA minimisation of the scalar cost.
//! - [AnnealingFit]: simulated annealing over the search box with a capped iteration budget.
//! - [GridFit]: exhaustive search over a regular grid of the search box.
//! - [McmcFit]: ensemble MCMC sampling of `exp(-cost / 2)`, also gives the sampled distribution.
//!
//! All backends except [LeastSquaresFit] may pass their best point to a `fine_tuning_algorithm`,
//! which returns the final result.
//!
//! # Non-convergence
//!
//! Non-convergence is never an error, the best point found is returned with `success = false` and
//! it is up to the caller to report it.

use crate::cost::CostFunction;
use crate::error::ConfigurationError;

use enum_dispatch::enum_dispatch;
use ndarray::Array2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

mod annealing;
pub use annealing::AnnealingFit;

mod bounds;
pub use bounds::{Bounds, UNBOUNDED_SEARCH_SPAN};

mod cobyla;
pub use cobyla::CobylaFit;

mod grid;
pub use grid::GridFit;

mod least_squares;
pub use least_squares::LeastSquaresFit;

mod mcmc;
pub use mcmc::McmcFit;

mod seed;

/// Output of a calibration backend
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationResult {
    /// Best parameters found
    pub x: Vec<f64>,
    /// Cost at `x`, `None` if no feasible point was found
    pub cost: Option<f64>,
    /// Did the backend converge?
    pub success: bool,
    /// Parameter samples, one row per sample, for sampling backends
    pub distribution: Option<Array2<f64>>,
}

impl CalibrationResult {
    fn new(cost: &CostFunction, x: Vec<f64>, success: bool) -> Self {
        Self {
            cost: cost.cost(&x).feasible(),
            x,
            success,
            distribution: None,
        }
    }

    /// Result of a backend which did not find any feasible point
    fn failure(x: Vec<f64>) -> Self {
        Self {
            x,
            cost: None,
            success: false,
            distribution: None,
        }
    }
}

#[enum_dispatch]
pub trait CalibrationTrait {
    /// Minimise `cost` starting from `x0`
    ///
    /// `x0` must have [CostFunction::nparams] elements, it may be outside of the bounds.
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult;
}

#[enum_dispatch(CalibrationTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CalibrationAlgorithm {
    Annealing(AnnealingFit),
    Cobyla(CobylaFit),
    Grid(GridFit),
    LeastSquares(LeastSquaresFit),
    Mcmc(McmcFit),
}

impl CalibrationAlgorithm {
    /// Backend name as accepted by [FromStr]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Annealing(_) => "annealing",
            Self::Cobyla(_) => "minimize",
            Self::Grid(_) => "brute",
            Self::LeastSquares(_) => "least_squares",
            Self::Mcmc(_) => "mcmc",
        }
    }
}

impl Default for CalibrationAlgorithm {
    fn default() -> Self {
        LeastSquaresFit::default().into()
    }
}

/// Backend with default configuration by its name
impl FromStr for CalibrationAlgorithm {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "least_squares" => Ok(LeastSquaresFit::default().into()),
            "minimize" | "cobyla" => Ok(CobylaFit::default().into()),
            "annealing" => Ok(AnnealingFit::default().into()),
            "brute" | "grid" => Ok(GridFit::default().into()),
            "mcmc" => Ok(McmcFit::default().into()),
            _ => Err(ConfigurationError::UnknownBackend(s.to_owned())),
        }
    }
}

/// Run `fine_tuning_algorithm` from the best point of `result`, if any
///
/// Sampled distribution of `result` is kept.
fn fine_tune(
    fine_tuning_algorithm: Option<&CalibrationAlgorithm>,
    cost: &CostFunction,
    result: CalibrationResult,
) -> CalibrationResult {
    let Some(algorithm) = fine_tuning_algorithm else {
        return result;
    };
    if result.cost.is_none() {
        return result;
    }
    let tuned = algorithm.calibrate(cost, &result.x);
    CalibrationResult {
        distribution: tuned.distribution.or(result.distribution),
        ..tuned
    }
}

/// Calibrate with the given backend, non-convergence is logged
pub fn fit(
    cost: &CostFunction,
    x0: &[f64],
    algorithm: &CalibrationAlgorithm,
) -> Result<CalibrationResult, ConfigurationError> {
    if x0.len() != cost.nparams() {
        return Err(ConfigurationError::ParameterCount {
            expected: cost.nparams(),
            actual: x0.len(),
        });
    }
    let result = algorithm.calibrate(cost, x0);
    if !result.success {
        log::warn!(
            "{} calibration did not converge, best parameters {:?} with cost {:?}",
            algorithm.name(),
            result.x,
            result.cost,
        );
    }
    Ok(result)
}
