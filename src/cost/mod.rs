//! Objective function of the calibration
//!
//! [CostFunction] compares the predictions of an [AbundanceModel] with an observed abundance
//! function. Candidate parameters are checked against the search bounds before the model is
//! evaluated, and every evaluation gives a [Feasibility] value. Optimisation backends which need a
//! plain number get it from [CostFunction::cost_or_sentinel] and
//! [CostFunction::residuals_or_sentinel], where infeasible points are replaced by
//! [INFEASIBLE_COST].

use crate::abundance::AbundanceModel;
use crate::calibration::Bounds;
use crate::data::NdfObservation;
use crate::error::ConfigurationError;

use ndarray::{Array1, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

mod weights;
pub use weights::{UNCONSTRAINED_FACTOR, Weighting, linear_uncertainties, weights};

/// Cost reported for infeasible parameters by the sentinel adapters
pub const INFEASIBLE_COST: f64 = 1e30;

/// Reason of a rejected parameter vector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Infeasibility {
    /// Parameters are outside of the open search bounds
    OutOfBounds,
    /// Model gives non-finite prediction for at least one observed point
    NonFinite,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Feasibility<T> {
    Feasible(T),
    Infeasible(Infeasibility),
}

impl<T> Feasibility<T> {
    pub fn is_feasible(&self) -> bool {
        matches!(self, Self::Feasible(_))
    }

    pub fn feasible(self) -> Option<T> {
        match self {
            Self::Feasible(value) => Some(value),
            Self::Infeasible(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Feasibility<U> {
        match self {
            Self::Feasible(value) => Feasibility::Feasible(f(value)),
            Self::Infeasible(reason) => Feasibility::Infeasible(reason),
        }
    }
}

/// Space the residuals are computed in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FittingSpace {
    /// `log10 φ_obs - log10 φ_model`
    Log,
    /// `φ_obs - φ_model`
    Linear,
}

impl FromStr for FittingSpace {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "log" => Ok(Self::Log),
            "linear" => Ok(Self::Linear),
            _ => Err(ConfigurationError::UnknownFittingSpace(s.to_owned())),
        }
    }
}

impl Display for FittingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => f.write_str("log"),
            Self::Linear => f.write_str("linear"),
        }
    }
}

/// Weighted residuals of an abundance model against an observation
///
/// Weights are computed once at construction.
#[derive(Clone, Debug)]
pub struct CostFunction {
    model: AbundanceModel,
    bounds: Bounds,
    quantity: Array1<f64>,
    log_density: Array1<f64>,
    weights: Array1<f64>,
    space: FittingSpace,
}

impl CostFunction {
    pub fn new(
        model: AbundanceModel,
        observation: &NdfObservation,
        bounds: Bounds,
        space: FittingSpace,
        weighting: Weighting,
    ) -> Self {
        Self {
            model,
            bounds,
            quantity: observation.quantity().to_owned(),
            log_density: observation.log_density().to_owned(),
            weights: weights(observation, weighting),
            space,
        }
    }

    pub fn model(&self) -> &AbundanceModel {
        &self.model
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn space(&self) -> FittingSpace {
        self.space
    }

    pub fn nparams(&self) -> usize {
        self.bounds.len()
    }

    pub fn npoints(&self) -> usize {
        self.quantity.len()
    }

    /// Weighted residuals, out-of-bounds parameters are rejected before model evaluation
    pub fn residuals(&self, params: &[f64]) -> Feasibility<Array1<f64>> {
        if !self.bounds.contains(params) {
            return Feasibility::Infeasible(Infeasibility::OutOfBounds);
        }
        let model = self.model.evaluate(self.quantity.view(), params);
        let residuals = Zip::from(&self.log_density)
            .and(&model)
            .and(&self.weights)
            .map_collect(|&observed, &model, &w| match self.space {
                FittingSpace::Log => w * (observed - model),
                FittingSpace::Linear => w * (10f64.powf(observed) - 10f64.powf(model)),
            });
        if residuals.iter().all(|r| r.is_finite()) {
            Feasibility::Feasible(residuals)
        } else {
            Feasibility::Infeasible(Infeasibility::NonFinite)
        }
    }

    /// Sum of squared weighted residuals
    pub fn cost(&self, params: &[f64]) -> Feasibility<f64> {
        self.residuals(params).map(|r| r.dot(&r))
    }

    pub fn residuals_or_sentinel(&self, params: &[f64]) -> Array1<f64> {
        match self.residuals(params) {
            Feasibility::Feasible(residuals) => residuals,
            // squares sum up to INFEASIBLE_COST
            Feasibility::Infeasible(_) => Array1::from_elem(
                self.npoints(),
                (INFEASIBLE_COST / self.npoints() as f64).sqrt(),
            ),
        }
    }

    pub fn cost_or_sentinel(&self, params: &[f64]) -> f64 {
        match self.cost(params) {
            Feasibility::Feasible(cost) if cost.is_finite() => cost,
            _ => INFEASIBLE_COST,
        }
    }
}
