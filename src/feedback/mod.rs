//! Feedback models mapping halo mass to an observable
//!
//! A feedback model is a strictly increasing function `f(m_h; θ)` of the halo mass, its value is
//! the galaxy observable (stellar mass or luminosity) the halo hosts. Every model knows its default
//! parameters and their bounds, its derivative and its inverse. Models are normalised by a
//! critical mass `m_c`, the scale where feedback changes behaviour.

use crate::calibration::Bounds;
use crate::error::{ConfigurationError, InversionError};

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

mod hypergeometric;
pub use hypergeometric::double_power_law_integral;

mod inversion;

mod none;
pub use none::NoFeedback;

mod supernova;
pub use supernova::SupernovaFeedback;

mod supernova_black_hole;
pub use supernova_black_hole::SupernovaBlackHoleFeedback;

#[enum_dispatch]
pub trait FeedbackTrait {
    fn variant(&self) -> FeedbackVariant;

    /// Critical mass `m_c` the model is normalised by
    fn m_crit(&self) -> f64;

    /// Default starting point of a calibration
    fn initial_guess(&self) -> Vec<f64>;

    /// Open bounds the parameters must lie within for the model to be physical
    fn bounds(&self) -> Bounds;

    fn nparams(&self) -> usize {
        self.initial_guess().len()
    }

    /// Observable hosted by a halo of mass `m`
    fn forward(&self, m: f64, params: &[f64]) -> f64;

    /// `d forward / d m`
    fn derivative(&self, m: f64, params: &[f64]) -> f64;

    /// Halo mass hosting the given observable
    ///
    /// Default implementation solves `forward(m) = observable` numerically, the solution is
    /// unique because `forward` is strictly increasing.
    fn invert(&self, observable: f64, params: &[f64]) -> Result<f64, InversionError> {
        inversion::check_invertible(&self.bounds(), observable, params)?;
        inversion::invert_increasing(
            |m| self.forward(m, params),
            |m| self.derivative(m, params),
            observable,
        )
    }
}

#[enum_dispatch(FeedbackTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum Feedback {
    NoFeedback(NoFeedback),
    SupernovaFeedback(SupernovaFeedback),
    SupernovaBlackHoleFeedback(SupernovaBlackHoleFeedback),
}

/// Name of a feedback model
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackVariant {
    /// Constant observable-to-halo mass ratio
    #[serde(alias = "no_feedback")]
    None,
    /// Power-law suppression at low masses
    #[serde(alias = "sn")]
    Supernova,
    /// Power-law suppression at both ends
    #[serde(alias = "both", alias = "sn+bh")]
    SupernovaBlackHole,
}

impl FeedbackVariant {
    pub fn build(self, m_crit: f64) -> Feedback {
        match self {
            Self::None => NoFeedback::new(m_crit).into(),
            Self::Supernova => SupernovaFeedback::new(m_crit).into(),
            Self::SupernovaBlackHole => SupernovaBlackHoleFeedback::new(m_crit).into(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Supernova => "sn",
            Self::SupernovaBlackHole => "both",
        }
    }
}

impl FromStr for FeedbackVariant {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "no_feedback" => Ok(Self::None),
            "sn" | "supernova" => Ok(Self::Supernova),
            "both" | "sn+bh" | "supernova+blackhole" | "supernova+black-hole"
            | "supernova_black_hole" => Ok(Self::SupernovaBlackHole),
            _ => Err(ConfigurationError::UnknownFeedback(s.to_owned())),
        }
    }
}

impl Display for FeedbackVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Feedback model together with the calibration starting point and search bounds
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackDescriptor {
    feedback: Feedback,
    initial_guess: Vec<f64>,
    bounds: Bounds,
}

impl FeedbackDescriptor {
    /// Descriptor with the default starting point and the physical bounds of the model
    pub fn new(variant: FeedbackVariant, m_crit: f64) -> Result<Self, ConfigurationError> {
        if !(m_crit.is_finite() && m_crit > 0.0) {
            return Err(ConfigurationError::InvalidCriticalMass(m_crit));
        }
        let feedback = variant.build(m_crit);
        Ok(Self {
            initial_guess: feedback.initial_guess(),
            bounds: feedback.bounds(),
            feedback,
        })
    }

    /// Narrow the search bounds, `None` keeps the bounds of that parameter
    ///
    /// Overridden bounds must be within the physical bounds of the model.
    pub fn with_bound_overrides(
        mut self,
        overrides: &[Option<(f64, f64)>],
    ) -> Result<Self, ConfigurationError> {
        if overrides.len() != self.nparams() {
            return Err(ConfigurationError::ParameterCount {
                expected: self.nparams(),
                actual: overrides.len(),
            });
        }
        for (index, bound) in overrides.iter().enumerate() {
            if let Some((lower, upper)) = *bound {
                self.bounds = self.bounds.with_override(index, lower, upper)?;
            }
        }
        Ok(self)
    }

    /// Replace the starting point of the calibration
    pub fn with_initial_guess(
        mut self,
        initial_guess: Vec<f64>,
    ) -> Result<Self, ConfigurationError> {
        if initial_guess.len() != self.nparams() {
            return Err(ConfigurationError::ParameterCount {
                expected: self.nparams(),
                actual: initial_guess.len(),
            });
        }
        self.initial_guess = initial_guess;
        Ok(self)
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    pub fn variant(&self) -> FeedbackVariant {
        self.feedback.variant()
    }

    pub fn m_crit(&self) -> f64 {
        self.feedback.m_crit()
    }

    pub fn initial_guess(&self) -> &[f64] {
        &self.initial_guess
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn nparams(&self) -> usize {
        self.initial_guess.len()
    }
}
