use super::inversion::check_invertible;
use super::{FeedbackTrait, FeedbackVariant};
use crate::calibration::Bounds;
use crate::error::InversionError;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
No feedback

The observable is a constant fraction of the halo mass:

$$
f(m_h) = A\,m_h,
$$

where $0 < A < 1$ is the conversion efficiency.

- Number of parameters: **1**
- Default parameters: $A = 0.01$
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct NoFeedback {
    m_crit: f64,
}

impl NoFeedback {
    /// `m_crit` does not enter the model, it is kept for uniformity with other feedback models
    pub fn new(m_crit: f64) -> Self {
        Self { m_crit }
    }

    pub fn doc() -> &'static str {
        DOC
    }
}

impl FeedbackTrait for NoFeedback {
    fn variant(&self) -> FeedbackVariant {
        FeedbackVariant::None
    }

    fn m_crit(&self) -> f64 {
        self.m_crit
    }

    fn initial_guess(&self) -> Vec<f64> {
        vec![0.01]
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(vec![0.0], vec![1.0])
    }

    fn forward(&self, m: f64, params: &[f64]) -> f64 {
        params[0] * m
    }

    fn derivative(&self, _m: f64, params: &[f64]) -> f64 {
        params[0]
    }

    fn invert(&self, observable: f64, params: &[f64]) -> Result<f64, InversionError> {
        check_invertible(&self.bounds(), observable, params)?;
        Ok(observable / params[0])
    }
}
