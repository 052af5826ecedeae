use super::inversion::check_invertible;
use super::{FeedbackTrait, FeedbackVariant};
use crate::calibration::Bounds;
use crate::error::InversionError;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Supernova feedback

Star formation in low-mass haloes is suppressed by supernova-driven outflows, the efficiency
grows as a power law of the halo mass:

$$
f'(m_h) = A \left(\frac{m_h}{m_c}\right)^\alpha,
\qquad
f(m_h) = \frac{A}{\alpha + 1} \left(\frac{m_h}{m_c}\right)^\alpha m_h,
$$

with $0 < A < 1$ and $\alpha > 0$. The model is meant for haloes below the critical mass $m_c$.

- Number of parameters: **2**
- Default parameters: $A = 0.01$, $\alpha = 1$
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SupernovaFeedback {
    m_crit: f64,
}

impl SupernovaFeedback {
    pub fn new(m_crit: f64) -> Self {
        Self { m_crit }
    }

    pub fn doc() -> &'static str {
        DOC
    }
}

impl FeedbackTrait for SupernovaFeedback {
    fn variant(&self) -> FeedbackVariant {
        FeedbackVariant::Supernova
    }

    fn m_crit(&self) -> f64 {
        self.m_crit
    }

    fn initial_guess(&self) -> Vec<f64> {
        vec![0.01, 1.0]
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(vec![0.0, 0.0], vec![1.0, f64::INFINITY])
    }

    fn forward(&self, m: f64, params: &[f64]) -> f64 {
        let (a, alpha) = (params[0], params[1]);
        a / (alpha + 1.0) * (m / self.m_crit).powf(alpha) * m
    }

    fn derivative(&self, m: f64, params: &[f64]) -> f64 {
        let (a, alpha) = (params[0], params[1]);
        a * (m / self.m_crit).powf(alpha)
    }

    fn invert(&self, observable: f64, params: &[f64]) -> Result<f64, InversionError> {
        check_invertible(&self.bounds(), observable, params)?;
        let (a, alpha) = (params[0], params[1]);
        let u = ((alpha + 1.0) * observable / (a * self.m_crit)).powf((alpha + 1.0).recip());
        let m = self.m_crit * u;
        if m.is_finite() && m > 0.0 {
            Ok(m)
        } else {
            Err(InversionError::OutOfRange { target: observable })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    check_doc_static_method!(doc_static_method, SupernovaFeedback);

    #[test]
    fn value_at_critical_mass() {
        let feedback = SupernovaFeedback::new(1e11);
        assert_relative_eq!(feedback.forward(1e11, &[0.3, 2.0]), 1e10);
        assert_relative_eq!(feedback.derivative(1e11, &[0.3, 2.0]), 0.3);
    }

    #[test]
    fn closed_form_inverse() {
        let feedback = SupernovaFeedback::new(1e11);
        let params = [0.02, 0.8];
        let m = 3e10;
        let observable = feedback.forward(m, &params);
        assert_relative_eq!(
            feedback.invert(observable, &params).unwrap(),
            m,
            max_relative = 1e-13
        );
        assert!(feedback.invert(observable, &[0.02, 0.0]).is_err());
    }
}
