use super::hypergeometric::double_power_law_integral;
use super::{FeedbackTrait, FeedbackVariant};
use crate::calibration::Bounds;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Supernova and black hole feedback

Supernovae suppress star formation below the critical mass $m_c$ and active galactic nuclei
suppress it above. The efficiency is a double power law:

$$
f'(m_h) = \frac{A}{(m_h/m_c)^{-\alpha} + (m_h/m_c)^{\beta}},
\qquad
f(m_h) = A\,m_c \int_0^{m_h/m_c} \frac{t^\alpha}{1 + t^{\alpha + \beta}}\,\mathrm{d}t,
$$

with $0 < A < 1$, $\alpha > 0$ and $\beta > 0$. The integral is expressed through the Gauss
hypergeometric function. For $\beta > 1$ the observable saturates at high halo masses, so values
above the saturation level cannot be inverted.

- Number of parameters: **3**
- Default parameters: $A = 0.01$, $\alpha = 1$, $\beta = 1$
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SupernovaBlackHoleFeedback {
    m_crit: f64,
}

impl SupernovaBlackHoleFeedback {
    pub fn new(m_crit: f64) -> Self {
        Self { m_crit }
    }

    pub fn doc() -> &'static str {
        DOC
    }
}

impl FeedbackTrait for SupernovaBlackHoleFeedback {
    fn variant(&self) -> FeedbackVariant {
        FeedbackVariant::SupernovaBlackHole
    }

    fn m_crit(&self) -> f64 {
        self.m_crit
    }

    fn initial_guess(&self) -> Vec<f64> {
        vec![0.01, 1.0, 1.0]
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(vec![0.0, 0.0, 0.0], vec![1.0, f64::INFINITY, f64::INFINITY])
    }

    fn forward(&self, m: f64, params: &[f64]) -> f64 {
        let (a, alpha, beta) = (params[0], params[1], params[2]);
        a * self.m_crit * double_power_law_integral(m / self.m_crit, alpha, beta)
    }

    fn derivative(&self, m: f64, params: &[f64]) -> f64 {
        let (a, alpha, beta) = (params[0], params[1], params[2]);
        let u = m / self.m_crit;
        a / (u.powf(-alpha) + u.powf(beta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use approx::assert_relative_eq;

    check_doc_static_method!(doc_static_method, SupernovaBlackHoleFeedback);

    #[test]
    fn symmetric_case_closed_form() {
        let feedback = SupernovaBlackHoleFeedback::new(1e11);
        let params = [0.1, 1.0, 1.0];
        for &m in &[1e9, 1e11, 5e12] {
            let u: f64 = m / 1e11;
            let expected = 0.1 * 1e11 * 0.5 * f64::ln_1p(u * u);
            assert_relative_eq!(feedback.forward(m, &params), expected, max_relative = 1e-12);
        }
        assert_relative_eq!(feedback.derivative(1e11, &params), 0.05);
    }

    #[test]
    fn numerical_inverse() {
        let feedback = SupernovaBlackHoleFeedback::new(1e11);
        let params = [0.03, 1.5, 0.4];
        let m = 2.5e12;
        let observable = feedback.forward(m, &params);
        assert_relative_eq!(
            feedback.invert(observable, &params).unwrap(),
            m,
            max_relative = 1e-11
        );
    }

    #[test]
    fn shallow_slopes() {
        let feedback = SupernovaBlackHoleFeedback::new(1e11);
        let params = [0.02, 0.05, 0.02];
        assert_relative_eq!(
            feedback.forward(2e11, &params),
            0.02 * 1e11 * 0.9948782260087209,
            max_relative = 1e-10
        );
        let values: Vec<_> = [1.5e11, 2e11, 3e11]
            .iter()
            .map(|&m| feedback.forward(m, &params))
            .collect();
        assert!(values[0] < values[1] && values[1] < values[2], "{values:?}");
    }

    #[test]
    fn forward_is_monotonic() {
        let feedback = SupernovaBlackHoleFeedback::new(1e11);
        let masses: Vec<_> = (0..141)
            .map(|i| 1e11 * 10f64.powf(-3.0 + 0.05 * i as f64))
            .collect();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let params = [
                0.02,
                rng.random_range(0.01..3.0),
                rng.random_range(0.01..3.0),
            ];
            let values: Vec<_> = masses
                .iter()
                .map(|&m| feedback.forward(m, &params))
                .collect();
            assert!(values[0] > 0.0, "non-positive at {params:?}");
            for (m, f) in masses.windows(2).zip(values.windows(2)) {
                assert!(
                    f[0] < f[1],
                    "not increasing between {} and {} at {params:?}: {} >= {}",
                    m[0],
                    m[1],
                    f[0],
                    f[1]
                );
            }
        }
    }
}
