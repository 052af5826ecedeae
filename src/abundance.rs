use crate::density::InterpolatedDensity;
use crate::feedback::{Feedback, FeedbackTrait};

use ndarray::{Array1, ArrayView1};
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Observer called with the parameters and the predicted log10 densities of every evaluation
pub type TraceHook = Arc<dyn Fn(&[f64], ArrayView1<f64>) + Send + Sync>;

/// Wrap a closure into a [TraceHook]
pub fn trace_hook(f: impl Fn(&[f64], ArrayView1<f64>) + Send + Sync + 'static) -> TraceHook {
    Arc::new(f)
}

/// Abundance function predicted from a halo mass function and a feedback model
///
/// Halo mass function is tabulated over `log10 m_h`, observable values are given as `log10 m_obs`
/// and the prediction is `log10 φ(m_obs)`. The halo `m_h = f⁻¹(m_obs)` is found by inverting the
/// feedback model, and the density is transformed with the Jacobian of `log10 m_h(log10 m_obs)`:
///
/// $$
/// \phi(m_\mathrm{obs}) = \phi_h(m_h) \frac{m_\mathrm{obs}}{m_h} \frac{1}{f'(m_h)}.
/// $$
///
/// Every failure (parameters out of bounds, unreachable observable, halo mass outside of the
/// tabulated domain) gives NaN for the affected point.
#[derive(Clone)]
pub struct AbundanceModel {
    hmf: InterpolatedDensity,
    feedback: Feedback,
    trace: Option<TraceHook>,
}

impl AbundanceModel {
    pub fn new(hmf: impl Into<InterpolatedDensity>, feedback: impl Into<Feedback>) -> Self {
        Self {
            hmf: hmf.into(),
            feedback: feedback.into(),
            trace: None,
        }
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    pub fn hmf(&self) -> &InterpolatedDensity {
        &self.hmf
    }

    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    /// Predicted log10 density at a single log10 observable value
    pub fn log_density(&self, log_observable: f64, params: &[f64]) -> f64 {
        self.halo_density(log_observable, params)
            .map(f64::log10)
            .unwrap_or(f64::NAN)
    }

    /// Predicted log10 densities, aligned with `log_observable`
    pub fn evaluate(&self, log_observable: ArrayView1<f64>, params: &[f64]) -> Array1<f64> {
        let log_density = if self.feedback.bounds().contains(params) {
            log_observable.mapv(|x| self.log_density(x, params))
        } else {
            Array1::from_elem(log_observable.len(), f64::NAN)
        };
        if let Some(trace) = &self.trace {
            trace(params, log_density.view());
        }
        log_density
    }

    fn halo_density(&self, log_observable: f64, params: &[f64]) -> Option<f64> {
        let m_obs = 10f64.powf(log_observable);
        let m_h = self.feedback.invert(m_obs, params).ok()?;
        let phi_h = self.hmf.evaluate(m_h.log10()).ok()?;
        Some(phi_h * (m_obs / m_h) / self.feedback.derivative(m_h, params))
    }
}

impl Debug for AbundanceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbundanceModel")
            .field("hmf", &self.hmf)
            .field("feedback", &self.feedback)
            .field("trace", &self.trace.as_ref().map(|_| "TraceHook"))
            .finish()
    }
}
