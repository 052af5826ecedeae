use crate::abundance::{AbundanceModel, TraceHook};
use crate::calibration::{self, CalibrationAlgorithm};
use crate::cost::CostFunction;
use crate::data::NdfObservation;
use crate::density::DensityTable;
use crate::error::ConfigurationError;
use crate::feedback::FeedbackVariant;
use crate::options::{QuantityKind, QuantityOptions};

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Halo mass function and observed abundance function at a single redshift
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RedshiftSlice {
    pub redshift: usize,
    pub hmf: DensityTable,
    pub ndf: NdfObservation,
}

/// What to calibrate and how
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CalibrationRequest {
    pub feedback: FeedbackVariant,
    #[serde(default)]
    pub algorithm: CalibrationAlgorithm,
    /// Redshifts to calibrate, all available if `None`
    #[serde(default)]
    pub redshifts: Option<Vec<usize>>,
    #[serde(default)]
    pub options: QuantityOptions,
    /// Starting point, the default guess of the feedback model if `None`
    #[serde(default)]
    pub initial_guess: Option<Vec<f64>>,
    /// Number of points the modelled abundance function is sampled at
    #[serde(default = "CalibrationRequest::default_modelled_points")]
    pub modelled_points: usize,
}

impl CalibrationRequest {
    pub fn new(feedback: FeedbackVariant, algorithm: CalibrationAlgorithm) -> Self {
        Self {
            feedback,
            algorithm,
            redshifts: None,
            options: QuantityOptions::default(),
            initial_guess: None,
            modelled_points: Self::default_modelled_points(),
        }
    }

    /// Request built from quantity, feedback and backend names, with the quantity's default options
    pub fn from_names(quantity: &str, feedback: &str, backend: &str) -> Result<Self, ConfigurationError> {
        let quantity: QuantityKind = quantity.parse()?;
        Ok(Self {
            options: quantity.default_options(),
            ..Self::new(feedback.parse()?, backend.parse()?)
        })
    }

    pub fn with_redshifts(mut self, redshifts: Vec<usize>) -> Self {
        self.redshifts = Some(redshifts);
        self
    }

    pub fn with_options(mut self, options: QuantityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_initial_guess(mut self, initial_guess: Vec<f64>) -> Self {
        self.initial_guess = Some(initial_guess);
        self
    }

    #[inline]
    pub fn default_modelled_points() -> usize {
        100
    }
}

/// Predicted abundance function, `log10 φ` against `log10` of the quantity
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ModelledNdf {
    pub log_quantity: Array1<f64>,
    /// NaN where the model cannot be evaluated
    pub log_density: Array1<f64>,
}

/// Calibration outcome for a single redshift
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    pub redshift: usize,
    pub params: Vec<f64>,
    pub modelled: ModelledNdf,
    /// `None` if no feasible parameters were found
    pub cost: Option<f64>,
    pub converged: bool,
    /// Sampled parameters for sampling backends
    pub distribution: Option<Array2<f64>>,
}

/// Everything needed to calibrate a single slice, built before any fitting starts
struct PreparedFit {
    redshift: usize,
    cost: CostFunction,
    initial_guess: Vec<f64>,
    quantity_range: (f64, f64),
}

/// Calibrates feedback models against abundance functions at several redshifts
///
/// Slices are independent, [Calibrator::run_parallel] fits them concurrently. Only
/// misconfiguration is reported as an error, non-convergence is logged and flagged in
/// [FitResult::converged].
#[derive(Clone, Default)]
pub struct Calibrator {
    slices: Vec<RedshiftSlice>,
    trace: Option<TraceHook>,
}

impl Calibrator {
    /// If several slices have the same redshift, the first one is used
    pub fn new(slices: Vec<RedshiftSlice>) -> Self {
        Self {
            slices,
            trace: None,
        }
    }

    /// Attach an observer to every model evaluation of every slice
    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    pub fn redshifts(&self) -> Vec<usize> {
        self.slices.iter().map(|slice| slice.redshift).collect()
    }

    pub fn slice(&self, redshift: usize) -> Option<&RedshiftSlice> {
        self.slices.iter().find(|slice| slice.redshift == redshift)
    }

    /// Calibrate a single redshift
    pub fn fit_slice(
        &self,
        redshift: usize,
        request: &CalibrationRequest,
    ) -> Result<FitResult, ConfigurationError> {
        let slice = self
            .slice(redshift)
            .ok_or(ConfigurationError::UnknownRedshift(redshift))?;
        let prepared = self.prepare(slice, request)?;
        Self::fit_prepared(prepared, request)
    }

    /// Calibrate every requested redshift one after another
    pub fn run(&self, request: &CalibrationRequest) -> Result<Vec<FitResult>, ConfigurationError> {
        self.prepare_all(request)?
            .into_iter()
            .map(|prepared| Self::fit_prepared(prepared, request))
            .collect()
    }

    /// Calibrate every requested redshift concurrently, results are ordered as [Calibrator::run]
    /// orders them
    pub fn run_parallel(
        &self,
        request: &CalibrationRequest,
    ) -> Result<Vec<FitResult>, ConfigurationError> {
        self.prepare_all(request)?
            .into_par_iter()
            .map(|prepared| Self::fit_prepared(prepared, request))
            .collect()
    }

    fn prepare_all(
        &self,
        request: &CalibrationRequest,
    ) -> Result<Vec<PreparedFit>, ConfigurationError> {
        let redshifts = request
            .redshifts
            .clone()
            .unwrap_or_else(|| self.redshifts());
        redshifts
            .into_iter()
            .map(|redshift| {
                let slice = self
                    .slice(redshift)
                    .ok_or(ConfigurationError::UnknownRedshift(redshift))?;
                self.prepare(slice, request)
            })
            .collect()
    }

    fn prepare(
        &self,
        slice: &RedshiftSlice,
        request: &CalibrationRequest,
    ) -> Result<PreparedFit, ConfigurationError> {
        let options = &request.options;
        let mut descriptor = options.descriptor(request.feedback)?;
        if let Some(initial_guess) = &request.initial_guess {
            descriptor = descriptor.with_initial_guess(initial_guess.clone())?;
        }
        let observation =
            slice
                .ndf
                .select(&options.cuts)
                .ok_or(ConfigurationError::EmptySelection {
                    redshift: slice.redshift,
                })?;
        let mut model = AbundanceModel::new(slice.hmf.clone(), descriptor.feedback().clone());
        if let Some(trace) = &self.trace {
            model = model.with_trace_hook(trace.clone());
        }
        let cost = CostFunction::new(
            model,
            &observation,
            descriptor.bounds().clone(),
            options.fitting_space,
            options.weighting(),
        );
        Ok(PreparedFit {
            redshift: slice.redshift,
            cost,
            initial_guess: descriptor.initial_guess().to_vec(),
            quantity_range: observation.quantity_range(),
        })
    }

    fn fit_prepared(
        prepared: PreparedFit,
        request: &CalibrationRequest,
    ) -> Result<FitResult, ConfigurationError> {
        log::debug!(
            "calibrating {} feedback at redshift {} with {}",
            request.feedback,
            prepared.redshift,
            request.algorithm.name(),
        );
        let result = calibration::fit(&prepared.cost, &prepared.initial_guess, &request.algorithm)?;
        let (min, max) = prepared.quantity_range;
        let log_quantity = Array1::linspace(min, max, request.modelled_points);
        let log_density = prepared
            .cost
            .model()
            .evaluate(log_quantity.view(), &result.x);
        Ok(FitResult {
            redshift: prepared.redshift,
            params: result.x,
            modelled: ModelledNdf {
                log_quantity,
                log_density,
            },
            cost: result.cost,
            converged: result.success,
            distribution: result.distribution,
        })
    }
}

impl Debug for Calibrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calibrator")
            .field("redshifts", &self.redshifts())
            .field("trace", &self.trace.as_ref().map(|_| "TraceHook"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abundance::trace_hook;
    use crate::calibration::GridFit;
    use crate::data::ObservationCuts;
    use crate::tests::*;

    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn calibrator() -> Calibrator {
        let slices = [no_feedback_fixture(), no_feedback_fixture(), supernova_fixture()]
            .into_iter()
            .enumerate()
            .map(|(redshift, fixture)| RedshiftSlice {
                redshift,
                hmf: fixture.hmf,
                ndf: fixture.observation,
            })
            .collect();
        Calibrator::new(slices)
    }

    fn no_feedback_request() -> CalibrationRequest {
        CalibrationRequest::from_names("mstar", "none", "least_squares")
            .unwrap()
            .with_redshifts(vec![0, 1])
    }

    #[test]
    fn request_from_names() {
        let request = CalibrationRequest::from_names("Muv", "sn", "brute").unwrap();
        assert_eq!(request.feedback, FeedbackVariant::Supernova);
        assert_eq!(request.options.fitting_space, FittingSpace::Linear);
        assert_eq!(request.algorithm, GridFit::default().into());
        assert_eq!(
            CalibrationRequest::from_names("mstar", "none", "lbfgs"),
            Err(ConfigurationError::UnknownBackend("lbfgs".to_owned()))
        );
        assert_eq!(
            CalibrationRequest::from_names("mbh", "none", "least_squares"),
            Err(ConfigurationError::UnknownQuantity("mbh".to_owned()))
        );
    }

    #[test]
    fn sequential_run() {
        init_logger();
        let results = calibrator().run(&no_feedback_request()).unwrap();
        assert_eq!(results.len(), 2);
        for (redshift, result) in results.into_iter().enumerate() {
            assert_eq!(result.redshift, redshift);
            assert!(result.converged);
            assert_params_close(&result.params, &[NO_FEEDBACK_TRUE_A], 0.01);
            assert!(result.cost.unwrap() < 1e-6);
            assert_eq!(result.modelled.log_quantity.len(), 100);
            assert!(result.modelled.log_density.iter().all(|y| y.is_finite()));
        }
    }

    #[test]
    fn parallel_run_matches_sequential() {
        let calibrator = calibrator();
        let request = no_feedback_request();
        assert_eq!(
            calibrator.run_parallel(&request).unwrap(),
            calibrator.run(&request).unwrap()
        );
    }

    #[test]
    fn single_slice() {
        let request = CalibrationRequest::new(
            FeedbackVariant::Supernova,
            CalibrationAlgorithm::default(),
        );
        let result = calibrator().fit_slice(2, &request).unwrap();
        assert_params_close(&result.params, &SUPERNOVA_TRUE_PARAMS, 0.05);
        let fixture = supernova_fixture();
        assert_relative_eq!(
            result.modelled.log_quantity[0],
            fixture.observation.quantity_range().0
        );
    }

    #[test]
    fn configuration_errors() {
        init_logger();
        let calibrator = calibrator();
        let request = no_feedback_request().with_redshifts(vec![0, 7]);
        assert_eq!(
            calibrator.run(&request),
            Err(ConfigurationError::UnknownRedshift(7))
        );
        assert_eq!(
            calibrator.fit_slice(9, &no_feedback_request()),
            Err(ConfigurationError::UnknownRedshift(9))
        );

        let mut options = QuantityOptions::stellar_mass();
        options.cuts = ObservationCuts {
            min_log_density: Some(10.0),
            max_quantity: None,
        };
        let request = no_feedback_request().with_options(options);
        assert_eq!(
            calibrator.run(&request),
            Err(ConfigurationError::EmptySelection { redshift: 0 })
        );

        let request = no_feedback_request().with_initial_guess(vec![0.1, 0.2]);
        assert_eq!(
            calibrator.run(&request),
            Err(ConfigurationError::ParameterCount {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn trace_hook_is_called() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = {
            let calls = calls.clone();
            trace_hook(move |_, _| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        let calibrator = calibrator().with_trace_hook(hook);
        calibrator
            .fit_slice(0, &no_feedback_request())
            .unwrap();
        assert!(calls.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn request_from_json() {
        let request: CalibrationRequest =
            serde_json::from_str(r#"{"feedback": "sn", "redshifts": [2]}"#).unwrap();
        assert_eq!(request.algorithm, CalibrationAlgorithm::default());
        assert_eq!(request.modelled_points, 100);
        let results = calibrator().run(&request).unwrap();
        assert_eq!(results.len(), 1);
        assert_params_close(&results[0].params, &SUPERNOVA_TRUE_PARAMS, 0.05);
    }
}
