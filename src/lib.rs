#![doc = include_str!("../README.md")]


mod abundance;
pub use abundance::{AbundanceModel, TraceHook, trace_hook};

pub mod calibration;
pub use calibration::{
    AnnealingFit, Bounds, CalibrationAlgorithm, CalibrationResult, CalibrationTrait, CobylaFit,
    GridFit, LeastSquaresFit, McmcFit, fit,
};

mod cost;
pub use cost::{
    CostFunction, Feasibility, FittingSpace, INFEASIBLE_COST, Infeasibility, Weighting,
    linear_uncertainties, weights,
};

mod data;
pub use data::{NdfObservation, ObservationCuts};

mod density;
pub use density::{DensityTable, InterpolatedDensity};

mod engine;
pub use engine::{CalibrationRequest, Calibrator, FitResult, ModelledNdf, RedshiftSlice};

mod error;
pub use error::{ConfigurationError, DensityError, InversionError, ObservationError};

pub mod feedback;
pub use feedback::{
    Feedback, FeedbackDescriptor, FeedbackTrait, FeedbackVariant, NoFeedback,
    SupernovaBlackHoleFeedback, SupernovaFeedback,
};

mod options;
pub use options::{QuantityKind, QuantityOptions};

mod sorted_array;

pub use ndarray;
