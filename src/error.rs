/// Error returned when building or evaluating a [crate::DensityTable]
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum DensityError {
    #[error("density table has {actual} points, at least {minimum} are required")]
    TooShort { actual: usize, minimum: usize },

    #[error("abscissa and density columns differ in length: {x} != {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("abscissa values must be finite")]
    NonFinite,

    #[error("abscissa values must be strictly increasing")]
    NotIncreasing,

    #[error("{x} is outside of the tabulated domain [{min}, {max}]")]
    OutOfDomain { x: f64, min: f64, max: f64 },
}

/// Error returned when building a [crate::NdfObservation]
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum ObservationError {
    #[error("observation has no rows")]
    Empty,

    #[error(
        "observation columns differ in length: quantity {quantity}, log-density {log_density}, \
         uncertainties {lower_uncertainty} and {upper_uncertainty}"
    )]
    LengthMismatch {
        quantity: usize,
        log_density: usize,
        lower_uncertainty: usize,
        upper_uncertainty: usize,
    },

    #[error("quantity values must be unique and sorted ascending, row {index} breaks the order")]
    Unsorted { index: usize },

    #[error("row {index} has a non-finite quantity or log-density")]
    NonFinite { index: usize },

    #[error("row {index} has a negative uncertainty")]
    NegativeUncertainty { index: usize },
}

/// Error returned by [crate::FeedbackTrait::invert]
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum InversionError {
    #[error("feedback parameters {0:?} are outside of the model bounds")]
    InfeasibleParameters(Vec<f64>),

    #[error("observable value must be positive, {0} is given")]
    NonPositiveTarget(f64),

    #[error("observable value {target} is outside of the range reachable by the feedback function")]
    OutOfRange { target: f64 },

    #[error("inversion for observable value {target} did not converge in {iterations} iterations")]
    NoConvergence { target: f64, iterations: usize },
}

/// Misconfiguration of a calibration run, the only error surfaced by [crate::Calibrator]
#[derive(Debug, thiserror::Error, PartialEq, Clone)]
pub enum ConfigurationError {
    #[error("fitting space {0:?} is not known, use \"log\" or \"linear\"")]
    UnknownFittingSpace(String),

    #[error("fitting backend {0:?} is not known")]
    UnknownBackend(String),

    #[error("feedback model {0:?} is not known")]
    UnknownFeedback(String),

    #[error("quantity {0:?} is not known")]
    UnknownQuantity(String),

    #[error("feedback model expects {expected} parameters, {actual} given")]
    ParameterCount { expected: usize, actual: usize },

    #[error("bound override for parameter {index} is invalid: ({lower}, {upper})")]
    InvalidBound {
        index: usize,
        lower: f64,
        upper: f64,
    },

    #[error("redshift {0} is not in the dataset")]
    UnknownRedshift(usize),

    #[error("no observations left for redshift {redshift} after applying cuts")]
    EmptySelection { redshift: usize },

    #[error("critical mass must be positive and finite, {0} is given")]
    InvalidCriticalMass(f64),
}
