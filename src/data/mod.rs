mod ndf_observation;
pub use ndf_observation::{NdfObservation, ObservationCuts};
