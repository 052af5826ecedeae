use crate::error::ObservationError;

use ndarray::{Array1, ArrayView1, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observed number density function at a single redshift
///
/// Every row is `(quantity, log10 density, lower uncertainty, upper uncertainty)`, where the
/// quantity is usually the decimal logarithm of stellar mass or luminosity and the uncertainties
/// are asymmetric error bars in dex. Quantities are unique and sorted ascending. Uncertainties are
/// non-negative, a non-finite uncertainty marks an unconstrained point.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(into = "NdfObservationColumns", try_from = "NdfObservationColumns")]
pub struct NdfObservation {
    quantity: Array1<f64>,
    log_density: Array1<f64>,
    lower_uncertainty: Array1<f64>,
    upper_uncertainty: Array1<f64>,
}

impl NdfObservation {
    pub fn from_rows(rows: &[[f64; 4]]) -> Result<Self, ObservationError> {
        let column = |j: usize| rows.iter().map(|row| row[j]).collect::<Array1<_>>();
        Self::new(column(0), column(1), column(2), column(3))
    }

    pub fn new(
        quantity: Array1<f64>,
        log_density: Array1<f64>,
        lower_uncertainty: Array1<f64>,
        upper_uncertainty: Array1<f64>,
    ) -> Result<Self, ObservationError> {
        let lengths = [
            log_density.len(),
            lower_uncertainty.len(),
            upper_uncertainty.len(),
        ];
        if lengths.iter().any(|&len| len != quantity.len()) {
            return Err(ObservationError::LengthMismatch {
                quantity: quantity.len(),
                log_density: lengths[0],
                lower_uncertainty: lengths[1],
                upper_uncertainty: lengths[2],
            });
        }
        if quantity.is_empty() {
            return Err(ObservationError::Empty);
        }
        for index in 0..quantity.len() {
            if !quantity[index].is_finite() || !log_density[index].is_finite() {
                return Err(ObservationError::NonFinite { index });
            }
            // NaN is "unconstrained" and passes the check
            if lower_uncertainty[index] < 0.0 || upper_uncertainty[index] < 0.0 {
                return Err(ObservationError::NegativeUncertainty { index });
            }
            if index > 0 && quantity[index] <= quantity[index - 1] {
                return Err(ObservationError::Unsorted { index });
            }
        }
        Ok(Self {
            quantity,
            log_density,
            lower_uncertainty,
            upper_uncertainty,
        })
    }

    pub fn len(&self) -> usize {
        self.quantity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_empty()
    }

    pub fn quantity(&self) -> ArrayView1<'_, f64> {
        self.quantity.view()
    }

    pub fn log_density(&self) -> ArrayView1<'_, f64> {
        self.log_density.view()
    }

    pub fn lower_uncertainty(&self) -> ArrayView1<'_, f64> {
        self.lower_uncertainty.view()
    }

    pub fn upper_uncertainty(&self) -> ArrayView1<'_, f64> {
        self.upper_uncertainty.view()
    }

    pub fn quantity_range(&self) -> (f64, f64) {
        (self.quantity[0], self.quantity[self.len() - 1])
    }

    /// Rows passing `cuts`, `None` if nothing is left
    pub fn select(&self, cuts: &ObservationCuts) -> Option<Self> {
        let keep = Zip::from(&self.quantity)
            .and(&self.log_density)
            .map_collect(|&q, &log_phi| cuts.accepts(q, log_phi));
        if !keep.iter().any(|&k| k) {
            return None;
        }
        let filter = |a: &Array1<f64>| {
            a.iter()
                .zip(keep.iter())
                .filter_map(|(&x, &k)| k.then_some(x))
                .collect::<Array1<_>>()
        };
        Some(Self {
            quantity: filter(&self.quantity),
            log_density: filter(&self.log_density),
            lower_uncertainty: filter(&self.lower_uncertainty),
            upper_uncertainty: filter(&self.upper_uncertainty),
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "NdfObservation")]
struct NdfObservationColumns {
    quantity: Array1<f64>,
    log_density: Array1<f64>,
    lower_uncertainty: Array1<f64>,
    upper_uncertainty: Array1<f64>,
}

impl From<NdfObservation> for NdfObservationColumns {
    fn from(observation: NdfObservation) -> Self {
        Self {
            quantity: observation.quantity,
            log_density: observation.log_density,
            lower_uncertainty: observation.lower_uncertainty,
            upper_uncertainty: observation.upper_uncertainty,
        }
    }
}

impl TryFrom<NdfObservationColumns> for NdfObservation {
    type Error = ObservationError;

    fn try_from(columns: NdfObservationColumns) -> Result<Self, Self::Error> {
        Self::new(
            columns.quantity,
            columns.log_density,
            columns.lower_uncertainty,
            columns.upper_uncertainty,
        )
    }
}

/// Row selection applied before fitting
///
/// Low abundances cannot be measured reliably, and a supernova-only model cannot describe the
/// massive end of the function, so both tails may be cut away.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservationCuts {
    /// Drop rows with log10 density below this value
    #[serde(default)]
    pub min_log_density: Option<f64>,
    /// Drop rows with quantity above this value
    #[serde(default)]
    pub max_quantity: Option<f64>,
}

impl ObservationCuts {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn accepts(&self, quantity: f64, log_density: f64) -> bool {
        self.min_log_density.is_none_or(|min| log_density >= min)
            && self.max_quantity.is_none_or(|max| quantity <= max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    fn observation() -> NdfObservation {
        NdfObservation::from_rows(&[
            [8.0, -2.0, 0.1, 0.1],
            [9.0, -3.0, 0.2, f64::NAN],
            [10.0, -5.0, 0.3, 0.3],
            [11.0, -7.0, f64::INFINITY, 0.5],
        ])
        .unwrap()
    }

    #[test]
    fn columns() {
        let obs = observation();
        assert_eq!(obs.len(), 4);
        assert_eq!(obs.quantity(), array![8.0, 9.0, 10.0, 11.0]);
        assert_eq!(obs.log_density(), array![-2.0, -3.0, -5.0, -7.0]);
        assert_eq!(obs.lower_uncertainty()[0], 0.1);
        assert!(obs.upper_uncertainty()[1].is_nan());
        assert_eq!(obs.quantity_range(), (8.0, 11.0));
    }

    #[test]
    fn validation() {
        assert_eq!(NdfObservation::from_rows(&[]), Err(ObservationError::Empty));
        assert_eq!(
            NdfObservation::from_rows(&[[1.0, -1.0, 0.1, 0.1], [1.0, -2.0, 0.1, 0.1]]),
            Err(ObservationError::Unsorted { index: 1 })
        );
        assert_eq!(
            NdfObservation::from_rows(&[[1.0, -1.0, -0.1, 0.1]]),
            Err(ObservationError::NegativeUncertainty { index: 0 })
        );
        assert_eq!(
            NdfObservation::from_rows(&[[1.0, f64::NEG_INFINITY, 0.1, 0.1]]),
            Err(ObservationError::NonFinite { index: 0 })
        );
        assert_eq!(
            NdfObservation::new(
                array![1.0, 2.0],
                array![-1.0],
                array![0.1, 0.1],
                array![0.1, 0.1]
            ),
            Err(ObservationError::LengthMismatch {
                quantity: 2,
                log_density: 1,
                lower_uncertainty: 2,
                upper_uncertainty: 2,
            })
        );
    }

    #[test]
    fn deserialization_is_validated() {
        let column = |data: &[f64]| serde_json::json!({"v": 1, "dim": [data.len()], "data": data});
        let parse = |quantity: &[f64], log_density: &[f64]| {
            let uncertainty = vec![0.1; quantity.len()];
            serde_json::from_value::<NdfObservation>(serde_json::json!({
                "quantity": column(quantity),
                "log_density": column(log_density),
                "lower_uncertainty": column(&uncertainty),
                "upper_uncertainty": column(&uncertainty),
            }))
        };
        let obs = parse(&[8.0, 9.0], &[-2.0, -3.0]).unwrap();
        assert_eq!(obs.quantity_range(), (8.0, 9.0));
        assert!(parse(&[], &[]).is_err());
        assert!(parse(&[9.0, 8.0], &[-2.0, -3.0]).is_err());
        assert!(parse(&[8.0, 9.0], &[-2.0]).is_err());
    }

    #[test]
    fn cuts() {
        let obs = observation();
        let cuts = ObservationCuts {
            min_log_density: Some(-6.0),
            max_quantity: Some(9.5),
        };
        let selected = obs.select(&cuts).unwrap();
        assert_eq!(selected.quantity(), array![8.0, 9.0]);
        assert!(selected.upper_uncertainty()[1].is_nan());

        let all = obs.select(&ObservationCuts::none()).unwrap();
        assert_eq!(all.quantity(), obs.quantity());
        assert_eq!(all.log_density(), obs.log_density());

        let everything = ObservationCuts {
            min_log_density: Some(0.0),
            max_quantity: None,
        };
        assert!(obs.select(&everything).is_none());
    }
}
