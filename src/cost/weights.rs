use crate::data::NdfObservation;

use ndarray::{Array1, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Factor applied to the largest finite uncertainty to get the uncertainty of unconstrained points
pub const UNCONSTRAINED_FACTOR: f64 = 10.0;

/// How residuals are weighted
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Unit weights
    Unweighted,
    /// Inverse linear-space uncertainty
    Absolute,
    /// Inverse linear-space uncertainty relative to the observed density
    Relative,
}

impl Weighting {
    pub fn from_flags(weighted: bool, relative: bool) -> Self {
        match (weighted, relative) {
            (false, _) => Self::Unweighted,
            (true, false) => Self::Absolute,
            (true, true) => Self::Relative,
        }
    }
}

/// Symmetrised linear-space uncertainties of the observed densities
///
/// Error bars are given in dex, so the linear uncertainty is the half-width of
/// `[10^(y - lower), 10^(y + upper)]`. Points with a non-finite or zero uncertainty are
/// unconstrained and get [UNCONSTRAINED_FACTOR] times the largest finite uncertainty, or unity if
/// no point has a finite uncertainty.
///
/// A zero-width error bar is finite, yet its weight is not `1 / 0`: the point is down-weighted as
/// unconstrained instead.
pub fn linear_uncertainties(observation: &NdfObservation) -> Array1<f64> {
    let raw = Zip::from(&observation.log_density())
        .and(&observation.lower_uncertainty())
        .and(&observation.upper_uncertainty())
        .map_collect(|&y, &lower, &upper| {
            0.5 * (10f64.powf(y + upper) - 10f64.powf(y - lower))
        });
    let is_constrained = |u: f64| u.is_finite() && u > 0.0;
    let substitute = raw
        .iter()
        .copied()
        .filter(|&u| is_constrained(u))
        .reduce(f64::max)
        .map_or(1.0, |max| UNCONSTRAINED_FACTOR * max);
    raw.mapv(|u| if is_constrained(u) { u } else { substitute })
}

/// Residual weights for the given weighting scheme
pub fn weights(observation: &NdfObservation, weighting: Weighting) -> Array1<f64> {
    match weighting {
        Weighting::Unweighted => Array1::ones(observation.len()),
        Weighting::Absolute => linear_uncertainties(observation).mapv(f64::recip),
        Weighting::Relative => {
            let mut uncertainty = linear_uncertainties(observation);
            Zip::from(&mut uncertainty)
                .and(&observation.log_density())
                .for_each(|u, &y| *u /= 10f64.powf(y));
            uncertainty.mapv(f64::recip)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn observation() -> NdfObservation {
        NdfObservation::from_rows(&[
            [9.0, -2.0, 0.1, 0.2],
            [10.0, -3.0, 0.3, 0.1],
            [11.0, -4.0, 0.1, f64::NAN],
            [12.0, -5.0, 0.1, f64::INFINITY],
        ])
        .unwrap()
    }

    #[test]
    fn absolute_weights_are_inverse_uncertainties() {
        let obs = NdfObservation::from_rows(&[[9.0, -2.0, 0.1, 0.2], [10.0, -3.0, 0.3, 0.1]])
            .unwrap();
        let unc = linear_uncertainties(&obs);
        assert_relative_eq!(unc[0], 0.5 * (10f64.powf(-1.8) - 10f64.powf(-2.1)));
        assert_relative_eq!(unc[1], 0.5 * (10f64.powf(-2.9) - 10f64.powf(-3.3)));
        let w = weights(&obs, Weighting::Absolute);
        assert_eq!(w, unc.mapv(|u| 1.0 / u));
    }

    #[test]
    fn unconstrained_points_get_ten_times_the_largest() {
        let unc = linear_uncertainties(&observation());
        let largest = f64::max(unc[0], unc[1]);
        assert_eq!(largest, unc[0]);
        assert_eq!(unc[2], 10.0 * largest);
        assert_eq!(unc[3], 10.0 * largest);
    }

    #[test]
    fn zero_width_bar_is_unconstrained() {
        let obs = NdfObservation::from_rows(&[[9.0, -2.0, 0.1, 0.2], [10.0, -3.0, 0.0, 0.0]])
            .unwrap();
        let unc = linear_uncertainties(&obs);
        assert_eq!(unc[1], UNCONSTRAINED_FACTOR * unc[0]);
        let w = weights(&obs, Weighting::Absolute);
        assert!(w.iter().all(|w| w.is_finite()));
        assert_relative_eq!(w[1], 0.1 * w[0]);
    }

    #[test]
    fn nothing_constrained() {
        let obs = NdfObservation::from_rows(&[[9.0, -2.0, f64::NAN, f64::NAN]]).unwrap();
        assert_eq!(linear_uncertainties(&obs)[0], 1.0);
    }

    #[test]
    fn relative_and_unit_weights() {
        let obs = observation();
        let absolute = weights(&obs, Weighting::Absolute);
        let relative = weights(&obs, Weighting::Relative);
        for i in 0..obs.len() {
            assert_relative_eq!(relative[i], absolute[i] * 10f64.powf(obs.log_density()[i]));
        }
        assert!(weights(&obs, Weighting::Unweighted).iter().all(|&w| w == 1.0));
        assert_eq!(Weighting::from_flags(false, true), Weighting::Unweighted);
        assert_eq!(Weighting::from_flags(true, true), Weighting::Relative);
    }
}
