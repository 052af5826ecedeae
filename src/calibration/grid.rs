use super::seed::best_grid_point;
use super::{CalibrationAlgorithm, CalibrationResult, CalibrationTrait, fine_tune};
use crate::cost::CostFunction;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exhaustive search over a regular grid
///
/// The search box is split into `resolution` cells per parameter and the cost is evaluated in the
/// cell centres, so bounds themselves are never evaluated. The number of evaluations is
/// `resolution^nparams`. Infinite bounds are replaced by the finite search box, see
/// [Bounds::search_box](super::Bounds::search_box). The initial guess is not used.
///
/// If `fine_tuning_algorithm` is `Some`, the best grid point is passed to it as an initial guess
/// and its result is returned.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Grid")]
pub struct GridFit {
    pub resolution: u32,
    pub fine_tuning_algorithm: Option<Box<CalibrationAlgorithm>>,
}

impl GridFit {
    pub fn new(resolution: u32, fine_tuning_algorithm: Option<CalibrationAlgorithm>) -> Self {
        assert!(resolution > 0, "resolution must be positive");
        Self {
            resolution,
            fine_tuning_algorithm: fine_tuning_algorithm.map(|x| x.into()),
        }
    }

    #[inline]
    pub fn default_resolution() -> u32 {
        100
    }

    /// Local polishing of the best grid point with [LeastSquaresFit](super::LeastSquaresFit)
    #[inline]
    pub fn default_fine_tuning_algorithm() -> Option<CalibrationAlgorithm> {
        Some(super::LeastSquaresFit::default().into())
    }
}

impl Default for GridFit {
    fn default() -> Self {
        Self::new(
            Self::default_resolution(),
            Self::default_fine_tuning_algorithm(),
        )
    }
}

impl CalibrationTrait for GridFit {
    fn calibrate(&self, cost: &CostFunction, x0: &[f64]) -> CalibrationResult {
        let grid_result = match best_grid_point(cost, self.resolution as usize) {
            Some((x, value)) => CalibrationResult {
                x,
                cost: Some(value),
                success: true,
                distribution: None,
            },
            None => {
                log::warn!("no grid point is feasible");
                CalibrationResult::failure(cost.bounds().clip_to_interior(x0))
            }
        };
        fine_tune(self.fine_tuning_algorithm.as_deref(), cost, grid_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::LeastSquaresFit;
    use crate::tests::*;

    #[test]
    fn agrees_with_least_squares() {
        let fixture = no_feedback_fixture();
        let cost = fixture.default_cost_function();
        let grid = GridFit::new(100, None).calibrate(&cost, &[0.01]);
        let lsq = LeastSquaresFit::default().calibrate(&cost, &[0.01]);
        assert!(grid.success);
        assert_params_close(&grid.x, &lsq.x, 0.1);
        assert_params_close(&grid.x, &fixture.truth, 0.02);
    }

    #[test]
    fn supernova_with_overridden_bounds() {
        let fixture = supernova_fixture();
        let descriptor = fixture
            .descriptor
            .clone()
            .with_bound_overrides(&[Some((0.0, 0.1)), Some((0.0, 2.0))])
            .unwrap();
        let cost = CostFunction::new(
            fixture.model(),
            &fixture.observation,
            descriptor.bounds().clone(),
            FittingSpace::Log,
            Weighting::Relative,
        );
        let grid = GridFit::new(100, None).calibrate(&cost, descriptor.initial_guess());
        let lsq = LeastSquaresFit::default().calibrate(&cost, descriptor.initial_guess());
        assert_params_close(&grid.x, &lsq.x, 0.1);
    }

    #[test]
    fn fine_tuned_grid() {
        let fixture = supernova_fixture();
        let cost = fixture.default_cost_function();
        let result = GridFit::new(10, Some(LeastSquaresFit::default().into()))
            .calibrate(&cost, fixture.descriptor.initial_guess());
        assert_params_close(&result.x, &fixture.truth, 0.05);
    }
}
