use crate::cost::CostFunction;

use itertools::Itertools;

/// Cell centres `lo + (i + 1/2) (hi - lo) / n` of a regular grid over `[lo, hi]`
pub(super) fn cell_centres(lower: f64, upper: f64, n: usize) -> Vec<f64> {
    let step = (upper - lower) / n as f64;
    (0..n).map(|i| lower + (i as f64 + 0.5) * step).collect()
}

/// Feasible point with the lowest cost over the grid of `n` cell centres per dimension of the
/// search box
pub(super) fn best_grid_point(cost: &CostFunction, n: usize) -> Option<(Vec<f64>, f64)> {
    let search_box = cost.bounds().search_box();
    search_box
        .lower()
        .iter()
        .zip(search_box.upper())
        .map(|(&lo, &up)| cell_centres(lo, up, n))
        .multi_cartesian_product()
        .filter_map(|x| {
            let value = cost.cost(&x).feasible()?;
            Some((x, value))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Feasible starting point close to `x0`
///
/// `x0` is moved strictly inside of the bounds, if the model cannot be evaluated there the best of
/// `grid_size` grid cell centres per dimension is used.
pub(super) fn feasible_seed(
    cost: &CostFunction,
    x0: &[f64],
    grid_size: usize,
) -> Result<(Vec<f64>, f64), Vec<f64>> {
    let clipped = cost.bounds().clip_to_interior(x0);
    if let Some(value) = cost.cost(&clipped).feasible() {
        return Ok((clipped, value));
    }
    match best_grid_point(cost, grid_size) {
        Some((x, value)) => {
            log::warn!(
                "initial guess {x0:?} is infeasible, starting from the best grid point {x:?} instead"
            );
            Ok((x, value))
        }
        None => {
            log::warn!("initial guess {x0:?} is infeasible and no feasible grid point is found");
            Err(clipped)
        }
    }
}
