use crate::calibration::Bounds;
use crate::error::InversionError;

const MAX_ITERATIONS: usize = 200;
/// Largest |ln m| explored, `e^700` is close to the largest finite double
const LN_MASS_LIMIT: f64 = 700.0;
const TOLERANCE: f64 = 1e-13;

/// Common preconditions of every feedback inversion
pub(super) fn check_invertible(
    bounds: &Bounds,
    observable: f64,
    params: &[f64],
) -> Result<(), InversionError> {
    if !bounds.contains(params) {
        return Err(InversionError::InfeasibleParameters(params.to_vec()));
    }
    if !(observable > 0.0) {
        return Err(InversionError::NonPositiveTarget(observable));
    }
    Ok(())
}

/// Solve `forward(m) = target` for a positive, strictly increasing `forward`
///
/// Newton-Raphson steps are made in `s = ln m` on `g(s) = ln forward(e^s) - ln target`, and a
/// bisection step replaces any Newton step leaving the current bracket. The bracket is found by
/// doubling steps from `s = ln target`.
pub(super) fn invert_increasing<F, D>(
    forward: F,
    derivative: D,
    target: f64,
) -> Result<f64, InversionError>
where
    F: Fn(f64) -> f64,
    D: Fn(f64) -> f64,
{
    let ln_target = target.ln();
    let g = |s: f64| forward(s.exp()).ln() - ln_target;
    let out_of_range = InversionError::OutOfRange { target };

    let s0 = ln_target.clamp(-LN_MASS_LIMIT, LN_MASS_LIMIT);
    let g0 = g(s0);
    if g0 == 0.0 {
        return Ok(s0.exp());
    }
    if g0.is_nan() {
        return Err(out_of_range);
    }

    let (mut lo, mut hi) = (s0, s0);
    let mut step = 1.0;
    if g0 > 0.0 {
        loop {
            hi = lo;
            lo = hi - step;
            step *= 2.0;
            if lo < -LN_MASS_LIMIT {
                return Err(out_of_range);
            }
            let value = g(lo);
            if value.is_nan() {
                return Err(out_of_range);
            }
            if value <= 0.0 {
                break;
            }
        }
    } else {
        loop {
            lo = hi;
            hi = lo + step;
            step *= 2.0;
            if hi > LN_MASS_LIMIT {
                return Err(out_of_range);
            }
            let value = g(hi);
            if value.is_nan() {
                return Err(out_of_range);
            }
            if value >= 0.0 {
                break;
            }
        }
    }

    let mut s = 0.5 * (lo + hi);
    for _ in 0..MAX_ITERATIONS {
        let m = s.exp();
        let f = forward(m);
        let value = f.ln() - ln_target;
        if value == 0.0 {
            return Ok(m);
        }
        if value < 0.0 {
            lo = s;
        } else {
            hi = s;
        }
        // d ln f / d ln m
        let slope = m * derivative(m) / f;
        let newton = s - value / slope;
        let next = if newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
        if (next - s).abs() <= TOLERANCE * f64::max(1.0, s.abs()) || hi - lo <= f64::EPSILON {
            return Ok(next.exp());
        }
        s = next;
    }
    Err(InversionError::NoConvergence {
        target,
        iterations: MAX_ITERATIONS,
    })
}
