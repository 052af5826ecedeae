//! Integral of a double power law
//!
//! The supernova plus black hole feedback grows as `∫₀ᵘ t^α / (1 + t^(α+β)) dt`. The integral is
//! expressed through the Gauss hypergeometric function `₂F₁(1, s; 1 + s; -y)`, which is summed
//! after the Pfaff transformation `₂F₁(1, s; 1 + s; -y) = (1 + y)⁻¹ ₂F₁(1, 1; 1 + s; y / (1 + y))`.
//! The transformed argument is always in `[0, 1)` and the series has positive terms only.

const MAX_TERMS: usize = 100_000;
const SERIES_TOLERANCE: f64 = 1e-16;
const MAX_REDUCTIONS: usize = 10_000;

/// `∫₀ʳ v^(e-1) / (1 + v^q) dv` for `e > 0`, `q > 0` and `0 ≤ r ≤ 1`
fn power_integral(e: f64, q: f64, r: f64) -> f64 {
    if r == 0.0 {
        return 0.0;
    }
    let s = e / q;
    let y = r.powf(q);
    let w = y / (1.0 + y);
    let mut term = 1.0;
    let mut sum = 1.0;
    for n in 0..MAX_TERMS {
        let n = n as f64;
        term *= w * (n + 1.0) / (n + 1.0 + s);
        sum += term;
        if term <= SERIES_TOLERANCE * sum {
            break;
        }
    }
    r.powf(e) / e * sum / (1.0 + y)
}

/// `∫ᵣ¹ v^(e-1) / (1 + v^q) dv` for any real `e`, `q > 0` and `0 < r ≤ 1`
///
/// Non-positive exponents diverge at zero, so `1 / (1 + v^q) = 1 - v^q / (1 + v^q)` is applied
/// until the exponent exceeds `q / 2`. Both series terms are `~1 / e`, a smaller exponent would
/// cancel them out.
fn upper_power_integral(e: f64, q: f64, r: f64) -> f64 {
    let ln_r = r.ln();
    let mut e = e;
    let mut sign = 1.0;
    let mut total = 0.0;
    for _ in 0..MAX_REDUCTIONS {
        if e > 0.5 * q {
            return total + sign * (power_integral(e, q, 1.0) - power_integral(e, q, r));
        }
        // ∫ᵣ¹ v^(e-1) dv
        let plain = if e.abs() < 1e-12 {
            -ln_r
        } else {
            -f64::exp_m1(e * ln_r) / e
        };
        total += sign * plain;
        sign = -sign;
        e += q;
    }
    f64::NAN
}

/// `∫₀ᵘ t^α / (1 + t^(α+β)) dt` for `α > 0`, `β > 0` and `u ≥ 0`
///
/// Large arguments are mapped to `1 / u`, so the series argument never exceeds one half.
pub fn double_power_law_integral(u: f64, alpha: f64, beta: f64) -> f64 {
    if u.is_nan() || u < 0.0 {
        return f64::NAN;
    }
    let q = alpha + beta;
    if u <= 1.0 {
        return power_integral(alpha + 1.0, q, u);
    }
    if u.is_infinite() {
        return if beta > 1.0 {
            power_integral(alpha + 1.0, q, 1.0) + power_integral(beta - 1.0, q, 1.0)
        } else {
            f64::INFINITY
        };
    }
    // t = 1/v turns the tail into ∫ᵣ¹ v^(β-2) / (1 + v^q) dv
    power_integral(alpha + 1.0, q, 1.0) + upper_power_integral(beta - 1.0, q, u.recip())
}
