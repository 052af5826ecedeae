use crate::error::ConfigurationError;

/// Relative distance from a bound used to push points into the open box
const INTERIOR_STEP: f64 = 1e-10;

/// Width given to an unbounded side of the box when a finite search region is required
pub const UNBOUNDED_SEARCH_SPAN: f64 = 5.0;

/// Open box `lower < x < upper`, sides may be infinite
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert_eq!(lower.len(), upper.len());
        assert!(
            lower.iter().zip(upper.iter()).all(|(lo, up)| lo < up),
            "lower bounds must be smaller than upper bounds"
        );
        Self { lower, upper }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Is `x` strictly inside of the box?
    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.len() && within_bounds(x, &self.lower, &self.upper)
    }

    /// Replace the bounds of parameter `index`
    ///
    /// New bounds must be inside of the current ones.
    pub fn with_override(
        mut self,
        index: usize,
        lower: f64,
        upper: f64,
    ) -> Result<Self, ConfigurationError> {
        let invalid = ConfigurationError::InvalidBound {
            index,
            lower,
            upper,
        };
        if index >= self.len()
            || lower.is_nan()
            || upper.is_nan()
            || lower >= upper
            || lower < self.lower[index]
            || upper > self.upper[index]
        {
            return Err(invalid);
        }
        self.lower[index] = lower;
        self.upper[index] = upper;
        Ok(self)
    }

    /// Copy of `x` moved strictly inside of the box
    pub fn clip_to_interior(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(self.interior_limits())
            .map(|(&x, (lo, up))| {
                if x.is_nan() {
                    0.5 * (lo + up)
                } else {
                    x.clamp(lo, up)
                }
            })
            .collect()
    }

    /// Closed limits that are inside of the open box, infinite sides stay infinite
    pub fn interior_limits(&self) -> Vec<(f64, f64)> {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(&lo, &up)| {
                let lo_in = if lo.is_finite() {
                    lo + INTERIOR_STEP * f64::max(1.0, lo.abs())
                } else {
                    lo
                };
                let up_in = if up.is_finite() {
                    up - INTERIOR_STEP * f64::max(1.0, up.abs())
                } else {
                    up
                };
                if lo_in < up_in {
                    (lo_in, up_in)
                } else {
                    let mid = 0.5 * (lo + up);
                    (mid, mid)
                }
            })
            .collect()
    }

    /// Finite box used by exhaustive and stochastic searches
    ///
    /// An infinite side is put [UNBOUNDED_SEARCH_SPAN] away from the finite one, a fully unbounded
    /// parameter is searched within `±UNBOUNDED_SEARCH_SPAN`.
    pub fn search_box(&self) -> Self {
        let (lower, upper) = self
            .lower
            .iter()
            .zip(self.upper.iter())
            .map(
                |(&lo, &up)| match (lo.is_finite(), up.is_finite()) {
                    (true, true) => (lo, up),
                    (true, false) => (lo, lo + UNBOUNDED_SEARCH_SPAN),
                    (false, true) => (up - UNBOUNDED_SEARCH_SPAN, up),
                    (false, false) => (-UNBOUNDED_SEARCH_SPAN, UNBOUNDED_SEARCH_SPAN),
                },
            )
            .unzip();
        Self { lower, upper }
    }

    /// Move from `x` by `step`, stopping half-way to a bound if the step would cross it
    pub fn project_step(&self, x: &[f64], step: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(step.iter())
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|((&x, &dx), (&lo, &up))| {
                let candidate = x + dx;
                if candidate <= lo {
                    lo + 0.5 * (x - lo)
                } else if candidate >= up {
                    x + 0.5 * (up - x)
                } else {
                    candidate
                }
            })
            .collect()
    }
}

pub(super) fn within_bounds(x: &[f64], lower: &[f64], upper: &[f64]) -> bool {
    // negated comparisons reject NaN
    x.iter()
        .zip(lower.iter().zip(upper.iter()))
        .all(|(x, (lo, up))| x > lo && x < up)
}
