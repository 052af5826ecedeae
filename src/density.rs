use crate::error::DensityError;
use crate::sorted_array::SortedArray;

use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Relative slack at the table edges, absorbs round-off of `log10(10^x)`-like computations
const EDGE_TOLERANCE: f64 = 1e-12;

/// Tabulated density `y(x)`, `x` is strictly increasing
///
/// `x` is usually the decimal logarithm of a mass or a luminosity, and `y` is a number density per
/// unit of `x`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(into = "DensityTableColumns", try_from = "DensityTableColumns")]
pub struct DensityTable {
    x: SortedArray,
    y: Array1<f64>,
}

impl DensityTable {
    pub const MIN_LENGTH: usize = 2;

    pub fn new(
        x: impl Into<Array1<f64>>,
        y: impl Into<Array1<f64>>,
    ) -> Result<Self, DensityError> {
        let x = x.into();
        let y = y.into();
        if x.len() != y.len() {
            return Err(DensityError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if x.len() < Self::MIN_LENGTH {
            return Err(DensityError::TooShort {
                actual: x.len(),
                minimum: Self::MIN_LENGTH,
            });
        }
        Ok(Self {
            x: SortedArray::from_sorted(x)?,
            y,
        })
    }

    /// Table from `(x, y)` rows given in any order, e.g. magnitudes tabulated from bright to faint
    pub fn from_unordered_rows(rows: &[(f64, f64)]) -> Result<Self, DensityError> {
        let (x, y): (Vec<_>, Vec<_>) = rows
            .iter()
            .copied()
            .sorted_by(|a, b| a.0.total_cmp(&b.0))
            .unzip();
        Self::new(x, y)
    }

    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.as_array().view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x.minimum(), self.x.maximum())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "DensityTable")]
struct DensityTableColumns {
    x: Array1<f64>,
    y: Array1<f64>,
}

impl From<DensityTable> for DensityTableColumns {
    fn from(table: DensityTable) -> Self {
        Self {
            x: table.x.as_array().clone(),
            y: table.y,
        }
    }
}

impl TryFrom<DensityTableColumns> for DensityTable {
    type Error = DensityError;

    fn try_from(columns: DensityTableColumns) -> Result<Self, Self::Error> {
        Self::new(columns.x, columns.y)
    }
}

/// Continuous piecewise-linear density built from a [DensityTable]
///
/// No extrapolation is done, evaluation outside of the tabulated domain is an error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InterpolatedDensity {
    table: DensityTable,
}

impl InterpolatedDensity {
    pub fn new(table: DensityTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &DensityTable {
        &self.table
    }

    pub fn domain(&self) -> (f64, f64) {
        self.table.domain()
    }

    pub fn evaluate(&self, x: f64) -> Result<f64, DensityError> {
        let (min, max) = self.domain();
        let slack = EDGE_TOLERANCE * (max - min);
        let x_in = if x < min && x >= min - slack {
            min
        } else if x > max && x <= max + slack {
            max
        } else {
            x
        };
        let i = self
            .table
            .x
            .bracket(x_in)
            .ok_or(DensityError::OutOfDomain { x, min, max })?;
        let (x0, x1) = (self.table.x[i], self.table.x[i + 1]);
        let (y0, y1) = (self.table.y[i], self.table.y[i + 1]);
        Ok(y0 + (y1 - y0) * (x_in - x0) / (x1 - x0))
    }

    /// Evaluate on every element of `x`, output order follows the input order
    pub fn evaluate_many(&self, x: ArrayView1<'_, f64>) -> Result<Array1<f64>, DensityError> {
        x.iter().map(|&x| self.evaluate(x)).collect()
    }
}

impl From<DensityTable> for InterpolatedDensity {
    fn from(table: DensityTable) -> Self {
        Self::new(table)
    }
}
