use crate::error::DensityError;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

// Underlying array is guaranteed to be finite, strictly increasing and contiguous
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "Array1<f64>")]
pub struct SortedArray(Array1<f64>);

impl SortedArray {
    pub fn from_sorted(sorted_array: impl Into<Array1<f64>>) -> Result<Self, DensityError> {
        let sorted_array = sorted_array.into().as_standard_layout().into_owned();
        if sorted_array.iter().any(|x| !x.is_finite()) {
            return Err(DensityError::NonFinite);
        }
        if sorted_array
            .iter()
            .zip(sorted_array.iter().skip(1))
            .all(|(a, b)| a < b)
        {
            Ok(Self(sorted_array))
        } else {
            Err(DensityError::NotIncreasing)
        }
    }

    pub fn minimum(&self) -> f64 {
        self[0]
    }

    pub fn maximum(&self) -> f64 {
        self[self.len() - 1]
    }

    /// Index `i` of the segment `[self[i], self[i + 1]]` containing `x`
    ///
    /// Returns `None` if `x` is outside of `[minimum, maximum]` or if the array has less than two
    /// points.
    pub fn bracket(&self, x: f64) -> Option<usize> {
        if self.len() < 2 || !(self.minimum()..=self.maximum()).contains(&x) {
            return None;
        }
        let i = self.partition_point(|&a| a <= x);
        Some(i.saturating_sub(1).min(self.len() - 2))
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }
}

impl TryFrom<Array1<f64>> for SortedArray {
    type Error = DensityError;

    fn try_from(value: Array1<f64>) -> Result<Self, Self::Error> {
        Self::from_sorted(value)
    }
}

impl Deref for SortedArray {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        // from_sorted keeps standard layout
        self.0.as_slice().unwrap_or_default()
    }
}

impl AsRef<[f64]> for SortedArray {
    fn as_ref(&self) -> &[f64] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_inner_and_edges() {
        let a = SortedArray::from_sorted(vec![0.0, 1.0, 2.0, 4.0]).unwrap();
        assert_eq!(a.bracket(0.0), Some(0));
        assert_eq!(a.bracket(0.5), Some(0));
        assert_eq!(a.bracket(1.0), Some(1));
        assert_eq!(a.bracket(3.9), Some(2));
        assert_eq!(a.bracket(4.0), Some(2));
        assert_eq!(a.bracket(-1e-9), None);
        assert_eq!(a.bracket(4.1), None);
        assert_eq!(a.bracket(f64::NAN), None);
    }

    #[test]
    fn rejects_unsorted_and_repeated() {
        assert_eq!(
            SortedArray::from_sorted(vec![0.0, 2.0, 1.0]),
            Err(DensityError::NotIncreasing)
        );
        assert_eq!(
            SortedArray::from_sorted(vec![0.0, 1.0, 1.0]),
            Err(DensityError::NotIncreasing)
        );
        assert_eq!(
            SortedArray::from_sorted(vec![0.0, f64::NAN]),
            Err(DensityError::NonFinite)
        );
    }

    #[test]
    fn deserialization_is_validated() {
        let a: SortedArray =
            serde_json::from_str(r#"{"v": 1, "dim": [3], "data": [0.0, 1.0, 2.0]}"#).unwrap();
        assert_eq!(&*a, &[0.0, 1.0, 2.0]);
        assert!(
            serde_json::from_str::<SortedArray>(r#"{"v": 1, "dim": [3], "data": [0.0, 2.0, 1.0]}"#)
                .is_err()
        );
    }

    #[test]
    fn minimum_maximum() {
        let a = SortedArray::from_sorted(vec![-3.0, 0.5, 7.0]).unwrap();
        assert_eq!(a.minimum(), -3.0);
        assert_eq!(a.maximum(), 7.0);
        assert_eq!(a.as_array().len(), 3);
    }
}
