//! One-hot encoding of categorical columns
//!
//! The encoder is fitted once on the full dataset so every anchor sees the
//! same vocabulary, even when an anchor's subsample misses a category.

use super::{CategoryInfo, Matrix};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One-hot encoder with drop-first semantics.
///
/// Non-categorical columns pass through unchanged and come first in the
/// output; each categorical column with `k` categories expands to `k - 1`
/// indicator columns (the first, smallest category is dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<bool>,
    categories: Vec<Vec<f64>>,
}

impl OneHotEncoder {
    /// Learn the sorted category codes of every categorical column
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the mask does not match `x.cols()`
    pub fn fit(x: &Matrix, columns: &[bool]) -> Result<Self> {
        if columns.len() != x.cols() {
            return Err(Error::ShapeMismatch {
                context: "one-hot column mask".to_string(),
                expected: x.cols(),
                actual: columns.len(),
            });
        }
        let categories = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(j, _)| {
                let mut values: Vec<f64> = x.column(j).into_iter().filter(|v| !v.is_nan()).collect();
                values.sort_by(f64::total_cmp);
                values.dedup();
                values
            })
            .collect();
        Ok(Self {
            columns: columns.to_vec(),
            categories,
        })
    }

    /// Rebuild an encoder from a previously exposed vocabulary
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the vocabulary is missing or does not match the mask
    pub fn from_categories(info: &CategoryInfo) -> Result<Self> {
        let values = info.values.clone().ok_or_else(|| {
            Error::InvalidConfig("category values are not known for this dataset".to_string())
        })?;
        let expected = info.columns.iter().filter(|&&c| c).count();
        if values.len() != expected {
            return Err(Error::ShapeMismatch {
                context: "category vocabulary".to_string(),
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            columns: info.columns.clone(),
            categories: values,
        })
    }

    /// Learned vocabulary, one sorted list per categorical column
    #[must_use]
    pub fn categories(&self) -> &[Vec<f64>] {
        &self.categories
    }

    /// Width of the encoded matrix
    #[must_use]
    pub fn output_width(&self) -> usize {
        let passthrough = self.columns.iter().filter(|&&c| !c).count();
        passthrough
            + self
                .categories
                .iter()
                .map(|c| c.len().saturating_sub(1))
                .sum::<usize>()
    }

    /// Encode a matrix
    ///
    /// Unknown categories (and NaN) encode as all zeros, like the dropped category.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `x` has a different number of columns than the fit data
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        if x.cols() != self.columns.len() {
            return Err(Error::ShapeMismatch {
                context: "one-hot input columns".to_string(),
                expected: self.columns.len(),
                actual: x.cols(),
            });
        }
        let width = self.output_width();
        let mut data = Vec::with_capacity(x.rows() * width);
        for row in x.iter_rows() {
            let mut categorical = self.categories.iter();
            let mut indicators = Vec::new();
            for (j, &is_cat) in self.columns.iter().enumerate() {
                if !is_cat {
                    data.push(row[j]);
                    continue;
                }
                let Some(values) = categorical.next() else {
                    continue;
                };
                let mut onehot = vec![0.0; values.len().saturating_sub(1)];
                if let Ok(pos) = values.binary_search_by(|v| v.total_cmp(&row[j])) {
                    if pos > 0 {
                        onehot[pos - 1] = 1.0;
                    }
                }
                indicators.extend(onehot);
            }
            data.extend(indicators);
        }
        Matrix::new(x.rows(), width, data)
    }
}
