//! Feature preprocessing shared by the built-in workflows
//!
//! Categorical columns are one-hot encoded (with the dataset-level
//! vocabulary when the controller exposes it), missing values are imputed
//! with the training mean, then an optional scaler is applied.

use crate::data::{DatasetMetadata, Matrix, OneHotEncoder};
use crate::error::WorkflowError;
use serde::{Deserialize, Serialize};

/// Feature scaling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaler {
    /// Leave features as they are
    #[default]
    None,
    /// Zero mean, unit variance
    Standardize,
    /// Rescale to `[0, 1]`
    MinMax,
}

/// Fitted preprocessing pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    encoder: Option<OneHotEncoder>,
    fill: Vec<f64>,
    offset: Vec<f64>,
    scale: Vec<f64>,
}

impl Preprocessor {
    /// Fit on the anchor training features
    ///
    /// # Errors
    /// Returns `Failed` if the categorical mask does not match the features
    pub fn fit(x: &Matrix, metadata: &DatasetMetadata, scaler: Scaler) -> Result<Self, WorkflowError> {
        let categories = &metadata.categories;
        let encoder = if categories.any() {
            let encoder = if categories.values.is_some() {
                OneHotEncoder::from_categories(categories)
            } else {
                OneHotEncoder::fit(x, &categories.columns)
            };
            Some(encoder.map_err(|e| WorkflowError::Failed(e.into()))?)
        } else {
            None
        };
        let encoded = match &encoder {
            Some(enc) => enc.transform(x).map_err(|e| WorkflowError::Failed(e.into()))?,
            None => x.clone(),
        };

        let cols = encoded.cols();
        let mut fill = vec![0.0; cols];
        let mut offset = vec![0.0; cols];
        let mut scale = vec![1.0; cols];
        for j in 0..cols {
            let column: Vec<f64> = encoded.column(j).into_iter().filter(|v| v.is_finite()).collect();
            if column.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let n = column.len() as f64;
            let mean = column.iter().sum::<f64>() / n;
            fill[j] = mean;
            match scaler {
                Scaler::None => {}
                Scaler::Standardize => {
                    let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                    offset[j] = mean;
                    scale[j] = if var > 0.0 { var.sqrt() } else { 1.0 };
                }
                Scaler::MinMax => {
                    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    offset[j] = min;
                    scale[j] = if max > min { max - min } else { 1.0 };
                }
            }
        }
        Ok(Self {
            encoder,
            fill,
            offset,
            scale,
        })
    }

    /// Number of output columns
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.fill.len()
    }

    /// Apply the fitted pipeline
    ///
    /// # Errors
    /// Returns `Failed` if `x` has a different width than the fitted features
    pub fn transform(&self, x: &Matrix) -> Result<Matrix, WorkflowError> {
        let mut out = match &self.encoder {
            Some(enc) => enc.transform(x).map_err(|e| WorkflowError::Failed(e.into()))?,
            None => x.clone(),
        };
        if out.cols() != self.fill.len() {
            return Err(WorkflowError::Failed(anyhow::anyhow!(
                "expected {} features after encoding, got {}",
                self.fill.len(),
                out.cols()
            )));
        }
        for i in 0..out.rows() {
            for j in 0..out.cols() {
                let mut v = out.get(i, j);
                if !v.is_finite() {
                    v = self.fill[j];
                }
                out.set(i, j, (v - self.offset[j]) / self.scale[j]);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CategoryInfo;

    #[test]
    fn test_standardize_centers_columns() {
        let x = Matrix::from_rows(&[vec![1.0], vec![3.0]]).unwrap();
        let pre = Preprocessor::fit(&x, &DatasetMetadata::default(), Scaler::Standardize).unwrap();
        let out = pre.transform(&x).unwrap();
        assert!((out.get(0, 0) + 1.0).abs() < 1e-12);
        assert!((out.get(1, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_values_imputed_with_mean() {
        let x = Matrix::from_rows(&[vec![2.0], vec![4.0], vec![f64::NAN]]).unwrap();
        let pre = Preprocessor::fit(&x, &DatasetMetadata::default(), Scaler::None).unwrap();
        let out = pre.transform(&x).unwrap();
        assert!((out.get(2, 0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_columns_expanded() {
        let x = Matrix::from_rows(&[vec![0.5, 0.0], vec![1.5, 1.0], vec![2.5, 2.0]]).unwrap();
        let metadata = DatasetMetadata {
            categories: CategoryInfo {
                columns: vec![false, true],
                values: None,
            },
            ..DatasetMetadata::default()
        };
        let pre = Preprocessor::fit(&x, &metadata, Scaler::MinMax).unwrap();
        assert_eq!(pre.output_width(), 3);
        let out = pre.transform(&x).unwrap();
        assert!((out.get(2, 0) - 1.0).abs() < 1e-12);
    }
}
