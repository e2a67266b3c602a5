//! Dataset representation
//!
//! Features are a dense row-major `f64` matrix. Categorical columns hold
//! category codes (see [`crate::storage::load_dataset_parquet`]) and are
//! flagged in [`DatasetMetadata::categorical`].

pub mod encoding;
pub mod split;

pub use encoding::OneHotEncoder;
pub use split::{train_valid_test_split, Split, SplitConfig, SplitData};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Class label. Numeric targets are stored in their textual form.
pub type Label = String;

/// Dense row-major feature matrix
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Create a matrix from row-major data
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `data.len() != rows * cols`
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                context: "matrix data".to_string(),
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Create a matrix from a list of equally long rows
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the rows are ragged
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(Error::ShapeMismatch {
                    context: "matrix row".to_string(),
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// All-zero matrix
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Number of rows (instances)
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (features)
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Check if the matrix has no rows
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Value at `(row, col)`
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Set the value at `(row, col)`
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// Borrow one row
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Iterate over rows
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    /// Copy one column
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.get(r, col)).collect()
    }

    /// Gather rows by index, in the order given
    #[must_use]
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Keep the first `n` rows
    #[must_use]
    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.rows);
        Self {
            rows: n,
            cols: self.cols,
            data: self.data[..n * self.cols].to_vec(),
        }
    }
}

/// Categorical column description handed to workflows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Mask of categorical columns
    pub columns: Vec<bool>,
    /// Sorted category codes per categorical column, when known categories are exposed
    pub values: Option<Vec<Vec<f64>>>,
}

impl CategoryInfo {
    /// Check if any column is categorical
    #[must_use]
    pub fn any(&self) -> bool {
        self.columns.iter().any(|&c| c)
    }

    /// Indices of the categorical columns
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| c.then_some(i))
            .collect()
    }
}

/// Dataset-level metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Optional dataset name (e.g. file stem)
    pub name: Option<String>,
    /// Feature column names
    pub feature_names: Vec<String>,
    /// Categorical columns and their vocabulary
    pub categories: CategoryInfo,
}

/// Feature matrix, labels and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Matrix,
    y: Vec<Label>,
    metadata: DatasetMetadata,
}

impl Dataset {
    /// Create a dataset with no categorical columns
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `x.rows() != y.len()`
    pub fn new(x: Matrix, y: Vec<Label>) -> Result<Self> {
        let metadata = DatasetMetadata {
            name: None,
            feature_names: (0..x.cols()).map(|i| format!("f{i}")).collect(),
            categories: CategoryInfo {
                columns: vec![false; x.cols()],
                values: None,
            },
        };
        Self::with_metadata(x, y, metadata)
    }

    /// Create a dataset with explicit metadata
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if labels or the categorical mask do not line up with `x`
    pub fn with_metadata(x: Matrix, y: Vec<Label>, metadata: DatasetMetadata) -> Result<Self> {
        if x.rows() != y.len() {
            return Err(Error::ShapeMismatch {
                context: "dataset labels".to_string(),
                expected: x.rows(),
                actual: y.len(),
            });
        }
        if metadata.categories.columns.len() != x.cols() {
            return Err(Error::ShapeMismatch {
                context: "categorical column mask".to_string(),
                expected: x.cols(),
                actual: metadata.categories.columns.len(),
            });
        }
        Ok(Self { x, y, metadata })
    }

    /// Feature matrix
    #[must_use]
    pub const fn x(&self) -> &Matrix {
        &self.x
    }

    /// Labels
    #[must_use]
    pub fn y(&self) -> &[Label] {
        &self.y
    }

    /// Metadata
    #[must_use]
    pub const fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Number of instances
    #[must_use]
    pub const fn num_instances(&self) -> usize {
        self.x.rows()
    }

    /// Sorted distinct labels
    #[must_use]
    pub fn labels(&self) -> Vec<Label> {
        unique_labels(&self.y)
    }
}

/// Sorted distinct labels of a label vector
#[must_use]
pub fn unique_labels(y: &[Label]) -> Vec<Label> {
    let mut labels = y.to_vec();
    labels.sort_unstable();
    labels.dedup();
    labels
}
