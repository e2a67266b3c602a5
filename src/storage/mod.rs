//! Storage backend (Arrow/Parquet)
//!
//! Two tables live in Parquet files:
//! - Datasets: one column per feature plus a target column, read once per run
//! - Curves: flat [`CurvePoint`] rows (`run_id`, `split`, `anchor`, `metric`, `value`)
//!
//! **Append-Only Write Pattern**: curve tables only grow by whole record
//! batches; a finished run appends all of its points at once.
//!
//! Toyota Way Principles:
//! - Poka-Yoke: every appended batch is checked against the curve schema
//! - Muda elimination: datasets are decoded column by column straight into `f64`

use crate::curvedb::SplitName;
use crate::data::{CategoryInfo, Dataset, DatasetMetadata, Label, Matrix};
use crate::experiment::CurvePoint;
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Float64Type, Schema, SchemaRef, UInt64Type};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read every record batch of a Parquet file
fn read_parquet_batches(path: &Path) -> Result<(SchemaRef, Vec<RecordBatch>)> {
    let file = File::open(path).map_err(|e| {
        Error::StorageError(format!("Failed to open Parquet file {}: {e}", path.display()))
    })?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
    let schema = builder.schema().clone();

    let reader = builder
        .build()
        .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch
            .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
        batches.push(batch);
    }

    Ok((schema, batches))
}

/// Load a classification dataset from a Parquet file
///
/// - String and dictionary columns become categorical: values are coded by
///   their rank in the sorted vocabulary and flagged in the categorical mask
/// - Every other column is cast to `f64`; nulls become `NaN`
/// - The target column is cast to text labels
///
/// The dataset name is the file stem.
///
/// # Errors
/// - `StorageError` if the file cannot be read, the target column is
///   missing or has nulls, or a feature column cannot be cast to `f64`
pub fn load_dataset_parquet<P: AsRef<Path>>(path: P, target: &str) -> Result<Dataset> {
    let path = path.as_ref();
    let (schema, batches) = read_parquet_batches(path)?;
    let table = concat_batches(&schema, &batches)?;

    let target_index = schema.index_of(target).map_err(|_| {
        Error::StorageError(format!(
            "target column '{target}' not found in {}",
            path.display()
        ))
    })?;
    let labels = decode_labels(table.column(target_index))?;

    let mut columns = Vec::with_capacity(schema.fields().len().saturating_sub(1));
    let mut feature_names = Vec::with_capacity(columns.capacity());
    let mut categorical = Vec::with_capacity(columns.capacity());
    for (index, field) in schema.fields().iter().enumerate() {
        if index == target_index {
            continue;
        }
        let column = table.column(index);
        let is_categorical = matches!(
            field.data_type(),
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _)
        );
        let values = if is_categorical {
            decode_categorical(column, field.name())?
        } else {
            decode_numeric(column, field.name())?
        };
        columns.push(values);
        feature_names.push(field.name().clone());
        categorical.push(is_categorical);
    }

    let rows = table.num_rows();
    let mut data = Vec::with_capacity(rows * columns.len());
    for row in 0..rows {
        data.extend(columns.iter().map(|column| column[row]));
    }
    let x = Matrix::new(rows, columns.len(), data)?;

    debug!(
        path = %path.display(),
        rows,
        features = feature_names.len(),
        categorical = categorical.iter().filter(|&&c| c).count(),
        "loaded dataset"
    );

    let metadata = DatasetMetadata {
        name: path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned()),
        feature_names,
        categories: CategoryInfo {
            columns: categorical,
            values: None,
        },
    };
    Dataset::with_metadata(x, labels, metadata)
}

fn decode_labels(column: &ArrayRef) -> Result<Vec<Label>> {
    let text = cast(column, &DataType::Utf8)
        .map_err(|e| Error::StorageError(format!("target column cannot be read as labels: {e}")))?;
    text.as_string::<i32>()
        .iter()
        .enumerate()
        .map(|(row, label)| {
            label
                .map(str::to_string)
                .ok_or_else(|| Error::StorageError(format!("missing target value at row {row}")))
        })
        .collect()
}

fn decode_categorical(column: &ArrayRef, name: &str) -> Result<Vec<f64>> {
    let text = cast(column, &DataType::Utf8)
        .map_err(|e| Error::StorageError(format!("column '{name}' is not categorical: {e}")))?;
    let text = text.as_string::<i32>();
    let vocabulary: Vec<&str> = text
        .iter()
        .flatten()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let codes = text
        .iter()
        .map(|value| {
            value
                .and_then(|v| vocabulary.binary_search(&v).ok())
                .map_or(f64::NAN, |code| code as f64)
        })
        .collect();
    Ok(codes)
}

fn decode_numeric(column: &ArrayRef, name: &str) -> Result<Vec<f64>> {
    let numbers = cast(column, &DataType::Float64)
        .map_err(|e| Error::StorageError(format!("column '{name}' is not numeric: {e}")))?;
    Ok(numbers
        .as_primitive::<Float64Type>()
        .iter()
        .map(|value| value.unwrap_or(f64::NAN))
        .collect())
}

/// Columnar store of learning-curve points
///
/// ## Schema
///
/// | column | type |
/// |---|---|
/// | `run_id` | Utf8 |
/// | `split` | Utf8 (`train`, `val`, `test`) |
/// | `anchor` | UInt64 |
/// | `metric` | Utf8 |
/// | `value` | Float64 |
#[derive(Debug, Default)]
pub struct CurveStore {
    batches: Vec<RecordBatch>,
}

impl CurveStore {
    /// Create an empty curve store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrow schema of curve batches
    #[must_use]
    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("run_id", DataType::Utf8, false),
            Field::new("split", DataType::Utf8, false),
            Field::new("anchor", DataType::UInt64, false),
            Field::new("metric", DataType::Utf8, false),
            Field::new("value", DataType::Float64, false),
        ]))
    }

    /// Build a store holding one batch of points
    ///
    /// # Errors
    /// Returns error if the batch cannot be assembled
    pub fn from_points(points: &[CurvePoint]) -> Result<Self> {
        let mut store = Self::new();
        store.append_points(points)?;
        Ok(store)
    }

    /// Convert points into a record batch with the curve schema
    ///
    /// # Errors
    /// Returns error if the batch cannot be assembled
    pub fn points_to_batch(points: &[CurvePoint]) -> Result<RecordBatch> {
        let run_ids = StringArray::from_iter_values(points.iter().map(CurvePoint::run_id));
        let splits = StringArray::from_iter_values(points.iter().map(|p| p.split().as_str()));
        let anchors = UInt64Array::from_iter_values(points.iter().map(CurvePoint::anchor));
        let metrics = StringArray::from_iter_values(points.iter().map(CurvePoint::metric));
        let values = Float64Array::from_iter_values(points.iter().map(CurvePoint::value));

        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(run_ids),
                Arc::new(splits),
                Arc::new(anchors),
                Arc::new(metrics),
                Arc::new(values),
            ],
        )?)
    }

    /// Append the points of one run as a single batch
    ///
    /// # Errors
    /// Returns error if the batch cannot be assembled
    pub fn append_points(&mut self, points: &[CurvePoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        self.append_batch(Self::points_to_batch(points)?)
    }

    /// Append a record batch (the only supported write operation)
    ///
    /// # Example
    ///
    /// ```rust
    /// # use lcdb::curvedb::SplitName;
    /// # use lcdb::experiment::CurvePoint;
    /// # use lcdb::storage::CurveStore;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let points = vec![CurvePoint::new("run-1", SplitName::Val, 16, "accuracy", 0.75)];
    /// let batch = CurveStore::points_to_batch(&points)?;
    ///
    /// let mut store = CurveStore::new();
    /// store.append_batch(batch)?;
    /// assert_eq!(store.num_rows(), 1);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns error if the batch columns do not match the curve schema
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        let expected = Self::schema();
        let actual = batch.schema();
        let compatible = expected.fields().len() == actual.fields().len()
            && expected
                .fields()
                .iter()
                .zip(actual.fields().iter())
                .all(|(e, a)| e.name() == a.name() && e.data_type() == a.data_type());
        if !compatible {
            return Err(Error::StorageError(format!(
                "Schema mismatch: expected {expected:?}, got {actual:?}"
            )));
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total number of stored points
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Write all batches to one Parquet file
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, Self::schema(), None)?;
        for batch in &self.batches {
            writer.write(batch)?;
        }
        writer.close()?;
        Ok(())
    }

    /// Load a curve table written by [`CurveStore::write_parquet`]
    ///
    /// # Errors
    /// Returns error if the file cannot be read or has another schema
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (_, batches) = read_parquet_batches(path.as_ref())?;
        let mut store = Self::new();
        for batch in batches {
            store.append_batch(batch)?;
        }
        Ok(store)
    }

    /// Decode every stored row back into points
    ///
    /// # Errors
    /// Returns `StorageError` on null cells or unknown split names
    pub fn to_points(&self) -> Result<Vec<CurvePoint>> {
        let mut points = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let run_ids = batch.column(0).as_string::<i32>();
            let splits = batch.column(1).as_string::<i32>();
            let anchors = batch.column(2).as_primitive::<UInt64Type>();
            let metrics = batch.column(3).as_string::<i32>();
            let values = batch.column(4).as_primitive::<Float64Type>();

            for row in 0..batch.num_rows() {
                let columns: [&dyn Array; 5] = [run_ids, splits, anchors, metrics, values];
                if columns.iter().any(|column| column.is_null(row)) {
                    return Err(Error::StorageError(format!("null cell in curve row {row}")));
                }
                let split: SplitName = splits.value(row).parse().map_err(|e: Error| {
                    Error::StorageError(format!("curve row {row}: {e}"))
                })?;
                points.push(CurvePoint::new(
                    run_ids.value(row),
                    split,
                    anchors.value(row),
                    metrics.value(row),
                    values.value(row),
                ));
            }
        }
        Ok(points)
    }
}
