//! The progressive data store: an append-only row buffer of feature vectors.
//!
//! Grounded in `original_source/prodr/ensemble/components/data.py`
//! (`ProgressiveDataStorage`) and its validators
//! (`validators/dim_check.py`, `validators/dtype_check.py`). Feature count
//! and element type are fixed by the first `append` and enforced on every
//! later one; a failed check leaves the store completely unchanged.

use ndarray::{concatenate, Array2, Axis};

use crate::error::Error;
use crate::number::Number;

/// The element type fixed by the first batch appended to a [`DataStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// Single-precision features.
    F32,
    /// Double-precision features.
    F64,
}

/// A dtype-tagged batch of rows to append to a [`DataStore`].
#[derive(Debug, Clone)]
pub enum Batch {
    /// A batch of `f32` rows.
    F32(Array2<f32>),
    /// A batch of `f64` rows.
    F64(Array2<f64>),
}

impl Batch {
    /// Number of rows in the batch.
    pub fn nrows(&self) -> usize {
        match self {
            Batch::F32(a) => a.nrows(),
            Batch::F64(a) => a.nrows(),
        }
    }

    /// Number of feature columns in the batch.
    pub fn ncols(&self) -> usize {
        match self {
            Batch::F32(a) => a.ncols(),
            Batch::F64(a) => a.ncols(),
        }
    }

    /// The dtype of the batch.
    pub fn dtype(&self) -> Dtype {
        match self {
            Batch::F32(_) => Dtype::F32,
            Batch::F64(_) => Dtype::F64,
        }
    }
}

/// Internal column storage, kept at the dtype it was first appended with.
#[derive(Debug, Clone)]
enum Columns {
    F32(Array2<f32>),
    F64(Array2<f64>),
}

impl Columns {
    fn nrows(&self) -> usize {
        match self {
            Columns::F32(a) => a.nrows(),
            Columns::F64(a) => a.nrows(),
        }
    }

    fn dtype(&self) -> Dtype {
        match self {
            Columns::F32(_) => Dtype::F32,
            Columns::F64(_) => Dtype::F64,
        }
    }

    fn extend(&mut self, batch: &Batch) {
        match (self, batch) {
            (Columns::F32(existing), Batch::F32(new_rows)) => {
                *existing = concatenate(Axis(0), &[existing.view(), new_rows.view()])
                    .expect("row width was validated before appending");
            }
            (Columns::F64(existing), Batch::F64(new_rows)) => {
                *existing = concatenate(Axis(0), &[existing.view(), new_rows.view()])
                    .expect("row width was validated before appending");
            }
            _ => unreachable!("dtype was validated before appending"),
        }
    }

    fn rows_f64(&self, indices: &[usize]) -> Array2<f64> {
        match self {
            Columns::F32(a) => {
                let selected = a.select(Axis(0), indices);
                selected.mapv(|v| v.as_f64())
            }
            Columns::F64(a) => a.select(Axis(0), indices),
        }
    }

    fn range_f64(&self, start: usize, end: usize) -> Array2<f64> {
        match self {
            Columns::F32(a) => a.slice(ndarray::s![start..end, ..]).mapv(|v| v.as_f64()),
            Columns::F64(a) => a.slice(ndarray::s![start..end, ..]).to_owned(),
        }
    }
}

/// Append-only row buffer of feature vectors.
///
/// Random access is `O(1)`; appends never invalidate a previously returned
/// logical index (row `i` persists for the lifetime of the store).
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    columns: Option<Columns>,
}

impl DataStore {
    /// Creates an empty store with no fixed dtype or feature count yet.
    pub fn new() -> Self {
        Self { columns: None }
    }

    /// Total number of rows appended so far.
    pub fn size(&self) -> usize {
        self.columns.as_ref().map_or(0, Columns::nrows)
    }

    /// The feature count fixed by the first append, if any.
    pub fn n_features(&self) -> Option<usize> {
        self.columns.as_ref().map(|c| match c {
            Columns::F32(a) => a.ncols(),
            Columns::F64(a) => a.ncols(),
        })
    }

    /// The dtype fixed by the first append, if any.
    pub fn dtype(&self) -> Option<Dtype> {
        self.columns.as_ref().map(Columns::dtype)
    }

    /// Appends `batch` and returns the index assigned to its first row.
    ///
    /// On [`Error::DimensionMismatch`] or [`Error::DtypeMismatch`] the store
    /// is left completely unchanged: validation happens before any mutation.
    pub fn append(&mut self, batch: Batch) -> Result<usize, Error> {
        match &self.columns {
            None => {
                let start = 0;
                self.columns = Some(match batch {
                    Batch::F32(a) => Columns::F32(a),
                    Batch::F64(a) => Columns::F64(a),
                });
                Ok(start)
            }
            Some(existing) => {
                let expected_features = self.n_features().expect("store is non-empty");
                if batch.ncols() != expected_features {
                    return Err(Error::DimensionMismatch {
                        expected: expected_features,
                        got: batch.ncols(),
                    });
                }
                let expected_dtype = existing.dtype();
                if batch.dtype() != expected_dtype {
                    return Err(Error::DtypeMismatch {
                        expected: expected_dtype,
                        got: batch.dtype(),
                    });
                }
                let start = existing.nrows();
                self.columns.as_mut().expect("checked above").extend(&batch);
                Ok(start)
            }
        }
    }

    /// Returns row `i`, upcast to `f64`.
    ///
    /// # Errors
    /// [`Error::EmptyStore`] if no data has been appended yet.
    ///
    /// # Panics
    /// Panics if `i >= self.size()`: an out-of-range read on a non-empty
    /// store is a caller bug, not a recoverable condition.
    pub fn get(&self, i: usize) -> Result<Vec<f64>, Error> {
        let columns = self.columns.as_ref().ok_or(Error::EmptyStore)?;
        Ok(columns.rows_f64(&[i]).row(0).to_vec())
    }

    /// Returns rows `range`, upcast to `f64`.
    ///
    /// # Errors
    /// [`Error::EmptyStore`] if no data has been appended yet.
    ///
    /// # Panics
    /// Panics if `range` runs past `self.size()`.
    pub fn get_range(&self, range: std::ops::Range<usize>) -> Result<Array2<f64>, Error> {
        let columns = self.columns.as_ref().ok_or(Error::EmptyStore)?;
        Ok(columns.range_f64(range.start, range.end))
    }

    /// Returns the rows at `indices` upcast to `f64`, in the order given.
    pub fn rows_f64(&self, indices: &[usize]) -> Array2<f64> {
        self.columns
            .as_ref()
            .map(|c| c.rows_f64(indices))
            .unwrap_or_else(|| Array2::zeros((0, 0)))
    }

    /// Returns rows `[start, end)` upcast to `f64`.
    pub fn range_f64(&self, start: usize, end: usize) -> Array2<f64> {
        self.columns
            .as_ref()
            .map(|c| c.range_f64(start, end))
            .unwrap_or_else(|| Array2::zeros((0, 0)))
    }
}

/// Helper used only by tests/benches to build a batch from plain `Vec`s.
pub fn batch_from_rows_f64(rows: Vec<Vec<f64>>) -> Batch {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Batch::F64(Array2::from_shape_vec((nrows, ncols), flat).expect("rectangular input"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_fixes_dims_and_dtype() {
        let mut store = DataStore::new();
        let start = store.append(batch_from_rows_f64(vec![vec![0.0, 1.0], vec![2.0, 3.0]])).unwrap();
        assert_eq!(start, 0);
        assert_eq!(store.size(), 2);
        assert_eq!(store.n_features(), Some(2));
        assert_eq!(store.dtype(), Some(Dtype::F64));

        let start2 = store.append(batch_from_rows_f64(vec![vec![4.0, 5.0]])).unwrap();
        assert_eq!(start2, 2);
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn dimension_mismatch_leaves_store_unchanged() {
        let mut store = DataStore::new();
        store.append(batch_from_rows_f64(vec![vec![0.0, 1.0, 2.0]])).unwrap();

        let err = store
            .append(batch_from_rows_f64(vec![vec![0.0, 1.0]]))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn dtype_mismatch_leaves_store_unchanged() {
        let mut store = DataStore::new();
        store.append(batch_from_rows_f64(vec![vec![0.0, 1.0]])).unwrap();

        let err = store
            .append(Batch::F32(Array2::zeros((1, 2))))
            .unwrap_err();
        assert!(matches!(err, Error::DtypeMismatch { .. }));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn get_fails_with_empty_store_before_any_append() {
        let store = DataStore::new();
        assert!(matches!(store.get(0), Err(Error::EmptyStore)));
        assert!(matches!(store.get_range(0..1), Err(Error::EmptyStore)));
    }

    #[test]
    fn get_returns_a_single_upcast_row() {
        let mut store = DataStore::new();
        store.append(Batch::F32(Array2::from_shape_vec((2, 2), vec![1.0f32, 2.0, 3.0, 4.0]).unwrap())).unwrap();
        assert_eq!(store.get(1).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn rows_f64_select_by_index() {
        let mut store = DataStore::new();
        store
            .append(batch_from_rows_f64(vec![
                vec![0.0, 0.0],
                vec![1.0, 1.0],
                vec![2.0, 2.0],
            ]))
            .unwrap();

        let rows = store.rows_f64(&[2, 0]);
        assert_eq!(rows.row(0).to_vec(), vec![2.0, 2.0]);
        assert_eq!(rows.row(1).to_vec(), vec![0.0, 0.0]);
    }
}
