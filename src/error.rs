//! Errors surfaced at the public boundary of the engine.

use crate::data::Dtype;

/// Errors that can be returned from the public API.
///
/// `UnknownIndex` is never produced by misuse of the public API; it exists so
/// that an internal invariant check has a named type to report through
/// before panicking (see `ClusterHandler::micro_cluster_for`).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The batch's feature count does not match the dimensionality fixed by
    /// the first `append`.
    #[error("dimension mismatch: expected {expected} features, got {got}")]
    DimensionMismatch {
        /// Feature count fixed by the first append.
        expected: usize,
        /// Feature count of the offending batch.
        got: usize,
    },

    /// The batch's element type does not match the dtype fixed by the first
    /// `append`.
    #[error("dtype mismatch: store holds {expected:?}, batch is {got:?}")]
    DtypeMismatch {
        /// Dtype fixed by the first append.
        expected: Dtype,
        /// Dtype of the offending batch.
        got: Dtype,
    },

    /// A read was attempted before any data had been appended.
    #[error("data store is empty")]
    EmptyStore,

    /// A point index has no known micro-cluster. This indicates that an
    /// internal invariant was violated; it should never happen in response
    /// to well-formed external input.
    #[error("point index {0} has no known micro-cluster (invariant violation)")]
    UnknownIndex(usize),
}
