//! Shared numeric bound for the two dtypes the data store accepts.
//!
//! Bounded on `num_traits::Float` rather than hand-rolling a per-dtype
//! conversion, and adding the one conversion this crate actually needs:
//! upcasting to `f64` exactly once, at the point where
//! projection/median/co-occurrence arithmetic happens, regardless of the
//! store's dtype.

use num_traits::{Float, NumCast};

/// A feature element type the data store can hold.
pub trait Number: Float + Send + Sync + std::fmt::Debug + 'static {
    /// Widens `self` to `f64` for projection, median and co-occurrence
    /// arithmetic, all of which are done in `f64` regardless of the
    /// store's dtype.
    fn as_f64(&self) -> f64 {
        NumCast::from(*self).expect("f32/f64 always cast to f64")
    }
}

impl Number for f32 {}

impl Number for f64 {}
