//! Random-projection hyperplanes with median offsets.
//!
//! Grounded in `original_source/prodr/apforest/utils/splitting.py`
//! (`generate_normal`, `generate_hyperplane`): a normal is drawn from the
//! standard normal distribution and left un-normalized, since median-offset
//! splitting is invariant to scaling the normal.

use ndarray::ArrayView2;
use rand::Rng;
use rand_distr::StandardNormal;

/// A frozen `(normal, offset)` pair. A point `x` lies "left" of the
/// hyperplane iff `<x, normal> >= offset`.
#[derive(Debug, Clone)]
pub struct Hyperplane {
    /// The projection direction.
    pub normal: Vec<f64>,
    /// The median-of-projections split point.
    pub offset: f64,
}

/// Draws a `d`-dimensional vector from the standard normal distribution.
///
/// Mirrors `np.random.default_rng().normal(size=d)`; not unit-normalized.
pub fn generate_normal(d: usize, rng: &mut impl Rng) -> Vec<f64> {
    (0..d).map(|_| rng.sample(StandardNormal)).collect()
}

/// Projects every row of `data` onto `normal`.
pub fn project_rows(data: ArrayView2<f64>, normal: &[f64]) -> Vec<f64> {
    data.rows()
        .into_iter()
        .map(|row| row.iter().zip(normal).map(|(a, b)| a * b).sum())
        .collect()
}

/// The median of `values`, matching `numpy.median` (average of the two
/// middle elements for an even-length input). `values` is sorted in place.
pub fn median(values: &mut [f64]) -> f64 {
    assert!(!values.is_empty(), "median of an empty slice is undefined");
    values.sort_by(|a, b| a.partial_cmp(b).expect("NaN projections are not supported"));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Builds a hyperplane that approximately bisects `data`.
///
/// If `normal` is `None`, a fresh one is drawn from `rng` of the
/// appropriate dimension; otherwise the supplied normal is reused, which is
/// what lets a tree keep one shared normal per depth.
pub fn generate_hyperplane(data: ArrayView2<f64>, normal: Option<Vec<f64>>, rng: &mut impl Rng) -> Hyperplane {
    let normal = normal.unwrap_or_else(|| generate_normal(data.ncols(), rng));
    let mut projections = project_rows(data, &normal);
    let offset = median(&mut projections);
    Hyperplane { normal, offset }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn median_is_numpy_compatible() {
        assert_eq!(median(&mut [1.0, 3.0, 2.0]), 2.0);
        assert!(approx_eq!(f64, median(&mut [1.0, 2.0, 3.0, 4.0]), 2.5, ulps = 2));
    }

    #[test]
    fn hyperplane_with_reused_normal_does_not_redraw() {
        let data = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let hp = generate_hyperplane(data.view(), Some(vec![1.0, 0.0]), &mut rng);
        assert_eq!(hp.normal, vec![1.0, 0.0]);
        assert_eq!(hp.offset, 2.0);
    }

    #[test]
    fn left_side_gets_the_median_tie() {
        // All projections equal: the hyperplane puts everyone on the left.
        let data = array![[1.0], [1.0], [1.0]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let hp = generate_hyperplane(data.view(), Some(vec![1.0]), &mut rng);
        assert_eq!(hp.offset, 1.0);
        for row in data.rows() {
            let proj: f64 = row.iter().zip(&hp.normal).map(|(a, b)| a * b).sum();
            assert!(proj >= hp.offset);
        }
    }
}
