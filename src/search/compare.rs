//! Weighted squared distance between feature vectors.
//!
//! Two code paths compute the same sum `Σ (wᵢ·(aᵢ - bᵢ))²`:
//! a scalar one that accepts any length and a 4-lane `wide::f32x4` one for
//! vectors padded to a multiple of four. [`ComparatorPath::for_dimension`]
//! picks between them once per search.

use wide::f32x4;

/// Which comparison kernel a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorPath {
    /// Scalar loop, no layout requirements
    Generic,
    /// 4-wide SIMD accumulation; dimension must be a multiple of 4
    Aligned,
}

impl ComparatorPath {
    /// Select the kernel for vectors of `dimension` floats.
    #[inline]
    pub const fn for_dimension(dimension: usize) -> Self {
        if dimension % 4 == 0 {
            Self::Aligned
        } else {
            Self::Generic
        }
    }

    /// Compare `pose` against `query` using this kernel.
    #[inline]
    pub fn compare(self, pose: &[f32], query: &[f32], weights_sqrt: &[f32]) -> f32 {
        match self {
            Self::Generic => compare_feature_vectors(pose, query, weights_sqrt),
            Self::Aligned => compare_aligned_feature_vectors(pose, query, weights_sqrt),
        }
    }
}

/// Weighted squared distance, scalar kernel.
///
/// # Panics
///
/// Panics if the three slices differ in length.
#[inline]
pub fn compare_feature_vectors(pose: &[f32], query: &[f32], weights_sqrt: &[f32]) -> f32 {
    assert_eq!(pose.len(), query.len(), "pose/query dimension mismatch");
    assert_eq!(pose.len(), weights_sqrt.len(), "weights dimension mismatch");

    pose.iter()
        .zip(query)
        .zip(weights_sqrt)
        .map(|((p, q), w)| {
            let d = (p - q) * w;
            d * d
        })
        .sum()
}

/// Weighted squared distance, 4-lane kernel.
///
/// # Panics
///
/// Panics if the slices differ in length or the length is not a multiple of 4.
#[inline]
pub fn compare_aligned_feature_vectors(pose: &[f32], query: &[f32], weights_sqrt: &[f32]) -> f32 {
    assert_eq!(pose.len(), query.len(), "pose/query dimension mismatch");
    assert_eq!(pose.len(), weights_sqrt.len(), "weights dimension mismatch");
    assert!(
        pose.len() % 4 == 0,
        "aligned comparison requires a dimension padded to 4, got {}",
        pose.len()
    );

    let mut acc = f32x4::ZERO;
    for ((p, q), w) in pose
        .chunks_exact(4)
        .zip(query.chunks_exact(4))
        .zip(weights_sqrt.chunks_exact(4))
    {
        let d = (lanes(p) - lanes(q)) * lanes(w);
        acc += d * d;
    }
    acc.reduce_add()
}

#[inline]
fn lanes(chunk: &[f32]) -> f32x4 {
    f32x4::from([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// Unweighted squared distance, used in PCA space.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
