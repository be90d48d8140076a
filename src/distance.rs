/// A distance function over points of equal dimensionality.
///
/// Implementations must be non-negative, symmetric and satisfy the triangle
/// inequality; the tree indexes rely on the latter to prune subtrees.
pub trait Metric: Send + Sync {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;
}

/// The L2 distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Euclidean;

impl Metric for Euclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        euclidean(a, b)
    }
}

impl<F> Metric for F
where
    F: Fn(&[f64], &[f64]) -> f64 + Send + Sync,
{
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

#[inline]
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += (x - y).powi(2);
    }
    sum.sqrt()
}
