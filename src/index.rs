use crate::{
    error::{Error, Result},
    neighbors::Neighbor,
    point_set::PointSet,
};

/// The capability shared by every backend: exact k nearest neighbors over a
/// built, immutable index.
pub trait KnnIndex: Send + Sync {
    /// Short backend name used in benchmark samples.
    fn name(&self) -> &'static str;

    /// The indexed points.
    fn points(&self) -> &PointSet;

    /// The `k` nearest points to `query`, ascending by distance with ties broken
    /// by ascending identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parameter`] if `k` is zero or larger than the number of
    /// points, and [`Error::Shape`] if `query` has the wrong dimensionality.
    fn query(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>>;

    fn len(&self) -> usize {
        self.points().len()
    }

    fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    fn dimensions(&self) -> usize {
        self.points().dimensions()
    }

    /// Answer every query in order, failing on the first invalid one.
    fn query_batch(&self, queries: &[Vec<f64>], k: usize) -> Result<Vec<Vec<Neighbor>>> {
        queries.iter().map(|q| self.query(q, k)).collect()
    }

    /// Answer every query in parallel; each query keeps its own heap.
    #[cfg(feature = "rayon")]
    fn par_query_batch(&self, queries: &[Vec<f64>], k: usize) -> Result<Vec<Vec<Neighbor>>> {
        use rayon::prelude::*;
        queries.par_iter().map(|q| self.query(q, k)).collect()
    }
}

/// Validate a query against the indexed points.
pub(crate) fn check_query(points: &PointSet, query: &[f64], k: usize) -> Result<()> {
    if k < 1 {
        return Err(Error::Parameter("k must be at least 1".into()));
    }
    if k > points.len() {
        return Err(Error::Parameter(format!(
            "k = {k} exceeds the {} indexed points",
            points.len()
        )));
    }
    if query.len() != points.dimensions() {
        return Err(Error::Shape(format!(
            "query has {} coordinates, expected {}",
            query.len(),
            points.dimensions()
        )));
    }
    Ok(())
}

/// Make sure both halves of a two-way split hold something. When the
/// distance comparison put everything on one side, split by position instead.
pub(crate) fn ensure_two_groups(
    mut left: Vec<usize>,
    mut right: Vec<usize>,
) -> (Vec<usize>, Vec<usize>) {
    if left.is_empty() {
        std::mem::swap(&mut left, &mut right);
    }
    if right.is_empty() {
        right = left.split_off((left.len() + 1) / 2);
    }
    (left, right)
}

/// Validate a structural parameter such as a leaf size.
pub(crate) fn check_param(name: &str, value: usize, min: usize) -> Result<()> {
    if value < min {
        return Err(Error::Parameter(format!(
            "{name} must be at least {min}, got {value}"
        )));
    }
    Ok(())
}
