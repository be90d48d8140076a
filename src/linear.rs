use std::sync::Arc;

use crate::{
    distance::{Euclidean, Metric},
    error::Result,
    index::{check_query, KnnIndex},
    neighbors::{KnnHeap, Neighbor},
    point_set::PointSet,
};

/// Exhaustive scan over every point; the ground truth for the tree indexes.
pub struct BruteForceIndex<M: Metric = Euclidean> {
    points: Arc<PointSet>,
    metric: M,
}

impl BruteForceIndex<Euclidean> {
    #[must_use]
    pub fn build(points: Arc<PointSet>) -> Self {
        Self::with_metric(points, Euclidean)
    }
}

impl<M: Metric> BruteForceIndex<M> {
    #[must_use]
    pub fn with_metric(points: Arc<PointSet>, metric: M) -> Self {
        BruteForceIndex { points, metric }
    }
}

impl<M: Metric> KnnIndex for BruteForceIndex<M> {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn points(&self) -> &PointSet {
        &self.points
    }

    fn query(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        check_query(&self.points, query, k)?;
        let mut neighbors = KnnHeap::new(k);
        for (id, point) in self.points.iter().enumerate() {
            neighbors.push(id, self.metric.distance(query, point));
        }
        Ok(neighbors.into_sorted_vec())
    }
}

#[cfg(test)]
pub mod tests {
    use std::sync::Arc;

    use super::BruteForceIndex;
    use crate::{Error, KnnIndex, PointSet};

    #[test]
    pub fn test_linear() {
        let rows: Vec<[f64; 2]> = (0..100_u32).map(|i| [0.0, f64::from(i)]).collect();
        let index = BruteForceIndex::build(Arc::new(PointSet::build(&rows, 2).unwrap()));

        for i in 1..99_u32 {
            // Points lie on a line, so the neighbors of a point are itself and the
            // points right before and after it.
            let neighbors = index.query(&[0.0, f64::from(i)], 3).unwrap();
            let ids: Vec<usize> = neighbors.iter().map(|n| n.id).collect();
            assert_eq!(ids, vec![i as usize, i as usize - 1, i as usize + 1]);
        }
    }

    #[test]
    fn invalid_k() {
        let points = Arc::new(PointSet::build(&[[0.0, 0.0], [1.0, 1.0]], 2).unwrap());
        let index = BruteForceIndex::build(points);
        assert!(matches!(index.query(&[0.0, 0.0], 0), Err(Error::Parameter(_))));
        assert!(matches!(index.query(&[0.0, 0.0], 3), Err(Error::Parameter(_))));
        assert!(matches!(index.query(&[0.0], 1), Err(Error::Shape(_))));
    }
}
