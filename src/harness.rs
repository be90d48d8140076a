//! Build-and-query timing across backends, structural parameters, `k` and
//! dimensionality.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    balltree::BallTreeIndex,
    error::{Error, Result},
    index::KnnIndex,
    kdtree::KDTreeIndex,
    linear::BruteForceIndex,
    mtree::MTreeIndex,
    neighbors::Neighbor,
    point_set::PointSet,
};

/// The index structures the harness can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    BruteForce,
    KdTree,
    BallTree,
    MTree,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::BruteForce,
        Backend::KdTree,
        Backend::BallTree,
        Backend::MTree,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Backend::BruteForce => "brute_force",
            Backend::KdTree => "kd_tree",
            Backend::BallTree => "ball_tree",
            Backend::MTree => "m_tree",
        }
    }

    /// Build this backend over `points`. `param` is the leaf size of the KD and
    /// Ball trees and the maximum node size of the M-tree; brute force ignores
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parameter`] if `param` is invalid for the backend.
    pub fn build(self, points: Arc<PointSet>, param: usize) -> Result<Box<dyn KnnIndex>> {
        let index: Box<dyn KnnIndex> = match self {
            Backend::BruteForce => Box::new(BruteForceIndex::build(points)),
            Backend::KdTree => Box::new(KDTreeIndex::build(points, param)?),
            Backend::BallTree => Box::new(BallTreeIndex::build(points, param)?),
            Backend::MTree => Box::new(MTreeIndex::build(points, param)?),
        };
        Ok(index)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for a [`BenchmarkHarness`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Keep the neighbor identifiers of every query so backends can be compared.
    pub record_neighbors: bool,
    /// Spread each query batch over the rayon thread pool. Without the `rayon`
    /// feature batches always run sequentially and the harness logs a warning.
    pub parallel: bool,
}

/// One timed build-and-query run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkSample {
    pub backend: Backend,
    pub param: usize,
    pub k: usize,
    pub dimensions: usize,
    pub build_time: Duration,
    pub elapsed: Duration,
    pub query_count: usize,
    /// Neighbor identifiers per query, when recording is enabled.
    pub neighbors: Option<Vec<Vec<usize>>>,
}

impl BenchmarkSample {
    /// Whether both samples recorded the same neighbors for every query.
    /// `None` if either sample did not record them.
    #[must_use]
    pub fn same_neighbors(&self, other: &BenchmarkSample) -> Option<bool> {
        match (&self.neighbors, &other.neighbors) {
            (Some(a), Some(b)) => Some(a == b),
            _ => None,
        }
    }
}

/// The parameter a benchmark series is plotted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Parameter,
    K,
    Dimensions,
}

pub struct BenchmarkHarness {
    config: HarnessConfig,
    samples: Vec<BenchmarkSample>,
}

impl BenchmarkHarness {
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        if config.parallel && cfg!(not(feature = "rayon")) {
            warn!("parallel batches need the `rayon` feature; queries will run sequentially");
        }
        BenchmarkHarness {
            config,
            samples: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    #[must_use]
    pub fn samples(&self) -> &[BenchmarkSample] {
        &self.samples
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Build `backend` once, then time the whole query batch against it.
    ///
    /// Build time is recorded separately from the batch time.
    ///
    /// # Errors
    ///
    /// Fails if the index cannot be built, if `k` is invalid for the point set
    /// or if a query has the wrong dimensionality. Nothing is recorded then.
    pub fn run(
        &mut self,
        backend: Backend,
        points: &Arc<PointSet>,
        queries: &[Vec<f64>],
        k: usize,
        param: usize,
    ) -> Result<&BenchmarkSample> {
        let dimensions = points.dimensions();
        if let Some(query) = queries.iter().find(|q| q.len() != dimensions) {
            return Err(Error::Shape(format!(
                "query has {} coordinates, expected {dimensions}",
                query.len()
            )));
        }

        let start = Instant::now();
        let index = backend.build(Arc::clone(points), param)?;
        let build_time = start.elapsed();

        let start = Instant::now();
        let results = self.query_batch(index.as_ref(), queries, k)?;
        let elapsed = start.elapsed();

        let neighbors = self.config.record_neighbors.then(|| {
            results
                .iter()
                .map(|result| result.iter().map(|n| n.id).collect())
                .collect()
        });

        info!(
            backend = backend.name(),
            param,
            k,
            dimensions,
            queries = queries.len(),
            build_ms = build_time.as_secs_f64() * 1e3,
            query_ms = elapsed.as_secs_f64() * 1e3,
            "benchmark sample"
        );

        self.samples.push(BenchmarkSample {
            backend,
            param,
            k,
            dimensions,
            build_time,
            elapsed,
            query_count: queries.len(),
            neighbors,
        });
        Ok(&self.samples[self.samples.len() - 1])
    }

    /// Run every `(param, k)` combination. Each combination stands alone: a
    /// failure is logged and reported in its slot while the sweep continues.
    pub fn sweep(
        &mut self,
        backend: Backend,
        points: &Arc<PointSet>,
        queries: &[Vec<f64>],
        ks: &[usize],
        params: &[usize],
    ) -> Vec<Result<BenchmarkSample>> {
        let mut outcomes = Vec::with_capacity(ks.len() * params.len());
        for &param in params {
            for &k in ks {
                let outcome = self.run(backend, points, queries, k, param).cloned();
                if let Err(err) = &outcome {
                    warn!(backend = backend.name(), param, k, %err, "benchmark run failed");
                }
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Plot-ready `(x, batch time)` points of `backend` in recording order.
    #[must_use]
    pub fn series(&self, backend: Backend, axis: Axis) -> Vec<(usize, Duration)> {
        self.samples
            .iter()
            .filter(|s| s.backend == backend)
            .map(|s| {
                let x = match axis {
                    Axis::Parameter => s.param,
                    Axis::K => s.k,
                    Axis::Dimensions => s.dimensions,
                };
                (x, s.elapsed)
            })
            .collect()
    }

    #[cfg(feature = "rayon")]
    fn query_batch(
        &self,
        index: &dyn KnnIndex,
        queries: &[Vec<f64>],
        k: usize,
    ) -> Result<Vec<Vec<Neighbor>>> {
        if self.config.parallel {
            index.par_query_batch(queries, k)
        } else {
            index.query_batch(queries, k)
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn query_batch(
        &self,
        index: &dyn KnnIndex,
        queries: &[Vec<f64>],
        k: usize,
    ) -> Result<Vec<Vec<Neighbor>>> {
        index.query_batch(queries, k)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Axis, Backend, BenchmarkHarness, HarnessConfig};
    use crate::{Error, PointSet};

    fn setup() -> (Arc<PointSet>, Vec<Vec<f64>>) {
        let rows: Vec<[f64; 2]> = (0..50_u32)
            .map(|i| [f64::from(i % 7), f64::from(i / 7)])
            .collect();
        let points = Arc::new(PointSet::build(&rows, 2).unwrap());
        let queries = vec![vec![0.5, 0.5], vec![3.2, 4.1], vec![6.0, 0.0]];
        (points, queries)
    }

    #[test]
    fn run_records_sample() {
        let (points, queries) = setup();
        let mut harness = BenchmarkHarness::new(HarnessConfig::default());
        let sample = harness
            .run(Backend::KdTree, &points, &queries, 3, 4)
            .unwrap();
        assert_eq!(sample.backend, Backend::KdTree);
        assert_eq!(sample.param, 4);
        assert_eq!(sample.k, 3);
        assert_eq!(sample.dimensions, 2);
        assert_eq!(sample.query_count, 3);
        assert!(sample.neighbors.is_none());
        assert_eq!(harness.samples().len(), 1);
    }

    #[test]
    fn run_rejects_bad_queries() {
        let (points, _) = setup();
        let mut harness = BenchmarkHarness::new(HarnessConfig::default());
        let result = harness.run(Backend::BallTree, &points, &[vec![1.0]], 1, 4);
        assert!(matches!(result, Err(Error::Shape(_))));
        assert!(harness.samples().is_empty());
    }

    #[test]
    fn series_by_axis() {
        let (points, queries) = setup();
        let mut harness = BenchmarkHarness::new(HarnessConfig::default());
        for param in [2, 4, 8] {
            harness
                .run(Backend::MTree, &points, &queries, 1, param)
                .unwrap();
        }
        harness
            .run(Backend::BruteForce, &points, &queries, 5, 0)
            .unwrap();

        let xs: Vec<usize> = harness
            .series(Backend::MTree, Axis::Parameter)
            .into_iter()
            .map(|(x, _)| x)
            .collect();
        assert_eq!(xs, vec![2, 4, 8]);
        assert_eq!(harness.series(Backend::BruteForce, Axis::K)[0].0, 5);
        assert_eq!(harness.series(Backend::BruteForce, Axis::Dimensions)[0].0, 2);

        harness.clear();
        assert!(harness.samples().is_empty());
    }

    #[test]
    fn config_defaults() {
        let config: HarnessConfig = serde_json::from_str(r#"{"record_neighbors": true}"#).unwrap();
        assert!(config.record_neighbors);
        assert!(!config.parallel);
    }

    #[cfg(not(feature = "rayon"))]
    #[test]
    fn parallel_without_rayon_runs_sequentially() {
        let (points, queries) = setup();
        let mut sequential = BenchmarkHarness::new(HarnessConfig {
            record_neighbors: true,
            parallel: false,
        });
        let mut parallel = BenchmarkHarness::new(HarnessConfig {
            record_neighbors: true,
            parallel: true,
        });
        let a = sequential
            .run(Backend::BallTree, &points, &queries, 4, 3)
            .unwrap();
        let b = parallel
            .run(Backend::BallTree, &points, &queries, 4, 3)
            .unwrap();
        assert_eq!(a.same_neighbors(&b), Some(true));
    }
}
