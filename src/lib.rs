//! Exact k nearest neighbor search over fixed-dimensionality point sets with
//! interchangeable index structures, plus a harness that times them.

mod balltree;
mod distance;
mod error;
pub mod harness;
mod index;
mod kdtree;
mod linear;
mod mtree;
mod neighbors;
mod point_set;
mod sphere;

pub use balltree::BallTreeIndex;
pub use distance::{euclidean, Euclidean, Metric};
pub use error::{Error, Result};
pub use harness::{Axis, Backend, BenchmarkHarness, BenchmarkSample, HarnessConfig};
pub use index::KnnIndex;
pub use kdtree::KDTreeIndex;
pub use linear::BruteForceIndex;
pub use mtree::MTreeIndex;
pub use neighbors::{KnnHeap, Neighbor};
pub use point_set::PointSet;
