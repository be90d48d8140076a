use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{
    distance::euclidean,
    error::Result,
    index::{check_param, check_query, KnnIndex},
    neighbors::{KnnHeap, Neighbor},
    point_set::PointSet,
};

#[derive(Debug)]
enum Node {
    // Points on the left have `coord <= value`, points on the right `coord >= value`.
    Split {
        dimension: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        ids: Vec<usize>,
    },
}

/// Axis-aligned binary space partitioning tree with bounded leaf buckets.
pub struct KDTreeIndex {
    points: Arc<PointSet>,
    leaf_size: usize,
    root: usize,
    nodes: Vec<Node>,
}

impl KDTreeIndex {
    /// Build the tree, splitting at the median of the dimension with the widest
    /// spread until a node holds at most `leaf_size` points.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parameter`] if `leaf_size` is zero.
    pub fn build(points: Arc<PointSet>, leaf_size: usize) -> Result<Self> {
        check_param("leaf_size", leaf_size, 1)?;

        let mut tree = KDTreeIndex {
            points,
            leaf_size,
            root: usize::MAX,
            nodes: Vec::new(),
        };
        let mut ids: Vec<usize> = (0..tree.points.len()).collect();
        tree.root = tree.build_recursive(&mut ids);

        debug!(
            points = tree.points.len(),
            leaf_size,
            nodes = tree.nodes.len(),
            "built kd-tree"
        );
        Ok(tree)
    }

    #[must_use]
    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn build_recursive(&mut self, ids: &mut [usize]) -> usize {
        if ids.len() <= self.leaf_size {
            return self.add_node(Node::Leaf { ids: ids.to_vec() });
        }

        let dimension = self.split_dimension(ids);
        let points = Arc::clone(&self.points);

        // The left half receives the ceiling of n / 2 points.
        let mid = (ids.len() + 1) / 2;
        ids.select_nth_unstable_by_key(mid - 1, |&id| {
            (OrderedFloat(points.point(id)[dimension]), id)
        });
        let value = points.point(ids[mid - 1])[dimension];

        let (left_ids, right_ids) = ids.split_at_mut(mid);
        let left = self.build_recursive(left_ids);
        let right = self.build_recursive(right_ids);
        self.add_node(Node::Split {
            dimension,
            value,
            left,
            right,
        })
    }

    // The dimension with the maximum coordinate spread, lowest index on ties.
    fn split_dimension(&self, ids: &[usize]) -> usize {
        let dimensions = self.points.dimensions();
        let mut min = vec![f64::INFINITY; dimensions];
        let mut max = vec![f64::NEG_INFINITY; dimensions];
        for &id in ids {
            for (d, &x) in self.points.point(id).iter().enumerate() {
                min[d] = min[d].min(x);
                max[d] = max[d].max(x);
            }
        }

        let mut best = 0;
        let mut best_spread = f64::NEG_INFINITY;
        for d in 0..dimensions {
            let spread = max[d] - min[d];
            if spread > best_spread {
                best = d;
                best_spread = spread;
            }
        }
        best
    }

    fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn query_recursive(&self, node: usize, query: &[f64], neighbors: &mut KnnHeap) {
        match &self.nodes[node] {
            Node::Leaf { ids } => {
                for &id in ids {
                    neighbors.push(id, euclidean(query, self.points.point(id)));
                }
            }
            Node::Split {
                dimension,
                value,
                left,
                right,
            } => {
                let offset = query[*dimension] - value;
                let (near, far) = if offset <= 0.0 {
                    (*left, *right)
                } else {
                    (*right, *left)
                };

                self.query_recursive(near, query, neighbors);
                // The far side lies entirely beyond the splitting plane.
                if !neighbors.can_prune(offset.abs()) {
                    self.query_recursive(far, query, neighbors);
                }
            }
        }
    }
}

impl KnnIndex for KDTreeIndex {
    fn name(&self) -> &'static str {
        "kd_tree"
    }

    fn points(&self) -> &PointSet {
        &self.points
    }

    fn query(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        check_query(&self.points, query, k)?;
        let mut neighbors = KnnHeap::new(k);
        self.query_recursive(self.root, query, &mut neighbors);
        Ok(neighbors.into_sorted_vec())
    }
}
