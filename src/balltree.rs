use std::sync::Arc;

use tracing::debug;

use crate::{
    distance::euclidean,
    error::Result,
    index::{check_param, check_query, ensure_two_groups, KnnIndex},
    neighbors::{KnnHeap, Neighbor},
    point_set::PointSet,
    sphere::Sphere,
};

#[derive(Debug)]
enum Children {
    Split { left: usize, right: usize },
    Leaf { ids: Vec<usize> },
}

#[derive(Debug)]
struct Node {
    sphere: Sphere,
    children: Children,
}

/// Hyper-sphere partitioning tree: every node is a ball around the centroid of
/// its points, split in two around a pair of far-apart pivots.
pub struct BallTreeIndex {
    points: Arc<PointSet>,
    leaf_size: usize,
    root: usize,
    nodes: Vec<Node>,
}

impl BallTreeIndex {
    /// Build the tree, stopping once a node holds at most `leaf_size` points.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parameter`] if `leaf_size` is zero.
    pub fn build(points: Arc<PointSet>, leaf_size: usize) -> Result<Self> {
        check_param("leaf_size", leaf_size, 1)?;

        let mut tree = BallTreeIndex {
            points,
            leaf_size,
            root: usize::MAX,
            nodes: Vec::new(),
        };
        let ids: Vec<usize> = (0..tree.points.len()).collect();
        tree.root = tree.build_recursive(ids)?;

        debug!(
            points = tree.points.len(),
            leaf_size,
            nodes = tree.nodes.len(),
            "built ball tree"
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

    fn build_recursive(&mut self, ids: Vec<usize>) -> Result<usize> {
        let sphere = Sphere::enclosing(&self.points, &ids)?;
        if ids.len() <= self.leaf_size {
            return Ok(self.add_node(Node {
                sphere,
                children: Children::Leaf { ids },
            }));
        }

        let (left_ids, right_ids) = self.partition(&sphere, ids);
        let left = self.build_recursive(left_ids)?;
        let right = self.build_recursive(right_ids)?;
        Ok(self.add_node(Node {
            sphere,
            children: Children::Split { left, right },
        }))
    }

    // Split around the point farthest from the centroid and the point farthest
    // from that one; each point joins the nearer pivot, ties to the first.
    fn partition(&self, sphere: &Sphere, ids: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
        let first = self.farthest_from(&sphere.center, &ids);
        let second = self.farthest_from(self.points.point(first), &ids);
        let first = self.points.point(first);
        let second = self.points.point(second);

        let (left, right): (Vec<usize>, Vec<usize>) = ids.into_iter().partition(|&id| {
            let point = self.points.point(id);
            euclidean(point, first) <= euclidean(point, second)
        });

        // Coincident points all land with the first pivot.
        ensure_two_groups(left, right)
    }

    fn farthest_from(&self, target: &[f64], ids: &[usize]) -> usize {
        let mut farthest = ids[0];
        let mut max_distance = f64::NEG_INFINITY;
        for &id in ids {
            let distance = euclidean(target, self.points.point(id));
            if distance > max_distance {
                max_distance = distance;
                farthest = id;
            }
        }
        farthest
    }

    fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn query_recursive(&self, node: usize, query: &[f64], neighbors: &mut KnnHeap) {
        match &self.nodes[node].children {
            Children::Leaf { ids } => {
                for &id in ids {
                    neighbors.push(id, euclidean(query, self.points.point(id)));
                }
            }
            Children::Split { left, right } => {
                let left_sphere = &self.nodes[*left].sphere;
                let right_sphere = &self.nodes[*right].sphere;
                let left_center = euclidean(query, &left_sphere.center);
                let right_center = euclidean(query, &right_sphere.center);

                let mut children = [
                    (left_center, left_center - left_sphere.radius, *left),
                    (right_center, right_center - right_sphere.radius, *right),
                ];
                if right_center < left_center {
                    children.swap(0, 1);
                }

                for (_, bound, child) in children {
                    if !neighbors.can_prune(bound) {
                        self.query_recursive(child, query, neighbors);
                    }
                }
            }
        }
    }
}

impl KnnIndex for BallTreeIndex {
    fn name(&self) -> &'static str {
        "ball_tree"
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
