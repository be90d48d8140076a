use std::{cmp::Reverse, collections::BinaryHeap, sync::Arc};

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{
    distance::{Euclidean, Metric},
    error::Result,
    index::{check_param, check_query, ensure_two_groups, KnnIndex},
    neighbors::{KnnHeap, Neighbor},
    point_set::PointSet,
};

/// A routing entry: every point below `child` lies within `radius` of the
/// point `pivot`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RoutingEntry {
    pivot: usize,
    radius: f64,
    child: usize,
}

#[derive(Debug)]
enum Entries {
    Leaf(Vec<usize>),
    Routing(Vec<RoutingEntry>),
}

#[derive(Debug)]
struct Node {
    parent: usize,
    entries: Entries,
}

impl Node {
    fn len(&self) -> usize {
        match &self.entries {
            Entries::Leaf(ids) => ids.len(),
            Entries::Routing(entries) => entries.len(),
        }
    }
}

/// Metric tree built by inserting points one at a time; works with any metric
/// that satisfies the triangle inequality.
pub struct MTreeIndex<M: Metric = Euclidean> {
    points: Arc<PointSet>,
    metric: M,
    max_node_size: usize,
    root: usize,
    nodes: Vec<Node>,
}

impl MTreeIndex<Euclidean> {
    /// Build an M-tree under the Euclidean distance.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parameter`] if `max_node_size` is less than 2.
    pub fn build(points: Arc<PointSet>, max_node_size: usize) -> Result<Self> {
        Self::with_metric(points, max_node_size, Euclidean)
    }
}

impl<M: Metric> MTreeIndex<M> {
    /// Build an M-tree under `metric`, inserting points in identifier order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Parameter`] if `max_node_size` is less than 2.
    pub fn with_metric(points: Arc<PointSet>, max_node_size: usize, metric: M) -> Result<Self> {
        check_param("max_node_size", max_node_size, 2)?;

        let mut tree = MTreeIndex {
            points,
            metric,
            max_node_size,
            root: usize::MAX,
            nodes: Vec::new(),
        };
        tree.root = tree.add_node(Node {
            parent: usize::MAX,
            entries: Entries::Leaf(Vec::new()),
        });
        for id in 0..tree.points.len() {
            tree.insert(id);
        }

        debug!(
            points = tree.points.len(),
            max_node_size,
            nodes = tree.nodes.len(),
            height = tree.height(),
            "built m-tree"
        );
        Ok(tree)
    }

    #[must_use]
    pub fn max_node_size(&self) -> usize {
        self.max_node_size
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of levels; a tree that is a single leaf has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = self.root;
        while let Entries::Routing(entries) = &self.nodes[node].entries {
            height += 1;
            node = entries[0].child;
        }
        height
    }

    fn distance(&self, a: usize, b: usize) -> f64 {
        self.metric
            .distance(self.points.point(a), self.points.point(b))
    }

    // Descend to the entry with the nearest pivot, enlarging covering radii on
    // the way, then split the leaf if it overflows.
    fn insert(&mut self, id: usize) {
        let point = self.points.point(id);
        let mut node = self.root;
        loop {
            match &mut self.nodes[node].entries {
                Entries::Leaf(ids) => {
                    ids.push(id);
                    break;
                }
                Entries::Routing(entries) => {
                    let mut best = 0;
                    let mut best_distance = f64::INFINITY;
                    for (i, entry) in entries.iter().enumerate() {
                        let distance = self
                            .metric
                            .distance(point, self.points.point(entry.pivot));
                        if distance < best_distance {
                            best = i;
                            best_distance = distance;
                        }
                    }
                    let entry = &mut entries[best];
                    entry.radius = entry.radius.max(best_distance);
                    node = entry.child;
                }
            }
        }

        if self.nodes[node].len() > self.max_node_size {
            self.split(node);
        }
    }

    fn split(&mut self, node: usize) {
        let entries = std::mem::replace(&mut self.nodes[node].entries, Entries::Leaf(Vec::new()));
        let pivots: Vec<usize> = match &entries {
            Entries::Leaf(ids) => ids.clone(),
            Entries::Routing(entries) => entries.iter().map(|e| e.pivot).collect(),
        };

        let (first, second) = self.promote(&pivots);
        let (first_group, second_group) = self.partition(&pivots, first, second);
        let first_pivot = group_pivot(&pivots, &first_group, first);
        let second_pivot = group_pivot(&pivots, &second_group, second);

        let (first_entries, first_radius, second_entries, second_radius) = match entries {
            Entries::Leaf(ids) => {
                let (a, ra) = self.leaf_group(&ids, &first_group, first_pivot);
                let (b, rb) = self.leaf_group(&ids, &second_group, second_pivot);
                (a, ra, b, rb)
            }
            Entries::Routing(entries) => {
                let (a, ra) = self.routing_group(&entries, &first_group, first_pivot);
                let (b, rb) = self.routing_group(&entries, &second_group, second_pivot);
                (a, ra, b, rb)
            }
        };

        let parent = self.nodes[node].parent;
        self.nodes[node].entries = first_entries;
        let sibling = self.add_node(Node {
            parent,
            entries: second_entries,
        });
        if let Entries::Routing(entries) = &self.nodes[sibling].entries {
            let children: Vec<usize> = entries.iter().map(|e| e.child).collect();
            for child in children {
                self.nodes[child].parent = sibling;
            }
        }

        let first_entry = RoutingEntry {
            pivot: first_pivot,
            radius: first_radius,
            child: node,
        };
        let second_entry = RoutingEntry {
            pivot: second_pivot,
            radius: second_radius,
            child: sibling,
        };

        if parent == usize::MAX {
            let root = self.add_node(Node {
                parent: usize::MAX,
                entries: Entries::Routing(vec![first_entry, second_entry]),
            });
            self.nodes[node].parent = root;
            self.nodes[sibling].parent = root;
            self.root = root;
            return;
        }

        if let Entries::Routing(entries) = &mut self.nodes[parent].entries {
            if let Some(slot) = entries.iter_mut().find(|e| e.child == node) {
                *slot = first_entry;
            }
            entries.push(second_entry);
        }
        if self.nodes[parent].len() > self.max_node_size {
            self.split(parent);
        }
    }

    // The pair of entries whose pivots are farthest apart, first pair on ties.
    fn promote(&self, pivots: &[usize]) -> (usize, usize) {
        let mut best = (0, 1);
        let mut best_distance = f64::NEG_INFINITY;
        for i in 0..pivots.len() {
            for j in i + 1..pivots.len() {
                let distance = self.distance(pivots[i], pivots[j]);
                if distance > best_distance {
                    best = (i, j);
                    best_distance = distance;
                }
            }
        }
        best
    }

    // Entry positions grouped by the nearer promoted pivot, ties to the first.
    fn partition(&self, pivots: &[usize], first: usize, second: usize) -> (Vec<usize>, Vec<usize>) {
        let (left, right): (Vec<usize>, Vec<usize>) = (0..pivots.len()).partition(|&i| {
            self.distance(pivots[i], pivots[first]) <= self.distance(pivots[i], pivots[second])
        });

        // Coincident pivots all land in the first group; a metric returning NaN
        // leaves it empty.
        ensure_two_groups(left, right)
    }

    fn leaf_group(&self, ids: &[usize], group: &[usize], pivot: usize) -> (Entries, f64) {
        let ids: Vec<usize> = group.iter().map(|&i| ids[i]).collect();
        let radius = ids
            .iter()
            .map(|&id| self.distance(pivot, id))
            .fold(0.0, f64::max);
        (Entries::Leaf(ids), radius)
    }

    fn routing_group(
        &self,
        entries: &[RoutingEntry],
        group: &[usize],
        pivot: usize,
    ) -> (Entries, f64) {
        let entries: Vec<RoutingEntry> = group.iter().map(|&i| entries[i]).collect();
        let radius = entries
            .iter()
            .map(|e| self.distance(pivot, e.pivot) + e.radius)
            .fold(0.0, f64::max);
        (Entries::Routing(entries), radius)
    }

    fn add_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }
}

// The promoted pivot if it ended up in `group`, otherwise the group's first.
fn group_pivot(pivots: &[usize], group: &[usize], promoted: usize) -> usize {
    if group.contains(&promoted) {
        pivots[promoted]
    } else {
        pivots[group[0]]
    }
}

impl<M: Metric> KnnIndex for MTreeIndex<M> {
    fn name(&self) -> &'static str {
        "m_tree"
    }

    fn points(&self) -> &PointSet {
        &self.points
    }

    fn query(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        check_query(&self.points, query, k)?;
        let mut neighbors = KnnHeap::new(k);

        // Visit subtrees in ascending order of their lower bound.
        let mut queue = BinaryHeap::new();
        queue.push(Reverse((OrderedFloat(0.0), self.root)));
        while let Some(Reverse((bound, node))) = queue.pop() {
            if neighbors.can_prune(bound.0) {
                break;
            }
            match &self.nodes[node].entries {
                Entries::Leaf(ids) => {
                    for &id in ids {
                        let distance = self.metric.distance(query, self.points.point(id));
                        neighbors.push(id, distance);
                    }
                }
                Entries::Routing(entries) => {
                    for entry in entries {
                        let distance = self.metric.distance(query, self.points.point(entry.pivot));
                        let bound = (distance - entry.radius).max(0.);
                        if !neighbors.can_prune(bound) {
                            queue.push(Reverse((OrderedFloat(bound), entry.child)));
                        }
                    }
                }
            }
        }

        Ok(neighbors.into_sorted_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{Entries, MTreeIndex};
    use crate::{
        distance::{euclidean, Metric},
        Error, KnnIndex, PointSet,
    };

    fn random_points(n: usize, seed: u64) -> Arc<PointSet> {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows: Vec<[f64; 3]> = (0..n)
            .map(|_| {
                [
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(0.0..10.0),
                ]
            })
            .collect();
        Arc::new(PointSet::build(&rows, 3).unwrap())
    }

    // Collect every point below `node`, checking node capacity and parent links.
    fn subtree_points<M: Metric>(tree: &MTreeIndex<M>, node: usize, out: &mut Vec<usize>) {
        assert!(tree.nodes[node].len() <= tree.max_node_size);
        match &tree.nodes[node].entries {
            Entries::Leaf(ids) => out.extend(ids.iter().copied()),
            Entries::Routing(entries) => {
                for entry in entries {
                    assert_eq!(tree.nodes[entry.child].parent, node);
                    subtree_points(tree, entry.child, out);
                }
            }
        }
    }

    #[test]
    fn covering_radius_invariant() {
        let points = random_points(500, 0);
        for max_node_size in [2, 3, 8] {
            let tree = MTreeIndex::build(Arc::clone(&points), max_node_size).unwrap();

            let mut all = Vec::new();
            subtree_points(&tree, tree.root, &mut all);
            all.sort_unstable();
            assert_eq!(all, (0..500).collect::<Vec<_>>());

            for node in &tree.nodes {
                if let Entries::Routing(entries) = &node.entries {
                    for entry in entries {
                        let mut below = Vec::new();
                        subtree_points(&tree, entry.child, &mut below);
                        for id in below {
                            let distance =
                                euclidean(points.point(entry.pivot), points.point(id));
                            assert!(distance <= entry.radius + 1e-9);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn grows_in_height() {
        let max_node_size = 4;
        let rows: Vec<[f64; 2]> = (0..=max_node_size)
            .map(|i| [i as f64, i as f64])
            .collect();

        let full = Arc::new(PointSet::build(&rows[..max_node_size], 2).unwrap());
        let tree = MTreeIndex::build(full, max_node_size).unwrap();
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.node_count(), 1);

        // One more point overflows the root leaf.
        let overflow = Arc::new(PointSet::build(&rows, 2).unwrap());
        let tree = MTreeIndex::build(overflow, max_node_size).unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.node_count(), 3);
    }

    #[test]
    fn single_node() {
        let points = random_points(6, 2);
        for max_node_size in [6, 50] {
            let tree = MTreeIndex::build(Arc::clone(&points), max_node_size).unwrap();
            assert_eq!(tree.node_count(), 1);
            assert_eq!(tree.height(), 1);

            let mut brute: Vec<(f64, usize)> = (0..6)
                .map(|id| (euclidean(&[5.0, 5.0, 5.0], points.point(id)), id))
                .collect();
            brute.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let ids: Vec<usize> = tree
                .query(&[5.0, 5.0, 5.0], 6)
                .unwrap()
                .iter()
                .map(|n| n.id)
                .collect();
            assert_eq!(ids, brute.iter().map(|&(_, id)| id).collect::<Vec<_>>());
        }
    }

    #[test]
    fn nan_metric_still_splits() {
        let points = random_points(12, 3);
        let tree = MTreeIndex::with_metric(points, 2, |_: &[f64], _: &[f64]| f64::NAN).unwrap();

        let mut all = Vec::new();
        subtree_points(&tree, tree.root, &mut all);
        all.sort_unstable();
        assert_eq!(all, (0..12).collect::<Vec<_>>());
        assert!(tree.height() > 1);
    }

    #[test]
    fn duplicate_points() {
        let rows = vec![[3.0, 3.0]; 20];
        let points = Arc::new(PointSet::build(&rows, 2).unwrap());
        let tree = MTreeIndex::build(points, 2).unwrap();
        let ids: Vec<usize> = tree
            .query(&[0.0, 0.0], 5)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn invalid_node_size() {
        let points = random_points(10, 1);
        assert!(matches!(
            MTreeIndex::build(points, 1),
            Err(Error::Parameter(_))
        ));
    }
}
