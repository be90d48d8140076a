use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::Serialize;

// Absorbs rounding in lower bounds derived through the triangle inequality.
const PRUNE_TOLERANCE: f64 = 1e-9;

/// One entry of a k nearest neighbors result.
///
/// Neighbors order by distance, then by point identifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub id: usize,
    pub distance: f64,
}

impl Neighbor {
    #[must_use]
    pub fn new(id: usize, distance: f64) -> Self {
        Neighbor { id, distance }
    }

    fn key(&self) -> (OrderedFloat<f64>, usize) {
        (OrderedFloat(self.distance), self.id)
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Fixed-capacity binary max-heap holding the best `k` candidates of a query.
///
/// The worst retained candidate sits at the root, so a closer candidate
/// replaces it in `O(log k)`. Storage is allocated once with capacity `k`.
#[derive(Debug)]
pub struct KnnHeap {
    k: usize,
    items: Vec<Neighbor>,
}

impl KnnHeap {
    #[must_use]
    pub fn new(k: usize) -> Self {
        KnnHeap {
            k,
            items: Vec::with_capacity(k),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() == self.k
    }

    /// Distance of the current k-th best candidate, or infinity until the heap
    /// holds `k` candidates.
    #[must_use]
    pub fn kth_distance(&self) -> f64 {
        if self.is_full() {
            self.items.first().map_or(f64::INFINITY, |n| n.distance)
        } else {
            f64::INFINITY
        }
    }

    /// Whether a subtree whose points are all at least `bound` away from the
    /// query may be skipped.
    #[inline]
    #[must_use]
    pub fn can_prune(&self, bound: f64) -> bool {
        if !self.is_full() {
            return false;
        }
        let kth = self.kth_distance();
        bound - kth > PRUNE_TOLERANCE * kth.max(1.0)
    }

    /// Offer a candidate; returns whether it was retained.
    pub fn push(&mut self, id: usize, distance: f64) -> bool {
        let candidate = Neighbor::new(id, distance);
        if self.items.len() < self.k {
            self.items.push(candidate);
            self.sift_up(self.items.len() - 1);
            return true;
        }
        match self.items.first() {
            Some(worst) if candidate < *worst => {
                self.items[0] = candidate;
                self.sift_down(0);
                true
            }
            _ => false,
        }
    }

    /// Consume the heap into neighbors sorted ascending.
    #[must_use]
    pub fn into_sorted_vec(mut self) -> Vec<Neighbor> {
        self.items.sort_unstable();
        self.items
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.items[pos] <= self.items[parent] {
                break;
            }
            self.items.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut largest = pos;
            if left < len && self.items[left] > self.items[largest] {
                largest = left;
            }
            if right < len && self.items[right] > self.items[largest] {
                largest = right;
            }
            if largest == pos {
                break;
            }
            self.items.swap(pos, largest);
            pos = largest;
        }
    }
}
