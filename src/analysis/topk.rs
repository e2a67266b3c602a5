//! Top-K selection
//!
//! **Problem**: picking the best K curves at every anchor by sorting is
//! O(N log N) per anchor.
//!
//! **Solution**: bounded binary heap, O(N log K) per anchor.
//!
//! Toyota Way Principles:
//! - **Kaizen**: Algorithmic improvement (O(N log N) → O(N log K))
//! - **Muda elimination**: Avoid unnecessary full sort

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Sort order for Top-K selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest K values)
    Ascending,
    /// Descending order (largest K values)
    Descending,
}

// Min-heap item: the root is the smallest kept value (used for largest-K)
#[derive(Debug)]
struct MinHeapItem {
    value: f64,
    index: usize,
}

impl PartialEq for MinHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MinHeapItem {}

impl Ord for MinHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap; on ties the later index is evicted first
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for MinHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Max-heap item: the root is the largest kept value (used for smallest-K)
#[derive(Debug)]
struct MaxHeapItem {
    value: f64,
    index: usize,
}

impl PartialEq for MaxHeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MaxHeapItem {}

impl Ord for MaxHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for MaxHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Indices of the K best values, best first
///
/// `NaN` values are skipped, so fewer than `k` indices come back when the
/// slice holds fewer than `k` numbers. Ties keep the smaller index.
///
/// # Examples
///
/// ```rust
/// use lcdb::analysis::topk::{top_k_indices, SortOrder};
///
/// let scores = [1.0, 5.0, 3.0, 9.0, 2.0];
/// assert_eq!(top_k_indices(&scores, 3, SortOrder::Descending), vec![3, 1, 2]);
/// assert_eq!(top_k_indices(&scores, 2, SortOrder::Ascending), vec![0, 4]);
/// ```
#[must_use]
pub fn top_k_indices(values: &[f64], k: usize, order: SortOrder) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    let candidates = values
        .iter()
        .enumerate()
        .filter(|(_, value)| !value.is_nan())
        .map(|(index, &value)| (index, value));

    match order {
        SortOrder::Descending => {
            let mut heap: BinaryHeap<MinHeapItem> = BinaryHeap::with_capacity(k);
            for (index, value) in candidates {
                if heap.len() < k {
                    heap.push(MinHeapItem { value, index });
                } else if let Some(top) = heap.peek() {
                    if value.total_cmp(&top.value) == Ordering::Greater {
                        heap.pop();
                        heap.push(MinHeapItem { value, index });
                    }
                }
            }
            // ascending heap order of MinHeapItem is descending value order
            heap.into_sorted_vec().into_iter().map(|item| item.index).collect()
        }
        SortOrder::Ascending => {
            let mut heap: BinaryHeap<MaxHeapItem> = BinaryHeap::with_capacity(k);
            for (index, value) in candidates {
                if heap.len() < k {
                    heap.push(MaxHeapItem { value, index });
                } else if let Some(top) = heap.peek() {
                    if value.total_cmp(&top.value) == Ordering::Less {
                        heap.pop();
                        heap.push(MaxHeapItem { value, index });
                    }
                }
            }
            heap.into_sorted_vec().into_iter().map(|item| item.index).collect()
        }
    }
}
