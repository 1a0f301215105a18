//! Bounded top-K selection and multi-way merging of partial results.
//!
//! Each worker in a partitioned search keeps its own [`TopK`] buffer; the
//! partial buffers are then combined with [`merge_partials`], a heap-driven
//! multi-way merge that never flattens and re-sorts the full candidate set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::kernel::ScoreOrder;

/// A scored catalog position produced during ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// Index of the item within the catalog's flat buffer.
    pub position: usize,
    /// Metric score for this item.
    pub score: f64,
}

/// Fixed-capacity buffer holding the best K candidates seen so far.
///
/// Entries are kept sorted best-first. A new candidate is only admitted when
/// the buffer has room or the candidate beats the current worst entry, in
/// which case it is placed by shifted insertion — O(K) per insert, which is
/// fine because K is small (typically ≤ 100).
#[derive(Debug, Clone)]
pub struct TopK {
    capacity: usize,
    order: ScoreOrder,
    entries: Vec<Scored>,
}

impl TopK {
    /// Create a selector holding at most `capacity` entries.
    pub fn new(capacity: usize, order: ScoreOrder) -> Self {
        Self {
            capacity,
            order,
            entries: Vec::with_capacity(capacity.min(1024)),
        }
    }

    /// Offer a candidate; it is kept only if it ranks within the top K.
    pub fn offer(&mut self, position: usize, score: f64) {
        if self.capacity == 0 {
            return;
        }

        if self.entries.len() == self.capacity {
            let worst = self.entries[self.entries.len() - 1].score;
            if !self.order.is_better(score, worst) {
                return;
            }
            self.entries.pop();
        }

        // Walk back from the worst end to find the insertion point.
        let mut idx = self.entries.len();
        while idx > 0 && self.order.is_better(score, self.entries[idx - 1].score) {
            idx -= 1;
        }
        self.entries.insert(idx, Scored { position, score });
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no candidate has been admitted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the selector, yielding entries best-first.
    pub fn into_sorted(self) -> Vec<Scored> {
        self.entries
    }
}

/// Heap cursor over one partial list, ordered so the globally best head
/// pops first.
struct MergeCursor<'a> {
    partial: &'a [Scored],
    offset: usize,
    order: ScoreOrder,
}

impl MergeCursor<'_> {
    fn head(&self) -> Scored {
        self.partial[self.offset]
    }
}

impl PartialEq for MergeCursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.head().score == other.head().score
    }
}

impl Eq for MergeCursor<'_> {}

impl PartialOrd for MergeCursor<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCursor<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.head().score, other.head().score);
        // BinaryHeap is a max-heap; make "better" compare as greater.
        let cmp = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self.order {
            ScoreOrder::HigherIsBetter => cmp,
            ScoreOrder::LowerIsBetter => cmp.reverse(),
        }
    }
}

/// Merge per-partition top-K lists into the global top-K.
///
/// Every input list must already be sorted best-first (the order [`TopK`]
/// produces). Runs in O(total · log P) for P partitions.
pub fn merge_partials(partials: &[Vec<Scored>], k: usize, order: ScoreOrder) -> Vec<Scored> {
    let mut heap: BinaryHeap<MergeCursor<'_>> = partials
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| MergeCursor {
            partial: p,
            offset: 0,
            order,
        })
        .collect();

    let mut merged = Vec::with_capacity(k.min(partials.iter().map(|p| p.len()).sum()));
    while merged.len() < k {
        let Some(mut cursor) = heap.pop() else {
            break;
        };
        merged.push(cursor.head());
        cursor.offset += 1;
        if cursor.offset < cursor.partial.len() {
            heap.push(cursor);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(entries: &[Scored]) -> Vec<usize> {
        entries.iter().map(|e| e.position).collect()
    }

    #[test]
    fn test_topk_keeps_best_descending() {
        let mut topk = TopK::new(3, ScoreOrder::HigherIsBetter);
        for (pos, score) in [(0, 0.1), (1, 0.9), (2, 0.5), (3, 0.7), (4, 0.3)] {
            topk.offer(pos, score);
        }

        let sorted = topk.into_sorted();
        assert_eq!(positions(&sorted), vec![1, 3, 2]);
        assert_eq!(sorted[0].score, 0.9);
    }

    #[test]
    fn test_topk_ascending_for_distances() {
        let mut topk = TopK::new(2, ScoreOrder::LowerIsBetter);
        for (pos, score) in [(0, 3.0), (1, 1.0), (2, 2.0), (3, 0.5)] {
            topk.offer(pos, score);
        }

        let sorted = topk.into_sorted();
        assert_eq!(positions(&sorted), vec![3, 1]);
    }

    #[test]
    fn test_topk_rejects_worse_than_worst_when_full() {
        let mut topk = TopK::new(2, ScoreOrder::HigherIsBetter);
        topk.offer(0, 0.9);
        topk.offer(1, 0.8);
        topk.offer(2, 0.1);

        assert_eq!(topk.len(), 2);
        assert_eq!(positions(&topk.into_sorted()), vec![0, 1]);
    }

    #[test]
    fn test_topk_zero_capacity() {
        let mut topk = TopK::new(0, ScoreOrder::HigherIsBetter);
        topk.offer(0, 1.0);
        assert!(topk.is_empty());
    }

    #[test]
    fn test_topk_resort_is_idempotent() {
        let mut topk = TopK::new(4, ScoreOrder::HigherIsBetter);
        for (pos, score) in [(0, 0.2), (1, 0.8), (2, 0.6), (3, 0.4), (4, 0.9)] {
            topk.offer(pos, score);
        }

        let sorted = topk.into_sorted();
        let mut resorted = sorted.clone();
        resorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        assert_eq!(positions(&sorted), positions(&resorted));
    }

    #[test]
    fn test_merge_partials_equals_global_topk() {
        // Simulate three partitions of one candidate set.
        let scores: Vec<f64> = (0..30).map(|i| ((i * 37) % 100) as f64 / 100.0).collect();

        let mut partials = Vec::new();
        for chunk_start in [0, 10, 20] {
            let mut local = TopK::new(5, ScoreOrder::HigherIsBetter);
            for (offset, &score) in scores[chunk_start..chunk_start + 10].iter().enumerate() {
                local.offer(chunk_start + offset, score);
            }
            partials.push(local.into_sorted());
        }

        let merged = merge_partials(&partials, 5, ScoreOrder::HigherIsBetter);

        let mut global = TopK::new(5, ScoreOrder::HigherIsBetter);
        for (pos, &score) in scores.iter().enumerate() {
            global.offer(pos, score);
        }
        let expected = global.into_sorted();

        assert_eq!(positions(&merged), positions(&expected));
    }

    #[test]
    fn test_merge_partials_handles_empty_inputs() {
        let partials: Vec<Vec<Scored>> = vec![
            Vec::new(),
            vec![Scored {
                position: 7,
                score: 0.5,
            }],
            Vec::new(),
        ];

        let merged = merge_partials(&partials, 3, ScoreOrder::HigherIsBetter);
        assert_eq!(positions(&merged), vec![7]);

        let merged = merge_partials(&[], 3, ScoreOrder::HigherIsBetter);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_respects_lower_is_better() {
        let partials = vec![
            vec![
                Scored {
                    position: 0,
                    score: 1.0,
                },
                Scored {
                    position: 1,
                    score: 4.0,
                },
            ],
            vec![
                Scored {
                    position: 2,
                    score: 2.0,
                },
                Scored {
                    position: 3,
                    score: 3.0,
                },
            ],
        ];

        let merged = merge_partials(&partials, 3, ScoreOrder::LowerIsBetter);
        assert_eq!(positions(&merged), vec![0, 2, 3]);
    }
}
