use core::sync::atomic::{AtomicU64, Ordering};

/// Per-category success counts for the current reporting window.
///
/// Writers bump a category's counter with a single atomic add. The monitor
/// takes a window with an atomic swap per counter, so every increment is
/// observed by exactly one snapshot. Neither side ever waits on a lock.
pub struct SuccessAggregator {
    counts: Box<[AtomicU64]>,
}

impl SuccessAggregator {
    pub fn new(categories: usize) -> Self {
        Self {
            counts: (0..categories).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Records a success for the category at `index`. Unknown indices are
    /// ignored.
    pub fn increment(&self, index: usize) {
        if let Some(count) = self.counts.get(index) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns the counts for every category, in sample-space order, and
    /// starts a new window at zero.
    pub fn snapshot_and_reset(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|count| count.swap(0, Ordering::AcqRel))
            .collect()
    }
}
