use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{Semaphore, SemaphorePermit};

/// Bounds in-flight slice execution to `maxParallelSlices` (spec §4.3 step
/// 3, §5 "Within a run"). The semaphore is the actual gate; the atomic
/// counters mirror the teacher's cost-tracker shape so callers can log
/// concurrency the same way a budget tracker logs spend.
pub struct SliceBudget {
    permits: Semaphore,
    in_flight: AtomicU32,
    peak: AtomicU32,
}

impl SliceBudget {
    pub fn new(max_parallel_slices: u32) -> Self {
        Self {
            permits: Semaphore::new(max_parallel_slices.max(1) as usize),
            in_flight: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    /// Acquire one slot. Blocks (async) until a slot is free.
    pub async fn acquire(&self) -> SlicePermit<'_> {
        let permit = self.permits.acquire().await.expect("semaphore never closed");
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        SlicePermit { _permit: permit, budget: self }
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

/// RAII guard releasing the slot on drop.
pub struct SlicePermit<'a> {
    _permit: SemaphorePermit<'a>,
    budget: &'a SliceBudget,
}

impl Drop for SlicePermit<'_> {
    fn drop(&mut self) {
        self.budget.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn bounds_in_flight_to_max_parallel() {
        let budget = Arc::new(SliceBudget::new(2));
        let mut handles = Vec::new();
        for _ in 0 .. 5 {
            let budget = budget.clone();
            handles.push(tokio::spawn(async move {
                let _permit = budget.acquire().await;
                assert!(budget.in_flight() <= 2);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(budget.peak_in_flight() <= 2);
    }
}
