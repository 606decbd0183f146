use std::num::NonZeroUsize;

/// Counts committed records and decides when a batch must be flushed.
///
/// A flush is due once the pending count is strictly greater than the
/// threshold, so every full batch carries `threshold + 1` records.
#[derive(Debug, Clone)]
pub struct FlushController {
    threshold: usize,
    pending: usize,
}

impl FlushController {
    pub fn new(threshold: NonZeroUsize) -> Self {
        Self {
            threshold: threshold.get(),
            pending: 0,
        }
    }

    /// Count one committed record; returns `true` when a flush is due.
    pub fn record_committed(&mut self) -> bool {
        self.pending += 1;
        self.pending > self.threshold
    }

    /// Called right after the builder has been materialized.
    pub fn reset(&mut self) {
        self.pending = 0;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(threshold: usize) -> FlushController {
        FlushController::new(NonZeroUsize::new(threshold).unwrap())
    }

    #[test]
    fn test_flush_is_due_only_above_threshold() {
        let mut flush = controller(2);
        assert!(!flush.record_committed());
        assert!(!flush.record_committed());
        assert_eq!(flush.pending(), 2);
        assert!(flush.record_committed());
        assert_eq!(flush.pending(), 3);
    }

    #[test]
    fn test_reset_starts_a_new_cycle() {
        let mut flush = controller(1);
        assert!(!flush.record_committed());
        assert!(flush.record_committed());
        flush.reset();
        assert_eq!(flush.pending(), 0);
        assert!(!flush.record_committed());
        assert!(flush.record_committed());
    }
}
