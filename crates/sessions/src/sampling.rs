use std::num::NonZeroU64;

/// Decides which metrics events are written to the store.
///
/// Every event is broadcast; only every `interval`-th event of a session
/// (by its 1-based sequence number) is persisted, so a run of `M` events
/// yields `M / interval` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingPolicy {
    interval: NonZeroU64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self::every(10)
    }
}

impl SamplingPolicy {
    /// Persist every `n`-th event.  `0` is treated as `1`.
    pub fn every(n: u64) -> Self {
        Self {
            interval: NonZeroU64::new(n).unwrap_or(NonZeroU64::MIN),
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval.get()
    }

    pub fn should_persist(&self, sequence: u64) -> bool {
        sequence != 0 && sequence % self.interval.get() == 0
    }
}
