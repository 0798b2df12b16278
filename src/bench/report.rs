//! Throughput results and progress reporting.

use crate::params::TestCase;

/// Outcome of a completed test.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TestReport {
    pub test_case: TestCase,
    /// Bytes the test was configured to move.
    pub bytes: u32,
    /// Wall-clock duration, never below 1 ms.
    pub elapsed_ms: u32,
    /// Radio events lost on the way in while the test ran.
    pub dropped_events: u32,
}

impl TestReport {
    pub fn new(test_case: TestCase, bytes: u32, elapsed_ms: u32) -> Self {
        Self {
            test_case,
            bytes,
            elapsed_ms: elapsed_ms.max(1),
            dropped_events: 0,
        }
    }

    pub fn seconds(&self) -> f32 {
        self.elapsed_ms as f32 / 1000.0
    }

    /// Throughput in kbit/s (1 kbit = 1024 bit).
    pub fn kbit_per_sec(&self) -> f32 {
        (8.0 * self.bytes as f32) / self.seconds() / 1024.0
    }
}

/// Emits a status line roughly every tenth of the transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    next_mark: u32,
}

impl Progress {
    pub fn reset(&mut self) {
        self.next_mark = 0;
    }

    /// Returns the percentage once per crossed 10% mark.
    pub fn update(&mut self, done: u32, total: u32) -> Option<u32> {
        if total == 0 || done < self.next_mark {
            return None;
        }
        let step = (total / 10).max(1);
        let pct = (done as u64 * 100 / total as u64) as u32;
        self.next_mark = (done / step + 1).saturating_mul(step);
        Some(pct.min(100))
    }
}
