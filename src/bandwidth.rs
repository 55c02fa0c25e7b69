// Bandwidth estimation from cumulative byte counters.
//
// Each sample becomes the baseline for the next, even when the elapsed time
// is shorter than one interval and the sample reports 0.

use crate::models::InterfaceCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// Baseline for one byte counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterState {
    pub prev_bytes: u64,
    /// Time of the previous sample in microseconds; `None` before the first one.
    pub last_sample_usec: Option<u64>,
}

impl CounterState {
    /// Returns bits per interval since the previous sample.
    ///
    /// The first sample only records a baseline. Less than one whole
    /// interval since the previous sample yields 0.
    pub fn estimate(&mut self, current_bytes: u64, now_usec: u64, interval_usec: u64) -> u64 {
        let Some(last) = self.last_sample_usec.replace(now_usec) else {
            self.prev_bytes = current_bytes;
            return 0;
        };
        let bits = current_bytes.saturating_sub(self.prev_bytes).saturating_mul(8);
        self.prev_bytes = current_bytes;

        let intervals = now_usec.saturating_sub(last) / interval_usec.max(1);
        if intervals == 0 {
            return 0;
        }
        bits / intervals
    }
}

/// In/out baselines for one interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthState {
    pub rx: CounterState,
    pub tx: CounterState,
}

impl BandwidthState {
    pub fn estimate(
        &mut self,
        counters: &InterfaceCounters,
        dir: Direction,
        now_usec: u64,
        interval_usec: u64,
    ) -> u64 {
        match dir {
            Direction::In => self.rx.estimate(counters.in_bytes, now_usec, interval_usec),
            Direction::Out => self.tx.estimate(counters.out_bytes, now_usec, interval_usec),
        }
    }
}
