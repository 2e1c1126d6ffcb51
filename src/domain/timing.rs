// ============================================================
// Layer 3 — Iteration Timing
// ============================================================
// Each iteration records two instants:
//
//   iter_start   — before the batch was fetched
//   io_finished  — once the batch was on the device
//
// The time from io_finished to the logging point is counted as
// compute ("gpu") time. Throughput is reported over the whole
// iteration.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct IterTiming {
    pub iter_start:  Instant,
    pub io_finished: Instant,
}

/// Throughput figures for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub examples_per_sec: f64,
    /// Fraction in [0, 1] of the iteration spent waiting on data.
    pub io_percentage: f64,
}

impl IterTiming {
    pub fn new(iter_start: Instant, io_finished: Instant) -> Self {
        Self { iter_start, io_finished }
    }

    pub fn throughput(&self, batch_size: usize, step_finished: Instant) -> Throughput {
        let gpu_time = step_finished
            .saturating_duration_since(self.io_finished)
            .as_secs_f64();
        let io_time = self
            .io_finished
            .saturating_duration_since(self.iter_start)
            .as_secs_f64();
        Throughput::from_secs(batch_size, io_time, gpu_time)
    }
}

impl Throughput {
    pub fn from_secs(batch_size: usize, io_time: f64, gpu_time: f64) -> Self {
        let total = io_time + gpu_time;
        // Instants can coincide on coarse clocks.
        if total <= 0.0 {
            return Self { examples_per_sec: 0.0, io_percentage: 0.0 };
        }
        Self {
            examples_per_sec: batch_size as f64 / total,
            io_percentage:    io_time / total,
        }
    }
}
