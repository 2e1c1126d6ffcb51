// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training steps write scalar summaries (loss, accuracy,
// triplet statistics) keyed by the global step. They only see
// this trait, so the sink can be a CSV file, an in-memory
// recorder in tests, or a dashboard exporter later.

use anyhow::Result;

// ─── ScalarSink ──────────────────────────────────────────────────────────────
/// Anything that records `(tag, value)` pairs at a global step.
///
/// Implementations:
///   - ScalarLogger   → appends rows to `scalars.csv`
///   - MemorySink     → keeps rows in a Vec (tests)
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}

// ─── MemorySink ──────────────────────────────────────────────────────────────
/// Keeps every scalar in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub rows: Vec<(String, f64, usize)>,
}

impl MemorySink {
    /// All values recorded under `tag`, in write order.
    pub fn values(&self, tag: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, _)| *v)
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.rows.push((tag.to_string(), value, step));
        Ok(())
    }
}
