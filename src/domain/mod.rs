// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types that describe a training run without
// touching Burn:
//
//   mode.rs    — which objective drives the run
//   stats.rs   — per-iteration loss / accuracy readings
//   timing.rs  — io vs compute split of an iteration
//   ranking.rs — CMC / mAP over a query × gallery distance matrix
//   traits.rs  — seams implemented by the infra layer
//
// Nothing here needs a GPU, so everything is unit tested
// directly.

pub mod mode;
pub mod stats;
pub mod timing;
pub mod ranking;
pub mod traits;
