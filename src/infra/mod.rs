// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Handles all cross-cutting concerns that don't belong in
// any specific business layer:
//
//   checkpoint.rs — Saving and loading network weights
//                   Uses Burn's CompactRecorder to serialise
//                   module records to disk. Also saves/loads
//                   TrainConfig as JSON so `evaluate` can
//                   rebuild the network.
//
//   metrics.rs    — Summaries and epoch metrics
//                   scalars.csv receives every tagged scalar
//                   the training steps emit; metrics.csv gets
//                   one row per epoch.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Scalar summaries and epoch metrics CSV loggers
pub mod metrics;
