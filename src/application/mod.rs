// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training or evaluating a checkpoint).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination and run configuration

/// Hyperparameters of a run, saved next to the checkpoints
pub mod config;

// The training workflow
pub mod train_use_case;

// Retrieval evaluation of a saved checkpoint
pub mod evaluate_use_case;
