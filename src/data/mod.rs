// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between "identity crops" and device tensors:
//
//   SyntheticIdentities → prototype + noise crops per identity
//       │
//       ▼
//   ReidDataset         → implements Burn's Dataset trait
//       │
//       ▼
//   ShuffledSampler /   → index batches per epoch
//   PkSampler
//       │
//       ▼
//   ReidBatcher         → [N, C, H, W] images + [N] labels
//
// split_query_gallery carves the evaluation sets.

/// Deterministic synthetic person crops
pub mod synthetic;

/// Burn Dataset over re-ID samples
pub mod dataset;

/// Sample list → tensor batch
pub mod batcher;

/// Shuffled and P×K class-balanced batch sampling
pub mod sampler;

/// Query / gallery split for retrieval evaluation
pub mod splitter;
