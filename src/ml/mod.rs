// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network, loss and optimisation code lives here.
//
//   model.rs      — re-ID net: MLP embedding, one identity
//                   head or PCB part heads
//   gan.rs        — generator / discriminator and their
//                   optimisers
//   triplet.rs    — triplet loss with hard mining or adaptive
//                   weights
//   loss.rs       — loss set, cross-entropy over heads, batch
//                   accuracy, discriminator and re-ID losses
//   evaluator.rs  — retrieval evaluation (CMC, mAP)
//   hooks.rs      — run context, logging / checkpoint cadence
//   steps/        — one function per kind of training iteration
//   trainer.rs    — epoch loop dispatching on the training mode
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

pub mod model;

pub mod gan;

pub mod triplet;

pub mod loss;

pub mod evaluator;

pub mod hooks;

pub mod steps;

/// Full training loop with evaluation and checkpointing
pub mod trainer;
