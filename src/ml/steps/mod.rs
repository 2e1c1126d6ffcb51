// ============================================================
// Layer 5 — Training Iterations
// ============================================================
// One function per kind of iteration. Each takes the batch,
// the networks and optimizers it updates, and the RunContext,
// and returns the statistics it measured:
//
//   softmax.rs      — cross-entropy (optionally PCB, optionally
//                     with an unlabeled feature buffer)
//   triplet.rs      — batch-hard / adaptive triplet loss on P×K
//                     batches, optionally joint with cross-entropy
//   gan.rs          — generator / discriminator on random codes
//   adversarial.rs  — generator fed re-ID features; the re-ID net
//                     learns to label generated crops as a
//                     separate set of classes

pub mod softmax;

pub mod triplet;

pub mod gan;

pub mod adversarial;

#[cfg(test)]
pub mod test_support {
    use anyhow::Result;
    use burn::tensor::backend::{AutodiffBackend, Backend};
    use std::cell::Cell;

    use crate::domain::ranking::EvalReport;
    use crate::ml::{evaluator::Evaluator, model::ReidNet};

    use crate::application::config::TrainConfig;
    use crate::data::{
        batcher::{ReidBatch, ReidBatcher},
        dataset::{ImageShape, ReidSample},
        sampler::BatchSamplingParams,
        synthetic::{SyntheticIdentities, SyntheticParams},
    };

    /// A run small enough to train a few iterations on the CPU backend.
    pub fn tiny_config() -> TrainConfig {
        let mut cfg = TrainConfig {
            num_labels: 4,
            batch_size: 8,
            epochs:     1,
            image:      ImageShape { channels: 1, height: 4, width: 2 },
            data:       SyntheticParams { images_per_id: 4, noise: 0.1 },
            batch_sampling_params: BatchSamplingParams { p: 4, k: 2 },
            ..Default::default()
        };
        cfg.model_params.feature_dim = 8;
        cfg.model_params.hidden_dim = 16;
        cfg.gan_params.input_dim = 8;
        cfg.gan_params.hidden_dim = 16;
        cfg.evaluation_params.step = None;
        cfg.evaluation_params.num_identities = 3;
        cfg
    }

    /// Four identities, two crops each.
    pub fn tiny_batch<B: Backend>(cfg: &TrainConfig) -> ReidBatch<B> {
        let samples = SyntheticIdentities::new(cfg.image, SyntheticParams { images_per_id: 2, noise: 0.1 }, 7)
            .generate(4);
        let refs: Vec<&ReidSample> = samples.iter().collect();
        ReidBatcher::<B>::new(Default::default(), cfg.image)
            .batch(&refs)
            .unwrap()
    }

    /// Counts calls and returns an empty report.
    #[derive(Default)]
    pub struct CountingEvaluator {
        pub calls: Cell<usize>,
    }

    impl<B: AutodiffBackend> Evaluator<B> for CountingEvaluator {
        fn evaluate(&self, _net: &ReidNet<B>) -> Result<EvalReport> {
            self.calls.set(self.calls.get() + 1);
            Ok(EvalReport::default())
        }
    }
}
