// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores the newest re-ID checkpoint on the held-out split:
//
//   1. Load train_config.json  → rebuild the exact architecture
//   2. Load the latest reid checkpoint into it
//   3. Regenerate the query / gallery identities from the seed
//   4. Run retrieval evaluation (rank-1, rank-5, mAP)
//
// Runs on the plain Wgpu backend: no autodiff graph needed.

use anyhow::{bail, Result};

use crate::application::train_use_case::held_out_split;
use crate::domain::ranking::EvalReport;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{evaluator::retrieval_report, model::ReidNet};

type MyBackend = burn::backend::Wgpu;

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    batch_size:     usize,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, batch_size: usize) -> Self {
        Self { checkpoint_dir, batch_size }
    }

    /// Returns the report and the global step of the scored checkpoint.
    pub fn execute(&self) -> Result<(EvalReport, usize)> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let ckpt = CheckpointManager::new(&self.checkpoint_dir)?;
        let cfg = ckpt.load_config()?;

        let net: ReidNet<MyBackend> = cfg.reid_net_config().init(&device);
        let (net, step) = ckpt.load_latest_reid::<MyBackend, _>(net, &device)?;

        let (query, gallery) = held_out_split(&cfg);
        if query.is_empty() {
            bail!("evaluation_params.num_identities is 0 in '{}'", self.checkpoint_dir);
        }
        tracing::info!("Evaluating step {} on {} query / {} gallery crops", step, query.len(), gallery.len());

        let report = retrieval_report(&net, &query, &gallery, cfg.image, self.batch_size, &device)?;
        Ok((report, step))
    }
}
