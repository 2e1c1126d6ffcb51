// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the configuration        (Layer 2)
//   Step 2: Generate training identities      (Layer 4 - data)
//   Step 3: Generate held-out identities and
//           split them into query / gallery   (Layer 4 - data)
//   Step 4: Open checkpoint + metrics outputs (Layer 6 - infra)
//   Step 5: Save config for evaluation        (Layer 6 - infra)
//   Step 6: Run the training loop             (Layer 5 - ml)

use anyhow::Result;

use crate::application::config::TrainConfig;
use crate::data::{
    dataset::{ReidDataset, ReidSample},
    splitter::split_query_gallery,
    synthetic::SyntheticIdentities,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, ScalarLogger},
};
use crate::ml::trainer::{run_training, RunOutputs, TrainData, TrainSummary};

/// Seed offset of the held-out identities, so they never share a
/// prototype with the training identities.
const HELD_OUT_SEED_OFFSET: u64 = 1_000_003;

pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Reject configs the steps cannot run ───────────────────────
        cfg.validate()?;
        tracing::info!("Training mode: {}", cfg.mode);

        // ── Steps 2-3: Data ───────────────────────────────────────────────────
        let data = build_train_data(cfg);
        tracing::info!(
            "{} training crops over {} identities; eval split {} query / {} gallery",
            data.train.samples().len(),
            data.train.num_identities(),
            data.query.len(),
            data.gallery.len()
        );

        // ── Step 4: Outputs ───────────────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let mut scalars = ScalarLogger::new(&cfg.checkpoint_dir)?;
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 5: Save config so `evaluate` can rebuild the net ─────────────
        checkpoints.save_config(cfg)?;

        // ── Step 6: Train ─────────────────────────────────────────────────────
        let summary = run_training(
            cfg,
            data,
            RunOutputs { checkpoints: &checkpoints, scalars: &mut scalars, metrics: &metrics },
        )?;
        scalars.flush()?;
        tracing::info!(
            "Checkpoints in '{}'; summaries in '{}' and '{}'",
            checkpoints.dir().display(),
            scalars.csv_path().display(),
            metrics.csv_path().display()
        );
        Ok(summary)
    }
}

/// Training identities `0..num_labels` plus the held-out retrieval split.
pub fn build_train_data(cfg: &TrainConfig) -> TrainData {
    let train = SyntheticIdentities::new(cfg.image, cfg.data.clone(), cfg.seed).generate(cfg.num_labels);
    let (query, gallery) = held_out_split(cfg);
    TrainData { train: ReidDataset::new(train, cfg.image), query, gallery }
}

/// Query / gallery crops of identities never seen in training. Deterministic
/// in the config, so `evaluate` rebuilds the split used during training.
pub fn held_out_split(cfg: &TrainConfig) -> (Vec<ReidSample>, Vec<ReidSample>) {
    let eval = &cfg.evaluation_params;
    if eval.num_identities == 0 {
        return (Vec::new(), Vec::new());
    }
    let crops = SyntheticIdentities::new(cfg.image, cfg.data.clone(), cfg.seed.wrapping_add(HELD_OUT_SEED_OFFSET))
        .generate(eval.num_identities);
    split_query_gallery(crops, eval.query_per_id)
}
