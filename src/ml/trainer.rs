// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Drives the iteration functions in ml::steps for one of four
// modes:
//
//   softmax      — cross-entropy only
//   triplet      — triplet loss on P×K batches
//   gan          — cross-entropy, then a GAN iteration on the
//                  same batch
//   adversarial  — cross-entropy, then an adversarial
//                  iteration seeded with the batch features
//
// Key Burn 0.20 insight:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - Modules are updated functionally: optim.step returns the
//     new module, which replaces the old one
//   - Evaluation goes through net.valid() on the inner backend
//
// After the last epoch the re-ID net (and G / D in GAN modes)
// is checkpointed and evaluated once more.

use anyhow::{anyhow, Result};
use burn::{data::dataset::Dataset, optim::AdamConfig, tensor::backend::AutodiffBackend};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Instant;

use crate::application::config::TrainConfig;
use crate::data::{
    batcher::ReidBatcher,
    dataset::{ReidDataset, ReidSample},
    sampler::{PkSampler, ShuffledSampler},
};
use crate::domain::{
    mode::TrainMode,
    ranking::EvalReport,
    stats::RunningMean,
    timing::IterTiming,
    traits::ScalarSink,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    evaluator::RetrievalEvaluator,
    gan::init_gan_pair,
    hooks::{save_and_evaluate, RunContext},
    loss::LossSet,
    model::ReidNet,
    steps::{
        adversarial::run_iter_adv, gan::run_iter_gan, softmax::run_iter_softmax,
        triplet::run_iter_triplet_loss,
    },
};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Training crops plus the held-out retrieval split.
pub struct TrainData {
    pub train:   ReidDataset,
    pub query:   Vec<ReidSample>,
    pub gallery: Vec<ReidSample>,
}

/// Where a run writes its side outputs.
pub struct RunOutputs<'a> {
    pub checkpoints: &'a CheckpointManager,
    pub scalars:     &'a mut dyn ScalarSink,
    pub metrics:     &'a MetricsLogger,
}

#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub global_step: usize,
    pub epochs:      Vec<EpochMetrics>,
    pub final_eval:  Option<EvalReport>,
}

pub fn run_training(cfg: &TrainConfig, data: TrainData, outputs: RunOutputs<'_>) -> Result<TrainSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, data, outputs, &device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:     &TrainConfig,
    data:    TrainData,
    outputs: RunOutputs<'_>,
    device:  &B::Device,
) -> Result<TrainSummary> {
    B::seed(device, cfg.seed);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    // ── Networks and optimisers ───────────────────────────────────────────────
    let mut net: ReidNet<B> = cfg.reid_net_config().init(device);
    let mut optim = AdamConfig::new().init::<B, ReidNet<B>>();
    let losses = LossSet::from_params(&cfg.tri_loss_params, device);
    tracing::info!(
        "Re-ID net ready: mode={}, {} classes, feature_dim={}, pcb_n_parts={}, xent={}, triplet={}",
        cfg.mode,
        cfg.mode.classifier_width(cfg.num_labels),
        cfg.model_params.feature_dim,
        cfg.model_params.pcb_n_parts,
        losses.has_xent(),
        losses.has_triplet()
    );

    let mut pair = cfg
        .mode
        .uses_gan()
        .then(|| init_gan_pair::<B>(&cfg.gan_config(), cfg.gan_params.lr, device));

    // ── Batching ──────────────────────────────────────────────────────────────
    let dataset = &data.train;
    let batcher = ReidBatcher::<B>::new(device.clone(), dataset.shape());
    let shuffled = ShuffledSampler::new(dataset.len(), cfg.batch_size);
    let pk = PkSampler::new(
        dataset.indices_by_label().into_iter().map(|(_, idx)| idx).collect(),
        cfg.batch_sampling_params,
    );
    let batches_per_epoch = match cfg.mode {
        TrainMode::Triplet => pk.batches_per_epoch(),
        _ => shuffled.batches_per_epoch(),
    };
    if batches_per_epoch == 0 {
        return Err(anyhow!(
            "{} training crops are not enough for a single {} batch",
            dataset.len(),
            cfg.mode
        ));
    }
    tracing::info!("{} crops, {} batches per epoch", dataset.len(), batches_per_epoch);

    // ── Evaluation ────────────────────────────────────────────────────────────
    let evaluator = (!data.query.is_empty() && !data.gallery.is_empty()).then(|| RetrievalEvaluator::<B> {
        query:      data.query,
        gallery:    data.gallery,
        shape:      cfg.image,
        batch_size: cfg.effective_batch_size(),
        device:     device.clone(),
    });

    let metrics = outputs.metrics;
    let mut ctx = RunContext::new(cfg, outputs.scalars).with_checkpoints(outputs.checkpoints);
    if let Some(evaluator) = evaluator.as_ref() {
        ctx = ctx.with_evaluator(evaluator);
    }

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut history = Vec::with_capacity(cfg.epochs);
    let mut best_map = f64::NEG_INFINITY;

    for epoch in 0..cfg.epochs {
        let mut loss   = RunningMean::default();
        let mut d_loss = RunningMean::default();
        let mut g_loss = RunningMean::default();

        let order = match cfg.mode {
            TrainMode::Triplet => pk.epoch(&mut rng),
            _ => shuffled.epoch(&mut rng),
        };

        for (step, indices) in order.iter().enumerate() {
            let iter_start = Instant::now();
            let items = indices
                .iter()
                .map(|&i| dataset.get(i).ok_or_else(|| anyhow!("sample index {} out of range", i)))
                .collect::<Result<Vec<ReidSample>>>()?;
            let batch = batcher.batch(&items.iter().collect::<Vec<_>>())?;
            let timing = IterTiming::new(iter_start, Instant::now());

            if cfg.mode == TrainMode::Triplet {
                let stats = run_iter_triplet_loss(&batch, &mut net, &losses, &mut optim, timing, &mut ctx)?;
                loss.push(stats.loss);
                continue;
            }

            ctx.global_step += 1;
            let outcome = run_iter_softmax(
                &batch, step, epoch, &mut net, &losses, &mut optim, timing, None, &mut ctx,
            )?;
            loss.push(outcome.stats.loss);

            let gan = match cfg.mode {
                TrainMode::Gan => {
                    let pair = pair.as_mut().ok_or_else(|| anyhow!("GAN mode without a generator"))?;
                    Some(run_iter_gan(&batch, step, epoch, pair, Some((&net, &losses)), &mut rng, &mut ctx)?)
                }
                TrainMode::Adversarial => {
                    let pair = pair.as_mut().ok_or_else(|| anyhow!("adversarial mode without a generator"))?;
                    let adv = run_iter_adv(
                        &batch, outcome.features, step, epoch, &mut net, &losses, &mut optim, pair, &mut rng,
                        &mut ctx,
                    )?;
                    Some(adv.gan)
                }
                _ => None,
            };
            if let Some(gan) = gan {
                d_loss.push(gan.loss_real + gan.loss_fake);
                g_loss.push(gan.loss_g);
            }
        }

        let eval = ctx.last_eval;
        let row = EpochMetrics {
            epoch,
            global_step: ctx.global_step,
            loss:        loss.mean(),
            d_loss:      d_loss.mean(),
            g_loss:      g_loss.mean(),
            rank1:       eval.map_or(f64::NAN, |r| r.rank1),
            map:         eval.map_or(f64::NAN, |r| r.map),
        };
        metrics.log(&row)?;
        if row.is_improvement(best_map) {
            best_map = row.map;
            tracing::info!("New best mAP {:.4} at epoch {}", row.map, epoch);
        }
        tracing::info!(
            "Epoch {:>3}/{} | {} iters | global_step={} | loss={:.4} | d_loss={:.4} | g_loss={:.4}",
            epoch + 1, cfg.epochs, loss.count(), row.global_step, row.loss, row.d_loss, row.g_loss
        );
        history.push(row);
    }

    // ── Final checkpoint and evaluation ───────────────────────────────────────
    let final_eval = save_and_evaluate(&net, &mut ctx, true, true)?;
    if let Some(pair) = pair.as_ref() {
        let ckpt = outputs.checkpoints;
        ckpt.save_module::<B, _>("generator", &pair.generator, ctx.global_step)?;
        ckpt.save_module::<B, _>("discriminator", &pair.discriminator, ctx.global_step)?;
    }

    tracing::info!("Training complete after {} steps", ctx.global_step);
    Ok(TrainSummary { global_step: ctx.global_step, epochs: history, final_eval })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::application::train_use_case::build_train_data;
    use crate::domain::traits::MemorySink;
    use crate::ml::steps::test_support::tiny_config;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn train(cfg: &TrainConfig) -> (TrainSummary, MemorySink, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let mut sink = MemorySink::default();
        let summary = train_loop::<TestBackend>(
            cfg,
            build_train_data(cfg),
            RunOutputs { checkpoints: &checkpoints, scalars: &mut sink, metrics: &metrics },
            &Default::default(),
        )
        .unwrap();
        (summary, sink, dir)
    }

    #[test]
    fn test_softmax_run_checkpoints_and_evaluates() {
        let cfg = TrainConfig { epochs: 2, ..tiny_config() };
        let (summary, sink, dir) = train(&cfg);

        // 16 crops, batch 8
        assert_eq!(summary.global_step, 4);
        assert_eq!(summary.epochs.len(), 2);
        assert!(summary.epochs.iter().all(|e| e.loss.is_finite() && e.d_loss.is_nan()));
        let eval = summary.final_eval.unwrap();
        assert!((0.0..=1.0).contains(&eval.rank1));
        assert_eq!(sink.values("eval_mAP").len(), 1);

        let checkpoints = CheckpointManager::new(dir.path()).unwrap();
        assert_eq!(checkpoints.latest_step().unwrap(), 4);
        let text = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_triplet_run_uses_pk_batches() {
        let mut cfg = TrainConfig { mode: TrainMode::Triplet, ..tiny_config() };
        cfg.tri_loss_params.margin = 0.3;
        cfg.batch_sampling_params.p = 2;
        let (summary, _, _) = train(&cfg);
        // 4 identities / P=2
        assert_eq!(summary.global_step, 2);
        assert!(summary.epochs[0].loss.is_finite());
    }

    #[test]
    fn test_gan_run_saves_generator_and_discriminator() {
        let cfg = TrainConfig { mode: TrainMode::Gan, ..tiny_config() };
        let (summary, _, dir) = train(&cfg);
        assert!(summary.epochs[0].d_loss.is_finite());
        assert!(summary.epochs[0].g_loss.is_finite());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("generator_step_2")));
        assert!(names.iter().any(|n| n.starts_with("discriminator_step_2")));
    }

    #[test]
    fn test_adversarial_run_completes() {
        let cfg = TrainConfig { mode: TrainMode::Adversarial, ..tiny_config() };
        let (summary, _, _) = train(&cfg);
        assert_eq!(summary.global_step, 2);
        assert!(summary.epochs[0].g_loss.is_finite());
    }

    #[test]
    fn test_too_few_crops_is_an_error() {
        let cfg = TrainConfig { batch_size: 64, ..tiny_config() };
        let dir = tempfile::tempdir().unwrap();
        let checkpoints = CheckpointManager::new(dir.path()).unwrap();
        let metrics = MetricsLogger::new(dir.path()).unwrap();
        let mut sink = MemorySink::default();
        let res = train_loop::<TestBackend>(
            &cfg,
            build_train_data(&cfg),
            RunOutputs { checkpoints: &checkpoints, scalars: &mut sink, metrics: &metrics },
            &Default::default(),
        );
        assert!(res.is_err());
    }
}
