use anyhow::Result;
use burn::{
    optim::{GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use std::time::Instant;

use crate::data::batcher::ReidBatch;
use crate::domain::{stats::TripletStats, timing::IterTiming};
use crate::ml::{
    hooks::{save_and_evaluate, RunContext, CHECKPOINT_STEP, TRIPLET_INFO_STEP, TRIPLET_LOG_STEP},
    loss::{batch_accuracy, scalar, xent_loss, LossSet},
    model::ReidNet,
};

/// One triplet-loss iteration on a P×K batch.
///
/// Advances the global step first and uses it for every cadence. With
/// `lambda_cls > 0` the objective is
/// `lambda_cls * cross_entropy + lambda_tri * triplet`, otherwise the plain
/// triplet loss.
pub fn run_iter_triplet_loss<B, O>(
    batch:  &ReidBatch<B>,
    net:    &mut ReidNet<B>,
    losses: &LossSet<B>,
    optim:  &mut O,
    timing: IterTiming,
    ctx:    &mut RunContext<'_, B>,
) -> Result<TripletStats>
where
    B: AutodiffBackend,
    O: Optimizer<ReidNet<B>, B>,
{
    let cfg = ctx.config;
    let params = &cfg.tri_loss_params;

    ctx.global_step += 1;
    let step = ctx.global_step;

    let output = net.forward(batch.images.clone());
    let tri = losses.triplet()?.forward(output.features, batch.labels.clone())?;
    let triplet_value = scalar(&tri.loss);

    let joint = params.lambda_cls > 0.0;
    let (loss, xent_value) = if joint {
        let loss_cls = xent_loss(losses.xent()?, &output.logits, batch.labels.clone())?;
        let xent_value = scalar(&loss_cls);
        let loss = loss_cls.mul_scalar(params.lambda_cls) + tri.loss.mul_scalar(params.lambda_tri);
        (loss, Some(xent_value))
    } else {
        (tri.loss, None)
    };
    let loss_value = scalar(&loss);

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &*net);
    *net = optim.step(cfg.lr, net.clone(), grads);

    let stats = TripletStats {
        loss:           loss_value,
        triplet_loss:   triplet_value,
        xent_loss:      xent_value,
        pull_ratio:     tri.pull_ratio,
        active_triplet: tri.active_triplet,
        mean_dist_an:   tri.mean_dist_an,
        mean_dist_ap:   tri.mean_dist_ap,
    };

    if step % TRIPLET_LOG_STEP == 0 {
        let t = timing.throughput(cfg.effective_batch_size(), Instant::now());
        match stats.xent_loss {
            Some(xent) => tracing::info!(
                "global_step = {} tri_loss = {:.4} xent_loss = {:.4} example/sec = {:.3}, io_percentage = {:.3}",
                step, triplet_value, xent, t.examples_per_sec, t.io_percentage
            ),
            None => tracing::info!(
                "global_step = {} loss = {:.4} example/sec = {:.3}, io_percentage = {:.3}",
                step, loss_value, t.examples_per_sec, t.io_percentage
            ),
        }

        ctx.scalar("loss", loss_value as f64)?;
        ctx.scalar("AN_lt_AP_ratio", stats.pull_ratio as f64)?;
        ctx.scalar("Active_Triplet", stats.active_triplet as f64)?;
        ctx.scalar("Mean_Dist_Difference", stats.mean_dist_difference() as f64)?;
    }

    if step % TRIPLET_INFO_STEP == 0 {
        tracing::info!(
            "[TRI_LOSS_INFO] AN > AP: {:.2}%; ACTIVE_TRIPLET: {}; MEAN_DIST_AN: {:.2}; MEAN_DIST_AP: {:.2}",
            stats.pull_ratio,
            stats.active_triplet,
            stats.mean_dist_an,
            stats.mean_dist_ap
        );

        if joint {
            let acc = batch_accuracy(&output.logits, batch.labels.clone())?;
            tracing::info!("train_accuracy: {:.5}", acc);
        }
    }

    if step % CHECKPOINT_STEP == 0 {
        save_and_evaluate(net, ctx, false, true)?;
    }

    if ctx.evaluation_due(step) {
        save_and_evaluate(net, ctx, true, false)?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::AdamConfig,
    };

    use crate::application::config::TrainConfig;
    use crate::domain::{mode::TrainMode, traits::MemorySink};
    use crate::infra::checkpoint::CheckpointManager;
    use crate::ml::steps::test_support::{tiny_batch, tiny_config, CountingEvaluator};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn triplet_config(lambda_cls: f32) -> TrainConfig {
        let mut cfg = TrainConfig { mode: TrainMode::Triplet, lr: 1e-2, ..tiny_config() };
        cfg.tri_loss_params.margin = 0.5;
        cfg.tri_loss_params.lambda_cls = lambda_cls;
        cfg
    }

    fn run(cfg: &TrainConfig, iters: usize) -> (Vec<TripletStats>, MemorySink) {
        let device = Default::default();
        let mut net = cfg.reid_net_config().init::<TestBackend>(&device);
        let losses = LossSet::from_params(&cfg.tri_loss_params, &device);
        let mut optim = AdamConfig::new().init::<TestBackend, ReidNet<TestBackend>>();
        let batch = tiny_batch::<TestBackend>(cfg);

        let mut sink = MemorySink::default();
        let mut all = Vec::new();
        {
            let mut ctx = RunContext::new(cfg, &mut sink);
            for _ in 0..iters {
                let now = Instant::now();
                all.push(
                    run_iter_triplet_loss(&batch, &mut net, &losses, &mut optim, IterTiming::new(now, now), &mut ctx)
                        .unwrap(),
                );
            }
            assert_eq!(ctx.global_step, iters);
        }
        (all, sink)
    }

    #[test]
    fn test_triplet_only_objective() {
        let (stats, sink) = run(&triplet_config(0.0), 10);
        assert!(stats.iter().all(|s| s.xent_loss.is_none()));
        assert!((stats[0].loss - stats[0].triplet_loss).abs() < 1e-6);
        // one summary block at global step 10
        assert_eq!(sink.values("AN_lt_AP_ratio").len(), 1);
        assert_eq!(sink.values("Mean_Dist_Difference").len(), 1);
    }

    #[test]
    fn test_joint_objective_weights_both_terms() {
        let mut cfg = triplet_config(2.0);
        cfg.tri_loss_params.lambda_tri = 0.5;
        let (stats, _) = run(&cfg, 1);
        let s = stats[0];
        let xent = s.xent_loss.unwrap();
        assert!((s.loss - (2.0 * xent + 0.5 * s.triplet_loss)).abs() < 1e-4);
    }

    #[test]
    fn test_training_separates_identities() {
        let (stats, _) = run(&triplet_config(0.0), 40);
        let first = stats.first().unwrap();
        let last = stats.last().unwrap();
        assert!(last.loss <= first.loss);
    }

    #[test]
    fn test_cadence_follows_global_step() {
        let mut cfg = triplet_config(0.0);
        cfg.evaluation_params.step = Some(7);
        let device = Default::default();
        let mut net = cfg.reid_net_config().init::<TestBackend>(&device);
        let losses = LossSet::from_params(&cfg.tri_loss_params, &device);
        let mut optim = AdamConfig::new().init::<TestBackend, ReidNet<TestBackend>>();
        let batch = tiny_batch::<TestBackend>(&cfg);
        let dir = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let evaluator = CountingEvaluator::default();
        let mut sink = MemorySink::default();
        let mut ctx = RunContext::<TestBackend>::new(&cfg, &mut sink)
            .with_checkpoints(&ckpt)
            .with_evaluator(&evaluator);

        // global step before the call; the step advances it by one
        for (before, evals, latest) in [(0, 0, None), (6, 1, None), (999, 1, Some(1000))] {
            ctx.global_step = before;
            let now = Instant::now();
            run_iter_triplet_loss(&batch, &mut net, &losses, &mut optim, IterTiming::new(now, now), &mut ctx)
                .unwrap();
            assert_eq!(ctx.global_step, before + 1);
            assert_eq!(evaluator.calls.get(), evals, "global step {}", before + 1);
            assert_eq!(ckpt.latest_step().ok(), latest, "global step {}", before + 1);
        }
    }
}
