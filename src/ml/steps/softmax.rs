use anyhow::{bail, Result};
use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::time::Instant;

use crate::data::batcher::ReidBatch;
use crate::domain::{stats::SoftmaxStats, timing::IterTiming};
use crate::ml::{
    hooks::{save_and_evaluate, RunContext, CHECKPOINT_STEP, LOG_STEP},
    loss::{batch_accuracy, scalar, xent_loss, LossSet},
    model::ReidNet,
};

pub struct SoftmaxOutcome<B: AutodiffBackend> {
    /// Detached batch features, e.g. to seed the generator.
    pub features: Tensor<B, 2>,
    pub stats:    SoftmaxStats,
}

/// One cross-entropy iteration.
///
/// `step` is the iteration within the epoch and drives the logging,
/// checkpoint and evaluation cadences; summaries are written at the
/// context's global step. With `unlabeled_buffer` ([feature_dim, M]) the
/// logits are extended by `features · buffer`, so the M stored features act
/// as extra negative classes.
pub fn run_iter_softmax<B, O>(
    batch:            &ReidBatch<B>,
    step:             usize,
    epoch:            usize,
    net:              &mut ReidNet<B>,
    losses:           &LossSet<B>,
    optim:            &mut O,
    timing:           IterTiming,
    unlabeled_buffer: Option<Tensor<B, 2>>,
    ctx:              &mut RunContext<'_, B>,
) -> Result<SoftmaxOutcome<B>>
where
    B: AutodiffBackend,
    O: Optimizer<ReidNet<B>, B>,
{
    let cfg = ctx.config;

    let output = net.forward(batch.images.clone());
    let features = output.features.clone().detach();

    let mut outputs = output.logits;
    if let Some(buffer) = unlabeled_buffer {
        if outputs.len() != 1 {
            bail!("an unlabeled feature buffer needs a single classifier head");
        }
        let logit_un = output.features.matmul(buffer);
        outputs = vec![Tensor::cat(vec![outputs.remove(0), logit_un], 1)];
    }

    let criterion = losses.xent()?;
    let loss = xent_loss(criterion, &outputs, batch.labels.clone())?;
    let loss_value = scalar(&loss);

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &*net);
    *net = optim.step(cfg.lr, net.clone(), grads);

    let mut stats = SoftmaxStats { loss: loss_value, batch_acc: None };

    if step > 0 && step % LOG_STEP == 0 {
        let t = timing.throughput(cfg.batch_size, Instant::now());
        let batch_acc = batch_accuracy(&outputs, batch.labels.clone())?;
        stats.batch_acc = Some(batch_acc);

        tracing::info!(
            "epoch [{:03}] iter = {} loss = {:.4} acc = {:.5} example/sec = {:.3}, io_percentage = {:.3}",
            epoch,
            step,
            loss_value,
            batch_acc,
            t.examples_per_sec,
            t.io_percentage
        );

        ctx.scalar("loss", loss_value as f64)?;
        ctx.scalar("batch_accuracy", batch_acc as f64)?;
    }

    if step > 0 && step % CHECKPOINT_STEP == 0 {
        save_and_evaluate(net, ctx, false, true)?;
    }

    if ctx.evaluation_due(step) {
        save_and_evaluate(net, ctx, true, false)?;
    }

    Ok(SoftmaxOutcome { features, stats })
}
