// ============================================================
// Layer 5 — Run Context and Periodic Hooks
// ============================================================
// What every training step needs besides tensors:
//   - the run configuration
//   - the global step counter
//   - a scalar sink for summaries
//   - where to checkpoint, and who evaluates
//
// Cadences used by the steps:
//   softmax / GAN logging   every 50 steps
//   triplet logging         every 10 steps, details every 100
//   checkpoint              every 1000 steps
//   evaluation              every evaluation_params.step steps

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;

use crate::application::config::TrainConfig;
use crate::domain::{ranking::EvalReport, traits::ScalarSink};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{evaluator::Evaluator, model::ReidNet};

pub const LOG_STEP:          usize = 50;
pub const TRIPLET_LOG_STEP:  usize = 10;
pub const TRIPLET_INFO_STEP: usize = 100;
pub const CHECKPOINT_STEP:   usize = 1000;

pub struct RunContext<'a, B: AutodiffBackend> {
    pub config:      &'a TrainConfig,
    pub global_step: usize,
    pub scalars:     &'a mut dyn ScalarSink,
    pub checkpoints: Option<&'a CheckpointManager>,
    pub evaluator:   Option<&'a dyn Evaluator<B>>,
    /// Most recent evaluation, kept for the epoch summary.
    pub last_eval:   Option<EvalReport>,
}

impl<'a, B: AutodiffBackend> RunContext<'a, B> {
    pub fn new(config: &'a TrainConfig, scalars: &'a mut dyn ScalarSink) -> Self {
        Self {
            config,
            global_step: 0,
            scalars,
            checkpoints: None,
            evaluator: None,
            last_eval: None,
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: &'a CheckpointManager) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_evaluator(mut self, evaluator: &'a dyn Evaluator<B>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Write one summary at the current global step.
    pub fn scalar(&mut self, tag: &str, value: f64) -> Result<()> {
        self.scalars.add_scalar(tag, value, self.global_step)
    }

    /// Evaluation is due when an evaluator exists and `step` lands on the
    /// configured evaluation cadence.
    pub fn evaluation_due(&self, step: usize) -> bool {
        match (self.evaluator, self.config.evaluation_params.step) {
            (Some(_), Some(every)) if every > 0 => step > 0 && step % every == 0,
            _ => false,
        }
    }
}

/// Checkpoint the re-ID net and/or run the evaluator.
///
/// `evaluate = false` only checkpoints; `save_ckpt = false` only evaluates.
pub fn save_and_evaluate<B: AutodiffBackend>(
    net:       &ReidNet<B>,
    ctx:       &mut RunContext<'_, B>,
    evaluate:  bool,
    save_ckpt: bool,
) -> Result<Option<EvalReport>> {
    if save_ckpt {
        if let Some(ckpt) = ctx.checkpoints {
            ckpt.save_reid::<B, ReidNet<B>>(net, ctx.global_step)?;
        }
    }

    if !evaluate {
        return Ok(None);
    }
    let Some(evaluator) = ctx.evaluator else {
        return Ok(None);
    };

    let report = evaluator.evaluate(net)?;
    tracing::info!(
        "[EVAL] global_step = {} rank1 = {:.4} rank5 = {:.4} mAP = {:.4} ({} queries)",
        ctx.global_step,
        report.rank1,
        report.rank5,
        report.map,
        report.valid_queries
    );
    ctx.scalar("eval_rank1", report.rank1)?;
    ctx.scalar("eval_mAP", report.map)?;
    ctx.last_eval = Some(report);
    Ok(Some(report))
}
