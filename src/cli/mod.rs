// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with clap.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains the re-ID net in one of four modes
//   2. `evaluate` — scores the latest checkpoint (rank-1/5, mAP)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

use crate::application::config::TrainConfig;

#[derive(Parser, Debug)]
#[command(
    name = "reid-gan-train",
    version = "0.1.0",
    about = "Train a person re-ID net with softmax, triplet, GAN or adversarial objectives."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let cfg = TrainConfig::try_from(args)?;
    tracing::info!("Starting {} training, outputs in '{}'", cfg.mode, cfg.checkpoint_dir);

    let summary = TrainUseCase::new(cfg).execute()?;
    match summary.final_eval {
        Some(r) => println!(
            "Training complete after {} steps. rank-1 = {:.2}%  rank-5 = {:.2}%  mAP = {:.2}%",
            summary.global_step,
            r.rank1 * 100.0,
            r.rank5 * 100.0,
            r.map * 100.0
        ),
        None => println!("Training complete after {} steps. Checkpoint saved.", summary.global_step),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let (r, step) = EvaluateUseCase::new(args.checkpoint_dir, args.batch_size).execute()?;
    println!(
        "Step {}: rank-1 = {:.2}%  rank-5 = {:.2}%  mAP = {:.2}%  ({} queries)",
        step,
        r.rank1 * 100.0,
        r.rank5 * 100.0,
        r.map * 100.0,
        r.valid_queries
    );
    Ok(())
}
