// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags.
//
// `train` starts from a JSON config (--config) or the defaults;
// every flag given on the command line overrides that value.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::application::config::TrainConfig;
use crate::domain::mode::TrainMode;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the re-ID net (optionally with a GAN) on synthetic identities
    Train(TrainArgs),

    /// Score the latest checkpoint on the held-out identities
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON file with a full TrainConfig; flags below override it
    #[arg(long)]
    pub config: Option<String>,

    /// softmax, triplet, gan or adversarial
    #[arg(long, value_enum)]
    pub mode: Option<TrainMode>,

    /// Directory for checkpoints, train_config.json and CSV metrics
    #[arg(long)]
    pub checkpoint_dir: Option<String>,

    /// Number of training identities
    #[arg(long)]
    pub num_labels: Option<usize>,

    /// Mini-batch size (triplet mode uses P×K instead)
    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub epochs: Option<usize>,

    /// Learning rate of the re-ID net
    #[arg(long)]
    pub lr: Option<f64>,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub feature_dim: Option<usize>,

    /// Number of PCB parts; 0 keeps a single classifier
    #[arg(long)]
    pub pcb_n_parts: Option<usize>,

    /// Triplet margin; > 0 enables the triplet loss
    #[arg(long)]
    pub margin: Option<f32>,

    /// Soft positive/negative weighting instead of hard mining
    #[arg(long)]
    pub use_adaptive_weight: bool,

    /// Cross-entropy weight in triplet mode; 0 disables the joint loss
    #[arg(long)]
    pub lambda_cls: Option<f32>,

    #[arg(long)]
    pub lambda_tri: Option<f32>,

    /// Identities per triplet batch
    #[arg(long)]
    pub p: Option<usize>,

    /// Crops per identity in a triplet batch
    #[arg(long)]
    pub k: Option<usize>,

    /// Generator input size
    #[arg(long)]
    pub gan_input_dim: Option<usize>,

    /// Probability of updating the discriminator in an iteration
    #[arg(long)]
    pub d_update_freq: Option<f64>,

    /// Also train G towards identity-preserving images (gan mode)
    #[arg(long)]
    pub adv_train: bool,

    #[arg(long)]
    pub gan_lr: Option<f64>,

    /// Evaluate every N steps
    #[arg(long)]
    pub eval_step: Option<usize>,

    /// Held-out identities for evaluation; 0 disables it
    #[arg(long)]
    pub eval_identities: Option<usize>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// Fallible because --config is read from disk.
impl TryFrom<TrainArgs> for TrainConfig {
    type Error = anyhow::Error;

    fn try_from(a: TrainArgs) -> Result<Self> {
        let mut cfg = match &a.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(v) = a.mode { cfg.mode = v; }
        if let Some(v) = a.checkpoint_dir { cfg.checkpoint_dir = v; }
        if let Some(v) = a.num_labels { cfg.num_labels = v; }
        if let Some(v) = a.batch_size { cfg.batch_size = v; }
        if let Some(v) = a.epochs { cfg.epochs = v; }
        if let Some(v) = a.lr { cfg.lr = v; }
        if let Some(v) = a.seed { cfg.seed = v; }

        if let Some(v) = a.feature_dim { cfg.model_params.feature_dim = v; }
        if let Some(v) = a.pcb_n_parts { cfg.model_params.pcb_n_parts = v; }

        if let Some(v) = a.margin { cfg.tri_loss_params.margin = v; }
        if a.use_adaptive_weight { cfg.tri_loss_params.use_adaptive_weight = true; }
        if let Some(v) = a.lambda_cls { cfg.tri_loss_params.lambda_cls = v; }
        if let Some(v) = a.lambda_tri { cfg.tri_loss_params.lambda_tri = v; }
        if let Some(v) = a.p { cfg.batch_sampling_params.p = v; }
        if let Some(v) = a.k { cfg.batch_sampling_params.k = v; }

        if let Some(v) = a.gan_input_dim { cfg.gan_params.input_dim = v; }
        if let Some(v) = a.d_update_freq { cfg.gan_params.d_update_freq = v; }
        if a.adv_train { cfg.gan_params.adv_train = true; }
        if let Some(v) = a.gan_lr { cfg.gan_params.lr = v; }

        if let Some(v) = a.eval_step { cfg.evaluation_params.step = Some(v); }
        if let Some(v) = a.eval_identities { cfg.evaluation_params.num_identities = v; }

        Ok(cfg)
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory where `train` saved its checkpoints
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = TrainArgs {
            mode: Some(TrainMode::Triplet),
            margin: Some(0.3),
            p: Some(4),
            adv_train: true,
            eval_step: Some(200),
            ..Default::default()
        };
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.mode, TrainMode::Triplet);
        assert_eq!(cfg.tri_loss_params.margin, 0.3);
        assert_eq!(cfg.batch_sampling_params.p, 4);
        assert_eq!(cfg.batch_sampling_params.k, 4);
        assert!(cfg.gan_params.adv_train);
        assert_eq!(cfg.evaluation_params.step, Some(200));
        assert_eq!(cfg.epochs, TrainConfig::default().epochs);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let base = TrainConfig { mode: TrainMode::Gan, epochs: 7, ..Default::default() };
        std::fs::write(&path, serde_json::to_string(&base).unwrap()).unwrap();

        let args = TrainArgs {
            config: Some(path.display().to_string()),
            epochs: Some(2),
            ..Default::default()
        };
        let cfg = TrainConfig::try_from(args).unwrap();
        assert_eq!(cfg.mode, TrainMode::Gan);
        assert_eq!(cfg.epochs, 2);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args = TrainArgs { config: Some("/nonexistent/run.json".into()), ..Default::default() };
        assert!(TrainConfig::try_from(args).is_err());
    }
}
