// ============================================================
// Layer 2 — Training Configuration
// ============================================================
// Every hyperparameter of a run, grouped the way the training
// steps consume them:
//
//   model_params          — re-ID net shape, PCB parts
//   batch_sampling_params — P identities × K crops (triplet mode)
//   gan_params            — generator input, D update gating
//   tri_loss_params       — margin, weighting, joint-loss lambdas
//   evaluation_params     — evaluation cadence and eval set size
//
// Serialisable so it is saved next to the checkpoints and the
// `evaluate` command can rebuild the exact same network.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::data::{dataset::ImageShape, sampler::BatchSamplingParams, synthetic::SyntheticParams};
use crate::domain::mode::TrainMode;
use crate::ml::{gan::GanConfig, model::ReidNetConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParams {
    /// 0 disables the part-based heads.
    pub pcb_n_parts: usize,
    pub feature_dim: usize,
    pub hidden_dim:  usize,
    pub dropout:     f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self { pcb_n_parts: 0, feature_dim: 64, hidden_dim: 256, dropout: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GanParams {
    /// Generator input size; must equal `feature_dim` when the
    /// generator is fed re-ID features.
    pub input_dim:     usize,
    /// Probability that an iteration updates the discriminator.
    pub d_update_freq: f64,
    /// Every 50 steps, also push G towards images the re-ID net
    /// classifies as the real identity.
    pub adv_train:     bool,
    pub hidden_dim:    usize,
    pub lr:            f64,
}

impl Default for GanParams {
    fn default() -> Self {
        Self { input_dim: 64, d_update_freq: 1.0, adv_train: false, hidden_dim: 256, lr: 2e-4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripletParams {
    /// Triplet loss is enabled iff margin > 0.
    pub margin:              f32,
    pub use_adaptive_weight: bool,
    /// Weight of the cross-entropy term; 0 trains on triplet loss alone.
    pub lambda_cls:          f32,
    pub lambda_tri:          f32,
}

impl Default for TripletParams {
    fn default() -> Self {
        Self { margin: 0.0, use_adaptive_weight: false, lambda_cls: 0.0, lambda_tri: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationParams {
    /// Evaluate every `step` iterations; `None` only evaluates at the end.
    pub step:          Option<usize>,
    /// Held-out identities used for retrieval evaluation (0 disables it).
    pub num_identities: usize,
    pub query_per_id:  usize,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self { step: None, num_identities: 10, query_per_id: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub mode:           TrainMode,
    pub checkpoint_dir: String,
    /// Training identities; also the label offset of adversarial samples.
    pub num_labels:     usize,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub seed:           u64,
    pub image:          ImageShape,
    pub data:           SyntheticParams,
    pub model_params:   ModelParams,
    pub batch_sampling_params: BatchSamplingParams,
    pub gan_params:     GanParams,
    pub tri_loss_params: TripletParams,
    pub evaluation_params: EvaluationParams,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            mode:           TrainMode::Softmax,
            checkpoint_dir: "checkpoints".to_string(),
            num_labels:     32,
            batch_size:     32,
            epochs:         10,
            lr:             3e-4,
            seed:           42,
            image:          ImageShape::default(),
            data:           SyntheticParams::default(),
            model_params:   ModelParams::default(),
            batch_sampling_params: BatchSamplingParams::default(),
            gan_params:     GanParams::default(),
            tri_loss_params: TripletParams::default(),
            evaluation_params: EvaluationParams::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))?;
        Ok(cfg)
    }

    /// Reject combinations the training steps cannot run with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model_params;
        if self.num_labels == 0 {
            bail!("num_labels must be > 0");
        }
        if m.feature_dim == 0 {
            bail!("feature_dim must be > 0");
        }
        if m.pcb_n_parts > 0 && m.feature_dim % m.pcb_n_parts != 0 {
            bail!(
                "feature_dim ({}) must be divisible by pcb_n_parts ({})",
                m.feature_dim,
                m.pcb_n_parts
            );
        }
        if !(0.0..=1.0).contains(&self.gan_params.d_update_freq) {
            bail!("d_update_freq must be within [0, 1], got {}", self.gan_params.d_update_freq);
        }
        let feeds_features = self.mode == TrainMode::Adversarial
            || (self.mode == TrainMode::Gan && self.gan_params.adv_train);
        if feeds_features && self.gan_params.input_dim != m.feature_dim {
            bail!(
                "gan input_dim ({}) must equal feature_dim ({}) when the generator is fed re-ID features",
                self.gan_params.input_dim,
                m.feature_dim
            );
        }
        match self.mode {
            TrainMode::Triplet => {
                if self.tri_loss_params.margin <= 0.0 {
                    bail!("triplet mode needs tri_loss_params.margin > 0");
                }
                let p = &self.batch_sampling_params;
                if p.p < 2 || p.k < 1 {
                    bail!("triplet batches need P >= 2 identities and K >= 1 crops, got P={} K={}", p.p, p.k);
                }
                if p.p > self.num_labels {
                    bail!("P ({}) exceeds the number of identities ({})", p.p, self.num_labels);
                }
            }
            _ => {
                if self.batch_size == 0 {
                    bail!("batch_size must be > 0");
                }
            }
        }
        if self.mode == TrainMode::Adversarial && m.pcb_n_parts > 0 {
            tracing::warn!("PCB heads with adversarial training: shifted labels are scored by every part");
        }
        Ok(())
    }

    /// Examples per iteration, as used for throughput.
    pub fn effective_batch_size(&self) -> usize {
        match self.mode {
            TrainMode::Triplet => self.batch_sampling_params.batch_size(),
            _ => self.batch_size,
        }
    }

    pub fn reid_net_config(&self) -> ReidNetConfig {
        let m = &self.model_params;
        ReidNetConfig::new(self.image.numel(), self.mode.classifier_width(self.num_labels))
            .with_hidden_dim(m.hidden_dim)
            .with_feature_dim(m.feature_dim)
            .with_pcb_n_parts(m.pcb_n_parts)
            .with_dropout(m.dropout)
    }

    pub fn gan_config(&self) -> GanConfig {
        GanConfig::new(
            self.gan_params.input_dim,
            self.image.channels,
            self.image.height,
            self.image.width,
        )
        .with_hidden_dim(self.gan_params.hidden_dim)
    }
}
