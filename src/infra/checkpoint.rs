// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores network weights with Burn's CompactRecorder.
//
// What gets saved:
//   1. reid_step_{N}.mpk.gz          — re-ID net weights at global step N
//   2. generator_step_{N}.mpk.gz     — GAN modes only
//      discriminator_step_{N}.mpk.gz
//   3. latest_step.json              — N of the newest re-ID checkpoint
//   4. train_config.json             — rebuilds the architecture
//
// Directory layout:
//   checkpoints/
//     reid_step_1000.mpk.gz
//     reid_step_2000.mpk.gz
//     latest_step.json
//     train_config.json
//     metrics.csv, scalars.csv    (written by infra::metrics)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::{Path, PathBuf}};

use crate::application::config::TrainConfig;

const LATEST_FILE: &str = "latest_step.json";
const CONFIG_FILE: &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn module_path(&self, name: &str, step: usize) -> PathBuf {
        // recorder appends the extension
        self.dir.join(format!("{name}_step_{step}"))
    }

    /// Record any module under `{name}_step_{step}`.
    pub fn save_module<B: Backend, M: Module<B>>(&self, name: &str, module: &M, step: usize) -> Result<()> {
        let path = self.module_path(name, step);
        CompactRecorder::new()
            .record(module.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved {} checkpoint at step {}", name, step);
        Ok(())
    }

    /// Save the re-ID net and move the latest pointer to `step`.
    pub fn save_reid<B: Backend, M: Module<B>>(&self, net: &M, step: usize) -> Result<()> {
        self.save_module::<B, M>("reid", net, step)?;
        let latest = self.dir.join(LATEST_FILE);
        fs::write(&latest, serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write '{}'", latest.display()))?;
        tracing::info!("Checkpoint saved at global step {}", step);
        Ok(())
    }

    pub fn load_module<B: Backend, M: Module<B>>(
        &self,
        name:   &str,
        module: M,
        step:   usize,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.module_path(name, step);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(module.load_record(record))
    }

    /// Load the newest re-ID checkpoint into `net`.
    pub fn load_latest_reid<B: Backend, M: Module<B>>(&self, net: M, device: &B::Device) -> Result<(M, usize)> {
        let step = self.latest_step()?;
        tracing::info!("Loading re-ID checkpoint from step {}", step);
        let net = self
            .load_module::<B, M>("reid", net, step, device)
            .with_context(|| "Have you run 'train' first?")?;
        Ok((net, step))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        TrainConfig::from_json_file(&path)
            .with_context(|| "Make sure you have run 'train' before 'evaluate'.")
    }

    pub fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::ml::model::{ReidNet, ReidNetConfig};

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_reid_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        let cfg    = ReidNetConfig::new(4, 3).with_hidden_dim(5).with_feature_dim(2);

        let net: ReidNet<TestBackend> = cfg.init(&device);
        ckpt.save_reid::<TestBackend, _>(&net, 7).unwrap();
        assert_eq!(ckpt.latest_step().unwrap(), 7);

        let fresh: ReidNet<TestBackend> = cfg.init(&device);
        let (loaded, step) = ckpt.load_latest_reid::<TestBackend, _>(fresh, &device).unwrap();
        assert_eq!(step, 7);

        // CompactRecorder stores half precision
        let saved  = net.embed.weight.val().into_data().to_vec::<f32>().unwrap();
        let reload = loaded.embed.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(saved.len(), reload.len());
        for (a, b) in saved.iter().zip(&reload) {
            assert!((a - b).abs() <= 1e-3 * a.abs().max(1e-2), "{a} vs {b}");
        }
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.latest_step().is_err());
        assert!(ckpt.load_config().is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = TrainConfig { num_labels: 11, ..Default::default() };
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap().num_labels, 11);
    }
}
