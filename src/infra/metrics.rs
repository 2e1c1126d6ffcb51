// ============================================================
// Layer 6 — Metrics Loggers
// ============================================================
// Two CSV files in the checkpoint directory:
//
//   scalars.csv — step,tag,value
//     Every scalar summary the training steps emit (loss,
//     batch_accuracy, AN_lt_AP_ratio, Active_Triplet, ...),
//     keyed by the global step. Same role as an event-file
//     writer; plot it with anything that reads CSV.
//
//   metrics.csv — one row per epoch
//     epoch,global_step,loss,d_loss,g_loss,rank1,map
//     NaN marks a column the mode does not produce.
//
// Both files are appended to, so resumed runs keep history.

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::domain::traits::ScalarSink;

// ─── ScalarLogger ────────────────────────────────────────────────────────────
pub struct ScalarLogger {
    csv_path: PathBuf,
    writer:   BufWriter<File>,
}

impl ScalarLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("scalars.csv");
        let is_new = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open '{}'", csv_path.display()))?;
        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "step,tag,value")?;
        }
        Ok(Self { csv_path, writer })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl ScalarSink for ScalarLogger {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        writeln!(self.writer, "{},{},{:.6}", step, tag, value)?;
        Ok(())
    }
}

impl Drop for ScalarLogger {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush '{}': {}", self.csv_path.display(), e);
        }
    }
}

// ─── Epoch metrics ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:       usize,
    pub global_step: usize,
    /// Mean objective of the re-ID net (cross-entropy or triplet).
    pub loss:        f64,
    /// Mean discriminator loss (real + fake), GAN modes only.
    pub d_loss:      f64,
    /// Mean generator loss, GAN modes only.
    pub g_loss:      f64,
    pub rank1:       f64,
    pub map:         f64,
}

impl EpochMetrics {
    /// True when this epoch's retrieval mAP beats `best_map`.
    pub fn is_improvement(&self, best_map: f64) -> bool {
        !self.map.is_nan() && self.map > best_map
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");

        if !csv_path.exists() {
            let mut f = File::create(&csv_path)?;
            writeln!(f, "epoch,global_step,loss,d_loss,g_loss,rank1,map")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch, m.global_step, m.loss, m.d_loss, m.g_loss, m.rank1, m.map,
        )?;
        tracing::debug!("Logged epoch {} metrics: loss={:.4}", m.epoch, m.loss);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
