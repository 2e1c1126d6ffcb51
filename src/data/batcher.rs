// ============================================================
// Layer 4 — Re-ID Batcher
// ============================================================
// Stacks a list of ReidSamples into device tensors:
//
//   Input:  N samples, each C*H*W flattened pixels
//   Output: images [N, C, H, W] (float), labels [N] (int)
//
// All samples share one ImageShape, so the pixel buffers are
// concatenated and reshaped in one go.

use anyhow::{bail, Result};
use burn::{prelude::*, tensor::TensorData};

use crate::data::dataset::{ImageShape, ReidSample};

/// A batch ready for the forward pass. `B` is generic so the same
/// batcher serves the autodiff training backend and the inner
/// backend used for evaluation.
#[derive(Debug, Clone)]
pub struct ReidBatch<B: Backend> {
    /// [batch, channels, height, width]
    pub images: Tensor<B, 4>,
    /// [batch]
    pub labels: Tensor<B, 1, Int>,
}

impl<B: Backend> ReidBatch<B> {
    pub fn size(&self) -> usize {
        self.images.dims()[0]
    }
}

#[derive(Clone, Debug)]
pub struct ReidBatcher<B: Backend> {
    pub device: B::Device,
    pub shape:  ImageShape,
}

impl<B: Backend> ReidBatcher<B> {
    pub fn new(device: B::Device, shape: ImageShape) -> Self {
        Self { device, shape }
    }

    pub fn batch(&self, items: &[&ReidSample]) -> Result<ReidBatch<B>> {
        if items.is_empty() {
            bail!("cannot build an empty batch");
        }
        let numel = self.shape.numel();
        if let Some(bad) = items.iter().find(|s| s.pixels.len() != numel) {
            bail!(
                "sample with label {} has {} pixels, expected {}",
                bad.label,
                bad.pixels.len(),
                numel
            );
        }

        let n = items.len();
        let pixels: Vec<f32> = items.iter().flat_map(|s| s.pixels.iter().copied()).collect();
        let labels: Vec<i64> = items.iter().map(|s| s.label as i64).collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [n, self.shape.channels, self.shape.height, self.shape.width]),
            &self.device,
        );
        let labels = Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [n]), &self.device);

        Ok(ReidBatch { images, labels })
    }
}
