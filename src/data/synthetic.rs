// ============================================================
// Layer 4 — Synthetic Identity Source
// ============================================================
// Stands in for a real person re-ID corpus. Each identity gets a
// random prototype image in [-1, 1]; every crop of that identity
// is the prototype plus uniform per-pixel noise, clamped back
// into [-1, 1] (the generator's tanh range).
//
// Deterministic for a given seed so evaluation runs can rebuild
// the exact query / gallery split used in training.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::dataset::{ImageShape, ReidSample};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticParams {
    /// Crops generated per identity.
    pub images_per_id: usize,
    /// Half-width of the uniform pixel noise.
    pub noise: f32,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self { images_per_id: 8, noise: 0.3 }
    }
}

pub struct SyntheticIdentities {
    shape:  ImageShape,
    params: SyntheticParams,
    seed:   u64,
}

impl SyntheticIdentities {
    pub fn new(shape: ImageShape, params: SyntheticParams, seed: u64) -> Self {
        Self { shape, params, seed }
    }

    /// Crops for identities `0..num_ids`, grouped by identity.
    pub fn generate(&self, num_ids: usize) -> Vec<ReidSample> {
        let mut rng   = StdRng::seed_from_u64(self.seed);
        let numel     = self.shape.numel();
        let noise     = self.params.noise.abs();
        let mut out   = Vec::with_capacity(num_ids * self.params.images_per_id);

        for label in 0..num_ids {
            let prototype: Vec<f32> = (0..numel).map(|_| rng.gen_range(-1.0f32..=1.0)).collect();
            for _ in 0..self.params.images_per_id {
                let pixels = prototype
                    .iter()
                    .map(|&p| {
                        let jitter = if noise > 0.0 { rng.gen_range(-noise..=noise) } else { 0.0 };
                        (p + jitter).clamp(-1.0, 1.0)
                    })
                    .collect();
                out.push(ReidSample { pixels, label });
            }
        }

        tracing::debug!(
            "Generated {} synthetic crops for {} identities",
            out.len(),
            num_ids
        );
        out
    }
}
