// ============================================================
// Layer 5 — Triplet Loss
// ============================================================
// Batch-level triplet loss over Euclidean feature distances.
//
// Hard mining (default):
//   d_ap = max distance to a same-id sample
//   d_an = min distance to a different-id sample
//
// Adaptive weighting:
//   d_ap = Σ softmax(d) · d   over positives
//   d_an = Σ softmin(d) · d   over negatives
//   Far positives and near negatives dominate, but every pair
//   keeps a gradient.
//
// loss = mean(relu(margin + d_ap - d_an))
//
// Batches must contain at least two identities; the P×K
// sampler guarantees that.

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::activation::relu};

/// Large additive mask so masked entries never win a min / max.
const MASK_FILL: f32 = 1e6;

#[derive(Debug, Clone)]
pub struct TripletLoss {
    pub margin:              f32,
    pub use_adaptive_weight: bool,
}

pub struct TripletOutput<B: Backend> {
    pub loss:           Tensor<B, 1>,
    /// Percentage (0..100) of anchors with d_an > d_ap.
    pub pull_ratio:     f32,
    pub active_triplet: i64,
    pub mean_dist_an:   f32,
    pub mean_dist_ap:   f32,
}

impl TripletLoss {
    pub fn new(margin: f32, use_adaptive_weight: bool) -> Self {
        Self { margin, use_adaptive_weight }
    }

    /// features: [n, d], labels: [n]
    pub fn forward<B: Backend>(
        &self,
        features: Tensor<B, 2>,
        labels:   Tensor<B, 1, Int>,
    ) -> Result<TripletOutput<B>> {
        let [n, _] = features.dims();
        let dist = pairwise_distance(features);

        let same = labels
            .clone()
            .reshape([n, 1])
            .expand([n, n])
            .equal(labels.reshape([1, n]).expand([n, n]))
            .float();
        let diff = same.clone().neg().add_scalar(1.0);

        let negatives = diff.clone().sum().into_scalar().elem::<f32>();
        if negatives <= 0.0 {
            return Err(anyhow::anyhow!("triplet batch has no negatives"))
                .context("batches need at least two identities");
        }

        let (d_ap, d_an) = if self.use_adaptive_weight {
            let w_ap = masked_softmax(dist.clone(), same.clone());
            let w_an = masked_softmax(dist.clone().neg(), diff);
            (
                (dist.clone() * w_ap).sum_dim(1).reshape([n]),
                (dist * w_an).sum_dim(1).reshape([n]),
            )
        } else {
            let d_ap = (dist.clone() * same.clone()).max_dim(1).reshape([n]);
            let d_an = (dist + same.mul_scalar(MASK_FILL)).min_dim(1).reshape([n]);
            (d_ap, d_an)
        };

        let hinge = relu((d_ap.clone() - d_an.clone()).add_scalar(self.margin));
        let loss  = hinge.clone().mean();

        let d_ap = d_ap.detach();
        let d_an = d_an.detach();
        let pull_ratio = d_an
            .clone()
            .greater(d_ap.clone())
            .float()
            .mean()
            .into_scalar()
            .elem::<f32>()
            * 100.0;
        let active_triplet = hinge
            .detach()
            .greater_elem(0.0)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        let mean_dist_an = d_an.mean().into_scalar().elem::<f32>();
        let mean_dist_ap = d_ap.mean().into_scalar().elem::<f32>();

        Ok(TripletOutput { loss, pull_ratio, active_triplet, mean_dist_an, mean_dist_ap })
    }
}

/// Euclidean distance matrix, [n, d] → [n, n].
pub fn pairwise_distance<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, _] = x.dims();
    let sq = x.clone().powf_scalar(2.0).sum_dim(1); // [n, 1]
    let gram = x.clone().matmul(x.transpose());
    let d2 = sq.clone().expand([n, n]) + sq.transpose().expand([n, n]) - gram.mul_scalar(2.0);
    d2.clamp_min(1e-12).sqrt()
}

/// Row-wise softmax restricted to `mask == 1` entries.
fn masked_softmax<B: Backend>(x: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, m] = x.dims();
    let masked = x + mask.clone().sub_scalar(1.0).mul_scalar(MASK_FILL);
    let max = masked.clone().max_dim(1).expand([n, m]);
    let exp = (masked - max).exp() * mask;
    let sum = exp.clone().sum_dim(1).add_scalar(1e-6).expand([n, m]);
    exp / sum
}
