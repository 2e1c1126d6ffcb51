// ============================================================
// Layer 5 — Retrieval Evaluator
// ============================================================
// Scores the re-ID net the way re-ID benchmarks do:
//   1. embed every query and gallery crop (dropout off)
//   2. L2-normalise, cosine distance = 1 - q · g
//   3. CMC rank-1 / rank-5 and mAP (domain::ranking)
//
// Training calls it through the Evaluator trait with the
// autodiff net; the `evaluate` command calls
// `retrieval_report` directly on the inference backend.

use anyhow::{anyhow, Result};
use burn::{module::AutodiffModule, prelude::*, tensor::backend::AutodiffBackend};

use crate::data::{
    batcher::ReidBatcher,
    dataset::{ImageShape, ReidSample},
};
use crate::domain::ranking::{rank_metrics, EvalReport};
use crate::ml::{gan::l2_normalize, model::ReidNet};

/// Anything that can score the training net mid-run.
pub trait Evaluator<B: AutodiffBackend> {
    fn evaluate(&self, net: &ReidNet<B>) -> Result<EvalReport>;
}

pub struct RetrievalEvaluator<B: Backend> {
    pub query:      Vec<ReidSample>,
    pub gallery:    Vec<ReidSample>,
    pub shape:      ImageShape,
    pub batch_size: usize,
    pub device:     B::Device,
}

impl<B: AutodiffBackend> Evaluator<B> for RetrievalEvaluator<B> {
    fn evaluate(&self, net: &ReidNet<B>) -> Result<EvalReport> {
        // valid() drops the autodiff graph and disables dropout
        let net = net.valid();
        retrieval_report::<B::InnerBackend>(
            &net,
            &self.query,
            &self.gallery,
            self.shape,
            self.batch_size,
            &self.device,
        )
    }
}

pub fn retrieval_report<B: Backend>(
    net:        &ReidNet<B>,
    query:      &[ReidSample],
    gallery:    &[ReidSample],
    shape:      ImageShape,
    batch_size: usize,
    device:     &B::Device,
) -> Result<EvalReport> {
    if query.is_empty() || gallery.is_empty() {
        return Err(anyhow!(
            "evaluation needs query and gallery crops (got {} / {})",
            query.len(),
            gallery.len()
        ));
    }

    let batcher = ReidBatcher::<B>::new(device.clone(), shape);
    let q = embed_all(net, &batcher, query, batch_size)?;
    let g = embed_all(net, &batcher, gallery, batch_size)?;

    let dist = q.matmul(g.transpose()).neg().add_scalar(1.0);
    let dist: Vec<f32> = dist
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("{:?}", e))?;

    let query_ids:   Vec<usize> = query.iter().map(|s| s.label).collect();
    let gallery_ids: Vec<usize> = gallery.iter().map(|s| s.label).collect();
    Ok(rank_metrics(&dist, &query_ids, &gallery_ids))
}

/// Normalised features for `samples`, [len, feature_dim].
fn embed_all<B: Backend>(
    net:        &ReidNet<B>,
    batcher:    &ReidBatcher<B>,
    samples:    &[ReidSample],
    batch_size: usize,
) -> Result<Tensor<B, 2>> {
    let mut parts = Vec::new();
    for chunk in samples.chunks(batch_size.max(1)) {
        let refs: Vec<&ReidSample> = chunk.iter().collect();
        let batch = batcher.batch(&refs)?;
        parts.push(l2_normalize(net.forward_features(batch.images)));
    }
    Ok(Tensor::cat(parts, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::data::{splitter::split_query_gallery, synthetic::{SyntheticIdentities, SyntheticParams}};
    use crate::ml::model::ReidNetConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn eval_set(shape: ImageShape) -> (Vec<ReidSample>, Vec<ReidSample>) {
        let crops = SyntheticIdentities::new(shape, SyntheticParams { images_per_id: 3, noise: 0.05 }, 11)
            .generate(4);
        split_query_gallery(crops, 1)
    }

    #[test]
    fn test_report_is_well_formed() {
        let device = Default::default();
        let shape  = ImageShape { channels: 1, height: 4, width: 2 };
        let (query, gallery) = eval_set(shape);

        let net = ReidNetConfig::new(shape.numel(), 4)
            .with_hidden_dim(16)
            .with_feature_dim(8)
            .init::<TestBackend>(&device);
        let evaluator = RetrievalEvaluator::<TestBackend> { query, gallery, shape, batch_size: 3, device };

        let report = evaluator.evaluate(&net).unwrap();
        assert_eq!(report.valid_queries, 4);
        assert!((0.0..=1.0).contains(&report.rank1));
        assert!(report.rank5 >= report.rank1);
        assert!((0.0..=1.0).contains(&report.map));
    }

    #[test]
    fn test_empty_query_is_an_error() {
        let device = Default::default();
        let shape  = ImageShape { channels: 1, height: 2, width: 2 };
        let net = ReidNetConfig::new(4, 2).init::<NdArray<f32>>(&device);
        let gallery = vec![ReidSample { pixels: vec![0.0; 4], label: 0 }];
        assert!(retrieval_report(&net, &[], &gallery, shape, 4, &device).is_err());
    }
}
