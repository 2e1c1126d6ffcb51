// ============================================================
// Layer 5 — Losses and Batch Accuracy
// ============================================================
// Shared building blocks of every training step:
//
//   xent_loss          — cross-entropy, summed over PCB parts
//   batch_accuracy     — argmax accuracy (PCB: argmax of the
//                        mean of part logits)
//   discriminator_loss — BCE of D against real / fake targets,
//                        plus the mean probability D assigns
//   reid_loss          — classifier cross-entropy + accuracy on
//                        arbitrary (e.g. generated) images
//   LossSet            — which criteria a run has enabled

use anyhow::{anyhow, Result};
use burn::{
    nn::loss::{BinaryCrossEntropyLoss, CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use crate::application::config::TripletParams;
use crate::ml::{gan::Discriminator, model::ReidNet, triplet::TripletLoss};

/// Target class of a discriminator evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Real,
    Fake,
}

/// Criteria enabled for a run.
///
///   triplet     ⇔ margin > 0
///   cross-entropy ⇔ no triplet, or triplet with lambda_cls > 0
pub struct LossSet<B: Backend> {
    xent:    Option<CrossEntropyLoss<B>>,
    triplet: Option<TripletLoss>,
}

impl<B: Backend> LossSet<B> {
    pub fn from_params(params: &TripletParams, device: &B::Device) -> Self {
        let use_tri_loss = params.margin > 0.0;

        let triplet = if use_tri_loss {
            tracing::info!("Using Triplet Loss: {:?}", params);
            Some(TripletLoss::new(params.margin, params.use_adaptive_weight))
        } else {
            None
        };

        let xent = if !use_tri_loss || params.lambda_cls > 0.0 {
            Some(CrossEntropyLossConfig::new().init(device))
        } else {
            None
        };

        Self { xent, triplet }
    }

    pub fn xent(&self) -> Result<&CrossEntropyLoss<B>> {
        self.xent
            .as_ref()
            .ok_or_else(|| anyhow!("cross-entropy loss is not enabled for this run"))
    }

    pub fn triplet(&self) -> Result<&TripletLoss> {
        self.triplet
            .as_ref()
            .ok_or_else(|| anyhow!("triplet loss is not enabled (margin must be > 0)"))
    }

    pub fn has_xent(&self) -> bool {
        self.xent.is_some()
    }

    pub fn has_triplet(&self) -> bool {
        self.triplet.is_some()
    }
}

/// Mean cross-entropy for a single head; sum over heads for PCB.
pub fn xent_loss<B: Backend>(
    criterion: &CrossEntropyLoss<B>,
    outputs:   &[Tensor<B, 2>],
    labels:    Tensor<B, 1, Int>,
) -> Result<Tensor<B, 1>> {
    outputs
        .iter()
        .map(|logits| criterion.forward(logits.clone(), labels.clone()))
        .reduce(|a, b| a + b)
        .ok_or_else(|| anyhow!("network produced no logits"))
}

/// Fraction of the batch whose predicted identity matches `labels`.
pub fn batch_accuracy<B: Backend>(outputs: &[Tensor<B, 2>], labels: Tensor<B, 1, Int>) -> Result<f32> {
    let first = outputs.first().ok_or_else(|| anyhow!("network produced no logits"))?;
    let batch_size = first.dims()[0];
    if batch_size == 0 {
        return Ok(0.0);
    }

    // argmax of the part mean equals argmax of the part sum
    let scores = outputs
        .iter()
        .map(|t| t.clone().detach())
        .reduce(|a, b| a + b)
        .ok_or_else(|| anyhow!("network produced no logits"))?;

    // argmax(1) returns [batch, 1]; flatten before comparing with [batch]
    let preds = scores.argmax(1).flatten::<1>(0, 1);
    let correct: i64 = preds.equal(labels).int().sum().into_scalar().elem::<i64>();

    Ok(correct as f32 / batch_size as f32)
}

/// BCE of the discriminator on `images` against `target`, and the mean
/// probability of "real" it assigned.
pub fn discriminator_loss<B: Backend>(
    images:        Tensor<B, 4>,
    discriminator: &Discriminator<B>,
    target:        Target,
    criterion:     &BinaryCrossEntropyLoss<B>,
) -> (Tensor<B, 1>, f32) {
    let batch  = images.dims()[0];
    let device = images.device();
    let logits = discriminator.forward(images).reshape([batch]);

    let targets = match target {
        Target::Real => Tensor::<B, 1, Int>::ones([batch], &device),
        Target::Fake => Tensor::<B, 1, Int>::zeros([batch], &device),
    };
    let err = criterion.forward(logits.clone(), targets);
    let d_x = sigmoid(logits.detach()).mean().into_scalar().elem::<f32>();

    (err, d_x)
}

/// Re-ID cross-entropy and accuracy of `net` on `images`.
pub fn reid_loss<B: Backend>(
    images:    Tensor<B, 4>,
    labels:    Tensor<B, 1, Int>,
    net:       &ReidNet<B>,
    criterion: &CrossEntropyLoss<B>,
) -> Result<(Tensor<B, 1>, f32)> {
    let output = net.forward(images);
    let loss   = xent_loss(criterion, &output.logits, labels.clone())?;
    let acc    = batch_accuracy(&output.logits, labels)?;
    Ok((loss, acc))
}

/// Host value of a scalar loss without touching its graph.
pub fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f32 {
    loss.clone().detach().into_scalar().elem::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::nn::loss::BinaryCrossEntropyLossConfig;

    use crate::ml::gan::GanConfig;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_loss_set_softmax_only() {
        let set = LossSet::<TestBackend>::from_params(&TripletParams::default(), &Default::default());
        assert!(set.has_xent());
        assert!(!set.has_triplet());
        assert!(set.triplet().is_err());
    }

    #[test]
    fn test_loss_set_triplet_only() {
        let params = TripletParams { margin: 0.3, lambda_cls: 0.0, ..Default::default() };
        let set = LossSet::<TestBackend>::from_params(&params, &Default::default());
        assert!(set.has_triplet());
        assert!(!set.has_xent());
        assert!(set.xent().is_err());
    }

    #[test]
    fn test_loss_set_joint() {
        let params = TripletParams { margin: 0.3, lambda_cls: 1.0, ..Default::default() };
        let set = LossSet::<TestBackend>::from_params(&params, &Default::default());
        assert!(set.has_triplet() && set.has_xent());
    }

    #[test]
    fn test_batch_accuracy_single_head() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[2.0, 0.0], [0.0, 1.0], [5.0, 1.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 1], &device);
        let acc = batch_accuracy(&[logits], labels).unwrap();
        assert!((acc - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_batch_accuracy_pcb_uses_part_mean() {
        let device = Default::default();
        // part 1 votes class 0 weakly, part 2 votes class 1 strongly
        let p1 = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);
        let p2 = Tensor::<TestBackend, 2>::from_floats([[0.0, 3.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([1], &device);
        assert_eq!(batch_accuracy(&[p1, p2], labels).unwrap(), 1.0);
    }

    #[test]
    fn test_xent_sums_over_parts() {
        let device = Default::default();
        let ce = CrossEntropyLossConfig::new().init(&device);
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([0], &device);
        let one = xent_loss(&ce, &[logits.clone()], labels.clone()).unwrap().into_scalar();
        let two = xent_loss(&ce, &[logits.clone(), logits], labels).unwrap().into_scalar();
        assert!((one - std::f32::consts::LN_2).abs() < 1e-5);
        assert!((two - 2.0 * one).abs() < 1e-5);
        assert!(xent_loss(&ce, &[], Tensor::<TestBackend, 1, Int>::from_ints([0], &device)).is_err());
    }

    #[test]
    fn test_discriminator_loss_reports_probability() {
        let device = Default::default();
        let d = GanConfig::new(4, 1, 2, 2).init_discriminator::<TestBackend>(&device);
        let bce = BinaryCrossEntropyLossConfig::new().with_logits(true).init(&device);
        let images = Tensor::<TestBackend, 4>::zeros([3, 1, 2, 2], &device);

        let (real, d_real) = discriminator_loss(images.clone(), &d, Target::Real, &bce);
        let (fake, d_fake) = discriminator_loss(images, &d, Target::Fake, &bce);
        assert!((0.0..=1.0).contains(&d_real));
        assert!((d_real - d_fake).abs() < 1e-6);
        // same logits, opposite targets: both terms positive
        assert!(scalar(&real) > 0.0 && scalar(&fake) > 0.0);
    }
}
