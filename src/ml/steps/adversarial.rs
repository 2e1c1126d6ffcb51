use anyhow::Result;
use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use rand::{rngs::StdRng, Rng};

use crate::data::batcher::ReidBatch;
use crate::domain::stats::{AdvStats, GanStats};
use crate::ml::{
    gan::{l2_normalize, Discriminator, GanPair, Generator},
    hooks::RunContext,
    loss::{batch_accuracy, discriminator_loss, reid_loss, scalar, xent_loss, LossSet, Target},
    model::ReidNet,
};

/// Share of iterations in which the re-ID net learns from generated crops.
const ADV_UPDATE_PROB: f64 = 0.1;

/// One adversarial iteration, fed the re-ID features of the same batch.
///
/// The discriminator is updated every time. In roughly one iteration out
/// of ten the generator is also pushed to make crops the re-ID net assigns
/// to the source identity, and the re-ID net is trained to put those crops
/// in the shifted classes `label + num_labels`.
pub fn run_iter_adv<B, O, OG, OD>(
    batch:    &ReidBatch<B>,
    features: Tensor<B, 2>,
    step:     usize,
    epoch:    usize,
    net:      &mut ReidNet<B>,
    losses:   &LossSet<B>,
    optim:    &mut O,
    pair:     &mut GanPair<B, OG, OD>,
    rng:      &mut StdRng,
    ctx:      &mut RunContext<'_, B>,
) -> Result<AdvStats>
where
    B: AutodiffBackend,
    O: Optimizer<ReidNet<B>, B>,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let update_adv = rng.gen::<f64>() < ADV_UPDATE_PROB;
    adv_iteration(batch, features, step, epoch, net, losses, optim, pair, update_adv, ctx)
}

fn adv_iteration<B, O, OG, OD>(
    batch:      &ReidBatch<B>,
    features:   Tensor<B, 2>,
    step:       usize,
    epoch:      usize,
    net:        &mut ReidNet<B>,
    losses:     &LossSet<B>,
    optim:      &mut O,
    pair:       &mut GanPair<B, OG, OD>,
    update_adv: bool,
    ctx:        &mut RunContext<'_, B>,
) -> Result<AdvStats>
where
    B: AutodiffBackend,
    O: Optimizer<ReidNet<B>, B>,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let cfg = ctx.config;
    let criterion = losses.xent()?;

    // ── Discriminator: real crops vs G(features) ──────────────────────────────
    let (err_d_real, d_x) =
        discriminator_loss(batch.images.clone(), &pair.discriminator, Target::Real, &pair.criterion);

    let fake = pair.generator.forward(l2_normalize(features.detach()));
    let (err_d_fake, d_g_z1) =
        discriminator_loss(fake.clone().detach(), &pair.discriminator, Target::Fake, &pair.criterion);

    let loss_real = scalar(&err_d_real);
    let loss_fake = scalar(&err_d_fake);
    pair.step_discriminator(err_d_real + err_d_fake);

    // ── Generator ─────────────────────────────────────────────────────────────
    let (err_g, d_g_z2) =
        discriminator_loss(fake.clone(), &pair.discriminator, Target::Real, &pair.criterion);
    let (err_id, acc_g) = reid_loss(fake.clone(), batch.labels.clone(), net, criterion)?;
    let loss_g = scalar(&err_g);
    let id_value = scalar(&err_id);

    let objective = if update_adv { err_g + err_id } else { err_g };
    pair.step_generator(objective);

    let gan = GanStats {
        loss_real,
        loss_fake,
        loss_g,
        d_real: d_x,
        d_fake: d_g_z1,
        d_fake_after: d_g_z2,
        discriminator_updated: true,
        reid_loss: Some(id_value),
        reid_acc: Some(acc_g),
    };

    if !update_adv {
        return Ok(AdvStats { gan, adv_updated: false, adv_acc: 0.0 });
    }

    // ── Re-ID net on generated crops, shifted labels ──────────────────────────
    let labels_shift = batch.labels.clone().add_scalar(cfg.num_labels as i64);
    let outputs = net.forward(fake.detach()).logits;
    let loss_id = xent_loss(criterion, &outputs, labels_shift.clone())?;
    let adv_acc = batch_accuracy(&outputs, labels_shift)?;

    let grads = loss_id.backward();
    let grads = GradientsParams::from_grads(grads, &*net);
    *net = optim.step(cfg.lr, net.clone(), grads);

    tracing::info!(
        "epoch [{:03}] iter = {} loss_r:{:.3} loss_f = {:.3} loss_g = {:.3} D_r = {:.3} D_f = {:.3}|{:.3} G_att_acc:{:.3}, att_loss:{:.3}, adv_acc:{:.3}",
        epoch, step, loss_real, loss_fake, loss_g, d_x, d_g_z1, d_g_z2, acc_g, id_value, adv_acc
    );
    ctx.scalar("adv_acc", adv_acc as f64)?;

    Ok(AdvStats { gan, adv_updated: true, adv_acc })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        optim::AdamConfig,
    };
    use rand::SeedableRng;

    use crate::application::config::TrainConfig;
    use crate::domain::{mode::TrainMode, traits::MemorySink};
    use crate::ml::gan::init_gan_pair;
    use crate::ml::steps::test_support::{tiny_batch, tiny_config};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn adv_config() -> TrainConfig {
        TrainConfig { mode: TrainMode::Adversarial, ..tiny_config() }
    }

    fn head_weights(net: &ReidNet<TestBackend>) -> Vec<f32> {
        net.heads[0].weight.val().into_data().to_vec::<f32>().unwrap()
    }

    fn run(update_adv: bool) -> (AdvStats, bool, MemorySink) {
        let cfg = adv_config();
        let device = Default::default();
        let mut net = cfg.reid_net_config().init::<TestBackend>(&device);
        let losses = LossSet::from_params(&cfg.tri_loss_params, &device);
        let mut optim = AdamConfig::new().init::<TestBackend, ReidNet<TestBackend>>();
        let mut pair = init_gan_pair::<TestBackend>(&cfg.gan_config(), 1e-3, &device);
        let batch = tiny_batch::<TestBackend>(&cfg);
        let features = net.forward_features(batch.images.clone()).detach();

        let before = head_weights(&net);
        let mut sink = MemorySink::default();
        let stats = {
            let mut ctx = RunContext::new(&cfg, &mut sink);
            adv_iteration(&batch, features, 3, 0, &mut net, &losses, &mut optim, &mut pair, update_adv, &mut ctx)
                .unwrap()
        };
        let changed = head_weights(&net) != before;
        (stats, changed, sink)
    }

    #[test]
    fn test_plain_iteration_leaves_reid_net_alone() {
        let (stats, changed, sink) = run(false);
        assert!(!stats.adv_updated);
        assert!(stats.gan.discriminator_updated);
        assert!(stats.gan.reid_loss.unwrap().is_finite());
        assert!(!changed);
        assert!(sink.values("adv_acc").is_empty());
    }

    #[test]
    fn test_adversarial_update_trains_shifted_classes() {
        let (stats, changed, sink) = run(true);
        assert!(stats.adv_updated);
        assert!((0.0..=1.0).contains(&stats.adv_acc));
        assert!(changed);
        assert_eq!(sink.values("adv_acc").len(), 1);
    }

    #[test]
    fn test_adversarial_updates_are_rare() {
        let mut rng = StdRng::seed_from_u64(5);
        let hits = (0..2000).filter(|_| rng.gen::<f64>() < ADV_UPDATE_PROB).count();
        assert!((100..300).contains(&hits));
    }
}
