use anyhow::Result;
use burn::{
    optim::Optimizer,
    prelude::*,
    tensor::{backend::AutodiffBackend, Distribution},
};
use rand::{rngs::StdRng, Rng};

use crate::data::batcher::ReidBatch;
use crate::domain::stats::GanStats;
use crate::ml::{
    gan::{l2_normalize, Discriminator, GanPair, Generator},
    hooks::{RunContext, LOG_STEP},
    loss::{discriminator_loss, reid_loss, scalar, LossSet, Target},
    model::ReidNet,
};

/// Std-dev of the noise added to re-ID features before they seed G.
const FEATURE_NOISE: f64 = 0.1;

/// Every `ADV_TRAIN_STEP` steps (with `adv_train`), G also learns to
/// produce images the re-ID net assigns to the source identity.
const ADV_TRAIN_STEP: usize = 50;

/// One generator/discriminator iteration.
///
/// 1. With probability `d_update_freq`, D learns real → 1, G(z) → 0,
///    z ~ N(0, I) normalised to the unit sphere.
/// 2. G learns to make the updated D say 1 on G(z).
/// 3. With `adv_train`, a re-ID net, and `step % 50 == 0`, G additionally
///    sees noisy re-ID features of the real batch and is pushed to fool D
///    and to be classified as the real labels.
pub fn run_iter_gan<B, OG, OD>(
    batch: &ReidBatch<B>,
    step:  usize,
    epoch: usize,
    pair:  &mut GanPair<B, OG, OD>,
    reid:  Option<(&ReidNet<B>, &LossSet<B>)>,
    rng:   &mut StdRng,
    ctx:   &mut RunContext<'_, B>,
) -> Result<GanStats>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    let cfg = ctx.config;
    let gan = &cfg.gan_params;
    let size = batch.size();
    let device = batch.images.device();

    let update_d = rng.gen::<f64>() < gan.d_update_freq;

    // ── Discriminator ─────────────────────────────────────────────────────────
    let (err_d_real, d_x) =
        discriminator_loss(batch.images.clone(), &pair.discriminator, Target::Real, &pair.criterion);

    let noise = l2_normalize(Tensor::<B, 2>::random(
        [size, gan.input_dim],
        Distribution::Normal(0.0, 1.0),
        &device,
    ));
    let fake = pair.generator.forward(noise);
    let (err_d_fake, d_g_z1) =
        discriminator_loss(fake.clone().detach(), &pair.discriminator, Target::Fake, &pair.criterion);

    let loss_real = scalar(&err_d_real);
    let loss_fake = scalar(&err_d_fake);
    if update_d {
        pair.step_discriminator(err_d_real + err_d_fake);
    }

    // ── Generator ─────────────────────────────────────────────────────────────
    let (err_g, d_g_z2) = discriminator_loss(fake, &pair.discriminator, Target::Real, &pair.criterion);
    let loss_g = scalar(&err_g);
    let mut objective = err_g;

    let mut stats = GanStats {
        loss_real,
        loss_fake,
        loss_g,
        d_real: d_x,
        d_fake: d_g_z1,
        d_fake_after: d_g_z2,
        discriminator_updated: update_d,
        reid_loss: None,
        reid_acc: None,
    };

    if gan.adv_train && step % ADV_TRAIN_STEP == 0 {
        if let Some((net, losses)) = reid {
            let feature = net.forward_features(batch.images.clone()).detach();
            let jitter = Tensor::<B, 2>::random(feature.dims(), Distribution::Normal(0.0, 1.0), &device)
                .mul_scalar(FEATURE_NOISE);
            let fake_f = pair.generator.forward(l2_normalize(feature + jitter));

            let (err_g_f, _) =
                discriminator_loss(fake_f.clone(), &pair.discriminator, Target::Real, &pair.criterion);
            let (err_id, acc) = reid_loss(fake_f, batch.labels.clone(), net, losses.xent()?)?;
            let id_value = scalar(&err_id);
            stats.reid_loss = Some(id_value);
            stats.reid_acc = Some(acc);

            if step > 0 {
                tracing::info!(
                    "epoch [{:03}] iter = {} errG_id_REID:{:.3}, accG_REID:{:.3}",
                    epoch, step, id_value, acc
                );
            }
            objective = objective + err_id + err_g_f;
        }
    }

    pair.step_generator(objective);

    if step > 0 && step % LOG_STEP == 0 {
        tracing::info!(
            "epoch [{:03}] iter = {} loss_r = {:.3} loss_f = {:.3} loss_g = {:.3} D_r = {:.3} D_f = {:.3}|{:.3}",
            epoch, step, loss_real, loss_fake, loss_g, d_x, d_g_z1, d_g_z2
        );
        ctx.scalar("loss_d_real", loss_real as f64)?;
        ctx.scalar("loss_d_fake", loss_fake as f64)?;
        ctx.scalar("loss_g", loss_g as f64)?;
    }

    Ok(stats)
}
