// ============================================================
// Layer 3 — Step Statistics
// ============================================================
// Host-side readings pulled out of a training iteration.
// The ml layer fills these in after `into_scalar()`; the
// trainer aggregates them into epoch averages.

use serde::{Deserialize, Serialize};

/// One cross-entropy iteration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SoftmaxStats {
    pub loss: f32,
    /// Only filled on logging steps, otherwise `None`.
    pub batch_acc: Option<f32>,
}

/// One triplet-loss iteration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TripletStats {
    pub loss: f32,
    pub triplet_loss: f32,
    /// Cross-entropy part of a joint objective.
    pub xent_loss: Option<f32>,
    /// Percentage of anchors whose hardest negative is farther than
    /// their hardest positive.
    pub pull_ratio: f32,
    pub active_triplet: i64,
    pub mean_dist_an: f32,
    pub mean_dist_ap: f32,
}

impl TripletStats {
    pub fn mean_dist_difference(&self) -> f32 {
        self.mean_dist_an - self.mean_dist_ap
    }
}

/// Discriminator / generator readings shared by the GAN and the
/// adversarial iteration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GanStats {
    pub loss_real: f32,
    pub loss_fake: f32,
    pub loss_g: f32,
    /// Mean D(x) on real images.
    pub d_real: f32,
    /// Mean D(G(z)) before the discriminator update.
    pub d_fake: f32,
    /// Mean D(G(z)) after the discriminator update.
    pub d_fake_after: f32,
    pub discriminator_updated: bool,
    /// Re-ID cross-entropy / accuracy on generated images, when computed.
    pub reid_loss: Option<f32>,
    pub reid_acc: Option<f32>,
}

/// Adversarial iteration: the GAN readings plus the classifier update
/// on generated samples.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AdvStats {
    pub gan: GanStats,
    pub adv_updated: bool,
    /// Accuracy of the classifier on shifted-label fakes; 0 when skipped.
    pub adv_acc: f32,
}

/// Running mean of a scalar across an epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    sum:   f64,
    count: usize,
}

impl RunningMean {
    pub fn push(&mut self, value: f32) {
        self.sum   += value as f64;
        self.count += 1;
    }

    /// `NaN` for an empty epoch, the same convention the epoch CSV uses.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean() {
        let mut m = RunningMean::default();
        assert!(m.mean().is_nan());
        m.push(1.0);
        m.push(3.0);
        assert_eq!(m.count(), 2);
        assert!((m.mean() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_dist_difference() {
        let s = TripletStats { mean_dist_an: 1.5, mean_dist_ap: 0.5, ..Default::default() };
        assert!((s.mean_dist_difference() - 1.0).abs() < 1e-6);
    }
}
