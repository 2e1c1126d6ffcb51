// ============================================================
// Layer 4 — Batch Samplers
// ============================================================
// Two ways of cutting an epoch into index batches:
//
//   ShuffledSampler — plain shuffled mini-batches for the
//                     cross-entropy and GAN modes. The trailing
//                     partial batch is dropped so every iteration
//                     sees `batch_size` samples.
//
//   PkSampler       — class-balanced P×K batches for triplet loss:
//                     P identities, K crops each. Identities with
//                     fewer than K crops are sampled with
//                     replacement so every anchor has a positive.

use rand::{rngs::StdRng, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

pub struct ShuffledSampler {
    len:        usize,
    batch_size: usize,
}

impl ShuffledSampler {
    pub fn new(len: usize, batch_size: usize) -> Self {
        Self { len, batch_size: batch_size.max(1) }
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.len / self.batch_size
    }

    pub fn epoch(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.len).collect();
        order.shuffle(rng);
        order
            .chunks_exact(self.batch_size)
            .map(|c| c.to_vec())
            .collect()
    }
}

/// P identities per batch, K crops per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSamplingParams {
    pub p: usize,
    pub k: usize,
}

impl Default for BatchSamplingParams {
    fn default() -> Self {
        Self { p: 8, k: 4 }
    }
}

impl BatchSamplingParams {
    pub fn batch_size(&self) -> usize {
        self.p * self.k
    }
}

pub struct PkSampler {
    groups: Vec<Vec<usize>>,
    params: BatchSamplingParams,
}

impl PkSampler {
    /// `groups` holds the sample indices of each identity.
    pub fn new(groups: Vec<Vec<usize>>, params: BatchSamplingParams) -> Self {
        let groups = groups.into_iter().filter(|g| !g.is_empty()).collect();
        Self { groups, params }
    }

    pub fn batches_per_epoch(&self) -> usize {
        if self.params.p == 0 {
            return 0;
        }
        self.groups.len() / self.params.p
    }

    pub fn epoch(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let mut ids: Vec<usize> = (0..self.groups.len()).collect();
        ids.shuffle(rng);

        ids.chunks_exact(self.params.p.max(1))
            .map(|chunk| {
                let mut batch = Vec::with_capacity(self.params.batch_size());
                for &id in chunk {
                    batch.extend(self.pick(&self.groups[id], rng));
                }
                batch
            })
            .collect()
    }

    fn pick(&self, group: &[usize], rng: &mut StdRng) -> Vec<usize> {
        let k = self.params.k;
        if group.len() >= k {
            group.choose_multiple(rng, k).copied().collect()
        } else {
            (0..k).map(|_| group[rng.gen_range(0..group.len())]).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_shuffled_drops_partial_batch() {
        let mut rng = StdRng::seed_from_u64(0);
        let s = ShuffledSampler::new(10, 4);
        let batches = s.epoch(&mut rng);
        assert_eq!(batches.len(), 2);
        assert_eq!(s.batches_per_epoch(), 2);
        assert!(batches.iter().all(|b| b.len() == 4));
    }

    #[test]
    fn test_pk_batches_are_class_balanced() {
        let mut rng = StdRng::seed_from_u64(1);
        // identity i owns indices [10*i, 10*i + 5)
        let groups: Vec<Vec<usize>> = (0..6).map(|i| (10 * i..10 * i + 5).collect()).collect();
        let s = PkSampler::new(groups, BatchSamplingParams { p: 3, k: 2 });

        let batches = s.epoch(&mut rng);
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.len(), 6);
            for pair in batch.chunks(2) {
                assert_eq!(pair[0] / 10, pair[1] / 10);
            }
        }
    }

    #[test]
    fn test_pk_small_identity_samples_with_replacement() {
        let mut rng = StdRng::seed_from_u64(2);
        let s = PkSampler::new(vec![vec![42], vec![7, 8]], BatchSamplingParams { p: 2, k: 3 });
        let batches = s.epoch(&mut rng);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 6);
        assert!(batch.iter().filter(|&&i| i == 42).count() == 3);
    }
}
