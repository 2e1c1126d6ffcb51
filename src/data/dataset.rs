use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// Channel-first image geometry shared by the data, the re-ID net
/// and the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageShape {
    pub fn numel(&self) -> usize {
        self.channels * self.height * self.width
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        // person crops are taller than wide
        Self { channels: 3, height: 16, width: 8 }
    }
}

/// One person crop, flattened channel-first, with its identity label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReidSample {
    pub pixels: Vec<f32>,
    pub label:  usize,
}

pub struct ReidDataset {
    samples: Vec<ReidSample>,
    shape:   ImageShape,
}

impl ReidDataset {
    pub fn new(samples: Vec<ReidSample>, shape: ImageShape) -> Self {
        Self { samples, shape }
    }

    pub fn shape(&self) -> ImageShape { self.shape }

    pub fn samples(&self) -> &[ReidSample] { &self.samples }

    /// Number of distinct identities present.
    pub fn num_identities(&self) -> usize {
        let mut labels: Vec<usize> = self.samples.iter().map(|s| s.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels.len()
    }

    /// Sample indices grouped by label, ordered by label.
    pub fn indices_by_label(&self) -> Vec<(usize, Vec<usize>)> {
        let mut groups: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
        for (i, s) in self.samples.iter().enumerate() {
            groups.entry(s.label).or_default().push(i);
        }
        groups.into_iter().collect()
    }
}

impl Dataset<ReidSample> for ReidDataset {
    fn get(&self, index: usize) -> Option<ReidSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: usize) -> ReidSample {
        ReidSample { pixels: vec![0.0; 4], label }
    }

    #[test]
    fn test_indices_by_label() {
        let ds = ReidDataset::new(
            vec![sample(2), sample(0), sample(2), sample(1)],
            ImageShape { channels: 1, height: 2, width: 2 },
        );
        let groups = ds.indices_by_label();
        assert_eq!(groups, vec![(0, vec![1]), (1, vec![3]), (2, vec![0, 2])]);
        assert_eq!(ds.num_identities(), 3);
        assert_eq!(ds.len(), 4);
    }

    #[test]
    fn test_get_returns_owned_samples() {
        let shape = ImageShape { channels: 1, height: 2, width: 2 };
        let ds = ReidDataset::new(vec![sample(5), sample(6)], shape);
        assert_eq!(ds.get(1).unwrap().label, 6);
        assert!(ds.get(2).is_none());
        assert_eq!(ds.shape(), shape);
    }
}
