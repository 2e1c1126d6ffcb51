// ============================================================
// Layer 3 — Training Mode
// ============================================================
// A run is driven by exactly one of four objectives:
//
//   softmax     — cross-entropy on identity labels
//   triplet     — triplet loss (optionally joint with cross-entropy)
//                 on class-balanced P×K batches
//   gan         — softmax step, then a generator/discriminator
//                 update from random unit-norm noise
//   adversarial — softmax step, then a GAN update seeded with
//                 the re-ID features; generated images are fed
//                 back to the classifier under shifted labels

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    Softmax,
    Triplet,
    Gan,
    Adversarial,
}

impl TrainMode {
    /// Modes that own a generator/discriminator pair.
    pub fn uses_gan(self) -> bool {
        matches!(self, TrainMode::Gan | TrainMode::Adversarial)
    }

    /// The adversarial mode trains the classifier on generated images
    /// labelled `label + num_labels`, so its head is twice as wide.
    pub fn classifier_width(self, num_labels: usize) -> usize {
        match self {
            TrainMode::Adversarial => num_labels * 2,
            _ => num_labels,
        }
    }
}

impl std::fmt::Display for TrainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrainMode::Softmax     => "softmax",
            TrainMode::Triplet     => "triplet",
            TrainMode::Gan         => "gan",
            TrainMode::Adversarial => "adversarial",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_width_doubles_only_for_adversarial() {
        assert_eq!(TrainMode::Softmax.classifier_width(10), 10);
        assert_eq!(TrainMode::Gan.classifier_width(10), 10);
        assert_eq!(TrainMode::Adversarial.classifier_width(10), 20);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TrainMode::Adversarial).unwrap();
        assert_eq!(json, "\"adversarial\"");
        let back: TrainMode = serde_json::from_str("\"triplet\"").unwrap();
        assert_eq!(back, TrainMode::Triplet);
    }
}
