use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ReidNetConfig {
    /// Flattened image size, C * H * W.
    pub input_dim:   usize,
    pub num_classes: usize,
    #[config(default = 256)]
    pub hidden_dim:  usize,
    #[config(default = 128)]
    pub feature_dim: usize,
    /// 0 = single classifier; N > 0 = N part heads over equal feature slices.
    #[config(default = 0)]
    pub pcb_n_parts: usize,
    #[config(default = 0.0)]
    pub dropout:     f64,
}

impl ReidNetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReidNet<B> {
        let backbone = LinearConfig::new(self.input_dim, self.hidden_dim).init(device);
        let embed    = LinearConfig::new(self.hidden_dim, self.feature_dim).init(device);
        let heads: Vec<Linear<B>> = if self.pcb_n_parts == 0 {
            vec![LinearConfig::new(self.feature_dim, self.num_classes).init(device)]
        } else {
            let part_dim = self.feature_dim / self.pcb_n_parts;
            (0..self.pcb_n_parts)
                .map(|_| LinearConfig::new(part_dim, self.num_classes).init(device))
                .collect()
        };
        let dropout = DropoutConfig::new(self.dropout).init();
        ReidNet { backbone, embed, heads, dropout, pcb_n_parts: self.pcb_n_parts }
    }
}

/// Re-ID network: a shared embedding followed by one identity head, or by
/// one head per horizontal part when PCB is enabled.
#[derive(Module, Debug)]
pub struct ReidNet<B: Backend> {
    pub backbone:    Linear<B>,
    pub embed:       Linear<B>,
    pub heads:       Vec<Linear<B>>,
    pub dropout:     Dropout,
    pub pcb_n_parts: usize,
}

pub struct ReidOutput<B: Backend> {
    /// [batch, feature_dim]
    pub features: Tensor<B, 2>,
    /// One [batch, num_classes] tensor per head.
    pub logits:   Vec<Tensor<B, 2>>,
}

impl<B: Backend> ReidNet<B> {
    /// images: [batch, C, H, W]
    pub fn forward(&self, images: Tensor<B, 4>) -> ReidOutput<B> {
        let features = self.forward_features(images);

        let parts = if self.pcb_n_parts == 0 {
            vec![features.clone()]
        } else {
            features.clone().chunk(self.pcb_n_parts, 1)
        };
        let logits = parts
            .into_iter()
            .zip(&self.heads)
            .map(|(part, head)| head.forward(part))
            .collect();

        ReidOutput { features, logits }
    }

    pub fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.flatten::<2>(1, 3);
        let x = relu(self.backbone.forward(x));
        self.embed.forward(self.dropout.forward(x))
    }
}
