use burn::{
    nn::{
        loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig},
        Linear, LinearConfig,
    },
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{
        activation::{leaky_relu, relu},
        backend::AutodiffBackend,
    },
};

#[derive(Config, Debug)]
pub struct GanConfig {
    /// Noise / feature dimension fed to the generator.
    pub input_dim: usize,
    pub channels:  usize,
    pub height:    usize,
    pub width:     usize,
    #[config(default = 256)]
    pub hidden_dim: usize,
}

impl GanConfig {
    fn image_numel(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        Generator {
            fc1:      LinearConfig::new(self.input_dim, self.hidden_dim).init(device),
            fc2:      LinearConfig::new(self.hidden_dim, self.image_numel()).init(device),
            channels: self.channels,
            height:   self.height,
            width:    self.width,
        }
    }

    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        Discriminator {
            fc1: LinearConfig::new(self.image_numel(), self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, 1).init(device),
        }
    }
}

/// Unit-norm code → image in the tanh range.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    pub fc1:      Linear<B>,
    pub fc2:      Linear<B>,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl<B: Backend> Generator<B> {
    /// code: [batch, input_dim] → [batch, C, H, W]
    pub fn forward(&self, code: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = code.dims();
        let x = relu(self.fc1.forward(code));
        self.fc2
            .forward(x)
            .tanh()
            .reshape([batch, self.channels, self.height, self.width])
    }
}

/// Image → real/fake logit.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl<B: Backend> Discriminator<B> {
    /// images: [batch, C, H, W] → logits [batch, 1]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.flatten::<2>(1, 3);
        let x = leaky_relu(self.fc1.forward(x), 0.2);
        self.fc2.forward(x)
    }
}

/// Row-wise L2 normalisation, used on generator inputs.
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let dims = x.dims();
    let norm = x
        .clone()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(1e-12)
        .expand(dims);
    x / norm
}

/// Generator, discriminator, their optimizers and the real/fake criterion.
/// Burn modules are updated functionally, so each step swaps the module
/// for the one returned by the optimizer.
pub struct GanPair<B: AutodiffBackend, OG, OD> {
    pub generator:     Generator<B>,
    pub discriminator: Discriminator<B>,
    pub optim_g:       OG,
    pub optim_d:       OD,
    pub criterion:     BinaryCrossEntropyLoss<B>,
    pub lr:            f64,
}

pub fn init_gan_pair<B: AutodiffBackend>(
    config: &GanConfig,
    lr:     f64,
    device: &B::Device,
) -> GanPair<B, impl Optimizer<Generator<B>, B>, impl Optimizer<Discriminator<B>, B>> {
    let optim_cfg = AdamConfig::new().with_beta_1(0.5);
    GanPair {
        generator:     config.init_generator(device),
        discriminator: config.init_discriminator(device),
        optim_g:       optim_cfg.init::<B, Generator<B>>(),
        optim_d:       optim_cfg.init::<B, Discriminator<B>>(),
        criterion:     BinaryCrossEntropyLossConfig::new().with_logits(true).init(device),
        lr,
    }
}

impl<B, OG, OD> GanPair<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    pub fn step_discriminator(&mut self, loss: Tensor<B, 1>) {
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.discriminator);
        self.discriminator = self.optim_d.step(self.lr, self.discriminator.clone(), grads);
    }

    /// Only generator parameters are updated; gradients reaching the
    /// discriminator or the re-ID net through `loss` are dropped.
    pub fn step_generator(&mut self, loss: Tensor<B, 1>) {
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.generator);
        self.generator = self.optim_g.step(self.lr, self.generator.clone(), grads);
    }
}
