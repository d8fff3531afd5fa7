use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{AdamConfig, Optimizer},
    tensor::backend::AutodiffBackend,
};

/// Adam settings of one network.
#[derive(Config, Debug)]
pub struct OptimizerConfig {
    pub lr: f64,
    #[config(default = 0.5)]
    pub beta_1: f32,
    #[config(default = 0.999)]
    pub beta_2: f32,
}

impl OptimizerConfig {
    /// Default settings of the generator optimizer.
    pub fn generator() -> Self {
        Self::new(1e-4)
    }

    /// Default settings of the discriminator optimizer.
    pub fn discriminator() -> Self {
        Self::new(3e-4)
    }

    /// Initializes an Adam optimizer for the module `M`.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> impl Optimizer<M, B> {
        AdamConfig::new()
            .with_beta_1(self.beta_1)
            .with_beta_2(self.beta_2)
            .init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_defaults() {
        let generator = OptimizerConfig::generator();
        let discriminator = OptimizerConfig::discriminator();

        assert_eq!(generator.lr, 1e-4);
        assert_eq!(discriminator.lr, 3e-4);
        assert_eq!(generator.beta_1, 0.5);
        assert_eq!(discriminator.beta_2, 0.999);
    }
}
