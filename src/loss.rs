use burn::config::Config;
use burn::tensor::activation::{log_sigmoid, sigmoid};
use burn::tensor::{backend::Backend, Tensor};

/// A loss optimized by the generator, computed from the discriminator logits of generated samples.
pub trait GeneratorLoss<B: Backend>: Send + Sync {
    /// Scalar loss for a batch of discriminator logits on generated samples.
    fn generator_loss(&self, fake_logits: Tensor<B, 1>) -> Tensor<B, 1>;
}

/// A loss optimized by the discriminator.
pub trait DiscriminatorLoss<B: Backend>: Send + Sync {
    /// Scalar loss from the discriminator logits of real and generated samples.
    fn discriminator_loss(&self, real_logits: Tensor<B, 1>, fake_logits: Tensor<B, 1>)
        -> Tensor<B, 1>;
}

/// Configuration for the [BoundarySeekingLoss](BoundarySeekingLoss).
///
/// By default the log-odds are computed from the logits with `log_sigmoid`, which is exact and
/// keeps a gradient for any finite logit. Setting `stable` to false evaluates the sigmoid
/// probabilities first, which saturates in floating point: with `epsilon = 0`, logits of large
/// magnitude produce an infinite loss.
#[derive(Config, Debug)]
pub struct BoundarySeekingLossConfig {
    /// Compute the log-odds with `log_sigmoid`. Default: true
    #[config(default = true)]
    pub stable: bool,
    /// Clamping of the sigmoid output when `stable` is false. Must be in `[0, 0.5)`. Default: 0.0
    #[config(default = 0.0)]
    pub epsilon: f64,
}

impl BoundarySeekingLossConfig {
    /// Initializes a [BoundarySeekingLoss](BoundarySeekingLoss).
    ///
    /// # Panics
    ///
    /// Panics if `epsilon` is not in `[0, 0.5)`.
    pub fn init(&self) -> BoundarySeekingLoss {
        self.assertions();
        BoundarySeekingLoss {
            stable: self.stable,
            epsilon: self.epsilon,
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..0.5).contains(&self.epsilon),
            "The parameter epsilon must be in [0, 0.5), got {}.",
            self.epsilon
        )
    }
}

/// Boundary seeking generator loss.
///
/// Pushes generated samples toward the decision boundary of the discriminator by minimizing the
/// squared log-odds of its estimate.
///
/// # Mathematical Definition
///
/// For logits `x` and `p = sigmoid(x)`:
///
/// `L = 0.5 * mean((log(p) - log(1 - p))^2)`
///
/// Since `log(p) - log(1 - p) = x`, this equals `0.5 * mean(x^2)` as long as `p` is not clamped.
#[derive(Clone, Debug)]
pub struct BoundarySeekingLoss {
    /// Compute the log-odds with `log_sigmoid`.
    pub stable: bool,
    /// Clamping of the sigmoid output when `stable` is false.
    pub epsilon: f64,
}

impl BoundarySeekingLoss {
    /// Computes the batch-averaged loss.
    ///
    /// # Shapes
    ///
    /// - logits: `[...dims]`
    /// - output: `[1]`
    pub fn forward<const D: usize, B: Backend>(&self, logits: Tensor<B, D>) -> Tensor<B, 1> {
        self.forward_no_reduction(logits).mean()
    }

    /// Computes the per-element loss `0.5 * (log(p) - log(1 - p))^2`.
    ///
    /// # Shapes
    ///
    /// - logits: `[...dims]`
    /// - output: `[...dims]`
    pub fn forward_no_reduction<const D: usize, B: Backend>(
        &self,
        logits: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let log_odds = if self.stable {
            // log(1 - sigmoid(x)) = log_sigmoid(-x)
            log_sigmoid(logits.clone()) - log_sigmoid(logits.neg())
        } else {
            let mut probs = sigmoid(logits);
            if self.epsilon > 0.0 {
                probs = probs.clamp(self.epsilon, 1.0 - self.epsilon);
            }
            probs.clone().log() - probs.neg().add_scalar(1.0).log()
        };

        log_odds.powf_scalar(2.0).mul_scalar(0.5)
    }
}

impl<B: Backend> GeneratorLoss<B> for BoundarySeekingLoss {
    fn generator_loss(&self, fake_logits: Tensor<B, 1>) -> Tensor<B, 1> {
        self.forward(fake_logits)
    }
}

/// Non-saturating minimax generator loss: binary cross entropy of the generated samples' logits
/// against the "real" label.
#[derive(Clone, Debug)]
pub struct MinimaxGeneratorLoss;

impl MinimaxGeneratorLoss {
    /// Computes `mean(-log(sigmoid(x)))`.
    pub fn forward<const D: usize, B: Backend>(&self, logits: Tensor<B, D>) -> Tensor<B, 1> {
        bce_with_logits(logits, 1.0)
    }
}

impl<B: Backend> GeneratorLoss<B> for MinimaxGeneratorLoss {
    fn generator_loss(&self, fake_logits: Tensor<B, 1>) -> Tensor<B, 1> {
        self.forward(fake_logits)
    }
}

/// Configuration for the [MinimaxDiscriminatorLoss](MinimaxDiscriminatorLoss).
#[derive(Config, Debug)]
pub struct MinimaxDiscriminatorLossConfig {
    /// One-sided label smoothing applied to the real targets. Must be in `[0, 1)`. Default: 0.0
    #[config(default = 0.0)]
    pub label_smoothing: f64,
}

impl MinimaxDiscriminatorLossConfig {
    /// Initializes a [MinimaxDiscriminatorLoss](MinimaxDiscriminatorLoss).
    ///
    /// # Panics
    ///
    /// Panics if `label_smoothing` is not in `[0, 1)`.
    pub fn init(&self) -> MinimaxDiscriminatorLoss {
        assert!(
            (0.0..1.0).contains(&self.label_smoothing),
            "The parameter label_smoothing must be in [0, 1), got {}.",
            self.label_smoothing
        );
        MinimaxDiscriminatorLoss {
            label_smoothing: self.label_smoothing,
        }
    }
}

/// Minimax discriminator loss: binary cross entropy of real logits against `1 - label_smoothing`
/// plus binary cross entropy of generated logits against `0`.
#[derive(Clone, Debug)]
pub struct MinimaxDiscriminatorLoss {
    /// One-sided label smoothing applied to the real targets.
    pub label_smoothing: f64,
}

impl MinimaxDiscriminatorLoss {
    /// Computes the discriminator loss.
    pub fn forward<const D: usize, B: Backend>(
        &self,
        real_logits: Tensor<B, D>,
        fake_logits: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let real = bce_with_logits(real_logits, 1.0 - self.label_smoothing);
        let fake = bce_with_logits(fake_logits, 0.0);

        real + fake
    }
}

impl<B: Backend> DiscriminatorLoss<B> for MinimaxDiscriminatorLoss {
    fn discriminator_loss(
        &self,
        real_logits: Tensor<B, 1>,
        fake_logits: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        self.forward(real_logits, fake_logits)
    }
}

/// Generator loss selection.
#[derive(Config, Debug)]
pub enum GeneratorLossConfig {
    /// The [BoundarySeekingLoss](BoundarySeekingLoss).
    BoundarySeeking(BoundarySeekingLossConfig),
    /// The [MinimaxGeneratorLoss](MinimaxGeneratorLoss).
    Minimax,
}

impl GeneratorLossConfig {
    /// Initializes the selected loss.
    pub fn init<B: Backend>(&self) -> Box<dyn GeneratorLoss<B>> {
        match self {
            Self::BoundarySeeking(config) => Box::new(config.init()),
            Self::Minimax => Box::new(MinimaxGeneratorLoss),
        }
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BoundarySeeking(_) => "boundary-seeking",
            Self::Minimax => "minimax",
        }
    }
}

/// Mean binary cross entropy of `logits` against a constant `target`.
fn bce_with_logits<const D: usize, B: Backend>(
    logits: Tensor<B, D>,
    target: f64,
) -> Tensor<B, 1> {
    let positive = log_sigmoid(logits.clone()).mul_scalar(target);
    let negative = log_sigmoid(logits.neg()).mul_scalar(1.0 - target);

    (positive + negative).neg().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::tensor::{Distribution, ElementConversion, TensorData};

    fn logits<const N: usize>(values: [f32; N]) -> Tensor<TestBackend, 1> {
        Tensor::from_data(TensorData::from(values), &Default::default())
    }

    fn scalar(tensor: Tensor<TestBackend, 1>) -> f32 {
        tensor.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_boundary_seeking_config_defaults() {
        let loss = BoundarySeekingLossConfig::new().init();
        assert!(loss.stable);
        assert_eq!(loss.epsilon, 0.0);
    }

    #[test]
    #[should_panic(expected = "The parameter epsilon must be in [0, 0.5)")]
    fn test_boundary_seeking_config_negative_epsilon_panics() {
        BoundarySeekingLossConfig::new().with_epsilon(-1e-3).init();
    }

    #[test]
    #[should_panic(expected = "The parameter epsilon must be in [0, 0.5)")]
    fn test_boundary_seeking_config_half_epsilon_panics() {
        BoundarySeekingLossConfig::new().with_epsilon(0.5).init();
    }

    #[test]
    fn test_boundary_seeking_zero_at_decision_boundary() {
        let loss = BoundarySeekingLossConfig::new().init();

        let output = loss.forward(logits([0.0, 0.0, 0.0, 0.0]));

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([0.0_f32]), 5);
    }

    #[test]
    fn test_boundary_seeking_matches_half_squared_logits() {
        // log(p) - log(1 - p) = x, so the loss is 0.5 * mean(x^2).
        // 0.5 * (1 + 4 + 0.25) / 3 = 0.875
        let loss = BoundarySeekingLossConfig::new().init();

        let output = loss.forward(logits([1.0, -2.0, 0.5]));

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([0.875_f32]), 3);
    }

    #[test]
    fn test_boundary_seeking_non_negative() {
        let device = Default::default();
        let loss = BoundarySeekingLossConfig::new().init();
        let input =
            Tensor::<TestBackend, 2>::random([16, 8], Distribution::Normal(0.0, 5.0), &device);

        let elements = loss.forward_no_reduction(input.clone());
        let output = scalar(loss.forward(input));

        assert!(output >= 0.0);
        let min = elements.min().into_scalar().elem::<f32>();
        assert!(min >= 0.0, "Negative element loss: {min}");
    }

    #[test]
    fn test_boundary_seeking_symmetric_under_negation() {
        let loss = BoundarySeekingLossConfig::new().init();
        let values = [3.0, -0.25, 1.5, -4.0, 0.1];
        let negated = values.map(|x| -x);

        let output = loss.forward(logits(values)).into_data();
        let output_negated = loss.forward(logits(negated)).into_data();

        output.assert_approx_eq(&output_negated, 3);
    }

    #[test]
    fn test_boundary_seeking_batch_is_mean_of_elements() {
        let loss = BoundarySeekingLossConfig::new().init();
        let values = [0.3_f32, -1.2, 2.5, -0.7];

        let batch = scalar(loss.forward(logits(values)));
        let individual: f32 = values
            .iter()
            .map(|value| scalar(loss.forward(logits([*value]))))
            .sum::<f32>()
            / values.len() as f32;

        assert!(
            (batch - individual).abs() < 1e-5,
            "Batch loss {batch} differs from element mean {individual}"
        );
    }

    #[test]
    fn test_boundary_seeking_no_reduction_shape() {
        let device = Default::default();
        let loss = BoundarySeekingLossConfig::new().init();
        let input = Tensor::<TestBackend, 3>::zeros([2, 3, 4], &device);

        let output = loss.forward_no_reduction(input);

        assert_eq!(output.dims(), [2, 3, 4]);
    }

    #[test]
    fn test_boundary_seeking_unclamped_saturation_is_not_finite() {
        let loss = BoundarySeekingLossConfig::new().with_stable(false).init();

        let positive = scalar(loss.forward(logits([100.0])));
        let negative = scalar(loss.forward(logits([-100.0])));

        assert!(!positive.is_finite(), "Expected non finite loss, got {positive}");
        assert!(!negative.is_finite(), "Expected non finite loss, got {negative}");
    }

    #[test]
    fn test_boundary_seeking_clamped_saturation_is_finite() {
        let loss = BoundarySeekingLossConfig::new()
            .with_stable(false)
            .with_epsilon(1e-7)
            .init();

        let output = scalar(loss.forward(logits([100.0, -100.0, 1e6, -1e6])));

        assert!(output.is_finite(), "Expected finite loss, got {output}");
        assert!(output > 0.0);
    }

    #[test]
    fn test_boundary_seeking_stable_saturation_is_finite() {
        let loss = BoundarySeekingLossConfig::new().init();

        let output = scalar(loss.forward(logits([100.0, -100.0])));

        // 0.5 * (100^2 + 100^2) / 2
        assert!((output - 5000.0).abs() < 1e-1, "Expected 5000, got {output}");
    }

    #[test]
    fn test_boundary_seeking_confident_rejection_keeps_gradient() {
        // The discriminator rejects a sample with logit -20: the loss is 0.5 * 20^2 and its
        // gradient with respect to the logit is -20.
        let device = Default::default();
        let loss = BoundarySeekingLossConfig::new().init();
        let input = Tensor::<TestAutodiffBackend, 1>::from_data(
            TensorData::from([-20.0_f32]),
            &device,
        )
        .require_grad();

        let output = loss.forward(input.clone());
        let grads = output.backward();
        let grad = input.grad(&grads).unwrap();

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([200.0_f32]), 3);
        grad.into_data()
            .assert_approx_eq(&TensorData::from([-20.0_f32]), 3);
    }

    #[test]
    fn test_minimax_generator_at_zero_logits() {
        // -log(0.5) = ln 2
        let loss = MinimaxGeneratorLoss;

        let output = loss.forward(logits([0.0, 0.0]));

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([core::f32::consts::LN_2]), 4);
    }

    #[test]
    fn test_minimax_generator_decreases_with_confidence() {
        let loss = MinimaxGeneratorLoss;

        let fooled = scalar(loss.forward(logits([4.0])));
        let caught = scalar(loss.forward(logits([-4.0])));

        assert!(fooled < caught);
    }

    #[test]
    fn test_minimax_discriminator_at_zero_logits() {
        // -log(0.5) for each term.
        let loss = MinimaxDiscriminatorLossConfig::new().init();

        let output = loss.forward(logits([0.0, 0.0]), logits([0.0, 0.0]));

        output
            .into_data()
            .assert_approx_eq(&TensorData::from([2.0 * core::f32::consts::LN_2]), 4);
    }

    #[test]
    fn test_minimax_discriminator_large_logits_are_stable() {
        let loss = MinimaxDiscriminatorLossConfig::new().init();

        let confident = scalar(loss.forward(logits([200.0]), logits([-200.0])));
        let wrong = scalar(loss.forward(logits([-200.0]), logits([200.0])));

        assert!(confident.abs() < 1e-4, "Expected ~0, got {confident}");
        assert!(wrong.is_finite());
        assert!((wrong - 400.0).abs() < 1e-1, "Expected ~400, got {wrong}");
    }

    #[test]
    fn test_minimax_discriminator_label_smoothing() {
        // Real term with target 0.9 at x = 0 is still ln 2.
        // Real term at x = 2: -(0.9 * log_sigmoid(2) + 0.1 * log_sigmoid(-2))
        let loss = MinimaxDiscriminatorLossConfig::new()
            .with_label_smoothing(0.1)
            .init();
        let log_sigmoid = |x: f32| -(1.0 + (-x).exp()).ln();
        let expected = -(0.9 * log_sigmoid(2.0) + 0.1 * log_sigmoid(-2.0)) - log_sigmoid(0.0);

        let output = scalar(loss.forward(logits([2.0]), logits([0.0])));

        assert!((output - expected).abs() < 1e-4, "{output} != {expected}");
    }

    #[test]
    #[should_panic(expected = "The parameter label_smoothing must be in [0, 1)")]
    fn test_minimax_discriminator_invalid_label_smoothing_panics() {
        MinimaxDiscriminatorLossConfig::new()
            .with_label_smoothing(1.0)
            .init();
    }

    #[test]
    fn test_generator_loss_config_selects_loss() {
        let boundary = GeneratorLossConfig::BoundarySeeking(BoundarySeekingLossConfig::new())
            .init::<TestBackend>();
        let minimax = GeneratorLossConfig::Minimax.init::<TestBackend>();

        let boundary = scalar(boundary.generator_loss(logits([0.0])));
        let minimax = scalar(minimax.generator_loss(logits([0.0])));

        assert!(boundary.abs() < 1e-6);
        assert!((minimax - core::f32::consts::LN_2).abs() < 1e-4);
    }
}
