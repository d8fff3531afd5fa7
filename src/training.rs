use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::{
    data::{
        dataloader::{DataLoader, DataLoaderBuilder},
        dataset::{vision::MnistItem, Dataset},
    },
    module::{AutodiffModule, Module},
    optim::{GradientsParams, Optimizer},
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::{
    checkpoint::{
        CheckpointingAction, CheckpointingStrategy, FileCheckpointer, KeepLastCheckpoints,
        DISCRIMINATOR, DISCRIMINATOR_OPTIMIZER, FIXED_NOISE, GENERATOR, GENERATOR_OPTIMIZER,
    },
    data::{mnist_train, MnistBatch, MnistBatcher},
    error::GanError,
    loss::{
        BoundarySeekingLossConfig, DiscriminatorLoss, GeneratorLoss, GeneratorLossConfig,
        MinimaxDiscriminatorLossConfig,
    },
    model::{DcganConfig, Discriminator, Generator},
    optim::OptimizerConfig,
    show::{grid_columns, save_grid},
};

#[derive(Config)]
pub struct TrainingConfig {
    #[config(default = "DcganConfig::new()")]
    pub model: DcganConfig,
    #[config(default = "OptimizerConfig::generator()")]
    pub generator_optimizer: OptimizerConfig,
    #[config(default = "OptimizerConfig::discriminator()")]
    pub discriminator_optimizer: OptimizerConfig,
    #[config(default = "GeneratorLossConfig::BoundarySeeking(BoundarySeekingLossConfig::new())")]
    pub generator_loss: GeneratorLossConfig,
    #[config(default = "MinimaxDiscriminatorLossConfig::new()")]
    pub discriminator_loss: MinimaxDiscriminatorLossConfig,
    #[config(default = 5)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 8)]
    pub num_workers: usize,
    #[config(default = 42)]
    pub seed: u64,
    /// Ratio of discriminator to generator updates. A positive value `n` updates the generator
    /// every `n` batches, a negative value `-n` updates the discriminator every `n` batches.
    #[config(default = 1)]
    pub ncritic: i64,
    /// Number of images generated from fixed noise at the end of each epoch.
    #[config(default = 64)]
    pub sample_size: usize,
    #[config(default = 100)]
    pub log_interval: usize,
    /// Number of epoch checkpoints kept on disk.
    #[config(default = 5)]
    pub num_checkpoints: usize,
    /// Train on the first `max_items` images only.
    #[config(default = "None")]
    pub max_items: Option<usize>,
}

impl TrainingConfig {
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |message: &str| Err(GanError::InvalidConfig(message.to_string()));

        if self.ncritic == 0 {
            return invalid("ncritic must not be zero");
        }
        if self.num_epochs == 0 {
            return invalid("num_epochs must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive");
        }
        if self.sample_size == 0 {
            return invalid("sample_size must be positive");
        }
        if self.log_interval == 0 {
            return invalid("log_interval must be positive");
        }

        self.model.validate()
    }
}

/// Networks updated on one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Updates {
    pub generator: bool,
    pub discriminator: bool,
}

/// Networks to update given the critic ratio and the number of batches trained so far.
pub fn scheduled_updates(ncritic: i64, batches_trained: usize) -> Updates {
    let on_period = batches_trained % ncritic.unsigned_abs().max(1) as usize == 0;

    if ncritic > 0 {
        Updates {
            generator: on_period,
            discriminator: true,
        }
    } else {
        Updates {
            generator: true,
            discriminator: on_period,
        }
    }
}

/// Mean losses and update counts of one epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    pub epoch: usize,
    pub generator_loss: Option<f64>,
    pub discriminator_loss: Option<f64>,
    pub generator_updates: usize,
    pub discriminator_updates: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    /// Grid of generated images written at the end of each epoch.
    pub samples: Vec<PathBuf>,
    /// Grid of real training images.
    pub real_samples: Option<PathBuf>,
}

impl TrainingReport {
    pub fn load(path: &Path) -> crate::Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Drops the epochs after `last_epoch`.
    pub fn truncate(&mut self, last_epoch: usize) {
        let keep = self
            .epochs
            .iter()
            .take_while(|summary| summary.epoch <= last_epoch)
            .count();
        self.epochs.truncate(keep);
        self.samples.truncate(keep);
    }
}

#[derive(Default)]
struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

fn format_loss(loss: Option<f64>) -> String {
    loss.map_or_else(|| "-".to_string(), |loss| format!("{loss:.4}"))
}

/// Adversarial trainer of a generator and a discriminator.
pub struct GanTrainer<B: AutodiffBackend, OG, OD> {
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    generator_optimizer: OG,
    discriminator_optimizer: OD,
    generator_losses: Vec<Box<dyn GeneratorLoss<B>>>,
    discriminator_losses: Vec<Box<dyn DiscriminatorLoss<B>>>,
    config: TrainingConfig,
    fixed_noise: Tensor<B::InnerBackend, 2>,
    checkpointer: FileCheckpointer,
    strategy: KeepLastCheckpoints,
    artifact_dir: PathBuf,
    device: B::Device,
    batches_trained: usize,
    real_samples: Option<PathBuf>,
}

/// Builds a trainer from the configuration: networks, Adam optimizers and losses.
#[allow(clippy::type_complexity)]
pub fn init_trainer<B: AutodiffBackend>(
    config: &TrainingConfig,
    artifact_dir: &Path,
    device: &B::Device,
) -> crate::Result<
    GanTrainer<
        B,
        impl Optimizer<Generator<B>, B>,
        impl Optimizer<Discriminator<B>, B>,
    >,
> {
    config.validate()?;
    let (generator, discriminator) = config.model.init::<B>(device);

    GanTrainer::new(
        config.clone(),
        generator,
        discriminator,
        config.generator_optimizer.init::<B, Generator<B>>(),
        config.discriminator_optimizer.init::<B, Discriminator<B>>(),
        vec![config.generator_loss.init()],
        vec![Box::new(config.discriminator_loss.init()) as Box<dyn DiscriminatorLoss<B>>],
        artifact_dir,
        device,
    )
}

impl<B, OG, OD> GanTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TrainingConfig,
        generator: Generator<B>,
        discriminator: Discriminator<B>,
        generator_optimizer: OG,
        discriminator_optimizer: OD,
        generator_losses: Vec<Box<dyn GeneratorLoss<B>>>,
        discriminator_losses: Vec<Box<dyn DiscriminatorLoss<B>>>,
        artifact_dir: &Path,
        device: &B::Device,
    ) -> crate::Result<Self> {
        if generator_losses.is_empty() || discriminator_losses.is_empty() {
            return Err(GanError::InvalidConfig(
                "At least one generator loss and one discriminator loss are required".to_string(),
            ));
        }

        let fixed_noise = generator.valid().sample_noise(config.sample_size, device);
        let strategy = KeepLastCheckpoints::new(config.num_checkpoints);

        Ok(Self {
            generator,
            discriminator,
            generator_optimizer,
            discriminator_optimizer,
            generator_losses,
            discriminator_losses,
            config,
            fixed_noise,
            checkpointer: FileCheckpointer::new(artifact_dir.join("checkpoint")),
            strategy,
            artifact_dir: artifact_dir.to_path_buf(),
            device: device.clone(),
            batches_trained: 0,
            real_samples: None,
        })
    }

    /// Directory where image samples are written.
    pub fn images_dir(&self) -> PathBuf {
        self.artifact_dir.join("images")
    }

    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.discriminator
    }

    /// Loads the networks, the optimizer states and the fixed noise of a saved epoch.
    pub fn restore(mut self, epoch: usize) -> crate::Result<Self> {
        if !self.checkpointer.exists(epoch) {
            return Err(GanError::MissingCheckpoint(epoch));
        }
        let device = self.device.clone();
        let checkpointer = self.checkpointer.clone();

        let record = checkpointer.load::<B, _>(GENERATOR, epoch, &device)?;
        self.generator = self.generator.load_record(record);
        let record = checkpointer.load::<B, _>(DISCRIMINATOR, epoch, &device)?;
        self.discriminator = self.discriminator.load_record(record);
        let record = checkpointer.load::<B, _>(GENERATOR_OPTIMIZER, epoch, &device)?;
        self.generator_optimizer = self.generator_optimizer.load_record(record);
        let record = checkpointer.load::<B, _>(DISCRIMINATOR_OPTIMIZER, epoch, &device)?;
        self.discriminator_optimizer = self.discriminator_optimizer.load_record(record);
        self.fixed_noise = checkpointer.load::<B::InnerBackend, _>(FIXED_NOISE, epoch, &device)?;

        log::info!("Restored checkpoint of epoch {epoch}");
        Ok(self)
    }

    /// Saves everything needed to continue training after `epoch`.
    pub fn save_checkpoint(&self, epoch: usize) -> crate::Result<()> {
        let checkpointer = &self.checkpointer;

        checkpointer.save::<B, _>(GENERATOR, epoch, self.generator.clone().into_record())?;
        checkpointer.save::<B, _>(
            DISCRIMINATOR,
            epoch,
            self.discriminator.clone().into_record(),
        )?;
        checkpointer.save::<B, _>(
            GENERATOR_OPTIMIZER,
            epoch,
            self.generator_optimizer.to_record(),
        )?;
        checkpointer.save::<B, _>(
            DISCRIMINATOR_OPTIMIZER,
            epoch,
            self.discriminator_optimizer.to_record(),
        )?;
        checkpointer.save::<B::InnerBackend, _>(FIXED_NOISE, epoch, self.fixed_noise.clone())?;

        log::info!("Saved checkpoint of epoch {epoch}");
        Ok(())
    }

    /// Applies the checkpointing strategy at the end of `epoch`.
    pub fn checkpoint(&mut self, epoch: usize) -> crate::Result<()> {
        for action in self.strategy.checkpointing(epoch) {
            match action {
                CheckpointingAction::Save => self.save_checkpoint(epoch)?,
                CheckpointingAction::Delete(epoch) => self.checkpointer.delete(epoch)?,
            }
        }

        Ok(())
    }

    /// One generator update on `batch_size` fresh samples. Returns the loss.
    pub fn generator_step(&mut self, batch_size: usize) -> f64 {
        let noise = self.generator.sample_noise(batch_size, &self.device);
        self.generator_step_on(noise)
    }

    /// One generator update on the given noise. Returns the loss.
    pub fn generator_step_on(&mut self, noise: Tensor<B, 2>) -> f64 {
        let logits = self.discriminator.forward(self.generator.forward(noise));

        let loss = self
            .generator_losses
            .iter()
            .map(|loss| loss.generator_loss(logits.clone()))
            .fold(Tensor::zeros([1], &self.device), |acc, loss| acc + loss);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.generator);
        self.generator = self.generator_optimizer.step(
            self.config.generator_optimizer.lr,
            self.generator.clone(),
            grads,
        );

        loss.into_scalar().elem::<f64>()
    }

    /// One discriminator update on `real` images and as many generated ones. Returns the loss.
    pub fn discriminator_step(&mut self, real: Tensor<B, 4>) -> f64 {
        let [batch_size, _, _, _] = real.dims();
        let noise = self.generator.sample_noise(batch_size, &self.device);
        let fake = self.generator.forward(noise).detach();

        let real_logits = self.discriminator.forward(real);
        let fake_logits = self.discriminator.forward(fake);

        let loss = self
            .discriminator_losses
            .iter()
            .map(|loss| loss.discriminator_loss(real_logits.clone(), fake_logits.clone()))
            .fold(Tensor::zeros([1], &self.device), |acc, loss| acc + loss);

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.discriminator);
        self.discriminator = self.discriminator_optimizer.step(
            self.config.discriminator_optimizer.lr,
            self.discriminator.clone(),
            grads,
        );

        loss.into_scalar().elem::<f64>()
    }

    /// Trains on one pass over the data loader.
    pub fn train_epoch(
        &mut self,
        epoch: usize,
        dataloader: &Arc<dyn DataLoader<MnistBatch<B>>>,
    ) -> crate::Result<EpochSummary> {
        let mut generator_loss = RunningMean::default();
        let mut discriminator_loss = RunningMean::default();

        for (iteration, batch) in dataloader.iter().enumerate() {
            if self.real_samples.is_none() {
                self.save_real_samples(&batch)?;
            }

            let [batch_size, _, _, _] = batch.images.dims();
            let updates = scheduled_updates(self.config.ncritic, self.batches_trained);

            if updates.generator {
                let loss = self.generator_step(batch_size);
                log::debug!("Generator step {}: loss {loss:.4}", self.batches_trained);
                generator_loss.push(loss);
            }
            if updates.discriminator {
                let loss = self.discriminator_step(batch.images);
                log::debug!("Discriminator step {}: loss {loss:.4}", self.batches_trained);
                discriminator_loss.push(loss);
            }
            self.batches_trained += 1;

            if (iteration + 1) % self.config.log_interval == 0 {
                log::info!(
                    "[Epoch {}/{}] [Batch {}] [D loss: {}] [G loss: {}]",
                    epoch,
                    self.config.num_epochs,
                    iteration + 1,
                    format_loss(discriminator_loss.mean()),
                    format_loss(generator_loss.mean()),
                );
            }
        }

        Ok(EpochSummary {
            epoch,
            generator_loss: generator_loss.mean(),
            discriminator_loss: discriminator_loss.mean(),
            generator_updates: generator_loss.count,
            discriminator_updates: discriminator_loss.count,
        })
    }

    /// Writes the images generated from the fixed noise for `epoch`.
    pub fn sample(&self, epoch: usize) -> crate::Result<PathBuf> {
        let path = self.images_dir().join(format!("epoch{epoch}_generator.png"));
        let images = self.generator.valid().forward(self.fixed_noise.clone());

        save_grid(images, grid_columns(self.config.sample_size), &path)?;
        Ok(path)
    }

    fn save_real_samples(&mut self, batch: &MnistBatch<B>) -> crate::Result<()> {
        let [batch_size, _, _, _] = batch.images.dims();
        let count = batch_size.min(self.config.sample_size);
        let path = self.images_dir().join("real.png");

        save_grid(
            batch.images.clone().slice([0..count]),
            grid_columns(count),
            &path,
        )?;
        self.real_samples = Some(path);

        Ok(())
    }

    /// Trains from `starting_epoch` to the configured number of epochs, sampling and
    /// checkpointing after each epoch, then saves the final networks and the report.
    ///
    /// The summaries of the new epochs are appended to `report`.
    pub fn fit(
        &mut self,
        dataloader: Arc<dyn DataLoader<MnistBatch<B>>>,
        starting_epoch: usize,
        mut report: TrainingReport,
    ) -> crate::Result<TrainingReport> {
        for epoch in starting_epoch..=self.config.num_epochs {
            let summary = self.train_epoch(epoch, &dataloader)?;
            log::info!(
                "Epoch {}/{} done: mean D loss {}, mean G loss {} ({} D / {} G updates)",
                epoch,
                self.config.num_epochs,
                format_loss(summary.discriminator_loss),
                format_loss(summary.generator_loss),
                summary.discriminator_updates,
                summary.generator_updates,
            );

            report.samples.push(self.sample(epoch)?);
            self.checkpoint(epoch)?;
            report.epochs.push(summary);
        }
        report.real_samples = self.real_samples.clone().or(report.real_samples);

        self.save()?;
        report.save(&self.artifact_dir.join("report.json"))?;
        log::info!("Training done, samples in {}", self.images_dir().display());

        Ok(report)
    }

    /// Saves the final generator and discriminator records.
    pub fn save(&self) -> crate::Result<()> {
        let recorder = CompactRecorder::new();
        self.generator
            .clone()
            .save_file(self.artifact_dir.join("generator"), &recorder)?;
        self.discriminator
            .clone()
            .save_file(self.artifact_dir.join("discriminator"), &recorder)?;

        Ok(())
    }
}

/// Removes existing artifacts and recreates the directory.
pub fn create_artifact_dir(artifact_dir: &Path) -> crate::Result<()> {
    if artifact_dir.exists() {
        std::fs::remove_dir_all(artifact_dir)?;
    }
    std::fs::create_dir_all(artifact_dir)?;

    Ok(())
}

fn build_dataloader<B, D>(
    config: &TrainingConfig,
    dataset: D,
    device: &B::Device,
    shuffle_seed: u64,
) -> Arc<dyn DataLoader<MnistBatch<B>>>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
{
    let batcher = MnistBatcher::<B>::new(device.clone(), config.model.image_size());
    let mut builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .shuffle(shuffle_seed);
    if config.num_workers > 1 {
        builder = builder.num_workers(config.num_workers);
    }

    builder.build(dataset)
}

fn check_dataset<D: Dataset<MnistItem>>(config: &TrainingConfig, dataset: &D) -> crate::Result<()> {
    config.validate()?;
    if config.model.channels() != 1 {
        return Err(GanError::InvalidConfig(format!(
            "MNIST images have one channel, the model expects {}",
            config.model.channels()
        )));
    }
    if dataset.is_empty() {
        return Err(GanError::InvalidConfig("The dataset is empty".to_string()));
    }

    Ok(())
}

/// Trains on the MNIST training split.
pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: TrainingConfig,
    device: B::Device,
) -> crate::Result<TrainingReport> {
    config.validate()?;
    let dataset = mnist_train(config.max_items);

    train_on::<B, _>(artifact_dir, config, dataset, device)
}

/// Trains on any dataset of MNIST-like items.
pub fn train_on<B, D>(
    artifact_dir: &Path,
    config: TrainingConfig,
    dataset: D,
    device: B::Device,
) -> crate::Result<TrainingReport>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
{
    check_dataset(&config, &dataset)?;

    std::fs::create_dir_all(artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;
    B::seed(config.seed);

    log::info!(
        "Training with the {} generator loss on {} images for {} epochs",
        config.generator_loss.name(),
        dataset.len(),
        config.num_epochs
    );

    let mut trainer = init_trainer::<B>(&config, artifact_dir, &device)?;
    let dataloader = build_dataloader::<B, D>(&config, dataset, &device, config.seed);

    trainer.fit(dataloader, 1, TrainingReport::default())
}

/// Continues a run saved in `artifact_dir` from the checkpoint of `epoch` on MNIST.
pub fn resume<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: TrainingConfig,
    epoch: usize,
    device: B::Device,
) -> crate::Result<TrainingReport> {
    config.validate()?;
    let dataset = mnist_train(config.max_items);

    resume_on::<B, _>(artifact_dir, config, epoch, dataset, device)
}

/// Continues a run saved in `artifact_dir` from the checkpoint of `epoch` up to
/// `config.num_epochs`.
///
/// The networks, the optimizer states and the fixed sampling noise are restored. The model
/// configuration must match the one the run was started with. The summaries of the epochs up to
/// `epoch` are kept in the report.
pub fn resume_on<B, D>(
    artifact_dir: &Path,
    config: TrainingConfig,
    epoch: usize,
    dataset: D,
    device: B::Device,
) -> crate::Result<TrainingReport>
where
    B: AutodiffBackend,
    D: Dataset<MnistItem> + 'static,
{
    check_dataset(&config, &dataset)?;
    if epoch >= config.num_epochs {
        return Err(GanError::InvalidConfig(format!(
            "Cannot resume after epoch {epoch}, the run ends at epoch {}",
            config.num_epochs
        )));
    }
    let config_path = artifact_dir.join("config.json");
    let saved = TrainingConfig::load(&config_path)?;
    if saved.model.to_string() != config.model.to_string() {
        return Err(GanError::InvalidConfig(
            "The model configuration differs from the one of the saved run".to_string(),
        ));
    }
    config.save(&config_path)?;

    let trainer = init_trainer::<B>(&config, artifact_dir, &device)?;
    let mut trainer = trainer.restore(epoch)?;
    let num_batches = dataset.len().div_ceil(config.batch_size);
    trainer.batches_trained = epoch * num_batches;

    let report_path = artifact_dir.join("report.json");
    let mut report = if report_path.is_file() {
        TrainingReport::load(&report_path)?
    } else {
        log::warn!("No report found in {}", artifact_dir.display());
        TrainingReport::default()
    };
    report.truncate(epoch);

    // Fresh randomness for the remaining epochs.
    let seed = config.seed.wrapping_add(epoch as u64);
    B::seed(seed);
    log::info!("Resuming training after epoch {epoch}");

    let dataloader = build_dataloader::<B, D>(&config, dataset, &device, seed);
    trainer.fit(dataloader, epoch + 1, report)
}
