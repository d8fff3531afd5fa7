use std::path::{Path, PathBuf};

use burn::{config::Config, tensor::backend::AutodiffBackend};
use clap::{Parser, Subcommand, ValueEnum};

use crate::{
    error::Result,
    generating::generate,
    log::install_file_logger,
    loss::{BoundarySeekingLossConfig, GeneratorLossConfig},
    training::{create_artifact_dir, resume, train, TrainingConfig},
};

pub const DEFAULT_ARTIFACT_DIR: &str = "/tmp/bsgan";

#[derive(Parser, Debug)]
#[command(name = "bsgan", version, about = "Boundary-seeking GAN on MNIST")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the generator and the discriminator on MNIST
    Train {
        #[arg(long, default_value = DEFAULT_ARTIFACT_DIR)]
        artifact_dir: PathBuf,
        /// JSON training configuration; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        num_epochs: Option<usize>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        num_workers: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Discriminator updates per generator update (negative: the reverse)
        #[arg(long, allow_negative_numbers = true)]
        ncritic: Option<i64>,
        #[arg(long)]
        sample_size: Option<usize>,
        /// Train on the first images of MNIST only
        #[arg(long)]
        max_items: Option<usize>,
        #[arg(long, value_enum)]
        generator_loss: Option<GeneratorLossKind>,
        /// Continue a run from the checkpoint of this epoch. The run configuration is read from
        /// the artifact directory unless `--config` is given, and flags override it.
        #[arg(long)]
        resume: Option<usize>,
    },
    /// Sample images from a trained generator
    Generate {
        #[arg(long, default_value = DEFAULT_ARTIFACT_DIR)]
        artifact_dir: PathBuf,
        #[arg(long, default_value_t = 64)]
        num_samples: usize,
        /// Output image, defaults to `<artifact_dir>/images/generated.png`
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorLossKind {
    BoundarySeeking,
    Minimax,
}

impl From<GeneratorLossKind> for GeneratorLossConfig {
    fn from(kind: GeneratorLossKind) -> Self {
        match kind {
            GeneratorLossKind::BoundarySeeking => {
                GeneratorLossConfig::BoundarySeeking(BoundarySeekingLossConfig::new())
            }
            GeneratorLossKind::Minimax => GeneratorLossConfig::Minimax,
        }
    }
}

/// Training flags applied on top of a loaded or default configuration.
#[derive(Clone, Debug, Default)]
pub struct TrainOverrides {
    pub num_epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub num_workers: Option<usize>,
    pub seed: Option<u64>,
    pub ncritic: Option<i64>,
    pub sample_size: Option<usize>,
    pub max_items: Option<usize>,
    pub generator_loss: Option<GeneratorLossKind>,
}

impl TrainOverrides {
    /// Loads `config` if given, or uses the defaults, then applies the flags.
    pub fn resolve(self, config: Option<&PathBuf>) -> Result<TrainingConfig> {
        let mut config = match config {
            Some(path) => TrainingConfig::load(path)?,
            None => TrainingConfig::new(),
        };

        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(num_workers) = self.num_workers {
            config.num_workers = num_workers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(ncritic) = self.ncritic {
            config.ncritic = ncritic;
        }
        if let Some(sample_size) = self.sample_size {
            config.sample_size = sample_size;
        }
        if self.max_items.is_some() {
            config.max_items = self.max_items;
        }
        if let Some(kind) = self.generator_loss {
            config.generator_loss = kind.into();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Configuration of a `train` command.
///
/// The base is `config` if given, the saved configuration of the run when resuming, or the
/// defaults. The flags are applied on top.
pub fn train_config(
    artifact_dir: &Path,
    config: Option<PathBuf>,
    resume: Option<usize>,
    overrides: TrainOverrides,
) -> Result<TrainingConfig> {
    let base = config.or_else(|| resume.map(|_| artifact_dir.join("config.json")));

    overrides.resolve(base.as_ref())
}

/// Runs a parsed command on the backend `B`.
pub fn run<B: AutodiffBackend>(cli: Cli, device: B::Device) -> Result<()> {
    match cli.command {
        Commands::Train {
            artifact_dir,
            config,
            num_epochs,
            batch_size,
            num_workers,
            seed,
            ncritic,
            sample_size,
            max_items,
            generator_loss,
            resume: resume_epoch,
        } => {
            let overrides = TrainOverrides {
                num_epochs,
                batch_size,
                num_workers,
                seed,
                ncritic,
                sample_size,
                max_items,
                generator_loss,
            };
            let config = train_config(&artifact_dir, config, resume_epoch, overrides)?;

            match resume_epoch {
                Some(epoch) => {
                    install_file_logger(&artifact_dir.join("experiment.log"));
                    resume::<B>(&artifact_dir, config, epoch, device)?;
                }
                None => {
                    create_artifact_dir(&artifact_dir)?;
                    install_file_logger(&artifact_dir.join("experiment.log"));
                    train::<B>(&artifact_dir, config, device)?;
                }
            }
        }
        Commands::Generate {
            artifact_dir,
            num_samples,
            output,
            seed,
        } => {
            let path =
                generate::<B::InnerBackend>(&artifact_dir, num_samples, output, seed, device)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
