use std::path::{Path, PathBuf};

use burn::{prelude::*, record::CompactRecorder};

use crate::{
    error::{GanError, Result},
    model::Generator,
    show::{grid_columns, save_grid},
    training::TrainingConfig,
};

/// Loads the trained generator saved in `artifact_dir`.
pub fn load_generator<B: Backend>(
    artifact_dir: &Path,
    device: &B::Device,
) -> Result<Generator<B>> {
    let config = TrainingConfig::load(artifact_dir.join("config.json"))?;
    let generator = config.model.generator.init::<B>(device).load_file(
        artifact_dir.join("generator"),
        &CompactRecorder::new(),
        device,
    )?;

    Ok(generator)
}

/// Writes a grid of `num_samples` images sampled from the trained generator.
///
/// Returns the path of the grid, `<artifact_dir>/images/generated.png` unless `output` is given.
pub fn generate<B: Backend>(
    artifact_dir: &Path,
    num_samples: usize,
    output: Option<PathBuf>,
    seed: u64,
    device: B::Device,
) -> Result<PathBuf> {
    if num_samples == 0 {
        return Err(GanError::InvalidConfig(
            "The number of samples must be positive".to_string(),
        ));
    }
    let generator = load_generator::<B>(artifact_dir, &device)?;
    let path = output.unwrap_or_else(|| artifact_dir.join("images").join("generated.png"));

    B::seed(seed);
    let images = generator.forward(generator.sample_noise(num_samples, &device));
    save_grid(images, grid_columns(num_samples), &path)?;

    log::info!("Generated {num_samples} images in {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DcganConfig, DiscriminatorConfig, GeneratorConfig};
    use crate::TestBackend;
    use burn::module::Module;

    fn save_artifacts(artifact_dir: &Path) {
        let config = TrainingConfig::new().with_model(
            DcganConfig::new()
                .with_generator(
                    GeneratorConfig::new()
                        .with_encoding_dims(4)
                        .with_step_channels(2)
                        .with_out_size(16),
                )
                .with_discriminator(
                    DiscriminatorConfig::new()
                        .with_step_channels(2)
                        .with_in_size(16),
                ),
        );
        config.save(artifact_dir.join("config.json")).unwrap();
        config
            .model
            .generator
            .init::<TestBackend>(&Default::default())
            .save_file(artifact_dir.join("generator"), &CompactRecorder::new())
            .unwrap();
    }

    #[test]
    fn generate_writes_grid() {
        let dir = tempfile::tempdir().unwrap();
        save_artifacts(dir.path());

        let path = generate::<TestBackend>(dir.path(), 9, None, 7, Default::default()).unwrap();

        assert_eq!(path, dir.path().join("images").join("generated.png"));
        // 3 columns and 3 rows of 16 pixels with 2 pixels of padding.
        let image = image::open(&path).unwrap();
        assert_eq!((image.width(), image.height()), (56, 56));
    }

    #[test]
    fn generate_to_custom_output() {
        let dir = tempfile::tempdir().unwrap();
        save_artifacts(dir.path());
        let output = dir.path().join("out").join("samples.png");

        let path = generate::<TestBackend>(
            dir.path(),
            2,
            Some(output.clone()),
            7,
            Default::default(),
        )
        .unwrap();

        assert_eq!(path, output);
        assert!(output.is_file());
    }

    #[test]
    fn generate_zero_samples_fails() {
        let dir = tempfile::tempdir().unwrap();
        save_artifacts(dir.path());

        let result = generate::<TestBackend>(dir.path(), 0, None, 7, Default::default());

        assert!(matches!(result, Err(GanError::InvalidConfig(_))));
        assert!(!dir.path().join("images").exists());
    }

    #[test]
    fn generate_without_artifacts_fails() {
        let dir = tempfile::tempdir().unwrap();

        let result = generate::<TestBackend>(dir.path(), 4, None, 7, Default::default());

        assert!(matches!(result, Err(GanError::Config(_))));
    }
}
