use std::path::{Path, PathBuf};

use burn::{
    prelude::Backend,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
};
use derive_new::new;

use crate::error::{GanError, Result};

/// Extension appended by the [recorder](NamedMpkFileRecorder) to record files.
const RECORD_EXTENSION: &str = "mpk";

pub const GENERATOR: &str = "generator";
pub const DISCRIMINATOR: &str = "discriminator";
pub const GENERATOR_OPTIMIZER: &str = "generator-optim";
pub const DISCRIMINATOR_OPTIMIZER: &str = "discriminator-optim";
pub const FIXED_NOISE: &str = "fixed-noise";

/// Records written for every checkpointed epoch.
pub const CHECKPOINT_RECORDS: [&str; 5] = [
    GENERATOR,
    DISCRIMINATOR,
    GENERATOR_OPTIMIZER,
    DISCRIMINATOR_OPTIMIZER,
    FIXED_NOISE,
];

/// Action to be taken by a [checkpointer](FileCheckpointer).
#[derive(Clone, PartialEq, Debug)]
pub enum CheckpointingAction {
    /// Delete the given epoch.
    Delete(usize),
    /// Save the current record.
    Save,
}

/// Define when checkpoints should be saved and deleted.
pub trait CheckpointingStrategy {
    /// Based on the epoch, determine the checkpointing actions.
    fn checkpointing(&mut self, epoch: usize) -> Vec<CheckpointingAction>;
}

/// Keep the checkpoints of the last `num_keep` epochs.
#[derive(new, Clone, Debug)]
pub struct KeepLastCheckpoints {
    num_keep: usize,
}

impl CheckpointingStrategy for KeepLastCheckpoints {
    fn checkpointing(&mut self, epoch: usize) -> Vec<CheckpointingAction> {
        if self.num_keep == 0 {
            return Vec::new();
        }

        let mut actions = vec![CheckpointingAction::Save];
        if epoch > self.num_keep {
            actions.push(CheckpointingAction::Delete(epoch - self.num_keep));
        }

        actions
    }
}

/// Saves the named records of an epoch next to each other in a directory.
///
/// Records are kept in full precision so that a restored run continues exactly where it stopped.
#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    directory: PathBuf,
    recorder: NamedMpkFileRecorder<FullPrecisionSettings>,
}

impl FileCheckpointer {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            recorder: NamedMpkFileRecorder::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path(&self, name: &str, epoch: usize) -> PathBuf {
        self.directory.join(format!("{name}-{epoch}"))
    }

    fn file(&self, name: &str, epoch: usize) -> PathBuf {
        self.path(name, epoch).with_extension(RECORD_EXTENSION)
    }

    /// Whether all the records of `epoch` exist.
    pub fn exists(&self, epoch: usize) -> bool {
        CHECKPOINT_RECORDS
            .iter()
            .all(|name| self.file(name, epoch).is_file())
    }

    /// Saves `record` as `{name}-{epoch}`.
    pub fn save<B: Backend, R: Record<B>>(
        &self,
        name: &str,
        epoch: usize,
        record: R,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        Recorder::<B>::record(&self.recorder, record, self.path(name, epoch))?;

        log::debug!("Saved {name} of epoch {epoch}");
        Ok(())
    }

    /// Loads the record `{name}-{epoch}`.
    pub fn load<B: Backend, R: Record<B>>(
        &self,
        name: &str,
        epoch: usize,
        device: &B::Device,
    ) -> Result<R> {
        if !self.file(name, epoch).is_file() {
            return Err(GanError::MissingCheckpoint(epoch));
        }

        let record = Recorder::<B>::load(&self.recorder, self.path(name, epoch), device)?;
        Ok(record)
    }

    /// Removes every record of `epoch`.
    pub fn delete(&self, epoch: usize) -> Result<()> {
        for name in CHECKPOINT_RECORDS {
            let file = self.file(name, epoch);
            if file.exists() {
                std::fs::remove_file(file)?;
            }
        }

        log::debug!("Deleted checkpoint of epoch {epoch}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeneratorConfig;
    use crate::TestBackend;
    use burn::{module::Module, tensor::Tensor};

    #[test]
    fn keep_last_saves_and_deletes_oldest() {
        let mut strategy = KeepLastCheckpoints::new(2);

        assert_eq!(strategy.checkpointing(1), vec![CheckpointingAction::Save]);
        assert_eq!(strategy.checkpointing(2), vec![CheckpointingAction::Save]);
        assert_eq!(
            strategy.checkpointing(3),
            vec![CheckpointingAction::Save, CheckpointingAction::Delete(1)]
        );
    }

    #[test]
    fn keep_none_does_nothing() {
        let mut strategy = KeepLastCheckpoints::new(0);

        assert!(strategy.checkpointing(4).is_empty());
    }

    fn save_all(checkpointer: &FileCheckpointer, epoch: usize) {
        let device = Default::default();
        for name in CHECKPOINT_RECORDS {
            let record = Tensor::<TestBackend, 2>::ones([2, 2], &device);
            checkpointer.save::<TestBackend, _>(name, epoch, record).unwrap();
        }
    }

    #[test]
    fn exists_requires_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path());
        let device = Default::default();

        checkpointer
            .save::<TestBackend, _>(GENERATOR, 1, Tensor::<TestBackend, 1>::ones([2], &device))
            .unwrap();
        assert!(!checkpointer.exists(1));

        save_all(&checkpointer, 1);
        assert!(checkpointer.exists(1));
    }

    #[test]
    fn delete_removes_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path().join("checkpoint"));
        save_all(&checkpointer, 1);
        save_all(&checkpointer, 2);

        checkpointer.delete(1).unwrap();

        assert!(!checkpointer.exists(1));
        assert!(checkpointer.exists(2));
        for name in CHECKPOINT_RECORDS {
            assert!(!checkpointer.directory().join(format!("{name}-1.mpk")).exists());
        }
    }

    #[test]
    fn load_restores_module_weights_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = GeneratorConfig::new()
            .with_encoding_dims(4)
            .with_step_channels(2)
            .with_out_size(16);
        let generator = config.init::<TestBackend>(&device);
        let checkpointer = FileCheckpointer::new(dir.path());
        checkpointer
            .save::<TestBackend, _>(GENERATOR, 1, generator.clone().into_record())
            .unwrap();

        let record = checkpointer
            .load::<TestBackend, _>(GENERATOR, 1, &device)
            .unwrap();
        let restored = config.init::<TestBackend>(&device).load_record(record);

        let noise = Tensor::<TestBackend, 2>::ones([2, 4], &device);
        let expected = generator.forward(noise.clone()).into_data();
        restored.forward(noise).into_data().assert_approx_eq(&expected, 5);
    }

    #[test]
    fn load_missing_record_fails() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path());

        let result = checkpointer.load::<TestBackend, Tensor<TestBackend, 1>>(
            GENERATOR,
            7,
            &Default::default(),
        );

        assert!(matches!(result, Err(GanError::MissingCheckpoint(7))));
    }
}
