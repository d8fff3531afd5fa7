//! Boundary-seeking GAN trained on MNIST.
//!
//! The generator of a boundary-seeking GAN is trained to produce samples that lie on the
//! decision boundary of the discriminator, where `D(G(z)) = 0.5`. With `l = D(G(z))` the
//! discriminator logits, the generator minimizes
//!
//! ```text
//! 0.5 * mean((log(sigmoid(l)) - log(1 - sigmoid(l)))^2)
//! ```
//!
//! while the discriminator keeps the usual minimax objective.
//!
//! ```no_run
//! use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
//! use bsgan::training::{train, TrainingConfig};
//!
//! let config = TrainingConfig::new().with_num_epochs(1);
//! let report = train::<Autodiff<NdArray>>(
//!     std::path::Path::new("/tmp/bsgan"),
//!     config,
//!     NdArrayDevice::Cpu,
//! )
//! .unwrap();
//! println!("{:?}", report.epochs);
//! ```

pub mod checkpoint;
pub mod cli;
pub mod data;
pub mod error;
pub mod generating;
pub mod log;
pub mod loss;
pub mod model;
pub mod optim;
pub mod show;
pub mod training;

pub use error::{GanError, Result};

#[cfg(test)]
pub(crate) type TestBackend = burn::backend::NdArray<f32>;

#[cfg(test)]
pub(crate) type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
