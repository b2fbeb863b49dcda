//! A from-scratch multi-layer perceptron for handwritten digit classification.
//!
//! Parameters live in flat ndarray matrices (one weight matrix and one bias vector per layer),
//! gradients are computed by backpropagation of the half squared error through sigmoid layers,
//! and training is plain mini-batch stochastic gradient descent.

pub mod config;
pub mod error;
pub mod gradient;
pub mod layer;
pub mod mnist;
pub mod network;
pub mod pattern;
pub mod train;

pub use config::TrainingConfig;
pub use error::{Error, Result};
pub use gradient::Gradients;
pub use layer::{Layer, LayerActivation, Unit};
pub use mnist::MnistData;
pub use network::{Network, classify};
pub use pattern::Pattern;
pub use train::{EpochReport, Metric, TrainingOptions};
