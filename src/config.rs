//! Training configuration.
//!
//! The trainer takes no command-line arguments. Settings come from an optional JSON file in the
//! working directory; any field left out of the file falls back to its default.
//!
//! ```json
//! {
//!   "hidden_layers": [30],
//!   "epochs": 30,
//!   "batch_size": 10,
//!   "learning_rate": 3.0,
//!   "metric": "accuracy",
//!   "seed": 1234,
//!   "patience": 5
//! }
//! ```

use crate::{
    error::{Error, Result},
    train::{Metric, TrainingOptions},
};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

/// Name of the file looked for in the working directory.
pub const CONFIG_FILE: &str = "mnist-trainer.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Widths of the hidden layers; input and output widths come from the data.
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub metric: Metric,
    /// Seed for initialization and shuffling. Without one the generator is seeded from the OS.
    pub seed: Option<u64>,
    /// Directory holding the four gzipped IDX files.
    pub data_dir: PathBuf,
    /// Stop once this many epochs in a row fail to improve on the best metric so far.
    pub patience: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            hidden_layers: vec![6],
            epochs: 30,
            batch_size: 10,
            learning_rate: 3.0,
            metric: Metric::Accuracy,
            seed: None,
            data_dir: PathBuf::from("data"),
            patience: None,
        }
    }
}

impl TrainingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<TrainingConfig> {
        let contents = fs::read_to_string(path)?;
        let config: TrainingConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn from_file_or_default(path: impl AsRef<Path>) -> Result<TrainingConfig> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(TrainingConfig::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers.contains(&0) {
            return Err(Error::InvalidConfig(
                "hidden layer widths must be non-zero".into(),
            ));
        }
        if self.patience == Some(0) {
            return Err(Error::InvalidConfig("patience must be at least 1".into()));
        }
        self.training_options().validate()
    }

    pub fn training_options(&self) -> TrainingOptions {
        TrainingOptions {
            epochs: self.epochs,
            mini_batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            metric: self.metric,
        }
    }

    /// Full layer widths for a network with the given input and output widths.
    pub fn topology(&self, inputs: usize, outputs: usize) -> Vec<usize> {
        let mut sizes = Vec::with_capacity(self.hidden_layers.len() + 2);
        sizes.push(inputs);
        sizes.extend(&self.hidden_layers);
        sizes.push(outputs);
        sizes
    }
}
