use crate::{
    error::{Error, Result},
    layer::Layer,
};
use ndarray::{Array, Array1, Array2};

/// Running sums of the cost gradient with respect to every weight and bias, shaped exactly like
/// the network's parameters. One of these is created per mini-batch, filled in by
/// backpropagating every pattern of the batch, applied once, and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub(crate) nabla_weights: Vec<Array2<f64>>,
    pub(crate) nabla_biases: Vec<Array1<f64>>,
    // How many patterns have been added in. The averaged gradient divides by this rather than by
    // the nominal batch size, so a short final batch isn't under-weighted.
    pub(crate) count: usize,
}

impl Gradients {
    pub fn zeros_like(layers: &[Layer]) -> Gradients {
        Gradients {
            nabla_weights: layers
                .iter()
                .map(|layer| Array::zeros(layer.weights.raw_dim()))
                .collect(),
            nabla_biases: layers
                .iter()
                .map(|layer| Array::zeros(layer.biases.raw_dim()))
                .collect(),
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn weights(&self) -> &[Array2<f64>] {
        &self.nabla_weights
    }

    pub fn biases(&self) -> &[Array1<f64>] {
        &self.nabla_biases
    }

    /// Checks that this accumulator has one weight matrix and one bias vector per layer, each with
    /// the same shape as the layer's own parameters.
    pub fn check_shape(&self, layers: &[Layer]) -> Result<()> {
        Error::check_len("gradient weight matrices", layers.len(), self.nabla_weights.len())?;
        Error::check_len("gradient bias vectors", layers.len(), self.nabla_biases.len())?;
        for (layer, (nabla_weight, nabla_bias)) in layers
            .iter()
            .zip(self.nabla_weights.iter().zip(&self.nabla_biases))
        {
            Error::check_len("gradient weight rows", layer.output_size(), nabla_weight.nrows())?;
            Error::check_len("gradient weight columns", layer.input_size(), nabla_weight.ncols())?;
            Error::check_len("gradient bias vector", layer.output_size(), nabla_bias.len())?;
        }
        Ok(())
    }

    /// Adds another accumulator into this one, e.g. the partial sums of two halves of a batch.
    /// Both must be shaped for the same network; otherwise nothing is added.
    pub fn merge(&mut self, other: &Gradients) -> Result<()> {
        Error::check_len(
            "merged weight matrices",
            self.nabla_weights.len(),
            other.nabla_weights.len(),
        )?;
        Error::check_len(
            "merged bias vectors",
            self.nabla_biases.len(),
            other.nabla_biases.len(),
        )?;
        for (mine, theirs) in self.nabla_weights.iter().zip(&other.nabla_weights) {
            Error::check_len("merged weight rows", mine.nrows(), theirs.nrows())?;
            Error::check_len("merged weight columns", mine.ncols(), theirs.ncols())?;
        }
        for (mine, theirs) in self.nabla_biases.iter().zip(&other.nabla_biases) {
            Error::check_len("merged bias vector", mine.len(), theirs.len())?;
        }

        for (nabla_weight, other_weight) in self.nabla_weights.iter_mut().zip(&other.nabla_weights) {
            *nabla_weight += other_weight;
        }
        for (nabla_bias, other_bias) in self.nabla_biases.iter_mut().zip(&other.nabla_biases) {
            *nabla_bias += other_bias;
        }
        self.count += other.count;
        Ok(())
    }

    // Performs param -= learning_rate * (sum / count) on every layer. Consumes the accumulator, as
    // it has no use once it has been applied.
    pub(crate) fn apply(mut self, layers: &mut [Layer], learning_rate: f64) {
        if self.count == 0 {
            return;
        }
        let step = learning_rate / self.count as f64;

        for (layer, (nabla_weight, nabla_bias)) in layers.iter_mut().zip(
            self.nabla_weights
                .iter_mut()
                .zip(self.nabla_biases.iter_mut()),
        ) {
            // Scale in place to avoid another allocation, then subtract.
            nabla_weight.mapv_inplace(|nw| nw * step);
            nabla_bias.mapv_inplace(|nb| nb * step);
            layer.weights -= &*nabla_weight;
            layer.biases -= &*nabla_bias;
        }
    }
}
