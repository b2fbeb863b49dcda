use crate::{
    error::{Error, Result},
    gradient::Gradients,
    layer::{Layer, LayerActivation, sigmoid_derivative_from_output},
    pattern::Pattern,
};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1, Axis, linalg::general_mat_mul};
use ndarray_rand::rand::Rng;

/// A fully-connected feed-forward network of sigmoid layers.
///
/// The topology (`sizes`) is fixed at construction: `sizes[0]` is the input width and every
/// following entry is the width of one layer. Layer `i` therefore has a
/// `[sizes[i + 1] x sizes[i]]` weight matrix and a `[sizes[i + 1]]` bias vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    sizes: Vec<usize>,
    layers: Vec<Layer>,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(sizes: Vec<usize>, rng: &mut R) -> Result<Network> {
        if sizes.len() < 2 {
            return Err(Error::InvalidTopology(format!(
                "need an input width and at least one layer, got {sizes:?}"
            )));
        }
        if sizes.contains(&0) {
            return Err(Error::InvalidTopology(format!(
                "layer widths must be non-zero, got {sizes:?}"
            )));
        }

        let layers = sizes
            // For each size in sizes paired with the following size...
            .iter()
            .tuple_windows()
            // Make a layer taking current_size inputs and producing next_size outputs.
            .map(|(&current_size, &next_size)| Layer::new(current_size, next_size, rng))
            .collect();

        Ok(Network { sizes, layers })
    }

    /// Assembles a network from existing layers, checking that consecutive layers chain.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Network> {
        let Some(first) = layers.first() else {
            return Err(Error::InvalidTopology("a network needs at least one layer".into()));
        };
        let mut sizes = vec![first.input_size()];
        for (previous, next) in layers.iter().tuple_windows() {
            Error::check_len("layer input width", previous.output_size(), next.input_size())?;
        }
        sizes.extend(layers.iter().map(Layer::output_size));

        Ok(Network { sizes, layers })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.sizes[0]
    }

    pub fn output_size(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    // Calculates the activations of the output layer, given the activations of the input layer.
    // Each layer computes a' = σ(w.a + b) from the previous layer's activations; only the most
    // recent activation vector is kept.
    pub fn feedforward(&self, input: &Array1<f64>) -> Result<Array1<f64>> {
        Error::check_len("network input", self.input_size(), input.len())?;

        let mut activation = input.clone();
        for layer in &self.layers {
            activation = layer.forward(&activation.view()).a;
        }
        Ok(activation)
    }

    /// Runs the forward pass and keeps every layer's pre- and post-activation vectors, in layer
    /// order. The input itself is not part of the trace.
    pub fn feedforward_trace(&self, input: &Array1<f64>) -> Result<Vec<LayerActivation>> {
        Error::check_len("network input", self.input_size(), input.len())?;
        Ok(self.trace(input.view()))
    }

    fn trace(&self, input: ArrayView1<f64>) -> Vec<LayerActivation> {
        let mut trace: Vec<LayerActivation> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let activation = match trace.last() {
                Some(previous) => layer.forward(&previous.a.view()),
                None => layer.forward(&input),
            };
            trace.push(activation);
        }
        trace
    }

    /// Adds the gradient of the half squared error `0.5 * ||a - y||²` for one pattern into
    /// `gradients`.
    ///
    /// The network itself is never modified, so any number of patterns can be backpropagated
    /// into the same accumulator before the update is applied.
    pub fn backpropagate(&self, pattern: &Pattern, gradients: &mut Gradients) -> Result<()> {
        Error::check_len("pattern input", self.input_size(), pattern.input.len())?;
        Error::check_len("pattern target", self.output_size(), pattern.target.len())?;
        gradients.check_shape(&self.layers)?;

        let trace = self.trace(pattern.input.view());
        let last = self.layers.len() - 1;

        // Output layer: δ = (a - y) ⊙ σ'(z), with σ'(z) taken from a directly.
        let output = &trace[last].a;
        let mut delta = (output - &pattern.target) * output.mapv(sigmoid_derivative_from_output);

        // Walk back through the layers. At layer l the bias gradient is δ itself and the weight
        // gradient is the outer product of δ with the activations feeding into l (the raw input
        // for the first layer). δ for layer l - 1 is then Wᵗ.δ ⊙ σ'(z) of that layer.
        for l in (0..=last).rev() {
            let previous_activation = if l == 0 {
                pattern.input.view()
            } else {
                trace[l - 1].a.view()
            };

            gradients.nabla_biases[l] += &delta;
            general_mat_mul(
                1.0,
                &delta.view().insert_axis(Axis(1)),
                &previous_activation.insert_axis(Axis(0)),
                1.0,
                &mut gradients.nabla_weights[l],
            );

            if l > 0 {
                delta = self.layers[l].weights.t().dot(&delta)
                    * trace[l - 1].a.mapv(sigmoid_derivative_from_output);
            }
        }

        gradients.count += 1;
        Ok(())
    }

    // Adjust the network's biases and weights according to the given batch of training data. The
    // accumulated gradient is averaged over the patterns actually in the batch, which may be fewer
    // than the configured batch size for the last batch of an epoch.
    pub fn update_mini_batch(&mut self, mini_batch: &[Pattern], learning_rate: f64) -> Result<()> {
        let mut gradients = Gradients::zeros_like(&self.layers);
        for pattern in mini_batch {
            self.backpropagate(pattern, &mut gradients)?;
        }
        gradients.apply(&mut self.layers, learning_rate);
        Ok(())
    }

    /// Mean half squared error over `patterns`: `Σ ||a - y||² / (2n)`.
    pub fn cost(&self, patterns: &[Pattern]) -> Result<f64> {
        if patterns.is_empty() {
            return Err(Error::EmptyDataset("cannot compute cost of zero patterns".into()));
        }

        let mut total = 0.0;
        for pattern in patterns {
            Error::check_len("pattern target", self.output_size(), pattern.target.len())?;
            let output = self.feedforward(&pattern.input)?;
            total += (&output - &pattern.target).mapv(|e| e * e).sum();
        }
        Ok(total / (2.0 * patterns.len() as f64))
    }

    /// Fraction of `patterns` whose predicted class matches the class of their target.
    /// See [`classify`] for how a vector is turned into a class.
    pub fn accuracy(&self, patterns: &[Pattern]) -> Result<f64> {
        if patterns.is_empty() {
            return Err(Error::EmptyDataset("cannot compute accuracy of zero patterns".into()));
        }

        let mut correct_answers = 0;
        for pattern in patterns {
            Error::check_len("pattern target", self.output_size(), pattern.target.len())?;
            if self.predict(&pattern.input)? == classify(&pattern.target.view()) {
                correct_answers += 1;
            }
        }
        Ok(correct_answers as f64 / patterns.len() as f64)
    }

    /// The class the network assigns to `input`.
    pub fn predict(&self, input: &Array1<f64>) -> Result<usize> {
        Ok(classify(&self.feedforward(input)?.view()))
    }
}

/// Turns an output (or one-hot target) vector into a class index.
///
/// With two or more outputs this is the index of the largest value. A single output is treated
/// as a binary classifier: class 1 if it is at least 0.5, otherwise class 0.
pub fn classify(output: &ArrayView1<f64>) -> usize {
    if output.len() == 1 {
        return usize::from(output[0] >= 0.5);
    }
    output
        .iter()
        .position_max_by(|a, b| a.total_cmp(b))
        .unwrap_or(0)
}
