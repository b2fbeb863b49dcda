use ndarray::{Array, Array1, Array2, ArrayView1};
use ndarray_rand::{RandomExt, rand::Rng, rand_distr::StandardNormal};

/// A single unit of a layer, borrowed out of the layer's weight matrix. Units are not stored as
/// objects of their own; a unit is just one row of the weight matrix together with the matching
/// entry of the bias vector.
#[derive(Debug, Clone, Copy)]
pub struct Unit<'a> {
    pub weights: ArrayView1<'a, f64>,
    pub bias: f64,
}

impl Unit<'_> {
    // Computes w.x + b for this unit. The input must have exactly as many elements as the unit has
    // weights; this is the caller's responsibility and is only checked in debug builds.
    pub fn weighted_sum(&self, input: &ArrayView1<f64>) -> f64 {
        debug_assert_eq!(
            self.weights.len(),
            input.len(),
            "unit input length must match its weight count"
        );
        self.weights.dot(input) + self.bias
    }
}

/// The pre-activation (z) and post-activation (a) vectors of one layer for a single input.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerActivation {
    pub z: Array1<f64>,
    pub a: Array1<f64>,
}

/// A fully-connected sigmoid layer. The weight matrix has one row per unit and one column per
/// input, so for an input vector x the pre-activations are simply W.x + b.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub(crate) weights: Array2<f64>,
    pub(crate) biases: Array1<f64>,
}

impl Layer {
    /// Creates a layer mapping `inputs` values to `outputs` units with randomly drawn parameters.
    ///
    /// Biases come from a standard normal distribution. Weights do too, but are scaled down by
    /// `1 / sqrt(inputs)` so that wide inputs (784 pixels) don't push the first hidden layer
    /// straight into saturation.
    pub fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Layer {
        let scale = 1.0 / (inputs as f64).sqrt();
        let mut weights: Array2<f64> = Array::random_using((outputs, inputs), StandardNormal, rng);
        weights.mapv_inplace(|w: f64| w * scale);
        Layer {
            weights,
            biases: Array::random_using(outputs, StandardNormal, rng),
        }
    }

    /// Builds a layer from explicit parameters. The bias vector must have one entry per row of
    /// the weight matrix.
    pub fn from_parameters(weights: Array2<f64>, biases: Array1<f64>) -> crate::Result<Layer> {
        crate::Error::check_len("layer bias vector", weights.nrows(), biases.len())?;
        Ok(Layer { weights, biases })
    }

    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn biases(&self) -> &Array1<f64> {
        &self.biases
    }

    pub fn unit(&self, index: usize) -> Unit<'_> {
        Unit {
            weights: self.weights.row(index),
            bias: self.biases[index],
        }
    }

    pub fn units(&self) -> impl Iterator<Item = Unit<'_>> {
        (0..self.output_size()).map(|index| self.unit(index))
    }

    // Computes both the raw weighted sums and their sigmoid activations. The whole layer is done
    // as a single matrix-vector product rather than unit by unit; the result is the same as
    // calling Unit::weighted_sum on every unit.
    pub fn forward(&self, input: &ArrayView1<f64>) -> LayerActivation {
        debug_assert_eq!(self.input_size(), input.len());
        let z = self.weights.dot(input) + &self.biases;
        let a = z.mapv(sigmoid);
        LayerActivation { z, a }
    }
}

/// The logistic function, evaluated so that exp is only ever called on a non-positive argument.
/// For large |z| this saturates cleanly to 0 or 1 instead of overflowing.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + f64::exp(-z))
    } else {
        let e = f64::exp(z);
        e / (1.0 + e)
    }
}

/// σ'(z) written in terms of the activation a = σ(z), which is all backpropagation needs.
pub fn sigmoid_derivative_from_output(a: f64) -> f64 {
    a * (1.0 - a)
}
