use ndarray::{Array, Array1};

// A single training or test example: the input fed to the network and the output the network
// should ideally produce for it. For MNIST the input is a [784] vector of pixel intensities in
// [0, 1] and the target is a [10] one-hot vector with a 1.0 at the position of the digit.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub input: Array1<f64>,
    pub target: Array1<f64>,
}

impl Pattern {
    pub fn new(input: Array1<f64>, target: Array1<f64>) -> Pattern {
        Pattern { input, target }
    }
}

/// A `[classes]` vector that is 1.0 at `label` and 0.0 everywhere else.
pub fn one_hot(label: usize, classes: usize) -> Array1<f64> {
    Array::from_shape_fn(classes, |i| if i == label { 1.0 } else { 0.0 })
}
