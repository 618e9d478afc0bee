//! Dense feed-forward network: `a = x·W + b` per layer, tanh on hidden layers,
//! linear output. Parameters live outside the network (see `NetworkParams`),
//! so one `Mlp` serves every particle of a swarm.

use crate::codec::{CodecError, LayerLayout, NetworkParams};
use crate::objective::Objective;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use std::{error::Error, fmt};

#[derive(Clone, Copy, Debug, Default)]
pub struct Mlp;

impl Mlp {
    /// Forward pass over a batch; `inputs` is `[n_samples, layer_sizes[0]]`.
    pub fn forward(&self, params: &NetworkParams, inputs: ArrayView2<f32>) -> Array2<f32> {
        let last = params.layer_count() - 1;
        let mut a = inputs.to_owned();
        for (l, (w, b)) in params.weights.iter().zip(&params.biases).enumerate() {
            a = a.dot(w) + b;
            if l < last {
                a.mapv_inplace(f32::tanh);
            }
        }
        a
    }

    /// Forward pass keeping every layer's activation, input included.
    fn forward_trace(&self, params: &NetworkParams, inputs: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let last = params.layer_count() - 1;
        let mut activations = Vec::with_capacity(params.layer_count() + 1);
        activations.push(inputs.to_owned());
        for (l, (w, b)) in params.weights.iter().zip(&params.biases).enumerate() {
            let mut z = activations[l].dot(w) + b;
            if l < last {
                z.mapv_inplace(f32::tanh);
            }
            activations.push(z);
        }
        activations
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    Empty,
    RowMismatch { inputs: usize, targets: usize },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetError::Empty => write!(f, "dataset has no samples or no columns"),
            DatasetError::RowMismatch { inputs, targets } => {
                write!(f, "dataset has {inputs} input rows but {targets} target rows")
            }
        }
    }
}

impl Error for DatasetError {}

/// Mean squared error of an `Mlp` on a fixed dataset, with backpropagated gradient.
#[derive(Clone, Debug)]
pub struct MseObjective {
    net: Mlp,
    inputs: Array2<f32>,
    targets: Array2<f32>,
}

impl MseObjective {
    pub fn new(inputs: Array2<f32>, targets: Array2<f32>) -> Result<Self, DatasetError> {
        if inputs.is_empty() || targets.is_empty() {
            return Err(DatasetError::Empty);
        }
        if inputs.nrows() != targets.nrows() {
            return Err(DatasetError::RowMismatch {
                inputs: inputs.nrows(),
                targets: targets.nrows(),
            });
        }
        Ok(Self {
            net: Mlp,
            inputs,
            targets,
        })
    }

    pub fn inputs(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    pub fn targets(&self) -> ArrayView2<'_, f32> {
        self.targets.view()
    }

    pub fn loss(&self, params: &NetworkParams) -> f32 {
        let pred = self.net.forward(params, self.inputs.view());
        mean_squared_error(pred.view(), self.targets.view())
    }
}

impl Objective for MseObjective {
    fn check_layout(&self, layout: &LayerLayout) -> Result<(), CodecError> {
        if self.inputs.ncols() != layout.input_width() {
            return Err(CodecError::InputWidth {
                expected: layout.input_width(),
                actual: self.inputs.ncols(),
            });
        }
        if self.targets.ncols() != layout.output_width() {
            return Err(CodecError::OutputWidth {
                expected: layout.output_width(),
                actual: self.targets.ncols(),
            });
        }
        Ok(())
    }

    fn loss_and_gradient(&self, params: &NetworkParams) -> (f32, NetworkParams) {
        let activations = self.net.forward_trace(params, self.inputs.view());
        let output = &activations[activations.len() - 1];
        let loss = mean_squared_error(output.view(), self.targets.view());

        let n = output.len() as f32;
        let layers = params.layer_count();
        let mut weights = Vec::with_capacity(layers);
        let mut biases = Vec::with_capacity(layers);

        // dL/dz for the linear output layer.
        let mut delta = (output - &self.targets) * (2.0 / n);
        for l in (0..layers).rev() {
            weights.push(activations[l].t().dot(&delta));
            biases.push(delta.sum_axis(Axis(0)));
            if l > 0 {
                let upstream = delta.dot(&params.weights[l].t());
                delta = upstream * activations[l].mapv(|a| 1.0 - a * a);
            }
        }
        weights.reverse();
        biases.reverse();

        (loss, NetworkParams { weights, biases })
    }
}

pub fn mean_squared_error(pred: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
    let diff = &targets - &pred;
    diff.mapv(|d| d * d).mean().unwrap_or(0.0)
}

/// Linearly maps `values` from `[lo, hi]` onto `[-1, 1]`.
pub fn normalize(values: &Array2<f32>, lo: f32, hi: f32) -> Array2<f32> {
    values.mapv(|v| 2.0 * (v - lo) / (hi - lo) - 1.0)
}

/// Evenly spaced column of `n` samples over `[lo, hi]`.
pub fn linspace_column(lo: f32, hi: f32, n: usize) -> Array2<f32> {
    Array1::linspace(lo, hi, n).insert_axis(Axis(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LayerLayout;
    use ndarray::{array, Array1};

    fn params(layout: &LayerLayout, seed: f32) -> NetworkParams {
        let flat =
            Array1::from_iter((0..layout.dimensions()).map(|i| ((i as f32 + seed) * 0.37).sin()));
        layout.decode(flat.view()).unwrap()
    }

    #[test]
    fn single_linear_layer_is_affine() {
        let p = NetworkParams {
            weights: vec![array![[2.0], [-1.0]]],
            biases: vec![array![0.5]],
        };
        let out = Mlp.forward(&p, array![[1.0, 1.0], [0.0, 3.0]].view());
        assert_eq!(out, array![[1.5], [-2.5]]);
    }

    #[test]
    fn hidden_layers_use_tanh() {
        let p = NetworkParams {
            weights: vec![array![[1.0]], array![[1.0]]],
            biases: vec![array![0.0], array![0.0]],
        };
        let out = Mlp.forward(&p, array![[0.5]].view());
        assert!((out[[0, 0]] - 0.5f32.tanh()).abs() < 1e-7);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let layout = LayerLayout::new(&[2, 3, 3, 1]).unwrap();
        let inputs = array![[0.1, -0.4], [0.7, 0.2], [-0.3, 0.9], [0.0, 0.0]];
        let targets = array![[0.2], [-0.5], [0.3], [0.1]];
        let objective = MseObjective::new(inputs, targets).unwrap();
        assert_eq!(objective.check_layout(&layout), Ok(()));
        let p = params(&layout, 1.0);

        let (loss, grad) = objective.loss_and_gradient(&p);
        assert!((loss - objective.loss(&p)).abs() < 1e-7);

        let flat = layout.encode(&p).unwrap();
        let analytic = layout.flatten_gradient(&grad).unwrap();
        let eps = 1e-2f32;
        for k in 0..flat.len() {
            let mut plus = flat.clone();
            plus[k] += eps;
            let mut minus = flat.clone();
            minus[k] -= eps;
            let numeric = (objective.loss(&layout.decode(plus.view()).unwrap())
                - objective.loss(&layout.decode(minus.view()).unwrap()))
                / (2.0 * eps);
            assert!(
                (numeric - analytic[k]).abs() < 2e-3,
                "parameter {k}: numeric {numeric} vs analytic {}",
                analytic[k]
            );
        }
    }

    #[test]
    fn dataset_shape_is_checked_against_layout() {
        assert_eq!(
            MseObjective::new(Array2::zeros((4, 1)), Array2::zeros((3, 1))).unwrap_err(),
            DatasetError::RowMismatch {
                inputs: 4,
                targets: 3
            }
        );
        assert_eq!(
            MseObjective::new(Array2::zeros((0, 1)), Array2::zeros((0, 1))).unwrap_err(),
            DatasetError::Empty
        );

        let objective = MseObjective::new(linspace_column(-1.0, 1.0, 8), Array2::zeros((8, 1)))
            .unwrap();
        assert_eq!(
            objective.check_layout(&LayerLayout::new(&[2, 3, 1]).unwrap()),
            Err(CodecError::InputWidth {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            objective.check_layout(&LayerLayout::new(&[1, 3, 2]).unwrap()),
            Err(CodecError::OutputWidth {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn normalize_maps_bounds_to_unit_interval() {
        let values = array![[0.0], [5.0], [10.0]];
        assert_eq!(normalize(&values, 0.0, 10.0), array![[-1.0], [0.0], [1.0]]);
        assert_eq!(linspace_column(-1.0, 1.0, 3), array![[-1.0], [0.0], [1.0]]);
    }
}
