use ndarray::{s, Array1, Array2, ArrayView1};
use std::{error::Error, fmt};

/// Structured parameters of a dense feed-forward network.
///
/// `weights[l]` has shape `[layer_sizes[l], layer_sizes[l + 1]]` and `biases[l]`
/// has length `layer_sizes[l + 1]`. Gradients use the same representation.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkParams {
    pub weights: Vec<Array2<f32>>,
    pub biases: Vec<Array1<f32>>,
}

impl NetworkParams {
    /// All-zero parameters for `layout`.
    pub fn zeros(layout: &LayerLayout) -> Self {
        let weights = layout
            .layer_shapes()
            .map(|(fan_in, fan_out)| Array2::zeros((fan_in, fan_out)))
            .collect();
        let biases = layout
            .layer_shapes()
            .map(|(_, fan_out)| Array1::zeros(fan_out))
            .collect();
        Self { weights, biases }
    }

    pub fn layer_count(&self) -> usize {
        self.weights.len()
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.iter().all(|v| v.is_finite()))
            && self.biases.iter().all(|b| b.iter().all(|v| v.is_finite()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    InvalidLayerSizes,
    LengthMismatch {
        expected: usize,
        actual: usize,
    },
    LayerCountMismatch {
        expected: usize,
        actual: usize,
    },
    WeightShape {
        layer: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    BiasShape {
        layer: usize,
        expected: usize,
        actual: usize,
    },
    InputWidth {
        expected: usize,
        actual: usize,
    },
    OutputWidth {
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidLayerSizes => {
                write!(f, "layer_sizes needs at least two non-zero entries")
            }
            CodecError::LengthMismatch { expected, actual } => write!(
                f,
                "flat parameter vector has {actual} entries, layout expects {expected}"
            ),
            CodecError::LayerCountMismatch { expected, actual } => {
                write!(f, "got {actual} layers, layout declares {expected}")
            }
            CodecError::WeightShape {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "weight matrix {layer} has shape {actual:?}, expected {expected:?}"
            ),
            CodecError::BiasShape {
                layer,
                expected,
                actual,
            } => write!(
                f,
                "bias vector {layer} has length {actual}, expected {expected}"
            ),
            CodecError::InputWidth { expected, actual } => write!(
                f,
                "dataset has {actual} input columns, first layer expects {expected}"
            ),
            CodecError::OutputWidth { expected, actual } => write!(
                f,
                "dataset has {actual} target columns, last layer produces {expected}"
            ),
        }
    }
}

impl Error for CodecError {}

/// Flat layout of a dense network's parameters.
///
/// Per layer, the row-major weight matrix is followed by its bias vector.
/// `decode(encode(p)) == p` and `dimensions() == encode(p).len()` for any `p`
/// shaped after this layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerLayout {
    layer_sizes: Vec<usize>,
    dim: usize,
}

impl LayerLayout {
    pub fn new(layer_sizes: &[usize]) -> Result<Self, CodecError> {
        if layer_sizes.len() < 2 || layer_sizes.contains(&0) {
            return Err(CodecError::InvalidLayerSizes);
        }
        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            dim: dimensions(layer_sizes),
        })
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    /// Total flat parameter count, fixed at construction.
    pub fn dimensions(&self) -> usize {
        self.dim
    }

    pub fn layer_count(&self) -> usize {
        self.layer_sizes.len() - 1
    }

    pub fn input_width(&self) -> usize {
        self.layer_sizes[0]
    }

    pub fn output_width(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// `(fan_in, fan_out)` for each layer, input side first.
    pub fn layer_shapes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.layer_sizes.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn decode(&self, flat: ArrayView1<f32>) -> Result<NetworkParams, CodecError> {
        if flat.len() != self.dim {
            return Err(CodecError::LengthMismatch {
                expected: self.dim,
                actual: flat.len(),
            });
        }

        let mut weights = Vec::with_capacity(self.layer_count());
        let mut biases = Vec::with_capacity(self.layer_count());
        let mut offset = 0;
        for (layer, (fan_in, fan_out)) in self.layer_shapes().enumerate() {
            let n = fan_in * fan_out;
            let w = flat
                .slice(s![offset..offset + n])
                .to_owned()
                .into_shape_with_order((fan_in, fan_out))
                .map_err(|_| CodecError::WeightShape {
                    layer,
                    expected: (fan_in, fan_out),
                    actual: (n, 1),
                })?;
            offset += n;
            weights.push(w);

            biases.push(flat.slice(s![offset..offset + fan_out]).to_owned());
            offset += fan_out;
        }

        Ok(NetworkParams { weights, biases })
    }

    /// Flattens parameters (or a gradient) into layout order, checking every shape.
    pub fn encode(&self, params: &NetworkParams) -> Result<Array1<f32>, CodecError> {
        self.check_shapes(params)?;
        let mut flat = Vec::with_capacity(self.dim);
        for (w, b) in params.weights.iter().zip(&params.biases) {
            flat.extend(w.iter().copied());
            flat.extend(b.iter().copied());
        }
        Ok(Array1::from_vec(flat))
    }

    pub fn flatten_gradient(&self, grad: &NetworkParams) -> Result<Array1<f32>, CodecError> {
        self.encode(grad)
    }

    fn check_shapes(&self, params: &NetworkParams) -> Result<(), CodecError> {
        let expected = self.layer_count();
        for actual in [params.weights.len(), params.biases.len()] {
            if actual != expected {
                return Err(CodecError::LayerCountMismatch { expected, actual });
            }
        }
        for (layer, (fan_in, fan_out)) in self.layer_shapes().enumerate() {
            let w = &params.weights[layer];
            if w.dim() != (fan_in, fan_out) {
                return Err(CodecError::WeightShape {
                    layer,
                    expected: (fan_in, fan_out),
                    actual: w.dim(),
                });
            }
            let b = &params.biases[layer];
            if b.len() != fan_out {
                return Err(CodecError::BiasShape {
                    layer,
                    expected: fan_out,
                    actual: b.len(),
                });
            }
        }
        Ok(())
    }
}

/// Flat parameter count of a dense network with the given layer sizes.
pub fn dimensions(layer_sizes: &[usize]) -> usize {
    layer_sizes
        .windows(2)
        .map(|w| w[0] * w[1] + w[1])
        .sum()
}
