pub mod layer;
pub mod loss;
pub mod matrix;
pub mod optimizer;

use crate::error::AgentError;
use crate::persistence::{BundleMeta, ModelBundle, ModelTopology, WeightSpec};
use layer::{Dense, Layer, Relu};
use loss::{Loss, MeanSquaredError};
use matrix::Matrix;
use optimizer::{Optimizer, Sgd};

/// Function-approximator capability the agent trains against.
///
/// Any backend that can predict batched Q-values, fit toward batched
/// targets, and describe itself as a [`ModelBundle`] satisfies the agent's
/// contract.
pub trait ValueModel {
    fn input_dim(&self) -> usize;
    fn output_dim(&self) -> usize;

    /// Q-values for a `[batch, input_dim]` matrix of feature vectors.
    fn predict(&mut self, states: &Matrix) -> Matrix;

    /// One gradient pass over the batch toward `targets`; returns the loss.
    fn fit(&mut self, states: &Matrix, targets: &Matrix) -> f32;

    /// Topology plus raw weights; metadata is filled in by the caller.
    fn to_bundle(&self) -> ModelBundle;
}

/// Fully connected Q-network: Dense/ReLU stack with a linear output layer.
pub struct Mlp {
    layers: Vec<Box<dyn Layer>>,
    loss: Box<dyn Loss>,
    optimizer: Box<dyn Optimizer>,
    dims: Vec<usize>,
    learning_rate: f32,
}

impl Mlp {
    pub fn new(dims: &[usize], learning_rate: f32) -> Self {
        assert!(dims.len() >= 2, "network needs input and output dimensions");

        let mut layers: Vec<Box<dyn Layer>> = Vec::new();
        for i in 0..dims.len() - 1 {
            layers.push(Box::new(Dense::new(dims[i], dims[i + 1])));
            if i + 1 < dims.len() - 1 {
                layers.push(Box::new(Relu::new()));
            }
        }

        Self {
            layers,
            loss: Box::new(MeanSquaredError),
            optimizer: Box::new(Sgd::new(learning_rate)),
            dims: dims.to_vec(),
            learning_rate,
        }
    }

    /// Rebuild a network from a bundle, validating every declared shape
    /// against the topology before touching any layer.
    pub fn from_bundle(bundle: &ModelBundle) -> Result<Self, AgentError> {
        let ModelTopology::Mlp { dims, learning_rate } = &bundle.topology;
        if dims.len() < 2 {
            return Err(AgentError::Deserialize("topology has fewer than two dimensions".into()));
        }

        let tensors = split_weight_data(&bundle.weight_specs, &bundle.weight_data)?;
        let dense_count = dims.len() - 1;
        if tensors.len() != dense_count * 2 {
            return Err(AgentError::Deserialize(format!(
                "expected {} weight tensors for {} dense layers, found {}",
                dense_count * 2,
                dense_count,
                tensors.len()
            )));
        }

        let mut model = Mlp::new(dims, *learning_rate);
        let mut dense_idx = 0;
        for layer in &mut model.layers {
            let Some(dense) = layer.as_any_mut().downcast_mut::<Dense>() else {
                continue;
            };
            let (kernel_shape, kernel) = &tensors[dense_idx * 2];
            let (bias_shape, bias) = &tensors[dense_idx * 2 + 1];
            let expected_kernel = [dims[dense_idx], dims[dense_idx + 1]];
            let expected_bias = [1, dims[dense_idx + 1]];
            if kernel_shape.as_slice() != expected_kernel || bias_shape.as_slice() != expected_bias {
                return Err(AgentError::Deserialize(format!(
                    "layer {dense_idx} shapes {kernel_shape:?}/{bias_shape:?} do not match topology"
                )));
            }
            dense.weights = Matrix::from_vec(kernel.clone(), expected_kernel[0], expected_kernel[1]);
            dense.biases = Matrix::from_vec(bias.clone(), 1, expected_bias[1]);
            dense_idx += 1;
        }

        Ok(model)
    }
}

impl ValueModel for Mlp {
    fn input_dim(&self) -> usize {
        self.dims[0]
    }

    fn output_dim(&self) -> usize {
        *self.dims.last().unwrap_or(&0)
    }

    fn predict(&mut self, states: &Matrix) -> Matrix {
        let mut output = states.clone();
        for layer in &mut self.layers {
            output = layer.forward(&output);
        }
        output
    }

    fn fit(&mut self, states: &Matrix, targets: &Matrix) -> f32 {
        let y_pred = self.predict(states);
        let loss_value = self.loss.calculate(&y_pred, targets);

        let mut d_output = self.loss.gradient(&y_pred, targets);
        for layer in self.layers.iter_mut().rev() {
            d_output = layer.backward(&d_output);
        }
        self.optimizer.step(&mut self.layers);

        loss_value
    }

    fn to_bundle(&self) -> ModelBundle {
        let mut weight_specs = Vec::new();
        let mut weight_data = Vec::new();
        let mut dense_idx = 0;

        for layer in &self.layers {
            let Some(dense) = layer.as_any().downcast_ref::<Dense>() else {
                continue;
            };
            weight_specs.push(WeightSpec {
                name: format!("dense_{dense_idx}/kernel"),
                shape: vec![dense.weights.rows, dense.weights.cols],
                dtype: "f32".to_string(),
            });
            for v in &dense.weights.data {
                weight_data.extend_from_slice(&v.to_le_bytes());
            }
            weight_specs.push(WeightSpec {
                name: format!("dense_{dense_idx}/bias"),
                shape: vec![dense.biases.rows, dense.biases.cols],
                dtype: "f32".to_string(),
            });
            for v in &dense.biases.data {
                weight_data.extend_from_slice(&v.to_le_bytes());
            }
            dense_idx += 1;
        }

        ModelBundle {
            topology: ModelTopology::Mlp {
                dims: self.dims.clone(),
                learning_rate: self.learning_rate,
            },
            weight_specs,
            weight_data,
            meta: BundleMeta::default(),
        }
    }
}

impl Clone for Mlp {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.iter().map(|layer| layer.clone_box()).collect(),
            loss: self.loss.clone_box(),
            optimizer: self.optimizer.clone_box(),
            dims: self.dims.clone(),
            learning_rate: self.learning_rate,
        }
    }
}

/// Cut the flat weight blob into per-spec (shape, values) tensors.
fn split_weight_data(
    specs: &[WeightSpec],
    data: &[u8],
) -> Result<Vec<(Vec<usize>, Vec<f32>)>, AgentError> {
    let mut tensors = Vec::with_capacity(specs.len());
    let mut offset = 0usize;

    for spec in specs {
        if spec.dtype != "f32" {
            return Err(AgentError::Deserialize(format!(
                "unsupported dtype {} for {}",
                spec.dtype, spec.name
            )));
        }
        let count: usize = spec.shape.iter().product();
        let end = offset + count * 4;
        if end > data.len() {
            return Err(AgentError::Deserialize(format!(
                "weight data ends before tensor {}",
                spec.name
            )));
        }
        let values = data[offset..end]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        tensors.push((spec.shape.clone(), values));
        offset = end;
    }

    if offset != data.len() {
        return Err(AgentError::Deserialize(format!(
            "{} trailing weight bytes not covered by any spec",
            data.len() - offset
        )));
    }
    Ok(tensors)
}
