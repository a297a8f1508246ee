//! Dense network inference for the shot scorers.
//!
//! Small MLPs stored as JSON. Shapes are checked at load time so that a
//! broken artifact stops the process before any game is scored.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RinkError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    fn out_dim(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let sum = row.iter().zip(x).fold(*b, |acc, (w, v)| acc + w * v);
                self.activation.apply(sum)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,

    /// Optional z-score normalization, applied before the first layer
    #[serde(default)]
    pub input_mean: Option<Vec<f64>>,
    #[serde(default)]
    pub input_std: Option<Vec<f64>>,

    pub layers: Vec<DenseLayer>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        let model: Self = serde_json::from_str(&content)
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        model
            .validate()
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        Ok(model)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }
        match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => {
                if mean.len() != self.input_dim || std.len() != self.input_dim {
                    return Err(format!(
                        "normalization lengths {}/{} != input_dim {}",
                        mean.len(),
                        std.len(),
                        self.input_dim
                    ));
                }
                if std.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                    return Err("input_std must be finite and > 0".to_string());
                }
            }
            (None, None) => {}
            _ => return Err("input_mean and input_std must be provided together".to_string()),
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.out_dim() == 0 {
                return Err(format!("layer[{idx}] has no outputs"));
            }
            if layer.bias.len() != layer.out_dim() {
                return Err(format!(
                    "layer[{idx}] bias len {} != out_dim {}",
                    layer.bias.len(),
                    layer.out_dim()
                ));
            }
            if let Some((r, row)) = layer
                .weights
                .iter()
                .enumerate()
                .find(|(_, row)| row.len() != expected_in)
            {
                return Err(format!(
                    "layer[{idx}] weights row {r} len {} != expected in_dim {expected_in}",
                    row.len()
                ));
            }
            let finite = layer.weights.iter().flatten().chain(&layer.bias).all(|v| v.is_finite());
            if !finite {
                return Err(format!("layer[{idx}] contains non-finite parameters"));
            }
            expected_in = layer.out_dim();
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim()).unwrap_or(0)
    }

    /// Single sigmoid output, i.e. a probability
    pub fn is_probability_head(&self) -> bool {
        self.output_dim() == 1
            && self
                .layers
                .last()
                .map(|l| l.activation == Activation::Sigmoid)
                .unwrap_or(false)
    }

    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        if input.len() != self.input_dim {
            return Err(RinkError::Scoring(format!(
                "input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            )));
        }

        let mut x: Vec<f64> = match (&self.input_mean, &self.input_std) {
            (Some(mean), Some(std)) => input
                .iter()
                .zip(mean.iter().zip(std))
                .map(|(v, (m, s))| (v - m) / s.max(1e-12))
                .collect(),
            _ => input.to_vec(),
        };
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        Ok(x)
    }

    pub fn forward_scalar(&self, input: &[f64]) -> Result<f64> {
        match self.forward(input)?.as_slice() {
            [p] => Ok(*p),
            out => Err(RinkError::Scoring(format!(
                "expected a single output, got {}",
                out.len()
            ))),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    // stable for large |x|
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
