// src/nn.rs
//
// Frozen dense-network primitives shared by the risk scorer and the policy.
//
// Weights are stored row-major in `[out, in]` layout so exported checkpoints
// map one-to-one. Inference only: dropout probabilities are recorded in the
// artifact but never applied.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Element-wise non-linearity applied after a layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Relu,
    /// Exact (erf) form: x * 0.5 * (1 + erf(x / sqrt(2))).
    Gelu,
}

impl Activation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Identity => x,
            Activation::Relu => x.max(0.0),
            Activation::Gelu => {
                let x64 = x as f64;
                (0.5 * x64 * (1.0 + erf(x64 / std::f64::consts::SQRT_2))) as f32
            }
        }
    }
}

/// Abramowitz & Stegun 7.1.26; |error| < 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// One fully-connected layer followed by its activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    /// Row-major `[out_dim, in_dim]`.
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub activation: Activation,
    #[serde(default)]
    pub dropout: f32,
}

impl DenseLayer {
    /// Uniform `U(-1/sqrt(in), 1/sqrt(in))` initialization for fixtures.
    pub fn seeded<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        dropout: f32,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (in_dim.max(1) as f32).sqrt();
        let weight = (0..in_dim * out_dim)
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        let bias = (0..out_dim).map(|_| rng.gen_range(-bound..bound)).collect();
        Self {
            in_dim,
            out_dim,
            weight,
            bias,
            activation,
            dropout,
        }
    }

    pub fn validate(&self, component: &str) -> Result<(), ConfigError> {
        if self.in_dim == 0 || self.out_dim == 0 {
            return Err(ConfigError::shape(component, "layer has a zero dimension"));
        }
        if self.weight.len() != self.in_dim * self.out_dim {
            return Err(ConfigError::shape(
                component,
                format!(
                    "weight has {} entries, expected {}x{}",
                    self.weight.len(),
                    self.out_dim,
                    self.in_dim
                ),
            ));
        }
        if self.bias.len() != self.out_dim {
            return Err(ConfigError::shape(
                component,
                format!(
                    "bias has {} entries, expected {}",
                    self.bias.len(),
                    self.out_dim
                ),
            ));
        }
        if self.weight.iter().chain(self.bias.iter()).any(|v| !v.is_finite()) {
            return Err(ConfigError::shape(component, "non-finite parameter"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::shape(
                component,
                format!("dropout {} outside [0, 1)", self.dropout),
            ));
        }
        Ok(())
    }

    /// `activation(W x + b)`. The caller guarantees `input.len() == in_dim`.
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        debug_assert_eq!(input.len(), self.in_dim);
        self.weight
            .chunks_exact(self.in_dim)
            .zip(self.bias.iter())
            .map(|(row, b)| {
                let acc = row
                    .iter()
                    .zip(input.iter())
                    .fold(*b, |acc, (w, x)| acc + w * x);
                self.activation.apply(acc)
            })
            .collect()
    }
}

/// Ordered chain of dense layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mlp {
    pub layers: Vec<DenseLayer>,
}

impl Mlp {
    /// Chain with the given widths: `widths[0]` inputs, `widths.last()` outputs.
    /// Hidden layers use `hidden`, the final layer uses `output`. Dropout is
    /// recorded on every non-linear layer; an identity output layer has none.
    pub fn seeded<R: Rng + ?Sized>(
        widths: &[usize],
        hidden: Activation,
        output: Activation,
        dropout: f32,
        rng: &mut R,
    ) -> Self {
        let n = widths.len().saturating_sub(1);
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let last = i + 1 == n;
                let act = if last { output } else { hidden };
                let p = if act == Activation::Identity { 0.0 } else { dropout };
                DenseLayer::seeded(w[0], w[1], act, p, rng)
            })
            .collect();
        Self { layers }
    }

    pub fn in_dim(&self) -> usize {
        self.layers.first().map(|l| l.in_dim).unwrap_or(0)
    }

    pub fn out_dim(&self) -> usize {
        self.layers.last().map(|l| l.out_dim).unwrap_or(0)
    }

    /// Check every layer and that consecutive widths chain.
    pub fn validate(
        &self,
        component: &str,
        expected_in: usize,
        expected_out: usize,
    ) -> Result<(), ConfigError> {
        if self.layers.is_empty() {
            return Err(ConfigError::shape(component, "no layers"));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.validate(&format!("{}[{}]", component, i))?;
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].out_dim != pair[1].in_dim {
                return Err(ConfigError::shape(
                    component,
                    format!(
                        "layer {} outputs {} but layer {} expects {}",
                        i,
                        pair[0].out_dim,
                        i + 1,
                        pair[1].in_dim
                    ),
                ));
            }
        }
        if self.in_dim() != expected_in || self.out_dim() != expected_out {
            return Err(ConfigError::shape(
                component,
                format!(
                    "maps {} -> {}, expected {} -> {}",
                    self.in_dim(),
                    self.out_dim(),
                    expected_in,
                    expected_out
                ),
            ));
        }
        Ok(())
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut x = input.to_vec();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        x
    }
}

/// Numerically stable softmax, computed in f64.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits
        .iter()
        .fold(f64::NEG_INFINITY, |m, v| m.max(*v as f64));
    let exps: Vec<f64> = logits.iter().map(|v| (*v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
