//! The temporal-distance classifier network.

use burn::module::Param;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use crate::config::ClassifierConfig;
use crate::error::{Result, TempdistError};
use crate::training::ParamOptimizer;

use super::encoder::ConvEncoder;
use super::spatial_softmax::spatial_softmax;
use super::state::{RawTensor, StateDict};

/// Binary classifier over frame pairs: "are these two frames within `tdist`
/// steps of each other?"
///
/// A channel-concatenated pair goes through the strided [`ConvEncoder`],
/// gets pooled to keypoint coordinates by spatial softmax, and a single
/// linear head maps the coordinates to one logit per pair.
#[derive(Module, Debug)]
pub struct TempDistClassifier<B: Backend> {
    encoder: ConvEncoder<B>,
    head: Linear<B>,
    tdist: usize,
}

/// Everything a forward pass produces.
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Raw scores, shape `[n]`.
    pub logits: Tensor<B, 1>,
    /// Sigmoid of the logits, shape `[n]`.
    pub probabilities: Tensor<B, 1>,
    /// Pooled keypoint coordinates, shape `[n, 2 * encoder_channels]`.
    pub embeddings: Tensor<B, 2>,
}

impl<B: Backend> TempDistClassifier<B> {
    /// Build the classifier from a configuration.
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Result<Self> {
        let encoder = ConvEncoder::new(config, device)?;
        let head = LinearConfig::new(2 * encoder.out_channels(), 1).init(device);
        Ok(Self {
            encoder,
            head,
            tdist: config.tdist,
        })
    }

    /// The temporal-distance threshold this classifier was trained for.
    pub fn tdist(&self) -> usize {
        self.tdist
    }

    /// Score a batch of channel-concatenated pairs, `[n, 2C, H, W]`.
    pub fn forward(&self, pairs: Tensor<B, 4>) -> ClassifierOutput<B> {
        let features = self.encoder.forward(pairs);
        let embeddings = spatial_softmax(features);
        let logits: Tensor<B, 1> = self.head.forward(embeddings.clone()).squeeze(1);
        let probabilities = sigmoid(logits.clone());
        ClassifierOutput {
            logits,
            probabilities,
            embeddings,
        }
    }

    /// Score explicit (current, goal) frame batches of shape `[n, C, H, W]`.
    pub fn forward_pair(&self, current: Tensor<B, 4>, goal: Tensor<B, 4>) -> ClassifierOutput<B> {
        self.forward(Tensor::cat(vec![current, goal], 1))
    }

    /// Mean binary cross-entropy between logits and (possibly soft) labels.
    ///
    /// Computed in the numerically stable form
    /// `max(x, 0) - x * y + ln(1 + e^(-|x|))`, so extreme logits never
    /// produce overflow.
    pub fn loss(&self, logits: &Tensor<B, 1>, labels: &Tensor<B, 1>) -> Result<Tensor<B, 1>> {
        if logits.dims() != labels.dims() {
            return Err(TempdistError::ShapeMismatch {
                expected: logits.dims().to_vec(),
                got: labels.dims().to_vec(),
            });
        }
        let x = logits.clone();
        let per_example = x.clone().clamp_min(0.0) - x.clone() * labels.clone()
            + x.abs().neg().exp().add_scalar(1.0).log();
        Ok(per_example.mean())
    }

    /// Dotted names of every parameter, in state-dict order.
    pub fn param_names(&self) -> Vec<String> {
        self.state_dict().into_keys().collect()
    }

    /// Capture all parameters as backend-independent tensors.
    pub fn state_dict(&self) -> StateDict {
        let mut state = StateDict::new();
        for (i, conv) in self.encoder.convs().iter().enumerate() {
            state.insert(
                format!("encoder.conv{i}.weight"),
                RawTensor::from_tensor(&conv.weight.val()),
            );
            if let Some(bias) = &conv.bias {
                state.insert(
                    format!("encoder.conv{i}.bias"),
                    RawTensor::from_tensor(&bias.val()),
                );
            }
        }
        state.insert(
            "head.weight".to_string(),
            RawTensor::from_tensor(&self.head.weight.val()),
        );
        if let Some(bias) = &self.head.bias {
            state.insert(
                "head.bias".to_string(),
                RawTensor::from_tensor(&bias.val()),
            );
        }
        state
    }

    /// Restore parameters from a state dict.
    ///
    /// With `strict` set, every parameter must be present and no extra
    /// entries are tolerated. Without it, matching entries are loaded and
    /// the rest are skipped with a warning.
    pub fn load_state_dict(&mut self, state: &StateDict, strict: bool) -> Result<()> {
        let expected = self.param_names();
        if strict {
            for name in &expected {
                if !state.contains_key(name) {
                    return Err(TempdistError::MissingParam { name: name.clone() });
                }
            }
            for name in state.keys() {
                if !expected.iter().any(|e| e == name) {
                    return Err(TempdistError::UnexpectedParam { name: name.clone() });
                }
            }
        } else {
            for name in state.keys() {
                if !expected.iter().any(|e| e == name) {
                    log::warn!("skipping unknown parameter {}", name);
                }
            }
        }

        let device = self.head.weight.val().device();
        let num_convs = self.encoder.convs().len();
        for i in 0..num_convs {
            let conv = &mut self.encoder.convs_mut()[i];
            if let Some(raw) = state.get(&format!("encoder.conv{i}.weight")) {
                conv.weight = load_param(&conv.weight, raw, &device)?;
            }
            if let Some(raw) = state.get(&format!("encoder.conv{i}.bias")) {
                if let Some(bias) = &conv.bias {
                    conv.bias = Some(load_param(bias, raw, &device)?);
                }
            }
        }
        if let Some(raw) = state.get("head.weight") {
            self.head.weight = load_param(&self.head.weight, raw, &device)?;
        }
        if let Some(raw) = state.get("head.bias") {
            if let Some(bias) = &self.head.bias {
                self.head.bias = Some(load_param(bias, raw, &device)?);
            }
        }
        Ok(())
    }
}

impl<B: AutodiffBackend> TempDistClassifier<B> {
    /// Apply one optimizer step to every parameter that received a gradient.
    pub fn apply_gradients(
        &mut self,
        grads: &B::Gradients,
        optimizer: &mut ParamOptimizer<B::InnerBackend>,
    ) {
        let num_convs = self.encoder.convs().len();
        for i in 0..num_convs {
            let conv = &mut self.encoder.convs_mut()[i];
            step_param(
                &format!("encoder.conv{i}.weight"),
                &mut conv.weight,
                grads,
                optimizer,
            );
            if let Some(bias) = conv.bias.as_mut() {
                step_param(&format!("encoder.conv{i}.bias"), bias, grads, optimizer);
            }
        }
        step_param("head.weight", &mut self.head.weight, grads, optimizer);
        if let Some(bias) = self.head.bias.as_mut() {
            step_param("head.bias", bias, grads, optimizer);
        }
    }

    /// L2 norm of each parameter's gradient, for the ones that received one.
    pub fn gradient_norms(&self, grads: &B::Gradients) -> Vec<f32> {
        let mut norms = Vec::new();
        for conv in self.encoder.convs() {
            if let Some(norm) = grad_norm(&conv.weight, grads) {
                norms.push(norm);
            }
            if let Some(bias) = &conv.bias {
                if let Some(norm) = grad_norm(bias, grads) {
                    norms.push(norm);
                }
            }
        }
        if let Some(norm) = grad_norm(&self.head.weight, grads) {
            norms.push(norm);
        }
        if let Some(bias) = &self.head.bias {
            if let Some(norm) = grad_norm(bias, grads) {
                norms.push(norm);
            }
        }
        norms
    }
}

fn load_param<B: Backend, const D: usize>(
    current: &Param<Tensor<B, D>>,
    raw: &RawTensor,
    device: &B::Device,
) -> Result<Param<Tensor<B, D>>> {
    let expected = current.val().dims().to_vec();
    if raw.shape != expected {
        return Err(TempdistError::ShapeMismatch {
            expected,
            got: raw.shape.clone(),
        });
    }
    Ok(Param::from_tensor(raw.to_tensor(device)?))
}

fn grad_norm<B: AutodiffBackend, const D: usize>(
    param: &Param<Tensor<B, D>>,
    grads: &B::Gradients,
) -> Option<f32> {
    let value = param.val();
    let grad = value.grad(grads)?;
    let count: usize = grad.dims().iter().product();
    let flat = grad.reshape([count]);
    Some((flat.clone() * flat).sum().sqrt().into_scalar().elem())
}

fn step_param<B: AutodiffBackend, const D: usize>(
    name: &str,
    param: &mut Param<Tensor<B, D>>,
    grads: &B::Gradients,
    optimizer: &mut ParamOptimizer<B::InnerBackend>,
) {
    let value = param.val();
    let Some(grad) = value.grad(grads) else {
        return;
    };
    let dims = value.dims();
    let count: usize = dims.iter().product();
    let flat = value.inner().reshape([count]);
    let grad_flat = grad.reshape([count]);
    let updated = optimizer.step(name, flat, grad_flat);
    *param = Param::from_tensor(Tensor::from_inner(updated.reshape(dims)));
}
