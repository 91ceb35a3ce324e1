//! Hand-rolled per-parameter optimizers.
//!
//! Parameters arrive flattened to rank 1 and keyed by their dotted path, so
//! moment buffers live in plain maps and serialize through the same
//! [`StateDict`] representation as model weights.

use std::collections::HashMap;

use burn::config::Config;
use burn::prelude::*;

// The crate `Result` alias stays qualified here: `#[derive(Config)]`
// expands code that needs the two-parameter std `Result` in scope.
use crate::error::TempdistError;
use crate::nn::{RawTensor, StateDict};

/// Optimizer configuration.
#[derive(Config, Debug)]
pub struct OptimizerConfig {
    /// Algorithm name: `"adam"` or `"sgd"`.
    #[config(default = "String::from(\"adam\")")]
    pub algorithm: String,

    /// Step size.
    #[config(default = 1e-3)]
    pub learning_rate: f64,

    /// Adam first-moment decay.
    #[config(default = 0.9)]
    pub beta1: f64,

    /// Adam second-moment decay.
    #[config(default = 0.999)]
    pub beta2: f64,

    /// Adam denominator fuzz.
    #[config(default = 1e-8)]
    pub epsilon: f64,

    /// L2 penalty folded into the gradient.
    #[config(default = 0.0)]
    pub weight_decay: f64,

    /// SGD momentum coefficient.
    #[config(default = 0.0)]
    pub momentum: f64,
}

impl OptimizerConfig {
    /// Validate the configuration. The algorithm name is checked when the
    /// optimizer is built.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(TempdistError::InvalidConfig {
                message: format!("learning_rate must be positive, got {}", self.learning_rate),
            });
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(TempdistError::InvalidConfig {
                message: format!("betas must lie in [0, 1), got {} / {}", self.beta1, self.beta2),
            });
        }
        if self.epsilon <= 0.0 {
            return Err(TempdistError::InvalidConfig {
                message: "epsilon must be positive".to_string(),
            });
        }
        if self.weight_decay < 0.0 || self.momentum < 0.0 {
            return Err(TempdistError::InvalidConfig {
                message: "weight_decay and momentum must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Serialized optimizer state: step count plus the moment buffers, keyed as
/// `<buffer>/<parameter path>`.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerState {
    /// Number of completed optimizer steps.
    pub step: usize,
    /// Moment buffers.
    pub tensors: StateDict,
}

/// Per-parameter optimizer over flattened rank-1 tensors.
pub enum ParamOptimizer<B: Backend> {
    /// Adam with bias correction.
    Adam {
        /// Step size.
        learning_rate: f64,
        /// First-moment decay.
        beta1: f64,
        /// Second-moment decay.
        beta2: f64,
        /// Denominator fuzz.
        epsilon: f64,
        /// L2 penalty folded into the gradient.
        weight_decay: f64,
        /// Completed steps, drives bias correction.
        step: usize,
        /// First moments per parameter.
        exp_avg: HashMap<String, Tensor<B, 1>>,
        /// Second moments per parameter.
        exp_avg_sq: HashMap<String, Tensor<B, 1>>,
    },
    /// Plain SGD, optionally with momentum.
    Sgd {
        /// Step size.
        learning_rate: f64,
        /// Momentum coefficient; zero disables the velocity buffer.
        momentum: f64,
        /// L2 penalty folded into the gradient.
        weight_decay: f64,
        /// Completed steps.
        step: usize,
        /// Velocity per parameter when momentum is enabled.
        velocity: HashMap<String, Tensor<B, 1>>,
    },
}

impl<B: Backend> ParamOptimizer<B> {
    /// Build an optimizer from its configuration.
    pub fn build(config: &OptimizerConfig) -> crate::error::Result<Self> {
        config.validate()?;
        match config.algorithm.as_str() {
            "adam" => Ok(Self::Adam {
                learning_rate: config.learning_rate,
                beta1: config.beta1,
                beta2: config.beta2,
                epsilon: config.epsilon,
                weight_decay: config.weight_decay,
                step: 0,
                exp_avg: HashMap::new(),
                exp_avg_sq: HashMap::new(),
            }),
            "sgd" => Ok(Self::Sgd {
                learning_rate: config.learning_rate,
                momentum: config.momentum,
                weight_decay: config.weight_decay,
                step: 0,
                velocity: HashMap::new(),
            }),
            other => Err(TempdistError::UnsupportedOptimizer {
                name: other.to_string(),
            }),
        }
    }

    /// Advance the step counter. Call once per minibatch, before the
    /// parameter updates of that batch.
    pub fn advance(&mut self) {
        match self {
            Self::Adam { step, .. } | Self::Sgd { step, .. } => *step += 1,
        }
    }

    /// Completed step count.
    pub fn steps(&self) -> usize {
        match self {
            Self::Adam { step, .. } | Self::Sgd { step, .. } => *step,
        }
    }

    /// Update one flattened parameter given its flattened gradient.
    pub fn step(&mut self, name: &str, param: Tensor<B, 1>, grad: Tensor<B, 1>) -> Tensor<B, 1> {
        match self {
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                weight_decay,
                step,
                exp_avg,
                exp_avg_sq,
            } => {
                let grad = if *weight_decay > 0.0 {
                    grad + param.clone() * *weight_decay
                } else {
                    grad
                };

                let m = exp_avg
                    .entry(name.to_string())
                    .or_insert_with(|| grad.zeros_like());
                *m = m.clone() * *beta1 + grad.clone() * (1.0 - *beta1);
                let m = m.clone();

                let v = exp_avg_sq
                    .entry(name.to_string())
                    .or_insert_with(|| grad.zeros_like());
                *v = v.clone() * *beta2 + grad.clone() * grad * (1.0 - *beta2);
                let v = v.clone();

                let t = (*step).max(1) as i32;
                let m_hat = m / (1.0 - beta1.powi(t));
                let v_hat = v / (1.0 - beta2.powi(t));

                param - m_hat * *learning_rate / (v_hat.sqrt().add_scalar(*epsilon))
            }
            Self::Sgd {
                learning_rate,
                momentum,
                weight_decay,
                velocity,
                ..
            } => {
                let grad = if *weight_decay > 0.0 {
                    grad + param.clone() * *weight_decay
                } else {
                    grad
                };

                let update = if *momentum > 0.0 {
                    let vel = velocity
                        .entry(name.to_string())
                        .or_insert_with(|| grad.zeros_like());
                    *vel = vel.clone() * *momentum + grad;
                    vel.clone()
                } else {
                    grad
                };

                param - update * *learning_rate
            }
        }
    }

    /// Capture the optimizer state for checkpointing.
    pub fn export(&self) -> OptimizerState {
        let mut tensors = StateDict::new();
        let step = self.steps();
        match self {
            Self::Adam {
                exp_avg, exp_avg_sq, ..
            } => {
                for (name, tensor) in exp_avg {
                    tensors.insert(format!("exp_avg/{name}"), RawTensor::from_tensor(tensor));
                }
                for (name, tensor) in exp_avg_sq {
                    tensors.insert(format!("exp_avg_sq/{name}"), RawTensor::from_tensor(tensor));
                }
            }
            Self::Sgd { velocity, .. } => {
                for (name, tensor) in velocity {
                    tensors.insert(format!("velocity/{name}"), RawTensor::from_tensor(tensor));
                }
            }
        }
        OptimizerState { step, tensors }
    }

    /// Restore a previously exported state.
    ///
    /// Fails with [`TempdistError::InvalidCheckpoint`] when a buffer key does
    /// not belong to this algorithm.
    pub fn import(&mut self, state: &OptimizerState, device: &B::Device) -> crate::error::Result<()> {
        match self {
            Self::Adam {
                step,
                exp_avg,
                exp_avg_sq,
                ..
            } => {
                *step = state.step;
                exp_avg.clear();
                exp_avg_sq.clear();
                for (key, raw) in &state.tensors {
                    let tensor = raw.to_tensor(device)?;
                    if let Some(name) = key.strip_prefix("exp_avg/") {
                        exp_avg.insert(name.to_string(), tensor);
                    } else if let Some(name) = key.strip_prefix("exp_avg_sq/") {
                        exp_avg_sq.insert(name.to_string(), tensor);
                    } else {
                        return Err(TempdistError::InvalidCheckpoint(format!(
                            "unknown adam buffer {key}"
                        )));
                    }
                }
            }
            Self::Sgd { step, velocity, .. } => {
                *step = state.step;
                velocity.clear();
                for (key, raw) in &state.tensors {
                    let tensor = raw.to_tensor(device)?;
                    if let Some(name) = key.strip_prefix("velocity/") {
                        velocity.insert(name.to_string(), tensor);
                    } else {
                        return Err(TempdistError::InvalidCheckpoint(format!(
                            "unknown sgd buffer {key}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
