//! Error types for tempdist.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during pair sampling, training, or checkpointing.
#[derive(Error, Debug)]
pub enum TempdistError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Sequence too short to form a valid pair for the given temporal distance.
    #[error("sequence length {seq_len} too short for tdist {tdist}: need at least tdist + 2 frames")]
    SequenceTooShort {
        /// Length of the offending sequence.
        seq_len: usize,
        /// Temporal-distance threshold.
        tdist: usize,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Optimizer algorithm name is not supported.
    #[error("optimizer '{name}' not supported")]
    UnsupportedOptimizer {
        /// The requested algorithm name.
        name: String,
    },

    /// Training loss became NaN or infinite.
    #[error("non-finite loss {value} at global step {step}")]
    NonFiniteLoss {
        /// The offending loss value.
        value: f32,
        /// Global step at which it occurred.
        step: usize,
    },

    /// No checkpoint found for the given selector.
    #[error("checkpoint not found: {}", path.display())]
    CheckpointNotFound {
        /// The resolved path that was searched.
        path: PathBuf,
    },

    /// A scoped partial load matched no parameters.
    #[error("no parameter with scope '{scope}' found in checkpoint")]
    EmptyScope {
        /// The scope prefix that matched nothing.
        scope: String,
    },

    /// Strict loading: a model parameter is absent from the state dict.
    #[error("missing parameter '{name}' in state dict (strict loading)")]
    MissingParam {
        /// Fully-qualified parameter name.
        name: String,
    },

    /// Strict loading: the state dict carries a name the model does not have.
    #[error("unexpected parameter '{name}' in state dict (strict loading)")]
    UnexpectedParam {
        /// Fully-qualified parameter name.
        name: String,
    },

    /// Invalid or corrupted checkpoint data.
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tempdist operations.
pub type Result<T> = std::result::Result<T, TempdistError>;
