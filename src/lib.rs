//! # tempdist
//!
//! Self-supervised temporal-distance classifier training with Burn.
//!
//! Given unlabeled video sequences, this crate trains a binary classifier
//! that answers "are these two frames within `tdist` steps of each other?".
//! Supervision comes entirely from frame indices: pairs closer than the
//! threshold are positives, pairs further apart are negatives, so no human
//! labels are needed. The learned probability serves as a reachability
//! signal downstream.
//!
//! ## Features
//!
//! - **Pair sampling**: positives/negatives by temporal distance, with an
//!   optional mixup mode producing soft labels
//! - **Classifier**: strided conv encoder, spatial-softmax keypoint pooling,
//!   linear head, stable binary cross-entropy on logits
//! - **Training loop**: epoch-driven with periodic validation on a
//!   gradient-free model copy, scalar/image summaries, and error-rate metrics
//! - **Checkpoints**: atomically written per-epoch directories with model
//!   weights, optimizer moments, and resume/scoped-load support
//!
//! ## Quick Start
//!
//! ```ignore
//! use tempdist::{
//!     config::{ClassifierConfig, TrainingConfig},
//!     data::TensorSequenceLoader,
//!     logging::ConsoleLogger,
//!     training::{ModelTrainer, OptimizerConfig},
//! };
//! use burn::backend::{Autodiff, NdArray};
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let config = TrainingConfig::new(ClassifierConfig::new(10), OptimizerConfig::new());
//! let device = Default::default();
//! let mut trainer =
//!     ModelTrainer::<MyBackend, _>::new(config, "checkpoints", ConsoleLogger, &device)?;
//!
//! let mut train_data = TensorSequenceLoader::new(train_sequences, 32)?;
//! let mut val_data = TensorSequenceLoader::new(val_sequences, 32)?;
//! trainer.train(&mut train_data, &mut val_data)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod nn;
pub mod sampler;
pub mod training;

// Re-export key types for convenience
pub use config::{ClassifierConfig, TrainingConfig, TrainingOverrides};
pub use error::{Result, TempdistError};
pub use nn::TempDistClassifier;
pub use sampler::PairSampler;
pub use training::{ModelTrainer, TrainOutcome};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ClassifierConfig, TrainingConfig, TrainingOverrides};
    pub use crate::data::{BatchLoader, TensorSequenceLoader, VideoBatch};
    pub use crate::error::{Result, TempdistError};
    pub use crate::logging::{ConsoleLogger, NullLogger, PairImageLog, Phase, TrainLogger};
    pub use crate::nn::{
        spatial_softmax, ClassifierOutput, ConvEncoder, RawTensor, StateDict, TempDistClassifier,
    };
    pub use crate::sampler::{PairBatch, PairSampler, TimePair};
    pub use crate::training::{
        checkpoint_exists, Checkpoint, CheckpointStore, GradientMetrics, MetricReport,
        MetricsTracker, ModelTrainer, OptimizerConfig, OptimizerState, ParamOptimizer,
        ResumeSelector, StepMetrics, TrainOutcome,
    };
}
