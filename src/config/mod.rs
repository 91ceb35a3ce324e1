//! Configuration types for tempdist.
//!
//! Burn-style configuration structs for the classifier, the optimizer, and
//! the training loop.

mod model;
mod training;

pub use model::ClassifierConfig;
pub use training::{TrainingConfig, TrainingOverrides};
