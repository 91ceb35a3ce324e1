//! Neural network components.
//!
//! The classifier is a small convolutional tower with spatial-softmax
//! pooling and a linear head; parameter state moves through the
//! backend-independent [`StateDict`] representation.

mod classifier;
mod encoder;
mod spatial_softmax;
mod state;

pub use classifier::{ClassifierOutput, TempDistClassifier};
pub use encoder::ConvEncoder;
pub use spatial_softmax::spatial_softmax;
pub use state::{RawTensor, StateDict};
