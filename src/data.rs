//! Minibatch types and the data-loading collaborator seam.
//!
//! The core treats data loading as an external, blocking collaborator: a
//! [`BatchLoader`] hands over fully materialized [`VideoBatch`]es one at a
//! time. Disk formats and prefetching live behind this trait and are out of
//! scope here; [`TensorSequenceLoader`] is the in-memory implementation used
//! by tests and demos.

use burn::prelude::*;

use crate::error::{Result, TempdistError};

/// A minibatch of video sequences.
///
/// Frames are time-major: `[batch, time, channel, height, width]`. All
/// sequences within a batch share the same length.
#[derive(Debug, Clone)]
pub struct VideoBatch<B: Backend> {
    /// Frame sequences, shape `[batch, time, channel, height, width]`.
    pub frames: Tensor<B, 5>,
}

impl<B: Backend> VideoBatch<B> {
    /// Create a new video batch from a frame tensor.
    pub fn new(frames: Tensor<B, 5>) -> Self {
        Self { frames }
    }

    /// Number of sequences in the batch.
    pub fn batch_size(&self) -> usize {
        self.frames.dims()[0]
    }

    /// Number of frames per sequence.
    pub fn sequence_length(&self) -> usize {
        self.frames.dims()[1]
    }

    /// Get the device of this batch.
    pub fn device(&self) -> B::Device {
        self.frames.device()
    }
}

/// Data-loading collaborator: yields minibatches of video sequences.
///
/// Implementations may prefetch on background workers but must hand off
/// fully materialized batches; the trainer consumes them synchronously.
pub trait BatchLoader<B: Backend> {
    /// Rewind to the start of the dataset.
    fn reset(&mut self);

    /// Yield the next minibatch, or `None` at the end of the epoch.
    fn next_batch(&mut self) -> Option<VideoBatch<B>>;

    /// Number of minibatches per epoch.
    fn num_batches(&self) -> usize;
}

/// In-memory batch loader over a pre-loaded sequence tensor.
///
/// Splits `[num_sequences, time, channel, h, w]` into consecutive full
/// batches; a trailing remainder smaller than `batch_size` is dropped.
pub struct TensorSequenceLoader<B: Backend> {
    sequences: Tensor<B, 5>,
    batch_size: usize,
    cursor: usize,
}

impl<B: Backend> TensorSequenceLoader<B> {
    /// Create a loader over a sequence tensor.
    pub fn new(sequences: Tensor<B, 5>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "batch_size must be positive".to_string(),
            });
        }
        let num_sequences = sequences.dims()[0];
        if num_sequences < batch_size {
            return Err(TempdistError::InvalidConfig {
                message: format!(
                    "dataset has {} sequences, fewer than batch_size {}",
                    num_sequences, batch_size
                ),
            });
        }
        Ok(Self {
            sequences,
            batch_size,
            cursor: 0,
        })
    }
}

impl<B: Backend> BatchLoader<B> for TensorSequenceLoader<B> {
    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn next_batch(&mut self) -> Option<VideoBatch<B>> {
        let start = self.cursor * self.batch_size;
        let end = start + self.batch_size;
        if end > self.sequences.dims()[0] {
            return None;
        }
        self.cursor += 1;
        let frames = self.sequences.clone().slice([start..end]);
        Some(VideoBatch::new(frames))
    }

    fn num_batches(&self) -> usize {
        self.sequences.dims()[0] / self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_video_batch_dims() {
        let device = Default::default();
        let frames = Tensor::<TestBackend, 5>::zeros([2, 10, 3, 8, 8], &device);
        let batch = VideoBatch::new(frames);

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.sequence_length(), 10);
    }

    #[test]
    fn test_loader_yields_full_batches() {
        let device = Default::default();
        let sequences = Tensor::<TestBackend, 5>::zeros([5, 10, 3, 8, 8], &device);
        let mut loader = TensorSequenceLoader::new(sequences, 2).unwrap();

        assert_eq!(loader.num_batches(), 2);

        let mut count = 0;
        while let Some(batch) = loader.next_batch() {
            assert_eq!(batch.batch_size(), 2);
            count += 1;
        }
        assert_eq!(count, 2);

        // After reset the loader yields the same number of batches again.
        loader.reset();
        assert!(loader.next_batch().is_some());
    }

    #[test]
    fn test_loader_rejects_small_dataset() {
        let device = Default::default();
        let sequences = Tensor::<TestBackend, 5>::zeros([1, 10, 3, 8, 8], &device);
        assert!(TensorSequenceLoader::new(sequences, 4).is_err());
    }
}
