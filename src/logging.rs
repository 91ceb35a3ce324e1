//! Training summary sinks.
//!
//! The trainer reports scalars and pair images through the [`TrainLogger`]
//! trait so experiments can plug in whatever summary backend they use.
//! [`ConsoleLogger`] forwards to the `log` facade; [`NullLogger`] discards
//! everything.

use crate::error::Result;
use crate::nn::RawTensor;

/// Which part of the loop a summary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Emitted while optimizing.
    Train,
    /// Emitted during a validation pass.
    Val,
}

impl Phase {
    /// Tag used in summary names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }
}

/// Sampled pairs with the model's scores, for image summaries.
#[derive(Debug, Clone)]
pub struct PairImageLog {
    /// Positive pairs, `[B, 2, C, H, W]`.
    pub pos_pair: RawTensor,
    /// Negative pairs, `[B, 2, C, H, W]`.
    pub neg_pair: RawTensor,
    /// Predicted probabilities for the full batch, `[2B]`.
    pub probabilities: RawTensor,
}

/// Sink for training and validation summaries.
pub trait TrainLogger {
    /// Record a scalar value.
    fn log_scalar(&mut self, value: f32, name: &str, step: usize, phase: Phase) -> Result<()>;

    /// Record sampled pairs with their predicted scores.
    fn log_pair_images(
        &mut self,
        images: &PairImageLog,
        name: &str,
        step: usize,
        phase: Phase,
    ) -> Result<()>;
}

/// Logger that discards everything.
#[derive(Debug, Default, Clone)]
pub struct NullLogger;

impl TrainLogger for NullLogger {
    fn log_scalar(&mut self, _value: f32, _name: &str, _step: usize, _phase: Phase) -> Result<()> {
        Ok(())
    }

    fn log_pair_images(
        &mut self,
        _images: &PairImageLog,
        _name: &str,
        _step: usize,
        _phase: Phase,
    ) -> Result<()> {
        Ok(())
    }
}

/// Logger that forwards summaries to the `log` facade.
#[derive(Debug, Default, Clone)]
pub struct ConsoleLogger;

impl TrainLogger for ConsoleLogger {
    fn log_scalar(&mut self, value: f32, name: &str, step: usize, phase: Phase) -> Result<()> {
        log::info!("[{}] step {} {} = {:.6}", phase.as_str(), step, name, value);
        Ok(())
    }

    fn log_pair_images(
        &mut self,
        images: &PairImageLog,
        name: &str,
        step: usize,
        phase: Phase,
    ) -> Result<()> {
        log::debug!(
            "[{}] step {} {}: {} positive and {} negative pairs",
            phase.as_str(),
            step,
            name,
            images.pos_pair.shape.first().copied().unwrap_or(0),
            images.neg_pair.shape.first().copied().unwrap_or(0),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_tags() {
        assert_eq!(Phase::Train.as_str(), "train");
        assert_eq!(Phase::Val.as_str(), "val");
    }

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullLogger;
        assert!(logger.log_scalar(1.0, "loss", 0, Phase::Train).is_ok());

        let images = PairImageLog {
            pos_pair: RawTensor {
                shape: vec![2, 2, 3, 4, 4],
                values: vec![0.0; 2 * 2 * 3 * 4 * 4],
            },
            neg_pair: RawTensor {
                shape: vec![2, 2, 3, 4, 4],
                values: vec![0.0; 2 * 2 * 3 * 4 * 4],
            },
            probabilities: RawTensor {
                shape: vec![4],
                values: vec![0.5; 4],
            },
        };
        assert!(logger.log_pair_images(&images, "pairs", 0, Phase::Val).is_ok());
    }
}
