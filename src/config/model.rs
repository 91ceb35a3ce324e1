//! Classifier configuration.

use burn::config::Config;

// The crate `Result` alias stays qualified here: `#[derive(Config)]`
// expands code that needs the two-parameter std `Result` in scope.
use crate::error::TempdistError;

/// Configuration for the temporal-distance classifier.
///
/// `tdist` is the temporal-distance threshold in frame-index units: frame
/// pairs closer than or equal to `tdist` are positives, pairs further apart
/// are negatives. It is fixed per classifier instance.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// Temporal-distance threshold (>= 1).
    pub tdist: usize,

    /// Number of channels per input frame.
    #[config(default = 3)]
    pub input_channels: usize,

    /// Output channels of each encoder stage.
    #[config(default = "vec![32, 64, 64]")]
    pub encoder_channels: Vec<usize>,

    /// Whether pair sampling uses mixup augmentation.
    #[config(default = false)]
    pub use_mixup: bool,

    /// Beta-distribution parameter for the mixup mixing coefficient.
    #[config(default = 1.0)]
    pub mixup_alpha: f64,
}

impl ClassifierConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.tdist < 1 {
            return Err(TempdistError::InvalidConfig {
                message: "tdist must be at least 1".to_string(),
            });
        }
        if self.input_channels == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "input_channels must be positive".to_string(),
            });
        }
        if self.encoder_channels.is_empty() {
            return Err(TempdistError::InvalidConfig {
                message: "encoder_channels must not be empty".to_string(),
            });
        }
        if self.use_mixup && self.mixup_alpha <= 0.0 {
            return Err(TempdistError::InvalidConfig {
                message: format!("mixup_alpha must be positive, got {}", self.mixup_alpha),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classifier_config() {
        let config = ClassifierConfig::new(5);
        assert!(config.validate().is_ok());
        assert_eq!(config.tdist, 5);
        assert_eq!(config.input_channels, 3);
        assert!(!config.use_mixup);
    }

    #[test]
    fn test_invalid_tdist() {
        let config = ClassifierConfig::new(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_mixup_alpha() {
        let config = ClassifierConfig::new(3)
            .with_use_mixup(true)
            .with_mixup_alpha(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClassifierConfig::new(3).with_encoder_channels(vec![8, 16]);
        assert_eq!(config.encoder_channels, vec![8, 16]);
    }
}
