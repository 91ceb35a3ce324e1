//! Training loop configuration.

use burn::config::Config;

// The crate `Result` alias stays qualified here: `#[derive(Config)]`
// expands code that needs the two-parameter std `Result` in scope.
use crate::error::TempdistError;
use crate::training::OptimizerConfig;

use super::ClassifierConfig;

/// Configuration for the training orchestrator.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Classifier configuration.
    pub classifier: ClassifierConfig,

    /// Optimizer configuration.
    pub optimizer: OptimizerConfig,

    /// Number of sequences per minibatch.
    #[config(default = 32)]
    pub batch_size: usize,

    /// Number of training epochs.
    #[config(default = 200)]
    pub num_epochs: usize,

    /// Run validation every this many epochs.
    #[config(default = 3)]
    pub val_interval: usize,

    /// Emit scalar summaries every this many global steps.
    #[config(default = 10)]
    pub log_interval: usize,

    /// Emit image summaries every this many global steps (0 disables).
    #[config(default = 100)]
    pub image_log_interval: usize,

    /// Whether checkpoint loading requires an exact parameter-name match.
    #[config(default = true)]
    pub strict_weight_loading: bool,

    /// If true, training stops after the first validation pass.
    #[config(default = false)]
    pub metrics_only: bool,

    /// Seed for the pair-sampling random generator.
    #[config(default = 0)]
    pub seed: u64,
}

impl TrainingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.classifier.validate()?;
        self.optimizer.validate()?;

        if self.batch_size == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "batch_size must be positive".to_string(),
            });
        }
        if self.num_epochs == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "num_epochs must be positive".to_string(),
            });
        }
        if self.val_interval == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "val_interval must be positive".to_string(),
            });
        }
        if self.log_interval == 0 {
            return Err(TempdistError::InvalidConfig {
                message: "log_interval must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Apply an override set on top of this configuration.
    ///
    /// An override that matches the current value is suspicious but not an
    /// error; it is applied anyway and reported with a warning.
    pub fn apply_overrides(mut self, overrides: &TrainingOverrides) -> Self {
        fn apply<T: PartialEq + Copy + std::fmt::Debug>(
            field: &mut T,
            value: Option<T>,
            name: &str,
        ) {
            if let Some(value) = value {
                if *field == value {
                    log::warn!("override of {} to {:?} matches the current value", name, value);
                }
                *field = value;
            }
        }

        apply(&mut self.classifier.tdist, overrides.tdist, "tdist");
        apply(&mut self.classifier.use_mixup, overrides.use_mixup, "use_mixup");
        apply(&mut self.classifier.mixup_alpha, overrides.mixup_alpha, "mixup_alpha");
        apply(
            &mut self.optimizer.learning_rate,
            overrides.learning_rate,
            "learning_rate",
        );
        apply(&mut self.batch_size, overrides.batch_size, "batch_size");
        apply(&mut self.num_epochs, overrides.num_epochs, "num_epochs");
        self
    }
}

/// Optional overrides applied on top of a [`TrainingConfig`].
#[derive(Debug, Clone, Default)]
pub struct TrainingOverrides {
    /// Override for the temporal-distance threshold.
    pub tdist: Option<usize>,
    /// Override for mixup augmentation.
    pub use_mixup: Option<bool>,
    /// Override for the mixup Beta parameter.
    pub mixup_alpha: Option<f64>,
    /// Override for the learning rate.
    pub learning_rate: Option<f64>,
    /// Override for the minibatch size.
    pub batch_size: Option<usize>,
    /// Override for the epoch count.
    pub num_epochs: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> TrainingConfig {
        TrainingConfig::new(ClassifierConfig::new(5), OptimizerConfig::new())
    }

    #[test]
    fn test_default_training_config() {
        let config = make_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.num_epochs, 200);
        assert!(config.strict_weight_loading);
    }

    #[test]
    fn test_invalid_batch_size() {
        let config = make_config().with_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let overrides = TrainingOverrides {
            tdist: Some(7),
            learning_rate: Some(1e-4),
            ..Default::default()
        };
        let config = make_config().apply_overrides(&overrides);
        assert_eq!(config.classifier.tdist, 7);
        assert_eq!(config.optimizer.learning_rate, 1e-4);
        assert_eq!(config.batch_size, 32);
    }

    #[test]
    fn test_noop_override_is_not_an_error() {
        let overrides = TrainingOverrides {
            batch_size: Some(32),
            ..Default::default()
        };
        let config = make_config().apply_overrides(&overrides);
        assert_eq!(config.batch_size, 32);
        assert!(config.validate().is_ok());
    }
}
