//! Training orchestration: optimizer, metrics, checkpoints, epoch loop.

mod checkpoint;
mod metrics;
mod optimizer;
mod trainer;

pub use checkpoint::{checkpoint_exists, Checkpoint, CheckpointStore, ResumeSelector};
pub use metrics::{GradientMetrics, MetricReport, MetricsTracker, StepMetrics};
pub use optimizer::{OptimizerConfig, OptimizerState, ParamOptimizer};
pub use trainer::{ModelTrainer, TrainOutcome};
