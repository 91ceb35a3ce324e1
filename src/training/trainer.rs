//! The training orchestrator.

use std::path::PathBuf;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::TrainingConfig;
use crate::data::BatchLoader;
use crate::error::{Result, TempdistError};
use crate::logging::{PairImageLog, Phase, TrainLogger};
use crate::nn::{ClassifierOutput, RawTensor, TempDistClassifier};
use crate::sampler::{PairBatch, PairSampler};

use super::checkpoint::{Checkpoint, CheckpointStore, ResumeSelector};
use super::metrics::{GradientMetrics, MetricReport, MetricsTracker, StepMetrics};
use super::optimizer::ParamOptimizer;

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainOutcome {
    /// All epochs ran to completion.
    Completed,
    /// Metrics-only mode: one validation pass ran and training stopped.
    /// Callers treating this as a job typically map it to a clean exit.
    MetricsOnly,
}

/// Drives the epoch loop: sampling, optimization, validation, checkpoints.
///
/// Holds two copies of the classifier: the autodiff model being optimized
/// and an inner-backend copy that validation runs on, refreshed from the
/// training weights before each pass.
pub struct ModelTrainer<B: AutodiffBackend, L: TrainLogger> {
    config: TrainingConfig,
    model: TempDistClassifier<B>,
    model_val: TempDistClassifier<B::InnerBackend>,
    sampler: PairSampler,
    optimizer: ParamOptimizer<B::InnerBackend>,
    store: CheckpointStore,
    logger: L,
    rng: StdRng,
    device: B::Device,
    epoch: usize,
    global_step: usize,
}

impl<B: AutodiffBackend, L: TrainLogger> ModelTrainer<B, L> {
    /// Build a trainer with freshly initialized weights.
    pub fn new(
        config: TrainingConfig,
        checkpoint_dir: impl Into<PathBuf>,
        logger: L,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;

        let model = TempDistClassifier::new(&config.classifier, device)?;
        let model_val = TempDistClassifier::new(&config.classifier, device)?;
        let sampler = PairSampler::new(&config.classifier)?;
        let optimizer = ParamOptimizer::build(&config.optimizer)?;
        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            model,
            model_val,
            sampler,
            optimizer,
            store: CheckpointStore::new(checkpoint_dir),
            logger,
            rng,
            device: device.clone(),
            epoch: 0,
            global_step: 0,
        })
    }

    /// Restore a full training snapshot: weights, counters, and (optionally)
    /// optimizer moments.
    pub fn resume(&mut self, selector: &ResumeSelector, restore_optimizer: bool) -> Result<()> {
        let checkpoint = self.store.load(selector)?;
        self.model
            .load_state_dict(&checkpoint.model_state, self.config.strict_weight_loading)?;
        if restore_optimizer {
            if let Some(state) = &checkpoint.optimizer_state {
                self.optimizer.import(state, &self.device)?;
            } else {
                log::warn!("checkpoint has no optimizer state, moments start fresh");
            }
        }
        self.epoch = checkpoint.epoch;
        self.global_step = checkpoint.global_step;
        log::info!(
            "resumed at epoch {} (step {})",
            self.epoch,
            self.global_step
        );
        Ok(())
    }

    /// Seed part of the model from a foreign checkpoint, e.g. a pretrained
    /// encoder. Counters are left untouched and loading is permissive.
    pub fn load_scoped_weights(&mut self, selector: &ResumeSelector, scope: &str) -> Result<()> {
        let scoped = self.store.load_scoped(selector, scope)?;
        self.model.load_state_dict(&scoped, false)
    }

    /// Run a validation pass over every persisted checkpoint, oldest first.
    ///
    /// Each checkpoint's weights and counters are restored in turn, so the
    /// logged summaries carry that checkpoint's global step; the trainer is
    /// left at the newest one. Returns the epochs visited.
    pub fn validate_checkpoints<V>(&mut self, val_data: &mut V) -> Result<Vec<usize>>
    where
        V: BatchLoader<B::InnerBackend>,
    {
        let epochs = self.store.epochs();
        if epochs.is_empty() {
            return Err(TempdistError::CheckpointNotFound {
                path: self.store.root().to_path_buf(),
            });
        }
        for &epoch in &epochs {
            self.resume(&ResumeSelector::Epoch(epoch), false)?;
            self.validate(val_data)?;
        }
        Ok(epochs)
    }

    /// Run the epoch loop.
    ///
    /// A checkpoint is written before every epoch and once more after the
    /// last, so `checkpoint_<n>` always holds the weights as they were when
    /// epoch `n` was about to run. In metrics-only mode a single validation
    /// pass runs instead and no checkpoint is written.
    pub fn train<D, V>(&mut self, train_data: &mut D, val_data: &mut V) -> Result<TrainOutcome>
    where
        D: BatchLoader<B>,
        V: BatchLoader<B::InnerBackend>,
    {
        if self.config.metrics_only {
            self.validate(val_data)?;
            return Ok(TrainOutcome::MetricsOnly);
        }

        let start_epoch = self.epoch;
        for epoch in start_epoch..self.config.num_epochs {
            self.epoch = epoch;
            if epoch > start_epoch && (epoch - start_epoch) % self.config.val_interval == 0 {
                self.validate(val_data)?;
            }
            self.save_checkpoint()?;
            self.train_epoch(train_data)?;
        }

        self.epoch = self.config.num_epochs;
        self.save_checkpoint()?;
        Ok(TrainOutcome::Completed)
    }

    fn train_epoch<D: BatchLoader<B>>(&mut self, data: &mut D) -> Result<()> {
        data.reset();
        let mut batches = 0usize;

        while let Some(batch) = data.next_batch() {
            let pair_batch = self.sampler.sample(&batch.frames, &mut self.rng)?;
            let output = self.model.forward(pair_batch.images.clone());
            let loss = self.model.loss(&output.logits, &pair_batch.labels)?;

            let loss_value: f32 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                return Err(TempdistError::NonFiniteLoss {
                    value: loss_value,
                    step: self.global_step,
                });
            }

            let grads = loss.backward();
            self.optimizer.advance();
            self.model.apply_gradients(&grads, &mut self.optimizer);
            self.global_step += 1;

            if self.global_step % self.config.log_interval == 0 {
                let probabilities: Vec<f32> =
                    output.probabilities.clone().to_data().to_vec().unwrap();
                let labels: Vec<f32> = pair_batch.labels.clone().to_data().to_vec().unwrap();
                let metrics = StepMetrics::compute(&probabilities, &labels, loss_value);
                self.log_scalars(&metrics, Phase::Train);
                let gradient_metrics =
                    GradientMetrics::compute(&self.model.gradient_norms(&grads));
                self.log_scalars(&gradient_metrics, Phase::Train);
            }
            if self.config.image_log_interval > 0
                && self.global_step % self.config.image_log_interval == 0
            {
                self.log_pair_images(&pair_batch, &output, Phase::Train);
            }
            batches += 1;
        }

        log::info!(
            "epoch {} trained ({} batches, step {})",
            self.epoch,
            batches,
            self.global_step
        );
        Ok(())
    }

    fn validate<V: BatchLoader<B::InnerBackend>>(&mut self, data: &mut V) -> Result<()> {
        self.model_val
            .load_state_dict(&self.model.state_dict(), true)?;

        data.reset();
        let mut tracker = MetricsTracker::new();
        let mut last_batch: Option<(
            PairBatch<B::InnerBackend>,
            ClassifierOutput<B::InnerBackend>,
        )> = None;

        while let Some(batch) = data.next_batch() {
            let pair_batch = self.sampler.sample(&batch.frames, &mut self.rng)?;
            let output = self.model_val.forward(pair_batch.images.clone());
            let loss = self.model_val.loss(&output.logits, &pair_batch.labels)?;
            let loss_value: f32 = loss.into_scalar().elem();

            let probabilities: Vec<f32> = output.probabilities.clone().to_data().to_vec().unwrap();
            let labels: Vec<f32> = pair_batch.labels.clone().to_data().to_vec().unwrap();
            tracker.add(&StepMetrics::compute(&probabilities, &labels, loss_value));
            last_batch = Some((pair_batch, output));
        }

        for (name, value) in tracker.averages() {
            if let Err(error) = self.logger.log_scalar(value, &name, self.global_step, Phase::Val) {
                log::warn!("scalar logging failed: {error}");
            }
        }
        if self.config.image_log_interval > 0 {
            if let Some((pair_batch, output)) = last_batch {
                self.log_pair_images(&pair_batch, &output, Phase::Val);
            }
        }

        log::info!(
            "validated at step {} over {} batches",
            self.global_step,
            tracker.count()
        );
        Ok(())
    }

    fn save_checkpoint(&self) -> Result<()> {
        let checkpoint = Checkpoint {
            epoch: self.epoch,
            global_step: self.global_step,
            model_state: self.model.state_dict(),
            optimizer_state: Some(self.optimizer.export()),
        };
        self.store.save(&checkpoint)?;
        Ok(())
    }

    fn log_scalars(&mut self, report: &dyn MetricReport, phase: Phase) {
        for (name, value) in report.metrics() {
            if let Err(error) = self.logger.log_scalar(value, &name, self.global_step, phase) {
                log::warn!("scalar logging failed: {error}");
            }
        }
    }

    fn log_pair_images<Bx: Backend>(
        &mut self,
        batch: &PairBatch<Bx>,
        output: &ClassifierOutput<Bx>,
        phase: Phase,
    ) {
        let images = PairImageLog {
            pos_pair: RawTensor::from_tensor(&batch.pos_pair),
            neg_pair: RawTensor::from_tensor(&batch.neg_pair),
            probabilities: RawTensor::from_tensor(&output.probabilities),
        };
        if let Err(error) =
            self.logger
                .log_pair_images(&images, "sampled_pairs", self.global_step, phase)
        {
            log::warn!("image logging failed: {error}");
        }
    }

    /// Epoch the trainer is at.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Completed optimizer steps.
    pub fn global_step(&self) -> usize {
        self.global_step
    }

    /// The model being trained.
    pub fn model(&self) -> &TempDistClassifier<B> {
        &self.model
    }

    /// The training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The checkpoint store this trainer writes to.
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }
}
