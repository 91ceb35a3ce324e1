//! Self-supervised pair sampling over video sequences.
//!
//! Given a batch of equal-length sequences, [`PairSampler`] draws one
//! positive and one negative frame pair per sequence according to the
//! temporal-distance policy, or in mixup mode synthesizes soft-labeled
//! pairs by convex combination. Randomness comes exclusively from the
//! caller-provided generator, so seeding the generator makes sampling
//! deterministic.

use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

use crate::config::ClassifierConfig;
use crate::error::{Result, TempdistError};

/// A sampled pair of time indices with its label.
///
/// Positives satisfy `1 <= t1 - t0 <= tdist`, negatives `t1 - t0 > tdist`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePair {
    /// Earlier frame index.
    pub t0: usize,
    /// Later frame index.
    pub t1: usize,
    /// Binary label: 1.0 = within distance, 0.0 = outside.
    pub label: f32,
}

/// A batch of sampled frame pairs ready for the classifier.
#[derive(Debug, Clone)]
pub struct PairBatch<B: Backend> {
    /// Channel-concatenated pairs, shape `[2B, 2C, H, W]`, positives first.
    pub images: Tensor<B, 4>,
    /// Labels aligned with `images` by position, shape `[2B]`.
    pub labels: Tensor<B, 1>,
    /// Positive pairs kept separate for visualization, `[B, 2, C, H, W]`.
    pub pos_pair: Tensor<B, 5>,
    /// Negative pairs kept separate for visualization, `[B, 2, C, H, W]`.
    pub neg_pair: Tensor<B, 5>,
    /// The sampled indices; `None` in mixup mode where pairs are synthetic.
    pub index_pairs: Option<Vec<TimePair>>,
    /// The mixing coefficient used for this batch, if mixup was applied.
    pub mixup_lambda: Option<f64>,
}

/// Draws positive/negative frame pairs per the temporal-distance policy.
pub struct PairSampler {
    tdist: usize,
    mixup: Option<Beta<f64>>,
}

impl PairSampler {
    /// Create a sampler from a classifier configuration.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let mixup = if config.use_mixup {
            let beta = Beta::new(config.mixup_alpha, config.mixup_alpha).map_err(|_| {
                TempdistError::InvalidConfig {
                    message: format!("invalid mixup_alpha {}", config.mixup_alpha),
                }
            })?;
            Some(beta)
        } else {
            None
        };
        Ok(Self {
            tdist: config.tdist,
            mixup,
        })
    }

    /// The temporal-distance threshold this sampler was built with.
    pub fn tdist(&self) -> usize {
        self.tdist
    }

    /// Sample one positive and one negative pair per sequence.
    ///
    /// `frames` is `[batch, time, channel, h, w]`. Returns `2 * batch`
    /// examples stacked positives-then-negatives, with aligned labels.
    /// Fails with [`TempdistError::SequenceTooShort`] when the sequence
    /// length cannot accommodate `tdist`.
    pub fn sample<B: Backend, R: Rng>(
        &self,
        frames: &Tensor<B, 5>,
        rng: &mut R,
    ) -> Result<PairBatch<B>> {
        let seq_len = frames.dims()[1];
        self.check_length(seq_len)?;

        match &self.mixup {
            Some(beta) => self.sample_mixup(frames, beta, rng),
            None => self.sample_standard(frames, rng),
        }
    }

    /// Sample index pairs only (standard policy), positives then negatives.
    ///
    /// Exposed separately so the sampling distribution can be tested without
    /// materializing image tensors.
    pub fn sample_pairs<R: Rng>(
        &self,
        batch: usize,
        seq_len: usize,
        rng: &mut R,
    ) -> Result<Vec<TimePair>> {
        self.check_length(seq_len)?;
        let tdist = self.tdist;
        let mut pairs = Vec::with_capacity(2 * batch);

        for _ in 0..batch {
            let t0 = rng.gen_range(0..seq_len - tdist - 1);
            let t1 = t0 + 1 + rng.gen_range(0..tdist);
            pairs.push(TimePair { t0, t1, label: 1.0 });
        }
        for _ in 0..batch {
            let t0 = rng.gen_range(0..seq_len - tdist - 1);
            let t1 = rng.gen_range(t0 + tdist + 1..seq_len);
            pairs.push(TimePair { t0, t1, label: 0.0 });
        }
        Ok(pairs)
    }

    fn check_length(&self, seq_len: usize) -> Result<()> {
        // Positive t0 is drawn from [0, seq_len - tdist - 1), so the
        // sequence must have at least tdist + 2 frames.
        if seq_len < self.tdist + 2 {
            return Err(TempdistError::SequenceTooShort {
                seq_len,
                tdist: self.tdist,
            });
        }
        Ok(())
    }

    fn sample_standard<B: Backend, R: Rng>(
        &self,
        frames: &Tensor<B, 5>,
        rng: &mut R,
    ) -> Result<PairBatch<B>> {
        let [batch, seq_len, _, _, _] = frames.dims();
        let device = frames.device();

        let pairs = self.sample_pairs(batch, seq_len, rng)?;
        let (pos, neg) = pairs.split_at(batch);

        let pos_t0 = select_frames(frames, pos.iter().map(|p| p.t0));
        let pos_t1 = select_frames(frames, pos.iter().map(|p| p.t1));
        let neg_t0 = select_frames(frames, neg.iter().map(|p| p.t0));
        let neg_t1 = select_frames(frames, neg.iter().map(|p| p.t1));

        let pos_cat = Tensor::cat(vec![pos_t0.clone(), pos_t1.clone()], 1);
        let neg_cat = Tensor::cat(vec![neg_t0.clone(), neg_t1.clone()], 1);
        let images = Tensor::cat(vec![pos_cat, neg_cat], 0);

        let pos_pair: Tensor<B, 5> = Tensor::stack(vec![pos_t0, pos_t1], 1);
        let neg_pair: Tensor<B, 5> = Tensor::stack(vec![neg_t0, neg_t1], 1);

        let mut label_values = vec![1.0f32; batch];
        label_values.extend(std::iter::repeat(0.0f32).take(batch));
        let labels = Tensor::from_data(TensorData::new(label_values, [2 * batch]), &device);

        Ok(PairBatch {
            images,
            labels,
            pos_pair,
            neg_pair,
            index_pairs: Some(pairs),
            mixup_lambda: None,
        })
    }

    /// Mixup sampling: pool 2B pre-goal (positive) and 2B far (negative)
    /// frames, blend two random halves of the pool with a shared Beta-drawn
    /// coefficient, and pair the blended frames with the goal frames. Labels
    /// get the same blend and are therefore soft.
    fn sample_mixup<B: Backend, R: Rng>(
        &self,
        frames: &Tensor<B, 5>,
        beta: &Beta<f64>,
        rng: &mut R,
    ) -> Result<PairBatch<B>> {
        let [batch, seq_len, _, _, _] = frames.dims();
        let device = frames.device();
        let tdist = self.tdist;

        // Goal index per sequence, then two pre-goal and two far draws.
        let goals: Vec<usize> = (0..batch)
            .map(|_| rng.gen_range(tdist + 1..seq_len))
            .collect();
        let near = |rng: &mut R, g: usize| rng.gen_range(g - tdist..g);
        let far = |rng: &mut R, g: usize| rng.gen_range(0..g - tdist);

        let t_pos: Vec<usize> = goals.iter().map(|&g| near(rng, g)).collect();
        let t_pos_prime: Vec<usize> = goals.iter().map(|&g| near(rng, g)).collect();
        let t_neg: Vec<usize> = goals.iter().map(|&g| far(rng, g)).collect();
        let t_neg_prime: Vec<usize> = goals.iter().map(|&g| far(rng, g)).collect();

        let pool = Tensor::cat(
            vec![
                select_frames(frames, t_pos.iter().copied()),
                select_frames(frames, t_pos_prime.iter().copied()),
                select_frames(frames, t_neg.iter().copied()),
                select_frames(frames, t_neg_prime.iter().copied()),
            ],
            0,
        );
        let mut pool_labels = vec![1.0f32; 2 * batch];
        pool_labels.extend(std::iter::repeat(0.0f32).take(2 * batch));

        // Random partition of the pool into two halves.
        let mut indices: Vec<usize> = (0..4 * batch).collect();
        indices.shuffle(rng);
        let (half_a, half_b) = indices.split_at(2 * batch);

        let gather = |idx: &[usize]| {
            let idx_tensor = Tensor::<B, 1, Int>::from_data(
                TensorData::new(idx.iter().map(|&i| i as i64).collect::<Vec<_>>(), [idx.len()]),
                &device,
            );
            pool.clone().select(0, idx_tensor)
        };

        let lambda = beta.sample(rng);
        let blend = lambda as f32;
        let mixed = gather(half_a) * blend + gather(half_b) * (1.0 - blend);
        let mixed_labels: Vec<f32> = half_a
            .iter()
            .zip(half_b.iter())
            .map(|(&a, &b)| blend * pool_labels[a] + (1.0 - blend) * pool_labels[b])
            .collect();

        let goal_frames = select_frames(frames, goals.iter().copied());
        let mixed_first = mixed.clone().slice([0..batch]);
        let mixed_second = mixed.slice([batch..2 * batch]);

        let pos_cat = Tensor::cat(vec![mixed_first.clone(), goal_frames.clone()], 1);
        let neg_cat = Tensor::cat(vec![mixed_second.clone(), goal_frames.clone()], 1);
        let images = Tensor::cat(vec![pos_cat, neg_cat], 0);

        // The pos/neg split carries no class meaning here; it is kept so the
        // visualization path sees the same shapes as in standard mode.
        let pos_pair: Tensor<B, 5> = Tensor::stack(vec![mixed_first, goal_frames.clone()], 1);
        let neg_pair: Tensor<B, 5> = Tensor::stack(vec![mixed_second, goal_frames], 1);

        let labels = Tensor::from_data(TensorData::new(mixed_labels, [2 * batch]), &device);

        Ok(PairBatch {
            images,
            labels,
            pos_pair,
            neg_pair,
            index_pairs: None,
            mixup_lambda: Some(lambda),
        })
    }
}

/// Gather one frame per sequence: `frames[b, times[b]]`, stacked over `b`.
fn select_frames<B: Backend>(
    frames: &Tensor<B, 5>,
    times: impl Iterator<Item = usize>,
) -> Tensor<B, 4> {
    let [_, _, channels, height, width] = frames.dims();
    let selected: Vec<Tensor<B, 4>> = times
        .enumerate()
        .map(|(b, t)| {
            frames
                .clone()
                .slice([b..b + 1, t..t + 1])
                .reshape([1, channels, height, width])
        })
        .collect();
    Tensor::cat(selected, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestBackend = NdArray;

    fn make_sampler(tdist: usize) -> PairSampler {
        PairSampler::new(&ClassifierConfig::new(tdist)).unwrap()
    }

    fn make_mixup_sampler(tdist: usize, alpha: f64) -> PairSampler {
        PairSampler::new(
            &ClassifierConfig::new(tdist)
                .with_use_mixup(true)
                .with_mixup_alpha(alpha),
        )
        .unwrap()
    }

    /// Frames where every pixel of frame t holds the value t, so a blended
    /// frame's mean recovers the blend of its source indices.
    fn indexed_frames(batch: usize, seq_len: usize) -> Tensor<TestBackend, 5> {
        let device = Default::default();
        let mut values = Vec::with_capacity(batch * seq_len * 3 * 4 * 4);
        for _ in 0..batch {
            for t in 0..seq_len {
                values.extend(std::iter::repeat(t as f32).take(3 * 4 * 4));
            }
        }
        Tensor::from_data(TensorData::new(values, [batch, seq_len, 3, 4, 4]), &device)
    }

    #[test]
    fn test_pair_invariants_across_configs() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(seq_len, tdist, batch) in &[(31usize, 5usize, 4usize), (10, 1, 8), (20, 8, 2)] {
            let sampler = make_sampler(tdist);
            for _ in 0..50 {
                let pairs = sampler.sample_pairs(batch, seq_len, &mut rng).unwrap();
                assert_eq!(pairs.len(), 2 * batch);
                for pair in &pairs[..batch] {
                    assert!(pair.t1 > pair.t0);
                    let d = pair.t1 - pair.t0;
                    assert!(d >= 1 && d <= tdist, "positive distance {} for tdist {}", d, tdist);
                    assert_eq!(pair.label, 1.0);
                }
                for pair in &pairs[batch..] {
                    assert!(pair.t1 > pair.t0);
                    assert!(pair.t1 - pair.t0 > tdist);
                    assert!(pair.t1 < seq_len);
                    assert_eq!(pair.label, 0.0);
                }
            }
        }
    }

    #[test]
    fn test_sequence_too_short() {
        let sampler = make_sampler(5);
        let mut rng = StdRng::seed_from_u64(0);
        let err = sampler.sample_pairs(4, 6, &mut rng).unwrap_err();
        assert!(matches!(err, TempdistError::SequenceTooShort { seq_len: 6, tdist: 5 }));

        // tdist + 2 frames is the minimum that works.
        assert!(sampler.sample_pairs(4, 7, &mut rng).is_ok());
    }

    #[test]
    fn test_batch_layout_and_labels() {
        let sampler = make_sampler(3);
        let mut rng = StdRng::seed_from_u64(1);
        let frames = indexed_frames(4, 12);
        let batch = sampler.sample(&frames, &mut rng).unwrap();

        assert_eq!(batch.images.dims(), [8, 6, 4, 4]);
        assert_eq!(batch.pos_pair.dims(), [4, 2, 3, 4, 4]);
        assert_eq!(batch.neg_pair.dims(), [4, 2, 3, 4, 4]);

        let labels: Vec<f32> = batch.labels.to_data().to_vec().unwrap();
        assert_eq!(labels, vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(batch.mixup_lambda.is_none());
        assert_eq!(batch.index_pairs.as_ref().unwrap().len(), 8);
    }

    #[test]
    fn test_sampled_images_match_indices() {
        let sampler = make_sampler(3);
        let mut rng = StdRng::seed_from_u64(2);
        let frames = indexed_frames(2, 12);
        let batch = sampler.sample(&frames, &mut rng).unwrap();
        let pairs = batch.index_pairs.unwrap();

        let images: Vec<f32> = batch.images.to_data().to_vec().unwrap();
        let per_example = 6 * 4 * 4;
        let per_frame = 3 * 4 * 4;
        for (i, pair) in pairs.iter().enumerate() {
            let base = i * per_example;
            // First C channels hold frame t0, the rest frame t1.
            assert_eq!(images[base], pair.t0 as f32);
            assert_eq!(images[base + per_frame], pair.t1 as f32);
        }
    }

    #[test]
    fn test_determinism_under_seed() {
        let sampler = make_sampler(5);

        let mut rng_a = StdRng::seed_from_u64(99);
        let mut rng_b = StdRng::seed_from_u64(99);
        let pairs_a = sampler.sample_pairs(4, 31, &mut rng_a).unwrap();
        let pairs_b = sampler.sample_pairs(4, 31, &mut rng_b).unwrap();
        assert_eq!(pairs_a, pairs_b);

        let mut rng_c = StdRng::seed_from_u64(100);
        let pairs_c = sampler.sample_pairs(4, 31, &mut rng_c).unwrap();
        assert_ne!(pairs_a, pairs_c);
    }

    #[test]
    fn test_mixup_labels_in_unit_interval() {
        let sampler = make_mixup_sampler(4, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let frames = indexed_frames(4, 16);

        for _ in 0..20 {
            let batch = sampler.sample(&frames, &mut rng).unwrap();
            assert!(batch.index_pairs.is_none());
            let lambda = batch.mixup_lambda.unwrap();
            assert!((0.0..=1.0).contains(&lambda));
            let labels: Vec<f32> = batch.labels.to_data().to_vec().unwrap();
            assert_eq!(labels.len(), 8);
            for &label in &labels {
                assert!((0.0..=1.0).contains(&label), "label {} out of range", label);
            }
        }
    }

    #[test]
    fn test_mixup_images_and_labels_share_lambda() {
        let sampler = make_mixup_sampler(4, 1.0);
        let mut rng = StdRng::seed_from_u64(4);
        let frames = indexed_frames(4, 16);
        let batch = sampler.sample(&frames, &mut rng).unwrap();
        let lambda = batch.mixup_lambda.unwrap() as f32;

        // Every label is a convex combination of {0, 1} with the batch
        // coefficient, so it must be one of lambda, 1 - lambda, 0, or 1.
        let labels: Vec<f32> = batch.labels.to_data().to_vec().unwrap();
        for &label in &labels {
            let candidates = [lambda, 1.0 - lambda, 0.0, 1.0];
            assert!(
                candidates.iter().any(|c| (label - c).abs() < 1e-5),
                "label {} is not a lambda={} combination",
                label,
                lambda
            );
        }

        // Blended frame values must be convex combinations of frame indices,
        // hence within the index range.
        let images: Vec<f32> = batch.images.to_data().to_vec().unwrap();
        for &v in &images {
            assert!((0.0..=15.0).contains(&v));
        }
    }
}
