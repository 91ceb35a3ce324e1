//! Checkpoint save/load functionality for training state.
//!
//! Each checkpoint is a directory `checkpoint_<epoch>/` under the store
//! root, holding `metadata.json`, the model weights in `model.bin`, and
//! optionally the optimizer moments in `optimizer.bin`. Writes go through a
//! `.tmp` sibling that is renamed into place, so a crash mid-save never
//! leaves a half-written checkpoint behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TempdistError};
use crate::nn::{RawTensor, StateDict};

use super::optimizer::OptimizerState;

const CHECKPOINT_VERSION: u32 = 1;
const CHECKPOINT_PREFIX: &str = "checkpoint_";

/// A complete training snapshot.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Epoch this snapshot was taken at.
    pub epoch: usize,
    /// Global optimizer step count.
    pub global_step: usize,
    /// Model parameters.
    pub model_state: StateDict,
    /// Optimizer moments, if the save included them.
    pub optimizer_state: Option<OptimizerState>,
}

/// Which checkpoint to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeSelector {
    /// The highest-epoch valid checkpoint in the store.
    Latest,
    /// The checkpoint saved at a specific epoch.
    Epoch(usize),
    /// An explicit checkpoint directory, possibly outside the store.
    Path(PathBuf),
}

/// Checkpoint metadata stored as JSON.
#[derive(Debug, Clone)]
struct CheckpointMetadata {
    version: u32,
    epoch: usize,
    global_step: usize,
}

impl CheckpointMetadata {
    fn to_json(&self) -> String {
        format!(
            r#"{{
  "version": {},
  "epoch": {},
  "global_step": {}
}}"#,
            self.version, self.epoch, self.global_step
        )
    }

    // Simple JSON parsing without serde.
    fn from_json(json: &str) -> Result<Self> {
        let mut metadata = Self {
            version: CHECKPOINT_VERSION,
            epoch: 0,
            global_step: 0,
        };
        for line in json.lines() {
            let line = line.trim();
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().trim_matches('"');
                let value = value.trim().trim_end_matches(',').trim_matches('"');
                match key {
                    "version" => {
                        metadata.version = value.parse().map_err(|_| {
                            TempdistError::InvalidCheckpoint(format!("bad version {value}"))
                        })?;
                    }
                    "epoch" => {
                        metadata.epoch = value.parse().map_err(|_| {
                            TempdistError::InvalidCheckpoint(format!("bad epoch {value}"))
                        })?;
                    }
                    "global_step" => {
                        metadata.global_step = value.parse().map_err(|_| {
                            TempdistError::InvalidCheckpoint(format!("bad global_step {value}"))
                        })?;
                    }
                    _ => {}
                }
            }
        }
        Ok(metadata)
    }
}

/// Directory-backed checkpoint store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write a checkpoint, replacing any existing one for the same epoch.
    ///
    /// Returns the final checkpoint directory.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;

        let name = format!("{}{}", CHECKPOINT_PREFIX, checkpoint.epoch);
        let staging = self.root.join(format!("{name}.tmp"));
        let target = self.root.join(&name);

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let metadata = CheckpointMetadata {
            version: CHECKPOINT_VERSION,
            epoch: checkpoint.epoch,
            global_step: checkpoint.global_step,
        };
        fs::write(staging.join("metadata.json"), metadata.to_json())?;

        let mut model_file = BufWriter::new(File::create(staging.join("model.bin"))?);
        write_state_dict(&mut model_file, &checkpoint.model_state)?;
        model_file.flush()?;

        if let Some(optimizer_state) = &checkpoint.optimizer_state {
            let mut optimizer_file = BufWriter::new(File::create(staging.join("optimizer.bin"))?);
            optimizer_file.write_all(&(optimizer_state.step as u64).to_le_bytes())?;
            write_state_dict(&mut optimizer_file, &optimizer_state.tensors)?;
            optimizer_file.flush()?;
        }

        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;

        log::info!(
            "saved checkpoint to {:?} (epoch {}, step {})",
            target,
            checkpoint.epoch,
            checkpoint.global_step
        );
        Ok(target)
    }

    /// Resolve a selector to a checkpoint directory.
    pub fn resolve(&self, selector: &ResumeSelector) -> Result<PathBuf> {
        match selector {
            ResumeSelector::Latest => {
                self.find_latest()
                    .ok_or_else(|| TempdistError::CheckpointNotFound {
                        path: self.root.clone(),
                    })
            }
            ResumeSelector::Epoch(epoch) => {
                let path = self.root.join(format!("{CHECKPOINT_PREFIX}{epoch}"));
                if checkpoint_exists(&path) {
                    Ok(path)
                } else {
                    Err(TempdistError::CheckpointNotFound { path })
                }
            }
            ResumeSelector::Path(path) => {
                if checkpoint_exists(path) {
                    Ok(path.clone())
                } else {
                    Err(TempdistError::CheckpointNotFound { path: path.clone() })
                }
            }
        }
    }

    /// Load the checkpoint a selector points at.
    pub fn load(&self, selector: &ResumeSelector) -> Result<Checkpoint> {
        let dir = self.resolve(selector)?;

        let metadata_str = fs::read_to_string(dir.join("metadata.json"))?;
        let metadata = CheckpointMetadata::from_json(&metadata_str)?;
        if metadata.version != CHECKPOINT_VERSION {
            return Err(TempdistError::InvalidCheckpoint(format!(
                "unsupported checkpoint version {}",
                metadata.version
            )));
        }

        let mut model_file = BufReader::new(File::open(dir.join("model.bin"))?);
        let model_state = read_state_dict(&mut model_file)?;

        let optimizer_path = dir.join("optimizer.bin");
        let optimizer_state = if optimizer_path.exists() {
            let mut optimizer_file = BufReader::new(File::open(&optimizer_path)?);
            let mut step_bytes = [0u8; 8];
            optimizer_file.read_exact(&mut step_bytes)?;
            let tensors = read_state_dict(&mut optimizer_file)?;
            Some(OptimizerState {
                step: u64::from_le_bytes(step_bytes) as usize,
                tensors,
            })
        } else {
            None
        };

        log::info!(
            "loaded checkpoint from {:?} (epoch {}, step {})",
            dir,
            metadata.epoch,
            metadata.global_step
        );
        Ok(Checkpoint {
            epoch: metadata.epoch,
            global_step: metadata.global_step,
            model_state,
            optimizer_state,
        })
    }

    /// Load only the parameters under `<scope>.`, with the prefix stripped.
    ///
    /// Used to seed a submodule from a full checkpoint. An empty selection
    /// is an error so a misspelled scope cannot silently load nothing.
    pub fn load_scoped(&self, selector: &ResumeSelector, scope: &str) -> Result<StateDict> {
        let checkpoint = self.load(selector)?;
        let prefix = format!("{scope}.");
        let scoped: StateDict = checkpoint
            .model_state
            .into_iter()
            .filter_map(|(name, tensor)| {
                name.strip_prefix(&prefix)
                    .map(|stripped| (stripped.to_string(), tensor))
            })
            .collect();
        if scoped.is_empty() {
            return Err(TempdistError::EmptyScope {
                scope: scope.to_string(),
            });
        }
        Ok(scoped)
    }

    /// Epochs of every valid checkpoint in the store, ascending.
    pub fn epochs(&self) -> Vec<usize> {
        let mut epochs = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(epoch_str) = name.strip_prefix(CHECKPOINT_PREFIX) else {
                    continue;
                };
                let Ok(epoch) = epoch_str.parse::<usize>() else {
                    continue;
                };
                if checkpoint_exists(&path) {
                    epochs.push(epoch);
                }
            }
        }
        epochs.sort_unstable();
        epochs
    }

    fn find_latest(&self) -> Option<PathBuf> {
        let mut latest: Option<(usize, PathBuf)> = None;
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                let Some(epoch_str) = name.strip_prefix(CHECKPOINT_PREFIX) else {
                    continue;
                };
                let Ok(epoch) = epoch_str.parse::<usize>() else {
                    continue;
                };
                if !checkpoint_exists(&path) {
                    continue;
                }
                match &latest {
                    Some((best, _)) if *best >= epoch => {}
                    _ => latest = Some((epoch, path)),
                }
            }
        }
        latest.map(|(_, path)| path)
    }
}

/// Check whether a directory holds a complete checkpoint.
pub fn checkpoint_exists(dir: &Path) -> bool {
    dir.join("metadata.json").exists() && dir.join("model.bin").exists()
}

// Binary layout: u32 entry count, then per entry u32 name length, the
// UTF-8 name, u32 rank, u64 per dimension, and the f32 values in
// little-endian row-major order.

fn write_state_dict<W: Write>(writer: &mut W, state: &StateDict) -> Result<()> {
    writer.write_all(&(state.len() as u32).to_le_bytes())?;
    for (name, tensor) in state {
        writer.write_all(&(name.len() as u32).to_le_bytes())?;
        writer.write_all(name.as_bytes())?;
        writer.write_all(&(tensor.shape.len() as u32).to_le_bytes())?;
        for &dim in &tensor.shape {
            writer.write_all(&(dim as u64).to_le_bytes())?;
        }
        for &value in &tensor.values {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_state_dict<R: Read>(reader: &mut R) -> Result<StateDict> {
    let count = read_u32(reader)? as usize;
    let mut state = StateDict::new();
    for _ in 0..count {
        let name_len = read_u32(reader)? as usize;
        let mut name_bytes = vec![0u8; name_len];
        reader.read_exact(&mut name_bytes)?;
        let name = String::from_utf8(name_bytes)
            .map_err(|_| TempdistError::InvalidCheckpoint("non-UTF-8 parameter name".into()))?;

        let rank = read_u32(reader)? as usize;
        if rank > 8 {
            return Err(TempdistError::InvalidCheckpoint(format!(
                "implausible rank {rank} for {name}"
            )));
        }
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            let mut dim_bytes = [0u8; 8];
            reader.read_exact(&mut dim_bytes)?;
            shape.push(u64::from_le_bytes(dim_bytes) as usize);
        }

        let num_elements: usize = shape.iter().product();
        let mut values = Vec::with_capacity(num_elements);
        for _ in 0..num_elements {
            let mut value_bytes = [0u8; 4];
            reader.read_exact(&mut value_bytes)?;
            values.push(f32::from_le_bytes(value_bytes));
        }

        state.insert(name, RawTensor { shape, values });
    }
    Ok(state)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> StateDict {
        let mut state = StateDict::new();
        state.insert(
            "encoder.conv0.weight".to_string(),
            RawTensor {
                shape: vec![2, 3],
                values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            },
        );
        state.insert(
            "head.weight".to_string(),
            RawTensor {
                shape: vec![3, 1],
                values: vec![-1.0, 0.5, 0.25],
            },
        );
        state
    }

    fn sample_checkpoint(epoch: usize) -> Checkpoint {
        Checkpoint {
            epoch,
            global_step: epoch * 10,
            model_state: sample_state(),
            optimizer_state: None,
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        let mut tensors = StateDict::new();
        tensors.insert(
            "exp_avg/head.weight".to_string(),
            RawTensor {
                shape: vec![3],
                values: vec![0.1, 0.2, 0.3],
            },
        );
        let checkpoint = Checkpoint {
            epoch: 7,
            global_step: 420,
            model_state: sample_state(),
            optimizer_state: Some(OptimizerState { step: 420, tensors }),
        };

        let path = store.save(&checkpoint).unwrap();
        assert!(path.ends_with("checkpoint_7"));

        let loaded = store.load(&ResumeSelector::Epoch(7)).unwrap();
        assert_eq!(loaded.epoch, 7);
        assert_eq!(loaded.global_step, 420);
        assert_eq!(loaded.model_state, checkpoint.model_state);
        let optimizer = loaded.optimizer_state.unwrap();
        assert_eq!(optimizer.step, 420);
        assert_eq!(optimizer.tensors.len(), 1);
    }

    #[test]
    fn test_no_staging_directory_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());
        store.save(&sample_checkpoint(3)).unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["checkpoint_3"]);
    }

    #[test]
    fn test_save_overwrites_same_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        store.save(&sample_checkpoint(2)).unwrap();
        let mut second = sample_checkpoint(2);
        second.global_step = 999;
        store.save(&second).unwrap();

        let loaded = store.load(&ResumeSelector::Epoch(2)).unwrap();
        assert_eq!(loaded.global_step, 999);
    }

    #[test]
    fn test_latest_selects_highest_epoch() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        for epoch in [5, 15, 3] {
            store.save(&sample_checkpoint(epoch)).unwrap();
        }
        // A stray directory that is not a valid checkpoint must be skipped.
        fs::create_dir(temp_dir.path().join("checkpoint_99")).unwrap();

        let path = store.resolve(&ResumeSelector::Latest).unwrap();
        assert!(path.ends_with("checkpoint_15"));
    }

    #[test]
    fn test_epochs_lists_valid_checkpoints_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        assert!(store.epochs().is_empty());

        for epoch in [9, 2, 5] {
            store.save(&sample_checkpoint(epoch)).unwrap();
        }
        fs::create_dir(temp_dir.path().join("checkpoint_50")).unwrap();

        assert_eq!(store.epochs(), vec![2, 5, 9]);
    }

    #[test]
    fn test_missing_checkpoint_errors() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());

        assert!(matches!(
            store.load(&ResumeSelector::Latest),
            Err(TempdistError::CheckpointNotFound { .. })
        ));
        assert!(matches!(
            store.load(&ResumeSelector::Epoch(4)),
            Err(TempdistError::CheckpointNotFound { .. })
        ));
        assert!(matches!(
            store.load(&ResumeSelector::Path(temp_dir.path().join("nope"))),
            Err(TempdistError::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_load_by_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());
        let path = store.save(&sample_checkpoint(1)).unwrap();

        let other_store = CheckpointStore::new(temp_dir.path().join("elsewhere"));
        let loaded = other_store.load(&ResumeSelector::Path(path)).unwrap();
        assert_eq!(loaded.epoch, 1);
    }

    #[test]
    fn test_scoped_load_strips_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());
        store.save(&sample_checkpoint(1)).unwrap();

        let scoped = store
            .load_scoped(&ResumeSelector::Epoch(1), "encoder")
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert!(scoped.contains_key("conv0.weight"));

        assert!(matches!(
            store.load_scoped(&ResumeSelector::Epoch(1), "decoder"),
            Err(TempdistError::EmptyScope { .. })
        ));
    }

    #[test]
    fn test_corrupt_model_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(temp_dir.path());
        let path = store.save(&sample_checkpoint(1)).unwrap();

        // Truncate the weights file.
        fs::write(path.join("model.bin"), [1u8, 0, 0, 0]).unwrap();
        assert!(store.load(&ResumeSelector::Epoch(1)).is_err());
    }
}
