// ============================================================
// Layer 6 — Checkpoints
// ============================================================
// Two pieces live here:
//
//   CheckpointManager   everything a run leaves in its
//                       checkpoint directory
//   CheckpointPolicy    decides at which epochs the model is
//                       saved during training, and where
//
// Directory layout written by a `train` run:
//
//   checkpoints/
//     train_config.json    every hyperparameter and path
//     model_config.json    architecture + ordered annotator ids
//     model.mpk            weights after the last epoch
//     backbone.mpk         backbone alone, same epoch
//     metrics.csv          one row per training phase
//
// Policy checkpoints go to their own head directory and carry
// the run identity in the file name:
//
//   <head>/<stem>_<timestamp>_<hyperparams>[_f1-<f1>]_epoch<N>.mpk
//
// Names like `lr0.001_bs32` contain dots, so records are
// serialised with the named-MessagePack bytes recorder and
// written to the exact path. File recorders would treat
// everything after the last dot as an extension to replace.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::annotation::AnnotatorId;
use crate::ml::model::{BasicNetwork, BiasCorrectionConfig};

type BytesRecorder = NamedMpkBytesRecorder<FullPrecisionSettings>;

// ─── Record I/O ───────────────────────────────────────────────────────────────

/// Serialise the record of `module` to exactly `path`.
pub fn save_record<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create directory '{}'", parent.display()))?;
    }
    let recorder = BytesRecorder::default();
    let bytes = Recorder::<B>::record(&recorder, module.clone().into_record(), ())
        .with_context(|| format!("Failed to serialise record for '{}'", path.display()))?;
    fs::write(path, bytes).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Saved record to '{}'", path.display());
    Ok(())
}

/// Load the record at `path` into `module`.
/// Fails if the stored architecture does not match.
pub fn load_record<B: Backend, M: Module<B>>(module: M, path: &Path, device: &B::Device) -> Result<M> {
    let bytes = fs::read(path).with_context(|| format!("Cannot read '{}'", path.display()))?;
    let recorder = BytesRecorder::default();
    let record = Recorder::<B>::load(&recorder, bytes, device)
        .with_context(|| format!("'{}' does not match the model architecture", path.display()))?;
    Ok(module.load_record(record))
}

// ─── Architecture ─────────────────────────────────────────────────────────────
/// What `evaluate` needs to rebuild the trained model: the layer sizes
/// and which annotator each bias head belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Architecture {
    pub model: BiasCorrectionConfig,
    pub annotators: Vec<AnnotatorId>,
}

// ─── CheckpointManager ────────────────────────────────────────────────────────
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the weights of the last epoch are stored.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join("model.mpk")
    }

    /// Where the backbone of the last epoch is stored, for use as a
    /// pseudo-label model or `pretrained_basic` of a later run.
    pub fn backbone_path(&self) -> PathBuf {
        self.dir.join("backbone.mpk")
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json("train_config.json", cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json("train_config.json")
            .context("Make sure you have run 'train' before 'evaluate'")
    }

    pub fn save_architecture(&self, arch: &Architecture) -> Result<()> {
        self.write_json("model_config.json", arch)
    }

    pub fn load_architecture(&self) -> Result<Architecture> {
        self.read_json("model_config.json")
    }

    pub fn save_model<B: Backend, M: Module<B>>(&self, model: &M) -> Result<PathBuf> {
        let path = self.model_path();
        save_record::<B, M>(model, &path)?;
        tracing::info!("Model saved to '{}'", path.display());
        Ok(path)
    }

    /// Restore weights from `path`, or from the run's own model file.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model: M,
        path: Option<&Path>,
        device: &B::Device,
    ) -> Result<M> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| self.model_path());
        tracing::info!("Loading weights from '{}'", path.display());
        load_record::<B, M>(model, &path, device)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json =
            fs::read_to_string(&path).with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}

/// Load only the backbone weights, e.g. from a basic-only run.
pub fn load_backbone<B: Backend>(
    basic: BasicNetwork<B>,
    path: &Path,
    device: &B::Device,
) -> Result<BasicNetwork<B>> {
    load_record::<B, _>(basic, path, device).context("Cannot load pretrained backbone")
}

// ─── Checkpoint paths ─────────────────────────────────────────────────────────

/// `<head>/<stem>_<timestamp>_<hyperparams>[_f1-<f1>]_epoch<epoch>.mpk`
pub fn build_model_path(
    head: &Path,
    stem: &str,
    timestamp: &str,
    hyperparams: &str,
    f1: Option<f64>,
    epoch: usize,
) -> PathBuf {
    let mut name = format!("{stem}_{timestamp}_{hyperparams}");
    if let Some(f1) = f1 {
        name.push_str(&format!("_f1-{f1:.4}"));
    }
    name.push_str(&format!("_epoch{epoch}.mpk"));
    head.join(name)
}

/// Local wall-clock time, formatted for file names.
pub fn run_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Identity of a run inside checkpoint file names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointTarget {
    pub head: PathBuf,
    pub stem: String,
    pub timestamp: String,
    pub hyperparams: String,
}

// ─── CheckpointPolicy ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default)]
pub struct CheckpointPolicy {
    save_at: BTreeSet<usize>,
    target: Option<CheckpointTarget>,
    include_f1: bool,
}

impl CheckpointPolicy {
    pub fn new(save_at: impl IntoIterator<Item = usize>, target: Option<CheckpointTarget>) -> Self {
        Self { save_at: save_at.into_iter().collect(), target, include_f1: false }
    }

    /// A policy that never saves.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_f1_in_name(mut self, include_f1: bool) -> Self {
        self.include_f1 = include_f1;
        self
    }

    /// Path for `epoch`, or `None` when nothing should be written.
    pub fn path_for(&self, epoch: usize, f1: Option<f64>) -> Option<PathBuf> {
        if !self.save_at.contains(&epoch) {
            return None;
        }
        let t = self.target.as_ref()?;
        let f1 = if self.include_f1 { f1 } else { None };
        Some(build_model_path(&t.head, &t.stem, &t.timestamp, &t.hyperparams, f1, epoch))
    }

    /// Consulted once per epoch. Returns the written path, if any.
    pub fn maybe_save<B: Backend, M: Module<B>>(
        &self,
        model: &M,
        epoch: usize,
        f1: Option<f64>,
    ) -> Result<Option<PathBuf>> {
        let Some(path) = self.path_for(epoch, f1) else {
            return Ok(None);
        };
        tracing::info!("Saving model at: '{}'", path.display());
        save_record::<B, M>(model, &path)?;
        Ok(Some(path))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::BiasCorrectionModel;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn target(head: &Path) -> CheckpointTarget {
        CheckpointTarget {
            head: head.to_path_buf(),
            stem: "emotion".into(),
            timestamp: "2024-01-01_00-00-00".into(),
            hyperparams: "lr0.001_bs32".into(),
        }
    }

    #[test]
    fn test_build_model_path_layout() {
        let p = build_model_path(Path::new("runs"), "emotion", "t0", "lr0.001", None, 3);
        assert_eq!(p, PathBuf::from("runs/emotion_t0_lr0.001_epoch3.mpk"));

        let p = build_model_path(Path::new("runs"), "emotion", "t0", "lr0.001", Some(0.5), 0);
        assert_eq!(p, PathBuf::from("runs/emotion_t0_lr0.001_f1-0.5000_epoch0.mpk"));
    }

    #[test]
    fn test_policy_only_saves_listed_epochs() {
        let policy = CheckpointPolicy::new([1, 4], Some(target(Path::new("h"))));
        assert!(policy.path_for(0, None).is_none());
        assert!(policy.path_for(1, None).is_some());
        assert_ne!(policy.path_for(1, None), policy.path_for(4, None));
    }

    #[test]
    fn test_policy_without_target_is_noop() {
        let policy = CheckpointPolicy::new([0], None);
        assert!(policy.path_for(0, None).is_none());
        assert!(CheckpointPolicy::disabled().path_for(0, None).is_none());
    }

    #[test]
    fn test_f1_only_named_when_enabled() {
        let policy = CheckpointPolicy::new([2], Some(target(Path::new("h"))));
        let plain = policy.path_for(2, Some(0.8)).unwrap();
        assert!(!plain.to_string_lossy().contains("f1-"));
        let named = policy.with_f1_in_name(true).path_for(2, Some(0.8)).unwrap();
        assert!(named.to_string_lossy().contains("_f1-0.8000_epoch2"));
    }

    #[test]
    fn test_save_and_load_round_trip_keeps_dotted_name() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let model: BiasCorrectionModel<TestBackend> =
            BiasCorrectionConfig::new(3, 2, 2).init(&device);

        let policy = CheckpointPolicy::new([0], Some(target(dir.path())));
        let path = policy.maybe_save::<TestBackend, _>(&model, 0, None).unwrap().unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with("lr0.001_bs32_epoch0.mpk"));

        let fresh: BiasCorrectionModel<TestBackend> =
            BiasCorrectionConfig::new(3, 2, 2).init(&device);
        let loaded = load_record::<TestBackend, _>(fresh, &path, &device).unwrap();
        let a: Vec<f32> = model.basic.linear.weight.val().into_data().iter::<f32>().collect();
        let b: Vec<f32> = loaded.basic.linear.weight.val().into_data().iter::<f32>().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_manager_round_trips_architecture() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let arch = Architecture {
            model: BiasCorrectionConfig::new(8, 3, 2),
            annotators: vec![AnnotatorId::from("a"), AnnotatorId::from("b")],
        };
        manager.save_architecture(&arch).unwrap();
        let back = manager.load_architecture().unwrap();
        assert_eq!(back.annotators, arch.annotators);
        assert_eq!(back.model.annotator_dim, 2);
        assert!(manager.load_config().is_err());
    }
}
