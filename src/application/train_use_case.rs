// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load the JSONL corpus             (Layer 4 - data)
//   Step 2: Partition + index annotators      (Layer 4 - data)
//   Step 3: Bootstrap pseudo-labels           (Layer 4 + 5)
//   Step 4: Build / restore the model         (Layer 5 - ml)
//   Step 5: Save config + architecture        (Layer 6 - infra)
//   Step 6: Run the training orchestrator     (Layer 5 - ml)
//   Step 7: Save final weights                (Layer 6 - infra)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    dataset::AnnotatedDataset,
    loader::{JsonlCorpusLoader, ScoreEncoding},
    preprocessor::TextProcessor,
    pseudo_labels::{bootstrap_all, BootstrapSummary},
};
use crate::domain::{
    annotation::AnnotatorId,
    partition::Partition,
    traits::CorpusSource,
};
use crate::infra::{
    checkpoint::{
        load_backbone, run_timestamp, save_record, Architecture, CheckpointManager,
        CheckpointPolicy, CheckpointTarget,
    },
    metrics::MetricsLogger,
    scores::Averaging,
};
use crate::ml::{
    default_device,
    inferencer::{resolve_model_path, TrainedLabeler},
    model::{BiasCorrectionConfig, BiasCorrectionModel},
    trainer::{TrainSettings, TrainingMode, TrainingOrchestrator},
    InferBackend, TrainBackend,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Every hyperparameter and path of a run. Written next to the
// checkpoints as train_config.json so `evaluate` can reload the
// same corpus with the same split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub corpus: String,
    pub checkpoint_dir: String,
    pub split_ratio: f64,
    pub num_classes: usize,
    /// Ratings in `score` fields span [-score_max, score_max]
    pub score_max: f64,
    pub text: TextProcessor,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub use_softmax: bool,
    pub averaging: Averaging,
    pub zero_division: f64,

    pub single_annotator: Option<String>,
    pub basic_only: bool,
    pub freeze_backbone: bool,

    pub pseudo_annotators: Vec<String>,
    /// Backbone file per pseudo annotator, with an `{annotator}` placeholder
    pub pseudo_model_template: Option<String>,

    /// Full model record to start from
    pub initial_weights: Option<String>,
    /// Backbone-only record to start from
    pub pretrained_basic: Option<String>,

    pub save_at: Vec<usize>,
    pub save_head: Option<String>,
    pub save_stem: String,
    pub f1_in_name: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            corpus: "data/annotations.jsonl".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            split_ratio: 0.8,
            num_classes: 3,
            score_max: 100.0,
            text: TextProcessor::default(),
            epochs: 10,
            batch_size: 64,
            lr: 1e-3,
            use_softmax: false,
            averaging: Averaging::Macro,
            zero_division: 0.0,
            single_annotator: None,
            basic_only: false,
            freeze_backbone: false,
            pseudo_annotators: Vec::new(),
            pseudo_model_template: None,
            initial_weights: None,
            pretrained_basic: None,
            save_at: Vec::new(),
            save_head: None,
            save_stem: "model".to_string(),
            f1_in_name: false,
        }
    }
}

impl TrainConfig {
    /// A named single annotator wins over `basic_only`.
    pub fn mode(&self) -> TrainingMode {
        match (&self.single_annotator, self.basic_only) {
            (Some(id), _) => TrainingMode::SingleAnnotator(AnnotatorId::new(id.as_str())),
            (None, true) => TrainingMode::BasicOnly,
            (None, false) => TrainingMode::MultiAnnotator { freeze_backbone: self.freeze_backbone },
        }
    }

    pub fn settings(&self) -> TrainSettings {
        TrainSettings {
            epochs: self.epochs,
            batch_size: self.batch_size,
            lr: self.lr,
            averaging: self.averaging,
            zero_division: self.zero_division,
            mode: self.mode(),
        }
    }

    pub fn score_encoding(&self) -> ScoreEncoding {
        ScoreEncoding { maximum_value: self.score_max, num_classes: self.num_classes }
    }

    /// Hyperparameter tag used in checkpoint file names.
    pub fn hyperparams(&self) -> String {
        format!("lr{}_bs{}_ep{}", self.lr, self.batch_size, self.epochs)
    }

    pub fn checkpoint_policy(&self, timestamp: &str) -> CheckpointPolicy {
        let target = self.save_head.as_ref().map(|head| CheckpointTarget {
            head: PathBuf::from(head),
            stem: self.save_stem.clone(),
            timestamp: timestamp.to_string(),
            hyperparams: self.hyperparams(),
        });
        CheckpointPolicy::new(self.save_at.iter().copied(), target).with_f1_in_name(self.f1_in_name)
    }

    /// Read the corpus and partition it.
    pub fn load_dataset(&self) -> Result<AnnotatedDataset> {
        let loader = JsonlCorpusLoader::new(&self.corpus, self.text.clone(), self.score_encoding());
        let points = loader.load_all()?;
        AnnotatedDataset::new(points, self.split_ratio)
            .with_context(|| format!("Cannot build dataset from '{}'", self.corpus))
    }
}

/// What a finished run reports back to the CLI.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub model_path: PathBuf,
    pub checkpoints: Vec<PathBuf>,
    pub f1: Option<f64>,
    pub first_losses: f64,
    pub last_losses: f64,
    pub bootstrap: Option<BootstrapSummary>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;
        let device = default_device();

        // ── Steps 1-2: Corpus → partitioned dataset ──────────────────────────
        let mut dataset = cfg.load_dataset()?;
        tracing::info!(
            "Split: {} train, {} validation, {} test; {} annotators",
            dataset.partition_len(Partition::Train),
            dataset.partition_len(Partition::Validation),
            dataset.partition_len(Partition::Test),
            dataset.annotators().len(),
        );

        let model_cfg = BiasCorrectionConfig::new(
            dataset.embedding_dim(),
            cfg.num_classes,
            dataset.annotators().len(),
        )
        .with_use_softmax(cfg.use_softmax);

        // ── Step 3: Pseudo-labels, before any training ───────────────────────
        let bootstrap = if cfg.pseudo_annotators.is_empty() {
            None
        } else {
            let Some(template) = &cfg.pseudo_model_template else {
                bail!("pseudo annotators were given without a pseudo model path template");
            };
            let ids: Vec<AnnotatorId> =
                cfg.pseudo_annotators.iter().map(|a| AnnotatorId::new(a.as_str())).collect();
            let backbone_cfg = model_cfg.backbone();
            let summary = bootstrap_all(&mut dataset, &ids, |ann| {
                TrainedLabeler::<InferBackend>::from_file(
                    &backbone_cfg,
                    &resolve_model_path(template, ann),
                    &device,
                )
            })?;
            Some(summary)
        };

        // ── Step 4: Model ────────────────────────────────────────────────────
        let manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        let mut model: BiasCorrectionModel<TrainBackend> = model_cfg.init(&device);
        if let Some(path) = &cfg.initial_weights {
            model = manager.load_model::<TrainBackend, _>(model, Some(PathBuf::from(path).as_path()), &device)?;
        }
        if let Some(path) = &cfg.pretrained_basic {
            model.basic = load_backbone(model.basic, &PathBuf::from(path), &device)?;
        }

        // ── Step 5: Persist what evaluate needs ──────────────────────────────
        manager.save_config(cfg)?;
        manager.save_architecture(&Architecture {
            model: model_cfg.clone(),
            annotators: dataset.annotators().ids().to_vec(),
        })?;

        // ── Step 6: Train ────────────────────────────────────────────────────
        let orchestrator = TrainingOrchestrator::new(cfg.settings(), cfg.checkpoint_policy(&run_timestamp()))
            .with_logger(MetricsLogger::new(manager.dir())?);
        let outcome = orchestrator.fit(model, &mut dataset, &device)?;

        // ── Step 7: Final weights ────────────────────────────────────────────
        let model_path = manager.save_model::<TrainBackend, _>(&outcome.model)?;
        save_record::<TrainBackend, _>(&outcome.model.basic, &manager.backbone_path())?;

        Ok(TrainSummary {
            model_path,
            checkpoints: outcome.checkpoints,
            f1: outcome.f1,
            first_losses: outcome.loss_history.first_sum(10),
            last_losses: outcome.loss_history.last_sum(10),
            bootstrap,
        })
    }
}
