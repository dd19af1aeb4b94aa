// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives the epoch / annotator loop.
//
//   for epoch in 0..epochs
//     for each annotator slot
//       filter to the slot's annotator, partition = train
//         per batch: forward → loss (+ pseudo losses) →
//                    backward → step of the slot's optimizer
//       partition = validation (train subset if empty)
//         per batch: forward on model.valid(), no update
//     consult the CheckpointPolicy
//
// Slots per mode:
//
//   MultiAnnotator    one slot per annotator, head i, its own
//                     AdamW over {backbone, head i} ({head i}
//                     when the backbone is frozen)
//   SingleAnnotator   one slot, latent output, AdamW over all
//   BasicOnly         one slot, no filter, latent output
//
// Each optimizer only ever sees gradients for its own scope:
// out-of-scope gradients are removed before `step`, so its
// Adam moments never move the other parameters.
//
// Key Burn insight:
//   - model.valid() returns the model on the inner backend
//   - validation batches must be built on that backend too
//   - argmax(1) returns [batch, 1]; flatten before comparing
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{Context, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{AnnotationBatch, AnnotationBatcher},
    dataset::{AnnotatedDataset, AnnotationView},
};
use crate::domain::{annotation::{AnnotatorId, AnnotatorIndex}, partition::Partition};
use crate::infra::{
    checkpoint::CheckpointPolicy,
    metrics::{MetricsLogger, PhaseRecord, RunningMetrics},
    scores::{score_batch, Averaging},
};
use crate::ml::model::{BiasCorrectionModel, ParamScope};

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingMode {
    MultiAnnotator { freeze_backbone: bool },
    SingleAnnotator(AnnotatorId),
    BasicOnly,
}

#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub averaging: Averaging,
    pub zero_division: f64,
    pub mode: TrainingMode,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            lr: 1e-3,
            averaging: Averaging::Macro,
            zero_division: 0.0,
            mode: TrainingMode::MultiAnnotator { freeze_backbone: false },
        }
    }
}

// ─── Loss history ─────────────────────────────────────────────────────────────
/// Every primary batch loss of a run, train and validation, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossHistory(Vec<f64>);

impl LossHistory {
    pub fn push(&mut self, loss: f64) {
        self.0.push(loss);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_sum(&self, n: usize) -> f64 {
        self.0.iter().take(n).sum()
    }

    pub fn last_sum(&self, n: usize) -> f64 {
        self.0.iter().rev().take(n).sum()
    }
}

/// Result of `fit`.
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: BiasCorrectionModel<B>,
    /// F1 of the last validation phase
    pub f1: Option<f64>,
    pub loss_history: LossHistory,
    pub phases: Vec<PhaseRecord>,
    /// Per-epoch checkpoint files written by the policy
    pub checkpoints: Vec<std::path::PathBuf>,
}

// ─── Slots ────────────────────────────────────────────────────────────────────

struct Slot {
    /// Annotator filter; `None` shows every annotator
    annotator: Option<AnnotatorId>,
    /// Head whose output is scored; `None` uses the latent estimate
    head: Option<usize>,
    optimizer: usize,
    scope: ParamScope,
}

impl Slot {
    fn label(&self) -> String {
        self.annotator.as_ref().map_or_else(|| "all".to_string(), |a| a.to_string())
    }
}

fn plan_slots(mode: &TrainingMode, annotators: &AnnotatorIndex) -> Result<Vec<Slot>> {
    let slots = match mode {
        TrainingMode::MultiAnnotator { freeze_backbone } => annotators
            .ids()
            .iter()
            .enumerate()
            .map(|(i, id)| Slot {
                annotator: Some(id.clone()),
                head: Some(i),
                optimizer: i,
                scope: if *freeze_backbone {
                    ParamScope::Head(i)
                } else {
                    ParamScope::BackboneAndHead(i)
                },
            })
            .collect(),
        TrainingMode::SingleAnnotator(id) => {
            annotators
                .index_of(id)
                .with_context(|| format!("Single-annotator training for '{id}'"))?;
            vec![Slot { annotator: Some(id.clone()), head: None, optimizer: 0, scope: ParamScope::All }]
        }
        TrainingMode::BasicOnly => {
            vec![Slot { annotator: None, head: None, optimizer: 0, scope: ParamScope::All }]
        }
    };
    Ok(slots)
}

fn adamw<B: AutodiffBackend>() -> impl Optimizer<BiasCorrectionModel<B>, B> {
    AdamWConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .with_weight_decay(0.01)
        .init::<B, BiasCorrectionModel<B>>()
}

/// Predicted class per row.
fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Vec<i64> {
    logits.argmax(1).flatten::<1>(0, 1).into_data().iter::<i64>().collect()
}

fn int_values<B: Backend>(t: Tensor<B, 1, Int>) -> Vec<i64> {
    t.into_data().iter::<i64>().collect()
}

// ─── TrainingOrchestrator ─────────────────────────────────────────────────────
pub struct TrainingOrchestrator {
    settings: TrainSettings,
    policy: CheckpointPolicy,
    logger: Option<MetricsLogger>,
}

impl TrainingOrchestrator {
    pub fn new(settings: TrainSettings, policy: CheckpointPolicy) -> Self {
        Self { settings, policy, logger: None }
    }

    pub fn with_logger(mut self, logger: MetricsLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn fit<B: AutodiffBackend>(
        &self,
        mut model: BiasCorrectionModel<B>,
        dataset: &mut AnnotatedDataset,
        device: &B::Device,
    ) -> Result<TrainingOutcome<B>> {
        let s = &self.settings;
        let annotators = dataset.annotators().clone();
        if model.num_heads() != annotators.len() {
            anyhow::bail!(
                "model has {} bias heads but the corpus has {} annotators",
                model.num_heads(),
                annotators.len()
            );
        }
        let slots = plan_slots(&s.mode, &annotators)?;
        let mut optimizers: Vec<_> = (0..slots.len()).map(|_| adamw::<B>()).collect();

        let mut history = LossHistory::default();
        let mut phases = Vec::new();
        let mut checkpoints = Vec::new();
        let mut f1 = None;

        tracing::info!(
            "Training {} epoch(s) over {} slot(s): lr={} batch_size={}",
            s.epochs,
            slots.len(),
            s.lr,
            s.batch_size,
        );

        for epoch in 0..s.epochs {
            for slot in &slots {
                // ── Training phase ───────────────────────────────────────────
                match &slot.annotator {
                    Some(id) => {
                        dataset
                            .set_annotator_filter(id)
                            .with_context(|| format!("Filtering to annotator '{id}'"))?;
                    }
                    None => {
                        dataset.clear_annotator_filter();
                    }
                }
                dataset.set_partition(Partition::Train);
                let train_view = dataset.current_view();

                let optimizer = &mut optimizers[slot.optimizer];
                let (trained, metrics) =
                    self.train_phase(model, train_view, slot, &annotators, optimizer, &mut history, device)?;
                model = trained;
                phases.push(self.finish_phase(epoch, slot, "train", &metrics)?);

                // ── Validation phase ─────────────────────────────────────────
                let filter = dataset.set_partition(Partition::Validation);
                let mut val_view = dataset.current_view();
                if val_view.is_empty() {
                    tracing::warn!(
                        "No validation data for '{}', evaluating on its train subset",
                        slot.label()
                    );
                    val_view = dataset.select(&filter.with_partition(Partition::Train));
                }
                let metrics =
                    self.validation_phase::<B>(&model.valid(), val_view, slot, &mut history, device);
                f1 = Some(metrics.snapshot().f1);
                phases.push(self.finish_phase(epoch, slot, "validation", &metrics)?);
            }

            if let Some(path) = self.policy.maybe_save::<B, _>(&model, epoch, f1)? {
                checkpoints.push(path);
            }
        }

        tracing::info!("Finished training");
        tracing::info!("Sum of first 10 losses: {:.4}", history.first_sum(10));
        tracing::info!("Sum of last  10 losses: {:.4}", history.last_sum(10));

        Ok(TrainingOutcome { model, f1, loss_history: history, phases, checkpoints })
    }

    #[allow(clippy::too_many_arguments)]
    fn train_phase<B: AutodiffBackend, O: Optimizer<BiasCorrectionModel<B>, B>>(
        &self,
        mut model: BiasCorrectionModel<B>,
        view: AnnotationView,
        slot: &Slot,
        annotators: &AnnotatorIndex,
        optimizer: &mut O,
        history: &mut LossHistory,
        device: &B::Device,
    ) -> Result<(BiasCorrectionModel<B>, RunningMetrics)> {
        let s = &self.settings;
        let loader = DataLoaderBuilder::new(AnnotationBatcher::<B>::new(device.clone()))
            .batch_size(s.batch_size)
            .build(view);
        let ce = CrossEntropyLossConfig::new().init(device);
        let mut metrics = RunningMetrics::new();

        for (step, batch) in loader.iter().enumerate() {
            let AnnotationBatch { embeddings, labels, pseudo_targets } = batch;
            let n = labels.dims()[0];
            let output = model.forward(embeddings);
            let logits = output.select(slot.head);
            let primary = ce.forward(logits.clone(), labels.clone());

            // Pseudo-label losses only apply when training a bias head
            let mut loss = primary.clone();
            if slot.head.is_some() {
                for (pseudo, targets) in pseudo_targets {
                    let j = annotators
                        .index_of(&pseudo)
                        .with_context(|| format!("Pseudo-labels for '{pseudo}'"))?;
                    loss = loss + ce.forward(output.heads[j].clone(), targets);
                }
            }

            let primary_value = primary.into_scalar().elem::<f64>();
            history.push(primary_value);
            let scores = score_batch(
                &predictions(logits.detach()),
                &int_values(labels),
                s.averaging,
                s.zero_division,
            );
            metrics.update(primary_value, &scores, n);

            let mut grads = GradientsParams::from_grads(loss.backward(), &model);
            model.restrict_grads(&mut grads, slot.scope);
            model = optimizer.step(s.lr, model, grads);

            tracing::debug!("{} train step {} loss={:.4}", slot.label(), step + 1, primary_value);
        }

        Ok((model, metrics))
    }

    fn validation_phase<B: AutodiffBackend>(
        &self,
        model: &BiasCorrectionModel<B::InnerBackend>,
        view: AnnotationView,
        slot: &Slot,
        history: &mut LossHistory,
        device: &B::Device,
    ) -> RunningMetrics {
        let s = &self.settings;
        let loader = DataLoaderBuilder::new(AnnotationBatcher::<B::InnerBackend>::new(device.clone()))
            .batch_size(s.batch_size)
            .build(view);
        let ce = CrossEntropyLossConfig::new().init(device);
        let mut metrics = RunningMetrics::new();

        for batch in loader.iter() {
            let n = batch.size();
            let logits = model.forward(batch.embeddings).select(slot.head);
            let loss = ce
                .forward(logits.clone(), batch.labels.clone())
                .into_scalar()
                .elem::<f64>();
            history.push(loss);
            let scores =
                score_batch(&predictions(logits), &int_values(batch.labels), s.averaging, s.zero_division);
            metrics.update(loss, &scores, n);
        }

        metrics
    }

    fn finish_phase(&self, epoch: usize, slot: &Slot, mode: &str, metrics: &RunningMetrics) -> Result<PhaseRecord> {
        let record = PhaseRecord {
            epoch,
            annotator: slot.label(),
            mode: mode.to_string(),
            metrics: metrics.snapshot(),
        };
        tracing::info!("Annotator {} - Epoch {} [{}] {}", record.annotator, epoch, mode, record.metrics);
        if let Some(logger) = &self.logger {
            logger.log(&record)?;
        }
        Ok(record)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{annotation::DataPoint, partition::FilterState};
    use crate::infra::checkpoint::CheckpointTarget;
    use crate::ml::model::BiasCorrectionConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn point(i: usize, annotator: &str) -> DataPoint {
        let x = i as f32 / 10.0;
        DataPoint::new(vec![x, 1.0 - x], i % 2, annotator)
    }

    fn settings(epochs: usize, batch_size: usize, mode: TrainingMode) -> TrainSettings {
        TrainSettings { epochs, batch_size, lr: 1e-2, mode, ..Default::default() }
    }

    fn model(annotators: usize) -> BiasCorrectionModel<TestBackend> {
        BiasCorrectionConfig::new(2, 2, annotators).init(&Default::default())
    }

    fn weights(linear: &burn::nn::Linear<TestBackend>) -> Vec<f32> {
        linear.weight.val().into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_loss_history_sums() {
        let mut h = LossHistory::default();
        (1..=25).for_each(|v| h.push(v as f64));
        assert_eq!(h.first_sum(10), 55.0);
        assert_eq!(h.last_sum(10), (16..=25).sum::<i32>() as f64);
        assert_eq!(h.len(), 25);
    }

    #[test]
    fn test_one_step_per_batch_and_fallback_validation() {
        // ratio 1.0 puts eof_train == eof_val: validation is always empty
        let mut points: Vec<DataPoint> = (0..10).map(|i| point(i, "a")).collect();
        points.extend((0..10).map(|i| point(i, "b")));
        let mut ds = AnnotatedDataset::new(points, 1.0).unwrap();
        assert_eq!(ds.partition_len(Partition::Validation), 0);

        let orchestrator = TrainingOrchestrator::new(
            settings(1, 3, TrainingMode::MultiAnnotator { freeze_backbone: false }),
            CheckpointPolicy::disabled(),
        );
        let outcome = orchestrator.fit(model(2), &mut ds, &Default::default()).unwrap();

        // two annotators × (train + validation)
        assert_eq!(outcome.phases.len(), 4);
        for pair in outcome.phases.chunks(2) {
            assert_eq!(pair[0].mode, "train");
            assert_eq!(pair[1].mode, "validation");
            assert!(pair[0].metrics.samples > 0);
            assert_eq!(pair[1].metrics.samples, pair[0].metrics.samples);
        }
        let batches: usize = outcome
            .phases
            .iter()
            .map(|p| p.metrics.samples.div_ceil(3))
            .sum();
        assert_eq!(outcome.loss_history.len(), batches);
        assert!(outcome.f1.is_some());
    }

    #[test]
    fn test_fallback_only_for_annotator_without_validation_points() {
        // Under PARTITION_SEED, corpus positions 1, 3, 8 and 11 are the
        // whole validation partition; only "b" owns any of them.
        let owner = |i: usize| if [1, 2, 3, 4, 8, 11].contains(&i) { "b" } else { "a" };
        let points: Vec<DataPoint> = (0..20).map(|i| point(i, owner(i))).collect();
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
        assert_eq!(ds.partition_len(Partition::Validation), 4);
        assert!(ds.points(Partition::Validation).iter().all(|p| p.annotator.as_str() == "b"));

        let count = |ds: &AnnotatedDataset, partition: Partition, id: &str| {
            ds.select(&FilterState::default().with_partition(partition).with_annotator(AnnotatorId::from(id)))
                .items()
                .len()
        };
        let a_train = count(&ds, Partition::Train, "a");
        let b_train = count(&ds, Partition::Train, "b");
        assert!(a_train > 0 && b_train > 0);

        let orchestrator = TrainingOrchestrator::new(
            settings(1, 4, TrainingMode::MultiAnnotator { freeze_backbone: false }),
            CheckpointPolicy::disabled(),
        );
        let outcome = orchestrator.fit(model(2), &mut ds, &Default::default()).unwrap();

        let phase = |annotator: &str, mode: &str| {
            outcome
                .phases
                .iter()
                .find(|p| p.annotator == annotator && p.mode == mode)
                .unwrap()
                .metrics
                .samples
        };
        // "a" is scored on exactly its train items
        assert_eq!(phase("a", "train"), a_train);
        assert_eq!(phase("a", "validation"), a_train);
        // "b" keeps its real validation points
        assert_eq!(phase("b", "train"), b_train);
        assert_eq!(phase("b", "validation"), 4);
        assert_ne!(phase("b", "validation"), b_train);
    }

    #[test]
    fn test_pseudo_losses_join_the_backward_pass() {
        let device = Default::default();
        let a = AnnotatorId::from("a");
        let b = AnnotatorId::from("b");

        // "a"'s train subset, with or without "b" pseudo-labels that
        // contradict "a"
        let dataset = |with_pseudo: bool| {
            let mut points: Vec<DataPoint> = (0..20)
                .map(|i| {
                    let mut p = point(i, "a");
                    if with_pseudo {
                        assert!(p.add_pseudo_label(&b, 1 - i % 2));
                    }
                    p
                })
                .collect();
            points.extend((0..10).map(|i| point(i, "b")));
            let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
            ds.set_annotator_filter(&a).unwrap();
            ds.set_partition(Partition::Train);
            ds
        };

        let start = model(2);
        let orchestrator = TrainingOrchestrator::new(
            settings(1, 4, TrainingMode::MultiAnnotator { freeze_backbone: false }),
            CheckpointPolicy::disabled(),
        );
        let slot = Slot {
            annotator: Some(a.clone()),
            head: Some(0),
            optimizer: 0,
            scope: ParamScope::BackboneAndHead(0),
        };
        let run = |with_pseudo: bool| {
            let ds = dataset(with_pseudo);
            let mut optimizer = adamw::<TestBackend>();
            let mut history = LossHistory::default();
            let (trained, metrics) = orchestrator
                .train_phase(
                    start.clone(),
                    ds.current_view(),
                    &slot,
                    ds.annotators(),
                    &mut optimizer,
                    &mut history,
                    &device,
                )
                .unwrap();
            // one primary loss per batch, pseudo terms never recorded
            assert_eq!(history.len(), metrics.samples().div_ceil(4));
            trained
        };

        let plain = run(false);
        let with_pseudo = run(true);

        assert_ne!(weights(&with_pseudo.basic.linear), weights(&plain.basic.linear));
        // "b"'s head gets gradient from the pseudo loss but is outside the slot scope
        let head_b = weights(&start.bias_matrices[1]);
        assert_eq!(weights(&with_pseudo.bias_matrices[1]), head_b);
        assert_eq!(weights(&plain.bias_matrices[1]), head_b);
    }

    #[test]
    fn test_head_count_must_match_annotators() {
        let mut points: Vec<DataPoint> = (0..10).map(|i| point(i, "a")).collect();
        points.extend((0..10).map(|i| point(i, "b")));
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
        let orchestrator = TrainingOrchestrator::new(
            settings(1, 4, TrainingMode::MultiAnnotator { freeze_backbone: false }),
            CheckpointPolicy::disabled(),
        );
        let err = orchestrator.fit(model(1), &mut ds, &Default::default()).err().unwrap();
        assert!(err.to_string().contains("1 bias heads"));
    }

    #[test]
    fn test_checkpoint_written_only_at_listed_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let points: Vec<DataPoint> = (0..20).map(|i| point(i, "a")).collect();
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();

        let target = CheckpointTarget {
            head: dir.path().to_path_buf(),
            stem: "run".into(),
            timestamp: "t".into(),
            hyperparams: "lr0.01".into(),
        };
        let orchestrator = TrainingOrchestrator::new(
            settings(2, 4, TrainingMode::BasicOnly),
            CheckpointPolicy::new([1], Some(target)),
        );
        let outcome = orchestrator.fit(model(1), &mut ds, &Default::default()).unwrap();

        assert_eq!(outcome.checkpoints.len(), 1);
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(outcome.checkpoints[0].to_string_lossy().contains("epoch1"));
    }

    #[test]
    fn test_frozen_backbone_is_unchanged() {
        let points: Vec<DataPoint> = (0..20).map(|i| point(i, "a")).collect();
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
        let start = model(1);
        let backbone_before = weights(&start.basic.linear);
        let head_before = weights(&start.bias_matrices[0]);

        let orchestrator = TrainingOrchestrator::new(
            settings(2, 4, TrainingMode::MultiAnnotator { freeze_backbone: true }),
            CheckpointPolicy::disabled(),
        );
        let outcome = orchestrator.fit(start, &mut ds, &Default::default()).unwrap();

        assert_eq!(weights(&outcome.model.basic.linear), backbone_before);
        assert_ne!(weights(&outcome.model.bias_matrices[0]), head_before);
    }

    #[test]
    fn test_single_annotator_trains_latent_only() {
        let mut points: Vec<DataPoint> = (0..20).map(|i| point(i, "a")).collect();
        points.extend((0..20).map(|i| point(i, "b")));
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
        let start = model(2);
        let before = [weights(&start.bias_matrices[0]), weights(&start.bias_matrices[1])];

        let orchestrator = TrainingOrchestrator::new(
            settings(1, 8, TrainingMode::SingleAnnotator(AnnotatorId::from("b"))),
            CheckpointPolicy::disabled(),
        );
        let outcome = orchestrator.fit(start, &mut ds, &Default::default()).unwrap();

        // latent output is trained, heads have no gradient path
        assert_eq!(weights(&outcome.model.bias_matrices[0]), before[0]);
        assert_eq!(weights(&outcome.model.bias_matrices[1]), before[1]);
        assert!(outcome.phases.iter().all(|p| p.annotator == "b"));
    }

    #[test]
    fn test_unknown_single_annotator_is_fatal() {
        let points: Vec<DataPoint> = (0..5).map(|i| point(i, "a")).collect();
        let mut ds = AnnotatedDataset::new(points, 0.8).unwrap();
        let orchestrator = TrainingOrchestrator::new(
            settings(1, 4, TrainingMode::SingleAnnotator(AnnotatorId::from("zz"))),
            CheckpointPolicy::disabled(),
        );
        let err = orchestrator.fit(model(1), &mut ds, &Default::default()).err().unwrap();
        assert!(format!("{err:#}").contains("zz"));
    }
}
