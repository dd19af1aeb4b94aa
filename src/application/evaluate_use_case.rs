// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Rebuilds a trained run from its checkpoint directory and
// writes the bias / agreement report:
//
//   1. Read train_config.json and model_config.json
//   2. Reload the corpus with the same split (fixed seed)
//   3. Check the annotator order still matches the heads
//   4. Restore the weights
//   5. Evaluate and write the report

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    default_device,
    evaluator::{evaluate, EvaluationReport},
    model::BiasCorrectionModel,
    InferBackend,
};

pub struct EvaluateUseCase {
    checkpoint_dir: String,
    /// Weights to evaluate; defaults to the run's final model
    model_path: Option<PathBuf>,
    output: PathBuf,
    label_names: Option<Vec<String>>,
}

impl EvaluateUseCase {
    pub fn new(checkpoint_dir: String, output: PathBuf) -> Self {
        Self { checkpoint_dir, model_path: None, output, label_names: None }
    }

    pub fn with_model_path(mut self, path: Option<PathBuf>) -> Self {
        self.model_path = path;
        self
    }

    pub fn with_label_names(mut self, names: Option<Vec<String>>) -> Self {
        self.label_names = names;
        self
    }

    pub fn execute(&self) -> Result<EvaluationReport> {
        let manager = CheckpointManager::new(&self.checkpoint_dir)?;
        let cfg = manager.load_config()?;
        let arch = manager.load_architecture()?;

        let mut dataset = cfg.load_dataset()?;
        if dataset.annotators().ids() != arch.annotators.as_slice() {
            bail!(
                "corpus '{}' no longer matches the trained annotators {:?}",
                cfg.corpus,
                arch.annotators
            );
        }
        if let Some(names) = &self.label_names {
            if names.len() != arch.model.label_dim {
                bail!("{} label names given for {} classes", names.len(), arch.model.label_dim);
            }
        }

        let device = default_device();
        let model: BiasCorrectionModel<InferBackend> = arch.model.init(&device);
        let model =
            manager.load_model::<InferBackend, _>(model, self.model_path.as_deref(), &device)?;

        let report = evaluate(&model, &mut dataset, self.label_names.clone(), &device)?;
        report.write_to(&self.output)?;
        Ok(report)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{tests::small_config, TrainUseCase};

    #[test]
    fn test_evaluate_after_train() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(dir.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let output = dir.path().join("report.txt");
        let names = Some(vec!["neg".into(), "neu".into(), "pos".into()]);
        let report = EvaluateUseCase::new(cfg.checkpoint_dir.clone(), output.clone())
            .with_label_names(names)
            .execute()
            .unwrap();

        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].annotator.as_str(), "w2");
        let text = std::fs::read_to_string(output).unwrap();
        assert!(text.contains("Annotator w1"));
        assert!(text.contains("neu"));
    }

    #[test]
    fn test_wrong_label_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = small_config(dir.path());
        TrainUseCase::new(cfg.clone()).execute().unwrap();

        let err = EvaluateUseCase::new(cfg.checkpoint_dir, dir.path().join("r.txt"))
            .with_label_names(Some(vec!["only".into()]))
            .execute();
        assert!(err.is_err());
    }

    #[test]
    fn test_missing_run_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("nothing").to_string_lossy().into_owned();
        assert!(EvaluateUseCase::new(ckpt, dir.path().join("r.txt")).execute().is_err());
    }
}
