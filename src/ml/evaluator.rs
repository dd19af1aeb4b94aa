// ============================================================
// Layer 5 — Evaluation Report
// ============================================================
// Explains what a trained model learned about each annotator.
//
// For every annotator the report holds:
//   - the bias matrix of its head
//       rows    = class the annotator outputs
//       columns = latent-truth class
//   - single-sample inference over the points that annotator
//     labelled in the train partition, through the backbone
//     and every head
//   - how often each head's arg-max matches the annotator's
//     own label
//   - how often the heads disagree among themselves, and at
//     which points (1-based; the text shows the first five)
//
// The rendered text has three blocks: all bias matrices, then
// agreement summaries, then the per-point listing.

use anyhow::{Context, Result};
use burn::prelude::*;
use std::{collections::BTreeSet, fmt::Write as _, fs, path::Path};

use crate::data::dataset::AnnotatedDataset;
use crate::domain::{annotation::AnnotatorId, partition::Partition};
use crate::ml::model::BiasCorrectionModel;

const SHOWN_DISAGREEMENTS: usize = 5;

/// Model outputs for one point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointPrediction {
    pub label: usize,
    pub latent: Vec<f32>,
    /// One output row per head, in annotator order
    pub heads: Vec<Vec<f32>>,
}

impl PointPrediction {
    pub fn head_classes(&self) -> Vec<usize> {
        self.heads.iter().map(|row| argmax(row)).collect()
    }

    pub fn heads_disagree(&self) -> bool {
        self.head_classes().into_iter().collect::<BTreeSet<_>>().len() > 1
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[derive(Debug, Clone)]
pub struct AnnotatorSection {
    pub annotator: AnnotatorId,
    pub bias_matrix: Vec<Vec<f32>>,
    pub points: Vec<PointPrediction>,
    /// Agreement count per head
    pub correct: Vec<usize>,
    /// 1-based indices of points where the heads disagree
    pub disagreements: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub annotators: Vec<AnnotatorId>,
    pub label_names: Option<Vec<String>>,
    pub sections: Vec<AnnotatorSection>,
}

/// Build the report. Leaves the dataset filtered to the last annotator's
/// train partition.
pub fn evaluate<B: Backend>(
    model: &BiasCorrectionModel<B>,
    dataset: &mut AnnotatedDataset,
    label_names: Option<Vec<String>>,
    device: &B::Device,
) -> Result<EvaluationReport> {
    let annotators = dataset.annotators().ids().to_vec();
    if annotators.len() != model.num_heads() {
        anyhow::bail!(
            "model has {} bias heads but the corpus has {} annotators",
            model.num_heads(),
            annotators.len()
        );
    }

    dataset.set_partition(Partition::Train);
    let mut sections = Vec::with_capacity(annotators.len());

    for (i, annotator) in annotators.iter().enumerate() {
        dataset
            .set_annotator_filter(annotator)
            .with_context(|| format!("Evaluating annotator '{annotator}'"))?;

        let mut points = Vec::with_capacity(dataset.size());
        for item in dataset.current_view().items() {
            let dim = item.embedding.len();
            let x = Tensor::<B, 1>::from_floats(item.embedding.as_slice(), device).reshape([1, dim]);
            let out = model.forward(x);
            points.push(PointPrediction {
                label: item.label as usize,
                latent: out.latent.into_data().iter::<f32>().collect(),
                heads: out.heads.into_iter().map(|h| h.into_data().iter::<f32>().collect()).collect(),
            });
        }

        let mut correct = vec![0; annotators.len()];
        let mut disagreements = Vec::new();
        for (n, p) in points.iter().enumerate() {
            for (head, class) in p.head_classes().into_iter().enumerate() {
                if class == p.label {
                    correct[head] += 1;
                }
            }
            if p.heads_disagree() {
                disagreements.push(n + 1);
            }
        }

        tracing::debug!(
            "Annotator {}: {} points, heads disagree on {}",
            annotator,
            points.len(),
            disagreements.len()
        );
        sections.push(AnnotatorSection {
            annotator: annotator.clone(),
            bias_matrix: model.bias_matrix(i),
            points,
            correct,
            disagreements,
        });
    }

    Ok(EvaluationReport { annotators, label_names, sections })
}

fn fmt_row(row: &[f32]) -> String {
    let cells: Vec<String> = row.iter().map(|v| format!("{v:.4}")).collect();
    format!("[{}]", cells.join(", "))
}

impl EvaluationReport {
    pub fn render(&self) -> String {
        let mut bias = String::from("Annotation bias matrices\n\n");
        let mut agreement = String::new();
        let mut listing = String::new();

        for s in &self.sections {
            let _ = writeln!(bias, "Annotator {}", s.annotator);
            match &self.label_names {
                Some(names) => {
                    bias.push_str("Output\\LatentTruth");
                    for name in names {
                        let _ = write!(bias, "\t{name:>10}");
                    }
                    bias.push('\n');
                    for (name, row) in names.iter().zip(&s.bias_matrix) {
                        let _ = write!(bias, "{name:<18}");
                        for v in row {
                            let _ = write!(bias, "\t{v:>10.4}");
                        }
                        bias.push('\n');
                    }
                }
                None => {
                    for row in &s.bias_matrix {
                        let _ = writeln!(bias, "{}", fmt_row(row));
                    }
                }
            }
            bias.push('\n');

            let total = s.points.len();
            let shown = &s.disagreements[..s.disagreements.len().min(SHOWN_DISAGREEMENTS)];
            let bar = "-".repeat(25);
            let _ = writeln!(agreement, "{bar}   Annotator {}   {bar}", s.annotator);
            let _ = writeln!(
                agreement,
                "Different answers given by bias matrices {} / {} times",
                s.disagreements.len(),
                total
            );
            let _ = writeln!(agreement, "Different answers at points: {shown:?}");
            let _ = writeln!(agreement, "Accuracies of samples labeled by {}:", s.annotator);
            for (ann, correct) in self.annotators.iter().zip(&s.correct) {
                let _ = write!(agreement, "Annotator {ann}: {correct} / {total}     ");
            }
            agreement.push_str("\n\n");

            for (n, p) in s.points.iter().enumerate() {
                let _ = write!(
                    listing,
                    "Point {} - Label by {}: {} - Latent truth {}",
                    n + 1,
                    s.annotator,
                    p.label,
                    fmt_row(&p.latent)
                );
                for (ann, row) in self.annotators.iter().zip(&p.heads) {
                    let _ = write!(listing, " - Annotator {ann} {}", fmt_row(row));
                }
                listing.push('\n');
            }
        }

        format!("{bias}\n{agreement}\n{listing}")
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("Cannot write evaluation report to '{}'", path.display()))?;
        tracing::info!("Evaluation report written to '{}'", path.display());
        Ok(())
    }
}
