// ============================================================
// Layer 4 — Pseudo-Label Bootstrapper
// ============================================================
// Annotators with few judgements get extra training signal from
// points labelled by OTHER annotators: a model trained for the
// pseudo annotator predicts what they would have answered, and
// that prediction is stored on the point.
//
// For every configured pseudo annotator P and every other
// annotator S in the corpus:
//   for each point owned by S (any partition)
//     if the point has no label from P yet → predict and store
//
// Stored labels are never overwritten, so running the same
// (S, P) pair twice changes nothing. The whole pass runs once,
// before training, and returns a summary listing every pair
// that was processed.

use anyhow::{Context, Result};

use crate::data::dataset::AnnotatedDataset;
use crate::domain::annotation::AnnotatorId;
use crate::domain::traits::PseudoLabeler;

/// Outcome of one (source, pseudo) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub source: AnnotatorId,
    pub pseudo: AnnotatorId,
    /// Points that received a new pseudo-label
    pub written: usize,
    /// Points that already had one and were left alone
    pub skipped: usize,
}

/// Completion record of [`bootstrap_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapSummary {
    pub pairs: Vec<PairOutcome>,
}

impl BootstrapSummary {
    pub fn total_written(&self) -> usize {
        self.pairs.iter().map(|p| p.written).sum()
    }

    /// Every pseudo annotator that was fully processed.
    pub fn covers(&self, pseudo: &AnnotatorId) -> bool {
        self.pairs.iter().any(|p| &p.pseudo == pseudo)
    }
}

/// Label `source`'s points on behalf of `pseudo` using `labeler`.
pub fn bootstrap_pair(
    dataset: &mut AnnotatedDataset,
    source: &AnnotatorId,
    pseudo: &AnnotatorId,
    labeler: &dyn PseudoLabeler,
) -> PairOutcome {
    let mut written = 0usize;
    let mut skipped = 0usize;

    for point in dataset.points_by_annotator_mut(source) {
        if point.has_pseudo_label(pseudo) {
            skipped += 1;
            continue;
        }
        let label = labeler.predict(&point.embedding);
        if point.add_pseudo_label(pseudo, label) {
            written += 1;
        }
    }

    tracing::debug!(
        "Pseudo-labels {} → {}: {} written, {} already present",
        pseudo,
        source,
        written,
        skipped,
    );

    PairOutcome { source: source.clone(), pseudo: pseudo.clone(), written, skipped }
}

/// Run the bootstrapping pass for every pseudo annotator.
///
/// `load_labeler` is called once per pseudo annotator and must return the
/// model trained for that annotator.
pub fn bootstrap_all<L, F>(
    dataset: &mut AnnotatedDataset,
    pseudo_annotators: &[AnnotatorId],
    mut load_labeler: F,
) -> Result<BootstrapSummary>
where
    L: PseudoLabeler,
    F: FnMut(&AnnotatorId) -> Result<L>,
{
    let mut summary = BootstrapSummary::default();

    for pseudo in pseudo_annotators {
        dataset
            .annotators()
            .index_of(pseudo)
            .with_context(|| format!("Pseudo annotator '{pseudo}' has no points in the corpus"))?;

        let labeler = load_labeler(pseudo)
            .with_context(|| format!("Cannot load pseudo-label model for '{pseudo}'"))?;

        let sources: Vec<AnnotatorId> = dataset
            .annotators()
            .ids()
            .iter()
            .filter(|a| *a != pseudo)
            .cloned()
            .collect();

        for source in &sources {
            let outcome = bootstrap_pair(dataset, source, pseudo, &labeler);
            summary.pairs.push(outcome);
        }
    }

    tracing::info!(
        "Pseudo-label bootstrapping complete: {} pseudo annotators, {} labels written",
        pseudo_annotators.len(),
        summary.total_written(),
    );
    Ok(summary)
}
