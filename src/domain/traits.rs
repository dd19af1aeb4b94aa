// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the orchestration engine and its
// collaborators. The data and application layers only see
// these traits, so a JSONL corpus and an in-memory test corpus
// look the same, and so does a trained network and a stub
// labeler in a unit test.

use anyhow::Result;

use crate::domain::annotation::DataPoint;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the flat collection of annotated points.
///
/// Implementations:
///   - JsonlCorpusLoader → one JSON record per line
pub trait CorpusSource {
    fn load_all(&self) -> Result<Vec<DataPoint>>;
}

// ─── PseudoLabeler ────────────────────────────────────────────────────────────
/// A trained classifier bound to one annotator, used to fill in the
/// labels that annotator never gave.
///
/// Implementations:
///   - TrainedLabeler → a BasicNetwork restored from a checkpoint
///   - any `Fn(&[f32]) -> usize` closure
pub trait PseudoLabeler {
    /// Arg-max class for a single embedding.
    fn predict(&self, embedding: &[f32]) -> usize;
}

impl<F> PseudoLabeler for F
where
    F: Fn(&[f32]) -> usize,
{
    fn predict(&self, embedding: &[f32]) -> usize {
        self(embedding)
    }
}
