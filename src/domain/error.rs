// ============================================================
// Layer 3 — Typed Domain Errors
// ============================================================
// The rest of the application reports failures through
// anyhow::Result with context. These are the few failures that
// callers need to match on, so they get a concrete type.
//
//   InvalidPartition    fatal, unknown partition name
//   InvalidAnnotator    fatal, annotator not in the corpus
//   DegenerateMetric    zero division inside precision / recall
//                       / F1; always replaced by the configured
//                       fallback value, never surfaced
//   EmptyCorpus         nothing to train on
//   InconsistentEmbedding   embeddings of different widths

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnnotationError {
    #[error("invalid partition '{0}': must be one of train, validation, test")]
    InvalidPartition(String),

    #[error("invalid annotator '{0}': not present in the corpus")]
    InvalidAnnotator(String),

    #[error("degenerate metric: {metric} has a zero denominator")]
    DegenerateMetric { metric: &'static str },

    #[error("corpus contains no data points")]
    EmptyCorpus,

    #[error("embedding of point {index} has width {found}, expected {expected}")]
    InconsistentEmbedding { index: usize, expected: usize, found: usize },
}
