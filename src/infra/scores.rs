// ============================================================
// Layer 6 — Classification Scores
// ============================================================
// Accuracy, precision, recall and F1 for single-label
// multiclass predictions.
//
// Averaging methods:
//   micro     global TP / FP / FN counts (equals accuracy for
//             single-label data)
//   macro     unweighted mean over every class that appears in
//             either the labels or the predictions
//   weighted  mean over the same classes, weighted by how often
//             each class appears in the labels
//   samples   per-sample scores averaged; each sample has one
//             true and one predicted class, so a sample scores 1
//             when they match
//
// A class with an empty denominator (no predictions for
// precision, no support for recall, neither for F1) is a
// degenerate metric. Its score is replaced by the configured
// `zero_division` value and the run continues.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::AnnotationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Averaging {
    Micro,
    Macro,
    Weighted,
    Samples,
}

/// The four scores of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchScores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ClassCounts {
    tp: usize,
    fp: usize,
    fn_: usize,
    support: usize,
}

fn ratio(num: usize, den: usize, metric: &'static str) -> Result<f64, AnnotationError> {
    if den == 0 {
        Err(AnnotationError::DegenerateMetric { metric })
    } else {
        Ok(num as f64 / den as f64)
    }
}

fn recover(score: Result<f64, AnnotationError>, zero_division: f64) -> f64 {
    score.unwrap_or_else(|e| {
        tracing::trace!("{e}; using {zero_division}");
        zero_division
    })
}

fn class_counts(predictions: &[i64], labels: &[i64]) -> Vec<(i64, ClassCounts)> {
    let classes: BTreeSet<i64> = predictions.iter().chain(labels).copied().collect();
    classes
        .into_iter()
        .map(|class| {
            let mut c = ClassCounts::default();
            for (&p, &l) in predictions.iter().zip(labels) {
                match (p == class, l == class) {
                    (true, true) => c.tp += 1,
                    (true, false) => c.fp += 1,
                    (false, true) => c.fn_ += 1,
                    (false, false) => {}
                }
                if l == class {
                    c.support += 1;
                }
            }
            (class, c)
        })
        .collect()
}

#[derive(Clone, Copy)]
enum Kind {
    Precision,
    Recall,
    F1,
}

fn per_class(c: &ClassCounts, kind: Kind, zero_division: f64) -> f64 {
    let score = match kind {
        Kind::Precision => ratio(c.tp, c.tp + c.fp, "precision"),
        Kind::Recall => ratio(c.tp, c.tp + c.fn_, "recall"),
        Kind::F1 => ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_, "f1"),
    };
    recover(score, zero_division)
}

fn averaged(
    predictions: &[i64],
    labels: &[i64],
    averaging: Averaging,
    zero_division: f64,
    kind: Kind,
) -> f64 {
    assert_eq!(predictions.len(), labels.len(), "predictions and labels must have same length");

    let counts = class_counts(predictions, labels);
    match averaging {
        Averaging::Micro => {
            let total = counts.iter().fold(ClassCounts::default(), |acc, (_, c)| ClassCounts {
                tp: acc.tp + c.tp,
                fp: acc.fp + c.fp,
                fn_: acc.fn_ + c.fn_,
                support: acc.support + c.support,
            });
            per_class(&total, kind, zero_division)
        }
        Averaging::Macro => {
            if counts.is_empty() {
                return zero_division;
            }
            let sum: f64 = counts.iter().map(|(_, c)| per_class(c, kind, zero_division)).sum();
            sum / counts.len() as f64
        }
        Averaging::Weighted => {
            let support: usize = counts.iter().map(|(_, c)| c.support).sum();
            if support == 0 {
                return zero_division;
            }
            let sum: f64 = counts
                .iter()
                .map(|(_, c)| per_class(c, kind, zero_division) * c.support as f64)
                .sum();
            sum / support as f64
        }
        Averaging::Samples => accuracy(predictions, labels),
    }
}

pub fn accuracy(predictions: &[i64], labels: &[i64]) -> f64 {
    let correct = predictions.iter().zip(labels).filter(|(p, l)| p == l).count();
    recover(ratio(correct, labels.len(), "accuracy"), 0.0)
}

pub fn precision(predictions: &[i64], labels: &[i64], averaging: Averaging, zero_division: f64) -> f64 {
    averaged(predictions, labels, averaging, zero_division, Kind::Precision)
}

pub fn recall(predictions: &[i64], labels: &[i64], averaging: Averaging, zero_division: f64) -> f64 {
    averaged(predictions, labels, averaging, zero_division, Kind::Recall)
}

pub fn f1(predictions: &[i64], labels: &[i64], averaging: Averaging, zero_division: f64) -> f64 {
    averaged(predictions, labels, averaging, zero_division, Kind::F1)
}

/// All four scores at once.
pub fn score_batch(
    predictions: &[i64],
    labels: &[i64],
    averaging: Averaging,
    zero_division: f64,
) -> BatchScores {
    BatchScores {
        accuracy: accuracy(predictions, labels),
        precision: precision(predictions, labels, averaging, zero_division),
        recall: recall(predictions, labels, averaging, zero_division),
        f1: f1(predictions, labels, averaging, zero_division),
    }
}
