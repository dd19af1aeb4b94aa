// ============================================================
// Layer 3 — Annotation Domain Types
// ============================================================
// A DataPoint is one judgement by one annotator: an embedding
// of the annotated item, the class the annotator chose, and the
// pseudo-labels other annotators' models predicted for it.
//
// The set of annotators is derived once from the corpus, in
// first-seen order. That order is the head index used by the
// model for the whole run, so it lives in AnnotatorIndex and is
// never re-sorted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::AnnotationError;

// ─── AnnotatorId ──────────────────────────────────────────────────────────────
/// Opaque identity of a human labeler. Compared by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatorId(String);

impl AnnotatorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotatorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AnnotatorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─── DataPoint ────────────────────────────────────────────────────────────────
/// One annotated example.
///
/// Everything except `pseudo_labels` is fixed once loaded.
/// `pseudo_labels` is append-only: see [`DataPoint::add_pseudo_label`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Feature vector of the annotated item
    pub embedding: Vec<f32>,

    /// Class chosen by `annotator`
    pub label: usize,

    /// Who produced `label`
    pub annotator: AnnotatorId,

    /// Labels inferred for this point by other annotators' models.
    /// Empty when no bootstrapping has happened yet.
    #[serde(default)]
    pub pseudo_labels: BTreeMap<AnnotatorId, usize>,
}

impl DataPoint {
    pub fn new(embedding: Vec<f32>, label: usize, annotator: impl Into<AnnotatorId>) -> Self {
        Self {
            embedding,
            label,
            annotator: annotator.into(),
            pseudo_labels: BTreeMap::new(),
        }
    }

    /// Record a pseudo-label for `pseudo_annotator`.
    ///
    /// Returns `true` only when the label was actually written. Nothing is
    /// written when a label for that annotator already exists, or when the
    /// point was labelled by `pseudo_annotator` itself.
    pub fn add_pseudo_label(&mut self, pseudo_annotator: &AnnotatorId, label: usize) -> bool {
        if self.annotator == *pseudo_annotator || self.pseudo_labels.contains_key(pseudo_annotator) {
            return false;
        }
        self.pseudo_labels.insert(pseudo_annotator.clone(), label);
        true
    }

    pub fn has_pseudo_label(&self, pseudo_annotator: &AnnotatorId) -> bool {
        self.pseudo_labels.contains_key(pseudo_annotator)
    }
}

// ─── AnnotatorIndex ───────────────────────────────────────────────────────────
/// Stable mapping between annotators and model head indices.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotatorIndex {
    ids: Vec<AnnotatorId>,
}

impl AnnotatorIndex {
    /// Collect distinct annotators in first-seen order.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DataPoint>) -> Self {
        let mut ids: Vec<AnnotatorId> = Vec::new();
        for point in points {
            if !ids.contains(&point.annotator) {
                ids.push(point.annotator.clone());
            }
        }
        Self { ids }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[AnnotatorId] {
        &self.ids
    }

    pub fn get(&self, index: usize) -> Option<&AnnotatorId> {
        self.ids.get(index)
    }

    pub fn contains(&self, id: &AnnotatorId) -> bool {
        self.ids.contains(id)
    }

    /// Head index of `id`, or `InvalidAnnotator` when the corpus never saw it.
    pub fn index_of(&self, id: &AnnotatorId) -> Result<usize, AnnotationError> {
        self.ids
            .iter()
            .position(|known| known == id)
            .ok_or_else(|| AnnotationError::InvalidAnnotator(id.to_string()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_keeps_first_seen_order() {
        let points = vec![
            DataPoint::new(vec![0.0], 0, "w2"),
            DataPoint::new(vec![0.0], 1, "w1"),
            DataPoint::new(vec![0.0], 1, "w2"),
            DataPoint::new(vec![0.0], 0, "w3"),
        ];
        let index = AnnotatorIndex::from_points(&points);
        let names: Vec<&str> = index.ids().iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["w2", "w1", "w3"]);
        assert_eq!(index.index_of(&"w1".into()).unwrap(), 1);
    }

    #[test]
    fn test_unknown_annotator_is_rejected() {
        let index = AnnotatorIndex::from_points(&[DataPoint::new(vec![0.0], 0, "a")]);
        let err = index.index_of(&"ghost".into()).unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidAnnotator(name) if name == "ghost"));
    }

    #[test]
    fn test_pseudo_label_is_append_only() {
        let mut p = DataPoint::new(vec![1.0], 0, "a");
        let b = AnnotatorId::from("b");
        assert!(p.add_pseudo_label(&b, 2));
        assert!(!p.add_pseudo_label(&b, 1));
        assert_eq!(p.pseudo_labels[&b], 2);
    }

    #[test]
    fn test_no_pseudo_label_for_own_annotator() {
        let mut p = DataPoint::new(vec![1.0], 0, "a");
        assert!(!p.add_pseudo_label(&"a".into(), 1));
        assert!(p.pseudo_labels.is_empty());
    }

    #[test]
    fn test_value_equality_between_owned_and_borrowed_ids() {
        let owned = AnnotatorId::new(String::from("worker-7"));
        let literal: AnnotatorId = "worker-7".into();
        assert_eq!(owned, literal);
    }
}
