// ============================================================
// Layer 4 — Annotated Dataset
// ============================================================
// Owns every data point of the run, split once into
// train / validation / test, and exposes the subset selected
// by the current FilterState.
//
// Two ways of looking at the data:
//
//   stateful   set_partition / set_annotator_filter / size / get
//              Each change recomputes the visible index list
//              before returning, so it can never be read stale.
//
//   snapshot   select(&FilterState) → AnnotationView
//              A pure function of the filter. The view owns its
//              items and implements Burn's Dataset trait, which
//              is what the DataLoader consumes.
//
// Reference: Burn Book §4 (Datasets)

use std::collections::BTreeMap;

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::splitter::{split_partitions, Splits, PARTITION_SEED};
use crate::domain::annotation::{AnnotatorId, AnnotatorIndex, DataPoint};
use crate::domain::error::AnnotationError;
use crate::domain::partition::{FilterState, Partition};

/// One visible data point, ready for batching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedItem {
    pub embedding: Vec<f32>,
    pub label: i32,
    pub annotator: AnnotatorId,
    pub pseudo_labels: BTreeMap<AnnotatorId, i32>,
}

impl From<&DataPoint> for AnnotatedItem {
    fn from(p: &DataPoint) -> Self {
        Self {
            embedding: p.embedding.clone(),
            label: p.label as i32,
            annotator: p.annotator.clone(),
            pseudo_labels: p
                .pseudo_labels
                .iter()
                .map(|(ann, &label)| (ann.clone(), label as i32))
                .collect(),
        }
    }
}

// ─── AnnotatedDataset ─────────────────────────────────────────────────────────
pub struct AnnotatedDataset {
    splits: Splits<DataPoint>,
    annotators: AnnotatorIndex,
    embedding_dim: usize,
    filter: FilterState,
    /// Indices into the active partition that pass the filter
    visible: Vec<usize>,
}

impl AnnotatedDataset {
    /// Partition `points` with the fixed seed and start on the whole
    /// train partition.
    pub fn new(points: Vec<DataPoint>, split_ratio: f64) -> Result<Self, AnnotationError> {
        Self::partition(points, split_ratio, PARTITION_SEED)
    }

    /// Same as [`AnnotatedDataset::new`] with an explicit seed.
    pub fn partition(
        points: Vec<DataPoint>,
        split_ratio: f64,
        seed: u64,
    ) -> Result<Self, AnnotationError> {
        let first = points.first().ok_or(AnnotationError::EmptyCorpus)?;
        let embedding_dim = first.embedding.len();
        if let Some((index, p)) = points
            .iter()
            .enumerate()
            .find(|(_, p)| p.embedding.len() != embedding_dim)
        {
            return Err(AnnotationError::InconsistentEmbedding {
                index,
                expected: embedding_dim,
                found: p.embedding.len(),
            });
        }

        // Head order is first-seen order of the corpus as loaded
        let annotators = AnnotatorIndex::from_points(&points);
        let splits = split_partitions(points, split_ratio, seed);

        let mut dataset = Self {
            splits,
            annotators,
            embedding_dim,
            filter: FilterState::default(),
            visible: Vec::new(),
        };
        dataset.refresh();
        Ok(dataset)
    }

    pub fn annotators(&self) -> &AnnotatorIndex {
        &self.annotators
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn partition_len(&self, partition: Partition) -> usize {
        self.points(partition).len()
    }

    pub fn points(&self, partition: Partition) -> &[DataPoint] {
        match partition {
            Partition::Train => &self.splits.train,
            Partition::Validation => &self.splits.validation,
            Partition::Test => &self.splits.test,
        }
    }

    /// Every point labelled by `annotator`, across all partitions.
    pub fn points_by_annotator_mut<'a>(
        &'a mut self,
        annotator: &'a AnnotatorId,
    ) -> impl Iterator<Item = &'a mut DataPoint> + 'a {
        self.splits
            .train
            .iter_mut()
            .chain(self.splits.validation.iter_mut())
            .chain(self.splits.test.iter_mut())
            .filter(move |p| p.annotator == *annotator)
    }

    // ── Filter state machine ─────────────────────────────────────────────────

    /// Switch the active partition, keeping any annotator restriction.
    pub fn set_partition(&mut self, partition: Partition) -> FilterState {
        let next = self.filter.with_partition(partition);
        self.apply(next)
    }

    /// String form of [`AnnotatedDataset::set_partition`].
    pub fn set_mode(&mut self, mode: &str) -> Result<FilterState, AnnotationError> {
        let partition: Partition = mode.parse()?;
        Ok(self.set_partition(partition))
    }

    pub fn set_annotator_filter(
        &mut self,
        annotator: &AnnotatorId,
    ) -> Result<FilterState, AnnotationError> {
        if !self.annotators.contains(annotator) {
            return Err(AnnotationError::InvalidAnnotator(annotator.to_string()));
        }
        let next = self.filter.with_annotator(annotator.clone());
        Ok(self.apply(next))
    }

    pub fn clear_annotator_filter(&mut self) -> FilterState {
        let next = self.filter.without_annotator();
        self.apply(next)
    }

    fn apply(&mut self, next: FilterState) -> FilterState {
        self.filter = next;
        self.refresh();
        self.filter.clone()
    }

    fn refresh(&mut self) {
        self.visible = self.visible_indices(&self.filter);
    }

    fn visible_indices(&self, filter: &FilterState) -> Vec<usize> {
        self.points(filter.partition)
            .iter()
            .enumerate()
            .filter(|(_, p)| filter.admits(&p.annotator))
            .map(|(i, _)| i)
            .collect()
    }

    // ── Visible subset ───────────────────────────────────────────────────────

    /// Number of visible points.
    pub fn size(&self) -> usize {
        self.visible.len()
    }

    /// The `index`-th visible point.
    pub fn get(&self, index: usize) -> Option<AnnotatedItem> {
        let &raw = self.visible.get(index)?;
        self.points(self.filter.partition).get(raw).map(AnnotatedItem::from)
    }

    /// Owned snapshot of the subset `filter` selects.
    pub fn select(&self, filter: &FilterState) -> AnnotationView {
        let points = self.points(filter.partition);
        let items = self
            .visible_indices(filter)
            .into_iter()
            .map(|i| AnnotatedItem::from(&points[i]))
            .collect();
        AnnotationView { filter: filter.clone(), items }
    }

    /// Snapshot of the currently visible subset.
    pub fn current_view(&self) -> AnnotationView {
        self.select(&self.filter)
    }
}

// ─── AnnotationView ───────────────────────────────────────────────────────────
/// Immutable slice of the dataset, fed to Burn's DataLoader.
#[derive(Debug, Clone)]
pub struct AnnotationView {
    filter: FilterState,
    items: Vec<AnnotatedItem>,
}

impl AnnotationView {
    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn items(&self) -> &[AnnotatedItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Dataset<AnnotatedItem> for AnnotationView {
    fn get(&self, index: usize) -> Option<AnnotatedItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> Vec<DataPoint> {
        (0..n)
            .map(|i| {
                let annotator = if i % 3 == 0 { "a" } else { "b" };
                DataPoint::new(vec![i as f32, 1.0], i % 2, annotator)
            })
            .collect()
    }

    #[test]
    fn test_partition_sizes_cover_corpus() {
        let ds = AnnotatedDataset::new(corpus(100), 0.8).unwrap();
        assert_eq!(ds.partition_len(Partition::Train), 72);
        assert_eq!(ds.partition_len(Partition::Validation), 18);
        assert_eq!(ds.partition_len(Partition::Test), 10);
    }

    #[test]
    fn test_partitioning_is_reproducible() {
        let a = AnnotatedDataset::new(corpus(60), 0.8).unwrap();
        let b = AnnotatedDataset::new(corpus(60), 0.8).unwrap();
        for p in Partition::ALL {
            assert_eq!(a.points(p), b.points(p));
        }
    }

    #[test]
    fn test_annotator_filter_restricts_visible_points() {
        let mut ds = AnnotatedDataset::new(corpus(90), 0.8).unwrap();
        let all = ds.size();
        let state = ds.set_annotator_filter(&"a".into()).unwrap();
        assert_eq!(state.annotator, Some(AnnotatorId::from("a")));
        assert!(ds.size() < all);
        for i in 0..ds.size() {
            assert_eq!(ds.get(i).unwrap().annotator, AnnotatorId::from("a"));
        }
        assert!(ds.get(ds.size()).is_none());

        ds.clear_annotator_filter();
        assert_eq!(ds.size(), all);
    }

    #[test]
    fn test_switching_partition_recomputes_filter() {
        let mut ds = AnnotatedDataset::new(corpus(90), 0.8).unwrap();
        ds.set_annotator_filter(&"b".into()).unwrap();
        ds.set_partition(Partition::Validation);
        let expected = ds
            .points(Partition::Validation)
            .iter()
            .filter(|p| p.annotator == AnnotatorId::from("b"))
            .count();
        assert_eq!(ds.size(), expected);
    }

    #[test]
    fn test_invalid_mode_and_annotator() {
        let mut ds = AnnotatedDataset::new(corpus(10), 0.8).unwrap();
        assert!(matches!(ds.set_mode("dev"), Err(AnnotationError::InvalidPartition(_))));
        assert!(matches!(
            ds.set_annotator_filter(&"zed".into()),
            Err(AnnotationError::InvalidAnnotator(_))
        ));
        assert_eq!(ds.set_mode("test").unwrap().partition, Partition::Test);
    }

    #[test]
    fn test_select_matches_stateful_view() {
        let mut ds = AnnotatedDataset::new(corpus(50), 0.8).unwrap();
        ds.set_annotator_filter(&"a".into()).unwrap();
        let view = ds.current_view();
        assert_eq!(Dataset::len(&view), ds.size());
        for i in 0..ds.size() {
            assert_eq!(Dataset::get(&view, i), ds.get(i));
        }
        // select() never touches the stateful filter
        let other = ds.select(&FilterState::new(Partition::Test));
        assert_eq!(other.filter().partition, Partition::Test);
        assert_eq!(ds.filter().partition, Partition::Train);
    }

    #[test]
    fn test_rejects_empty_and_ragged_corpus() {
        assert!(matches!(
            AnnotatedDataset::new(Vec::new(), 0.8),
            Err(AnnotationError::EmptyCorpus)
        ));
        let ragged = vec![
            DataPoint::new(vec![1.0, 2.0], 0, "a"),
            DataPoint::new(vec![1.0], 0, "a"),
        ];
        assert!(matches!(
            AnnotatedDataset::new(ragged, 0.8),
            Err(AnnotationError::InconsistentEmbedding { index: 1, expected: 2, found: 1 })
        ));
    }
}
