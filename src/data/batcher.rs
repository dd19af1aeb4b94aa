// ============================================================
// Layer 4 — Annotation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<AnnotatedItem>
// into tensors.
//
//   embeddings      [batch, embedding_dim]   float
//   labels          [batch]                  int
//   pseudo_targets  one [batch] int tensor per pseudo annotator
//
// A pseudo annotator only gets a target tensor when EVERY item
// in the batch carries a label for it. Within an annotator
// filter all items share one owner, so this is the whole key
// set; mixed batches fall back to the common keys.
//
// Reference: Burn Book §4 (Batcher)

use std::collections::BTreeSet;

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::dataset::AnnotatedItem;
use crate::domain::annotation::AnnotatorId;

// ─── AnnotationBatch ──────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AnnotationBatch<B: Backend> {
    /// Shape: [batch_size, embedding_dim]
    pub embeddings: Tensor<B, 2>,

    /// Ground truth of the owning annotator. Shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,

    /// Pseudo-label targets, ordered by annotator id
    pub pseudo_targets: Vec<(AnnotatorId, Tensor<B, 1, Int>)>,
}

impl<B: Backend> AnnotationBatch<B> {
    pub fn size(&self) -> usize {
        self.labels.dims()[0]
    }
}

// ─── AnnotationBatcher ────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct AnnotationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AnnotationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

/// Pseudo annotators labelled on every item.
fn shared_pseudo_annotators(items: &[AnnotatedItem]) -> Vec<AnnotatorId> {
    let Some(first) = items.first() else {
        return Vec::new();
    };
    let mut shared: BTreeSet<&AnnotatorId> = first.pseudo_labels.keys().collect();
    for item in &items[1..] {
        shared.retain(|ann| item.pseudo_labels.contains_key(*ann));
    }
    shared.into_iter().cloned().collect()
}

impl<B: Backend> Batcher<AnnotatedItem, AnnotationBatch<B>> for AnnotationBatcher<B> {
    fn batch(&self, items: Vec<AnnotatedItem>) -> AnnotationBatch<B> {
        let batch_size = items.len();
        let embedding_dim = items.first().map_or(0, |i| i.embedding.len());

        let flat: Vec<f32> = items
            .iter()
            .flat_map(|i| i.embedding.iter().copied())
            .collect();
        let embeddings = Tensor::<B, 1>::from_floats(flat.as_slice(), &self.device)
            .reshape([batch_size, embedding_dim]);

        let labels: Vec<i32> = items.iter().map(|i| i.label).collect();
        let labels = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        let pseudo_targets = shared_pseudo_annotators(&items)
            .into_iter()
            .map(|ann| {
                let targets: Vec<i32> = items.iter().map(|i| i.pseudo_labels[&ann]).collect();
                let tensor = Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device);
                (ann, tensor)
            })
            .collect();

        AnnotationBatch { embeddings, labels, pseudo_targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn item(label: i32, pseudo: &[(&str, i32)]) -> AnnotatedItem {
        AnnotatedItem {
            embedding: vec![label as f32, 0.5, -1.0],
            label,
            annotator: "a".into(),
            pseudo_labels: pseudo.iter().map(|(k, v)| (AnnotatorId::from(*k), *v)).collect(),
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = AnnotationBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![item(0, &[]), item(1, &[]), item(2, &[])]);
        assert_eq!(batch.embeddings.dims(), [3, 3]);
        assert_eq!(batch.size(), 3);
        let labels: Vec<i64> = batch.labels.into_data().iter::<i64>().collect();
        assert_eq!(labels, vec![0, 1, 2]);
        assert!(batch.pseudo_targets.is_empty());
    }

    #[test]
    fn test_pseudo_targets_use_shared_keys() {
        let batcher = AnnotationBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            item(0, &[("b", 1), ("c", 2)]),
            item(1, &[("b", 0)]),
        ]);
        assert_eq!(batch.pseudo_targets.len(), 1);
        let (ann, targets) = &batch.pseudo_targets[0];
        assert_eq!(ann, &AnnotatorId::from("b"));
        let values: Vec<i64> = targets.clone().into_data().iter::<i64>().collect();
        assert_eq!(values, vec![1, 0]);
    }
}
