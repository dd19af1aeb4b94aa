// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the corpus file and tensor batches.
//
//   annotations.jsonl
//       │
//       ▼
//   JsonlCorpusLoader   → DataPoints (TextProcessor for raw text)
//       │
//       ▼
//   AnnotatedDataset    → fixed train / validation / test split,
//       │                 annotator filter
//       ▼
//   bootstrap_all       → pseudo-labels from other annotators' models
//       │
//       ▼
//   AnnotationView      → Burn Dataset snapshot of one filter
//       │
//       ▼
//   AnnotationBatcher   → embeddings, labels, pseudo targets
//       │
//       ▼
//   DataLoader          → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads JSONL annotation corpora
pub mod loader;

/// Text cleaning and the embedding strategy
pub mod preprocessor;

/// Fixed-seed train / validation / test split
pub mod splitter;

/// Partitioned dataset with the annotator filter state machine
pub mod dataset;

/// Implements Burn's Batcher trait for annotated items
pub mod batcher;

/// Fills in labels for one annotator from another's model
pub mod pseudo_labels;
