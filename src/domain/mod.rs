// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits describing annotated
// classification data and the multi-annotator training problem.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, traits and typed errors
//
// The orchestration code in the ML layer and the dataset in
// the data layer both speak in these types, so the vocabulary
// (annotator, partition, filter, pseudo-label) lives here once.

/// Data points, annotator identities and the annotator index
pub mod annotation;

/// Train / validation / test partitions and the visible-subset filter
pub mod partition;

/// Typed errors for partition, annotator and metric failures
pub mod error;

/// Core abstractions (traits) that other layers implement
pub mod traits;
