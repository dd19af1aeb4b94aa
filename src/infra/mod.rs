// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs   Model records, run config, architecture,
//                   and the per-epoch checkpoint policy
//
//   metrics.rs      Batch-size weighted running means and the
//                   per-phase CSV log
//
//   scores.rs       Accuracy, precision, recall and F1 with
//                   micro / macro / weighted / samples averaging
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model and run persistence, checkpoint policy
pub mod checkpoint;

/// Running metrics and the metrics CSV logger
pub mod metrics;

/// Classification scores
pub mod scores;
