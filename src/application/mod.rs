// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only:
//   - No model math here (Layer 5)
//   - No printing here (Layer 1)
//   - No file formats here (Layers 4 and 6)
//
// Reference: Clean Architecture pattern

// Corpus → bootstrap → train → checkpoints
pub mod train_use_case;

// Checkpoints → bias matrices and agreement report
pub mod evaluate_use_case;
