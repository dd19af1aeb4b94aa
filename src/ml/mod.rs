// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All model, optimiser and tensor code lives here.
//
//   model.rs        BasicNetwork backbone (the latent-truth
//                   estimate) plus one square bias matrix per
//                   annotator, and parameter scopes so each
//                   optimiser only updates its own part
//
//   trainer.rs      The training orchestrator: epoch /
//                   annotator loop, per-annotator AdamW,
//                   pseudo-label losses, validation fallback,
//                   running metrics and checkpoint policy
//
//   inferencer.rs   A trained backbone answering single-sample
//                   queries; the pseudo-labeler
//
//   evaluator.rs    Bias matrices and head agreement report
//
// Backends:
//   default        NdArray (CPU)
//   --features wgpu  Wgpu
// Training wraps the backend in Autodiff.
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

pub mod model;

pub mod trainer;

pub mod inferencer;

pub mod evaluator;

#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray<f32>;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

pub type TrainBackend = burn::backend::Autodiff<InferBackend>;

/// Device of the selected backend.
pub fn default_device() -> <InferBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}
