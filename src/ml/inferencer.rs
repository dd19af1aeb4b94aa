// ============================================================
// Layer 5 — Trained Labeler
// ============================================================
// A BasicNetwork restored from disk, answering single-sample
// arg-max queries. This is what pseudo-label bootstrapping uses
// to stand in for an annotator who never saw a point.
//
// Model files are located with a path template in which
// `{annotator}` is replaced by the annotator id:
//
//   models/basic_{annotator}.mpk  →  models/basic_w17.mpk
use anyhow::Result;
use burn::prelude::*;
use std::path::{Path, PathBuf};

use crate::domain::{annotation::AnnotatorId, traits::PseudoLabeler};
use crate::infra::checkpoint::load_backbone;
use crate::ml::model::{BasicNetwork, BasicNetworkConfig};

pub const ANNOTATOR_PLACEHOLDER: &str = "{annotator}";

pub fn resolve_model_path(template: &str, annotator: &AnnotatorId) -> PathBuf {
    PathBuf::from(template.replace(ANNOTATOR_PLACEHOLDER, annotator.as_str()))
}

pub struct TrainedLabeler<B: Backend> {
    network: BasicNetwork<B>,
    device: B::Device,
}

impl<B: Backend> TrainedLabeler<B> {
    pub fn new(network: BasicNetwork<B>, device: B::Device) -> Self {
        Self { network, device }
    }

    pub fn from_file(config: &BasicNetworkConfig, path: &Path, device: &B::Device) -> Result<Self> {
        let network = load_backbone(config.init(device), path, device)?;
        tracing::info!("Pseudo-label model loaded from '{}'", path.display());
        Ok(Self::new(network, device.clone()))
    }
}

impl<B: Backend> PseudoLabeler for TrainedLabeler<B> {
    fn predict(&self, embedding: &[f32]) -> usize {
        let x = Tensor::<B, 1>::from_floats(embedding, &self.device).reshape([1, embedding.len()]);
        self.network
            .forward(x)
            .argmax(1)
            .into_data()
            .iter::<i64>()
            .next()
            .map_or(0, |c| c as usize)
    }
}
