use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    optim::GradientsParams,
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};

// ─── BasicNetwork ─────────────────────────────────────────────────────────────
// The shared backbone. Its output is the latent-truth estimate:
// what the item's label "really" is before any annotator bias.

#[derive(Config, Debug)]
pub struct BasicNetworkConfig {
    pub embedding_dim: usize,
    pub label_dim: usize,
    #[config(default = false)]
    pub use_softmax: bool,
}

impl BasicNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BasicNetwork<B> {
        BasicNetwork {
            linear: LinearConfig::new(self.embedding_dim, self.label_dim).init(device),
            use_softmax: self.use_softmax,
        }
    }
}

#[derive(Module, Debug)]
pub struct BasicNetwork<B: Backend> {
    pub linear: Linear<B>,
    pub use_softmax: bool,
}

impl<B: Backend> BasicNetwork<B> {
    /// embeddings: [batch, embedding_dim] → [batch, label_dim]
    pub fn forward(&self, embeddings: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = self.linear.forward(embeddings);
        if self.use_softmax {
            softmax(logits, 1)
        } else {
            logits
        }
    }
}

// ─── BiasCorrectionModel ──────────────────────────────────────────────────────
// Backbone + one square bias matrix per annotator. Head i maps
// the latent estimate to annotator i's expected answer. Heads
// start as identity matrices, i.e. "annotator agrees with the
// latent truth", and drift as training finds systematic bias.

#[derive(Config, Debug)]
pub struct BiasCorrectionConfig {
    pub embedding_dim: usize,
    pub label_dim: usize,
    pub annotator_dim: usize,
    #[config(default = false)]
    pub use_softmax: bool,
}

impl BiasCorrectionConfig {
    pub fn backbone(&self) -> BasicNetworkConfig {
        BasicNetworkConfig::new(self.embedding_dim, self.label_dim).with_use_softmax(self.use_softmax)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BiasCorrectionModel<B> {
        let basic = self.backbone().init(device);
        let bias_matrices = (0..self.annotator_dim)
            .map(|_| identity_head(self.label_dim, device))
            .collect();
        BiasCorrectionModel { basic, bias_matrices }
    }
}

fn identity_head<B: Backend>(label_dim: usize, device: &B::Device) -> Linear<B> {
    let mut eye = vec![0.0f32; label_dim * label_dim];
    for i in 0..label_dim {
        eye[i * label_dim + i] = 1.0;
    }
    let weight = Tensor::<B, 2>::from_data(TensorData::new(eye, [label_dim, label_dim]), device);
    let mut head = LinearConfig::new(label_dim, label_dim).with_bias(false).init(device);
    head.weight = Param::from_tensor(weight);
    head
}

#[derive(Module, Debug)]
pub struct BiasCorrectionModel<B: Backend> {
    pub basic: BasicNetwork<B>,
    pub bias_matrices: Vec<Linear<B>>,
}

/// Every output of one forward pass.
pub struct ModelOutput<B: Backend> {
    /// Backbone estimate, [batch, label_dim]
    pub latent: Tensor<B, 2>,
    /// One [batch, label_dim] tensor per annotator, in head order
    pub heads: Vec<Tensor<B, 2>>,
}

impl<B: Backend> ModelOutput<B> {
    /// Output of head `index`, or the latent estimate when `None`.
    pub fn select(&self, index: Option<usize>) -> Tensor<B, 2> {
        match index {
            Some(i) => self.heads[i].clone(),
            None => self.latent.clone(),
        }
    }
}

impl<B: Backend> BiasCorrectionModel<B> {
    pub fn num_heads(&self) -> usize {
        self.bias_matrices.len()
    }

    pub fn forward(&self, embeddings: Tensor<B, 2>) -> ModelOutput<B> {
        let latent = self.basic.forward(embeddings);
        let heads = self
            .bias_matrices
            .iter()
            .map(|head| head.forward(latent.clone()))
            .collect();
        ModelOutput { latent, heads }
    }

    /// Bias matrix of head `index` laid out as rows = output class,
    /// columns = latent class.
    pub fn bias_matrix(&self, index: usize) -> Vec<Vec<f32>> {
        // Linear stores [d_input, d_output]; transpose to [output, latent]
        let weight = self.bias_matrices[index].weight.val().transpose();
        let [rows, cols] = weight.dims();
        let values: Vec<f32> = weight.into_data().iter::<f32>().collect();
        values.chunks(cols.max(1)).take(rows).map(|r| r.to_vec()).collect()
    }
}

// ─── Parameter scope ──────────────────────────────────────────────────────────
/// Which parameters an optimizer is allowed to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScope {
    /// Backbone and every head
    All,
    /// Backbone and head `i`
    BackboneAndHead(usize),
    /// Head `i` only; the backbone is frozen
    Head(usize),
}

fn drop_linear_grads<B: AutodiffBackend>(grads: &mut GradientsParams, linear: &Linear<B>) {
    let _ = grads.remove::<B::InnerBackend, 2>(linear.weight.id.clone());
    if let Some(bias) = &linear.bias {
        let _ = grads.remove::<B::InnerBackend, 1>(bias.id.clone());
    }
}

impl<B: AutodiffBackend> BiasCorrectionModel<B> {
    /// Remove gradients of parameters outside `scope`, so an optimizer
    /// step leaves them untouched.
    pub fn restrict_grads(&self, grads: &mut GradientsParams, scope: ParamScope) {
        let kept_head = match scope {
            ParamScope::All => return,
            ParamScope::BackboneAndHead(i) => i,
            ParamScope::Head(i) => {
                drop_linear_grads(grads, &self.basic.linear);
                i
            }
        };
        for (j, head) in self.bias_matrices.iter().enumerate() {
            if j != kept_head {
                drop_linear_grads(grads, head);
            }
        }
    }
}
