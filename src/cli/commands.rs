// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// List flags accept comma-separated values:
//   --save-at 0,4,9   --pseudo-annotators w03,w17
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::TrainConfig;
use crate::data::preprocessor::{EmbeddingStrategy, TextFilter, TextProcessor};
use crate::infra::scores::Averaging;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the backbone and per-annotator bias heads
    Train(TrainArgs),

    /// Write bias matrices and head agreement for a trained run
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON Lines corpus, one annotation per line
    #[arg(long, default_value = "data/annotations.jsonl")]
    pub corpus: String,

    /// Directory for config, metrics and final weights
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Train fraction of the first 90% of the shuffled corpus;
    /// the last 10% is always test
    #[arg(long, default_value_t = 0.8)]
    pub split_ratio: f64,

    #[arg(long, default_value_t = 3)]
    pub num_classes: usize,

    /// Half-width of the rating range for records carrying `score`
    #[arg(long, default_value_t = 100.0)]
    pub score_max: f64,

    /// How records without an `embedding` get one
    #[arg(long, value_enum, default_value_t = EmbeddingStrategy::Precomputed)]
    pub embedding: EmbeddingStrategy,

    /// Filters applied to text before hashing, in order
    #[arg(long, value_enum, value_delimiter = ',')]
    pub text_filters: Vec<TextFilter>,

    /// Width of hashed text embeddings
    #[arg(long, default_value_t = 256)]
    pub embedding_dim: usize,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    #[arg(long, default_value_t = 64)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Apply softmax to the backbone output
    #[arg(long)]
    pub use_softmax: bool,

    #[arg(long, value_enum, default_value_t = Averaging::Macro)]
    pub averaging: Averaging,

    /// Score used when precision / recall / F1 divide by zero
    #[arg(long, default_value_t = 0.0)]
    pub zero_division: f64,

    /// Train only the latent output on this annotator's labels
    #[arg(long)]
    pub single_annotator: Option<String>,

    /// Train only the latent output on every label
    #[arg(long)]
    pub basic_only: bool,

    /// Keep the backbone fixed; only bias heads learn
    #[arg(long)]
    pub freeze_backbone: bool,

    /// Annotators whose trained models label everyone else's points
    #[arg(long, value_delimiter = ',')]
    pub pseudo_annotators: Vec<String>,

    /// Backbone file per pseudo annotator, e.g. `runs/basic_{annotator}.mpk`
    #[arg(long)]
    pub pseudo_model_template: Option<String>,

    /// Full model record to start from
    #[arg(long)]
    pub initial_weights: Option<String>,

    /// Backbone record to start from
    #[arg(long)]
    pub pretrained_basic: Option<String>,

    /// 0-based epochs after which a checkpoint is written
    #[arg(long, value_delimiter = ',')]
    pub save_at: Vec<usize>,

    /// Directory for per-epoch checkpoints; none are written without it
    #[arg(long)]
    pub save_head: Option<String>,

    #[arg(long, default_value = "model")]
    pub save_stem: String,

    /// Put the last validation F1 in checkpoint names
    #[arg(long)]
    pub f1_in_name: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            corpus: a.corpus,
            checkpoint_dir: a.checkpoint_dir,
            split_ratio: a.split_ratio,
            num_classes: a.num_classes,
            score_max: a.score_max,
            text: TextProcessor::new(a.embedding, a.text_filters, a.embedding_dim),
            epochs: a.epochs,
            batch_size: a.batch_size,
            lr: a.lr,
            use_softmax: a.use_softmax,
            averaging: a.averaging,
            zero_division: a.zero_division,
            single_annotator: a.single_annotator,
            basic_only: a.basic_only,
            freeze_backbone: a.freeze_backbone,
            pseudo_annotators: a.pseudo_annotators,
            pseudo_model_template: a.pseudo_model_template,
            initial_weights: a.initial_weights,
            pretrained_basic: a.pretrained_basic,
            save_at: a.save_at,
            save_head: a.save_head,
            save_stem: a.save_stem,
            f1_in_name: a.f1_in_name,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Weights to evaluate instead of the run's final model
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Report file
    #[arg(long, default_value = "evaluation.txt")]
    pub output: PathBuf,

    /// Class names for the bias matrix header, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_train_args_into_config() {
        let cli = Cli::try_parse_from([
            "annotator_bias",
            "train",
            "--corpus",
            "c.jsonl",
            "--save-at",
            "0,3",
            "--pseudo-annotators",
            "w1,w2",
            "--embedding",
            "hashed-bag-of-words",
            "--text-filters",
            "lowercase,stop-words",
            "--averaging",
            "weighted",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.corpus, "c.jsonl");
        assert_eq!(cfg.save_at, vec![0, 3]);
        assert_eq!(cfg.pseudo_annotators, vec!["w1".to_string(), "w2".to_string()]);
        assert_eq!(cfg.text.strategy, EmbeddingStrategy::HashedBagOfWords);
        assert_eq!(cfg.text.filters, vec![TextFilter::Lowercase, TextFilter::StopWords]);
        assert_eq!(cfg.averaging, Averaging::Weighted);
        assert_eq!(cfg.split_ratio, 0.8);
    }

    #[test]
    fn test_evaluate_label_names() {
        let cli = Cli::try_parse_from(["annotator_bias", "evaluate", "--labels", "neg,neu,pos"]).unwrap();
        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        assert_eq!(args.labels.unwrap().len(), 3);
        assert_eq!(args.output, PathBuf::from("evaluation.txt"));
    }
}
