// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap and routes to Layer 2.
//
//   1. `train`      fit bias heads on an annotation corpus
//   2. `evaluate`   report bias matrices of a trained run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "annotator_bias",
    version,
    about = "Model systematic annotator disagreement with per-annotator bias matrices."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the use case. The CLI only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on corpus: {}", args.corpus);
    let summary = TrainUseCase::new(args.into()).execute()?;

    if let Some(bootstrap) = &summary.bootstrap {
        println!("Pseudo-labels written: {}", bootstrap.total_written());
    }
    println!("sum of first 10 losses: {:.4}", summary.first_losses);
    println!("sum of last  10 losses: {:.4}", summary.last_losses);
    if let Some(f1) = summary.f1 {
        println!("Last validation F1: {f1:.4}");
    }
    for path in &summary.checkpoints {
        println!("Checkpoint: {}", path.display());
    }
    println!("Training complete. Model saved to {}", summary.model_path.display());
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let report = EvaluateUseCase::new(args.checkpoint_dir, args.output.clone())
        .with_model_path(args.model)
        .with_label_names(args.labels)
        .execute()?;

    println!(
        "Evaluated {} annotators. Report written to {}",
        report.sections.len(),
        args.output.display()
    );
    Ok(())
}
