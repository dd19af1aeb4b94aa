// ============================================================
// Layer 6 — Running Metrics and the Metrics Logger
// ============================================================
// Within one phase, a single (epoch, annotator, mode), every
// metric is kept as a running mean weighted by batch size:
//
//   mean_new = (mean_old * n_old + value * n_batch) / (n_old + n_batch)
//
// where n is the number of samples seen so far in the phase.
// After n batches the mean equals Σ(v_i * b_i) / Σ(b_i).
//
// When a phase ends its final means are appended as one row to
// a CSV file, so learning curves per annotator can be plotted:
//
//   epoch,annotator,mode,samples,loss,accuracy,precision,recall,f1
//   0,w17,train,412,1.032511,0.451456,0.412331,0.398220,0.401100
//   0,w17,validation,51,0.998012,0.470588,0.433410,0.421000,0.420137
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::infra::scores::BatchScores;

// ─── RunningMean ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    count: usize,
    mean: f64,
}

impl RunningMean {
    pub fn update(&mut self, value: f64, n_batch: usize) {
        if n_batch == 0 {
            return;
        }
        let n_old = self.count as f64;
        let n_new = n_batch as f64;
        self.mean = (self.mean * n_old + value * n_new) / (n_old + n_new);
        self.count += n_batch;
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

// ─── RunningMetrics ───────────────────────────────────────────────────────────
/// Accumulator for the five metrics of one phase.
#[derive(Debug, Clone, Default)]
pub struct RunningMetrics {
    loss: RunningMean,
    accuracy: RunningMean,
    precision: RunningMean,
    recall: RunningMean,
    f1: RunningMean,
}

impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, loss: f64, scores: &BatchScores, batch_size: usize) {
        self.loss.update(loss, batch_size);
        self.accuracy.update(scores.accuracy, batch_size);
        self.precision.update(scores.precision, batch_size);
        self.recall.update(scores.recall, batch_size);
        self.f1.update(scores.f1, batch_size);
    }

    pub fn samples(&self) -> usize {
        self.loss.count()
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            samples: self.samples(),
            loss: self.loss.mean(),
            accuracy: self.accuracy.mean(),
            precision: self.precision.mean(),
            recall: self.recall.mean(),
            f1: self.f1.mean(),
        }
    }
}

/// Final means of a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl fmt::Display for MetricSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} loss={:.4} acc={:.4} prec={:.4} rec={:.4} f1={:.4}",
            self.samples, self.loss, self.accuracy, self.precision, self.recall, self.f1,
        )
    }
}

// ─── PhaseRecord ──────────────────────────────────────────────────────────────
/// One row of the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub epoch: usize,
    pub annotator: String,
    /// "train" or "validation"
    pub mode: String,
    pub metrics: MetricSnapshot,
}

// ─── MetricsLogger ────────────────────────────────────────────────────────────
/// Appends phase records to `metrics.csv` in the given directory.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "epoch,annotator,mode,samples,loss,accuracy,precision,recall,f1")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &PhaseRecord) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        let m = &r.metrics;
        writeln!(
            f,
            "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6}",
            r.epoch, r.annotator, r.mode, m.samples, m.loss, m.accuracy, m.precision, m.recall, m.f1,
        )?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
