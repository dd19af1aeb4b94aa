// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Reads an annotation corpus stored as JSON Lines, one
// judgement per line:
//
//   {"annotator": "w17", "label": 2, "embedding": [0.1, ...]}
//   {"annotator": "w03", "score": -41.5, "text": "Storm hits coast"}
//
// Each record needs an annotator, and either
//   - `label` (class index below `num_classes`), or
//   - `score` (a rating in [-max, max], bucketed into classes)
// and either
//   - `embedding` (precomputed vector), or
//   - `text` (embedded with the configured TextProcessor).
//
// Blank lines are skipped. A malformed line fails the whole
// load with its line number; a corpus with holes would give
// silently different splits.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf};

use crate::data::preprocessor::TextProcessor;
use crate::domain::annotation::DataPoint;
use crate::domain::traits::CorpusSource;

/// Bucket a rating in `[-maximum_value, maximum_value]` into one of
/// `num_classes` equal-width classes. Ratings on a shared boundary fall
/// into the lower class; ratings outside the range have no class.
pub fn encode_score(score: f64, maximum_value: f64, num_classes: usize) -> Option<usize> {
    let step = maximum_value * 2.0 / num_classes as f64;
    (0..num_classes).find(|&i| {
        let start = -maximum_value + i as f64 * step;
        let end = -maximum_value + (i + 1) as f64 * step;
        score >= start && score <= end
    })
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    annotator: String,
    #[serde(default)]
    label: Option<usize>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    embedding: Option<Vec<f32>>,
    #[serde(default)]
    text: Option<String>,
}

/// How `score` fields become labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreEncoding {
    pub maximum_value: f64,
    pub num_classes: usize,
}

impl Default for ScoreEncoding {
    fn default() -> Self {
        Self { maximum_value: 100.0, num_classes: 3 }
    }
}

pub struct JsonlCorpusLoader {
    path: PathBuf,
    processor: TextProcessor,
    scores: ScoreEncoding,
}

impl JsonlCorpusLoader {
    pub fn new(path: impl Into<PathBuf>, processor: TextProcessor, scores: ScoreEncoding) -> Self {
        Self { path: path.into(), processor, scores }
    }

    fn convert(&self, raw: RawRecord) -> Result<DataPoint> {
        let num_classes = self.scores.num_classes;
        let label = match (raw.label, raw.score) {
            (Some(label), _) if label >= num_classes => {
                bail!("label {label} is outside 0..{num_classes}")
            }
            (Some(label), _) => label,
            (None, Some(score)) => encode_score(score, self.scores.maximum_value, num_classes)
                .with_context(|| {
                    format!(
                        "score {score} is outside [-{max}, {max}]",
                        max = self.scores.maximum_value
                    )
                })?,
            (None, None) => bail!("record has neither 'label' nor 'score'"),
        };

        let embedding = match (raw.embedding, raw.text) {
            (Some(embedding), _) => embedding,
            (None, Some(text)) => self
                .processor
                .embed(&text)
                .context("record has only 'text' but the embedding strategy is 'precomputed'")?,
            (None, None) => bail!("record has neither 'embedding' nor 'text'"),
        };

        Ok(DataPoint::new(embedding, label, raw.annotator))
    }
}

impl CorpusSource for JsonlCorpusLoader {
    fn load_all(&self) -> Result<Vec<DataPoint>> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        let mut points = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let raw: RawRecord = serde_json::from_str(line).with_context(|| {
                format!("{}:{}: invalid JSON record", self.path.display(), lineno + 1)
            })?;
            let point = self
                .convert(raw)
                .with_context(|| format!("{}:{}", self.path.display(), lineno + 1))?;
            points.push(point);
        }

        tracing::info!("Loaded {} annotations from '{}'", points.len(), self.path.display());
        Ok(points)
    }
}
