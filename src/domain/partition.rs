// ============================================================
// Layer 3 — Partitions and the Visible-Subset Filter
// ============================================================
// Every data point belongs to exactly one partition, assigned
// once when the corpus is split. Training code looks at the
// corpus through a FilterState: one partition, optionally
// narrowed to a single annotator.
//
// FilterState is an immutable value. Changing the partition or
// the annotator produces a new FilterState rather than mutating
// one that someone else may be holding.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::annotation::AnnotatorId;
use crate::domain::error::AnnotationError;

/// One of the three fixed splits of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Train,
    Validation,
    Test,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Train, Partition::Validation, Partition::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Validation => "validation",
            Partition::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Partition::Train),
            "validation" => Ok(Partition::Validation),
            "test" => Ok(Partition::Test),
            other => Err(AnnotationError::InvalidPartition(other.to_string())),
        }
    }
}

/// Which slice of the corpus is currently visible.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterState {
    pub partition: Partition,
    pub annotator: Option<AnnotatorId>,
}

impl FilterState {
    /// Whole partition, no annotator restriction.
    pub fn new(partition: Partition) -> Self {
        Self { partition, annotator: None }
    }

    pub fn with_partition(&self, partition: Partition) -> Self {
        Self { partition, annotator: self.annotator.clone() }
    }

    pub fn with_annotator(&self, annotator: AnnotatorId) -> Self {
        Self { partition: self.partition, annotator: Some(annotator) }
    }

    pub fn without_annotator(&self) -> Self {
        Self::new(self.partition)
    }

    /// Does a point labelled by `annotator` pass the annotator restriction?
    pub fn admits(&self, annotator: &AnnotatorId) -> bool {
        self.annotator.as_ref().map_or(true, |wanted| wanted == annotator)
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(Partition::Train)
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.annotator {
            Some(a) => write!(f, "{}/{}", self.partition, a),
            None => write!(f, "{}/all", self.partition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_partitions() {
        for p in Partition::ALL {
            assert_eq!(p.as_str().parse::<Partition>().unwrap(), p);
        }
    }

    #[test]
    fn test_unknown_partition_is_invalid() {
        let err = "holdout".parse::<Partition>().unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidPartition(name) if name == "holdout"));
    }

    #[test]
    fn test_filter_transitions_keep_other_half() {
        let f = FilterState::new(Partition::Train).with_annotator("a".into());
        let g = f.with_partition(Partition::Validation);
        assert_eq!(g.annotator, Some(AnnotatorId::from("a")));
        assert_eq!(g.without_annotator(), FilterState::new(Partition::Validation));
        assert!(g.admits(&"a".into()));
        assert!(!g.admits(&"b".into()));
        assert!(g.without_annotator().admits(&"b".into()));
    }
}
