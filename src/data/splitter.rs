// ============================================================
// Layer 4 — Train / Validation / Test Splitter
// ============================================================
// Shuffles the corpus with a fixed seed and cuts it into three
// consecutive slices.
//
// The cut points are:
//   eof_train = floor(len * split_ratio * 0.9)
//   eof_val   = floor(len * 0.9)
//
// so the last 10% is always test, and `split_ratio` is the
// train share of the remaining 90%, not the train share of the
// whole corpus. With 100 points and split_ratio = 0.8:
//   train = 72, validation = 18, test = 10
//
// The seed is a constant so every run over the same corpus
// sees exactly the same partitions. The generator is ChaCha8,
// whose output stream is fixed across rand releases; `evaluate`
// rebuilds the split from the saved config and relies on it.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used for every corpus split.
pub const PARTITION_SEED: u64 = 123_456_789;

/// Share of the corpus that is not reserved for the test split.
const NON_TEST_FRACTION: f64 = 0.9;

/// The three slices produced by [`split_partitions`].
#[derive(Debug, Clone, PartialEq)]
pub struct Splits<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
}

/// Cut points `(eof_train, eof_val)` for a corpus of `len` items.
pub fn split_bounds(len: usize, split_ratio: f64) -> (usize, usize) {
    let eof_train = (len as f64 * split_ratio * NON_TEST_FRACTION) as usize;
    let eof_val = (len as f64 * NON_TEST_FRACTION) as usize;
    // Clamp so a ratio above 1/0.9 can't push train past the test boundary
    let eof_val = eof_val.min(len);
    (eof_train.min(eof_val), eof_val)
}

/// Shuffle `items` with `seed` and split them by position.
pub fn split_partitions<T>(mut items: Vec<T>, split_ratio: f64, seed: u64) -> Splits<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let total = items.len();
    let (eof_train, eof_val) = split_bounds(total, split_ratio);

    // split_off(n) keeps [0..n) and returns [n..)
    let test = items.split_off(eof_val);
    let validation = items.split_off(eof_train);
    let train = items;

    tracing::debug!(
        "Corpus split: {} train, {} validation, {} test (split_ratio={})",
        train.len(),
        validation.len(),
        test.len(),
        split_ratio,
    );

    Splits { train, validation, test }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hundred_points_at_point_eight() {
        let s = split_partitions((0..100).collect::<Vec<usize>>(), 0.8, PARTITION_SEED);
        assert_eq!(s.train.len(), 72);
        assert_eq!(s.validation.len(), 18);
        assert_eq!(s.test.len(), 10);
    }

    #[test]
    fn test_all_items_preserved_and_disjoint() {
        let s = split_partitions((0..57).collect::<Vec<usize>>(), 0.7, PARTITION_SEED);
        let mut all: Vec<usize> = s
            .train
            .iter()
            .chain(&s.validation)
            .chain(&s.test)
            .copied()
            .collect();
        assert_eq!(all.len(), 57);
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 57);
    }

    #[test]
    fn test_same_seed_same_membership() {
        let a = split_partitions((0..40).collect::<Vec<usize>>(), 0.8, PARTITION_SEED);
        let b = split_partitions((0..40).collect::<Vec<usize>>(), 0.8, PARTITION_SEED);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_order_is_pinned() {
        let s = split_partitions((0..100).collect::<Vec<usize>>(), 0.8, PARTITION_SEED);
        assert_eq!(&s.train[..8], &[81, 3, 29, 76, 61, 36, 28, 59]);

        let s = split_partitions((0..10).collect::<Vec<usize>>(), 1.0, PARTITION_SEED);
        let flat: Vec<usize> = s.train.iter().chain(&s.validation).chain(&s.test).copied().collect();
        assert_eq!(flat, vec![4, 9, 5, 3, 7, 6, 1, 8, 2, 0]);
    }

    #[test]
    fn test_order_is_shuffled() {
        let s = split_partitions((0..50).collect::<Vec<usize>>(), 1.0, PARTITION_SEED);
        let flat: Vec<usize> = s.train.iter().chain(&s.validation).chain(&s.test).copied().collect();
        assert_ne!(flat, (0..50).collect::<Vec<usize>>());
    }

    #[test]
    fn test_empty_corpus() {
        let s = split_partitions(Vec::<usize>::new(), 0.8, PARTITION_SEED);
        assert!(s.train.is_empty() && s.validation.is_empty() && s.test.is_empty());
    }

    #[test]
    fn test_bounds_clamped_for_large_ratio() {
        assert_eq!(split_bounds(10, 2.0), (9, 9));
    }
}
