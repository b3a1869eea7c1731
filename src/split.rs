//! Seeded, stratified train/test partitioning.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Row indices of each partition, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Test rows taken from a class of `n` rows. A class with at least two rows
/// keeps one row on each side whatever `test_size` rounds to.
fn class_test_count(n: usize, test_size: f64) -> usize {
    let k = (n as f64 * test_size).round() as usize;
    if n < 2 {
        k.min(n)
    } else {
        k.clamp(1, n - 1)
    }
}

/// Split `labels` per class: each class is shuffled with a ChaCha8 stream
/// seeded from `seed` and `round(n_class * test_size)` of it, clamped to
/// `1..=n_class - 1`, goes to test.
///
/// Identical labels and seed always give identical partitions.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> Split {
    let mut class0: Vec<usize> = Vec::new();
    let mut class1: Vec<usize> = Vec::new();
    for (i, &l) in labels.iter().enumerate() {
        if l == 0 {
            class0.push(i);
        } else {
            class1.push(i);
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    class0.shuffle(&mut rng);
    class1.shuffle(&mut rng);

    let test0 = class_test_count(class0.len(), test_size);
    let test1 = class_test_count(class1.len(), test_size);

    let mut test: Vec<usize> = class0[..test0]
        .iter()
        .chain(class1[..test1].iter())
        .copied()
        .collect();
    let mut train: Vec<usize> = class0[test0..]
        .iter()
        .chain(class1[test1..].iter())
        .copied()
        .collect();
    train.sort_unstable();
    test.sort_unstable();

    debug!(
        "split: train={} ({}+{}) test={} ({}+{})",
        train.len(),
        class0.len() - test0,
        class1.len() - test1,
        test.len(),
        test0,
        test1,
    );

    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(neg: usize, pos: usize) -> Vec<u8> {
        let mut v = vec![0u8; neg];
        v.extend(std::iter::repeat(1u8).take(pos));
        v
    }

    fn count_pos(idx: &[usize], labels: &[u8]) -> usize {
        idx.iter().filter(|&&i| labels[i] == 1).count()
    }

    #[test]
    fn preserves_class_ratio() {
        for (neg, pos) in [(8, 2), (90, 10), (3, 3), (101, 7), (2, 2)] {
            let y = labels(neg, pos);
            let s = stratified_split(&y, 0.25, 42);

            let train_pos = count_pos(&s.train, &y) as f64;
            let train_neg = (s.train.len() - count_pos(&s.train, &y)) as f64;
            assert!((train_pos - (0.75 * pos as f64).round()).abs() <= 1.0);
            assert!((train_neg - (0.75 * neg as f64).round()).abs() <= 1.0);
            assert_eq!(s.train.len() + s.test.len(), y.len());
        }
    }

    #[test]
    fn partitions_are_disjoint_and_cover() {
        let y = labels(37, 13);
        let s = stratified_split(&y, 0.25, 42);
        let mut all: Vec<usize> = s.train.iter().chain(&s.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..y.len()).collect::<Vec<_>>());
    }

    #[test]
    fn two_per_class_puts_one_on_each_side() {
        let y = labels(2, 2);
        let s = stratified_split(&y, 0.25, 0);
        assert_eq!(count_pos(&s.train, &y), 1);
        assert_eq!(count_pos(&s.test, &y), 1);
        assert_eq!(s.test.len(), 2);
    }

    #[test]
    fn extreme_test_sizes_keep_both_classes_on_both_sides() {
        for test_size in [0.1, 0.9] {
            for (neg, pos) in [(2, 2), (3, 2), (4, 4), (9, 3)] {
                let y = labels(neg, pos);
                let s = stratified_split(&y, test_size, 7);
                let (train_pos, test_pos) = (count_pos(&s.train, &y), count_pos(&s.test, &y));
                assert!(train_pos >= 1 && test_pos >= 1, "{test_size} {neg}/{pos}");
                assert!(s.train.len() > train_pos, "{test_size} {neg}/{pos}");
                assert!(s.test.len() > test_pos, "{test_size} {neg}/{pos}");
                assert_eq!(s.train.len() + s.test.len(), y.len());
            }
        }
    }

    #[test]
    fn clamping_leaves_large_classes_alone() {
        let y = labels(100, 50);
        let s = stratified_split(&y, 0.1, 3);
        assert_eq!(s.test.len(), 15);
        assert_eq!(count_pos(&s.test, &y), 5);
        assert_eq!(class_test_count(1, 0.9), 1);
        assert_eq!(class_test_count(0, 0.5), 0);
    }

    #[test]
    fn same_seed_same_split() {
        let y = labels(60, 20);
        assert_eq!(stratified_split(&y, 0.25, 42), stratified_split(&y, 0.25, 42));
        assert_ne!(
            stratified_split(&y, 0.25, 42).test,
            stratified_split(&y, 0.25, 43).test
        );
    }
}
