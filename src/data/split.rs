//! Train/valid/test partitioning
//!
//! The test set is drawn first from the full index set with `test_seed`;
//! the validation set is then drawn from the remainder with `valid_seed`.
//! Changing one seed therefore never moves the other partition's draw.
//!
//! Sizes are `round(prop * n)` of the *full* dataset for both held-out
//! sets, so `n = 1000, test_prop = valid_prop = 0.1` always leaves 800
//! training instances.

use super::{Label, Matrix};
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seeds and proportions defining a split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Seed selecting the test partition
    pub test_seed: u64,
    /// Seed selecting the validation partition
    pub valid_seed: u64,
    /// Fraction of the dataset held out for testing
    pub test_prop: f64,
    /// Fraction of the dataset held out for validation
    pub valid_prop: f64,
    /// Preserve per-class proportions in both held-out sets
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_seed: 0,
            valid_seed: 0,
            test_prop: 0.1,
            valid_prop: 0.1,
            stratify: true,
        }
    }
}

impl SplitConfig {
    /// Check the proportions
    ///
    /// # Errors
    /// Returns `InvalidSplit` if a proportion is outside `[0, 1)` or
    /// `test_prop + valid_prop >= 1`
    pub fn validate(&self) -> Result<()> {
        for (name, prop) in [("test_prop", self.test_prop), ("valid_prop", self.valid_prop)] {
            if !prop.is_finite() || !(0.0..1.0).contains(&prop) {
                return Err(Error::InvalidSplit(format!(
                    "{name} must be in [0, 1), got {prop}"
                )));
            }
        }
        if self.test_prop + self.valid_prop >= 1.0 {
            return Err(Error::InvalidSplit(format!(
                "test_prop + valid_prop must be < 1, got {} + {}",
                self.test_prop, self.valid_prop
            )));
        }
        Ok(())
    }

    /// Number of training instances left from a dataset of `n` instances
    #[must_use]
    pub fn train_size(&self, n: usize) -> usize {
        n.saturating_sub(proportion_count(self.test_prop, n) + proportion_count(self.valid_prop, n))
    }
}

/// Index partition of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    train: Vec<usize>,
    valid: Vec<usize>,
    test: Vec<usize>,
}

impl Split {
    /// Partition `0..y.len()` according to `config`
    ///
    /// # Errors
    /// - `InvalidSplit` for bad proportions or an empty training set
    /// - `StratificationFailed` if a class is too small to stratify
    pub fn compute(y: &[Label], config: &SplitConfig) -> Result<Self> {
        config.validate()?;
        let n = y.len();
        let test_count = proportion_count(config.test_prop, n);
        let valid_count = proportion_count(config.valid_prop, n);
        if test_count + valid_count >= n {
            return Err(Error::InvalidSplit(format!(
                "{n} instances leave no training data after holding out {test_count} test and {valid_count} valid"
            )));
        }

        let all: Vec<usize> = (0..n).collect();
        let labels = config.stratify.then_some(y);
        let (test, rest) = hold_out(&all, test_count, config.test_seed, labels)?;
        let (valid, train) = hold_out(&rest, valid_count, config.valid_seed, labels)?;

        Ok(Self { train, valid, test })
    }

    /// Training indices
    #[must_use]
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    /// Validation indices
    #[must_use]
    pub fn valid(&self) -> &[usize] {
        &self.valid
    }

    /// Test indices
    #[must_use]
    pub fn test(&self) -> &[usize] {
        &self.test
    }
}

/// Materialized partitions
#[derive(Debug, Clone, PartialEq)]
pub struct SplitData {
    /// Training features
    pub x_train: Matrix,
    /// Validation features
    pub x_valid: Matrix,
    /// Test features
    pub x_test: Matrix,
    /// Training labels
    pub y_train: Vec<Label>,
    /// Validation labels
    pub y_valid: Vec<Label>,
    /// Test labels
    pub y_test: Vec<Label>,
}

/// Split features and labels into train/valid/test partitions
///
/// # Errors
/// - `ShapeMismatch` if `x` and `y` disagree on the number of instances
/// - see [`Split::compute`]
pub fn train_valid_test_split(x: &Matrix, y: &[Label], config: &SplitConfig) -> Result<SplitData> {
    if x.rows() != y.len() {
        return Err(Error::ShapeMismatch {
            context: "split inputs".to_string(),
            expected: x.rows(),
            actual: y.len(),
        });
    }
    let split = Split::compute(y, config)?;
    let gather = |idx: &[usize]| idx.iter().map(|&i| y[i].clone()).collect::<Vec<_>>();

    Ok(SplitData {
        x_train: x.select_rows(split.train()),
        x_valid: x.select_rows(split.valid()),
        x_test: x.select_rows(split.test()),
        y_train: gather(split.train()),
        y_valid: gather(split.valid()),
        y_test: gather(split.test()),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn proportion_count(prop: f64, n: usize) -> usize {
    (prop * n as f64).round() as usize
}

/// Draw `count` indices out of `pool`, returning `(selected, rest)`
fn hold_out(
    pool: &[usize],
    count: usize,
    seed: u64,
    labels: Option<&[Label]>,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let Some(labels) = labels else {
        let mut shuffled = pool.to_vec();
        shuffled.shuffle(&mut rng);
        let rest = shuffled.split_off(count);
        return Ok((shuffled, rest));
    };

    if count == 0 {
        let mut rest = pool.to_vec();
        rest.shuffle(&mut rng);
        return Ok((Vec::new(), rest));
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for &i in pool {
        by_class.entry(labels[i].as_str()).or_default().push(i);
    }

    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(Error::StratificationFailed(format!(
            "the least populated class '{label}' has only {} member(s), minimum is 2",
            members.len()
        )));
    }
    let n_classes = by_class.len();
    if count < n_classes || pool.len() - count < n_classes {
        return Err(Error::StratificationFailed(format!(
            "held-out size {count} and remainder {} must both be >= the number of classes {n_classes}",
            pool.len() - count
        )));
    }

    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    let quotas = allocate(&sizes, count, pool.len());

    let mut selected = Vec::with_capacity(count);
    let mut rest = Vec::with_capacity(pool.len() - count);
    for (members, quota) in by_class.into_values().zip(quotas) {
        let mut members = members;
        members.shuffle(&mut rng);
        rest.extend_from_slice(&members[quota..]);
        members.truncate(quota);
        selected.extend(members);
    }
    selected.shuffle(&mut rng);
    rest.shuffle(&mut rng);

    Ok((selected, rest))
}

/// Largest-remainder allocation of `count` draws over classes of the given sizes
fn allocate(sizes: &[usize], count: usize, total: usize) -> Vec<usize> {
    let mut quotas: Vec<usize> = sizes.iter().map(|&s| s * count / total).collect();
    let assigned: usize = quotas.iter().sum();

    // remainder numerators, larger first; ties keep class order
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by_key(|&c| std::cmp::Reverse(sizes[c] * count % total));

    for &c in order.iter().cycle().take(count - assigned) {
        quotas[c] += 1;
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n_per_class: &[(&str, usize)]) -> Vec<Label> {
        n_per_class
            .iter()
            .flat_map(|(l, n)| std::iter::repeat((*l).to_string()).take(*n))
            .collect()
    }

    #[test]
    fn test_split_sizes_thousand() {
        let y = labels(&[("a", 500), ("b", 500)]);
        let split = Split::compute(&y, &SplitConfig::default()).unwrap();
        assert_eq!(split.test().len(), 100);
        assert_eq!(split.valid().len(), 100);
        assert_eq!(split.train().len(), 800);
    }

    #[test]
    fn test_split_rejects_props_summing_to_one() {
        let y = labels(&[("a", 10)]);
        let config = SplitConfig {
            test_prop: 0.5,
            valid_prop: 0.5,
            stratify: false,
            ..SplitConfig::default()
        };
        assert!(matches!(
            Split::compute(&y, &config),
            Err(Error::InvalidSplit(_))
        ));
    }

    #[test]
    fn test_stratified_preserves_class_proportions() {
        let y = labels(&[("a", 300), ("b", 100)]);
        let config = SplitConfig {
            test_prop: 0.25,
            valid_prop: 0.25,
            ..SplitConfig::default()
        };
        let split = Split::compute(&y, &config).unwrap();
        let count_b = |idx: &[usize]| idx.iter().filter(|&&i| y[i] == "b").count();
        assert_eq!(count_b(split.test()), 25);
        assert_eq!(count_b(split.valid()), 25);
        assert_eq!(count_b(split.train()), 50);
    }

    #[test]
    fn test_stratified_rejects_singleton_class() {
        let y = labels(&[("a", 50), ("b", 1)]);
        assert!(matches!(
            Split::compute(&y, &SplitConfig::default()),
            Err(Error::StratificationFailed(_))
        ));
    }

    #[test]
    fn test_valid_seed_does_not_move_test_set() {
        let y = labels(&[("a", 60), ("b", 40)]);
        let base = SplitConfig::default();
        let s1 = Split::compute(&y, &base).unwrap();
        let s2 = Split::compute(
            &y,
            &SplitConfig {
                valid_seed: 7,
                ..base
            },
        )
        .unwrap();
        assert_eq!(s1.test(), s2.test());
        assert_ne!(s1.valid(), s2.valid());
    }

    #[test]
    fn test_allocate_sums_to_count() {
        let quotas = allocate(&[3, 3, 3], 4, 9);
        assert_eq!(quotas.iter().sum::<usize>(), 4);
    }
}
