//! Ranking and regret of learning curves
//!
//! Curves are ranked by their value at the largest anchor. Regret bands
//! answer "if only the K best curves at anchor `a` were kept, how far is
//! their final value from the best final value?".

use super::topk::{top_k_indices, SortOrder};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Direction in which a metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMode {
    /// Lower is better (losses, error rates)
    Min,
    /// Higher is better (accuracy)
    Max,
}

impl RankMode {
    const fn order(self) -> SortOrder {
        match self {
            Self::Min => SortOrder::Ascending,
            Self::Max => SortOrder::Descending,
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Min => "min",
            Self::Max => "max",
        })
    }
}

impl FromStr for RankMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(Error::UnknownRankMode(other.to_string())),
        }
    }
}

/// How tied values share ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMethod {
    /// Distinct ranks, ties broken by position
    #[default]
    Ordinal,
    /// Ties share a rank; the next rank follows without a gap
    Dense,
    /// Ties share the smallest rank of their group
    Min,
}

impl FromStr for RankMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ordinal" => Ok(Self::Ordinal),
            "dense" => Ok(Self::Dense),
            "min" => Ok(Self::Min),
            other => Err(Error::InvalidConfig(format!(
                "unknown rank method '{other}' should be 'ordinal', 'dense' or 'min'"
            ))),
        }
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
    if scale.is_finite() {
        (value * scale).round() / scale
    } else {
        value
    }
}

// NaN sorts after every number
fn ascending(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    }
}

/// 1-based ranks of `values` (smallest first) after rounding to `decimals`
///
/// ```rust
/// use lcdb::analysis::ranking::{rank, RankMethod};
///
/// let values = [0.3, 0.1, 0.3, 0.2];
/// assert_eq!(rank(&values, 5, RankMethod::Ordinal), vec![3, 1, 4, 2]);
/// assert_eq!(rank(&values, 5, RankMethod::Dense), vec![3, 1, 3, 2]);
/// assert_eq!(rank(&values, 5, RankMethod::Min), vec![3, 1, 3, 2]);
/// ```
#[must_use]
pub fn rank(values: &[f64], decimals: u32, method: RankMethod) -> Vec<usize> {
    let rounded: Vec<f64> = values.iter().map(|&v| round_to(v, decimals)).collect();
    let mut order: Vec<usize> = (0..rounded.len()).collect();
    order.sort_by(|&a, &b| ascending(rounded[a], rounded[b]));

    let mut ranks = vec![0; rounded.len()];
    let mut dense = 0;
    let mut group_start = 0;
    for (position, &index) in order.iter().enumerate() {
        let tied = position > 0 && ascending(rounded[order[position - 1]], rounded[index]) == Ordering::Equal;
        if !tied {
            dense += 1;
            group_start = position;
        }
        ranks[index] = match method {
            RankMethod::Ordinal => position + 1,
            RankMethod::Dense => dense,
            RankMethod::Min => group_start + 1,
        };
    }
    ranks
}

/// Rank curves by their last value, best curve first (rank 1)
///
/// # Errors
/// Returns `InvalidConfig` if a curve is empty
pub fn rank_curves(curves: &[Vec<f64>], mode: RankMode, method: RankMethod, decimals: u32) -> Result<Vec<usize>> {
    let last = curves
        .iter()
        .enumerate()
        .map(|(i, curve)| {
            let value = curve
                .last()
                .ok_or_else(|| Error::InvalidConfig(format!("curve {i} is empty")))?;
            Ok(match mode {
                RankMode::Min => *value,
                RankMode::Max => -*value,
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(rank(&last, decimals, method))
}

/// Extend `values` to `max_len` by repeating its last element
///
/// An empty slice has nothing to repeat and comes back empty.
#[must_use]
pub fn pad_with_last<T: Clone>(values: &[T], max_len: usize) -> Vec<T> {
    let mut padded = values.to_vec();
    if let Some(last) = values.last() {
        padded.resize(max_len.max(values.len()), last.clone());
    }
    padded
}

/// Linearly interpolated quantile of sorted, NaN-free values
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    #[allow(clippy::cast_precision_loss)]
    let position = q * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lower, upper) = (position.floor() as usize, position.ceil() as usize);
    #[allow(clippy::cast_precision_loss)]
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Regret of top-k selection at every anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegretBands {
    /// Median regret per anchor
    pub median: Vec<f64>,
    /// 10% quantile per anchor
    pub lower: Vec<f64>,
    /// 90% quantile per anchor
    pub upper: Vec<f64>,
}

/// Regret of keeping the `topk` best curves at each anchor
///
/// Curves are padded with their last value to the longest curve. At anchor
/// `a` the `topk` best curves by their value at `a` are selected; their
/// regret is the gap between their final value and the best final value.
///
/// # Errors
/// Returns `InvalidConfig` if there are no curves, a curve is empty, or `topk` is zero
pub fn regret_from_topk(curves: &[Vec<f64>], topk: usize, mode: RankMode) -> Result<RegretBands> {
    if topk == 0 {
        return Err(Error::InvalidConfig("topk must be greater than 0".to_string()));
    }
    if curves.is_empty() {
        return Err(Error::InvalidConfig("no curves to compute regret from".to_string()));
    }
    if let Some(i) = curves.iter().position(Vec::is_empty) {
        return Err(Error::InvalidConfig(format!("curve {i} is empty")));
    }

    let max_len = curves.iter().map(Vec::len).max().unwrap_or(0);
    let padded: Vec<Vec<f64>> = curves.iter().map(|c| pad_with_last(c, max_len)).collect();
    let finals: Vec<f64> = padded.iter().map(|c| c[max_len - 1]).collect();
    let best = top_k_indices(&finals, 1, mode.order())
        .first()
        .map_or(f64::NAN, |&i| finals[i]);

    let mut bands = RegretBands {
        median: Vec::with_capacity(max_len),
        lower: Vec::with_capacity(max_len),
        upper: Vec::with_capacity(max_len),
    };
    for anchor in 0..max_len {
        let column: Vec<f64> = padded.iter().map(|c| c[anchor]).collect();
        let mut regrets: Vec<f64> = top_k_indices(&column, topk, mode.order())
            .into_iter()
            .map(|i| match mode {
                RankMode::Min => finals[i] - best,
                RankMode::Max => best - finals[i],
            })
            .filter(|r| !r.is_nan())
            .collect();
        regrets.sort_by(f64::total_cmp);
        bands.median.push(quantile(&regrets, 0.5));
        bands.lower.push(quantile(&regrets, 0.1));
        bands.upper.push(quantile(&regrets, 0.9));
    }
    Ok(bands)
}
