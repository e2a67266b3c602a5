//! Analysis of persisted reports
//!
//! - [`query`]: tag-path lookups over a report's timer tree
//! - [`ranking`]: ranking curves by their final value and top-k regret
//! - [`topk`]: heap-based top-k index selection
//!
//! Plotting is left to external tools; everything here returns plain
//! vectors ready to be serialized.

pub mod query;
pub mod ranking;
pub mod topk;

pub use query::{
    anchor_values, anchors_children, epoch_values, metric_values_from_anchors,
    metric_values_from_epochs,
};
pub use ranking::{pad_with_last, rank, rank_curves, regret_from_topk, RankMethod, RankMode, RegretBands};
pub use topk::{top_k_indices, SortOrder};
