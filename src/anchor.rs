//! Anchor schedules
//!
//! An anchor is a training-set size at which a workflow is fitted and
//! scored. The default schedule doubles from 16 and always closes on the
//! full training-set size: `max_size = 800` gives
//! `[16, 32, 64, 128, 256, 512, 800]`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Smallest anchor of the default schedule
pub const DEFAULT_MIN_ANCHOR: usize = 16;

/// Growth rule between consecutive anchors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Growth {
    /// `ceil(min * base^k)`; base 2 doubles, base `sqrt(2)` gives LCDB 1.0 style spacing
    Geometric {
        /// Multiplicative step, must be > 1
        base: f64,
    },
    /// `min + k * step`
    Linear {
        /// Additive step, must be > 0
        step: usize,
    },
}

/// Reproducible, strictly increasing sequence of training-set sizes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorSchedule {
    min_anchor: usize,
    growth: Growth,
}

impl Default for AnchorSchedule {
    fn default() -> Self {
        Self {
            min_anchor: DEFAULT_MIN_ANCHOR,
            growth: Growth::Geometric { base: 2.0 },
        }
    }
}

impl AnchorSchedule {
    /// Create a schedule
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `min_anchor` is zero or the growth step cannot grow
    pub fn new(min_anchor: usize, growth: Growth) -> Result<Self> {
        if min_anchor == 0 {
            return Err(Error::InvalidConfig(
                "minimum anchor must be positive".to_string(),
            ));
        }
        match growth {
            Growth::Geometric { base } if !(base.is_finite() && base > 1.0) => {
                Err(Error::InvalidConfig(format!(
                    "geometric anchor base must be > 1, got {base}"
                )))
            }
            Growth::Linear { step: 0 } => Err(Error::InvalidConfig(
                "linear anchor step must be positive".to_string(),
            )),
            _ => Ok(Self { min_anchor, growth }),
        }
    }

    /// Smallest anchor
    #[must_use]
    pub const fn min_anchor(&self) -> usize {
        self.min_anchor
    }

    /// Growth rule
    #[must_use]
    pub const fn growth(&self) -> Growth {
        self.growth
    }

    /// Anchors for a training set of `max_size` instances
    ///
    /// The last anchor is always `max_size`; when `max_size` is below the
    /// minimum anchor the schedule is `[max_size]`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `max_size` is zero
    ///
    /// # Example
    /// ```
    /// use lcdb::anchor::AnchorSchedule;
    ///
    /// # fn main() -> lcdb::Result<()> {
    /// let anchors = AnchorSchedule::default().anchors(800)?;
    /// assert_eq!(anchors, vec![16, 32, 64, 128, 256, 512, 800]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn anchors(&self, max_size: usize) -> Result<Vec<usize>> {
        if max_size == 0 {
            return Err(Error::InvalidConfig(
                "anchor schedule needs a positive training-set size".to_string(),
            ));
        }
        if max_size <= self.min_anchor {
            return Ok(vec![max_size]);
        }

        let mut anchors = Vec::new();
        let mut k: i32 = 0;
        loop {
            let next = self.anchor_at(k);
            k += 1;
            if next >= max_size {
                break;
            }
            // ceil on a small base can repeat a value
            if anchors.last().is_some_and(|&last| next <= last) {
                continue;
            }
            anchors.push(next);
        }
        anchors.push(max_size);
        Ok(anchors)
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn anchor_at(&self, k: i32) -> usize {
        match self.growth {
            // guard against powi rounding 32.000000000000007 up to 33
            Growth::Geometric { base } => {
                (self.min_anchor as f64 * base.powi(k) - 1e-9).ceil() as usize
            }
            Growth::Linear { step } => self.min_anchor + step * k as usize,
        }
    }
}

/// Default schedule for a training set of `max_size` instances
///
/// # Errors
/// Returns `InvalidConfig` if `max_size` is zero
pub fn get_anchor_schedule(max_size: usize) -> Result<Vec<usize>> {
    AnchorSchedule::default().anchors(max_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule_doubles() {
        assert_eq!(
            get_anchor_schedule(100).unwrap(),
            vec![16, 32, 64, 100]
        );
    }

    #[test]
    fn test_power_of_two_max_not_duplicated() {
        assert_eq!(get_anchor_schedule(64).unwrap(), vec![16, 32, 64]);
    }

    #[test]
    fn test_small_max_size_single_anchor() {
        assert_eq!(get_anchor_schedule(10).unwrap(), vec![10]);
        assert_eq!(get_anchor_schedule(16).unwrap(), vec![16]);
    }

    #[test]
    fn test_zero_max_size_rejected() {
        assert!(get_anchor_schedule(0).is_err());
    }

    #[test]
    fn test_sqrt2_schedule_strictly_increasing() {
        let schedule =
            AnchorSchedule::new(16, Growth::Geometric { base: std::f64::consts::SQRT_2 }).unwrap();
        let anchors = schedule.anchors(200).unwrap();
        assert_eq!(anchors[..4], [16, 23, 32, 46]);
        assert!(anchors.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*anchors.last().unwrap(), 200);
    }

    #[test]
    fn test_linear_schedule() {
        let schedule = AnchorSchedule::new(10, Growth::Linear { step: 25 }).unwrap();
        assert_eq!(schedule.anchors(70).unwrap(), vec![10, 35, 60, 70]);
    }

    #[test]
    fn test_invalid_growth_rejected() {
        assert!(AnchorSchedule::new(16, Growth::Geometric { base: 1.0 }).is_err());
        assert!(AnchorSchedule::new(16, Growth::Linear { step: 0 }).is_err());
        assert!(AnchorSchedule::new(0, Growth::Linear { step: 1 }).is_err());
    }
}
