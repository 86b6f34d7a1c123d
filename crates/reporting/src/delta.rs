//! Period-over-period KPI deltas.

use serde::{Deserialize, Serialize};

/// Absolute and percentage change between the current period and an
/// equal-length prior period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub delta_abs: Option<i64>,
    pub delta_pct: Option<f64>,
}

impl KpiDelta {
    /// Total over its documented domain — only well-defined `None` outputs,
    /// never a division error or an infinity.
    ///
    /// A missing value on either side means no trend can be computed, so
    /// both outputs are `None`. A zero baseline makes the percentage
    /// undefined: the absolute change is reported and the percentage stays
    /// `None` rather than pretending to be infinite or flat.
    pub fn compute(current: Option<u64>, previous: Option<u64>) -> Self {
        match (current, previous) {
            (Some(current), Some(0)) => Self {
                delta_abs: Some(current as i64),
                delta_pct: None,
            },
            (Some(current), Some(previous)) => Self {
                delta_abs: Some(current as i64 - previous as i64),
                delta_pct: Some(
                    ((current as f64 - previous as f64) / previous as f64 * 100.0).round(),
                ),
            },
            _ => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_on_either_side_yields_null() {
        assert_eq!(KpiDelta::compute(Some(5), None), KpiDelta::default());
        assert_eq!(KpiDelta::compute(None, Some(5)), KpiDelta::default());
        assert_eq!(KpiDelta::compute(None, None), KpiDelta::default());
    }

    #[test]
    fn test_zero_baseline_has_no_percentage() {
        let delta = KpiDelta::compute(Some(5), Some(0));
        assert_eq!(delta.delta_abs, Some(5));
        assert_eq!(delta.delta_pct, None);

        // Zero to zero: no change, still no percentage.
        let flat = KpiDelta::compute(Some(0), Some(0));
        assert_eq!(flat.delta_abs, Some(0));
        assert_eq!(flat.delta_pct, None);
    }

    #[test]
    fn test_percentage_is_rounded() {
        let up = KpiDelta::compute(Some(150), Some(100));
        assert_eq!(up.delta_abs, Some(50));
        assert_eq!(up.delta_pct, Some(50.0));

        let down = KpiDelta::compute(Some(2), Some(3));
        assert_eq!(down.delta_abs, Some(-1));
        assert_eq!(down.delta_pct, Some(-33.0));
    }
}
