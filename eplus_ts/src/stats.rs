//! Descriptive statistics over a value set.

use serde::{Deserialize, Serialize};

/// Summary of a value set. With no finite input only `count` (zero) is present; the
/// remaining fields are `None` and must be read as "no data", never as zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DescriptiveStats {
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p05: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl DescriptiveStats {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Linearly interpolated quantile of an ascending slice. `None` for an empty slice.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || p.is_nan() {
        return None;
    }
    let idx = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let value = sorted[lo] + (sorted[hi] - sorted[lo]) * (idx - lo as f64);
    Some(value.clamp(sorted[lo], sorted[hi]))
}

/// Arithmetic mean, zero for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn compute_stats(values: &[f64]) -> DescriptiveStats {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return DescriptiveStats::default();
    }
    sorted.sort_by(f64::total_cmp);

    let sum: f64 = sorted.iter().sum();
    let count = sorted.len();
    DescriptiveStats {
        count,
        sum: Some(sum),
        mean: Some(sum / count as f64),
        min: sorted.first().copied(),
        p05: quantile(&sorted, 0.05),
        median: quantile(&sorted, 0.5),
        p95: quantile(&sorted, 0.95),
        max: sorted.last().copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 1.0), Some(4.0));
        assert_relative_eq!(quantile(&sorted, 0.5).unwrap(), 2.5);
        assert_relative_eq!(quantile(&sorted, 0.25).unwrap(), 1.75);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&sorted, f64::NAN), None);
    }

    #[test]
    fn empty_after_filtering_reports_no_data() {
        let stats = compute_stats(&[f64::NAN, f64::INFINITY]);
        assert_eq!(stats.count, 0);
        assert!(stats.is_empty());
        assert_eq!(stats.sum, None);
        assert_eq!(stats.max, None);
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"count":0}"#);
    }

    #[test]
    fn summarizes_finite_values_only() {
        let stats = compute_stats(&[5.0, f64::NAN, 1.0, 3.0, 2.0, 4.0]);
        assert_eq!(stats.count, 5);
        assert_eq!(stats.sum, Some(15.0));
        assert_eq!(stats.mean, Some(3.0));
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.median, Some(3.0));
        assert_relative_eq!(stats.p05.unwrap(), 1.2);
        assert_relative_eq!(stats.p95.unwrap(), 4.8);
    }

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
    }

    proptest! {
        #[test]
        fn quantiles_are_ordered(values in proptest::collection::vec(-1.0e9f64..1.0e9, 1..200)) {
            let s = compute_stats(&values);
            let (min, p05, median, p95, max) = (
                s.min.unwrap(), s.p05.unwrap(), s.median.unwrap(), s.p95.unwrap(), s.max.unwrap(),
            );
            prop_assert!(min <= p05);
            prop_assert!(p05 <= median);
            prop_assert!(median <= p95);
            prop_assert!(p95 <= max);
        }
    }
}
