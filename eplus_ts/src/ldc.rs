//! Load-duration curves.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::units::convert_units;
use crate::{EngineError, Frequency, Series, TimePoint, UnitPreferences};

/// One point of a duration curve: `x` is percent of time exceeded, `y` the value (or percent of
/// peak when normalized).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

/// Sort hourly values descending and spread them over `x ∈ [0, 100]`.
///
/// Monthly (labelled) input is rejected: twelve points do not describe a duration curve.
pub fn to_ldc(
    points: &[TimePoint],
    units: &str,
    prefs: &UnitPreferences,
    normalize: bool,
) -> Result<Vec<CurvePoint>, EngineError> {
    if points.iter().any(|p| !p.is_hourly()) {
        debug!("load-duration curve rejected labelled input");
        return Err(EngineError::UnsupportedFrequency(Frequency::Monthly));
    }

    let mut values: Vec<OrderedFloat<f64>> = points
        .iter()
        .map(|p| convert_units(p.y(), units, prefs))
        .filter(|v| v.is_finite())
        .map(OrderedFloat)
        .collect();
    if values.is_empty() {
        return Ok(Vec::new());
    }
    values.sort_by_key(|v| Reverse(*v));

    // percent of a negative peak would reverse the ordering
    let peak = values[0].0;
    if normalize && peak <= 0.0 {
        return Err(EngineError::NonPositivePeak);
    }

    let n = values.len();
    let span = (n - 1).max(1) as f64;
    Ok(values
        .into_iter()
        .enumerate()
        .map(|(i, v)| CurvePoint {
            x: if n == 1 { 0.0 } else { i as f64 / span * 100.0 },
            y: if normalize { v.0 / peak * 100.0 } else { v.0 },
        })
        .collect())
}

/// [`to_ldc`] for a whole series, checking the entry's native frequency first.
pub fn series_ldc(
    series: &Series,
    prefs: &UnitPreferences,
    normalize: bool,
) -> Result<Vec<CurvePoint>, EngineError> {
    if series.freq() != Frequency::Hourly {
        return Err(EngineError::UnsupportedFrequency(series.freq()));
    }
    to_ldc(&series.points, series.units(), prefs, normalize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HourlyPoint, LabeledPoint};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn hourly(values: &[f64]) -> Vec<TimePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                TimePoint::Hourly(HourlyPoint {
                    x: i as i64 * 3_600_000,
                    y,
                    env: 1,
                    month: 1,
                    day: 1,
                    hour: i as u32 + 1,
                    minute: 0,
                })
            })
            .collect()
    }

    #[test]
    fn sorts_descending_over_percent_axis() {
        let prefs = UnitPreferences::default();
        let curve = to_ldc(&hourly(&[2.0, 5.0, f64::NAN, 1.0, 4.0, 3.0]), "W", &prefs, false)
            .unwrap();
        let ys: Vec<f64> = curve.iter().map(|p| p.y).collect();
        assert_eq!(ys, [5.0, 4.0, 3.0, 2.0, 1.0]);
        assert_eq!(curve[0].x, 0.0);
        assert_eq!(curve[4].x, 100.0);
        assert_relative_eq!(curve[1].x, 25.0);
    }

    #[test]
    fn normalizes_to_peak() {
        let prefs = UnitPreferences::default();
        let curve = to_ldc(&hourly(&[10.0, 5.0]), "W", &prefs, true).unwrap();
        assert_eq!(curve[0].y, 100.0);
        assert_eq!(curve[1].y, 50.0);
    }

    #[test]
    fn non_positive_peak_cannot_normalize() {
        let prefs = UnitPreferences::default();
        assert_eq!(
            to_ldc(&hourly(&[0.0, 0.0]), "W", &prefs, true),
            Err(EngineError::NonPositivePeak)
        );
        assert_eq!(
            to_ldc(&hourly(&[-1.0, -2.0, -4.0]), "W", &prefs, true),
            Err(EngineError::NonPositivePeak)
        );
        assert!(to_ldc(&hourly(&[0.0, 0.0]), "W", &prefs, false).is_ok());
        let raw = to_ldc(&hourly(&[-1.0, -2.0, -4.0]), "W", &prefs, false).unwrap();
        let ys: Vec<f64> = raw.iter().map(|p| p.y).collect();
        assert_eq!(ys, [-1.0, -2.0, -4.0]);
    }

    #[test]
    fn mixed_sign_normalizes_against_positive_peak() {
        let prefs = UnitPreferences::default();
        let curve = to_ldc(&hourly(&[-5.0, 10.0, 0.0]), "W", &prefs, true).unwrap();
        let ys: Vec<f64> = curve.iter().map(|p| p.y).collect();
        assert_eq!(ys, [100.0, 0.0, -50.0]);
    }

    #[test]
    fn single_point_sits_at_zero() {
        let prefs = UnitPreferences::default();
        let curve = to_ldc(&hourly(&[7.0]), "W", &prefs, false).unwrap();
        assert_eq!(curve, vec![CurvePoint { x: 0.0, y: 7.0 }]);
        assert!(to_ldc(&[], "W", &prefs, true).unwrap().is_empty());
    }

    #[test]
    fn values_are_converted_for_display() {
        let prefs = UnitPreferences {
            is_ip: true,
            ..UnitPreferences::default()
        };
        let curve = to_ldc(&hourly(&[0.0, 100.0]), "C", &prefs, false).unwrap();
        assert_relative_eq!(curve[0].y, 212.0);
        assert_relative_eq!(curve[1].y, 32.0);
    }

    #[test]
    fn rejects_monthly_points() {
        let prefs = UnitPreferences::default();
        let points = vec![TimePoint::Labeled(LabeledPoint {
            x_label: "E1-M01".into(),
            y: 1.0,
            x: None,
            env: Some(1),
        })];
        assert_eq!(
            to_ldc(&points, "J", &prefs, false),
            Err(EngineError::UnsupportedFrequency(Frequency::Monthly))
        );
    }

    proptest! {
        #[test]
        fn curve_is_non_increasing(values in proptest::collection::vec(-1.0e6f64..1.0e6, 2..300)) {
            let prefs = UnitPreferences::default();
            let curve = to_ldc(&hourly(&values), "W", &prefs, false).unwrap();
            prop_assert_eq!(curve.len(), values.len());
            prop_assert_eq!(curve[0].x, 0.0);
            prop_assert!((curve[curve.len() - 1].x - 100.0).abs() < 1e-9);
            for pair in curve.windows(2) {
                prop_assert!(pair[0].y >= pair[1].y);
                prop_assert!(pair[0].x < pair[1].x);
            }
        }

        #[test]
        fn normalized_curve_is_non_increasing(
            values in proptest::collection::vec(-1.0e6f64..1.0e6, 2..300)
        ) {
            let prefs = UnitPreferences::default();
            match to_ldc(&hourly(&values), "W", &prefs, true) {
                Ok(curve) => {
                    prop_assert!((curve[0].y - 100.0).abs() < 1e-9);
                    for pair in curve.windows(2) {
                        prop_assert!(pair[0].y >= pair[1].y);
                    }
                }
                Err(err) => {
                    prop_assert_eq!(err, EngineError::NonPositivePeak);
                    prop_assert!(values.iter().all(|v| *v <= 0.0));
                }
            }
        }

        #[test]
        fn negative_values_never_normalize(
            values in proptest::collection::vec(-1.0e6f64..-1.0e-3, 1..100)
        ) {
            let prefs = UnitPreferences::default();
            prop_assert_eq!(
                to_ldc(&hourly(&values), "W", &prefs, true),
                Err(EngineError::NonPositivePeak)
            );
        }
    }
}
