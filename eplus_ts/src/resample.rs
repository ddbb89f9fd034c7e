//! Frequency conversion: hourly to monthly/annual and monthly to annual.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::{AggregationMode, Frequency, LabeledPoint, ResampleMode, TimePoint};

/// Reduce a group of values. `Auto` averages here; callers resolve it against the unit
/// first via [`AggregationMode::resolve`]. NaN counts as zero.
pub fn aggregate_values(values: &[f64], mode: AggregationMode) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        let v = if v.is_nan() { 0.0 } else { v };
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    match mode {
        AggregationMode::Sum => sum,
        AggregationMode::Min => min,
        AggregationMode::Max => max,
        AggregationMode::Avg | AggregationMode::Auto => sum / values.len() as f64,
    }
}

fn period_label_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"E(\d+)-M(\d+)").expect("static regex"))
}

/// Parse `(env, month)` out of a label such as `E2-M07`.
pub fn parse_period_label(label: &str) -> Option<(u32, u32)> {
    let caps = period_label_pattern().captures(label)?;
    let env: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    if env == 0 || !(1..=12).contains(&month) {
        return None;
    }
    Some((env, month))
}

pub fn monthly_label(env: u32, month: u32) -> String {
    format!("E{}-M{:02}", env, month)
}

pub fn annual_label(env: u32) -> String {
    format!("E{}", env)
}

/// Chronological position of an env/month bucket.
fn monthly_ordinal(env: u32, month: u32) -> u64 {
    (env as u64 - 1) * 12 + (month as u64 - 1)
}

fn annual_ordinal(env: u32) -> u64 {
    env as u64 - 1
}

fn env_month(point: &TimePoint) -> Option<(u32, u32)> {
    match point {
        TimePoint::Hourly(p) => Some((p.env.max(1), p.month)),
        TimePoint::Labeled(p) => parse_period_label(&p.x_label),
    }
}

fn env_of(point: &TimePoint) -> Option<u32> {
    match point {
        TimePoint::Hourly(p) => Some(p.env.max(1)),
        TimePoint::Labeled(LabeledPoint { env: Some(env), .. }) if *env > 0 => Some(*env),
        TimePoint::Labeled(p) => parse_period_label(&p.x_label).map(|(env, _)| env),
    }
}

struct Group {
    label: String,
    env: u32,
    values: Vec<f64>,
    first_x: Option<i64>,
}

impl Group {
    fn new(label: String, env: u32) -> Self {
        Self {
            label,
            env,
            values: Vec::new(),
            first_x: None,
        }
    }

    fn push(&mut self, point: &TimePoint) {
        self.values.push(point.y());
        if let Some(x) = point.x() {
            self.first_x = Some(self.first_x.map_or(x, |cur| cur.min(x)));
        }
    }
}

/// Group points into ordinal-keyed buckets; the ordinal keeps `E1-M02` ahead of `E1-M10`.
fn group_points<F>(points: &[TimePoint], key: F) -> BTreeMap<u64, Group>
where
    F: Fn(&TimePoint) -> Option<(u64, String, u32)>,
{
    let mut groups: BTreeMap<u64, Group> = BTreeMap::new();
    for point in points {
        let Some((ordinal, label, env)) = key(point) else {
            continue;
        };
        groups
            .entry(ordinal)
            .or_insert_with(|| Group::new(label, env))
            .push(point);
    }
    groups
}

fn emit(groups: BTreeMap<u64, Group>, mode: AggregationMode) -> Vec<TimePoint> {
    groups
        .into_values()
        .map(|g| {
            TimePoint::Labeled(LabeledPoint {
                y: aggregate_values(&g.values, mode),
                x_label: g.label,
                x: g.first_x,
                env: Some(g.env),
            })
        })
        .collect()
}

fn to_monthly(points: &[TimePoint], mode: AggregationMode) -> Vec<TimePoint> {
    let groups = group_points(points, |p| {
        let (env, month) = env_month(p)?;
        if !(1..=12).contains(&month) {
            return None;
        }
        Some((monthly_ordinal(env, month), monthly_label(env, month), env))
    });
    emit(groups, mode)
}

fn to_annual(points: &[TimePoint], mode: AggregationMode) -> Vec<TimePoint> {
    let groups = group_points(points, |p| {
        let env = env_of(p)?;
        Some((annual_ordinal(env), annual_label(env), env))
    });
    emit(groups, mode)
}

/// Re-aggregate `points` (native frequency `from`) to the `to` granularity.
///
/// Same-frequency, `Original` and empty inputs are returned as-is without copying, as are
/// pairs with no meaningful aggregation (monthly to hourly).
pub fn resample_points<'a>(
    points: &'a [TimePoint],
    from: Frequency,
    to: ResampleMode,
    units: &str,
    agg: AggregationMode,
) -> Cow<'a, [TimePoint]> {
    if points.is_empty() || to.is_noop_for(from) {
        return Cow::Borrowed(points);
    }
    let mode = agg.resolve(units);

    match (from, to) {
        (Frequency::Hourly, ResampleMode::Monthly) => Cow::Owned(to_monthly(points, mode)),
        (Frequency::Hourly, ResampleMode::Annual) | (Frequency::Monthly, ResampleMode::Annual) => {
            Cow::Owned(to_annual(points, mode))
        }
        (from, to) => {
            debug!(?from, ?to, "resample pair has no aggregation; returning input");
            Cow::Borrowed(points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HourlyPoint;

    fn hourly(env: u32, month: u32, day: u32, hour: u32, y: f64) -> TimePoint {
        let x = crate::ingest::hourly_timestamp_ms(env, month, day, hour, 0).unwrap();
        TimePoint::Hourly(HourlyPoint {
            x,
            y,
            env,
            month,
            day,
            hour,
            minute: 0,
        })
    }

    fn monthly(env: u32, month: u32, y: f64) -> TimePoint {
        TimePoint::Labeled(LabeledPoint {
            x_label: monthly_label(env, month),
            y,
            x: None,
            env: None,
        })
    }

    fn one_day(value: f64) -> Vec<TimePoint> {
        (1..=24).map(|h| hourly(1, 3, 10, h, value)).collect()
    }

    #[test]
    fn aggregates() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(aggregate_values(&values, AggregationMode::Sum), 6.0);
        assert_eq!(aggregate_values(&values, AggregationMode::Avg), 2.0);
        assert_eq!(aggregate_values(&values, AggregationMode::Min), 1.0);
        assert_eq!(aggregate_values(&values, AggregationMode::Max), 3.0);
        assert_eq!(aggregate_values(&[], AggregationMode::Max), 0.0);
        assert_eq!(aggregate_values(&[f64::NAN, 2.0], AggregationMode::Sum), 2.0);
    }

    #[test]
    fn energy_sums_into_month() {
        let input = one_day(1.0);
        let out = resample_points(
            &input,
            Frequency::Hourly,
            ResampleMode::Monthly,
            "J",
            AggregationMode::Auto,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].y(), 24.0);
        match &out[0] {
            TimePoint::Labeled(p) => {
                assert_eq!(p.x_label, "E1-M03");
                assert_eq!(p.env, Some(1));
            }
            other => panic!("unexpected point {other:?}"),
        }
    }

    #[test]
    fn temperature_averages_into_month() {
        let input = one_day(10.0);
        let out = resample_points(
            &input,
            Frequency::Hourly,
            ResampleMode::Monthly,
            "C",
            AggregationMode::Auto,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].y(), 10.0);
    }

    #[test]
    fn months_come_out_in_calendar_order() {
        let points = vec![
            hourly(1, 10, 1, 1, 1.0),
            hourly(1, 2, 1, 1, 2.0),
            hourly(2, 1, 1, 1, 3.0),
            hourly(1, 10, 2, 1, 4.0),
        ];
        let out = resample_points(
            &points,
            Frequency::Hourly,
            ResampleMode::Monthly,
            "J",
            AggregationMode::Sum,
        );
        let labels: Vec<String> = out
            .iter()
            .map(|p| match p {
                TimePoint::Labeled(l) => l.x_label.clone(),
                TimePoint::Hourly(_) => String::new(),
            })
            .collect();
        assert_eq!(labels, ["E1-M02", "E1-M10", "E2-M01"]);
        assert_eq!(out[1].y(), 5.0);
    }

    #[test]
    fn group_carries_earliest_timestamp() {
        let points = vec![hourly(1, 5, 3, 4, 1.0), hourly(1, 5, 1, 1, 1.0)];
        let earliest = points[1].x();
        let out = resample_points(
            &points,
            Frequency::Hourly,
            ResampleMode::Annual,
            "W",
            AggregationMode::Auto,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].x(), earliest);
    }

    #[test]
    fn monthly_to_annual_parses_env_from_label() {
        let points = vec![
            monthly(2, 1, 5.0),
            monthly(1, 1, 1.0),
            monthly(1, 12, 2.0),
            TimePoint::Labeled(LabeledPoint {
                x_label: "garbage".into(),
                y: 100.0,
                x: None,
                env: None,
            }),
        ];
        let out = resample_points(
            &points,
            Frequency::Monthly,
            ResampleMode::Annual,
            "kWh",
            AggregationMode::Auto,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].y(), 3.0);
        assert_eq!(out[1].y(), 5.0);
    }

    #[test]
    fn identity_and_unsupported_pairs_borrow_input() {
        let points = one_day(1.0);
        for (from, to) in [
            (Frequency::Hourly, ResampleMode::Hourly),
            (Frequency::Hourly, ResampleMode::Original),
            (Frequency::Monthly, ResampleMode::Hourly),
            (Frequency::Monthly, ResampleMode::Monthly),
        ] {
            let out = resample_points(&points, from, to, "J", AggregationMode::Auto);
            assert!(matches!(out, Cow::Borrowed(_)), "{from:?} -> {to:?}");
            assert_eq!(out.len(), points.len());
        }
        let empty: Vec<TimePoint> = Vec::new();
        let out = resample_points(
            &empty,
            Frequency::Hourly,
            ResampleMode::Monthly,
            "J",
            AggregationMode::Auto,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn parses_period_labels() {
        assert_eq!(parse_period_label("E1-M03"), Some((1, 3)));
        assert_eq!(parse_period_label("E12-M11"), Some((12, 11)));
        assert_eq!(parse_period_label("E1-M13"), None);
        assert_eq!(parse_period_label("E1"), None);
    }
}
