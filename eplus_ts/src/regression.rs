//! Least squares, degree days and temperature-response models.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resample::aggregate_values;
use crate::stats::mean;
use crate::units::{TempSi, KELVIN_OFFSET};
use crate::{AggregationMode, Frequency, TimePoint, UnitPreferences};

const PIVOT_EPS: f64 = 1e-12;

/// Solve `a · x = b` by Gauss–Jordan elimination with partial pivoting.
///
/// Returns `None` for a near-singular matrix (some pivot below `1e-12` in magnitude) or when
/// the shapes do not describe a square system.
pub fn solve_linear_system(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = a.len();
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }
    if n == 0 {
        return Some(Vec::new());
    }

    let mut m = Array2::<f64>::zeros((n, n + 1));
    for (i, row) in a.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            m[[i, j]] = v;
        }
        m[[i, n]] = b[i];
    }

    for col in 0..n {
        let mut pivot_row = col;
        for r in col + 1..n {
            if m[[r, col]].abs() > m[[pivot_row, col]].abs() {
                pivot_row = r;
            }
        }
        if pivot_row != col {
            for j in 0..=n {
                m.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = m[[col, col]];
        if pivot.is_nan() || pivot.abs() < PIVOT_EPS {
            debug!(col, pivot, "singular system");
            return None;
        }
        for j in col..=n {
            m[[col, j]] /= pivot;
        }

        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = m[[r, col]];
            if factor == 0.0 {
                continue;
            }
            for j in col..=n {
                m[[r, j]] -= factor * m[[col, j]];
            }
        }
    }

    Some(m.column(n).to_vec())
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DegreeDayPeriod {
    Daily,
    Monthly,
}

impl Default for DegreeDayPeriod {
    fn default() -> Self {
        DegreeDayPeriod::Daily
    }
}

/// Which degree-day terms enter a temperature-response model.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Heating,
    Cooling,
    Both,
}

impl Default for ResponseMode {
    fn default() -> Self {
        ResponseMode::Both
    }
}

impl ResponseMode {
    fn uses_heating(self) -> bool {
        matches!(self, ResponseMode::Heating | ResponseMode::Both)
    }

    fn uses_cooling(self) -> bool {
        matches!(self, ResponseMode::Cooling | ResponseMode::Both)
    }
}

/// Degree days of one bucket. `hdd`/`cdd` are in the display unit's difference scale;
/// `temp_c` is the bucket's mean temperature in °C.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DegreeDayRow {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    pub hdd: f64,
    pub cdd: f64,
    pub temp_c: f64,
}

struct Bucket {
    label: String,
    first_x: Option<i64>,
    values: Vec<f64>,
}

fn bucket_key(point: &TimePoint, monthly: bool) -> Option<String> {
    match point {
        TimePoint::Hourly(p) => {
            let dt = DateTime::<Utc>::from_timestamp_millis(p.x)?;
            let fmt = if monthly { "%Y-%m" } else { "%Y-%m-%d" };
            Some(dt.format(fmt).to_string())
        }
        TimePoint::Labeled(p) => Some(p.x_label.clone()),
    }
}

/// Group points by UTC day or month (hourly) or by label (already periodic), in
/// chronological order.
fn bucket_points(points: &[TimePoint], monthly: bool) -> Vec<Bucket> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Bucket> = Vec::new();
    for point in points {
        let Some(key) = bucket_key(point, monthly) else {
            continue;
        };
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(Bucket {
                label: key,
                first_x: None,
                values: Vec::new(),
            });
            buckets.len() - 1
        });
        let bucket = &mut buckets[slot];
        bucket.values.push(point.y());
        if let Some(x) = point.x() {
            bucket.first_x = Some(bucket.first_x.map_or(x, |cur| cur.min(x)));
        }
    }
    buckets.sort_by_key(|b| b.first_x);
    buckets
}

fn display_to_celsius(v: f64, prefs: &UnitPreferences) -> f64 {
    if prefs.is_ip {
        (v - 32.0) * 5.0 / 9.0
    } else if prefs.temp_si == TempSi::K {
        v - KELVIN_OFFSET
    } else {
        v
    }
}

fn celsius_difference_to_display(d: f64, prefs: &UnitPreferences) -> f64 {
    if prefs.is_ip {
        d * 9.0 / 5.0
    } else {
        d
    }
}

/// Heating and cooling degree days of display-unit temperatures against `base_temp_c`.
///
/// Daily buckets need an hourly source; with monthly data (or a monthly period) every
/// source month becomes one bucket.
pub fn compute_degree_days(
    points: &[TimePoint],
    base_temp_c: f64,
    period: DegreeDayPeriod,
    prefs: &UnitPreferences,
    base_freq: Frequency,
) -> Vec<DegreeDayRow> {
    let monthly = period == DegreeDayPeriod::Monthly || base_freq != Frequency::Hourly;
    bucket_points(points, monthly)
        .into_iter()
        .filter(|b| !b.values.is_empty())
        .map(|b| {
            let temps: Vec<f64> = b.values.iter().map(|&v| display_to_celsius(v, prefs)).collect();
            let avg = mean(&temps);
            DegreeDayRow {
                label: b.label,
                x: b.first_x,
                hdd: celsius_difference_to_display((base_temp_c - avg).max(0.0), prefs),
                cdd: celsius_difference_to_display((avg - base_temp_c).max(0.0), prefs),
                temp_c: avg,
            }
        })
        .collect()
}

/// Aggregate a load series into the same buckets [`compute_degree_days`] produces, keyed by
/// bucket label.
pub fn period_totals(
    points: &[TimePoint],
    period: DegreeDayPeriod,
    base_freq: Frequency,
    units: &str,
    agg: AggregationMode,
) -> BTreeMap<String, f64> {
    let monthly = period == DegreeDayPeriod::Monthly || base_freq != Frequency::Hourly;
    let mode = agg.resolve(units);
    bucket_points(points, monthly)
        .into_iter()
        .map(|b| {
            let total = aggregate_values(&b.values, mode);
            (b.label, total)
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
}

/// Ordinary least squares on `(x, y)` pairs.
pub fn linear_regression(points: &[(f64, f64)]) -> LinearFit {
    if points.is_empty() {
        return LinearFit::default();
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in points {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    let (slope, intercept) = if sxx == 0.0 {
        (0.0, mean_y)
    } else {
        let slope = sxy / sxx;
        (slope, mean_y - slope * mean_x)
    };

    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for &(x, y) in points {
        ss_tot += (y - mean_y) * (y - mean_y);
        let fit = slope * x + intercept;
        ss_res += (y - fit) * (y - fit);
    }
    let r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };
    LinearFit {
        slope,
        intercept,
        r2,
    }
}

/// `load = intercept + h·HDD + c·CDD`, with the unused term absent.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegressionModel {
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_coeff: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c_coeff: Option<f64>,
    pub r2: f64,
}

impl RegressionModel {
    pub fn predict(&self, hdd: f64, cdd: f64) -> f64 {
        self.intercept + self.h_coeff.unwrap_or(0.0) * hdd + self.c_coeff.unwrap_or(0.0) * cdd
    }
}

/// Fit loads against degree days, joining the two on bucket label.
///
/// `None` when fewer samples than coefficients remain or the normal equations are singular
/// (for example a mild climate with no heating days in heating mode).
pub fn fit_temperature_response(
    rows: &[DegreeDayRow],
    loads: &BTreeMap<String, f64>,
    mode: ResponseMode,
) -> Option<RegressionModel> {
    let samples: Vec<(&DegreeDayRow, f64)> = rows
        .iter()
        .filter_map(|row| loads.get(&row.label).map(|&load| (row, load)))
        .filter(|(row, load)| load.is_finite() && row.hdd.is_finite() && row.cdd.is_finite())
        .collect();

    let k = 1 + usize::from(mode.uses_heating()) + usize::from(mode.uses_cooling());
    if samples.len() < k {
        debug!(samples = samples.len(), k, "too few samples for temperature response");
        return None;
    }

    let mut design = Array2::<f64>::zeros((samples.len(), k));
    let mut target = Array1::<f64>::zeros(samples.len());
    for (i, (row, load)) in samples.iter().enumerate() {
        let mut col = 0;
        design[[i, col]] = 1.0;
        if mode.uses_heating() {
            col += 1;
            design[[i, col]] = row.hdd;
        }
        if mode.uses_cooling() {
            col += 1;
            design[[i, col]] = row.cdd;
        }
        target[i] = *load;
    }

    let xtx = design.t().dot(&design);
    let xty = design.t().dot(&target);
    let a: Vec<Vec<f64>> = xtx.axis_iter(Axis(0)).map(|r| r.to_vec()).collect();
    let coeffs = solve_linear_system(&a, &xty.to_vec())?;

    let mut iter = coeffs.into_iter();
    let intercept = iter.next()?;
    let h_coeff = if mode.uses_heating() { iter.next() } else { None };
    let c_coeff = if mode.uses_cooling() { iter.next() } else { None };
    let mut model = RegressionModel {
        intercept,
        h_coeff,
        c_coeff,
        r2: 0.0,
    };

    let mean = target.mean()?;
    let ss_tot: f64 = target.iter().map(|y| (y - mean) * (y - mean)).sum();
    let ss_res: f64 = samples
        .iter()
        .map(|(row, load)| {
            let e = load - model.predict(row.hdd, row.cdd);
            e * e
        })
        .sum();
    model.r2 = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };
    Some(model)
}
