//! Monthly load balance across signed categories.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::resample::{parse_period_label, resample_points};
use crate::units::convert_units;
use crate::{AggregationMode, ResampleMode, Series, TimePoint, UnitPreferences};

/// A group of signals that add (`sign = 1`) or remove (`sign = -1`) energy from the balance.
/// Sign 0 categories are reported for reference and left out of `net`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoadBalanceCategory {
    pub id: String,
    pub label: String,
    pub names: Vec<String>,
    pub sign: i8,
}

impl LoadBalanceCategory {
    /// Case-insensitive: does any of `names` occur in `signal_name`?
    pub fn matches_name(&self, signal_name: &str) -> bool {
        let name = signal_name.to_lowercase();
        self.names
            .iter()
            .any(|n| !n.is_empty() && name.contains(&n.to_lowercase()))
    }

    pub fn matches(&self, series: &Series) -> bool {
        self.matches_name(&series.entry.name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoadBalanceRow {
    pub label: String,
    pub values: BTreeMap<String, f64>,
    pub net: f64,
}

fn monthly_key(point: &TimePoint) -> Option<(u64, String)> {
    let TimePoint::Labeled(p) = point else {
        return None;
    };
    let (env, month) = parse_period_label(&p.x_label)?;
    Some((u64::from(env - 1) * 12 + u64::from(month - 1), p.x_label.clone()))
}

/// Sum every matching series, monthly and in display units, per category.
///
/// Series of different units are summed as-is after conversion, so callers should pass
/// energy series sharing one display unit.
pub fn compute_load_balance(
    series: &[Series],
    categories: &[LoadBalanceCategory],
    prefs: &UnitPreferences,
) -> Vec<LoadBalanceRow> {
    let mut months: BTreeMap<u64, LoadBalanceRow> = BTreeMap::new();

    for category in categories {
        let multiplier = if category.sign == 0 {
            1.0
        } else {
            f64::from(category.sign.signum())
        };
        for s in series.iter().filter(|s| category.matches(s)) {
            let monthly = resample_points(
                &s.points,
                s.freq(),
                ResampleMode::Monthly,
                s.units(),
                AggregationMode::Auto,
            );
            for point in monthly.iter() {
                let Some((ordinal, label)) = monthly_key(point) else {
                    continue;
                };
                let value = convert_units(point.y(), s.units(), prefs) * multiplier;
                let row = months.entry(ordinal).or_insert_with(|| LoadBalanceRow {
                    label,
                    values: BTreeMap::new(),
                    net: 0.0,
                });
                *row.values.entry(category.id.clone()).or_insert(0.0) += value;
            }
        }
    }

    let mut rows: Vec<LoadBalanceRow> = months.into_values().collect();
    for row in &mut rows {
        let mut net = 0.0;
        for category in categories {
            let value = *row.values.entry(category.id.clone()).or_insert(0.0);
            if category.sign != 0 {
                net += value;
            }
        }
        row.net = net;
    }
    debug!(months = rows.len(), categories = categories.len(), "load balance");
    rows
}
