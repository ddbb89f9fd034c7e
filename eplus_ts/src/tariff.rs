//! Energy and demand cost of meter series.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::units::{to_joules, JOULES_PER_KWH};
use crate::{DictionaryEntry, Frequency, Series, TimePoint};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FuelKind {
    Electricity,
    DistrictHeating,
    DistrictCooling,
    Other,
}

impl FuelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuelKind::Electricity => "electricity",
            FuelKind::DistrictHeating => "districtheating",
            FuelKind::DistrictCooling => "districtcooling",
            FuelKind::Other => "other",
        }
    }
}

/// Per-kWh energy rates by fuel plus the monthly per-kW-peak demand rate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TariffRates {
    #[serde(rename = "rateElec")]
    pub rate_elec: f64,
    #[serde(rename = "rateDH")]
    pub rate_dh: f64,
    #[serde(rename = "rateDC")]
    pub rate_dc: f64,
    #[serde(rename = "demandRate")]
    pub demand_rate: f64,
}

impl Default for TariffRates {
    fn default() -> Self {
        Self {
            rate_elec: 0.10,
            rate_dh: 0.06,
            rate_dc: 0.08,
            demand_rate: 12.0,
        }
    }
}

impl TariffRates {
    /// Energy rate for a fuel. Unlisted fuels bill at the electricity rate.
    pub fn energy_rate(&self, kind: FuelKind) -> f64 {
        match kind {
            FuelKind::DistrictHeating => self.rate_dh,
            FuelKind::DistrictCooling => self.rate_dc,
            FuelKind::Electricity | FuelKind::Other => self.rate_elec,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TariffCost {
    pub energy: f64,
    pub demand: f64,
    pub total: f64,
    pub kind: FuelKind,
}

/// Fuel billed by a meter. Variables (and missing metadata) are always `Other`.
pub fn get_fuel_kind(meta: Option<&DictionaryEntry>) -> FuelKind {
    let Some(meta) = meta.filter(|m| m.is_meter()) else {
        return FuelKind::Other;
    };
    let name = meta.name.to_lowercase();
    if name.contains("electric") {
        FuelKind::Electricity
    } else if name.contains("districtheating") || name.contains("district heating") {
        FuelKind::DistrictHeating
    } else if name.contains("districtcooling") || name.contains("district cooling") {
        FuelKind::DistrictCooling
    } else {
        FuelKind::Other
    }
}

/// Cost of an hourly energy series. `None` when the data is not hourly, empty, or not in an
/// energy unit.
///
/// Each hourly kWh reading is the average kW over that hour; demand is the peak of those per
/// UTC calendar month, charged for electricity only.
pub fn compute_tariff_cost(
    series: &Series,
    rates: &TariffRates,
    base_freq: Frequency,
) -> Option<TariffCost> {
    if base_freq != Frequency::Hourly || series.points.is_empty() {
        return None;
    }
    let units = series.units();
    let kind = get_fuel_kind(Some(&series.entry));

    let mut total_kwh = 0.0;
    let mut peaks: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for point in &series.points {
        let TimePoint::Hourly(p) = point else {
            debug!(id = series.entry.id, "tariff needs hourly points");
            return None;
        };
        let Some(joules) = to_joules(p.y, units) else {
            debug!(id = series.entry.id, units, "tariff needs an energy unit");
            return None;
        };
        let kwh = joules / JOULES_PER_KWH;
        total_kwh += kwh;

        let month = DateTime::<Utc>::from_timestamp_millis(p.x)
            .map(|dt| (dt.year(), dt.month()))
            .unwrap_or((1970, 1));
        let peak = peaks.entry(month).or_insert(0.0);
        if kwh > *peak {
            *peak = kwh;
        }
    }

    let energy = total_kwh * rates.energy_rate(kind);
    let demand = if kind == FuelKind::Electricity {
        peaks.values().map(|peak| peak * rates.demand_rate).sum::<f64>()
    } else {
        0.0
    };
    Some(TariffCost {
        energy,
        demand,
        total: energy + demand,
        kind,
    })
}
