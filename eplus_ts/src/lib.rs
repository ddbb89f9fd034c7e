//! Time-series transformation and analysis engine for EnergyPlus SQL output archives.
//!
//! Every function in this crate is a pure computation over caller-supplied data: rows come
//! in from an external query layer, display-ready series, statistics, curves, regressions
//! and costs go out. Preferences are passed explicitly on every call.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod balance;
pub mod export;
pub mod format;
pub mod ingest;
pub mod ldc;
pub mod regression;
pub mod resample;
pub mod stats;
pub mod tariff;
pub mod units;

pub use balance::{compute_load_balance, LoadBalanceCategory, LoadBalanceRow};
pub use export::export_csv;
pub use ingest::{HourlyRow, MonthlyRow, Row, REFERENCE_YEAR};
pub use ldc::{to_ldc, CurvePoint};
pub use regression::{
    compute_degree_days, fit_temperature_response, linear_regression, solve_linear_system,
    DegreeDayPeriod, DegreeDayRow, LinearFit, RegressionModel, ResponseMode,
};
pub use resample::{aggregate_values, resample_points};
pub use stats::{compute_stats, quantile, DescriptiveStats};
pub use tariff::{compute_tariff_cost, get_fuel_kind, FuelKind, TariffCost, TariffRates};
pub use units::{
    convert_displayed_to_opposite, convert_unit_label, convert_unit_label_opposite,
    convert_units, to_joules, unit_kind, UnitKind, UnitPreferences,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("operation requires hourly data, got {0}")]
    UnsupportedFrequency(Frequency),
    #[error("cannot normalize a curve whose peak is not positive")]
    NonPositivePeak,
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to format export: {0}")]
    Export(String),
}

/// Native reporting frequency of a dictionary entry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Frequency {
    Hourly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "Hourly",
            Frequency::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target granularity requested by the viewer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMode {
    Original,
    Hourly,
    Monthly,
    Annual,
}

impl Default for ResampleMode {
    fn default() -> Self {
        ResampleMode::Original
    }
}

impl ResampleMode {
    /// True when resampling `freq` data to this mode leaves it untouched.
    pub fn is_noop_for(&self, freq: Frequency) -> bool {
        matches!(
            (self, freq),
            (ResampleMode::Original, _)
                | (ResampleMode::Hourly, Frequency::Hourly)
                | (ResampleMode::Monthly, Frequency::Monthly)
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    Auto,
    Sum,
    Avg,
    Min,
    Max,
}

impl Default for AggregationMode {
    fn default() -> Self {
        AggregationMode::Auto
    }
}

impl AggregationMode {
    /// Resolve `Auto` against a raw unit string: additive (energy) units sum, everything
    /// else averages. Explicit modes pass through.
    pub fn resolve(self, units: &str) -> AggregationMode {
        match self {
            AggregationMode::Auto => {
                if units::is_additive_unit(units) {
                    AggregationMode::Sum
                } else {
                    AggregationMode::Avg
                }
            }
            other => other,
        }
    }
}

/// One reportable signal of an archive, as read from the data dictionary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DictionaryEntry {
    pub id: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IndexGroup", default)]
    pub index_group: String,
    #[serde(rename = "Units", default)]
    pub units: String,
    #[serde(rename = "IsMeter", default)]
    pub is_meter: u8,
    #[serde(default)]
    pub key: String,
    pub freq: Frequency,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl DictionaryEntry {
    pub fn is_meter(&self) -> bool {
        self.is_meter == 1
    }

    /// Name with the instance key appended, e.g. `Zone Mean Air Temperature [ZONE ONE]`.
    pub fn display_name(&self) -> String {
        if self.key.is_empty() {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, self.key)
        }
    }
}

/// A sample at hourly resolution. The grouping fields are kept next to the synthesized
/// timestamp because hour 24 and day rollover make recomputing them from `x` unreliable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HourlyPoint {
    /// UTC epoch milliseconds.
    pub x: i64,
    pub y: f64,
    pub env: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl HourlyPoint {
    pub fn label(&self) -> String {
        ingest::time_label(self.env, self.month, self.day, self.hour, self.minute)
    }
}

/// A sample identified by a period label: native monthly rows (`E1-M03`) and every
/// resampled output (`E1-M03`, `E1`).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LabeledPoint {
    pub x_label: String,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimePoint {
    Hourly(HourlyPoint),
    Labeled(LabeledPoint),
}

impl TimePoint {
    pub fn y(&self) -> f64 {
        match self {
            TimePoint::Hourly(p) => p.y,
            TimePoint::Labeled(p) => p.y,
        }
    }

    pub fn x(&self) -> Option<i64> {
        match self {
            TimePoint::Hourly(p) => Some(p.x),
            TimePoint::Labeled(p) => p.x,
        }
    }

    pub fn is_hourly(&self) -> bool {
        matches!(self, TimePoint::Hourly(_))
    }

    /// Copy of this point carrying a different value.
    pub fn with_y(&self, y: f64) -> TimePoint {
        match self {
            TimePoint::Hourly(p) => TimePoint::Hourly(HourlyPoint { y, ..p.clone() }),
            TimePoint::Labeled(p) => TimePoint::Labeled(LabeledPoint { y, ..p.clone() }),
        }
    }
}

const PALETTE: [&str; 20] = [
    "#1565c0", "#c62828", "#2e7d32", "#ed6c02", "#5e35b1", "#d81b60", "#00695c", "#ef6c00",
    "#1976d2", "#388e3c", "#f57c00", "#7b1fa2", "#c2185b", "#0097a7", "#fbc02d", "#455a64",
    "#6a1b9a", "#00796b", "#f9a825", "#424242",
];

/// Palette colour for the `index`-th selected series.
pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// A dictionary entry together with its materialized points.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub entry: DictionaryEntry,
    pub points: Vec<TimePoint>,
    pub color: String,
    pub visible: bool,
}

impl Series {
    pub fn new(entry: DictionaryEntry, points: Vec<TimePoint>, index: usize) -> Self {
        Self {
            entry,
            points,
            color: palette_color(index).to_string(),
            visible: true,
        }
    }

    pub fn units(&self) -> &str {
        &self.entry.units
    }

    pub fn freq(&self) -> Frequency {
        self.entry.freq
    }

    /// Same entry with its points replaced, e.g. after resampling.
    pub fn with_points(&self, points: Vec<TimePoint>) -> Series {
        Series {
            entry: self.entry.clone(),
            points,
            color: self.color.clone(),
            visible: self.visible,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DegreeDayConfig {
    /// Base temperature in °C.
    pub base_temp: f64,
    pub period: DegreeDayPeriod,
    pub mode: ResponseMode,
}

impl Default for DegreeDayConfig {
    fn default() -> Self {
        Self {
            base_temp: 18.0,
            period: DegreeDayPeriod::Daily,
            mode: ResponseMode::Both,
        }
    }
}

/// Viewer configuration threaded through every engine call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub units: UnitPreferences,
    pub tariff: TariffRates,
    pub resample: ResampleMode,
    pub aggregation: AggregationMode,
    pub normalize: bool,
    pub degree_days: DegreeDayConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            units: UnitPreferences::default(),
            tariff: TariffRates::default(),
            resample: ResampleMode::Original,
            aggregation: AggregationMode::Auto,
            normalize: false,
            degree_days: DegreeDayConfig::default(),
        }
    }
}

impl ExplorerConfig {
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        serde_json::from_str(text).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }
}

/// Resample a series to the configured granularity, leaving the input untouched.
pub fn resample_series(series: &Series, config: &ExplorerConfig) -> Series {
    let points = resample_points(
        &series.points,
        series.freq(),
        config.resample,
        series.units(),
        config.aggregation,
    );
    series.with_points(points.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(freq: Frequency) -> DictionaryEntry {
        DictionaryEntry {
            id: 7,
            name: "Zone Mean Air Temperature".into(),
            index_group: "Zone".into(),
            units: "C".into(),
            is_meter: 0,
            key: "ZONE ONE".into(),
            freq,
            kind: None,
        }
    }

    #[test]
    fn dictionary_entry_uses_export_field_names() {
        let json = r#"{"id":3,"Name":"Electricity:Facility","IndexGroup":"Facility:Electricity",
            "Units":"J","IsMeter":1,"key":"","freq":"Hourly","Type":"Sum"}"#;
        let parsed: DictionaryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, 3);
        assert!(parsed.is_meter());
        assert_eq!(parsed.freq, Frequency::Hourly);
        assert_eq!(parsed.kind.as_deref(), Some("Sum"));
        assert_eq!(parsed.display_name(), "Electricity:Facility");
    }

    #[test]
    fn resample_mode_noop_pairs() {
        assert!(ResampleMode::Original.is_noop_for(Frequency::Monthly));
        assert!(ResampleMode::Hourly.is_noop_for(Frequency::Hourly));
        assert!(ResampleMode::Monthly.is_noop_for(Frequency::Monthly));
        assert!(!ResampleMode::Monthly.is_noop_for(Frequency::Hourly));
        assert!(!ResampleMode::Annual.is_noop_for(Frequency::Monthly));
    }

    #[test]
    fn auto_aggregation_follows_unit_kind() {
        assert_eq!(AggregationMode::Auto.resolve("J"), AggregationMode::Sum);
        assert_eq!(AggregationMode::Auto.resolve("kWh"), AggregationMode::Sum);
        assert_eq!(AggregationMode::Auto.resolve("kBTU"), AggregationMode::Sum);
        assert_eq!(AggregationMode::Auto.resolve("C"), AggregationMode::Avg);
        assert_eq!(AggregationMode::Auto.resolve("Btu/h"), AggregationMode::Avg);
        assert_eq!(AggregationMode::Auto.resolve("J/kg"), AggregationMode::Avg);
        assert_eq!(AggregationMode::Max.resolve("J"), AggregationMode::Max);
    }

    #[test]
    fn with_y_leaves_original_point() {
        let point = TimePoint::Labeled(LabeledPoint {
            x_label: "E1-M01".into(),
            y: 1.0,
            x: None,
            env: Some(1),
        });
        let converted = point.with_y(33.8);
        assert_eq!(point.y(), 1.0);
        assert_eq!(converted.y(), 33.8);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let cfg = ExplorerConfig::from_json_str(r#"{"resample":"monthly","units":{"isIP":true}}"#)
            .unwrap();
        assert_eq!(cfg.resample, ResampleMode::Monthly);
        assert!(cfg.units.is_ip);
        assert_eq!(cfg.aggregation, AggregationMode::Auto);
        assert_eq!(cfg.degree_days.base_temp, 18.0);
        assert!(ExplorerConfig::from_json_str("[1,2]").is_err());
    }

    #[test]
    fn resample_series_keeps_entry_and_color() {
        let series = Series::new(
            entry(Frequency::Monthly),
            vec![TimePoint::Labeled(LabeledPoint {
                x_label: "E1-M01".into(),
                y: 4.0,
                x: None,
                env: None,
            })],
            2,
        );
        let config = ExplorerConfig {
            resample: ResampleMode::Annual,
            ..ExplorerConfig::default()
        };
        let annual = resample_series(&series, &config);
        assert_eq!(annual.entry, series.entry);
        assert_eq!(annual.color, palette_color(2));
        assert_eq!(annual.points.len(), 1);
        assert_eq!(annual.points[0].y(), 4.0);
    }
}
