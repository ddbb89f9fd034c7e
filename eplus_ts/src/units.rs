//! SI/IP unit classification and conversion.
//!
//! Raw unit strings come straight from the simulation export and are not normalized, so
//! classification is a case-insensitive token match. Every module that needs to know
//! whether a quantity is energy, power or temperature goes through [`unit_kind`].

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::TimePoint;

const JOULES_PER_BTU: f64 = 1055.06;
const JOULES_PER_WH: f64 = 3600.0;
pub(crate) const JOULES_PER_KWH: f64 = 3.6e6;
const JOULES_PER_MWH: f64 = 3.6e9;
const BTUH_PER_WATT: f64 = 3.412141633;
const BTUH_PER_TON: f64 = 12000.0;
pub(crate) const KELVIN_OFFSET: f64 = 273.15;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Energy,
    Power,
    Temperature,
    Other,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnergySi {
    #[serde(rename = "J")]
    J,
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "MWh")]
    MWh,
}

impl EnergySi {
    pub fn symbol(&self) -> &'static str {
        match self {
            EnergySi::J => "J",
            EnergySi::KWh => "kWh",
            EnergySi::MWh => "MWh",
        }
    }

    fn joules_per_unit(&self) -> f64 {
        match self {
            EnergySi::J => 1.0,
            EnergySi::KWh => JOULES_PER_KWH,
            EnergySi::MWh => JOULES_PER_MWH,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnergyIp {
    #[serde(rename = "BTU")]
    Btu,
    #[serde(rename = "kBTU")]
    KBtu,
    #[serde(rename = "MMBTU")]
    MmBtu,
}

impl EnergyIp {
    pub fn symbol(&self) -> &'static str {
        match self {
            EnergyIp::Btu => "BTU",
            EnergyIp::KBtu => "kBTU",
            EnergyIp::MmBtu => "MMBTU",
        }
    }

    fn btu_per_unit(&self) -> f64 {
        match self {
            EnergyIp::Btu => 1.0,
            EnergyIp::KBtu => 1e3,
            EnergyIp::MmBtu => 1e6,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerIp {
    #[serde(rename = "Btu/h")]
    BtuPerHour,
    #[serde(rename = "Tons")]
    Tons,
}

impl PowerIp {
    pub fn symbol(&self) -> &'static str {
        match self {
            PowerIp::BtuPerHour => "Btu/h",
            PowerIp::Tons => "tons",
        }
    }

    fn btuh_per_unit(&self) -> f64 {
        match self {
            PowerIp::BtuPerHour => 1.0,
            PowerIp::Tons => BTUH_PER_TON,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TempSi {
    C,
    K,
}

impl TempSi {
    pub fn symbol(&self) -> &'static str {
        match self {
            TempSi::C => "C",
            TempSi::K => "K",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TempIp {
    F,
}

impl TempIp {
    pub fn symbol(&self) -> &'static str {
        "F"
    }
}

/// Display unit choices for both unit systems. `is_ip` picks which half is active.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UnitPreferences {
    #[serde(rename = "isIP")]
    pub is_ip: bool,
    #[serde(rename = "energySI")]
    pub energy_si: EnergySi,
    #[serde(rename = "energyIP")]
    pub energy_ip: EnergyIp,
    #[serde(rename = "powerIP")]
    pub power_ip: PowerIp,
    #[serde(rename = "tempSI")]
    pub temp_si: TempSi,
    #[serde(rename = "tempIP")]
    pub temp_ip: TempIp,
}

impl Default for UnitPreferences {
    fn default() -> Self {
        Self {
            is_ip: false,
            energy_si: EnergySi::J,
            energy_ip: EnergyIp::KBtu,
            power_ip: PowerIp::BtuPerHour,
            temp_si: TempSi::C,
            temp_ip: TempIp::F,
        }
    }
}

impl UnitPreferences {
    /// Same sub-unit choices with the other unit system active.
    pub fn flipped(&self) -> Self {
        Self {
            is_ip: !self.is_ip,
            ..*self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TempScale {
    Celsius,
    Kelvin,
    Fahrenheit,
}

fn normalize(units: &str) -> String {
    units.trim().to_lowercase()
}

fn bare_watt_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `\b` after the `w` already rules out a following `h`.
    RE.get_or_init(|| Regex::new(r"\bw\b").expect("static regex"))
}

fn is_celsius(u: &str) -> bool {
    u == "c" || u.contains("celsius")
}

fn temp_scale(u: &str) -> Option<TempScale> {
    if is_celsius(u) {
        Some(TempScale::Celsius)
    } else if u == "k" || u.contains("kelvin") {
        Some(TempScale::Kelvin)
    } else if u == "f" || u.contains("fahrenheit") {
        Some(TempScale::Fahrenheit)
    } else {
        None
    }
}

/// Watts and friends, but never watt-hours.
fn is_watt_family(u: &str) -> bool {
    u.contains('w') && !u.contains("wh")
}

fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

fn celsius_to_si(c: f64, pref: TempSi) -> f64 {
    match pref {
        TempSi::C => c,
        TempSi::K => c + KELVIN_OFFSET,
    }
}

/// Classify a raw unit string.
pub fn unit_kind(units: &str) -> UnitKind {
    let u = normalize(units);
    if u.is_empty() {
        return UnitKind::Other;
    }
    if u.contains("wh") || u.contains("joule") || u == "j" {
        return UnitKind::Energy;
    }
    if u.contains("btu/h")
        || u.contains("btuh")
        || bare_watt_token().is_match(&u)
        || u.contains("watt")
        || u.contains("ton")
    {
        return UnitKind::Power;
    }
    if temp_scale(&u).is_some() {
        return UnitKind::Temperature;
    }
    UnitKind::Other
}

/// Whether values in `units` add up over time (energy) rather than average.
pub(crate) fn is_additive_unit(units: &str) -> bool {
    match unit_kind(units) {
        UnitKind::Energy => true,
        UnitKind::Power => false,
        _ => normalize(units).contains("btu"),
    }
}

/// Convert an energy value to Joules. `None` means the unit is not a recognized energy
/// unit and the value cannot join a common energy basis.
pub fn to_joules(value: f64, units: &str) -> Option<f64> {
    let u = normalize(units);
    if u.contains("mwh") {
        Some(value * JOULES_PER_MWH)
    } else if u.contains("kwh") {
        Some(value * JOULES_PER_KWH)
    } else if u.contains("wh") {
        Some(value * JOULES_PER_WH)
    } else if u.contains("joule") || u == "j" {
        Some(value)
    } else {
        None
    }
}

/// Convert a raw value into the active display system.
pub fn convert_units(value: f64, units: &str, prefs: &UnitPreferences) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let u = normalize(units);
    if u.is_empty() {
        return value;
    }
    let kind = unit_kind(&u);

    if prefs.is_ip {
        if is_celsius(&u) {
            return c_to_f(value);
        }
        match kind {
            UnitKind::Energy => {
                // Malformed energy units are taken to be Joules already.
                let joules = to_joules(value, &u).unwrap_or(value);
                joules / JOULES_PER_BTU / prefs.energy_ip.btu_per_unit()
            }
            UnitKind::Power => {
                let btuh = if is_watt_family(&u) {
                    value * BTUH_PER_WATT
                } else {
                    value
                };
                btuh / prefs.power_ip.btuh_per_unit()
            }
            UnitKind::Temperature => match temp_scale(&u) {
                Some(TempScale::Kelvin) => c_to_f(value - KELVIN_OFFSET),
                _ => value,
            },
            UnitKind::Other => value,
        }
    } else {
        match kind {
            UnitKind::Energy => {
                let joules = to_joules(value, &u).unwrap_or(value);
                joules / prefs.energy_si.joules_per_unit()
            }
            UnitKind::Temperature => {
                let c = match temp_scale(&u) {
                    Some(TempScale::Kelvin) => value - KELVIN_OFFSET,
                    Some(TempScale::Fahrenheit) => f_to_c(value),
                    _ => value,
                };
                celsius_to_si(c, prefs.temp_si)
            }
            UnitKind::Power | UnitKind::Other => value,
        }
    }
}

/// Unit symbol that [`convert_units`] output is expressed in.
pub fn convert_unit_label(units: &str, prefs: &UnitPreferences) -> String {
    let u = normalize(units);
    if u.is_empty() {
        return String::new();
    }
    let kind = unit_kind(&u);
    if prefs.is_ip {
        if is_celsius(&u) {
            return prefs.temp_ip.symbol().to_string();
        }
        match kind {
            UnitKind::Energy => prefs.energy_ip.symbol().to_string(),
            UnitKind::Power => prefs.power_ip.symbol().to_string(),
            UnitKind::Temperature => prefs.temp_ip.symbol().to_string(),
            UnitKind::Other => units.to_string(),
        }
    } else {
        match kind {
            UnitKind::Energy => prefs.energy_si.symbol().to_string(),
            UnitKind::Temperature => prefs.temp_si.symbol().to_string(),
            UnitKind::Power | UnitKind::Other => units.to_string(),
        }
    }
}

/// Axis label for the inactive unit system, empty when there is no counterpart.
pub fn convert_unit_label_opposite(units: &str, prefs: &UnitPreferences) -> String {
    let label = match (unit_kind(units), prefs.is_ip) {
        (UnitKind::Energy, true) => prefs.energy_si.symbol(),
        (UnitKind::Power, true) => "W",
        (UnitKind::Temperature, true) => prefs.temp_si.symbol(),
        (UnitKind::Energy, false) => prefs.energy_ip.symbol(),
        (UnitKind::Power, false) => prefs.power_ip.symbol(),
        (UnitKind::Temperature, false) => prefs.temp_ip.symbol(),
        (UnitKind::Other, _) => "",
    };
    label.to_string()
}

/// Map a value already shown in the active system onto the inactive one (secondary axis).
///
/// For a raw value in the canonical unit of its kind this is exactly
/// `convert_units(raw, orig_units, &prefs.flipped())`, so converting a raw value and then
/// passing it through here recovers it up to rounding.
pub fn convert_displayed_to_opposite(v: f64, orig_units: &str, prefs: &UnitPreferences) -> f64 {
    if !v.is_finite() {
        return v;
    }
    match unit_kind(orig_units) {
        UnitKind::Energy => {
            if prefs.is_ip {
                let joules = v * prefs.energy_ip.btu_per_unit() * JOULES_PER_BTU;
                joules / prefs.energy_si.joules_per_unit()
            } else {
                let joules = v * prefs.energy_si.joules_per_unit();
                joules / JOULES_PER_BTU / prefs.energy_ip.btu_per_unit()
            }
        }
        UnitKind::Power => {
            if prefs.is_ip {
                v * prefs.power_ip.btuh_per_unit() / BTUH_PER_WATT
            } else {
                v * BTUH_PER_WATT / prefs.power_ip.btuh_per_unit()
            }
        }
        UnitKind::Temperature => {
            if prefs.is_ip {
                celsius_to_si(f_to_c(v), prefs.temp_si)
            } else {
                let c = match prefs.temp_si {
                    TempSi::C => v,
                    TempSi::K => v - KELVIN_OFFSET,
                };
                c_to_f(c)
            }
        }
        UnitKind::Other => v,
    }
}

/// Copies of `points` with values in display units.
pub fn convert_points(points: &[TimePoint], units: &str, prefs: &UnitPreferences) -> Vec<TimePoint> {
    points
        .iter()
        .map(|p| p.with_y(convert_units(p.y(), units, prefs)))
        .collect()
}

/// Display-unit values of `points`, non-finite ones included.
pub fn convert_values(points: &[TimePoint], units: &str, prefs: &UnitPreferences) -> Vec<f64> {
    points
        .iter()
        .map(|p| convert_units(p.y(), units, prefs))
        .collect()
}
