//! Turning query-layer rows into typed time points.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::resample::monthly_label;
use crate::{EngineError, Frequency, HourlyPoint, LabeledPoint, TimePoint};

/// Calendar year assigned to environment period 1; period `n` maps to `REFERENCE_YEAR + n - 1`.
pub const REFERENCE_YEAR: i32 = 2000;

fn default_day() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HourlyRow {
    pub value: f64,
    pub env: u32,
    pub month: u32,
    #[serde(default = "default_day")]
    pub day: u32,
    #[serde(default)]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MonthlyRow {
    pub value: f64,
    pub env: u32,
    pub month: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Row {
    Hourly(HourlyRow),
    Monthly(MonthlyRow),
}

fn check_period(env: u32, month: u32) -> Result<(), EngineError> {
    if env == 0 {
        return Err(EngineError::InvalidRow(format!("environment period {env} (must be >= 1)")));
    }
    if !(1..=12).contains(&month) {
        return Err(EngineError::InvalidRow(format!("month {month} outside 1..=12")));
    }
    Ok(())
}

/// UTC epoch milliseconds of an hourly reading.
///
/// Day, hour and minute are added as offsets from the first of the month, so `hour = 24`
/// lands on midnight of the next day and a day past month end rolls into the next month.
pub fn hourly_timestamp_ms(
    env: u32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Result<i64, EngineError> {
    check_period(env, month)?;
    let year = i32::try_from(env)
        .ok()
        .and_then(|e| REFERENCE_YEAR.checked_add(e - 1))
        .ok_or_else(|| EngineError::InvalidRow(format!("environment period {env} out of range")))?;
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::InvalidRow(format!("no calendar date {year}-{month:02}")))?;
    let naive = first
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::days(i64::from(day.max(1)) - 1))
        .and_then(|t| t.checked_add_signed(Duration::hours(i64::from(hour))))
        .and_then(|t| t.checked_add_signed(Duration::minutes(i64::from(minute))))
        .ok_or_else(|| {
            EngineError::InvalidRow(format!(
                "env {env} {month:02}/{day} {hour}:{minute:02} is past the calendar range"
            ))
        })?;
    Ok(Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// Human label of an hourly reading, e.g. `Env 1, 01/15 13:00`.
pub fn time_label(env: u32, month: u32, day: u32, hour: u32, minute: u32) -> String {
    format!("Env {env}, {month:02}/{day:02} {hour:02}:{minute:02}")
}

pub fn to_hourly_points(rows: &[HourlyRow]) -> Result<Vec<TimePoint>, EngineError> {
    rows.iter()
        .map(|r| -> Result<TimePoint, EngineError> {
            Ok(TimePoint::Hourly(HourlyPoint {
                x: hourly_timestamp_ms(r.env, r.month, r.day, r.hour, r.minute)?,
                y: r.value,
                env: r.env,
                month: r.month,
                day: r.day,
                hour: r.hour,
                minute: r.minute,
            }))
        })
        .collect()
}

pub fn to_monthly_points(rows: &[MonthlyRow]) -> Result<Vec<TimePoint>, EngineError> {
    rows.iter()
        .map(|r| -> Result<TimePoint, EngineError> {
            check_period(r.env, r.month)?;
            Ok(TimePoint::Labeled(LabeledPoint {
                x_label: monthly_label(r.env, r.month),
                y: r.value,
                x: None,
                env: Some(r.env),
            }))
        })
        .collect()
}

pub fn rows_to_points(rows: &[Row]) -> Result<Vec<TimePoint>, EngineError> {
    let mut points = Vec::with_capacity(rows.len());
    for row in rows {
        let point = match row {
            Row::Hourly(r) => to_hourly_points(std::slice::from_ref(r))?,
            Row::Monthly(r) => to_monthly_points(std::slice::from_ref(r))?,
        };
        points.extend(point);
    }
    Ok(points)
}

/// Decode a JSON array of rows in the shape the query layer returns for `freq`.
/// Unknown columns are ignored.
pub fn parse_rows(freq: Frequency, value: serde_json::Value) -> Result<Vec<Row>, EngineError> {
    let invalid = |e: serde_json::Error| EngineError::InvalidRow(e.to_string());
    match freq {
        Frequency::Hourly => {
            let rows: Vec<HourlyRow> = serde_json::from_value(value).map_err(invalid)?;
            Ok(rows.into_iter().map(Row::Hourly).collect())
        }
        Frequency::Monthly => {
            let rows: Vec<MonthlyRow> = serde_json::from_value(value).map_err(invalid)?;
            Ok(rows.into_iter().map(Row::Monthly).collect())
        }
    }
}
