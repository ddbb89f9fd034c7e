//! CSV shaping of display series.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::units::convert_units;
use crate::{EngineError, Frequency, Series, TimePoint, UnitPreferences};

fn export_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Export(e.to_string())
}

fn timestamp_or_label(point: &TimePoint) -> String {
    let ts = point
        .x()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true));
    match (ts, point) {
        (Some(ts), _) => ts,
        (None, TimePoint::Labeled(p)) => p.x_label.clone(),
        (None, TimePoint::Hourly(p)) => p.label(),
    }
}

/// Plain decimal in the usual range, `1.5e+21` / `2e-7` style outside `[1e-6, 1e21)`.
fn value_cell(v: f64) -> String {
    let a = v.abs();
    if v.is_infinite() {
        return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if a == 0.0 || a.is_nan() || (1e-6..1e21).contains(&a) {
        return v.to_string();
    }
    let sci = format!("{v:e}");
    match sci.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => sci,
    }
}

fn write_rows<W: Write>(
    series: &[Series],
    base_freq: Frequency,
    prefs: &UnitPreferences,
    writer: &mut csv::Writer<W>,
) -> Result<(), EngineError> {
    let first_column = match base_freq {
        Frequency::Hourly => "datetime_utc",
        Frequency::Monthly => "label",
    };
    writer
        .write_record([first_column, "value", "series_id"])
        .map_err(export_err)?;

    for s in series {
        let id = s.entry.id.to_string();
        for point in &s.points {
            let value = convert_units(point.y(), s.units(), prefs);
            writer
                .write_record([timestamp_or_label(point), value_cell(value), id.clone()])
                .map_err(export_err)?;
        }
    }
    writer.flush().map_err(export_err)?;
    Ok(())
}

/// Render `series` as CSV, one row per point in input order, values in display units.
///
/// Points are written as given; resample before exporting if a coarser view is wanted.
pub fn export_csv(
    series: &[Series],
    base_freq: Frequency,
    prefs: &UnitPreferences,
) -> Result<String, EngineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_rows(series, base_freq, prefs, &mut writer)?;
    let bytes = writer.into_inner().map_err(export_err)?;
    String::from_utf8(bytes).map_err(export_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DictionaryEntry, HourlyPoint, LabeledPoint};

    fn entry(id: i64, units: &str, freq: Frequency) -> DictionaryEntry {
        DictionaryEntry {
            id,
            name: "Zone Air Temperature".into(),
            index_group: String::new(),
            units: units.into(),
            is_meter: 0,
            key: "ZONE, ONE".into(),
            freq,
            kind: None,
        }
    }

    #[test]
    fn hourly_rows_use_millisecond_timestamps() {
        let points = vec![TimePoint::Hourly(HourlyPoint {
            x: 946_684_800_000,
            y: 100.0,
            env: 1,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
        })];
        let series = vec![Series::new(entry(4, "C", Frequency::Hourly), points, 0)];
        let prefs = UnitPreferences {
            is_ip: true,
            ..UnitPreferences::default()
        };
        let csv = export_csv(&series, Frequency::Hourly, &prefs).unwrap();
        assert_eq!(csv, "datetime_utc,value,series_id\n2000-01-01T00:00:00.000Z,212,4\n");
    }

    #[test]
    fn labelled_rows_follow_series_order() {
        let labeled = |label: &str, y: f64| {
            TimePoint::Labeled(LabeledPoint {
                x_label: label.into(),
                y,
                x: None,
                env: Some(1),
            })
        };
        let series = vec![
            Series::new(
                entry(2, "J", Frequency::Monthly),
                vec![labeled("E1-M01", 1.5), labeled("E1-M02", 2.0)],
                0,
            ),
            Series::new(entry(9, "J", Frequency::Monthly), vec![labeled("E1-M01", 3.0)], 1),
        ];
        let csv = export_csv(&series, Frequency::Monthly, &UnitPreferences::default()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            [
                "label,value,series_id",
                "E1-M01,1.5,2",
                "E1-M02,2,2",
                "E1-M01,3,9",
            ]
        );
    }

    #[test]
    fn resampled_points_prefer_timestamp() {
        let series = vec![Series::new(
            entry(1, "J", Frequency::Hourly),
            vec![TimePoint::Labeled(LabeledPoint {
                x_label: "E1-M02".into(),
                y: 24.0,
                x: Some(949_363_200_000),
                env: Some(1),
            })],
            0,
        )];
        let csv = export_csv(&series, Frequency::Hourly, &UnitPreferences::default()).unwrap();
        assert!(csv.ends_with("2000-02-01T00:00:00.000Z,24,1\n"));
    }

    #[test]
    fn extreme_values_use_exponent_cells() {
        assert_eq!(value_cell(1e21), "1e+21");
        assert_eq!(value_cell(-1.5e22), "-1.5e+22");
        assert_eq!(value_cell(2e-7), "2e-7");
        assert_eq!(value_cell(1e20), "100000000000000000000");
        assert_eq!(value_cell(0.000001), "0.000001");
        assert_eq!(value_cell(0.0), "0");
        assert_eq!(value_cell(f64::NEG_INFINITY), "-Infinity");

        let series = vec![Series::new(
            entry(3, "W", Frequency::Hourly),
            vec![TimePoint::Hourly(HourlyPoint {
                x: 946_684_800_000,
                y: 3e21,
                env: 1,
                month: 1,
                day: 1,
                hour: 0,
                minute: 0,
            })],
            0,
        )];
        let csv = export_csv(&series, Frequency::Hourly, &UnitPreferences::default()).unwrap();
        assert_eq!(csv, "datetime_utc,value,series_id\n2000-01-01T00:00:00.000Z,3e+21,3\n");
    }

    #[test]
    fn empty_selection_is_header_only() {
        let csv = export_csv(&[], Frequency::Hourly, &UnitPreferences::default()).unwrap();
        assert_eq!(csv, "datetime_utc,value,series_id\n");
    }
}
