//! Archive dumps: the data dictionary plus raw rows per dictionary id, as exported from the
//! simulation's SQL output.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use eplus_ts::ingest::{parse_rows, rows_to_points};
use eplus_ts::{DictionaryEntry, Frequency, Series};
use rayon::prelude::*;
use serde::Deserialize;
use serde_json::Value as JsonValue;

#[derive(Debug, Deserialize)]
pub struct Archive {
    pub dictionary: Vec<DictionaryEntry>,
    /// Rows keyed by dictionary id (JSON object keys are strings).
    #[serde(default)]
    pub data: HashMap<String, JsonValue>,
}

impl Archive {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read archive {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("{} is not a valid archive dump", path.display()))
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn entry(&self, id: i64) -> Option<&DictionaryEntry> {
        self.dictionary.iter().find(|e| e.id == id)
    }

    /// Materialize one series; `index` picks its palette colour.
    pub fn series(&self, id: i64, index: usize) -> Result<Series> {
        let entry = self
            .entry(id)
            .ok_or_else(|| anyhow!("dictionary has no entry with id {}", id))?
            .clone();
        let points = match self.data.get(&id.to_string()) {
            Some(rows) => {
                let rows = parse_rows(entry.freq, rows.clone())
                    .with_context(|| format!("rows of id {} ({})", id, entry.name))?;
                rows_to_points(&rows).with_context(|| format!("rows of id {}", id))?
            }
            None => Vec::new(),
        };
        Ok(Series::new(entry, points, index))
    }

    /// Materialize `ids` in parallel, keeping the requested order.
    pub fn select(&self, ids: &[i64]) -> Result<Vec<Series>> {
        ids.par_iter()
            .enumerate()
            .map(|(index, &id)| self.series(id, index))
            .collect()
    }
}

/// Frequency shared by every series of a selection.
pub fn base_frequency(series: &[Series]) -> Result<Frequency> {
    let first = series
        .first()
        .map(|s| s.freq())
        .ok_or_else(|| anyhow!("no series selected"))?;
    if let Some(other) = series.iter().find(|s| s.freq() != first) {
        return Err(anyhow!(
            "cannot mix {} and {} series (id {})",
            first,
            other.freq(),
            other.entry.id
        ));
    }
    Ok(first)
}
