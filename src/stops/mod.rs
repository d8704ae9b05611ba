//! Static stop catalog read from a GTFS `stops.txt`.

pub mod search;

pub use search::StopSearch;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// One row of `stops.txt`. Columns not listed here are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
    #[serde(default)]
    pub location_type: Option<u8>,
    #[serde(default)]
    pub parent_station: Option<String>,
}

impl StopRecord {
    /// Parent stations and stand-alone stops; platforms point at a parent.
    pub fn is_station(&self) -> bool {
        self.parent_station.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Default)]
pub struct StopCatalog {
    stops: Vec<StopRecord>,
    by_id: HashMap<String, usize>,
    normalized_names: Vec<String>,
}

impl StopCatalog {
    pub fn from_records(stops: Vec<StopRecord>) -> Self {
        let by_id = stops
            .iter()
            .enumerate()
            .map(|(i, stop)| (stop.stop_id.clone(), i))
            .collect();
        let normalized_names = stops.iter().map(|s| s.stop_name.to_lowercase()).collect();
        Self {
            stops,
            by_id,
            normalized_names,
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut stops = Vec::new();
        for (line, result) in rdr.deserialize().enumerate() {
            let record: StopRecord =
                result.with_context(|| format!("invalid stop record at row {}", line + 1))?;
            stops.push(record);
        }
        Ok(Self::from_records(stops))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening stop catalog {}", path.display()))?;
        let catalog = Self::from_reader(file)?;
        info!(path = %path.display(), stops = catalog.len(), "Stop catalog loaded");
        Ok(catalog)
    }

    pub fn get(&self, stop_id: &str) -> Option<&StopRecord> {
        self.by_id.get(stop_id).map(|&i| &self.stops[i])
    }

    pub fn all(&self) -> &[StopRecord] {
        &self.stops
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Stations paired with their lowercased names.
    pub(crate) fn stations(&self) -> impl Iterator<Item = (&StopRecord, &str)> {
        self.stops
            .iter()
            .zip(&self.normalized_names)
            .filter(|(stop, _)| stop.is_station())
            .map(|(stop, name)| (stop, name.as_str()))
    }
}
