//! Row normalization.
//!
//! Turns one delimited input file into a sequence of [`Row`]s: trimmed
//! values, empty strings collapsed to absent, fully-blank rows dropped, a
//! leading byte-order mark on the first header tolerated. Also scans the
//! batch for suspicious plate usage: the same (submitter_plate_id,
//! submitter_plate_well) pair claimed by more than one row.

use crate::IngestError;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// One normalized input row. Only non-empty fields are present.
#[derive(Debug, Clone, Default)]
pub struct Row {
    /// 1-based line number in the input file (the header is line 1).
    pub number: usize,
    values: BTreeMap<String, String>,
}

impl Row {
    pub fn from_pairs(number: usize, pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { number, values }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of this row with one field overridden (multi-valued parent
    /// resolution substitutes list elements through here).
    pub fn with(&self, field: &str, value: &str) -> Row {
        let mut copy = self.clone();
        copy.values.insert(field.to_string(), value.to_string());
        copy
    }

    /// Compact `field=value` rendering for fatal-error messages.
    pub fn render(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A normalized batch plus the warnings the scan produced.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub rows: Vec<Row>,
    pub warnings: Vec<String>,
}

pub fn read_rows_from_path(path: &Path, delimiter: u8) -> Result<NormalizedBatch, IngestError> {
    let file = std::fs::File::open(path)?;
    read_rows(file, delimiter)
}

pub fn read_rows<R: Read>(reader: R, delimiter: u8) -> Result<NormalizedBatch, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            // Excel exports routinely prepend a BOM to the first header.
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    let mut rows = Vec::new();
    for (index, record) in csv_reader.records().enumerate() {
        let record = record?;
        let pairs: Vec<(&str, &str)> = headers
            .iter()
            .map(String::as_str)
            .zip(record.iter())
            .collect();
        let row = Row::from_pairs(index + 2, &pairs);
        if row.is_empty() {
            continue;
        }
        rows.push(row);
    }

    let warnings = scan_plate_wells(&rows);
    Ok(NormalizedBatch { rows, warnings })
}

/// The same physical well claimed twice in one batch is operator error;
/// repeating a plate id alone is normal (a plate has 96 wells).
fn scan_plate_wells(rows: &[Row]) -> Vec<String> {
    let mut seen: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for row in rows {
        if let (Some(plate), Some(well)) =
            (row.get("submitter_plate_id"), row.get("submitter_plate_well"))
        {
            seen.entry((plate.to_string(), well.to_string()))
                .or_default()
                .push(row.number);
        }
    }
    let mut warnings = Vec::new();
    for ((plate, well), lines) in seen {
        if lines.len() > 1 {
            let lines = lines
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let message =
                format!("plate {plate} well {well} appears on more than one row (lines {lines})");
            tracing::warn!(%plate, %well, "repeated plate well in batch");
            warnings.push(message);
        }
    }
    warnings
}
