//! CSV export of the normalized dataset.
//!
//! The header is always written, even for an empty dataset, and always in
//! `COLUMNS` order. Timestamp columns are rendered as local calendar time;
//! values that are not a valid epoch are written as they arrived.

use chrono::DateTime;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::logging::Stage;
use crate::model::{Dataset, GroupRecord, LocalTime, Result};

/// Output schema, in column order.
pub const COLUMNS: [&str; 13] = [
    "name",
    "id",
    "city",
    "lat",
    "lon",
    "category",
    "created",
    "status",
    "members",
    "join_mode",
    "past_event_count",
    "last_event",
    "last_rsvp",
];

/// One CSV line. Field order must match `COLUMNS`.
#[derive(Debug, Serialize, PartialEq)]
struct CsvRow<'a> {
    name: Option<&'a str>,
    id: Option<i64>,
    city: Option<&'a str>,
    lat: Option<f64>,
    lon: Option<f64>,
    category: Option<&'a str>,
    created: Option<String>,
    status: Option<&'a str>,
    members: Option<u64>,
    join_mode: Option<&'a str>,
    past_event_count: u64,
    last_event: Option<String>,
    last_rsvp: u64,
}

impl<'a> From<&'a GroupRecord> for CsvRow<'a> {
    fn from(record: &'a GroupRecord) -> Self {
        Self {
            name: record.name.as_deref(),
            id: record.id,
            city: record.city.as_deref(),
            lat: record.lat,
            lon: record.lon,
            category: record.category.as_deref(),
            created: record.created.as_ref().map(format_local_time),
            status: record.status.as_deref(),
            members: record.members,
            join_mode: record.join_mode.as_deref(),
            past_event_count: record.past_event_count,
            last_event: record.last_event.as_ref().map(format_local_time),
            last_rsvp: record.last_rsvp,
        }
    }
}

/// Renders a local epoch as `YYYY-MM-DD HH:MM:SS`, with a six-digit
/// microsecond fraction when the value has a sub-second part. Out-of-range epochs fall back to the raw
/// number rather than failing the export.
pub fn format_local_time(time: &LocalTime) -> String {
    match time {
        LocalTime::Epoch(millis) => DateTime::from_timestamp_millis(*millis)
            .map(|dt| {
                let local = dt.naive_utc();
                let format = if millis.rem_euclid(1000) == 0 {
                    "%Y-%m-%d %H:%M:%S"
                } else {
                    "%Y-%m-%d %H:%M:%S%.6f"
                };
                local.format(format).to_string()
            })
            .unwrap_or_else(|| millis.to_string()),
        LocalTime::Unparsed(text) => text.clone(),
    }
}

/// Writes the dataset as CSV to `writer`. Returns the number of data rows.
pub fn export<W: Write>(dataset: &Dataset, writer: W) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    wtr.write_record(COLUMNS)?;
    for record in dataset.records() {
        wtr.serialize(CsvRow::from(record))?;
    }
    wtr.flush()?;

    Ok(dataset.len())
}

/// Writes the dataset to `path`, replacing any existing file.
pub fn export_to_path(dataset: &Dataset, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let rows = export(dataset, BufWriter::new(file))?;

    info!(stage = %Stage::Export, rows, path = %path.display(), "Exported dataset");
    Ok(rows)
}
