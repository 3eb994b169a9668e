/// Core data types for the Meetup group exporter.
///
/// This module defines the shared domain model imported by all other modules:
/// raw API records, normalized group records, the assembled dataset, and the
/// error type every stage reports through. It contains no I/O.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// API constants
// ---------------------------------------------------------------------------

/// Number of groups requested per page. A page shorter than this is the last.
pub const PAGE_SIZE: usize = 200;

/// Fields requested through the `only` query parameter.
pub const REQUESTED_FIELDS: &str =
    "category,created,id,city,join_mode,last_event,members,name,past_event_count,status,lat,lon";

/// Optional fields the API omits unless asked for through `fields`.
pub const EXTRA_FIELDS: &str = "last_event,past_event_count";

// ---------------------------------------------------------------------------
// Raw API types
// ---------------------------------------------------------------------------

/// A single group object as returned by the `find/groups` endpoint.
///
/// Scalars are typed; fields whose shape varies between records (nested
/// objects, counts that arrive as strings) stay as JSON until normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawGroup {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: Option<String>,
    pub members: Option<u64>,
    pub join_mode: Option<String>,
    pub category: Option<Value>,   // {"id": .., "name": "Tech", ..}
    pub created: Option<Value>,    // epoch millis, UTC
    pub past_event_count: Option<Value>,
    pub last_event: Option<Value>, // {"time", "utc_offset", "yes_rsvp_count"}
}

/// One batch of groups returned by a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based batch index; also the `offset` value that was requested.
    pub batch: u32,
    /// HTTP status the page arrived with.
    pub status: u16,
    pub groups: Vec<RawGroup>,
}

impl Page {
    /// A page holding fewer than `PAGE_SIZE` groups signals end of data.
    pub fn is_final(&self) -> bool {
        self.groups.len() < PAGE_SIZE
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normalized types
// ---------------------------------------------------------------------------

/// A timestamp column value after the timezone shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTime {
    /// Local wall-clock time expressed as epoch milliseconds (UTC + offset).
    Epoch(i64),
    /// A value that could not be read as an epoch; exported unconverted.
    Unparsed(String),
}

/// A group with nested fields flattened and timestamps shifted to local time.
///
/// Field order matches the export schema (`export::COLUMNS`).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecord {
    pub name: Option<String>,
    pub id: Option<i64>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub category: Option<String>,
    pub created: Option<LocalTime>,
    pub status: Option<String>,
    pub members: Option<u64>,
    pub join_mode: Option<String>,
    pub past_event_count: u64,
    pub last_event: Option<LocalTime>,
    pub last_rsvp: u64,
}

/// All normalized groups across every page, in retrieval order.
///
/// Records can only be appended by the normalizer; everything else gets
/// read-only access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<GroupRecord>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&mut self, records: Vec<GroupRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[GroupRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while fetching, normalizing, or exporting groups.
#[derive(Debug, Error)]
pub enum MeetupError {
    /// The API rejected the key (HTTP 401). Fatal only under the strict policy.
    #[error("Unauthorized: the API rejected the key (batch {batch})")]
    Unauthorized { batch: u32 },

    /// Non-200 status under the strict policy.
    #[error("HTTP error: {status} (batch {batch})")]
    HttpStatus { batch: u32, status: u16 },

    /// Connection-level failure; never retried.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The HTTP client timeout expired before a response arrived.
    #[error("Request timed out (batch {batch})")]
    Timeout { batch: u32 },

    /// A successful response body was not a JSON array of groups.
    #[error("Parse error in batch {batch}: {reason}")]
    Parse { batch: u32, reason: String },

    /// A field that must coerce cleanly did not.
    #[error("Malformed record in batch {batch}: field '{field}' {reason}")]
    MalformedRecord {
        batch: u32,
        field: &'static str,
        reason: String,
    },

    /// A non-empty page carried no timezone offset and the policy is `fail`.
    #[error("No UTC offset found in batch {batch} ({groups} groups without last_event.utc_offset)")]
    NoOffsetFound { batch: u32, groups: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Settings file error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, MeetupError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
