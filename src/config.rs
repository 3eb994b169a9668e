/// Runtime configuration for the exporter.
///
/// `Settings` comes from an optional `meetup.toml` next to the binary; every
/// field has a default so the file may be absent or partial. `QueryConfig`
/// carries the per-run search inputs gathered at start-up and is passed
/// explicitly into the paginator.

use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogLevel;
use crate::model::{MeetupError, Result};

pub const DEFAULT_SETTINGS_PATH: &str = "meetup.toml";
pub const DEFAULT_ENDPOINT: &str = "https://api.meetup.com/find/groups";

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "MEETUP_API_KEY";

pub const MAX_RADIUS_MILES: f64 = 100.0;

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// How non-200 responses are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusPolicy {
    /// Log 401 and other statuses, keep reading the body.
    #[default]
    Permissive,
    /// Any non-200 status aborts the run.
    Strict,
}

/// What to do with a non-empty page that has no `last_event.utc_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetPolicy {
    #[default]
    Fail,
    /// Leave timestamps in UTC for that page.
    Zero,
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub endpoint: String,
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub output_path: PathBuf,
    pub api_key_path: PathBuf,
    pub status_policy: StatusPolicy,
    pub offset_policy: OffsetPolicy,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_delay_ms: 250,
            timeout_secs: 30,
            output_path: PathBuf::from("meetup_groups.csv"),
            api_key_path: PathBuf::from("api_key.txt"),
            status_policy: StatusPolicy::default(),
            offset_policy: OffsetPolicy::default(),
            log_level: LogLevel::Info,
            log_file: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file
    /// does not exist. A file that exists but fails to parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(MeetupError::Config(format!(
                "Failed to read settings file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        if settings.timeout_secs == 0 {
            return Err(MeetupError::Config("timeout_secs must be greater than zero".into()));
        }
        Ok(settings)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Search inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub api_key: String,
    pub zipcode: String,
    /// Search radius in miles, 0.0 to 100.0 inclusive.
    pub radius: f64,
}

impl QueryConfig {
    pub fn new(api_key: impl Into<String>, zipcode: impl Into<String>, radius: f64) -> Result<Self> {
        let api_key = api_key.into().trim().to_string();
        let zipcode = zipcode.into().trim().to_string();

        if api_key.is_empty() {
            return Err(MeetupError::Config("API key is empty".into()));
        }
        if zipcode.is_empty() {
            return Err(MeetupError::Config("zipcode is empty".into()));
        }
        validate_radius(radius)?;

        Ok(Self { api_key, zipcode, radius })
    }
}

pub fn validate_radius(radius: f64) -> Result<f64> {
    if radius.is_finite() && (0.0..=MAX_RADIUS_MILES).contains(&radius) {
        Ok(radius)
    } else {
        Err(MeetupError::Config(format!(
            "radius must be between 0.0 and {:.1} miles, got {}",
            MAX_RADIUS_MILES, radius
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
