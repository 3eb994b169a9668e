//! Meetup group exporter.
//!
//! Drains the Meetup `find/groups` API page by page, shifts timestamps to
//! each page's local time, flattens nested fields and writes a fixed
//! 13-column CSV.

pub mod config;
pub mod credentials;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
