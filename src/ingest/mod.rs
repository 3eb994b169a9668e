/// Remote data sources.
///
/// - `meetup`: paged client for the `find/groups` endpoint.

pub mod meetup;
