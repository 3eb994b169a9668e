/// Page normalization: raw API groups to flat, typed records.
///
/// Each page shares one UTC offset, taken from the first group whose
/// `last_event` carries `utc_offset`. Every group is then rebuilt as a new
/// `GroupRecord`: the category object collapses to its name, `created` and
/// `last_event.time` shift to local epoch milliseconds, and the RSVP count
/// moves to its own column. Raw groups are never modified.
///
/// Normalization consumes `RawGroup` and produces `GroupRecord`, so running
/// it twice over the same data is not expressible. A `category` that is
/// already a plain string is accepted unchanged.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::OffsetPolicy;
use crate::logging::Stage;
use crate::model::{Dataset, GroupRecord, LocalTime, MeetupError, Page, RawGroup, Result};

// ---------------------------------------------------------------------------
// Offset resolution
// ---------------------------------------------------------------------------

/// Scans the page once, in order, for the first `last_event.utc_offset`.
///
/// Groups whose `last_event` lacks an offset are skipped. Returns `Ok(None)`
/// when no group in the page carries one.
pub fn find_page_offset(page: &Page) -> Result<Option<i64>> {
    for group in &page.groups {
        let offset = group
            .last_event
            .as_ref()
            .and_then(|event| event.get("utc_offset"))
            .filter(|value| !value.is_null());

        if let Some(offset) = offset {
            return coerce_offset(offset, page.batch).map(Some);
        }
    }
    Ok(None)
}

/// Resolves the page offset, applying `policy` when none is present.
pub fn page_offset(page: &Page, policy: OffsetPolicy) -> Result<i64> {
    match find_page_offset(page)? {
        Some(offset) => Ok(offset),
        None => match policy {
            OffsetPolicy::Fail => Err(MeetupError::NoOffsetFound {
                batch: page.batch,
                groups: page.len(),
            }),
            OffsetPolicy::Zero => {
                warn!(
                    stage = %Stage::Normalize,
                    batch = page.batch + 1,
                    groups = page.len(),
                    "No UTC offset in batch; timestamps left in UTC"
                );
                Ok(0)
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Record normalization
// ---------------------------------------------------------------------------

/// Builds the flat record for one group using the page-wide `offset`.
pub fn normalize_group(raw: &RawGroup, offset: i64, batch: u32) -> Result<GroupRecord> {
    let category = match &raw.category {
        Some(value) => flatten_category(value, batch)?,
        None => None,
    };

    let created = raw
        .created
        .as_ref()
        .filter(|value| !value.is_null())
        .map(|value| shift_to_local(value, offset));

    let past_event_count = match &raw.past_event_count {
        Some(value) if !value.is_null() => coerce_count(value, batch, "past_event_count")?,
        _ => 0,
    };

    let (last_event, last_rsvp) = match &raw.last_event {
        Some(value) => flatten_last_event(value, offset, batch)?,
        None => (None, 0),
    };

    Ok(GroupRecord {
        name: raw.name.clone(),
        id: raw.id,
        city: raw.city.clone(),
        lat: raw.lat,
        lon: raw.lon,
        category,
        created,
        status: raw.status.clone(),
        members: raw.members,
        join_mode: raw.join_mode.clone(),
        past_event_count,
        last_event,
        last_rsvp,
    })
}

/// Normalizes every group in a page. An empty page needs no offset.
pub fn normalize_page(page: &Page, policy: OffsetPolicy) -> Result<Vec<GroupRecord>> {
    if page.is_empty() {
        return Ok(Vec::new());
    }

    let offset = page_offset(page, policy)?;
    info!(
        stage = %Stage::Normalize,
        batch = page.batch + 1,
        groups = page.len(),
        offset,
        "Normalizing batch"
    );

    page.groups
        .iter()
        .map(|group| normalize_group(group, offset, page.batch))
        .collect()
}

/// Normalizes all pages, in order, into one dataset.
pub fn normalize(pages: &[Page], policy: OffsetPolicy) -> Result<Dataset> {
    let mut dataset = Dataset::new();
    for page in pages {
        dataset.append(normalize_page(page, policy)?);
    }
    Ok(dataset)
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn flatten_category(value: &Value, batch: u32) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(name) => Ok(Some(name.clone())),
        Value::Object(fields) => match fields.get("name") {
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(Value::Null) => Ok(None),
            Some(other) => Err(malformed(batch, "category", format!("has a non-text name: {}", other))),
            None => Err(malformed(batch, "category", "has no name".to_string())),
        },
        other => Err(malformed(batch, "category", format!("is neither an object nor text: {}", other))),
    }
}

/// Returns the shifted event time and the "yes" RSVP count.
fn flatten_last_event(value: &Value, offset: i64, batch: u32) -> Result<(Option<LocalTime>, u64)> {
    match value {
        Value::Null => Ok((None, 0)),
        Value::Object(fields) => {
            let last_rsvp = match fields.get("yes_rsvp_count") {
                Some(count) if !count.is_null() => coerce_count(count, batch, "yes_rsvp_count")?,
                _ => 0,
            };
            let time = fields
                .get("time")
                .filter(|time| !time.is_null())
                .map(|time| shift_to_local(time, offset));
            Ok((time, last_rsvp))
        }
        other => Err(malformed(batch, "last_event", format!("is not an object: {}", other))),
    }
}

/// Adds the offset to an epoch value. Values that are not an epoch (or
/// would overflow) are kept as text for the exporter to pass through.
fn shift_to_local(value: &Value, offset: i64) -> LocalTime {
    epoch_millis(value)
        .and_then(|millis| millis.checked_add(offset))
        .map(LocalTime::Epoch)
        .unwrap_or_else(|| LocalTime::Unparsed(value_text(value)))
}

fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral_i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn coerce_offset(value: &Value, batch: u32) -> Result<i64> {
    epoch_millis(value)
        .ok_or_else(|| malformed(batch, "utc_offset", format!("is not an integer: {}", value)))
}

/// Counts must be non-negative whole numbers; numeric strings are accepted.
pub fn coerce_count(value: &Value, batch: u32, field: &'static str) -> Result<u64> {
    let parsed = match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().and_then(integral_i64).and_then(|v| u64::try_from(v).ok())),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .and_then(integral_i64)
                    .and_then(|v| u64::try_from(v).ok())
            })
        }
        _ => None,
    };

    parsed.ok_or_else(|| {
        malformed(batch, field, format!("is not a non-negative integer: {}", value))
    })
}

fn integral_i64(v: f64) -> Option<i64> {
    (v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64)
        .then_some(v as i64)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn malformed(batch: u32, field: &'static str, reason: String) -> MeetupError {
    MeetupError::MalformedRecord { batch, field, reason }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PAGE_SIZE;
    use serde_json::json;

    fn raw(value: Value) -> RawGroup {
        serde_json::from_value(value).unwrap()
    }

    fn page(batch: u32, groups: Vec<RawGroup>) -> Page {
        Page { batch, status: 200, groups }
    }

    /// Central European summer time: +2h.
    const CEST: i64 = 7_200_000;

    fn with_event(id: i64) -> RawGroup {
        raw(json!({
            "id": id,
            "name": "Rust Berlin",
            "created": 1_400_000_000_000_i64,
            "last_event": {"time": 1_500_000_000_000_i64, "utc_offset": CEST, "yes_rsvp_count": 31}
        }))
    }

    #[test]
    fn test_offset_applies_to_created_and_last_event() {
        let group = raw(json!({
            "created": 1000000,
            "last_event": {"time": 2000000, "utc_offset": 3600000, "yes_rsvp_count": "42"}
        }));
        let records = normalize_page(&page(0, vec![group]), OffsetPolicy::Fail).unwrap();

        assert_eq!(records[0].created, Some(LocalTime::Epoch(4_600_000)));
        assert_eq!(records[0].last_event, Some(LocalTime::Epoch(5_600_000)));
        assert_eq!(records[0].last_rsvp, 42);
    }

    #[test]
    fn test_category_object_flattens_to_name() {
        let group = raw(json!({"category": {"id": 34, "name": "Tech", "shortname": "tech"}}));
        let record = normalize_group(&group, 0, 0).unwrap();
        assert_eq!(record.category.as_deref(), Some("Tech"));
    }

    #[test]
    fn test_flat_category_is_left_alone() {
        let group = raw(json!({"category": "Tech"}));
        let record = normalize_group(&group, 0, 0).unwrap();
        assert_eq!(record.category.as_deref(), Some("Tech"));
    }

    #[test]
    fn test_category_without_name_is_malformed() {
        let group = raw(json!({"category": {"id": 34}}));
        let err = normalize_group(&group, 0, 2).unwrap_err();
        assert!(matches!(err, MeetupError::MalformedRecord { batch: 2, field: "category", .. }));
    }

    #[test]
    fn test_missing_counts_default_to_zero() {
        let group = raw(json!({"id": 7, "created": 0}));
        let record = normalize_group(&group, CEST, 0).unwrap();
        assert_eq!(record.past_event_count, 0);
        assert_eq!(record.last_rsvp, 0);
        assert_eq!(record.last_event, None);
    }

    #[test]
    fn test_counts_coerce_from_strings_and_whole_floats() {
        assert_eq!(coerce_count(&json!("17"), 0, "past_event_count").unwrap(), 17);
        assert_eq!(coerce_count(&json!(" 8 "), 0, "past_event_count").unwrap(), 8);
        assert_eq!(coerce_count(&json!(12.0), 0, "past_event_count").unwrap(), 12);
        assert_eq!(coerce_count(&json!("3.0"), 0, "past_event_count").unwrap(), 3);
    }

    #[test]
    fn test_invalid_counts_are_malformed() {
        for bad in [json!(-1), json!(2.5), json!("many"), json!(true), json!([1])] {
            let err = coerce_count(&bad, 4, "past_event_count").unwrap_err();
            assert!(
                matches!(err, MeetupError::MalformedRecord { batch: 4, field: "past_event_count", .. }),
                "expected {} to be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_bad_rsvp_count_fails_the_page() {
        let group = raw(json!({
            "last_event": {"time": 0, "utc_offset": 0, "yes_rsvp_count": "lots"}
        }));
        let err = normalize_page(&page(1, vec![group]), OffsetPolicy::Fail).unwrap_err();
        assert!(matches!(err, MeetupError::MalformedRecord { field: "yes_rsvp_count", .. }));
    }

    #[test]
    fn test_offset_found_past_groups_without_events() {
        let groups = vec![
            raw(json!({"id": 1, "created": 1_000})),
            raw(json!({"id": 2, "created": 2_000, "last_event": {"time": 5_000}})),
            raw(json!({"id": 3, "created": 3_000, "last_event": {"time": 9_000, "utc_offset": -18_000_000}})),
        ];
        let page = page(0, groups);
        assert_eq!(find_page_offset(&page).unwrap(), Some(-18_000_000));

        let records = normalize_page(&page, OffsetPolicy::Fail).unwrap();
        assert_eq!(records[0].created, Some(LocalTime::Epoch(1_000 - 18_000_000)));
        assert_eq!(records[1].last_event, Some(LocalTime::Epoch(5_000 - 18_000_000)));
    }

    #[test]
    fn test_first_offset_in_page_wins() {
        let groups = vec![
            raw(json!({"last_event": {"time": 0, "utc_offset": "3600000"}})),
            raw(json!({"last_event": {"time": 0, "utc_offset": 7200000}})),
        ];
        assert_eq!(find_page_offset(&page(0, groups)).unwrap(), Some(3_600_000));
    }

    #[test]
    fn test_page_without_offset_fails_under_fail_policy() {
        let groups = vec![raw(json!({"id": 1, "created": 1_000})); 3];
        let err = normalize_page(&page(5, groups), OffsetPolicy::Fail).unwrap_err();
        assert!(matches!(err, MeetupError::NoOffsetFound { batch: 5, groups: 3 }));
    }

    #[test]
    fn test_page_without_offset_uses_utc_under_zero_policy() {
        let groups = vec![raw(json!({"id": 1, "created": 1_000}))];
        let records = normalize_page(&page(0, groups), OffsetPolicy::Zero).unwrap();
        assert_eq!(records[0].created, Some(LocalTime::Epoch(1_000)));
    }

    #[test]
    fn test_empty_page_needs_no_offset() {
        let records = normalize_page(&page(3, Vec::new()), OffsetPolicy::Fail).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_non_numeric_offset_is_malformed() {
        let groups = vec![raw(json!({"last_event": {"time": 0, "utc_offset": "CET"}}))];
        let err = find_page_offset(&page(0, groups)).unwrap_err();
        assert!(matches!(err, MeetupError::MalformedRecord { field: "utc_offset", .. }));
    }

    #[test]
    fn test_unparseable_created_is_kept_as_text() {
        let groups = vec![
            raw(json!({"created": "last tuesday"})),
            raw(json!({"last_event": {"time": 0, "utc_offset": 0}})),
        ];
        let records = normalize_page(&page(0, groups), OffsetPolicy::Fail).unwrap();
        assert_eq!(records[0].created, Some(LocalTime::Unparsed("last tuesday".into())));
    }

    #[test]
    fn test_non_object_last_event_is_rejected() {
        let group = raw(json!({"last_event": 1_500_000_000_000_i64}));
        let err = normalize_group(&group, 0, 0).unwrap_err();
        assert!(matches!(err, MeetupError::MalformedRecord { field: "last_event", .. }));
    }

    #[test]
    fn test_scalar_fields_pass_through() {
        let group = raw(json!({
            "id": 18_531_329, "name": "PDX Rust", "city": "Portland", "lat": 45.52, "lon": -122.68,
            "status": "active", "members": 912, "join_mode": "open"
        }));
        let record = normalize_group(&group, 0, 0).unwrap();
        assert_eq!(record.id, Some(18_531_329));
        assert_eq!(record.city.as_deref(), Some("Portland"));
        assert_eq!(record.lat, Some(45.52));
        assert_eq!(record.members, Some(912));
        assert_eq!(record.join_mode.as_deref(), Some("open"));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let page = page(0, (0..10).map(with_event).collect());
        let first = normalize_page(&page, OffsetPolicy::Fail).unwrap();
        let second = normalize_page(&page, OffsetPolicy::Fail).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_raw_page_is_not_modified() {
        let page = page(0, vec![with_event(1)]);
        let before = page.clone();
        normalize_page(&page, OffsetPolicy::Fail).unwrap();
        assert_eq!(page, before);
    }

    #[test]
    fn test_dataset_concatenates_pages_in_order() {
        let pages = vec![
            page(0, (0..PAGE_SIZE as i64).map(with_event).collect()),
            page(1, (1000..1150).map(with_event).collect()),
        ];
        let dataset = normalize(&pages, OffsetPolicy::Fail).unwrap();

        assert_eq!(dataset.len(), 350);
        assert_eq!(dataset.records()[0].id, Some(0));
        assert_eq!(dataset.records()[PAGE_SIZE].id, Some(1000));
        assert!(dataset.records().iter().all(|r| r.last_rsvp == 31));
    }

    #[test]
    fn test_each_page_resolves_its_own_offset() {
        let utc_page = page(
            0,
            vec![raw(json!({"created": 0, "last_event": {"time": 0, "utc_offset": 0}}))],
        );
        let cest_page = page(1, vec![with_event(9), raw(json!({"created": 0}))]);
        let dataset = normalize(&[utc_page, cest_page], OffsetPolicy::Fail).unwrap();

        assert_eq!(dataset.records()[0].created, Some(LocalTime::Epoch(0)));
        assert_eq!(dataset.records()[2].created, Some(LocalTime::Epoch(CEST)));
    }
}
