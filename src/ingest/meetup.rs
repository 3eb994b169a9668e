/// Meetup `find/groups` API client.
///
/// Drains the paged endpoint one request at a time. Each response is
/// classified by status, decoded into a `Page`, and yielded lazily; the
/// first page shorter than `PAGE_SIZE` ends the sequence.
///
/// API Documentation: https://www.meetup.com/meetup_api/docs/find/groups/

use serde_json::Value;
use std::iter::FusedIterator;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{QueryConfig, Settings, StatusPolicy};
use crate::logging::{StatusClass, Stage, classify_status, log_status};
use crate::model::{EXTRA_FIELDS, MeetupError, PAGE_SIZE, Page, REQUESTED_FIELDS, RawGroup, Result};

// ============================================================================
// Transport
// ============================================================================

/// Status and body of one HTTP response, before interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Something that can produce the response for a given batch offset.
///
/// The paginator only ever calls `fetch` with consecutive offsets starting
/// at 0 and never calls it again once it has stopped.
pub trait PageSource {
    fn fetch(&mut self, batch: u32) -> Result<RawResponse>;
}

/// Blocking HTTP source for the live API.
pub struct HttpPageSource {
    client: reqwest::blocking::Client,
    endpoint: String,
    query: QueryConfig,
}

impl HttpPageSource {
    /// Builds a client with the configured timeout.
    pub fn new(settings: &Settings, query: QueryConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(MeetupError::Transport)?;
        Ok(Self::with_client(client, settings.endpoint.clone(), query))
    }

    pub fn with_client(client: reqwest::blocking::Client, endpoint: String, query: QueryConfig) -> Self {
        Self { client, endpoint, query }
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&mut self, batch: u32) -> Result<RawResponse> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&query_params(&self.query, batch))
            .header("Accept", "application/json")
            .send()
            .map_err(|e| transport_error(e, batch))?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|e| transport_error(e, batch))?;

        Ok(RawResponse { status, body })
    }
}

fn transport_error(err: reqwest::Error, batch: u32) -> MeetupError {
    if err.is_timeout() {
        MeetupError::Timeout { batch }
    } else {
        MeetupError::Transport(err)
    }
}

/// Query string for one request. `offset` counts pages, not records.
pub fn query_params(query: &QueryConfig, batch: u32) -> Vec<(&'static str, String)> {
    vec![
        ("key", query.api_key.clone()),
        ("sign", "true".to_string()),
        ("page", PAGE_SIZE.to_string()),
        ("offset", batch.to_string()),
        ("zip", query.zipcode.clone()),
        ("radius", query.radius.to_string()),
        ("only", REQUESTED_FIELDS.to_string()),
        ("fields", EXTRA_FIELDS.to_string()),
    ]
}

// ============================================================================
// Response Interpretation
// ============================================================================

/// Applies the status policy and decodes the body into a `Page`.
///
/// A 200 body must be a JSON array of groups. Under the permissive policy a
/// non-200 body holding the API's JSON error object is logged and becomes an
/// empty page, which ends pagination. Any other non-200 body (an HTML error
/// page, truncated JSON) is a parse error.
pub fn interpret_response(batch: u32, response: RawResponse, policy: StatusPolicy) -> Result<Page> {
    let RawResponse { status, body } = response;
    let class = classify_status(status);
    log_status(batch, status);

    if policy == StatusPolicy::Strict {
        match class {
            StatusClass::Ok => {}
            StatusClass::Unauthorized => return Err(MeetupError::Unauthorized { batch }),
            StatusClass::Unexpected(status) => return Err(MeetupError::HttpStatus { batch, status }),
        }
    }

    match serde_json::from_str::<Vec<RawGroup>>(&body) {
        Ok(groups) => Ok(Page { batch, status, groups }),
        Err(e) if class == StatusClass::Ok => Err(MeetupError::Parse {
            batch,
            reason: e.to_string(),
        }),
        Err(e) if !is_json_object(&body) => Err(MeetupError::Parse {
            batch,
            reason: format!("status {} with a body that is not a JSON error object: {}", status, e),
        }),
        Err(_) => {
            warn!(
                stage = %Stage::Fetch,
                batch = batch + 1,
                status,
                api_error = %describe_api_error(&body),
                "Response carried no groups; treating batch as empty"
            );
            Ok(Page { batch, status, groups: Vec::new() })
        }
    }
}

fn is_json_object(body: &str) -> bool {
    serde_json::from_str::<Value>(body).is_ok_and(|json| json.is_object())
}

/// Summarizes an error body such as `{"errors":[{"code":"auth_fail","message":"..."}]}`.
pub fn describe_api_error(body: &str) -> String {
    let messages: Vec<String> = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("errors").and_then(|e| e.as_array()).cloned())
        .unwrap_or_default()
        .iter()
        .map(|err| {
            let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("unknown");
            let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
            format!("{}: {}", code, message)
        })
        .collect();

    if messages.is_empty() {
        body.chars().take(200).collect()
    } else {
        messages.join("; ")
    }
}

// ============================================================================
// Paginator
// ============================================================================

/// Lazy, finite, non-restartable sequence of pages.
///
/// Stops after the first short page or the first error; after that `next`
/// returns `None` without touching the source again.
pub struct Paginator<S> {
    source: S,
    policy: StatusPolicy,
    delay: Duration,
    next_batch: u32,
    requests: u32,
    done: bool,
}

/// Starts draining `source` with the delay and status policy from `settings`.
pub fn fetch_all<S: PageSource>(source: S, settings: &Settings) -> Paginator<S> {
    Paginator::new(source, settings.status_policy, settings.request_delay())
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, policy: StatusPolicy, delay: Duration) -> Self {
        Self {
            source,
            policy,
            delay,
            next_batch: 0,
            requests: 0,
            done: false,
        }
    }

    /// Number of requests sent so far.
    pub fn requests_issued(&self) -> u32 {
        self.requests
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: PageSource> Iterator for Paginator<S> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // Rate limit: pause between requests, never before the first.
        if self.requests > 0 && !self.delay.is_zero() {
            debug!(stage = %Stage::Fetch, delay_ms = self.delay.as_millis() as u64, "Pausing before next request");
            thread::sleep(self.delay);
        }

        let batch = self.next_batch;
        let policy = self.policy;
        self.requests += 1;
        info!(stage = %Stage::Fetch, batch = batch + 1, "Batch number: {}", batch + 1);

        let result = self
            .source
            .fetch(batch)
            .and_then(|response| interpret_response(batch, response, policy));

        match &result {
            Ok(page) => {
                info!(
                    stage = %Stage::Fetch,
                    batch = batch + 1,
                    groups = page.len(),
                    "Number of groups returned: {}",
                    page.len()
                );
                if page.is_final() {
                    self.done = true;
                    info!(stage = %Stage::Fetch, requests = self.requests, "***Finished!***");
                } else {
                    self.next_batch += 1;
                }
            }
            Err(e) => {
                self.done = true;
                error!(stage = %Stage::Fetch, batch = batch + 1, "Retrieval failed: {}", e);
            }
        }

        Some(result)
    }
}

impl<S: PageSource> FusedIterator for Paginator<S> {}

// ============================================================================
// Tests
// ============================================================================
