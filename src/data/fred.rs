//! FRED API integration: one observations query per series.

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{ApiKey, Catalog, FetchSettings};
use crate::domain::Observation;
use crate::error::{AppError, EtlError};

const BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const OBS_LIMIT: usize = 100_000;

/// Anything that can produce the observations of one series over a date range.
///
/// Implementations must coerce non-numeric values to `None` rather than fail.
pub trait ObservationSource {
    fn fetch(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Observation>, EtlError>;
}

pub struct FredClient {
    client: Client,
    api_key: ApiKey,
    settings: FetchSettings,
    base_url: String,
}

impl FredClient {
    pub fn new(api_key: ApiKey, settings: FetchSettings) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::new(4, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            settings,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (e.g. a local mirror).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn fetch_once(
        &self,
        series_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, AttemptError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.expose()),
                ("file_type", "json"),
                ("observation_start", &start.to_string()),
                ("observation_end", &end.to_string()),
                ("sort_order", "asc"),
                ("limit", &OBS_LIMIT.to_string()),
            ])
            .send()
            .map_err(|e| AttemptError {
                transient: e.is_timeout() || e.is_connect() || e.is_request(),
                error: EtlError::fetch(series_id, format!("request failed: {}", describe(e))),
            })?;

        let status = resp.status();
        let body = resp.text().map_err(|e| AttemptError {
            transient: e.is_timeout(),
            error: EtlError::fetch(series_id, format!("failed to read response body: {}", describe(e))),
        })?;

        if !status.is_success() {
            return Err(classify_status(series_id, status, &body));
        }

        parse_observations(series_id, &body).map_err(|error| AttemptError {
            error,
            transient: false,
        })
    }
}

impl ObservationSource for FredClient {
    fn fetch(&self, series_id: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<Observation>, EtlError> {
        if start > end {
            return Err(EtlError::InvalidRange { start, end });
        }

        let attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(series_id, start, end) {
                Ok(obs) => return Ok(obs),
                Err(err) if err.transient && attempt < attempts => {
                    let delay = backoff_delay(self.settings.retry_base_delay, attempt);
                    debug!(series_id, attempt, ?delay, error = %err.error, "transient fetch failure, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err.error),
            }
        }
    }
}

/// Error text with its cause chain, minus the request URL (it carries the key).
fn describe(err: reqwest::Error) -> String {
    let err = err.without_url();
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    msg
}

struct AttemptError {
    error: EtlError,
    transient: bool,
}

/// Exponential backoff: `base * 2^(attempt - 1)`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

fn classify_status(series_id: &str, status: StatusCode, body: &str) -> AttemptError {
    if status == StatusCode::BAD_REQUEST {
        let message = serde_json::from_str::<ErrorResponse>(body)
            .map(|e| e.error_message)
            .unwrap_or_default();
        if message.to_ascii_lowercase().contains("does not exist") {
            return AttemptError {
                error: EtlError::UnknownSeries {
                    series_id: series_id.to_string(),
                },
                transient: false,
            };
        }
    }

    AttemptError {
        transient: status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        error: EtlError::fetch(series_id, format!("request failed with status {status}")),
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error_message: String,
}

/// Decode an observations payload. Non-numeric values become `None`.
pub fn parse_observations(series_id: &str, body: &str) -> Result<Vec<Observation>, EtlError> {
    let parsed: ObservationsResponse = serde_json::from_str(body)
        .map_err(|e| EtlError::fetch(series_id, format!("failed to parse response: {e}")))?;

    parsed
        .observations
        .into_iter()
        .map(|obs| {
            let date = NaiveDate::parse_from_str(&obs.date, "%Y-%m-%d")
                .map_err(|e| EtlError::fetch(series_id, format!("invalid date '{}': {e}", obs.date)))?;
            Ok(Observation::new(date, parse_value(&obs.value)))
        })
        .collect()
}

/// FRED marks missing values with `"."`.
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

/// Outcome of fetching every catalog entry, with failures isolated per indicator.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Successfully fetched series, keyed by display name, in catalog order.
    pub series: Vec<(String, Vec<Observation>)>,
    pub failures: Vec<(String, EtlError)>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetch each catalog indicator in turn; one failure does not stop the rest.
pub fn fetch_all<S: ObservationSource + ?Sized>(
    source: &S,
    catalog: &Catalog,
    start: NaiveDate,
    end: NaiveDate,
) -> FetchReport {
    let mut report = FetchReport::default();
    for ind in catalog.indicators() {
        match source.fetch(&ind.series_id, start, end) {
            Ok(obs) => {
                if obs.is_empty() {
                    warn!(indicator = %ind.name, series_id = %ind.series_id, "no observations returned");
                } else {
                    info!(indicator = %ind.name, series_id = %ind.series_id, n_obs = obs.len(), "collected series");
                }
                report.series.push((ind.name.clone(), obs));
            }
            Err(err) => {
                warn!(indicator = %ind.name, error = %err, "fetch failed");
                report.failures.push((ind.name.clone(), err));
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use crate::domain::Indicator;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_and_coerces_missing_values() {
        let body = r#"{
            "realtime_start": "2024-01-01",
            "count": 4,
            "observations": [
                {"realtime_start": "x", "date": "2021-01-01", "value": "100.5"},
                {"realtime_start": "x", "date": "2021-02-01", "value": "."},
                {"realtime_start": "x", "date": "2021-03-01", "value": "n/a"},
                {"realtime_start": "x", "date": "2021-04-01", "value": " 110 "}
            ]
        }"#;
        let obs = parse_observations("GDP", body).unwrap();
        assert_eq!(
            obs,
            vec![
                Observation::new(d(2021, 1, 1), Some(100.5)),
                Observation::new(d(2021, 2, 1), None),
                Observation::new(d(2021, 3, 1), None),
                Observation::new(d(2021, 4, 1), Some(110.0)),
            ]
        );
    }

    #[test]
    fn empty_observations_are_not_an_error() {
        let obs = parse_observations("GDP", r#"{"observations": []}"#).unwrap();
        assert!(obs.is_empty());
    }

    #[test]
    fn malformed_payloads_are_fetch_errors() {
        let err = parse_observations("GDP", "<html>oops</html>").unwrap_err();
        assert!(matches!(err, EtlError::Fetch { ref series_id, .. } if series_id == "GDP"));

        let err = parse_observations("GDP", r#"{"observations": [{"date": "01/02/2021", "value": "1"}]}"#)
            .unwrap_err();
        assert!(matches!(err, EtlError::Fetch { .. }));
    }

    #[test]
    fn parse_value_rejects_non_finite() {
        assert_eq!(parse_value("inf"), None);
        assert_eq!(parse_value("NaN"), None);
        assert_eq!(parse_value("-0.25"), Some(-0.25));
    }

    #[test]
    fn status_classification() {
        let body = r#"{"error_code": 400, "error_message": "Bad Request.  The series does not exist."}"#;
        let err = classify_status("NOPE", StatusCode::BAD_REQUEST, body);
        assert!(!err.transient);
        assert!(matches!(err.error, EtlError::UnknownSeries { ref series_id } if series_id == "NOPE"));

        let err = classify_status("GDP", StatusCode::BAD_REQUEST, r#"{"error_message": "Bad api_key"}"#);
        assert!(!err.transient);
        assert!(matches!(err.error, EtlError::Fetch { .. }));

        assert!(classify_status("GDP", StatusCode::SERVICE_UNAVAILABLE, "").transient);
        assert!(classify_status("GDP", StatusCode::TOO_MANY_REQUESTS, "").transient);
        assert!(!classify_status("GDP", StatusCode::FORBIDDEN, "").transient);
    }

    #[test]
    fn backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    }

    struct StubSource(HashMap<&'static str, Result<Vec<Observation>, EtlError>>);

    impl ObservationSource for StubSource {
        fn fetch(&self, series_id: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<Observation>, EtlError> {
            self.0
                .get(series_id)
                .cloned()
                .unwrap_or_else(|| Err(EtlError::UnknownSeries { series_id: series_id.to_string() }))
        }
    }

    #[test]
    fn fetch_all_isolates_failures() {
        let catalog = Catalog::new(vec![
            Indicator::new("A", "SA"),
            Indicator::new("B", "SB"),
            Indicator::new("C", "SC"),
        ])
        .unwrap();
        let mut map = HashMap::new();
        map.insert("SA", Ok(vec![Observation::new(d(2021, 1, 1), Some(1.0))]));
        map.insert("SB", Err(EtlError::fetch("SB", "timed out")));
        map.insert("SC", Ok(vec![]));

        let report = fetch_all(&StubSource(map), &catalog, d(2021, 1, 1), d(2021, 12, 31));
        assert!(!report.is_complete());
        let names: Vec<_> = report.series.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "B");
    }

    #[test]
    fn fred_client_rejects_inverted_range_without_network() {
        let client = FredClient::new(ApiKey::new("k"), FetchSettings::default()).unwrap();
        let err = client.fetch("GDP", d(2022, 1, 1), d(2021, 1, 1)).unwrap_err();
        assert!(matches!(err, EtlError::InvalidRange { .. }));
    }

    /// Local HTTP endpoint answering every connection with `status` and `body`.
    /// Returns its URL and a connection counter.
    fn canned_server(status: &'static str, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/fred/series/observations", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 8192];
                let _ = stream.read(&mut buf);
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        (url, hits)
    }

    fn client(url: &str, max_attempts: u32, timeout: Duration) -> FredClient {
        let settings = FetchSettings {
            timeout,
            max_attempts,
            retry_base_delay: Duration::from_millis(50),
        };
        FredClient::new(ApiKey::new("secret-key"), settings)
            .unwrap()
            .with_base_url(url)
    }

    #[test]
    fn refused_connection_is_retried_then_reported() {
        // Bind then drop to get a local port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let fred = client(&format!("http://127.0.0.1:{port}/"), 3, Duration::from_secs(5));

        let started = Instant::now();
        let err = fred.fetch("GDP", d(2021, 1, 1), d(2021, 12, 31)).unwrap_err();
        // Two backoff sleeps: 50 ms + 100 ms.
        assert!(started.elapsed() >= Duration::from_millis(150));

        let EtlError::Fetch { series_id, message } = err else {
            panic!("expected a fetch error, got {err:?}");
        };
        assert_eq!(series_id, "GDP");
        assert!(message.starts_with("request failed: "));
        // The cause chain follows the top-level message.
        assert!(message.matches(": ").count() >= 2, "{message}");
        assert!(!message.contains("secret-key"));
    }

    #[test]
    fn server_errors_use_every_attempt() {
        let (url, hits) = canned_server("503 Service Unavailable", "{}");
        let err = client(&url, 3, Duration::from_secs(5))
            .fetch("GDP", d(2021, 1, 1), d(2021, 12, 31))
            .unwrap_err();
        assert!(matches!(err, EtlError::Fetch { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_transient_failures_are_not_retried() {
        let (url, hits) = canned_server(
            "400 Bad Request",
            r#"{"error_code": 400, "error_message": "Bad Request.  The series does not exist."}"#,
        );
        let err = client(&url, 3, Duration::from_secs(5))
            .fetch("NOPE", d(2021, 1, 1), d(2021, 12, 31))
            .unwrap_err();
        assert!(matches!(err, EtlError::UnknownSeries { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let (url, hits) = canned_server("403 Forbidden", "{}");
        let err = client(&url, 3, Duration::from_secs(5))
            .fetch("GDP", d(2021, 1, 1), d(2021, 12, 31))
            .unwrap_err();
        assert!(matches!(err, EtlError::Fetch { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn successful_response_is_parsed() {
        let (url, hits) = canned_server(
            "200 OK",
            r#"{"observations": [{"date": "2021-01-01", "value": "1.5"}]}"#,
        );
        let obs = client(&url, 3, Duration::from_secs(5))
            .fetch("GDP", d(2021, 1, 1), d(2021, 12, 31))
            .unwrap();
        assert_eq!(obs, vec![Observation::new(d(2021, 1, 1), Some(1.5))]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_timeout_is_a_fetch_error() {
        // Accept connections but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });

        let started = Instant::now();
        let err = client(&url, 1, Duration::from_millis(200))
            .fetch("GDP", d(2021, 1, 1), d(2021, 12, 31))
            .unwrap_err();
        assert!(matches!(err, EtlError::Fetch { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
