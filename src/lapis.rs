use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::domain::{LapisFilter, Row, SequenceType};
use crate::error::DashboardError;

pub const DEFAULT_LAPIS_URL: &str = "https://lapis.cov-spectrum.org/open/v2";

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The sequence database backend. Every call blocks until the response is
/// decoded, fails, or `cancel` fires.
pub trait LapisClient: Send + Sync {
    fn aggregated(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError>;

    fn details(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError>;

    fn mutations(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        min_proportion: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError>;

    fn insertions(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError>;
}

#[derive(Clone)]
pub struct LapisHttpClient {
    client: Client,
    base_url: String,
}

impl LapisHttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DashboardError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(timeout)
            .build()
            .map_err(|err| DashboardError::LapisHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(
        &self,
        endpoint: &str,
        body: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        let url = format!("{}/sample/{endpoint}", self.base_url);
        debug!(%url, "LAPIS request");
        let body = Value::Object(body);
        let value = send_json_with_retries(|| self.client.post(&url).json(&body), cancel)?
            .map_err(|failure| match failure {
                Failure::Status { status, message } => {
                    DashboardError::LapisStatus { status, message }
                }
                Failure::Transport(message) => DashboardError::LapisHttp(message),
                Failure::Decode(message) => DashboardError::MalformedResponse(message),
            })?;
        extract_data(value)
    }
}

impl LapisClient for LapisHttpClient {
    fn aggregated(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        self.post("aggregated", request_body(filter, fields, None), cancel)
    }

    fn details(
        &self,
        filter: &LapisFilter,
        fields: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        self.post("details", request_body(filter, fields, None), cancel)
    }

    fn mutations(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        min_proportion: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        let endpoint = format!("{}Mutations", sequence_type.endpoint_prefix());
        self.post(
            &endpoint,
            request_body(filter, &[], Some(min_proportion)),
            cancel,
        )
    }

    fn insertions(
        &self,
        filter: &LapisFilter,
        sequence_type: SequenceType,
        cancel: &CancellationToken,
    ) -> Result<Vec<Row>, DashboardError> {
        let endpoint = format!("{}Insertions", sequence_type.endpoint_prefix());
        self.post(&endpoint, request_body(filter, &[], None), cancel)
    }
}

pub(crate) fn default_headers() -> Result<HeaderMap, DashboardError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("genomic-dashboard/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| DashboardError::LapisHttp(err.to_string()))?,
    );
    Ok(headers)
}

pub fn request_body(
    filter: &LapisFilter,
    fields: &[String],
    min_proportion: Option<f64>,
) -> Map<String, Value> {
    let mut body = filter.to_json_map();
    if !fields.is_empty() {
        body.insert(
            "fields".to_string(),
            Value::Array(fields.iter().cloned().map(Value::from).collect()),
        );
    }
    if let Some(min_proportion) = min_proportion {
        body.insert("minProportion".to_string(), Value::from(min_proportion));
    }
    body
}

/// Pulls the `data` array out of a LAPIS response envelope.
pub fn extract_data(value: Value) -> Result<Vec<Row>, DashboardError> {
    let Value::Object(mut envelope) = value else {
        return Err(DashboardError::MalformedResponse(
            "response is not a JSON object".to_string(),
        ));
    };
    let Some(Value::Array(entries)) = envelope.remove("data") else {
        return Err(DashboardError::MalformedResponse(
            "response has no data array".to_string(),
        ));
    };
    entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(row) => Ok(row),
            other => Err(DashboardError::MalformedResponse(format!(
                "data entry is not an object: {other}"
            ))),
        })
        .collect()
}

#[derive(Debug)]
pub(crate) enum Failure {
    Status { status: u16, message: String },
    Transport(String),
    Decode(String),
}

enum Outcome {
    Body(Value),
    Status { status: u16, message: String },
    Transport(reqwest::Error),
    Decode(String),
}

/// Sends a JSON request, retrying transient failures. The outer `Err` is
/// reserved for cancellation; the inner one carries the last failure.
pub(crate) fn send_json_with_retries<F>(
    mut make_req: F,
    cancel: &CancellationToken,
) -> Result<Result<Value, Failure>, DashboardError>
where
    F: FnMut() -> RequestBuilder,
{
    const MAX_RETRIES: usize = 3;
    const BASE_DELAY_MS: u64 = 200;
    let mut attempt = 0usize;
    loop {
        cancel.check()?;
        let outcome = send_cancellable(make_req(), cancel)?;
        let retryable = match &outcome {
            Outcome::Status { status, .. } => is_retryable_status(*status),
            Outcome::Transport(err) => is_retryable_error(err),
            _ => false,
        };
        if retryable && attempt < MAX_RETRIES {
            let delay = BASE_DELAY_MS * (attempt as u64 + 1);
            warn!(attempt, delay_ms = delay, "retrying backend request");
            sleep_cancellable(Duration::from_millis(delay), cancel)?;
            attempt += 1;
            continue;
        }
        return Ok(match outcome {
            Outcome::Body(value) => Ok(value),
            Outcome::Status { status, message } => Err(Failure::Status { status, message }),
            Outcome::Transport(err) => Err(Failure::Transport(err.to_string())),
            Outcome::Decode(message) => Err(Failure::Decode(message)),
        });
    }
}

/// Sleeps for `delay` in poll-sized steps, returning early with `Cancelled`.
fn sleep_cancellable(delay: Duration, cancel: &CancellationToken) -> Result<(), DashboardError> {
    let mut remaining = delay;
    while !remaining.is_zero() {
        cancel.check()?;
        let step = remaining.min(CANCEL_POLL_INTERVAL);
        thread::sleep(step);
        remaining -= step;
    }
    cancel.check()
}

/// Runs the blocking request on a worker thread so the caller can abandon it
/// as soon as `cancel` fires.
///
/// An abandoned worker is not interrupted: it keeps its connection until the
/// server answers or the client timeout elapses, and its outcome is dropped.
fn send_cancellable(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<Outcome, DashboardError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let outcome = match request.send() {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    match response.json::<Value>() {
                        Ok(value) => Outcome::Body(value),
                        Err(err) => Outcome::Decode(err.to_string()),
                    }
                } else {
                    let message = response
                        .text()
                        .unwrap_or_else(|_| "backend request failed".to_string());
                    Outcome::Status {
                        status: status.as_u16(),
                        message,
                    }
                }
            }
            Err(err) => Outcome::Transport(err),
        };
        let _ = tx.send(outcome);
    });

    loop {
        match rx.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(outcome) => return Ok(outcome),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    debug!("backend request abandoned after cancellation");
                    return Err(DashboardError::Cancelled);
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DashboardError::LapisHttp(
                    "request worker exited without a response".to_string(),
                ));
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Instant;

    use super::*;
    use serde_json::json;

    fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    /// Answers one connection per entry of `responses`, in order, and
    /// returns how many were served.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<usize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut served = 0;
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                read_request(&mut stream);
                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
                served += 1;
            }
            served
        });
        (url, handle)
    }

    fn cancel_after(delay: Duration) -> CancellationToken {
        let cancel = CancellationToken::new();
        let remote = cancel.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            remote.cancel();
        });
        cancel
    }

    #[test]
    fn body_merges_filter_fields_and_proportion() {
        let filter = LapisFilter::new().with("country", "Switzerland");
        let body = request_body(&filter, &["date".to_string()], Some(0.05));
        assert_eq!(
            Value::Object(body),
            json!({"country": "Switzerland", "fields": ["date"], "minProportion": 0.05})
        );
    }

    #[test]
    fn data_envelope_is_required() {
        let rows = extract_data(json!({"data": [{"count": 3}], "info": {}})).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(matches!(
            extract_data(json!({"info": {}})),
            Err(DashboardError::MalformedResponse(_))
        ));
    }

    #[test]
    fn cancellation_abandons_a_request_in_flight() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let client = LapisHttpClient::new(&url, Duration::from_secs(30)).unwrap();

        let started = Instant::now();
        let cancel = cancel_after(Duration::from_millis(100));
        let result = client.aggregated(&LapisFilter::new(), &[], &cancel);

        assert!(matches!(result, Err(DashboardError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }

    #[test]
    fn unavailable_backend_is_retried() {
        let (url, server) = serve(vec![(503, "busy"), (200, r#"{"data": [{"count": 1}]}"#)]);
        let client = LapisHttpClient::new(&url, Duration::from_secs(10)).unwrap();

        let rows = client
            .aggregated(&LapisFilter::new(), &[], &CancellationToken::new())
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(server.join().unwrap(), 2);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let (url, server) = serve(vec![(400, "bad filter")]);
        let client = LapisHttpClient::new(&url, Duration::from_secs(10)).unwrap();

        let result = client.aggregated(&LapisFilter::new(), &[], &CancellationToken::new());

        assert!(matches!(
            result,
            Err(DashboardError::LapisStatus { status: 400, .. })
        ));
        assert_eq!(server.join().unwrap(), 1);
    }

    #[test]
    fn cancellation_interrupts_the_retry_back_off() {
        let (url, _server) = serve(vec![(503, "busy"); 4]);
        let client = LapisHttpClient::new(&url, Duration::from_secs(10)).unwrap();

        let started = Instant::now();
        let cancel = cancel_after(Duration::from_millis(40));
        let result = client.aggregated(&LapisFilter::new(), &[], &cancel);

        assert!(matches!(result, Err(DashboardError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(180));
    }

    #[test]
    fn back_off_sleep_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            sleep_cancellable(Duration::from_secs(5), &cancel),
            Err(DashboardError::Cancelled)
        ));
        assert!(sleep_cancellable(Duration::from_millis(10), &CancellationToken::new()).is_ok());
    }
}
