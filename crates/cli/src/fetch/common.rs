//! Shared infrastructure for `rgrid fetch` adapters.
//!
//! - `FetchClient`: HTTP client with retry, backoff and error classification
//! - `resolve_api_key`: flag > keychain > env > error
//! - `write_json` / `write_csv`: emit results to a file or stdout
//!
//! # Status handling
//!
//! | Status        | Behaviour                         | Exit code |
//! |---------------|-----------------------------------|-----------|
//! | 2xx           | parse JSON body                   |           |
//! | 401, 403      | fail at once                      | 51        |
//! | 400           | fail at once                      | 52        |
//! | other 4xx     | fail at once                      | 54        |
//! | 429           | retry, then fail                  | 53        |
//! | 5xx, network  | retry, then fail                  | 54        |
//!
//! Retries back off exponentially from one second. A `Retry-After` header
//! (in seconds) replaces the backoff for that attempt.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::HeaderMap;
use serde::Serialize;

use rostergrid_config::credentials;

use crate::exit_codes;
use crate::CliError;

// ── Constants ───────────────────────────────────────────────────────

pub(super) const MAX_RETRIES: u32 = 3;
pub(super) const USER_AGENT: &str = concat!("rgrid/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 30;

/// Pulls a human-readable reason out of an error response.
pub(super) type ErrorExtractor = fn(&HeaderMap, &serde_json::Value, u16) -> String;

// ── FetchClient ─────────────────────────────────────────────────────

/// Shared HTTP client that handles retry, backoff, and error classification.
///
/// Adapters own their credentials and base URL. They pass a request-building
/// closure to [`FetchClient::get_json`], which runs the retry loop and maps
/// HTTP status codes to the fetch exit codes.
pub(super) struct FetchClient {
    http: Client,
    source_name: String,
    error_extractor: ErrorExtractor,
}

enum RetryReason {
    Status(u16),
    Network(String),
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::Status(status) => write!(f, "HTTP {}", status),
            RetryReason::Network(msg) => f.write_str(msg),
        }
    }
}

impl FetchClient {
    pub(super) fn new(source_name: &str, error_extractor: ErrorExtractor) -> Result<Self, CliError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CliError::general(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            source_name: source_name.to_string(),
            error_extractor,
        })
    }

    /// Send a request with retry + exponential backoff and parse the JSON body.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured request (URL, auth, headers).
    pub(super) fn get_json(
        &self,
        build_request: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<serde_json::Value, CliError> {
        let mut backoff_secs = 1u64;
        let mut attempt = 0u32;

        loop {
            let (reason, wait) = match build_request(&self.http).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        return self.parse_body(resp);
                    }
                    if status != 429 && status < 500 {
                        return Err(self.rejection(resp, status));
                    }
                    let wait = retry_after(resp.headers()).unwrap_or(backoff_secs);
                    (RetryReason::Status(status), wait)
                }
                Err(e) => (RetryReason::Network(e.to_string()), backoff_secs),
            };

            if attempt == MAX_RETRIES {
                return Err(self.exhausted(reason));
            }
            attempt += 1;

            log::warn!(
                "{} retry {}/{} in {}s ({})",
                self.source_name,
                attempt,
                MAX_RETRIES,
                wait,
                reason,
            );
            thread::sleep(Duration::from_secs(wait));
            backoff_secs *= 2;
        }
    }

    /// Non-retryable 4xx response.
    fn rejection(&self, resp: Response, status: u16) -> CliError {
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .ok()
            .and_then(|text| serde_json::from_str(text.trim_start_matches('\u{feff}')).ok())
            .unwrap_or(serde_json::Value::Null);
        let msg = (self.error_extractor)(&headers, &body, status);

        let (code, what) = match status {
            401 | 403 => (exit_codes::EXIT_FETCH_AUTH, "auth failed"),
            400 => (exit_codes::EXIT_FETCH_VALIDATION, "request rejected"),
            _ => (exit_codes::EXIT_FETCH_UPSTREAM, "error"),
        };
        let err = CliError {
            code,
            message: format!("{} {} ({}): {}", self.source_name, what, status, msg),
            hint: None,
        };
        match status {
            401 | 403 => err.with_hint("check the API key, or store a new one with `rgrid auth set`"),
            404 => err.with_hint("check the company subdomain"),
            _ => err,
        }
    }

    /// Retries used up.
    fn exhausted(&self, reason: RetryReason) -> CliError {
        let (code, what) = match reason {
            RetryReason::Status(429) => (exit_codes::EXIT_FETCH_RATE_LIMIT, "rate limited"),
            _ => (exit_codes::EXIT_FETCH_UPSTREAM, "upstream error"),
        };
        CliError {
            code,
            message: format!(
                "{} {} after {} attempts ({})",
                self.source_name,
                what,
                MAX_RETRIES + 1,
                reason,
            ),
            hint: None,
        }
    }

    /// Read as text first so a BOM-prefixed body still parses.
    fn parse_body(&self, resp: Response) -> Result<serde_json::Value, CliError> {
        let text = resp.text().map_err(|e| CliError {
            code: exit_codes::EXIT_FETCH_UPSTREAM,
            message: format!("failed to read {} response body: {}", self.source_name, e),
            hint: None,
        })?;
        let trimmed = text.trim_start_matches('\u{feff}');
        serde_json::from_str(trimmed).map_err(|e| CliError {
            code: exit_codes::EXIT_FETCH_UPSTREAM,
            message: format!(
                "failed to parse {} JSON response: {} (body: {})",
                self.source_name,
                e,
                trimmed.chars().take(200).collect::<String>(),
            ),
            hint: None,
        })
    }
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Resolve an API key: flag value > keychain > `{PROVIDER}_API_KEY` > error.
pub(super) fn resolve_api_key(
    flag: Option<String>,
    source_name: &str,
    provider: &str,
) -> Result<String, CliError> {
    let missing = || CliError {
        code: exit_codes::EXIT_FETCH_NOT_AUTH,
        message: format!(
            "missing {} API key (use --api-key or set {})",
            source_name,
            credentials::env_var_name(provider),
        ),
        hint: None,
    };

    if let Some(key) = flag {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(missing());
        }
        return Ok(trimmed.to_string());
    }

    let lookup = credentials::get_api_key(provider);
    match lookup.key {
        Some(key) => {
            log::debug!("{} API key from {}", source_name, lookup.source.as_str());
            Ok(key)
        }
        None => Err(missing()),
    }
}

fn open_output(out: &Option<PathBuf>) -> Result<Box<dyn Write>, CliError> {
    match out {
        Some(path) => {
            let f = std::fs::File::create(path)
                .map_err(|e| CliError::io(format!("cannot create {}: {}", path.display(), e)))?;
            Ok(Box::new(std::io::BufWriter::new(f)))
        }
        None => Ok(Box::new(std::io::BufWriter::new(std::io::stdout().lock()))),
    }
}

fn out_label(out: &Option<PathBuf>) -> String {
    out.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string())
}

/// Write rows as a pretty JSON array. Returns the output label for progress messages.
pub(super) fn write_json<T: Serialize>(rows: &[T], out: &Option<PathBuf>) -> Result<String, CliError> {
    let mut writer = open_output(out)?;
    serde_json::to_writer_pretty(&mut writer, rows)
        .map_err(|e| CliError::io(format!("JSON write error: {}", e)))?;
    writeln!(writer)
        .and_then(|_| writer.flush())
        .map_err(|e| CliError::io(format!("JSON write error: {}", e)))?;
    Ok(out_label(out))
}

/// Write rows as CSV. The header is written even when there are no rows.
pub(super) fn write_csv<T: Serialize>(
    rows: &[T],
    header: &[&str],
    out: &Option<PathBuf>,
) -> Result<String, CliError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(open_output(out)?);

    csv_writer
        .write_record(header)
        .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    for row in rows {
        csv_writer
            .serialize(row)
            .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    }
    csv_writer
        .flush()
        .map_err(|e| CliError::io(format!("CSV flush error: {}", e)))?;

    Ok(out_label(out))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn plain_error(_headers: &HeaderMap, body: &serde_json::Value, status: u16) -> String {
        body["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", status))
    }

    fn client() -> FetchClient {
        FetchClient::new("Test", plain_error).unwrap()
    }

    #[test]
    fn test_resolve_api_key_flag_priority() {
        let key = resolve_api_key(Some("  token_123  ".into()), "Test", "rgrid_flagtest").unwrap();
        assert_eq!(key, "token_123");
    }

    #[test]
    fn test_resolve_api_key_empty_flag() {
        let err = resolve_api_key(Some("  ".into()), "Test", "rgrid_emptytest").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_NOT_AUTH);
        assert!(err.message.contains("missing Test API key"));
        assert!(err.message.contains("RGRID_EMPTYTEST_API_KEY"));
    }

    #[test]
    fn test_resolve_api_key_missing() {
        std::env::remove_var("RGRID_MISSINGTEST_API_KEY");
        let err = resolve_api_key(None, "Test", "rgrid_missingtest").unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_NOT_AUTH);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert("retry-after", "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(7));
        headers.insert("retry-after", "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_success_with_bom() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/ok");
            then.status(200)
                .header("content-type", "application/json")
                .body("\u{feff}{\"ok\":true}");
        });

        let url = server.url("/ok");
        let body = client().get_json(|http| http.get(&url)).unwrap();
        m.assert();
        assert_eq!(body["ok"], true);
    }

    #[test]
    fn test_bad_request_exit_52() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/bad");
            then.status(400).json_body(serde_json::json!({ "message": "missing field" }));
        });

        let url = server.url("/bad");
        let err = client().get_json(|http| http.get(&url)).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_VALIDATION);
        assert!(err.message.contains("missing field"), "message: {}", err.message);
    }

    #[test]
    fn test_not_found_is_upstream_without_retry() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });

        let url = server.url("/gone");
        let err = client().get_json(|http| http.get(&url)).unwrap_err();
        m.assert_hits(1);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        assert!(err.message.contains("HTTP 404"), "message: {}", err.message);
        assert!(err.hint.is_some());
    }

    #[test]
    fn test_rate_limit_exhausts_retries_exit_53() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(429).header("retry-after", "0");
        });

        let url = server.url("/busy");
        let err = client().get_json(|http| http.get(&url)).unwrap_err();
        m.assert_hits(MAX_RETRIES as usize + 1);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_RATE_LIMIT);
        assert!(err.message.contains("rate limited"), "message: {}", err.message);
    }

    #[test]
    fn test_server_error_exhausts_retries_exit_54() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(GET).path("/down");
            then.status(503).header("retry-after", "0");
        });

        let url = server.url("/down");
        let err = client().get_json(|http| http.get(&url)).unwrap_err();
        m.assert_hits(MAX_RETRIES as usize + 1);
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        assert!(err.message.contains("HTTP 503"), "message: {}", err.message);
    }

    #[test]
    fn test_non_json_success_is_upstream_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/html");
            then.status(200).body("<html>login</html>");
        });

        let url = server.url("/html");
        let err = client().get_json(|http| http.get(&url)).unwrap_err();
        assert_eq!(err.code, exit_codes::EXIT_FETCH_UPSTREAM);
        assert!(err.message.contains("<html>login"), "message: {}", err.message);
    }
}
