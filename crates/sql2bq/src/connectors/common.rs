//! Common utilities shared across connectors.
//!
//! HTTP client creation, URL validation, identifier quoting and HTTP status
//! classification.

use crate::error::{Error, Result};
use reqwest::Client;
use std::time::Duration;

/// Default HTTP timeout for REST calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry-After fallback when a 429 carries no header.
pub const DEFAULT_RATE_LIMIT_SECS: u64 = 60;

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates an API base URL.
pub fn validate_url(url: &str) -> Result<()> {
    let valid_schemes = ["http://", "https://"];
    let has_valid_scheme = valid_schemes.iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 || !url.contains("://") {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Quotes a MySQL identifier with back-ticks.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Maps a non-success HTTP status to an error.
///
/// `retry_after` is the parsed `Retry-After` header, if any.
pub fn handle_http_error(
    status_code: u16,
    body: &str,
    context: &str,
    retry_after: Option<u64>,
) -> Error {
    match status_code {
        404 => Error::NotFound(format!("{}: {}", context, body)),
        409 => Error::AlreadyExists(context.to_string()),
        429 => Error::RateLimit(retry_after.unwrap_or(DEFAULT_RATE_LIMIT_SECS)),
        503 => Error::ServiceUnavailable(format!("{}: {}", context, body)),
        401 | 403 => Error::Authentication(format!("{} auth failed: {}", context, body)),
        _ => Error::Destination(format!("{} error {}: {}", context, status_code, body)),
    }
}
