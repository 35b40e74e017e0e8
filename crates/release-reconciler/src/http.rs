//! Shared HTTP client and response classification.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use thiserror::Error;

use crate::retry::Retryable;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures talking to an HTTP collaborator.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Authentication rejected by {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    #[error("Not found: {url}")]
    NotFound { url: String },

    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            HttpError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            HttpError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HttpError::NotFound { .. })
    }
}

impl Retryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self {
            HttpError::Request { .. } | HttpError::Timeout { .. } => true,
            HttpError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// Builds the client every HTTP collaborator shares.
pub fn create_http_client() -> Result<Client, HttpError> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("release-reconciler/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| HttpError::Client(e.to_string()))
}

/// Maps a non-success response into an [`HttpError`], passing successes through.
pub async fn check_status(url: &str, response: Response) -> Result<Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(HttpError::Unauthorized {
            url: url.to_string(),
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(HttpError::NotFound {
            url: url.to_string(),
        }),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 300),
            })
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = HttpError::Status {
            url: "u".into(),
            status: 502,
            body: String::new(),
        };
        let throttled = HttpError::Status {
            url: "u".into(),
            status: 429,
            body: String::new(),
        };
        let bad_request = HttpError::Status {
            url: "u".into(),
            status: 400,
            body: String::new(),
        };
        let auth = HttpError::Unauthorized {
            url: "u".into(),
            status: 403,
        };
        assert!(server.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!auth.is_retryable());
        assert!(HttpError::Timeout { url: "u".into() }.is_retryable());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[test]
    fn test_client_builds() {
        assert!(create_http_client().is_ok());
    }
}
