//! Typed errors for language-model calls
//!
//! The analyzer retries transient failures (rate limit, 5xx, network) once and
//! surfaces the rest immediately.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// 401/403: key missing or rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Any 5xx from the provider
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited(_) | LlmError::Provider(_) | LlmError::Network(_)
        )
    }

    pub fn from_http_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Unauthorized(body),
            429 => LlmError::RateLimited(body),
            400 => LlmError::BadRequest(body),
            500..=599 => LlmError::Provider(body),
            code => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", code, body)),
        }
    }

    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            LlmError::Network(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            LlmError::Other(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_codes_map_to_variants() {
        let cases = [
            (StatusCode::UNAUTHORIZED, false),
            (StatusCode::FORBIDDEN, false),
            (StatusCode::BAD_REQUEST, false),
            (StatusCode::TOO_MANY_REQUESTS, true),
            (StatusCode::SERVICE_UNAVAILABLE, true),
            (StatusCode::NOT_FOUND, false),
        ];
        for (status, transient) in cases {
            let err = LlmError::from_http_status(status, "body".into());
            assert_eq!(err.is_transient(), transient, "{}", status);
        }
        assert!(matches!(
            LlmError::from_http_status(StatusCode::FORBIDDEN, "no".into()),
            LlmError::Unauthorized(_)
        ));
    }

    #[test]
    fn other_statuses_keep_the_code() {
        let err = LlmError::from_http_status(StatusCode::NOT_FOUND, "missing model".into());
        assert_eq!(err.to_string(), "HTTP 404: missing model");
    }
}
