//! Error taxonomy shared by the media adapters and the geo/weather services

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when talking to an upstream provider
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The integration is switched off by configuration
    #[error("{0} integration is not enabled")]
    NotEnabled(String),

    /// The upstream had no matching content
    #[error("Not found: {0}")]
    NotFound(String),

    /// The local request quota for a provider is exhausted
    #[error("{provider} rate limit reached, resets at {reset_at}")]
    RateLimited {
        provider: String,
        reset_at: DateTime<Utc>,
    },

    /// Non-success HTTP status or a response we could not make sense of
    #[error("{provider} upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Local filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    /// Builds an `Upstream` error for a non-2xx status
    pub fn status(provider: &str, status: reqwest::StatusCode) -> Self {
        ServiceError::Upstream {
            provider: provider.to_string(),
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }
    }

    /// Builds an `Upstream` error for a body that did not have the expected shape
    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        ServiceError::Upstream {
            provider: provider.to_string(),
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    /// Short message suitable for showing to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::NotEnabled(name) => format!("{} is not configured", name),
            Self::NotFound(_) => "Nothing matched the request".to_string(),
            Self::RateLimited { reset_at, .. } => {
                format!("Too many requests. Try again after {}", reset_at.format("%H:%M UTC"))
            }
            Self::Upstream { provider, .. } => format!("{} is unavailable right now", provider),
            Self::Http(_) => "Network error. Check your connection.".to_string(),
            Self::Io(_) => "Local storage error".to_string(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Checks the response status, turning non-2xx into `ServiceError::Upstream`
pub(crate) fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ServiceError::status(provider, status))
    }
}

/// Reads a JSON body, reporting decode problems as a malformed upstream response
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| ServiceError::malformed(provider, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_includes_status() {
        let err = ServiceError::status("unsplash", reqwest::StatusCode::BAD_GATEWAY);
        let text = err.to_string();
        assert!(text.contains("unsplash"));
        assert!(text.contains("502"));
    }

    #[test]
    fn test_malformed_display_has_no_status() {
        let err = ServiceError::malformed("wikimedia", "missing pages");
        assert_eq!(err.to_string(), "wikimedia upstream error: missing pages");
    }

    #[test]
    fn test_is_not_found() {
        assert!(ServiceError::NotFound("x".into()).is_not_found());
        assert!(!ServiceError::NotEnabled("x".into()).is_not_found());
    }

    #[test]
    fn test_user_messages() {
        let err = ServiceError::NotEnabled("Weather".into());
        assert!(err.user_message().contains("Weather"));

        let err = ServiceError::RateLimited {
            provider: "unsplash".into(),
            reset_at: Utc::now(),
        };
        assert!(err.user_message().contains("Try again"));
    }
}
