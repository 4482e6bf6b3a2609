use serde::Deserialize;
use thiserror::Error;

/// Message the backend returns when two writes race on the same object
pub const CONCURRENCY_ISSUE_MESSAGE: &str =
    "operation failed due to concurrency issue but can be retried";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error (HTTP {status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        details: Option<Box<ApiErrorDetails>>,
    },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid client configuration: {0}")]
    ConfigError(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Too many requests, rate limited")]
    RateLimited,

    #[error("Service unavailable, retry later")]
    ServiceUnavailable,
}

impl ApiError {
    /// True when the backend rejected the call only because of a concurrent write
    pub fn is_concurrency_issue(&self) -> bool {
        match self {
            ApiError::ApiError { message, .. } => message.contains(CONCURRENCY_ISSUE_MESSAGE),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::ApiError { status: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Structured error body, e.g. `{"errors":[{"title":"...","source":{"propertyName":"..."}}]}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetails {
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEntry {
    pub title: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub source: Option<ApiErrorSource>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorSource {
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub property_value: Option<String>,
}

impl ApiErrorDetails {
    /// One line per error, prefixed with the offending property when known
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| match e.source.as_ref().and_then(|s| s.property_name.as_ref()) {
                Some(property) => format!("{}: {}", property, e.title),
                None => e.title.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_issue_is_detected_in_message() {
        let err = ApiError::ApiError {
            status: 500,
            message: format!("project default: {}", CONCURRENCY_ISSUE_MESSAGE),
            details: None,
        };
        assert!(err.is_concurrency_issue());
        assert!(!ApiError::RateLimited.is_concurrency_issue());
    }

    #[test]
    fn not_found_only_for_404() {
        let err = ApiError::ApiError {
            status: 404,
            message: "not found".to_string(),
            details: None,
        };
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
        assert!(!ApiError::ServiceUnavailable.is_not_found());
    }

    #[test]
    fn details_summary_includes_property() {
        let details: ApiErrorDetails = serde_json::from_str(
            r#"{"errors":[{"title":"length must be between 1 and 63","source":{"propertyName":"metadata.name"}},{"title":"bad"}]}"#,
        )
        .unwrap();
        assert_eq!(
            details.summary(),
            "metadata.name: length must be between 1 and 63; bad"
        );
    }
}
