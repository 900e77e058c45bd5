//! Error types shared across the content script.

use log::error;
use thiserror::Error;

/// Failures talking to the local analysis backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },
}

impl ApiError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Http { .. })
    }
}

/// Failures of the raw HTTP transport, before any response is classified.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Request could not be built: {0}")]
    Request(String),

    #[error("Network failure: {0}")]
    Network(String),
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        ApiError::Network(error.to_string())
    }
}

/// DOM access failures. Always local to one element or one observer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomError {
    #[error("Element is no longer attached to the page")]
    Detached,

    #[error("DOM operation failed: {0}")]
    Operation(String),
}

/// Failures extracting a capture from a media element.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CaptureError {
    #[error("No video element found")]
    NoVideo,

    #[error("Element is not a playable video")]
    NotAVideo,

    #[error("Video element disappeared before capture")]
    Detached,

    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    #[error("No active platform handler")]
    NoHandler,

    #[error("A capture is already in progress")]
    Busy,
}

impl From<DomError> for CaptureError {
    fn from(error: DomError) -> Self {
        match error {
            DomError::Detached => CaptureError::Detached,
            DomError::Operation(message) => CaptureError::FrameCapture(message),
        }
    }
}

/// Invalid extension configuration.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid server URL '{0}'")]
    InvalidServerUrl(String),

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// How loudly a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Recoverable,
    Critical,
}

const CRITICAL_KEYWORDS: &[&str] = &[
    "NetworkError",
    "SecurityError",
    "QuotaExceededError",
    "DOMException",
];

impl ErrorSeverity {
    pub fn classify(message: &str) -> ErrorSeverity {
        if CRITICAL_KEYWORDS.iter().any(|keyword| message.contains(keyword)) {
            ErrorSeverity::Critical
        } else {
            ErrorSeverity::Recoverable
        }
    }
}

/// Context attached to critical failure reports.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub user_agent: String,
    pub page_url: String,
}

/// Log a failure at its boundary. Never propagates.
pub fn report_failure(context: &str, failure: &dyn std::error::Error, diagnostics: &Diagnostics) -> ErrorSeverity {
    let message = failure.to_string();
    let severity = ErrorSeverity::classify(&message);

    error!("{} failed: {}", context, message);
    if severity == ErrorSeverity::Critical {
        error!(
            "Critical failure [{}]: {} (url: {}, user agent: {})",
            context, message, diagnostics.page_url, diagnostics.user_agent
        );
    }

    severity
}
