//! Error types for Phaser documentation retrieval

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while retrieving and converting documentation
#[derive(Debug, Error)]
pub enum DocsError {
    /// URL failed scheme, domain or path validation
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A tool parameter is out of range
    #[error("{0}")]
    InvalidArgument(String),

    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// Request timed out (connect + read)
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Failed to connect to server, or the connection dropped
    #[error("Connection error: {0}")]
    Connect(String),

    /// Response body could not be read or decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Other request error
    #[error("Request failed: {0}")]
    Request(String),

    /// HTTP 404
    #[error("Page not found: {url}")]
    NotFound { url: String },

    /// HTTP 401 / 403
    #[error("Access forbidden ({status}): {url}")]
    Forbidden { status: u16, url: String },

    /// HTTP 429
    #[error("Rate limited: {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx
    #[error("Server error {status}: {url}")]
    ServerError {
        status: u16,
        url: String,
        retry_after: Option<Duration>,
    },

    /// Any other non-success status
    #[error("Client error {status}: {url}")]
    HttpStatus { status: u16, url: String },

    /// Response exceeds the configured size cap
    #[error("Response too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: u64, max: u64 },

    /// Response is not HTML or plain text
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// HTTP 200 carrying a bot-protection challenge instead of documentation
    #[error("Received an anti-bot challenge page instead of documentation: {url}")]
    ChallengePage { url: String },

    /// Page has no identifiable class heading, or no API page exists
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Transient failure persisted through every retry attempt
    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DocsError>,
    },
}

impl DocsError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DocsError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            DocsError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            DocsError::MalformedResponse(err.to_string())
        } else {
            DocsError::Request(err.to_string())
        }
    }

    /// HTTP status carried by this error, if it came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            DocsError::NotFound { .. } => Some(404),
            DocsError::RateLimited { .. } => Some(429),
            DocsError::Forbidden { status, .. }
            | DocsError::ServerError { status, .. }
            | DocsError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-supplied `Retry-After` hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DocsError::RateLimited { retry_after, .. }
            | DocsError::ServerError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Network-level or server-side failure that may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DocsError::Timeout(_)
                | DocsError::Connect(_)
                | DocsError::RateLimited { .. }
                | DocsError::ServerError { .. }
        )
    }

    /// Bad URL or parameter, rejected before any network activity
    pub fn is_validation(&self) -> bool {
        matches!(self, DocsError::InvalidUrl(_) | DocsError::InvalidArgument(_))
    }

    /// Missing page or class
    pub fn is_not_found(&self) -> bool {
        match self {
            DocsError::NotFound { .. } | DocsError::ClassNotFound(_) => true,
            DocsError::RetriesExhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Tool operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ReadDocumentation,
    SearchDocumentation,
    GetApiReference,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::ReadDocumentation => write!(f, "read documentation"),
            Operation::SearchDocumentation => write!(f, "search documentation"),
            Operation::GetApiReference => write!(f, "get API reference"),
        }
    }
}

/// Tool-facing error: a [`DocsError`] prefixed with the failing operation
#[derive(Debug, Error)]
#[error("Failed to {operation}: {source}")]
pub struct ToolError {
    pub operation: Operation,
    #[source]
    pub source: DocsError,
}

impl ToolError {
    pub fn new(operation: Operation, source: DocsError) -> Self {
        Self { operation, source }
    }

    /// True for parameter/URL validation failures (never retried, no I/O done)
    pub fn is_validation(&self) -> bool {
        self.source.is_validation()
    }

    /// True when the page or class does not exist
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}
