use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{Book, BookChanges, BookError, BookId, BookRequiredProps, ErrorKind};

/// Errors that can occur while talking to the remote collection.
/// Variants carry enough info to determine retryability.
#[derive(Debug)]
pub enum ApiError {
    /// API misconfigured (bad base URL). Not retryable.
    Config(String),
    /// Network-level failure (DNS, connection refused, reset). Retryable.
    Network(String),
    /// No answer within the request timeout. Retryable.
    Timeout(Duration),
    /// API returned an error response. Retryable if status >= 500, 429 or 408.
    Api { status: u16, message: String },
    /// Failed to parse the response body. Not retryable.
    Parse(String),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => ErrorKind::Network,
            ApiError::Api { status: 404, .. } => ErrorKind::NotFound,
            ApiError::Api { status: 408, .. } => ErrorKind::Network,
            ApiError::Api { status, .. } if *status == 429 || *status >= 500 => ErrorKind::Server,
            ApiError::Api { .. } | ApiError::Config(_) => ErrorKind::Validation,
            ApiError::Parse(_) => ErrorKind::Server,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) => true,
            ApiError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            ApiError::Config(_) | ApiError::Parse(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(msg) => write!(f, "config error: {msg}"),
            ApiError::Network(msg) => write!(f, "network error: {msg}"),
            ApiError::Timeout(after) => write!(f, "timed out after {}ms", after.as_millis()),
            ApiError::Api { status, message } => {
                write!(f, "API error (HTTP {status}): {message}")
            }
            ApiError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<&ApiError> for BookError {
    fn from(e: &ApiError) -> Self {
        BookError {
            kind: e.kind(),
            message: e.to_string(),
            transient: e.is_transient(),
        }
    }
}

/// The remote book collection the store synchronizes with.
#[async_trait]
pub trait BooksApi: Send + Sync {
    /// Returns the name of the backend (for logs).
    fn name(&self) -> &str;

    /// Fetches the whole collection.
    async fn list_books(&self) -> Result<Vec<Book>, ApiError>;

    /// Creates a book. The returned record, with its server-assigned id, is authoritative.
    ///
    /// `client_id` is generated once per create intent and reused on every
    /// retry, so a backend that honours it never stores the book twice.
    async fn create_book(
        &self,
        client_id: &BookId,
        book: &BookRequiredProps,
    ) -> Result<Book, ApiError>;

    /// Applies partial changes and returns the merged record.
    async fn update_book(&self, id: &BookId, changes: &BookChanges) -> Result<Book, ApiError>;

    async fn delete_book(&self, id: &BookId) -> Result<(), ApiError>;
}
