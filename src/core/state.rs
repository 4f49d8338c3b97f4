//! # Store State
//!
//! The whole catalog state in one snapshot. Domain logic only, no I/O.
//!
//! ```text
//! BooksState
//! ├── collection: Arc<Collection>      // books keyed by id, insertion order
//! ├── active_book_id: Option<BookId>   // selected book (may dangle)
//! └── last_error: Option<Failure>      // most recent failed remote call
//! ```
//!
//! Snapshots are never mutated in place. `reduce()` in action.rs builds the
//! next one and hands it out as a fresh `Arc`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::book::{BookId, Collection};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooksState {
    pub collection: Arc<Collection>,
    pub active_book_id: Option<BookId>,
    pub last_error: Option<Failure>,
}

impl BooksState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(collection: Collection) -> Self {
        Self {
            collection: Arc::new(collection),
            ..Self::default()
        }
    }
}

/// The remote operation a failure belongs to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Coarse error classification exposed to the view.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failed or timed out.
    Network,
    /// The request was rejected as invalid. Retrying will not help.
    Validation,
    /// The book does not exist on the server.
    NotFound,
    /// The server failed to handle a valid request.
    Server,
}

/// A failed remote call, as carried by the `*Failed` actions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookError {
    pub kind: ErrorKind,
    pub message: String,
    /// True if the same request may succeed when retried.
    #[serde(default)]
    pub transient: bool,
}

impl BookError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let transient = matches!(kind, ErrorKind::Network | ErrorKind::Server);
        Self {
            kind,
            message: message.into(),
            transient,
        }
    }
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// The last failure the view should surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub operation: Operation,
    pub book_id: Option<BookId>,
    pub error: BookError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.book_id {
            Some(id) => write!(f, "{} of book {} failed ({})", self.operation, id, self.error),
            None => write!(f, "{} failed ({})", self.operation, self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_new_is_empty() {
        let state = BooksState::new();
        assert!(state.collection.is_empty());
        assert!(state.active_book_id.is_none());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_book_error_transience_follows_kind() {
        assert!(BookError::new(ErrorKind::Network, "down").transient);
        assert!(BookError::new(ErrorKind::Server, "500").transient);
        assert!(!BookError::new(ErrorKind::Validation, "bad").transient);
        assert!(!BookError::new(ErrorKind::NotFound, "gone").transient);
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure {
            operation: Operation::Delete,
            book_id: Some(BookId::from("7")),
            error: BookError::new(ErrorKind::Server, "boom"),
        };
        assert_eq!(failure.to_string(), "delete of book 7 failed (Server: boom)");
    }
}
