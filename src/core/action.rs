//! # Actions
//!
//! Everything that can happen to the catalog becomes an `Action`.
//! User opens the page? That's `Action::Enter`.
//! Server answers? That's `Action::BooksLoaded { books }`.
//!
//! The `reduce()` function takes the current state and an action,
//! then returns the next state. No side effects here. I/O happens in the
//! effect lanes (see `store::effects`).
//!
//! ```text
//! State + Action  →  reduce()  →  New State
//! ```
//!
//! Actions serialize with a `"type"` tag so they can be journaled and
//! replayed. Tags this build does not know deserialize to `Action::Unknown`,
//! which the reducer passes through untouched.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::book::{Book, BookChanges, BookId, BookPatch, BookRequiredProps, Collection};
use crate::core::state::{BookError, BooksState, ErrorKind, Failure, Operation};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    // -- Books page (view intents) ------------------------------------------
    Enter,
    SelectBook {
        book_id: BookId,
    },
    ClearSelectedBook,
    CreateBook {
        book: BookRequiredProps,
    },
    UpdateBook {
        book_id: BookId,
        changes: BookChanges,
    },
    DeleteBook {
        book_id: BookId,
    },
    DismissError,

    // -- Books API (remote results) -----------------------------------------
    BooksLoaded {
        books: Vec<Book>,
    },
    BookCreated {
        book: Book,
    },
    BookUpdated {
        book: BookPatch,
    },
    BookDeleted {
        book_id: BookId,
    },
    BooksLoadFailed {
        error: BookError,
    },
    BookCreateFailed {
        error: BookError,
    },
    BookUpdateFailed {
        book_id: BookId,
        error: BookError,
    },
    BookDeleteFailed {
        book_id: BookId,
        error: BookError,
    },

    #[serde(other)]
    Unknown,
}

impl Action {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Enter => "[Books Page] Enter",
            Action::SelectBook { .. } => "[Books Page] Select Book",
            Action::ClearSelectedBook => "[Books Page] Clear Selected Book",
            Action::CreateBook { .. } => "[Books Page] Create Book",
            Action::UpdateBook { .. } => "[Books Page] Update Book",
            Action::DeleteBook { .. } => "[Books Page] Delete Book",
            Action::DismissError => "[Books Page] Dismiss Error",
            Action::BooksLoaded { .. } => "[Books API] Books Loaded",
            Action::BookCreated { .. } => "[Books API] Book Created",
            Action::BookUpdated { .. } => "[Books API] Book Updated",
            Action::BookDeleted { .. } => "[Books API] Book Deleted",
            Action::BooksLoadFailed { .. } => "[Books API] Books Load Failed",
            Action::BookCreateFailed { .. } => "[Books API] Book Create Failed",
            Action::BookUpdateFailed { .. } => "[Books API] Book Update Failed",
            Action::BookDeleteFailed { .. } => "[Books API] Book Delete Failed",
            Action::Unknown => "[Unknown]",
        }
    }

    /// True for actions produced by the effect lanes.
    pub fn is_api_result(&self) -> bool {
        matches!(
            self,
            Action::BooksLoaded { .. }
                | Action::BookCreated { .. }
                | Action::BookUpdated { .. }
                | Action::BookDeleted { .. }
                | Action::BooksLoadFailed { .. }
                | Action::BookCreateFailed { .. }
                | Action::BookUpdateFailed { .. }
                | Action::BookDeleteFailed { .. }
        )
    }
}

/// Applies `action` to `state` and returns the next snapshot.
///
/// Never mutates `state`. Actions the reducer has no rule for (including the
/// view intents that only the effect lanes act on) return the very same `Arc`.
pub fn reduce(state: &Arc<BooksState>, action: &Action) -> Arc<BooksState> {
    match action {
        Action::Enter => next(state, |s| {
            s.active_book_id = None;
            s.last_error = None;
        }),
        Action::ClearSelectedBook => next(state, |s| s.active_book_id = None),
        Action::SelectBook { book_id } => next(state, |s| s.active_book_id = Some(book_id.clone())),
        Action::DismissError => next(state, |s| s.last_error = None),

        Action::BooksLoaded { books } => next(state, |s| {
            s.collection = Arc::new(Collection::from_books(books.iter().cloned()));
        }),
        Action::BookCreated { book } => next(state, |s| {
            s.collection = Arc::new(s.collection.inserted(book.clone()));
            s.active_book_id = None;
        }),
        Action::BookUpdated { book } => next(state, |s| {
            match s.collection.merged(book) {
                Some(collection) => s.collection = Arc::new(collection),
                None => debug!("Update for unknown book {} ignored", book.id),
            }
            s.active_book_id = None;
        }),
        Action::BookDeleted { book_id } => next(state, |s| {
            if let Some(collection) = s.collection.removed(book_id) {
                s.collection = Arc::new(collection);
            }
            s.active_book_id = None;
        }),

        Action::BooksLoadFailed { error } => next(state, |s| {
            s.last_error = Some(failure(Operation::List, None, error));
        }),
        Action::BookCreateFailed { error } => next(state, |s| {
            s.last_error = Some(failure(Operation::Create, None, error));
        }),
        Action::BookUpdateFailed { book_id, error } => next(state, |s| {
            // The server no longer has it, so neither should we.
            if error.kind == ErrorKind::NotFound
                && let Some(collection) = s.collection.removed(book_id)
            {
                s.collection = Arc::new(collection);
                if s.active_book_id.as_ref() == Some(book_id) {
                    s.active_book_id = None;
                }
            }
            s.last_error = Some(failure(Operation::Update, Some(book_id), error));
        }),
        Action::BookDeleteFailed { book_id, error } => next(state, |s| {
            s.last_error = Some(failure(Operation::Delete, Some(book_id), error));
        }),

        Action::CreateBook { .. }
        | Action::UpdateBook { .. }
        | Action::DeleteBook { .. }
        | Action::Unknown => Arc::clone(state),
    }
}

/// Copies the snapshot, applies `change` to the copy and wraps it.
fn next(state: &Arc<BooksState>, change: impl FnOnce(&mut BooksState)) -> Arc<BooksState> {
    let mut copy = BooksState::clone(state);
    change(&mut copy);
    Arc::new(copy)
}

fn failure(operation: Operation, book_id: Option<&BookId>, error: &BookError) -> Failure {
    Failure {
        operation,
        book_id: book_id.cloned(),
        error: error.clone(),
    }
}
