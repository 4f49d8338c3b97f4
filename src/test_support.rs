//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::Arc;

use crate::core::book::{Book, BookId, Collection};
use crate::core::state::BooksState;

/// Builds a book with no description.
pub fn book(id: &str, title: &str, author: &str, earnings: f64) -> Book {
    Book {
        id: BookId::from(id),
        title: title.to_string(),
        author: author.to_string(),
        earnings,
        description: None,
    }
}

/// Creates a state snapshot holding `books` and nothing selected.
pub fn state_with(books: Vec<Book>) -> Arc<BooksState> {
    Arc::new(BooksState::with_collection(Collection::from_books(books)))
}

/// A unique path under the system temp dir.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("bookshelf-{}-{}", uuid::Uuid::new_v4(), name))
}
