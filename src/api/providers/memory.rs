//! In-process stand-in for the remote collection.
//!
//! Behaves like a well-mannered server: keeps the client id on create (a
//! repeated create is answered with the stored record), merges on update,
//! answers 404 for ids it does not know. Useful for demos and for
//! exercising the store without a network.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;

use crate::api::{ApiError, BooksApi};
use crate::core::{Book, BookChanges, BookId, BookRequiredProps};

#[derive(Default)]
pub struct InMemoryBooksApi {
    books: Mutex<Vec<Book>>,
    latency: Option<Duration>,
}

impl InMemoryBooksApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_books(books: Vec<Book>) -> Self {
        Self {
            books: Mutex::new(books),
            latency: None,
        }
    }

    /// A small catalog to play with.
    pub fn sample() -> Self {
        let book = |id: &str, title: &str, author: &str, earnings: f64| Book {
            id: BookId::from(id),
            title: title.to_string(),
            author: author.to_string(),
            earnings,
            description: None,
        };
        Self::with_books(vec![
            book("1", "The Left Hand of Darkness", "Ursula K. Le Guin", 1200.0),
            book("2", "Kindred", "Octavia E. Butler", 950.5),
            book("3", "Solaris", "Stanisław Lem", 430.25),
        ])
    }

    /// Delays every call by `latency`, to make lane behaviour observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Current server-side contents.
    pub fn snapshot(&self) -> Vec<Book> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Book>> {
        // A panicking test thread can poison the lock; the data is still usable.
        self.books.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn not_found(id: &BookId) -> ApiError {
    ApiError::Api {
        status: 404,
        message: format!("book {id} not found"),
    }
}

#[async_trait]
impl BooksApi for InMemoryBooksApi {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_books(&self) -> Result<Vec<Book>, ApiError> {
        self.simulate_latency().await;
        Ok(self.snapshot())
    }

    async fn create_book(
        &self,
        client_id: &BookId,
        book: &BookRequiredProps,
    ) -> Result<Book, ApiError> {
        self.simulate_latency().await;
        if book.title.trim().is_empty() {
            return Err(ApiError::Api {
                status: 422,
                message: "title must not be empty".to_string(),
            });
        }
        let mut books = self.lock();
        // A repeated create answers with what the first one stored.
        if let Some(existing) = books.iter().find(|existing| &existing.id == client_id) {
            debug!("memory: create of {} replayed", client_id);
            return Ok(existing.clone());
        }
        let created = Book::from_props(client_id.clone(), book.clone());
        debug!("memory: created {}", created.id);
        books.push(created.clone());
        Ok(created)
    }

    async fn update_book(&self, id: &BookId, changes: &BookChanges) -> Result<Book, ApiError> {
        self.simulate_latency().await;
        let mut books = self.lock();
        let entry = books
            .iter_mut()
            .find(|book| &book.id == id)
            .ok_or_else(|| not_found(id))?;
        *entry = entry.merged(changes);
        debug!("memory: updated {}", id);
        Ok(entry.clone())
    }

    async fn delete_book(&self, id: &BookId) -> Result<(), ApiError> {
        self.simulate_latency().await;
        let mut books = self.lock();
        let before = books.len();
        books.retain(|book| &book.id != id);
        if books.len() == before {
            return Err(not_found(id));
        }
        debug!("memory: deleted {}", id);
        Ok(())
    }
}
