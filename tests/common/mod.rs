//! Shared helpers for store integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use bookshelf::api::{ApiError, BooksApi};
use bookshelf::core::{Book, BookChanges, BookId, BookRequiredProps};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn book(id: &str, title: &str, earnings: f64) -> Book {
    Book {
        id: BookId::from(id),
        title: title.to_string(),
        author: "Anon".to_string(),
        earnings,
        description: None,
    }
}

pub fn props(title: &str) -> BookRequiredProps {
    BookRequiredProps {
        title: title.to_string(),
        author: "Anon".to_string(),
        earnings: 1.0,
        description: None,
    }
}

/// A scripted `BooksApi` that records every call and, when gated, parks
/// each call until the test releases it.
#[derive(Default)]
pub struct FakeApi {
    books: Mutex<Vec<Book>>,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<ApiError>>>,
    client_ids: Mutex<Vec<BookId>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn with_books(books: Vec<Book>) -> Self {
        Self {
            books: Mutex::new(books),
            ..Default::default()
        }
    }

    /// Every call waits for a `release` before it completes.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Lets `n` parked (or future) calls complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// The next call to `op` ("list", "create", "update", "delete") fails with `error`.
    pub fn fail_next(&self, op: &'static str, error: ApiError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Calls in the order they started, as "op target".
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.started()
            .iter()
            .filter(|call| call.split(' ').next() == Some(op))
            .count()
    }

    /// Client ids seen by `create_book`, one per attempt.
    pub fn client_ids(&self) -> Vec<BookId> {
        self.client_ids.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Polls until `n` calls have started.
    pub async fn wait_started(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.started.lock().unwrap().len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "only {:?} started, wanted {}",
                self.started(),
                n
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn enter(&self, op: &'static str, target: &str) -> Result<(), ApiError> {
        let label = format!("{op} {target}").trim_end().to_string();
        self.started.lock().unwrap().push(label.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(label);

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn not_found(id: &BookId) -> ApiError {
    ApiError::Api {
        status: 404,
        message: format!("{id} not found"),
    }
}

#[async_trait]
impl BooksApi for FakeApi {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_books(&self) -> Result<Vec<Book>, ApiError> {
        self.enter("list", "").await?;
        Ok(self.books.lock().unwrap().clone())
    }

    async fn create_book(
        &self,
        client_id: &BookId,
        book: &BookRequiredProps,
    ) -> Result<Book, ApiError> {
        self.client_ids.lock().unwrap().push(client_id.clone());
        self.enter("create", &book.title).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
        let created = Book {
            id: BookId::from(id.to_string()),
            title: book.title.clone(),
            author: book.author.clone(),
            earnings: book.earnings,
            description: book.description.clone(),
        };
        self.books.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_book(&self, id: &BookId, changes: &BookChanges) -> Result<Book, ApiError> {
        self.enter("update", id.as_str()).await?;
        let mut books = self.books.lock().unwrap();
        let entry = books
            .iter_mut()
            .find(|book| &book.id == id)
            .ok_or_else(|| not_found(id))?;
        *entry = entry.merged(changes);
        Ok(entry.clone())
    }

    async fn delete_book(&self, id: &BookId) -> Result<(), ApiError> {
        self.enter("delete", id.as_str()).await?;
        let mut books = self.books.lock().unwrap();
        let before = books.len();
        books.retain(|book| &book.id != id);
        if books.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }
}

/// Wrap for handing to `Store::spawn` while keeping a handle for assertions.
pub fn shared(api: FakeApi) -> Arc<FakeApi> {
    Arc::new(api)
}
