//! # Effect Coordinator
//!
//! Watches dispatched actions and turns four of them into remote calls:
//!
//! | Trigger        | Call           | Lane    | Result                              |
//! |----------------|----------------|---------|-------------------------------------|
//! | `Enter`        | `list_books`   | Exhaust | `BooksLoaded` / `BooksLoadFailed`   |
//! | `CreateBook`   | `create_book`  | Concat  | `BookCreated` / `BookCreateFailed`  |
//! | `UpdateBook`   | `update_book`  | Concat  | `BookUpdated` / `BookUpdateFailed`  |
//! | `DeleteBook`   | `delete_book`  | Merge   | `BookDeleted` / `BookDeleteFailed`  |
//!
//! Every call ends in exactly one result action. A delete answered with 404
//! counts as done: the book is gone either way.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use log::{debug, info, warn};

use crate::api::{ApiError, BooksApi};
use crate::core::config::ResolvedConfig;
use crate::core::{Action, BookChanges, BookError, BookId, BookRequiredProps, Operation};
use crate::store::Dispatcher;
use crate::store::lane::{Lane, Policy};

/// Timeout and retry settings applied to every remote call.
#[derive(Debug, Clone)]
pub struct EffectOptions {
    pub request_timeout: Duration,
    /// Extra attempts for transient failures. 0 = no retries.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry_attempts: 0,
            retry_delay: Duration::from_millis(250),
        }
    }
}

impl From<&ResolvedConfig> for EffectOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
        }
    }
}

pub struct BookEffects {
    api: Arc<dyn BooksApi>,
    options: EffectOptions,
    load: Lane,
    create: Lane,
    update: Lane,
    delete: Lane,
}

impl BookEffects {
    pub fn new(api: Arc<dyn BooksApi>, options: EffectOptions, dispatcher: Dispatcher) -> Self {
        let effects = Self {
            api,
            options,
            load: Lane::new("load", Policy::Exhaust, dispatcher.clone()),
            create: Lane::new("create", Policy::Concat, dispatcher.clone()),
            update: Lane::new("update", Policy::Concat, dispatcher.clone()),
            delete: Lane::new("delete", Policy::Merge, dispatcher),
        };
        for lane in effects.lanes() {
            debug!("{} lane runs {:?}", lane.name(), lane.policy());
        }
        effects
    }

    fn lanes(&self) -> [&Lane; 4] {
        [&self.load, &self.create, &self.update, &self.delete]
    }

    /// Starts the remote call `action` asks for, if any.
    pub fn handle(&mut self, action: &Action) {
        let api = Arc::clone(&self.api);
        let options = self.options.clone();
        match action {
            Action::Enter => {
                self.load.submit(load_books(api, options).boxed());
            }
            Action::CreateBook { book } => {
                self.create
                    .submit(create_book(api, options, book.clone()).boxed());
            }
            Action::UpdateBook { book_id, changes } => {
                self.update.submit(
                    update_book(api, options, book_id.clone(), changes.clone()).boxed(),
                );
            }
            Action::DeleteBook { book_id } => {
                self.delete
                    .submit(delete_book(api, options, book_id.clone()).boxed());
            }
            _ => {}
        }
    }

    /// Remote calls started and not yet resolved, across all lanes.
    pub fn in_flight(&self) -> usize {
        self.lanes().iter().map(|lane| lane.in_flight()).sum()
    }
}

async fn load_books(api: Arc<dyn BooksApi>, options: EffectOptions) -> Action {
    match call(Operation::List, &options, || api.list_books()).await {
        Ok(books) => {
            info!("Loaded {} books from {}", books.len(), api.name());
            Action::BooksLoaded { books }
        }
        Err(e) => Action::BooksLoadFailed {
            error: BookError::from(&e),
        },
    }
}

async fn create_book(
    api: Arc<dyn BooksApi>,
    options: EffectOptions,
    book: BookRequiredProps,
) -> Action {
    // One id per intent, shared by every attempt.
    let client_id = BookId::new(uuid::Uuid::new_v4().to_string());
    match call(Operation::Create, &options, || api.create_book(&client_id, &book)).await {
        Ok(book) => Action::BookCreated { book },
        Err(e) => Action::BookCreateFailed {
            error: BookError::from(&e),
        },
    }
}

async fn update_book(
    api: Arc<dyn BooksApi>,
    options: EffectOptions,
    book_id: BookId,
    changes: BookChanges,
) -> Action {
    match call(Operation::Update, &options, || api.update_book(&book_id, &changes)).await {
        Ok(book) => Action::BookUpdated { book: book.into() },
        Err(e) => Action::BookUpdateFailed {
            book_id,
            error: BookError::from(&e),
        },
    }
}

async fn delete_book(api: Arc<dyn BooksApi>, options: EffectOptions, book_id: BookId) -> Action {
    match call(Operation::Delete, &options, || api.delete_book(&book_id)).await {
        Ok(()) => Action::BookDeleted { book_id },
        Err(e) if e.is_not_found() => {
            info!("Book {} was already gone on the server", book_id);
            Action::BookDeleted { book_id }
        }
        Err(e) => Action::BookDeleteFailed {
            book_id,
            error: BookError::from(&e),
        },
    }
}

/// Runs `request` with the configured timeout, retrying transient failures.
async fn call<T, F, Fut>(
    operation: Operation,
    options: &EffectOptions,
    mut request: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(options.request_timeout, request()).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(options.request_timeout)),
        };
        match result {
            Err(e) if e.is_transient() && attempt < options.retry_attempts => {
                attempt += 1;
                warn!(
                    "{} failed ({}), retry {}/{} in {}ms",
                    operation,
                    e,
                    attempt,
                    options.retry_attempts,
                    options.retry_delay.as_millis()
                );
                tokio::time::sleep(options.retry_delay).await;
            }
            Err(e) => {
                warn!("{} failed: {}", operation, e);
                return Err(e);
            }
            Ok(value) => return Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_options(retry_attempts: u32) -> EffectOptions {
        EffectOptions {
            request_timeout: Duration::from_millis(200),
            retry_attempts,
            retry_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_call_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result = call(Operation::List, &fast_options(2), move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ApiError::Network("reset".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_gives_up_after_retry_budget() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), ApiError> =
            call(Operation::List, &fast_options(1), move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Api {
                status: 503,
                message: "busy".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(ApiError::Api { status: 503, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_call_does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<(), ApiError> =
            call(Operation::Create, &fast_options(3), move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::Api {
                status: 422,
                message: "invalid".to_string(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lane_policies() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let effects = BookEffects::new(
            Arc::new(crate::api::InMemoryBooksApi::new()),
            EffectOptions::default(),
            Dispatcher::new(tx),
        );
        let wiring: Vec<(&str, Policy)> = effects
            .lanes()
            .iter()
            .map(|lane| (lane.name(), lane.policy()))
            .collect();
        assert_eq!(
            wiring,
            vec![
                ("load", Policy::Exhaust),
                ("create", Policy::Concat),
                ("update", Policy::Concat),
                ("delete", Policy::Merge),
            ]
        );
    }

    #[tokio::test]
    async fn test_call_times_out() {
        let result: Result<(), ApiError> = call(Operation::List, &fast_options(0), || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ApiError::Timeout(_))));
    }
}
