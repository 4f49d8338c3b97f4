//! REST implementation of the remote collection.
//!
//! Talks JSON to a json-server style backend:
//! - `GET    {base}/books`        list
//! - `POST   {base}/books`        create (body carries a client-generated id)
//! - `PATCH  {base}/books/{id}`   partial update, returns the merged record
//! - `DELETE {base}/books/{id}`   delete

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::{ApiError, BooksApi};
use crate::core::{Book, BookChanges, BookId, BookRequiredProps};

// ============================================================================
// Wire Types
// ============================================================================

/// Create body. json-server keeps the id it is given; other backends
/// overwrite it, which is fine since we only trust the echoed record.
/// The id stays the same across retries of one create.
#[derive(Serialize, Debug)]
struct CreateBookRequest<'a> {
    id: &'a BookId,
    #[serde(flatten)]
    book: &'a BookRequiredProps,
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct RestBooksApi {
    base_url: reqwest::Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl RestBooksApi {
    /// Creates a REST client.
    ///
    /// # Arguments
    /// * `base_url` - Server root; `/books` is appended
    /// * `timeout` - Per-request timeout enforced by the HTTP client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let raw = base_url.into();
        let base_url = reqwest::Url::parse(&raw)
            .map_err(|e| ApiError::Config(format!("invalid base URL '{raw}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ApiError::Config(format!(
                "base URL must start with http:// or https://, got '{raw}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;
        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Config(format!("cannot extend base URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn books_url(&self) -> Result<reqwest::Url, ApiError> {
        self.endpoint(&["books"])
    }

    fn book_url(&self, id: &BookId) -> Result<reqwest::Url, ApiError> {
        self.endpoint(&["books", id.as_str()])
    }

    fn transport_error(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Network(e.to_string())
        }
    }

    /// Sends a request and turns non-2xx answers into `ApiError::Api`.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        debug!("Books API response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("Books API error: {} - {}", status, err_body);
            return Err(ApiError::Api {
                status,
                message: err_body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("Undecodable Books API body: {}", body);
            ApiError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl BooksApi for RestBooksApi {
    fn name(&self) -> &str {
        "rest"
    }

    async fn list_books(&self) -> Result<Vec<Book>, ApiError> {
        let url = self.books_url()?;
        info!("GET {}", url);
        let books: Vec<Book> = self.send_json(self.client.get(url)).await?;
        debug!("Listed {} books", books.len());
        Ok(books)
    }

    async fn create_book(
        &self,
        client_id: &BookId,
        book: &BookRequiredProps,
    ) -> Result<Book, ApiError> {
        let url = self.books_url()?;
        let body = CreateBookRequest {
            id: client_id,
            book,
        };
        info!("POST {} (id={}, title={:?})", url, client_id, book.title);
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn update_book(&self, id: &BookId, changes: &BookChanges) -> Result<Book, ApiError> {
        let url = self.book_url(id)?;
        info!("PATCH {}", url);
        self.send_json(self.client.patch(url).json(changes)).await
    }

    async fn delete_book(&self, id: &BookId) -> Result<(), ApiError> {
        let url = self.book_url(id)?;
        info!("DELETE {}", url);
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
