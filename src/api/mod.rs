//! # Remote Collection API
//!
//! The capability the effect lanes call into. Two backends:
//!
//! - [`RestBooksApi`]: JSON over HTTP (reqwest)
//! - [`InMemoryBooksApi`]: process-local, for demos and tests

pub mod provider;
pub mod providers;

use std::sync::Arc;

use log::info;

pub use provider::{ApiError, BooksApi};
pub use providers::{InMemoryBooksApi, RestBooksApi};

use crate::core::config::ResolvedConfig;

/// Build a backend from a resolved config's provider name.
pub fn build_api(config: &ResolvedConfig) -> Result<Arc<dyn BooksApi>, ApiError> {
    let api: Arc<dyn BooksApi> = match config.provider.as_str() {
        "memory" => Arc::new(InMemoryBooksApi::sample()),
        "rest" => Arc::new(RestBooksApi::new(
            config.base_url.clone(),
            config.request_timeout,
        )?),
        other => {
            return Err(ApiError::Config(format!(
                "unknown provider '{other}' (expected \"rest\" or \"memory\")"
            )));
        }
    };
    info!("Using {} books API", api.name());
    Ok(api)
}
