//! # Core Catalog Logic
//!
//! This module contains the catalog's business logic.
//! It knows nothing about HTTP, terminals or async runtimes.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • BooksState (data)    │
//!                    │  • Action (events)      │
//!                    │  • reduce() (reducer)   │
//!                    │  • selectors (views)    │
//!                    │                         │
//!                    │  No I/O. No UI. Pure.   │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │   Store    │      │  Effects   │      │    CLI     │
//!     │ (dispatch  │      │ (lanes →   │      │  (view)    │
//!     │   loop)    │      │  BooksApi) │      │            │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`book`]: `Book`, `BookId`, `Collection`, the domain model
//! - [`state`]: `BooksState`, the store snapshot, plus failure types
//! - [`action`]: the `Action` enum and `reduce()`
//! - [`selectors`]: derived views, plain and memoized
//! - [`journal`]: action log and replay
//! - [`config`]: settings resolution (the only module here that touches disk
//!   besides the journal)

pub mod action;
pub mod book;
pub mod config;
pub mod journal;
pub mod selectors;
pub mod state;

pub use action::{Action, reduce};
pub use book::{Book, BookChanges, BookId, BookPatch, BookRequiredProps, Collection};
pub use state::{BookError, BooksState, ErrorKind, Failure, Operation};
