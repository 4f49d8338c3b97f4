//! # Command Line Host
//!
//! A thin view over the store: every command enters the books page (one
//! `Enter`, waiting for the load to resolve), dispatches its intent and
//! prints what the resulting state shows.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::broadcast;

use crate::Provider;
use crate::api::{ApiError, BooksApi};
use crate::core::config::{CliOverrides, ResolvedConfig};
use crate::core::journal::{self, Journal, JournalError};
use crate::core::selectors::{self, earnings_total};
use crate::core::{
    Action, Book, BookChanges, BookError, BookId, BookRequiredProps, BooksState, Failure,
    Operation,
};
use crate::store::{EffectOptions, Store, StoreError, StoreHandle, StoreOptions};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "bookshelf", about = "Book catalog client")]
pub struct Args {
    /// Books backend to use
    #[arg(short, long, value_enum)]
    pub provider: Option<Provider>,

    /// Base URL of the REST backend
    #[arg(long)]
    pub api_url: Option<String>,

    /// Append every action to this JSON-lines file
    #[arg(long)]
    pub journal: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            provider: self.provider.map(|p| p.as_str().to_string()),
            base_url: self.api_url.clone(),
            journal_file: self.journal.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// List every book
    List,
    /// Show one book
    Show { id: String },
    /// Create a book
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value_t = 0.0)]
        earnings: f64,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change fields of a book
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        earnings: Option<f64>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete one or more books
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Print the catalog's gross earnings
    Total,
    /// Rebuild the state from a journal and list it
    Replay { path: PathBuf },
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    Api(ApiError),
    Journal(JournalError),
    Store(StoreError),
    Io(io::Error),
    /// A remote call ended in a `*Failed` action.
    Failed(Failure),
    NotFound(BookId),
    NothingToUpdate,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Api(e) => write!(f, "{e}"),
            CliError::Journal(e) => write!(f, "{e}"),
            CliError::Store(e) => write!(f, "{e}"),
            CliError::Io(e) => write!(f, "output error: {e}"),
            CliError::Failed(failure) => write!(f, "{failure}"),
            CliError::NotFound(id) => write!(f, "no book with id {id}"),
            CliError::NothingToUpdate => {
                write!(f, "nothing to update (pass --title, --author, --earnings or --description)")
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        CliError::Api(e)
    }
}

impl From<JournalError> for CliError {
    fn from(e: JournalError) -> Self {
        CliError::Journal(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

// ============================================================================
// Running
// ============================================================================

/// Runs `command` against `api` and writes its report to `out`.
pub async fn run(
    command: Command,
    config: &ResolvedConfig,
    api: Arc<dyn BooksApi>,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if let Command::Replay { path } = &command {
        let state = journal::replay(path)?;
        info!("Replayed {} into {} books", path.display(), state.collection.len());
        return print_books(out, &state);
    }

    let journal = config.journal_file.clone().map(Journal::open).transpose()?;
    let store = Store::spawn(
        api,
        StoreOptions {
            effects: EffectOptions::from(config),
            journal,
        },
    );
    let patience = patience(config);

    let result = match enter(&store, patience).await {
        Ok(()) => execute(command, &store, patience, out).await,
        Err(e) => Err(e),
    };
    // Lets the journal see everything reduced so far before the loop stops.
    let _ = store.flush().await;
    let _ = store.shutdown();
    result
}

/// Upper bound for one remote call including its retries. Saturates at
/// `Duration::MAX` for absurd settings.
fn patience(config: &ResolvedConfig) -> Duration {
    let attempts = config.retry_attempts.saturating_add(1);
    config
        .request_timeout
        .saturating_add(config.retry_delay)
        .checked_mul(attempts)
        .map_or(Duration::MAX, |total| total.saturating_add(Duration::from_secs(1)))
}

async fn enter(store: &StoreHandle, patience: Duration) -> Result<(), CliError> {
    let loaded = store
        .dispatch_and_wait(
            Action::Enter,
            |a| matches!(a, Action::BooksLoaded { .. } | Action::BooksLoadFailed { .. }),
            patience,
        )
        .await?;
    match loaded {
        Action::BooksLoadFailed { error } => Err(failed(Operation::List, None, error)),
        _ => Ok(()),
    }
}

async fn execute(
    command: Command,
    store: &StoreHandle,
    patience: Duration,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        Command::List => print_books(out, &store.state()),
        Command::Show { id } => {
            let id = BookId::from(id);
            store.dispatch(Action::SelectBook {
                book_id: id.clone(),
            })?;
            store.flush().await?;
            let state = store.state();
            let book = selectors::select_active_book(&state).ok_or(CliError::NotFound(id))?;
            print_book(out, &book)
        }
        Command::Add {
            title,
            author,
            earnings,
            description,
        } => {
            let book = BookRequiredProps {
                title,
                author,
                earnings,
                description,
            };
            let result = store
                .dispatch_and_wait(
                    Action::CreateBook { book },
                    |a| {
                        matches!(
                            a,
                            Action::BookCreated { .. } | Action::BookCreateFailed { .. }
                        )
                    },
                    patience,
                )
                .await?;
            match result {
                Action::BookCreated { book } => {
                    writeln!(out, "Created {}: {}", book.id, book.title)?;
                    Ok(())
                }
                Action::BookCreateFailed { error } => Err(failed(Operation::Create, None, error)),
                _ => Ok(()),
            }
        }
        Command::Update {
            id,
            title,
            author,
            earnings,
            description,
        } => {
            let changes = BookChanges {
                title,
                author,
                earnings,
                description,
            };
            if changes.is_empty() {
                return Err(CliError::NothingToUpdate);
            }
            let book_id = BookId::from(id);
            let target = book_id.clone();
            let result = store
                .dispatch_and_wait(
                    Action::UpdateBook {
                        book_id: book_id.clone(),
                        changes,
                    },
                    move |a| match a {
                        Action::BookUpdated { book } => book.id == target,
                        Action::BookUpdateFailed { book_id, .. } => *book_id == target,
                        _ => false,
                    },
                    patience,
                )
                .await?;
            match result {
                Action::BookUpdateFailed { book_id, error } => {
                    Err(failed(Operation::Update, Some(book_id), error))
                }
                _ => {
                    let state = store.state();
                    match state.collection.get(&book_id) {
                        Some(book) => print_book(out, book),
                        None => Err(CliError::NotFound(book_id)),
                    }
                }
            }
        }
        Command::Delete { ids } => delete_all(store, ids, patience, out).await,
        Command::Total => {
            let mut total = store.select(earnings_total());
            writeln!(out, "{:.2}", total.current())?;
            Ok(())
        }
        // Handled before the store starts.
        Command::Replay { .. } => Ok(()),
    }
}

/// Dispatches every delete at once and reports each result as it lands.
async fn delete_all(
    store: &StoreHandle,
    ids: Vec<String>,
    patience: Duration,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut pending: HashSet<BookId> = ids.into_iter().map(BookId::from).collect();
    let mut actions = store.actions();
    for book_id in &pending {
        store.dispatch(Action::DeleteBook {
            book_id: book_id.clone(),
        })?;
    }

    let mut failures = Vec::new();
    let now = tokio::time::Instant::now();
    // Instant arithmetic panics on overflow; a saturated patience means "no deadline".
    let deadline = now
        .checked_add(patience)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365));
    while !pending.is_empty() {
        let action = match tokio::time::timeout_at(deadline, actions.recv()).await {
            Ok(Ok(action)) => action,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!("Action stream lagged, {} actions skipped", skipped);
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => return Err(StoreError::Closed.into()),
            Err(_) => return Err(StoreError::Timeout(patience).into()),
        };
        match action {
            Action::BookDeleted { book_id } if pending.remove(&book_id) => {
                writeln!(out, "Deleted {book_id}")?;
            }
            Action::BookDeleteFailed { book_id, error } if pending.remove(&book_id) => {
                let failure = failure(Operation::Delete, Some(book_id), error);
                writeln!(out, "{failure}")?;
                failures.push(failure);
            }
            _ => {}
        }
    }

    match failures.into_iter().next() {
        Some(first) => Err(CliError::Failed(first)),
        None => Ok(()),
    }
}

fn failure(operation: Operation, book_id: Option<BookId>, error: BookError) -> Failure {
    Failure {
        operation,
        book_id,
        error,
    }
}

fn failed(operation: Operation, book_id: Option<BookId>, error: BookError) -> CliError {
    CliError::Failed(failure(operation, book_id, error))
}

// ============================================================================
// Output
// ============================================================================

fn print_books(out: &mut impl Write, state: &BooksState) -> Result<(), CliError> {
    if state.collection.is_empty() {
        writeln!(out, "No books.")?;
        return Ok(());
    }
    for book in state.collection.iter() {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.2}",
            book.id, book.title, book.author, book.earnings
        )?;
    }
    Ok(())
}

fn print_book(out: &mut impl Write, book: &Book) -> Result<(), CliError> {
    writeln!(out, "id:          {}", book.id)?;
    writeln!(out, "title:       {}", book.title)?;
    writeln!(out, "author:      {}", book.author)?;
    writeln!(out, "earnings:    {:.2}", book.earnings)?;
    if let Some(description) = &book.description {
        writeln!(out, "description: {description}")?;
    }
    Ok(())
}
