//! # Store
//!
//! Owns the one `BooksState` and is the only place it changes.
//!
//! ```text
//!   StoreHandle::dispatch ─┐
//!                          ▼
//!   Lane results ───▶ [ command queue ] ──▶ Store::run
//!                                              │
//!                          ┌───────────────────┼──────────────────┐
//!                          ▼                   ▼                  ▼
//!                 reduce() + publish     broadcast action    BookEffects
//!                 (watch channel)        (actions())         (lanes)
//! ```
//!
//! Every action, whether it comes from a caller or from a finished remote
//! call, goes through the same queue, so reductions never interleave.
//! State is republished only when the reducer returned a new `Arc`.

pub mod effects;
pub mod lane;
pub mod selection;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::api::BooksApi;
use crate::core::journal::Journal;
use crate::core::selectors::Select;
use crate::core::{Action, BooksState, reduce};

pub use effects::{BookEffects, EffectOptions};
pub use selection::Selection;

const ACTION_BUFFER: usize = 256;

/// Messages understood by the store loop.
#[derive(Debug)]
pub enum Command {
    Dispatch(Action),
    /// Answered once every command queued before it has been processed.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store loop has stopped.
    Closed,
    /// The awaited action did not arrive in time.
    Timeout(Duration),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Closed => write!(f, "store is closed"),
            StoreError::Timeout(after) => {
                write!(f, "no matching action within {}ms", after.as_millis())
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Sends actions into the store queue. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Command>,
}

impl Dispatcher {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Queues `action`. Returns false if the store has stopped.
    pub fn dispatch(&self, action: Action) -> bool {
        let label = action.label();
        if self.tx.send(Command::Dispatch(action)).is_err() {
            warn!("Store is closed, dropping {}", label);
            return false;
        }
        true
    }

    fn send(&self, command: Command) -> Result<(), StoreError> {
        self.tx.send(command).map_err(|_| StoreError::Closed)
    }
}

#[derive(Default)]
pub struct StoreOptions {
    pub effects: EffectOptions,
    /// Every reduced action is appended here when set.
    pub journal: Option<Journal>,
}

pub struct Store {
    state: Arc<BooksState>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<Arc<BooksState>>,
    actions_tx: broadcast::Sender<Action>,
    effects: BookEffects,
    journal: Option<Journal>,
}

impl Store {
    /// Builds a store and the handle used to talk to it. Nothing happens
    /// until `run` is polled.
    pub fn new(api: Arc<dyn BooksApi>, options: StoreOptions) -> (Store, StoreHandle) {
        let state = Arc::new(BooksState::new());
        let (tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Arc::clone(&state));
        let (actions_tx, _) = broadcast::channel(ACTION_BUFFER);
        let dispatcher = Dispatcher::new(tx);

        let store = Store {
            state,
            commands,
            state_tx,
            actions_tx: actions_tx.clone(),
            effects: BookEffects::new(api, options.effects, dispatcher.clone()),
            journal: options.journal,
        };
        let handle = StoreHandle {
            dispatcher,
            state_rx,
            actions_tx,
        };
        (store, handle)
    }

    /// Builds a store and runs it on the current tokio runtime.
    pub fn spawn(api: Arc<dyn BooksApi>, options: StoreOptions) -> StoreHandle {
        let (store, handle) = Store::new(api, options);
        tokio::spawn(store.run());
        handle
    }

    /// Processes commands until `Shutdown`.
    pub async fn run(mut self) {
        info!("Store started");
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Dispatch(action) => self.apply(action),
                Command::Flush(done) => {
                    let _ = done.send(());
                }
                Command::Shutdown => break,
            }
        }
        if self.effects.in_flight() > 0 {
            warn!(
                "Store stopping with {} remote calls unresolved",
                self.effects.in_flight()
            );
        }
        if let Some(journal) = &self.journal {
            info!(
                "Journaled {} actions to {}",
                journal.recorded(),
                journal.path().display()
            );
        }
        info!("Store stopped");
    }

    fn apply(&mut self, action: Action) {
        if action.is_api_result() {
            info!("{}", action.label());
        } else {
            debug!("{}", action.label());
        }

        let next = reduce(&self.state, &action);
        if !Arc::ptr_eq(&next, &self.state) {
            self.state = next;
            self.state_tx.send_replace(Arc::clone(&self.state));
        }

        if let Some(journal) = self.journal.as_mut()
            && let Err(e) = journal.record(&action)
        {
            warn!("Failed to journal {}: {}", action.label(), e);
        }

        self.effects.handle(&action);

        // No subscribers is fine.
        let _ = self.actions_tx.send(action);
    }
}

/// Client side of a running store. Cheap to clone.
#[derive(Clone)]
pub struct StoreHandle {
    dispatcher: Dispatcher,
    state_rx: watch::Receiver<Arc<BooksState>>,
    actions_tx: broadcast::Sender<Action>,
}

impl StoreHandle {
    pub fn dispatch(&self, action: Action) -> Result<(), StoreError> {
        self.dispatcher.send(Command::Dispatch(action))
    }

    /// Latest published state.
    pub fn state(&self) -> Arc<BooksState> {
        Arc::clone(&self.state_rx.borrow())
    }

    /// Raw state stream.
    pub fn watch(&self) -> watch::Receiver<Arc<BooksState>> {
        self.state_rx.clone()
    }

    /// Subscribes `selector` to state changes.
    pub fn select<S: Select>(&self, selector: S) -> Selection<S> {
        Selection::new(selector, self.state_rx.clone())
    }

    /// Every action reduced from now on, in reduction order.
    pub fn actions(&self) -> broadcast::Receiver<Action> {
        self.actions_tx.subscribe()
    }

    /// Resolves once everything dispatched before this call has been reduced.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.dispatcher.send(Command::Flush(tx))?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Dispatches `action` and waits for the first reduced action matching
    /// `until`.
    pub async fn dispatch_and_wait(
        &self,
        action: Action,
        until: impl Fn(&Action) -> bool,
        timeout: Duration,
    ) -> Result<Action, StoreError> {
        // Subscribe first so the answer cannot slip past.
        let actions = self.actions();
        self.dispatch(action)?;
        wait_on(actions, until, timeout).await
    }

    /// Waits for the next reduced action matching `until`.
    pub async fn wait_for(
        &self,
        until: impl Fn(&Action) -> bool,
        timeout: Duration,
    ) -> Result<Action, StoreError> {
        wait_on(self.actions(), until, timeout).await
    }

    pub fn shutdown(&self) -> Result<(), StoreError> {
        self.dispatcher.send(Command::Shutdown)
    }
}

async fn wait_on(
    mut actions: broadcast::Receiver<Action>,
    until: impl Fn(&Action) -> bool,
    timeout: Duration,
) -> Result<Action, StoreError> {
    let wait = async {
        loop {
            match actions.recv().await {
                Ok(action) if until(&action) => return Ok(action),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Action stream lagged, {} actions skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Err(StoreError::Closed),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| StoreError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryBooksApi;
    use crate::core::{BookId, BookRequiredProps};
    use crate::test_support::temp_path;

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn_memory() -> StoreHandle {
        Store::spawn(Arc::new(InMemoryBooksApi::sample()), StoreOptions::default())
    }

    #[tokio::test]
    async fn test_enter_loads_collection() {
        let store = spawn_memory();
        let loaded = store
            .dispatch_and_wait(
                Action::Enter,
                |a| matches!(a, Action::BooksLoaded { .. }),
                WAIT,
            )
            .await
            .unwrap();
        assert!(matches!(loaded, Action::BooksLoaded { ref books } if books.len() == 3));
        assert_eq!(store.state().collection.len(), 3);
    }

    #[tokio::test]
    async fn test_unhandled_action_does_not_republish() {
        let store = spawn_memory();
        let before = store.state();
        let mut watch = store.watch();
        let _ = watch.borrow_and_update();

        store.dispatch(Action::Unknown).unwrap();
        store.flush().await.unwrap();

        assert!(!watch.has_changed().unwrap());
        assert!(Arc::ptr_eq(&before, &store.state()));
    }

    #[tokio::test]
    async fn test_selection_is_reduced_synchronously() {
        let store = spawn_memory();
        store
            .dispatch(Action::SelectBook {
                book_id: BookId::from("2"),
            })
            .unwrap();
        store.flush().await.unwrap();
        assert_eq!(store.state().active_book_id, Some(BookId::from("2")));
    }

    #[tokio::test]
    async fn test_create_round_trip() {
        let store = spawn_memory();
        let created = store
            .dispatch_and_wait(
                Action::CreateBook {
                    book: BookRequiredProps {
                        title: "Beloved".to_string(),
                        author: "Toni Morrison".to_string(),
                        earnings: 10.0,
                        description: None,
                    },
                },
                |a| matches!(a, Action::BookCreated { .. }),
                WAIT,
            )
            .await
            .unwrap();
        let Action::BookCreated { book } = created else {
            panic!("expected BookCreated");
        };
        assert!(store.state().collection.contains(&book.id));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let store = spawn_memory();
        let result = store
            .wait_for(
                |a| matches!(a, Action::BookDeleted { .. }),
                Duration::from_millis(20),
            )
            .await;
        assert_eq!(result, Err(StoreError::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_shutdown_closes_store() {
        let store = spawn_memory();
        store.shutdown().unwrap();
        // The loop drops its receiver once it sees Shutdown.
        let result = store.flush().await;
        assert_eq!(result, Err(StoreError::Closed));
        assert!(store.dispatch(Action::Enter).is_err());
    }

    #[tokio::test]
    async fn test_journal_records_reduced_actions() {
        let path = temp_path("store-journal.jsonl");
        let journal = Journal::open(&path).unwrap();
        let store = Store::spawn(
            Arc::new(InMemoryBooksApi::sample()),
            StoreOptions {
                journal: Some(journal),
                ..Default::default()
            },
        );
        store
            .dispatch_and_wait(
                Action::Enter,
                |a| matches!(a, Action::BooksLoaded { .. }),
                WAIT,
            )
            .await
            .unwrap();
        store
            .dispatch(Action::SelectBook {
                book_id: BookId::from("1"),
            })
            .unwrap();
        store.flush().await.unwrap();

        let replayed = crate::core::journal::replay(&path).unwrap();
        assert_eq!(replayed.collection.len(), 3);
        assert_eq!(replayed.active_book_id, Some(BookId::from("1")));
        let _ = std::fs::remove_file(&path);
    }
}
