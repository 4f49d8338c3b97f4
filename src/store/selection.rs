//! Selector subscriptions.
//!
//! A `Selection` re-runs its selector on every published state and only
//! yields when the projected value differs from the last one it yielded.

use std::sync::Arc;

use tokio::sync::watch;

use crate::core::BooksState;
use crate::core::selectors::Select;

pub struct Selection<S: Select> {
    selector: S,
    states: watch::Receiver<Arc<BooksState>>,
    last: Option<S::Output>,
}

impl<S: Select> Selection<S> {
    pub(crate) fn new(selector: S, states: watch::Receiver<Arc<BooksState>>) -> Self {
        Self {
            selector,
            states,
            last: None,
        }
    }

    /// Value for the latest published state, without waiting.
    pub fn current(&mut self) -> S::Output {
        let state = Arc::clone(&self.states.borrow());
        self.selector.select(&state)
    }

    /// Yields immediately on the first call, then waits for the value to
    /// change. `None` once the store has stopped.
    pub async fn next(&mut self) -> Option<S::Output> {
        loop {
            let state = Arc::clone(&self.states.borrow_and_update());
            let value = self.selector.select(&state);
            if self.last.as_ref() != Some(&value) {
                self.last = Some(value.clone());
                return Some(value);
            }
            if self.states.changed().await.is_err() {
                return None;
            }
        }
    }
}
