//! # Selectors
//!
//! Read-only views derived from a `BooksState` snapshot.
//!
//! Two flavours:
//!
//! - plain functions (`select_all`, `select_active_book`, ...) that compute on every call
//! - `Memoized` selector objects that remember their last input and output,
//!   and only run the projector when an input changed
//!
//! Collection inputs are compared by reference (`ByRef`), not by value, so a
//! memoized selector costs one pointer comparison when nothing changed.

use std::sync::Arc;

use crate::core::book::{Book, BookId, Collection};
use crate::core::state::{BooksState, Failure};

// ============================================================================
// Plain selectors
// ============================================================================

pub fn select_all(state: &BooksState) -> &[Arc<Book>] {
    state.collection.as_slice()
}

pub fn select_active_book_id(state: &BooksState) -> Option<&BookId> {
    state.active_book_id.as_ref()
}

/// The selected book, or `None` if nothing is selected or the id dangles.
pub fn select_active_book(state: &BooksState) -> Option<Arc<Book>> {
    let id = select_active_book_id(state)?;
    state.collection.get(id).cloned()
}

pub fn select_earnings_total(state: &BooksState) -> f64 {
    state.collection.gross_earnings()
}

pub fn select_last_error(state: &BooksState) -> Option<&Failure> {
    state.last_error.as_ref()
}

// ============================================================================
// Memoization
// ============================================================================

/// Wraps an `Arc` so that equality means "same allocation".
#[derive(Debug)]
pub struct ByRef<T>(pub Arc<T>);

impl<T> Clone for ByRef<T> {
    fn clone(&self) -> Self {
        ByRef(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for ByRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Anything that projects a store snapshot into a value a subscriber cares about.
pub trait Select: Send + 'static {
    type Output: Clone + PartialEq + Send + 'static;

    fn select(&mut self, state: &BooksState) -> Self::Output;
}

/// A selector with a one-entry cache keyed by its declared input.
pub struct Memoized<I, O> {
    input: fn(&BooksState) -> I,
    project: fn(&I) -> O,
    cache: Option<(I, O)>,
    recomputations: usize,
}

impl<I: PartialEq, O: Clone> Memoized<I, O> {
    pub fn new(input: fn(&BooksState) -> I, project: fn(&I) -> O) -> Self {
        Self {
            input,
            project,
            cache: None,
            recomputations: 0,
        }
    }

    pub fn select(&mut self, state: &BooksState) -> O {
        let input = (self.input)(state);
        if let Some((cached_input, cached_output)) = &self.cache
            && *cached_input == input
        {
            return cached_output.clone();
        }
        let output = (self.project)(&input);
        self.recomputations += 1;
        self.cache = Some((input, output.clone()));
        output
    }

    /// How many times the projector has run.
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }
}

impl<I, O> Select for Memoized<I, O>
where
    I: PartialEq + Send + 'static,
    O: Clone + PartialEq + Send + 'static,
{
    type Output = O;

    fn select(&mut self, state: &BooksState) -> O {
        Memoized::select(self, state)
    }
}

fn collection_ref(state: &BooksState) -> ByRef<Collection> {
    ByRef(Arc::clone(&state.collection))
}

/// All books, as the shared collection itself.
pub fn all_books() -> Memoized<ByRef<Collection>, Arc<Collection>> {
    Memoized::new(collection_ref, |books| Arc::clone(&books.0))
}

/// The selected book. Recomputes when the collection or the selected id changes.
pub fn active_book() -> Memoized<(ByRef<Collection>, Option<BookId>), Option<Arc<Book>>> {
    Memoized::new(
        |state| (collection_ref(state), state.active_book_id.clone()),
        |(books, id)| id.as_ref().and_then(|id| books.0.get(id).cloned()),
    )
}

/// Catalog earnings. Recomputes only when the collection changes.
pub fn earnings_total() -> Memoized<ByRef<Collection>, f64> {
    Memoized::new(collection_ref, |books| books.0.gross_earnings())
}

/// The failure to surface, if any.
pub fn last_error() -> Memoized<Option<Failure>, Option<Failure>> {
    Memoized::new(|state| state.last_error.clone(), |failure| failure.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{Action, reduce};
    use crate::test_support::{book, state_with};

    #[test]
    fn test_select_all_returns_every_book() {
        let state = state_with(vec![book("1", "A", "B", 1.0), book("2", "C", "D", 2.0)]);
        assert_eq!(select_all(&state).len(), 2);
    }

    #[test]
    fn test_active_book_resolves_selected_id() {
        let state = state_with(vec![book("1", "A", "B", 1.0)]);
        let state = reduce(&state, &Action::SelectBook { book_id: "1".into() });
        assert_eq!(select_active_book(&state).unwrap().title, "A");
    }

    #[test]
    fn test_dangling_active_id_resolves_to_none() {
        let mut state = BooksState::clone(&state_with(vec![book("1", "A", "B", 1.0)]));
        state.active_book_id = Some("X".into());
        assert!(select_active_book(&state).is_none());
        assert!(active_book().select(&state).is_none());
    }

    #[test]
    fn test_no_selection_resolves_to_none() {
        let state = state_with(vec![book("1", "A", "B", 1.0)]);
        assert!(select_active_book(&state).is_none());
    }

    #[test]
    fn test_earnings_total_sums_collection() {
        let state = state_with(vec![
            book("1", "A", "B", 10.0),
            book("2", "C", "D", 20.0),
            book("3", "E", "F", 30.0),
        ]);
        assert_eq!(select_earnings_total(&state), 60.0);
        assert_eq!(earnings_total().select(&state), 60.0);
    }

    #[test]
    fn test_earnings_total_of_empty_collection_is_zero() {
        assert_eq!(select_earnings_total(&BooksState::new()), 0.0);
    }

    #[test]
    fn test_earnings_ignores_selection_changes() {
        let mut selector = earnings_total();
        let state = state_with(vec![book("1", "A", "B", 10.0)]);
        assert_eq!(selector.select(&state), 10.0);

        let selected = reduce(&state, &Action::SelectBook { book_id: "1".into() });
        let cleared = reduce(&selected, &Action::ClearSelectedBook);
        assert_eq!(selector.select(&selected), 10.0);
        assert_eq!(selector.select(&cleared), 10.0);
        assert_eq!(selector.recomputations(), 1);

        let created = reduce(
            &cleared,
            &Action::BookCreated {
                book: book("2", "C", "D", 5.0),
            },
        );
        assert_eq!(selector.select(&created), 15.0);
        assert_eq!(selector.recomputations(), 2);
    }

    #[test]
    fn test_all_books_returns_identical_value_when_unchanged() {
        let mut selector = all_books();
        let state = state_with(vec![book("1", "A", "B", 1.0)]);
        let first = selector.select(&state);
        let selected = reduce(&state, &Action::SelectBook { book_id: "1".into() });
        let second = selector.select(&selected);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(selector.recomputations(), 1);
    }

    #[test]
    fn test_active_book_recomputes_on_selection_change() {
        let mut selector = active_book();
        let state = state_with(vec![book("1", "A", "B", 1.0), book("2", "C", "D", 2.0)]);
        assert!(selector.select(&state).is_none());

        let first = reduce(&state, &Action::SelectBook { book_id: "1".into() });
        assert_eq!(selector.select(&first).unwrap().title, "A");
        assert_eq!(selector.select(&first).unwrap().title, "A");
        assert_eq!(selector.recomputations(), 2);

        let second = reduce(&first, &Action::SelectBook { book_id: "2".into() });
        assert_eq!(selector.select(&second).unwrap().title, "C");
        assert_eq!(selector.recomputations(), 3);
    }

    #[test]
    fn test_by_ref_compares_identity() {
        let a = Arc::new(Collection::new());
        let b = Arc::new(Collection::new());
        assert!(ByRef(Arc::clone(&a)) == ByRef(Arc::clone(&a)));
        assert!(ByRef(a) != ByRef(b));
    }
}
