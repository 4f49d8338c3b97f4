//! # Domain Model
//!
//! Books and the collection that holds them.
//!
//! ```text
//! Collection
//! └── books: Vec<Arc<Book>>    // insertion order, ids unique
//!       ├── id: BookId
//!       ├── title / author
//!       ├── earnings: f64
//!       └── description: Option<String>
//! ```
//!
//! Every `Collection` transformation returns a new collection. Entries that
//! were not touched are shared (`Arc::ptr_eq` holds across versions), so
//! consumers can memoize on identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

/// Stable identifier of a book.
///
/// Backends disagree on whether ids are strings or integers, so both are
/// accepted on the wire and normalized to a string.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BookId(String);

impl BookId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BookId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<'de> Deserialize<'de> for BookId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => BookId(s),
            RawId::Number(n) => BookId(n.to_string()),
        })
    }
}

/// A book as the server knows it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub earnings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Book {
    pub fn from_props(id: BookId, props: BookRequiredProps) -> Self {
        Self {
            id,
            title: props.title,
            author: props.author,
            earnings: props.earnings,
            description: props.description,
        }
    }

    /// Earnings counted toward the catalog total. Non-finite values count as zero.
    pub fn gross_earnings(&self) -> f64 {
        if self.earnings.is_finite() {
            self.earnings
        } else {
            0.0
        }
    }

    /// Shallow merge: fields present in `changes` overwrite, the rest are kept.
    pub fn merged(&self, changes: &BookChanges) -> Book {
        Book {
            id: self.id.clone(),
            title: changes.title.clone().unwrap_or_else(|| self.title.clone()),
            author: changes.author.clone().unwrap_or_else(|| self.author.clone()),
            earnings: changes.earnings.unwrap_or(self.earnings),
            description: changes
                .description
                .clone()
                .or_else(|| self.description.clone()),
        }
    }
}

/// Everything needed to create a book. The server assigns the id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookRequiredProps {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub earnings: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial book fields. `None` means "keep whatever is there".
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BookChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earnings: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BookChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.earnings.is_none()
            && self.description.is_none()
    }
}

/// Changes addressed to one book. Payload of `Action::BookUpdated`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BookPatch {
    pub id: BookId,
    #[serde(flatten)]
    pub changes: BookChanges,
}

impl BookPatch {
    pub fn new(id: BookId, changes: BookChanges) -> Self {
        Self { id, changes }
    }
}

impl From<Book> for BookPatch {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            changes: BookChanges {
                title: Some(book.title),
                author: Some(book.author),
                earnings: Some(book.earnings),
                description: book.description,
            },
        }
    }
}

/// Ordered id → book mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    books: Vec<Arc<Book>>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from a list. Duplicate ids: the last one wins,
    /// keeping the position of the first.
    pub fn from_books(books: impl IntoIterator<Item = Book>) -> Self {
        let mut collection = Collection::new();
        for book in books {
            collection.upsert(Arc::new(book));
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Book>> {
        self.books.iter()
    }

    pub fn as_slice(&self) -> &[Arc<Book>] {
        &self.books
    }

    pub fn get(&self, id: &BookId) -> Option<&Arc<Book>> {
        self.books.iter().find(|book| &book.id == id)
    }

    pub fn contains(&self, id: &BookId) -> bool {
        self.get(id).is_some()
    }

    /// Sum of every book's gross earnings.
    pub fn gross_earnings(&self) -> f64 {
        self.books.iter().map(|book| book.gross_earnings()).sum()
    }

    /// Returns a copy with `book` appended, or replacing the entry with the same id.
    pub fn inserted(&self, book: Book) -> Collection {
        let mut next = self.clone();
        next.upsert(Arc::new(book));
        next
    }

    /// Returns a copy with `patch` merged into its target, or `None` if no
    /// entry has that id.
    pub fn merged(&self, patch: &BookPatch) -> Option<Collection> {
        let index = self.position(&patch.id)?;
        let mut next = self.clone();
        next.books[index] = Arc::new(self.books[index].merged(&patch.changes));
        Some(next)
    }

    /// Returns a copy without `id`, or `None` if it was not there.
    pub fn removed(&self, id: &BookId) -> Option<Collection> {
        let index = self.position(id)?;
        let mut next = self.clone();
        next.books.remove(index);
        Some(next)
    }

    fn position(&self, id: &BookId) -> Option<usize> {
        self.books.iter().position(|book| &book.id == id)
    }

    fn upsert(&mut self, book: Arc<Book>) {
        match self.position(&book.id) {
            Some(index) => self.books[index] = book,
            None => self.books.push(book),
        }
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Arc<Book>;
    type IntoIter = std::slice::Iter<'a, Arc<Book>>;

    fn into_iter(self) -> Self::IntoIter {
        self.books.iter()
    }
}
