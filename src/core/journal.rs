//! # Action Journal
//!
//! Append-only record of every action the store reduced, one JSON object per
//! line. Because the reducer is pure, folding a journal through `reduce()`
//! reproduces the exact state the store had.
//!
//! ```text
//! {"at":1760601600,"action":{"type":"enter"}}
//! {"at":1760601601,"action":{"type":"books_loaded","books":[...]}}
//! ```

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::action::{Action, reduce};
use crate::core::state::BooksState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Unix timestamp (seconds) of when the action was reduced.
    pub at: i64,
    pub action: Action,
}

#[derive(Debug)]
pub enum JournalError {
    Io(io::Error),
    /// A line could not be decoded. `line` is 1-based.
    Parse { line: usize, source: serde_json::Error },
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Io(e) => write!(f, "journal I/O error: {e}"),
            JournalError::Parse { line, source } => {
                write!(f, "journal parse error on line {line}: {source}")
            }
        }
    }
}

impl std::error::Error for JournalError {}

impl From<io::Error> for JournalError {
    fn from(e: io::Error) -> Self {
        JournalError::Io(e)
    }
}

/// Appends actions to a journal file.
pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    recorded: usize,
}

impl Journal {
    /// Opens `path` for appending, creating it (and its parent dir) if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Journaling actions to {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            recorded: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Writes one entry and flushes, so a crash loses at most the current action.
    pub fn record(&mut self, action: &Action) -> Result<(), JournalError> {
        let entry = JournalEntry {
            at: Utc::now().timestamp(),
            action: action.clone(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|e| JournalError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        self.recorded += 1;
        Ok(())
    }
}

/// Reads every entry in a journal file. Blank lines are skipped.
pub fn read_entries(path: &Path) -> Result<Vec<JournalEntry>, JournalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|source| JournalError::Parse {
            line: index + 1,
            source,
        })?;
        entries.push(entry);
    }
    debug!("Read {} journal entries from {}", entries.len(), path.display());
    Ok(entries)
}

/// Folds a journal through the reducer, starting from an empty store.
pub fn replay(path: &Path) -> Result<Arc<BooksState>, JournalError> {
    let entries = read_entries(path)?;
    let state = entries
        .iter()
        .fold(Arc::new(BooksState::new()), |state, entry| reduce(&state, &entry.action));
    info!("Replayed {} actions from {}", entries.len(), path.display());
    Ok(state)
}
