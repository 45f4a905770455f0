#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persisted state for the ingestion pipeline.
//!
//! Every stateful component (cache writer, circuit breaker, outage
//! detector, history store) receives a [`StateStore`] instead of touching
//! the filesystem itself. Documents are addressed by [`StateDoc`].
//!
//! Reads take no lock and may race a writer; callers must treat
//! unparseable content as absent, which [`load`] and [`modify`] do.
//! Writes and read-modify-write updates hold an exclusive advisory lock.

pub mod file;
pub mod memory;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;

/// Errors that can occur while reading or writing state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another writer held the lock for every retry.
    #[error("timed out waiting for lock on {doc} after {attempts} attempts")]
    LockTimeout {
        /// The contended document.
        doc: String,
        /// How many times acquisition was tried.
        attempts: u32,
    },
}

/// One persisted document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateDoc {
    /// Merged weather cache for a site.
    WeatherCache(String),
    /// Ongoing or recovering outage for a site.
    Outage(String),
    /// Observation history for a site.
    History(String),
    /// Circuit breaker state for every (site, source kind) pair.
    Backoff,
    /// A file owned by another process (a webcam image). Only its
    /// modification time is ever consulted.
    External(PathBuf),
}

impl StateDoc {
    /// Path relative to the store root. `External` paths are returned as
    /// configured.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::WeatherCache(site) => PathBuf::from("weather").join(format!("{site}.json")),
            Self::Outage(site) => PathBuf::from("outage").join(format!("{site}.json")),
            Self::History(site) => PathBuf::from("history").join(format!("{site}.json")),
            Self::Backoff => PathBuf::from("backoff.json"),
            Self::External(path) => path.clone(),
        }
    }
}

impl fmt::Display for StateDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative_path().display())
    }
}

/// What an [`StateStore::update`] callback wants done with the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    /// Leave the document as it is.
    Keep,
    /// Replace the document's contents.
    Write(String),
    /// Remove the document.
    Delete,
}

/// Callback for [`StateStore::update`]: sees the current contents, if any.
pub type UpdateFn<'a> = dyn FnMut(Option<&str>) -> Result<Update, StateError> + 'a;

/// Storage for state documents.
pub trait StateStore: Send + Sync {
    /// Reads a document without locking.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] for failures other than the document not
    /// existing.
    fn read(&self, doc: &StateDoc) -> Result<Option<String>, StateError>;

    /// Replaces a document atomically under an exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the lock cannot be acquired or the write
    /// fails.
    fn write(&self, doc: &StateDoc, contents: &str) -> Result<(), StateError>;

    /// Read-modify-write under a single exclusive lock. The callback is
    /// invoked exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the lock cannot be acquired, the callback
    /// fails, or the result cannot be persisted.
    fn update(&self, doc: &StateDoc, f: &mut UpdateFn<'_>) -> Result<(), StateError>;

    /// Removes a document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if removal fails.
    fn delete(&self, doc: &StateDoc) -> Result<bool, StateError>;

    /// Last modification time in Unix seconds, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the metadata cannot be read.
    fn modified(&self, doc: &StateDoc) -> Result<Option<i64>, StateError>;
}

fn decode<T: DeserializeOwned>(doc: &StateDoc, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{doc} is corrupt ({e}); treating as absent");
            None
        }
    }
}

/// Loads and deserializes a document.
///
/// A document that fails to parse is deleted and reported as absent.
///
/// # Errors
///
/// Returns [`StateError`] if the read or the cleanup delete fails.
pub fn load<T: DeserializeOwned>(
    store: &dyn StateStore,
    doc: &StateDoc,
) -> Result<Option<T>, StateError> {
    let Some(raw) = store.read(doc)? else {
        return Ok(None);
    };
    let value = decode(doc, &raw);
    if value.is_none() {
        store.delete(doc)?;
    }
    Ok(value)
}

/// Serializes and writes a document.
///
/// # Errors
///
/// Returns [`StateError`] if serialization or the write fails.
pub fn save<T: Serialize>(store: &dyn StateStore, doc: &StateDoc, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(value)?;
    store.write(doc, &json)
}

/// Typed read-modify-write.
///
/// `f` receives the current value (`None` when absent or corrupt) and
/// returns the value to persist (`None` deletes the document) plus a
/// result handed back to the caller.
///
/// # Errors
///
/// Returns [`StateError`] if locking, serialization, or the write fails.
pub fn modify<T, R, F>(store: &dyn StateStore, doc: &StateDoc, f: F) -> Result<R, StateError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(Option<T>) -> (Option<T>, R),
{
    let mut f = Some(f);
    let mut result = None;

    store.update(doc, &mut |raw| {
        let Some(f) = f.take() else {
            return Ok(Update::Keep);
        };
        let existed = raw.is_some();
        let current = raw.and_then(|r| decode::<T>(doc, r));
        let (next, r) = f(current);
        result = Some(r);
        Ok(match next {
            Some(value) => Update::Write(serde_json::to_string_pretty(&value)?),
            None if existed => Update::Delete,
            None => Update::Keep,
        })
    })?;

    result.ok_or_else(|| {
        StateError::Io(std::io::Error::other(format!(
            "update callback for {doc} was never invoked"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        n: u32,
    }

    #[test]
    fn document_paths() {
        assert_eq!(
            StateDoc::WeatherCache("kspb".into()).relative_path(),
            PathBuf::from("weather/kspb.json")
        );
        assert_eq!(StateDoc::Backoff.to_string(), "backoff.json");
        assert_eq!(
            StateDoc::History("kspb".into()).to_string(),
            "history/kspb.json"
        );
    }

    #[test]
    fn corrupt_document_is_deleted_on_load() {
        let store = MemoryStateStore::new();
        let doc = StateDoc::Outage("kspb".into());
        store.write(&doc, "{\"outage_start\": ").unwrap();

        let loaded: Option<Counter> = load(&store, &doc).unwrap();
        assert!(loaded.is_none());
        assert!(store.read(&doc).unwrap().is_none());
    }

    #[test]
    fn modify_round_trips_and_deletes() {
        let store = MemoryStateStore::new();
        let doc = StateDoc::Backoff;

        let seen = modify(&store, &doc, |c: Option<Counter>| {
            let n = c.map_or(0, |c| c.n) + 1;
            (Some(Counter { n }), n)
        })
        .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(load::<Counter>(&store, &doc).unwrap(), Some(Counter { n: 1 }));

        modify(&store, &doc, |_: Option<Counter>| (None, ())).unwrap();
        assert!(store.read(&doc).unwrap().is_none());
    }

    #[test]
    fn modify_replaces_corrupt_content() {
        let store = MemoryStateStore::new();
        let doc = StateDoc::Backoff;
        store.write(&doc, "not json").unwrap();

        let n = modify(&store, &doc, |c: Option<Counter>| {
            assert!(c.is_none());
            (Some(Counter { n: 7 }), 7)
        })
        .unwrap();
        assert_eq!(n, 7);
        assert_eq!(load::<Counter>(&store, &doc).unwrap(), Some(Counter { n: 7 }));
    }
}
