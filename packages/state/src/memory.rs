//! In-process [`StateStore`] for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{StateDoc, StateError, StateStore, Update, UpdateFn};

#[derive(Debug, Clone)]
struct Entry {
    contents: Option<String>,
    modified: i64,
}

/// State store backed by a map. Modification times come from a settable
/// clock so freshness logic can be tested deterministically.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    docs: Mutex<BTreeMap<StateDoc, Entry>>,
    now: Mutex<i64>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time stamped on subsequent writes.
    pub fn set_now(&self, now: i64) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Records that an external file exists with the given modification
    /// time, without any contents.
    pub fn touch(&self, doc: StateDoc, modified: i64) {
        let mut docs = self.docs();
        let entry = docs.entry(doc).or_insert(Entry {
            contents: None,
            modified,
        });
        entry.modified = modified;
    }

    fn docs(&self) -> MutexGuard<'_, BTreeMap<StateDoc, Entry>> {
        self.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> i64 {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStateStore {
    fn read(&self, doc: &StateDoc) -> Result<Option<String>, StateError> {
        Ok(self.docs().get(doc).and_then(|e| e.contents.clone()))
    }

    fn write(&self, doc: &StateDoc, contents: &str) -> Result<(), StateError> {
        let modified = self.now();
        self.docs().insert(
            doc.clone(),
            Entry {
                contents: Some(contents.to_owned()),
                modified,
            },
        );
        Ok(())
    }

    fn update(&self, doc: &StateDoc, f: &mut UpdateFn<'_>) -> Result<(), StateError> {
        let modified = self.now();
        let mut docs = self.docs();
        let current = docs.get(doc).and_then(|e| e.contents.clone());

        match f(current.as_deref())? {
            Update::Keep => {}
            Update::Write(contents) => {
                docs.insert(
                    doc.clone(),
                    Entry {
                        contents: Some(contents),
                        modified,
                    },
                );
            }
            Update::Delete => {
                docs.remove(doc);
            }
        }
        Ok(())
    }

    fn delete(&self, doc: &StateDoc) -> Result<bool, StateError> {
        Ok(self.docs().remove(doc).is_some())
    }

    fn modified(&self, doc: &StateDoc) -> Result<Option<i64>, StateError> {
        Ok(self.docs().get(doc).map(|e| e.modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn writes_are_stamped_with_the_clock() {
        let store = MemoryStateStore::new();
        store.set_now(1_000);
        store.write(&StateDoc::Backoff, "{}").unwrap();
        assert_eq!(store.modified(&StateDoc::Backoff).unwrap(), Some(1_000));
    }

    #[test]
    fn touched_files_have_mtime_but_no_contents() {
        let store = MemoryStateStore::new();
        let image = StateDoc::External(PathBuf::from("/var/cams/kspb/north.jpg"));
        store.touch(image.clone(), 500);
        assert_eq!(store.modified(&image).unwrap(), Some(500));
        assert!(store.read(&image).unwrap().is_none());
    }
}
