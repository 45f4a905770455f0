//! On-disk [`StateStore`].
//!
//! Layout under the root directory:
//!
//! ```text
//! weather/<site>.json
//! outage/<site>.json
//! history/<site>.json
//! backoff.json
//! ```
//!
//! Each document has a sibling `<name>.lock` file used for exclusive
//! advisory locking. Writes go to `<name>.tmp` and are renamed over the
//! document so readers never see a half-written file.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use crate::{StateDoc, StateError, StateStore, Update, UpdateFn};

/// Default number of lock acquisition attempts.
const DEFAULT_LOCK_ATTEMPTS: u32 = 50;

/// Default pause between lock attempts.
const DEFAULT_LOCK_RETRY: Duration = Duration::from_millis(100);

/// File-backed state store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
    lock_attempts: u32,
    lock_retry: Duration,
}

/// Holds an exclusive lock until dropped.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::warn!("failed to release state lock: {e}");
        }
    }
}

impl FileStateStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_attempts: DEFAULT_LOCK_ATTEMPTS,
            lock_retry: DEFAULT_LOCK_RETRY,
        }
    }

    /// Overrides how long lock acquisition may take before
    /// [`StateError::LockTimeout`].
    #[must_use]
    pub const fn with_lock_retry(mut self, attempts: u32, pause: Duration) -> Self {
        self.lock_attempts = attempts;
        self.lock_retry = pause;
        self
    }

    /// The directory documents are stored under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, doc: &StateDoc) -> PathBuf {
        match doc {
            StateDoc::External(path) if path.is_absolute() => path.clone(),
            _ => self.root.join(doc.relative_path()),
        }
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        path.with_file_name(name)
    }

    fn lock(&self, doc: &StateDoc, path: &Path) -> Result<LockGuard, StateError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(Self::sibling(path, ".lock"))?;

        for attempt in 1..=self.lock_attempts {
            match file.try_lock() {
                Ok(()) => return Ok(LockGuard { file }),
                Err(TryLockError::WouldBlock) => {
                    log::debug!("{doc} is locked (attempt {attempt}/{})", self.lock_attempts);
                    thread::sleep(self.lock_retry);
                }
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }

        Err(StateError::LockTimeout {
            doc: doc.to_string(),
            attempts: self.lock_attempts,
        })
    }

    fn read_path(path: &Path) -> Result<Option<String>, StateError> {
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Caller must hold the document's lock.
    fn replace(path: &Path, contents: &str) -> Result<(), StateError> {
        let tmp = Self::sibling(path, ".tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn remove(path: &Path) -> Result<bool, StateError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl StateStore for FileStateStore {
    fn read(&self, doc: &StateDoc) -> Result<Option<String>, StateError> {
        Self::read_path(&self.path(doc))
    }

    fn write(&self, doc: &StateDoc, contents: &str) -> Result<(), StateError> {
        let path = self.path(doc);
        let _guard = self.lock(doc, &path)?;
        Self::replace(&path, contents)
    }

    fn update(&self, doc: &StateDoc, f: &mut UpdateFn<'_>) -> Result<(), StateError> {
        let path = self.path(doc);
        let _guard = self.lock(doc, &path)?;
        let current = Self::read_path(&path)?;

        match f(current.as_deref())? {
            Update::Keep => Ok(()),
            Update::Write(contents) => Self::replace(&path, &contents),
            Update::Delete => Self::remove(&path).map(|_| ()),
        }
    }

    fn delete(&self, doc: &StateDoc) -> Result<bool, StateError> {
        Self::remove(&self.path(doc))
    }

    #[allow(clippy::cast_possible_wrap)]
    fn modified(&self, doc: &StateDoc) -> Result<Option<i64>, StateError> {
        let metadata = match fs::metadata(self.path(doc)) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let secs = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64);
        Ok(Some(secs))
    }
}
