//! Persistence of the "last seen" watermark.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::CursorError;

/// How far back to look when no usable cursor is stored.
pub const LOOKBACK_HOURS: i64 = 12;

/// Default cursor file name, relative to the home directory.
pub const CURSOR_FILE_NAME: &str = ".pagerduty.ts";

/// Storage for the sync cursor.
#[cfg_attr(test, mockall::automock)]
pub trait CursorStore: Send + Sync {
    /// Load the stored cursor, `None` when nothing has been stored yet.
    fn load(&self) -> Result<Option<DateTime<Utc>>, CursorError>;

    /// Persist a cursor, replacing the previous one.
    fn store(&self, at: DateTime<Utc>) -> Result<(), CursorError>;
}

/// Reading with the look-back fallback, available on every [`CursorStore`].
pub trait CursorStoreExt: CursorStore {
    /// Read the cursor, falling back to [`LOOKBACK_HOURS`] before `now` when
    /// it is missing or unreadable.
    fn read(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let fallback = now - Duration::hours(LOOKBACK_HOURS);
        match self.load() {
            Ok(Some(at)) => at,
            Ok(None) => {
                warn!(since = %fallback, "No stored cursor, looking back {LOOKBACK_HOURS} hours");
                fallback
            }
            Err(e) => {
                warn!(
                    error = %e,
                    since = %fallback,
                    "Unusable cursor, looking back {LOOKBACK_HOURS} hours"
                );
                fallback
            }
        }
    }
}

impl<T: CursorStore + ?Sized> CursorStoreExt for T {}

/// Cursor kept in a small text file holding one RFC 3339 timestamp.
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    path: PathBuf,
}

impl FileCursorStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Cursor file in the user's home directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CURSOR_FILE_NAME)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>, CursorError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CursorError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value = content.trim();
        DateTime::parse_from_rfc3339(value)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|source| CursorError::Parse {
                path: self.path.clone(),
                value: value.to_string(),
                source,
            })
    }

    fn store(&self, at: DateTime<Utc>) -> Result<(), CursorError> {
        let value = at.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let io_error = |source| CursorError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_error)?;

        // Written beside the target and renamed over it, so a crash never
        // leaves a truncated cursor behind.
        let mut staged = NamedTempFile::new_in(dir).map_err(io_error)?;
        staged.write_all(value.as_bytes()).map_err(io_error)?;
        staged.as_file().sync_all().map_err(io_error)?;
        staged.persist(&self.path).map_err(|e| io_error(e.error))?;

        debug!(path = %self.path.display(), cursor = %value, "Cursor saved");
        Ok(())
    }
}

/// In-process cursor store, for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    value: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryCursorStore {
    #[must_use]
    pub fn new(initial: Option<DateTime<Utc>>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }

    /// Current stored value.
    pub fn get(&self) -> Option<DateTime<Utc>> {
        *self.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CursorStore for MemoryCursorStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>, CursorError> {
        Ok(self.get())
    }

    fn store(&self, at: DateTime<Utc>) -> Result<(), CursorError> {
        *self.value.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(at);
        Ok(())
    }
}
