use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{LauncherError, Result};
use crate::models::{ReleaseCache, Settings};
use crate::utils::file::{FileManager, RELEASE_CACHE_FILE, SETTINGS_FILE};

/// A record that lives in exactly one JSON file under the data dir.
pub trait Persisted: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {
    const FILE_NAME: &'static str;
}

impl Persisted for Settings {
    const FILE_NAME: &'static str = SETTINGS_FILE;
}

impl Persisted for ReleaseCache {
    const FILE_NAME: &'static str = RELEASE_CACHE_FILE;
}

/// Lock-guarded record with snapshot reads and closure updates.
///
/// The lock is only ever held for an in-memory copy or mutation; disk I/O in
/// `load`/`save` happens outside of it.
#[derive(Clone)]
pub struct Store<T: Persisted> {
    inner: Arc<RwLock<T>>,
    files: FileManager,
}

impl<T: Persisted> Store<T> {
    pub fn new(files: FileManager) -> Self {
        Self {
            inner: Arc::new(RwLock::new(T::default())),
            files,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.files.data_file(T::FILE_NAME)
    }

    pub fn get(&self) -> T {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Borrowing read for callers that only need a field or two.
    pub fn read<R>(&self, inspect: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inspect(&guard)
    }

    pub fn update<R>(&self, mutate: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        mutate(&mut guard)
    }

    pub fn replace(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Returns `false` when no file exists and the defaults stay in place.
    pub fn load(&self) -> Result<bool> {
        let path = self.path();
        let Some(bytes) = self.files.read_optional(&path)? else {
            tracing::info!("no saved state at {}, using defaults", path.display());
            return Ok(false);
        };
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|err| LauncherError::Data(format!("{}: {}", path.display(), err)))?;
        self.replace(value);
        tracing::info!("loaded {}", path.display());
        Ok(true)
    }

    pub fn save(&self) -> Result<()> {
        let snapshot = self.get();
        let payload = serde_json::to_vec_pretty(&snapshot)?;
        let path = self.path();
        self.files.write_atomic(&path, &payload)?;
        tracing::debug!("saved {} ({} bytes)", path.display(), payload.len());
        Ok(())
    }
}
