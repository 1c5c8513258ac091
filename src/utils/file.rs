use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::models::Channel;

pub const SETTINGS_FILE: &str = "settings.json";
pub const RELEASE_CACHE_FILE: &str = "release_cache.json";
const DOWNLOADS_DIR: &str = "downloads";

/// Filesystem root handed to every component that touches disk.
#[derive(Clone, Debug)]
pub struct FileManager {
    data_dir: PathBuf,
    install_dir: PathBuf,
}

impl FileManager {
    pub fn new(data_dir: PathBuf, install_dir: PathBuf) -> Self {
        Self {
            data_dir,
            install_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.join(DOWNLOADS_DIR)
    }

    pub fn channel_install_dir(&self, channel: Channel) -> PathBuf {
        self.install_dir.join(channel.dir_name())
    }

    /// Concurrent writers of the same path each use their own temp file; the
    /// last rename wins.
    pub fn write_atomic(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);
        fs::rename(temp_path, path)?;
        Ok(())
    }

    /// Missing files are `Ok(None)`, every other failure is an error.
    pub fn read_optional(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn remove_if_exists(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}
