use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Filesystem error: {0}")]
    Filesystem(String),
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Data error: {0}")]
    Data(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Queue error: {0}")]
    Queue(String),
}

/// Coarse grouping used when turning an error into a status line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    Filesystem,
    Network,
    Cache,
    Data,
    Config,
}

impl LauncherError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LauncherError::Network(_) | LauncherError::Http(_) => ErrorCategory::Network,
            LauncherError::Io(_)
            | LauncherError::Filesystem(_)
            | LauncherError::InvalidArchive(_)
            | LauncherError::Archive(_) => ErrorCategory::Filesystem,
            LauncherError::Cache(_) => ErrorCategory::Cache,
            LauncherError::Serde(_) | LauncherError::Data(_) => ErrorCategory::Data,
            LauncherError::Config(_) | LauncherError::Queue(_) => ErrorCategory::Config,
        }
    }

    /// Short prefix shown in front of the error in the status slot.
    pub fn status_prefix(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Filesystem => "Disk problem",
            ErrorCategory::Network => "Connection problem",
            ErrorCategory::Cache => "Release data unavailable",
            ErrorCategory::Data => "Saved data is corrupt",
            ErrorCategory::Config => "Launcher problem",
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_taxonomy() {
        assert_eq!(
            LauncherError::InvalidArchive("x".into()).category(),
            ErrorCategory::Filesystem
        );
        assert_eq!(LauncherError::Http("HTTP 500".into()).category(), ErrorCategory::Network);
        assert_eq!(LauncherError::Cache("no assets".into()).category(), ErrorCategory::Cache);
        let serde_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert_eq!(LauncherError::from(serde_err).category(), ErrorCategory::Data);
    }
}
