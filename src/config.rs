use std::path::PathBuf;
use std::time::Duration;

use crate::utils::file::FileManager;
use crate::utils::paths::{resolve_data_dir, resolve_games_dir, resolve_log_dir, resolve_root_dir};

pub const AVAILABILITY_TICK: Duration = Duration::from_millis(500);
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
pub const COMMAND_QUEUE_CAPACITY: usize = 10;
pub const RELEASES_PER_PAGE: u32 = 30;
pub const MAX_RELEASE_PAGES: u32 = 5;

const DEFAULT_REPOSITORY: &str = "vanilla-launcher/game";
const DEFAULT_API_URL: &str = "https://api.github.com";

/// Timing knobs for the remote refresher.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub min_interval: Duration,
    pub default_interval: Duration,
    pub rate_limit_max_age: Duration,
    pub releases_max_age: Duration,
    pub remaining_floor: u32,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            default_interval: Duration::from_secs(600),
            rate_limit_max_age: Duration::from_secs(5 * 60),
            releases_max_age: Duration::from_secs(30 * 60),
            remaining_floor: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub repository: String,
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub install_dir: PathBuf,
    pub log_dir: PathBuf,
    pub executable_name: String,
    pub translate_url: Option<String>,
    pub log_filter: String,
    pub http_timeout: Duration,
    pub refresh: RefreshPolicy,
}

fn read_env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_env_u64(key: &str, default: u64, min: u64, max: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
        .clamp(min, max)
}

fn default_executable() -> &'static str {
    if cfg!(target_os = "windows") {
        "game.exe"
    } else {
        "game"
    }
}

impl LauncherConfig {
    pub fn from_env() -> Self {
        let root = resolve_root_dir();
        let defaults = RefreshPolicy::default();
        let refresh = RefreshPolicy {
            min_interval: Duration::from_secs(read_env_u64(
                "LAUNCHER_REFRESH_MIN_SECS",
                defaults.min_interval.as_secs(),
                5,
                3600,
            )),
            default_interval: Duration::from_secs(read_env_u64(
                "LAUNCHER_REFRESH_DEFAULT_SECS",
                defaults.default_interval.as_secs(),
                30,
                86_400,
            )),
            rate_limit_max_age: Duration::from_secs(read_env_u64(
                "LAUNCHER_RATE_LIMIT_MAX_AGE_SECS",
                defaults.rate_limit_max_age.as_secs(),
                10,
                86_400,
            )),
            releases_max_age: Duration::from_secs(read_env_u64(
                "LAUNCHER_RELEASES_MAX_AGE_SECS",
                defaults.releases_max_age.as_secs(),
                60,
                7 * 86_400,
            )),
            remaining_floor: read_env_u64(
                "LAUNCHER_RATE_LIMIT_FLOOR",
                u64::from(defaults.remaining_floor),
                0,
                1000,
            ) as u32,
        };

        Self {
            repository: read_env_string("LAUNCHER_REPOSITORY")
                .unwrap_or_else(|| DEFAULT_REPOSITORY.to_string()),
            api_base_url: read_env_string("LAUNCHER_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            data_dir: resolve_data_dir(&root),
            install_dir: resolve_games_dir(&root),
            log_dir: resolve_log_dir(&root),
            executable_name: read_env_string("LAUNCHER_EXECUTABLE")
                .unwrap_or_else(|| default_executable().to_string()),
            translate_url: read_env_string("LAUNCHER_TRANSLATE_URL"),
            log_filter: read_env_string("LAUNCHER_LOG").unwrap_or_else(|| "info".to_string()),
            http_timeout: Duration::from_secs(read_env_u64("LAUNCHER_HTTP_TIMEOUT_SECS", 30, 5, 600)),
            refresh,
        }
    }

    /// Config rooted at an explicit directory, env ignored.
    pub fn with_root(root: PathBuf, api_base_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            api_base_url: api_base_url.into(),
            data_dir: root.join("config"),
            install_dir: root.join("games"),
            log_dir: root.join("logs"),
            executable_name: default_executable().to_string(),
            translate_url: None,
            log_filter: "info".to_string(),
            http_timeout: Duration::from_secs(30),
            refresh: RefreshPolicy::default(),
        }
    }

    pub fn file_manager(&self) -> FileManager {
        FileManager::new(self.data_dir.clone(), self.install_dir.clone())
    }
}
