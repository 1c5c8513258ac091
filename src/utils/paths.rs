use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "launcher-sync";
const PORTABLE_MARKER: &str = "portable.config.json";

fn ensure_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if std::fs::create_dir_all(path).is_ok() {
        return Some(path.to_path_buf());
    }
    None
}

fn is_portable_root(path: &Path) -> bool {
    path.join(PORTABLE_MARKER).exists()
}

fn env_dir(key: &str) -> Option<PathBuf> {
    let value = std::env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    ensure_dir(&PathBuf::from(trimmed))
}

pub fn resolve_root_dir() -> PathBuf {
    if let Some(dir) = env_dir("LAUNCHER_ROOT_DIR") {
        return dir;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if is_portable_root(dir) {
                return dir.to_path_buf();
            }
        }
    }

    if let Some(data) = dirs::data_local_dir() {
        if let Some(found) = ensure_dir(&data.join(APP_DIR_NAME)) {
            return found;
        }
    }

    if let Some(data) = dirs::data_dir() {
        if let Some(found) = ensure_dir(&data.join(APP_DIR_NAME)) {
            return found;
        }
    }

    PathBuf::from(".")
}

pub fn resolve_data_dir(root: &Path) -> PathBuf {
    let config = root.join("config");
    ensure_dir(&config).unwrap_or_else(|| root.to_path_buf())
}

pub fn resolve_games_dir(root: &Path) -> PathBuf {
    let games = root.join("games");
    ensure_dir(&games).unwrap_or(games)
}

pub fn resolve_log_dir(root: &Path) -> PathBuf {
    if let Some(dir) = env_dir("LAUNCHER_LOG_DIR") {
        return dir;
    }

    if let Some(found) = ensure_dir(&root.join("logs")) {
        return found;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(found) = ensure_dir(&dir.join("logs")) {
                return found;
            }
        }
    }

    PathBuf::from("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn data_and_games_dirs_live_under_root() {
        let root = std::env::temp_dir().join(format!("launcher-paths-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).expect("create root");

        let data = resolve_data_dir(&root);
        let games = resolve_games_dir(&root);

        assert_eq!(data, root.join("config"));
        assert_eq!(games, root.join("games"));
        assert!(data.is_dir());
        assert!(games.is_dir());
    }
}
