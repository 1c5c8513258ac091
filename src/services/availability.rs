use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

use crate::config::AVAILABILITY_TICK;
use crate::models::Channel;
use crate::services::model::UiRefresh;
use crate::utils::file::FileManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalTarget {
    StableExecutable,
    PrereleaseExecutable,
    DownloadsDir,
}

impl LocalTarget {
    pub const ALL: [LocalTarget; 3] = [
        LocalTarget::StableExecutable,
        LocalTarget::PrereleaseExecutable,
        LocalTarget::DownloadsDir,
    ];

    pub fn executable(channel: Channel) -> Self {
        match channel {
            Channel::Stable => LocalTarget::StableExecutable,
            Channel::Prerelease => LocalTarget::PrereleaseExecutable,
        }
    }
}

pub type AvailabilityMap = HashMap<LocalTarget, bool>;

/// Polls a fixed set of install paths and keeps the last seen state.
#[derive(Clone)]
pub struct AvailabilityWatcher {
    files: FileManager,
    executable_name: String,
    state: Arc<RwLock<AvailabilityMap>>,
}

impl AvailabilityWatcher {
    pub fn new(files: FileManager, executable_name: String) -> Self {
        let initial = LocalTarget::ALL.iter().map(|target| (*target, false)).collect();
        Self {
            files,
            executable_name,
            state: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn target_path(&self, target: LocalTarget) -> PathBuf {
        match target {
            LocalTarget::StableExecutable => self
                .files
                .channel_install_dir(Channel::Stable)
                .join(&self.executable_name),
            LocalTarget::PrereleaseExecutable => self
                .files
                .channel_install_dir(Channel::Prerelease)
                .join(&self.executable_name),
            LocalTarget::DownloadsDir => self.files.downloads_dir(),
        }
    }

    pub fn snapshot(&self) -> AvailabilityMap {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_available(&self, target: LocalTarget) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target)
            .copied()
            .unwrap_or(false)
    }

    async fn is_present(&self, target: LocalTarget) -> bool {
        match tokio::fs::metadata(self.target_path(target)).await {
            Ok(meta) => match target {
                LocalTarget::DownloadsDir => meta.is_dir(),
                _ => meta.is_file(),
            },
            Err(_) => false,
        }
    }

    /// Re-stats every target; returns `true` only when the map changed.
    pub async fn poll_once(&self) -> bool {
        let mut observed = AvailabilityMap::with_capacity(LocalTarget::ALL.len());
        for target in LocalTarget::ALL {
            observed.insert(target, self.is_present(target).await);
        }

        if *self.state.read().unwrap_or_else(PoisonError::into_inner) == observed {
            return false;
        }
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *guard == observed {
            return false;
        }
        tracing::debug!("local availability changed: {:?}", observed);
        *guard = observed;
        true
    }

    pub async fn run(self, mut cancel: watch::Receiver<bool>, on_change: UiRefresh) {
        loop {
            if *cancel.borrow() {
                break;
            }
            if self.poll_once().await {
                on_change();
            }
            let sender_gone = tokio::select! {
                changed = cancel.changed() => changed.is_err(),
                _ = tokio::time::sleep(AVAILABILITY_TICK) => false,
            };
            if sender_gone {
                break;
            }
        }
        tracing::debug!("availability watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::temp_root;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn watcher() -> AvailabilityWatcher {
        let root = temp_root("availability");
        AvailabilityWatcher::new(
            FileManager::new(root.join("config"), root.join("games")),
            "game".to_string(),
        )
    }

    #[tokio::test]
    async fn poll_signals_only_on_change() {
        let watcher = watcher();
        assert!(!watcher.poll_once().await);

        let exe = watcher.target_path(LocalTarget::StableExecutable);
        std::fs::create_dir_all(exe.parent().expect("parent")).expect("mkdir");
        std::fs::write(&exe, b"bin").expect("write exe");

        assert!(watcher.poll_once().await);
        assert!(watcher.is_available(LocalTarget::StableExecutable));
        assert!(!watcher.is_available(LocalTarget::PrereleaseExecutable));
        assert!(!watcher.poll_once().await);

        std::fs::remove_file(&exe).expect("remove exe");
        assert!(watcher.poll_once().await);
        assert!(!watcher.snapshot()[&LocalTarget::StableExecutable]);
    }

    #[tokio::test]
    async fn directory_is_not_an_executable() {
        let watcher = watcher();
        std::fs::create_dir_all(watcher.target_path(LocalTarget::PrereleaseExecutable))
            .expect("mkdir");
        std::fs::create_dir_all(watcher.target_path(LocalTarget::DownloadsDir)).expect("mkdir");

        assert!(watcher.poll_once().await);
        assert!(!watcher.is_available(LocalTarget::PrereleaseExecutable));
        assert!(watcher.is_available(LocalTarget::DownloadsDir));
    }

    #[tokio::test]
    async fn run_loop_refreshes_once_per_change_and_stops() {
        let watcher = watcher();
        let refreshes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&refreshes);
        let on_change: UiRefresh = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let downloads = watcher.target_path(LocalTarget::DownloadsDir);
        let task = tokio::spawn(watcher.clone().run(cancel_rx, on_change));

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 0);

        std::fs::create_dir_all(&downloads).expect("mkdir downloads");
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        cancel_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("stops promptly")
            .expect("join");
    }
}
