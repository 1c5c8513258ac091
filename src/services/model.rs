use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::commands::{run_worker, Command, CommandQueue, CommandTarget, QueuedCommand};
use crate::config::{LauncherConfig, COMMAND_QUEUE_CAPACITY, PROGRESS_INTERVAL};
use crate::errors::{LauncherError, Result};
use crate::models::{Channel, ReleaseCache, Settings};
use crate::services::asset_selector::{select_asset, Platform};
use crate::services::availability::{AvailabilityMap, AvailabilityWatcher, LocalTarget};
use crate::services::downloader::{Downloader, ProgressSink};
use crate::services::installer::extract_zip;
use crate::services::refresher::{RefreshPhase, ReleaseRefresher};
use crate::services::release_client::ReleaseClient;
use crate::services::store::Store;
use crate::services::translator::Translator;
use crate::utils::file::FileManager;

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Invoked whenever background state changed in a way the UI should show.
pub type UiRefresh = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimaryAction {
    Install,
    Update,
    Play,
    Unavailable,
}

/// Status line shared with the presentation layer.
#[derive(Clone)]
pub struct ProgressText {
    slot: Arc<RwLock<String>>,
    on_change: UiRefresh,
}

impl ProgressText {
    fn new(on_change: UiRefresh) -> Self {
        Self {
            slot: Arc::new(RwLock::new(String::new())),
            on_change,
        }
    }

    pub fn get(&self) -> String {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, status: impl Into<String>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = status.into();
        (self.on_change)();
    }

    pub fn clear(&self) {
        self.set(String::new());
    }
}

impl ProgressSink for ProgressText {
    fn report(&self, status: String) {
        self.set(status);
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Parts consumed by `start`.
struct PendingTasks {
    commands: mpsc::Receiver<QueuedCommand>,
    refresher: ReleaseRefresher,
    reset: mpsc::Receiver<()>,
}

#[inline]
fn hide_console_window(command: &mut std::process::Command) {
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = command;
}

/// Owns the stores, the command worker and both schedulers.
pub struct LauncherModel {
    config: LauncherConfig,
    files: FileManager,
    settings: Store<Settings>,
    cache: Store<ReleaseCache>,
    downloader: Downloader,
    translator: Arc<dyn Translator>,
    availability: AvailabilityWatcher,
    commands: CommandQueue,
    reset_tx: mpsc::Sender<()>,
    cancel: watch::Sender<bool>,
    phase: watch::Receiver<RefreshPhase>,
    pending: Mutex<Option<PendingTasks>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    progress: ProgressText,
    busy: AtomicBool,
    ui_refresh: UiRefresh,
}

impl LauncherModel {
    pub fn new(
        config: LauncherConfig,
        translator: Arc<dyn Translator>,
        ui_refresh: UiRefresh,
    ) -> Arc<Self> {
        let files = config.file_manager();
        let settings = Store::new(files.clone());
        let cache = Store::new(files.clone());
        let client = ReleaseClient::new(
            config.api_base_url.clone(),
            config.repository.clone(),
            config.http_timeout,
        );
        let downloader = Downloader::new(client.client().clone(), PROGRESS_INTERVAL);
        let refresher = ReleaseRefresher::new(
            client,
            cache.clone(),
            config.refresh.clone(),
            Arc::clone(&ui_refresh),
        );
        let phase = refresher.phase();
        let availability = AvailabilityWatcher::new(files.clone(), config.executable_name.clone());
        let (commands, command_rx) = CommandQueue::new(COMMAND_QUEUE_CAPACITY);
        let (reset_tx, reset_rx) = mpsc::channel(1);
        let (cancel, _) = watch::channel(false);

        Arc::new(Self {
            config,
            files,
            settings,
            cache,
            downloader,
            translator,
            availability,
            commands,
            reset_tx,
            cancel,
            phase,
            pending: Mutex::new(Some(PendingTasks {
                commands: command_rx,
                refresher,
                reset: reset_rx,
            })),
            tasks: Mutex::new(Vec::new()),
            progress: ProgressText::new(Arc::clone(&ui_refresh)),
            busy: AtomicBool::new(false),
            ui_refresh,
        })
    }

    /// Loads persisted state and spawns the background tasks. Must be called
    /// inside a tokio runtime; returns without waiting on any of them.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| LauncherError::Config("task state lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| LauncherError::Config("launcher core already started".to_string()))?;

        if let Err(err) = self.settings.load() {
            tracing::warn!("settings unreadable, using defaults: {}", err);
        }
        if let Err(err) = self.cache.load() {
            tracing::warn!("release cache unreadable, starting empty: {}", err);
        }

        let handles = vec![
            tokio::spawn(run_worker(
                Arc::clone(self),
                pending.commands,
                self.cancel.subscribe(),
            )),
            tokio::spawn(
                self.availability
                    .clone()
                    .run(self.cancel.subscribe(), Arc::clone(&self.ui_refresh)),
            ),
            tokio::spawn(pending.refresher.run(self.cancel.subscribe(), pending.reset)),
        ];
        self.tasks
            .lock()
            .map_err(|_| LauncherError::Config("task list lock poisoned".to_string()))?
            .extend(handles);

        tracing::info!(
            "launcher core started for {} (data {}, games {})",
            self.config.repository,
            self.files.data_dir().display(),
            self.files.install_dir().display()
        );
        Ok(())
    }

    /// Cancels every task, waits for them to finish their final flush, then
    /// saves settings.
    pub async fn stop(&self) {
        self.cancel.send_replace(true);
        let never_started = match self.pending.lock() {
            Ok(pending) => pending.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        };
        if never_started {
            // Settings were never loaded; saving now would clobber the file.
            tracing::info!("launcher core stopped before it was started");
            return;
        }
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!("background task ended abnormally: {}", err);
            }
        }
        if let Err(err) = self.settings.save() {
            tracing::error!("failed to save settings on shutdown: {}", err);
        }
        tracing::info!("launcher core stopped");
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn cache(&self) -> ReleaseCache {
        self.cache.get()
    }

    /// Direct, unqueued settings change from the UI thread.
    pub fn update_settings<R>(&self, mutate: impl FnOnce(&mut Settings) -> R) -> R {
        self.settings.update(mutate)
    }

    pub fn progress_text(&self) -> String {
        self.progress.get()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    pub fn availability(&self) -> AvailabilityMap {
        self.availability.snapshot()
    }

    pub fn is_installed(&self, channel: Channel) -> bool {
        self.availability
            .is_available(LocalTarget::executable(channel))
    }

    pub fn enqueue(&self, command: Command) -> Result<Uuid> {
        self.commands.enqueue(command)
    }

    pub fn request_cache_reset(&self) -> Result<Uuid> {
        self.enqueue(Command::ResetCache)
    }

    pub fn request_settings_reset(&self) -> Result<Uuid> {
        self.enqueue(Command::ResetSettings)
    }

    pub fn request_settings_save(&self) -> Result<Uuid> {
        self.enqueue(Command::SaveSettings)
    }

    /// Queues a translation of the current channel's changelog, or clears the
    /// translated text when translation is off or there is nothing to translate.
    pub fn request_changelog_translation(&self) -> Result<Option<Uuid>> {
        let settings = self.settings.get();
        let body = self
            .cache
            .read(|cache| {
                cache
                    .release_for(settings.channel())
                    .and_then(|release| release.body.clone())
            })
            .filter(|body| !body.trim().is_empty());

        match body {
            Some(text) if settings.translate_remote_text => self
                .enqueue(Command::TranslateChangelog {
                    text,
                    target_language: settings.language,
                })
                .map(Some),
            _ => {
                self.cache.update(|cache| cache.translated_changelog = None);
                self.notify_ui();
                Ok(None)
            }
        }
    }

    pub fn primary_action(&self) -> PrimaryAction {
        let settings = self.settings.get();
        let channel = settings.channel();
        let latest = self
            .cache
            .read(|cache| cache.release_for(channel).map(|release| release.tag_name.clone()));
        let installed = settings
            .installed_version(channel)
            .filter(|_| self.executable_present(channel));

        match (installed, latest) {
            (Some(current), Some(latest)) if current != latest => PrimaryAction::Update,
            (Some(_), _) => PrimaryAction::Play,
            (None, Some(_)) => PrimaryAction::Install,
            (None, None) => PrimaryAction::Unavailable,
        }
    }

    /// Stats the executable directly; the availability map may not have
    /// been filled yet.
    fn executable_present(&self, channel: Channel) -> bool {
        self.availability
            .target_path(LocalTarget::executable(channel))
            .is_file()
    }

    /// Runs install, update or play to completion. Long-running; call it from
    /// a dedicated task. Failures end up in the status line as well.
    pub async fn run_primary_action(&self) -> Result<PrimaryAction> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(LauncherError::Queue("another action is in progress".to_string()));
        }
        let _busy = BusyGuard(&self.busy);
        self.notify_ui();

        let action = self.primary_action();
        let result = match action {
            PrimaryAction::Install | PrimaryAction::Update => self.install_latest().await,
            PrimaryAction::Play => self.launch_installed(),
            PrimaryAction::Unavailable => Err(LauncherError::Cache(
                "no release is available for this channel".to_string(),
            )),
        };

        match result {
            Ok(()) => Ok(action),
            Err(err) => {
                tracing::error!("{:?} failed: {}", action, err);
                self.progress.set(format!("{}: {}", err.status_prefix(), err));
                Err(err)
            }
        }
    }

    async fn install_latest(&self) -> Result<()> {
        let settings = self.settings.get();
        let channel = settings.channel();
        let release = self
            .cache
            .read(|cache| cache.release_for(channel).cloned())
            .ok_or_else(|| {
                LauncherError::Cache(format!("no {} release cached", channel.dir_name()))
            })?;
        let asset = select_asset(&release, Platform::current(), channel)?.clone();
        let file_name = Path::new(&asset.name)
            .file_name()
            .ok_or_else(|| LauncherError::Cache(format!("bad asset name {:?}", asset.name)))?;
        let archive_path = self.files.downloads_dir().join(file_name);
        let tag = release.tag_name.clone();

        if settings.resume_version(channel) != Some(tag.as_str()) {
            if self.files.remove_if_exists(&archive_path)? {
                tracing::info!(
                    "discarded partial archive {} from another version",
                    archive_path.display()
                );
            }
            self.settings
                .update(|s| s.set_resume_version(channel, Some(tag.clone())));
            self.settings.save()?;
        }

        self.progress.set(format!("Preparing {}", release.title()));
        let outcome = self
            .downloader
            .download(&asset.browser_download_url, &archive_path, &tag, &self.progress)
            .await?;
        tracing::info!(
            "archive for {} ready (resumed from {}, {} new bytes)",
            tag,
            outcome.resumed_from,
            outcome.transferred
        );

        let dest = self.files.channel_install_dir(channel);
        let sink = self.progress.clone();
        let (archive, label) = (archive_path.clone(), tag.clone());
        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest, &label, &sink))
            .await
            .map_err(|err| LauncherError::Filesystem(format!("extraction task failed: {err}")))??;

        self.settings.update(|s| {
            s.set_installed_version(channel, Some(tag.clone()));
            s.set_resume_version(channel, None);
        });
        self.settings.save()?;
        self.files.remove_if_exists(&archive_path)?;

        if self.availability.poll_once().await {
            self.notify_ui();
        }
        self.progress.clear();
        tracing::info!("installed {} into {}", tag, channel.dir_name());
        Ok(())
    }

    fn launch_installed(&self) -> Result<()> {
        let channel = self.settings.read(Settings::channel);
        let dir = self.files.channel_install_dir(channel);
        let executable = dir.join(&self.config.executable_name);
        if !executable.is_file() {
            return Err(LauncherError::Filesystem(format!(
                "{} is missing",
                executable.display()
            )));
        }

        let mut command = std::process::Command::new(&executable);
        command
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        hide_console_window(&mut command);
        let child = command.spawn().map_err(|err| {
            LauncherError::Filesystem(format!("failed to launch {}: {}", executable.display(), err))
        })?;
        tracing::info!("launched {} (pid {})", executable.display(), child.id());
        self.progress.clear();
        Ok(())
    }

    pub(crate) fn settings_store(&self) -> &Store<Settings> {
        &self.settings
    }

    pub(crate) fn cache_store(&self) -> &Store<ReleaseCache> {
        &self.cache
    }

    pub(crate) fn translator(&self) -> &dyn Translator {
        self.translator.as_ref()
    }

    pub(crate) fn notify_ui(&self) {
        (self.ui_refresh)();
    }

    /// At most one reset is ever pending; extra requests are dropped.
    pub(crate) fn signal_refresh_reset(&self) -> bool {
        match self.reset_tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("refresh reset already pending");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("release refresher is not running, reset ignored");
                false
            }
        }
    }
}

#[async_trait]
impl CommandTarget for LauncherModel {
    async fn execute(&self, command: Command) -> Result<()> {
        let name = command.name();
        let result = command.execute(self).await;
        if let Err(err) = &result {
            self.progress
                .set(format!("{}: {} ({})", err.status_prefix(), err, name));
        }
        result
    }
}
