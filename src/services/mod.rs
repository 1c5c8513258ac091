pub mod asset_selector;
pub mod availability;
pub mod downloader;
pub mod installer;
pub mod model;
pub mod refresher;
pub mod release_client;
pub mod store;
pub mod translator;

pub use asset_selector::{select_asset, Platform};
pub use availability::{AvailabilityMap, AvailabilityWatcher, LocalTarget};
pub use downloader::{DownloadOutcome, Downloader, ProgressSink, ProgressTracker};
pub use installer::extract_zip;
pub use model::{LauncherModel, PrimaryAction, ProgressText, UiRefresh};
pub use refresher::{next_interval, RefreshPhase, ReleaseRefresher};
pub use release_client::ReleaseClient;
pub use store::{Persisted, Store};
pub use translator::{HttpTranslator, PassthroughTranslator, Translator};
