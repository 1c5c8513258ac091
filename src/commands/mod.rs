pub mod queue;

use crate::errors::Result;
use crate::models::ReleaseCache;
use crate::services::model::LauncherModel;

pub use queue::{run_worker, CommandQueue, CommandTarget, QueuedCommand};

/// State-mutating work that must run on the single command worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    ResetCache,
    ResetSettings,
    SaveSettings,
    TranslateChangelog {
        text: String,
        target_language: String,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ResetCache => "reset_cache",
            Command::ResetSettings => "reset_settings",
            Command::SaveSettings => "save_settings",
            Command::TranslateChangelog { .. } => "translate_changelog",
        }
    }

    pub async fn execute(self, model: &LauncherModel) -> Result<()> {
        match self {
            Command::ResetCache => {
                model.cache_store().replace(ReleaseCache::default());
                model.cache_store().save()?;
                model.signal_refresh_reset();
                model.notify_ui();
            }
            Command::ResetSettings => {
                let settings = model.settings_store();
                settings.update(|current| *current = current.reset_preferences());
                settings.save()?;
                model.notify_ui();
            }
            Command::SaveSettings => {
                model.settings_store().save()?;
            }
            Command::TranslateChangelog {
                text,
                target_language,
            } => {
                let translated = model.translator().translate(&text, &target_language).await?;
                model
                    .cache_store()
                    .update(|cache| cache.translated_changelog = Some(translated));
                model.notify_ui();
            }
        }
        Ok(())
    }
}
