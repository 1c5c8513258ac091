use std::sync::Arc;

use launcher_sync::config::LauncherConfig;
use launcher_sync::services::{HttpTranslator, LauncherModel, PassthroughTranslator, Translator};
use launcher_sync::{logging, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LauncherConfig::from_env();
    logging::init(&config.log_dir, &config.log_filter)?;

    let translator: Arc<dyn Translator> = match config.translate_url.clone() {
        Some(url) => {
            tracing::info!("translating remote text via {}", url);
            Arc::new(HttpTranslator::new(url, config.http_timeout))
        }
        None => Arc::new(PassthroughTranslator),
    };

    let model = LauncherModel::new(config, translator, Arc::new(|| {}));
    model.start()?;

    let status = Arc::clone(&model);
    let reporter = tokio::spawn(async move {
        let mut last = String::new();
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            let cache = status.cache();
            let line = format!(
                "phase={:?} action={:?} stable={:?} prerelease={:?} budget={:?}",
                status.refresh_phase(),
                status.primary_action(),
                cache.release_for(launcher_sync::Channel::Stable).map(|r| r.tag_name.as_str()),
                cache
                    .release_for(launcher_sync::Channel::Prerelease)
                    .map(|r| r.tag_name.as_str()),
                cache.remaining_budget()
            );
            if line != last {
                tracing::info!("{}", line);
                last = line;
            }
        }
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to wait for Ctrl-C: {}", err);
    }
    tracing::info!("shutting down");
    reporter.abort();
    model.stop().await;
    Ok(())
}
