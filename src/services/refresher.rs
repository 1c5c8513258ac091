use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::config::RefreshPolicy;
use crate::models::ReleaseCache;
use crate::services::model::UiRefresh;
use crate::services::release_client::ReleaseClient;
use crate::services::store::Store;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPhase {
    Starting,
    InitialFetch,
    Waiting,
    Fetching,
    Stopping,
    Stopped,
}

/// Delay until the next refresh: wait for the rate-limit window to reset, but
/// never less than `min_interval`. Without a future reset, use the default.
pub fn next_interval(
    now: DateTime<Utc>,
    reset: Option<DateTime<Utc>>,
    policy: &RefreshPolicy,
) -> Duration {
    match reset.and_then(|at| (at - now).to_std().ok()) {
        Some(until_reset) if !until_reset.is_zero() => until_reset.max(policy.min_interval),
        _ => policy.default_interval,
    }
}

/// Keeps the release cache fresh against the remote feed.
pub struct ReleaseRefresher {
    client: ReleaseClient,
    cache: Store<ReleaseCache>,
    policy: RefreshPolicy,
    phase: watch::Sender<RefreshPhase>,
    on_change: UiRefresh,
}

impl ReleaseRefresher {
    pub fn new(
        client: ReleaseClient,
        cache: Store<ReleaseCache>,
        policy: RefreshPolicy,
        on_change: UiRefresh,
    ) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Starting);
        Self {
            client,
            cache,
            policy,
            phase,
            on_change,
        }
    }

    pub fn phase(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, phase: RefreshPhase) {
        self.phase.send_replace(phase);
    }

    fn persist(&self) {
        if let Err(err) = self.cache.save() {
            tracing::error!("failed to save release cache: {}", err);
        }
    }

    pub async fn refresh_rate_limit(&self) -> bool {
        match self.client.fetch_rate_limit().await {
            Ok(rate) => {
                self.cache.update(|cache| {
                    cache.rate_limit = Some(rate);
                    cache.rate_limit_fetched_at = Some(Utc::now());
                });
                self.persist();
                true
            }
            Err(err) => {
                tracing::warn!("rate limit refresh failed: {}", err);
                false
            }
        }
    }

    /// Skipped while the last known budget sits below the floor.
    pub async fn refresh_releases(&self) -> bool {
        if let Some(remaining) = self.cache.read(ReleaseCache::remaining_budget) {
            if remaining < self.policy.remaining_floor {
                tracing::warn!(
                    "skipping release refresh: {} requests left (floor {})",
                    remaining,
                    self.policy.remaining_floor
                );
                return false;
            }
        }
        match self.client.fetch_latest_releases().await {
            Ok(latest) => {
                self.cache.update(|cache| {
                    cache.releases = Some(latest);
                    cache.releases_fetched_at = Some(Utc::now());
                });
                self.persist();
                true
            }
            Err(err) => {
                tracing::warn!("release refresh failed: {}", err);
                false
            }
        }
    }

    /// Fetches whichever records are missing or past their max age.
    pub async fn initial_fetch(&self) -> bool {
        let now = Utc::now();
        let (rate_stale, releases_stale) = self.cache.read(|cache| {
            (
                cache.rate_limit_is_stale(now, self.policy.rate_limit_max_age),
                cache.releases_are_stale(now, self.policy.releases_max_age),
            )
        });

        let mut changed = false;
        if rate_stale {
            changed |= self.refresh_rate_limit().await;
        }
        if releases_stale {
            changed |= self.refresh_releases().await;
            // Listing releases spends budget.
            changed |= self.refresh_rate_limit().await;
        }
        if !rate_stale && !releases_stale {
            tracing::info!("release cache is fresh, skipping initial fetch");
        }
        changed
    }

    async fn fetch_all(&self) -> bool {
        self.set_phase(RefreshPhase::Fetching);
        let releases = self.refresh_releases().await;
        let rate = self.refresh_rate_limit().await;
        releases || rate
    }

    pub async fn run(self, mut cancel: watch::Receiver<bool>, mut reset: mpsc::Receiver<()>) {
        if !*cancel.borrow() {
            self.set_phase(RefreshPhase::InitialFetch);
            if self.initial_fetch().await {
                (self.on_change)();
            }
        }

        loop {
            if *cancel.borrow() {
                break;
            }
            let wait = next_interval(
                Utc::now(),
                self.cache.read(ReleaseCache::reset_at),
                &self.policy,
            );
            self.set_phase(RefreshPhase::Waiting);
            tracing::debug!("next release refresh in {}s", wait.as_secs());

            let trigger = tokio::select! {
                _ = cancel.changed() => break,
                Some(()) = reset.recv() => "reset",
                _ = tokio::time::sleep(wait) => "tick",
            };
            tracing::debug!("release refresh triggered by {}", trigger);
            if self.fetch_all().await {
                (self.on_change)();
            }
        }

        self.set_phase(RefreshPhase::Stopping);
        self.persist();
        self.set_phase(RefreshPhase::Stopped);
        tracing::info!("release refresher stopped");
    }
}
