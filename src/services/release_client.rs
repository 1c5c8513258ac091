use std::time::Duration;

use chrono::{TimeZone, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{MAX_RELEASE_PAGES, RELEASES_PER_PAGE};
use crate::errors::{LauncherError, Result};
use crate::models::{LatestReleases, RateLimit, Release};

const CLIENT_USER_AGENT: &str = concat!("launcher-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct FeedRelease {
    #[serde(default)]
    draft: bool,
    #[serde(flatten)]
    release: Release,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    rate: RateWindow,
}

#[derive(Deserialize)]
struct RateWindow {
    limit: u32,
    remaining: u32,
    reset: i64,
}

/// Read-only client for the release feed and its rate-limit endpoint.
#[derive(Clone)]
pub struct ReleaseClient {
    client: reqwest::Client,
    base_url: String,
    repository: String,
}

impl ReleaseClient {
    pub fn new(base_url: String, repository: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(6))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url,
            repository,
        }
    }

    /// Shared with the downloader so both reuse one connection pool.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub async fn fetch_latest_releases(&self) -> Result<LatestReleases> {
        let mut latest = LatestReleases::default();
        let mut seen_any = false;

        for page in 1..=MAX_RELEASE_PAGES {
            let path = format!(
                "repos/{}/releases?per_page={}&page={}",
                self.repository, RELEASES_PER_PAGE, page
            );
            let batch: Vec<FeedRelease> = self.get_json(&path).await?;
            let batch_len = batch.len();
            seen_any |= batch_len > 0;

            for entry in batch.into_iter().filter(|entry| !entry.draft) {
                let slot = if entry.release.prerelease {
                    &mut latest.prerelease
                } else {
                    &mut latest.stable
                };
                if slot.is_none() {
                    *slot = Some(entry.release);
                }
            }

            if latest.stable.is_some() && latest.prerelease.is_some() {
                break;
            }
            if batch_len < RELEASES_PER_PAGE as usize {
                break;
            }
        }

        if !seen_any {
            return Err(LauncherError::Cache(format!(
                "no releases published for {}",
                self.repository
            )));
        }
        tracing::info!(
            "release feed {}: stable={:?} prerelease={:?}",
            self.repository,
            latest.stable.as_ref().map(|r| r.tag_name.as_str()),
            latest.prerelease.as_ref().map(|r| r.tag_name.as_str())
        );
        Ok(latest)
    }

    pub async fn fetch_rate_limit(&self) -> Result<RateLimit> {
        let payload: RateLimitResponse = self.get_json("rate_limit").await?;
        let reset = Utc
            .timestamp_opt(payload.rate.reset, 0)
            .single()
            .ok_or_else(|| {
                LauncherError::Cache(format!("invalid rate-limit reset {}", payload.rate.reset))
            })?;
        tracing::debug!(
            "rate limit {}/{} resets at {}",
            payload.rate.remaining,
            payload.rate.limit,
            reset
        );
        Ok(RateLimit {
            limit: payload.rate.limit,
            remaining: payload.rate.remaining,
            reset,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LauncherError::Http(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(LauncherError::Cache(format!("empty response from {url}")));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}
