use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_UI_SCALE: f64 = 1.0;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Stable,
    Prerelease,
}

impl Channel {
    pub fn dir_name(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Prerelease => "prerelease",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WindowState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub last_page: String,
    pub active: bool,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 1280,
            height: 720,
            last_page: "home".to_string(),
            active: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub language: String,
    pub translate_remote_text: bool,
    pub dark_mode: bool,
    pub disable_background_audio: bool,
    pub use_prerelease: bool,
    pub ui_scale: f64,
    pub window: WindowState,
    pub installed_version: Option<String>,
    pub installed_prerelease_version: Option<String>,
    pub resume_version: Option<String>,
    pub resume_prerelease_version: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            translate_remote_text: false,
            dark_mode: true,
            disable_background_audio: false,
            use_prerelease: false,
            ui_scale: DEFAULT_UI_SCALE,
            window: WindowState::default(),
            installed_version: None,
            installed_prerelease_version: None,
            resume_version: None,
            resume_prerelease_version: None,
        }
    }
}

impl Settings {
    pub fn channel(&self) -> Channel {
        if self.use_prerelease {
            Channel::Prerelease
        } else {
            Channel::Stable
        }
    }

    pub fn installed_version(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Stable => self.installed_version.as_deref(),
            Channel::Prerelease => self.installed_prerelease_version.as_deref(),
        }
    }

    pub fn set_installed_version(&mut self, channel: Channel, version: Option<String>) {
        match channel {
            Channel::Stable => self.installed_version = version,
            Channel::Prerelease => self.installed_prerelease_version = version,
        }
    }

    pub fn resume_version(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Stable => self.resume_version.as_deref(),
            Channel::Prerelease => self.resume_prerelease_version.as_deref(),
        }
    }

    pub fn set_resume_version(&mut self, channel: Channel, version: Option<String>) {
        match channel {
            Channel::Stable => self.resume_version = version,
            Channel::Prerelease => self.resume_prerelease_version = version,
        }
    }

    /// Defaults for every preference, keeping what is installed on disk.
    pub fn reset_preferences(&self) -> Self {
        Self {
            installed_version: self.installed_version.clone(),
            installed_prerelease_version: self.installed_prerelease_version.clone(),
            resume_version: self.resume_version.clone(),
            resume_prerelease_version: self.resume_prerelease_version.clone(),
            ..Self::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub download_count: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LatestReleases {
    pub stable: Option<Release>,
    pub prerelease: Option<Release>,
}

impl LatestReleases {
    pub fn for_channel(&self, channel: Channel) -> Option<&Release> {
        match channel {
            Channel::Stable => self.stable.as_ref(),
            Channel::Prerelease => self.prerelease.as_ref(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ReleaseCache {
    pub releases: Option<LatestReleases>,
    pub rate_limit: Option<RateLimit>,
    pub releases_fetched_at: Option<DateTime<Utc>>,
    pub rate_limit_fetched_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub translated_changelog: Option<String>,
}

fn is_stale(fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match fetched_at {
        None => true,
        Some(at) => match (now - at).to_std() {
            Ok(age) => age >= max_age,
            // Fetched "in the future": clock moved backwards, refetch.
            Err(_) => true,
        },
    }
}

impl ReleaseCache {
    pub fn rate_limit_is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.rate_limit.is_none() || is_stale(self.rate_limit_fetched_at, now, max_age)
    }

    pub fn releases_are_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.releases.is_none() || is_stale(self.releases_fetched_at, now, max_age)
    }

    pub fn release_for(&self, channel: Channel) -> Option<&Release> {
        self.releases.as_ref()?.for_channel(channel)
    }

    pub fn remaining_budget(&self) -> Option<u32> {
        self.rate_limit.as_ref().map(|rate| rate.remaining)
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.rate_limit.as_ref().map(|rate| rate.reset)
    }
}
