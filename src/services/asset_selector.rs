use crate::errors::{LauncherError, Result};
use crate::models::{Asset, Channel, Release};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

const ALL_PLATFORMS: [Platform; 3] = [Platform::Windows, Platform::Linux, Platform::MacOs];
const PRERELEASE_TOKENS: [&str; 4] = ["prerelease", "beta", "nightly", "rc"];

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    fn tokens(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["windows", "win64", "win32", "win"],
            Platform::Linux => &["linux"],
            Platform::MacOs => &["macos", "mac", "darwin", "osx"],
        }
    }

    /// Token used when naming assets for this platform.
    pub fn asset_token(self) -> &'static str {
        self.tokens()[0]
    }
}

fn name_tokens(name: &str) -> Vec<String> {
    name.to_ascii_lowercase()
        .split(|ch: char| matches!(ch, '-' | '_' | '.' | ' '))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// `rc` also matches `rc1`, `rc12` and so on.
fn token_is(token: &str, word: &str) -> bool {
    match token.strip_prefix(word) {
        Some("") => true,
        Some(rest) => rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

pub fn asset_matches(name: &str, platform: Platform, channel: Channel) -> bool {
    if !name.to_ascii_lowercase().ends_with(".zip") {
        return false;
    }
    let tokens = name_tokens(name);
    let has = |wanted: &[&str]| tokens.iter().any(|token| wanted.contains(&token.as_str()));
    let tagged = |words: &[&str]| {
        tokens
            .iter()
            .any(|token| words.iter().any(|word| token_is(token, word)))
    };

    if !has(platform.tokens()) {
        return false;
    }
    let foreign = ALL_PLATFORMS
        .iter()
        .filter(|other| **other != platform)
        .any(|other| has(other.tokens()));
    if foreign || tagged(&["dev"]) {
        return false;
    }
    if channel == Channel::Stable && tagged(&PRERELEASE_TOKENS) {
        return false;
    }
    true
}

/// First asset of `release` installable on `platform` for `channel`.
pub fn select_asset<'a>(release: &'a Release, platform: Platform, channel: Channel) -> Result<&'a Asset> {
    if release.assets.is_empty() {
        return Err(LauncherError::Cache(format!(
            "release {} has no assets",
            release.tag_name
        )));
    }
    let asset = release
        .assets
        .iter()
        .find(|asset| asset_matches(&asset.name, platform, channel))
        .ok_or_else(|| {
            LauncherError::Cache(format!(
                "release {} has no {:?} asset among {:?}",
                release.tag_name,
                platform,
                release.assets.iter().map(|a| a.name.as_str()).collect::<Vec<_>>()
            ))
        })?;
    if asset.browser_download_url.trim().is_empty() {
        return Err(LauncherError::Cache(format!(
            "asset {} has no download URL",
            asset.name
        )));
    }
    Ok(asset)
}
