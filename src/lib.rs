pub mod commands;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use commands::Command;
pub use config::{LauncherConfig, RefreshPolicy};
pub use errors::{LauncherError, Result};
pub use models::{Channel, ReleaseCache, Settings};
pub use services::{LauncherModel, PrimaryAction, RefreshPhase};
