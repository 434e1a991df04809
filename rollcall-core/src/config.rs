//! Configuration management
//!
//! settings.json in the data directory:
//! ```json
//! {
//!   "app": { "groupName": "Vakratunda", "windowDays": 30 },
//!   "remark": { "model": "gemini-2.5-flash", "baseUrl": "..." }
//! }
//! ```
//! Keys the app doesn't manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::gemini::{DEFAULT_MODEL, REMARK_BASE_URL_ENV};
use crate::services::aggregator::{MAX_DAYS, ROLLING_DAYS};

pub const DEFAULT_GROUP_NAME: &str = "Vakratunda";
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// The window must hold the whole rolling member summary
pub const MIN_WINDOW_DAYS: u32 = ROLLING_DAYS as u32 - 1;
pub const MAX_WINDOW_DAYS: u32 = MAX_DAYS;

const SETTINGS_FILE: &str = "settings.json";

pub const WINDOW_DAYS_ENV: &str = "ROLLCALL_WINDOW_DAYS";
pub const REMARK_API_KEY_ENV: &str = "ROLLCALL_REMARK_API_KEY";
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    remark: RemarkSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    window_days: Option<u32>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemarkSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Rollcall configuration (resolved view of settings and environment)
#[derive(Debug, Clone)]
pub struct Config {
    pub group_name: String,
    /// Days of attendance kept in the live snapshot
    pub window_days: u32,
    pub remark_model: String,
    pub remark_base_url: Option<String>,
    /// Never written to settings.json
    pub remark_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_GROUP_NAME.to_string(),
            window_days: DEFAULT_WINDOW_DAYS,
            remark_model: DEFAULT_MODEL.to_string(),
            remark_base_url: None,
            remark_api_key: None,
        }
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    // A damaged settings file falls back to defaults rather than locking the user out
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

fn check_window_days(days: u32) -> Result<u32> {
    if !(MIN_WINDOW_DAYS..=MAX_WINDOW_DAYS).contains(&days) {
        anyhow::bail!(
            "Window must be between {} and {} days, got {}",
            MIN_WINDOW_DAYS,
            MAX_WINDOW_DAYS,
            days
        );
    }
    Ok(days)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load config from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(&data_dir.join(SETTINGS_FILE))?;
        let defaults = Self::default();

        let window_days = match env_value(WINDOW_DAYS_ENV) {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{} must be a whole number of days, got '{}'", WINDOW_DAYS_ENV, v))?,
            None => raw.app.window_days.unwrap_or(defaults.window_days),
        };
        let window_days = check_window_days(window_days)?;

        Ok(Self {
            group_name: raw
                .app
                .group_name
                .filter(|g| !g.trim().is_empty())
                .unwrap_or(defaults.group_name),
            window_days,
            remark_model: raw.remark.model.unwrap_or(defaults.remark_model),
            remark_base_url: env_value(REMARK_BASE_URL_ENV).or(raw.remark.base_url),
            remark_api_key: env_value(REMARK_API_KEY_ENV).or_else(|| env_value(GEMINI_API_KEY_ENV)),
        })
    }

    /// Save config to the data directory.
    /// Preserves settings the app doesn't manage.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join(SETTINGS_FILE);
        let mut settings = read_settings(&settings_path)?;

        settings.app.group_name = Some(self.group_name.clone());
        settings.app.window_days = Some(self.window_days);
        settings.remark.model = Some(self.remark_model.clone());
        settings.remark.base_url = self.remark_base_url.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }
}
