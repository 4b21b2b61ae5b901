//! Persistent user settings.
//!
//! Stored as JSON at `<config dir>/vidscribe/settings.json`. Environment
//! variables override the stored values for a single run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transcoder::EngineResources;

/// Default API server (the development server of the transcription backend)
pub const DEFAULT_API_URL: &str = "http://localhost:3333";

/// Default request timeout for both API calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub const API_URL_ENV: &str = "VIDSCRIBE_API_URL";
pub const FFMPEG_PATH_ENV: &str = "VIDSCRIBE_FFMPEG_PATH";
pub const TIMEOUT_ENV: &str = "VIDSCRIBE_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Base URL of the video API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Program used as the media engine
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Timeout applied to each API request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Settings {
    /// Location of the settings file
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidscribe")
            .join("settings.json")
    }

    /// Load settings from disk, then apply environment overrides.
    ///
    /// A missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let mut settings = Self::load_stored();
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings
    }

    /// Load settings from disk only, without environment overrides.
    pub fn load_stored() -> Self {
        let path = Self::path();
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                crate::verbose!("Ignoring malformed settings at {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(path) = lookup(FFMPEG_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.ffmpeg_path = path;
        }
        if let Some(secs) = lookup(TIMEOUT_ENV) {
            match secs.trim().parse() {
                Ok(secs) => self.timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid {TIMEOUT_ENV}={secs}"),
            }
        }
    }

    /// Validated, normalized API base URL
    pub fn api_base_url(&self) -> Result<String> {
        normalize_api_url(&self.api_url)
    }

    /// Media engine resources described by these settings
    pub fn engine_resources(&self) -> EngineResources {
        EngineResources::new(self.ffmpeg_path.clone())
    }
}

/// Validate an API base URL and strip its trailing slash.
pub fn normalize_api_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        anyhow::bail!(
            "API URL not configured.\n\
             Set with: vidscribe config --api-url {DEFAULT_API_URL}"
        );
    }

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        anyhow::bail!(
            "Invalid API URL: must start with http:// or https://\n\
             Got: {trimmed}\n\
             Example: vidscribe config --api-url {DEFAULT_API_URL}"
        );
    }

    let after_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or("");
    if after_scheme.is_empty() || after_scheme.starts_with('/') {
        anyhow::bail!(
            "Invalid API URL: missing host\n\
             Got: {trimmed}\n\
             Example: vidscribe config --api-url {DEFAULT_API_URL}"
        );
    }

    Ok(trimmed.trim_end_matches('/').to_string())
}
