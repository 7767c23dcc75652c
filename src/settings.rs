use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::api::{Backoff, RetryPolicy};
use crate::viewer::ZoomConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000";
pub const API_URL_ENV: &str = "MANGA_TRANSLATOR_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 3000,
            backoff: Backoff::Linear,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_delay_ms),
            backoff: self.backoff,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    pub enabled: bool,
    pub header_name: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            header_name: "Session-Token".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ViewerSettings {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub default_zoom: f32,
    pub zoom_step: f32,
    /// Pixels moved per arrow-up/down press.
    pub scroll_step: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 1.0,
            default_zoom: 1.0,
            zoom_step: 0.1,
            scroll_step: 100,
            viewport_width: 1280,
            viewport_height: 800,
        }
    }
}

impl ViewerSettings {
    pub fn zoom_config(&self) -> ZoomConfig {
        ZoomConfig::new(self.min_zoom, self.max_zoom, self.default_zoom, self.zoom_step)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
    pub session: SessionSettings,
    /// Hosts that serve the static frontend; an API URL pointing at one of
    /// them is a misconfiguration.
    pub blocked_hosts: Vec<String>,
    pub default_pages: String,
    pub viewer: ViewerSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            request_timeout_secs: 120,
            retry: RetrySettings::default(),
            session: SessionSettings::default(),
            blocked_hosts: vec!["github.io".into()],
            default_pages: "all".into(),
            viewer: ViewerSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Applies `MANGA_TRANSLATOR_API_URL` when it is set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                self.api_base_url = url.to_string();
            }
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ClientSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings file {}: {}",
                    path.display(),
                    err
                );
                ClientSettings::default()
            })
        } else {
            ClientSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("manga-translator.json")
    }

    pub fn settings(&self) -> ClientSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &ClientSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.settings(), ClientSettings::default());
    }

    #[test]
    fn partial_document_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"api_base_url":"https://api.example.test","retry":{"max_attempts":2}}"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.api_base_url, "https://api.example.test");
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.retry_delay_ms, 3000);
        assert!(settings.session.enabled);
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.request_timeout_secs = 180;
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path).unwrap().settings();
        assert_eq!(reloaded.request_timeout_secs, 180);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.settings().retry.max_attempts, 3);
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let retry = RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        };
        assert_eq!(retry.policy().max_attempts, 1);
    }
}
