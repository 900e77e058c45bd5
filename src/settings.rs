/// User settings persisted in chrome.storage.sync

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage key the settings object lives under.
pub const SETTINGS_STORAGE_KEY: &str = "videosaverSettings";

/// Flat settings map. Missing keys fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_analysis: bool,
    pub show_notifications: bool,
    #[serde(rename = "useAI")]
    pub use_ai: bool,
    pub auto_save: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl Settings {
    pub fn new() -> Self {
        Settings {
            auto_analysis: false,
            show_notifications: true,
            use_ai: true,
            auto_save: true,
            server_url: None,
        }
    }

    /// Parse the stored object; anything unreadable yields the defaults.
    pub fn from_storage_value(value: Option<Value>) -> Settings {
        match value {
            Some(value) if value.is_object() => serde_json::from_value(value).unwrap_or_default(),
            _ => Settings::new(),
        }
    }

    /// Set a setting by its storage key. Returns false for unknown keys or
    /// values of the wrong type.
    pub fn update(&mut self, key: &str, value: Value) -> bool {
        match (key, value) {
            ("autoAnalysis", Value::Bool(flag)) => self.auto_analysis = flag,
            ("showNotifications", Value::Bool(flag)) => self.show_notifications = flag,
            ("useAI", Value::Bool(flag)) => self.use_ai = flag,
            ("autoSave", Value::Bool(flag)) => self.auto_save = flag,
            ("serverUrl", Value::String(url)) => {
                let url = url.trim().to_string();
                self.server_url = if url.is_empty() { None } else { Some(url) };
            }
            ("serverUrl", Value::Null) => self.server_url = None,
            _ => return false,
        }
        true
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Where settings are read from. Read on demand, never cached.
#[async_trait(?Send)]
pub trait SettingsSource {
    async fn load(&self) -> Settings;
}

/// Fixed settings, for pages without storage access and for tests.
pub struct StaticSettings(pub Settings);

#[async_trait(?Send)]
impl SettingsSource for StaticSettings {
    async fn load(&self) -> Settings {
        self.0.clone()
    }
}
