/// Content-script configuration: server location, timing and retry policy
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionConfig {
    pub server_url: String,
    pub url_poll_interval_ms: u64,
    /// Wait after a same-platform URL change before rescanning.
    pub settle_delay_ms: u64,
    pub platform_switch_delay_ms: u64,
    pub initial_scan_delay_ms: u64,
    pub mutation_debounce_ms: u64,
    pub scroll_debounce_ms: u64,
    /// Minimum time between two scroll-triggered rescans.
    pub scroll_min_interval_ms: u64,
    pub notification_duration_ms: u64,
    pub button_reset_delay_ms: u64,
    pub retry: RetryPolicy,
    /// Exposes `debug_snapshot` to the page.
    pub dev_mode: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        ExtensionConfig {
            server_url: DEFAULT_SERVER_URL.to_string(),
            url_poll_interval_ms: 3_000,
            settle_delay_ms: 2_000,
            platform_switch_delay_ms: 1_000,
            initial_scan_delay_ms: 2_000,
            mutation_debounce_ms: 1_000,
            scroll_debounce_ms: 2_000,
            scroll_min_interval_ms: 10_000,
            notification_duration_ms: 5_000,
            button_reset_delay_ms: 3_000,
            retry: RetryPolicy::default(),
            dev_mode: false,
        }
    }
}

impl ExtensionConfig {
    /// Defaults overlaid with a (possibly partial) JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: ExtensionConfig = match value {
            serde_json::Value::Null => ExtensionConfig::default(),
            value => serde_json::from_value(value).map_err(|e| ConfigError::Malformed(e.to_string()))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.server_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {}
            _ => return Err(ConfigError::InvalidServerUrl(self.server_url.clone())),
        }

        let intervals = [
            ("urlPollIntervalMs", self.url_poll_interval_ms),
            ("notificationDurationMs", self.notification_duration_ms),
            ("mutationDebounceMs", self.mutation_debounce_ms),
            ("scrollDebounceMs", self.scroll_debounce_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroDuration(*name));
        }
        Ok(())
    }

    /// Apply the persisted server URL override, ignoring invalid ones.
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        if let Some(server_url) = &settings.server_url {
            let candidate = ExtensionConfig {
                server_url: server_url.clone(),
                ..self.clone()
            };
            match candidate.validate() {
                Ok(()) => self.server_url = server_url.clone(),
                Err(e) => log::warn!("Ignoring stored server URL: {}", e),
            }
        }
        self
    }

    pub fn url_poll_interval(&self) -> Duration {
        Duration::from_millis(self.url_poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn platform_switch_delay(&self) -> Duration {
        Duration::from_millis(self.platform_switch_delay_ms)
    }

    pub fn initial_scan_delay(&self) -> Duration {
        Duration::from_millis(self.initial_scan_delay_ms)
    }

    pub fn mutation_debounce(&self) -> Duration {
        Duration::from_millis(self.mutation_debounce_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn scroll_min_interval(&self) -> Duration {
        Duration::from_millis(self.scroll_min_interval_ms)
    }

    pub fn notification_duration(&self) -> Duration {
        Duration::from_millis(self.notification_duration_ms)
    }

    pub fn button_reset_delay(&self) -> Duration {
        Duration::from_millis(self.button_reset_delay_ms)
    }
}
