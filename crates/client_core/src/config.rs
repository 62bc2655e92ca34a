use std::{collections::HashMap, fs, time::Duration};

use stomp::HeartBeat;
use tracing::warn;

pub const SETTINGS_FILE: &str = "chat_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub broker_url: String,
    pub api_base_url: String,
    pub reconnect_delay: Duration,
    pub heart_beat: HeartBeat,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            broker_url: "ws://127.0.0.1:8080/ws".into(),
            api_base_url: "http://127.0.0.1:8080/api".into(),
            reconnect_delay: Duration::from_secs(5),
            heart_beat: HeartBeat::from_millis(10_000, 10_000),
        }
    }
}

impl ClientSettings {
    /// Defaults, then the settings file (flat keys), then `CHAT__*` variables.
    pub fn from_sources(
        file_contents: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut settings = Self::default();

        if let Some(raw) = file_contents {
            match toml::from_str::<HashMap<String, toml::Value>>(raw) {
                Ok(file_cfg) => {
                    for (key, value) in file_cfg {
                        let value = match value {
                            toml::Value::String(text) => text,
                            other => other.to_string(),
                        };
                        settings.apply(&key, &value);
                    }
                }
                Err(err) => warn!(error = %err, "config: ignoring unreadable settings file"),
            }
        }

        for key in ["broker_url", "api_base_url", "reconnect_delay_secs", "heart_beat"] {
            if let Some(value) = env(&format!("CHAT__{}", key.to_ascii_uppercase())) {
                settings.apply(key, &value);
            }
        }

        settings
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "broker_url" => self.broker_url = value.to_string(),
            "api_base_url" => self.api_base_url = value.trim_end_matches('/').to_string(),
            "reconnect_delay_secs" => match value.trim().parse::<u64>() {
                Ok(secs) => self.reconnect_delay = Duration::from_secs(secs),
                Err(_) => warn!(value, "config: reconnect_delay_secs must be a whole number"),
            },
            "heart_beat" => match HeartBeat::parse(value) {
                Ok(heart_beat) => self.heart_beat = heart_beat,
                Err(err) => warn!(error = %err, "config: ignoring heart_beat"),
            },
            other => warn!(key = other, "config: unknown setting"),
        }
    }
}

pub fn load_settings() -> ClientSettings {
    let file_contents = fs::read_to_string(SETTINGS_FILE).ok();
    ClientSettings::from_sources(file_contents.as_deref(), |key| std::env::var(key).ok())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
