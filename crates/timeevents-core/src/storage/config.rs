//! TOML-based application configuration.
//!
//! Stores:
//! - OData service location and user
//! - Which employee and date window to sync
//! - Log level
//!
//! Configuration is stored at `~/.config/timeevents/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;

/// Remote OData service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ODataSection {
    /// Service root, e.g. `https://host/sap/opu/odata/sap/HCMFAB_TIMEEVENTS_SRV`.
    #[serde(default)]
    pub service_url: String,
    #[serde(default = "default_entity_set")]
    pub entity_set: String,
    /// Basic-auth user. The password comes from `TIMEEVENTS_ODATA_PASSWORD`.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Sync scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSection {
    #[serde(default)]
    pub employee_id: Option<String>,
    /// Days back from today covered by `sync run`.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/timeevents/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub odata: ODataSection,
    #[serde(default)]
    pub sync: SyncSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_entity_set() -> String {
    "TimeEventSet".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_window_days() -> u32 {
    14
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for ODataSection {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            entity_set: default_entity_set(),
            user: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            employee_id: None,
            window_days: default_window_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("config.toml"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, creating it with defaults if missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match Self::read_from(path)? {
            Some(cfg) => Ok(cfg),
            None => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Read `path` without creating it. `None` when the file is missing.
    pub fn read_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map(Some)
                .map_err(|e| ConfigError::ParseFailed(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Employee to sync, failing when none is configured.
    pub fn employee_id(&self) -> Result<&str, ConfigError> {
        self.sync
            .employee_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigError::MissingKey("sync.employee_id".to_string()))
    }

    /// Read the on-disk config without writing anything; defaults when
    /// the file is missing.
    pub fn read_or_default() -> Result<Self, ConfigError> {
        Ok(Self::read_from(&Self::path()?)?.unwrap_or_default())
    }
}
