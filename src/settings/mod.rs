// src/settings/mod.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

pub const SERVER_URL_KEY: &str = "serverUrl";
pub const AUTO_SUBMIT_KEY: &str = "autoSubmit";
pub const DEFAULT_SERVER_URL: &str = "http://localhost:7777";

/// Persisted key-value store. Writes are per key and last-write-wins.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSettings {
    pub server_url: String,
    pub auto_submit: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            auto_submit: false,
        }
    }
}

/// Typed view over a [`SettingsStore`], applying the documented defaults.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub async fn server_url(&self) -> Result<String> {
        Ok(match self.store.get(SERVER_URL_KEY).await? {
            Some(Value::String(url)) => url,
            _ => DEFAULT_SERVER_URL.to_string(),
        })
    }

    pub async fn auto_submit(&self) -> Result<bool> {
        Ok(matches!(
            self.store.get(AUTO_SUBMIT_KEY).await?,
            Some(Value::Bool(true))
        ))
    }

    pub async fn set_server_url(&self, url: &str) -> Result<()> {
        self.store.set(SERVER_URL_KEY, Value::String(url.to_string())).await
    }

    pub async fn set_auto_submit(&self, enabled: bool) -> Result<()> {
        self.store.set(AUTO_SUBMIT_KEY, Value::Bool(enabled)).await
    }

    pub async fn load(&self) -> Result<BridgeSettings> {
        Ok(BridgeSettings {
            server_url: self.server_url().await?,
            auto_submit: self.auto_submit().await?,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Settings kept in a JSON object on disk. A missing file reads as empty.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(e).context(format!(
                    "Failed to read settings file: {}",
                    self.path.display()
                ))
            }
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content)
            .context(format!("Failed to parse settings file: {}", self.path.display()))
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _held = self.write_lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create settings directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&values)?;
        tokio::fs::write(&self.path, content)
            .await
            .context(format!("Failed to write settings file: {}", self.path.display()))
    }
}
