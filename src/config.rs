//! Config model and persistence helpers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Top-level configuration stored in `console.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service endpoints and HTTP client settings.
    pub api: ApiCfg,
    /// Task detail refresh cadence.
    pub polling: PollingCfg,
    /// Task list paging.
    pub tasks: TasksCfg,
    /// Image upload limits.
    pub upload: UploadCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiCfg {
    /// Base URL of the task service.
    pub task_base_url: String,
    /// Base URL of the local inference service.
    pub llm_base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingCfg {
    /// Delay between fetches of an active task.
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksCfg {
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadCfg {
    /// Images accepted per inference session.
    pub max_files: usize,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            task_base_url: "http://localhost:8080/api/tasks".into(),
            llm_base_url: "http://localhost:8081/api/llm".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for PollingCfg {
    fn default() -> Self {
        Self { interval_ms: 5000 }
    }
}

impl Default for TasksCfg {
    fn default() -> Self {
        Self { page_size: 20 }
    }
}

impl Default for UploadCfg {
    fn default() -> Self {
        Self { max_files: 10 }
    }
}

impl Config {
    /// Load from disk or create defaults when missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let s = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(toml::from_str(&s)?)
        } else {
            let cfg = Self::default();
            cfg.save(path)?;
            Ok(cfg)
        }
    }

    /// Persist the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let s = toml::to_string_pretty(self)?;
        fs::write(path, s)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
