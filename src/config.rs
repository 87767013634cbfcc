// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use crate::types::ConnectionMode;

const CONFIG_ENV: &str = "WAVEGEN_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "wavegen.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Quiet time after the last keystroke before a field is applied.
    pub debounce_ms: u64,
    /// Pause after every device command.
    pub settle_ms: u64,
    pub connection: ConnectionMode,
    pub visa_library: String,
    pub visa_resource: String,
    pub serial_port: String,
    pub serial_baud: u32,
    pub io_timeout_ms: u64,
    pub refresh_on_connect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            settle_ms: 50,
            connection: ConnectionMode::Simulation,
            visa_library: default_visa_library().to_string(),
            visa_resource: "USB0::0x1AB1::0x0643::DG9A000000000::INSTR".to_string(),
            serial_port: "COM4".to_string(),
            serial_baud: 115_200,
            io_timeout_ms: 2000,
            refresh_on_connect: true,
        }
    }
}

fn default_visa_library() -> &'static str {
    if cfg!(target_os = "windows") {
        "visa64.dll"
    } else if cfg!(target_os = "macos") {
        "/Library/Frameworks/VISA.framework/VISA"
    } else {
        "libvisa.so"
    }
}

impl AppConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("config is not valid JSON for AppConfig")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json(&text)
    }

    fn location() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Loads the config file if there is one. A broken file is reported and ignored.
    pub fn load() -> Self {
        let path = Self::location();
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => {
                info!("config loaded from {}", path.display());
                config
            }
            Err(err) => {
                warn!("{err:#}; using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::from_json(r#"{ "settle_ms": 20, "connection": "Visa" }"#).unwrap();
        assert_eq!(config.settle(), Duration::from_millis(20));
        assert_eq!(config.connection, ConnectionMode::Visa);
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{ settle_ms: }").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = AppConfig::from_file(Path::new("definitely/not/here.json")).unwrap_err();
        assert!(format!("{err:#}").contains("here.json"));
    }
}
