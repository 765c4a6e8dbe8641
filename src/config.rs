// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::bluetooth::{ReconnectPolicy, DEFAULT_RFCOMM_CHANNEL};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the transfer database.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Session settings.
    pub session: SessionConfig,

    /// Storage settings.
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// Device name advertised over Bluetooth.
    pub device_name: String,

    /// RFCOMM channel to listen and dial on.
    pub channel: u8,

    /// Camera address to dial when running as the initiator. Leave empty to
    /// only accept inbound connections.
    pub camera_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds to wait before the dialer retries a lost or failed
    /// connection. Absent means no automatic retry.
    pub reconnect_secs: Option<u64>,
}

impl SessionConfig {
    /// Reconnect policy derived from the configured delay.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.reconnect_secs {
            Some(secs) => ReconnectPolicy::RetryAfter(Duration::from_secs(secs)),
            None => ReconnectPolicy::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory where completed captures are written.
    pub pictures_dir: Option<PathBuf>,

    /// Maximum number of transfer history entries.
    pub max_history_entries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("senselink"),
            bluetooth: BluetoothConfig {
                device_name: "SenseLink".to_string(),
                channel: DEFAULT_RFCOMM_CHANNEL,
                camera_address: None,
            },
            session: SessionConfig {
                reconnect_secs: Some(5),
            },
            storage: StorageConfig {
                pictures_dir: None,
                max_history_entries: 10000,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senselink");

        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&config_path, content)?;
            config
        };

        // Set data directory
        config.data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senselink");
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Directory where completed captures land.
    pub fn pictures_dir(&self) -> PathBuf {
        self.storage
            .pictures_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("Pictures"))
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("senselink");

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;

        Ok(())
    }
}
