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

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::bluetooth::protocol::{FRAME_SENTINEL, LEGACY_RFCOMM_CHANNEL, MIN_FRAME_LEN, SPP_UUID};

const APP_DIR: &str = "obol-bridge";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for recorded frames.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Frame parsing settings.
    pub framer: FramerConfig,

    /// Frame recording settings.
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Device to connect to on startup, e.g. "00:11:22:33:44:55".
    pub auto_connect: Option<String>,

    /// Service UUID used when the device advertises none.
    pub service_uuid: Uuid,

    /// RFCOMM channel for the legacy connection path.
    pub legacy_channel: u8,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            auto_connect: None,
            service_uuid: SPP_UUID,
            legacy_channel: LEGACY_RFCOMM_CHANNEL,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FramerConfig {
    /// End-of-frame character.
    pub sentinel: char,

    /// Minimum frame length including the sentinel.
    pub min_frame_len: usize,

    /// Bytes kept without a sentinel before the buffer is reset.
    pub max_buffer_len: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            sentinel: FRAME_SENTINEL as char,
            min_frame_len: MIN_FRAME_LEN,
            max_buffer_len: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Store accepted frames in the frame database.
    pub enabled: bool,

    /// Maximum number of stored frames.
    pub max_entries: u32,

    /// Frames waiting for the database before new ones are dropped.
    pub queue_len: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100_000,
            queue_len: 1024,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = config_dir();
        std::fs::create_dir_all(&config_dir)?;

        let mut config = Self::load_from(&config_dir.join("config.toml"))?;

        // Set data directory
        config.data_dir = data_dir();
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Load configuration from a specific file, writing defaults if it is missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(config_path, content)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.framer.sentinel.is_ascii() {
            return Err(anyhow!(
                "Frame sentinel must be an ASCII character, got {:?}",
                self.framer.sentinel
            ));
        }
        if let Some(ref address) = self.bluetooth.auto_connect {
            address
                .parse::<bluer::Address>()
                .map_err(|e| anyhow!("Invalid auto_connect address {:?}: {}", address, e))?;
        }
        Ok(())
    }
}
