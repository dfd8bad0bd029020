// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parley_core::{NegotiationConfig, ReplayPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::room::RoomOptions;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub negotiation: NegotiationSettings,
    #[serde(default)]
    pub room: RoomSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationSettings {
    /// Milliseconds before a handler request is repeated; 0 never repeats
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub replay: ReplayPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_max_attempts(),
            replay: ReplayPolicy::default(),
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl NegotiationSettings {
    pub fn to_config(&self) -> NegotiationConfig {
        NegotiationConfig {
            request_timeout: (self.request_timeout_ms > 0)
                .then(|| Duration::from_millis(self.request_timeout_ms)),
            max_attempts: self.max_attempts.max(1),
            replay: self.replay,
        }
    }
}

impl ParleyConfig {
    /// Room options carrying these settings, with no commands registered
    pub fn room_options(&self) -> RoomOptions {
        RoomOptions {
            negotiation: self.negotiation.to_config(),
            tick: Duration::from_millis(self.room.tick_ms.max(1)),
            event_buffer: self.room.event_buffer,
            commands: Vec::new(),
        }
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("io", "parley", "parley")
        .context("Failed to determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Load the configuration, writing the defaults on first use
pub fn load_config() -> Result<ParleyConfig> {
    let config_path = get_config_path().context("Failed to determine config path")?;
    load_config_from(&config_path)
}

pub fn load_config_from(config_path: &Path) -> Result<ParleyConfig> {
    if !config_path.exists() {
        tracing::info!("Config file not found, creating default at: {}", config_path.display());
        let default_config = ParleyConfig::default();
        save_config_to(&default_config, config_path)?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    toml::from_str::<ParleyConfig>(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
}

pub fn save_config(config: &ParleyConfig) -> Result<()> {
    let config_path = get_config_path().context("Failed to determine config path")?;
    save_config_to(config, &config_path)
}

pub fn save_config_to(config: &ParleyConfig, config_path: &Path) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let toml_content = toml::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(config_path, toml_content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    tracing::info!("Saved config to: {}", config_path.display());
    Ok(())
}
