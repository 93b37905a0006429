// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::cache::{DEFAULT_COOLDOWN, DEFAULT_TTL};
use crate::http::DEFAULT_TIMEOUT_SECS;
use crate::session::SessionOptions;
use crate::xtream::DEFAULT_CANDIDATE_PATHS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub probe: ProbeConfig,
    pub cache: CacheConfig,
    pub player: PlayerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Requests go to `{url}?url={encoded target}` when set.
    pub url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub candidate_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub command: String,
    /// Extra arguments for HLS style URLs.
    pub segmented_args: Vec<String>,
    /// Extra arguments for plain transport stream URLs.
    pub progressive_args: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            candidate_paths: DEFAULT_CANDIDATE_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            cooldown_secs: DEFAULT_COOLDOWN.as_secs(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: "mpv".to_string(),
            segmented_args: vec!["--quiet".to_string()],
            progressive_args: vec!["--quiet".to_string(), "--cache=yes".to_string()],
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Missing file means defaults; a broken file is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("iptv-source").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.timeout_secs.max(1))
    }

    pub fn session_options(&self) -> SessionOptions {
        let candidate_paths = if self.probe.candidate_paths.is_empty() {
            ProbeConfig::default().candidate_paths
        } else {
            self.probe.candidate_paths.clone()
        };

        SessionOptions {
            candidate_paths,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            cooldown: Duration::from_secs(self.cache.cooldown_secs),
        }
    }
}
