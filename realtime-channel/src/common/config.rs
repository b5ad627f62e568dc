/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


use std::path::{Path, PathBuf};
use std::time::Duration;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Configuration for a bus instance.
///
/// Loaded from TOML in XDG-compliant directories; every section and field
/// is optional and falls back to its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Limits and capacity configuration
    pub limits: LimitsConfig,
    /// Default values configuration
    pub defaults: DefaultsConfig,
    /// Tracing and logging configuration
    pub tracing: TracingConfig,
    /// Path configuration
    pub paths: PathsConfig,
    /// Behavioral configuration switches
    pub behavior: BehaviorConfig,
}

/// Timeout-related configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default reply deadline in milliseconds; `0` waits forever
    pub reply_timeout_ms: u64,
    /// Upper bound for one forward to a remote node
    pub forward_timeout_ms: u64,
    /// Upper bound for a whole bus shutdown
    pub system_shutdown_timeout_ms: u64,
}

/// Limits and capacity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Queued messages per handler above which the bus logs a warning
    pub inbox_high_water_mark: usize,
    /// Largest cluster frame, in bytes, that is encoded or accepted
    pub max_frame_size: usize,
}

/// Default values configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Prefix of generated reply topics
    pub reply_topic_prefix: String,
    /// Prefix of generated node ids for standalone buses
    pub node_name_prefix: String,
}

/// Tracing and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// File name of the log file inside `paths.log_directory`
    pub log_file_name: String,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for log files; a leading `~/` expands to `$HOME`
    pub log_directory: String,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Install a tracing subscriber in `init_tracing`
    pub enable_tracing: bool,
    /// Write logs to a file instead of stdout
    pub log_to_file: bool,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: 0,
            forward_timeout_ms: 5_000,
            system_shutdown_timeout_ms: 30_000,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            inbox_high_water_mark: 10_000,
            max_frame_size: 16 * 1024 * 1024,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            reply_topic_prefix: "@reply.".to_string(),
            node_name_prefix: "node".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file_name: "realtime-channel.log".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_directory: "~/.local/share/realtime-channel/logs".to_string(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            enable_tracing: true,
            log_to_file: false,
        }
    }
}

impl ChannelConfig {
    /// Default reply deadline, or `None` when replies are awaited forever.
    #[must_use]
    pub const fn reply_timeout(&self) -> Option<Duration> {
        match self.timeouts.reply_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Convert forward timeout to Duration
    #[must_use]
    pub const fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.forward_timeout_ms)
    }

    /// Convert system shutdown timeout to Duration
    #[must_use]
    pub const fn system_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.system_shutdown_timeout_ms)
    }

    /// The log directory with a leading `~/` expanded.
    #[must_use]
    pub fn log_directory(&self) -> PathBuf {
        let dir = &self.paths.log_directory;
        match (dir.strip_prefix("~/"), std::env::var_os("HOME")) {
            (Some(rest), Some(home)) => Path::new(&home).join(rest),
            _ => PathBuf::from(dir),
        }
    }

    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the document is malformed or a value has
    /// the wrong type.
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Loads configuration from an explicit file.
    ///
    /// A missing or malformed file logs an error and yields the defaults.
    pub fn load_from_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(source) => match Self::from_toml_str(&source) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse configuration file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Loads configuration from XDG-compliant locations.
    ///
    /// Looks for `realtime-channel/config.toml` under `$XDG_CONFIG_HOME`
    /// (then the XDG fallbacks). No file yields the defaults; a malformed
    /// file logs an error and yields the defaults.
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("realtime-channel") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        match xdg_dirs.find_config_file("config.toml") {
            Some(path) => Self::load_from_path(&path),
            None => {
                info!("No configuration file found, using defaults");
                Self::default()
            }
        }
    }
}

lazy_static! {
    /// Global configuration loaded from XDG-compliant locations on first use.
    pub static ref CONFIG: ChannelConfig = ChannelConfig::load();
}
