// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
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

//! Emulator configuration
//!
//! Settings are read from a TOML file; every key is optional.
//!
//! ```toml
//! [machine]
//! true_drive = true
//! rebase_threshold = 268435456
//! rebase_amount = 134217728
//!
//! [log]
//! level = "debug"
//!
//! [trace]
//! format = "json"
//! ```
//!
//! Environment overrides (a `.env` file in the working directory is
//! honoured):
//!
//! - `VIABUS_LOG`: log level
//! - `VIABUS_TRUE_DRIVE`: `1`/`0`, `true`/`false`, `on`/`off`

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};
use crate::core::timing::Clock;

/// Environment variable overriding `[log] level`
pub const ENV_LOG: &str = "VIABUS_LOG";

/// Environment variable overriding `[machine] true_drive`
pub const ENV_TRUE_DRIVE: &str = "VIABUS_TRUE_DRIVE";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub machine: MachineConfig,
    pub log: LogConfig,
    pub trace: TraceConfig,
}

/// Machine wiring and clock handling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Emulate the drive side of the IEC bus
    pub true_drive: bool,

    /// Clock value that triggers a rebase
    pub rebase_threshold: Clock,

    /// Amount subtracted from every clock on rebase
    pub rebase_amount: Clock,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            true_drive: true,
            rebase_threshold: 0x1000_0000,
            rebase_amount: 0x0800_0000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub format: TraceFormat,
}

/// Output format of recorded traces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// One event per line
    #[default]
    Text,
    /// JSON array, loadable as a reference trace
    Json,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `.env` and process environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        self.apply_overrides(
            std::env::var(ENV_LOG).ok().as_deref(),
            std::env::var(ENV_TRUE_DRIVE).ok().as_deref(),
        )
    }

    /// Log level as a filter for `env_logger`
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        log::LevelFilter::from_str(&self.log.level)
            .map_err(|_| EmulatorError::InvalidConfig(format!("log level '{}'", self.log.level)))
    }

    fn apply_overrides(&mut self, level: Option<&str>, true_drive: Option<&str>) -> Result<()> {
        if let Some(level) = level {
            self.log.level = level.to_string();
            self.level_filter()?;
        }

        if let Some(value) = true_drive {
            self.machine.true_drive = parse_switch(value).ok_or_else(|| EmulatorError::InvalidEnv {
                name: ENV_TRUE_DRIVE.to_string(),
                value: value.to_string(),
            })?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let machine = &self.machine;
        if machine.rebase_amount == 0 || machine.rebase_amount > machine.rebase_threshold {
            return Err(EmulatorError::InvalidConfig(format!(
                "rebase_amount {} must be in 1..={}",
                machine.rebase_amount, machine.rebase_threshold
            )));
        }
        self.level_filter()?;
        Ok(())
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.machine.true_drive);
        assert_eq!(config.machine.rebase_threshold, 0x1000_0000);
        assert_eq!(config.machine.rebase_amount, 0x0800_0000);
        assert_eq!(config.level_filter().unwrap(), log::LevelFilter::Info);
        assert_eq!(config.trace.format, TraceFormat::Text);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str("[machine]\ntrue_drive = false\n").unwrap();
        assert!(!config.machine.true_drive);
        assert_eq!(config.machine.rebase_amount, 0x0800_0000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            [machine]
            true_drive = true
            rebase_threshold = 5000
            rebase_amount = 4000

            [log]
            level = "trace"

            [trace]
            format = "json"
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.machine.rebase_threshold, 5000);
        assert_eq!(config.machine.rebase_amount, 4000);
        assert_eq!(config.level_filter().unwrap(), log::LevelFilter::Trace);
        assert_eq!(config.trace.format, TraceFormat::Json);
    }

    #[test]
    fn test_rejects_bad_rebase_amount() {
        let text = "[machine]\nrebase_threshold = 100\nrebase_amount = 200\n";
        assert!(matches!(
            Config::from_toml_str(text),
            Err(EmulatorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Config::from_toml_str("[log]\nlevel = \"loud\"\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            Config::from_toml_str("[machine\n"),
            Err(EmulatorError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("debug"), Some("off")).unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(!config.machine.true_drive);

        let err = config.apply_overrides(None, Some("maybe")).unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidEnv { .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viabus.toml");

        let mut config = Config::default();
        config.machine.true_drive = false;
        config.trace.format = TraceFormat::Json;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, EmulatorError::Io(_)));
    }
}
