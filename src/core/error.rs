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

//! Error types
//!
//! Chip and bus operations are total: register addresses are masked to 4 bits
//! and control lines are a closed enum, so nothing inside the emulation core
//! can fail. Errors only arise at the edges of the crate, when loading
//! configuration, scenarios, traces or save states.

use thiserror::Error;

/// Errors reported by the emulator
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// File system access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be rendered back to TOML
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Invalid value in an environment override
    #[error("Invalid environment override {name}={value}")]
    InvalidEnv { name: String, value: String },

    /// Scenario script could not be parsed
    #[error("Invalid scenario: {0}")]
    ScenarioParse(String),

    /// Trace file could not be read or written as JSON
    #[error("Trace serialization error: {0}")]
    TraceFormat(#[from] serde_json::Error),

    /// Recorded trace differs from the reference trace
    #[error("Trace mismatch at event {index}: expected {expected}, got {actual}")]
    TraceMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    /// Save state could not be encoded
    #[error("Failed to encode save state: {0}")]
    SnapshotEncode(#[from] bincode::error::EncodeError),

    /// Save state could not be decoded
    #[error("Failed to decode save state: {0}")]
    SnapshotDecode(#[from] bincode::error::DecodeError),

    /// Save state was written by an incompatible version
    #[error("Unsupported save state version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },

    /// Save state does not match the machine layout
    #[error("Save state layout mismatch: {0}")]
    SnapshotLayout(String),

    /// Configuration value out of range
    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),

    /// A scripted read returned something other than the expected value
    #[error("Step {step}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    UnexpectedRead { step: usize, expected: u8, actual: u8 },
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;
