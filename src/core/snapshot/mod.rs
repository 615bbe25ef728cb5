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

//! Save states
//!
//! A save state holds the clock, every VIA's registers and timer state, and
//! the IEC bus outputs. Alarms are not stored separately: each timer keeps
//! its pending underflow clock and re-arms its alarm on restore.
//!
//! ## File Layout
//!
//! ```text
//! Offset | Contents
//! -------|------------------------------------------
//! 0      | magic "VIABUS\0\0"
//! 8      | bincode (standard config) of MachineState
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};
use crate::core::iec::IecBusState;
use crate::core::timing::Clock;
use crate::core::via::ViaState;

/// Current save state format version
pub const SNAPSHOT_VERSION: u32 = 2;

/// File magic
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"VIABUS\0\0";

/// Complete machine state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub clk: Clock,
    /// In chip order (host VIA1, host VIA2, drive VIA1)
    pub vias: Vec<ViaState>,
    pub bus: IecBusState,
    /// Host NMI edge latched and not yet taken
    pub host_nmi_pending: bool,
}

impl MachineState {
    /// Stamp a new state with the current version and time
    pub fn new(clk: Clock, vias: Vec<ViaState>, bus: IecBusState, host_nmi_pending: bool) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            clk,
            vias,
            bus,
            host_nmi_pending,
        }
    }

    /// Encode with magic header
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = SNAPSHOT_MAGIC.to_vec();
        bytes.extend(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?);
        Ok(bytes)
    }

    /// Decode and check magic and version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let body = bytes
            .strip_prefix(SNAPSHOT_MAGIC.as_slice())
            .ok_or_else(|| EmulatorError::SnapshotLayout("missing save state header".to_string()))?;

        let (state, _): (Self, usize) =
            bincode::serde::decode_from_slice(body, bincode::config::standard())?;

        if state.version != SNAPSHOT_VERSION {
            return Err(EmulatorError::SnapshotVersion {
                found: state.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        log::debug!(
            "Decoded save state from {} (clk {})",
            state.saved_at.to_rfc3339(),
            state.clk
        );
        Ok(state)
    }
}
