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

//! Commodore IEC serial bus
//!
//! Three open-collector lines (ATN, CLK, DATA) are shared by the computer
//! and the drive. A line is high unless some participant pulls it low. Each
//! participant's *output* is stored as "pulling" (`true`) or "released"
//! (`false`); the wire state is resolved from all outputs after every
//! change.
//!
//! ## Resolution
//!
//! ```text
//! modifier  = NOT(cpu_atn) XOR NOT(drive_atna)
//! bus_atn   = NOT(cpu_atn)
//! bus_clock = NOT(cpu_clock) AND NOT(drive_clock)
//! bus_data  = NOT(drive_data) AND NOT(modifier) AND NOT(cpu_data)
//! ```
//!
//! The modifier is the drive's automatic ATN acknowledge: while the host
//! holds ATN and the drive has not answered on ATNA (or the other way
//! round) the drive hardware pulls DATA.
//!
//! ## Device bit layouts
//!
//! ```text
//! Entry point            | Bits
//! -----------------------|------------------------------------------------
//! VIC-20 VIA2 PA write   | 7 ATN out
//! VIC-20 VIA1 PCR write  | 1 CLK out (CA2), 5 DATA out (CB2)
//! VIC-20 VIA2 PA read    | 0 CLK in, 1 DATA in, 7 ATN in
//! C64 CIA2 PA write      | 3 ATN out, 4 CLK out, 5 DATA out
//! C64 CIA2 PA read       | 3 ATN in, 6 CLK in, 7 DATA in
//! 1541 VIA1 PB write     | 1 DATA out, 3 CLK out, 4 ATNA
//! 1541 VIA1 PB read      | 0 DATA in, 2 CLK in, 7 ATN in
//! ```
//!
//! Reads return the line levels (1 = high). Any inversion done by a
//! device's input buffers is applied by the port adapters in [`ports`].

pub mod ports;

use serde::{Deserialize, Serialize};

use crate::core::via::Edge;

/// Output state of every participant (`true` = pulling the line low)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IecOutputs {
    pub cpu_data: bool,
    pub cpu_clock: bool,
    pub cpu_atn: bool,
    pub drive_data: bool,
    pub drive_clock: bool,
    pub drive_atna: bool,
}

/// Resolved wire levels (`true` = high / released)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IecLines {
    pub data: bool,
    pub clock: bool,
    pub atn: bool,
}

impl Default for IecLines {
    fn default() -> Self {
        resolve(&IecOutputs::default())
    }
}

/// ATN acknowledge logic of the drive
#[inline(always)]
pub fn drive_data_modifier(outputs: &IecOutputs) -> bool {
    !outputs.cpu_atn ^ !outputs.drive_atna
}

/// Wire levels produced by a set of outputs
///
/// # Example
///
/// ```
/// use viabus::core::iec::{resolve, IecOutputs};
///
/// let outputs = IecOutputs {
///     drive_atna: true,
///     ..IecOutputs::default()
/// };
/// let lines = resolve(&outputs);
/// assert!(!lines.data); // unanswered ATNA pulls DATA
/// assert!(lines.clock);
/// assert!(lines.atn);
/// ```
pub fn resolve(outputs: &IecOutputs) -> IecLines {
    let modifier = drive_data_modifier(outputs);
    IecLines {
        atn: !outputs.cpu_atn,
        clock: !outputs.cpu_clock && !outputs.drive_clock,
        data: !outputs.drive_data && !modifier && !outputs.cpu_data,
    }
}

/// Serializable bus state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IecBusState {
    pub enabled: bool,
    pub outputs: IecOutputs,
}

/// Shared IEC bus
#[derive(Debug, Clone)]
pub struct IecBus {
    /// Drive emulation switch; when off the bus is inert
    enabled: bool,

    outputs: IecOutputs,

    /// Resolved after every output change
    lines: IecLines,

    /// Host ATN transitions not yet delivered to the drive
    atn_edges: Vec<Edge>,
}

impl IecBus {
    /// Create a bus with every line released
    ///
    /// # Arguments
    ///
    /// * `enabled` - Whether drive emulation is on
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            outputs: IecOutputs::default(),
            lines: IecLines::default(),
            atn_edges: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            log::info!("IEC: drive emulation {}", if enabled { "on" } else { "off" });
        }
        self.enabled = enabled;
    }

    #[inline(always)]
    pub fn outputs(&self) -> IecOutputs {
        self.outputs
    }

    /// Resolved wire state
    #[inline(always)]
    pub fn lines(&self) -> IecLines {
        self.lines
    }

    pub fn drive_data_modifier(&self) -> bool {
        drive_data_modifier(&self.outputs)
    }

    // ------------------------------------------------------------------
    // Per-line setters
    // ------------------------------------------------------------------

    /// Host ATN output
    ///
    /// A change is queued as an edge for the drive's ATN input: asserting
    /// ATN is seen as a rising edge behind the drive's inverting receiver.
    pub fn set_cpu_atn(&mut self, asserted: bool) {
        if !self.enabled {
            return;
        }
        if self.outputs.cpu_atn != asserted {
            self.atn_edges.push(Edge::to_level(asserted));
            log::debug!("IEC: host ATN {}", if asserted { "asserted" } else { "released" });
        }
        self.outputs.cpu_atn = asserted;
        self.update();
    }

    pub fn set_cpu_clock(&mut self, asserted: bool) {
        if !self.enabled {
            return;
        }
        self.outputs.cpu_clock = asserted;
        self.update();
    }

    pub fn set_cpu_data(&mut self, asserted: bool) {
        if !self.enabled {
            return;
        }
        self.outputs.cpu_data = asserted;
        self.update();
    }

    /// Drive outputs, all at once
    pub fn set_drive_outputs(&mut self, data: bool, clock: bool, atna: bool) {
        if !self.enabled {
            return;
        }
        self.outputs.drive_data = data;
        self.outputs.drive_clock = clock;
        self.outputs.drive_atna = atna;
        self.update();
    }

    // ------------------------------------------------------------------
    // VIC-20 host
    // ------------------------------------------------------------------

    /// VIA2 port A pins (bit 7 ATN out)
    pub fn cpu_write_vic20_pa(&mut self, pins: u8) {
        self.set_cpu_atn(pins & 0x80 != 0);
    }

    /// VIA1 control outputs, PCR-shaped (bit 1 CA2 = CLK, bit 5 CB2 = DATA)
    ///
    /// Bits 1 and 5 must already hold the real CA2/CB2 levels.
    pub fn cpu_write_vic20_pcr(&mut self, levels: u8) {
        if !self.enabled {
            return;
        }
        self.outputs.cpu_data = levels & 0x20 != 0;
        self.outputs.cpu_clock = levels & 0x02 != 0;
        self.update();
    }

    /// VIA2 port A view of the bus (0 when drive emulation is off)
    pub fn cpu_read_vic20_pa(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        (u8::from(self.lines.data) << 1) | u8::from(self.lines.clock) | (u8::from(self.lines.atn) << 7)
    }

    // ------------------------------------------------------------------
    // C64 host
    // ------------------------------------------------------------------

    /// CIA2 port A pins (bit 3 ATN, bit 4 CLK, bit 5 DATA)
    pub fn cpu_write_c64(&mut self, pins: u8) {
        if !self.enabled {
            return;
        }
        self.outputs.cpu_data = pins & 0x20 != 0;
        self.outputs.cpu_clock = pins & 0x10 != 0;
        self.set_cpu_atn(pins & 0x08 != 0);
    }

    /// CIA2 port A view of the bus (0 when drive emulation is off)
    pub fn cpu_read_c64(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        (u8::from(self.lines.data) << 7) | (u8::from(self.lines.clock) << 6) | (u8::from(self.lines.atn) << 3)
    }

    // ------------------------------------------------------------------
    // 1541 drive
    // ------------------------------------------------------------------

    /// VIA1 port B pins (bit 1 DATA, bit 3 CLK, bit 4 ATNA)
    pub fn drive_write(&mut self, pins: u8) {
        self.set_drive_outputs(pins & 0x02 != 0, pins & 0x08 != 0, pins & 0x10 != 0);
    }

    /// VIA1 port B view of the bus (0 when drive emulation is off)
    pub fn drive_read(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        u8::from(self.lines.data) | (u8::from(self.lines.clock) << 2) | (u8::from(self.lines.atn) << 7)
    }

    /// Take the host ATN transitions queued since the last call
    pub fn take_atn_edges(&mut self) -> Vec<Edge> {
        std::mem::take(&mut self.atn_edges)
    }

    /// Release every output
    pub fn reset(&mut self) {
        self.outputs = IecOutputs::default();
        self.atn_edges.clear();
        self.update();
    }

    pub fn state(&self) -> IecBusState {
        IecBusState {
            enabled: self.enabled,
            outputs: self.outputs,
        }
    }

    pub fn restore(&mut self, state: &IecBusState) {
        self.enabled = state.enabled;
        self.outputs = state.outputs;
        self.atn_edges.clear();
        self.update();
    }

    fn update(&mut self) {
        let lines = resolve(&self.outputs);
        if lines != self.lines {
            log::trace!(
                "IEC: data={} clock={} atn={}",
                u8::from(lines.data),
                u8::from(lines.clock),
                u8::from(lines.atn)
            );
        }
        self.lines = lines;
    }
}

impl Default for IecBus {
    fn default() -> Self {
        Self::new(true)
    }
}
