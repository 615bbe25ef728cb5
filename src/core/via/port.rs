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

//! Peripheral wiring of a VIA
//!
//! A VIA only knows its own registers. What the port pins and the CA2/CB2
//! outputs are connected to differs per machine, so that part lives behind
//! the [`ViaPort`] trait. Every method has a default: an unwired pin floats
//! high and stores go nowhere.

use std::fmt;

/// Board-level connections of one VIA
pub trait ViaPort: fmt::Debug {
    /// Port A output register or DDR changed
    ///
    /// # Arguments
    ///
    /// * `value` - Output register contents
    /// * `ddr` - Direction register (1 = output)
    fn store_pa(&mut self, _value: u8, _ddr: u8) {}

    /// Port B output register or DDR changed (see [`ViaPort::store_pa`])
    fn store_pb(&mut self, _value: u8, _ddr: u8) {}

    /// External level on the port A pins
    fn read_pa(&self) -> u8 {
        0xFF
    }

    /// External level on the port B pins
    fn read_pb(&self) -> u8 {
        0xFF
    }

    /// CA2 output level changed
    fn set_ca2(&mut self, _level: bool) {}

    /// CB2 output level changed
    fn set_cb2(&mut self, _level: bool) {}

    /// Chip reset
    fn reset(&mut self) {}
}

/// Unconnected port: inputs read high, outputs are discarded
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPort;

impl ViaPort for NullPort {}
