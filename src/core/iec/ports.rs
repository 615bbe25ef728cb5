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

//! VIA port adapters that connect VIAs to the IEC bus
//!
//! Port pins reach the bus through open-collector inverters: a pin that is
//! high pulls its line low. A pin configured as input floats high, so the
//! pin level is `value | !ddr`.
//!
//! ```text
//! Adapter           | VIA               | Wiring
//! ------------------|-------------------|----------------------------------
//! HostSerialPort    | VIC-20 VIA2 ($9120) | PA7 ATN out, PA0/PA1 CLK/DATA in
//! HostControlPort   | VIC-20 VIA1 ($9110) | CA2 CLK out, CB2 DATA out
//! DriveSerialPort   | 1541 VIA1 ($1800)   | PB1/PB3/PB4 out, PB0/PB2/PB7 in
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::IecBus;
use crate::core::via::ViaPort;

/// Unconnected host port A inputs (joystick, cassette sense) float high
const HOST_PA_IDLE: u8 = 0x7C;

/// Drive port B inputs that are inverted by the 1541's receivers
const DRIVE_PB_INVERTED: u8 = 0x85;

/// Level on a port's pins
#[inline(always)]
fn pin_levels(value: u8, ddr: u8) -> u8 {
    value | !ddr
}

/// VIC-20 VIA2 port A
#[derive(Debug, Clone)]
pub struct HostSerialPort {
    bus: Rc<RefCell<IecBus>>,
}

impl HostSerialPort {
    pub fn new(bus: Rc<RefCell<IecBus>>) -> Self {
        Self { bus }
    }
}

impl ViaPort for HostSerialPort {
    fn store_pa(&mut self, value: u8, ddr: u8) {
        self.bus
            .borrow_mut()
            .cpu_write_vic20_pa(pin_levels(value, ddr));
    }

    fn read_pa(&self) -> u8 {
        self.bus.borrow().cpu_read_vic20_pa() | HOST_PA_IDLE
    }
}

/// VIC-20 VIA1 CA2/CB2
#[derive(Debug, Clone)]
pub struct HostControlPort {
    bus: Rc<RefCell<IecBus>>,
    ca2: bool,
    cb2: bool,
}

impl HostControlPort {
    pub fn new(bus: Rc<RefCell<IecBus>>) -> Self {
        Self {
            bus,
            ca2: true,
            cb2: true,
        }
    }

    fn store(&self) {
        let levels = (u8::from(self.cb2) << 5) | (u8::from(self.ca2) << 1);
        self.bus.borrow_mut().cpu_write_vic20_pcr(levels);
    }
}

impl ViaPort for HostControlPort {
    fn set_ca2(&mut self, level: bool) {
        self.ca2 = level;
        self.store();
    }

    fn set_cb2(&mut self, level: bool) {
        self.cb2 = level;
        self.store();
    }

    fn reset(&mut self) {
        self.ca2 = true;
        self.cb2 = true;
    }
}

/// 1541 VIA1 port B
#[derive(Debug, Clone)]
pub struct DriveSerialPort {
    bus: Rc<RefCell<IecBus>>,
}

impl DriveSerialPort {
    pub fn new(bus: Rc<RefCell<IecBus>>) -> Self {
        Self { bus }
    }
}

impl ViaPort for DriveSerialPort {
    fn store_pb(&mut self, value: u8, ddr: u8) {
        self.bus.borrow_mut().drive_write(pin_levels(value, ddr));
    }

    /// Device address jumpers (PB5/PB6) read 0: unit 8
    fn read_pb(&self) -> u8 {
        (self.bus.borrow().drive_read() ^ DRIVE_PB_INVERTED) & DRIVE_PB_INVERTED
    }
}
