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

//! VIA register map and bit definitions

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// The 16 VIA registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViaRegister {
    /// $0 ORB/IRB: port B, acknowledges CB1/CB2
    Prb,
    /// $1 ORA/IRA: port A, acknowledges CA1/CA2
    Pra,
    /// $2 DDRB
    Ddrb,
    /// $3 DDRA
    Ddra,
    /// $4 T1C-L: write goes to latch low, read acknowledges T1
    T1cl,
    /// $5 T1C-H: write loads and starts timer 1
    T1ch,
    /// $6 T1L-L
    T1ll,
    /// $7 T1L-H: write acknowledges T1
    T1lh,
    /// $8 T2C-L: write goes to latch low, read acknowledges T2
    T2cl,
    /// $9 T2C-H: write loads and starts timer 2
    T2ch,
    /// $A SR
    Sr,
    /// $B ACR
    Acr,
    /// $C PCR
    Pcr,
    /// $D IFR
    Ifr,
    /// $E IER
    Ier,
    /// $F ORA/IRA without handshake
    PraNoHandshake,
}

impl ViaRegister {
    /// Decode a bus address; only the low 4 bits are significant
    pub fn from_addr(addr: u16) -> Self {
        match addr & 0x0F {
            0x0 => Self::Prb,
            0x1 => Self::Pra,
            0x2 => Self::Ddrb,
            0x3 => Self::Ddra,
            0x4 => Self::T1cl,
            0x5 => Self::T1ch,
            0x6 => Self::T1ll,
            0x7 => Self::T1lh,
            0x8 => Self::T2cl,
            0x9 => Self::T2ch,
            0xA => Self::Sr,
            0xB => Self::Acr,
            0xC => Self::Pcr,
            0xD => Self::Ifr,
            0xE => Self::Ier,
            _ => Self::PraNoHandshake,
        }
    }
}

bitflags! {
    /// IFR / IER bit layout
    ///
    /// Bit 7 is not a flag: on IFR reads it mirrors the IRQ output, on IER
    /// writes it selects set (1) or clear (0).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct InterruptFlags: u8 {
        const CA2 = 0x01;
        const CA1 = 0x02;
        const SR = 0x04;
        const CB2 = 0x08;
        const CB1 = 0x10;
        const T2 = 0x20;
        const T1 = 0x40;
    }
}

/// IER write bit 7: set (1) or clear (0) the selected enables
pub const IER_SET: u8 = 0x80;

/// IFR read bit 7: any enabled flag active
pub const IFR_IRQ: u8 = 0x80;

/// ACR bit 7: timer 1 drives PB7
pub const ACR_T1_PB7: u8 = 0x80;

/// ACR bit 6: timer 1 free-running
pub const ACR_T1_FREE_RUN: u8 = 0x40;

/// Timer 1 run mode (ACR bit 6; timer 2 is always one-shot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// Interrupt once, then stay dormant until reloaded
    #[default]
    OneShot,
    /// Reload from the latch on every underflow
    FreeRunning,
}

impl TimerMode {
    /// Timer 1 mode selected by an ACR value
    pub fn from_acr(acr: u8) -> Self {
        if acr & ACR_T1_FREE_RUN != 0 {
            Self::FreeRunning
        } else {
            Self::OneShot
        }
    }
}

/// Control lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLine {
    Ca1,
    Ca2,
    Cb1,
    Cb2,
}

/// Direction of a transition on a control line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// Low to high
    Rise,
    /// High to low
    Fall,
}

impl Edge {
    /// Edge that moves a line to `level`
    pub fn to_level(level: bool) -> Self {
        if level {
            Self::Rise
        } else {
            Self::Fall
        }
    }

    /// Whether this edge is the one selected by a PCR polarity bit
    ///
    /// A set polarity bit selects the positive (rising) edge.
    #[inline(always)]
    pub fn matches(self, positive: bool) -> bool {
        matches!(
            (self, positive),
            (Self::Rise, true) | (Self::Fall, false)
        )
    }
}

/// PCR decoding
pub mod pcr {
    /// CA1 active edge (1 = positive)
    pub const CA1_POSITIVE: u8 = 0x01;
    /// CA2 active edge when used as input (1 = positive)
    pub const CA2_POSITIVE: u8 = 0x04;
    /// CA2 configured as output
    pub const CA2_OUTPUT: u8 = 0x08;
    /// CB1 active edge (1 = positive)
    pub const CB1_POSITIVE: u8 = 0x10;
    /// CB2 active edge when used as input (1 = positive)
    pub const CB2_POSITIVE: u8 = 0x40;
    /// CB2 configured as output
    pub const CB2_OUTPUT: u8 = 0x80;

    /// CA2 is an independent-interrupt input (port A access keeps its flag)
    pub fn ca2_independent(pcr: u8) -> bool {
        pcr & 0x0A == 0x02
    }

    /// CB2 is an independent-interrupt input (port B access keeps its flag)
    pub fn cb2_independent(pcr: u8) -> bool {
        pcr & 0xA0 == 0x20
    }

    /// Level driven on CA2
    ///
    /// Only the manual output modes (110 low, 111 high) drive the pin; in
    /// every other mode the pin is released and reads high.
    pub fn ca2_level(pcr: u8) -> bool {
        if pcr & 0x0C == 0x0C {
            pcr & 0x02 != 0
        } else {
            true
        }
    }

    /// Level driven on CB2 (see [`ca2_level`])
    pub fn cb2_level(pcr: u8) -> bool {
        if pcr & 0xC0 == 0xC0 {
            pcr & 0x20 != 0
        } else {
            true
        }
    }
}
