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

//! CPU interrupt line aggregation
//!
//! Each chip drives one active-low, open-collector interrupt output. Several
//! outputs share a CPU input, so the CPU sees an interrupt while *any* source
//! holds its line asserted. The controller keeps one bit per source and
//! derives the CPU input levels from them.
//!
//! ## Interrupt Sources (Bit Positions)
//!
//! ```text
//! Bit  | Source        | Description
//! -----|---------------|----------------------------------
//! 0    | HOST_VIA1     | VIC-20 VIA1 ($9110), wired to NMI
//! 1    | HOST_VIA2     | VIC-20 VIA2 ($9120), wired to IRQ
//! 2    | DRIVE_VIA1    | 1541 VIA1 ($1800), serial bus
//! 3    | DRIVE_VIA2    | 1541 VIA2 ($1C00), disk controller
//! ```
//!
//! NMI on the 6502 is edge triggered: the controller latches an NMI request
//! when the combined NMI input goes from released to asserted.

use serde::{Deserialize, Serialize};

/// Interrupt source bit flags
pub mod sources {
    /// Host VIA1 (bit 0)
    pub const HOST_VIA1: u16 = 1 << 0;

    /// Host VIA2 (bit 1)
    pub const HOST_VIA2: u16 = 1 << 1;

    /// Drive VIA1 (bit 2)
    pub const DRIVE_VIA1: u16 = 1 << 2;

    /// Drive VIA2 (bit 3)
    pub const DRIVE_VIA2: u16 = 1 << 3;

    /// All sources that belong to the drive CPU
    pub const DRIVE_MASK: u16 = DRIVE_VIA1 | DRIVE_VIA2;
}

/// Which CPU input a source is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrqKind {
    /// Maskable, level triggered
    Irq,
    /// Non-maskable, edge triggered
    Nmi,
}

/// Receiver for chip interrupt outputs
///
/// Chips call this after every change to their flag or enable registers.
/// Reporting the same level twice is allowed and has no further effect.
pub trait IrqSink {
    /// Drive the interrupt output of `source`
    ///
    /// # Arguments
    ///
    /// * `source` - Source bit from [`sources`]
    /// * `asserted` - `true` while the source requests an interrupt
    fn set_irq(&mut self, source: u16, asserted: bool);
}

/// Interrupt inputs of one CPU
///
/// # Example
///
/// ```
/// use viabus::core::interrupt::{sources, InterruptController, IrqSink};
///
/// let mut ic = InterruptController::new(sources::HOST_VIA1);
///
/// ic.set_irq(sources::HOST_VIA2, true);
/// assert!(ic.irq_asserted());
/// assert!(!ic.nmi_asserted());
///
/// ic.set_irq(sources::HOST_VIA1, true);
/// assert!(ic.take_nmi());
/// assert!(!ic.take_nmi()); // latched once per edge
/// ```
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    /// One bit per source currently asserting its output
    status: u16,

    /// Sources wired to the NMI input instead of IRQ
    nmi_sources: u16,

    /// NMI edge seen and not yet taken by the CPU
    nmi_latched: bool,
}

impl InterruptController {
    /// Create a controller with every source released
    ///
    /// # Arguments
    ///
    /// * `nmi_sources` - Sources wired to NMI; all others drive IRQ
    pub fn new(nmi_sources: u16) -> Self {
        Self {
            status: 0,
            nmi_sources,
            nmi_latched: false,
        }
    }

    /// Input a source is wired to
    pub fn kind_of(&self, source: u16) -> IrqKind {
        if self.nmi_sources & source != 0 {
            IrqKind::Nmi
        } else {
            IrqKind::Irq
        }
    }

    /// Raw source status (one bit per asserting source)
    #[inline(always)]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// IRQ input level
    #[inline(always)]
    pub fn irq_asserted(&self) -> bool {
        self.status & !self.nmi_sources != 0
    }

    /// NMI input level
    #[inline(always)]
    pub fn nmi_asserted(&self) -> bool {
        self.status & self.nmi_sources != 0
    }

    /// Consume a latched NMI edge
    ///
    /// # Returns
    ///
    /// `true` once per released-to-asserted transition of the NMI input
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_latched)
    }

    /// Whether an NMI edge is latched and not yet taken
    #[inline(always)]
    pub fn nmi_pending(&self) -> bool {
        self.nmi_latched
    }

    /// Overwrite the NMI latch (save state restore)
    pub fn set_nmi_pending(&mut self, pending: bool) {
        self.nmi_latched = pending;
    }

    /// Release every source and drop any latched NMI
    pub fn reset(&mut self) {
        self.status = 0;
        self.nmi_latched = false;
    }
}

impl IrqSink for InterruptController {
    fn set_irq(&mut self, source: u16, asserted: bool) {
        let nmi_before = self.nmi_asserted();

        if asserted {
            self.status |= source;
        } else {
            self.status &= !source;
        }

        if !nmi_before && self.nmi_asserted() {
            self.nmi_latched = true;
            log::trace!("NMI edge from source 0x{:04X}", source);
        }

        log::trace!(
            "IRQ source 0x{:04X} {}, status=0x{:04X}",
            source,
            if asserted { "asserted" } else { "released" },
            self.status
        );
    }
}
