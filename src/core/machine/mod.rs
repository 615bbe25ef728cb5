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

//! Machine integration
//!
//! Owns the clock, the chips and the bus, and threads them together:
//!
//! ```text
//!   VIC-20 host                         1541 drive
//! +-------------------+               +------------------+
//! | VIA1 $9110 (NMI)  |-- CA2 CLK ---+|                  |
//! |                   |-- CB2 DATA --+|                  |
//! | VIA2 $9120 (IRQ)  |-- PA7 ATN ---+|-- IEC bus ---+   |
//! |                   |<- PA0/1 -----+|              |   |
//! +-------------------+               | VIA1 $1800   |<--+ PB0-4, PB7
//!                                     |  CA1 <- ATN edge |
//!                                     +------------------+
//! ```
//!
//! The CPUs themselves are not emulated. Callers drive the machine through
//! register accesses, control line signals and [`Machine::run_until`],
//! which dispatches every alarm that falls due on the way.

mod context;

pub use context::ChipContext;

use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core::config::MachineConfig;
use crate::core::error::{EmulatorError, Result};
use crate::core::iec::ports::{DriveSerialPort, HostControlPort, HostSerialPort};
use crate::core::iec::{IecBus, IecLines};
use crate::core::interrupt::sources;
use crate::core::snapshot::MachineState;
use crate::core::timing::{AlarmScheduler, Clock, TimingEventManager};
use crate::core::trace::{TraceEvent, Tracer};
use crate::core::via::timer::REBASE_HEADROOM;
use crate::core::via::{ControlLine, Edge, Via6522};

/// Chips addressable on the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipId {
    /// VIC-20 VIA1 at $9110
    HostVia1,
    /// VIC-20 VIA2 at $9120
    HostVia2,
    /// 1541 VIA1 at $1800
    DriveVia1,
}

impl ChipId {
    /// Every chip, in alarm registration order
    pub const ALL: [ChipId; 3] = [ChipId::HostVia1, ChipId::HostVia2, ChipId::DriveVia1];

    #[inline(always)]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChipId::HostVia1 => "host_via1",
            ChipId::HostVia2 => "host_via2",
            ChipId::DriveVia1 => "drive_via1",
        })
    }
}

/// VIC-20 + 1541 peripheral set
#[derive(Debug)]
pub struct Machine {
    config: MachineConfig,
    ctx: ChipContext,

    /// Indexed by [`ChipId::index`]
    vias: Vec<Via6522>,

    bus: Rc<RefCell<IecBus>>,
}

impl Machine {
    /// Build and reset the machine
    ///
    /// # Example
    ///
    /// ```
    /// use viabus::core::config::MachineConfig;
    /// use viabus::core::machine::{ChipId, Machine};
    ///
    /// let mut machine = Machine::new(&MachineConfig::default());
    /// machine.run_until(1000);
    /// machine.write(ChipId::HostVia2, 0x6, 0xFF);
    /// machine.write(ChipId::HostVia2, 0x5, 0x00);
    /// machine.run_until(1258);
    /// assert_eq!(machine.read(ChipId::HostVia2, 0xD) & 0x40, 0x40);
    /// ```
    pub fn new(config: &MachineConfig) -> Self {
        let mut timing = TimingEventManager::new();
        let bus = Rc::new(RefCell::new(IecBus::new(config.true_drive)));

        // Order matters: it fixes alarm delivery order at equal clocks.
        let vias = vec![
            Via6522::new("VIA1", sources::HOST_VIA1, &mut timing)
                .with_port(Box::new(HostControlPort::new(bus.clone()))),
            Via6522::new("VIA2", sources::HOST_VIA2, &mut timing)
                .with_port(Box::new(HostSerialPort::new(bus.clone()))),
            Via6522::new("Drive VIA1", sources::DRIVE_VIA1, &mut timing)
                .with_port(Box::new(DriveSerialPort::new(bus.clone()))),
        ];

        let mut machine = Self {
            config: config.clone(),
            ctx: ChipContext::new(timing),
            vias,
            bus,
        };

        log::info!(
            "Machine created (true drive {})",
            if config.true_drive { "on" } else { "off" }
        );
        machine.reset();
        machine
    }

    /// Reset every chip and the bus
    pub fn reset(&mut self) {
        self.ctx.host_irq.reset();
        self.ctx.drive_irq.reset();
        self.bus.borrow_mut().reset();

        for via in &mut self.vias {
            via.reset(&mut self.ctx);
        }

        let clk = self.ctx.clk();
        self.ctx.trace(TraceEvent::Reset { clk });
        self.route_atn_edges();
    }

    #[inline(always)]
    pub fn clk(&self) -> Clock {
        self.ctx.clk()
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn via(&self, chip: ChipId) -> &Via6522 {
        &self.vias[chip.index()]
    }

    /// Scheduler state, for inspection
    pub fn timing(&self) -> &TimingEventManager {
        &self.ctx.timing
    }

    /// Host IRQ input
    pub fn host_irq(&self) -> bool {
        self.ctx.host_irq.irq_asserted()
    }

    /// Host NMI input
    pub fn host_nmi(&self) -> bool {
        self.ctx.host_irq.nmi_asserted()
    }

    /// Consume a pending host NMI edge
    pub fn take_host_nmi(&mut self) -> bool {
        self.ctx.host_irq.take_nmi()
    }

    /// Drive IRQ input
    pub fn drive_irq(&self) -> bool {
        self.ctx.drive_irq.irq_asserted()
    }

    pub fn iec_lines(&self) -> IecLines {
        self.bus.borrow().lines()
    }

    /// CPU read of a chip register
    pub fn read(&mut self, chip: ChipId, addr: u16) -> u8 {
        let value = self.vias[chip.index()].read(addr, &mut self.ctx);
        let clk = self.ctx.clk();
        self.ctx.trace(TraceEvent::Read {
            clk,
            chip,
            reg: (addr & 0x0F) as u8,
            value,
        });
        self.route_atn_edges();
        value
    }

    /// CPU write to a chip register
    pub fn write(&mut self, chip: ChipId, addr: u16, value: u8) {
        let clk = self.ctx.clk();
        self.ctx.trace(TraceEvent::Write {
            clk,
            chip,
            reg: (addr & 0x0F) as u8,
            value,
        });
        self.vias[chip.index()].write(addr, value, &mut self.ctx);
        self.route_atn_edges();
    }

    /// External transition on a control line
    pub fn signal(&mut self, chip: ChipId, line: ControlLine, edge: Edge) {
        let clk = self.ctx.clk();
        self.ctx.trace(TraceEvent::Signal {
            clk,
            chip,
            line,
            edge,
        });
        self.vias[chip.index()].signal(line, edge, &mut self.ctx);
    }

    /// Advance the clock to `target`, dispatching due alarms in order
    ///
    /// Rebases the clock afterwards once it has reached the configured
    /// threshold.
    pub fn run_until(&mut self, target: Clock) {
        while let Some(at) = self
            .ctx
            .timing
            .next_alarm_clock()
            .filter(|&at| at <= target)
        {
            let clk = self.ctx.clk().max(at);
            self.ctx.timing.set_clk(clk);
            self.dispatch_due_alarms();
        }
        self.ctx.timing.set_clk(target);

        if self.ctx.clk() >= self.config.rebase_threshold {
            self.prevent_clk_overflow();
        }
    }

    /// Advance the clock by `cycles`
    pub fn step(&mut self, cycles: Clock) {
        self.run_until(self.ctx.clk() + cycles);
    }

    /// Shift every stored clock down by the configured amount
    ///
    /// The scheduler and all chips move in one step, so no alarm fires
    /// earlier or later in cycles-from-now terms. The clock is never
    /// shifted below [`REBASE_HEADROOM`].
    pub fn prevent_clk_overflow(&mut self) {
        let clk = self.ctx.clk();
        let delta = self
            .config
            .rebase_amount
            .min(clk.saturating_sub(REBASE_HEADROOM));
        if delta == 0 {
            return;
        }

        self.ctx.timing.rebase(delta);
        for via in &mut self.vias {
            via.prevent_clk_overflow(delta, clk);
        }

        let clk = self.ctx.clk();
        self.ctx.trace(TraceEvent::Rebase { clk, delta });
        log::debug!("Machine: clock rebased by {}, now {}", delta, clk);
    }

    /// Start recording trace events (discarding any previous recording)
    pub fn enable_tracing(&mut self) {
        self.ctx.tracer = Some(Tracer::new());
    }

    /// Stop recording and hand out the recorded events
    pub fn take_trace(&mut self) -> Vec<TraceEvent> {
        self.ctx
            .tracer
            .take()
            .map(|mut tracer| tracer.take())
            .unwrap_or_default()
    }

    /// Capture the machine state
    pub fn snapshot(&self) -> MachineState {
        MachineState::new(
            self.ctx.clk(),
            self.vias.iter().map(Via6522::snapshot).collect(),
            self.bus.borrow().state(),
            self.ctx.host_irq.nmi_pending(),
        )
    }

    /// Load a captured machine state
    pub fn restore(&mut self, state: &MachineState) -> Result<()> {
        if state.vias.len() != self.vias.len() {
            return Err(EmulatorError::SnapshotLayout(format!(
                "{} VIAs in save state, machine has {}",
                state.vias.len(),
                self.vias.len()
            )));
        }

        self.ctx.timing.restore_clk(state.clk);
        self.ctx.host_irq.reset();
        self.ctx.drive_irq.reset();
        self.bus.borrow_mut().restore(&state.bus);

        for (via, via_state) in self.vias.iter_mut().zip(&state.vias) {
            via.restore(via_state, &mut self.ctx);
        }

        // Re-pushing port outputs is not a new ATN transition, and
        // re-asserting a saved NMI level is not a new NMI edge.
        self.bus.borrow_mut().take_atn_edges();
        self.ctx.host_irq.set_nmi_pending(state.host_nmi_pending);
        Ok(())
    }

    /// Write a save state file
    pub fn save_state(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.snapshot().to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        log::info!("Saved state to {}", path.as_ref().display());
        Ok(())
    }

    /// Read a save state file
    pub fn load_state(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = std::fs::read(path.as_ref())?;
        let state = MachineState::from_bytes(&bytes)?;
        self.restore(&state)?;
        log::info!("Loaded state from {}", path.as_ref().display());
        Ok(())
    }

    fn dispatch_due_alarms(&mut self) {
        while let Some((alarm, at)) = self.ctx.timing.pop_due() {
            let name = self.ctx.timing.alarm_name(alarm).to_string();
            self.ctx.trace(TraceEvent::AlarmFired { clk: at, alarm: name });

            match self.vias.iter_mut().find(|via| via.owns(alarm)) {
                Some(via) => {
                    via.on_alarm(alarm, at, &mut self.ctx);
                }
                None => log::warn!("Machine: {} has no owner", alarm),
            }
        }
        self.route_atn_edges();
    }

    /// Deliver host ATN transitions to the drive's CA1 input
    fn route_atn_edges(&mut self) {
        let edges = self.bus.borrow_mut().take_atn_edges();
        for edge in edges {
            self.signal(ChipId::DriveVia1, ControlLine::Ca1, edge);
        }
    }
}

#[cfg(test)]
mod tests;
