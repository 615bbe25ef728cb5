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

//! MOS 6522 VIA (Versatile Interface Adapter)
//!
//! Two 8-bit ports with handshake lines, two 16-bit interval timers, a shift
//! register and an interrupt flag/enable pair driving one IRQ output.
//!
//! ## Register Map
//!
//! ```text
//! Reg | Name    | Read                         | Write
//! ----|---------|------------------------------|-----------------------------
//! $0  | ORB/IRB | port B, ack CB1/CB2          | port B, ack CB1/CB2
//! $1  | ORA/IRA | port A, ack CA1/CA2          | port A, ack CA1/CA2
//! $2  | DDRB    | DDRB                         | DDRB
//! $3  | DDRA    | DDRA                         | DDRA
//! $4  | T1C-L   | counter low, ack T1          | latch low
//! $5  | T1C-H   | counter high                 | latch high, load, start T1
//! $6  | T1L-L   | latch low                    | latch low
//! $7  | T1L-H   | latch high                   | latch high, ack T1
//! $8  | T2C-L   | counter low, ack T2          | latch low
//! $9  | T2C-H   | counter high                 | load, start T2
//! $A  | SR      | SR, ack SR                   | SR, ack SR
//! $B  | ACR     | ACR                          | ACR
//! $C  | PCR     | PCR                          | PCR, CA2/CB2 manual output
//! $D  | IFR     | flags, bit 7 = IRQ           | clear flags written as 1
//! $E  | IER     | enables, bit 7 = 1           | bit 7 ? set : clear
//! $F  | ORA/IRA | port A, no handshake         | port A, no handshake
//! ```
//!
//! ## Scheduling
//!
//! The VIA does not own the clock. Every entry point takes a context that
//! implements [`AlarmScheduler`] (clock plus alarms) and [`IrqSink`] (the
//! IRQ output). The owner calls [`Via6522::on_alarm`] when one of the two
//! timer alarms comes due.
//!
//! ## References
//!
//! - [Rockwell R6522 datasheet](http://archive.6502.org/datasheets/rockwell_r6522_via.pdf)

pub mod port;
pub mod registers;
pub mod timer;


use serde::{Deserialize, Serialize};

use crate::core::interrupt::IrqSink;
use crate::core::timing::{AlarmId, AlarmScheduler, Clock, TimingEventManager};

pub use port::{NullPort, ViaPort};
pub use registers::{ControlLine, Edge, InterruptFlags, TimerMode, ViaRegister};
pub use timer::{Timer, TimerKind, TimerState};

use registers::{pcr, ACR_T1_PB7, IER_SET, IFR_IRQ};

/// Everything a VIA needs from its surroundings on each call
pub trait ViaContext: AlarmScheduler + IrqSink {}

impl<T: AlarmScheduler + IrqSink> ViaContext for T {}

/// Serializable VIA state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViaState {
    pub ora: u8,
    pub orb: u8,
    pub ddra: u8,
    pub ddrb: u8,
    pub t1: TimerState,
    pub t2: TimerState,
    pub sr: u8,
    pub acr: u8,
    pub pcr: u8,
    pub ifr: u8,
    pub ier: u8,
    pub pb7: bool,
    pub ca2_level: bool,
    pub cb2_level: bool,
}

/// One 6522 VIA
#[derive(Debug)]
pub struct Via6522 {
    /// Name used in logs ("VIA1", "Drive VIA1", ...)
    name: String,

    /// Bit this chip drives in its interrupt controller
    irq_source: u16,

    /// Board wiring
    port: Box<dyn ViaPort>,

    ora: u8,
    orb: u8,
    ddra: u8,
    ddrb: u8,

    t1: Timer,
    t2: Timer,

    /// Shift register (stored, not shifted)
    sr: u8,

    acr: u8,
    pcr: u8,
    ifr: InterruptFlags,
    ier: InterruptFlags,

    /// Derived IRQ output
    irq: bool,

    /// Timer 1 output on PB7 (ACR bit 7)
    pb7: bool,

    ca2_level: bool,
    cb2_level: bool,
}

impl Via6522 {
    /// Create a VIA and register its two timer alarms
    ///
    /// Alarms are registered T1 then T2, so at equal clocks timer 1 fires
    /// first.
    ///
    /// # Arguments
    ///
    /// * `name` - Name for logs and alarm names
    /// * `irq_source` - Interrupt controller bit this chip drives
    /// * `timing` - Scheduler to register the alarms with
    ///
    /// # Example
    ///
    /// ```
    /// use viabus::core::interrupt::{sources, InterruptController};
    /// use viabus::core::timing::TimingEventManager;
    /// use viabus::core::via::Via6522;
    ///
    /// let mut timing = TimingEventManager::new();
    /// let via = Via6522::new("VIA2", sources::HOST_VIA2, &mut timing);
    /// assert_eq!(via.ifr(), 0);
    /// assert_eq!(timing.alarm_count(), 2);
    /// ```
    pub fn new(name: &str, irq_source: u16, timing: &mut TimingEventManager) -> Self {
        let t1_alarm = timing.register_alarm(&format!("{} T1", name));
        let t2_alarm = timing.register_alarm(&format!("{} T2", name));

        Self {
            name: name.to_string(),
            irq_source,
            port: Box::new(NullPort),
            ora: 0,
            orb: 0,
            ddra: 0,
            ddrb: 0,
            t1: Timer::new(TimerKind::A, t1_alarm),
            t2: Timer::new(TimerKind::B, t2_alarm),
            sr: 0,
            acr: 0,
            pcr: 0,
            ifr: InterruptFlags::empty(),
            ier: InterruptFlags::empty(),
            irq: false,
            pb7: false,
            ca2_level: true,
            cb2_level: true,
        }
    }

    /// Attach board wiring
    pub fn with_port(mut self, port: Box<dyn ViaPort>) -> Self {
        self.port = port;
        self
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    pub fn irq_source(&self) -> u16 {
        self.irq_source
    }

    /// Raw interrupt flags (without bit 7)
    #[inline(always)]
    pub fn ifr(&self) -> u8 {
        self.ifr.bits()
    }

    /// Raw interrupt enables (without bit 7)
    #[inline(always)]
    pub fn ier(&self) -> u8 {
        self.ier.bits()
    }

    #[inline(always)]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    #[inline(always)]
    pub fn pcr(&self) -> u8 {
        self.pcr
    }

    /// IRQ output level as last recomputed
    #[inline(always)]
    pub fn irq_active(&self) -> bool {
        self.irq
    }

    #[inline(always)]
    pub fn pb7(&self) -> bool {
        self.pb7
    }

    #[inline(always)]
    pub fn ca2_level(&self) -> bool {
        self.ca2_level
    }

    #[inline(always)]
    pub fn cb2_level(&self) -> bool {
        self.cb2_level
    }

    /// Timer 1
    pub fn t1(&self) -> &Timer {
        &self.t1
    }

    /// Timer 2
    pub fn t2(&self) -> &Timer {
        &self.t2
    }

    /// Whether `alarm` belongs to one of this chip's timers
    pub fn owns(&self, alarm: AlarmId) -> bool {
        alarm == self.t1.alarm() || alarm == self.t2.alarm()
    }

    /// Read a register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address; only the low 4 bits are decoded
    /// * `ctx` - Scheduler and IRQ sink
    ///
    /// # Returns
    ///
    /// Register value
    pub fn read<C: ViaContext>(&mut self, addr: u16, ctx: &mut C) -> u8 {
        self.service_due_timers(ctx);
        let clk = ctx.clk();
        let reg = ViaRegister::from_addr(addr);

        let value = match reg {
            ViaRegister::Prb => {
                self.acknowledge_port_b(ctx);
                self.read_port_b()
            }
            ViaRegister::Pra => {
                self.acknowledge_port_a(ctx);
                self.read_port_a()
            }
            ViaRegister::PraNoHandshake => self.read_port_a(),
            ViaRegister::Ddrb => self.ddrb,
            ViaRegister::Ddra => self.ddra,
            ViaRegister::T1cl => {
                self.clear_flags(InterruptFlags::T1, ctx);
                self.t1.counter(clk) as u8
            }
            ViaRegister::T1ch => (self.t1.counter(clk) >> 8) as u8,
            ViaRegister::T1ll => self.t1.latch() as u8,
            ViaRegister::T1lh => (self.t1.latch() >> 8) as u8,
            ViaRegister::T2cl => {
                self.clear_flags(InterruptFlags::T2, ctx);
                self.t2.counter(clk) as u8
            }
            ViaRegister::T2ch => (self.t2.counter(clk) >> 8) as u8,
            ViaRegister::Sr => {
                self.clear_flags(InterruptFlags::SR, ctx);
                self.sr
            }
            ViaRegister::Acr => self.acr,
            ViaRegister::Pcr => self.pcr,
            ViaRegister::Ifr => {
                if self.irq {
                    self.ifr.bits() | IFR_IRQ
                } else {
                    self.ifr.bits()
                }
            }
            ViaRegister::Ier => self.ier.bits() | IER_SET,
        };

        log::trace!(
            "{} read {:?} = 0x{:02X} @ {}",
            self.name,
            reg,
            value,
            clk
        );
        value
    }

    /// Write a register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address; only the low 4 bits are decoded
    /// * `value` - Value to write
    /// * `ctx` - Scheduler and IRQ sink
    pub fn write<C: ViaContext>(&mut self, addr: u16, value: u8, ctx: &mut C) {
        self.service_due_timers(ctx);
        let clk = ctx.clk();
        let reg = ViaRegister::from_addr(addr);

        log::trace!(
            "{} write {:?} = 0x{:02X} @ {}",
            self.name,
            reg,
            value,
            clk
        );

        match reg {
            ViaRegister::Prb => {
                self.orb = value;
                self.acknowledge_port_b(ctx);
                self.store_port_b();
            }
            ViaRegister::Pra => {
                self.acknowledge_port_a(ctx);
                self.write_port_a(value);
            }
            ViaRegister::PraNoHandshake => self.write_port_a(value),
            ViaRegister::Ddrb => {
                self.ddrb = value;
                self.store_port_b();
            }
            ViaRegister::Ddra => {
                self.ddra = value;
                self.port.store_pa(self.ora, self.ddra);
            }
            ViaRegister::T1cl | ViaRegister::T1ll => self.t1.set_latch_low(value),
            ViaRegister::T1ch => {
                self.t1.set_latch_high(value);
                self.t1.set_mode(TimerMode::from_acr(self.acr));
                let at = self.t1.load(self.t1.latch(), clk);
                ctx.schedule_alarm(self.t1.alarm(), at);
                self.pb7 = false;
                self.clear_flags(InterruptFlags::T1, ctx);
                if self.acr & ACR_T1_PB7 != 0 {
                    self.store_port_b();
                }
                log::debug!(
                    "{} T1 loaded 0x{:04X} ({:?}), underflow @ {}",
                    self.name,
                    self.t1.latch(),
                    self.t1.mode(),
                    at
                );
            }
            ViaRegister::T1lh => {
                self.t1.set_latch_high(value);
                self.clear_flags(InterruptFlags::T1, ctx);
            }
            ViaRegister::T2cl => self.t2.set_latch_low(value),
            ViaRegister::T2ch => {
                self.t2.set_latch_high(value);
                let at = self.t2.load(self.t2.latch(), clk);
                ctx.schedule_alarm(self.t2.alarm(), at);
                self.clear_flags(InterruptFlags::T2, ctx);
                log::debug!(
                    "{} T2 loaded 0x{:04X}, underflow @ {}",
                    self.name,
                    self.t2.latch(),
                    at
                );
            }
            ViaRegister::Sr => {
                self.sr = value;
                self.clear_flags(InterruptFlags::SR, ctx);
            }
            ViaRegister::Acr => {
                let pb7_was_driven = self.acr & ACR_T1_PB7 != 0;
                self.acr = value;
                self.t1.set_mode(TimerMode::from_acr(value));
                if pb7_was_driven != (value & ACR_T1_PB7 != 0) {
                    self.store_port_b();
                }
                log::debug!("{} ACR = 0x{:02X} (T1 {:?})", self.name, value, self.t1.mode());
            }
            ViaRegister::Pcr => {
                self.pcr = value;
                self.update_control_outputs();
                log::debug!("{} PCR = 0x{:02X}", self.name, value);
            }
            ViaRegister::Ifr => {
                self.clear_flags(InterruptFlags::from_bits_truncate(value), ctx);
            }
            ViaRegister::Ier => {
                let mask = InterruptFlags::from_bits_truncate(value);
                if value & IER_SET != 0 {
                    self.ier.insert(mask);
                } else {
                    self.ier.remove(mask);
                }
                self.recompute_irq(ctx);
            }
        }
    }

    /// Report a transition on a control line
    ///
    /// CA1/CB1 always act as inputs. CA2/CB2 only raise their flag while
    /// configured as inputs.
    pub fn signal<C: ViaContext>(&mut self, line: ControlLine, edge: Edge, ctx: &mut C) {
        let triggered = match line {
            ControlLine::Ca1 => edge.matches(self.pcr & pcr::CA1_POSITIVE != 0),
            ControlLine::Ca2 => {
                self.pcr & pcr::CA2_OUTPUT == 0
                    && edge.matches(self.pcr & pcr::CA2_POSITIVE != 0)
            }
            ControlLine::Cb1 => edge.matches(self.pcr & pcr::CB1_POSITIVE != 0),
            ControlLine::Cb2 => {
                self.pcr & pcr::CB2_OUTPUT == 0
                    && edge.matches(self.pcr & pcr::CB2_POSITIVE != 0)
            }
        };

        if triggered {
            self.ifr.insert(match line {
                ControlLine::Ca1 => InterruptFlags::CA1,
                ControlLine::Ca2 => InterruptFlags::CA2,
                ControlLine::Cb1 => InterruptFlags::CB1,
                ControlLine::Cb2 => InterruptFlags::CB2,
            });
            log::debug!("{} {:?} {:?} edge latched", self.name, line, edge);
        }

        self.recompute_irq(ctx);
    }

    /// Handle a due timer alarm
    ///
    /// # Arguments
    ///
    /// * `alarm` - Alarm that fired
    /// * `firing` - Clock the alarm was scheduled for
    /// * `ctx` - Scheduler and IRQ sink
    ///
    /// # Returns
    ///
    /// `false` if the alarm does not belong to this chip
    pub fn on_alarm<C: ViaContext>(&mut self, alarm: AlarmId, firing: Clock, ctx: &mut C) -> bool {
        let kind = if alarm == self.t1.alarm() {
            TimerKind::A
        } else if alarm == self.t2.alarm() {
            TimerKind::B
        } else {
            return false;
        };

        // A register access may have serviced this underflow already.
        let timer = match kind {
            TimerKind::A => &self.t1,
            TimerKind::B => &self.t2,
        };
        if timer.next_underflow_clock() != Some(firing) {
            log::trace!("{} {} stale alarm @ {}", self.name, kind.label(), firing);
            return true;
        }

        self.underflow(kind, firing, ctx);
        true
    }

    /// Recompute the IRQ output from IFR and IER
    ///
    /// Idempotent; the level is pushed to the sink on every call.
    ///
    /// # Returns
    ///
    /// New IRQ level
    pub fn recompute_irq<C: IrqSink>(&mut self, ctx: &mut C) -> bool {
        let irq = self.ifr.intersects(self.ier);
        if irq != self.irq {
            log::trace!(
                "{} IRQ {} (IFR=0x{:02X} IER=0x{:02X})",
                self.name,
                if irq { "asserted" } else { "released" },
                self.ifr.bits(),
                self.ier.bits()
            );
        }
        self.irq = irq;
        ctx.set_irq(self.irq_source, irq);
        irq
    }

    /// Chip reset
    ///
    /// Ports, DDRs, ACR, PCR, IFR and IER are cleared. Latches, counters and
    /// the shift register keep their contents; the timers stop interrupting.
    pub fn reset<C: ViaContext>(&mut self, ctx: &mut C) {
        self.ora = 0;
        self.orb = 0;
        self.ddra = 0;
        self.ddrb = 0;
        self.acr = 0;
        self.pcr = 0;
        self.ifr = InterruptFlags::empty();
        self.ier = InterruptFlags::empty();
        self.pb7 = false;

        self.t1.stop();
        self.t2.stop();
        self.t1.set_mode(TimerMode::OneShot);
        ctx.cancel_alarm(self.t1.alarm());
        ctx.cancel_alarm(self.t2.alarm());

        self.ca2_level = true;
        self.cb2_level = true;
        self.port.reset();
        self.port.set_ca2(true);
        self.port.set_cb2(true);
        self.port.store_pa(self.ora, self.ddra);
        self.port.store_pb(self.orb, self.ddrb);

        self.recompute_irq(ctx);
        log::info!("{} reset", self.name);
    }

    /// Shift stored clocks down by `delta`
    ///
    /// Must be called together with the scheduler's own rebase, with the
    /// clock value from before the shift.
    pub fn prevent_clk_overflow(&mut self, delta: Clock, clk: Clock) {
        self.t1.rebase(delta, clk);
        self.t2.rebase(delta, clk);
    }

    /// Port B pins as seen from outside
    ///
    /// # Returns
    ///
    /// `(value, ddr)` with PB7 replaced by the timer 1 output when ACR
    /// bit 7 is set
    pub fn port_b_pins(&self) -> (u8, u8) {
        if self.acr & ACR_T1_PB7 != 0 {
            let pb7 = if self.pb7 { 0x80 } else { 0x00 };
            ((self.orb & 0x7F) | pb7, self.ddrb | 0x80)
        } else {
            (self.orb, self.ddrb)
        }
    }

    pub fn snapshot(&self) -> ViaState {
        ViaState {
            ora: self.ora,
            orb: self.orb,
            ddra: self.ddra,
            ddrb: self.ddrb,
            t1: self.t1.state(),
            t2: self.t2.state(),
            sr: self.sr,
            acr: self.acr,
            pcr: self.pcr,
            ifr: self.ifr.bits(),
            ier: self.ier.bits(),
            pb7: self.pb7,
            ca2_level: self.ca2_level,
            cb2_level: self.cb2_level,
        }
    }

    /// Load saved state
    ///
    /// Pending underflows are re-armed in the scheduler and the port
    /// outputs are pushed to the board wiring again.
    pub fn restore<C: ViaContext>(&mut self, state: &ViaState, ctx: &mut C) {
        self.ora = state.ora;
        self.orb = state.orb;
        self.ddra = state.ddra;
        self.ddrb = state.ddrb;
        self.t1.restore(&state.t1);
        self.t2.restore(&state.t2);
        self.sr = state.sr;
        self.acr = state.acr;
        self.pcr = state.pcr;
        self.ifr = InterruptFlags::from_bits_truncate(state.ifr);
        self.ier = InterruptFlags::from_bits_truncate(state.ier);
        self.pb7 = state.pb7;
        self.ca2_level = state.ca2_level;
        self.cb2_level = state.cb2_level;

        for timer in [&self.t1, &self.t2] {
            match timer.next_underflow_clock() {
                Some(at) => ctx.schedule_alarm(timer.alarm(), at),
                None => ctx.cancel_alarm(timer.alarm()),
            }
        }

        self.port.store_pa(self.ora, self.ddra);
        self.store_port_b();
        self.port.set_ca2(self.ca2_level);
        self.port.set_cb2(self.cb2_level);
        self.recompute_irq(ctx);
    }

    /// Fire any underflow that is already due
    ///
    /// Keeps register accesses consistent when the owner has advanced the
    /// clock without dispatching alarms yet.
    fn service_due_timers<C: ViaContext>(&mut self, ctx: &mut C) {
        let clk = ctx.clk();
        while let Some(at) = self.t1.next_underflow_clock().filter(|&at| at <= clk) {
            self.underflow(TimerKind::A, at, ctx);
        }
        while let Some(at) = self.t2.next_underflow_clock().filter(|&at| at <= clk) {
            self.underflow(TimerKind::B, at, ctx);
        }
    }

    fn underflow<C: ViaContext>(&mut self, kind: TimerKind, firing: Clock, ctx: &mut C) {
        self.ifr.insert(kind.flag());

        match kind {
            TimerKind::A => {
                if self.t1.mode() == TimerMode::FreeRunning {
                    let at = self.t1.reload(firing);
                    ctx.schedule_alarm(self.t1.alarm(), at);
                    self.pb7 = !self.pb7;
                } else {
                    self.t1.stop();
                    ctx.cancel_alarm(self.t1.alarm());
                    self.pb7 = true;
                }
                if self.acr & ACR_T1_PB7 != 0 {
                    self.store_port_b();
                }
            }
            TimerKind::B => {
                self.t2.stop();
                ctx.cancel_alarm(self.t2.alarm());
            }
        }

        log::trace!("{} {} underflow @ {}", self.name, kind.label(), firing);
        self.recompute_irq(ctx);
    }

    fn clear_flags<C: IrqSink>(&mut self, flags: InterruptFlags, ctx: &mut C) {
        self.ifr.remove(flags);
        self.recompute_irq(ctx);
    }

    /// Port A access acknowledges CA1, and CA2 unless it is independent
    fn acknowledge_port_a<C: IrqSink>(&mut self, ctx: &mut C) {
        let mut flags = InterruptFlags::CA1;
        if !pcr::ca2_independent(self.pcr) {
            flags |= InterruptFlags::CA2;
        }
        self.clear_flags(flags, ctx);
    }

    /// Port B access acknowledges CB1, and CB2 unless it is independent
    fn acknowledge_port_b<C: IrqSink>(&mut self, ctx: &mut C) {
        let mut flags = InterruptFlags::CB1;
        if !pcr::cb2_independent(self.pcr) {
            flags |= InterruptFlags::CB2;
        }
        self.clear_flags(flags, ctx);
    }

    /// Shared data path of ORA ($1) and ORA without handshake ($F)
    fn write_port_a(&mut self, value: u8) {
        self.ora = value;
        self.port.store_pa(self.ora, self.ddra);
    }

    fn read_port_a(&self) -> u8 {
        (self.ora & self.ddra) | (self.port.read_pa() & !self.ddra)
    }

    fn read_port_b(&self) -> u8 {
        let value = (self.orb & self.ddrb) | (self.port.read_pb() & !self.ddrb);
        if self.acr & ACR_T1_PB7 != 0 {
            (value & 0x7F) | if self.pb7 { 0x80 } else { 0x00 }
        } else {
            value
        }
    }

    fn store_port_b(&mut self) {
        let (value, ddr) = self.port_b_pins();
        self.port.store_pb(value, ddr);
    }

    fn update_control_outputs(&mut self) {
        let ca2 = pcr::ca2_level(self.pcr);
        let cb2 = pcr::cb2_level(self.pcr);
        if ca2 != self.ca2_level {
            log::debug!("{} CA2 -> {}", self.name, ca2 as u8);
        }
        if cb2 != self.cb2_level {
            log::debug!("{} CB2 -> {}", self.name, cb2 as u8);
        }
        self.ca2_level = ca2;
        self.cb2_level = cb2;
        self.port.set_ca2(ca2);
        self.port.set_cb2(cb2);
    }
}
