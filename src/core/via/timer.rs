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

//! VIA interval timers
//!
//! The counter is never decremented cycle by cycle. A load records the value
//! and the clock it took effect at, and the live value is derived on demand:
//!
//! ```text
//! current = base - ((clk - base_clock) mod (base + 1))
//! ```
//!
//! Before `base_clock` (the cycle of the load itself) the counter reads as
//! `base`. The underflow is not polled either: the timer reports the clock
//! it will underflow at and the VIA arms an alarm for it.
//!
//! ## Offsets
//!
//! ```text
//! Event                     | base_clock   | underflow
//! --------------------------|--------------|------------------------
//! T1CH / T2CH write at W    | W + 1        | base_clock + N + 2
//! Free-running reload at F  | F            | F + N + 1
//! ```

use serde::{Deserialize, Serialize};

use super::registers::{InterruptFlags, TimerMode};
use crate::core::timing::{AlarmId, Clock};

/// Cycles between a high-byte write and the counter taking the new value
pub const LOAD_DELAY: Clock = 1;

/// Extra cycles from `base_clock` to the first underflow after a load
pub const INITIAL_UNDERFLOW_DELAY: Clock = 2;

/// Extra cycles from a reload to the next underflow in free-running mode
pub const RELOAD_UNDERFLOW_DELAY: Clock = 1;

/// Longest counter cycle (latch 0xFFFF) plus the load delay
///
/// A rebase must leave the clock at least this high, or a timer whose base
/// clock is older than the shift has no earlier clock to keep its phase at.
pub const REBASE_HEADROOM: Clock = 0x1_0000 + LOAD_DELAY;

/// Which of the two VIA timers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    /// Timer 1: one-shot or free-running, can drive PB7
    A,
    /// Timer 2: always one-shot
    B,
}

impl TimerKind {
    /// IFR bit this timer sets on underflow
    pub fn flag(self) -> InterruptFlags {
        match self {
            TimerKind::A => InterruptFlags::T1,
            TimerKind::B => InterruptFlags::T2,
        }
    }

    /// Register-sheet name ("T1" / "T2")
    pub fn label(self) -> &'static str {
        match self {
            TimerKind::A => "T1",
            TimerKind::B => "T2",
        }
    }
}

/// One 16-bit VIA timer
#[derive(Debug, Clone)]
pub struct Timer {
    kind: TimerKind,

    /// Reload value written by software
    latch: u16,

    /// Counter value at `counter_base_clock`
    counter_base: u16,

    /// Clock the counter took `counter_base`
    counter_base_clock: Clock,

    /// Clock of the pending underflow alarm
    next_underflow_clock: Option<Clock>,

    mode: TimerMode,

    /// Scheduler alarm owned by this timer
    alarm: AlarmId,
}

/// Serializable timer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub latch: u16,
    pub counter_base: u16,
    pub counter_base_clock: Clock,
    pub next_underflow_clock: Option<Clock>,
    pub mode: TimerMode,
}

impl Timer {
    /// Create a stopped timer
    ///
    /// # Arguments
    ///
    /// * `kind` - Timer 1 or timer 2
    /// * `alarm` - Alarm registered for this timer's underflow
    pub fn new(kind: TimerKind, alarm: AlarmId) -> Self {
        Self {
            kind,
            latch: 0,
            counter_base: 0,
            counter_base_clock: 0,
            next_underflow_clock: None,
            mode: TimerMode::OneShot,
            alarm,
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    #[inline(always)]
    pub fn alarm(&self) -> AlarmId {
        self.alarm
    }

    #[inline(always)]
    pub fn latch(&self) -> u16 {
        self.latch
    }

    #[inline(always)]
    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    #[inline(always)]
    pub fn counter_base_clock(&self) -> Clock {
        self.counter_base_clock
    }

    /// Clock of the pending underflow, if one is scheduled
    #[inline(always)]
    pub fn next_underflow_clock(&self) -> Option<Clock> {
        self.next_underflow_clock
    }

    /// Set the run mode (timer 2 ignores anything but one-shot)
    pub fn set_mode(&mut self, mode: TimerMode) {
        self.mode = match self.kind {
            TimerKind::A => mode,
            TimerKind::B => TimerMode::OneShot,
        };
    }

    pub fn set_latch_low(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    pub fn set_latch_high(&mut self, value: u8) {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
    }

    /// Load the counter from a high-byte write
    ///
    /// # Arguments
    ///
    /// * `value` - New counter value
    /// * `clk` - Clock of the write
    ///
    /// # Returns
    ///
    /// Clock of the first underflow
    pub fn load(&mut self, value: u16, clk: Clock) -> Clock {
        self.counter_base = value;
        self.counter_base_clock = clk + LOAD_DELAY;
        let at = self.counter_base_clock + Clock::from(value) + INITIAL_UNDERFLOW_DELAY;
        self.next_underflow_clock = Some(at);
        at
    }

    /// Reload from the latch after a free-running underflow
    ///
    /// # Arguments
    ///
    /// * `firing` - Clock the underflow was scheduled for
    ///
    /// # Returns
    ///
    /// Clock of the next underflow
    pub fn reload(&mut self, firing: Clock) -> Clock {
        self.counter_base = self.latch;
        self.counter_base_clock = firing;
        let at = firing + Clock::from(self.latch) + RELOAD_UNDERFLOW_DELAY;
        self.next_underflow_clock = Some(at);
        at
    }

    /// Drop the pending underflow
    ///
    /// The derived counter keeps wrapping; only the interrupt stops.
    pub fn stop(&mut self) {
        self.next_underflow_clock = None;
    }

    /// Live counter value at `clk`
    pub fn counter(&self, clk: Clock) -> u16 {
        if clk < self.counter_base_clock {
            return self.counter_base;
        }
        let period = Clock::from(self.counter_base) + 1;
        let elapsed = (clk - self.counter_base_clock) % period;
        // elapsed < period, so this stays within 0..=counter_base
        (Clock::from(self.counter_base) - elapsed) as u16
    }

    /// Shift stored clocks down by `delta`
    ///
    /// A base clock older than `delta` cannot be shifted directly, so it is
    /// replaced by a later clock at the same phase of the counter cycle.
    /// That needs `clk - delta >= REBASE_HEADROOM`.
    ///
    /// # Arguments
    ///
    /// * `delta` - Amount the clock domain moves down
    /// * `clk` - Current clock before the shift
    pub fn rebase(&mut self, delta: Clock, clk: Clock) {
        if self.counter_base_clock >= delta {
            self.counter_base_clock -= delta;
        } else {
            let period = Clock::from(self.counter_base) + 1;
            let phase = (clk - self.counter_base_clock) % period;
            self.counter_base_clock = (clk - delta).saturating_sub(phase);
        }

        if let Some(at) = self.next_underflow_clock.as_mut() {
            *at = at.saturating_sub(delta);
        }
    }

    pub fn state(&self) -> TimerState {
        TimerState {
            latch: self.latch,
            counter_base: self.counter_base,
            counter_base_clock: self.counter_base_clock,
            next_underflow_clock: self.next_underflow_clock,
            mode: self.mode,
        }
    }

    pub fn restore(&mut self, state: &TimerState) {
        self.latch = state.latch;
        self.counter_base = state.counter_base;
        self.counter_base_clock = state.counter_base_clock;
        self.next_underflow_clock = state.next_underflow_clock;
        self.set_mode(state.mode);
    }
}
