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

//! Clock source and alarm scheduling
//!
//! All chips share one monotonically increasing cycle counter. Instead of
//! ticking every chip on every cycle, a chip computes the absolute clock at
//! which something interesting will happen (a timer underflow) and registers
//! an *alarm* for that clock. The stepping loop advances the clock straight
//! to the next pending alarm and hands it back to its owner.
//!
//! ## Ordering
//!
//! Alarms are keyed by absolute clock. Alarms due at the same clock are
//! delivered in registration order, so a run is bit-exact reproducible.
//!
//! ## Clock rebase
//!
//! The counter is periodically shifted down ([`TimingEventManager::rebase`])
//! so it never grows without bound. Every stored absolute clock in the
//! scheduler moves by the same delta in the same call; chips do the same for
//! their own clock fields (see `Via6522::prevent_clk_overflow`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute cycle count
pub type Clock = u64;

/// Handle for a registered alarm
///
/// The index doubles as the tie-break key for alarms due at the same clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmId(usize);

impl AlarmId {
    /// Registration index of this alarm
    #[inline(always)]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alarm#{}", self.0)
    }
}

/// Scheduling capability handed to chip models
///
/// Chips never own the clock. They read it and ask for callbacks at absolute
/// clock values; the owner of the scheduler calls the chip's `on_alarm`
/// when the clock gets there.
pub trait AlarmScheduler {
    /// Current clock
    fn clk(&self) -> Clock;

    /// Arm `alarm` to fire at absolute clock `at`
    ///
    /// Re-arming an already pending alarm replaces its previous clock.
    fn schedule_alarm(&mut self, alarm: AlarmId, at: Clock);

    /// Disarm `alarm`. Disarming an idle alarm is a no-op.
    fn cancel_alarm(&mut self, alarm: AlarmId);
}

/// One registered alarm slot
#[derive(Debug, Clone)]
struct Alarm {
    /// Name used in logs and traces
    name: String,
    /// Absolute clock this alarm is armed for
    at: Option<Clock>,
}

/// Clock source plus alarm list
///
/// # Example
///
/// ```
/// use viabus::core::timing::{AlarmScheduler, TimingEventManager};
///
/// let mut timing = TimingEventManager::new();
/// let alarm = timing.register_alarm("VIA1 T1");
///
/// timing.schedule_alarm(alarm, 100);
/// assert_eq!(timing.next_alarm_clock(), Some(100));
///
/// timing.set_clk(100);
/// assert_eq!(timing.pop_due(), Some((alarm, 100)));
/// assert_eq!(timing.pop_due(), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TimingEventManager {
    /// Global cycle counter
    clk: Clock,
    /// Alarm slots in registration order
    alarms: Vec<Alarm>,
}

impl TimingEventManager {
    /// Create a scheduler at clock 0 with no alarms
    pub fn new() -> Self {
        Self {
            clk: 0,
            alarms: Vec::new(),
        }
    }

    /// Register a new alarm
    ///
    /// Registration order defines the delivery order of alarms that fall on
    /// the same clock, so chips should register in a fixed order.
    ///
    /// # Arguments
    ///
    /// * `name` - Human readable name for logs and traces
    ///
    /// # Returns
    ///
    /// Handle to pass to [`AlarmScheduler::schedule_alarm`]
    pub fn register_alarm(&mut self, name: &str) -> AlarmId {
        let id = AlarmId(self.alarms.len());
        self.alarms.push(Alarm {
            name: name.to_string(),
            at: None,
        });
        log::debug!("Timing: registered {} as {}", name, id);
        id
    }

    /// Name an alarm was registered with
    pub fn alarm_name(&self, alarm: AlarmId) -> &str {
        self.alarms
            .get(alarm.0)
            .map(|a| a.name.as_str())
            .unwrap_or("<unregistered>")
    }

    /// Number of registered alarms
    pub fn alarm_count(&self) -> usize {
        self.alarms.len()
    }

    /// Clock an alarm is armed for, if any
    pub fn pending_clock(&self, alarm: AlarmId) -> Option<Clock> {
        self.alarms.get(alarm.0).and_then(|a| a.at)
    }

    /// Whether `alarm` is armed
    pub fn is_pending(&self, alarm: AlarmId) -> bool {
        self.pending_clock(alarm).is_some()
    }

    /// Move the clock to an absolute value
    ///
    /// The clock only moves forward; earlier values are ignored.
    pub fn set_clk(&mut self, clk: Clock) {
        if clk < self.clk {
            log::warn!(
                "Timing: refusing to move clock backwards ({} -> {})",
                self.clk,
                clk
            );
            return;
        }
        self.clk = clk;
    }

    /// Put the clock at a saved value and disarm every alarm
    ///
    /// Only for loading save states; the owners re-arm their alarms
    /// afterwards.
    pub fn restore_clk(&mut self, clk: Clock) {
        self.clk = clk;
        for alarm in &mut self.alarms {
            alarm.at = None;
        }
        log::debug!("Timing: clock restored to {}", clk);
    }

    /// Advance the clock by `cycles`
    pub fn advance(&mut self, cycles: Clock) {
        self.clk += cycles;
    }

    /// Earliest armed clock among all alarms
    pub fn next_alarm_clock(&self) -> Option<Clock> {
        self.alarms.iter().filter_map(|a| a.at).min()
    }

    /// Take the next alarm that is due
    ///
    /// An alarm is due when its clock is at or before the current clock.
    /// The earliest clock wins; equal clocks are broken by registration
    /// order. The returned alarm is disarmed.
    ///
    /// # Returns
    ///
    /// `(alarm, scheduled_clock)`; the scheduled clock is what the owner
    /// should treat as the firing clock even if the scheduler ran past it.
    pub fn pop_due(&mut self) -> Option<(AlarmId, Clock)> {
        let clk = self.clk;
        let (index, at) = self
            .alarms
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.at.filter(|&at| at <= clk).map(|at| (i, at)))
            .min_by_key(|&(i, at)| (at, i))?;

        self.alarms[index].at = None;
        log::trace!(
            "Timing: {} fired (scheduled {}, clk {})",
            self.alarms[index].name,
            at,
            clk
        );
        Some((AlarmId(index), at))
    }

    /// Shift the clock domain down by `delta`
    ///
    /// The clock and every armed alarm move together, so the number of
    /// cycles until each alarm fires is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `delta` exceeds the current clock; callers only rebase once
    /// the clock has passed their threshold.
    pub fn rebase(&mut self, delta: Clock) {
        assert!(
            delta <= self.clk,
            "rebase delta {} exceeds clock {}",
            delta,
            self.clk
        );
        self.clk -= delta;
        for alarm in &mut self.alarms {
            if let Some(at) = alarm.at.as_mut() {
                // Due-but-undelivered alarms stay due.
                *at = at.saturating_sub(delta);
            }
        }
        log::debug!("Timing: rebased by {}, clk now {}", delta, self.clk);
    }
}

impl AlarmScheduler for TimingEventManager {
    #[inline(always)]
    fn clk(&self) -> Clock {
        self.clk
    }

    fn schedule_alarm(&mut self, alarm: AlarmId, at: Clock) {
        match self.alarms.get_mut(alarm.0) {
            Some(slot) => {
                slot.at = Some(at);
                log::trace!("Timing: {} armed for {}", slot.name, at);
            }
            None => log::warn!("Timing: schedule of unregistered {}", alarm),
        }
    }

    fn cancel_alarm(&mut self, alarm: AlarmId) {
        if let Some(slot) = self.alarms.get_mut(alarm.0) {
            if slot.at.take().is_some() {
                log::trace!("Timing: {} cancelled", slot.name);
            }
        }
    }
}
