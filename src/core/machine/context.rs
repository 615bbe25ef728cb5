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

//! Context handed to chips on every call

use crate::core::interrupt::{sources, InterruptController, IrqSink};
use crate::core::timing::{AlarmId, AlarmScheduler, Clock, TimingEventManager};
use crate::core::trace::{TraceEvent, Tracer};

/// Scheduler, interrupt inputs of both CPUs and the optional tracer
#[derive(Debug, Clone)]
pub struct ChipContext {
    pub timing: TimingEventManager,

    /// Host CPU inputs (VIA1 on NMI, VIA2 on IRQ)
    pub host_irq: InterruptController,

    /// Drive CPU inputs
    pub drive_irq: InterruptController,

    pub tracer: Option<Tracer>,
}

impl ChipContext {
    pub fn new(timing: TimingEventManager) -> Self {
        Self {
            timing,
            host_irq: InterruptController::new(sources::HOST_VIA1),
            drive_irq: InterruptController::new(0),
            tracer: None,
        }
    }

    /// Record an event if tracing is on
    #[inline(always)]
    pub fn trace(&mut self, event: TraceEvent) {
        if let Some(tracer) = self.tracer.as_mut() {
            tracer.record(event);
        }
    }
}

impl AlarmScheduler for ChipContext {
    #[inline(always)]
    fn clk(&self) -> Clock {
        self.timing.clk()
    }

    fn schedule_alarm(&mut self, alarm: AlarmId, at: Clock) {
        self.timing.schedule_alarm(alarm, at);
    }

    fn cancel_alarm(&mut self, alarm: AlarmId) {
        self.timing.cancel_alarm(alarm);
    }
}

impl IrqSink for ChipContext {
    fn set_irq(&mut self, source: u16, asserted: bool) {
        let controller = if source & sources::DRIVE_MASK != 0 {
            &mut self.drive_irq
        } else {
            &mut self.host_irq
        };

        let was_asserted = controller.status() & source != 0;
        controller.set_irq(source, asserted);

        if was_asserted != asserted {
            let clk = self.timing.clk();
            self.trace(TraceEvent::IrqLine {
                clk,
                source,
                asserted,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_sources_to_their_cpu() {
        let mut ctx = ChipContext::new(TimingEventManager::new());
        ctx.set_irq(sources::DRIVE_VIA1, true);
        assert!(ctx.drive_irq.irq_asserted());
        assert!(!ctx.host_irq.irq_asserted());

        ctx.set_irq(sources::HOST_VIA1, true);
        assert!(ctx.host_irq.nmi_asserted());
        assert!(!ctx.host_irq.irq_asserted());
    }

    #[test]
    fn test_traces_only_line_changes() {
        let mut ctx = ChipContext::new(TimingEventManager::new());
        ctx.tracer = Some(Tracer::new());

        ctx.set_irq(sources::HOST_VIA2, false);
        ctx.set_irq(sources::HOST_VIA2, true);
        ctx.set_irq(sources::HOST_VIA2, true);
        ctx.set_irq(sources::HOST_VIA2, false);

        let events = ctx.tracer.as_mut().map(Tracer::take).unwrap_or_default();
        assert_eq!(events.len(), 2);
    }
}
