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

//! Event traces
//!
//! While tracing is enabled the machine records every bus access, control
//! line signal, alarm dispatch, interrupt line change and clock rebase
//! together with the clock it happened at. Traces are written as text for
//! reading or as JSON for use as a reference: a later run of the same
//! [`Scenario`] must produce exactly the same events.

mod scenario;

pub use scenario::{Scenario, Step};

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{EmulatorError, Result};
use crate::core::machine::ChipId;
use crate::core::timing::Clock;
use crate::core::via::{ControlLine, Edge};

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    Reset {
        clk: Clock,
    },
    Read {
        clk: Clock,
        chip: ChipId,
        reg: u8,
        value: u8,
    },
    Write {
        clk: Clock,
        chip: ChipId,
        reg: u8,
        value: u8,
    },
    Signal {
        clk: Clock,
        chip: ChipId,
        line: ControlLine,
        edge: Edge,
    },
    AlarmFired {
        clk: Clock,
        alarm: String,
    },
    IrqLine {
        clk: Clock,
        source: u16,
        asserted: bool,
    },
    Rebase {
        clk: Clock,
        delta: Clock,
    },
}

impl TraceEvent {
    /// Clock the event happened at
    pub fn clk(&self) -> Clock {
        match self {
            TraceEvent::Reset { clk }
            | TraceEvent::Read { clk, .. }
            | TraceEvent::Write { clk, .. }
            | TraceEvent::Signal { clk, .. }
            | TraceEvent::AlarmFired { clk, .. }
            | TraceEvent::IrqLine { clk, .. }
            | TraceEvent::Rebase { clk, .. } => *clk,
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>10} ", self.clk())?;
        match self {
            TraceEvent::Reset { .. } => write!(f, "reset"),
            TraceEvent::Read {
                chip, reg, value, ..
            } => write!(f, "{} read  ${:X} = ${:02X}", chip, reg, value),
            TraceEvent::Write {
                chip, reg, value, ..
            } => write!(f, "{} write ${:X} = ${:02X}", chip, reg, value),
            TraceEvent::Signal {
                chip, line, edge, ..
            } => write!(f, "{} {:?} {:?}", chip, line, edge),
            TraceEvent::AlarmFired { alarm, .. } => write!(f, "alarm {}", alarm),
            TraceEvent::IrqLine {
                source, asserted, ..
            } => write!(
                f,
                "irq source 0x{:04X} {}",
                source,
                if *asserted { "asserted" } else { "released" }
            ),
            TraceEvent::Rebase { delta, .. } => write!(f, "rebase by {}", delta),
        }
    }
}

/// Event recorder
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    events: Vec<TraceEvent>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn record(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Hand out the events recorded so far and start over
    pub fn take(&mut self) -> Vec<TraceEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Render events as a JSON array
pub fn to_json(events: &[TraceEvent]) -> Result<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

pub fn from_json(text: &str) -> Result<Vec<TraceEvent>> {
    Ok(serde_json::from_str(text)?)
}

/// Read a JSON trace file
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<TraceEvent>> {
    from_json(&std::fs::read_to_string(path)?)
}

/// Write events one per line
pub fn write_text<W: Write>(events: &[TraceEvent], out: &mut W) -> Result<()> {
    for event in events {
        writeln!(out, "{}", event)?;
    }
    Ok(())
}

/// Check a trace against a reference
///
/// # Returns
///
/// `TraceMismatch` naming the first differing event
pub fn compare(expected: &[TraceEvent], actual: &[TraceEvent]) -> Result<()> {
    for (index, (e, a)) in expected.iter().zip(actual).enumerate() {
        if e != a {
            return Err(EmulatorError::TraceMismatch {
                index,
                expected: e.to_string(),
                actual: a.to_string(),
            });
        }
    }

    if expected.len() != actual.len() {
        let index = expected.len().min(actual.len());
        let describe = |events: &[TraceEvent]| {
            events
                .get(index)
                .map(|e| e.to_string())
                .unwrap_or_else(|| "end of trace".to_string())
        };
        return Err(EmulatorError::TraceMismatch {
            index,
            expected: describe(expected),
            actual: describe(actual),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TraceEvent> {
        vec![
            TraceEvent::Reset { clk: 0 },
            TraceEvent::Write {
                clk: 1000,
                chip: ChipId::HostVia2,
                reg: 5,
                value: 0,
            },
            TraceEvent::AlarmFired {
                clk: 1258,
                alarm: "VIA2 T1".to_string(),
            },
            TraceEvent::IrqLine {
                clk: 1258,
                source: 2,
                asserted: true,
            },
            TraceEvent::Signal {
                clk: 1300,
                chip: ChipId::DriveVia1,
                line: ControlLine::Ca1,
                edge: Edge::Rise,
            },
        ]
    }

    #[test]
    fn test_json_round_trip() {
        let events = sample();
        let json = to_json(&events).unwrap();
        assert!(json.contains("\"event\": \"alarm_fired\""));
        assert!(json.contains("\"chip\": \"drive_via1\""));
        assert_eq!(from_json(&json).unwrap(), events);
    }

    #[test]
    fn test_text_format() {
        let mut out = Vec::new();
        write_text(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].ends_with("host_via2 write $5 = $00"));
        assert!(lines[2].trim_start().starts_with("1258 alarm VIA2 T1"));
    }

    #[test]
    fn test_compare_identical() {
        assert!(compare(&sample(), &sample()).is_ok());
    }

    #[test]
    fn test_compare_reports_first_difference() {
        let expected = sample();
        let mut actual = sample();
        actual[2] = TraceEvent::AlarmFired {
            clk: 1259,
            alarm: "VIA2 T1".to_string(),
        };
        match compare(&expected, &actual) {
            Err(EmulatorError::TraceMismatch { index, .. }) => assert_eq!(index, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_compare_reports_truncation() {
        let expected = sample();
        let actual = &expected[..3];
        match compare(&expected, actual) {
            Err(EmulatorError::TraceMismatch { index, actual, .. }) => {
                assert_eq!(index, 3);
                assert_eq!(actual, "end of trace");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_tracer_take_resets() {
        let mut tracer = Tracer::new();
        tracer.record(TraceEvent::Reset { clk: 7 });
        assert_eq!(tracer.events().len(), 1);
        assert_eq!(tracer.take().len(), 1);
        assert!(tracer.events().is_empty());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.json");
        std::fs::write(&path, to_json(&sample()).unwrap()).unwrap();
        assert_eq!(load_json(&path).unwrap(), sample());
    }
}
