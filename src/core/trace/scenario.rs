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

//! Scripted machine runs
//!
//! ```toml
//! name = "T1 one-shot"
//!
//! [[step]]
//! op = "run_until"
//! clk = 1000
//!
//! [[step]]
//! op = "write"
//! chip = "host_via2"
//! reg = 0x6
//! value = 0xFF
//!
//! [[step]]
//! op = "read"
//! chip = "host_via2"
//! reg = 0xD
//! expect = 0x40
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::TraceEvent;
use crate::core::error::{EmulatorError, Result};
use crate::core::machine::{ChipId, Machine};
use crate::core::timing::Clock;
use crate::core::via::{ControlLine, Edge};

/// One scripted operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Write {
        chip: ChipId,
        reg: u8,
        value: u8,
    },
    /// Read a register, optionally failing the run on a different value
    Read {
        chip: ChipId,
        reg: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<u8>,
    },
    Signal {
        chip: ChipId,
        line: ControlLine,
        edge: Edge,
    },
    RunUntil {
        clk: Clock,
    },
    Step {
        cycles: Clock,
    },
    Rebase,
    Reset,
}

/// A named list of steps
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let scenario = Self::from_toml_str(&contents)?;
        log::info!(
            "Loaded scenario '{}' ({} steps) from {}",
            scenario.name,
            scenario.steps.len(),
            path.as_ref().display()
        );
        Ok(scenario)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| EmulatorError::ScenarioParse(e.to_string()))
    }

    /// Execute every step on `machine` with tracing enabled
    ///
    /// # Returns
    ///
    /// The events recorded during the run
    pub fn run(&self, machine: &mut Machine) -> Result<Vec<TraceEvent>> {
        machine.enable_tracing();

        for (index, step) in self.steps.iter().enumerate() {
            log::trace!("Scenario step {}: {:?}", index, step);
            match *step {
                Step::Write { chip, reg, value } => machine.write(chip, u16::from(reg), value),
                Step::Read { chip, reg, expect } => {
                    let actual = machine.read(chip, u16::from(reg));
                    if let Some(expected) = expect {
                        if actual != expected {
                            return Err(EmulatorError::UnexpectedRead {
                                step: index,
                                expected,
                                actual,
                            });
                        }
                    }
                }
                Step::Signal { chip, line, edge } => machine.signal(chip, line, edge),
                Step::RunUntil { clk } => machine.run_until(clk),
                Step::Step { cycles } => machine.step(cycles),
                Step::Rebase => machine.prevent_clk_overflow(),
                Step::Reset => machine.reset(),
            }
        }

        Ok(machine.take_trace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MachineConfig;

    const ONE_SHOT: &str = r#"
        name = "one-shot"

        [[step]]
        op = "run_until"
        clk = 1000

        [[step]]
        op = "write"
        chip = "host_via2"
        reg = 0x6
        value = 0xFF

        [[step]]
        op = "write"
        chip = "host_via2"
        reg = 0x5
        value = 0x00

        [[step]]
        op = "step"
        cycles = 300

        [[step]]
        op = "read"
        chip = "host_via2"
        reg = 0xD
        expect = 0x40
    "#;

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_toml_str(ONE_SHOT).unwrap();
        assert_eq!(scenario.name, "one-shot");
        assert_eq!(scenario.steps.len(), 5);
        assert_eq!(scenario.steps[0], Step::RunUntil { clk: 1000 });
        assert_eq!(
            scenario.steps[4],
            Step::Read {
                chip: ChipId::HostVia2,
                reg: 0xD,
                expect: Some(0x40)
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        let err = Scenario::from_toml_str("[[step]]\nop = \"jump\"\n").unwrap_err();
        assert!(matches!(err, EmulatorError::ScenarioParse(_)));
    }

    #[test]
    fn test_run_records_alarm() {
        let scenario = Scenario::from_toml_str(ONE_SHOT).unwrap();
        let mut machine = Machine::new(&MachineConfig::default());
        let events = scenario.run(&mut machine).unwrap();

        assert!(events.contains(&TraceEvent::AlarmFired {
            clk: 1258,
            alarm: "VIA2 T1".to_string()
        }));
        assert!(events.contains(&TraceEvent::Read {
            clk: 1300,
            chip: ChipId::HostVia2,
            reg: 0xD,
            value: 0x40
        }));
    }

    #[test]
    fn test_failed_expectation_stops_run() {
        let text = r#"
            [[step]]
            op = "read"
            chip = "drive_via1"
            reg = 0xE
            expect = 0x00
        "#;
        let scenario = Scenario::from_toml_str(text).unwrap();
        let mut machine = Machine::new(&MachineConfig::default());
        let err = scenario.run(&mut machine).unwrap_err();
        assert!(matches!(
            err,
            EmulatorError::UnexpectedRead {
                step: 0,
                expected: 0x00,
                actual: 0x80
            }
        ));
    }

    #[test]
    fn test_bundled_atn_handshake() {
        let text = include_str!("../../../scenarios/atn_handshake.toml");
        let scenario = Scenario::from_toml_str(text).unwrap();
        let mut machine = Machine::new(&MachineConfig::default());
        let events = scenario.run(&mut machine).unwrap();

        assert!(events.contains(&TraceEvent::Signal {
            clk: 100,
            chip: ChipId::DriveVia1,
            line: ControlLine::Ca1,
            edge: Edge::Rise
        }));
        assert!(machine.drive_irq());
    }

    #[test]
    fn test_runs_are_reproducible() {
        let scenario = Scenario::from_toml_str(ONE_SHOT).unwrap();
        let first = scenario.run(&mut Machine::new(&MachineConfig::default())).unwrap();
        let second = scenario.run(&mut Machine::new(&MachineConfig::default())).unwrap();
        assert!(super::super::compare(&first, &second).is_ok());
    }
}
