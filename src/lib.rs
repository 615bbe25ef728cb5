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

//! viabus: MOS 6522 VIA and Commodore IEC serial bus emulation
//!
//! This crate emulates the timer and interrupt engine of the 6522 Versatile
//! Interface Adapter and the three-wire IEC serial bus that links a VIC-20
//! to a 1541 disk drive. Timers are event driven: each VIA registers one
//! alarm per timer with a shared scheduler instead of being ticked every
//! cycle.
//!
//! # Architecture
//!
//! - [`core::timing`]: Clock and alarm scheduler
//! - [`core::interrupt`]: IRQ/NMI inputs of the host and drive CPUs
//! - [`core::via`]: VIA 6522 registers, timers and control lines
//! - [`core::iec`]: IEC bus line resolution and VIA port adapters
//! - [`core::machine`]: VIC-20 + 1541 integration
//! - [`core::config`]: TOML configuration with environment overrides
//! - [`core::trace`]: Event traces and scripted scenarios
//! - [`core::snapshot`]: Save states
//!
//! # Example
//!
//! ```
//! use viabus::core::config::MachineConfig;
//! use viabus::core::machine::{ChipId, Machine};
//!
//! let mut machine = Machine::new(&MachineConfig::default());
//!
//! // Enable the T1 interrupt on host VIA2, load 0x00FF
//! machine.write(ChipId::HostVia2, 0xE, 0xC0);
//! machine.write(ChipId::HostVia2, 0x6, 0xFF);
//! machine.write(ChipId::HostVia2, 0x5, 0x00);
//!
//! machine.run_until(300);
//! assert!(machine.host_irq());
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, EmulatorError>`.

pub mod core;

// Re-export commonly used types
pub use core::config::{Config, MachineConfig};
pub use core::error::{EmulatorError, Result};
pub use core::iec::{IecBus, IecLines, IecOutputs};
pub use core::machine::{ChipId, Machine};
pub use core::timing::{AlarmId, Clock, TimingEventManager};
pub use core::via::Via6522;
