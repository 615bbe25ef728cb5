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

use super::*;
use crate::core::via::timer::REBASE_HEADROOM;

fn machine() -> Machine {
    Machine::new(&MachineConfig::default())
}

/// Host with its serial outputs released and the drive configured the way
/// the 1541 ROM sets up VIA1 (PB1/PB3/PB4 out, CA1 on rising ATN)
fn idle_bus_machine() -> Machine {
    let mut m = machine();
    m.write(ChipId::HostVia1, 0xC, 0xCC);
    m.write(ChipId::HostVia2, 0x3, 0x80);
    m.write(ChipId::HostVia2, 0x1, 0x00);
    m.write(ChipId::DriveVia1, 0x2, 0x1A);
    m.write(ChipId::DriveVia1, 0x0, 0x00);
    m.write(ChipId::DriveVia1, 0xC, 0x01);
    m.write(ChipId::DriveVia1, 0xE, 0x82);
    // Releasing ATN above latched CA1 while it was still negative-edge
    m.read(ChipId::DriveVia1, 0x1);
    m
}

fn load_t1(m: &mut Machine, chip: ChipId, value: u16) {
    m.write(chip, 0x6, value as u8);
    m.write(chip, 0x5, (value >> 8) as u8);
}

// ============================================================================
// Clock and alarms
// ============================================================================

#[test]
fn test_new_machine_is_quiet() {
    let m = machine();
    assert_eq!(m.clk(), 0);
    assert!(!m.host_irq());
    assert!(!m.host_nmi());
    assert!(!m.drive_irq());
    assert_eq!(m.timing().next_alarm_clock(), None);
    assert_eq!(m.timing().alarm_count(), 6);
}

#[test]
fn test_run_until_lands_on_target() {
    let mut m = machine();
    m.run_until(1234);
    assert_eq!(m.clk(), 1234);
    m.step(6);
    assert_eq!(m.clk(), 1240);
}

#[test]
fn test_alarm_scenario_1000_to_1258() {
    let mut m = machine();
    m.run_until(1000);
    load_t1(&mut m, ChipId::HostVia2, 0x00FF);
    assert_eq!(m.via(ChipId::HostVia2).t1().counter_base_clock(), 1001);

    m.run_until(1257);
    assert_eq!(m.via(ChipId::HostVia2).ifr() & 0x40, 0);
    m.run_until(1258);
    assert_eq!(m.via(ChipId::HostVia2).ifr() & 0x40, 0x40);
}

#[test]
fn test_equal_clock_alarms_fire_in_chip_order() {
    let mut m = machine();
    for chip in [ChipId::DriveVia1, ChipId::HostVia2, ChipId::HostVia1] {
        load_t1(&mut m, chip, 50);
    }

    m.enable_tracing();
    m.run_until(100);
    let fired: Vec<String> = m
        .take_trace()
        .into_iter()
        .filter_map(|e| match e {
            TraceEvent::AlarmFired { alarm, .. } => Some(alarm),
            _ => None,
        })
        .collect();
    assert_eq!(fired, vec!["VIA1 T1", "VIA2 T1", "Drive VIA1 T1"]);
}

#[test]
fn test_free_running_through_run_until() {
    let mut m = machine();
    m.write(ChipId::HostVia2, 0xB, 0x40);
    load_t1(&mut m, ChipId::HostVia2, 100);

    m.enable_tracing();
    m.run_until(1000);
    let clocks: Vec<Clock> = m
        .take_trace()
        .iter()
        .filter(|e| matches!(e, TraceEvent::AlarmFired { .. }))
        .map(TraceEvent::clk)
        .collect();
    let expected: Vec<Clock> = (0..9).map(|k| 103 + k * 101).collect();
    assert_eq!(clocks, expected);
}

// ============================================================================
// Interrupts
// ============================================================================

#[test]
fn test_host_via2_drives_irq() {
    let mut m = machine();
    m.write(ChipId::HostVia2, 0xE, 0xC0);
    load_t1(&mut m, ChipId::HostVia2, 10);
    m.run_until(50);
    assert!(m.host_irq());
    assert!(!m.host_nmi());

    m.read(ChipId::HostVia2, 0x4);
    assert!(!m.host_irq());
}

#[test]
fn test_host_via1_drives_nmi() {
    let mut m = machine();
    m.write(ChipId::HostVia1, 0xE, 0xC0);
    load_t1(&mut m, ChipId::HostVia1, 10);
    m.run_until(50);
    assert!(m.host_nmi());
    assert!(!m.host_irq());
    assert!(m.take_host_nmi());
    assert!(!m.take_host_nmi());
}

#[test]
fn test_drive_irq_is_separate() {
    let mut m = machine();
    m.write(ChipId::DriveVia1, 0xE, 0xA0);
    m.write(ChipId::DriveVia1, 0x8, 5);
    m.write(ChipId::DriveVia1, 0x9, 0);
    m.run_until(20);
    assert!(m.drive_irq());
    assert!(!m.host_irq());
}

#[test]
fn test_signal_reaches_chip() {
    let mut m = machine();
    m.write(ChipId::HostVia1, 0xE, 0x82);
    m.signal(ChipId::HostVia1, ControlLine::Ca1, Edge::Fall);
    assert!(m.host_nmi());
}

// ============================================================================
// IEC bus
// ============================================================================

#[test]
fn test_idle_bus_is_released() {
    let m = idle_bus_machine();
    assert_eq!(
        m.iec_lines(),
        IecLines {
            data: true,
            clock: true,
            atn: true
        }
    );
}

#[test]
fn test_reset_pulls_lines() {
    // Input pins float high and the inverting drivers pull every line.
    let m = machine();
    let lines = m.iec_lines();
    assert!(!lines.atn);
    assert!(!lines.clock);
    assert!(!lines.data);
}

#[test]
fn test_atn_edge_reaches_drive_ca1() {
    let mut m = idle_bus_machine();
    assert!(!m.drive_irq());

    m.write(ChipId::HostVia2, 0x1, 0x80);
    assert!(!m.iec_lines().atn);
    assert_eq!(m.via(ChipId::DriveVia1).ifr() & 0x02, 0x02);
    assert!(m.drive_irq());

    // Releasing ATN is a falling edge on CA1: no new interrupt
    m.read(ChipId::DriveVia1, 0x1);
    m.write(ChipId::HostVia2, 0x1, 0x00);
    assert!(!m.drive_irq());
}

#[test]
fn test_atn_rewrite_is_not_an_edge() {
    let mut m = idle_bus_machine();
    m.write(ChipId::HostVia2, 0x1, 0x80);
    m.read(ChipId::DriveVia1, 0x1);

    m.enable_tracing();
    m.write(ChipId::HostVia2, 0x1, 0x80);
    let signals = m
        .take_trace()
        .into_iter()
        .filter(|e| matches!(e, TraceEvent::Signal { .. }))
        .count();
    assert_eq!(signals, 0);
    assert!(!m.drive_irq());
}

#[test]
fn test_unanswered_atna_pulls_data() {
    let mut m = idle_bus_machine();
    m.write(ChipId::DriveVia1, 0x0, 0x10);
    assert!(!m.iec_lines().data);
    // Host VIA2 PA: bit 1 DATA in low, bit 0 CLK in high
    assert_eq!(m.read(ChipId::HostVia2, 0x1), 0x7D);

    // Host asserts ATN: acknowledged, DATA released
    m.write(ChipId::HostVia2, 0x1, 0x80);
    assert!(m.iec_lines().data);
}

#[test]
fn test_drive_reads_host_clock() {
    let mut m = idle_bus_machine();
    assert_eq!(m.read(ChipId::DriveVia1, 0x0), 0x00);

    // CA2 manual high pulls CLK
    m.write(ChipId::HostVia1, 0xC, 0xCE);
    assert!(!m.iec_lines().clock);
    assert_eq!(m.read(ChipId::DriveVia1, 0x0), 0x04);

    // CB2 manual high pulls DATA
    m.write(ChipId::HostVia1, 0xC, 0xEE);
    assert_eq!(m.read(ChipId::DriveVia1, 0x0), 0x05);
}

#[test]
fn test_host_reads_drive_outputs() {
    let mut m = idle_bus_machine();
    m.write(ChipId::DriveVia1, 0x0, 0x08);
    assert_eq!(m.read(ChipId::HostVia2, 0x1) & 0x03, 0x02);
    m.write(ChipId::DriveVia1, 0x0, 0x02);
    assert_eq!(m.read(ChipId::HostVia2, 0x1) & 0x03, 0x01);
}

#[test]
fn test_without_true_drive_bus_is_inert() {
    let config = MachineConfig {
        true_drive: false,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    m.write(ChipId::DriveVia1, 0xC, 0x01);
    m.write(ChipId::DriveVia1, 0xE, 0x82);
    m.write(ChipId::HostVia2, 0x3, 0x80);
    m.write(ChipId::HostVia2, 0x1, 0x80);

    assert_eq!(m.iec_lines(), IecLines::default());
    assert!(!m.drive_irq());
    assert_eq!(m.read(ChipId::HostVia2, 0x1) & 0x7F, 0x7C);
}

// ============================================================================
// Rebase
// ============================================================================

#[test]
fn test_rebase_keeps_alarm_distance() {
    let config = MachineConfig {
        rebase_threshold: 1_000_000,
        rebase_amount: 100_000,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    m.run_until(200_000);
    // 200_000 + 1 + 497 + 2 = 200_500
    load_t1(&mut m, ChipId::HostVia2, 497);

    m.prevent_clk_overflow();
    assert_eq!(m.clk(), 100_000);
    assert_eq!(
        m.via(ChipId::HostVia2).t1().next_underflow_clock(),
        Some(100_500)
    );

    m.run_until(100_499);
    assert_eq!(m.via(ChipId::HostVia2).ifr() & 0x40, 0);
    m.run_until(100_500);
    assert_eq!(m.via(ChipId::HostVia2).ifr() & 0x40, 0x40);
}

#[test]
fn test_automatic_rebase_at_threshold() {
    let config = MachineConfig {
        rebase_threshold: 200_000,
        rebase_amount: 100_000,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    m.write(ChipId::HostVia2, 0xB, 0x40);
    load_t1(&mut m, ChipId::HostVia2, 999);

    m.run_until(200_500);
    assert_eq!(m.clk(), 100_500);
    assert_eq!(m.timing().next_alarm_clock(), Some(101_002));

    // 498 cycles into the period that started at 200_002
    assert_eq!(m.read(ChipId::HostVia2, 0x5), 0x01);
    assert_eq!(m.read(ChipId::HostVia2, 0x4), 0xF5);
}

#[test]
fn test_rebase_never_drops_below_a_counter_cycle() {
    let mut m = machine();
    load_t1(&mut m, ChipId::HostVia2, 1000);
    m.run_until(500);
    let before = m.via(ChipId::HostVia2).t1().counter(m.clk());
    assert_eq!(before, 501);

    m.prevent_clk_overflow();
    assert_eq!(m.clk(), 500);
    assert_eq!(m.via(ChipId::HostVia2).t1().counter(m.clk()), before);
    assert_eq!(m.via(ChipId::HostVia2).t1().next_underflow_clock(), Some(1003));
}

#[test]
fn test_rebase_with_amount_equal_to_threshold_keeps_counter_phase() {
    let config = MachineConfig {
        rebase_threshold: 100_000,
        rebase_amount: 100_000,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    load_t1(&mut m, ChipId::HostVia2, 0xFFFF);
    m.run_until(99_999);
    // One-shot already fired at 65_538; the counter keeps wrapping
    assert_eq!(m.timing().next_alarm_clock(), None);
    let before = m.via(ChipId::HostVia2).t1().counter(100_000);

    m.step(1);
    assert_eq!(m.clk(), REBASE_HEADROOM);
    assert_eq!(m.via(ChipId::HostVia2).t1().counter(m.clk()), before);
    // 99_999 cycles since the load took effect at clock 1
    assert_eq!(m.via(ChipId::HostVia2).t1().counter(m.clk()), 0xFFFF - 34_463);
}

#[test]
fn test_free_running_phase_survives_repeated_rebases() {
    let config = MachineConfig {
        rebase_threshold: 100_000,
        rebase_amount: 100_000,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    m.write(ChipId::HostVia2, 0xB, 0x40);
    load_t1(&mut m, ChipId::HostVia2, 0xFFFF);

    m.enable_tracing();
    for _ in 0..10 {
        m.step(40_000);
    }
    let events = m.take_trace();

    // Absolute clock of every underflow, undoing the rebases in between
    let mut shift = 0;
    let mut fired = Vec::new();
    for event in &events {
        match event {
            TraceEvent::Rebase { delta, .. } => shift += delta,
            TraceEvent::AlarmFired { clk, .. } => fired.push(clk + shift),
            _ => {}
        }
    }
    assert!(shift > 0);
    let expected: Vec<Clock> = (0..fired.len() as Clock)
        .map(|k| 65_538 + k * 65_536)
        .collect();
    assert_eq!(fired, expected);
    assert_eq!(fired.len(), 6);
}

#[test]
fn test_rebase_is_traced() {
    let config = MachineConfig {
        rebase_threshold: 100_000,
        rebase_amount: 64,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(&config);
    m.enable_tracing();
    m.run_until(150_000);
    assert_eq!(
        m.take_trace(),
        vec![TraceEvent::Rebase {
            clk: 149_936,
            delta: 64
        }]
    );
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn test_reset_cancels_timers() {
    let mut m = machine();
    m.write(ChipId::HostVia2, 0xE, 0xC0);
    load_t1(&mut m, ChipId::HostVia2, 10);
    m.run_until(50);
    assert!(m.host_irq());

    m.reset();
    assert!(!m.host_irq());
    assert_eq!(m.timing().next_alarm_clock(), None);
    assert_eq!(m.clk(), 50);
}
