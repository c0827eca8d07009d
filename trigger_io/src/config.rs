// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The trigger I/O configuration model.
//!
//! Constructed programmatically, parsed from a register script or read from
//! a YAML file.

use anyhow::Context;
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::connections;
use crate::units::*;

/// Gate generator width used for LUT strobes unless configured otherwise.
pub const STROBE_GG_DEFAULT_WIDTH: u16 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    In = 0,
    Out = 1,
}

/// Gate generator settings shared by all IO-like units.
///
/// A `width` of zero selects level mode: the input passes through
/// (optionally inverted) instead of triggering pulses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Io {
    pub delay: u16,
    pub width: u16,
    pub holdoff: u16,
    pub invert: bool,
    pub direction: Direction,
    pub activate: bool,
}

impl Io {
    pub fn is_level_mode(&self) -> bool {
        self.width == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerRange {
    #[default]
    Ns = 0,
    Us = 1,
    Ms = 2,
    S = 3,
}

impl TimerRange {
    /// Length of one period unit in ns.
    pub fn factor_ns(self) -> u64 {
        match self {
            Self::Ns => 1,
            Self::Us => 1_000,
            Self::Ms => 1_000_000,
            Self::S => 1_000_000_000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub range: TimerRange,
    pub delay_ns: u16,
    pub period: u16,
    /// Start the timer together with the DAQ. Not register backed.
    pub soft_activate: bool,
}

impl Timer {
    /// Shortest period the simulator generates, in ns.
    pub const MIN_PERIOD_NS: u64 = 24;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerResource {
    Irq {
        /// zero based: 0 is IRQ1
        irq_index: u8,
    },
    SoftTrigger,
    SlaveTrigger {
        gate_generator: Io,
        trigger_index: u8,
    },
}

impl Default for TriggerResource {
    fn default() -> Self {
        Self::Irq { irq_index: 0 }
    }
}

impl TriggerResource {
    pub fn type_code(&self) -> u16 {
        match self {
            Self::Irq { .. } => 0,
            Self::SoftTrigger => 1,
            Self::SlaveTrigger { .. } => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackBusy {
    pub stack_index: u8,
}

/// One LUT output: bit `i` is the output value for input combination `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct OutputMapping(pub BitArr!(for LUT_INPUT_COMBINATIONS, in u64, Lsb0));

impl OutputMapping {
    pub fn from_fn<F: Fn(usize) -> bool>(f: F) -> Self {
        let mut mapping = Self::default();
        for combination in 0..LUT_INPUT_COMBINATIONS {
            mapping.set(combination, f(combination));
        }
        mapping
    }

    pub fn test(&self, combination: usize) -> bool {
        assert!(combination < LUT_INPUT_COMBINATIONS);
        self.0[combination]
    }

    pub fn set(&mut self, combination: usize, value: bool) {
        assert!(combination < LUT_INPUT_COMBINATIONS);
        self.0.set(combination, value);
    }

    pub fn bits(&self) -> u64 {
        self.0.into_inner()[0]
    }
}

impl From<u64> for OutputMapping {
    fn from(bits: u64) -> Self {
        Self(BitArray::new([bits]))
    }
}

impl From<OutputMapping> for u64 {
    fn from(mapping: OutputMapping) -> u64 {
        mapping.bits()
    }
}

/// Mask of the LUT outputs that only change while the strobe is high.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct StrobedOutputs(pub BitArr!(for LUT_OUTPUT_BITS, in u8, Lsb0));

impl StrobedOutputs {
    pub fn test(&self, output: usize) -> bool {
        self.0[output]
    }

    pub fn set(&mut self, output: usize, value: bool) {
        assert!(output < LUT_OUTPUT_BITS);
        self.0.set(output, value);
    }

    pub fn any(&self) -> bool {
        self.0[..LUT_OUTPUT_BITS].any()
    }

    pub fn bits(&self) -> u8 {
        self.0.into_inner()[0]
    }
}

impl From<u8> for StrobedOutputs {
    fn from(bits: u8) -> Self {
        Self(BitArray::new([bits & ((1 << LUT_OUTPUT_BITS) - 1)]))
    }
}

impl From<StrobedOutputs> for u8 {
    fn from(mask: StrobedOutputs) -> u8 {
        mask.bits()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lut {
    pub contents: [OutputMapping; LUT_OUTPUT_BITS],
    pub strobed_outputs: StrobedOutputs,
    /// Gate generator shaping the strobe input.
    pub strobe_gg: Io,
    pub output_names: [String; LUT_OUTPUT_BITS],
}

impl Lut {
    pub fn new(level: usize, unit: usize) -> Self {
        Self {
            contents: Default::default(),
            strobed_outputs: Default::default(),
            strobe_gg: Io {
                width: STROBE_GG_DEFAULT_WIDTH,
                ..Default::default()
            },
            output_names: std::array::from_fn(|output| {
                default_lut_output_name(level, unit, output)
            }),
        }
    }

    /// Value of every output for an input combination, bit `n` holding
    /// output `n`.
    pub fn lookup(&self, combination: usize) -> u8 {
        self.contents
            .iter()
            .enumerate()
            .fold(0, |acc, (output, mapping)| {
                acc | ((mapping.test(combination) as u8) << output)
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level0 {
    pub timers: [Timer; TIMER_COUNT],
    pub trigger_resources: [TriggerResource; TRIGGER_RESOURCE_COUNT],
    pub stack_busy: [StackBusy; STACK_BUSY_COUNT],
    pub io_nim: [Io; NIM_IO_COUNT],
    pub io_irq: [Io; IRQ_INPUT_COUNT],
    pub unit_names: Vec<String>,
}

impl Default for Level0 {
    fn default() -> Self {
        Self {
            timers: Default::default(),
            trigger_resources: Default::default(),
            stack_busy: Default::default(),
            io_nim: Default::default(),
            io_irq: Default::default(),
            unit_names: level0::DEFAULT_UNIT_NAMES.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level1 {
    pub luts: [Lut; level1::LUT_COUNT],
    /// Selectors of the dynamic inputs of LUT2.
    pub lut2_connections: [u16; level1::LUT2_DYNAMIC_INPUT_COUNT],
}

impl Default for Level1 {
    fn default() -> Self {
        Self {
            luts: std::array::from_fn(|unit| Lut::new(1, unit)),
            lut2_connections: Default::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2 {
    pub luts: [Lut; level2::LUT_COUNT],
    pub lut_connections: [[u16; level2::LUT_DYNAMIC_INPUT_COUNT]; level2::LUT_COUNT],
    pub strobe_connections: [u16; level2::LUT_COUNT],
}

impl Default for Level2 {
    fn default() -> Self {
        Self {
            luts: std::array::from_fn(|unit| Lut::new(2, unit)),
            lut_connections: Default::default(),
            strobe_connections: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackStart {
    pub activate: bool,
    pub stack_index: u8,
    pub delay_ns: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterTrigger {
    pub activate: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub clear_on_latch: bool,
    /// Not register backed.
    pub soft_activate: bool,
}

/// The output level.
///
/// NIM outputs have no IO settings of their own: they share the
/// `Level0::io_nim` entry of the same pin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level3 {
    pub stack_start: [StackStart; level3::STACK_START_COUNT],
    pub master_triggers: [MasterTrigger; level3::MASTER_TRIGGER_COUNT],
    pub counters: [Counter; level3::COUNTER_COUNT],
    pub io_ecl: [Io; ECL_OUT_COUNT],
    pub unit_names: Vec<String>,
    /// Selector values, indexed by unit then input.
    pub connections: Vec<Vec<u16>>,
}

impl Default for Level3 {
    fn default() -> Self {
        let connections = (0..level3::UNIT_COUNT)
            .map(|unit| {
                (0..level3::input_count(unit))
                    .map(|input| connections::level3_not_connected_value(unit, input).unwrap_or(0))
                    .collect()
            })
            .collect();
        Self {
            stack_start: Default::default(),
            master_triggers: Default::default(),
            counters: Default::default(),
            io_ecl: std::array::from_fn(|_| Io {
                direction: Direction::Out,
                ..Default::default()
            }),
            unit_names: level3::DEFAULT_UNIT_NAMES.clone(),
            connections,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerIo {
    pub l0: Level0,
    pub l1: Level1,
    pub l2: Level2,
    pub l3: Level3,
}

impl TriggerIo {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("reading {}", path.display()))
    }

    pub fn from_yaml_str(config: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(config)?)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// The user visible name of a unit or LUT output.
    pub fn lookup_name(&self, address: UnitAddress) -> Option<&str> {
        let name = match address.level {
            0 => self.l0.unit_names.get(address.unit),
            1 => self
                .l1
                .luts
                .get(address.unit)
                .and_then(|lut| lut.output_names.get(address.subunit)),
            2 => self
                .l2
                .luts
                .get(address.unit)
                .and_then(|lut| lut.output_names.get(address.subunit)),
            3 => self.l3.unit_names.get(address.unit),
            _ => None,
        };
        name.map(String::as_str)
    }

    /// Sets a name. NIM pins exist on Level0 and Level3, both copies are
    /// updated.
    pub fn set_name(&mut self, address: UnitAddress, name: &str) -> bool {
        let slot = match address.level {
            0 => self.l0.unit_names.get_mut(address.unit),
            1 => self
                .l1
                .luts
                .get_mut(address.unit)
                .and_then(|lut| lut.output_names.get_mut(address.subunit)),
            2 => self
                .l2
                .luts
                .get_mut(address.unit)
                .and_then(|lut| lut.output_names.get_mut(address.subunit)),
            3 => self.l3.unit_names.get_mut(address.unit),
            _ => None,
        };
        let slot = match slot {
            Some(slot) => slot,
            None => return false,
        };
        *slot = name.to_string();
        match (address.level, address.unit) {
            (0, unit) if matches!(level0::unit_kind(unit), Some(level0::Unit::Nim(_))) => {
                self.l3.unit_names[unit - level0::NIM_IO_OFFSET + level3::NIM_IO_OFFSET] =
                    name.to_string();
            }
            (3, unit) if matches!(level3::unit_kind(unit), Some(level3::Unit::Nim(_))) => {
                self.l0.unit_names[unit - level3::NIM_IO_OFFSET + level0::NIM_IO_OFFSET] =
                    name.to_string();
            }
            _ => (),
        }
        true
    }

    /// Restores every unit and LUT output name to its default.
    pub fn reset_names(&mut self) {
        self.l0.unit_names = level0::DEFAULT_UNIT_NAMES.clone();
        for (level, luts) in [(1, &mut self.l1.luts[..]), (2, &mut self.l2.luts[..])] {
            for (unit, lut) in luts.iter_mut().enumerate() {
                lut.output_names =
                    std::array::from_fn(|output| default_lut_output_name(level, unit, output));
            }
        }
        self.l3.unit_names = level3::DEFAULT_UNIT_NAMES.clone();
    }
}
