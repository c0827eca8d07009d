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

//! Unit addressing and the fixed layout of the four trigger I/O levels.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LEVEL_COUNT: usize = 4;

pub const TIMER_COUNT: usize = 4;
pub const TRIGGER_RESOURCE_COUNT: usize = 8;
pub const STACK_BUSY_COUNT: usize = 2;
pub const NIM_IO_COUNT: usize = 14;
pub const IRQ_INPUT_COUNT: usize = 6;
pub const ECL_OUT_COUNT: usize = 3;

pub const LUT_INPUT_BITS: usize = 6;
pub const LUT_OUTPUT_BITS: usize = 3;
pub const LUT_INPUT_COMBINATIONS: usize = 1 << LUT_INPUT_BITS;
/// Subunit index of the strobe pseudo input of a LUT.
pub const LUT_STROBE_INPUT: usize = LUT_INPUT_BITS;
/// Subunit index of the strobe gate generator output of a LUT.
pub const LUT_STROBE_OUTPUT: usize = LUT_OUTPUT_BITS;

/// Identifies any pin in the system.
///
/// `subunit` selects a LUT input or output and is zero for all other unit
/// types, except for Level3 counters whose second input is the latch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnitAddress {
    pub level: usize,
    pub unit: usize,
    pub subunit: usize,
}

impl UnitAddress {
    pub const fn new(level: usize, unit: usize, subunit: usize) -> Self {
        Self {
            level,
            unit,
            subunit,
        }
    }

    pub const fn unit(level: usize, unit: usize) -> Self {
        Self::new(level, unit, 0)
    }
}

impl fmt::Display for UnitAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "L{}.{}.{}", self.level, self.unit, self.subunit)
    }
}

/// Static description of where one input gets its signal from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitConnection {
    Fixed(UnitAddress),
    /// Resolved through the configured selector and the input's choice list.
    Dynamic,
}

pub type LutConnections = [UnitConnection; LUT_INPUT_BITS];

pub mod level0 {
    use super::*;

    pub const TIMER_OFFSET: usize = 0;
    pub const TRIGGER_RESOURCE_OFFSET: usize = TIMER_OFFSET + TIMER_COUNT;
    pub const STACK_BUSY_OFFSET: usize = TRIGGER_RESOURCE_OFFSET + TRIGGER_RESOURCE_COUNT;
    pub const SYSCLOCK_OFFSET: usize = STACK_BUSY_OFFSET + STACK_BUSY_COUNT;
    pub const DAQ_START_OFFSET: usize = SYSCLOCK_OFFSET + 1;
    pub const NIM_IO_OFFSET: usize = DAQ_START_OFFSET + 1;
    pub const IRQ_INPUT_OFFSET: usize = NIM_IO_OFFSET + NIM_IO_COUNT;
    pub const OUTPUT_COUNT: usize = IRQ_INPUT_OFFSET + IRQ_INPUT_COUNT;

    /// Units below the NIM block. These are selectable by Level2 and Level3.
    pub const UTILITY_UNIT_COUNT: usize = NIM_IO_OFFSET;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Unit {
        Timer(usize),
        TriggerResource(usize),
        StackBusy(usize),
        Sysclock,
        DaqStart,
        Nim(usize),
        IrqInput(usize),
    }

    pub fn unit_kind(unit: usize) -> Option<Unit> {
        Some(match unit {
            u if u < TRIGGER_RESOURCE_OFFSET => Unit::Timer(u - TIMER_OFFSET),
            u if u < STACK_BUSY_OFFSET => Unit::TriggerResource(u - TRIGGER_RESOURCE_OFFSET),
            u if u < SYSCLOCK_OFFSET => Unit::StackBusy(u - STACK_BUSY_OFFSET),
            SYSCLOCK_OFFSET => Unit::Sysclock,
            DAQ_START_OFFSET => Unit::DaqStart,
            u if u < IRQ_INPUT_OFFSET => Unit::Nim(u - NIM_IO_OFFSET),
            u if u < OUTPUT_COUNT => Unit::IrqInput(u - IRQ_INPUT_OFFSET),
            _ => return None,
        })
    }

    pub static DEFAULT_UNIT_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
        (0..OUTPUT_COUNT)
            .map(|unit| match unit_kind(unit) {
                Some(Unit::Timer(i)) => format!("timer{}", i),
                Some(Unit::TriggerResource(i)) => format!("trigger_resource{}", i),
                Some(Unit::StackBusy(i)) => format!("stack_busy{}", i),
                Some(Unit::Sysclock) => "sysclock".to_string(),
                Some(Unit::DaqStart) => "daq_start".to_string(),
                Some(Unit::Nim(i)) => format!("NIM{}", i),
                Some(Unit::IrqInput(i)) => format!("irq_input{}", i),
                None => unreachable!(),
            })
            .collect()
    });
}

pub mod level1 {
    pub const LUT_COUNT: usize = 7;
    /// The LUT with selectable inputs.
    pub const DYNAMIC_LUT: usize = 2;
    pub const LUT2_DYNAMIC_INPUT_COUNT: usize = 3;
}

pub mod level2 {
    pub const LUT_COUNT: usize = 3;
    pub const LUT_DYNAMIC_INPUT_COUNT: usize = 3;
}

pub mod level3 {
    use super::*;

    pub const STACK_START_COUNT: usize = 4;
    pub const MASTER_TRIGGER_COUNT: usize = 4;
    pub const COUNTER_COUNT: usize = 8;

    pub const STACK_START_OFFSET: usize = 0;
    pub const MASTER_TRIGGER_OFFSET: usize = STACK_START_OFFSET + STACK_START_COUNT;
    pub const COUNTER_OFFSET: usize = MASTER_TRIGGER_OFFSET + MASTER_TRIGGER_COUNT;
    pub const NIM_IO_OFFSET: usize = COUNTER_OFFSET + COUNTER_COUNT;
    pub const ECL_OFFSET: usize = NIM_IO_OFFSET + NIM_IO_COUNT;
    pub const UNIT_COUNT: usize = ECL_OFFSET + ECL_OUT_COUNT;

    /// Input index of a counter's latch.
    pub const COUNTER_LATCH_INPUT: usize = 1;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Unit {
        StackStart(usize),
        MasterTrigger(usize),
        Counter(usize),
        Nim(usize),
        Ecl(usize),
    }

    pub fn unit_kind(unit: usize) -> Option<Unit> {
        Some(match unit {
            u if u < MASTER_TRIGGER_OFFSET => Unit::StackStart(u - STACK_START_OFFSET),
            u if u < COUNTER_OFFSET => Unit::MasterTrigger(u - MASTER_TRIGGER_OFFSET),
            u if u < NIM_IO_OFFSET => Unit::Counter(u - COUNTER_OFFSET),
            u if u < ECL_OFFSET => Unit::Nim(u - NIM_IO_OFFSET),
            u if u < UNIT_COUNT => Unit::Ecl(u - ECL_OFFSET),
            _ => return None,
        })
    }

    /// Number of connectable inputs of a unit.
    pub fn input_count(unit: usize) -> usize {
        match unit_kind(unit) {
            Some(Unit::Counter(_)) => 2,
            Some(_) => 1,
            None => 0,
        }
    }

    pub static DEFAULT_UNIT_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
        (0..UNIT_COUNT)
            .map(|unit| match unit_kind(unit) {
                Some(Unit::StackStart(i)) => format!("StackStart{}", i),
                Some(Unit::MasterTrigger(i)) => format!("MasterTrigger{}", i),
                Some(Unit::Counter(i)) => format!("Counter{}", i),
                Some(Unit::Nim(i)) => format!("NIM{}", i),
                Some(Unit::Ecl(i)) => format!("ECL{}", i),
                None => unreachable!(),
            })
            .collect()
    });
}

/// Default label of a LUT output.
pub fn default_lut_output_name(level: usize, unit: usize, output: usize) -> String {
    format!("L{}.LUT{}.OUT{}", level, unit, output)
}

/// The unit name used when nothing else was configured.
///
/// Returns `None` for addresses outside of the layout.
pub fn lookup_default_name(address: UnitAddress) -> Option<String> {
    match address.level {
        0 => level0::DEFAULT_UNIT_NAMES.get(address.unit).cloned(),
        1 if address.unit < level1::LUT_COUNT && address.subunit < LUT_OUTPUT_BITS => Some(
            default_lut_output_name(1, address.unit, address.subunit),
        ),
        2 if address.unit < level2::LUT_COUNT && address.subunit < LUT_OUTPUT_BITS => Some(
            default_lut_output_name(2, address.unit, address.subunit),
        ),
        3 => level3::DEFAULT_UNIT_NAMES.get(address.unit).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level0_layout() {
        assert_eq!(level0::OUTPUT_COUNT, 36);
        assert_eq!(level0::UTILITY_UNIT_COUNT, 16);
        assert_eq!(level0::unit_kind(3), Some(level0::Unit::Timer(3)));
        assert_eq!(level0::unit_kind(14), Some(level0::Unit::Sysclock));
        assert_eq!(level0::unit_kind(16), Some(level0::Unit::Nim(0)));
        assert_eq!(level0::unit_kind(35), Some(level0::Unit::IrqInput(5)));
        assert_eq!(level0::unit_kind(36), None);
    }

    #[test]
    fn level3_layout() {
        assert_eq!(level3::UNIT_COUNT, 33);
        assert_eq!(level3::unit_kind(8), Some(level3::Unit::Counter(0)));
        assert_eq!(level3::unit_kind(32), Some(level3::Unit::Ecl(2)));
        assert_eq!(level3::input_count(9), 2);
        assert_eq!(level3::input_count(16), 1);
        assert_eq!(level3::input_count(33), 0);
    }

    #[test]
    fn default_names() {
        assert_eq!(
            lookup_default_name(UnitAddress::unit(0, 17)).as_deref(),
            Some("NIM1")
        );
        assert_eq!(
            lookup_default_name(UnitAddress::new(2, 1, 2)).as_deref(),
            Some("L2.LUT1.OUT2")
        );
        assert_eq!(
            lookup_default_name(UnitAddress::unit(3, 30)).as_deref(),
            Some("ECL0")
        );
        assert_eq!(lookup_default_name(UnitAddress::new(1, 7, 0)), None);
    }

    #[test]
    fn addresses_order_by_tuple() {
        let mut v = vec![
            UnitAddress::new(1, 0, 2),
            UnitAddress::new(0, 20, 0),
            UnitAddress::new(1, 0, 1),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                UnitAddress::new(0, 20, 0),
                UnitAddress::new(1, 0, 1),
                UnitAddress::new(1, 0, 2)
            ]
        );
    }
}
