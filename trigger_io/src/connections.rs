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

//! Wiring tables and the connection resolver.
//!
//! Every unit input is either hard wired to a source or selects its source
//! from a fixed list of choices. The lists are built once on first use and
//! never change afterwards.

use once_cell::sync::Lazy;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::config::TriggerIo;
use crate::error::Error;
use crate::units::UnitConnection::{Dynamic, Fixed};
use crate::units::*;

const fn l0(unit: usize) -> UnitConnection {
    Fixed(UnitAddress::unit(0, unit))
}

const fn l1(unit: usize, output: usize) -> UnitConnection {
    Fixed(UnitAddress::new(1, unit, output))
}

/// Input wiring of the Level1 LUTs.
pub const LEVEL1_STATIC_CONNECTIONS: [LutConnections; level1::LUT_COUNT] = [
    [l0(16), l0(17), l0(18), l0(19), l0(20), l0(21)],
    [l0(20), l0(21), l0(22), l0(23), l0(24), l0(25)],
    [Dynamic, Dynamic, Dynamic, l0(27), l0(28), l0(29)],
    [l1(0, 0), l1(0, 1), l1(0, 2), l1(1, 0), l1(1, 1), l1(1, 2)],
    [l1(1, 0), l1(1, 1), l1(1, 2), l1(2, 0), l1(2, 1), l1(2, 2)],
    [l0(30), l0(31), l0(32), l0(33), l0(34), l0(35)],
    [l1(2, 0), l1(2, 1), l1(2, 2), l1(5, 0), l1(5, 1), l1(5, 2)],
];

/// Input wiring of the Level2 LUTs. The strobe input is always dynamic.
pub const LEVEL2_STATIC_CONNECTIONS: [LutConnections; level2::LUT_COUNT] = [
    [Dynamic, Dynamic, Dynamic, l1(3, 0), l1(3, 1), l1(3, 2)],
    [Dynamic, Dynamic, Dynamic, l1(4, 0), l1(4, 1), l1(4, 2)],
    [Dynamic, Dynamic, Dynamic, l1(6, 0), l1(6, 1), l1(6, 2)],
];

/// Choices of the dynamic inputs of L1.LUT2, indexed by input.
pub static LUT2_DYNAMIC_INPUT_CHOICES: Lazy<Vec<Vec<UnitAddress>>> = Lazy::new(|| {
    (0..level1::LUT2_DYNAMIC_INPUT_COUNT)
        .map(|input| {
            vec![
                UnitAddress::unit(0, level0::NIM_IO_OFFSET + 8 + input),
                UnitAddress::unit(0, level0::IRQ_INPUT_OFFSET + input),
            ]
        })
        .collect()
});

fn utility_units() -> impl Iterator<Item = UnitAddress> {
    (0..level0::UTILITY_UNIT_COUNT).map(|unit| UnitAddress::unit(0, unit))
}

fn lut_outputs(level: usize, unit: usize) -> impl Iterator<Item = UnitAddress> {
    (0..LUT_OUTPUT_BITS).map(move |output| UnitAddress::new(level, unit, output))
}

/// Choices of a Level2 LUT, indexed by input. Index `LUT_STROBE_INPUT`
/// holds the strobe choices, fixed inputs have empty lists.
pub static LEVEL2_DYNAMIC_INPUT_CHOICES: Lazy<Vec<Vec<Vec<UnitAddress>>>> = Lazy::new(|| {
    // The Level1 LUT each Level2 LUT can reach besides its fixed inputs.
    const CROSS_LUT: [usize; level2::LUT_COUNT] = [4, 3, 5];

    (0..level2::LUT_COUNT)
        .map(|unit| {
            let mut inputs: Vec<Vec<UnitAddress>> = (0..=LUT_STROBE_INPUT)
                .map(|input| {
                    if input < level2::LUT_DYNAMIC_INPUT_COUNT {
                        utility_units()
                            .chain(std::iter::once(UnitAddress::new(1, CROSS_LUT[unit], input)))
                            .collect()
                    } else {
                        Vec::new()
                    }
                })
                .collect();
            inputs[LUT_STROBE_INPUT] = utility_units()
                .chain(lut_outputs(1, 3))
                .chain(lut_outputs(1, 4))
                .chain((0..unit).flat_map(|lower| lut_outputs(2, lower)))
                .collect();
            inputs
        })
        .collect()
});

/// Choices of each Level3 unit, indexed by unit then input.
pub static LEVEL3_DYNAMIC_INPUT_CHOICES: Lazy<Vec<Vec<Vec<UnitAddress>>>> = Lazy::new(|| {
    let level2_outputs: Vec<UnitAddress> = (0..level2::LUT_COUNT)
        .flat_map(|unit| lut_outputs(2, unit))
        .collect();
    let utility_and_level2: Vec<UnitAddress> = utility_units()
        .chain(level2_outputs.iter().copied())
        .collect();

    (0..level3::UNIT_COUNT)
        .map(|unit| {
            let choices = match level3::unit_kind(unit) {
                Some(level3::Unit::Nim(_)) | Some(level3::Unit::Ecl(_)) => &level2_outputs,
                _ => &utility_and_level2,
            };
            vec![choices.clone(); level3::input_count(unit)]
        })
        .collect()
});

/// The selector value meaning "not connected", if the input has one.
///
/// Only counter latch inputs can be left unconnected. The value is one past
/// the last valid choice.
pub fn level3_not_connected_value(unit: usize, input: usize) -> Option<u16> {
    match level3::unit_kind(unit) {
        Some(level3::Unit::Counter(_)) if input == level3::COUNTER_LATCH_INPUT => {
            Some(LEVEL3_DYNAMIC_INPUT_CHOICES[unit][input].len() as u16)
        }
        _ => None,
    }
}

/// The static description of an input.
pub fn unit_connection(address: UnitAddress) -> Result<UnitConnection, Error> {
    let UnitAddress {
        level,
        unit,
        subunit,
    } = address;
    match level {
        1 if unit < level1::LUT_COUNT && subunit < LUT_INPUT_BITS => {
            Ok(LEVEL1_STATIC_CONNECTIONS[unit][subunit])
        }
        2 if unit < level2::LUT_COUNT && subunit < LUT_INPUT_BITS => {
            Ok(LEVEL2_STATIC_CONNECTIONS[unit][subunit])
        }
        2 if unit < level2::LUT_COUNT && subunit == LUT_STROBE_INPUT => Ok(Dynamic),
        3 if subunit < level3::input_count(unit) => Ok(Dynamic),
        _ => Err(Error::InvalidAddress(address)),
    }
}

/// The choice list of a dynamic input.
pub fn dynamic_input_choices(address: UnitAddress) -> Option<&'static [UnitAddress]> {
    let UnitAddress {
        level,
        unit,
        subunit,
    } = address;
    let choices = match level {
        1 if unit == level1::DYNAMIC_LUT => LUT2_DYNAMIC_INPUT_CHOICES.get(subunit)?,
        2 => LEVEL2_DYNAMIC_INPUT_CHOICES.get(unit)?.get(subunit)?,
        3 => LEVEL3_DYNAMIC_INPUT_CHOICES.get(unit)?.get(subunit)?,
        _ => return None,
    };
    if choices.is_empty() {
        None
    } else {
        Some(choices.as_slice())
    }
}

/// The selector stored in `cfg` for a dynamic input.
pub fn get_connection_value(cfg: &TriggerIo, address: UnitAddress) -> Option<u16> {
    let UnitAddress {
        level,
        unit,
        subunit,
    } = address;
    match level {
        1 if unit == level1::DYNAMIC_LUT => cfg.l1.lut2_connections.get(subunit).copied(),
        2 if subunit == LUT_STROBE_INPUT => cfg.l2.strobe_connections.get(unit).copied(),
        2 => cfg
            .l2
            .lut_connections
            .get(unit)
            .and_then(|inputs| inputs.get(subunit))
            .copied(),
        3 => cfg
            .l3
            .connections
            .get(unit)
            .and_then(|inputs| inputs.get(subunit))
            .copied(),
        _ => None,
    }
}

/// Mutable access to the selector of a dynamic input.
pub fn connection_value_mut(cfg: &mut TriggerIo, address: UnitAddress) -> Option<&mut u16> {
    let UnitAddress {
        level,
        unit,
        subunit,
    } = address;
    match level {
        1 if unit == level1::DYNAMIC_LUT => cfg.l1.lut2_connections.get_mut(subunit),
        2 if subunit == LUT_STROBE_INPUT => cfg.l2.strobe_connections.get_mut(unit),
        2 => cfg
            .l2
            .lut_connections
            .get_mut(unit)
            .and_then(|inputs| inputs.get_mut(subunit)),
        3 => cfg
            .l3
            .connections
            .get_mut(unit)
            .and_then(|inputs| inputs.get_mut(subunit)),
        _ => None,
    }
}

/// The source an input is wired to.
///
/// `Ok(None)` means the input is deliberately not connected. A selector
/// outside of its choice list is reported as `Error::InvalidConnection`.
pub fn get_connection_unit_address(
    cfg: &TriggerIo,
    address: UnitAddress,
) -> Result<Option<UnitAddress>, Error> {
    match unit_connection(address)? {
        Fixed(source) => Ok(Some(source)),
        Dynamic => {
            let choices =
                dynamic_input_choices(address).ok_or(Error::InvalidAddress(address))?;
            let value = get_connection_value(cfg, address).ok_or(Error::InvalidAddress(address))?;
            if let Some(source) = choices.get(value as usize) {
                return Ok(Some(*source));
            }
            if address.level == 3
                && level3_not_connected_value(address.unit, address.subunit) == Some(value)
            {
                return Ok(None);
            }
            Err(Error::InvalidConnection {
                address,
                value,
                choices: choices.len(),
            })
        }
    }
}

/// Shorthand for `get_connection_unit_address`.
pub fn resolve(cfg: &TriggerIo, address: UnitAddress) -> Result<Option<UnitAddress>, Error> {
    get_connection_unit_address(cfg, address)
}

/// Every dynamic input in the system.
pub fn dynamic_inputs() -> impl Iterator<Item = UnitAddress> {
    let level1 = (0..level1::LUT2_DYNAMIC_INPUT_COUNT)
        .map(|input| UnitAddress::new(1, level1::DYNAMIC_LUT, input));
    let level2 = (0..level2::LUT_COUNT).flat_map(|unit| {
        (0..level2::LUT_DYNAMIC_INPUT_COUNT)
            .chain(std::iter::once(LUT_STROBE_INPUT))
            .map(move |input| UnitAddress::new(2, unit, input))
    });
    let level3 = (0..level3::UNIT_COUNT).flat_map(|unit| {
        (0..level3::input_count(unit)).map(move |input| UnitAddress::new(3, unit, input))
    });
    level1.chain(level2).chain(level3)
}

/// Checks every selector in `cfg` against its choice list.
pub fn validate_connections(cfg: &TriggerIo) -> Result<(), Error> {
    for address in dynamic_inputs() {
        get_connection_unit_address(cfg, address)?;
    }
    Ok(())
}

/// Order in which the LUTs of a level can be evaluated so that every LUT
/// reading another LUT of the same level comes after it.
pub fn lut_evaluation_order(cfg: &TriggerIo, level: usize) -> Result<Vec<usize>, Error> {
    let (lut_count, input_count) = match level {
        1 => (level1::LUT_COUNT, LUT_INPUT_BITS),
        2 => (level2::LUT_COUNT, LUT_INPUT_BITS + 1),
        _ => return Err(Error::InvalidAddress(UnitAddress::unit(level, 0))),
    };

    let mut graph = DiGraph::<usize, ()>::with_capacity(lut_count, lut_count * input_count);
    let nodes: Vec<_> = (0..lut_count).map(|unit| graph.add_node(unit)).collect();

    for unit in 0..lut_count {
        for input in 0..input_count {
            if let Some(source) = resolve(cfg, UnitAddress::new(level, unit, input))? {
                if source.level == level {
                    graph.update_edge(nodes[source.unit], nodes[unit], ());
                }
            }
        }
    }

    let order = toposort(&graph, None).map_err(|_| Error::ConnectionCycle { level })?;
    Ok(order.into_iter().map(|node| graph[node]).collect())
}
