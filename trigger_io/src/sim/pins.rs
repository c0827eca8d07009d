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

//! Naming of the pins whose traces a simulation produces.

use std::fmt;

use crate::config::TriggerIo;
use crate::connections::resolve;
use crate::units::{lookup_default_name, UnitAddress, LUT_INPUT_BITS, LUT_OUTPUT_BITS};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PinPosition {
    Input,
    Output,
}

/// A unit input or output. Level0 inputs are the sampled pins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinAddress {
    pub unit: UnitAddress,
    pub position: PinPosition,
}

impl PinAddress {
    pub const fn new(unit: UnitAddress, position: PinPosition) -> Self {
        Self { unit, position }
    }

    pub const fn input(unit: UnitAddress) -> Self {
        Self::new(unit, PinPosition::Input)
    }

    pub const fn output(unit: UnitAddress) -> Self {
        Self::new(unit, PinPosition::Output)
    }
}

impl fmt::Display for PinAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let position = match self.position {
            PinPosition::Input => "in",
            PinPosition::Output => "out",
        };
        write!(f, "{}:{}", self.unit, position)
    }
}

/// Hierarchical path components, e.g. `["L1", "LUT3", "in4"]`.
pub fn pin_path_list(pin: &PinAddress) -> Vec<String> {
    let UnitAddress {
        level,
        unit,
        subunit,
    } = pin.unit;
    let default_name = || lookup_default_name(pin.unit).unwrap_or_default();
    match (level, pin.position) {
        (0, PinPosition::Input) => vec!["sampled".to_string(), default_name()],
        (0, PinPosition::Output) => vec!["L0".to_string(), default_name()],
        (1, _) | (2, _) => {
            let last = match pin.position {
                PinPosition::Input if subunit < LUT_INPUT_BITS => format!("in{}", subunit),
                PinPosition::Input => "strobeIn".to_string(),
                PinPosition::Output if subunit < LUT_OUTPUT_BITS => format!("out{}", subunit),
                PinPosition::Output => "strobeOut".to_string(),
            };
            vec![format!("L{}", level), format!("LUT{}", unit), last]
        }
        (3, PinPosition::Input) => vec!["L3in".to_string(), default_name()],
        (3, PinPosition::Output) => vec!["L3out".to_string(), default_name()],
        _ => Vec::new(),
    }
}

pub fn pin_path(pin: &PinAddress) -> String {
    pin_path_list(pin).join(".")
}

pub fn pin_name(pin: &PinAddress) -> String {
    pin_path_list(pin)
        .pop()
        .unwrap_or_else(|| "<pinName>".to_string())
}

/// The name the user gave to the signal on a pin. Inputs are named after
/// their source. Empty for unconnected inputs and strobe outputs.
pub fn pin_user_name(cfg: &TriggerIo, pin: &PinAddress) -> String {
    let address = match (pin.unit.level, pin.position) {
        (0, _) | (_, PinPosition::Output) => Some(pin.unit),
        _ => resolve(cfg, pin.unit).ok().flatten(),
    };
    address
        .and_then(|a| cfg.lookup_name(a))
        .unwrap_or_default()
        .to_string()
}
