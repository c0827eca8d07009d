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

use std::fmt;

use crate::units::UnitAddress;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Malformed script text.
    Parse {
        script: String,
        line: usize,
        message: String,
    },
    /// A dynamic connection selector outside of its choice list.
    InvalidConnection {
        address: UnitAddress,
        value: u16,
        choices: usize,
    },
    /// The address does not name an input or output of any unit.
    InvalidAddress(UnitAddress),
    /// An enumerated register holds a value with no meaning.
    InvalidRegisterValue {
        level: usize,
        unit: usize,
        register: u16,
        value: u16,
    },
    /// Same-level LUT connections form a loop.
    ConnectionCycle { level: usize },
    /// The meta block could not be written.
    SerializeMeta(String),
}

impl Error {
    pub(crate) fn parse<S: Into<String>>(script: &str, line: usize, message: S) -> Self {
        Self::Parse {
            script: script.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Parse {
                script,
                line,
                message,
            } => write!(f, "ERROR: {}:{}: {}", script, line, message),
            Self::InvalidConnection {
                address,
                value,
                choices,
            } => write!(
                f,
                "ERROR: Invalid connection value {} for input {} ({} choices)",
                value, address, choices
            ),
            Self::InvalidAddress(address) => write!(f, "ERROR: Invalid unit address {}", address),
            Self::InvalidRegisterValue {
                level,
                unit,
                register,
                value,
            } => write!(
                f,
                "ERROR: Invalid value {} in register 0x{:04x} of L{}.Unit{}",
                value, register, level, unit
            ),
            Self::ConnectionCycle { level } => {
                write!(f, "ERROR: Connection cycle between L{} LUTs", level)
            }
            Self::SerializeMeta(message) => {
                write!(f, "ERROR: Cannot write meta block: {}", message)
            }
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_location() {
        let err = Error::parse("setup.vmescript", 12, "expected a value");
        assert_eq!(err.to_string(), "ERROR: setup.vmescript:12: expected a value");
        let err = Error::InvalidConnection {
            address: UnitAddress::new(3, 16, 0),
            value: 40,
            choices: 9,
        };
        assert!(err.to_string().contains("L3.16.0"));
        let err = Error::SerializeMeta("unsupported value".into());
        assert_eq!(err.to_string(), "ERROR: Cannot write meta block: unsupported value");
    }
}
