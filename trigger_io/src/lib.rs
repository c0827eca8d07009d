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

//! Model, register script codec and simulator of the MVLC trigger I/O
//! module.

pub mod config;
pub mod connections;
pub mod dso;
mod error;
pub mod lut_ram;
pub mod minimize;
pub mod script;
pub mod sim;
pub mod trace;
pub mod units;
mod vcd;

// Public types
pub use crate::config::{
    Counter, Direction, Io, Level0, Level1, Level2, Level3, Lut, MasterTrigger, OutputMapping,
    StackBusy, StackStart, StrobedOutputs, Timer, TimerRange, TriggerIo, TriggerResource,
};
pub use crate::connections::{resolve, validate_connections};
pub use crate::dso::{fill_snapshot_from_dso_buffer, DsoSetup};
pub use crate::error::Error;
pub use crate::script::{generate, parse, GenFlags};
pub use crate::sim::{simulate, PinAddress, PinPosition, Sim};
pub use crate::trace::{Edge, Sample, SampleTime, Snapshot, Trace};
pub use crate::units::{UnitAddress, UnitConnection};
pub use crate::vcd::{write_sim_vcd, DEFAULT_TOP_MODULE, DEFAULT_VCD_FILE};
