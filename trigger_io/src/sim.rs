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

//! Simulation of a whole trigger IO configuration.
//!
//! Level0 traces are generated from the sampled pin traces, timers and the
//! system clock. Every higher level only reads traces produced earlier in
//! the same run.

mod generators;
mod lut;
mod pins;

pub use generators::{simulate_io, simulate_sysclock, simulate_timer, SYSCLOCK_HALF_PERIOD};
pub use lut::{simulate_lut, LutInputs, LutOutputTraces};
pub use pins::{pin_name, pin_path, pin_path_list, pin_user_name, PinAddress, PinPosition};

use log::{debug, warn};

use crate::config::TriggerIo;
use crate::connections::{lut_evaluation_order, resolve};
use crate::dso::{sampled_trace_index, DSO_EXPECTED_SAMPLED_TRACES};
use crate::error::Error;
use crate::trace::{post_extend_trace_to, Edge, Sample, SampleTime, Snapshot, Trace};
use crate::units::*;

/// State of one simulation run.
#[derive(Clone, Debug, Default)]
pub struct Sim {
    pub trigger_io: TriggerIo,
    /// Captured pin traces in DSO order. Read only.
    pub sampled_traces: Snapshot,
    pub l0_traces: Vec<Trace>,
    pub l1_luts: Vec<LutOutputTraces>,
    pub l2_luts: Vec<LutOutputTraces>,
    pub l3_traces: Vec<Trace>,
}

impl Sim {
    pub fn new(trigger_io: TriggerIo) -> Self {
        Self::with_sampled_traces(trigger_io, Snapshot::new())
    }

    pub fn with_sampled_traces(trigger_io: TriggerIo, sampled_traces: Snapshot) -> Self {
        let mut sim = Self {
            trigger_io,
            sampled_traces,
            ..Default::default()
        };
        sim.clear_traces();
        sim
    }

    /// Drops all generated traces, keeping the sampled ones.
    pub fn clear_traces(&mut self) {
        self.l0_traces = vec![Trace::new(); level0::OUTPUT_COUNT];
        self.l1_luts = vec![LutOutputTraces::default(); level1::LUT_COUNT];
        self.l2_luts = vec![LutOutputTraces::default(); level2::LUT_COUNT];
        self.l3_traces = vec![Trace::new(); level3::UNIT_COUNT];
    }

    /// Output trace of a unit, or of a LUT output when `address.level` is 1
    /// or 2.
    pub fn lookup_output_trace(&self, address: UnitAddress) -> Option<&Trace> {
        match address.level {
            0 => self.l0_traces.get(address.unit),
            1 => self
                .l1_luts
                .get(address.unit)
                .and_then(|outputs| outputs.get(address.subunit)),
            2 => self
                .l2_luts
                .get(address.unit)
                .and_then(|outputs| outputs.get(address.subunit)),
            3 => self.l3_traces.get(address.unit),
            _ => None,
        }
    }

    /// Trace seen at a pin. Level0 inputs are the sampled traces, any other
    /// input is the output trace of its source. `Ok(None)` for pins without
    /// a trace, e.g. an unconnected counter latch.
    pub fn lookup_trace(&self, pin: &PinAddress) -> Result<Option<&Trace>, Error> {
        if pin.position == PinPosition::Output {
            return Ok(self.lookup_output_trace(pin.unit));
        }
        if pin.unit.level == 0 {
            return Ok(sampled_trace_index(pin.unit.unit).and_then(|i| self.sampled_traces.get(i)));
        }
        Ok(resolve(&self.trigger_io, pin.unit)?.and_then(|source| self.lookup_output_trace(source)))
    }

    fn source_trace(&self, input: UnitAddress) -> Result<Option<&Trace>, Error> {
        match resolve(&self.trigger_io, input)? {
            Some(source) => Ok(Some(self.lookup_output_trace(source).unwrap_or_else(|| {
                panic!("{} is wired to {} which has no trace", input, source)
            }))),
            None => Ok(None),
        }
    }

    fn simulate_lut_level(&mut self, level: usize, maxtime: SampleTime) -> Result<(), Error> {
        let input_count = if level == 1 {
            LUT_INPUT_BITS
        } else {
            LUT_INPUT_BITS + 1
        };

        for unit in lut_evaluation_order(&self.trigger_io, level)? {
            debug!("simulating L{}.LUT{}", level, unit);
            let outputs = {
                let mut inputs: LutInputs = [None; LUT_INPUT_BITS + 1];
                for (input, slot) in inputs.iter_mut().enumerate().take(input_count) {
                    *slot = self
                        .source_trace(UnitAddress::new(level, unit, input))?
                        .map(Vec::as_slice);
                }
                let lut = match level {
                    1 => &self.trigger_io.l1.luts[unit],
                    _ => &self.trigger_io.l2.luts[unit],
                };
                simulate_lut(lut, &inputs, maxtime)
            };
            match level {
                1 => self.l1_luts[unit] = outputs,
                _ => self.l2_luts[unit] = outputs,
            }
        }
        Ok(())
    }

    fn simulate_level0(&mut self, maxtime: SampleTime) {
        let cfg = &self.trigger_io.l0;

        for (unit, trace) in self.l0_traces.iter_mut().enumerate() {
            let sampled = sampled_trace_index(unit).and_then(|i| self.sampled_traces.get(i));
            *trace = match level0::unit_kind(unit) {
                Some(level0::Unit::Timer(i)) if cfg.timers[i].soft_activate => {
                    simulate_timer(&cfg.timers[i], maxtime)
                }
                Some(level0::Unit::Timer(_)) => {
                    let mut flat = vec![Sample::new(SampleTime::ZERO, Edge::Falling)];
                    post_extend_trace_to(&mut flat, maxtime);
                    flat
                }
                Some(level0::Unit::Sysclock) => simulate_sysclock(maxtime),
                Some(level0::Unit::Nim(i)) => sampled
                    .map(|input| simulate_io(&cfg.io_nim[i], input, maxtime))
                    .unwrap_or_default(),
                Some(level0::Unit::IrqInput(i)) => sampled
                    .map(|input| simulate_io(&cfg.io_irq[i], input, maxtime))
                    .unwrap_or_default(),
                // Units without a generator show what was captured on them.
                _ => sampled.cloned().unwrap_or_default(),
            };
        }
    }

    fn simulate_level3(&mut self, maxtime: SampleTime) -> Result<(), Error> {
        for unit in level3::NIM_IO_OFFSET..level3::UNIT_COUNT {
            let io = match level3::unit_kind(unit) {
                Some(level3::Unit::Nim(i)) => &self.trigger_io.l0.io_nim[i],
                Some(level3::Unit::Ecl(i)) => &self.trigger_io.l3.io_ecl[i],
                _ => continue,
            };
            let output = self
                .source_trace(UnitAddress::unit(3, unit))?
                .map(|input| simulate_io(io, input, maxtime))
                .unwrap_or_default();
            self.l3_traces[unit] = output;
        }
        Ok(())
    }

    /// Runs the whole system up to `maxtime`, replacing all generated
    /// traces.
    pub fn simulate(&mut self, maxtime: SampleTime) -> Result<(), Error> {
        self.clear_traces();

        if self.sampled_traces.len() < DSO_EXPECTED_SAMPLED_TRACES {
            warn!(
                "got {} sampled traces, expected {}; missing pins stay empty",
                self.sampled_traces.len(),
                DSO_EXPECTED_SAMPLED_TRACES
            );
        }

        debug!("simulating up to {}", maxtime);
        self.simulate_level0(maxtime);
        self.simulate_lut_level(1, maxtime)?;
        self.simulate_lut_level(2, maxtime)?;
        self.simulate_level3(maxtime)
    }
}

pub fn simulate(sim: &mut Sim, maxtime: SampleTime) -> Result<(), Error> {
    sim.simulate(maxtime)
}

/// Every output pin that carries a generated trace, level by level.
pub fn output_pins() -> impl Iterator<Item = PinAddress> {
    let l0 = (0..level0::OUTPUT_COUNT).map(|unit| UnitAddress::unit(0, unit));
    let luts = |level: usize, count: usize| {
        (0..count).flat_map(move |unit| {
            (0..=LUT_STROBE_OUTPUT).map(move |output| UnitAddress::new(level, unit, output))
        })
    };
    let l3 = (level3::NIM_IO_OFFSET..level3::UNIT_COUNT).map(|unit| UnitAddress::unit(3, unit));
    l0.chain(luts(1, level1::LUT_COUNT))
        .chain(luts(2, level2::LUT_COUNT))
        .chain(l3)
        .map(PinAddress::output)
}
