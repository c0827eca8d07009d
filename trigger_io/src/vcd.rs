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

use std::collections::BTreeMap;
use std::io;

use crate::dso::trace_index_to_pin_list;
use crate::sim::{output_pins, pin_path_list, PinAddress, Sim};
use crate::trace::{Edge, Trace};

pub const DEFAULT_VCD_FILE: &str = "trigger_io.vcd";
pub const DEFAULT_TOP_MODULE: &str = "trigger_io";
const DEFAULT_VCD_HEADER: &str = "trigger_io simulation VCD";

fn vcd_value(edge: Edge) -> vcd::Value {
    match edge {
        Edge::Falling => vcd::Value::V0,
        Edge::Rising => vcd::Value::V1,
        Edge::Unknown => vcd::Value::X,
    }
}

/// Declares one wire per pin, opening and closing modules so that every
/// wire sits in the scope given by its pin path.
struct ScopedDeclarations<'w, W: io::Write> {
    writer: &'w mut vcd::Writer<W>,
    scope_stack: Vec<String>,
}

impl<'w, W: io::Write> ScopedDeclarations<'w, W> {
    fn enter(&mut self, scopes: &[String]) -> io::Result<()> {
        let common = self
            .scope_stack
            .iter()
            .zip(scopes)
            .take_while(|(a, b)| a == b)
            .count();
        while self.scope_stack.len() > common {
            self.writer.upscope()?;
            self.scope_stack.pop();
        }
        for scope in &scopes[common..] {
            self.writer.add_module(scope)?;
            self.scope_stack.push(scope.clone());
        }
        Ok(())
    }

    fn add_wire(&mut self, pin: &PinAddress) -> io::Result<vcd::IdCode> {
        let mut path = pin_path_list(pin);
        let name = path.pop().unwrap_or_else(|| pin.to_string());
        self.enter(&path)?;
        self.writer.add_wire(1, &name)
    }

    fn finish(mut self) -> io::Result<()> {
        self.enter(&[])
    }
}

/// Dumps the sampled and all simulated traces of `sim` as a value change
/// dump with picosecond resolution.
///
/// Pins without any samples are dumped as unknown.
pub fn write_sim_vcd<W: io::Write>(sim: &Sim, output: W) -> io::Result<()> {
    let mut writer = vcd::Writer::new(output);
    writer.comment(DEFAULT_VCD_HEADER)?;
    writer.date(chrono::Utc::now().to_string().as_str())?;
    writer.timescale(1, vcd::TimescaleUnit::PS)?;
    writer.add_module(DEFAULT_TOP_MODULE)?;

    let empty = Trace::new();
    let sampled = trace_index_to_pin_list()
        .iter()
        .enumerate()
        .map(|(index, pin)| (*pin, sim.sampled_traces.get(index).unwrap_or(&empty)));
    let simulated =
        output_pins().map(|pin| (pin, sim.lookup_output_trace(pin.unit).unwrap_or(&empty)));

    let mut signals: Vec<(vcd::IdCode, &Trace)> = Vec::new();
    {
        let mut decls = ScopedDeclarations {
            writer: &mut writer,
            scope_stack: Vec::new(),
        };
        for (pin, trace) in sampled.chain(simulated) {
            signals.push((decls.add_wire(&pin)?, trace));
        }
        decls.finish()?;
    }
    writer.upscope()?;
    writer.enddefinitions()?;

    // Later samples at the same time replace earlier ones.
    let mut changes: BTreeMap<u64, BTreeMap<usize, Edge>> = BTreeMap::new();
    for (signal, (_, trace)) in signals.iter().enumerate() {
        if trace.is_empty() {
            changes.entry(0).or_default().insert(signal, Edge::Unknown);
        }
        for sample in trace.iter() {
            changes
                .entry(sample.time.as_ps())
                .or_default()
                .insert(signal, sample.edge);
        }
    }

    let mut last: Vec<Option<Edge>> = vec![None; signals.len()];
    for (time, edges) in changes {
        writer.timestamp(time)?;
        for (signal, edge) in edges {
            if last[signal] != Some(edge) {
                writer.change_scalar(signals[signal].0, vcd_value(edge))?;
                last[signal] = Some(edge);
            }
        }
    }
    log::debug!("wrote {} VCD signals", signals.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerIo;
    use crate::trace::SampleTime;

    #[test]
    fn dump_contains_scopes_and_changes() {
        let mut cfg = TriggerIo::default();
        cfg.l0.timers[0].soft_activate = true;
        cfg.l0.timers[0].period = 100;
        let mut sim = Sim::new(cfg);
        sim.simulate(SampleTime::from_ns(200)).unwrap();

        let mut out = Vec::new();
        write_sim_vcd(&sim, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("$timescale 1 ps $end"));
        assert!(text.contains("$scope module sampled $end"));
        assert!(text.contains("$scope module LUT6 $end"));
        assert!(text.contains("timer0 $end"));
        assert!(text.contains("strobeOut $end"));
        assert!(text.contains("#50000"));
        assert!(text.contains("#100000"));
    }
}
