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

use super::generators::simulate_io;
use crate::config::{Lut, OutputMapping};
use crate::trace::{held_edge_at, Edge, Sample, SampleTime, Trace};
use crate::units::{LUT_INPUT_BITS, LUT_OUTPUT_BITS, LUT_STROBE_INPUT, LUT_STROBE_OUTPUT};

/// Six data inputs followed by the strobe. `None` is an unconnected input.
pub type LutInputs<'a> = [Option<&'a [Sample]>; LUT_INPUT_BITS + 1];

/// Three data outputs followed by the strobe gate generator output.
pub type LutOutputTraces = [Trace; LUT_OUTPUT_BITS + 1];

/// Input levels at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Combination {
    value: usize,
    /// Inputs holding an `Unknown` edge.
    unknown: usize,
}

fn next_sample_time(inputs: &[Option<&[Sample]>], after: SampleTime) -> Option<SampleTime> {
    inputs
        .iter()
        .flatten()
        .filter_map(|trace| {
            let idx = trace.partition_point(|s| s.time <= after);
            trace.get(idx).map(|s| s.time)
        })
        .min()
}

/// `None` if an input is unconnected or has no sample at or before `t`.
fn combination_at(inputs: &[Option<&[Sample]>], t: SampleTime) -> Option<Combination> {
    let mut combination = Combination {
        value: 0,
        unknown: 0,
    };
    for (bit, input) in inputs.iter().enumerate() {
        match held_edge_at((*input)?, t)? {
            Edge::Rising => combination.value |= 1 << bit,
            Edge::Unknown => combination.unknown |= 1 << bit,
            Edge::Falling => (),
        }
    }
    Some(combination)
}

/// The output for a combination. With unknown inputs the result is only
/// known if every assignment of them agrees.
fn evaluate(mapping: &OutputMapping, combination: Combination) -> Edge {
    let Combination { value, unknown } = combination;
    let first = mapping.test(value);
    let mut subset = unknown;
    while subset != 0 {
        if mapping.test(value | subset) != first {
            return Edge::Unknown;
        }
        subset = (subset - 1) & unknown;
    }
    Edge::from_bit(first)
}

/// New edge of each output at one point in time, `None` where a strobed
/// output holds.
fn step(
    lut: &Lut,
    combination: Combination,
    strobe: Option<Edge>,
    current: [Edge; LUT_OUTPUT_BITS],
) -> [Option<Edge>; LUT_OUTPUT_BITS] {
    std::array::from_fn(|output| {
        let edge = evaluate(&lut.contents[output], combination);
        if !lut.strobed_outputs.test(output) {
            return Some(edge);
        }
        match strobe {
            Some(Edge::Rising) => Some(edge),
            Some(Edge::Unknown) if edge != current[output] => Some(Edge::Unknown),
            _ => None,
        }
    })
}

/// Evaluates a LUT over its input traces.
///
/// Every output gets one sample for every time any data input changes.
/// Evaluation stops at the first time where an input has no known level
/// yet. `maxtime` only bounds the strobe gate generator.
///
/// The sample at t=0 is not a plain low seed. When every data input has a
/// level at t=0, it holds the output for that initial combination, so an
/// output reads as its truth table value from the very start of the trace.
/// Otherwise it stays low. Strobed outputs are only affected if the strobe
/// is high at t=0.
pub fn simulate_lut(lut: &Lut, inputs: &LutInputs, maxtime: SampleTime) -> LutOutputTraces {
    let mut outputs: LutOutputTraces = Default::default();

    if lut.strobed_outputs.any() {
        match inputs[LUT_STROBE_INPUT] {
            Some(strobe_input) => {
                outputs[LUT_STROBE_OUTPUT] = simulate_io(&lut.strobe_gg, strobe_input, maxtime);
            }
            None => log::warn!(
                "LUT has strobed outputs {:#05b} but no strobe input, they stay low",
                lut.strobed_outputs.bits()
            ),
        }
    }

    let data_inputs = &inputs[..LUT_INPUT_BITS];
    let strobe_at = |strobe: &Trace, t| {
        if strobe.is_empty() {
            None
        } else {
            held_edge_at(strobe, t)
        }
    };

    let mut current = [Edge::Falling; LUT_OUTPUT_BITS];
    for output in outputs[..LUT_OUTPUT_BITS].iter_mut() {
        output.push(Sample::new(SampleTime::ZERO, Edge::Falling));
    }

    if let Some(combination) = combination_at(data_inputs, SampleTime::ZERO) {
        let strobe = strobe_at(&outputs[LUT_STROBE_OUTPUT], SampleTime::ZERO);
        for (output, edge) in step(lut, combination, strobe, current).iter().enumerate() {
            if let Some(edge) = edge {
                outputs[output][0].edge = *edge;
                current[output] = *edge;
            }
        }
    }

    let mut t = SampleTime::ZERO;
    while let Some(next) = next_sample_time(data_inputs, t) {
        t = next;
        let combination = match combination_at(data_inputs, t) {
            Some(combination) => combination,
            None => {
                log::debug!("LUT input level unknown at {}, stopping", t);
                break;
            }
        };
        let strobe = strobe_at(&outputs[LUT_STROBE_OUTPUT], t);
        for (output, edge) in step(lut, combination, strobe, current).iter().enumerate() {
            if let Some(edge) = edge {
                if cfg!(feature = "trace-sim-samples") {
                    log::trace!("LUT out{} {} at {}", output, edge, t);
                }
                outputs[output].push(Sample::new(t, *edge));
                current[output] = *edge;
            }
        }
    }

    outputs
}
