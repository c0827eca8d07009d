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

//! Decoding of the digital storage oscilloscope (DSO) capture buffer.
//!
//! The DSO samples every NIM pin, IRQ input and Level0 utility unit. The
//! transport reading the buffer off the hardware lives elsewhere; this
//! module only turns the raw words into traces and provides the register
//! sequences to start and stop a capture.

use bitvec::prelude::*;
use once_cell::sync::Lazy;

use crate::sim::{PinAddress, PinPosition};
use crate::trace::{Edge, Sample, SampleTime, Snapshot, Trace};
use crate::units::*;

/// Longest capture window in ns. Longer windows overflow the DSO timers.
pub const DSO_MAX_MEASURE_TIME: u16 = 65500;

pub const COMBINED_TRIGGER_COUNT: usize =
    NIM_IO_COUNT + IRQ_INPUT_COUNT + level0::UTILITY_UNIT_COUNT;

/// Traces in a complete capture: NIM pins, then IRQ inputs, then the
/// Level0 utility units.
pub const DSO_EXPECTED_SAMPLED_TRACES: usize = COMBINED_TRIGGER_COUNT;

/// Unit number selecting the DSO in the select-unit register.
pub const DSO_UNIT_NUMBER: u16 = 48;

pub mod data_format {
    pub const FRAME_HEADER: u32 = 0xF3;
    pub const BLOCK_HEADER: u32 = 0xF5;
    pub const HEADER: u32 = 0x4000_0000;
    pub const EOE: u32 = 0xC000_0000;

    pub const ADDRESS_MASK: u32 = 0b11_1111;
    pub const ADDRESS_SHIFT: u32 = 17;
    pub const EDGE_MASK: u32 = 0b1;
    pub const EDGE_SHIFT: u32 = 16;
    pub const TIME_MASK: u32 = 0xffff;

    /// Time of the first sample of a channel whose FIFO overflowed.
    pub const OVERFLOW_MARKER_TIME: u16 = 1;
}

pub type CombinedTriggers = BitArr!(for COMBINED_TRIGGER_COUNT, in u64, Lsb0);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DsoSetup {
    pub pre_trigger_time: u16,
    pub post_trigger_time: u16,
    pub nim_triggers: BitArr!(for NIM_IO_COUNT, in u16, Lsb0),
    pub irq_triggers: BitArr!(for IRQ_INPUT_COUNT, in u8, Lsb0),
    pub util_triggers: BitArr!(for level0::UTILITY_UNIT_COUNT, in u16, Lsb0),
}

/// NIM, IRQ and utility trigger bits in trace order.
pub fn combined_triggers(setup: &DsoSetup) -> CombinedTriggers {
    let mut result = CombinedTriggers::default();
    let bits = setup.nim_triggers[..NIM_IO_COUNT]
        .iter()
        .by_vals()
        .chain(setup.irq_triggers[..IRQ_INPUT_COUNT].iter().by_vals())
        .chain(
            setup.util_triggers[..level0::UTILITY_UNIT_COUNT]
                .iter()
                .by_vals(),
        );
    for (index, bit) in bits.enumerate() {
        result.set(index, bit);
    }
    result
}

pub fn set_combined_triggers(setup: &mut DsoSetup, combined: &CombinedTriggers) {
    let (nim, rest) = combined[..COMBINED_TRIGGER_COUNT].split_at(NIM_IO_COUNT);
    let (irq, util) = rest.split_at(IRQ_INPUT_COUNT);
    setup.nim_triggers[..NIM_IO_COUNT].clone_from_bitslice(nim);
    setup.irq_triggers[..IRQ_INPUT_COUNT].clone_from_bitslice(irq);
    setup.util_triggers[..level0::UTILITY_UNIT_COUNT].clone_from_bitslice(util);
}

/// Receives register writes for the trigger I/O unit.
///
/// Implemented by the hardware transport.
pub trait RegisterWriter {
    fn write_register(&mut self, address: u16, value: u16) -> anyhow::Result<()>;
}

pub fn start_dso<W: RegisterWriter + ?Sized>(
    writer: &mut W,
    setup: &DsoSetup,
) -> anyhow::Result<()> {
    writer.write_register(0x0200, DSO_UNIT_NUMBER)?;
    writer.write_register(0x0300, setup.pre_trigger_time)?;
    writer.write_register(0x0302, setup.post_trigger_time)?;
    writer.write_register(0x0304, setup.nim_triggers.into_inner()[0])?;
    writer.write_register(0x0308, setup.irq_triggers.into_inner()[0] as u16)?;
    writer.write_register(0x0306, 1)
}

pub fn stop_dso<W: RegisterWriter + ?Sized>(writer: &mut W) -> anyhow::Result<()> {
    writer.write_register(0x0200, DSO_UNIT_NUMBER)?;
    writer.write_register(0x0306, 0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DsoBufferEntry {
    pub address: u8,
    pub edge: Edge,
    pub time: u16,
}

pub fn extract_dso_entry(word: u32) -> DsoBufferEntry {
    use data_format::*;
    DsoBufferEntry {
        address: ((word >> ADDRESS_SHIFT) & ADDRESS_MASK) as u8,
        edge: if (word >> EDGE_SHIFT) & EDGE_MASK != 0 {
            Edge::Rising
        } else {
            Edge::Falling
        },
        time: (word & TIME_MASK) as u16,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedSnapshot {
    pub traces: Snapshot,
    /// Traces whose first sample carried the FIFO overflow marker.
    pub overflows: Vec<bool>,
}

fn is_valid_dso_buffer(buffer: &[u32]) -> bool {
    use data_format::*;
    if buffer.len() < 4 {
        log::debug!("short DSO buffer ({} words)", buffer.len());
        return false;
    }
    if buffer[0] >> 24 != FRAME_HEADER || buffer[1] >> 24 != BLOCK_HEADER {
        log::warn!("invalid DSO frame or block header");
        return false;
    }
    if buffer[2] != HEADER || buffer[buffer.len() - 1] != EOE {
        log::warn!("invalid DSO header or end of event marker");
        return false;
    }
    true
}

/// Decodes a capture. Invalid buffers decode to an empty snapshot.
///
/// The overflow marker time of a channel's first sample is replaced by 0
/// and recorded in `overflows`.
pub fn decode_dso_buffer(buffer: &[u32]) -> DecodedSnapshot {
    let mut result = DecodedSnapshot::default();
    if !is_valid_dso_buffer(buffer) {
        return result;
    }

    for word in &buffer[3..buffer.len() - 1] {
        let entry = extract_dso_entry(*word);
        let address = entry.address as usize;
        if address >= result.traces.len() {
            result.traces.resize(address + 1, Trace::new());
            result.overflows.resize(address + 1, false);
        }

        let trace = &mut result.traces[address];
        let mut time = entry.time;
        if trace.is_empty() && time == data_format::OVERFLOW_MARKER_TIME {
            result.overflows[address] = true;
            time = 0;
        }
        trace.push(Sample::new(SampleTime::from_ns(time as u64), entry.edge));
    }

    result
}

pub fn fill_snapshot_from_dso_buffer(buffer: &[u32]) -> Snapshot {
    decode_dso_buffer(buffer).traces
}

/// Checks an undecoded trace for the overflow marker.
pub fn has_overflow_marker(trace: &[Sample]) -> bool {
    trace.first().map(|s| s.time)
        == Some(SampleTime::from_ns(data_format::OVERFLOW_MARKER_TIME as u64))
}

/// Overflowed traces lost their early history: their level is unknown up
/// to the second sample.
pub fn mark_overflowed_traces(traces: &mut [Trace], overflows: &[bool]) {
    for (trace, overflowed) in traces.iter_mut().zip(overflows) {
        if *overflowed {
            if let Some(first) = trace.first_mut() {
                first.edge = Edge::Unknown;
            }
        }
    }
}

/// Holds every non-empty trace until the end of the capture window.
/// Overflowed traces end in `Unknown`.
pub fn extend_traces_to_post_trigger(traces: &mut [Trace], setup: &DsoSetup, overflows: &[bool]) {
    let extend_to =
        SampleTime::from_ns(setup.pre_trigger_time as u64 + setup.post_trigger_time as u64);
    for (index, trace) in traces.iter_mut().enumerate() {
        if let Some(last) = trace.last().copied() {
            if last.time < extend_to {
                let edge = if overflows.get(index).copied().unwrap_or(false) {
                    Edge::Unknown
                } else {
                    last.edge
                };
                trace.push(Sample::new(extend_to, edge));
            }
        }
    }
}

/// Offset in ns of the trigger edge closest to the pre-trigger time,
/// reduced to the 3 low bits and signed. 0 without any trigger edge.
pub fn calculate_jitter_value(traces: &[Trace], setup: &DsoSetup) -> i64 {
    let triggers = combined_triggers(setup);
    let pre_trigger = SampleTime::from_ns(setup.pre_trigger_time as u64).as_ps() as i64;

    let closest = traces
        .iter()
        .enumerate()
        .filter(|(index, _)| *index < COMBINED_TRIGGER_COUNT && triggers[*index])
        .flat_map(|(_, trace)| trace.iter())
        .filter(|s| s.edge == Edge::Rising)
        .map(|s| (s.time.as_ps() as i64 - pre_trigger) / 1000)
        .min_by_key(|offset| offset.abs());

    match closest {
        Some(offset) => (offset.abs() & 0b111) * offset.signum(),
        None => 0,
    }
}

/// Shifts every sample after t=0 by the jitter value.
pub fn jitter_correct_dso_snapshot(traces: &mut [Trace], setup: &DsoSetup) {
    let jitter = calculate_jitter_value(traces, setup);
    if jitter == 0 {
        return;
    }
    log::debug!("correcting DSO jitter of {}ns", jitter);
    for sample in traces.iter_mut().flat_map(|t| t.iter_mut()) {
        if sample.time != SampleTime::ZERO {
            let ps = sample.time.as_ps() as i64 - jitter * 1000;
            sample.time = SampleTime::from_ps(ps.max(0) as u64);
        }
    }
}

/// Position of a Level0 unit's capture in a snapshot.
pub fn sampled_trace_index(unit: usize) -> Option<usize> {
    match level0::unit_kind(unit)? {
        level0::Unit::Nim(i) => Some(i),
        level0::Unit::IrqInput(i) => Some(NIM_IO_COUNT + i),
        _ => Some(NIM_IO_COUNT + IRQ_INPUT_COUNT + unit),
    }
}

static TRACE_INDEX_TO_PIN_LIST: Lazy<Vec<PinAddress>> = Lazy::new(|| {
    let unsampled = PinAddress::new(UnitAddress::default(), PinPosition::Input);
    let mut pins = vec![unsampled; DSO_EXPECTED_SAMPLED_TRACES];
    for unit in 0..level0::OUTPUT_COUNT {
        if let Some(index) = sampled_trace_index(unit) {
            pins[index] = PinAddress::new(UnitAddress::unit(0, unit), PinPosition::Input);
        }
    }
    pins
});

/// The sampled pins in snapshot order.
pub fn trace_index_to_pin_list() -> &'static [PinAddress] {
    &TRACE_INDEX_TO_PIN_LIST
}

pub fn get_trace_index(pin: &PinAddress) -> Option<usize> {
    TRACE_INDEX_TO_PIN_LIST.iter().position(|p| p == pin)
}

/// Default name of the unit behind a combined trigger bit.
pub fn get_trigger_default_name(index: usize) -> Option<&'static str> {
    let pin = TRACE_INDEX_TO_PIN_LIST.get(index)?;
    level0::DEFAULT_UNIT_NAMES
        .get(pin.unit.unit)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::trace_from_ns;

    fn data_word(address: u32, edge: u32, time: u32) -> u32 {
        (address << 17) | (edge << 16) | time
    }

    fn frame(words: &[u32]) -> Vec<u32> {
        let mut buffer = vec![0xF300_0000, 0xF500_0000, data_format::HEADER];
        buffer.extend_from_slice(words);
        buffer.push(data_format::EOE);
        buffer
    }

    #[test]
    fn decode_buffer() {
        let buffer = frame(&[
            data_word(0, 0, 0),
            data_word(2, 0, 1),
            data_word(0, 1, 15),
            data_word(2, 1, 30),
            data_word(0, 0, 40),
        ]);
        let decoded = decode_dso_buffer(&buffer);
        assert_eq!(decoded.traces.len(), 3);
        assert_eq!(
            decoded.traces[0],
            trace_from_ns([(0, Edge::Falling), (15, Edge::Rising), (40, Edge::Falling)])
        );
        assert!(decoded.traces[1].is_empty());
        assert_eq!(
            decoded.traces[2],
            trace_from_ns([(0, Edge::Falling), (30, Edge::Rising)])
        );
        assert_eq!(decoded.overflows, vec![false, false, true]);
    }

    #[test]
    fn invalid_buffers_decode_empty() {
        assert!(fill_snapshot_from_dso_buffer(&[]).is_empty());
        assert!(fill_snapshot_from_dso_buffer(&[0xF300_0000, 0xF500_0000, data_format::HEADER])
            .is_empty());
        let mut buffer = frame(&[data_word(0, 0, 0)]);
        buffer[0] = 0xF400_0000;
        assert!(fill_snapshot_from_dso_buffer(&buffer).is_empty());
        let mut buffer = frame(&[data_word(0, 0, 0)]);
        buffer.pop();
        assert!(fill_snapshot_from_dso_buffer(&buffer).is_empty());
    }

    #[test]
    fn post_trigger_extension() {
        let setup = DsoSetup {
            pre_trigger_time: 100,
            post_trigger_time: 200,
            ..Default::default()
        };
        let mut traces = vec![
            trace_from_ns([(0, Edge::Falling), (120, Edge::Rising)]),
            trace_from_ns([(0, Edge::Rising)]),
            Trace::new(),
        ];
        let overflows = vec![false, true, false];
        mark_overflowed_traces(&mut traces, &overflows);
        extend_traces_to_post_trigger(&mut traces, &setup, &overflows);
        assert_eq!(traces[0].last(), Some(&Sample::from((300, Edge::Rising))));
        assert_eq!(
            traces[1],
            trace_from_ns([(0, Edge::Unknown), (300, Edge::Unknown)])
        );
        assert!(traces[2].is_empty());
    }

    #[test]
    fn jitter() {
        let mut setup = DsoSetup {
            pre_trigger_time: 100,
            ..Default::default()
        };
        setup.nim_triggers.set(1, true);
        let mut traces = vec![
            trace_from_ns([(0, Edge::Falling), (97, Edge::Rising)]),
            trace_from_ns([(0, Edge::Falling), (50, Edge::Rising), (103, Edge::Rising)]),
        ];
        assert_eq!(calculate_jitter_value(&traces, &setup), 3);
        jitter_correct_dso_snapshot(&mut traces, &setup);
        assert_eq!(traces[1][2].time, SampleTime::from_ns(100));
        assert_eq!(traces[0][0].time, SampleTime::ZERO);

        setup.nim_triggers.set(1, false);
        assert_eq!(calculate_jitter_value(&traces, &setup), 0);
    }

    #[test]
    fn combined_trigger_bits() {
        let mut setup = DsoSetup::default();
        setup.nim_triggers.set(13, true);
        setup.irq_triggers.set(0, true);
        setup.util_triggers.set(15, true);
        let combined = combined_triggers(&setup);
        assert_eq!(combined.iter_ones().collect::<Vec<_>>(), vec![13, 14, 35]);

        let mut other = DsoSetup::default();
        set_combined_triggers(&mut other, &combined);
        assert_eq!(other, setup);
    }

    #[test]
    fn trace_order() {
        let pins = trace_index_to_pin_list();
        assert_eq!(pins.len(), DSO_EXPECTED_SAMPLED_TRACES);
        assert_eq!(pins[0].unit, UnitAddress::unit(0, level0::NIM_IO_OFFSET));
        assert_eq!(pins[14].unit, UnitAddress::unit(0, level0::IRQ_INPUT_OFFSET));
        assert_eq!(pins[20].unit, UnitAddress::unit(0, 0));
        assert_eq!(get_trace_index(&pins[25]), Some(25));
        assert_eq!(get_trigger_default_name(14), Some("irq_input0"));
        assert_eq!(get_trigger_default_name(34), Some("sysclock"));
    }

    struct Recorder(Vec<(u16, u16)>);

    impl RegisterWriter for Recorder {
        fn write_register(&mut self, address: u16, value: u16) -> anyhow::Result<()> {
            self.0.push((address, value));
            Ok(())
        }
    }

    #[test]
    fn start_stop_sequences() {
        let mut setup = DsoSetup {
            pre_trigger_time: 200,
            post_trigger_time: 500,
            ..Default::default()
        };
        setup.nim_triggers.set(2, true);
        setup.irq_triggers.set(1, true);
        let mut recorder = Recorder(Vec::new());
        start_dso(&mut recorder, &setup).unwrap();
        stop_dso(&mut recorder).unwrap();
        assert_eq!(
            recorder.0,
            vec![
                (0x0200, 48),
                (0x0300, 200),
                (0x0302, 500),
                (0x0304, 0b100),
                (0x0308, 0b10),
                (0x0306, 1),
                (0x0200, 48),
                (0x0306, 0)
            ]
        );
    }
}
