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

//! Gate generators, timers and the system clock.

use crate::config::{Io, Timer};
use crate::trace::{post_extend_trace_to, Edge, Sample, SampleTime, Trace};

/// Half of the 62.5 ns system clock period.
pub const SYSCLOCK_HALF_PERIOD: SampleTime = SampleTime::from_ps(31_250);

fn ns(value: u16) -> SampleTime {
    SampleTime::from_ns(value as u64)
}

/// Runs a gate generator over `input`.
///
/// In level mode the input is copied, optionally inverted and held until
/// `maxtime`. In pulse mode every triggering edge outside the holdoff
/// window produces one pulse of `io.width` after `io.delay`. A rising edge
/// at t=0 triggers a non-inverted generator.
pub fn simulate_io(io: &Io, input: &[Sample], maxtime: SampleTime) -> Trace {
    if io.is_level_mode() {
        let mut output: Trace = input
            .iter()
            .map(|s| {
                let edge = if io.invert { s.edge.invert() } else { s.edge };
                Sample::new(s.time, edge)
            })
            .collect();
        post_extend_trace_to(&mut output, maxtime);
        return output;
    }

    let trigger_edge = if io.invert {
        Edge::Falling
    } else {
        Edge::Rising
    };
    let mut output = vec![Sample::new(SampleTime::ZERO, Edge::Falling)];
    let mut holdoff_until: Option<SampleTime> = None;

    for sample in input {
        if sample.edge != trigger_edge {
            continue;
        }
        // The initial low level of a timeline is not a falling edge.
        if io.invert && sample.time == SampleTime::ZERO {
            continue;
        }
        if matches!(holdoff_until, Some(until) if sample.time <= until) {
            continue;
        }

        let pulse_start = sample.time + ns(io.delay);
        let pulse_end = pulse_start + ns(io.width);
        output.push(Sample::new(pulse_start, Edge::Rising));
        output.push(Sample::new(pulse_end, Edge::Falling));
        holdoff_until = Some(pulse_end.max(sample.time + ns(io.holdoff)));

        if pulse_end >= maxtime {
            break;
        }
    }

    output
}

fn square_wave(first_rising: SampleTime, half_period: SampleTime, maxtime: SampleTime) -> Trace {
    let mut output = vec![
        Sample::new(SampleTime::ZERO, Edge::Falling),
        Sample::new(first_rising, Edge::Rising),
        Sample::new(first_rising + half_period, Edge::Falling),
    ];
    while let Some(last) = output.last().copied() {
        if last.time >= maxtime {
            break;
        }
        output.push(Sample::new(last.time + half_period, last.edge.invert()));
    }
    output
}

/// Periodic output of a timer, starting `delay_ns` after t=0.
pub fn simulate_timer(timer: &Timer, maxtime: SampleTime) -> Trace {
    let period_ns = (timer.period as u64 * timer.range.factor_ns()).max(Timer::MIN_PERIOD_NS);
    let half_period = SampleTime::from_ps(period_ns * 1000 / 2);
    square_wave(ns(timer.delay_ns), half_period, maxtime)
}

pub fn simulate_sysclock(maxtime: SampleTime) -> Trace {
    square_wave(SYSCLOCK_HALF_PERIOD, SYSCLOCK_HALF_PERIOD, maxtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimerRange;
    use crate::trace::trace_from_ns;

    fn gg(delay: u16, width: u16, holdoff: u16, invert: bool) -> Io {
        Io {
            delay,
            width,
            holdoff,
            invert,
            ..Default::default()
        }
    }

    #[test]
    fn pulse_after_delay() {
        let input = trace_from_ns([(0, Edge::Falling), (15, Edge::Rising), (40, Edge::Falling)]);
        let output = simulate_io(&gg(10, 20, 0, false), &input, SampleTime::from_ns(100));
        assert_eq!(
            output,
            trace_from_ns([(0, Edge::Falling), (25, Edge::Rising), (45, Edge::Falling)])
        );
    }

    #[test]
    fn holdoff_swallows_close_edges() {
        let input = trace_from_ns([
            (0, Edge::Falling),
            (10, Edge::Rising),
            (15, Edge::Falling),
            (30, Edge::Rising),
            (35, Edge::Falling),
            (70, Edge::Rising),
            (75, Edge::Falling),
        ]);
        let output = simulate_io(&gg(0, 10, 50, false), &input, SampleTime::from_ns(200));
        assert_eq!(
            output,
            trace_from_ns([
                (0, Edge::Falling),
                (10, Edge::Rising),
                (20, Edge::Falling),
                (70, Edge::Rising),
                (80, Edge::Falling)
            ])
        );
    }

    #[test]
    fn inverted_pulse_ignores_initial_sample() {
        let input = trace_from_ns([(0, Edge::Falling), (20, Edge::Rising), (30, Edge::Falling)]);
        let output = simulate_io(&gg(0, 5, 0, true), &input, SampleTime::from_ns(100));
        assert_eq!(
            output,
            trace_from_ns([(0, Edge::Falling), (30, Edge::Rising), (35, Edge::Falling)])
        );
    }

    #[test]
    fn pulses_stop_at_maxtime() {
        let input = trace_from_ns([
            (0, Edge::Falling),
            (50, Edge::Rising),
            (60, Edge::Falling),
            (150, Edge::Rising),
        ]);
        let output = simulate_io(&gg(0, 60, 0, false), &input, SampleTime::from_ns(100));
        assert_eq!(
            output,
            trace_from_ns([(0, Edge::Falling), (50, Edge::Rising), (110, Edge::Falling)])
        );
    }

    #[test]
    fn level_mode_copies_and_extends() {
        let input = trace_from_ns([(0, Edge::Falling), (15, Edge::Rising), (40, Edge::Unknown)]);
        let output = simulate_io(&gg(0, 0, 0, true), &input, SampleTime::from_ns(100));
        assert_eq!(
            output,
            trace_from_ns([
                (0, Edge::Rising),
                (15, Edge::Falling),
                (40, Edge::Unknown),
                (100, Edge::Unknown)
            ])
        );
        assert!(simulate_io(&gg(0, 0, 0, false), &[], SampleTime::from_ns(100)).is_empty());
    }

    #[test]
    fn timer_period() {
        let timer = Timer {
            range: TimerRange::Ns,
            delay_ns: 5,
            period: 100,
            soft_activate: true,
        };
        let output = simulate_timer(&timer, SampleTime::from_ns(200));
        assert_eq!(
            output,
            trace_from_ns([
                (0, Edge::Falling),
                (5, Edge::Rising),
                (55, Edge::Falling),
                (105, Edge::Rising),
                (155, Edge::Falling),
                (205, Edge::Rising)
            ])
        );
    }

    #[test]
    fn timer_range_and_minimum_period() {
        let timer = Timer {
            range: TimerRange::Us,
            period: 1,
            ..Default::default()
        };
        let output = simulate_timer(&timer, SampleTime::from_ns(1000));
        assert_eq!(output[2], Sample::from((500, Edge::Falling)));

        let stuck = Timer::default();
        let output = simulate_timer(&stuck, SampleTime::from_ns(100));
        assert_eq!(output[2].time, SampleTime::from_ns(Timer::MIN_PERIOD_NS / 2));
        assert!(output.last().unwrap().time >= SampleTime::from_ns(100));
    }

    #[test]
    fn sysclock() {
        let output = simulate_sysclock(SampleTime::from_ns(100));
        assert_eq!(output[0], Sample::new(SampleTime::ZERO, Edge::Falling));
        assert_eq!(output[1], Sample::new(SampleTime::from_ps(31_250), Edge::Rising));
        assert_eq!(output[2], Sample::new(SampleTime::from_ps(62_500), Edge::Falling));
        assert_eq!(output[3], Sample::new(SampleTime::from_ps(93_750), Edge::Rising));
        assert_eq!(output.last().unwrap().time, SampleTime::from_ps(125_000));
        assert!(output.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn rising_edge_at_zero_triggers() {
        let gen = gg(0, 10, 0, false);
        let maxtime = SampleTime::from_ns(100);
        let expected = trace_from_ns([(0, Edge::Falling), (0, Edge::Rising), (10, Edge::Falling)]);

        let input = trace_from_ns([(0, Edge::Falling), (0, Edge::Rising), (50, Edge::Falling)]);
        assert_eq!(simulate_io(&gen, &input, maxtime), expected);

        let input = trace_from_ns([(0, Edge::Rising), (50, Edge::Falling)]);
        assert_eq!(simulate_io(&gen, &input, maxtime), expected);
    }

    #[test]
    fn sysclock_strobes_from_first_edge() {
        let output = simulate_io(
            &gg(0, 8, 0, false),
            &simulate_sysclock(SampleTime::from_ns(100)),
            SampleTime::from_ns(100),
        );
        assert_eq!(output[1], Sample::new(SampleTime::from_ps(31_250), Edge::Rising));
        assert_eq!(output[2], Sample::new(SampleTime::from_ps(39_250), Edge::Falling));
    }
}
