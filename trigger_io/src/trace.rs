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

//! Digital signals as time ordered edge samples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Simulation time in picoseconds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "f64", into = "f64")]
pub struct SampleTime(pub u64);

impl SampleTime {
    pub const ZERO: SampleTime = SampleTime(0);

    pub const fn from_ns(ns: u64) -> Self {
        Self(ns * 1000)
    }

    pub const fn from_ps(ps: u64) -> Self {
        Self(ps)
    }

    pub const fn as_ps(self) -> u64 {
        self.0
    }

    pub fn as_ns(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SampleTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for SampleTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl From<f64> for SampleTime {
    fn from(ns: f64) -> Self {
        Self((ns.max(0.0) * 1000.0).round() as u64)
    }
}

impl From<SampleTime> for f64 {
    fn from(t: SampleTime) -> f64 {
        t.as_ns()
    }
}

impl fmt::Display for SampleTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ns", self.as_ns())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Falling = 0,
    Rising = 1,
    Unknown = 2,
}

impl Edge {
    pub fn invert(self) -> Self {
        match self {
            Self::Falling => Self::Rising,
            Self::Rising => Self::Falling,
            Self::Unknown => Self::Unknown,
        }
    }

    pub fn from_bit(high: bool) -> Self {
        if high {
            Self::Rising
        } else {
            Self::Falling
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Falling => write!(f, "falling"),
            Self::Rising => write!(f, "rising"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub time: SampleTime,
    pub edge: Edge,
}

impl Sample {
    pub const fn new(time: SampleTime, edge: Edge) -> Self {
        Self { time, edge }
    }
}

impl From<(u64, Edge)> for Sample {
    /// `(nanoseconds, edge)`
    fn from((ns, edge): (u64, Edge)) -> Self {
        Self::new(SampleTime::from_ns(ns), edge)
    }
}

/// Samples over time for one signal. Times never decrease.
pub type Trace = Vec<Sample>;

/// A set of traces, e.g. one capture of the DSO.
pub type Snapshot = Vec<Trace>;

/// Builds a trace from `(nanoseconds, edge)` pairs.
pub fn trace_from_ns<I: IntoIterator<Item = (u64, Edge)>>(samples: I) -> Trace {
    samples.into_iter().map(Sample::from).collect()
}

/// Edge held by the trace at time `t`, i.e. the edge of the last sample not
/// later than `t`. `None` if the trace has no such sample.
pub fn held_edge_at(trace: &[Sample], t: SampleTime) -> Option<Edge> {
    let idx = trace.partition_point(|s| s.time <= t);
    if idx == 0 {
        None
    } else {
        Some(trace[idx - 1].edge)
    }
}

/// Like `held_edge_at` but a trace starting after `t` reads as low.
pub fn edge_at(trace: &[Sample], t: SampleTime) -> Edge {
    held_edge_at(trace, t).unwrap_or(Edge::Falling)
}

/// Appends a sample holding the last edge at `extend_to`. Empty traces stay
/// empty.
pub fn post_extend_trace_to(trace: &mut Trace, extend_to: SampleTime) {
    if let Some(last) = trace.last().copied() {
        if last.time < extend_to {
            trace.push(Sample::new(extend_to, last.edge));
        }
    }
}

pub fn post_extend_traces_to<'a, I>(traces: I, extend_to: SampleTime)
where
    I: IntoIterator<Item = &'a mut Trace>,
{
    for trace in traces {
        post_extend_trace_to(trace, extend_to);
    }
}

/// Marks the span before the first sample as unknown.
pub fn pre_extend_trace(trace: &mut Trace) {
    if let Some(first) = trace.first().copied() {
        if first.time != SampleTime::ZERO {
            trace.splice(
                0..0,
                [
                    Sample::new(SampleTime::ZERO, Edge::Unknown),
                    Sample::new(first.time, Edge::Unknown),
                ],
            );
        }
    }
}

/// Pre-extends every trace whose flag in `overflows` is set.
pub fn pre_extend_traces(traces: &mut [Trace], overflows: &[bool]) {
    for (trace, _) in traces
        .iter_mut()
        .zip(overflows.iter())
        .filter(|(_, overflowed)| **overflowed)
    {
        pre_extend_trace(trace);
    }
}

/// Renders a trace as `(time, edge), ...` with times in ns and edges numeric.
pub fn format_trace(trace: &[Sample]) -> String {
    trace
        .iter()
        .map(|s| format!("({}, {})", s.time.as_ns(), s.edge as u8))
        .collect::<Vec<_>>()
        .join(", ")
}
