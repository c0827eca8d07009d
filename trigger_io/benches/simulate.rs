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

use bencher::Bencher;
use bencher::{benchmark_group, benchmark_main};

use trigger_io::dso::DSO_EXPECTED_SAMPLED_TRACES;
use trigger_io::trace::trace_from_ns;
use trigger_io::units::level3;
use trigger_io::*;

// NIM0 pulses every 100ns, shaped, combined in both LUT levels and
// routed to NIM1 and ECL0.
fn busy_setup(pulses: u64) -> (TriggerIo, Snapshot) {
    let mut cfg = TriggerIo::default();
    cfg.l0.timers[0].soft_activate = true;
    cfg.l0.timers[0].period = 40;
    cfg.l0.io_nim[0].width = 30;
    cfg.l1.luts[0].contents[0] = OutputMapping::from_fn(|c| c & 1 != 0);
    cfg.l1.luts[3].contents[0] = OutputMapping::from_fn(|c| c & 1 != 0);
    cfg.l2.luts[0].contents[0] = OutputMapping::from_fn(|c| c & (1 << 3) != 0 || c & 1 != 0);
    cfg.l2.luts[0].strobed_outputs.set(0, true);
    cfg.l3.connections[level3::NIM_IO_OFFSET + 1][0] = 0;
    cfg.l3.connections[level3::ECL_OFFSET][0] = 0;

    let mut nim0 = vec![(0, Edge::Falling)];
    for pulse in 0..pulses {
        nim0.push((pulse * 100 + 10, Edge::Rising));
        nim0.push((pulse * 100 + 60, Edge::Falling));
    }
    let mut traces = vec![trace_from_ns([(0, Edge::Falling)]); DSO_EXPECTED_SAMPLED_TRACES];
    traces[0] = trace_from_ns(nim0);
    (cfg, traces)
}

fn simulate_pulse_train(bench: &mut Bencher) {
    const PULSES: u64 = 500;
    let (cfg, traces) = busy_setup(PULSES);
    let mut sim = Sim::with_sampled_traces(cfg, traces);
    bench.iter(|| {
        sim.simulate(SampleTime::from_ns(PULSES * 100))
            .expect("Failed simulation");
    });
}

fn simulate_idle(bench: &mut Bencher) {
    let mut sim = Sim::new(TriggerIo::default());
    bench.iter(|| {
        sim.simulate(SampleTime::from_ns(10_000))
            .expect("Failed simulation");
    });
}

benchmark_group!(benches, simulate_pulse_train, simulate_idle);
benchmark_main!(benches);
