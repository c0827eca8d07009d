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

use trigger_io::*;

fn sample_config() -> TriggerIo {
    let mut cfg = TriggerIo::default();
    for (unit, lut) in cfg.l1.luts.iter_mut().enumerate() {
        lut.contents[0] = OutputMapping::from_fn(|c| (c + unit) % 3 == 0);
        lut.contents[2] = OutputMapping::from_fn(|c| c.count_ones() > 2);
    }
    cfg.l2.luts[1].strobed_outputs.set(1, true);
    cfg.l0.io_nim[3].width = 40;
    cfg.l0.io_nim[3].direction = Direction::Out;
    cfg
}

fn generate_script(bench: &mut Bencher) {
    let cfg = sample_config();
    let flags = GenFlags::default();
    bench.iter(|| generate(&cfg, &flags).expect("Failed generation"));
}

fn parse_script(bench: &mut Bencher) {
    let text = generate(&sample_config(), &GenFlags::default()).expect("Failed generation");
    bench.iter(|| parse(&text).expect("Failed parse"));
    bench.bytes = text.len() as u64;
}

benchmark_group!(benches, generate_script, parse_script);
benchmark_main!(benches);
