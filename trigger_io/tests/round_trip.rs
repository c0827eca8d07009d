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

//! Random configurations survive generating and parsing a script.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use trigger_io::connections::{dynamic_input_choices, level3_not_connected_value};
use trigger_io::units::{level0, level3, LUT_OUTPUT_BITS, LUT_STROBE_INPUT};
use trigger_io::*;

fn random_io<R: Rng>(rng: &mut R) -> Io {
    Io {
        delay: rng.gen(),
        width: rng.gen(),
        holdoff: rng.gen(),
        invert: rng.gen(),
        ..Default::default()
    }
}

fn random_selector<R: Rng>(rng: &mut R, address: UnitAddress) -> u16 {
    let choices = dynamic_input_choices(address).map_or(1, <[_]>::len) as u16;
    match level3_not_connected_value(address.unit, address.subunit) {
        Some(not_connected) if address.level == 3 && rng.gen_bool(0.2) => not_connected,
        _ => rng.gen_range(0..choices),
    }
}

fn random_config<R: Rng>(rng: &mut R) -> TriggerIo {
    let mut cfg = TriggerIo::default();

    for timer in cfg.l0.timers.iter_mut() {
        *timer = Timer {
            range: [TimerRange::Ns, TimerRange::Us, TimerRange::Ms, TimerRange::S]
                [rng.gen_range(0..4)],
            delay_ns: rng.gen(),
            period: rng.gen(),
            soft_activate: rng.gen(),
        };
    }
    for resource in cfg.l0.trigger_resources.iter_mut() {
        *resource = match rng.gen_range(0..3) {
            0 => TriggerResource::Irq {
                irq_index: rng.gen_range(0..7),
            },
            1 => TriggerResource::SoftTrigger,
            _ => TriggerResource::SlaveTrigger {
                gate_generator: random_io(rng),
                trigger_index: rng.gen_range(0..4),
            },
        };
    }
    for busy in cfg.l0.stack_busy.iter_mut() {
        busy.stack_index = rng.gen_range(0..16);
    }
    for io in cfg.l0.io_nim.iter_mut() {
        *io = Io {
            direction: if rng.gen() { Direction::Out } else { Direction::In },
            activate: rng.gen(),
            ..random_io(rng)
        };
    }
    for io in cfg.l0.io_irq.iter_mut() {
        *io = random_io(rng);
    }

    for lut in cfg.l1.luts.iter_mut() {
        for mapping in lut.contents.iter_mut() {
            *mapping = OutputMapping::from(rng.gen::<u64>());
        }
    }
    for (input, selector) in cfg.l1.lut2_connections.iter_mut().enumerate() {
        *selector = random_selector(rng, UnitAddress::new(1, 2, input));
    }

    for (unit, lut) in cfg.l2.luts.iter_mut().enumerate() {
        for mapping in lut.contents.iter_mut() {
            *mapping = OutputMapping::from(rng.gen::<u64>());
        }
        for output in 0..LUT_OUTPUT_BITS {
            lut.strobed_outputs.set(output, rng.gen());
        }
        lut.strobe_gg = Io {
            width: rng.gen_range(1..=u16::MAX),
            ..random_io(rng)
        };
        for (input, selector) in cfg.l2.lut_connections[unit].iter_mut().enumerate() {
            *selector = random_selector(rng, UnitAddress::new(2, unit, input));
        }
        cfg.l2.strobe_connections[unit] =
            random_selector(rng, UnitAddress::new(2, unit, LUT_STROBE_INPUT));
    }

    for start in cfg.l3.stack_start.iter_mut() {
        *start = StackStart {
            activate: rng.gen(),
            stack_index: rng.gen_range(0..16),
            delay_ns: rng.gen(),
        };
    }
    for trigger in cfg.l3.master_triggers.iter_mut() {
        trigger.activate = rng.gen();
    }
    for counter in cfg.l3.counters.iter_mut() {
        counter.clear_on_latch = rng.gen();
        counter.soft_activate = rng.gen();
    }
    for io in cfg.l3.io_ecl.iter_mut() {
        *io = Io {
            direction: Direction::Out,
            activate: rng.gen(),
            ..random_io(rng)
        };
    }
    for unit in 0..level3::UNIT_COUNT {
        for input in 0..level3::input_count(unit) {
            cfg.l3.connections[unit][input] =
                random_selector(rng, UnitAddress::new(3, unit, input));
        }
    }

    // Names go through set_name so that mirrored names stay in sync.
    for n in 0..8 {
        let address = match rng.gen_range(0..3) {
            0 => UnitAddress::unit(0, rng.gen_range(0..level0::OUTPUT_COUNT)),
            1 => UnitAddress::new(rng.gen_range(1..=2), rng.gen_range(0..3), rng.gen_range(0..3)),
            _ => UnitAddress::unit(3, rng.gen_range(0..level3::NIM_IO_OFFSET)),
        };
        cfg.set_name(address, &format!("signal_{}", n));
    }

    cfg
}

#[test]
fn random_configs_round_trip() {
    let _logger = env_logger::builder().is_test(true).try_init();
    let mut rng = Xoshiro256StarStar::seed_from_u64(0x87654321FEDCBA09u64);

    for round in 0..50 {
        let cfg = random_config(&mut rng);
        validate_connections(&cfg).unwrap();
        let flags = GenFlags {
            meta_include_default_unit_names: round % 2 == 0,
            group_into_stack_transaction: round % 3 == 0,
            annotate_user_names: round % 5 == 0,
        };
        let text = generate(&cfg, &flags).unwrap();
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed, cfg, "round {}", round);
        // Generation is a function of the configuration alone.
        assert_eq!(generate(&parsed, &flags).unwrap(), text);
    }
}

#[test]
fn yaml_config_round_trip() {
    let mut rng = Xoshiro256StarStar::seed_from_u64(7);
    let cfg = random_config(&mut rng);
    let yaml = cfg.to_yaml_string().unwrap();
    assert_eq!(TriggerIo::from_yaml_str(&yaml).unwrap(), cfg);
}
