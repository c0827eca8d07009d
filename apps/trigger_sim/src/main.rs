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

//! Generates, parses and simulates MVLC trigger I/O setups.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use env_logger::Target;
use structopt::StructOpt;

use trigger_io::dso::{
    decode_dso_buffer, extend_traces_to_post_trigger, jitter_correct_dso_snapshot,
    mark_overflowed_traces, set_combined_triggers, CombinedTriggers, COMBINED_TRIGGER_COUNT,
};
use trigger_io::sim::{output_pins, pin_path, pin_user_name};
use trigger_io::trace::format_trace;
use trigger_io::{DsoSetup, GenFlags, SampleTime, Sim, Snapshot, TriggerIo};

#[derive(StructOpt)]
#[structopt(name = "trigger_sim", about = "MVLC trigger I/O scripts and simulation")]
enum Command {
    /// Writes the register script of a YAML configuration
    Generate {
        config: PathBuf,
        #[structopt(short, long)]
        output: Option<PathBuf>,
        /// Wrap every unit into a stack transaction
        #[structopt(long)]
        stack_transactions: bool,
        /// Put default unit names into the meta block too
        #[structopt(long)]
        all_names: bool,
        /// Mention user names in the unit comments
        #[structopt(long)]
        annotate: bool,
    },
    /// Turns a register script back into a YAML configuration
    Parse {
        script: PathBuf,
        #[structopt(short, long)]
        output: Option<PathBuf>,
    },
    /// Runs a configuration (script or YAML) on captured traces
    Simulate {
        config: PathBuf,
        /// Sampled traces as YAML, in DSO trace order
        #[structopt(long, conflicts_with = "dso")]
        traces: Option<PathBuf>,
        /// Raw DSO buffer, one hex word per line
        #[structopt(long)]
        dso: Option<PathBuf>,
        #[structopt(long, default_value = "200")]
        pre_trigger: u16,
        #[structopt(long, default_value = "800")]
        post_trigger: u16,
        /// Combined trigger indices used for jitter correction
        #[structopt(long)]
        trigger: Vec<usize>,
        /// End of the simulation in ns. Defaults to the capture window.
        #[structopt(long)]
        maxtime_ns: Option<u64>,
        #[structopt(long)]
        vcd: Option<PathBuf>,
    },
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn load_config(path: &Path) -> anyhow::Result<TriggerIo> {
    if is_yaml(path) {
        return TriggerIo::from_yaml_file(path);
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(trigger_io::script::parse_named(&path.display().to_string(), &text)?)
}

fn write_output(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
        }
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

fn read_dso_buffer(path: &Path) -> anyhow::Result<Vec<u32>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    text.split_whitespace()
        .map(|word| {
            let digits = word.trim_start_matches("0x").trim_start_matches("0X");
            u32::from_str_radix(digits, 16)
                .with_context(|| format!("Invalid DSO buffer word '{}'", word))
        })
        .collect()
}

fn load_dso_snapshot(path: &Path, setup: &DsoSetup) -> anyhow::Result<Snapshot> {
    let buffer = read_dso_buffer(path)?;
    let decoded = decode_dso_buffer(&buffer);
    if decoded.traces.is_empty() {
        bail!("{} holds no usable DSO data", path.display());
    }
    let mut traces = decoded.traces;
    mark_overflowed_traces(&mut traces, &decoded.overflows);
    jitter_correct_dso_snapshot(&mut traces, setup);
    extend_traces_to_post_trigger(&mut traces, setup, &decoded.overflows);
    Ok(traces)
}

fn print_traces(sim: &Sim) {
    for pin in output_pins() {
        let trace = match sim.lookup_output_trace(pin.unit) {
            Some(trace) => trace,
            None => continue,
        };
        println!(
            "{:<24} {:<20} {}",
            pin_path(&pin),
            pin_user_name(&sim.trigger_io, &pin),
            format_trace(trace)
        );
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Generate {
            config,
            output,
            stack_transactions,
            all_names,
            annotate,
        } => {
            let cfg = TriggerIo::from_yaml_file(&config)?;
            let flags = GenFlags {
                meta_include_default_unit_names: all_names,
                group_into_stack_transaction: stack_transactions,
                annotate_user_names: annotate,
            };
            let script = trigger_io::generate(&cfg, &flags)?;
            write_output(output.as_deref(), &script)
        }
        Command::Parse { script, output } => {
            let cfg = load_config(&script)?;
            write_output(output.as_deref(), &cfg.to_yaml_string()?)
        }
        Command::Simulate {
            config,
            traces,
            dso,
            pre_trigger,
            post_trigger,
            trigger,
            maxtime_ns,
            vcd,
        } => {
            let cfg = load_config(&config)?;
            let mut setup = DsoSetup {
                pre_trigger_time: pre_trigger,
                post_trigger_time: post_trigger,
                ..Default::default()
            };
            let mut triggers = CombinedTriggers::default();
            for index in trigger {
                if index >= COMBINED_TRIGGER_COUNT {
                    bail!("Trigger index {} out of range", index);
                }
                triggers.set(index, true);
            }
            set_combined_triggers(&mut setup, &triggers);

            let sampled: Snapshot = match (traces, dso) {
                (Some(path), _) => serde_yaml::from_str(
                    &fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                )
                .with_context(|| format!("Failed to parse traces in {}", path.display()))?,
                (None, Some(path)) => load_dso_snapshot(&path, &setup)?,
                (None, None) => Snapshot::new(),
            };

            let maxtime = SampleTime::from_ns(
                maxtime_ns.unwrap_or(pre_trigger as u64 + post_trigger as u64),
            );
            let mut sim = Sim::with_sampled_traces(cfg, sampled);
            sim.simulate(maxtime)?;
            print_traces(&sim);

            if let Some(path) = vcd {
                let file = fs::File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                trigger_io::write_sim_vcd(&sim, file)?;
                log::info!("wrote {}", path.display());
            }
            Ok(())
        }
    }
}

fn main() -> anyhow::Result<()> {
    let _logger = env_logger::builder()
        .filter(Some("trigger_io"), log::LevelFilter::Info)
        .target(Target::Stderr)
        .init();

    run(Command::from_args())
}
