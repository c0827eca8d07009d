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

use std::collections::HashMap;

use super::meta::MetaBlock;
use super::*;
use crate::config::*;
use crate::connections::{connection_value_mut, validate_connections};
use crate::error::Error;
use crate::lut_ram::{lut_contents_from_ram, LutRam, LUT_RAM_WORDS};
use crate::units::*;

/// Register value by register offset from `UNIT_REGISTER_BASE`.
type RegisterWrites = HashMap<u16, u16>;

/// Writes of every unit, bucketed by level and unit.
#[derive(Default)]
struct LevelWrites([HashMap<u16, RegisterWrites>; LEVEL_COUNT]);

impl LevelWrites {
    fn insert(&mut self, level: u16, unit: u16, register: u16, value: u16) {
        if let Some(units) = self.0.get_mut(level as usize) {
            units.entry(unit).or_default().insert(register, value);
        }
    }

    fn unit(&self, level: usize, unit: usize) -> UnitWrites {
        UnitWrites {
            level,
            unit,
            writes: self.0[level].get(&(unit as u16)),
        }
    }
}

/// Registers of one unit. Registers never written read as zero.
struct UnitWrites<'a> {
    level: usize,
    unit: usize,
    writes: Option<&'a RegisterWrites>,
}

impl UnitWrites<'_> {
    fn get(&self, register: u16) -> u16 {
        self.writes
            .and_then(|w| w.get(&register))
            .copied()
            .unwrap_or(0)
    }

    fn flag(&self, register: u16) -> bool {
        self.get(register) != 0
    }

    fn invalid(&self, register: u16) -> Error {
        Error::InvalidRegisterValue {
            level: self.level,
            unit: self.unit,
            register,
            value: self.get(register),
        }
    }

    fn byte(&self, register: u16) -> Result<u8, Error> {
        u8::try_from(self.get(register)).map_err(|_| self.invalid(register))
    }

    fn connection(&self, input: usize) -> u16 {
        self.get(UNIT_CONNECT_BASE + 2 * input as u16)
    }

    /// Overwrites the register backed fields of `io`.
    fn io(&self, io: &mut Io, offset: u16, direction: bool, activate: bool) -> Result<(), Error> {
        io.delay = self.get(offset);
        io.width = self.get(offset + 2);
        io.holdoff = self.get(offset + 4);
        io.invert = self.flag(offset + 6);
        if direction {
            io.direction = match self.get(offset + 10) {
                0 => Direction::In,
                1 => Direction::Out,
                _ => return Err(self.invalid(offset + 10)),
            };
        }
        if activate {
            io.activate = self.flag(offset + 16);
        }
        Ok(())
    }

    fn lut_contents(&self) -> [OutputMapping; LUT_OUTPUT_BITS] {
        let mut ram: LutRam = [0; LUT_RAM_WORDS];
        for (word, value) in ram.iter_mut().enumerate() {
            *value = self.get((word * 2) as u16);
        }
        lut_contents_from_ram(&ram)
    }

    fn timer(&self, timer: &mut Timer) -> Result<(), Error> {
        timer.range = match self.get(2) {
            0 => TimerRange::Ns,
            1 => TimerRange::Us,
            2 => TimerRange::Ms,
            3 => TimerRange::S,
            _ => return Err(self.invalid(2)),
        };
        timer.delay_ns = self.get(4);
        timer.period = self.get(6);
        Ok(())
    }

    fn trigger_resource(&self) -> Result<TriggerResource, Error> {
        Ok(match self.get(0x80) {
            0 => TriggerResource::Irq {
                irq_index: self.byte(0)?,
            },
            1 => TriggerResource::SoftTrigger,
            2 => {
                let mut gate_generator = Io::default();
                self.io(&mut gate_generator, 6, false, false)?;
                TriggerResource::SlaveTrigger {
                    gate_generator,
                    trigger_index: self.byte(0x82)?,
                }
            }
            _ => return Err(self.invalid(0x80)),
        })
    }
}

fn build_level0(writes: &LevelWrites, cfg: &mut TriggerIo) -> Result<(), Error> {
    let l0 = &mut cfg.l0;
    for unit in 0..level0::OUTPUT_COUNT {
        let w = writes.unit(0, unit);
        match level0::unit_kind(unit) {
            Some(level0::Unit::Timer(i)) => w.timer(&mut l0.timers[i])?,
            Some(level0::Unit::TriggerResource(i)) => {
                l0.trigger_resources[i] = w.trigger_resource()?
            }
            Some(level0::Unit::StackBusy(i)) => l0.stack_busy[i].stack_index = w.byte(0)?,
            Some(level0::Unit::Nim(i)) => w.io(&mut l0.io_nim[i], 0, true, true)?,
            Some(level0::Unit::IrqInput(i)) => w.io(&mut l0.io_irq[i], 0, false, false)?,
            _ => (),
        }
    }
    Ok(())
}

fn build_level1(writes: &LevelWrites, cfg: &mut TriggerIo) {
    for (unit, lut) in cfg.l1.luts.iter_mut().enumerate() {
        lut.contents = writes.unit(1, unit).lut_contents();
    }
    let w = writes.unit(1, level1::DYNAMIC_LUT);
    for (input, value) in cfg.l1.lut2_connections.iter_mut().enumerate() {
        *value = w.connection(input);
    }
}

fn build_level2(writes: &LevelWrites, cfg: &mut TriggerIo) -> Result<(), Error> {
    for (unit, lut) in cfg.l2.luts.iter_mut().enumerate() {
        let w = writes.unit(2, unit);
        lut.contents = w.lut_contents();
        lut.strobed_outputs = StrobedOutputs::from(w.get(STROBED_OUTPUTS_REGISTER) as u8);
        w.io(&mut lut.strobe_gg, STROBE_GG_OFFSET, false, false)?;
        if lut.strobe_gg.width == 0 {
            lut.strobe_gg.width = STROBE_GG_DEFAULT_WIDTH;
        }
        for (input, value) in cfg.l2.lut_connections[unit].iter_mut().enumerate() {
            *value = w.connection(input);
        }
        cfg.l2.strobe_connections[unit] = w.get(UNIT_CONNECT_BASE + STROBE_CONNECT_OFFSET);
    }
    Ok(())
}

fn build_level3(writes: &LevelWrites, cfg: &mut TriggerIo) -> Result<(), Error> {
    for unit in 0..level3::UNIT_COUNT {
        let w = writes.unit(3, unit);
        let l3 = &mut cfg.l3;
        match level3::unit_kind(unit) {
            Some(level3::Unit::StackStart(i)) => {
                l3.stack_start[i] = StackStart {
                    activate: w.flag(0),
                    stack_index: w.byte(2)?,
                    delay_ns: w.get(4),
                };
            }
            Some(level3::Unit::MasterTrigger(i)) => l3.master_triggers[i].activate = w.flag(0),
            Some(level3::Unit::Counter(i)) => l3.counters[i].clear_on_latch = w.flag(14),
            Some(level3::Unit::Ecl(i)) => w.io(&mut l3.io_ecl[i], 0, false, true)?,
            Some(level3::Unit::Nim(_)) | None => (),
        }
        for input in 0..level3::input_count(unit) {
            if let Some(value) = connection_value_mut(cfg, UnitAddress::new(3, unit, input)) {
                *value = w.connection(input);
            }
        }
    }
    Ok(())
}

fn parse_number(token: &str) -> Option<u32> {
    let token = token.replace('\'', "");
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = token.strip_prefix("0b").or_else(|| token.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2).ok()
    } else {
        token.parse().ok()
    }
}

/// Parses a script under the name `"<script>"`.
pub fn parse(text: &str) -> Result<TriggerIo, Error> {
    parse_named("<script>", text)
}

/// Rebuilds a configuration from script text. `script` names the script in
/// errors.
///
/// Names and soft activation flags are taken from the meta block, if any.
/// Everything not written by the script keeps its default value.
pub fn parse_named(script: &str, text: &str) -> Result<TriggerIo, Error> {
    let mut writes = LevelWrites::default();
    let mut base: u32 = 0;
    let (mut level, mut unit) = (0u16, 0u16);
    // (tag, first line, contents) of the meta block being read
    let mut meta_block: Option<(String, usize, Vec<&str>)> = None;
    let mut meta_blocks = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line_number = index + 1;
        let error = |message: String| Error::parse(script, line_number, message);

        if meta_block.is_some() {
            if raw_line.trim() == META_BLOCK_END {
                meta_blocks.extend(meta_block.take());
            } else if let Some((_, _, contents)) = meta_block.as_mut() {
                contents.push(raw_line);
            }
            continue;
        }

        let line = raw_line.split('#').next().unwrap_or_default().trim();
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => (),
            [cmd, rest @ ..] if *cmd == META_BLOCK_BEGIN => {
                let tag = rest.first().copied().unwrap_or_default().to_string();
                meta_block = Some((tag, line_number, Vec::new()));
            }
            ["mvme_require_version", _] | [STACK_BEGIN] | [STACK_END] => (),
            ["setbase", address] => {
                base = parse_number(address)
                    .ok_or_else(|| error(format!("invalid base address '{}'", address)))?;
            }
            [address, value] => {
                let address = parse_number(address)
                    .ok_or_else(|| error(format!("invalid register address '{}'", address)))?;
                let value = parse_number(value)
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or_else(|| error(format!("invalid register value '{}'", value)))?;
                let address = (base.wrapping_add(address) & 0xffff) as u16;
                if address == UNIT_SELECT_REGISTER {
                    level = (value >> 8) & 0b11;
                    unit = value & 0xff;
                } else {
                    writes.insert(level, unit, address.wrapping_sub(UNIT_REGISTER_BASE), value);
                }
            }
            _ => return Err(error(format!("unexpected command '{}'", line))),
        }
    }

    if let Some((_, first_line, _)) = meta_block {
        return Err(Error::parse(script, first_line, "meta block is never closed"));
    }

    let mut cfg = TriggerIo::default();
    build_level0(&writes, &mut cfg)?;
    build_level1(&writes, &mut cfg);
    build_level2(&writes, &mut cfg)?;
    build_level3(&writes, &mut cfg)?;

    for (tag, first_line, contents) in meta_blocks {
        if tag != META_TAG {
            log::debug!("skipping meta block '{}'", tag);
            continue;
        }
        let meta: MetaBlock = serde_yaml::from_str(&contents.join("\n")).map_err(|e| {
            Error::parse(script, first_line, format!("invalid meta block: {}", e))
        })?;
        meta.apply(&mut cfg);
        break;
    }

    validate_connections(&cfg)?;
    Ok(cfg)
}
