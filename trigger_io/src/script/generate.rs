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

use super::meta::MetaBlock;
use super::*;
use crate::config::{Io, Lut, TriggerIo, TriggerResource};
use crate::connections::resolve;
use crate::error::Error;
use crate::lut_ram::make_lut_ram;
use crate::units::*;

/// Which optional IO registers a unit has.
#[derive(Clone, Copy)]
struct IoRegisters {
    direction: bool,
    activate: bool,
}

const NIM_IO_REGISTERS: IoRegisters = IoRegisters {
    direction: true,
    activate: true,
};
const ECL_IO_REGISTERS: IoRegisters = IoRegisters {
    direction: false,
    activate: true,
};
const PLAIN_IO_REGISTERS: IoRegisters = IoRegisters {
    direction: false,
    activate: false,
};

fn unit_reg<S: Into<String>>(register: u16, value: u16, comment: S) -> Write {
    Write::new(UNIT_REGISTER_BASE + register, value).with_comment(comment)
}

impl UnitBlock {
    fn new(comment: String, level: usize, unit: usize) -> Self {
        let select = Write::new(UNIT_SELECT_REGISTER, ((level << 8) | unit) as u16)
            .with_comment(format!("select L{}.Unit{}", level, unit))
            .with_format(ValueFormat::Hex);
        Self {
            comment,
            parts: vec![select.into()],
        }
    }

    fn push<P: Into<BasicPart>>(&mut self, part: P) {
        self.parts.push(part.into());
    }

    fn extend<I: IntoIterator<Item = Write>>(&mut self, writes: I) {
        self.parts.extend(writes.into_iter().map(BasicPart::Write));
    }
}

/// Block comment of a unit: its default name, plus the user's name if
/// asked for and different.
struct BlockNamer<'a> {
    cfg: &'a TriggerIo,
    annotate: bool,
}

impl BlockNamer<'_> {
    fn name(&self, address: UnitAddress) -> String {
        let default = lookup_default_name(address).unwrap_or_else(|| address.to_string());
        match self.cfg.lookup_name(address) {
            Some(user) if self.annotate && user != default => format!("{} ({})", default, user),
            _ => default,
        }
    }
}

fn io_writes(io: &Io, registers: IoRegisters, offset: u16) -> Vec<Write> {
    let mut writes = vec![
        unit_reg(offset, io.delay, "delay [ns]"),
        unit_reg(offset + 2, io.width, "width [ns]"),
        unit_reg(offset + 4, io.holdoff, "holdoff [ns]"),
        unit_reg(
            offset + 6,
            io.invert as u16,
            "invert (start on trailing edge of input)",
        ),
    ];
    if registers.direction {
        writes.push(unit_reg(
            offset + 10,
            io.direction as u16,
            "direction (0:in, 1:out)",
        ));
    }
    if registers.activate {
        writes.push(unit_reg(offset + 16, io.activate as u16, "output activate"));
    }
    writes
}

fn trigger_resource_writes(unit: &TriggerResource) -> Vec<Write> {
    let (irq_index, gate_generator, trigger_index) = match unit {
        TriggerResource::Irq { irq_index } => (*irq_index, Io::default(), 0),
        TriggerResource::SoftTrigger => (0, Io::default(), 0),
        TriggerResource::SlaveTrigger {
            gate_generator,
            trigger_index,
        } => (0, *gate_generator, *trigger_index),
    };

    let mut writes = vec![
        unit_reg(
            0x80,
            unit.type_code(),
            "type: 0=IRQ, 1=SoftTrigger, 2=SlaveTrigger",
        ),
        unit_reg(
            0,
            irq_index as u16,
            "irq_index (zero-based: 0: IRQ1, .., 6: IRQ7)",
        ),
    ];
    writes.extend(
        io_writes(&gate_generator, PLAIN_IO_REGISTERS, 6)
            .into_iter()
            .map(|w| {
                let comment = format!("slave_trigger: {}", w.comment);
                w.with_comment(comment)
            }),
    );
    writes.push(unit_reg(
        0x82,
        trigger_index as u16,
        "slave trigger number (0..3)",
    ));
    writes
}

fn lut_ram_writes(lut: &Lut) -> Vec<Write> {
    make_lut_ram(lut)
        .iter()
        .enumerate()
        .map(|(word, value)| {
            let cell = word * 4;
            unit_reg(
                (word * 2) as u16,
                *value,
                format!("cells {}-{}", cell, cell + 3),
            )
            .with_format(ValueFormat::Hex)
        })
        .collect()
}

/// The selector write of one input, commented with the source's name.
fn connection_write(cfg: &TriggerIo, input: UnitAddress, register: u16) -> Result<Write, Error> {
    let value = crate::connections::get_connection_value(cfg, input)
        .ok_or(Error::InvalidAddress(input))?;
    let mut write = Write::new(UNIT_REGISTER_BASE + UNIT_CONNECT_BASE + register, value);
    if let Some(name) = resolve(cfg, input)?.and_then(|source| cfg.lookup_name(source)) {
        write.comment = if input.level == 2 && input.subunit == LUT_STROBE_INPUT {
            format!("connect strobe_input to '{}'", name)
        } else {
            format!("connect input{} to '{}'", register / 2, name)
        };
    }
    Ok(write)
}

fn level0_parts(cfg: &TriggerIo, namer: &BlockNamer, parts: &mut Vec<ScriptPart>) {
    parts.push(ScriptPart::Comment(
        "Level0 #####################################################".to_string(),
    ));

    for unit in 0..level0::OUTPUT_COUNT {
        let mut block = UnitBlock::new(namer.name(UnitAddress::unit(0, unit)), 0, unit);
        match level0::unit_kind(unit) {
            Some(level0::Unit::Timer(i)) => {
                let timer = &cfg.l0.timers[i];
                block.extend([
                    unit_reg(2, timer.range as u16, "range (0:ns, 1:us, 2:ms, 3:s)"),
                    unit_reg(4, timer.delay_ns, "delay [ns]"),
                    unit_reg(6, timer.period, "period [in range units]"),
                ]);
            }
            Some(level0::Unit::TriggerResource(i)) => {
                block.extend(trigger_resource_writes(&cfg.l0.trigger_resources[i]))
            }
            Some(level0::Unit::StackBusy(i)) => block.push(unit_reg(
                0,
                cfg.l0.stack_busy[i].stack_index as u16,
                "stack_index",
            )),
            Some(level0::Unit::Nim(i)) => {
                block.extend(io_writes(&cfg.l0.io_nim[i], NIM_IO_REGISTERS, 0))
            }
            Some(level0::Unit::IrqInput(i)) => {
                block.extend(io_writes(&cfg.l0.io_irq[i], PLAIN_IO_REGISTERS, 0))
            }
            // Nothing to configure.
            Some(level0::Unit::Sysclock) | Some(level0::Unit::DaqStart) | None => continue,
        }
        parts.push(ScriptPart::Unit(block));
    }
}

fn level1_parts(cfg: &TriggerIo, parts: &mut Vec<ScriptPart>) -> Result<(), Error> {
    parts.push(ScriptPart::Comment(
        "Level1 #####################################################".to_string(),
    ));

    for (unit, lut) in cfg.l1.luts.iter().enumerate() {
        let mut block = UnitBlock::new(format!("L1.LUT{}", unit), 1, unit);
        block.extend(lut_ram_writes(lut));
        if unit == level1::DYNAMIC_LUT {
            for input in 0..level1::LUT2_DYNAMIC_INPUT_COUNT {
                block.push(connection_write(
                    cfg,
                    UnitAddress::new(1, unit, input),
                    (input * 2) as u16,
                )?);
            }
        }
        parts.push(ScriptPart::Unit(block));
    }
    Ok(())
}

fn level2_parts(cfg: &TriggerIo, parts: &mut Vec<ScriptPart>) -> Result<(), Error> {
    parts.push(ScriptPart::Comment(
        "Level2 #####################################################".to_string(),
    ));

    for (unit, lut) in cfg.l2.luts.iter().enumerate() {
        let mut block = UnitBlock::new(format!("L2.LUT{}", unit), 2, unit);
        block.extend(lut_ram_writes(lut));
        block.push(
            unit_reg(
                STROBED_OUTPUTS_REGISTER,
                lut.strobed_outputs.bits() as u16,
                "strobed_outputs",
            )
            .with_format(ValueFormat::Binary),
        );
        for input in 0..level2::LUT_DYNAMIC_INPUT_COUNT {
            block.push(connection_write(
                cfg,
                UnitAddress::new(2, unit, input),
                (input * 2) as u16,
            )?);
        }
        block.push(BasicPart::Comment(format!(
            "L2.LUT{} strobe gate generator",
            unit
        )));
        block.extend(io_writes(&lut.strobe_gg, PLAIN_IO_REGISTERS, STROBE_GG_OFFSET));
        block.push(connection_write(
            cfg,
            UnitAddress::new(2, unit, LUT_STROBE_INPUT),
            STROBE_CONNECT_OFFSET,
        )?);
        parts.push(ScriptPart::Unit(block));
    }
    Ok(())
}

fn level3_parts(
    cfg: &TriggerIo,
    namer: &BlockNamer,
    parts: &mut Vec<ScriptPart>,
) -> Result<(), Error> {
    parts.push(ScriptPart::Comment(
        "Level3 #####################################################".to_string(),
    ));

    for unit in 0..level3::UNIT_COUNT {
        let kind = level3::unit_kind(unit);
        if kind == Some(level3::Unit::Nim(0)) {
            parts.push(ScriptPart::Comment(
                "NIM unit connections (setup is part of Level0)".to_string(),
            ));
        }

        let mut block = UnitBlock::new(namer.name(UnitAddress::unit(3, unit)), 3, unit);
        match kind {
            Some(level3::Unit::StackStart(i)) => {
                let stack_start = &cfg.l3.stack_start[i];
                block.extend([
                    unit_reg(0, stack_start.activate as u16, "activate"),
                    unit_reg(2, stack_start.stack_index as u16, "stack index"),
                    unit_reg(4, stack_start.delay_ns, "delay [ns]"),
                ]);
            }
            Some(level3::Unit::MasterTrigger(i)) => block.push(unit_reg(
                0,
                cfg.l3.master_triggers[i].activate as u16,
                "activate",
            )),
            Some(level3::Unit::Counter(i)) => block.push(unit_reg(
                14,
                cfg.l3.counters[i].clear_on_latch as u16,
                "clear on latch",
            )),
            Some(level3::Unit::Ecl(i)) => {
                block.extend(io_writes(&cfg.l3.io_ecl[i], ECL_IO_REGISTERS, 0))
            }
            Some(level3::Unit::Nim(_)) | None => (),
        }
        for input in 0..level3::input_count(unit) {
            block.push(connection_write(
                cfg,
                UnitAddress::new(3, unit, input),
                (input * 2) as u16,
            )?);
        }
        parts.push(ScriptPart::Unit(block));
    }
    Ok(())
}

/// Builds the script parts for every register backed setting of `cfg`.
pub fn generate_parts(cfg: &TriggerIo, flags: &GenFlags) -> Result<Vec<ScriptPart>, Error> {
    let namer = BlockNamer {
        cfg,
        annotate: flags.annotate_user_names,
    };
    let mut parts = Vec::new();
    level0_parts(cfg, &namer, &mut parts);
    level1_parts(cfg, &mut parts)?;
    level2_parts(cfg, &mut parts)?;
    level3_parts(cfg, &namer, &mut parts)?;
    Ok(parts)
}

/// Renders `cfg` as a complete script including the meta block.
///
/// Fails if a connection selector lies outside of its choice list.
pub fn generate(cfg: &TriggerIo, flags: &GenFlags) -> Result<String, Error> {
    let mut lines: Vec<String> = vec![
        "##############################################################".into(),
        "# MVLC Trigger I/O setup via internal VME interface          #".into(),
        "##############################################################".into(),
        "".into(),
        "# Generated file. Register values may be edited, the script is".into(),
        "# parsed again when the configuration is loaded. Structural".into(),
        "# changes like added or removed writes are not preserved.".into(),
        "".into(),
        format!("mvme_require_version {}", MIN_MVME_VERSION),
        "".into(),
        "# Internal MVLC VME interface address".into(),
        format!("setbase 0x{:08x}", VME_INTERFACE_ADDRESS),
    ];

    let parts = generate_parts(cfg, flags)?;
    log::debug!("generated {} script parts", parts.len());
    lines.extend(render_parts(&parts, flags));

    let meta = MetaBlock::from_config(cfg, flags.meta_include_default_unit_names);
    let meta_text = serde_yaml::to_string(&meta).map_err(|e| Error::SerializeMeta(e.to_string()))?;
    lines.extend([
        "".into(),
        "##############################################################".into(),
        "# MVLC Trigger I/O meta information                          #".into(),
        "##############################################################".into(),
        format!("{} {}", META_BLOCK_BEGIN, META_TAG),
    ]);
    lines.extend(meta_text.lines().map(String::from));
    lines.push(META_BLOCK_END.into());

    let mut text = lines.join("\n");
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(cfg: &TriggerIo) -> String {
        generate(cfg, &GenFlags::default()).unwrap()
    }

    #[test]
    fn header_and_meta_block() {
        let text = script(&TriggerIo::default());
        assert!(text.contains("mvme_require_version 1.9\n"));
        assert!(text.contains("setbase 0xffff0000\n"));
        assert!(text.contains("meta_block_begin mvlc_trigger_io\n"));
        assert!(text.ends_with("meta_block_end\n"));
    }

    #[test]
    fn unit_selection_and_settings() {
        let mut cfg = TriggerIo::default();
        cfg.l0.io_nim[2].delay = 10;
        cfg.l0.io_nim[2].width = 20;
        let text = script(&cfg);
        let nim2 = concat!(
            "0x0200 0x0012    # select L0.Unit18\n",
            "0x0300     10    # delay [ns]\n",
            "0x0302     20    # width [ns]",
        );
        assert!(text.contains(nim2));
        assert!(text.contains("# NIM2\n"));
        assert!(text.contains("0x0200 0x0305    # select L3.Unit5"));
    }

    #[test]
    fn lut_ram_and_strobe() {
        let mut cfg = TriggerIo::default();
        cfg.l2.luts[1].contents[0] = crate::config::OutputMapping::from(0b10);
        cfg.l2.luts[1].strobed_outputs.set(2, true);
        let parts = generate_parts(&cfg, &GenFlags::default()).unwrap();
        let block = parts
            .iter()
            .find_map(|p| match p {
                ScriptPart::Unit(b) if b.comment == "L2.LUT1" => Some(b),
                _ => None,
            })
            .unwrap();
        let writes: Vec<&Write> = block
            .parts
            .iter()
            .filter_map(|p| match p {
                BasicPart::Write(w) => Some(w),
                _ => None,
            })
            .collect();
        assert_eq!(writes[0].value, 0x0201);
        assert_eq!((writes[1].address, writes[1].value), (0x0300, 0x0010));
        assert_eq!((writes[17].address, writes[17].value), (0x0320, 0b100));
        assert!(writes.iter().any(|w| w.address == 0x0334 && w.value == 8));
        assert_eq!(writes.last().unwrap().address, 0x0386);
    }

    #[test]
    fn connection_comments() {
        let mut cfg = TriggerIo::default();
        cfg.set_name(UnitAddress::new(2, 0, 1), "coincidence");
        cfg.l3.connections[level3::ECL_OFFSET][0] = 1;
        let text = script(&cfg);
        assert!(text.contains("0x0380      1    # connect input0 to 'coincidence'"));
        // unconnected latches get no comment
        assert!(text.contains("0x0382     25\n"));
    }

    #[test]
    fn annotated_block_names() {
        let mut cfg = TriggerIo::default();
        cfg.set_name(UnitAddress::unit(0, level0::NIM_IO_OFFSET), "start");
        let flags = GenFlags {
            annotate_user_names: true,
            ..Default::default()
        };
        let text = generate(&cfg, &flags).unwrap();
        assert!(text.contains("# NIM0 (start)\n"));
    }

    #[test]
    fn invalid_selector() {
        let mut cfg = TriggerIo::default();
        cfg.l2.strobe_connections[0] = 200;
        assert!(matches!(
            generate(&cfg, &GenFlags::default()),
            Err(Error::InvalidConnection { value: 200, .. })
        ));
    }
}
