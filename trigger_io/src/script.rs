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

//! The register write script understood by the MVLC.
//!
//! Generation first builds a list of parts (writes and comments grouped into
//! per unit blocks) and then renders them into text. Parsing buckets every
//! write by the unit selected before it and rebuilds the configuration from
//! those buckets.

mod generate;
mod meta;
mod parse;

pub use generate::{generate, generate_parts};
pub use parse::{parse, parse_named};

/// Selects the unit all following writes apply to.
pub const UNIT_SELECT_REGISTER: u16 = 0x0200;
/// Start of the per unit settings registers.
pub const UNIT_REGISTER_BASE: u16 = 0x0300;
/// Connection selectors, relative to `UNIT_REGISTER_BASE`. Two bytes per
/// input.
pub const UNIT_CONNECT_BASE: u16 = 0x80;
/// Selector of a LUT strobe input, relative to `UNIT_CONNECT_BASE`.
pub const STROBE_CONNECT_OFFSET: u16 = 6;
/// LUT strobe gate generator, relative to `UNIT_REGISTER_BASE`.
pub const STROBE_GG_OFFSET: u16 = 0x32;
/// Strobed output mask of a LUT, relative to `UNIT_REGISTER_BASE`.
pub const STROBED_OUTPUTS_REGISTER: u16 = 0x20;

/// VME address of the MVLC internal register interface.
pub const VME_INTERFACE_ADDRESS: u32 = 0xffff_0000;
pub const MIN_MVME_VERSION: &str = "1.9";
pub const META_BLOCK_BEGIN: &str = "meta_block_begin";
pub const META_BLOCK_END: &str = "meta_block_end";
pub const META_TAG: &str = "mvlc_trigger_io";
pub const STACK_BEGIN: &str = "mvlc_stack_begin";
pub const STACK_END: &str = "mvlc_stack_end";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueFormat {
    #[default]
    Decimal,
    Hex,
    Binary,
}

/// One register write. `address` holds the low 16 bits only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Write {
    pub address: u16,
    pub value: u16,
    /// Written on the same line.
    pub comment: String,
    pub format: ValueFormat,
}

impl Write {
    pub fn new(address: u16, value: u16) -> Self {
        Self {
            address,
            value,
            ..Default::default()
        }
    }

    pub fn with_comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = format;
        self
    }

    pub fn render(&self) -> String {
        let value = match self.format {
            ValueFormat::Decimal => format!("{:>6}", self.value),
            ValueFormat::Hex => format!("0x{:04x}", self.value),
            ValueFormat::Binary => format!("0b{:04b}", self.value),
        };
        let mut line = format!("0x{:04x} {}", self.address, value);
        if !self.comment.is_empty() {
            line.push_str("    # ");
            line.push_str(&self.comment);
        }
        line
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BasicPart {
    Write(Write),
    Comment(String),
}

impl From<Write> for BasicPart {
    fn from(write: Write) -> Self {
        Self::Write(write)
    }
}

/// Everything written for one unit, starting with its selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnitBlock {
    pub comment: String,
    pub parts: Vec<BasicPart>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptPart {
    Write(Write),
    Comment(String),
    Unit(UnitBlock),
}

/// Options of `generate`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenFlags {
    /// Put every name into the meta block, not only the changed ones.
    pub meta_include_default_unit_names: bool,
    /// Wrap each unit block into a single stack transaction.
    pub group_into_stack_transaction: bool,
    /// Add user assigned names to the unit block comments.
    pub annotate_user_names: bool,
}

fn render_part(lines: &mut Vec<String>, part: &ScriptPart, flags: &GenFlags) {
    match part {
        ScriptPart::Write(write) => lines.push(write.render()),
        ScriptPart::Comment(comment) => {
            if !comment.is_empty() {
                lines.push(String::new());
                lines.push(format!("# {}", comment));
            }
        }
        ScriptPart::Unit(block) => {
            let indent = if flags.group_into_stack_transaction {
                "  "
            } else {
                ""
            };
            lines.push(String::new());
            lines.push(format!("# {}", block.comment));
            if flags.group_into_stack_transaction {
                lines.push(STACK_BEGIN.to_string());
            }
            for part in &block.parts {
                let line = match part {
                    BasicPart::Write(write) => write.render(),
                    BasicPart::Comment(comment) => format!("# {}", comment),
                };
                lines.push(format!("{}{}", indent, line));
            }
            if flags.group_into_stack_transaction {
                lines.push(STACK_END.to_string());
            }
        }
    }
}

/// Renders parts into script lines.
pub fn render_parts(parts: &[ScriptPart], flags: &GenFlags) -> Vec<String> {
    let mut lines = Vec::new();
    for part in parts {
        render_part(&mut lines, part, flags);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_formats() {
        let write = Write::new(0x0302, 20).with_comment("width [ns]");
        assert_eq!(write.render(), "0x0302     20    # width [ns]");
        let write = Write::new(0x0200, 0x0103).with_format(ValueFormat::Hex);
        assert_eq!(write.render(), "0x0200 0x0103");
        let write = Write::new(0x0320, 0b101).with_format(ValueFormat::Binary);
        assert_eq!(write.render(), "0x0320 0b0101");
    }

    #[test]
    fn unit_blocks() {
        let block = UnitBlock {
            comment: "timer0".to_string(),
            parts: vec![
                Write::new(0x0200, 0).with_format(ValueFormat::Hex).into(),
                BasicPart::Comment("settings".to_string()),
            ],
        };
        let parts = vec![
            ScriptPart::Comment("Level0".to_string()),
            ScriptPart::Comment(String::new()),
            ScriptPart::Unit(block),
        ];
        assert_eq!(
            render_parts(&parts, &GenFlags::default()),
            vec!["", "# Level0", "", "# timer0", "0x0200 0x0000", "# settings"]
        );

        let flags = GenFlags {
            group_into_stack_transaction: true,
            ..Default::default()
        };
        assert_eq!(
            render_parts(&parts[2..], &flags),
            vec![
                "",
                "# timer0",
                STACK_BEGIN,
                "  0x0200 0x0000",
                "  # settings",
                STACK_END
            ]
        );
    }
}
