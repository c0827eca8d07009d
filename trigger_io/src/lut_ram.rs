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

//! The LUT RAM image as written to the hardware.
//!
//! 64 entries of 4 bits each, packed into 16 words. Entry `a` lives in
//! nibble `a % 4` of word `a / 4` and holds the 3 output bits for input
//! combination `a` in its low bits.

use crate::config::{Lut, OutputMapping};
use crate::units::{LUT_INPUT_COMBINATIONS, LUT_OUTPUT_BITS};

pub const LUT_RAM_WORDS: usize = LUT_INPUT_COMBINATIONS / 4;

pub type LutRam = [u16; LUT_RAM_WORDS];

fn nibble_position(address: usize) -> (usize, usize) {
    (address / 4, (address % 4) * 4)
}

/// The output bits stored for `address`.
///
/// Panics if `address` is not a valid input combination.
pub fn lookup(ram: &LutRam, address: usize) -> u8 {
    assert!(
        address < LUT_INPUT_COMBINATIONS,
        "LUT address {} out of range",
        address
    );
    let (word, shift) = nibble_position(address);
    ((ram[word] >> shift) & 0xf) as u8
}

/// Stores the output bits for `address`.
///
/// Panics on an invalid address or a value wider than the 3 output bits.
pub fn set(ram: &mut LutRam, address: usize, value: u8) {
    assert!(
        address < LUT_INPUT_COMBINATIONS,
        "LUT address {} out of range",
        address
    );
    assert!(
        value < 1 << LUT_OUTPUT_BITS,
        "LUT value {} out of range",
        value
    );
    let (word, shift) = nibble_position(address);
    ram[word] = (ram[word] & !(0xf << shift)) | ((value as u16) << shift);
}

pub fn make_lut_ram(lut: &Lut) -> LutRam {
    let mut ram = LutRam::default();
    for address in 0..LUT_INPUT_COMBINATIONS {
        set(&mut ram, address, lut.lookup(address));
    }
    ram
}

/// Unpacks a RAM image into one mapping per output.
pub fn lut_contents_from_ram(ram: &LutRam) -> [OutputMapping; LUT_OUTPUT_BITS] {
    std::array::from_fn(|output| {
        OutputMapping::from_fn(|address| lookup(ram, address) & (1 << output) != 0)
    })
}
