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

//! Two level minimization of LUT outputs (Quine-McCluskey).

use bitvec::prelude::*;
use itertools::Itertools;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::config::OutputMapping;
use crate::units::{LUT_INPUT_BITS, LUT_INPUT_COMBINATIONS};

pub type InputBitSet = BitArr!(for LUT_INPUT_BITS, in u8, Lsb0);

const INPUT_MASK: u8 = (1 << LUT_INPUT_BITS) - 1;

/// A product term. Inputs whose bit is set in `mask` do not matter,
/// the others must equal the corresponding bit of `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Implicant {
    pub value: u8,
    pub mask: u8,
}

impl Implicant {
    pub fn covers(&self, minterm: usize) -> bool {
        (minterm as u8 & !self.mask) == self.value
    }

    pub fn used_inputs(&self) -> u8 {
        !self.mask & INPUT_MASK
    }
}

impl fmt::Display for Implicant {
    /// Highest input first, `-` for don't care.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for bit in (0..LUT_INPUT_BITS).rev() {
            let c = if self.mask & (1 << bit) != 0 {
                '-'
            } else if self.value & (1 << bit) != 0 {
                '1'
            } else {
                '0'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

fn prime_implicants(minterms: &[usize]) -> BTreeSet<Implicant> {
    let mut current: BTreeSet<Implicant> = minterms
        .iter()
        .map(|m| Implicant {
            value: *m as u8 & INPUT_MASK,
            mask: 0,
        })
        .collect();
    let mut primes = BTreeSet::new();

    while !current.is_empty() {
        let mut next = BTreeSet::new();
        let mut merged = HashSet::new();

        for (a, b) in current.iter().tuple_combinations() {
            let diff = a.value ^ b.value;
            if a.mask == b.mask && diff.count_ones() == 1 {
                next.insert(Implicant {
                    value: a.value & !diff,
                    mask: a.mask | diff,
                });
                merged.insert(*a);
                merged.insert(*b);
            }
        }

        primes.extend(current.into_iter().filter(|t| !merged.contains(t)));
        current = next;
    }

    primes
}

/// Minimal sum of products covering `minterms`.
///
/// Essential prime implicants are taken first, the rest of the cover is
/// chosen greedily.
pub fn minimize_boolean(minterms: &[usize]) -> Vec<Implicant> {
    let primes = prime_implicants(minterms);
    let mut cover: Vec<Implicant> = Vec::new();

    for m in minterms {
        let mut covering = primes.iter().filter(|p| p.covers(*m));
        if let (Some(only), None) = (covering.next(), covering.next()) {
            if !cover.contains(only) {
                cover.push(*only);
            }
        }
    }

    let mut uncovered: BTreeSet<usize> = minterms
        .iter()
        .copied()
        .filter(|m| !cover.iter().any(|p| p.covers(*m)))
        .collect();

    while !uncovered.is_empty() {
        let best = primes
            .iter()
            .filter(|p| !cover.contains(*p))
            .max_by_key(|p| {
                (
                    uncovered.iter().filter(|m| p.covers(**m)).count(),
                    p.mask.count_ones(),
                )
            })
            .copied();
        match best {
            Some(p) => {
                uncovered.retain(|m| !p.covers(*m));
                cover.push(p);
            }
            None => break,
        }
    }

    cover.sort();
    cover
}

/// The inputs an output actually depends on.
pub fn minimize(mapping: &OutputMapping) -> InputBitSet {
    let minterms: Vec<usize> = (0..LUT_INPUT_COMBINATIONS)
        .filter(|c| mapping.test(*c))
        .collect();
    let used = minimize_boolean(&minterms)
        .iter()
        .fold(0u8, |acc, p| acc | p.used_inputs());
    BitArray::new([used])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_tables_use_no_inputs() {
        assert!(minimize(&OutputMapping::from(0)).not_any());
        assert!(minimize(&OutputMapping::from(u64::MAX)).not_any());
    }

    #[test]
    fn single_input_dependency() {
        let used = minimize(&OutputMapping::from_fn(|c| c & (1 << 3) != 0));
        assert_eq!(used.iter_ones().collect::<Vec<_>>(), vec![3]);

        let used = minimize(&OutputMapping::from_fn(|c| c & (1 << 3) == 0));
        assert_eq!(used.iter_ones().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn and_or_terms() {
        // in0 & in1 | in5
        let mapping = OutputMapping::from_fn(|c| (c & 0b11 == 0b11) || (c & 0b10_0000 != 0));
        let minterms: Vec<usize> = (0..64).filter(|c| mapping.test(*c)).collect();
        let cover = minimize_boolean(&minterms);
        let rendered: Vec<String> = cover.iter().map(|p| p.to_string()).collect();
        assert_eq!(cover.len(), 2);
        assert!(rendered.contains(&"----11".to_string()));
        assert!(rendered.contains(&"1-----".to_string()));
        assert_eq!(
            minimize(&mapping).iter_ones().collect::<Vec<_>>(),
            vec![0, 1, 5]
        );
    }

    #[test]
    fn cover_is_exact() {
        let mapping = OutputMapping::from(0x0123_4567_89ab_cdef);
        let minterms: Vec<usize> = (0..64).filter(|c| mapping.test(*c)).collect();
        let cover = minimize_boolean(&minterms);
        for c in 0..64 {
            assert_eq!(cover.iter().any(|p| p.covers(c)), mapping.test(c), "{}", c);
        }
    }
}
