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

//! Settings that have no registers: names and soft activation flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::TriggerIo;
use crate::units::*;

type NameMap = BTreeMap<usize, String>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct MetaBlock {
    #[serde(default)]
    pub names: Names,
    #[serde(default)]
    pub settings: Settings,
}

/// Level3 NIM names are left out, they equal the Level0 ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct Names {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level0: NameMap,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level1: BTreeMap<usize, NameMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level2: BTreeMap<usize, NameMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level3: NameMap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct UnitSettings {
    #[serde(default)]
    pub soft_activate: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct Settings {
    #[serde(default)]
    pub level0: BTreeMap<usize, UnitSettings>,
    #[serde(default)]
    pub level3: BTreeMap<usize, UnitSettings>,
}

fn is_level3_nim(unit: usize) -> bool {
    matches!(level3::unit_kind(unit), Some(level3::Unit::Nim(_)))
}

fn changed_names<'a, I>(names: I, include_defaults: bool) -> NameMap
where
    I: Iterator<Item = (usize, &'a String, String)>,
{
    names
        .filter(|(_, name, default)| include_defaults || **name != *default)
        .map(|(index, name, _)| (index, name.clone()))
        .collect()
}

fn lut_names<'a, I>(level: usize, luts: I, include_defaults: bool) -> BTreeMap<usize, NameMap>
where
    I: Iterator<Item = &'a crate::config::Lut>,
{
    luts.enumerate()
        .map(|(unit, lut)| {
            let names = lut.output_names.iter().enumerate().map(|(output, name)| {
                (output, name, default_lut_output_name(level, unit, output))
            });
            (unit, changed_names(names, include_defaults))
        })
        .filter(|(_, names)| !names.is_empty())
        .collect()
}

impl MetaBlock {
    pub fn from_config(cfg: &TriggerIo, include_defaults: bool) -> Self {
        let level0 = changed_names(
            cfg.l0
                .unit_names
                .iter()
                .zip(level0::DEFAULT_UNIT_NAMES.iter())
                .enumerate()
                .map(|(unit, (name, default))| (unit, name, default.clone())),
            include_defaults,
        );
        let level3 = changed_names(
            cfg.l3
                .unit_names
                .iter()
                .zip(level3::DEFAULT_UNIT_NAMES.iter())
                .enumerate()
                .filter(|(unit, _)| !is_level3_nim(*unit))
                .map(|(unit, (name, default))| (unit, name, default.clone())),
            include_defaults,
        );

        let soft_activate = |flag: bool| UnitSettings {
            soft_activate: Some(flag),
        };
        let settings = Settings {
            level0: cfg
                .l0
                .timers
                .iter()
                .enumerate()
                .map(|(unit, timer)| {
                    (level0::TIMER_OFFSET + unit, soft_activate(timer.soft_activate))
                })
                .collect(),
            level3: cfg
                .l3
                .counters
                .iter()
                .enumerate()
                .map(|(i, counter)| {
                    (level3::COUNTER_OFFSET + i, soft_activate(counter.soft_activate))
                })
                .collect(),
        };

        Self {
            names: Names {
                level0,
                level1: lut_names(1, cfg.l1.luts.iter(), include_defaults),
                level2: lut_names(2, cfg.l2.luts.iter(), include_defaults),
                level3,
            },
            settings,
        }
    }

    /// Copies names and flags into `cfg`. Entries for unknown units are
    /// skipped.
    pub fn apply(&self, cfg: &mut TriggerIo) {
        let mut set_name = |address: UnitAddress, name: &str| {
            if !cfg.set_name(address, name) {
                log::warn!("meta block names unknown unit {}", address);
            }
        };

        for (unit, name) in &self.names.level0 {
            set_name(UnitAddress::unit(0, *unit), name);
        }
        for (level, luts) in [(1, &self.names.level1), (2, &self.names.level2)] {
            for (unit, names) in luts {
                let outputs = names.iter().filter(|(output, _)| **output < LUT_OUTPUT_BITS);
                for (output, name) in outputs {
                    set_name(UnitAddress::new(level, *unit, *output), name);
                }
            }
        }
        for (unit, name) in self.names.level3.iter().filter(|(unit, _)| !is_level3_nim(**unit)) {
            set_name(UnitAddress::unit(3, *unit), name);
        }

        for (unit, settings) in &self.settings.level0 {
            match (level0::unit_kind(*unit), settings.soft_activate) {
                (Some(level0::Unit::Timer(i)), Some(flag)) => cfg.l0.timers[i].soft_activate = flag,
                _ => log::debug!("ignoring meta settings of L0.Unit{}", unit),
            }
        }
        for (unit, settings) in &self.settings.level3 {
            match (level3::unit_kind(*unit), settings.soft_activate) {
                (Some(level3::Unit::Counter(i)), Some(flag)) => {
                    cfg.l3.counters[i].soft_activate = flag
                }
                _ => log::debug!("ignoring meta settings of L3.Unit{}", unit),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_changed_names_by_default() {
        let mut cfg = TriggerIo::default();
        cfg.set_name(UnitAddress::unit(0, level0::NIM_IO_OFFSET + 1), "veto");
        cfg.set_name(UnitAddress::new(2, 1, 2), "gate");
        let meta = MetaBlock::from_config(&cfg, false);
        assert_eq!(meta.names.level0.len(), 1);
        assert_eq!(meta.names.level0[&(level0::NIM_IO_OFFSET + 1)], "veto");
        assert!(meta.names.level1.is_empty());
        assert_eq!(meta.names.level2[&1][&2], "gate");
        assert!(meta.names.level3.is_empty());
        assert_eq!(meta.settings.level0.len(), TIMER_COUNT);

        let all = MetaBlock::from_config(&cfg, true);
        assert_eq!(all.names.level0.len(), level0::OUTPUT_COUNT);
        assert_eq!(
            all.names.level3.len(),
            level3::UNIT_COUNT - NIM_IO_COUNT
        );
    }

    #[test]
    fn apply_restores_config() {
        let mut cfg = TriggerIo::default();
        cfg.set_name(UnitAddress::unit(0, level0::NIM_IO_OFFSET + 4), "beam");
        cfg.set_name(UnitAddress::unit(3, level3::COUNTER_OFFSET), "events");
        cfg.l0.timers[2].soft_activate = true;
        cfg.l3.counters[5].soft_activate = true;

        let yaml = serde_yaml::to_string(&MetaBlock::from_config(&cfg, false)).unwrap();
        let meta: MetaBlock = serde_yaml::from_str(&yaml).unwrap();
        let mut back = TriggerIo::default();
        meta.apply(&mut back);
        assert_eq!(back, cfg);
    }
}
