//! Spotting groups whose symmetry stalls branch-and-bound.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::DegeneracyConfig;
use crate::lottery::{FamilyId, LotterySpec, UnitId};

/// Prefix length compared for identical preferences.
const SIMILARITY_PREFIX: usize = 5;

/// Prefix length compared for reversed preferences.
const OPPOSITION_PREFIX: usize = 3;

/// Opposition needs at least this many families to mean anything.
const OPPOSITION_MIN_FAMILIES: usize = 4;

/// Share of prefix positions that must match when one list is reversed.
const REVERSAL_MATCH_RATIO: f64 = 0.67;

/// Why a group was flagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degeneracy {
    Size {
        families: usize,
        units: usize,
        threshold: usize,
    },
    Similarity {
        prefix: Vec<UnitId>,
        ratio: f64,
    },
    Opposition {
        prefixes: [Vec<UnitId>; 2],
        ratio: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DegeneracyDetector {
    config: DegeneracyConfig,
}

impl DegeneracyDetector {
    pub fn new(config: DegeneracyConfig) -> Self {
        Self { config }
    }

    /// First degeneracy found, checking size, then similarity, then opposition.
    pub fn detect(&self, spec: &LotterySpec) -> Option<Degeneracy> {
        if !self.config.enabled || spec.family_count() == 0 {
            return None;
        }
        self.size(spec)
            .or_else(|| self.similarity(spec))
            .or_else(|| self.opposition(spec))
    }

    fn size(&self, spec: &LotterySpec) -> Option<Degeneracy> {
        let largest = spec.family_count().max(spec.unit_count());
        (largest >= self.config.size_threshold).then(|| Degeneracy::Size {
            families: spec.family_count(),
            units: spec.unit_count(),
            threshold: self.config.size_threshold,
        })
    }

    fn similarity(&self, spec: &LotterySpec) -> Option<Degeneracy> {
        let patterns = prefix_groups(spec, SIMILARITY_PREFIX);
        let (prefix, families) = patterns.into_iter().next()?;
        let ratio = families.len() as f64 / spec.family_count() as f64;
        (ratio >= self.config.similarity_threshold).then(|| Degeneracy::Similarity {
            prefix: prefix.to_vec(),
            ratio,
        })
    }

    fn opposition(&self, spec: &LotterySpec) -> Option<Degeneracy> {
        if spec.family_count() < OPPOSITION_MIN_FAMILIES {
            return None;
        }

        let patterns = prefix_groups(spec, OPPOSITION_PREFIX);
        let [(first, first_families), (second, second_families), ..] = patterns.as_slice() else {
            return None;
        };

        let ratio =
            (first_families.len() + second_families.len()) as f64 / spec.family_count() as f64;
        if ratio < self.config.opposition_threshold {
            return None;
        }

        let a = spec.preferences(first_families[0]);
        let b = spec.preferences(second_families[0]);
        let checks = a.len().min(OPPOSITION_PREFIX);
        if checks == 0 {
            return None;
        }
        let matches = a
            .iter()
            .zip(b.iter().rev())
            .take(checks)
            .filter(|(x, y)| x == y)
            .count();

        (matches as f64 / checks as f64 >= REVERSAL_MATCH_RATIO).then(|| Degeneracy::Opposition {
            prefixes: [first.to_vec(), second.to_vec()],
            ratio,
        })
    }
}

/// Families grouped by the first `len` units of their preferences, most
/// common prefix first. Ties keep the prefix whose first family has the
/// lowest id in front.
fn prefix_groups(spec: &LotterySpec, len: usize) -> Vec<(&[UnitId], Vec<FamilyId>)> {
    let mut groups: BTreeMap<&[UnitId], Vec<FamilyId>> = BTreeMap::new();
    for (family, prefs) in spec.families() {
        let prefix = &prefs[..prefs.len().min(len)];
        groups.entry(prefix).or_default().push(*family);
    }

    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|(_, a), (_, b)| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
    groups
}
