//! Assignment problem handed to the optimizer.
//!
//! A problem is a lottery group whose unit side may include placeholder slots,
//! so that groups with more families than units can still be modeled as
//! "exactly one slot per family".

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::lottery::{FamilyId, LotterySpec, UnitId};

/// Prefix of placeholder slot names.
const PLACEHOLDER_PREFIX: &str = "MOCK_";

/// One assignable position: a real unit or a placeholder padding the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    Unit(UnitId),
    Placeholder(u32),
}

impl Slot {
    pub fn unit(&self) -> Option<UnitId> {
        match self {
            Slot::Unit(id) => Some(*id),
            Slot::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Unit(id) => write!(f, "{}", id),
            Slot::Placeholder(n) => write!(f, "{}{}", PLACEHOLDER_PREFIX, n),
        }
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(n) = s.strip_prefix(PLACEHOLDER_PREFIX) {
            return n
                .parse()
                .map(Slot::Placeholder)
                .map_err(|_| format!("invalid placeholder slot: {}", s));
        }
        s.parse()
            .map(Slot::Unit)
            .map_err(|_| format!("invalid unit slot: {}", s))
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::Unit(id) => serializer.serialize_i64(*id),
            Slot::Placeholder(_) => serializer.collect_str(self),
        }
    }
}

/// Families with ranked slot preferences, and the slots they compete for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    families: BTreeMap<FamilyId, Vec<Slot>>,
    slots: Vec<Slot>,
}

impl Problem {
    /// Model a group as is.
    pub fn from_spec(spec: &LotterySpec) -> Self {
        let families = spec
            .families()
            .iter()
            .map(|(family, prefs)| (*family, prefs.iter().copied().map(Slot::Unit).collect()))
            .collect();
        let slots = spec.units().iter().copied().map(Slot::Unit).collect();
        Self { families, slots }
    }

    /// Model a group, padding it with placeholder slots when families
    /// outnumber units. Placeholders rank after every real preference.
    pub fn with_placeholders(spec: &LotterySpec) -> Self {
        let mut problem = Self::from_spec(spec);
        let missing = spec.family_count().saturating_sub(spec.unit_count());
        if missing == 0 {
            return problem;
        }

        let placeholders: Vec<Slot> = (1..=missing as u32).map(Slot::Placeholder).collect();
        for prefs in problem.families.values_mut() {
            prefs.extend(placeholders.iter().copied());
        }
        problem.slots.extend(placeholders);
        problem
    }

    pub fn families(&self) -> &BTreeMap<FamilyId, Vec<Slot>> {
        &self.families
    }

    pub fn family_ids(&self) -> impl Iterator<Item = FamilyId> + '_ {
        self.families.keys().copied()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 1-based position of `slot` in the family's preferences.
    pub fn rank(&self, family: FamilyId, slot: Slot) -> Option<u32> {
        self.families
            .get(&family)?
            .iter()
            .position(|s| *s == slot)
            .map(|index| index as u32 + 1)
    }

    /// Highest rank a family can be given without falling off its list.
    pub fn max_rank(&self) -> u32 {
        let longest = self.families.values().map(Vec::len).max().unwrap_or(0);
        longest.max(self.slots.len()).max(1) as u32
    }

    /// Worst rank in an assignment, counting slots a family never listed as unranked.
    pub fn worst_rank(&self, distribution: &BTreeMap<FamilyId, Slot>) -> Option<u32> {
        distribution
            .iter()
            .map(|(family, slot)| self.rank(*family, *slot).unwrap_or(u32::MAX))
            .max()
    }
}
