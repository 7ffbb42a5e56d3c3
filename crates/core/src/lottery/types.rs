use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ProjectId = i64;
pub type LotteryId = i64;
pub type UnitTypeId = i64;
pub type FamilyId = i64;
pub type UnitId = i64;

/// Families and units of one group (one unit type), ready for a solver.
///
/// Preference lists are ordered most-preferred first. Every unit listed in a
/// preference list belongs to `units`; the storage layer guarantees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySpec {
    families: BTreeMap<FamilyId, Vec<UnitId>>,
    units: Vec<UnitId>,
}

impl LotterySpec {
    pub fn new(families: BTreeMap<FamilyId, Vec<UnitId>>, units: Vec<UnitId>) -> Self {
        Self { families, units }
    }

    pub fn families(&self) -> &BTreeMap<FamilyId, Vec<UnitId>> {
        &self.families
    }

    pub fn units(&self) -> &[UnitId] {
        &self.units
    }

    pub fn family_ids(&self) -> impl Iterator<Item = FamilyId> + '_ {
        self.families.keys().copied()
    }

    pub fn preferences(&self, family: FamilyId) -> &[UnitId] {
        self.families.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.units.is_empty()
    }

    /// Same families and preferences over a narrower unit set.
    pub fn with_units(&self, units: Vec<UnitId>) -> Self {
        Self {
            families: self.families.clone(),
            units,
        }
    }
}

/// Options an administrator can confirm when requesting an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionOption {
    /// Run even when a unit type has more units than families or vice versa.
    MismatchAllowed,
}

impl ExecutionOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOption::MismatchAllowed => "mismatch-allowed",
        }
    }
}

impl fmt::Display for ExecutionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mismatch-allowed" => Ok(ExecutionOption::MismatchAllowed),
            other => Err(format!("unknown execution option: {}", other)),
        }
    }
}

/// Full input of one execution run.
///
/// Built once by the execution service after a successful reservation and
/// never mutated afterwards. The UUID correlates every audit record of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryManifest {
    uuid: Uuid,
    project_id: ProjectId,
    lottery_id: LotteryId,
    groups: BTreeMap<UnitTypeId, LotterySpec>,
    options: BTreeSet<ExecutionOption>,
}

impl LotteryManifest {
    /// Build a manifest with a freshly minted execution UUID.
    pub fn new(
        project_id: ProjectId,
        lottery_id: LotteryId,
        groups: BTreeMap<UnitTypeId, LotterySpec>,
        options: BTreeSet<ExecutionOption>,
    ) -> Self {
        Self::with_uuid(Uuid::new_v4(), project_id, lottery_id, groups, options)
    }

    pub fn with_uuid(
        uuid: Uuid,
        project_id: ProjectId,
        lottery_id: LotteryId,
        groups: BTreeMap<UnitTypeId, LotterySpec>,
        options: BTreeSet<ExecutionOption>,
    ) -> Self {
        Self {
            uuid,
            project_id,
            lottery_id,
            groups,
            options,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn lottery_id(&self) -> LotteryId {
        self.lottery_id
    }

    pub fn groups(&self) -> &BTreeMap<UnitTypeId, LotterySpec> {
        &self.groups
    }

    pub fn options(&self) -> &BTreeSet<ExecutionOption> {
        &self.options
    }

    pub fn has_option(&self, option: ExecutionOption) -> bool {
        self.options.contains(&option)
    }
}

/// Families and units left unmatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orphans {
    pub families: Vec<FamilyId>,
    pub units: Vec<UnitId>,
}

impl Orphans {
    pub fn is_empty(&self) -> bool {
        self.families.is_empty() && self.units.is_empty()
    }
}

/// Outcome of a solver run: who got what, and who was left over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub picks: BTreeMap<FamilyId, UnitId>,
    pub orphans: Orphans,
}

impl ExecutionResult {
    pub fn new(picks: BTreeMap<FamilyId, UnitId>, orphans: Orphans) -> Self {
        Self { picks, orphans }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.picks.is_empty() && self.orphans.is_empty()
    }

    /// Pair families and units index for index; leftovers on either side are orphans.
    pub fn pair(families: &[FamilyId], units: &[UnitId]) -> Self {
        let matched = families.len().min(units.len());
        let picks = families
            .iter()
            .copied()
            .zip(units.iter().copied())
            .collect();

        Self {
            picks,
            orphans: Orphans {
                families: families[matched..].to_vec(),
                units: units[matched..].to_vec(),
            },
        }
    }

    /// Everything in the spec is an orphan.
    pub fn unmatched(spec: &LotterySpec) -> Self {
        Self {
            picks: BTreeMap::new(),
            orphans: Orphans {
                families: spec.family_ids().collect(),
                units: spec.units().to_vec(),
            },
        }
    }

    /// Units handed out by this result.
    pub fn assigned_units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.picks.values().copied()
    }

    /// Add another result's picks and orphans to this one.
    pub fn absorb(&mut self, other: ExecutionResult) {
        self.picks.extend(other.picks);
        self.orphans.families.extend(other.orphans.families);
        self.orphans.units.extend(other.orphans.units);
    }

    /// Describe how this result fails to partition the spec, if it does.
    ///
    /// Picks plus orphan families must cover every family exactly once, and
    /// picked units plus orphan units must cover every unit exactly once.
    pub fn partition_violation(&self, spec: &LotterySpec) -> Option<String> {
        let mut families = BTreeSet::new();
        for family in self.picks.keys().chain(self.orphans.families.iter()) {
            if !families.insert(*family) {
                return Some(format!("family {} appears more than once", family));
            }
        }
        let expected_families: BTreeSet<FamilyId> = spec.family_ids().collect();
        if families != expected_families {
            return Some(format!(
                "families {:?} do not match the group's families {:?}",
                families, expected_families
            ));
        }

        let mut units = BTreeSet::new();
        for unit in self.assigned_units().chain(self.orphans.units.iter().copied()) {
            if !units.insert(unit) {
                return Some(format!("unit {} appears more than once", unit));
            }
        }
        let expected_units: BTreeSet<UnitId> = spec.units().iter().copied().collect();
        if units != expected_units {
            return Some(format!(
                "units {:?} do not match the group's units {:?}",
                units, expected_units
            ));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(families: &[(FamilyId, &[UnitId])], units: &[UnitId]) -> LotterySpec {
        LotterySpec::new(
            families
                .iter()
                .map(|(family, prefs)| (*family, prefs.to_vec()))
                .collect(),
            units.to_vec(),
        )
    }

    #[test]
    fn test_pair_leaves_extra_units_as_orphans() {
        let result = ExecutionResult::pair(&[1, 2], &[10, 20, 30]);
        assert_eq!(result.picks, BTreeMap::from([(1, 10), (2, 20)]));
        assert!(result.orphans.families.is_empty());
        assert_eq!(result.orphans.units, vec![30]);
    }

    #[test]
    fn test_pair_leaves_extra_families_as_orphans() {
        let result = ExecutionResult::pair(&[1, 2, 3], &[10]);
        assert_eq!(result.picks, BTreeMap::from([(1, 10)]));
        assert_eq!(result.orphans.families, vec![2, 3]);
        assert!(result.orphans.units.is_empty());
    }

    #[test]
    fn test_unmatched_orphans_everything() {
        let spec = spec(&[(1, &[10]), (2, &[10])], &[10]);
        let result = ExecutionResult::unmatched(&spec);
        assert!(result.picks.is_empty());
        assert_eq!(result.orphans.families, vec![1, 2]);
        assert_eq!(result.orphans.units, vec![10]);
        assert!(result.partition_violation(&spec).is_none());
    }

    #[test]
    fn test_partition_violation_detects_duplicate_unit() {
        let spec = spec(&[(1, &[10, 20]), (2, &[10, 20])], &[10, 20]);
        let result = ExecutionResult::new(BTreeMap::from([(1, 10), (2, 10)]), Orphans::default());
        let violation = result.partition_violation(&spec).unwrap();
        assert!(violation.contains("unit 10"));
    }

    #[test]
    fn test_partition_violation_detects_missing_family() {
        let spec = spec(&[(1, &[10, 20]), (2, &[10, 20])], &[10, 20]);
        let result = ExecutionResult::new(
            BTreeMap::from([(1, 10)]),
            Orphans {
                families: vec![],
                units: vec![20],
            },
        );
        assert!(result.partition_violation(&spec).is_some());
    }

    #[test]
    fn test_absorb_merges_picks_and_orphans() {
        let mut first = ExecutionResult::pair(&[1], &[10, 11]);
        first.absorb(ExecutionResult::pair(&[2, 3], &[20]));

        assert_eq!(first.picks, BTreeMap::from([(1, 10), (2, 20)]));
        assert_eq!(first.orphans.families, vec![3]);
        assert_eq!(first.orphans.units, vec![11]);
    }

    #[test]
    fn test_execution_option_serde_uses_kebab_case() {
        let json = serde_json::to_string(&ExecutionOption::MismatchAllowed).unwrap();
        assert_eq!(json, "\"mismatch-allowed\"");
        assert_eq!(
            "mismatch-allowed".parse::<ExecutionOption>().unwrap(),
            ExecutionOption::MismatchAllowed
        );
        assert!("whatever".parse::<ExecutionOption>().is_err());
    }

    #[test]
    fn test_manifest_mints_distinct_uuids() {
        let a = LotteryManifest::new(1, 1, BTreeMap::new(), BTreeSet::new());
        let b = LotteryManifest::new(1, 1, BTreeMap::new(), BTreeSet::new());
        assert_ne!(a.uuid(), b.uuid());
        assert!(!a.has_option(ExecutionOption::MismatchAllowed));
    }
}
