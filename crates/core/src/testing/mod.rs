//! Testing utilities: a scriptable solver and fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use lottery_core::testing::{fixtures, MockSolver};
//!
//! let solver = MockSolver::new();
//! solver.push_panic("boom").await;
//!
//! let spec = fixtures::spec(&[(1, &[10, 20]), (2, &[20, 10])], &[10, 20]);
//! let manifest = fixtures::manifest_for(&spec);
//! ```

mod mock_solver;

pub use mock_solver::{MockResponse, MockSolver, RecordedSolve};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::{BTreeMap, BTreeSet};

    use chrono::{Duration, Utc};

    use crate::lottery::{FamilyId, LotteryId, LotteryManifest, LotterySpec, ProjectId, UnitId, UnitTypeId};
    use crate::storage::SqliteLotteryStore;

    /// Build a group from `(family, preferences)` pairs and a unit list.
    pub fn spec(families: &[(FamilyId, &[UnitId])], units: &[UnitId]) -> LotterySpec {
        LotterySpec::new(
            families
                .iter()
                .map(|(family, prefs)| (*family, prefs.to_vec()))
                .collect(),
            units.to_vec(),
        )
    }

    /// A manifest holding `spec` as the only group (project 1, lottery 1, unit type 1).
    pub fn manifest_for(spec: &LotterySpec) -> LotteryManifest {
        manifest(1, 1, vec![(1, spec.clone())])
    }

    pub fn manifest(
        project_id: ProjectId,
        lottery_id: LotteryId,
        groups: Vec<(UnitTypeId, LotterySpec)>,
    ) -> LotteryManifest {
        LotteryManifest::new(
            project_id,
            lottery_id,
            groups.into_iter().collect(),
            BTreeSet::new(),
        )
    }

    /// Ids created by [`seed_project`].
    #[derive(Debug, Clone)]
    pub struct SeededProject {
        pub project_id: ProjectId,
        pub lottery_id: LotteryId,
        pub unit_types: Vec<UnitTypeId>,
        pub families: BTreeMap<UnitTypeId, Vec<FamilyId>>,
        pub units: BTreeMap<UnitTypeId, Vec<UnitId>>,
    }

    /// Seed a project with a published lottery that was due an hour ago and
    /// one unit type per `(families, units)` entry. Every family prefers the
    /// units of its type in reverse id order.
    pub fn seed_project(
        store: &SqliteLotteryStore,
        project_id: ProjectId,
        groups: &[(usize, usize)],
    ) -> SeededProject {
        let lottery_id = store
            .create_lottery(project_id, Some(Utc::now() - Duration::hours(1)), true)
            .expect("create lottery");

        let mut seeded = SeededProject {
            project_id,
            lottery_id,
            unit_types: Vec::new(),
            families: BTreeMap::new(),
            units: BTreeMap::new(),
        };

        for (index, (family_count, unit_count)) in groups.iter().enumerate() {
            let unit_type = store
                .create_unit_type(project_id, &format!("Type {}", index + 1))
                .expect("create unit type");
            let units: Vec<UnitId> = (0..*unit_count)
                .map(|_| store.create_unit(unit_type).expect("create unit"))
                .collect();
            let reversed: Vec<UnitId> = units.iter().rev().copied().collect();
            let families: Vec<FamilyId> = (0..*family_count)
                .map(|_| {
                    let family = store
                        .create_family(project_id, unit_type)
                        .expect("create family");
                    store
                        .set_preferences(family, &reversed)
                        .expect("set preferences");
                    family
                })
                .collect();

            seeded.unit_types.push(unit_type);
            seeded.families.insert(unit_type, families);
            seeded.units.insert(unit_type, units);
        }

        seeded
    }

    /// Write an executable shell script.
    #[cfg(unix)]
    pub fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("make script executable");
        path
    }

    /// A stand-in optimizer that writes `solution` to its `--output` path.
    #[cfg(unix)]
    pub fn fake_glpsol(dir: &std::path::Path, solution: &str) -> std::path::PathBuf {
        let canned = dir.join("canned.sol");
        std::fs::write(&canned, solution).expect("write canned solution");
        write_script(
            dir,
            "glpsol",
            &format!(
                r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output" ]; then out="$2"; shift; fi
  shift
done
cp "{}" "$out""#,
                canned.display()
            ),
        )
    }
}
