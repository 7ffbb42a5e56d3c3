//! GMPL data rendering.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use rand::Rng;

use super::problem::{Problem, Slot};
use crate::lottery::FamilyId;

/// Rank given to a slot a family never listed.
pub const UNRANKED_PENALTY: u32 = 999;

/// Tie-break offsets are multiples of this step, strictly below 0.1.
const OFFSET_STEP: f64 = 0.0001;
const OFFSET_STEPS: u32 = 1000;

/// Per-family fractional offsets added to every rank of that family.
///
/// Offsets stay below 0.1 so the integer part of any rank, and of the worst
/// rank of any assignment, is unaffected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieBreak {
    offsets: BTreeMap<FamilyId, f64>,
}

impl TieBreak {
    /// No offsets: ranks are rendered as plain integers.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn random<R: Rng + ?Sized>(families: impl IntoIterator<Item = FamilyId>, rng: &mut R) -> Self {
        let offsets = families
            .into_iter()
            .map(|family| (family, rng.gen_range(0..OFFSET_STEPS) as f64 * OFFSET_STEP))
            .collect();
        Self { offsets }
    }

    pub fn from_offsets(offsets: BTreeMap<FamilyId, f64>) -> Self {
        Self { offsets }
    }

    pub fn offset(&self, family: FamilyId) -> f64 {
        self.offsets.get(&family).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.values().all(|offset| *offset == 0.0)
    }
}

/// Scalar parameter appended after the rank matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    /// `param S`: ceiling on any family's rank.
    MinSatisfaction(u32),
    /// `param M`: number of slots to keep.
    SlotCount(usize),
}

/// Render the data section for a problem.
///
/// ```text
/// data;
///
/// set C := c1 c2;
/// set V := v10 v20;
///
/// param p : v10 v20 :=
/// c1 1 2
/// c2 2 1
/// ;
///
/// param S := 1;
///
/// end;
/// ```
pub fn render(problem: &Problem, tie_break: &TieBreak, scalar: Option<Scalar>) -> String {
    let mut out = String::from("data;\n\n");

    let families: Vec<String> = problem.family_ids().map(|f| format!("c{}", f)).collect();
    let slots: Vec<String> = problem.slots().iter().map(slot_symbol).collect();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "set C := {};", families.join(" "));
    let _ = writeln!(out, "set V := {};", slots.join(" "));
    let _ = writeln!(out);
    let _ = writeln!(out, "param p : {} :=", slots.join(" "));

    for (family, prefs) in problem.families() {
        let ranks: HashMap<Slot, u32> = prefs
            .iter()
            .enumerate()
            .map(|(index, slot)| (*slot, index as u32 + 1))
            .collect();
        let offset = tie_break.offset(*family);

        let row: Vec<String> = problem
            .slots()
            .iter()
            .map(|slot| {
                let rank = ranks.get(slot).copied().unwrap_or(UNRANKED_PENALTY);
                format_rank(rank, offset)
            })
            .collect();
        let _ = writeln!(out, "c{} {}", family, row.join(" "));
    }
    out.push_str(";\n\n");

    match scalar {
        Some(Scalar::MinSatisfaction(s)) => {
            let _ = writeln!(out, "param S := {};\n", s);
        }
        Some(Scalar::SlotCount(m)) => {
            let _ = writeln!(out, "param M := {};\n", m);
        }
        None => {}
    }

    out.push_str("end;\n");
    out
}

fn slot_symbol(slot: &Slot) -> String {
    format!("v{}", slot)
}

fn format_rank(rank: u32, offset: f64) -> String {
    if offset == 0.0 {
        rank.to_string()
    } else {
        format!("{:.4}", rank as f64 + offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::LotterySpec;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn problem() -> Problem {
        let spec = LotterySpec::new(
            BTreeMap::from([(1, vec![10, 20]), (2, vec![20])]),
            vec![10, 20],
        );
        Problem::from_spec(&spec)
    }

    #[test]
    fn test_render_plain_ranks() {
        let data = render(&problem(), &TieBreak::none(), None);
        let expected = "data;\n\n\
set C := c1 c2;\n\
set V := v10 v20;\n\
\n\
param p : v10 v20 :=\n\
c1 1 2\n\
c2 999 1\n\
;\n\
\n\
end;\n";
        assert_eq!(data, expected);
    }

    #[test]
    fn test_render_scalars() {
        let with_s = render(&problem(), &TieBreak::none(), Some(Scalar::MinSatisfaction(2)));
        assert!(with_s.contains("param S := 2;\n"));
        assert!(with_s.ends_with("end;\n"));

        let with_m = render(&problem(), &TieBreak::none(), Some(Scalar::SlotCount(1)));
        assert!(with_m.contains("param M := 1;\n"));
    }

    #[test]
    fn test_render_applies_family_offset() {
        let tie_break = TieBreak::from_offsets(BTreeMap::from([(1, 0.25)]));
        let data = render(&problem(), &tie_break, None);
        assert!(data.contains("c1 1.2500 2.2500\n"));
        assert!(data.contains("c2 999 1\n"));
    }

    #[test]
    fn test_render_placeholders() {
        let spec = LotterySpec::new(BTreeMap::from([(1, vec![10]), (2, vec![10])]), vec![10]);
        let data = render(&Problem::with_placeholders(&spec), &TieBreak::none(), None);
        assert!(data.contains("set V := v10 vMOCK_1;"));
        assert!(data.contains("c2 1 2\n"));
    }

    #[test]
    fn test_random_offsets_stay_below_a_tenth() {
        let mut rng = StdRng::seed_from_u64(7);
        let tie_break = TieBreak::random(1..=200, &mut rng);
        for family in 1..=200 {
            let offset = tie_break.offset(family);
            assert!((0.0..0.1).contains(&offset), "offset {} out of range", offset);
        }
        assert_eq!(tie_break.offset(999), 0.0);
    }
}
