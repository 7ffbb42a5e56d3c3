//! Reading `glpsol --output` solution reports.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::error::GlpkError;
use super::problem::Slot;
use crate::lottery::{FamilyId, UnitId};

/// Activity at or above which a binary variable counts as set.
const SET_THRESHOLD: f64 = 0.99;

/// Activity at or below which a binary variable counts as unset.
const UNSET_THRESHOLD: f64 = 0.01;

/// Objective values within this distance below an integer round up to it.
const OBJECTIVE_EPSILON: f64 = 1e-6;

/// Markers glpsol writes when a model has no solution.
const INFEASIBILITY_MARKERS: [&str; 3] = [
    "SOLUTION IS INFEASIBLE",
    "INTEGER EMPTY",
    "PROBLEM HAS NO PRIMAL FEASIBLE SOLUTION",
];

static OBJECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Objective:\s+\w+\s+=\s+(-?\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)").unwrap()
});

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"x\[c(\d+),v([A-Za-z0-9_]+)\]\s+\*?\s+(\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)").unwrap()
});

static UNIT_USAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"u\[v(\d+)\]\s+\*?\s+(\d+(?:\.\d+)?(?:[eE][-+]?\d+)?)").unwrap()
});

/// Whether the report declares the model infeasible.
pub fn is_infeasible(solution: &str) -> bool {
    INFEASIBILITY_MARKERS
        .iter()
        .any(|marker| solution.contains(marker))
}

/// Objective value of the solution.
pub fn objective(solution: &str) -> Result<f64, GlpkError> {
    let Some(captures) = OBJECTIVE.captures(solution) else {
        return Err(unmatched(solution, "objective line"));
    };
    captures[1]
        .parse()
        .map_err(|_| GlpkError::parse(format!("invalid objective value: {}", &captures[1])))
}

/// Best achievable worst rank, read from a min-satisfaction solution.
///
/// Tie-break offsets only add a fraction below one, so the integer part of
/// the objective is the worst rank.
pub fn min_satisfaction(solution: &str) -> Result<u32, GlpkError> {
    let value = objective(solution)?;
    let floored = (value + OBJECTIVE_EPSILON).floor();
    if !(floored >= 1.0) || floored > u32::MAX as f64 {
        return Err(GlpkError::parse(format!(
            "objective {} is not a valid rank",
            value
        )));
    }
    Ok(floored as u32)
}

/// Family to slot assignments (`x[c,v]` at 1) of a solution.
pub fn assignments(solution: &str) -> Result<BTreeMap<FamilyId, Slot>, GlpkError> {
    let mut distribution = BTreeMap::new();

    for captures in ASSIGNMENT.captures_iter(solution) {
        let activity: f64 = captures[3].parse().unwrap_or(0.0);
        if activity < SET_THRESHOLD {
            continue;
        }
        let family: FamilyId = captures[1]
            .parse()
            .map_err(|_| GlpkError::parse(format!("invalid family id: {}", &captures[1])))?;
        let slot: Slot = captures[2].parse().map_err(GlpkError::parse)?;

        if let Some(previous) = distribution.insert(family, slot) {
            return Err(GlpkError::parse(format!(
                "family {} assigned to both {} and {}",
                family, previous, slot
            )));
        }
    }

    if distribution.is_empty() {
        return Err(unmatched(solution, "assignments"));
    }
    Ok(distribution)
}

/// Units kept and discarded (`u[v]` at 1 and at 0) by a pruning solution.
pub fn unit_selection(solution: &str) -> Result<(Vec<UnitId>, Vec<UnitId>), GlpkError> {
    let mut kept = BTreeSet::new();
    let mut discarded = BTreeSet::new();

    for captures in UNIT_USAGE.captures_iter(solution) {
        let unit: UnitId = captures[1]
            .parse()
            .map_err(|_| GlpkError::parse(format!("invalid unit id: {}", &captures[1])))?;
        let activity: f64 = captures[2].parse().unwrap_or(0.0);
        if activity >= SET_THRESHOLD {
            kept.insert(unit);
        } else if activity <= UNSET_THRESHOLD {
            discarded.insert(unit);
        }
    }

    if kept.is_empty() && discarded.is_empty() {
        return Err(unmatched(solution, "unit selection"));
    }
    Ok((kept.into_iter().collect(), discarded.into_iter().collect()))
}

/// Nothing matched: infeasible if glpsol said so, otherwise unreadable.
fn unmatched(solution: &str, what: &str) -> GlpkError {
    if is_infeasible(solution) {
        GlpkError::infeasible(format!("no {} in an infeasible solution", what))
    } else {
        GlpkError::parse(format!("no {} found in solution", what))
    }
}
