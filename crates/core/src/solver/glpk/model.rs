//! GMPL models, one per optimizer task.
//!
//! All models share the sets `C` (families) and `V` (slots) and the rank
//! matrix `p`. Data files supply the concrete values.

/// Minimize the worst rank any family receives.
pub const MIN_SATISFACTION: &str = r#"
set C;
set V;

param p{c in C, v in V};

var x{c in C, v in V}, binary;
var z;

minimize worst_rank: z;

s.t. worst_bound{c in C}:
    z >= sum{v in V} p[c,v] * x[c,v];

s.t. one_slot_per_family{c in C}:
    sum{v in V} x[c,v] = 1;

s.t. one_family_per_slot{v in V}:
    sum{c in C} x[c,v] <= 1;

end;
"#;

/// Minimize the total rank while no family gets worse than `S`.
///
/// Ranks carry a tie-break offset below 0.5, hence the `S + 0.5` ceiling.
pub const UNIT_DISTRIBUTION: &str = r#"
set C;
set V;

param p{c in C, v in V};
param S;

var x{c in C, v in V}, binary;

minimize total_rank: sum{c in C, v in V} p[c,v] * x[c,v];

s.t. rank_ceiling{c in C}:
    sum{v in V} p[c,v] * x[c,v] <= S + 0.5;

s.t. one_slot_per_family{c in C}:
    sum{v in V} x[c,v] = 1;

s.t. one_family_per_slot{v in V}:
    sum{c in C} x[c,v] <= 1;

end;
"#;

/// Keep exactly `M` slots so that the worst rank over the kept ones is minimal.
pub const WORST_UNITS_PRUNING: &str = r#"
set C;
set V;

param p{c in C, v in V};
param M;

var x{c in C, v in V}, binary;
var u{v in V}, binary;
var z;

minimize worst_rank: z;

s.t. worst_bound{c in C}:
    z >= sum{v in V} p[c,v] * x[c,v];

s.t. kept_count:
    sum{v in V} u[v] = M;

s.t. kept_only{c in C, v in V}:
    x[c,v] <= u[v];

s.t. one_slot_per_family{c in C}:
    sum{v in V} x[c,v] = 1;

s.t. one_family_per_slot{v in V}:
    sum{c in C} x[c,v] <= 1;

end;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_declare_shared_sets() {
        for model in [MIN_SATISFACTION, UNIT_DISTRIBUTION, WORST_UNITS_PRUNING] {
            assert!(model.contains("set C;"));
            assert!(model.contains("set V;"));
            assert!(model.contains("param p{c in C, v in V};"));
            assert!(model.trim_end().ends_with("end;"));
        }
    }

    #[test]
    fn test_scalar_parameters() {
        assert!(UNIT_DISTRIBUTION.contains("param S;"));
        assert!(WORST_UNITS_PRUNING.contains("param M;"));
        assert!(!MIN_SATISFACTION.contains("param S;"));
    }
}
