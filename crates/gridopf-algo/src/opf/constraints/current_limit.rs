//! Permanent current limits, `p² + q² <= limit²` on each limited side of a
//! closed branch.

use crate::opf::network_cache::NetworkCache;
use crate::opf::variable_context::{BranchRegime, VariableContext};
use crate::solver::{ConstraintSense, NlpModel, QuadExpr};
use gridopf_core::Side;

pub fn add_current_limit_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) -> usize {
    let mut added = 0;
    for limit in &cache.current_limits {
        let vars = ctx.branches[limit.branch_num];
        if vars.regime() != BranchRegime::Closed {
            continue;
        }
        let (side, tag) = match limit.side {
            Side::One => (vars.side1(), "current_limit1"),
            Side::Two => (vars.side2(), "current_limit2"),
            Side::Three => continue,
        };
        let Some((p, q)) = side else {
            continue;
        };
        let id = &cache.branches[limit.branch_num].id;
        model.add_constraint(
            &format!("{}[{}]", tag, id),
            QuadExpr::new().quad(p, p, 1.0).quad(q, q, 1.0).into(),
            ConstraintSense::LessEqual,
            limit.value * limit.value,
        );
        added += 1;
    }
    added
}
