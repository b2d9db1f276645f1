//! Shunt compensators and static var compensators.

use crate::opf::network_cache::NetworkCache;
use crate::opf::variable_context::VariableContext;
use crate::solver::{ConstraintSense, NlpModel, QuadExpr};

/// `p = -g·v²`, `q = -b·v²`
///
/// `p` and `q` are withdrawals from the bus, like every other balance term.
/// A positive `b` therefore produces reactive power, and a positive `g`
/// likewise supplies active power to the bus.
pub fn add_shunt_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    for (k, s) in cache.shunts.iter().enumerate() {
        let (Some(p), Some(q), Some(bus)) = (ctx.shunt_p[k], ctx.shunt_q[k], s.bus_num) else {
            continue;
        };
        let v = ctx.bus_v[bus];
        model.add_constraint(
            &format!("shunt_p[{}]", s.id),
            QuadExpr::new().term(p, 1.0).quad(v, v, s.g).into(),
            ConstraintSense::Equal,
            0.0,
        );
        model.add_constraint(
            &format!("shunt_q[{}]", s.id),
            QuadExpr::new().term(q, 1.0).quad(v, v, s.b).into(),
            ConstraintSense::Equal,
            0.0,
        );
    }
}

/// `b_min·v² <= q <= b_max·v²` with `q` in generator convention
pub fn add_svc_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    for (k, s) in cache.svcs.iter().enumerate() {
        let (Some(q), Some(bus)) = (ctx.svc_q[k], s.bus_num) else {
            continue;
        };
        let v = ctx.bus_v[bus];
        model.add_constraint(
            &format!("svc_q_min[{}]", s.id),
            QuadExpr::new().term(q, 1.0).quad(v, v, -s.b_min).into(),
            ConstraintSense::GreaterEqual,
            0.0,
        );
        model.add_constraint(
            &format!("svc_q_max[{}]", s.id),
            QuadExpr::new().term(q, 1.0).quad(v, v, -s.b_max).into(),
            ConstraintSense::LessEqual,
            0.0,
        );
    }
}
