//! Three-winding transformers and dangling lines.
//!
//! Both are modeled around a fictitious node with its own voltage variables.
//! A three-winding transformer is three legs from the star point to the leg
//! buses, with no power withdrawn at the star point. A dangling line is a
//! closed branch from its bus to a boundary node where `p0 + j·q0` is
//! withdrawn.

use super::branch_flow::add_branch_equations;
use crate::opf::network_cache::NetworkCache;
use crate::opf::variable_context::VariableContext;
use crate::solver::{ConstraintSense, LinearExpr, NlpModel};

pub fn add_transformer_3w_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    for (k, t) in cache.transformers_3w.iter().enumerate() {
        let Some(star) = ctx.transformer_3w_star[k] else {
            continue;
        };
        let mut p_star = LinearExpr::new();
        let mut q_star = LinearExpr::new();
        for (leg_num, leg) in t.legs.iter().enumerate() {
            let vars = ctx.transformer_3w_legs[k][leg_num];
            let leg_id = format!("{}_leg{}", t.id, leg_num + 1);
            add_branch_equations(
                model,
                &leg_id,
                leg.pi,
                vars,
                Some(star),
                leg.bus_num.map(|n| ctx.bus_node(n)),
            );
            if let Some((p, q)) = vars.side1() {
                p_star.add_term(p, 1.0);
                q_star.add_term(q, 1.0);
            }
        }
        model.add_constraint(
            &format!("t3w_star_p[{}]", t.id),
            p_star.into(),
            ConstraintSense::Equal,
            0.0,
        );
        model.add_constraint(
            &format!("t3w_star_q[{}]", t.id),
            q_star.into(),
            ConstraintSense::Equal,
            0.0,
        );
    }
}

pub fn add_dangling_line_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    for (k, d) in cache.dangling_lines.iter().enumerate() {
        let Some(boundary) = ctx.dangling_boundary[k] else {
            continue;
        };
        let vars = ctx.dangling_flow[k];
        add_branch_equations(
            model,
            &d.id,
            d.pi,
            vars,
            d.bus_num.map(|n| ctx.bus_node(n)),
            Some(boundary),
        );
        if let Some((p2, q2)) = vars.side2() {
            model.add_constraint(
                &format!("dl_boundary_p[{}]", d.id),
                LinearExpr::constant(d.p0).term(p2, 1.0).into(),
                ConstraintSense::Equal,
                0.0,
            );
            model.add_constraint(
                &format!("dl_boundary_q[{}]", d.id),
                LinearExpr::constant(d.q0).term(q2, 1.0).into(),
                ConstraintSense::Equal,
                0.0,
            );
        }
    }
}
