//! DC sub-network: Ohm's law on DC lines, current balance at DC nodes,
//! grounds and the AC/DC coupling of voltage-source converters.
//!
//! DC quantities stay in engineering units (kV, kA, Ω, MW). The converter
//! equation ties the per-unit AC power to the DC side:
//!
//! ```text
//! p_ac·sn = (v1 - v2)·i + idle + switching·|i| + resistive·i²
//! ```
//!
//! with `|i|` smoothed as `sqrt(i² + eps)`.

use crate::opf::network_cache::NetworkCache;
use crate::opf::variable_context::VariableContext;
use crate::solver::{ConstraintSense, LinearExpr, NlpModel, NonlinearExpr};

/// Floor on DC line resistance (Ω)
const MIN_DC_RESISTANCE: f64 = 1e-6;

/// Smoothing of `|i|` in the switching loss term (kA²)
const ABS_SMOOTHING: f64 = 1e-8;

/// Converter losses (MW) at DC current `i` (kA)
pub fn converter_losses(idle: f64, switching: f64, resistive: f64, i: f64) -> f64 {
    idle + switching * (i * i + ABS_SMOOTHING).sqrt() + resistive * i * i
}

pub fn add_dc_network_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    let mut kcl = vec![LinearExpr::new(); cache.dc_nodes.len()];

    for (line, vars) in cache.dc_lines.iter().zip(&ctx.dc_lines) {
        let (Some(n1), Some(n2), Some(vars)) = (line.node1_num, line.node2_num, vars) else {
            continue;
        };
        let g = 1.0 / line.r.max(MIN_DC_RESISTANCE);
        let (v1, v2) = (ctx.dc_node_v[n1], ctx.dc_node_v[n2]);
        // i1 = (v2 - v1)/r, i2 = (v1 - v2)/r
        model.add_constraint(
            &format!("dc_line_i1[{}]", line.id),
            LinearExpr::new()
                .term(vars.i1, 1.0)
                .term(v2, -g)
                .term(v1, g)
                .into(),
            ConstraintSense::Equal,
            0.0,
        );
        model.add_constraint(
            &format!("dc_line_i2[{}]", line.id),
            LinearExpr::new()
                .term(vars.i2, 1.0)
                .term(v1, -g)
                .term(v2, g)
                .into(),
            ConstraintSense::Equal,
            0.0,
        );
        kcl[n1].add_term(vars.i1, 1.0);
        kcl[n2].add_term(vars.i2, 1.0);
    }

    for (ground, i) in cache.dc_grounds.iter().zip(&ctx.dc_ground_i) {
        let (Some(n), Some(i)) = (ground.node_num, *i) else {
            continue;
        };
        model.add_constraint(
            &format!("dc_ground_v[{}]", ground.id),
            LinearExpr::new().term(ctx.dc_node_v[n], 1.0).into(),
            ConstraintSense::Equal,
            0.0,
        );
        kcl[n].add_term(i, 1.0);
    }

    let sn = cache.nominal_apparent_power;
    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        let (Some(n1), Some(n2), Some(vars)) = (c.node1_num, c.node2_num, vars) else {
            continue;
        };
        let (idle, switching, resistive) = (c.idle_loss, c.switching_loss, c.resistive_loss);
        let coupling = NonlinearExpr::new(
            vec![vars.p, ctx.dc_node_v[n1], ctx.dc_node_v[n2], vars.i],
            move |x| {
                let (p, v1, v2, i) = (x[0], x[1], x[2], x[3]);
                p * sn - (v1 - v2) * i - converter_losses(idle, switching, resistive, i)
            },
        );
        model.add_constraint(
            &format!("conv_coupling[{}]", c.id),
            coupling.into(),
            ConstraintSense::Equal,
            0.0,
        );
        kcl[n1].add_term(vars.i, 1.0);
        kcl[n2].add_term(vars.i, -1.0);
    }

    for (node, expr) in cache.dc_nodes.iter().zip(kcl) {
        model.add_constraint(
            &format!("dc_kcl[{}]", node.id),
            expr.into(),
            ConstraintSense::Equal,
            0.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_losses_are_symmetric_in_current() {
        let forward = converter_losses(1.0, 0.5, 0.2, 2.0);
        let backward = converter_losses(1.0, 0.5, 0.2, -2.0);
        assert!((forward - backward).abs() < 1e-12);
        assert!((forward - (1.0 + 0.5 * 2.0 + 0.2 * 4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_idle_loss_at_zero_current() {
        assert!((converter_losses(1.5, 0.5, 0.2, 0.0) - 1.5).abs() < 1e-3);
    }
}
