//! Objective functions.
//!
//! Exactly one [`CostFunctionKind`] is active per run. All of them are sums of
//! linear and quadratic terms over already-allocated variables.

use super::network_cache::{InjectorRow, NetworkCache};
use super::parameters::{CostFunctionKind, OpfParameters};
use super::variable_context::{InjectionVars, VariableContext};
use crate::solver::{Expr, LinearExpr, QuadExpr, VarId};
use gridopf_core::{ConverterControlMode, SvcRegulationMode};
use tracing::debug;

impl CostFunctionKind {
    /// Objective terms of this cost function.
    pub fn terms(
        &self,
        cache: &NetworkCache,
        ctx: &VariableContext,
        params: &OpfParameters,
    ) -> Vec<Expr> {
        let terms = match self {
            CostFunctionKind::MinimizeAgainstReference => vec![reference(cache, ctx).into()],
            CostFunctionKind::MinimizeLosses => vec![branch_losses(ctx).into()],
            CostFunctionKind::MinimizeDcLosses => vec![dc_losses(cache, ctx).into()],
            CostFunctionKind::Redispatching => vec![
                reference(cache, ctx).into(),
                dispatch(ctx, params.redispatching_linear_weight).into(),
            ],
            CostFunctionKind::MaximizeDcVoltage => vec![
                reference(cache, ctx).into(),
                dc_voltage(cache, ctx, params.dc_voltage_weight).into(),
            ],
        };
        debug!(cost_function = %self, "objective built");
        terms
    }
}

/// `(x1 - x2 - target)²` expanded
fn add_squared_difference(q: &mut QuadExpr, x1: VarId, x2: VarId, target: f64, coef: f64) {
    q.add_quad(x1, x1, coef);
    q.add_quad(x2, x2, coef);
    q.add_quad(x1, x2, -2.0 * coef);
    q.linear.add_term(x1, -2.0 * coef * target);
    q.linear.add_term(x2, 2.0 * coef * target);
    q.linear.add_constant(coef * target * target);
}

fn track_injections(
    q: &mut QuadExpr,
    rows: &[InjectorRow],
    vars: &InjectionVars,
    ctx: &VariableContext,
    track_p: impl Fn(&InjectorRow) -> bool,
) {
    for (k, row) in rows.iter().enumerate() {
        let (Some(p), Some(bus)) = (vars.p[k], row.bus_num) else {
            continue;
        };
        if track_p(row) {
            q.add_squared_deviation(p, -row.target_p, 1.0);
        }
        if row.voltage_regulator_on {
            q.add_squared_deviation(ctx.bus_v[bus], row.target_v, 1.0);
        } else if let Some(q_var) = vars.q[k] {
            q.add_squared_deviation(q_var, -row.target_q, 1.0);
        }
    }
}

/// Quadratic deviation from the input operating point.
fn reference(cache: &NetworkCache, ctx: &VariableContext) -> QuadExpr {
    let mut q = QuadExpr::new();
    track_injections(&mut q, &cache.generators, &ctx.generators, ctx, |_| true);
    track_injections(&mut q, &cache.batteries, &ctx.batteries, ctx, |_| true);
    // the inverter side follows from the HVDC loss equation
    track_injections(&mut q, &cache.vsc_stations, &ctx.vsc_stations, ctx, |row| {
        row.hvdc_role == Some(super::network_cache::HvdcRole::Rectifier)
    });

    for (k, s) in cache.svcs.iter().enumerate() {
        let (Some(q_var), Some(bus)) = (ctx.svc_q[k], s.bus_num) else {
            continue;
        };
        match s.regulation_mode {
            SvcRegulationMode::Voltage => {
                q.add_squared_deviation(ctx.bus_v[bus], s.target_v, 1.0)
            }
            SvcRegulationMode::ReactivePower => q.add_squared_deviation(q_var, s.target_q, 1.0),
            SvcRegulationMode::Off => q.add_squared_deviation(q_var, 0.0, 1.0),
        }
    }

    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        let (Some(vars), Some(bus), Some(n1), Some(n2)) =
            (vars, c.bus_num, c.node1_num, c.node2_num)
        else {
            continue;
        };
        match c.control_mode {
            ConverterControlMode::PPcc => q.add_squared_deviation(vars.p, -c.target_p, 1.0),
            ConverterControlMode::VDc => {
                let nominal = cache.dc_nodes[n1].nominal_v.max(1.0);
                add_squared_difference(
                    &mut q,
                    ctx.dc_node_v[n1],
                    ctx.dc_node_v[n2],
                    c.target_v_dc,
                    1.0 / (nominal * nominal),
                );
            }
        }
        if c.voltage_regulator_on {
            q.add_squared_deviation(ctx.bus_v[bus], c.target_v, 1.0);
        } else if let Some(q_var) = vars.q {
            q.add_squared_deviation(q_var, -c.target_q, 1.0);
        }
    }
    q
}

/// Total active losses, `Σ (p1 + p2)` over closed branches.
fn branch_losses(ctx: &VariableContext) -> LinearExpr {
    let mut e = LinearExpr::new();
    for vars in &ctx.branches {
        if let (Some((p1, _)), Some((p2, _))) = (vars.side1(), vars.side2()) {
            e.add_term(p1, 1.0);
            e.add_term(p2, 1.0);
        }
    }
    e
}

/// DC line resistive losses `Σ r·i²`, in per-unit on `sn`.
fn dc_losses(cache: &NetworkCache, ctx: &VariableContext) -> QuadExpr {
    let mut q = QuadExpr::new();
    let sn = cache.nominal_apparent_power;
    for (line, vars) in cache.dc_lines.iter().zip(&ctx.dc_lines) {
        if let Some(vars) = vars {
            q.add_quad(vars.i1, vars.i1, line.r / sn);
        }
    }
    q
}

/// Linear bias toward lower generation: `-w·Σ p` with `p` in load convention.
fn dispatch(ctx: &VariableContext, weight: f64) -> LinearExpr {
    let mut e = LinearExpr::new();
    for p in ctx.generators.p.iter().chain(&ctx.batteries.p).flatten() {
        e.add_term(*p, -weight);
    }
    e
}

/// `-w·Σ v/nominal` over DC nodes
fn dc_voltage(cache: &NetworkCache, ctx: &VariableContext, weight: f64) -> LinearExpr {
    let mut e = LinearExpr::new();
    for (node, &v) in cache.dc_nodes.iter().zip(&ctx.dc_node_v) {
        if node.nominal_v > 0.0 {
            e.add_term(v, -weight / node.nominal_v);
        }
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_difference_expansion() {
        let mut q = QuadExpr::new();
        let (a, b) = (VarId::new(0), VarId::new(1));
        add_squared_difference(&mut q, a, b, 3.0, 2.0);
        let x = [10.0, 4.0];
        assert!((q.eval(&x) - 2.0 * (10.0 - 4.0 - 3.0f64).powi(2)).abs() < 1e-9);
    }

    #[test]
    fn test_losses_only_count_closed_branches() {
        use crate::opf::variable_context::BranchVars;
        let v = VarId::new;
        let ctx = VariableContext {
            branches: vec![
                BranchVars::Closed {
                    p1: v(0),
                    q1: v(1),
                    p2: v(2),
                    q2: v(3),
                },
                BranchVars::OpenSide2 { p1: v(4), q1: v(5) },
            ],
            ..VariableContext::default()
        };
        let losses = branch_losses(&ctx);
        assert_eq!(losses.terms, vec![(v(0), 1.0), (v(2), 1.0)]);
    }
}
