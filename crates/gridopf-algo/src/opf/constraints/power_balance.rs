//! Bus active and reactive power balance.
//!
//! At every bus, everything withdrawn sums to zero: device powers in load
//! convention, fixed load demand, shunt powers, SVC reactive power (generator
//! convention, so subtracted) and the flows entering each branch end, leg or
//! dangling line attached to the bus.

use crate::opf::network_cache::{InjectorRow, NetworkCache};
use crate::opf::variable_context::{InjectionVars, VariableContext};
use crate::solver::{ConstraintSense, LinearExpr, NlpModel, VarId};

struct Balance {
    p: Vec<LinearExpr>,
    q: Vec<LinearExpr>,
}

impl Balance {
    fn new(buses: usize) -> Self {
        Balance {
            p: vec![LinearExpr::new(); buses],
            q: vec![LinearExpr::new(); buses],
        }
    }

    fn flow(&mut self, bus: Option<usize>, side: Option<(VarId, VarId)>) {
        if let (Some(bus), Some((p, q))) = (bus, side) {
            self.p[bus].add_term(p, 1.0);
            self.q[bus].add_term(q, 1.0);
        }
    }

    fn injections(&mut self, rows: &[InjectorRow], vars: &InjectionVars) {
        for (k, row) in rows.iter().enumerate() {
            let (Some(bus), Some(p)) = (row.bus_num, vars.p[k]) else {
                continue;
            };
            self.p[bus].add_term(p, 1.0);
            match vars.q[k] {
                Some(q) => self.q[bus].add_term(q, 1.0),
                // reactive power held at its set-point
                None => self.q[bus].add_constant(-row.target_q),
            }
        }
    }
}

pub fn add_power_balance_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    let mut balance = Balance::new(cache.buses.len());

    balance.injections(&cache.generators, &ctx.generators);
    balance.injections(&cache.batteries, &ctx.batteries);
    balance.injections(&cache.vsc_stations, &ctx.vsc_stations);

    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        if let (Some(bus), Some(vars)) = (c.bus_num, vars) {
            balance.p[bus].add_term(vars.p, 1.0);
            match vars.q {
                Some(q) => balance.q[bus].add_term(q, 1.0),
                None => balance.q[bus].add_constant(-c.target_q),
            }
        }
    }

    for load in &cache.loads {
        if let Some(bus) = load.bus_num {
            balance.p[bus].add_constant(load.p0);
            balance.q[bus].add_constant(load.q0);
        }
    }

    for (k, s) in cache.shunts.iter().enumerate() {
        if let (Some(bus), Some(p), Some(q)) = (s.bus_num, ctx.shunt_p[k], ctx.shunt_q[k]) {
            balance.p[bus].add_term(p, 1.0);
            balance.q[bus].add_term(q, 1.0);
        }
    }

    for (k, s) in cache.svcs.iter().enumerate() {
        if let (Some(bus), Some(q)) = (s.bus_num, ctx.svc_q[k]) {
            balance.q[bus].add_term(q, -1.0);
        }
    }

    for (branch, vars) in cache.branches.iter().zip(&ctx.branches) {
        balance.flow(branch.bus1_num, vars.side1());
        balance.flow(branch.bus2_num, vars.side2());
    }

    for (t, legs) in cache.transformers_3w.iter().zip(&ctx.transformer_3w_legs) {
        for (leg, vars) in t.legs.iter().zip(legs) {
            balance.flow(leg.bus_num, vars.side2());
        }
    }

    for (d, vars) in cache.dangling_lines.iter().zip(&ctx.dangling_flow) {
        balance.flow(d.bus_num, vars.side1());
    }

    let Balance { p, q } = balance;
    for ((bus, p), q) in cache.buses.iter().zip(p).zip(q) {
        model.add_constraint(
            &format!("p_balance[{}]", bus.id),
            p.into(),
            ConstraintSense::Equal,
            0.0,
        );
        model.add_constraint(
            &format!("q_balance[{}]", bus.id),
            q.into(),
            ConstraintSense::Equal,
            0.0,
        );
    }
}
