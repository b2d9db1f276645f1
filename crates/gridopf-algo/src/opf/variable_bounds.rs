//! Variable bounds, applied as a fixed sequence of strategies.
//!
//! Each strategy owns the bounds of one group of variables. Inverted bounds
//! are swapped with a warning rather than rejected.

use super::bounds::Bounds;
use super::network_cache::{InjectorRow, NetworkCache};
use super::parameters::OpfParameters;
use super::variable_context::{InjectionVars, VariableContext};
use crate::solver::{NlpModel, VarId};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableBounds {
    /// Bus voltage magnitudes from their voltage level limits
    BusVoltage,
    /// Slack bus angle pinned at zero
    SlackBusAngle,
    /// Active power of generators, batteries, VSC stations and converters
    ActivePower,
    /// Reduced reactive range of the same devices
    ReactivePower,
    /// Three-winding star points and dangling-line boundaries
    FictitiousNodeVoltage,
    /// DC node voltages and DC currents
    DcNetwork,
}

impl VariableBounds {
    pub const ORDER: [VariableBounds; 6] = [
        VariableBounds::BusVoltage,
        VariableBounds::SlackBusAngle,
        VariableBounds::ActivePower,
        VariableBounds::ReactivePower,
        VariableBounds::FictitiousNodeVoltage,
        VariableBounds::DcNetwork,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VariableBounds::BusVoltage => "bus_voltage",
            VariableBounds::SlackBusAngle => "slack_bus_angle",
            VariableBounds::ActivePower => "active_power",
            VariableBounds::ReactivePower => "reactive_power",
            VariableBounds::FictitiousNodeVoltage => "fictitious_node_voltage",
            VariableBounds::DcNetwork => "dc_network",
        }
    }

    pub fn apply<M: NlpModel>(
        &self,
        cache: &NetworkCache,
        ctx: &VariableContext,
        params: &OpfParameters,
        model: &mut M,
    ) {
        debug!(strategy = self.name(), "applying variable bounds");
        match self {
            VariableBounds::BusVoltage => bus_voltage(cache, ctx, params, model),
            VariableBounds::SlackBusAngle => {
                if let Some(slack) = cache.slack_bus_num {
                    model.set_variable_bounds(ctx.bus_ph[slack], 0.0, 0.0);
                    model.set_variable_start(ctx.bus_ph[slack], 0.0);
                }
            }
            VariableBounds::ActivePower => active_power(cache, ctx, model),
            VariableBounds::ReactivePower => reactive_power(cache, ctx, params, model),
            VariableBounds::FictitiousNodeVoltage => {
                let (lo, hi) = params.default_voltage_bounds;
                let nodes = ctx
                    .transformer_3w_star
                    .iter()
                    .chain(&ctx.dangling_boundary)
                    .flatten();
                for node in nodes {
                    set(model, node.v, lo, hi);
                }
            }
            VariableBounds::DcNetwork => dc_network(ctx, params, model),
        }
    }
}

fn set<M: NlpModel>(model: &mut M, var: VarId, lb: f64, ub: f64) {
    let (lb, ub) = Bounds::fix(model.variable_name(var), lb, ub);
    model.set_variable_bounds(var, lb, ub);
}

fn bus_voltage<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    params: &OpfParameters,
    model: &mut M,
) {
    let (default_lo, default_hi) = params.default_voltage_bounds;
    for (n, bus) in cache.buses.iter().enumerate() {
        let lo = bus.low_voltage_limit.filter(|v| v.is_finite()).unwrap_or(default_lo);
        let hi = bus.high_voltage_limit.filter(|v| v.is_finite()).unwrap_or(default_hi);
        set(model, ctx.bus_v[n], lo, hi);
        // flat start
        model.set_variable_start(ctx.bus_v[n], 1.0);
    }
}

fn active_power<M: NlpModel>(cache: &NetworkCache, ctx: &VariableContext, model: &mut M) {
    let injections = |rows: &[InjectorRow], vars: &InjectionVars, model: &mut M| {
        for (row, p) in rows.iter().zip(&vars.p) {
            if let Some(p) = *p {
                // generator-convention limits on a load-convention variable
                let b = Bounds::new(row.min_p, row.max_p).mirror();
                set(model, p, b.min, b.max);
            }
        }
    };
    injections(&cache.generators, &ctx.generators, model);
    injections(&cache.batteries, &ctx.batteries, model);
    injections(&cache.vsc_stations, &ctx.vsc_stations, model);

    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        if let Some(vars) = vars {
            let b = Bounds::new(c.min_p, c.max_p).mirror();
            set(model, vars.p, b.min, b.max);
        }
    }
}

fn reactive_power<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    params: &OpfParameters,
    model: &mut M,
) {
    let reduction = params.reactive_bounds_reduction;
    let injections = |rows: &[InjectorRow], vars: &InjectionVars, model: &mut M| {
        for (row, q) in rows.iter().zip(&vars.q) {
            if let Some(q) = *q {
                let b = Bounds::new(row.min_q_at_target_p, row.max_q_at_target_p)
                    .reduce(reduction)
                    .mirror();
                set(model, q, b.min, b.max);
            }
        }
    };
    injections(&cache.generators, &ctx.generators, model);
    injections(&cache.batteries, &ctx.batteries, model);
    injections(&cache.vsc_stations, &ctx.vsc_stations, model);

    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        if let Some(q) = vars.and_then(|v| v.q) {
            let b = Bounds::new(c.min_q_at_target_p, c.max_q_at_target_p)
                .reduce(reduction)
                .mirror();
            set(model, q, b.min, b.max);
        }
    }
}

fn dc_network<M: NlpModel>(
    ctx: &VariableContext,
    params: &OpfParameters,
    model: &mut M,
) {
    let (v_lo, v_hi) = params.dc_node_voltage_bounds;
    for &v in &ctx.dc_node_v {
        set(model, v, v_lo, v_hi);
    }
    let (i_lo, i_hi) = params.dc_line_current_bounds;
    for vars in ctx.dc_lines.iter().flatten() {
        set(model, vars.i1, i_lo, i_hi);
        set(model, vars.i2, i_lo, i_hi);
    }
    for vars in ctx.converters.iter().flatten() {
        set(model, vars.i, i_lo, i_hi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::AugmentedLagrangianModel;
    use gridopf_core::*;

    fn network() -> Network {
        let mut network = Network::new();
        network.voltage_levels.push(VoltageLevel {
            id: "VL".into(),
            nominal_v: 100.0,
            low_voltage_limit: Some(95.0),
            high_voltage_limit: None,
        });
        for id in ["A", "B"] {
            network.buses.push(Bus {
                id: id.into(),
                voltage_level_id: "VL".into(),
                v_mag: 100.0,
                ..Bus::default()
            });
        }
        network.lines.push(Line {
            id: "L".into(),
            voltage_level1_id: "VL".into(),
            voltage_level2_id: "VL".into(),
            bus1_id: Some("A".into()),
            bus2_id: Some("B".into()),
            x: 10.0,
            ..Line::default()
        });
        network.generators.push(Generator {
            id: "G".into(),
            voltage_level_id: "VL".into(),
            bus_id: Some("B".into()),
            min_p: 10.0,
            max_p: 80.0,
            min_q: -50.0,
            max_q: 30.0,
            ..Generator::default()
        });
        network.slack_bus_id = Some("B".into());
        network
    }

    fn bounded() -> (VariableContext, AugmentedLagrangianModel) {
        let mut network = network();
        let params = OpfParameters::default();
        let scope = PerUnitScope::new(&mut network);
        let cache = NetworkCache::build(&scope, &params).unwrap();
        let mut model = AugmentedLagrangianModel::default();
        let ctx = VariableContext::build(&cache, &params, &mut model);
        for strategy in VariableBounds::ORDER {
            strategy.apply(&cache, &ctx, &params, &mut model);
        }
        (ctx, model)
    }

    #[test]
    fn test_bus_voltage_falls_back_to_defaults() {
        let (ctx, model) = bounded();
        let (lo, hi) = model.variable_bounds(ctx.bus_v[0]);
        assert!((lo - 0.95).abs() < 1e-12);
        assert_eq!(hi, 1.1);
    }

    #[test]
    fn test_slack_angle_fixed() {
        let (ctx, model) = bounded();
        assert_eq!(model.variable_bounds(ctx.bus_ph[1]), (0.0, 0.0));
        assert_eq!(
            model.variable_bounds(ctx.bus_ph[0]),
            (f64::NEG_INFINITY, f64::INFINITY)
        );
    }

    #[test]
    fn test_generator_bounds_are_mirrored_and_reduced() {
        let (ctx, model) = bounded();
        let (p_lo, p_hi) = model.variable_bounds(ctx.generators.p[0].unwrap());
        assert!((p_lo + 0.8).abs() < 1e-12);
        assert!((p_hi + 0.1).abs() < 1e-12);
        let (q_lo, q_hi) = model.variable_bounds(ctx.generators.q[0].unwrap());
        assert!((q_lo + 0.27).abs() < 1e-12);
        assert!((q_hi - 0.45).abs() < 1e-12);
    }
}
