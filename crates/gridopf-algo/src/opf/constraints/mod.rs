//! Constraint strategies.
//!
//! One strategy per equipment family, applied in the fixed order of
//! [`Constraints::for_mode`] after all variable bounds are set.

pub mod branch_flow;
pub mod capability_curve;
pub mod current_limit;
pub mod dc_network;
pub mod hvdc;
pub mod power_balance;
pub mod shunt;
pub mod transformer3w;

use crate::error::OpfResult;
use crate::opf::network_cache::NetworkCache;
use crate::opf::parameters::{OpfMode, OpfParameters};
use crate::opf::variable_context::VariableContext;
use crate::solver::NlpModel;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraints {
    /// π-model flows of lines and two-winding transformers
    BranchFlow,
    /// Leg flows and star point balance of three-winding transformers
    Transformer3w,
    /// Dangling line flows and boundary balance
    DanglingLine,
    /// Shunt admittance powers
    Shunt,
    /// Voltage-dependent static var compensator range
    StaticVarCompensator,
    /// Active and reactive balance at every bus
    PowerBalance,
    /// HVDC line losses
    Hvdc,
    /// DC lines, grounds, current balance and converter coupling
    DcNetwork,
    /// Capability curve polygons
    ReactiveCapabilityCurve,
    /// Permanent current limits (redispatching only)
    CurrentLimit,
}

impl Constraints {
    const COMMON: [Constraints; 9] = [
        Constraints::BranchFlow,
        Constraints::Transformer3w,
        Constraints::DanglingLine,
        Constraints::Shunt,
        Constraints::StaticVarCompensator,
        Constraints::PowerBalance,
        Constraints::Hvdc,
        Constraints::DcNetwork,
        Constraints::ReactiveCapabilityCurve,
    ];

    /// Strategies of a run, in application order.
    pub fn for_mode(mode: OpfMode) -> Vec<Constraints> {
        let mut list = Self::COMMON.to_vec();
        if mode == OpfMode::Redispatching {
            list.push(Constraints::CurrentLimit);
        }
        list
    }

    pub fn name(&self) -> &'static str {
        match self {
            Constraints::BranchFlow => "branch_flow",
            Constraints::Transformer3w => "transformer_3w",
            Constraints::DanglingLine => "dangling_line",
            Constraints::Shunt => "shunt",
            Constraints::StaticVarCompensator => "static_var_compensator",
            Constraints::PowerBalance => "power_balance",
            Constraints::Hvdc => "hvdc",
            Constraints::DcNetwork => "dc_network",
            Constraints::ReactiveCapabilityCurve => "reactive_capability_curve",
            Constraints::CurrentLimit => "current_limit",
        }
    }

    pub fn add<M: NlpModel>(
        &self,
        cache: &NetworkCache,
        ctx: &VariableContext,
        params: &OpfParameters,
        model: &mut M,
    ) -> OpfResult<()> {
        let before = model.num_constraints();
        match self {
            Constraints::BranchFlow => {
                for (branch, vars) in cache.branches.iter().zip(&ctx.branches) {
                    branch_flow::add_branch_equations(
                        model,
                        &branch.id,
                        branch.pi,
                        *vars,
                        branch.bus1_num.map(|n| ctx.bus_node(n)),
                        branch.bus2_num.map(|n| ctx.bus_node(n)),
                    );
                }
            }
            Constraints::Transformer3w => {
                transformer3w::add_transformer_3w_constraints(cache, ctx, model)
            }
            Constraints::DanglingLine => {
                transformer3w::add_dangling_line_constraints(cache, ctx, model)
            }
            Constraints::Shunt => shunt::add_shunt_constraints(cache, ctx, model),
            Constraints::StaticVarCompensator => shunt::add_svc_constraints(cache, ctx, model),
            Constraints::PowerBalance => {
                power_balance::add_power_balance_constraints(cache, ctx, model)
            }
            Constraints::Hvdc => hvdc::add_hvdc_constraints(cache, ctx, model),
            Constraints::DcNetwork => dc_network::add_dc_network_constraints(cache, ctx, model),
            Constraints::ReactiveCapabilityCurve => {
                capability_curve::add_capability_curve_constraints(cache, ctx, params, model)?
            }
            Constraints::CurrentLimit => {
                current_limit::add_current_limit_constraints(cache, ctx, model);
            }
        }
        debug!(
            strategy = self.name(),
            added = model.num_constraints() - before,
            "constraints added"
        );
        Ok(())
    }
}
