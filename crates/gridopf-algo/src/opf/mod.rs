//! AC optimal power flow over a [`Network`].
//!
//! A run reads the network in per-unit into a [`NetworkCache`], allocates
//! decision variables ([`VariableContext`]), bounds them ([`VariableBounds`]),
//! adds the physics ([`Constraints`]) and one objective ([`CostFunctionKind`]),
//! then hands everything to an [`NlpModel`]. The solution is written back to
//! the network in SI units.
//!
//! ```ignore
//! use gridopf_algo::{OpfMode, OpfParameters, OptimalPowerFlow};
//!
//! let opf = OptimalPowerFlow::new(OpfParameters::new().with_mode(OpfMode::Redispatching));
//! let result = opf.run(&mut network)?;
//! println!("{} after {} iterations", result.status, result.iterations);
//! ```

pub mod bounds;
pub mod constraints;
pub mod convex_hull;
pub mod costs;
pub mod diagnostics;
pub mod model;
pub mod network_cache;
pub mod parameters;
pub mod variable_bounds;
pub mod variable_context;

pub use bounds::Bounds;
pub use constraints::Constraints;
pub use model::{ModelState, OpfModel};
pub use network_cache::NetworkCache;
pub use parameters::{CostFunctionKind, OpfMode, OpfParameters};
pub use variable_bounds::VariableBounds;
pub use variable_context::{BranchRegime, BranchVars, VariableContext};

use crate::error::OpfResult;
use crate::solver::{AugmentedLagrangianModel, NlpModel, TerminationStatus};
use gridopf_core::{Diagnostics, Network};
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of one OPF run.
#[derive(Debug, Clone, Serialize)]
pub struct OpfRunResult {
    pub status: TerminationStatus,
    pub converged: bool,
    pub objective: f64,
    pub iterations: usize,
    pub solve_time_ms: u128,
    pub num_variables: usize,
    pub num_constraints: usize,
    pub diagnostics: Diagnostics,
    /// Whether the solution was written back to the network
    pub applied: bool,
}

/// Optimal power flow runner
pub struct OptimalPowerFlow {
    params: OpfParameters,
}

impl OptimalPowerFlow {
    pub fn new(params: OpfParameters) -> Self {
        Self { params }
    }

    /// Set the run mode, keeping the other parameters
    pub fn with_mode(mut self, mode: OpfMode) -> Self {
        self.params.mode = mode;
        self
    }

    /// Force an objective instead of the one implied by the mode
    pub fn with_cost_function(mut self, kind: CostFunctionKind) -> Self {
        self.params.cost_function = Some(kind);
        self
    }

    pub fn params(&self) -> &OpfParameters {
        &self.params
    }

    /// Run with the built-in augmented Lagrangian solver.
    pub fn run(&self, network: &mut Network) -> OpfResult<OpfRunResult> {
        self.run_with(network, AugmentedLagrangianModel::new(self.params.solver.clone()))
    }

    /// Run with any [`NlpModel`].
    pub fn run_with<M: NlpModel>(&self, network: &mut Network, solver: M) -> OpfResult<OpfRunResult> {
        let mut model = OpfModel::build(network, self.params.clone(), solver)?;
        let status = model.solve()?;
        model.diagnose()?;

        let mut result = OpfRunResult {
            status,
            converged: status.is_success(),
            objective: model.solver().objective_value(),
            iterations: model.solver().iterations(),
            solve_time_ms: model.solve_time_ms(),
            num_variables: model.solver().num_variables(),
            num_constraints: model.solver().num_constraints(),
            diagnostics: Diagnostics::new(),
            applied: false,
        };

        if status.is_success() || self.params.apply_on_failure {
            result.diagnostics = model.apply()?;
            result.applied = true;
        } else {
            warn!(%status, "solution not applied to the network");
            result.diagnostics = model.diagnostics().clone();
        }

        info!(
            %status,
            applied = result.applied,
            warnings = result.diagnostics.warning_count(),
            errors = result.diagnostics.error_count(),
            "OPF run finished"
        );
        Ok(result)
    }
}

impl Default for OptimalPowerFlow {
    fn default() -> Self {
        Self::new(OpfParameters::default())
    }
}
