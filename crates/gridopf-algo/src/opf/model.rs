//! OPF model lifecycle.
//!
//! ```text
//! Built ──solve──▶ Solved ──diagnose──▶ Diagnosed ──apply──▶ Applied
//!                    └───────────────apply──────────────────▶
//! ```
//!
//! The model holds the network in per-unit for its whole life. Applying the
//! solution, or dropping the model, restores the previous view.

use super::constraints::Constraints;
use super::diagnostics::scan_violations;
use super::network_cache::NetworkCache;
use super::parameters::OpfParameters;
use super::variable_bounds::VariableBounds;
use super::variable_context::VariableContext;
use crate::error::{OpfError, OpfResult};
use crate::solver::{NlpModel, TerminationStatus};
use gridopf_core::{Diagnostics, Network, PerUnitScope};
use tracing::{info, warn};
use web_time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Built,
    Solved,
    Diagnosed,
    Applied,
}

pub struct OpfModel<'n, M: NlpModel> {
    network: PerUnitScope<'n>,
    params: OpfParameters,
    cache: NetworkCache,
    context: VariableContext,
    solver: M,
    state: ModelState,
    diagnostics: Diagnostics,
    solve_time_ms: u128,
}

impl<'n, M: NlpModel> OpfModel<'n, M> {
    /// Assemble the whole problem: variables, bounds, constraints, objective.
    pub fn build(network: &'n mut Network, params: OpfParameters, mut solver: M) -> OpfResult<Self> {
        params.validate()?;
        network.check_voltage_levels()?;
        let network = PerUnitScope::new(network);
        let cache = NetworkCache::build(&network, &params)?;
        let context = VariableContext::build(&cache, &params, &mut solver);

        for strategy in VariableBounds::ORDER {
            strategy.apply(&cache, &context, &params, &mut solver);
        }
        for strategy in Constraints::for_mode(params.mode) {
            strategy.add(&cache, &context, &params, &mut solver)?;
        }
        let cost_function = params.effective_cost_function();
        solver.set_objective(cost_function.terms(&cache, &context, &params));

        info!(
            mode = %params.mode,
            cost_function = %cost_function,
            variables = solver.num_variables(),
            constraints = solver.num_constraints(),
            "OPF model built"
        );

        Ok(Self {
            network,
            params,
            cache,
            context,
            solver,
            state: ModelState::Built,
            diagnostics: Diagnostics::new(),
            solve_time_ms: 0,
        })
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn cache(&self) -> &NetworkCache {
        &self.cache
    }

    pub fn context(&self) -> &VariableContext {
        &self.context
    }

    pub fn solver(&self) -> &M {
        &self.solver
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn solve_time_ms(&self) -> u128 {
        self.solve_time_ms
    }

    fn expect_state(&self, allowed: &[ModelState], action: &str) -> OpfResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(OpfError::Model(format!(
                "cannot {} a model in state {:?}",
                action, self.state
            )))
        }
    }

    /// Run the solver. A non-converged status is returned, not raised.
    pub fn solve(&mut self) -> OpfResult<TerminationStatus> {
        self.expect_state(&[ModelState::Built], "solve")?;
        let start = Instant::now();
        self.solver.optimize();
        self.solve_time_ms = start.elapsed().as_millis();
        self.state = ModelState::Solved;

        let status = self.solver.termination_status();
        if status.is_success() {
            info!(
                %status,
                objective = self.solver.objective_value(),
                iterations = self.solver.iterations(),
                solve_time_ms = self.solve_time_ms as u64,
                "OPF solved"
            );
        } else {
            warn!(%status, iterations = self.solver.iterations(), "OPF did not converge");
        }
        Ok(status)
    }

    /// Scan the solution for bound and constraint violations.
    pub fn diagnose(&mut self) -> OpfResult<&Diagnostics> {
        self.expect_state(&[ModelState::Solved], "diagnose")?;
        // solutions accepted as almost solved sit within 100x the tolerance
        let tolerance = 100.0 * self.params.solver.tolerance;
        self.diagnostics = scan_violations(&self.solver, tolerance);
        if self.diagnostics.has_issues() {
            info!(summary = %self.diagnostics.summary(), "OPF diagnostics");
        }
        self.state = ModelState::Diagnosed;
        Ok(&self.diagnostics)
    }

    /// Write the solution back and leave per-unit mode.
    pub fn apply(mut self) -> OpfResult<Diagnostics> {
        self.expect_state(&[ModelState::Solved, ModelState::Diagnosed], "apply")?;
        self.context
            .update_network(&self.solver, &self.cache, &mut self.network)?;
        self.state = ModelState::Applied;
        Ok(self.diagnostics)
    }
}
