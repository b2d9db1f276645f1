//! Nonlinear programming boundary.
//!
//! The OPF builder only talks to [`NlpModel`]: register variables with name
//! tags, set bounds and start values, add constraints and the objective, solve,
//! then read the status and values back. [`AugmentedLagrangianModel`] is the
//! built-in implementation; other solvers plug in by implementing the trait.

pub mod augmented_lagrangian;
pub mod expr;

pub use augmented_lagrangian::AugmentedLagrangianModel;
pub use expr::{Expr, LinearExpr, NonlinearExpr, QuadExpr};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a registered decision variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    #[inline]
    pub fn new(value: usize) -> Self {
        VarId(value)
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Handle to a registered constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(usize);

impl ConstraintId {
    #[inline]
    pub fn new(value: usize) -> Self {
        ConstraintId(value)
    }
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintSense {
    Equal,
    LessEqual,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationStatus {
    #[default]
    NotSolved,
    LocallySolved,
    AlmostLocallySolved,
    IterationLimit,
    LocallyInfeasible,
    NumericalError,
}

impl TerminationStatus {
    /// Locally solved, possibly to a relaxed tolerance
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TerminationStatus::LocallySolved | TerminationStatus::AlmostLocallySolved
        )
    }
}

impl fmt::Display for TerminationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminationStatus::NotSolved => "NOT_SOLVED",
            TerminationStatus::LocallySolved => "LOCALLY_SOLVED",
            TerminationStatus::AlmostLocallySolved => "ALMOST_LOCALLY_SOLVED",
            TerminationStatus::IterationLimit => "ITERATION_LIMIT",
            TerminationStatus::LocallyInfeasible => "LOCALLY_INFEASIBLE",
            TerminationStatus::NumericalError => "NUMERICAL_ERROR",
        };
        f.write_str(name)
    }
}

/// Settings of the built-in augmented Lagrangian solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Multiplier/penalty updates
    pub max_outer_iterations: usize,
    /// L-BFGS iterations per outer iteration
    pub max_inner_iterations: u64,
    /// Feasibility tolerance on constraints and bounds
    pub tolerance: f64,
    pub initial_penalty: f64,
    pub penalty_growth: f64,
    pub max_penalty: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_outer_iterations: 50,
            max_inner_iterations: 500,
            tolerance: 1e-6,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e9,
        }
    }
}

/// Nonlinear program the OPF is assembled into.
pub trait NlpModel {
    /// Register a free variable named `name`.
    fn add_variable(&mut self, name: &str) -> VarId;

    fn set_variable_bounds(&mut self, var: VarId, lb: f64, ub: f64);

    fn set_variable_start(&mut self, var: VarId, start: f64);

    /// Register `expr sense rhs`.
    fn add_constraint(
        &mut self,
        name: &str,
        expr: Expr,
        sense: ConstraintSense,
        rhs: f64,
    ) -> ConstraintId;

    /// Minimize the sum of `terms`. Replaces any previous objective.
    fn set_objective(&mut self, terms: Vec<Expr>);

    /// Blocking solve.
    fn optimize(&mut self);

    fn termination_status(&self) -> TerminationStatus;

    /// Solved value, or the start value before `optimize`.
    fn value(&self, var: VarId) -> f64;

    fn num_variables(&self) -> usize;

    fn num_constraints(&self) -> usize;

    fn variable_name(&self, var: VarId) -> &str;

    fn variable_bounds(&self, var: VarId) -> (f64, f64);

    fn constraint_name(&self, constraint: ConstraintId) -> &str;

    /// Amount by which the constraint is violated at the current values.
    fn constraint_violation(&self, constraint: ConstraintId) -> f64;

    fn objective_value(&self) -> f64;

    fn iterations(&self) -> usize;
}
