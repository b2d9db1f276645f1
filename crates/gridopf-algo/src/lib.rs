//! # gridopf-algo: AC optimal power flow
//!
//! Builds a nonlinear optimal power flow problem from a
//! [`gridopf_core::Network`], solves it and writes the operating point back.
//!
//! ## Modes and objectives
//!
//! | Mode | Default objective | Extra constraints |
//! |------|-------------------|-------------------|
//! | [`OpfMode::Loadflow`] | stay close to the input set points | none |
//! | [`OpfMode::Redispatching`] | reference tracking plus a linear dispatch bias | permanent current limits |
//!
//! Any [`CostFunctionKind`] can be forced through
//! [`OpfParameters::cost_function`]: losses, DC losses, or DC voltage
//! maximization are also available.
//!
//! ### Architecture
//!
//! - **[`opf::NetworkCache`]**: per-unit snapshot of the live network
//! - **[`opf::VariableContext`]**: one optional variable slot per quantity
//! - **[`opf::VariableBounds`]**: bound strategies, applied in a fixed order
//! - **[`opf::Constraints`]**: one constraint strategy per equipment family
//! - **[`solver::NlpModel`]**: solver boundary, with the built-in
//!   [`solver::AugmentedLagrangianModel`] (L-BFGS inner loop via `argmin`)
//!
//! ## Example
//!
//! ```ignore
//! use gridopf_algo::{OpfParameters, OptimalPowerFlow};
//!
//! let params = OpfParameters::load(Path::new("opf.toml"))?;
//! let result = OptimalPowerFlow::new(params).run(&mut network)?;
//! if !result.converged {
//!     eprintln!("{}", result.diagnostics);
//! }
//! ```

pub mod error;
pub mod opf;
pub mod solver;

pub use error::{OpfError, OpfResult};
pub use opf::{
    CostFunctionKind, ModelState, OpfModel, OpfMode, OpfParameters, OpfRunResult,
    OptimalPowerFlow,
};
pub use solver::{AugmentedLagrangianModel, NlpModel, SolverSettings, TerminationStatus};
