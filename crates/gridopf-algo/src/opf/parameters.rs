//! OPF run parameters.
//!
//! Parameters deserialize from TOML with every field optional; unspecified
//! values take the defaults below.
//!
//! ```toml
//! mode = "redispatching"
//! reactive_bounds_reduction = 0.05
//!
//! [solver]
//! tolerance = 1e-7
//! ```

use crate::error::{OpfError, OpfResult};
use crate::solver::SolverSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// What the run is for. Redispatching adds current limits and a linear
/// dispatch-reduction bias.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpfMode {
    #[default]
    Loadflow,
    Redispatching,
}

impl fmt::Display for OpfMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpfMode::Loadflow => write!(f, "loadflow"),
            OpfMode::Redispatching => write!(f, "redispatching"),
        }
    }
}

impl std::str::FromStr for OpfMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loadflow" | "lf" => Ok(OpfMode::Loadflow),
            "redispatching" | "redispatch" => Ok(OpfMode::Redispatching),
            _ => Err(format!("Unknown OPF mode: {}", s)),
        }
    }
}

/// Objective selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFunctionKind {
    MinimizeAgainstReference,
    MinimizeLosses,
    MinimizeDcLosses,
    Redispatching,
    MaximizeDcVoltage,
}

impl fmt::Display for CostFunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostFunctionKind::MinimizeAgainstReference => write!(f, "minimize_against_reference"),
            CostFunctionKind::MinimizeLosses => write!(f, "minimize_losses"),
            CostFunctionKind::MinimizeDcLosses => write!(f, "minimize_dc_losses"),
            CostFunctionKind::Redispatching => write!(f, "redispatching"),
            CostFunctionKind::MaximizeDcVoltage => write!(f, "maximize_dc_voltage"),
        }
    }
}

impl std::str::FromStr for CostFunctionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "minimize_against_reference" | "reference" => {
                Ok(CostFunctionKind::MinimizeAgainstReference)
            }
            "minimize_losses" | "losses" => Ok(CostFunctionKind::MinimizeLosses),
            "minimize_dc_losses" | "dc_losses" => Ok(CostFunctionKind::MinimizeDcLosses),
            "redispatching" => Ok(CostFunctionKind::Redispatching),
            "maximize_dc_voltage" | "dc_voltage" => Ok(CostFunctionKind::MaximizeDcVoltage),
            _ => Err(format!("Unknown cost function: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpfParameters {
    pub mode: OpfMode,

    /// Explicit objective; derived from `mode` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_function: Option<CostFunctionKind>,

    /// Fraction by which reactive capability is shrunk toward zero.
    pub reactive_bounds_reduction: f64,

    /// Split a two-winding transformer's magnetizing admittance evenly
    /// between both sides instead of putting it all on side 1.
    pub twt_split_shunt_admittance: bool,

    /// Per-unit voltage range for buses without limits and for fictitious
    /// buses (three-winding star points, dangling-line boundaries).
    pub default_voltage_bounds: (f64, f64),

    /// DC node voltage range (kV).
    pub dc_node_voltage_bounds: (f64, f64),

    /// DC line current range (kA).
    pub dc_line_current_bounds: (f64, f64),

    /// Weight of the linear dispatch term of the redispatching objective.
    pub redispatching_linear_weight: f64,

    /// Weight of the DC voltage term of the DC-voltage-maximizing objective.
    pub dc_voltage_weight: f64,

    /// Write the solution back even when the solver did not converge.
    pub apply_on_failure: bool,

    pub solver: SolverSettings,
}

impl Default for OpfParameters {
    fn default() -> Self {
        Self {
            mode: OpfMode::Loadflow,
            cost_function: None,
            reactive_bounds_reduction: 0.1,
            twt_split_shunt_admittance: false,
            default_voltage_bounds: (0.8, 1.1),
            dc_node_voltage_bounds: (0.0, 600.0),
            dc_line_current_bounds: (-100.0, 100.0),
            redispatching_linear_weight: 1.0,
            dc_voltage_weight: 1.0,
            apply_on_failure: true,
            solver: SolverSettings::default(),
        }
    }
}

impl OpfParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: OpfMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cost_function(mut self, kind: CostFunctionKind) -> Self {
        self.cost_function = Some(kind);
        self
    }

    pub fn with_reactive_bounds_reduction(mut self, fraction: f64) -> Self {
        self.reactive_bounds_reduction = fraction;
        self
    }

    pub fn with_twt_split_shunt_admittance(mut self, split: bool) -> Self {
        self.twt_split_shunt_admittance = split;
        self
    }

    pub fn with_solver(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    /// The objective used for this run.
    pub fn effective_cost_function(&self) -> CostFunctionKind {
        self.cost_function.unwrap_or(match self.mode {
            OpfMode::Loadflow => CostFunctionKind::MinimizeAgainstReference,
            OpfMode::Redispatching => CostFunctionKind::Redispatching,
        })
    }

    pub fn validate(&self) -> OpfResult<()> {
        if !(0.0..1.0).contains(&self.reactive_bounds_reduction) {
            return Err(OpfError::Config(format!(
                "reactive_bounds_reduction must be in [0, 1), got {}",
                self.reactive_bounds_reduction
            )));
        }
        for (name, (lo, hi)) in [
            ("default_voltage_bounds", self.default_voltage_bounds),
            ("dc_node_voltage_bounds", self.dc_node_voltage_bounds),
            ("dc_line_current_bounds", self.dc_line_current_bounds),
        ] {
            if lo > hi {
                return Err(OpfError::Config(format!(
                    "{} is inverted: [{}, {}]",
                    name, lo, hi
                )));
            }
        }
        if self.solver.tolerance <= 0.0 {
            return Err(OpfError::Config("solver tolerance must be positive".into()));
        }
        if self.solver.initial_penalty <= 0.0 || self.solver.penalty_growth <= 1.0 {
            return Err(OpfError::Config(
                "penalty must start positive and grow by a factor above 1".into(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> OpfResult<Self> {
        let params: Self = toml::from_str(contents)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load(path: &Path) -> OpfResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save(&self, path: &Path) -> OpfResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| OpfError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let params = OpfParameters::default();
        assert_eq!(params.mode, OpfMode::Loadflow);
        assert_eq!(params.reactive_bounds_reduction, 0.1);
        assert_eq!(params.dc_node_voltage_bounds, (0.0, 600.0));
        assert_eq!(params.dc_line_current_bounds, (-100.0, 100.0));
        assert_eq!(
            params.effective_cost_function(),
            CostFunctionKind::MinimizeAgainstReference
        );
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let params = OpfParameters::from_toml_str(
            r#"
            mode = "redispatching"
            dc_node_voltage_bounds = [-10.0, 800.0]

            [solver]
            max_outer_iterations = 7
            "#,
        )
        .unwrap();
        assert_eq!(params.mode, OpfMode::Redispatching);
        assert_eq!(params.effective_cost_function(), CostFunctionKind::Redispatching);
        assert_eq!(params.dc_node_voltage_bounds, (-10.0, 800.0));
        assert_eq!(params.solver.max_outer_iterations, 7);
        assert_eq!(params.solver.tolerance, 1e-6);
    }

    #[test]
    fn test_invalid_reduction_rejected() {
        let result = OpfParameters::from_toml_str("reactive_bounds_reduction = 1.5");
        assert!(matches!(result, Err(OpfError::Config(_))));
    }

    #[test]
    fn test_unknown_mode_is_a_config_error() {
        let result = OpfParameters::from_toml_str("mode = \"security\"");
        assert!(matches!(result, Err(OpfError::Config(_))));
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "cost_function = \"minimize_losses\"").unwrap();
        let params = OpfParameters::load(file.path()).unwrap();
        assert_eq!(params.effective_cost_function(), CostFunctionKind::MinimizeLosses);

        let out = NamedTempFile::new().unwrap();
        params.save(out.path()).unwrap();
        let reloaded = OpfParameters::load(out.path()).unwrap();
        assert_eq!(reloaded, params);
    }

    #[test]
    fn test_mode_and_cost_function_parsing() {
        assert_eq!("LF".parse::<OpfMode>().unwrap(), OpfMode::Loadflow);
        assert_eq!(
            "dc-losses".parse::<CostFunctionKind>().unwrap(),
            CostFunctionKind::MinimizeDcLosses
        );
        assert!("nope".parse::<CostFunctionKind>().is_err());
        assert_eq!(CostFunctionKind::MaximizeDcVoltage.to_string(), "maximize_dc_voltage");
    }
}
