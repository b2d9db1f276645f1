//! Post-solve violation scan.
//!
//! Never fails: every finding is logged and collected into a
//! [`Diagnostics`] report.

use super::bounds::Bounds;
use crate::solver::{ConstraintId, NlpModel, TerminationStatus, VarId};
use gridopf_core::{DiagnosticIssue, Diagnostics, Severity};
use tracing::warn;

/// Report variables outside their bounds and constraints whose residual
/// exceeds `tolerance`.
pub fn scan_violations<M: NlpModel>(model: &M, tolerance: f64) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();

    let status = model.termination_status();
    if !status.is_success() {
        let severity = match status {
            TerminationStatus::IterationLimit => Severity::Warning,
            _ => Severity::Error,
        };
        warn!(%status, "solver did not converge");
        diagnostics.add(DiagnosticIssue::new(
            severity,
            "solver",
            format!("termination status {}", status),
        ));
    }

    for k in 0..model.num_variables() {
        let var = VarId::new(k);
        let value = model.value(var);
        let (lb, ub) = model.variable_bounds(var);
        let bounds = Bounds::new(lb, ub);
        if bounds.contains(value) {
            continue;
        }
        let name = model.variable_name(var);
        let limit = if value < lb { lb } else { ub };
        warn!(variable = name, value, bounds = %bounds, "variable outside its bounds");
        diagnostics.add(
            DiagnosticIssue::new(Severity::Warning, "bounds", "variable outside its bounds")
                .with_entity(name)
                .with_value(value, limit),
        );
    }

    for k in 0..model.num_constraints() {
        let constraint = ConstraintId::new(k);
        let violation = model.constraint_violation(constraint);
        if violation.is_finite() && violation <= tolerance {
            continue;
        }
        let name = model.constraint_name(constraint);
        warn!(constraint = name, violation, "constraint residual above tolerance");
        diagnostics.add(
            DiagnosticIssue::new(
                Severity::Warning,
                "constraint",
                "constraint residual above tolerance",
            )
            .with_entity(name)
            .with_value(violation, tolerance),
        );
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{AugmentedLagrangianModel, ConstraintSense, LinearExpr};

    #[test]
    fn test_reports_bound_and_residual_violations() {
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        let y = model.add_variable("y");
        model.set_variable_bounds(x, 0.0, 1.0);
        model.set_variable_start(x, 2.0);
        model.set_variable_start(y, 0.5);
        model.add_constraint(
            "y_is_zero",
            LinearExpr::new().term(y, 1.0).into(),
            ConstraintSense::Equal,
            0.0,
        );

        let diagnostics = scan_violations(&model, 1e-6);
        let bounds: Vec<_> = diagnostics.issues_by_category("bounds").collect();
        assert_eq!(bounds.len(), 1);
        assert_eq!(bounds[0].entity.as_deref(), Some("x"));
        assert_eq!(bounds[0].limit, Some(1.0));
        let residuals: Vec<_> = diagnostics.issues_by_category("constraint").collect();
        assert_eq!(residuals.len(), 1);
        assert_eq!(residuals[0].entity.as_deref(), Some("y_is_zero"));
        // not solved yet
        assert_eq!(diagnostics.issues_by_category("solver").count(), 1);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn test_clean_solution_has_no_bound_issues() {
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        model.set_variable_bounds(x, 0.0, 1.0);
        model.set_variable_start(x, 1.0 + 1e-9);
        let diagnostics = scan_violations(&model, 1e-6);
        assert_eq!(diagnostics.issues_by_category("bounds").count(), 0);
    }
}
