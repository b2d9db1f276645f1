//! # Augmented Lagrangian NLP solver with L-BFGS
//!
//! Built-in [`NlpModel`] implementation. The constrained problem
//!
//! ```text
//! minimize    f(x)
//! subject to  h(x) = 0,  g(x) ≤ 0,  lb ≤ x ≤ ub
//! ```
//!
//! is solved as a sequence of unconstrained minimizations of
//!
//! ```text
//! L(x; λ, μ) = f(x) + Σ λ_i h_i + μ/2 Σ h_i²
//!            + 1/(2μ) Σ ( max(0, λ_j + μ g_j)² - λ_j² )
//! ```
//!
//! where finite variable bounds are handled as extra inequality rows. Each
//! inner problem is minimized with L-BFGS (More-Thuente line search, memory 7).
//! After each inner solve the multipliers are updated
//! (`λ_i ← λ_i + μ h_i`, `λ_j ← max(0, λ_j + μ g_j)`) and μ is multiplied by
//! the growth factor when the maximum violation did not drop below a quarter
//! of its previous value.
//!
//! Variables whose lower and upper bounds coincide are fixed and removed from
//! the inner problem. The final point is projected onto the variable box.
//!
//! ## References
//!
//! - **Nocedal & Wright (2006)**: "Numerical Optimization", 2nd Ed., Ch. 17.
//!   DOI: [10.1007/978-0-387-40065-5](https://doi.org/10.1007/978-0-387-40065-5)
//! - **Birgin & Martínez (2014)**: "Practical Augmented Lagrangian Methods for
//!   Constrained Optimization". SIAM. DOI: [10.1137/1.9781611973365](https://doi.org/10.1137/1.9781611973365)

use super::{
    ConstraintId, ConstraintSense, Expr, NlpModel, SolverSettings, TerminationStatus, VarId,
};
use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use tracing::debug;

struct ConstraintRow {
    name: String,
    expr: Expr,
    sense: ConstraintSense,
    rhs: f64,
}

impl ConstraintRow {
    /// `h(x)` for equalities, `g(x)` with `g ≤ 0` for inequalities
    fn normalized(&self, x: &[f64]) -> f64 {
        let value = self.expr.eval(x);
        match self.sense {
            ConstraintSense::Equal | ConstraintSense::LessEqual => value - self.rhs,
            ConstraintSense::GreaterEqual => self.rhs - value,
        }
    }

    fn sign(&self) -> f64 {
        match self.sense {
            ConstraintSense::GreaterEqual => -1.0,
            _ => 1.0,
        }
    }

    fn violation(&self, x: &[f64]) -> f64 {
        let g = self.normalized(x);
        match self.sense {
            ConstraintSense::Equal => g.abs(),
            _ => g.max(0.0),
        }
    }
}

/// Augmented Lagrangian solver state and model storage.
pub struct AugmentedLagrangianModel {
    settings: SolverSettings,
    names: Vec<String>,
    lb: Vec<f64>,
    ub: Vec<f64>,
    values: Vec<f64>,
    rows: Vec<ConstraintRow>,
    objective: Vec<Expr>,
    status: TerminationStatus,
    iterations: usize,
    objective_value: f64,
}

struct Multipliers {
    rows: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// Inner unconstrained problem over the free variables.
struct Lagrangian<'a> {
    model: &'a AugmentedLagrangianModel,
    free: &'a [usize],
    template: &'a [f64],
    multipliers: &'a Multipliers,
    mu: f64,
}

#[inline]
fn inequality_term(lambda: f64, g: f64, mu: f64) -> f64 {
    let shifted = (lambda + mu * g).max(0.0);
    (shifted * shifted - lambda * lambda) / (2.0 * mu)
}

impl<'a> Lagrangian<'a> {
    fn expand(&self, reduced: &[f64]) -> Vec<f64> {
        let mut x = self.template.to_vec();
        for (k, &i) in self.free.iter().enumerate() {
            x[i] = reduced[k];
        }
        x
    }

    fn value(&self, x: &[f64]) -> f64 {
        let mu = self.mu;
        let mut total = self.model.objective_at(x);
        for (row, &lambda) in self.model.rows.iter().zip(&self.multipliers.rows) {
            let g = row.normalized(x);
            total += match row.sense {
                ConstraintSense::Equal => lambda * g + 0.5 * mu * g * g,
                _ => inequality_term(lambda, g, mu),
            };
        }
        for &i in self.free {
            if self.model.lb[i].is_finite() {
                total += inequality_term(self.multipliers.lower[i], self.model.lb[i] - x[i], mu);
            }
            if self.model.ub[i].is_finite() {
                total += inequality_term(self.multipliers.upper[i], x[i] - self.model.ub[i], mu);
            }
        }
        total
    }

    fn full_gradient(&self, x: &[f64]) -> Vec<f64> {
        let mu = self.mu;
        let mut grad = vec![0.0; x.len()];
        for term in &self.model.objective {
            term.add_gradient(x, 1.0, &mut grad);
        }
        for (row, &lambda) in self.model.rows.iter().zip(&self.multipliers.rows) {
            let g = row.normalized(x);
            let factor = match row.sense {
                ConstraintSense::Equal => lambda + mu * g,
                _ => (lambda + mu * g).max(0.0),
            };
            if factor != 0.0 {
                row.expr.add_gradient(x, factor * row.sign(), &mut grad);
            }
        }
        for &i in self.free {
            if self.model.lb[i].is_finite() {
                let g = self.model.lb[i] - x[i];
                grad[i] -= (self.multipliers.lower[i] + mu * g).max(0.0);
            }
            if self.model.ub[i].is_finite() {
                let g = x[i] - self.model.ub[i];
                grad[i] += (self.multipliers.upper[i] + mu * g).max(0.0);
            }
        }
        grad
    }

    fn reduced_gradient(&self, reduced: &[f64]) -> Vec<f64> {
        let full = self.full_gradient(&self.expand(reduced));
        self.free.iter().map(|&i| full[i]).collect()
    }

    /// Steepest descent with Armijo backtracking, used when L-BFGS bails out.
    fn descend(&self, mut reduced: Vec<f64>, max_iters: u64) -> (Vec<f64>, u64) {
        let mut fx = self.value(&self.expand(&reduced));
        let mut iters = 0;
        while iters < max_iters {
            iters += 1;
            let grad = self.reduced_gradient(&reduced);
            let norm2: f64 = grad.iter().map(|g| g * g).sum();
            if norm2 < 1e-20 || !norm2.is_finite() {
                break;
            }
            let mut step = 1.0 / norm2.sqrt().max(1.0);
            let accepted = loop {
                let candidate: Vec<f64> = reduced
                    .iter()
                    .zip(&grad)
                    .map(|(x, g)| x - step * g)
                    .collect();
                let fc = self.value(&self.expand(&candidate));
                if fc <= fx - 1e-4 * step * norm2 {
                    fx = fc;
                    break Some(candidate);
                }
                step *= 0.5;
                if step < 1e-14 {
                    break None;
                }
            };
            match accepted {
                Some(candidate) => reduced = candidate,
                None => break,
            }
        }
        (reduced, iters)
    }
}

impl CostFunction for Lagrangian<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        Ok(self.value(&self.expand(x)))
    }
}

impl Gradient for Lagrangian<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        Ok(self.reduced_gradient(x))
    }
}

impl Default for AugmentedLagrangianModel {
    fn default() -> Self {
        Self::new(SolverSettings::default())
    }
}

impl AugmentedLagrangianModel {
    pub fn new(settings: SolverSettings) -> Self {
        Self {
            settings,
            names: Vec::new(),
            lb: Vec::new(),
            ub: Vec::new(),
            values: Vec::new(),
            rows: Vec::new(),
            objective: Vec::new(),
            status: TerminationStatus::NotSolved,
            iterations: 0,
            objective_value: f64::NAN,
        }
    }

    fn objective_at(&self, x: &[f64]) -> f64 {
        self.objective.iter().map(|term| term.eval(x)).sum()
    }

    fn max_violation(&self, x: &[f64]) -> f64 {
        let rows = self
            .rows
            .iter()
            .map(|row| row.violation(x))
            .fold(0.0, f64::max);
        let bounds = x
            .iter()
            .enumerate()
            .map(|(i, &xi)| (self.lb[i] - xi).max(xi - self.ub[i]).max(0.0))
            .fold(0.0, f64::max);
        rows.max(bounds)
    }

    fn project_onto_bounds(&self, x: &mut [f64]) {
        for (i, xi) in x.iter_mut().enumerate() {
            *xi = xi.max(self.lb[i]).min(self.ub[i]);
        }
    }

    fn update_multipliers(&self, x: &[f64], multipliers: &mut Multipliers, mu: f64) {
        for (row, lambda) in self.rows.iter().zip(multipliers.rows.iter_mut()) {
            let g = row.normalized(x);
            *lambda = match row.sense {
                ConstraintSense::Equal => *lambda + mu * g,
                _ => (*lambda + mu * g).max(0.0),
            };
        }
        for i in 0..x.len() {
            if self.lb[i].is_finite() {
                multipliers.lower[i] = (multipliers.lower[i] + mu * (self.lb[i] - x[i])).max(0.0);
            }
            if self.ub[i].is_finite() {
                multipliers.upper[i] = (multipliers.upper[i] + mu * (x[i] - self.ub[i])).max(0.0);
            }
        }
    }

    /// Runs the outer loop and returns `(x, status, inner iterations)`.
    fn solve(&self) -> (Vec<f64>, TerminationStatus, usize) {
        let n = self.names.len();
        let settings = &self.settings;
        let mut x: Vec<f64> = (0..n)
            .map(|i| self.values[i].max(self.lb[i]).min(self.ub[i]))
            .collect();
        let free: Vec<usize> = (0..n).filter(|&i| self.lb[i] < self.ub[i]).collect();
        let mut multipliers = Multipliers {
            rows: vec![0.0; self.rows.len()],
            lower: vec![0.0; n],
            upper: vec![0.0; n],
        };
        let mut mu = settings.initial_penalty;
        let mut previous = f64::INFINITY;
        let mut total_iterations = 0;
        let mut numerical_error = false;

        for outer in 0..settings.max_outer_iterations {
            if !free.is_empty() {
                let reduced: Vec<f64> = free.iter().map(|&i| x[i]).collect();
                let problem = Lagrangian {
                    model: self,
                    free: &free,
                    template: &x,
                    multipliers: &multipliers,
                    mu,
                };

                let linesearch = MoreThuenteLineSearch::new();
                let solver = LBFGS::new(linesearch, 7);
                let result = Executor::new(problem, solver)
                    .configure(|state| {
                        state
                            .param(reduced.clone())
                            .max_iters(settings.max_inner_iterations)
                    })
                    .run();

                let improved = match result {
                    Ok(res) => {
                        total_iterations += res.state().get_iter() as usize;
                        res.state().get_best_param().cloned()
                    }
                    Err(err) => {
                        debug!(outer, error = %err, "L-BFGS failed, falling back to steepest descent");
                        let fallback = Lagrangian {
                            model: self,
                            free: &free,
                            template: &x,
                            multipliers: &multipliers,
                            mu,
                        };
                        let (descended, iters) =
                            fallback.descend(reduced, settings.max_inner_iterations);
                        total_iterations += iters as usize;
                        Some(descended)
                    }
                };
                if let Some(best) = improved {
                    for (k, &i) in free.iter().enumerate() {
                        x[i] = best[k];
                    }
                }
            }

            let violation = self.max_violation(&x);
            debug!(outer, violation, mu, "augmented Lagrangian iteration");
            if !violation.is_finite() || x.iter().any(|v| !v.is_finite()) {
                numerical_error = true;
                break;
            }
            if violation <= settings.tolerance {
                break;
            }

            self.update_multipliers(&x, &mut multipliers, mu);
            if violation > 0.25 * previous {
                mu = (mu * settings.penalty_growth).min(settings.max_penalty);
            }
            previous = violation;
        }

        if numerical_error {
            return (x, TerminationStatus::NumericalError, total_iterations);
        }

        self.project_onto_bounds(&mut x);
        let violation = self.max_violation(&x);
        let status = if violation <= settings.tolerance {
            TerminationStatus::LocallySolved
        } else if violation <= 100.0 * settings.tolerance {
            TerminationStatus::AlmostLocallySolved
        } else if mu >= settings.max_penalty {
            TerminationStatus::LocallyInfeasible
        } else {
            TerminationStatus::IterationLimit
        };
        (x, status, total_iterations)
    }
}

impl NlpModel for AugmentedLagrangianModel {
    fn add_variable(&mut self, name: &str) -> VarId {
        self.names.push(name.to_string());
        self.lb.push(f64::NEG_INFINITY);
        self.ub.push(f64::INFINITY);
        self.values.push(0.0);
        VarId::new(self.names.len() - 1)
    }

    fn set_variable_bounds(&mut self, var: VarId, lb: f64, ub: f64) {
        self.lb[var.index()] = lb;
        self.ub[var.index()] = ub;
    }

    fn set_variable_start(&mut self, var: VarId, start: f64) {
        self.values[var.index()] = start;
    }

    fn add_constraint(
        &mut self,
        name: &str,
        expr: Expr,
        sense: ConstraintSense,
        rhs: f64,
    ) -> ConstraintId {
        self.rows.push(ConstraintRow {
            name: name.to_string(),
            expr,
            sense,
            rhs,
        });
        ConstraintId::new(self.rows.len() - 1)
    }

    fn set_objective(&mut self, terms: Vec<Expr>) {
        self.objective = terms;
    }

    fn optimize(&mut self) {
        let (x, status, iterations) = self.solve();
        self.objective_value = self.objective_at(&x);
        self.values = x;
        self.status = status;
        self.iterations = iterations;
    }

    fn termination_status(&self) -> TerminationStatus {
        self.status
    }

    fn value(&self, var: VarId) -> f64 {
        self.values[var.index()]
    }

    fn num_variables(&self) -> usize {
        self.names.len()
    }

    fn num_constraints(&self) -> usize {
        self.rows.len()
    }

    fn variable_name(&self, var: VarId) -> &str {
        &self.names[var.index()]
    }

    fn variable_bounds(&self, var: VarId) -> (f64, f64) {
        (self.lb[var.index()], self.ub[var.index()])
    }

    fn constraint_name(&self, constraint: ConstraintId) -> &str {
        &self.rows[constraint.index()].name
    }

    fn constraint_violation(&self, constraint: ConstraintId) -> f64 {
        self.rows[constraint.index()].violation(&self.values)
    }

    fn objective_value(&self) -> f64 {
        self.objective_value
    }

    fn iterations(&self) -> usize {
        self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{LinearExpr, NonlinearExpr, QuadExpr};

    #[test]
    fn test_equality_constrained_quadratic() {
        // min (x-1)² + (y-2)²  s.t. x + y = 1  →  x = 0, y = 1
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        let y = model.add_variable("y");
        let mut obj = QuadExpr::new();
        obj.add_squared_deviation(x, 1.0, 1.0);
        obj.add_squared_deviation(y, 2.0, 1.0);
        model.set_objective(vec![obj.into()]);
        let c = model.add_constraint(
            "sum",
            LinearExpr::new().term(x, 1.0).term(y, 1.0).into(),
            ConstraintSense::Equal,
            1.0,
        );
        model.optimize();

        assert!(model.termination_status().is_success());
        assert!((model.value(x) - 0.0).abs() < 1e-4);
        assert!((model.value(y) - 1.0).abs() < 1e-4);
        assert!(model.constraint_violation(c) < 1e-5);
        assert_eq!(model.constraint_name(c), "sum");
    }

    #[test]
    fn test_inequality_and_bounds() {
        // min (x-3)² + (y+2)²  s.t. x ≤ 1, y ∈ [0, 5]
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        let y = model.add_variable("y");
        model.set_variable_bounds(y, 0.0, 5.0);
        let mut obj = QuadExpr::new();
        obj.add_squared_deviation(x, 3.0, 1.0);
        obj.add_squared_deviation(y, -2.0, 1.0);
        model.set_objective(vec![obj.into()]);
        model.add_constraint(
            "x_max",
            LinearExpr::new().term(x, 1.0).into(),
            ConstraintSense::LessEqual,
            1.0,
        );
        model.optimize();

        assert!(model.termination_status().is_success());
        assert!((model.value(x) - 1.0).abs() < 1e-4);
        assert!(model.value(y) >= 0.0 && model.value(y) < 1e-4);
    }

    #[test]
    fn test_fixed_variables_do_not_move() {
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        let y = model.add_variable("y");
        model.set_variable_bounds(x, 0.0, 0.0);
        let mut obj = QuadExpr::new();
        obj.add_squared_deviation(x, 5.0, 1.0);
        obj.add_squared_deviation(y, 5.0, 1.0);
        model.set_objective(vec![obj.into()]);
        model.optimize();

        assert_eq!(model.value(x), 0.0);
        assert!((model.value(y) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_nonlinear_equality() {
        // min x² + y²  s.t. x·y = 1, x,y ≥ 0  →  x = y = 1
        let mut model = AugmentedLagrangianModel::default();
        let x = model.add_variable("x");
        let y = model.add_variable("y");
        model.set_variable_bounds(x, 0.0, 10.0);
        model.set_variable_bounds(y, 0.0, 10.0);
        model.set_variable_start(x, 2.0);
        model.set_variable_start(y, 0.5);
        model.set_objective(vec![QuadExpr::new().quad(x, x, 1.0).quad(y, y, 1.0).into()]);
        model.add_constraint(
            "product",
            NonlinearExpr::new(vec![x, y], |v| v[0] * v[1]).into(),
            ConstraintSense::Equal,
            1.0,
        );
        model.optimize();

        assert!(model.termination_status().is_success());
        assert!((model.value(x) - 1.0).abs() < 1e-3);
        assert!((model.value(y) - 1.0).abs() < 1e-3);
        assert!((model.objective_value() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_infeasible_problem_is_reported() {
        let mut model = AugmentedLagrangianModel::new(SolverSettings {
            max_outer_iterations: 15,
            max_inner_iterations: 50,
            ..SolverSettings::default()
        });
        let x = model.add_variable("x");
        model.set_variable_bounds(x, 0.0, 1.0);
        model.set_objective(vec![]);
        model.add_constraint(
            "impossible",
            LinearExpr::new().term(x, 1.0).into(),
            ConstraintSense::Equal,
            3.0,
        );
        model.optimize();

        assert!(!model.termination_status().is_success());
    }
}
