//! Expressions registered with an [`NlpModel`](super::NlpModel).
//!
//! Linear and quadratic expressions carry exact gradients. Nonlinear
//! expressions wrap a residual closure over a short list of variables and are
//! differentiated by central finite differences, which is accurate enough for
//! the smooth trigonometric branch equations they encode.

use super::VarId;
use std::fmt;
use std::sync::Arc;

/// `constant + Σ coef · x`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    pub constant: f64,
    pub terms: Vec<(VarId, f64)>,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            constant: value,
            terms: Vec::new(),
        }
    }

    /// Builder-style term addition
    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.terms.push((var, coef));
        self
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) {
        self.terms.push((var, coef));
    }

    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .fold(self.constant, |acc, (var, coef)| acc + coef * x[var.index()])
    }

    fn add_gradient(&self, scale: f64, grad: &mut [f64]) {
        for (var, coef) in &self.terms {
            grad[var.index()] += scale * coef;
        }
    }
}

/// Linear part plus `Σ coef · x_i · x_j`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuadExpr {
    pub linear: LinearExpr,
    pub quad_terms: Vec<(VarId, VarId, f64)>,
}

impl QuadExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, var: VarId, coef: f64) -> Self {
        self.linear.add_term(var, coef);
        self
    }

    pub fn quad(mut self, a: VarId, b: VarId, coef: f64) -> Self {
        self.quad_terms.push((a, b, coef));
        self
    }

    pub fn constant(mut self, value: f64) -> Self {
        self.linear.add_constant(value);
        self
    }

    pub fn add_quad(&mut self, a: VarId, b: VarId, coef: f64) {
        self.quad_terms.push((a, b, coef));
    }

    /// `coef · (x - target)²`, expanded
    pub fn add_squared_deviation(&mut self, var: VarId, target: f64, coef: f64) {
        self.quad_terms.push((var, var, coef));
        self.linear.add_term(var, -2.0 * coef * target);
        self.linear.add_constant(coef * target * target);
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        self.quad_terms
            .iter()
            .fold(self.linear.eval(x), |acc, (a, b, coef)| {
                acc + coef * x[a.index()] * x[b.index()]
            })
    }

    fn add_gradient(&self, x: &[f64], scale: f64, grad: &mut [f64]) {
        self.linear.add_gradient(scale, grad);
        for (a, b, coef) in &self.quad_terms {
            grad[a.index()] += scale * coef * x[b.index()];
            grad[b.index()] += scale * coef * x[a.index()];
        }
    }
}

type Residual = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// User-supplied residual over `vars`, called with their values in order.
#[derive(Clone)]
pub struct NonlinearExpr {
    pub vars: Vec<VarId>,
    f: Residual,
}

impl NonlinearExpr {
    pub fn new(vars: Vec<VarId>, f: impl Fn(&[f64]) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            vars,
            f: Arc::new(f),
        }
    }

    fn local(&self, x: &[f64]) -> Vec<f64> {
        self.vars.iter().map(|v| x[v.index()]).collect()
    }

    pub fn eval(&self, x: &[f64]) -> f64 {
        (self.f)(&self.local(x))
    }

    fn add_gradient(&self, x: &[f64], scale: f64, grad: &mut [f64]) {
        let mut local = self.local(x);
        for (k, var) in self.vars.iter().enumerate() {
            let orig = local[k];
            let h = 1e-7 * orig.abs().max(1.0);
            local[k] = orig + h;
            let plus = (self.f)(&local);
            local[k] = orig - h;
            let minus = (self.f)(&local);
            local[k] = orig;
            grad[var.index()] += scale * (plus - minus) / (2.0 * h);
        }
    }
}

impl fmt::Debug for NonlinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearExpr")
            .field("vars", &self.vars)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Linear(LinearExpr),
    Quadratic(QuadExpr),
    Nonlinear(NonlinearExpr),
}

impl Expr {
    pub fn eval(&self, x: &[f64]) -> f64 {
        match self {
            Expr::Linear(e) => e.eval(x),
            Expr::Quadratic(e) => e.eval(x),
            Expr::Nonlinear(e) => e.eval(x),
        }
    }

    /// Adds `scale · ∇expr(x)` into `grad`.
    pub fn add_gradient(&self, x: &[f64], scale: f64, grad: &mut [f64]) {
        match self {
            Expr::Linear(e) => e.add_gradient(scale, grad),
            Expr::Quadratic(e) => e.add_gradient(x, scale, grad),
            Expr::Nonlinear(e) => e.add_gradient(x, scale, grad),
        }
    }

    /// Variables the expression reads, possibly with repeats.
    pub fn variables(&self) -> Vec<VarId> {
        match self {
            Expr::Linear(e) => e.terms.iter().map(|(v, _)| *v).collect(),
            Expr::Quadratic(e) => e
                .linear
                .terms
                .iter()
                .map(|(v, _)| *v)
                .chain(e.quad_terms.iter().flat_map(|(a, b, _)| [*a, *b]))
                .collect(),
            Expr::Nonlinear(e) => e.vars.clone(),
        }
    }
}

impl From<LinearExpr> for Expr {
    fn from(e: LinearExpr) -> Self {
        Expr::Linear(e)
    }
}

impl From<QuadExpr> for Expr {
    fn from(e: QuadExpr) -> Self {
        Expr::Quadratic(e)
    }
}

impl From<NonlinearExpr> for Expr {
    fn from(e: NonlinearExpr) -> Self {
        Expr::Nonlinear(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: usize) -> VarId {
        VarId::new(i)
    }

    #[test]
    fn test_linear_eval_and_gradient() {
        let e: Expr = LinearExpr::constant(1.0).term(v(0), 2.0).term(v(1), -3.0).into();
        let x = [4.0, 1.0];
        assert_eq!(e.eval(&x), 1.0 + 8.0 - 3.0);
        let mut grad = [0.0; 2];
        e.add_gradient(&x, 2.0, &mut grad);
        assert_eq!(grad, [4.0, -6.0]);
    }

    #[test]
    fn test_squared_deviation_matches_definition() {
        let mut q = QuadExpr::new();
        q.add_squared_deviation(v(0), 1.5, 2.0);
        let e: Expr = q.into();
        let x = [3.0];
        assert!((e.eval(&x) - 2.0 * 1.5 * 1.5).abs() < 1e-12);
        let mut grad = [0.0];
        e.add_gradient(&x, 1.0, &mut grad);
        assert!((grad[0] - 2.0 * 2.0 * 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_nonlinear_gradient_by_differences() {
        let e: Expr = NonlinearExpr::new(vec![v(1), v(0)], |x| x[0] * x[1].sin()).into();
        let x = [0.3, 2.0];
        let mut grad = [0.0; 2];
        e.add_gradient(&x, 1.0, &mut grad);
        // d/dx0 = x1 cos(x0), d/dx1 = sin(x0)
        assert!((grad[0] - 2.0 * 0.3f64.cos()).abs() < 1e-6);
        assert!((grad[1] - 0.3f64.sin()).abs() < 1e-6);
    }
}
