//! π-model branch flow equations.
//!
//! With `y = 1/|r + jx|` and `ksi = atan2(r, x)`, the flows entering a closed
//! branch are
//!
//! ```text
//! p1 = r1·v1·( g1·r1·v1 + y·r1·v1·sin(ksi) - y·v2·sin(ksi - a1 - ph1 + ph2))
//! q1 = r1·v1·(-b1·r1·v1 + y·r1·v1·cos(ksi) - y·v2·cos(ksi - a1 - ph1 + ph2))
//! p2 = v2·( g2·v2 - y·r1·v1·sin(ksi + a1 + ph1 - ph2) + y·v2·sin(ksi))
//! q2 = v2·(-b2·v2 - y·r1·v1·cos(ksi + a1 + ph1 - ph2) + y·v2·cos(ksi))
//! ```
//!
//! A branch open at one side behaves as a shunt seen from the other: the
//! series impedance in series with the far-side admittance.

use crate::opf::network_cache::PiModel;
use crate::opf::variable_context::{BranchVars, NodeVars};
use crate::solver::{ConstraintSense, Expr, NlpModel, NonlinearExpr};
use tracing::{debug, warn};

/// Floor on `|r + jx|` so zero-impedance branches stay finite.
const MIN_IMPEDANCE: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Series {
    y: f64,
    ksi: f64,
}

impl Series {
    fn of(pi: &PiModel) -> Self {
        let z = pi.r.hypot(pi.x).max(MIN_IMPEDANCE);
        let ksi = if pi.r == 0.0 && pi.x == 0.0 {
            0.0
        } else {
            pi.r.atan2(pi.x)
        };
        Series { y: 1.0 / z, ksi }
    }
}

/// Terminal state `(v, ph)` of one side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideState {
    pub v: f64,
    pub ph: f64,
}

pub fn closed_p1(pi: &PiModel, s1: SideState, s2: SideState) -> f64 {
    let Series { y, ksi } = Series::of(pi);
    let rv1 = pi.r1 * s1.v;
    rv1 * (pi.g1 * rv1 + y * rv1 * ksi.sin() - y * s2.v * (ksi - pi.a1 - s1.ph + s2.ph).sin())
}

pub fn closed_q1(pi: &PiModel, s1: SideState, s2: SideState) -> f64 {
    let Series { y, ksi } = Series::of(pi);
    let rv1 = pi.r1 * s1.v;
    rv1 * (-pi.b1 * rv1 + y * rv1 * ksi.cos() - y * s2.v * (ksi - pi.a1 - s1.ph + s2.ph).cos())
}

pub fn closed_p2(pi: &PiModel, s1: SideState, s2: SideState) -> f64 {
    let Series { y, ksi } = Series::of(pi);
    let rv1 = pi.r1 * s1.v;
    s2.v * (pi.g2 * s2.v - y * rv1 * (ksi + pi.a1 + s1.ph - s2.ph).sin() + y * s2.v * ksi.sin())
}

pub fn closed_q2(pi: &PiModel, s1: SideState, s2: SideState) -> f64 {
    let Series { y, ksi } = Series::of(pi);
    let rv1 = pi.r1 * s1.v;
    s2.v * (-pi.b2 * s2.v - y * rv1 * (ksi + pi.a1 + s1.ph - s2.ph).cos() + y * s2.v * ksi.cos())
}

/// Equivalent shunt `(g, b)` seen through the series impedance when the far
/// side, with admittance `g_far + j·b_far`, is open.
fn open_shunt(y: f64, ksi: f64, g_far: f64, b_far: f64) -> (f64, f64) {
    let shunt = (g_far + y * ksi.sin()).powi(2) + (-b_far + y * ksi.cos()).powi(2);
    let far2 = b_far * b_far + g_far * g_far;
    (
        y * y * g_far / shunt + far2 * y * ksi.sin() / shunt,
        y * y * b_far / shunt - far2 * y * ksi.cos() / shunt,
    )
}

/// `(p1, q1)` of a branch open at side 2
pub fn open_side2_flow(pi: &PiModel, v1: f64) -> (f64, f64) {
    let Series { y, ksi } = Series::of(pi);
    let (g, b) = open_shunt(y, ksi, pi.g2, pi.b2);
    let w = (pi.r1 * v1).powi(2);
    (w * (pi.g1 + g), -w * (pi.b1 + b))
}

/// `(p2, q2)` of a branch open at side 1
pub fn open_side1_flow(pi: &PiModel, v2: f64) -> (f64, f64) {
    let Series { y, ksi } = Series::of(pi);
    let (g, b) = open_shunt(y, ksi, pi.g1, pi.b1);
    let w = v2 * v2;
    (w * (pi.g2 + g), -w * (pi.b2 + b))
}

fn equality<M: NlpModel>(model: &mut M, name: String, expr: impl Into<Expr>) {
    model.add_constraint(&name, expr.into(), ConstraintSense::Equal, 0.0);
}

/// Add the flow equations of one branch for its regime. `side1`/`side2` are
/// the voltage variables of the connected terminals.
pub fn add_branch_equations<M: NlpModel>(
    model: &mut M,
    id: &str,
    pi: PiModel,
    vars: BranchVars,
    side1: Option<NodeVars>,
    side2: Option<NodeVars>,
) {
    if pi.r.hypot(pi.x) < MIN_IMPEDANCE {
        debug!(branch = id, "impedance below floor, clamped");
    }
    match (vars, side1, side2) {
        (BranchVars::Closed { p1, q1, p2, q2 }, Some(n1), Some(n2)) => {
            let state = |x: &[f64]| {
                (
                    SideState { v: x[1], ph: x[2] },
                    SideState { v: x[3], ph: x[4] },
                )
            };
            let flows: [(_, &str, fn(&PiModel, SideState, SideState) -> f64); 4] = [
                (p1, "branch_p1", closed_p1),
                (q1, "branch_q1", closed_q1),
                (p2, "branch_p2", closed_p2),
                (q2, "branch_q2", closed_q2),
            ];
            for (var, tag, f) in flows {
                let expr = NonlinearExpr::new(vec![var, n1.v, n1.ph, n2.v, n2.ph], move |x| {
                    let (s1, s2) = state(x);
                    x[0] - f(&pi, s1, s2)
                });
                equality(model, format!("{}[{}]", tag, id), expr);
            }
        }
        (BranchVars::OpenSide2 { p1, q1 }, Some(n1), _) => {
            let p = NonlinearExpr::new(vec![p1, n1.v], move |x| x[0] - open_side2_flow(&pi, x[1]).0);
            let q = NonlinearExpr::new(vec![q1, n1.v], move |x| x[0] - open_side2_flow(&pi, x[1]).1);
            equality(model, format!("branch_open2_p1[{}]", id), p);
            equality(model, format!("branch_open2_q1[{}]", id), q);
        }
        (BranchVars::OpenSide1 { p2, q2 }, _, Some(n2)) => {
            let p = NonlinearExpr::new(vec![p2, n2.v], move |x| x[0] - open_side1_flow(&pi, x[1]).0);
            let q = NonlinearExpr::new(vec![q2, n2.v], move |x| x[0] - open_side1_flow(&pi, x[1]).1);
            equality(model, format!("branch_open1_p2[{}]", id), p);
            equality(model, format!("branch_open1_q2[{}]", id), q);
        }
        (BranchVars::Disconnected, _, _) => {}
        (vars, _, _) => {
            warn!(branch = id, regime = ?vars.regime(), "flow variables without terminal voltages");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(r: f64, x: f64, b: f64) -> PiModel {
        PiModel {
            r,
            x,
            b1: b,
            b2: b,
            r1: 1.0,
            ..PiModel::default()
        }
    }

    fn s(v: f64, ph: f64) -> SideState {
        SideState { v, ph }
    }

    #[test]
    fn test_lossless_line_transfer() {
        // p = v1·v2·sin(ph1 - ph2)/x on a pure reactance
        let pi = line(0.0, 0.1, 0.0);
        let (s1, s2) = (s(1.0, 0.1), s(1.0, 0.0));
        let expected = 0.1f64.sin() / 0.1;
        assert!((closed_p1(&pi, s1, s2) - expected).abs() < 1e-9);
        assert!((closed_p2(&pi, s1, s2) + expected).abs() < 1e-9);
    }

    #[test]
    fn test_resistive_losses_are_positive() {
        let pi = line(0.01, 0.1, 0.0);
        let (s1, s2) = (s(1.02, 0.05), s(0.99, 0.0));
        let losses = closed_p1(&pi, s1, s2) + closed_p2(&pi, s1, s2);
        assert!(losses > 0.0);
        // equal to r·|I|² for a plain series impedance
        let dv_re = 1.02 * 0.05f64.cos() - 0.99;
        let dv_im = 1.02 * 0.05f64.sin();
        let i2 = (dv_re * dv_re + dv_im * dv_im) / (0.01f64.powi(2) + 0.1f64.powi(2));
        assert!((losses - 0.01 * i2).abs() < 1e-9);
    }

    #[test]
    fn test_flat_start_charging() {
        let pi = line(0.0, 0.1, 0.02);
        let (s1, s2) = (s(1.0, 0.0), s(1.0, 0.0));
        assert!((closed_q1(&pi, s1, s2) + 0.02).abs() < 1e-9);
        assert!((closed_q2(&pi, s1, s2) + 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_open_line_charging() {
        // pure reactance with charging on both ends: b1 plus b2 seen through x
        let pi = line(0.0, 0.1, 0.01);
        let (p, q) = open_side2_flow(&pi, 1.0);
        assert!(p.abs() < 1e-12);
        let y = 10.0;
        let expected = -(0.01 + 0.01 * y / (y - 0.01));
        assert!((q - expected).abs() < 1e-9, "q = {}, expected {}", q, expected);
    }

    #[test]
    fn test_open_sides_are_symmetric_for_symmetric_line() {
        let pi = line(0.02, 0.2, 0.03);
        let a = open_side2_flow(&pi, 1.05);
        let b = open_side1_flow(&pi, 1.05);
        assert!((a.0 - b.0).abs() < 1e-12);
        assert!((a.1 - b.1).abs() < 1e-12);
    }

    #[test]
    fn test_ratio_scales_side1_voltage() {
        let mut pi = line(0.0, 0.1, 0.0);
        pi.r1 = 1.05;
        // no transfer when the ratio-adjusted voltages match in phase and magnitude
        let (s1, s2) = (s(1.0, 0.0), s(1.05, 0.0));
        assert!(closed_p1(&pi, s1, s2).abs() < 1e-12);
        assert!(closed_q1(&pi, s1, s2).abs() < 1e-9);
    }
}
