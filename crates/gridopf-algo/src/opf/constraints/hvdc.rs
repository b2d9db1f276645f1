//! HVDC line losses between its two VSC stations.
//!
//! With `a = 1 - lf_rect/100` the power leaving the rectifier station onto the
//! DC line, and `r` the line resistance on its own DC base, the inverter
//! delivers
//!
//! ```text
//! p_inv + (1 - lf_inv/100)·(a·p_rect - r·(a·p_rect)²) = 0
//! ```
//!
//! where `p_rect >= 0` is withdrawn at the rectifier bus and `p_inv <= 0` is
//! withdrawn (so injected) at the inverter bus.

use crate::opf::network_cache::NetworkCache;
use crate::opf::variable_context::VariableContext;
use crate::solver::{ConstraintSense, NlpModel, QuadExpr};
use tracing::debug;

pub fn add_hvdc_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    model: &mut M,
) {
    for h in &cache.hvdc_lines {
        if !h.is_live(&cache.vsc_stations) {
            debug!(hvdc = %h.id, "HVDC line not fully connected, no loss equation");
            continue;
        }
        let (Some(rect), Some(inv)) = (h.rectifier_num, h.inverter_num) else {
            continue;
        };
        let (Some(p_rect), Some(p_inv)) = (ctx.vsc_stations.p[rect], ctx.vsc_stations.p[inv])
        else {
            continue;
        };
        let a = 1.0 - h.rectifier_loss_factor / 100.0;
        let k = 1.0 - h.inverter_loss_factor / 100.0;
        let expr = QuadExpr::new()
            .term(p_inv, 1.0)
            .term(p_rect, k * a)
            .quad(p_rect, p_rect, -k * h.r * a * a);
        model.add_constraint(
            &format!("hvdc_losses[{}]", h.id),
            expr.into(),
            ConstraintSense::Equal,
            0.0,
        );
    }
}

/// Power delivered by the inverter for `p_rect` withdrawn at the rectifier.
pub fn delivered_power(
    p_rect: f64,
    r: f64,
    rectifier_loss_factor: f64,
    inverter_loss_factor: f64,
) -> f64 {
    let a = 1.0 - rectifier_loss_factor / 100.0;
    (1.0 - inverter_loss_factor / 100.0) * (a * p_rect - r * (a * p_rect).powi(2))
}
