//! Reactive capability curves as convex polygon constraints.
//!
//! Each curve sample `(p, min_q, max_q)` gives two points of the feasible
//! region in generator convention. Both `q` values are shrunk by the reactive
//! bounds reduction, the convex hull is taken, and every hull edge becomes a
//! linear inequality on the device's load-convention `(p, q)` variables.

use crate::error::{OpfError, OpfResult};
use crate::opf::convex_hull::{convex_hull, Point};
use crate::opf::network_cache::{InjectorRow, NetworkCache};
use crate::opf::parameters::OpfParameters;
use crate::opf::variable_context::{InjectionVars, VariableContext};
use crate::solver::{ConstraintSense, LinearExpr, NlpModel, VarId};
use gridopf_core::{ElementType, ReactiveCapabilityCurvePoint, ReactiveLimitsKind};
use tracing::warn;

/// Add the facets of one device's curve. Returns the number of constraints
/// added; zero when the curve does not span a polygon.
pub fn add_curve_constraints<M: NlpModel>(
    model: &mut M,
    element_type: ElementType,
    id: &str,
    points: &[ReactiveCapabilityCurvePoint],
    p: VarId,
    q: VarId,
    reduction: f64,
) -> OpfResult<usize> {
    match element_type {
        ElementType::Generator
        | ElementType::Battery
        | ElementType::VscConverterStation
        | ElementType::VoltageSourceConverter => {}
        other => {
            return Err(OpfError::UnsupportedElementType {
                context: "reactive capability curve",
                element_type: other,
            })
        }
    }

    let samples: Vec<Point> = points
        .iter()
        .flat_map(|pt| {
            [
                Point::new(pt.p, pt.min_q * (1.0 - reduction)),
                Point::new(pt.p, pt.max_q * (1.0 - reduction)),
            ]
        })
        .collect();
    let hull = convex_hull(&samples);
    if !hull.is_polygon() {
        warn!(
            device = id,
            vertices = hull.vertices.len(),
            "capability curve does not span a polygon, skipped"
        );
        return Ok(0);
    }
    if !hull.interior.is_empty() {
        warn!(
            device = id,
            count = hull.interior.len(),
            "capability curve has points strictly inside its hull"
        );
    }

    let facets = hull.facets();
    for (k, facet) in facets.iter().enumerate() {
        // a·p_gen + b·q_gen <= c with p_gen = -p, q_gen = -q
        model.add_constraint(
            &format!("curve_facet_{}[{}]", k, id),
            LinearExpr::new().term(p, -facet.a).term(q, -facet.b).into(),
            ConstraintSense::LessEqual,
            facet.c,
        );
    }
    Ok(facets.len())
}

fn add_family<M: NlpModel>(
    rows: &[InjectorRow],
    vars: &InjectionVars,
    cache: &NetworkCache,
    reduction: f64,
    model: &mut M,
) -> OpfResult<()> {
    for (k, row) in rows.iter().enumerate() {
        if row.reactive_limits_kind != ReactiveLimitsKind::Curve {
            continue;
        }
        let (Some(p), Some(q)) = (vars.p[k], vars.q[k]) else {
            continue;
        };
        let Some(points) = cache.curve_points.get(&row.id) else {
            warn!(device = %row.id, "curve limits requested but no curve points found");
            continue;
        };
        add_curve_constraints(model, row.element_type, &row.id, points, p, q, reduction)?;
    }
    Ok(())
}

pub fn add_capability_curve_constraints<M: NlpModel>(
    cache: &NetworkCache,
    ctx: &VariableContext,
    params: &OpfParameters,
    model: &mut M,
) -> OpfResult<()> {
    let reduction = params.reactive_bounds_reduction;
    add_family(&cache.generators, &ctx.generators, cache, reduction, model)?;
    add_family(&cache.batteries, &ctx.batteries, cache, reduction, model)?;
    add_family(&cache.vsc_stations, &ctx.vsc_stations, cache, reduction, model)?;

    for (c, vars) in cache.converters.iter().zip(&ctx.converters) {
        if c.reactive_limits_kind != ReactiveLimitsKind::Curve {
            continue;
        }
        let Some((p, q)) = vars.and_then(|v| v.q.map(|q| (v.p, q))) else {
            continue;
        };
        if let Some(points) = cache.curve_points.get(&c.id) {
            add_curve_constraints(
                model,
                ElementType::VoltageSourceConverter,
                &c.id,
                points,
                p,
                q,
                reduction,
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::AugmentedLagrangianModel;

    fn point(num: usize, p: f64, min_q: f64, max_q: f64) -> ReactiveCapabilityCurvePoint {
        ReactiveCapabilityCurvePoint {
            id: "G".into(),
            num,
            p,
            min_q,
            max_q,
        }
    }

    fn vars(model: &mut AugmentedLagrangianModel) -> (VarId, VarId) {
        (model.add_variable("p"), model.add_variable("q"))
    }

    #[test]
    fn test_two_samples_give_four_facets() {
        let mut model = AugmentedLagrangianModel::default();
        let (p, q) = vars(&mut model);
        let points = [point(0, 0.0, -1.0, 1.0), point(1, 2.0, -0.5, 0.5)];
        let added =
            add_curve_constraints(&mut model, ElementType::Generator, "G", &points, p, q, 0.0)
                .unwrap();
        assert_eq!(added, 4);
        assert_eq!(model.num_constraints(), 4);
    }

    #[test]
    fn test_facets_contain_the_curve_in_load_convention() {
        let mut model = AugmentedLagrangianModel::default();
        let (p, q) = vars(&mut model);
        let points = [point(0, 0.0, -1.0, 1.0), point(1, 2.0, -0.5, 0.5)];
        add_curve_constraints(&mut model, ElementType::Generator, "G", &points, p, q, 0.0)
            .unwrap();

        // producing 1.0 with 0.5 reactive is inside the curve
        model.set_variable_start(p, -1.0);
        model.set_variable_start(q, -0.5);
        for k in 0..4 {
            let c = crate::solver::ConstraintId::new(k);
            assert!(model.constraint_violation(c) <= 1e-12);
        }

        // 0.9 reactive at 2.0 is outside
        model.set_variable_start(p, -2.0);
        model.set_variable_start(q, -0.9);
        let violated = (0..4)
            .map(crate::solver::ConstraintId::new)
            .any(|c| model.constraint_violation(c) > 0.0);
        assert!(violated);
    }

    #[test]
    fn test_single_sample_is_skipped() {
        let mut model = AugmentedLagrangianModel::default();
        let (p, q) = vars(&mut model);
        let added = add_curve_constraints(
            &mut model,
            ElementType::Generator,
            "G",
            &[point(0, 1.0, -1.0, 1.0)],
            p,
            q,
            0.1,
        )
        .unwrap();
        assert_eq!(added, 0);
        assert_eq!(model.num_constraints(), 0);
    }

    #[test]
    fn test_unsupported_element_type() {
        let mut model = AugmentedLagrangianModel::default();
        let (p, q) = vars(&mut model);
        let result = add_curve_constraints(
            &mut model,
            ElementType::Line,
            "L",
            &[point(0, 0.0, -1.0, 1.0), point(1, 1.0, -1.0, 1.0)],
            p,
            q,
            0.0,
        );
        assert!(matches!(
            result,
            Err(OpfError::UnsupportedElementType {
                element_type: ElementType::Line,
                ..
            })
        ));
    }
}
