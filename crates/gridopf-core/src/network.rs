//! The network container: element tables, the per-unit view, snapshots and
//! batched updates.
//!
//! Tables are public for construction. Consumers read through the `get_*`
//! snapshots, which honor the per-unit view and fill in topology columns, and
//! write through one `update_*` call per element family.

use crate::elements::*;
use crate::error::{GridError, GridResult};
use crate::topology::compute_components;
use crate::units::{
    Amperes, Degrees, Kilovolts, Megawatts, Ohms, PerUnit, PerUnitBase, Radians, Siemens,
};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::debug;

#[derive(Debug, Default)]
pub struct Network {
    pub voltage_levels: Vec<VoltageLevel>,
    pub buses: Vec<Bus>,
    pub generators: Vec<Generator>,
    pub batteries: Vec<Battery>,
    pub loads: Vec<Load>,
    pub lines: Vec<Line>,
    pub two_windings_transformers: Vec<TwoWindingsTransformer>,
    pub three_windings_transformers: Vec<ThreeWindingsTransformer>,
    pub shunt_compensators: Vec<ShuntCompensator>,
    pub static_var_compensators: Vec<StaticVarCompensator>,
    pub dangling_lines: Vec<DanglingLine>,
    pub vsc_converter_stations: Vec<VscConverterStation>,
    pub hvdc_lines: Vec<HvdcLine>,
    pub dc_nodes: Vec<DcNode>,
    pub dc_lines: Vec<DcLine>,
    pub dc_grounds: Vec<DcGround>,
    pub voltage_source_converters: Vec<VoltageSourceConverter>,
    pub reactive_capability_curve_points: Vec<ReactiveCapabilityCurvePoint>,
    pub current_limits: Vec<CurrentLimit>,
    /// Bus carrying the slack terminal, if any
    pub slack_bus_id: Option<String>,
    base: PerUnitBase,
    per_unit: bool,
}

/// Unit conversions for the active view. Identity when per-unit is off.
struct View {
    base: PerUnitBase,
    per_unit: bool,
    nominal: HashMap<String, f64>,
}

impl View {
    fn nominal(&self, voltage_level_id: &str) -> f64 {
        self.nominal.get(voltage_level_id).copied().unwrap_or(f64::NAN)
    }

    fn power(&self, x: f64) -> f64 {
        if self.per_unit {
            self.base.power(Megawatts(x)).value()
        } else {
            x
        }
    }

    fn power_back(&self, x: f64) -> f64 {
        if self.per_unit {
            self.base.power_from_pu(PerUnit(x)).value()
        } else {
            x
        }
    }

    fn voltage_on(&self, x: f64, nominal_v: f64) -> f64 {
        if self.per_unit {
            self.base.voltage(Kilovolts(x), Kilovolts(nominal_v)).value()
        } else {
            x
        }
    }

    fn voltage(&self, x: f64, voltage_level_id: &str) -> f64 {
        self.voltage_on(x, self.nominal(voltage_level_id))
    }

    fn voltage_back_on(&self, x: f64, nominal_v: f64) -> f64 {
        if self.per_unit {
            self.base
                .voltage_from_pu(PerUnit(x), Kilovolts(nominal_v))
                .value()
        } else {
            x
        }
    }

    fn voltage_back(&self, x: f64, voltage_level_id: &str) -> f64 {
        self.voltage_back_on(x, self.nominal(voltage_level_id))
    }

    fn angle(&self, x: f64) -> f64 {
        if self.per_unit {
            Degrees(x).to_radians().value()
        } else {
            x
        }
    }

    fn angle_back(&self, x: f64) -> f64 {
        if self.per_unit {
            Radians(x).to_degrees().value()
        } else {
            x
        }
    }

    fn impedance_on(&self, x: f64, nominal_v: f64) -> f64 {
        if self.per_unit {
            self.base.impedance(Ohms(x), Kilovolts(nominal_v)).value()
        } else {
            x
        }
    }

    fn impedance(&self, x: f64, voltage_level_id: &str) -> f64 {
        self.impedance_on(x, self.nominal(voltage_level_id))
    }

    fn admittance(&self, x: f64, voltage_level_id: &str) -> f64 {
        if self.per_unit {
            self.base
                .admittance(Siemens(x), Kilovolts(self.nominal(voltage_level_id)))
                .value()
        } else {
            x
        }
    }

    fn current(&self, x: f64, voltage_level_id: &str) -> f64 {
        if self.per_unit {
            self.base
                .current(Amperes(x), Kilovolts(self.nominal(voltage_level_id)))
                .value()
        } else {
            x
        }
    }

    fn current_back(&self, x: f64, voltage_level_id: &str) -> f64 {
        if self.per_unit {
            self.base
                .current_from_pu(PerUnit(x), Kilovolts(self.nominal(voltage_level_id)))
                .value()
        } else {
            x
        }
    }

    fn flow(&self, flow: &TerminalFlow, voltage_level_id: &str) -> TerminalFlow {
        TerminalFlow {
            p: self.power(flow.p),
            q: self.power(flow.q),
            i: self.current(flow.i, voltage_level_id),
        }
    }

    fn flow_back(&self, flow: &TerminalFlow, voltage_level_id: &str) -> TerminalFlow {
        TerminalFlow {
            p: self.power_back(flow.p),
            q: self.power_back(flow.q),
            i: self.current_back(flow.i, voltage_level_id),
        }
    }
}

// ============================================================================
// Batched update rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BusUpdate {
    pub id: String,
    pub v_mag: f64,
    pub v_angle: f64,
}

/// Update row for generators and batteries
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorUpdate {
    pub id: String,
    pub target_p: f64,
    pub target_q: f64,
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadUpdate {
    pub id: String,
    pub p: f64,
    pub q: f64,
}

/// Update row for lines and two-winding transformers
#[derive(Debug, Clone, PartialEq)]
pub struct BranchUpdate {
    pub id: String,
    pub flow1: TerminalFlow,
    pub flow2: TerminalFlow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transformer3wUpdate {
    pub id: String,
    pub star_bus_v: f64,
    pub star_bus_angle: f64,
    pub legs: [TerminalFlow; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShuntUpdate {
    pub id: String,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvcUpdate {
    pub id: String,
    pub regulation_mode: SvcRegulationMode,
    pub target_v: f64,
    pub target_q: f64,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DanglingLineUpdate {
    pub id: String,
    pub flow: TerminalFlow,
    pub boundary_v: f64,
    pub boundary_angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VscStationUpdate {
    pub id: String,
    pub target_q: f64,
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HvdcLineUpdate {
    pub id: String,
    pub target_p: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcNodeUpdate {
    pub id: String,
    pub v: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcLineUpdate {
    pub id: String,
    pub i1: f64,
    pub i2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DcGroundUpdate {
    pub id: String,
    pub i: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConverterUpdate {
    pub id: String,
    pub target_q: f64,
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub p: f64,
    pub q: f64,
    pub i_dc: f64,
}

/// Apply a batch to a table. Every id is resolved before anything is written.
fn apply_batch<T, U>(
    kind: &'static str,
    table: &mut [T],
    updates: &[U],
    id_of: impl Fn(&T) -> &str,
    update_id: impl Fn(&U) -> &str,
    mut apply: impl FnMut(&mut T, &U),
) -> GridResult<()> {
    let index: HashMap<String, usize> = table
        .iter()
        .enumerate()
        .map(|(i, row)| (id_of(row).to_string(), i))
        .collect();
    let mut targets = Vec::with_capacity(updates.len());
    for update in updates {
        match index.get(update_id(update)) {
            Some(&i) => targets.push(i),
            None => return Err(GridError::unknown(kind, update_id(update))),
        }
    }
    for (i, update) in targets.into_iter().zip(updates) {
        apply(&mut table[i], update);
    }
    debug!(kind, rows = updates.len(), "batched update applied");
    Ok(())
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base(&self) -> PerUnitBase {
        self.base
    }

    /// Nominal apparent power (MVA)
    pub fn nominal_apparent_power(&self) -> f64 {
        self.base.sn.value()
    }

    pub fn per_unit(&self) -> bool {
        self.per_unit
    }

    pub fn set_per_unit(&mut self, per_unit: bool) {
        self.per_unit = per_unit;
    }

    /// Check that every AC terminal names a voltage level with a positive
    /// nominal voltage. Per-unit conversions are meaningless otherwise.
    pub fn check_voltage_levels(&self) -> GridResult<()> {
        let nominal: HashMap<&str, f64> = self
            .voltage_levels
            .iter()
            .map(|vl| (vl.id.as_str(), vl.nominal_v))
            .collect();

        let terminals = self
            .buses
            .iter()
            .map(|b| ("bus", &b.id, &b.voltage_level_id))
            .chain(self.generators.iter().map(|g| ("generator", &g.id, &g.voltage_level_id)))
            .chain(self.batteries.iter().map(|b| ("battery", &b.id, &b.voltage_level_id)))
            .chain(self.loads.iter().map(|l| ("load", &l.id, &l.voltage_level_id)))
            .chain(self.lines.iter().flat_map(|l| {
                [("line", &l.id, &l.voltage_level1_id), ("line", &l.id, &l.voltage_level2_id)]
            }))
            .chain(self.two_windings_transformers.iter().flat_map(|t| {
                [
                    ("2-windings transformer", &t.id, &t.voltage_level1_id),
                    ("2-windings transformer", &t.id, &t.voltage_level2_id),
                ]
            }))
            .chain(self.three_windings_transformers.iter().flat_map(|t| {
                t.legs
                    .iter()
                    .map(move |leg| ("3-windings transformer", &t.id, &leg.voltage_level_id))
            }))
            .chain(self.shunt_compensators.iter().map(|s| ("shunt", &s.id, &s.voltage_level_id)))
            .chain(self.static_var_compensators.iter().map(|s| ("SVC", &s.id, &s.voltage_level_id)))
            .chain(self.dangling_lines.iter().map(|d| ("dangling line", &d.id, &d.voltage_level_id)))
            .chain(
                self.vsc_converter_stations
                    .iter()
                    .map(|s| ("VSC station", &s.id, &s.voltage_level_id)),
            )
            .chain(
                self.voltage_source_converters
                    .iter()
                    .map(|c| ("converter", &c.id, &c.voltage_level_id)),
            );

        for (kind, id, vl) in terminals {
            match nominal.get(vl.as_str()) {
                Some(&v) if v > 0.0 => {}
                Some(&v) => {
                    return Err(GridError::Validation(format!(
                        "voltage level '{}' of {} '{}' has nominal voltage {}",
                        vl, kind, id, v
                    )))
                }
                None => {
                    return Err(GridError::Validation(format!(
                        "{} '{}' references unknown voltage level '{}'",
                        kind, id, vl
                    )))
                }
            }
        }
        Ok(())
    }

    fn view(&self) -> View {
        View {
            base: self.base,
            per_unit: self.per_unit,
            nominal: self
                .voltage_levels
                .iter()
                .map(|vl| (vl.id.clone(), vl.nominal_v))
                .collect(),
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    pub fn get_voltage_levels(&self) -> Vec<VoltageLevel> {
        self.voltage_levels
            .iter()
            .map(|vl| {
                let mut row = vl.clone();
                if self.per_unit {
                    row.low_voltage_limit = vl.low_voltage_limit.map(|v| v / vl.nominal_v);
                    row.high_voltage_limit = vl.high_voltage_limit.map(|v| v / vl.nominal_v);
                }
                row
            })
            .collect()
    }

    pub fn get_buses(&self) -> Vec<Bus> {
        let view = self.view();
        let components = compute_components(self);
        self.buses
            .iter()
            .map(|b| Bus {
                v_mag: view.voltage(b.v_mag, &b.voltage_level_id),
                v_angle: view.angle(b.v_angle),
                connected_component: components.bus_connected.get(&b.id).copied(),
                synchronous_component: components.bus_synchronous.get(&b.id).copied(),
                ..b.clone()
            })
            .collect()
    }

    pub fn get_generators(&self) -> Vec<Generator> {
        let view = self.view();
        self.generators
            .iter()
            .map(|g| Generator {
                min_p: view.power(g.min_p),
                max_p: view.power(g.max_p),
                min_q: view.power(g.min_q),
                max_q: view.power(g.max_q),
                target_p: view.power(g.target_p),
                target_q: view.power(g.target_q),
                target_v: view.voltage(g.target_v, &g.voltage_level_id),
                p: view.power(g.p),
                q: view.power(g.q),
                ..g.clone()
            })
            .collect()
    }

    pub fn get_batteries(&self) -> Vec<Battery> {
        let view = self.view();
        self.batteries
            .iter()
            .map(|b| Battery {
                min_p: view.power(b.min_p),
                max_p: view.power(b.max_p),
                min_q: view.power(b.min_q),
                max_q: view.power(b.max_q),
                target_p: view.power(b.target_p),
                target_q: view.power(b.target_q),
                target_v: view.voltage(b.target_v, &b.voltage_level_id),
                p: view.power(b.p),
                q: view.power(b.q),
                ..b.clone()
            })
            .collect()
    }

    pub fn get_loads(&self) -> Vec<Load> {
        let view = self.view();
        self.loads
            .iter()
            .map(|l| Load {
                p0: view.power(l.p0),
                q0: view.power(l.q0),
                p: view.power(l.p),
                q: view.power(l.q),
                ..l.clone()
            })
            .collect()
    }

    /// Impedances and admittances of a line are expressed on its side-2 voltage.
    pub fn get_lines(&self) -> Vec<Line> {
        let view = self.view();
        self.lines
            .iter()
            .map(|l| {
                let vl2 = l.voltage_level2_id.as_str();
                Line {
                    r: view.impedance(l.r, vl2),
                    x: view.impedance(l.x, vl2),
                    g1: view.admittance(l.g1, vl2),
                    b1: view.admittance(l.b1, vl2),
                    g2: view.admittance(l.g2, vl2),
                    b2: view.admittance(l.b2, vl2),
                    flow1: view.flow(&l.flow1, &l.voltage_level1_id),
                    flow2: view.flow(&l.flow2, vl2),
                    ..l.clone()
                }
            })
            .collect()
    }

    pub fn get_2_windings_transformers(&self) -> Vec<TwoWindingsTransformer> {
        let view = self.view();
        self.two_windings_transformers
            .iter()
            .map(|t| {
                let (vl1, vl2) = (t.voltage_level1_id.as_str(), t.voltage_level2_id.as_str());
                TwoWindingsTransformer {
                    r: view.impedance(t.r, vl2),
                    x: view.impedance(t.x, vl2),
                    g: view.admittance(t.g, vl2),
                    b: view.admittance(t.b, vl2),
                    rated_u1: view.voltage(t.rated_u1, vl1),
                    rated_u2: view.voltage(t.rated_u2, vl2),
                    phase_tap_alpha: view.angle(t.phase_tap_alpha),
                    flow1: view.flow(&t.flow1, vl1),
                    flow2: view.flow(&t.flow2, vl2),
                    ..t.clone()
                }
            })
            .collect()
    }

    /// Leg quantities are expressed on the leg's nominal voltage, the star
    /// point voltage on `rated_u0`.
    pub fn get_3_windings_transformers(&self) -> Vec<ThreeWindingsTransformer> {
        let view = self.view();
        self.three_windings_transformers
            .iter()
            .map(|t| {
                let legs = t.legs.clone().map(|leg| {
                    let vl = leg.voltage_level_id.as_str();
                    Transformer3wLeg {
                        r: view.impedance(leg.r, vl),
                        x: view.impedance(leg.x, vl),
                        g: view.admittance(leg.g, vl),
                        b: view.admittance(leg.b, vl),
                        rated_u: view.voltage(leg.rated_u, vl),
                        phase_tap_alpha: view.angle(leg.phase_tap_alpha),
                        flow: view.flow(&leg.flow, vl),
                        ..leg.clone()
                    }
                });
                ThreeWindingsTransformer {
                    legs,
                    star_bus_v: view.voltage_on(t.star_bus_v, t.rated_u0),
                    star_bus_angle: view.angle(t.star_bus_angle),
                    ..t.clone()
                }
            })
            .collect()
    }

    pub fn get_shunt_compensators(&self) -> Vec<ShuntCompensator> {
        let view = self.view();
        self.shunt_compensators
            .iter()
            .map(|s| ShuntCompensator {
                g: view.admittance(s.g, &s.voltage_level_id),
                b: view.admittance(s.b, &s.voltage_level_id),
                p: view.power(s.p),
                q: view.power(s.q),
                ..s.clone()
            })
            .collect()
    }

    pub fn get_static_var_compensators(&self) -> Vec<StaticVarCompensator> {
        let view = self.view();
        self.static_var_compensators
            .iter()
            .map(|s| StaticVarCompensator {
                b_min: view.admittance(s.b_min, &s.voltage_level_id),
                b_max: view.admittance(s.b_max, &s.voltage_level_id),
                target_v: view.voltage(s.target_v, &s.voltage_level_id),
                target_q: view.power(s.target_q),
                p: view.power(s.p),
                q: view.power(s.q),
                ..s.clone()
            })
            .collect()
    }

    pub fn get_dangling_lines(&self) -> Vec<DanglingLine> {
        let view = self.view();
        self.dangling_lines
            .iter()
            .map(|d| {
                let vl = d.voltage_level_id.as_str();
                DanglingLine {
                    r: view.impedance(d.r, vl),
                    x: view.impedance(d.x, vl),
                    g: view.admittance(d.g, vl),
                    b: view.admittance(d.b, vl),
                    p0: view.power(d.p0),
                    q0: view.power(d.q0),
                    flow: view.flow(&d.flow, vl),
                    boundary_v: view.voltage(d.boundary_v, vl),
                    boundary_angle: view.angle(d.boundary_angle),
                    ..d.clone()
                }
            })
            .collect()
    }

    pub fn get_vsc_converter_stations(&self) -> Vec<VscConverterStation> {
        let view = self.view();
        self.vsc_converter_stations
            .iter()
            .map(|s| VscConverterStation {
                min_q: view.power(s.min_q),
                max_q: view.power(s.max_q),
                target_v: view.voltage(s.target_v, &s.voltage_level_id),
                target_q: view.power(s.target_q),
                p: view.power(s.p),
                q: view.power(s.q),
                ..s.clone()
            })
            .collect()
    }

    /// The resistance is normalized on the line's own DC nominal voltage.
    pub fn get_hvdc_lines(&self) -> Vec<HvdcLine> {
        let view = self.view();
        self.hvdc_lines
            .iter()
            .map(|h| HvdcLine {
                r: view.impedance_on(h.r, h.nominal_v),
                max_p: view.power(h.max_p),
                target_p: view.power(h.target_p),
                ..h.clone()
            })
            .collect()
    }

    pub fn get_dc_nodes(&self) -> Vec<DcNode> {
        let components = compute_components(self);
        self.dc_nodes
            .iter()
            .map(|n| DcNode {
                connected_component: components.dc_node_connected.get(&n.id).copied(),
                ..n.clone()
            })
            .collect()
    }

    pub fn get_dc_lines(&self) -> Vec<DcLine> {
        self.dc_lines.clone()
    }

    pub fn get_dc_grounds(&self) -> Vec<DcGround> {
        self.dc_grounds.clone()
    }

    pub fn get_voltage_source_converters(&self) -> Vec<VoltageSourceConverter> {
        let view = self.view();
        self.voltage_source_converters
            .iter()
            .map(|c| VoltageSourceConverter {
                target_p: view.power(c.target_p),
                min_p: view.power(c.min_p),
                max_p: view.power(c.max_p),
                min_q: view.power(c.min_q),
                max_q: view.power(c.max_q),
                target_v: view.voltage(c.target_v, &c.voltage_level_id),
                target_q: view.power(c.target_q),
                p: view.power(c.p),
                q: view.power(c.q),
                ..c.clone()
            })
            .collect()
    }

    /// Curve points sorted by `(id, num)`.
    pub fn get_reactive_capability_curve_points(&self) -> Vec<ReactiveCapabilityCurvePoint> {
        let view = self.view();
        let mut points: Vec<_> = self
            .reactive_capability_curve_points
            .iter()
            .map(|pt| ReactiveCapabilityCurvePoint {
                p: view.power(pt.p),
                min_q: view.power(pt.min_q),
                max_q: view.power(pt.max_q),
                ..pt.clone()
            })
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id).then(a.num.cmp(&b.num)));
        points
    }

    /// Permanent current limits, converted to per-unit current on the side's
    /// voltage level when the view is active.
    pub fn get_current_limits(&self) -> Vec<CurrentLimit> {
        let view = self.view();
        let mut side_level: HashMap<(&str, Side), &str> = HashMap::new();
        for l in &self.lines {
            side_level.insert((l.id.as_str(), Side::One), l.voltage_level1_id.as_str());
            side_level.insert((l.id.as_str(), Side::Two), l.voltage_level2_id.as_str());
        }
        for t in &self.two_windings_transformers {
            side_level.insert((t.id.as_str(), Side::One), t.voltage_level1_id.as_str());
            side_level.insert((t.id.as_str(), Side::Two), t.voltage_level2_id.as_str());
        }
        self.current_limits
            .iter()
            .map(|limit| {
                let value = match side_level.get(&(limit.branch_id.as_str(), limit.side)) {
                    Some(vl) => view.current(limit.value, vl),
                    None => limit.value,
                };
                CurrentLimit {
                    value,
                    ..limit.clone()
                }
            })
            .collect()
    }

    // ========================================================================
    // Batched updates (values interpreted in the active view)
    // ========================================================================

    pub fn update_buses(&mut self, updates: &[BusUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "bus",
            &mut self.buses,
            updates,
            |b| &b.id,
            |u| &u.id,
            |b, u| {
                b.v_mag = view.voltage_back(u.v_mag, &b.voltage_level_id);
                b.v_angle = view.angle_back(u.v_angle);
            },
        )
    }

    pub fn update_generators(&mut self, updates: &[GeneratorUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "generator",
            &mut self.generators,
            updates,
            |g| &g.id,
            |u| &u.id,
            |g, u| {
                g.target_p = view.power_back(u.target_p);
                g.target_q = view.power_back(u.target_q);
                g.target_v = view.voltage_back(u.target_v, &g.voltage_level_id);
                g.voltage_regulator_on = u.voltage_regulator_on;
                g.p = view.power_back(u.p);
                g.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_batteries(&mut self, updates: &[GeneratorUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "battery",
            &mut self.batteries,
            updates,
            |b| &b.id,
            |u| &u.id,
            |b, u| {
                b.target_p = view.power_back(u.target_p);
                b.target_q = view.power_back(u.target_q);
                b.target_v = view.voltage_back(u.target_v, &b.voltage_level_id);
                b.voltage_regulator_on = u.voltage_regulator_on;
                b.p = view.power_back(u.p);
                b.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_loads(&mut self, updates: &[LoadUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "load",
            &mut self.loads,
            updates,
            |l| &l.id,
            |u| &u.id,
            |l, u| {
                l.p = view.power_back(u.p);
                l.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_lines(&mut self, updates: &[BranchUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "line",
            &mut self.lines,
            updates,
            |l| &l.id,
            |u| &u.id,
            |l, u| {
                l.flow1 = view.flow_back(&u.flow1, &l.voltage_level1_id);
                l.flow2 = view.flow_back(&u.flow2, &l.voltage_level2_id);
            },
        )
    }

    pub fn update_2_windings_transformers(&mut self, updates: &[BranchUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "two_windings_transformer",
            &mut self.two_windings_transformers,
            updates,
            |t| &t.id,
            |u| &u.id,
            |t, u| {
                t.flow1 = view.flow_back(&u.flow1, &t.voltage_level1_id);
                t.flow2 = view.flow_back(&u.flow2, &t.voltage_level2_id);
            },
        )
    }

    pub fn update_3_windings_transformers(
        &mut self,
        updates: &[Transformer3wUpdate],
    ) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "three_windings_transformer",
            &mut self.three_windings_transformers,
            updates,
            |t| &t.id,
            |u| &u.id,
            |t, u| {
                t.star_bus_v = view.voltage_back_on(u.star_bus_v, t.rated_u0);
                t.star_bus_angle = view.angle_back(u.star_bus_angle);
                for (leg, flow) in t.legs.iter_mut().zip(&u.legs) {
                    leg.flow = view.flow_back(flow, &leg.voltage_level_id);
                }
            },
        )
    }

    pub fn update_shunt_compensators(&mut self, updates: &[ShuntUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "shunt_compensator",
            &mut self.shunt_compensators,
            updates,
            |s| &s.id,
            |u| &u.id,
            |s, u| {
                s.p = view.power_back(u.p);
                s.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_static_var_compensators(&mut self, updates: &[SvcUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "static_var_compensator",
            &mut self.static_var_compensators,
            updates,
            |s| &s.id,
            |u| &u.id,
            |s, u| {
                s.regulation_mode = u.regulation_mode;
                s.target_v = view.voltage_back(u.target_v, &s.voltage_level_id);
                s.target_q = view.power_back(u.target_q);
                s.p = view.power_back(u.p);
                s.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_dangling_lines(&mut self, updates: &[DanglingLineUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "dangling_line",
            &mut self.dangling_lines,
            updates,
            |d| &d.id,
            |u| &u.id,
            |d, u| {
                d.flow = view.flow_back(&u.flow, &d.voltage_level_id);
                d.boundary_v = view.voltage_back(u.boundary_v, &d.voltage_level_id);
                d.boundary_angle = view.angle_back(u.boundary_angle);
            },
        )
    }

    pub fn update_vsc_converter_stations(
        &mut self,
        updates: &[VscStationUpdate],
    ) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "vsc_converter_station",
            &mut self.vsc_converter_stations,
            updates,
            |s| &s.id,
            |u| &u.id,
            |s, u| {
                s.target_q = view.power_back(u.target_q);
                s.target_v = view.voltage_back(u.target_v, &s.voltage_level_id);
                s.voltage_regulator_on = u.voltage_regulator_on;
                s.p = view.power_back(u.p);
                s.q = view.power_back(u.q);
            },
        )
    }

    pub fn update_hvdc_lines(&mut self, updates: &[HvdcLineUpdate]) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "hvdc_line",
            &mut self.hvdc_lines,
            updates,
            |h| &h.id,
            |u| &u.id,
            |h, u| h.target_p = view.power_back(u.target_p),
        )
    }

    pub fn update_dc_nodes(&mut self, updates: &[DcNodeUpdate]) -> GridResult<()> {
        apply_batch(
            "dc_node",
            &mut self.dc_nodes,
            updates,
            |n| &n.id,
            |u| &u.id,
            |n, u| n.v = u.v,
        )
    }

    pub fn update_dc_lines(&mut self, updates: &[DcLineUpdate]) -> GridResult<()> {
        apply_batch(
            "dc_line",
            &mut self.dc_lines,
            updates,
            |l| &l.id,
            |u| &u.id,
            |l, u| {
                l.i1 = u.i1;
                l.i2 = u.i2;
            },
        )
    }

    pub fn update_dc_grounds(&mut self, updates: &[DcGroundUpdate]) -> GridResult<()> {
        apply_batch(
            "dc_ground",
            &mut self.dc_grounds,
            updates,
            |g| &g.id,
            |u| &u.id,
            |g, u| g.i = u.i,
        )
    }

    pub fn update_voltage_source_converters(
        &mut self,
        updates: &[ConverterUpdate],
    ) -> GridResult<()> {
        let view = self.view();
        apply_batch(
            "voltage_source_converter",
            &mut self.voltage_source_converters,
            updates,
            |c| &c.id,
            |u| &u.id,
            |c, u| {
                c.target_q = view.power_back(u.target_q);
                c.target_v = view.voltage_back(u.target_v, &c.voltage_level_id);
                c.voltage_regulator_on = u.voltage_regulator_on;
                c.p = view.power_back(u.p);
                c.q = view.power_back(u.q);
                c.i_dc = u.i_dc;
            },
        )
    }
}

/// Scope guard holding the network in its per-unit view.
///
/// The previous view is restored when the guard is dropped, whichever way the
/// scope is left.
///
/// ```
/// use gridopf_core::{Network, PerUnitScope};
///
/// let mut network = Network::new();
/// {
///     let scope = PerUnitScope::new(&mut network);
///     assert!(scope.per_unit());
/// }
/// assert!(!network.per_unit());
/// ```
pub struct PerUnitScope<'a> {
    network: &'a mut Network,
    previous: bool,
}

impl<'a> PerUnitScope<'a> {
    pub fn new(network: &'a mut Network) -> Self {
        let previous = network.per_unit();
        network.set_per_unit(true);
        Self { network, previous }
    }
}

impl Deref for PerUnitScope<'_> {
    type Target = Network;

    fn deref(&self) -> &Network {
        self.network
    }
}

impl DerefMut for PerUnitScope<'_> {
    fn deref_mut(&mut self) -> &mut Network {
        self.network
    }
}

impl Drop for PerUnitScope<'_> {
    fn drop(&mut self) {
        self.network.set_per_unit(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_network() -> Network {
        let mut network = Network::new();
        network.voltage_levels.push(VoltageLevel {
            id: "VL1".into(),
            nominal_v: 400.0,
            low_voltage_limit: Some(380.0),
            high_voltage_limit: Some(420.0),
        });
        network.buses.push(Bus {
            id: "B1".into(),
            voltage_level_id: "VL1".into(),
            v_mag: 404.0,
            v_angle: 90.0,
            ..Bus::default()
        });
        network.generators.push(Generator {
            id: "G1".into(),
            voltage_level_id: "VL1".into(),
            bus_id: Some("B1".into()),
            max_p: 500.0,
            target_p: 250.0,
            target_v: 408.0,
            ..Generator::default()
        });
        network.lines.push(Line {
            id: "L1".into(),
            voltage_level1_id: "VL1".into(),
            voltage_level2_id: "VL1".into(),
            bus1_id: Some("B1".into()),
            bus2_id: None,
            r: 16.0,
            x: 160.0,
            ..Line::default()
        });
        network
    }

    #[test]
    fn test_per_unit_snapshots() {
        let mut network = small_network();
        network.set_per_unit(true);

        let bus = &network.get_buses()[0];
        assert!((bus.v_mag - 1.01).abs() < 1e-12);
        assert!((bus.v_angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert_eq!(bus.connected_component, Some(0));

        let gen = &network.get_generators()[0];
        assert!((gen.target_p - 2.5).abs() < 1e-12);
        assert!((gen.target_v - 1.02).abs() < 1e-12);

        let line = &network.get_lines()[0];
        assert!((line.r - 0.01).abs() < 1e-12);
        assert!((line.x - 0.1).abs() < 1e-12);

        let vl = &network.get_voltage_levels()[0];
        assert_eq!(vl.nominal_v, 400.0);
        assert!((vl.low_voltage_limit.unwrap() - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_updates_are_stored_in_engineering_units() {
        let mut network = small_network();
        network.set_per_unit(true);
        network
            .update_buses(&[BusUpdate {
                id: "B1".into(),
                v_mag: 1.05,
                v_angle: std::f64::consts::PI,
            }])
            .unwrap();
        network
            .update_generators(&[GeneratorUpdate {
                id: "G1".into(),
                target_p: 1.0,
                target_q: 0.2,
                target_v: 1.0,
                voltage_regulator_on: false,
                p: -1.0,
                q: -0.2,
            }])
            .unwrap();
        network.set_per_unit(false);

        assert!((network.buses[0].v_mag - 420.0).abs() < 1e-9);
        assert!((network.buses[0].v_angle - 180.0).abs() < 1e-9);
        let gen = &network.generators[0];
        assert!((gen.target_p - 100.0).abs() < 1e-9);
        assert!((gen.q + 20.0).abs() < 1e-9);
        assert!(!gen.voltage_regulator_on);
    }

    #[test]
    fn test_unknown_id_rejects_whole_batch() {
        let mut network = small_network();
        let result = network.update_loads(&[LoadUpdate {
            id: "missing".into(),
            p: 1.0,
            q: 0.0,
        }]);
        assert!(matches!(result, Err(GridError::UnknownElement { .. })));
    }

    #[test]
    fn test_scope_restores_previous_view_on_early_return() {
        fn work(network: &mut Network) -> GridResult<()> {
            let mut scope = PerUnitScope::new(network);
            assert!(scope.per_unit());
            scope.update_loads(&[LoadUpdate {
                id: "nope".into(),
                p: 0.0,
                q: 0.0,
            }])?;
            Ok(())
        }

        let mut network = small_network();
        assert!(work(&mut network).is_err());
        assert!(!network.per_unit());
    }

    #[test]
    fn test_nested_scope_keeps_outer_view() {
        let mut network = small_network();
        let mut outer = PerUnitScope::new(&mut network);
        {
            let inner = PerUnitScope::new(&mut outer);
            assert!(inner.per_unit());
        }
        assert!(outer.per_unit());
        drop(outer);
        assert!(!network.per_unit());
    }

    #[test]
    fn test_hvdc_resistance_normalized_on_dc_voltage() {
        let mut network = small_network();
        network.hvdc_lines.push(HvdcLine {
            id: "H1".into(),
            r: 1.0,
            nominal_v: 400.0,
            max_p: 300.0,
            ..HvdcLine::default()
        });
        network.set_per_unit(true);
        let hvdc = &network.get_hvdc_lines()[0];
        assert!((hvdc.r - 1.0 * 100.0 / 160_000.0).abs() < 1e-15);
        assert!((hvdc.max_p - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_voltage_level_references_checked() {
        let mut network = small_network();
        assert!(network.check_voltage_levels().is_ok());

        network.generators[0].voltage_level_id = "VL9".into();
        let err = network.check_voltage_levels().unwrap_err();
        assert!(err.to_string().contains("unknown voltage level 'VL9'"));

        network.generators[0].voltage_level_id = "VL1".into();
        network.voltage_levels[0].nominal_v = 0.0;
        assert!(matches!(
            network.check_voltage_levels(),
            Err(GridError::Validation(_))
        ));
    }
}
