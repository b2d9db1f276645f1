//! # Variable context
//!
//! Allocates the decision variables of one OPF run and maps cache rows to
//! them. Every equipment family keeps one slot per cache row; a slot is `None`
//! when the row has no variable (disconnected terminal, fixed reactive power,
//! HVDC line not fully connected...).
//!
//! Branch flows live in three disjoint regimes selected by which terminals are
//! connected:
//!
//! | Regime        | Connected | Variables          |
//! |---------------|-----------|--------------------|
//! | closed        | 1 and 2   | `p1, q1, p2, q2`   |
//! | open side 1   | 2 only    | `p2, q2`           |
//! | open side 2   | 1 only    | `p1, q1`           |
//! | disconnected  | none      | none               |
//!
//! Device powers follow the load sign convention (positive when withdrawn
//! from the bus), except static var compensator reactive power which is in
//! generator convention.
//!
//! After a solve, [`VariableContext::update_network`] writes the solution back
//! with one batched update per family.

use super::bounds::Bounds;
use super::network_cache::{InjectorRow, NetworkCache};
use super::parameters::OpfParameters;
use crate::error::OpfResult;
use crate::solver::{NlpModel, VarId};
use gridopf_core::*;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchRegime {
    Closed,
    OpenSide1,
    OpenSide2,
    Disconnected,
}

/// Flow variables of one branch, by regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BranchVars {
    Closed {
        p1: VarId,
        q1: VarId,
        p2: VarId,
        q2: VarId,
    },
    /// Only side 2 is connected
    OpenSide1 { p2: VarId, q2: VarId },
    /// Only side 1 is connected
    OpenSide2 { p1: VarId, q1: VarId },
    Disconnected,
}

impl BranchVars {
    pub fn regime(&self) -> BranchRegime {
        match self {
            BranchVars::Closed { .. } => BranchRegime::Closed,
            BranchVars::OpenSide1 { .. } => BranchRegime::OpenSide1,
            BranchVars::OpenSide2 { .. } => BranchRegime::OpenSide2,
            BranchVars::Disconnected => BranchRegime::Disconnected,
        }
    }

    /// `(p, q)` variables at side 1, when that side carries flow
    pub fn side1(&self) -> Option<(VarId, VarId)> {
        match *self {
            BranchVars::Closed { p1, q1, .. } | BranchVars::OpenSide2 { p1, q1 } => Some((p1, q1)),
            _ => None,
        }
    }

    pub fn side2(&self) -> Option<(VarId, VarId)> {
        match *self {
            BranchVars::Closed { p2, q2, .. } | BranchVars::OpenSide1 { p2, q2 } => Some((p2, q2)),
            _ => None,
        }
    }

    pub fn num_variables(&self) -> usize {
        match self {
            BranchVars::Closed { .. } => 4,
            BranchVars::OpenSide1 { .. } | BranchVars::OpenSide2 { .. } => 2,
            BranchVars::Disconnected => 0,
        }
    }
}

/// Voltage of a fictitious node (three-winding star point, dangling-line
/// boundary).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeVars {
    pub v: VarId,
    pub ph: VarId,
}

/// Active and reactive power slots of an injection family.
#[derive(Debug, Clone, Default)]
pub struct InjectionVars {
    pub p: Vec<Option<VarId>>,
    pub q: Vec<Option<VarId>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DcLineVars {
    pub i1: VarId,
    pub i2: VarId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConverterVars {
    pub p: VarId,
    pub q: Option<VarId>,
    pub i: VarId,
}

#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    pub bus_v: Vec<VarId>,
    pub bus_ph: Vec<VarId>,
    pub generators: InjectionVars,
    pub batteries: InjectionVars,
    pub vsc_stations: InjectionVars,
    pub branches: Vec<BranchVars>,
    pub transformer_3w_star: Vec<Option<NodeVars>>,
    pub transformer_3w_legs: Vec<[BranchVars; 3]>,
    pub dangling_boundary: Vec<Option<NodeVars>>,
    pub dangling_flow: Vec<BranchVars>,
    pub shunt_p: Vec<Option<VarId>>,
    pub shunt_q: Vec<Option<VarId>>,
    /// Generator convention
    pub svc_q: Vec<Option<VarId>>,
    pub dc_node_v: Vec<VarId>,
    pub dc_lines: Vec<Option<DcLineVars>>,
    pub dc_ground_i: Vec<Option<VarId>>,
    pub converters: Vec<Option<ConverterVars>>,
    /// Devices whose reactive power was fixed for lack of range
    pub fixed_reactive_count: usize,
}

fn new_var<M: NlpModel>(model: &mut M, family: &str, id: &str, start: f64) -> VarId {
    let var = model.add_variable(&format!("{}[{}]", family, id));
    model.set_variable_start(var, start);
    var
}

fn branch_vars<M: NlpModel>(
    model: &mut M,
    id: &str,
    bus1: Option<usize>,
    bus2: Option<usize>,
) -> BranchVars {
    match (bus1, bus2) {
        (Some(_), Some(_)) => BranchVars::Closed {
            p1: new_var(model, "branch_p1", id, 0.0),
            q1: new_var(model, "branch_q1", id, 0.0),
            p2: new_var(model, "branch_p2", id, 0.0),
            q2: new_var(model, "branch_q2", id, 0.0),
        },
        (None, Some(_)) => BranchVars::OpenSide1 {
            p2: new_var(model, "branch_p2", id, 0.0),
            q2: new_var(model, "branch_q2", id, 0.0),
        },
        (Some(_), None) => BranchVars::OpenSide2 {
            p1: new_var(model, "branch_p1", id, 0.0),
            q1: new_var(model, "branch_q1", id, 0.0),
        },
        (None, None) => BranchVars::Disconnected,
    }
}

/// Reactive range narrower than 1 MVA, in per-unit on `sn`.
fn too_small(bounds: Bounds, sn: f64) -> bool {
    bounds.width() < 1.0 / sn
}

impl VariableContext {
    /// Register every variable of the run with `model`, with start values
    /// taken from the current network state.
    pub fn build<M: NlpModel>(cache: &NetworkCache, params: &OpfParameters, model: &mut M) -> Self {
        let mut ctx = VariableContext::default();
        let sn = cache.nominal_apparent_power;
        let reduction = params.reactive_bounds_reduction;

        for bus in &cache.buses {
            ctx.bus_v.push(new_var(model, "bus_v", &bus.id, 1.0));
            ctx.bus_ph.push(new_var(model, "bus_ph", &bus.id, 0.0));
        }

        let mut fixed = 0;
        let mut injection_vars = |rows: &[InjectorRow], family: &str, model: &mut M| {
            let mut vars = InjectionVars::default();
            for row in rows {
                if row.bus_num.is_none() {
                    vars.p.push(None);
                    vars.q.push(None);
                    continue;
                }
                vars.p.push(Some(new_var(
                    model,
                    &format!("{}_p", family),
                    &row.id,
                    -row.target_p,
                )));
                let q_bounds =
                    Bounds::new(row.min_q_at_target_p, row.max_q_at_target_p).reduce(reduction);
                if too_small(q_bounds, sn) {
                    fixed += 1;
                    vars.q.push(None);
                } else {
                    vars.q.push(Some(new_var(
                        model,
                        &format!("{}_q", family),
                        &row.id,
                        -row.target_q,
                    )));
                }
            }
            vars
        };
        ctx.generators = injection_vars(&cache.generators, "gen", model);
        ctx.batteries = injection_vars(&cache.batteries, "battery", model);
        ctx.vsc_stations = injection_vars(&cache.vsc_stations, "vsc", model);

        for branch in &cache.branches {
            ctx.branches
                .push(branch_vars(model, &branch.id, branch.bus1_num, branch.bus2_num));
        }

        for t in &cache.transformers_3w {
            if !t.any_leg_live() {
                ctx.transformer_3w_star.push(None);
                ctx.transformer_3w_legs.push([BranchVars::Disconnected; 3]);
                continue;
            }
            ctx.transformer_3w_star.push(Some(NodeVars {
                v: new_var(model, "t3w_star_v", &t.id, 1.0),
                ph: new_var(model, "t3w_star_ph", &t.id, 0.0),
            }));
            let legs = [0, 1, 2].map(|k| {
                let leg_id = format!("{}_leg{}", t.id, k + 1);
                // the star point is always connected when the transformer is live
                branch_vars(model, &leg_id, Some(0), t.legs[k].bus_num)
            });
            ctx.transformer_3w_legs.push(legs);
        }

        for d in &cache.dangling_lines {
            if d.bus_num.is_none() {
                ctx.dangling_boundary.push(None);
                ctx.dangling_flow.push(BranchVars::Disconnected);
                continue;
            }
            ctx.dangling_boundary.push(Some(NodeVars {
                v: new_var(model, "dl_boundary_v", &d.id, 1.0),
                ph: new_var(model, "dl_boundary_ph", &d.id, 0.0),
            }));
            ctx.dangling_flow
                .push(branch_vars(model, &d.id, d.bus_num, Some(0)));
        }

        for s in &cache.shunts {
            if s.bus_num.is_some() {
                ctx.shunt_p.push(Some(new_var(model, "shunt_p", &s.id, -s.g)));
                ctx.shunt_q.push(Some(new_var(model, "shunt_q", &s.id, -s.b)));
            } else {
                ctx.shunt_p.push(None);
                ctx.shunt_q.push(None);
            }
        }

        for s in &cache.svcs {
            let var = s
                .bus_num
                .map(|_| new_var(model, "svc_q", &s.id, s.target_q));
            ctx.svc_q.push(var);
        }

        for node in &cache.dc_nodes {
            let v0 = if node.v.is_finite() && node.v > 0.0 {
                node.v
            } else {
                node.nominal_v
            };
            ctx.dc_node_v.push(new_var(model, "dc_node_v", &node.id, v0));
        }

        for line in &cache.dc_lines {
            let vars = match (line.node1_num, line.node2_num) {
                (Some(_), Some(_)) => Some(DcLineVars {
                    i1: new_var(model, "dc_line_i1", &line.id, 0.0),
                    i2: new_var(model, "dc_line_i2", &line.id, 0.0),
                }),
                _ => None,
            };
            ctx.dc_lines.push(vars);
        }

        for ground in &cache.dc_grounds {
            let var = ground
                .node_num
                .map(|_| new_var(model, "dc_ground_i", &ground.id, 0.0));
            ctx.dc_ground_i.push(var);
        }

        for c in &cache.converters {
            if !c.is_live() {
                ctx.converters.push(None);
                continue;
            }
            let q_bounds =
                Bounds::new(c.min_q_at_target_p, c.max_q_at_target_p).reduce(reduction);
            let q = if too_small(q_bounds, sn) {
                fixed += 1;
                None
            } else {
                Some(new_var(model, "conv_q", &c.id, -c.target_q))
            };
            ctx.converters.push(Some(ConverterVars {
                p: new_var(model, "conv_p", &c.id, -c.target_p),
                q,
                i: new_var(model, "conv_i", &c.id, 0.0),
            }));
        }

        ctx.fixed_reactive_count = fixed;
        if fixed > 0 {
            warn!(
                count = fixed,
                "reactive range too small, reactive power fixed at its set-point"
            );
        }
        info!(variables = model.num_variables(), "OPF variables allocated");
        ctx
    }

    /// Voltage variables of bus `num`
    pub fn bus_node(&self, num: usize) -> NodeVars {
        NodeVars {
            v: self.bus_v[num],
            ph: self.bus_ph[num],
        }
    }

    /// Count of branches per regime: `(closed, open_side1, open_side2)`
    pub fn branch_regime_counts(&self) -> (usize, usize, usize) {
        self.branches
            .iter()
            .fold((0, 0, 0), |(c, o1, o2), vars| match vars.regime() {
                BranchRegime::Closed => (c + 1, o1, o2),
                BranchRegime::OpenSide1 => (c, o1 + 1, o2),
                BranchRegime::OpenSide2 => (c, o1, o2 + 1),
                BranchRegime::Disconnected => (c, o1, o2),
            })
    }

    /// Write the solved state back to `network`, one batch per family.
    ///
    /// Values are written in per-unit; the network converts them back to
    /// engineering units through its active view.
    pub fn update_network<M: NlpModel>(
        &self,
        model: &M,
        cache: &NetworkCache,
        network: &mut Network,
    ) -> OpfResult<()> {
        let value = |var: VarId| model.value(var);
        let opt = |var: Option<VarId>| var.map(|v| model.value(v)).unwrap_or(0.0);
        let bus_v = |num: Option<usize>| num.map(|n| value(self.bus_v[n]));

        let bus_updates: Vec<BusUpdate> = cache
            .buses
            .iter()
            .enumerate()
            .map(|(n, bus)| BusUpdate {
                id: bus.id.clone(),
                v_mag: value(self.bus_v[n]),
                v_angle: value(self.bus_ph[n]),
            })
            .collect();
        network.update_buses(&bus_updates)?;

        let injector_updates = |rows: &[InjectorRow], vars: &InjectionVars| {
            rows.iter()
                .enumerate()
                .map(|(k, row)| injector_update(row, vars.p[k], vars.q[k], bus_v(row.bus_num), model))
                .collect::<Vec<_>>()
        };
        network.update_generators(&injector_updates(&cache.generators, &self.generators))?;
        network.update_batteries(&injector_updates(&cache.batteries, &self.batteries))?;

        let station_updates: Vec<VscStationUpdate> =
            injector_updates(&cache.vsc_stations, &self.vsc_stations)
                .into_iter()
                .map(|u| VscStationUpdate {
                    id: u.id,
                    target_q: u.target_q,
                    target_v: u.target_v,
                    voltage_regulator_on: u.voltage_regulator_on,
                    p: u.p,
                    q: u.q,
                })
                .collect();
        network.update_vsc_converter_stations(&station_updates)?;

        let hvdc_updates: Vec<HvdcLineUpdate> = cache
            .hvdc_lines
            .iter()
            .filter(|h| h.is_live(&cache.vsc_stations))
            .filter_map(|h| {
                let rectifier = h.rectifier_num?;
                Some(HvdcLineUpdate {
                    id: h.id.clone(),
                    target_p: opt(self.vsc_stations.p[rectifier]),
                })
            })
            .collect();
        network.update_hvdc_lines(&hvdc_updates)?;

        let load_updates: Vec<LoadUpdate> = cache
            .loads
            .iter()
            .map(|l| {
                let (p, q) = if l.bus_num.is_some() {
                    (l.p0, l.q0)
                } else {
                    (0.0, 0.0)
                };
                LoadUpdate {
                    id: l.id.clone(),
                    p,
                    q,
                }
            })
            .collect();
        network.update_loads(&load_updates)?;

        let flow = |side: Option<(VarId, VarId)>, v: Option<f64>| -> TerminalFlow {
            match (side, v) {
                (Some((p, q)), Some(v)) => {
                    let (p, q) = (value(p), value(q));
                    TerminalFlow {
                        p,
                        q,
                        i: if v > 0.0 { p.hypot(q) / v } else { 0.0 },
                    }
                }
                _ => TerminalFlow::default(),
            }
        };

        let mut line_updates = Vec::new();
        let mut twt_updates = Vec::new();
        for (branch, vars) in cache.branches.iter().zip(&self.branches) {
            let update = BranchUpdate {
                id: branch.id.clone(),
                flow1: flow(vars.side1(), bus_v(branch.bus1_num)),
                flow2: flow(vars.side2(), bus_v(branch.bus2_num)),
            };
            match branch.element_type {
                ElementType::TwoWindingsTransformer => twt_updates.push(update),
                _ => line_updates.push(update),
            }
        }
        network.update_lines(&line_updates)?;
        network.update_2_windings_transformers(&twt_updates)?;

        let t3w_updates: Vec<Transformer3wUpdate> = cache
            .transformers_3w
            .iter()
            .enumerate()
            .map(|(k, t)| {
                let star = self.transformer_3w_star[k];
                let legs = [0, 1, 2].map(|leg| {
                    flow(
                        self.transformer_3w_legs[k][leg].side2(),
                        bus_v(t.legs[leg].bus_num),
                    )
                });
                Transformer3wUpdate {
                    id: t.id.clone(),
                    star_bus_v: star.map(|s| value(s.v)).unwrap_or(f64::NAN),
                    star_bus_angle: star.map(|s| value(s.ph)).unwrap_or(f64::NAN),
                    legs,
                }
            })
            .collect();
        network.update_3_windings_transformers(&t3w_updates)?;

        let dangling_updates: Vec<DanglingLineUpdate> = cache
            .dangling_lines
            .iter()
            .enumerate()
            .map(|(k, d)| {
                let boundary = self.dangling_boundary[k];
                DanglingLineUpdate {
                    id: d.id.clone(),
                    flow: flow(self.dangling_flow[k].side1(), bus_v(d.bus_num)),
                    boundary_v: boundary.map(|b| value(b.v)).unwrap_or(f64::NAN),
                    boundary_angle: boundary.map(|b| value(b.ph)).unwrap_or(f64::NAN),
                }
            })
            .collect();
        network.update_dangling_lines(&dangling_updates)?;

        let shunt_updates: Vec<ShuntUpdate> = cache
            .shunts
            .iter()
            .enumerate()
            .map(|(k, s)| ShuntUpdate {
                id: s.id.clone(),
                p: opt(self.shunt_p[k]),
                q: opt(self.shunt_q[k]),
            })
            .collect();
        network.update_shunt_compensators(&shunt_updates)?;

        let svc_updates: Vec<SvcUpdate> = cache
            .svcs
            .iter()
            .enumerate()
            .map(|(k, s)| {
                let Some(var) = self.svc_q[k] else {
                    return SvcUpdate {
                        id: s.id.clone(),
                        regulation_mode: s.regulation_mode,
                        target_v: s.target_v,
                        target_q: s.target_q,
                        p: 0.0,
                        q: 0.0,
                    };
                };
                let q_gen = value(var);
                let v = bus_v(s.bus_num).unwrap_or(1.0);
                let range = Bounds::new(s.b_min * v * v, s.b_max * v * v);
                let (regulation_mode, target_q) = if range.contains(q_gen) {
                    (SvcRegulationMode::Voltage, q_gen)
                } else {
                    debug!(svc = %s.id, q = q_gen, range = %range, "SVC at its reactive limit");
                    (
                        SvcRegulationMode::ReactivePower,
                        q_gen.clamp(range.min.min(range.max), range.max.max(range.min)),
                    )
                };
                SvcUpdate {
                    id: s.id.clone(),
                    regulation_mode,
                    target_v: v,
                    target_q,
                    p: 0.0,
                    q: -q_gen,
                }
            })
            .collect();
        network.update_static_var_compensators(&svc_updates)?;

        let dc_node_updates: Vec<DcNodeUpdate> = cache
            .dc_nodes
            .iter()
            .enumerate()
            .map(|(n, node)| DcNodeUpdate {
                id: node.id.clone(),
                v: value(self.dc_node_v[n]),
            })
            .collect();
        network.update_dc_nodes(&dc_node_updates)?;

        let dc_line_updates: Vec<DcLineUpdate> = cache
            .dc_lines
            .iter()
            .enumerate()
            .map(|(k, line)| {
                let (i1, i2) = self.dc_lines[k]
                    .map(|vars| (value(vars.i1), value(vars.i2)))
                    .unwrap_or((0.0, 0.0));
                DcLineUpdate {
                    id: line.id.clone(),
                    i1,
                    i2,
                }
            })
            .collect();
        network.update_dc_lines(&dc_line_updates)?;

        let ground_updates: Vec<DcGroundUpdate> = cache
            .dc_grounds
            .iter()
            .enumerate()
            .map(|(k, g)| DcGroundUpdate {
                id: g.id.clone(),
                i: opt(self.dc_ground_i[k]),
            })
            .collect();
        network.update_dc_grounds(&ground_updates)?;

        let converter_updates: Vec<ConverterUpdate> = cache
            .converters
            .iter()
            .enumerate()
            .map(|(k, c)| match self.converters[k] {
                Some(vars) => {
                    let q = vars.q.map(value).unwrap_or(-c.target_q);
                    let (voltage_regulator_on, target_q) = infer_regulation(
                        -q,
                        Bounds::new(c.min_q_at_target_p, c.max_q_at_target_p),
                    );
                    ConverterUpdate {
                        id: c.id.clone(),
                        target_q,
                        target_v: bus_v(c.bus_num).unwrap_or(c.target_v),
                        voltage_regulator_on,
                        p: value(vars.p),
                        q,
                        i_dc: value(vars.i),
                    }
                }
                None => ConverterUpdate {
                    id: c.id.clone(),
                    target_q: c.target_q,
                    target_v: c.target_v,
                    voltage_regulator_on: c.voltage_regulator_on,
                    p: 0.0,
                    q: 0.0,
                    i_dc: 0.0,
                },
            })
            .collect();
        network.update_voltage_source_converters(&converter_updates)?;

        info!("OPF solution written back to the network");
        Ok(())
    }
}

/// A device whose reactive output lies inside its unreduced range regulates
/// voltage; otherwise it is fixed at the nearest bound.
fn infer_regulation(q_gen: f64, range: Bounds) -> (bool, f64) {
    if range.contains(q_gen) {
        (true, q_gen)
    } else {
        (false, q_gen.clamp(range.min.min(range.max), range.max.max(range.min)))
    }
}

fn injector_update<M: NlpModel>(
    row: &InjectorRow,
    p_var: Option<VarId>,
    q_var: Option<VarId>,
    bus_v: Option<f64>,
    model: &M,
) -> GeneratorUpdate {
    let Some(p_var) = p_var else {
        return GeneratorUpdate {
            id: row.id.clone(),
            target_p: row.target_p,
            target_q: row.target_q,
            target_v: row.target_v,
            voltage_regulator_on: row.voltage_regulator_on,
            p: 0.0,
            q: 0.0,
        };
    };
    let p = model.value(p_var);
    let q = q_var.map(|v| model.value(v)).unwrap_or(-row.target_q);
    let (voltage_regulator_on, target_q) = infer_regulation(
        -q,
        Bounds::new(row.min_q_at_target_p, row.max_q_at_target_p),
    );
    GeneratorUpdate {
        id: row.id.clone(),
        target_p: -p,
        target_q,
        target_v: bus_v.unwrap_or(row.target_v),
        voltage_regulator_on,
        p,
        q,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opf::network_cache::NetworkCache;
    use crate::solver::AugmentedLagrangianModel;

    fn two_bus(line_bus2: Option<&str>) -> Network {
        let mut network = Network::new();
        network.voltage_levels.push(VoltageLevel {
            id: "VL".into(),
            nominal_v: 100.0,
            ..VoltageLevel::default()
        });
        for id in ["A", "B"] {
            network.buses.push(Bus {
                id: id.into(),
                voltage_level_id: "VL".into(),
                v_mag: 100.0,
                ..Bus::default()
            });
        }
        network.lines.push(Line {
            id: "L".into(),
            voltage_level1_id: "VL".into(),
            voltage_level2_id: "VL".into(),
            bus1_id: Some("A".into()),
            bus2_id: line_bus2.map(String::from),
            x: 10.0,
            ..Line::default()
        });
        // keeps B in the main component when the line is open
        network.lines.push(Line {
            id: "L2".into(),
            voltage_level1_id: "VL".into(),
            voltage_level2_id: "VL".into(),
            bus1_id: Some("A".into()),
            bus2_id: Some("B".into()),
            x: 10.0,
            ..Line::default()
        });
        network.generators.push(Generator {
            id: "G".into(),
            voltage_level_id: "VL".into(),
            bus_id: Some("A".into()),
            min_q: -0.5,
            max_q: 0.5,
            ..Generator::default()
        });
        network
    }

    fn context(network: &mut Network) -> (VariableContext, AugmentedLagrangianModel) {
        let params = OpfParameters::default();
        let scope = PerUnitScope::new(network);
        let cache = NetworkCache::build(&scope, &params).unwrap();
        let mut model = AugmentedLagrangianModel::default();
        let ctx = VariableContext::build(&cache, &params, &mut model);
        (ctx, model)
    }

    #[test]
    fn test_regime_follows_connection() {
        let (closed, closed_model) = context(&mut two_bus(Some("B")));
        assert_eq!(closed.branches[0].regime(), BranchRegime::Closed);
        assert_eq!(closed.branches[0].num_variables(), 4);

        let (open, open_model) = context(&mut two_bus(None));
        assert_eq!(open.branches[0].regime(), BranchRegime::OpenSide2);
        assert_eq!(open.branches[0].num_variables(), 2);
        assert_eq!(open.branch_regime_counts(), (1, 0, 1));
        assert_eq!(open_model.num_variables() + 2, closed_model.num_variables());
    }

    #[test]
    fn test_narrow_reactive_range_has_no_variable() {
        // a 1 MVA range drops below the 1 MVA threshold once reduced
        let (ctx, _) = context(&mut two_bus(Some("B")));
        assert_eq!(ctx.generators.q, vec![None]);
        assert_eq!(ctx.fixed_reactive_count, 1);
        assert!(ctx.generators.p[0].is_some());
    }

    #[test]
    fn test_variable_names_carry_ids() {
        let (ctx, model) = context(&mut two_bus(Some("B")));
        assert_eq!(model.variable_name(ctx.bus_v[1]), "bus_v[B]");
        let (p1, _) = ctx.branches[0].side1().unwrap();
        assert_eq!(model.variable_name(p1), "branch_p1[L]");
    }

    #[test]
    fn test_infer_regulation() {
        let range = Bounds::new(-1.0, 1.0);
        assert_eq!(infer_regulation(0.5, range), (true, 0.5));
        assert_eq!(infer_regulation(1.5, range), (false, 1.0));
        assert_eq!(infer_regulation(-3.0, range), (false, -1.0));
    }
}
