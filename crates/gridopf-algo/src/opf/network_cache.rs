//! # Network cache
//!
//! Read-only, per-unit snapshot of everything one OPF run needs, built once at
//! the start of the run.
//!
//! Rows are restricted to the **main component**: buses whose connected and
//! synchronous component numbers are both 0. Equipment rows are joined to
//! that bus table on their bus ids:
//!
//! | Terminals                              | Row                        |
//! |----------------------------------------|----------------------------|
//! | at least one in the main component     | kept, live terminals set   |
//! | all disconnected (`bus_id` empty)      | kept, no live terminal     |
//! | only in secondary islands              | dropped                    |
//!
//! Kept rows with no live terminal get no variables and no constraints; they
//! are written back as zeros. Dropped rows are not touched at all.
//!
//! Lines and two-winding transformers are merged into a single branch table
//! carrying π-model parameters `(r, x, g1, b1, g2, b2, r1, a1)` where the
//! ideal transformer `r1∠a1` sits on side 1:
//!
//! ```text
//!  side 1 ──[ r1∠a1 ]──┬──[ r + jx ]──┬── side 2
//!                   g1+jb1         g2+jb2
//! ```

use super::parameters::OpfParameters;
use crate::error::OpfResult;
use gridopf_core::{
    reactive_range_at, ConverterControlMode, ConvertersMode, ElementType, PerUnitScope,
    ReactiveCapabilityCurvePoint, ReactiveLimitsKind, Side, SvcRegulationMode,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Where one terminal of a row ends up after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminal {
    Live(usize),
    Disconnected,
    OutsideMainComponent,
}

impl Terminal {
    fn live(self) -> Option<usize> {
        match self {
            Terminal::Live(num) => Some(num),
            _ => None,
        }
    }
}

/// Keep a row if any terminal is live or if every terminal is disconnected.
fn keep(terminals: &[Terminal]) -> bool {
    terminals.iter().any(|t| matches!(t, Terminal::Live(_)))
        || terminals.iter().all(|t| matches!(t, Terminal::Disconnected))
}

#[derive(Debug, Clone)]
pub struct BusRow {
    pub id: String,
    pub voltage_level_id: String,
    /// Nominal voltage (kV)
    pub nominal_v: f64,
    /// Per-unit voltage limits from the voltage level
    pub low_voltage_limit: Option<f64>,
    pub high_voltage_limit: Option<f64>,
}

/// Role of a VSC station on its HVDC line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvdcRole {
    Rectifier,
    Inverter,
}

/// Generator, battery or VSC converter station. Powers in per-unit,
/// generator convention.
#[derive(Debug, Clone)]
pub struct InjectorRow {
    pub id: String,
    pub element_type: ElementType,
    pub bus_num: Option<usize>,
    pub min_p: f64,
    pub max_p: f64,
    pub target_p: f64,
    pub target_q: f64,
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub reactive_limits_kind: ReactiveLimitsKind,
    /// Reactive range at the active set-point, unreduced
    pub min_q_at_target_p: f64,
    pub max_q_at_target_p: f64,
    /// Set for VSC stations attached to an HVDC line
    pub hvdc_role: Option<HvdcRole>,
}

#[derive(Debug, Clone)]
pub struct LoadRow {
    pub id: String,
    pub bus_num: Option<usize>,
    pub p0: f64,
    pub q0: f64,
}

/// π-model parameters in per-unit
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PiModel {
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
    pub r1: f64,
    pub a1: f64,
}

#[derive(Debug, Clone)]
pub struct BranchRow {
    pub id: String,
    pub element_type: ElementType,
    pub bus1_num: Option<usize>,
    pub bus2_num: Option<usize>,
    pub pi: PiModel,
}

/// Leg of a three-winding transformer as a branch from the star point (side 1)
/// to the leg bus (side 2).
#[derive(Debug, Clone)]
pub struct LegRow {
    pub bus_num: Option<usize>,
    pub pi: PiModel,
}

#[derive(Debug, Clone)]
pub struct Transformer3wRow {
    pub id: String,
    pub legs: [LegRow; 3],
}

impl Transformer3wRow {
    pub fn any_leg_live(&self) -> bool {
        self.legs.iter().any(|leg| leg.bus_num.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct ShuntRow {
    pub id: String,
    pub bus_num: Option<usize>,
    pub g: f64,
    pub b: f64,
}

#[derive(Debug, Clone)]
pub struct SvcRow {
    pub id: String,
    pub bus_num: Option<usize>,
    pub b_min: f64,
    pub b_max: f64,
    pub regulation_mode: SvcRegulationMode,
    pub target_v: f64,
    pub target_q: f64,
}

#[derive(Debug, Clone)]
pub struct DanglingLineRow {
    pub id: String,
    pub bus_num: Option<usize>,
    pub pi: PiModel,
    pub p0: f64,
    pub q0: f64,
}

#[derive(Debug, Clone)]
pub struct HvdcLineRow {
    pub id: String,
    /// Row indices into [`NetworkCache::vsc_stations`]
    pub rectifier_num: Option<usize>,
    pub inverter_num: Option<usize>,
    /// Per-unit on the line's DC base
    pub r: f64,
    pub max_p: f64,
    pub target_p: f64,
    /// Station loss factors in percent
    pub rectifier_loss_factor: f64,
    pub inverter_loss_factor: f64,
}

impl HvdcLineRow {
    /// Both stations are connected in the main component
    pub fn is_live(&self, stations: &[InjectorRow]) -> bool {
        let live = |num: Option<usize>| num.is_some_and(|n| stations[n].bus_num.is_some());
        live(self.rectifier_num) && live(self.inverter_num)
    }
}

#[derive(Debug, Clone)]
pub struct DcNodeRow {
    pub id: String,
    /// kV
    pub nominal_v: f64,
    pub v: f64,
}

#[derive(Debug, Clone)]
pub struct DcLineRow {
    pub id: String,
    pub node1_num: Option<usize>,
    pub node2_num: Option<usize>,
    /// Ω
    pub r: f64,
}

#[derive(Debug, Clone)]
pub struct DcGroundRow {
    pub id: String,
    pub node_num: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ConverterRow {
    pub id: String,
    pub bus_num: Option<usize>,
    pub node1_num: Option<usize>,
    pub node2_num: Option<usize>,
    /// MW
    pub idle_loss: f64,
    /// MW/kA
    pub switching_loss: f64,
    /// Ω
    pub resistive_loss: f64,
    pub control_mode: ConverterControlMode,
    /// Per-unit, generator convention
    pub target_p: f64,
    /// kV
    pub target_v_dc: f64,
    pub min_p: f64,
    pub max_p: f64,
    pub reactive_limits_kind: ReactiveLimitsKind,
    pub min_q_at_target_p: f64,
    pub max_q_at_target_p: f64,
    pub voltage_regulator_on: bool,
    pub target_v: f64,
    pub target_q: f64,
}

impl ConverterRow {
    pub fn is_live(&self) -> bool {
        self.bus_num.is_some() && self.node1_num.is_some() && self.node2_num.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CurrentLimitRow {
    /// Row index into [`NetworkCache::branches`]
    pub branch_num: usize,
    pub side: Side,
    /// Per-unit current
    pub value: f64,
}

/// Filtered per-unit tables for one OPF run.
#[derive(Debug, Clone, Default)]
pub struct NetworkCache {
    pub nominal_apparent_power: f64,
    pub buses: Vec<BusRow>,
    pub slack_bus_num: Option<usize>,
    pub generators: Vec<InjectorRow>,
    pub batteries: Vec<InjectorRow>,
    pub vsc_stations: Vec<InjectorRow>,
    pub loads: Vec<LoadRow>,
    pub branches: Vec<BranchRow>,
    pub transformers_3w: Vec<Transformer3wRow>,
    pub shunts: Vec<ShuntRow>,
    pub svcs: Vec<SvcRow>,
    pub dangling_lines: Vec<DanglingLineRow>,
    pub hvdc_lines: Vec<HvdcLineRow>,
    pub dc_nodes: Vec<DcNodeRow>,
    pub dc_lines: Vec<DcLineRow>,
    pub dc_grounds: Vec<DcGroundRow>,
    pub converters: Vec<ConverterRow>,
    pub current_limits: Vec<CurrentLimitRow>,
    /// Capability curve samples per device id, sorted by `num`, per-unit
    pub curve_points: HashMap<String, Vec<ReactiveCapabilityCurvePoint>>,
}

struct BusIndex {
    main: HashMap<String, usize>,
    known: HashSet<String>,
}

impl BusIndex {
    fn terminal(&self, bus_id: &Option<String>) -> Terminal {
        match bus_id {
            None => Terminal::Disconnected,
            Some(id) => match self.main.get(id) {
                Some(&num) => Terminal::Live(num),
                None => {
                    if !self.known.contains(id) {
                        debug!(bus_id = %id, "terminal references an unknown bus");
                    }
                    Terminal::OutsideMainComponent
                }
            },
        }
    }
}

/// Pick the reactive range at the active set-point, from the curve when the
/// device has one.
fn reactive_range(
    id: &str,
    kind: ReactiveLimitsKind,
    min_q: f64,
    max_q: f64,
    target_p: f64,
    curves: &HashMap<String, Vec<ReactiveCapabilityCurvePoint>>,
) -> (f64, f64) {
    match kind {
        ReactiveLimitsKind::MinMax => (min_q, max_q),
        ReactiveLimitsKind::Curve => curves
            .get(id)
            .and_then(|points| reactive_range_at(points, target_p))
            .unwrap_or((min_q, max_q)),
    }
}

impl NetworkCache {
    /// Snapshot the network. Taking the per-unit scope guarantees every
    /// value read here is normalized.
    pub fn build(network: &PerUnitScope<'_>, params: &OpfParameters) -> OpfResult<Self> {
        let voltage_levels: HashMap<String, _> = network
            .get_voltage_levels()
            .into_iter()
            .map(|vl| (vl.id.clone(), vl))
            .collect();

        let mut cache = NetworkCache {
            nominal_apparent_power: network.nominal_apparent_power(),
            ..NetworkCache::default()
        };

        // Buses
        let all_buses = network.get_buses();
        let mut index = BusIndex {
            main: HashMap::new(),
            known: all_buses.iter().map(|b| b.id.clone()).collect(),
        };
        for bus in all_buses {
            if bus.connected_component != Some(0) || bus.synchronous_component != Some(0) {
                continue;
            }
            let vl = voltage_levels.get(&bus.voltage_level_id);
            index.main.insert(bus.id.clone(), cache.buses.len());
            cache.buses.push(BusRow {
                nominal_v: vl.map(|v| v.nominal_v).unwrap_or(f64::NAN),
                low_voltage_limit: vl.and_then(|v| v.low_voltage_limit),
                high_voltage_limit: vl.and_then(|v| v.high_voltage_limit),
                id: bus.id,
                voltage_level_id: bus.voltage_level_id,
            });
        }
        cache.slack_bus_num = match &network.slack_bus_id {
            Some(id) => match index.main.get(id) {
                Some(&num) => Some(num),
                None => {
                    warn!(bus_id = %id, "slack bus is not in the main component, using first bus");
                    (!cache.buses.is_empty()).then_some(0)
                }
            },
            None => (!cache.buses.is_empty()).then_some(0),
        };

        // Capability curves
        for point in network.get_reactive_capability_curve_points() {
            cache
                .curve_points
                .entry(point.id.clone())
                .or_default()
                .push(point);
        }

        cache.build_injections(network, &index);
        cache.build_hvdc(network, &index);
        cache.build_branches(network, &index, params);
        cache.build_dc(network, &index);

        info!(
            buses = cache.buses.len(),
            generators = cache.generators.len(),
            branches = cache.branches.len(),
            transformers_3w = cache.transformers_3w.len(),
            hvdc_lines = cache.hvdc_lines.len(),
            dc_nodes = cache.dc_nodes.len(),
            "network cache built"
        );
        Ok(cache)
    }

    fn build_injections(&mut self, network: &PerUnitScope<'_>, index: &BusIndex) {
        for g in network.get_generators() {
            let t = index.terminal(&g.bus_id);
            if !keep(&[t]) {
                continue;
            }
            let (min_q, max_q) = reactive_range(
                &g.id,
                g.reactive_limits_kind,
                g.min_q,
                g.max_q,
                g.target_p,
                &self.curve_points,
            );
            self.generators.push(InjectorRow {
                id: g.id,
                element_type: ElementType::Generator,
                bus_num: t.live(),
                min_p: g.min_p,
                max_p: g.max_p,
                target_p: g.target_p,
                target_q: g.target_q,
                target_v: g.target_v,
                voltage_regulator_on: g.voltage_regulator_on,
                reactive_limits_kind: g.reactive_limits_kind,
                min_q_at_target_p: min_q,
                max_q_at_target_p: max_q,
                hvdc_role: None,
            });
        }

        for b in network.get_batteries() {
            let t = index.terminal(&b.bus_id);
            if !keep(&[t]) {
                continue;
            }
            let (min_q, max_q) = reactive_range(
                &b.id,
                b.reactive_limits_kind,
                b.min_q,
                b.max_q,
                b.target_p,
                &self.curve_points,
            );
            self.batteries.push(InjectorRow {
                id: b.id,
                element_type: ElementType::Battery,
                bus_num: t.live(),
                min_p: b.min_p,
                max_p: b.max_p,
                target_p: b.target_p,
                target_q: b.target_q,
                target_v: b.target_v,
                voltage_regulator_on: b.voltage_regulator_on,
                reactive_limits_kind: b.reactive_limits_kind,
                min_q_at_target_p: min_q,
                max_q_at_target_p: max_q,
                hvdc_role: None,
            });
        }

        for l in network.get_loads() {
            let t = index.terminal(&l.bus_id);
            if keep(&[t]) {
                self.loads.push(LoadRow {
                    id: l.id,
                    bus_num: t.live(),
                    p0: l.p0,
                    q0: l.q0,
                });
            }
        }

        for s in network.get_shunt_compensators() {
            let t = index.terminal(&s.bus_id);
            if keep(&[t]) {
                self.shunts.push(ShuntRow {
                    id: s.id,
                    bus_num: t.live(),
                    g: s.g,
                    b: s.b,
                });
            }
        }

        for s in network.get_static_var_compensators() {
            let t = index.terminal(&s.bus_id);
            if keep(&[t]) {
                self.svcs.push(SvcRow {
                    id: s.id,
                    bus_num: t.live(),
                    b_min: s.b_min,
                    b_max: s.b_max,
                    regulation_mode: s.regulation_mode,
                    target_v: s.target_v,
                    target_q: s.target_q,
                });
            }
        }
    }

    /// VSC stations and HVDC lines. Station active power bounds come from
    /// the line they belong to and their role on it.
    fn build_hvdc(&mut self, network: &PerUnitScope<'_>, index: &BusIndex) {
        let hvdc_lines = network.get_hvdc_lines();
        let mut roles: HashMap<&str, (HvdcRole, f64, f64)> = HashMap::new();
        for h in &hvdc_lines {
            let (rectifier, inverter) = match h.converters_mode {
                ConvertersMode::Side1RectifierSide2Inverter => {
                    (&h.converter_station1_id, &h.converter_station2_id)
                }
                ConvertersMode::Side1InverterSide2Rectifier => {
                    (&h.converter_station2_id, &h.converter_station1_id)
                }
            };
            roles.insert(rectifier.as_str(), (HvdcRole::Rectifier, h.max_p, h.target_p));
            roles.insert(inverter.as_str(), (HvdcRole::Inverter, h.max_p, h.target_p));
        }

        let mut station_num = HashMap::new();
        let mut loss_factor = HashMap::new();
        for s in network.get_vsc_converter_stations() {
            let t = index.terminal(&s.bus_id);
            if !keep(&[t]) {
                continue;
            }
            // generator convention: the rectifier draws power, the inverter injects it
            let (role, min_p, max_p, target_p) = match roles.get(s.id.as_str()) {
                Some(&(HvdcRole::Rectifier, max_p, target_p)) => {
                    (Some(HvdcRole::Rectifier), -max_p, 0.0, -target_p)
                }
                Some(&(HvdcRole::Inverter, max_p, target_p)) => {
                    (Some(HvdcRole::Inverter), 0.0, max_p, target_p)
                }
                None => (None, 0.0, 0.0, 0.0),
            };
            let (min_q, max_q) = reactive_range(
                &s.id,
                s.reactive_limits_kind,
                s.min_q,
                s.max_q,
                target_p,
                &self.curve_points,
            );
            station_num.insert(s.id.clone(), self.vsc_stations.len());
            loss_factor.insert(s.id.clone(), s.loss_factor);
            self.vsc_stations.push(InjectorRow {
                id: s.id,
                element_type: ElementType::VscConverterStation,
                bus_num: t.live(),
                min_p,
                max_p,
                target_p,
                target_q: s.target_q,
                target_v: s.target_v,
                voltage_regulator_on: s.voltage_regulator_on,
                reactive_limits_kind: s.reactive_limits_kind,
                min_q_at_target_p: min_q,
                max_q_at_target_p: max_q,
                hvdc_role: role,
            });
        }

        for h in hvdc_lines {
            let (rectifier, inverter) = match h.converters_mode {
                ConvertersMode::Side1RectifierSide2Inverter => {
                    (h.converter_station1_id, h.converter_station2_id)
                }
                ConvertersMode::Side1InverterSide2Rectifier => {
                    (h.converter_station2_id, h.converter_station1_id)
                }
            };
            let rectifier_num = station_num.get(&rectifier).copied();
            let inverter_num = station_num.get(&inverter).copied();
            if rectifier_num.is_none() && inverter_num.is_none() {
                continue;
            }
            self.hvdc_lines.push(HvdcLineRow {
                id: h.id,
                rectifier_num,
                inverter_num,
                r: h.r,
                max_p: h.max_p,
                target_p: h.target_p,
                rectifier_loss_factor: loss_factor.get(&rectifier).copied().unwrap_or(0.0),
                inverter_loss_factor: loss_factor.get(&inverter).copied().unwrap_or(0.0),
            });
        }

        // a station whose line is not fully live cannot transfer power
        for h in &self.hvdc_lines {
            if !h.is_live(&self.vsc_stations) {
                for num in [h.rectifier_num, h.inverter_num].into_iter().flatten() {
                    let station = &mut self.vsc_stations[num];
                    station.min_p = 0.0;
                    station.max_p = 0.0;
                    station.target_p = 0.0;
                }
            }
        }
    }

    fn build_branches(
        &mut self,
        network: &PerUnitScope<'_>,
        index: &BusIndex,
        params: &OpfParameters,
    ) {
        let nominal = |vl_id: &str| {
            network
                .voltage_levels
                .iter()
                .find(|vl| vl.id == vl_id)
                .map(|vl| vl.nominal_v)
                .unwrap_or(f64::NAN)
        };

        let mut branch_num = HashMap::new();
        for l in network.get_lines() {
            let t1 = index.terminal(&l.bus1_id);
            let t2 = index.terminal(&l.bus2_id);
            if !keep(&[t1, t2]) {
                continue;
            }
            // parameters are on the side-2 base; the ratio maps side-1 voltages onto it
            let r1 = nominal(&l.voltage_level1_id) / nominal(&l.voltage_level2_id);
            branch_num.insert(l.id.clone(), self.branches.len());
            self.branches.push(BranchRow {
                id: l.id,
                element_type: ElementType::Line,
                bus1_num: t1.live(),
                bus2_num: t2.live(),
                pi: PiModel {
                    r: l.r,
                    x: l.x,
                    g1: l.g1,
                    b1: l.b1,
                    g2: l.g2,
                    b2: l.b2,
                    r1: if r1.is_finite() { r1 } else { 1.0 },
                    a1: 0.0,
                },
            });
        }

        for t in network.get_2_windings_transformers() {
            let t1 = index.terminal(&t.bus1_id);
            let t2 = index.terminal(&t.bus2_id);
            if !keep(&[t1, t2]) {
                continue;
            }
            let (g1, b1, g2, b2) = if params.twt_split_shunt_admittance {
                (t.g / 2.0, t.b / 2.0, t.g / 2.0, t.b / 2.0)
            } else {
                (t.g, t.b, 0.0, 0.0)
            };
            branch_num.insert(t.id.clone(), self.branches.len());
            self.branches.push(BranchRow {
                id: t.id,
                element_type: ElementType::TwoWindingsTransformer,
                bus1_num: t1.live(),
                bus2_num: t2.live(),
                pi: PiModel {
                    r: t.r,
                    x: t.x,
                    g1,
                    b1,
                    g2,
                    b2,
                    r1: t.rated_u2 / t.rated_u1 * t.ratio_tap_rho,
                    a1: t.phase_tap_alpha,
                },
            });
        }

        for t in network.get_3_windings_transformers() {
            let terminals: Vec<Terminal> =
                t.legs.iter().map(|leg| index.terminal(&leg.bus_id)).collect();
            if !keep(&terminals) {
                continue;
            }
            let legs = [0, 1, 2].map(|k| {
                let leg = &t.legs[k];
                LegRow {
                    bus_num: terminals[k].live(),
                    pi: PiModel {
                        r: leg.r,
                        x: leg.x,
                        g1: leg.g,
                        b1: leg.b,
                        g2: 0.0,
                        b2: 0.0,
                        r1: leg.rated_u / leg.ratio_tap_rho,
                        a1: -leg.phase_tap_alpha,
                    },
                }
            });
            self.transformers_3w.push(Transformer3wRow { id: t.id, legs });
        }

        for d in network.get_dangling_lines() {
            let t = index.terminal(&d.bus_id);
            if !keep(&[t]) {
                continue;
            }
            self.dangling_lines.push(DanglingLineRow {
                id: d.id,
                bus_num: t.live(),
                pi: PiModel {
                    r: d.r,
                    x: d.x,
                    g1: d.g,
                    b1: d.b,
                    g2: 0.0,
                    b2: 0.0,
                    r1: 1.0,
                    a1: 0.0,
                },
                p0: d.p0,
                q0: d.q0,
            });
        }

        for limit in network.get_current_limits() {
            if let Some(&num) = branch_num.get(&limit.branch_id) {
                if limit.side == Side::Three {
                    warn!(branch_id = %limit.branch_id, "ignoring side-3 current limit on a two-terminal branch");
                    continue;
                }
                self.current_limits.push(CurrentLimitRow {
                    branch_num: num,
                    side: limit.side,
                    value: limit.value,
                });
            }
        }
    }

    fn build_dc(&mut self, network: &PerUnitScope<'_>, index: &BusIndex) {
        let mut node_num = HashMap::new();
        for node in network.get_dc_nodes() {
            if node.connected_component != Some(0) {
                continue;
            }
            node_num.insert(node.id.clone(), self.dc_nodes.len());
            self.dc_nodes.push(DcNodeRow {
                id: node.id,
                nominal_v: node.nominal_v,
                v: node.v,
            });
        }
        let node_terminal = |id: &Option<String>| match id {
            None => Terminal::Disconnected,
            Some(id) => match node_num.get(id) {
                Some(&num) => Terminal::Live(num),
                None => Terminal::OutsideMainComponent,
            },
        };

        for line in network.get_dc_lines() {
            let t1 = node_terminal(&line.dc_node1_id);
            let t2 = node_terminal(&line.dc_node2_id);
            if keep(&[t1, t2]) {
                self.dc_lines.push(DcLineRow {
                    id: line.id,
                    node1_num: t1.live(),
                    node2_num: t2.live(),
                    r: line.r,
                });
            }
        }

        for ground in network.get_dc_grounds() {
            let t = node_terminal(&ground.dc_node_id);
            if keep(&[t]) {
                self.dc_grounds.push(DcGroundRow {
                    id: ground.id,
                    node_num: t.live(),
                });
            }
        }

        for c in network.get_voltage_source_converters() {
            let tb = index.terminal(&c.bus_id);
            let t1 = node_terminal(&c.dc_node1_id);
            let t2 = node_terminal(&c.dc_node2_id);
            if !keep(&[tb, t1, t2]) {
                continue;
            }
            let (min_q, max_q) = reactive_range(
                &c.id,
                c.reactive_limits_kind,
                c.min_q,
                c.max_q,
                c.target_p,
                &self.curve_points,
            );
            self.converters.push(ConverterRow {
                id: c.id,
                bus_num: tb.live(),
                node1_num: t1.live(),
                node2_num: t2.live(),
                idle_loss: c.idle_loss,
                switching_loss: c.switching_loss,
                resistive_loss: c.resistive_loss,
                control_mode: c.control_mode,
                target_p: c.target_p,
                target_v_dc: c.target_v_dc,
                min_p: c.min_p,
                max_p: c.max_p,
                reactive_limits_kind: c.reactive_limits_kind,
                min_q_at_target_p: min_q,
                max_q_at_target_p: max_q,
                voltage_regulator_on: c.voltage_regulator_on,
                target_v: c.target_v,
                target_q: c.target_q,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridopf_core::*;

    fn vl(id: &str, nominal_v: f64) -> VoltageLevel {
        VoltageLevel {
            id: id.into(),
            nominal_v,
            ..VoltageLevel::default()
        }
    }

    fn bus(id: &str, vl: &str) -> Bus {
        Bus {
            id: id.into(),
            voltage_level_id: vl.into(),
            ..Bus::default()
        }
    }

    fn line(id: &str, b1: Option<&str>, b2: Option<&str>) -> Line {
        Line {
            id: id.into(),
            voltage_level1_id: "VL".into(),
            voltage_level2_id: "VL".into(),
            bus1_id: b1.map(String::from),
            bus2_id: b2.map(String::from),
            x: 10.0,
            ..Line::default()
        }
    }

    /// A-B-C in the main island, D-E in a secondary island.
    fn islanded_network() -> Network {
        let mut network = Network::new();
        network.voltage_levels.push(vl("VL", 100.0));
        for id in ["A", "B", "C", "D", "E"] {
            network.buses.push(bus(id, "VL"));
        }
        network.lines.push(line("AB", Some("A"), Some("B")));
        network.lines.push(line("BC", Some("B"), Some("C")));
        network.lines.push(line("DE", Some("D"), Some("E")));
        network.lines.push(line("A-open", Some("A"), None));
        network.lines.push(line("D-open", Some("D"), None));
        network.lines.push(line("floating", None, None));
        network.generators.push(Generator {
            id: "G-main".into(),
            voltage_level_id: "VL".into(),
            bus_id: Some("A".into()),
            ..Generator::default()
        });
        network.generators.push(Generator {
            id: "G-island".into(),
            voltage_level_id: "VL".into(),
            bus_id: Some("D".into()),
            ..Generator::default()
        });
        network.generators.push(Generator {
            id: "G-off".into(),
            voltage_level_id: "VL".into(),
            bus_id: None,
            ..Generator::default()
        });
        network
    }

    #[test]
    fn test_secondary_islands_are_excluded() {
        let mut network = islanded_network();
        let scope = PerUnitScope::new(&mut network);
        let cache = NetworkCache::build(&scope, &OpfParameters::default()).unwrap();

        let buses: Vec<_> = cache.buses.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(buses, vec!["A", "B", "C"]);

        let branches: Vec<_> = cache.branches.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(branches, vec!["AB", "BC", "A-open", "floating"]);

        let gens: Vec<_> = cache.generators.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(gens, vec!["G-main", "G-off"]);
        assert_eq!(cache.generators[1].bus_num, None);
        assert_eq!(cache.slack_bus_num, Some(0));
    }

    #[test]
    fn test_build_runs_in_per_unit_and_scope_restores() {
        let mut network = islanded_network();
        {
            let scope = PerUnitScope::new(&mut network);
            let cache = NetworkCache::build(&scope, &OpfParameters::default()).unwrap();
            // x = 10 Ω on a 100 kV base: z_base = 100 Ω
            assert!((cache.branches[0].pi.x - 0.1).abs() < 1e-12);
            assert_eq!(cache.branches[0].pi.r1, 1.0);
        }
        assert!(!network.per_unit());
    }

    #[test]
    fn test_transformer_ratio_and_split() {
        let mut network = Network::new();
        network.voltage_levels.push(vl("HV", 400.0));
        network.voltage_levels.push(vl("MV", 225.0));
        network.buses.push(bus("H", "HV"));
        network.buses.push(bus("M", "MV"));
        network.two_windings_transformers.push(TwoWindingsTransformer {
            id: "T".into(),
            voltage_level1_id: "HV".into(),
            voltage_level2_id: "MV".into(),
            bus1_id: Some("H".into()),
            bus2_id: Some("M".into()),
            x: 5.0,
            b: 1e-4,
            rated_u1: 400.0,
            rated_u2: 230.0,
            ratio_tap_rho: 1.0,
            ..TwoWindingsTransformer::default()
        });

        let params = OpfParameters::default().with_twt_split_shunt_admittance(true);
        let scope = PerUnitScope::new(&mut network);
        let cache = NetworkCache::build(&scope, &params).unwrap();
        let pi = cache.branches[0].pi;
        assert!((pi.r1 - (230.0 / 225.0) / (400.0 / 400.0)).abs() < 1e-12);
        assert!((pi.b1 - pi.b2).abs() < 1e-15);
        assert!(pi.b1 > 0.0);
    }

    #[test]
    fn test_explicit_slack_bus() {
        let mut network = islanded_network();
        network.slack_bus_id = Some("C".into());
        let scope = PerUnitScope::new(&mut network);
        let cache = NetworkCache::build(&scope, &OpfParameters::default()).unwrap();
        assert_eq!(cache.slack_bus_num, Some(2));
    }
}
