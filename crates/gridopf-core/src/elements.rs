//! Element tables of the network model.
//!
//! Every element is a row keyed by a string identifier. Quantities are stored
//! in engineering units (MW, Mvar, kV, Ω, S, A, degrees); see
//! [`crate::units`] for the per-unit view. Injections follow the generator
//! convention for set-points (`target_p > 0` produces power) and the load
//! convention for terminal results (`p > 0` is withdrawn from the bus).
//!
//! A terminal is disconnected when its `bus_id` is `None`. The voltage level
//! id is always set so the element keeps a voltage base while disconnected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of network element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Bus,
    Generator,
    Battery,
    Load,
    Line,
    TwoWindingsTransformer,
    ThreeWindingsTransformer,
    ShuntCompensator,
    StaticVarCompensator,
    DanglingLine,
    VscConverterStation,
    HvdcLine,
    DcNode,
    DcLine,
    DcGround,
    VoltageSourceConverter,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Bus => "bus",
            ElementType::Generator => "generator",
            ElementType::Battery => "battery",
            ElementType::Load => "load",
            ElementType::Line => "line",
            ElementType::TwoWindingsTransformer => "two_windings_transformer",
            ElementType::ThreeWindingsTransformer => "three_windings_transformer",
            ElementType::ShuntCompensator => "shunt_compensator",
            ElementType::StaticVarCompensator => "static_var_compensator",
            ElementType::DanglingLine => "dangling_line",
            ElementType::VscConverterStation => "vsc_converter_station",
            ElementType::HvdcLine => "hvdc_line",
            ElementType::DcNode => "dc_node",
            ElementType::DcLine => "dc_line",
            ElementType::DcGround => "dc_ground",
            ElementType::VoltageSourceConverter => "voltage_source_converter",
        };
        f.write_str(name)
    }
}

/// Terminal side of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
    Three,
}

/// How the reactive capability of a device is described
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReactiveLimitsKind {
    /// Fixed `[min_q, max_q]` pair
    #[default]
    MinMax,
    /// Piecewise curve stored in [`ReactiveCapabilityCurvePoint`] rows
    Curve,
}

#[derive(Debug, Clone, Default)]
pub struct VoltageLevel {
    pub id: String,
    /// Nominal voltage (kV). Stays in kV in the per-unit view.
    pub nominal_v: f64,
    pub low_voltage_limit: Option<f64>,
    pub high_voltage_limit: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Bus {
    pub id: String,
    pub voltage_level_id: String,
    /// Voltage magnitude (kV)
    pub v_mag: f64,
    /// Voltage angle (degrees)
    pub v_angle: f64,
    /// Filled in by snapshots; 0 is the largest component.
    pub connected_component: Option<usize>,
    /// Filled in by snapshots; 0 is the largest component.
    pub synchronous_component: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Generator {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub min_p: f64,
    pub max_p: f64,
    pub reactive_limits_kind: ReactiveLimitsKind,
    pub min_q: f64,
    pub max_q: f64,
    pub target_p: f64,
    pub target_q: f64,
    /// Voltage set-point (kV)
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Battery {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub min_p: f64,
    pub max_p: f64,
    pub reactive_limits_kind: ReactiveLimitsKind,
    pub min_q: f64,
    pub max_q: f64,
    pub target_p: f64,
    pub target_q: f64,
    pub target_v: f64,
    pub voltage_regulator_on: bool,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Load {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub p0: f64,
    pub q0: f64,
    pub p: f64,
    pub q: f64,
}

/// Flows at one terminal: p, q (load convention) and current (A)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TerminalFlow {
    pub p: f64,
    pub q: f64,
    pub i: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Line {
    pub id: String,
    pub voltage_level1_id: String,
    pub voltage_level2_id: String,
    pub bus1_id: Option<String>,
    pub bus2_id: Option<String>,
    pub r: f64,
    pub x: f64,
    pub g1: f64,
    pub b1: f64,
    pub g2: f64,
    pub b2: f64,
    pub flow1: TerminalFlow,
    pub flow2: TerminalFlow,
}

#[derive(Debug, Clone)]
pub struct TwoWindingsTransformer {
    pub id: String,
    pub voltage_level1_id: String,
    pub voltage_level2_id: String,
    pub bus1_id: Option<String>,
    pub bus2_id: Option<String>,
    /// Series impedance on the side-2 voltage (Ω)
    pub r: f64,
    pub x: f64,
    /// Magnetizing admittance on the side-2 voltage (S)
    pub g: f64,
    pub b: f64,
    pub rated_u1: f64,
    pub rated_u2: f64,
    /// Ratio tap changer multiplier
    pub ratio_tap_rho: f64,
    /// Phase tap changer shift (degrees)
    pub phase_tap_alpha: f64,
    pub flow1: TerminalFlow,
    pub flow2: TerminalFlow,
}

impl Default for TwoWindingsTransformer {
    fn default() -> Self {
        Self {
            id: String::new(),
            voltage_level1_id: String::new(),
            voltage_level2_id: String::new(),
            bus1_id: None,
            bus2_id: None,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            rated_u1: 0.0,
            rated_u2: 0.0,
            ratio_tap_rho: 1.0,
            phase_tap_alpha: 0.0,
            flow1: TerminalFlow::default(),
            flow2: TerminalFlow::default(),
        }
    }
}

/// One leg of a three-winding transformer, from the star point to the leg bus.
///
/// Impedance and admittance are expressed on the leg's nominal voltage. The
/// ideal ratio sits on the star side: `v_leg = v_star · (rated_u / rated_u0) / ratio_tap_rho`.
#[derive(Debug, Clone)]
pub struct Transformer3wLeg {
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub rated_u: f64,
    pub ratio_tap_rho: f64,
    pub phase_tap_alpha: f64,
    pub flow: TerminalFlow,
}

impl Default for Transformer3wLeg {
    fn default() -> Self {
        Self {
            voltage_level_id: String::new(),
            bus_id: None,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            rated_u: 0.0,
            ratio_tap_rho: 1.0,
            phase_tap_alpha: 0.0,
            flow: TerminalFlow::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThreeWindingsTransformer {
    pub id: String,
    /// Star point rated voltage (kV), also the star point's voltage base
    pub rated_u0: f64,
    pub legs: [Transformer3wLeg; 3],
    /// Star point voltage magnitude (kV)
    pub star_bus_v: f64,
    /// Star point voltage angle (degrees)
    pub star_bus_angle: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ShuntCompensator {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub g: f64,
    pub b: f64,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SvcRegulationMode {
    Voltage,
    ReactivePower,
    #[default]
    Off,
}

#[derive(Debug, Clone, Default)]
pub struct StaticVarCompensator {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub b_min: f64,
    pub b_max: f64,
    pub regulation_mode: SvcRegulationMode,
    pub target_v: f64,
    pub target_q: f64,
    pub p: f64,
    pub q: f64,
}

/// Line connected on one side to the network and on the other to a boundary
/// point where a fixed `p0`/`q0` is withdrawn.
#[derive(Debug, Clone, Default)]
pub struct DanglingLine {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub r: f64,
    pub x: f64,
    pub g: f64,
    pub b: f64,
    pub p0: f64,
    pub q0: f64,
    pub flow: TerminalFlow,
    pub boundary_v: f64,
    pub boundary_angle: f64,
}

#[derive(Debug, Clone, Default)]
pub struct VscConverterStation {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    /// Converter losses in percent of the power flowing through
    pub loss_factor: f64,
    pub reactive_limits_kind: ReactiveLimitsKind,
    pub min_q: f64,
    pub max_q: f64,
    pub voltage_regulator_on: bool,
    pub target_v: f64,
    pub target_q: f64,
    pub p: f64,
    pub q: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvertersMode {
    #[default]
    Side1RectifierSide2Inverter,
    Side1InverterSide2Rectifier,
}

#[derive(Debug, Clone, Default)]
pub struct HvdcLine {
    pub id: String,
    pub converter_station1_id: String,
    pub converter_station2_id: String,
    /// DC resistance (Ω)
    pub r: f64,
    /// DC nominal voltage (kV), stays in kV in the per-unit view
    pub nominal_v: f64,
    pub max_p: f64,
    pub target_p: f64,
    pub converters_mode: ConvertersMode,
}

/// DC quantities (kV, kA, Ω, MW) are never normalized.
#[derive(Debug, Clone, Default)]
pub struct DcNode {
    pub id: String,
    pub nominal_v: f64,
    pub v: f64,
    /// Filled in by snapshots
    pub connected_component: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct DcLine {
    pub id: String,
    pub dc_node1_id: Option<String>,
    pub dc_node2_id: Option<String>,
    pub r: f64,
    /// Current injected into node 1 by the line (kA)
    pub i1: f64,
    /// Current injected into node 2 by the line (kA)
    pub i2: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DcGround {
    pub id: String,
    pub dc_node_id: Option<String>,
    /// Current injected into the node by the ground (kA)
    pub i: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConverterControlMode {
    /// Active power at the point of common coupling
    #[default]
    PPcc,
    /// DC voltage
    VDc,
}

/// AC/DC converter of a DC sub-network.
///
/// `p` is withdrawn from the AC bus; the converter injects `i_dc` into DC node
/// 1 and draws it back from DC node 2.
#[derive(Debug, Clone, Default)]
pub struct VoltageSourceConverter {
    pub id: String,
    pub voltage_level_id: String,
    pub bus_id: Option<String>,
    pub dc_node1_id: Option<String>,
    pub dc_node2_id: Option<String>,
    /// Constant loss (MW)
    pub idle_loss: f64,
    /// Loss proportional to |i_dc| (MW/kA)
    pub switching_loss: f64,
    /// Loss proportional to i_dc² (Ω)
    pub resistive_loss: f64,
    pub control_mode: ConverterControlMode,
    /// Active power injected into the AC bus (generator convention)
    pub target_p: f64,
    pub target_v_dc: f64,
    pub min_p: f64,
    pub max_p: f64,
    pub reactive_limits_kind: ReactiveLimitsKind,
    pub min_q: f64,
    pub max_q: f64,
    pub voltage_regulator_on: bool,
    pub target_v: f64,
    pub target_q: f64,
    pub p: f64,
    pub q: f64,
    pub i_dc: f64,
}

/// One sample of a reactive capability curve, keyed by `(id, num)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactiveCapabilityCurvePoint {
    pub id: String,
    pub num: usize,
    pub p: f64,
    pub min_q: f64,
    pub max_q: f64,
}

/// Permanent current limit of a branch side (A)
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentLimit {
    pub branch_id: String,
    pub side: Side,
    pub value: f64,
}

/// Reactive range of a curve at active power `p`, interpolated linearly
/// between samples and clamped to the outermost ones.
///
/// `points` must be sorted by `p`. Returns `None` for an empty curve.
pub fn reactive_range_at(points: &[ReactiveCapabilityCurvePoint], p: f64) -> Option<(f64, f64)> {
    let first = points.first()?;
    let last = points.last()?;
    if p <= first.p {
        return Some((first.min_q, first.max_q));
    }
    if p >= last.p {
        return Some((last.min_q, last.max_q));
    }
    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if p >= a.p && p <= b.p {
            let span = b.p - a.p;
            if span.abs() < f64::EPSILON {
                return Some((a.min_q.max(b.min_q), a.max_q.min(b.max_q)));
            }
            let t = (p - a.p) / span;
            return Some((
                a.min_q + t * (b.min_q - a.min_q),
                a.max_q + t * (b.max_q - a.max_q),
            ));
        }
    }
    Some((last.min_q, last.max_q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(num: usize, p: f64, min_q: f64, max_q: f64) -> ReactiveCapabilityCurvePoint {
        ReactiveCapabilityCurvePoint {
            id: "G1".into(),
            num,
            p,
            min_q,
            max_q,
        }
    }

    #[test]
    fn test_reactive_range_interpolates() {
        let curve = vec![point(0, 0.0, -100.0, 100.0), point(1, 100.0, -50.0, 60.0)];
        let (min_q, max_q) = reactive_range_at(&curve, 50.0).unwrap();
        assert!((min_q + 75.0).abs() < 1e-12);
        assert!((max_q - 80.0).abs() < 1e-12);
    }

    #[test]
    fn test_reactive_range_clamps_outside_curve() {
        let curve = vec![point(0, 0.0, -100.0, 100.0), point(1, 100.0, -50.0, 60.0)];
        assert_eq!(reactive_range_at(&curve, -10.0), Some((-100.0, 100.0)));
        assert_eq!(reactive_range_at(&curve, 200.0), Some((-50.0, 60.0)));
        assert_eq!(reactive_range_at(&[], 1.0), None);
    }

    #[test]
    fn test_element_type_display() {
        assert_eq!(ElementType::DanglingLine.to_string(), "dangling_line");
        assert_eq!(ElementType::Generator.to_string(), "generator");
    }
}
