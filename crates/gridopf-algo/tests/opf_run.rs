use gridopf_algo::opf::constraints::branch_flow::{closed_p1, closed_p2, SideState};
use gridopf_algo::opf::constraints::hvdc::delivered_power;
use gridopf_algo::opf::{BranchRegime, OpfModel};
use gridopf_algo::solver::NlpModel;
use gridopf_algo::{
    AugmentedLagrangianModel, OpfMode, OpfParameters, OptimalPowerFlow, SolverSettings,
};
use gridopf_core::*;

fn params() -> OpfParameters {
    OpfParameters::new().with_solver(SolverSettings {
        max_outer_iterations: 100,
        tolerance: 1e-6,
        ..SolverSettings::default()
    })
}

fn voltage_level(id: &str, nominal_v: f64) -> VoltageLevel {
    VoltageLevel {
        id: id.into(),
        nominal_v,
        ..VoltageLevel::default()
    }
}

fn bus(id: &str, vl: &str, v_mag: f64) -> Bus {
    Bus {
        id: id.into(),
        voltage_level_id: vl.into(),
        v_mag,
        ..Bus::default()
    }
}

fn generator(id: &str, vl: &str, bus_id: &str, target_p: f64, target_v: f64) -> Generator {
    Generator {
        id: id.into(),
        voltage_level_id: vl.into(),
        bus_id: Some(bus_id.into()),
        min_p: 0.0,
        max_p: 200.0,
        min_q: -100.0,
        max_q: 100.0,
        target_p,
        target_v,
        voltage_regulator_on: true,
        ..Generator::default()
    }
}

fn line(id: &str, vl: &str, bus1: Option<&str>, bus2: Option<&str>, r: f64, x: f64) -> Line {
    Line {
        id: id.into(),
        voltage_level1_id: vl.into(),
        voltage_level2_id: vl.into(),
        bus1_id: bus1.map(Into::into),
        bus2_id: bus2.map(Into::into),
        r,
        x,
        ..Line::default()
    }
}

/// One generator feeding a 50 MW load over a 225 kV line.
fn two_bus_network() -> Network {
    let mut network = Network::new();
    network.voltage_levels.push(voltage_level("VL", 225.0));
    network.buses.push(bus("B1", "VL", 225.0));
    network.buses.push(bus("B2", "VL", 225.0));
    network.slack_bus_id = Some("B1".into());
    network
        .generators
        .push(generator("G1", "VL", "B1", 50.0, 225.0));
    network.loads.push(Load {
        id: "L2".into(),
        voltage_level_id: "VL".into(),
        bus_id: Some("B2".into()),
        p0: 50.0,
        q0: 10.0,
        ..Load::default()
    });
    network
        .lines
        .push(line("L1-2", "VL", Some("B1"), Some("B2"), 1.0, 10.0));
    network
}

#[test]
fn test_two_bus_loadflow_serves_the_load() {
    let mut network = two_bus_network();
    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();

    assert!(result.converged, "status {}", result.status);
    assert!(result.applied);
    assert!(!network.per_unit());

    let line = &network.lines[0];
    assert!((line.flow2.p + 50.0).abs() < 1e-2, "p2 = {}", line.flow2.p);
    assert!((line.flow2.q + 10.0).abs() < 1e-2, "q2 = {}", line.flow2.q);
    // resistive losses
    assert!(line.flow1.p > 50.0);
    assert!(line.flow1.p + line.flow2.p < 1.0);

    // generator written back in load convention, target in generator convention
    let gen = &network.generators[0];
    assert!((gen.p + line.flow1.p).abs() < 1e-2);
    assert!((gen.target_p - line.flow1.p).abs() < 1e-2);

    // SI units again, slack angle pinned
    assert!((network.buses[0].v_mag - 225.0).abs() < 1e-2);
    assert_eq!(network.buses[0].v_angle, 0.0);
    assert!(network.buses[1].v_mag < network.buses[0].v_mag);
    assert!(network.buses[1].v_mag > 0.8 * 225.0);
}

#[test]
fn test_closed_branch_equations_hold_at_the_solution() {
    let mut network = two_bus_network();
    let mut model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    assert!(model.solve().unwrap().is_success());

    let ctx = model.context();
    let solver = model.solver();
    let node = |n: usize| SideState {
        v: solver.value(ctx.bus_v[n]),
        ph: solver.value(ctx.bus_ph[n]),
    };
    let pi = model.cache().branches[0].pi;
    let (Some((p1, _)), Some((p2, _))) = (ctx.branches[0].side1(), ctx.branches[0].side2()) else {
        panic!("line should be closed");
    };
    assert!((solver.value(p1) - closed_p1(&pi, node(0), node(1))).abs() < 1e-4);
    assert!((solver.value(p2) - closed_p2(&pi, node(0), node(1))).abs() < 1e-4);
}

#[test]
fn test_disconnected_generator_is_zeroed() {
    let mut network = two_bus_network();
    let mut idle = generator("G2", "VL", "B1", 30.0, 225.0);
    idle.bus_id = None;
    idle.p = -12.0;
    network.generators.push(idle);

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.applied);
    let idle = &network.generators[1];
    assert_eq!(idle.p, 0.0);
    assert_eq!(idle.q, 0.0);
    assert!((idle.target_p - 30.0).abs() < 1e-9);
}

#[test]
fn test_opening_a_line_switches_its_regime() {
    let mut network = two_bus_network();
    network
        .lines
        .push(line("L1-2b", "VL", Some("B1"), Some("B2"), 1.0, 10.0));

    let closed_vars = {
        let model =
            OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
        assert_eq!(model.context().branches[1].regime(), BranchRegime::Closed);
        model.solver().num_variables()
    };

    network.lines[1].bus2_id = None;
    let model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    assert_eq!(model.context().branches[1].regime(), BranchRegime::OpenSide2);
    assert_eq!(model.solver().num_variables(), closed_vars - 2);
}

#[test]
fn test_open_line_charging_is_drawn_from_its_connected_side() {
    let mut network = two_bus_network();
    let mut open = line("L1-x", "VL", Some("B1"), None, 1.0, 10.0);
    open.b1 = 1e-4;
    open.b2 = 1e-4;
    network.lines.push(open);

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.converged, "status {}", result.status);
    let open = &network.lines[1];
    assert!(open.flow1.q < 0.0, "charging should inject reactive power");
    assert_eq!(open.flow2, TerminalFlow::default());
}

#[test]
fn test_hvdc_link_loses_power() {
    let mut network = two_bus_network();
    for (id, bus_id) in [("S1", "B1"), ("S2", "B2")] {
        network.vsc_converter_stations.push(VscConverterStation {
            id: id.into(),
            voltage_level_id: "VL".into(),
            bus_id: Some(bus_id.into()),
            loss_factor: 1.0,
            min_q: -50.0,
            max_q: 50.0,
            ..VscConverterStation::default()
        });
    }
    network.hvdc_lines.push(HvdcLine {
        id: "H".into(),
        converter_station1_id: "S1".into(),
        converter_station2_id: "S2".into(),
        r: 1.0,
        nominal_v: 400.0,
        max_p: 100.0,
        target_p: 30.0,
        converters_mode: ConvertersMode::Side1RectifierSide2Inverter,
    });

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.converged, "status {}", result.status);

    let rectifier = &network.vsc_converter_stations[0];
    let inverter = &network.vsc_converter_stations[1];
    assert!(rectifier.p > 0.0);
    assert!(inverter.p < 0.0);
    assert!(inverter.p.abs() < rectifier.p);
    assert!((rectifier.p - network.hvdc_lines[0].target_p).abs() < 1e-6);

    // converter losses alone take 2% of the transfer
    let upper = delivered_power(rectifier.p, 0.0, 1.0, 1.0);
    assert!(inverter.p.abs() <= upper + 1e-2);
}

#[test]
fn test_dc_network_with_ground() {
    let mut network = two_bus_network();
    for id in ["N1", "N2", "N3"] {
        network.dc_nodes.push(DcNode {
            id: id.into(),
            nominal_v: 400.0,
            v: 400.0,
            ..DcNode::default()
        });
    }
    network.dc_lines.push(DcLine {
        id: "D1".into(),
        dc_node1_id: Some("N1".into()),
        dc_node2_id: Some("N2".into()),
        r: 2.0,
        ..DcLine::default()
    });
    network.dc_grounds.push(DcGround {
        id: "GND".into(),
        dc_node_id: Some("N3".into()),
        ..DcGround::default()
    });
    for (id, bus_id, node1, mode, target_p) in [
        ("C1", "B1", "N1", ConverterControlMode::VDc, 0.0),
        ("C2", "B2", "N2", ConverterControlMode::PPcc, 20.0),
    ] {
        network.voltage_source_converters.push(VoltageSourceConverter {
            id: id.into(),
            voltage_level_id: "VL".into(),
            bus_id: Some(bus_id.into()),
            dc_node1_id: Some(node1.into()),
            dc_node2_id: Some("N3".into()),
            idle_loss: 0.1,
            switching_loss: 0.01,
            resistive_loss: 0.05,
            control_mode: mode,
            target_p,
            target_v_dc: 400.0,
            min_p: -100.0,
            max_p: 100.0,
            min_q: -50.0,
            max_q: 50.0,
            ..VoltageSourceConverter::default()
        });
    }

    let mut model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    {
        let solver = model.solver();
        let names: Vec<&str> = (0..solver.num_constraints())
            .map(|k| solver.constraint_name(gridopf_algo::solver::ConstraintId::new(k)))
            .collect();
        assert!(names.contains(&"dc_ground_v[GND]"));
        assert!(names.contains(&"dc_kcl[N3]"));
        assert!(names.contains(&"conv_coupling[C1]"));
    }
    assert!(model.solve().unwrap().is_success());
    model.apply().unwrap();

    assert!(network.dc_nodes[2].v.abs() < 1e-3);
    let dc_line = &network.dc_lines[0];
    assert!((dc_line.i1 + dc_line.i2).abs() < 1e-4);
    // both converters return their current through the ground node
    let i_total: f64 = network
        .voltage_source_converters
        .iter()
        .map(|c| c.i_dc)
        .sum();
    assert!((i_total - network.dc_grounds[0].i).abs() < 1e-3);
}

#[test]
fn test_redispatching_respects_current_limits() {
    let mut network = two_bus_network();
    network.current_limits.push(CurrentLimit {
        branch_id: "L1-2".into(),
        side: Side::One,
        value: 1000.0,
    });

    let mut model = OpfModel::build(
        &mut network,
        params().with_mode(OpfMode::Redispatching),
        AugmentedLagrangianModel::default(),
    )
    .unwrap();
    let solver = model.solver();
    let names: Vec<&str> = (0..solver.num_constraints())
        .map(|k| solver.constraint_name(gridopf_algo::solver::ConstraintId::new(k)))
        .collect();
    assert!(names.contains(&"current_limit1[L1-2]"));
    assert!(!names.iter().any(|n| n.starts_with("current_limit2")));
    model.solve().unwrap();
}

#[test]
fn test_loadflow_ignores_current_limits() {
    let mut network = two_bus_network();
    network.current_limits.push(CurrentLimit {
        branch_id: "L1-2".into(),
        side: Side::Two,
        value: 1.0,
    });

    let model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    let solver = model.solver();
    assert!((0..solver.num_constraints()).all(|k| !solver
        .constraint_name(gridopf_algo::solver::ConstraintId::new(k))
        .starts_with("current_limit")));
}

#[test]
fn test_failed_run_is_not_applied_when_asked() {
    let mut network = two_bus_network();
    // a load far beyond what the line can carry
    network.loads[0].p0 = 1e6;
    let mut params = params();
    params.apply_on_failure = false;
    params.solver.max_outer_iterations = 2;
    params.solver.max_inner_iterations = 5;

    let result = OptimalPowerFlow::new(params).run(&mut network).unwrap();
    assert!(!result.converged);
    assert!(!result.applied);
    assert_eq!(network.lines[0].flow1, TerminalFlow::default());
    assert!(!network.per_unit());
}

fn constraint_names<M: NlpModel>(solver: &M) -> Vec<String> {
    (0..solver.num_constraints())
        .map(|k| {
            solver
                .constraint_name(gridopf_algo::solver::ConstraintId::new(k))
                .to_string()
        })
        .collect()
}

/// 400 kV generator feeding 225 kV and 63 kV loads through one
/// lossless three-winding transformer.
fn three_winding_network() -> Network {
    let mut network = Network::new();
    for (id, nominal_v) in [("VL400", 400.0), ("VL225", 225.0), ("VL63", 63.0)] {
        network.voltage_levels.push(voltage_level(id, nominal_v));
    }
    network.buses.push(bus("B1", "VL400", 400.0));
    network.buses.push(bus("B2", "VL225", 225.0));
    network.buses.push(bus("B3", "VL63", 63.0));
    network.slack_bus_id = Some("B1".into());
    network
        .generators
        .push(generator("G1", "VL400", "B1", 60.0, 400.0));
    for (id, vl, bus_id, p0) in [("L2", "VL225", "B2", 40.0), ("L3", "VL63", "B3", 20.0)] {
        network.loads.push(Load {
            id: id.into(),
            voltage_level_id: vl.into(),
            bus_id: Some(bus_id.into()),
            p0,
            ..Load::default()
        });
    }

    let leg = |vl: &str, bus_id: &str, rated_u: f64, x: f64| Transformer3wLeg {
        voltage_level_id: vl.into(),
        bus_id: Some(bus_id.into()),
        x,
        rated_u,
        ..Transformer3wLeg::default()
    };
    network
        .three_windings_transformers
        .push(ThreeWindingsTransformer {
            id: "T3".into(),
            rated_u0: 400.0,
            legs: [
                leg("VL400", "B1", 400.0, 16.0),
                leg("VL225", "B2", 225.0, 5.0),
                leg("VL63", "B3", 63.0, 0.4),
            ],
            ..ThreeWindingsTransformer::default()
        });
    network
}

#[test]
fn test_three_winding_transformer_splits_the_transfer() {
    let mut network = three_winding_network();
    let mut model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    let names = constraint_names(model.solver());
    assert!(names.iter().any(|n| n == "t3w_star_p[T3]"));
    assert!(model.context().transformer_3w_legs[0]
        .iter()
        .all(|leg| leg.regime() == BranchRegime::Closed));

    assert!(model.solve().unwrap().is_success());
    {
        // nothing is withdrawn at the star point
        let solver = model.solver();
        let star_p: f64 = model.context().transformer_3w_legs[0]
            .iter()
            .filter_map(|leg| leg.side1())
            .map(|(p, _)| solver.value(p))
            .sum();
        assert!(star_p.abs() < 1e-4, "star balance {}", star_p);
    }
    model.apply().unwrap();

    let legs = &network.three_windings_transformers[0].legs;
    assert!((legs[0].flow.p - 60.0).abs() < 0.1, "leg1 p = {}", legs[0].flow.p);
    assert!((legs[1].flow.p + 40.0).abs() < 0.1, "leg2 p = {}", legs[1].flow.p);
    assert!((legs[2].flow.p + 20.0).abs() < 0.1, "leg3 p = {}", legs[2].flow.p);
    assert!(legs.iter().map(|leg| leg.flow.p).sum::<f64>().abs() < 1e-2);
    assert!(network.three_windings_transformers[0].star_bus_v.is_finite());
}

#[test]
fn test_three_winding_transformer_with_a_disconnected_leg() {
    let mut network = three_winding_network();
    network.three_windings_transformers[0].legs[2].bus_id = None;

    let mut model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    let regimes = model.context().transformer_3w_legs[0].map(|leg| leg.regime());
    assert_eq!(
        regimes,
        [BranchRegime::Closed, BranchRegime::Closed, BranchRegime::OpenSide2]
    );
    assert!(model.solve().unwrap().is_success());
    model.apply().unwrap();

    let legs = &network.three_windings_transformers[0].legs;
    assert!((legs[0].flow.p - 40.0).abs() < 0.1, "leg1 p = {}", legs[0].flow.p);
    assert_eq!(legs[2].flow, TerminalFlow::default());
}

#[test]
fn test_dangling_line_serves_its_boundary_load() {
    let mut network = two_bus_network();
    network.dangling_lines.push(DanglingLine {
        id: "DL".into(),
        voltage_level_id: "VL".into(),
        bus_id: Some("B2".into()),
        r: 1.0,
        x: 10.0,
        p0: 30.0,
        q0: 5.0,
        ..DanglingLine::default()
    });

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.converged, "status {}", result.status);

    let dl = &network.dangling_lines[0];
    // the boundary withdraws p0 + j·q0, the line adds its losses
    assert!(dl.flow.p > 30.0 && dl.flow.p < 30.5, "p = {}", dl.flow.p);
    assert!(dl.flow.q > 5.0, "q = {}", dl.flow.q);
    assert!(dl.boundary_v < network.buses[1].v_mag);
    assert!(network.generators[0].target_p > 80.0);
}

#[test]
fn test_shunt_powers_follow_the_voltage() {
    let mut network = two_bus_network();
    let z_base = 225.0 * 225.0 / 100.0;
    network.shunt_compensators.push(ShuntCompensator {
        id: "SH".into(),
        voltage_level_id: "VL".into(),
        bus_id: Some("B2".into()),
        // 5 MW and 10 Mvar at nominal voltage
        g: 0.05 / z_base,
        b: 0.1 / z_base,
        ..ShuntCompensator::default()
    });

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.converged, "status {}", result.status);

    let v = network.buses[1].v_mag / 225.0;
    let shunt = &network.shunt_compensators[0];
    assert!((shunt.p + 5.0 * v * v).abs() < 1e-2, "p = {}", shunt.p);
    assert!((shunt.q + 10.0 * v * v).abs() < 1e-2, "q = {}", shunt.q);
    // a positive conductance supplies the bus, so the generator covers less than the load
    assert!(network.generators[0].target_p < 46.0);
}

#[test]
fn test_svc_output_stays_within_its_susceptance_range() {
    let mut network = two_bus_network();
    let z_base = 225.0 * 225.0 / 100.0;
    for (id, target_q) in [("SVC1", 5.0), ("SVC2", 50.0)] {
        network.static_var_compensators.push(StaticVarCompensator {
            id: id.into(),
            voltage_level_id: "VL".into(),
            bus_id: Some("B2".into()),
            // ±20 Mvar at nominal voltage
            b_min: -0.2 / z_base,
            b_max: 0.2 / z_base,
            regulation_mode: SvcRegulationMode::ReactivePower,
            target_v: 225.0,
            target_q,
            ..StaticVarCompensator::default()
        });
    }

    let result = OptimalPowerFlow::new(params()).run(&mut network).unwrap();
    assert!(result.converged, "status {}", result.status);

    let v = network.buses[1].v_mag / 225.0;
    let q_max = 20.0 * v * v;

    // inside its range: reaches the set-point and is written back as regulating
    let svc1 = &network.static_var_compensators[0];
    assert!((svc1.target_q - 5.0).abs() < 0.05, "target_q = {}", svc1.target_q);
    assert!((svc1.q + 5.0).abs() < 0.05);
    assert_eq!(svc1.regulation_mode, SvcRegulationMode::Voltage);

    // asks for more than b_max·v² allows
    let svc2 = &network.static_var_compensators[1];
    assert!(-svc2.q <= q_max + 1e-2, "q = {} max {}", -svc2.q, q_max);
    assert!(-svc2.q > q_max - 0.1, "q = {} max {}", -svc2.q, q_max);
}

#[test]
fn test_capability_curve_caps_reactive_output() {
    let mut network = two_bus_network();
    network.generators[0].target_p = 30.0;
    let mut g2 = generator("G2", "VL", "B2", 20.0, 225.0);
    g2.voltage_regulator_on = false;
    g2.target_q = 60.0;
    g2.reactive_limits_kind = ReactiveLimitsKind::Curve;
    network.generators.push(g2);
    let points = vec![
        ReactiveCapabilityCurvePoint {
            id: "G2".into(),
            num: 0,
            p: 0.0,
            min_q: -50.0,
            max_q: 50.0,
        },
        ReactiveCapabilityCurvePoint {
            id: "G2".into(),
            num: 1,
            p: 100.0,
            min_q: -30.0,
            max_q: 30.0,
        },
    ];
    network.reactive_capability_curve_points = points.clone();

    let mut model =
        OpfModel::build(&mut network, params(), AugmentedLagrangianModel::default()).unwrap();
    let names = constraint_names(model.solver());
    assert_eq!(
        names.iter().filter(|n| n.ends_with("[G2]") && n.starts_with("curve_facet_")).count(),
        4
    );
    assert!(model.solve().unwrap().is_success());
    model.apply().unwrap();

    let g2 = &network.generators[1];
    let (_, max_q) = reactive_range_at(&points, g2.target_p).unwrap();
    let reduced_max = max_q * (1.0 - OpfParameters::default().reactive_bounds_reduction);
    assert!(g2.target_q <= reduced_max + 1e-2, "q = {} max {}", g2.target_q, reduced_max);
    assert!(g2.target_q > reduced_max - 0.5, "q = {} max {}", g2.target_q, reduced_max);
    // inside the unreduced range, so it now regulates voltage
    assert!(g2.voltage_regulator_on);
}
