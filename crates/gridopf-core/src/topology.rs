//! Connected and synchronous component numbering.
//!
//! Two graphs are built over the element tables:
//!
//! - the **synchronous** graph joins AC buses through lines, two-winding
//!   transformers and the connected legs of three-winding transformers;
//! - the **connected** graph adds HVDC links between converter station buses
//!   and the DC sub-networks (voltage-source converters and DC lines), with DC
//!   nodes as extra vertices.
//!
//! Components are labeled by breadth-first search and renumbered by
//! decreasing size, so component 0 is the main one. Ties keep the order in
//! which components were first reached.

use crate::Network;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Undirected;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Vertex {
    Bus(String),
    DcNode(String),
}

/// Component numbers for every bus and DC node.
#[derive(Debug, Clone, Default)]
pub struct ComponentNumbering {
    pub bus_connected: HashMap<String, usize>,
    pub bus_synchronous: HashMap<String, usize>,
    pub dc_node_connected: HashMap<String, usize>,
}

struct TopologyGraph {
    graph: Graph<Vertex, (), Undirected>,
    index: HashMap<Vertex, NodeIndex>,
}

impl TopologyGraph {
    fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
            index: HashMap::new(),
        }
    }

    fn add_vertex(&mut self, vertex: Vertex) {
        if !self.index.contains_key(&vertex) {
            let idx = self.graph.add_node(vertex.clone());
            self.index.insert(vertex, idx);
        }
    }

    /// Edges to vertices the graph does not hold are ignored.
    fn connect(&mut self, a: &Vertex, b: &Vertex) {
        if let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) {
            if ia != ib {
                self.graph.add_edge(ia, ib, ());
            }
        }
    }

    /// Component label per node index, largest component first.
    fn label_components(&self) -> Vec<usize> {
        let n = self.graph.node_count();
        let mut raw = vec![usize::MAX; n];
        let mut sizes = Vec::new();
        for start in self.graph.node_indices() {
            if raw[start.index()] != usize::MAX {
                continue;
            }
            let island = sizes.len();
            let mut count = 0;
            let mut queue = VecDeque::new();
            raw[start.index()] = island;
            queue.push_back(start);
            while let Some(node) = queue.pop_front() {
                count += 1;
                for neighbor in self.graph.neighbors(node) {
                    if raw[neighbor.index()] == usize::MAX {
                        raw[neighbor.index()] = island;
                        queue.push_back(neighbor);
                    }
                }
            }
            sizes.push(count);
        }

        let mut order: Vec<usize> = (0..sizes.len()).collect();
        // stable sort keeps discovery order among equal sizes
        order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]));
        let mut renumber = vec![0; sizes.len()];
        for (rank, island) in order.into_iter().enumerate() {
            renumber[island] = rank;
        }
        raw.into_iter().map(|island| renumber[island]).collect()
    }

    fn numbering(&self) -> HashMap<Vertex, usize> {
        let labels = self.label_components();
        self.graph
            .node_indices()
            .map(|idx| (self.graph[idx].clone(), labels[idx.index()]))
            .collect()
    }
}

fn bus(id: &str) -> Vertex {
    Vertex::Bus(id.to_string())
}

fn dc_node(id: &str) -> Vertex {
    Vertex::DcNode(id.to_string())
}

fn add_ac_edges(network: &Network, topo: &mut TopologyGraph) {
    for line in &network.lines {
        if let (Some(b1), Some(b2)) = (&line.bus1_id, &line.bus2_id) {
            topo.connect(&bus(b1), &bus(b2));
        }
    }
    for twt in &network.two_windings_transformers {
        if let (Some(b1), Some(b2)) = (&twt.bus1_id, &twt.bus2_id) {
            topo.connect(&bus(b1), &bus(b2));
        }
    }
    for twt in &network.three_windings_transformers {
        let mut connected = twt.legs.iter().filter_map(|leg| leg.bus_id.as_deref());
        if let Some(first) = connected.next() {
            for other in connected {
                topo.connect(&bus(first), &bus(other));
            }
        }
    }
}

/// Compute connected and synchronous component numbers.
pub fn compute_components(network: &Network) -> ComponentNumbering {
    let mut synchronous = TopologyGraph::new();
    let mut connected = TopologyGraph::new();
    for b in &network.buses {
        synchronous.add_vertex(bus(&b.id));
        connected.add_vertex(bus(&b.id));
    }
    for node in &network.dc_nodes {
        connected.add_vertex(dc_node(&node.id));
    }

    add_ac_edges(network, &mut synchronous);
    add_ac_edges(network, &mut connected);

    let station_bus: HashMap<&str, Option<&str>> = network
        .vsc_converter_stations
        .iter()
        .map(|s| (s.id.as_str(), s.bus_id.as_deref()))
        .collect();
    for hvdc in &network.hvdc_lines {
        let b1 = station_bus
            .get(hvdc.converter_station1_id.as_str())
            .copied()
            .flatten();
        let b2 = station_bus
            .get(hvdc.converter_station2_id.as_str())
            .copied()
            .flatten();
        if let (Some(b1), Some(b2)) = (b1, b2) {
            connected.connect(&bus(b1), &bus(b2));
        }
    }
    for conv in &network.voltage_source_converters {
        if let Some(b) = &conv.bus_id {
            for node in [&conv.dc_node1_id, &conv.dc_node2_id].into_iter().flatten() {
                connected.connect(&bus(b), &dc_node(node));
            }
        }
    }
    for line in &network.dc_lines {
        if let (Some(n1), Some(n2)) = (&line.dc_node1_id, &line.dc_node2_id) {
            connected.connect(&dc_node(n1), &dc_node(n2));
        }
    }

    let mut numbering = ComponentNumbering::default();
    for (vertex, component) in synchronous.numbering() {
        if let Vertex::Bus(id) = vertex {
            numbering.bus_synchronous.insert(id, component);
        }
    }
    for (vertex, component) in connected.numbering() {
        match vertex {
            Vertex::Bus(id) => {
                numbering.bus_connected.insert(id, component);
            }
            Vertex::DcNode(id) => {
                numbering.dc_node_connected.insert(id, component);
            }
        }
    }
    numbering
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, Line};

    fn bus_row(id: &str) -> Bus {
        Bus {
            id: id.into(),
            voltage_level_id: "VL".into(),
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
            x: 1.0,
            ..Line::default()
        }
    }

    #[test]
    fn test_largest_island_is_component_zero() {
        let mut network = Network::new();
        for id in ["A", "B", "C", "D", "E"] {
            network.buses.push(bus_row(id));
        }
        // A alone, B-C-D together, E alone
        network.lines.push(line("L1", Some("B"), Some("C")));
        network.lines.push(line("L2", Some("C"), Some("D")));
        let comps = compute_components(&network);
        assert_eq!(comps.bus_synchronous["B"], 0);
        assert_eq!(comps.bus_synchronous["D"], 0);
        assert_eq!(comps.bus_synchronous["A"], 1);
        assert_eq!(comps.bus_synchronous["E"], 2);
    }

    #[test]
    fn test_open_line_splits_islands() {
        let mut network = Network::new();
        network.buses.push(bus_row("A"));
        network.buses.push(bus_row("B"));
        network.lines.push(line("L1", Some("A"), None));
        let comps = compute_components(&network);
        assert_ne!(comps.bus_connected["A"], comps.bus_connected["B"]);
    }
}
