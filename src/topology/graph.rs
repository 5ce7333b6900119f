//! Immutable undirected topology snapshot.

use std::collections::{HashMap, HashSet, VecDeque};

use color_eyre::eyre::{eyre, Result};

use super::types::{GraphStats, NodeId, NodeInfo};
use crate::error::AnalysisError;
use crate::gml_parser::{GmlGraph, GmlValue};

/// One snapshot of the overlay network.
///
/// Neighbor lists keep edge insertion order, which keeps every traversal
/// and every ranking tie deterministic for a given input file.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    cycle: u64,
    nodes: HashMap<NodeId, NodeInfo>,
    node_order: Vec<NodeId>,
    adjacency: HashMap<NodeId, Vec<NodeId>>,
    edge_count: usize,
}

impl Topology {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    /// Insert or replace a node
    pub fn add_node(&mut self, id: NodeId, location: f64, adversary: bool) {
        if self
            .nodes
            .insert(id, NodeInfo { id, location, adversary })
            .is_none()
        {
            self.node_order.push(id);
            self.adjacency.entry(id).or_default();
        }
    }

    /// Add an undirected edge. Self loops and repeated edges are ignored.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<(), AnalysisError> {
        if !self.nodes.contains_key(&a) {
            return Err(AnalysisError::UnknownNode(a));
        }
        if !self.nodes.contains_key(&b) {
            return Err(AnalysisError::UnknownNode(b));
        }
        if a == b {
            log::debug!("Ignoring self loop on node {}", a);
            return Ok(());
        }
        let a_neighbors = self.adjacency.entry(a).or_default();
        if a_neighbors.contains(&b) {
            return Ok(());
        }
        a_neighbors.push(b);
        self.adjacency.entry(b).or_default().push(a);
        self.edge_count += 1;
        Ok(())
    }

    /// Build a topology from a parsed GML snapshot.
    ///
    /// Every node needs a `location`; `adversary` defaults to false and the
    /// graph-level `cycle` defaults to 0.
    pub fn from_gml(graph: &GmlGraph) -> Result<Self> {
        let cycle = match graph.attributes.get("cycle") {
            Some(value) => value
                .as_i64()
                .and_then(|c| u64::try_from(c).ok())
                .ok_or_else(|| eyre!("Invalid graph cycle: {:?}", value))?,
            None => 0,
        };

        let mut topology = Topology::new(cycle);
        for node in &graph.nodes {
            let location = node
                .attr("location")
                .and_then(GmlValue::as_f64)
                .ok_or_else(|| eyre!("Node {} has no numeric 'location'", node.id))?;
            let adversary = node
                .attr("adversary")
                .and_then(GmlValue::as_flag)
                .unwrap_or(false);
            topology.add_node(node.id, location, adversary);
        }
        for edge in &graph.edges {
            topology.add_edge(edge.source, edge.target)?;
        }
        Ok(topology)
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn location(&self, id: NodeId) -> Result<f64, AnalysisError> {
        self.nodes
            .get(&id)
            .map(|n| n.location)
            .ok_or(AnalysisError::UnknownNode(id))
    }

    /// Neighbors in insertion order; empty for unknown nodes
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.neighbors(id).len()
    }

    /// Node ids in the order they were added
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_order
    }

    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn adversary_count(&self) -> usize {
        self.nodes.values().filter(|n| n.adversary).count()
    }

    pub fn average_degree(&self) -> f64 {
        if self.node_order.is_empty() {
            return 0.0;
        }
        2.0 * self.edge_count as f64 / self.node_order.len() as f64
    }

    pub fn max_degree(&self) -> usize {
        self.adjacency.values().map(Vec::len).max().unwrap_or(0)
    }

    /// Hop distances from `start` to every reachable node
    pub fn bfs_distances(&self, start: NodeId) -> HashMap<NodeId, usize> {
        let mut distances = HashMap::new();
        if !self.contains(start) {
            return distances;
        }
        let mut queue = VecDeque::new();
        distances.insert(start, 0);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            let next = distances[&node] + 1;
            for &neighbor in self.neighbors(node) {
                if !distances.contains_key(&neighbor) {
                    distances.insert(neighbor, next);
                    queue.push_back(neighbor);
                }
            }
        }
        distances
    }

    /// Diameter and number of connected components.
    ///
    /// Disconnected snapshots report the largest diameter of any component.
    pub fn diameter_and_components(&self) -> (usize, usize) {
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut components = 0;
        let mut diameter = 0;
        for &id in &self.node_order {
            let distances = self.bfs_distances(id);
            if let Some(&eccentricity) = distances.values().max() {
                diameter = diameter.max(eccentricity);
            }
            if seen.insert(id) {
                components += 1;
                seen.extend(distances.keys().copied());
            }
        }
        (diameter, components)
    }

    pub fn stats(&self) -> GraphStats {
        let degrees: Vec<f64> = self
            .node_order
            .iter()
            .map(|id| self.degree(*id) as f64)
            .collect();
        let degree_avg = self.average_degree();
        // Population std, as for the per-snapshot degree spread
        let degree_std = if degrees.is_empty() {
            0.0
        } else {
            let variance = degrees
                .iter()
                .map(|d| (d - degree_avg).powi(2))
                .sum::<f64>()
                / degrees.len() as f64;
            variance.sqrt()
        };
        let (diameter, connected_components) = self.diameter_and_components();

        GraphStats {
            cycle: self.cycle,
            node_count: self.node_count(),
            edge_count: self.edge_count,
            adversary_count: self.adversary_count(),
            degree_avg,
            degree_std,
            diameter,
            connected_components,
        }
    }
}
