//! Best-path search over the road network

use petgraph::algo::astar;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;

use super::error::RoutingFailure;
use super::road_network::RoadNetwork;
use super::types::NodeId;

/// Ordered node sequence with its total lane length
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub cost: f32,
}

impl Path {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A* from `start` to `end`. Lane length is the edge cost and the
/// straight-line distance to the goal is the heuristic.
pub fn find_path(network: &RoadNetwork, start: NodeId, end: NodeId) -> Result<Path, RoutingFailure> {
    let start_index = network
        .index_of(start)
        .ok_or(RoutingFailure::NodeNotFound(start))?;
    let end_index = network
        .index_of(end)
        .ok_or(RoutingFailure::NodeNotFound(end))?;
    let goal = network
        .node(end)
        .map(|node| node.position)
        .ok_or(RoutingFailure::NodeNotFound(end))?;

    let graph = network.graph();
    let heuristic = |index: NodeIndex| {
        graph
            .node_weight(index)
            .and_then(|id| network.node(*id))
            .map_or(0.0, |node| node.position.distance(&goal))
    };

    let (cost, indices) = astar(
        graph,
        start_index,
        |index| index == end_index,
        |edge| edge.weight().length,
        heuristic,
    )
    .ok_or(RoutingFailure::NoPath { from: start, to: end })?;

    let nodes = indices
        .into_iter()
        .filter_map(|index| graph.node_weight(index).copied())
        .collect();
    Ok(Path { nodes, cost })
}

/// Total lane length along a node sequence, `None` if any lane is missing
pub fn path_cost(network: &RoadNetwork, nodes: &[NodeId]) -> Option<f32> {
    nodes
        .windows(2)
        .map(|pair| network.lane(pair[0], pair[1]).map(|lane| lane.length))
        .sum()
}

/// Route state owned by one vehicle: the node sequence, the lane being
/// driven (from `nodes[current]` to `nodes[current + 1]`) and the
/// distance travelled along it.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: Vec<NodeId>,
    pub current: usize,
    pub progress: f32,
}

impl Route {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            current: 0,
            progress: 0.0,
        }
    }

    /// Lane currently being driven
    pub fn current_edge(&self) -> Option<(NodeId, NodeId)> {
        let from = *self.nodes.get(self.current)?;
        let to = *self.nodes.get(self.current + 1)?;
        Some((from, to))
    }

    /// Node at the end of the current lane
    pub fn next_node(&self) -> Option<NodeId> {
        self.nodes.get(self.current + 1).copied()
    }

    pub fn destination(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Nodes still ahead, starting with the end of the current lane
    pub fn upcoming(&self) -> &[NodeId] {
        self.nodes.get(self.current + 1..).unwrap_or(&[])
    }

    /// Nodes from the start of the current lane to the destination
    pub fn remaining(&self) -> &[NodeId] {
        self.nodes.get(self.current..).unwrap_or(&[])
    }

    pub fn is_finished(&self) -> bool {
        self.current + 1 >= self.nodes.len()
    }
}

/// Route from `start` to `end`
pub fn create_route(network: &RoadNetwork, start: NodeId, end: NodeId) -> Result<Route, RoutingFailure> {
    let path = find_path(network, start, end)?;
    Ok(Route::new(path.nodes))
}

/// Whether every remaining consecutive node pair is still joined by a lane
pub fn validate_route(network: &RoadNetwork, route: &Route) -> bool {
    let remaining = route.remaining();
    if remaining.len() < 2 {
        return remaining.iter().all(|id| network.contains_node(*id));
    }
    remaining
        .windows(2)
        .all(|pair| network.has_lane(pair[0], pair[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_walks_its_nodes() {
        let mut route = Route::new(vec![NodeId(4), NodeId(9), NodeId(2)]);
        assert_eq!(route.current_edge(), Some((NodeId(4), NodeId(9))));
        assert_eq!(route.upcoming(), &[NodeId(9), NodeId(2)]);
        assert!(!route.is_finished());

        route.current = 1;
        assert_eq!(route.current_edge(), Some((NodeId(9), NodeId(2))));
        assert_eq!(route.remaining(), &[NodeId(9), NodeId(2)]);
        assert_eq!(route.destination(), Some(NodeId(2)));
        assert!(!route.is_finished());

        route.current = 2;
        assert_eq!(route.current_edge(), None);
        assert!(route.upcoming().is_empty());
        assert!(route.is_finished());
    }
}
