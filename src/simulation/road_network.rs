//! Road network graph derived from the tilemap
//!
//! Every road tile side carries an entry node (heading into the tile) and
//! an exit node (heading out). Inner lanes join entries to exits of the
//! same tile; connector lanes join an exit to the facing entry of the
//! neighboring tile. Node ids are stable per (cell, side, kind) key, so
//! incremental rebuilds keep routes through untouched cells valid.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use ordered_float::OrderedFloat;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as EdgeDirection;

use super::cell::{Cell, Direction, GridSize};
use super::config::{LANE_OFFSET, NODE_INSET, TILE_SIZE};
use super::geometry::{line_intersection, quadratic_bezier};
use super::spatial::BucketGrid;
use super::tile_config::SingleTile;
use super::tilemap::Tilemap;
use super::types::{NodeId, Position};

const CURVE_SAMPLES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    LaneEntry,
    LaneExit,
    DeadendEntry,
    DeadendExit,
    LotEntry,
    LotExit,
}

impl NodeKind {
    /// Nodes a connector lane may arrive at
    pub fn is_entry(self) -> bool {
        matches!(self, NodeKind::LaneEntry | NodeKind::DeadendEntry)
    }

    /// Nodes a connector lane may leave from
    pub fn is_exit(self) -> bool {
        matches!(self, NodeKind::LaneExit | NodeKind::DeadendExit)
    }
}

/// Identity of a node independent of build order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey {
    pub cell: Cell,
    pub side: Direction,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub id: NodeId,
    pub key: NodeKey,
    pub position: Position,
    /// Heading of traffic passing through the node
    pub direction: Direction,
}

impl RoadNode {
    pub fn kind(&self) -> NodeKind {
        self.key.kind
    }

    pub fn cell(&self) -> Cell {
        self.key.cell
    }
}

/// Right-of-way class of a lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LanePriority {
    Yield,
    Normal,
    Priority,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LaneShape {
    Straight,
    Curve { control: Position },
}

/// A directed lane between two nodes
#[derive(Debug, Clone, PartialEq)]
pub struct Lane {
    pub from: NodeId,
    pub to: NodeId,
    pub priority: LanePriority,
    pub shape: LaneShape,
    pub length: f32,
    /// Polyline approximation used for arc-length lookups
    points: Vec<Position>,
    distances: Vec<f32>,
}

impl Lane {
    fn new(from: &RoadNode, to: &RoadNode, priority: LanePriority, shape: LaneShape) -> Self {
        let points = match shape {
            LaneShape::Straight => vec![from.position, to.position],
            LaneShape::Curve { control } => (0..=CURVE_SAMPLES)
                .map(|i| {
                    let t = i as f32 / CURVE_SAMPLES as f32;
                    quadratic_bezier(&from.position, &control, &to.position, t)
                })
                .collect(),
        };
        let mut distances = Vec::with_capacity(points.len());
        let mut total = 0.0;
        distances.push(0.0);
        for pair in points.windows(2) {
            total += pair[0].distance(&pair[1]);
            distances.push(total);
        }
        Self {
            from: from.id,
            to: to.id,
            priority,
            shape,
            length: total,
            points,
            distances,
        }
    }

    /// Shape between two nodes: straight when the headings agree, a
    /// quadratic curve through the heading intersection otherwise
    fn between(from: &RoadNode, to: &RoadNode, priority: LanePriority) -> Self {
        let heading_in = from.direction.vector();
        let heading_out = to.direction.vector();
        let shape = if from.direction == to.direction {
            LaneShape::Straight
        } else {
            match line_intersection(&from.position, &heading_in, &to.position, &heading_out) {
                Some(control) => LaneShape::Curve { control },
                None => {
                    // U-turn: bulge half a tile forward
                    let midpoint = from.position.lerp(&to.position, 0.5);
                    let control = midpoint.add(&heading_in.scale(TILE_SIZE / 2.0 - NODE_INSET));
                    LaneShape::Curve { control }
                }
            }
        };
        Self::new(from, to, priority, shape)
    }

    /// Point at `distance` along the lane, clamped to its ends
    pub fn point_at(&self, distance: f32) -> Position {
        let distance = distance.clamp(0.0, self.length);
        let segment = self.segment_for(distance);
        let (start, end) = (self.distances[segment], self.distances[segment + 1]);
        let span = end - start;
        let t = if span > 0.0 { (distance - start) / span } else { 0.0 };
        self.points[segment].lerp(&self.points[segment + 1], t)
    }

    /// Heading angle at `distance` along the lane
    pub fn heading_at(&self, distance: f32) -> f32 {
        let distance = distance.clamp(0.0, self.length);
        let segment = self.segment_for(distance);
        self.points[segment].angle_to(&self.points[segment + 1])
    }

    pub fn start(&self) -> Position {
        self.points[0]
    }

    pub fn end(&self) -> Position {
        self.points[self.points.len() - 1]
    }

    fn segment_for(&self, distance: f32) -> usize {
        let last = self.points.len().saturating_sub(2);
        self.distances
            .iter()
            .skip(1)
            .position(|d| *d >= distance)
            .unwrap_or(last)
            .min(last)
    }
}

/// How connector candidates are found while building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeStrategy {
    /// Compare every exit against every entry
    Naive,
    /// Look up entries in nearby buckets only
    #[default]
    SpatialIndex,
}

/// Keyed edge set, independent of node id assignment
pub type NetworkSignature = BTreeSet<(NodeKey, NodeKey, LanePriority)>;

pub struct RoadNetwork {
    graph: StableDiGraph<NodeId, Lane>,
    nodes: BTreeMap<NodeId, RoadNode>,
    index_of: HashMap<NodeId, NodeIndex>,
    /// Every key ever seen keeps its id
    ids: BTreeMap<NodeKey, NodeId>,
    cell_nodes: BTreeMap<Cell, Vec<NodeId>>,
    entry_index: BucketGrid<NodeId>,
    requested_lights: BTreeSet<Cell>,
    light_cells: BTreeSet<Cell>,
    strategy: EdgeStrategy,
    grid: GridSize,
    next_id: u32,
}

impl RoadNetwork {
    pub fn new(grid: GridSize, strategy: EdgeStrategy) -> Self {
        let (width, height) = grid.world_size();
        Self {
            graph: StableDiGraph::new(),
            nodes: BTreeMap::new(),
            index_of: HashMap::new(),
            ids: BTreeMap::new(),
            cell_nodes: BTreeMap::new(),
            entry_index: BucketGrid::new(width, height, TILE_SIZE),
            requested_lights: BTreeSet::new(),
            light_cells: BTreeSet::new(),
            strategy,
            grid,
            next_id: 0,
        }
    }

    /// Build the full network for a tilemap. Traffic lights attach to the
    /// listed cells that turn out to be intersections.
    pub fn build(tilemap: &Tilemap, traffic_lights: &[Cell], strategy: EdgeStrategy) -> Self {
        let mut network = Self::new(*tilemap.grid(), strategy);
        let cells = tilemap.road_cells();
        network.rebuild_cells(tilemap, &cells);
        network.requested_lights = traffic_lights.iter().copied().collect();
        network.resync_traffic_lights();
        debug!(
            "built road network: {} nodes, {} lanes, {} lights",
            network.node_count(),
            network.lane_count(),
            network.light_cells.len()
        );
        network
    }

    /// Rebuild only the nodes and lanes touching `changed` cells
    pub fn update_cells(&mut self, tilemap: &Tilemap, changed: &[Cell]) {
        let changed: BTreeSet<Cell> = changed.iter().copied().collect();
        for cell in &changed {
            self.remove_cell(cell);
        }
        let cells: Vec<Cell> = changed.into_iter().filter(|c| tilemap.is_road(c)).collect();
        self.rebuild_cells(tilemap, &cells);
        self.resync_traffic_lights();
        debug!(
            "updated road network around {} cells: {} nodes, {} lanes",
            cells.len(),
            self.node_count(),
            self.lane_count()
        );
    }

    /// Nodes and inner lanes for `cells`, then connectors touching them
    fn rebuild_cells(&mut self, tilemap: &Tilemap, cells: &[Cell]) {
        let mut ordered: Vec<(OrderedFloat<f32>, usize, Cell, &SingleTile)> = cells
            .iter()
            .filter_map(|cell| {
                let tile = tilemap.single_at(cell)?;
                let index = self.grid.index(cell)?;
                Some((OrderedFloat(tile.graph_priority), index, *cell, tile))
            })
            .collect();
        ordered.sort_by_key(|(priority, index, _, _)| (*priority, *index));

        for (_, _, cell, tile) in &ordered {
            self.add_cell_nodes(cell, tile);
        }
        for (_, _, cell, tile) in &ordered {
            self.add_inner_lanes(cell, tile);
        }

        let mut touched: BTreeSet<Cell> = BTreeSet::new();
        for (_, _, cell, _) in &ordered {
            touched.insert(*cell);
            for (_, neighbor) in self.grid.neighbors(cell) {
                touched.insert(neighbor);
            }
        }
        let exits: Vec<NodeId> = touched
            .iter()
            .filter_map(|cell| self.cell_nodes.get(cell))
            .flatten()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.kind().is_exit()))
            .collect();
        for exit in exits {
            self.connect_exit(exit);
        }
    }

    fn add_cell_nodes(&mut self, cell: &Cell, tile: &SingleTile) {
        let sides = tile.road_sides();
        let dead_end = sides.len() == 1;
        for side in &sides {
            let (entry, exit) = if dead_end {
                (NodeKind::DeadendEntry, NodeKind::DeadendExit)
            } else {
                (NodeKind::LaneEntry, NodeKind::LaneExit)
            };
            self.add_node(NodeKey { cell: *cell, side: *side, kind: entry }, side.opposite());
            self.add_node(NodeKey { cell: *cell, side: *side, kind: exit }, *side);
        }
        if let Some(side) = tile.lot_side() {
            self.add_node(NodeKey { cell: *cell, side, kind: NodeKind::LotEntry }, side);
            self.add_node(NodeKey { cell: *cell, side, kind: NodeKind::LotExit }, side.opposite());
        }
    }

    fn add_node(&mut self, key: NodeKey, direction: Direction) -> NodeId {
        let id = match self.ids.get(&key) {
            Some(id) => *id,
            None => {
                let id = NodeId(self.next_id);
                self.next_id += 1;
                self.ids.insert(key, id);
                id
            }
        };
        if self.nodes.contains_key(&id) {
            return id;
        }

        let position = node_position(&key.cell, key.side, direction);
        let index = self.graph.add_node(id);
        self.index_of.insert(id, index);
        self.nodes.insert(
            id,
            RoadNode {
                id,
                key,
                position,
                direction,
            },
        );
        self.cell_nodes.entry(key.cell).or_default().push(id);
        if key.kind.is_entry() {
            self.entry_index.insert(id, position);
        }
        id
    }

    fn add_inner_lanes(&mut self, cell: &Cell, tile: &SingleTile) {
        let sides = tile.road_sides();
        let mask = tile.road_mask();
        let node = |kind: NodeKind, side: Direction| NodeKey { cell: *cell, side, kind };

        if sides.len() == 1 {
            let side = sides[0];
            self.add_lane(
                node(NodeKind::DeadendEntry, side),
                node(NodeKind::DeadendExit, side),
                LanePriority::Normal,
            );
        }
        for from in &sides {
            for to in &sides {
                if from == to {
                    continue;
                }
                self.add_lane(
                    node(NodeKind::LaneEntry, *from),
                    node(NodeKind::LaneExit, *to),
                    inner_priority(mask, *from),
                );
            }
        }

        let Some(lot_side) = tile.lot_side() else { return };
        let (entry_kind, exit_kind) = if sides.len() == 1 {
            (NodeKind::DeadendEntry, NodeKind::DeadendExit)
        } else {
            (NodeKind::LaneEntry, NodeKind::LaneExit)
        };
        let lot_entry = node(NodeKind::LotEntry, lot_side);
        let lot_exit = node(NodeKind::LotExit, lot_side);
        for side in &sides {
            self.add_lane(node(entry_kind, *side), lot_entry, LanePriority::Normal);
            self.add_lane(lot_exit, node(exit_kind, *side), LanePriority::Yield);
        }

        // Turn around inside the lot
        if let (Some(from), Some(to)) = (self.node_for_key(&lot_entry), self.node_for_key(&lot_exit)) {
            let midpoint = from.position.lerp(&to.position, 0.5);
            let control = midpoint.add(&lot_side.vector().scale(TILE_SIZE));
            let lane = Lane::new(from, to, LanePriority::Normal, LaneShape::Curve { control });
            self.insert_lane(lane);
        }
    }

    fn add_lane(&mut self, from: NodeKey, to: NodeKey, priority: LanePriority) {
        let (Some(from), Some(to)) = (self.node_for_key(&from), self.node_for_key(&to)) else {
            return;
        };
        let lane = Lane::between(from, to, priority);
        self.insert_lane(lane);
    }

    fn insert_lane(&mut self, lane: Lane) {
        let (Some(&a), Some(&b)) = (self.index_of.get(&lane.from), self.index_of.get(&lane.to)) else {
            return;
        };
        self.graph.update_edge(a, b, lane);
    }

    /// Add connectors from an exit to every entry it lines up with
    fn connect_exit(&mut self, exit: NodeId) {
        let Some(exit_node) = self.nodes.get(&exit) else { return };
        let mut candidates: Vec<NodeId> = match self.strategy {
            EdgeStrategy::Naive => self
                .nodes
                .values()
                .filter(|n| n.kind().is_entry())
                .map(|n| n.id)
                .collect(),
            EdgeStrategy::SpatialIndex => self
                .entry_index
                .query_radius(exit_node.position, 2.0 * NODE_INSET + 0.01)
                .into_iter()
                .map(|(id, _)| id)
                .collect(),
        };
        candidates.sort();

        let lanes: Vec<Lane> = candidates
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|entry| self.connects(exit_node, entry))
            .map(|entry| Lane::new(exit_node, entry, LanePriority::Normal, LaneShape::Straight))
            .collect();
        for lane in lanes {
            self.insert_lane(lane);
        }
    }

    /// Whether a connector joins `exit` to `entry`
    fn connects(&self, exit: &RoadNode, entry: &RoadNode) -> bool {
        exit.kind().is_exit()
            && entry.kind().is_entry()
            && entry.key.side == exit.key.side.opposite()
            && self.grid.neighbor(&exit.key.cell, exit.key.side) == Some(entry.key.cell)
            && exit.position.distance(&entry.position) <= 2.0 * NODE_INSET + 0.01
    }

    fn remove_cell(&mut self, cell: &Cell) {
        let Some(ids) = self.cell_nodes.remove(cell) else { return };
        for id in ids {
            if let Some(node) = self.nodes.remove(&id) {
                if node.kind().is_entry() {
                    self.entry_index.remove(id, node.position);
                }
            }
            if let Some(index) = self.index_of.remove(&id) {
                self.graph.remove_node(index);
            }
        }
    }

    /// Lights are active on requested cells that are currently intersections
    fn resync_traffic_lights(&mut self) {
        self.light_cells = self
            .requested_lights
            .iter()
            .copied()
            .filter(|cell| self.approaches(cell).len() >= 3)
            .collect();
    }

    /// Request a light on `cell`; returns whether it is active
    pub fn add_traffic_light(&mut self, cell: Cell) -> bool {
        self.requested_lights.insert(cell);
        self.resync_traffic_lights();
        self.light_cells.contains(&cell)
    }

    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.nodes.get(&id)
    }

    pub fn node_for_key(&self, key: &NodeKey) -> Option<&RoadNode> {
        self.ids.get(key).and_then(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> {
        self.nodes.values()
    }

    pub fn nodes_in_cell(&self, cell: &Cell) -> Vec<&RoadNode> {
        self.cell_nodes
            .get(cell)
            .map(|ids| ids.iter().filter_map(|id| self.nodes.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn lane_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn lane(&self, from: NodeId, to: NodeId) -> Option<&Lane> {
        let a = self.index_of.get(&from)?;
        let b = self.index_of.get(&to)?;
        self.graph.find_edge(*a, *b).and_then(|e| self.graph.edge_weight(e))
    }

    pub fn has_lane(&self, from: NodeId, to: NodeId) -> bool {
        self.lane(from, to).is_some()
    }

    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.graph.edge_weights()
    }

    pub fn outgoing(&self, id: NodeId) -> Vec<&Lane> {
        self.index_of
            .get(&id)
            .map(|index| {
                self.graph
                    .edges_directed(*index, EdgeDirection::Outgoing)
                    .map(|edge| edge.weight())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn incoming(&self, id: NodeId) -> Vec<&Lane> {
        self.index_of
            .get(&id)
            .map(|index| {
                self.graph
                    .edges_directed(*index, EdgeDirection::Incoming)
                    .map(|edge| edge.weight())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entry nodes of a cell, i.e. the approaches a light controls
    pub fn approaches(&self, cell: &Cell) -> Vec<&RoadNode> {
        self.nodes_in_cell(cell)
            .into_iter()
            .filter(|node| node.kind() == NodeKind::LaneEntry)
            .collect()
    }

    pub fn traffic_light_cells(&self) -> &BTreeSet<Cell> {
        &self.light_cells
    }

    pub fn strategy(&self) -> EdgeStrategy {
        self.strategy
    }

    pub fn grid(&self) -> &GridSize {
        &self.grid
    }

    pub(crate) fn graph(&self) -> &StableDiGraph<NodeId, Lane> {
        &self.graph
    }

    pub(crate) fn index_of(&self, id: NodeId) -> Option<NodeIndex> {
        self.index_of.get(&id).copied()
    }

    pub fn signature(&self) -> NetworkSignature {
        self.lanes()
            .filter_map(|lane| {
                let from = self.nodes.get(&lane.from)?;
                let to = self.nodes.get(&lane.to)?;
                Some((from.key, to.key, lane.priority))
            })
            .collect()
    }
}

/// Node position on `side` of `cell` for traffic heading `direction`
fn node_position(cell: &Cell, side: Direction, direction: Direction) -> Position {
    cell.center()
        .add(&side.vector().scale(TILE_SIZE / 2.0 - NODE_INSET))
        .add(&direction.right_hand().scale(LANE_OFFSET))
}

/// Right of way for a lane entering a tile from `from`
fn inner_priority(mask: u8, from: Direction) -> LanePriority {
    let sides = mask.count_ones();
    if sides < 3 {
        return LanePriority::Normal;
    }
    if sides == 4 {
        return if from.is_horizontal() {
            LanePriority::Priority
        } else {
            LanePriority::Yield
        };
    }
    // T-junction: the stem is the side opposite the missing one
    let stem = Direction::ALL
        .into_iter()
        .find(|dir| mask & dir.bit() == 0)
        .map(Direction::opposite);
    if Some(from) == stem {
        LanePriority::Yield
    } else {
        LanePriority::Priority
    }
}
