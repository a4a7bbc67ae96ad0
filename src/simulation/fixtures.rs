//! Deterministic worlds for tests and demos

use anyhow::{Context, Result};

use super::cell::{Cell, Direction};
use super::config::SimulationConfig;
use super::lot::CarMake;
use super::road_network::{NodeKey, NodeKind, RoadNetwork};
use super::tilemap::{Tilemap, TilemapConfig};
use super::types::{CarId, NodeId};
use super::world::World;

/// Centre of the four-way fixtures
pub const FOUR_WAY_CENTER: Cell = Cell::new(3, 3);

/// Crossroads with a light in the large world
pub const LARGE_WORLD_LIGHT: Cell = Cell::new(7, 7);

fn line(from: Cell, to: Cell) -> Vec<Cell> {
    let mut cells = Vec::new();
    for y in from.y.min(to.y)..=from.y.max(to.y) {
        for x in from.x.min(to.x)..=from.x.max(to.x) {
            cells.push(Cell::new(x, y));
        }
    }
    cells
}

fn roads(width: u32, height: u32, cells: &[Cell]) -> Result<Tilemap> {
    Tilemap::from_road_cells(TilemapConfig::city(width, height, 0), cells)
        .context("fixture roads do not fit the grid")
}

/// 5x5 map with a plus-shaped road crossing at (3, 3)
pub fn four_way_tilemap() -> Result<Tilemap> {
    let mut cells = line(Cell::new(1, 3), Cell::new(5, 3));
    cells.extend(line(Cell::new(3, 1), Cell::new(3, 5)));
    roads(5, 5, &cells)
}

pub fn four_way_intersection() -> Result<World> {
    World::new(four_way_tilemap()?, &[], SimulationConfig::default())
}

/// 14x10 map: two avenues crossed by three streets, 52 road cells
pub fn large_world_tilemap() -> Result<Tilemap> {
    let mut cells = Vec::new();
    for y in [2, 7] {
        cells.extend(line(Cell::new(1, y), Cell::new(14, y)));
    }
    for x in [3, 7, 12] {
        cells.extend(line(Cell::new(x, 1), Cell::new(x, 10)));
    }
    roads(14, 10, &cells)
}

pub fn large_world(config: SimulationConfig) -> Result<World> {
    World::new(large_world_tilemap()?, &[LARGE_WORLD_LIGHT], config)
}

/// Two road pieces with no connection between them
pub fn disconnected_world() -> Result<World> {
    let mut cells = line(Cell::new(1, 2), Cell::new(4, 2));
    cells.extend(line(Cell::new(6, 4), Cell::new(10, 4)));
    cells.extend(line(Cell::new(8, 3), Cell::new(8, 5)));
    World::new(roads(10, 5, &cells)?, &[], SimulationConfig::default())
}

/// Node id for a key, failing loudly when the fixture has no such node
pub fn node_at(network: &RoadNetwork, cell: Cell, side: Direction, kind: NodeKind) -> Result<NodeId> {
    network
        .node_for_key(&NodeKey { cell, side, kind })
        .map(|node| node.id)
        .with_context(|| format!("no {:?} node on the {:?} side of {}", kind, side, cell))
}

/// Four-way junction without a light. One car drives east on the
/// priority road, another south on the yielding one; both are the same
/// distance from the junction. Returns the world and the eastbound and
/// southbound car ids.
pub fn crossing_paths_world() -> Result<(World, CarId, CarId)> {
    let mut world = four_way_intersection()?;
    let network = world.network();
    let east_from = node_at(network, Cell::new(2, 3), Direction::Left, NodeKind::LaneEntry)?;
    let east_to = node_at(network, Cell::new(4, 3), Direction::Right, NodeKind::LaneExit)?;
    let south_from = node_at(network, Cell::new(3, 2), Direction::Up, NodeKind::LaneEntry)?;
    let south_to = node_at(network, Cell::new(3, 4), Direction::Down, NodeKind::LaneExit)?;

    let eastbound = world.spawn_car(east_from, east_to, CarMake::sedan())?;
    let southbound = world.spawn_car(south_from, south_to, CarMake::sedan())?;
    Ok((world, eastbound, southbound))
}

/// Four-way junction with a light and one car heading south into it.
/// Vertical approaches start on red.
pub fn red_light_world(config: SimulationConfig) -> Result<(World, CarId)> {
    let mut world = World::new(four_way_tilemap()?, &[FOUR_WAY_CENTER], config)?;
    let network = world.network();
    let from = node_at(network, Cell::new(3, 2), Direction::Up, NodeKind::LaneEntry)?;
    let to = node_at(network, Cell::new(3, 4), Direction::Down, NodeKind::LaneExit)?;
    let car = world.spawn_car(from, to, CarMake::sedan())?;
    Ok((world, car))
}
