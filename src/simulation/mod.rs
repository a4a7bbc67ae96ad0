//! Tile-based city traffic simulation
//!
//! Everything here runs headless: a constraint propagation generator fills
//! the tilemap, the road network is derived from it, and cars are driven
//! over that network by the steering and rule engines each tick.

mod car;
mod cell;
mod config;
mod error;
pub mod fixtures;
mod fsm;
mod geometry;
mod lot;
mod pathfinding;
mod road_network;
mod rules;
mod spatial;
mod tile_config;
mod tilemap;
mod traffic_light;
mod types;
mod wfc;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use car::{update_car, Car, CarEvent, CarStatus};
#[allow(unused_imports)]
pub use cell::{Cell, Direction, GridSize};
#[allow(unused_imports)]
pub use config::{
    GenerationConfig, SimulationConfig, TrafficConfig, TrafficLightTimers, LANE_OFFSET, NODE_INSET,
    TILE_SIZE,
};
#[allow(unused_imports)]
pub use error::{GenerationFailure, RoutingFailure};
#[allow(unused_imports)]
pub use fsm::{Fsm, FsmBuilder, FsmError};
#[allow(unused_imports)]
pub use geometry::{oriented_rectangle, point_segment_distance, polygons_overlap, segment_distance};
#[allow(unused_imports)]
pub use lot::{CarMake, CarRole, Lot, LotDefinition, ParkingSpot};
#[allow(unused_imports)]
pub use pathfinding::{create_route, find_path, path_cost, validate_route, Path, Route};
#[allow(unused_imports)]
pub use road_network::{
    EdgeStrategy, Lane, LanePriority, LaneShape, NetworkSignature, NodeKey, NodeKind, RoadNetwork,
    RoadNode,
};
#[allow(unused_imports)]
pub use rules::{check_rules, decide_all, CarView, Decision, RuleSetup, TrafficSnapshot, YieldTo};
#[allow(unused_imports)]
pub use spatial::BucketGrid;
#[allow(unused_imports)]
pub use tile_config::{ids, LargeTile, SingleTile, Socket, Sockets, TileCatalog, TileConfig, TileKind};
#[allow(unused_imports)]
pub use tilemap::{Anchor, RoadRemoval, Tile, Tilemap, TilemapConfig};
#[allow(unused_imports)]
pub use traffic_light::{LightPhase, Signal, TrafficLight, TrafficLightAction};
#[allow(unused_imports)]
pub use types::{CarId, LotId, NodeId, Position, TileId};
#[allow(unused_imports)]
pub use wfc::{GenerationState, Model, PropagationStep, SupervisorState};
pub use world::{SimulationStats, World};
