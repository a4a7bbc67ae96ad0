//! Failure taxonomies for generation and routing

use thiserror::Error;

use super::cell::{Cell, Direction};
use super::types::{NodeId, TileId};

/// Reasons a generation step (or a tilemap edit) can fail.
///
/// `NoPotentialMatch` is expected during propagation and only ends the
/// current propagation edge; every other variant stops the generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("no tile options left for cell {cell}")]
    NoSuperpositionOptions { cell: Cell },
    #[error("no potential match at cell {cell} (tile {tile:?})")]
    NoPotentialMatch { cell: Cell, tile: Option<TileId> },
    #[error("large tile {tile} cannot be placed with its anchor at cell {cell}")]
    InvalidBigTilePlacement { cell: Cell, tile: TileId },
    #[error("invalid direction {direction:?} from cell {cell}")]
    InvalidDirection { cell: Cell, direction: Option<Direction> },
    #[error("{0} not found in the tile catalog")]
    TileNotFound(TileId),
}

impl GenerationFailure {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GenerationFailure::NoPotentialMatch { .. })
    }
}

/// Reasons a route cannot be produced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingFailure {
    #[error("no path from {from} to {to}")]
    NoPath { from: NodeId, to: NodeId },
    #[error("{0} is not part of the road network")]
    NodeNotFound(NodeId),
}
