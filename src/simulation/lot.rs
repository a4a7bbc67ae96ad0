//! Lot and vehicle catalog data
//!
//! Plain data consumed when lots are attached to the road grid and when
//! cars are spawned. Nothing here knows how things are drawn.

use super::cell::{Cell, Direction};
use super::tile_config::ids;
use super::types::{LotId, Position, TileId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarRole {
    Resident,
    Delivery,
    Service,
}

/// Static description of a vehicle model
#[derive(Debug, Clone, PartialEq)]
pub struct CarMake {
    pub name: &'static str,
    pub length: f32,
    pub width: f32,
    pub color: &'static str,
    pub role: CarRole,
    pub max_velocity: f32,
    pub acceleration: f32,
    pub deceleration: f32,
}

impl CarMake {
    pub fn sedan() -> Self {
        Self {
            name: "sedan",
            length: 4.4,
            width: 1.8,
            color: "blue",
            role: CarRole::Resident,
            max_velocity: 11.0,
            acceleration: 3.0,
            deceleration: 6.0,
        }
    }

    pub fn hatchback() -> Self {
        Self {
            name: "hatchback",
            length: 3.8,
            width: 1.7,
            color: "red",
            role: CarRole::Resident,
            max_velocity: 10.0,
            acceleration: 3.5,
            deceleration: 6.0,
        }
    }

    pub fn van() -> Self {
        Self {
            name: "van",
            length: 5.0,
            width: 2.0,
            color: "white",
            role: CarRole::Delivery,
            max_velocity: 9.0,
            acceleration: 2.0,
            deceleration: 5.0,
        }
    }

    pub fn catalog() -> Vec<CarMake> {
        vec![Self::sedan(), Self::hatchback(), Self::van()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParkingSpot {
    /// Offset from the lot's top-left corner in world units
    pub offset: Position,
    /// Only cars of this role may park here
    pub restriction: Option<CarRole>,
}

/// A kind of lot that can be attached to a road
#[derive(Debug, Clone, PartialEq)]
pub struct LotDefinition {
    pub name: &'static str,
    /// Large tile placed on the map
    pub tile: TileId,
    /// Side of the lot facing the road
    pub driveway: Direction,
    pub parking_spots: Vec<ParkingSpot>,
}

impl LotDefinition {
    /// 2x2 residential lot
    pub fn residential(driveway: Direction) -> Self {
        Self {
            name: "residential",
            tile: ids::residential_lot(driveway),
            driveway,
            parking_spots: vec![
                ParkingSpot {
                    offset: Position::new(8.0, 8.0),
                    restriction: Some(CarRole::Resident),
                },
                ParkingSpot {
                    offset: Position::new(24.0, 8.0),
                    restriction: Some(CarRole::Resident),
                },
            ],
        }
    }

    /// 3x2 commercial lot with a loading bay
    pub fn commercial(driveway: Direction) -> Self {
        Self {
            name: "commercial",
            tile: ids::commercial_lot(driveway),
            driveway,
            parking_spots: vec![
                ParkingSpot {
                    offset: Position::new(8.0, 8.0),
                    restriction: None,
                },
                ParkingSpot {
                    offset: Position::new(24.0, 8.0),
                    restriction: None,
                },
                ParkingSpot {
                    offset: Position::new(40.0, 8.0),
                    restriction: Some(CarRole::Delivery),
                },
            ],
        }
    }
}

/// A lot attached to the map
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub id: LotId,
    pub definition: LotDefinition,
    /// Road cell the driveway connects to
    pub entry_cell: Cell,
    occupied: Vec<bool>,
}

impl Lot {
    pub fn new(id: LotId, definition: LotDefinition, entry_cell: Cell) -> Self {
        let occupied = vec![false; definition.parking_spots.len()];
        Self {
            id,
            definition,
            entry_cell,
            occupied,
        }
    }

    /// Take the first free spot open to `role`
    pub fn park(&mut self, role: CarRole) -> Option<usize> {
        let spot = self
            .definition
            .parking_spots
            .iter()
            .zip(&self.occupied)
            .position(|(spot, taken)| !taken && spot.restriction.map_or(true, |r| r == role))?;
        self.occupied[spot] = true;
        Some(spot)
    }

    pub fn parked(&self) -> usize {
        self.occupied.iter().filter(|taken| **taken).count()
    }

    pub fn capacity(&self) -> usize {
        self.occupied.len()
    }
}
