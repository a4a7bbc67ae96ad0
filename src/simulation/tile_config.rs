//! Tile definitions and the immutable tile catalog
//!
//! Tiles expose one socket per edge. Two tiles may sit next to each other
//! only when the facing sockets pair up (checked from the side that is
//! already fixed). Large tiles are rectangles of single tiles placed as a
//! unit around an anchor tile.

use std::collections::BTreeMap;

use super::cell::{Cell, Direction, GridSize};
use super::types::TileId;

/// Compatibility class of one tile edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Socket {
    /// Road lanes cross this edge
    Red,
    /// Grass
    Green,
    /// Trees and other nature
    Blue,
    /// Road shoulder
    Yellow,
    /// Road side with a lot driveway attached
    Pink,
    /// Lot driveway
    Orange,
    /// Outer wall of a lot or park
    White,
    /// Seam between horizontally adjacent parts of a large tile
    LightBrown,
    /// Road shoulder variant
    Gray,
    /// Seam between vertically adjacent parts of a large tile
    DarkBrown,
}

impl Socket {
    /// Sockets that may face this one
    pub fn pairings(self) -> &'static [Socket] {
        match self {
            Socket::Red => &[Socket::Red],
            Socket::Green => &[Socket::Green, Socket::Blue, Socket::White, Socket::Yellow],
            Socket::Blue => &[Socket::Green, Socket::Blue],
            Socket::Yellow => &[Socket::Green, Socket::Yellow, Socket::Gray],
            Socket::Gray => &[Socket::Yellow, Socket::Gray],
            Socket::Pink => &[Socket::Orange],
            Socket::Orange => &[Socket::Pink],
            Socket::White => &[Socket::Green, Socket::White],
            Socket::LightBrown => &[Socket::LightBrown],
            Socket::DarkBrown => &[Socket::DarkBrown],
        }
    }

    pub fn pairs_with(self, other: Socket) -> bool {
        self.pairings().contains(&other)
    }

    /// Sockets that carry traffic across the edge
    pub fn is_connective(self) -> bool {
        matches!(self, Socket::Red | Socket::Pink | Socket::Orange)
    }
}

/// Sockets of a tile in top/right/bottom/left order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sockets {
    pub top: Socket,
    pub right: Socket,
    pub bottom: Socket,
    pub left: Socket,
}

impl Sockets {
    pub fn uniform(socket: Socket) -> Self {
        Self {
            top: socket,
            right: socket,
            bottom: socket,
            left: socket,
        }
    }

    pub fn get(&self, direction: Direction) -> Socket {
        match direction {
            Direction::Up => self.top,
            Direction::Right => self.right,
            Direction::Down => self.bottom,
            Direction::Left => self.left,
        }
    }

    pub fn set(&mut self, direction: Direction, socket: Socket) {
        match direction {
            Direction::Up => self.top = socket,
            Direction::Right => self.right = socket,
            Direction::Down => self.bottom = socket,
            Direction::Left => self.left = socket,
        }
    }

    /// Red on every side whose bit is set in `mask`, `rest` elsewhere
    fn road(mask: u8, rest: Socket) -> Self {
        let mut sockets = Sockets::uniform(rest);
        for dir in Direction::from_mask(mask) {
            sockets.set(dir, Socket::Red);
        }
        sockets
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    Terrain,
    Road,
    LotEntry,
    LotPart,
}

/// A tile occupying exactly one cell
#[derive(Debug, Clone, PartialEq)]
pub struct SingleTile {
    pub id: TileId,
    pub sockets: Sockets,
    pub complexity: f32,
    /// Lower values get their road network nodes first
    pub graph_priority: f32,
    /// Tile this one is a variant of
    pub base_tile: Option<TileId>,
    pub kind: TileKind,
}

impl SingleTile {
    pub fn socket(&self, direction: Direction) -> Socket {
        self.sockets.get(direction)
    }

    pub fn is_road(&self) -> bool {
        matches!(self.kind, TileKind::Road | TileKind::LotEntry)
    }

    /// Sides with lanes crossing them
    pub fn road_sides(&self) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|dir| self.socket(*dir) == Socket::Red)
            .collect()
    }

    pub fn road_mask(&self) -> u8 {
        self.road_sides().iter().fold(0, |mask, dir| mask | dir.bit())
    }

    /// Side leading to an attached lot, if any
    pub fn lot_side(&self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|dir| self.socket(*dir) == Socket::Pink)
    }
}

/// A rectangle of single tiles placed atomically
#[derive(Debug, Clone, PartialEq)]
pub struct LargeTile {
    pub id: TileId,
    /// Constituent tiles, row-major
    pub tiles: Vec<SingleTile>,
    pub width: u32,
    pub height: u32,
    pub anchor_index: usize,
    pub complexity: f32,
}

impl LargeTile {
    pub fn anchor(&self) -> Option<&SingleTile> {
        self.tiles.get(self.anchor_index)
    }

    /// Column and row of the anchor inside the rectangle
    pub fn anchor_offset(&self) -> (u32, u32) {
        let index = self.anchor_index as u32;
        (index % self.width, index / self.width)
    }

    /// Cells covered when the anchor sits on `anchor_cell`, paired with
    /// their constituent tile. `None` when any part would leave the grid.
    pub fn footprint(&self, anchor_cell: &Cell, grid: &GridSize) -> Option<Vec<(Cell, &SingleTile)>> {
        let (ax, ay) = self.anchor_offset();
        let left = anchor_cell.x.checked_sub(ax)?;
        let top = anchor_cell.y.checked_sub(ay)?;
        let mut cells = Vec::with_capacity(self.tiles.len());
        for (index, tile) in self.tiles.iter().enumerate() {
            let index = index as u32;
            let cell = Cell::new(left + index % self.width, top + index / self.width);
            if !grid.contains(&cell) {
                return None;
            }
            cells.push((cell, tile));
        }
        Some(cells)
    }
}

/// Either kind of catalog entry
#[derive(Debug, Clone, PartialEq)]
pub enum TileConfig {
    Single(SingleTile),
    Large(LargeTile),
}

impl TileConfig {
    pub fn id(&self) -> TileId {
        match self {
            TileConfig::Single(tile) => tile.id,
            TileConfig::Large(tile) => tile.id,
        }
    }

    pub fn complexity(&self) -> f32 {
        match self {
            TileConfig::Single(tile) => tile.complexity,
            TileConfig::Large(tile) => tile.complexity,
        }
    }

    /// Socket on one side; large tiles answer for their anchor
    pub fn socket(&self, direction: Direction) -> Option<Socket> {
        match self {
            TileConfig::Single(tile) => Some(tile.socket(direction)),
            TileConfig::Large(tile) => tile.anchor().map(|anchor| anchor.socket(direction)),
        }
    }
}

/// Well-known ids of the default city catalog
pub mod ids {
    use super::super::cell::Direction;
    use super::super::types::TileId;

    pub const GRASS: TileId = TileId(0);
    pub const NATURE: TileId = TileId(16);
    pub const ISOLATED_ROAD: TileId = TileId(17);
    pub const PARK: TileId = TileId(200);
    pub const PLAZA: TileId = TileId(201);

    /// Road tile connecting the sides set in `mask`; mask 0 is grass
    pub fn road(mask: u8) -> TileId {
        TileId(u16::from(mask & 0b1111))
    }

    /// Road tile with a lot attached on `side`
    pub fn lot_entry(side: Direction, mask: u8) -> TileId {
        TileId(100 + side.index() as u16 * 16 + u16::from(mask & !side.bit() & 0b1111))
    }

    /// 2x2 residential lot whose driveway leaves through `side`
    pub fn residential_lot(side: Direction) -> TileId {
        TileId(210 + side.index() as u16)
    }

    /// 3x2 commercial lot whose driveway leaves through `side`
    pub fn commercial_lot(side: Direction) -> TileId {
        TileId(220 + side.index() as u16)
    }

    pub(super) fn constituent(large: TileId, index: usize) -> TileId {
        TileId(large.0 * 10 + index as u16)
    }
}

/// Immutable registry of tile definitions
#[derive(Debug, Clone, PartialEq)]
pub struct TileCatalog {
    tiles: BTreeMap<TileId, TileConfig>,
    /// Constituent id -> (large tile id, index inside it)
    constituents: BTreeMap<TileId, (TileId, usize)>,
    generation_pool: Vec<TileId>,
    default_tile: TileId,
}

impl TileCatalog {
    pub fn new(default_tile: TileId) -> Self {
        Self {
            tiles: BTreeMap::new(),
            constituents: BTreeMap::new(),
            generation_pool: Vec::new(),
            default_tile,
        }
    }

    /// Register a tile. Generated tiles may be drawn by the generator;
    /// the rest are only placed by edits.
    pub fn insert(&mut self, tile: TileConfig, generated: bool) {
        let id = tile.id();
        if let TileConfig::Large(large) = &tile {
            for (index, part) in large.tiles.iter().enumerate() {
                self.constituents.insert(part.id, (id, index));
            }
        }
        if generated && !self.generation_pool.contains(&id) {
            self.generation_pool.push(id);
        }
        self.tiles.insert(id, tile);
    }

    pub fn get(&self, id: TileId) -> Option<&TileConfig> {
        self.tiles.get(&id)
    }

    pub fn contains(&self, id: TileId) -> bool {
        self.tiles.contains_key(&id) || self.constituents.contains_key(&id)
    }

    /// A single tile, including constituents of large tiles
    pub fn single(&self, id: TileId) -> Option<&SingleTile> {
        match self.tiles.get(&id) {
            Some(TileConfig::Single(tile)) => Some(tile),
            Some(TileConfig::Large(_)) => None,
            None => {
                let (large, index) = self.constituents.get(&id)?;
                self.large(*large)?.tiles.get(*index)
            }
        }
    }

    pub fn large(&self, id: TileId) -> Option<&LargeTile> {
        match self.tiles.get(&id) {
            Some(TileConfig::Large(tile)) => Some(tile),
            _ => None,
        }
    }

    /// Large tile a constituent belongs to
    pub fn parent_of(&self, id: TileId) -> Option<(TileId, usize)> {
        self.constituents.get(&id).copied()
    }

    pub fn socket(&self, id: TileId, direction: Direction) -> Option<Socket> {
        match self.tiles.get(&id) {
            Some(config) => config.socket(direction),
            None => self.single(id).map(|tile| tile.socket(direction)),
        }
    }

    pub fn complexity(&self, id: TileId) -> f32 {
        self.single(id)
            .map(|tile| tile.complexity)
            .or_else(|| self.get(id).map(TileConfig::complexity))
            .unwrap_or(0.0)
    }

    pub fn generation_pool(&self) -> &[TileId] {
        &self.generation_pool
    }

    pub fn default_tile(&self) -> TileId {
        self.default_tile
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Road tile for a bitmask and optional lot side
    pub fn road_tile(&self, mask: u8, lot_side: Option<Direction>) -> TileId {
        match lot_side {
            Some(side) => ids::lot_entry(side, mask),
            None if mask == 0 => ids::ISOLATED_ROAD,
            None => ids::road(mask),
        }
    }

    /// The default city catalog
    pub fn city() -> Self {
        let mut catalog = TileCatalog::new(ids::GRASS);

        for mask in 0u8..16 {
            let sides = mask.count_ones();
            let tile = SingleTile {
                id: ids::road(mask),
                sockets: Sockets::road(mask, Socket::Green),
                complexity: 0.25 * sides as f32,
                graph_priority: road_priority(sides),
                base_tile: None,
                kind: if mask == 0 { TileKind::Terrain } else { TileKind::Road },
            };
            catalog.insert(TileConfig::Single(tile), true);
        }

        catalog.insert(
            TileConfig::Single(SingleTile {
                id: ids::NATURE,
                sockets: Sockets::uniform(Socket::Blue),
                complexity: 0.1,
                graph_priority: f32::MAX,
                base_tile: Some(ids::GRASS),
                kind: TileKind::Terrain,
            }),
            true,
        );
        catalog.insert(
            TileConfig::Single(SingleTile {
                id: ids::ISOLATED_ROAD,
                sockets: Sockets::uniform(Socket::Green),
                complexity: 0.25,
                graph_priority: road_priority(0),
                base_tile: Some(ids::GRASS),
                kind: TileKind::Road,
            }),
            false,
        );

        for side in Direction::ALL {
            for mask in 0u8..16 {
                if mask & side.bit() != 0 {
                    continue;
                }
                let mut sockets = Sockets::road(mask, Socket::Green);
                sockets.set(side, Socket::Pink);
                let base_tile = catalog.road_tile(mask, None);
                catalog.insert(
                    TileConfig::Single(SingleTile {
                        id: ids::lot_entry(side, mask),
                        sockets,
                        complexity: 0.25 * (mask.count_ones() + 1) as f32,
                        graph_priority: 0.0,
                        base_tile: Some(base_tile),
                        kind: TileKind::LotEntry,
                    }),
                    false,
                );
            }
        }

        catalog.insert(TileConfig::Large(large_tile(ids::PARK, 2, 2, None, 0)), true);
        catalog.insert(TileConfig::Large(large_tile(ids::PLAZA, 3, 2, None, 4)), true);

        for side in Direction::ALL {
            catalog.insert(
                TileConfig::Large(large_tile(ids::residential_lot(side), 2, 2, Some(side), 0)),
                false,
            );
            catalog.insert(
                TileConfig::Large(large_tile(ids::commercial_lot(side), 3, 2, Some(side), 0)),
                false,
            );
        }

        catalog
    }
}

fn road_priority(sides: u32) -> f32 {
    match sides {
        3 | 4 => 1.0,
        2 => 2.0,
        1 => 3.0,
        _ => 4.0,
    }
}

/// Build a large tile with White outer walls and seams inside. When a
/// driveway side is given, the first tile along that side gets an Orange
/// driveway socket and becomes the anchor.
fn large_tile(
    id: TileId,
    width: u32,
    height: u32,
    driveway: Option<Direction>,
    anchor_index: usize,
) -> LargeTile {
    let driveway_index = driveway.map(|side| {
        let (column, row) = match side {
            Direction::Up => (0, 0),
            Direction::Down => (0, height - 1),
            Direction::Left => (0, height - 1),
            Direction::Right => (width - 1, height - 1),
        };
        (side, (row * width + column) as usize)
    });

    let mut tiles = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for column in 0..width {
            let index = (row * width + column) as usize;
            let mut sockets = Sockets {
                top: if row == 0 { Socket::White } else { Socket::DarkBrown },
                bottom: if row + 1 == height { Socket::White } else { Socket::DarkBrown },
                left: if column == 0 { Socket::White } else { Socket::LightBrown },
                right: if column + 1 == width { Socket::White } else { Socket::LightBrown },
            };
            if let Some((side, driveway_at)) = driveway_index {
                if driveway_at == index {
                    sockets.set(side, Socket::Orange);
                }
            }
            tiles.push(SingleTile {
                id: ids::constituent(id, index),
                sockets,
                complexity: 0.5,
                graph_priority: f32::MAX,
                base_tile: None,
                kind: TileKind::LotPart,
            });
        }
    }

    let anchor_index = driveway_index.map_or(anchor_index, |(_, index)| index);
    let complexity = tiles.iter().map(|tile| tile.complexity).sum();
    LargeTile {
        id,
        tiles,
        width,
        height,
        anchor_index,
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pairings_are_symmetric() {
        let all = [
            Socket::Red,
            Socket::Green,
            Socket::Blue,
            Socket::Yellow,
            Socket::Pink,
            Socket::Orange,
            Socket::White,
            Socket::LightBrown,
            Socket::Gray,
            Socket::DarkBrown,
        ];
        for a in all {
            for b in all {
                assert_eq!(a.pairs_with(b), b.pairs_with(a), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_lot_anchor_is_driveway() {
        let catalog = TileCatalog::city();
        let lot = catalog
            .large(ids::residential_lot(Direction::Down))
            .expect("lot should exist");
        let anchor = lot.anchor().expect("anchor should exist");
        assert_eq!(anchor.socket(Direction::Down), Socket::Orange);
        assert_eq!(lot.anchor_offset(), (0, 1));
    }

    #[test]
    fn test_constituents_resolve() {
        let catalog = TileCatalog::city();
        let plaza = catalog.large(ids::PLAZA).expect("plaza should exist");
        let part = &plaza.tiles[5];
        assert_eq!(catalog.single(part.id), Some(part));
        assert_eq!(catalog.parent_of(part.id), Some((ids::PLAZA, 5)));
        assert!((plaza.complexity - 3.0).abs() < f32::EPSILON);
    }
}
