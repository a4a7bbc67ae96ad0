//! Runtime tile grid and the edit commands that mutate it
//!
//! Cells are stored densely by linear index. Edits auto-tile road cells by
//! the bitmask of their road neighbors and report which cells changed so
//! the road network can be rebuilt incrementally.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;
use sorted_vec::SortedVec;

use super::cell::{Cell, Direction, GridSize};
use super::error::GenerationFailure;
use super::tile_config::{SingleTile, Socket, TileCatalog, TileKind};
use super::types::{LotId, TileId};

/// A cell's runtime state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tile {
    Fixed(TileId),
    /// Tiles still possible here; empty means contradiction
    Superposition(SortedVec<TileId>),
}

impl Tile {
    pub fn fixed_id(&self) -> Option<TileId> {
        match self {
            Tile::Fixed(id) => Some(*id),
            Tile::Superposition(_) => None,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Tile::Fixed(_))
    }

    /// Number of remaining options; a fixed tile counts as one
    pub fn entropy(&self) -> usize {
        match self {
            Tile::Fixed(_) => 1,
            Tile::Superposition(options) => options.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TilemapConfig {
    pub grid: GridSize,
    pub default_tile: TileId,
    pub catalog: Arc<TileCatalog>,
    pub seed: u64,
}

impl TilemapConfig {
    pub fn new(horizontal_cells: u32, vertical_cells: u32, catalog: Arc<TileCatalog>, seed: u64) -> Self {
        Self {
            grid: GridSize::new(horizontal_cells, vertical_cells),
            default_tile: catalog.default_tile(),
            catalog,
            seed,
        }
    }

    /// Default city catalog on a grid of the given size
    pub fn city(horizontal_cells: u32, vertical_cells: u32, seed: u64) -> Self {
        Self::new(horizontal_cells, vertical_cells, Arc::new(TileCatalog::city()), seed)
    }
}

/// Where a lot attaches to the road grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub lot: LotId,
    /// From the road cell towards the lot
    pub direction: Direction,
}

/// Result of removing a road cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoadRemoval {
    pub changed: Vec<Cell>,
    pub detached_lot: Option<LotId>,
}

#[derive(Debug, Clone)]
pub struct Tilemap {
    config: TilemapConfig,
    tiles: Vec<Tile>,
    anchors: BTreeMap<Cell, Anchor>,
}

impl Tilemap {
    /// Every cell fixed to the default tile
    pub fn filled(config: TilemapConfig) -> Self {
        let tiles = vec![Tile::Fixed(config.default_tile); config.grid.cell_count()];
        Self {
            config,
            tiles,
            anchors: BTreeMap::new(),
        }
    }

    /// Every cell superposed over `options`
    pub fn superposed(config: TilemapConfig, options: &[TileId]) -> Self {
        let options = SortedVec::from_unsorted(options.to_vec());
        let tiles = vec![Tile::Superposition(options); config.grid.cell_count()];
        Self {
            config,
            tiles,
            anchors: BTreeMap::new(),
        }
    }

    /// Grass map with roads auto-tiled on the given cells
    pub fn from_road_cells(config: TilemapConfig, cells: &[Cell]) -> Result<Self, GenerationFailure> {
        let mut tilemap = Self::filled(config);
        tilemap.place_road_and_update_buffer(cells)?;
        Ok(tilemap)
    }

    pub fn config(&self) -> &TilemapConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridSize {
        &self.config.grid
    }

    pub fn catalog(&self) -> &TileCatalog {
        &self.config.catalog
    }

    pub fn tile(&self, cell: &Cell) -> Option<&Tile> {
        self.config.grid.index(cell).and_then(|i| self.tiles.get(i))
    }

    pub fn tile_at_index(&self, index: usize) -> Option<&Tile> {
        self.tiles.get(index)
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn fixed(&self, cell: &Cell) -> Option<TileId> {
        self.tile(cell).and_then(Tile::fixed_id)
    }

    /// Fixed single tile at a cell, resolving large tile constituents
    pub fn single_at(&self, cell: &Cell) -> Option<&SingleTile> {
        self.fixed(cell).and_then(|id| self.config.catalog.single(id))
    }

    pub(crate) fn set(&mut self, index: usize, tile: Tile) {
        if let Some(slot) = self.tiles.get_mut(index) {
            *slot = tile;
        }
    }

    pub(crate) fn tile_mut(&mut self, index: usize) -> Option<&mut Tile> {
        self.tiles.get_mut(index)
    }

    pub fn anchors(&self) -> &BTreeMap<Cell, Anchor> {
        &self.anchors
    }

    pub fn is_solved(&self) -> bool {
        self.tiles.iter().all(Tile::is_fixed)
    }

    /// Sum of the complexity of every fixed tile
    pub fn complexity(&self) -> f32 {
        self.tiles
            .iter()
            .filter_map(Tile::fixed_id)
            .map(|id| self.config.catalog.complexity(id))
            .sum()
    }

    pub fn is_road(&self, cell: &Cell) -> bool {
        self.single_at(cell).is_some_and(SingleTile::is_road)
    }

    /// Road and lot-entry cells in scan order
    pub fn road_cells(&self) -> Vec<Cell> {
        self.config
            .grid
            .cells()
            .filter(|cell| self.is_road(cell))
            .collect()
    }

    /// Turn `cells` into road and re-tile them together with their
    /// neighbors. Returns every cell whose tile changed.
    pub fn place_road_and_update_buffer(&mut self, cells: &[Cell]) -> Result<Vec<Cell>, GenerationFailure> {
        for cell in cells {
            let tile = self
                .single_at(cell)
                .ok_or(GenerationFailure::InvalidDirection {
                    cell: *cell,
                    direction: None,
                })?;
            if tile.kind == TileKind::LotPart {
                return Err(GenerationFailure::InvalidBigTilePlacement {
                    cell: *cell,
                    tile: tile.id,
                });
            }
        }

        let mut changed = BTreeSet::new();
        let mut buffer = BTreeSet::new();
        for cell in cells {
            if !self.is_road(cell) {
                let isolated = self.catalog().road_tile(0, None);
                self.write(cell, isolated, &mut changed);
            }
            buffer.insert(*cell);
            for (_, neighbor) in self.config.grid.neighbors(cell) {
                buffer.insert(neighbor);
            }
        }
        self.retile(&buffer, &mut changed);

        debug!("placed {} road cells, {} tiles changed", cells.len(), changed.len());
        Ok(changed.into_iter().collect())
    }

    /// Revert a road cell to the default tile. A lot anchored on it is
    /// removed along with it.
    pub fn remove_road_at(&mut self, cell: &Cell) -> Result<RoadRemoval, GenerationFailure> {
        if !self.is_road(cell) {
            let tile = self.fixed(cell).unwrap_or(self.config.default_tile);
            return Err(GenerationFailure::NoPotentialMatch {
                cell: *cell,
                tile: Some(tile),
            });
        }

        let mut changed = BTreeSet::new();
        let detached_lot = self.detach_lot(cell, &mut changed);
        self.write(cell, self.config.default_tile, &mut changed);

        let buffer: BTreeSet<Cell> = self
            .config
            .grid
            .neighbors(cell)
            .into_iter()
            .map(|(_, neighbor)| neighbor)
            .collect();
        self.retile(&buffer, &mut changed);

        Ok(RoadRemoval {
            changed: changed.into_iter().collect(),
            detached_lot,
        })
    }

    /// Place the large tile `lot_tile` next to road cell `entry` with its
    /// driveway facing the road, then switch the road tile to its lot
    /// entry variant. Nothing changes on failure.
    pub fn place_lot(
        &mut self,
        entry: &Cell,
        lot_tile: TileId,
        driveway: Direction,
        lot: LotId,
    ) -> Result<Vec<Cell>, GenerationFailure> {
        let toward_lot = driveway.opposite();
        // An isolated road piece has no lanes to reach the lot from
        let road = self
            .single_at(entry)
            .filter(|tile| tile.kind == TileKind::Road && tile.road_mask() != 0)
            .ok_or(GenerationFailure::InvalidBigTilePlacement {
                cell: *entry,
                tile: lot_tile,
            })?;
        let mask = road.road_mask();
        if mask & toward_lot.bit() != 0 {
            return Err(GenerationFailure::InvalidDirection {
                cell: *entry,
                direction: Some(toward_lot),
            });
        }

        let anchor_cell = self
            .config
            .grid
            .neighbor(entry, toward_lot)
            .ok_or(GenerationFailure::InvalidDirection {
                cell: *entry,
                direction: Some(toward_lot),
            })?;

        let catalog = Arc::clone(&self.config.catalog);
        let large = catalog
            .large(lot_tile)
            .ok_or(GenerationFailure::TileNotFound(lot_tile))?;
        let invalid = GenerationFailure::InvalidBigTilePlacement {
            cell: anchor_cell,
            tile: lot_tile,
        };
        let driveway_fits = large
            .anchor()
            .is_some_and(|anchor| anchor.socket(driveway).pairs_with(Socket::Pink));
        if !driveway_fits {
            return Err(invalid);
        }

        let footprint = large
            .footprint(&anchor_cell, &self.config.grid)
            .ok_or_else(|| invalid.clone())?;
        let free = footprint.iter().all(|(cell, _)| {
            self.single_at(cell)
                .is_some_and(|tile| tile.kind == TileKind::Terrain && !self.anchors.contains_key(cell))
        });
        if !free {
            return Err(invalid);
        }

        let mut changed = BTreeSet::new();
        for (cell, part) in &footprint {
            self.write(cell, part.id, &mut changed);
        }
        self.write(entry, catalog.road_tile(mask, Some(toward_lot)), &mut changed);
        self.anchors.insert(
            *entry,
            Anchor {
                lot,
                direction: toward_lot,
            },
        );

        debug!("placed lot {:?} at {} with entry {}", lot, anchor_cell, entry);
        Ok(changed.into_iter().collect())
    }

    /// Clear the lot anchored at `entry`, restoring its cells to the default tile
    fn detach_lot(&mut self, entry: &Cell, changed: &mut BTreeSet<Cell>) -> Option<LotId> {
        let anchor = self.anchors.remove(entry)?;
        let catalog = Arc::clone(&self.config.catalog);
        let mut pending = vec![self.config.grid.neighbor(entry, anchor.direction)?];
        let mut seen = BTreeSet::new();

        // Flood over the lot's constituent cells
        while let Some(cell) = pending.pop() {
            if !seen.insert(cell) {
                continue;
            }
            let Some(id) = self.fixed(&cell) else { continue };
            let Some((parent, _)) = catalog.parent_of(id) else { continue };
            self.write(&cell, self.config.default_tile, changed);
            for (_, neighbor) in self.config.grid.neighbors(&cell) {
                let same_lot = self
                    .fixed(&neighbor)
                    .and_then(|n| catalog.parent_of(n))
                    .is_some_and(|(p, _)| p == parent);
                if same_lot {
                    pending.push(neighbor);
                }
            }
        }
        Some(anchor.lot)
    }

    /// Re-tile road cells in `buffer` by the bitmask of their road neighbors
    fn retile(&mut self, buffer: &BTreeSet<Cell>, changed: &mut BTreeSet<Cell>) {
        for cell in buffer {
            let Some(tile) = self.single_at(cell) else { continue };
            if !tile.is_road() {
                continue;
            }
            let lot_side = self.anchors.get(cell).map(|anchor| anchor.direction);
            let mask = self
                .config
                .grid
                .neighbors(cell)
                .into_iter()
                .filter(|(dir, neighbor)| Some(*dir) != lot_side && self.is_road(neighbor))
                .fold(0u8, |mask, (dir, _)| mask | dir.bit());
            let id = self.catalog().road_tile(mask, lot_side);
            self.write(cell, id, changed);
        }
    }

    fn write(&mut self, cell: &Cell, id: TileId, changed: &mut BTreeSet<Cell>) {
        let Some(index) = self.config.grid.index(cell) else { return };
        if self.tiles[index].fixed_id() != Some(id) {
            self.tiles[index] = Tile::Fixed(id);
            changed.insert(*cell);
        }
    }

    /// One character per cell: road glyphs by mask, `L` lot entries,
    /// `#` lot/park parts, `*` nature, `.` grass, `?` unresolved
    pub fn render(&self) -> String {
        let grid = &self.config.grid;
        let mut out = String::with_capacity(grid.cell_count() + grid.vertical_cells as usize);
        for (i, tile) in self.tiles.iter().enumerate() {
            let glyph = match tile {
                Tile::Superposition(_) => '?',
                Tile::Fixed(id) => match self.config.catalog.single(*id) {
                    Some(single) => glyph_for(single),
                    None => '?',
                },
            };
            out.push(glyph);
            if (i + 1) % grid.horizontal_cells as usize == 0 {
                out.push('\n');
            }
        }
        out
    }
}

fn glyph_for(tile: &SingleTile) -> char {
    match tile.kind {
        TileKind::LotEntry => 'L',
        TileKind::LotPart => '#',
        TileKind::Terrain if tile.base_tile.is_some() => '*',
        TileKind::Terrain => '.',
        TileKind::Road => {
            let mask = tile.road_mask();
            let vertical = mask & (Direction::Up.bit() | Direction::Down.bit());
            let horizontal = mask & (Direction::Left.bit() | Direction::Right.bit());
            match (vertical != 0, horizontal != 0) {
                (true, true) => '+',
                (true, false) => '|',
                (false, true) => '-',
                (false, false) => 'o',
            }
        }
    }
}
