//! Constraint propagation tile generator
//!
//! A step-driven wave function collapse variant. Each call to
//! [`Model::propagate`] performs exactly one queued step, or makes a new
//! pick when the queue is empty. The generator never backtracks; once a
//! fatal failure occurs the supervisor switches to `Recovering` and the
//! driver decides what to do next.

use std::collections::{BTreeSet, VecDeque};

use log::debug;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;

use super::cell::{Cell, Direction};
use super::error::GenerationFailure;
use super::tile_config::{LargeTile, TileConfig};
use super::tilemap::{Tile, Tilemap, TilemapConfig};
use super::types::TileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Generating,
    Done,
    Recovering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Propagating,
    Failure(GenerationFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStep {
    PickTile(Cell, TileId),
    KeepMatching { from: Cell, to: Cell },
}

pub struct Model {
    tilemap: Tilemap,
    rng: StdRng,
    queue: VecDeque<PropagationStep>,
    supervisor: SupervisorState,
    state: GenerationState,
    steps: usize,
    picks: usize,
    dropped_picks: usize,
}

impl Model {
    /// Fresh model with every cell superposed over the generation pool.
    /// Connective sockets facing off the map and large tiles whose
    /// footprint would leave the grid are pruned up front.
    pub fn init(config: TilemapConfig) -> Self {
        let catalog = config.catalog.clone();
        let seed = config.seed;
        let mut tilemap = Tilemap::superposed(config, catalog.generation_pool());
        let grid = *tilemap.grid();

        for (index, cell) in grid.cells().enumerate() {
            let off_map: Vec<Direction> = Direction::ALL
                .into_iter()
                .filter(|dir| grid.neighbor(&cell, *dir).is_none())
                .collect();
            let Some(Tile::Superposition(options)) = tilemap.tile_mut(index) else {
                continue;
            };
            options.retain(|id| match catalog.get(*id) {
                Some(TileConfig::Large(large)) => large.footprint(&cell, &grid).is_some(),
                Some(TileConfig::Single(single)) => off_map
                    .iter()
                    .all(|dir| !single.socket(*dir).is_connective()),
                None => false,
            });
        }

        Self {
            tilemap,
            rng: StdRng::seed_from_u64(seed),
            queue: VecDeque::new(),
            supervisor: SupervisorState::Generating,
            state: GenerationState::Propagating,
            steps: 0,
            picks: 0,
            dropped_picks: 0,
        }
    }

    /// Run from `init` until the supervisor leaves `Generating`
    pub fn solve(config: TilemapConfig) -> Self {
        let mut model = Self::init(config);
        while model.supervisor == SupervisorState::Generating {
            model.propagate();
        }
        model
    }

    pub fn supervisor(&self) -> SupervisorState {
        self.supervisor
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    pub fn tilemap(&self) -> &Tilemap {
        &self.tilemap
    }

    pub fn to_tilemap(&self) -> Tilemap {
        self.tilemap.clone()
    }

    pub fn into_tilemap(self) -> Tilemap {
        self.tilemap
    }

    pub fn pending_steps(&self) -> usize {
        self.queue.len()
    }

    /// Number of `propagate` calls made while generating
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Random draws made, including dropped ones
    pub fn picks(&self) -> usize {
        self.picks
    }

    pub fn dropped_picks(&self) -> usize {
        self.dropped_picks
    }

    pub fn fixed_cells(&self) -> usize {
        self.tilemap.tiles().iter().filter(|t| t.is_fixed()).count()
    }

    /// Whether the generator is stuck and waiting for the driver
    pub fn stopped(&self) -> bool {
        self.supervisor == SupervisorState::Recovering
    }

    pub fn failure_description(&self) -> Option<String> {
        match &self.state {
            GenerationState::Failure(failure) => Some(failure.to_string()),
            GenerationState::Propagating => None,
        }
    }

    /// Force an assignment; it is applied by a later `propagate` call
    pub fn pick_tile(&mut self, cell: Cell, tile: TileId) -> Result<(), GenerationFailure> {
        if !self.tilemap.grid().contains(&cell) {
            return Err(GenerationFailure::InvalidDirection {
                cell,
                direction: None,
            });
        }
        if !self.tilemap.catalog().contains(tile) {
            return Err(GenerationFailure::TileNotFound(tile));
        }
        self.queue.push_back(PropagationStep::PickTile(cell, tile));
        if self.supervisor == SupervisorState::Done {
            self.supervisor = SupervisorState::Generating;
        }
        Ok(())
    }

    /// Drop the large tile option that failed to place and resume.
    /// Returns false when the current failure is of another kind.
    pub fn discard_failed_pick(&mut self) -> bool {
        let GenerationState::Failure(GenerationFailure::InvalidBigTilePlacement { cell, tile }) =
            self.state.clone()
        else {
            return false;
        };
        let Some(index) = self.tilemap.grid().index(&cell) else {
            return false;
        };
        if let Some(Tile::Superposition(options)) = self.tilemap.tile_mut(index) {
            options.retain(|id| *id != tile);
            if options.is_empty() {
                self.state = GenerationState::Failure(GenerationFailure::NoSuperpositionOptions { cell });
                return false;
            }
        }
        debug!("discarded {} at {}, resuming", tile, cell);
        self.state = GenerationState::Propagating;
        self.supervisor = SupervisorState::Generating;
        true
    }

    /// Perform a single propagation step
    pub fn propagate(&mut self) {
        if self.supervisor != SupervisorState::Generating {
            return;
        }

        let result = match self.queue.pop_front() {
            Some(PropagationStep::PickTile(cell, tile)) => self.apply_pick(cell, tile),
            Some(PropagationStep::KeepMatching { from, to }) => self.keep_matching(from, to),
            None => {
                self.pick_lowest_entropy();
                Ok(())
            }
        };
        self.steps += 1;

        match result {
            Ok(()) => {}
            Err(failure) if !failure.is_fatal() => {}
            Err(failure) => {
                debug!("generation stopped: {}", failure);
                self.state = GenerationState::Failure(failure);
                self.supervisor = SupervisorState::Recovering;
            }
        }
    }

    /// Choose among the smallest superpositions and draw a tile for it.
    /// The draw comes from the whole pool and is dropped when the chosen
    /// cell cannot hold it.
    fn pick_lowest_entropy(&mut self) {
        let mut lowest = usize::MAX;
        let mut tied = Vec::new();
        for (index, tile) in self.tilemap.tiles().iter().enumerate() {
            if let Tile::Superposition(options) = tile {
                let entropy = options.len();
                if entropy == 0 || entropy > lowest {
                    continue;
                }
                if entropy < lowest {
                    lowest = entropy;
                    tied.clear();
                }
                tied.push(index);
            }
        }

        if tied.is_empty() {
            if self.tilemap.is_solved() {
                debug!("generation done after {} steps, {} picks", self.steps, self.picks);
                self.supervisor = SupervisorState::Done;
            }
            return;
        }

        let Some(&index) = tied.choose(&mut self.rng) else { return };
        let Some(&tile) = self.tilemap.catalog().generation_pool().choose(&mut self.rng) else {
            return;
        };
        self.picks += 1;

        let accepted = matches!(
            self.tilemap.tile_at_index(index),
            Some(Tile::Superposition(options)) if options.contains(&tile)
        );
        match self.tilemap.grid().cell_at(index) {
            Some(cell) if accepted => self.queue.push_back(PropagationStep::PickTile(cell, tile)),
            _ => self.dropped_picks += 1,
        }
    }

    fn apply_pick(&mut self, cell: Cell, tile: TileId) -> Result<(), GenerationFailure> {
        let index = self
            .tilemap
            .grid()
            .index(&cell)
            .ok_or(GenerationFailure::InvalidDirection {
                cell,
                direction: None,
            })?;

        let catalog = self.tilemap.config().catalog.clone();
        if let Some(large) = catalog.large(tile) {
            return self.place_large(cell, large);
        }
        if catalog.single(tile).is_none() {
            return Err(GenerationFailure::TileNotFound(tile));
        }

        self.tilemap.set(index, Tile::Fixed(tile));
        for (_, neighbor) in self.tilemap.grid().neighbors(&cell) {
            self.queue.push_back(PropagationStep::KeepMatching { from: cell, to: neighbor });
        }
        Ok(())
    }

    /// Place every constituent of `large` or nothing at all
    fn place_large(&mut self, anchor: Cell, large: &LargeTile) -> Result<(), GenerationFailure> {
        let invalid = GenerationFailure::InvalidBigTilePlacement {
            cell: anchor,
            tile: large.id,
        };
        let grid = *self.tilemap.grid();
        let catalog = self.tilemap.config().catalog.clone();
        let footprint = large.footprint(&anchor, &grid).ok_or_else(|| invalid.clone())?;
        let covered: BTreeSet<Cell> = footprint.iter().map(|(cell, _)| *cell).collect();

        for (cell, part) in &footprint {
            if !matches!(self.tilemap.tile(cell), Some(Tile::Superposition(_))) {
                return Err(invalid);
            }
            for (dir, neighbor) in grid.neighbors(cell) {
                if covered.contains(&neighbor) {
                    continue;
                }
                let socket = part.socket(dir);
                let compatible = match self.tilemap.tile(&neighbor) {
                    Some(Tile::Fixed(id)) => catalog
                        .socket(*id, dir.opposite())
                        .is_some_and(|theirs| theirs.pairs_with(socket)),
                    Some(Tile::Superposition(options)) => options.iter().any(|id| {
                        catalog
                            .socket(*id, dir.opposite())
                            .is_some_and(|theirs| socket.pairs_with(theirs))
                    }),
                    None => false,
                };
                if !compatible {
                    return Err(invalid);
                }
            }
        }

        for (cell, part) in &footprint {
            if let Some(index) = grid.index(cell) {
                self.tilemap.set(index, Tile::Fixed(part.id));
            }
        }
        for (cell, _) in &footprint {
            for (_, neighbor) in grid.neighbors(cell) {
                if !covered.contains(&neighbor) {
                    self.queue.push_back(PropagationStep::KeepMatching {
                        from: *cell,
                        to: neighbor,
                    });
                }
            }
        }
        debug!("placed {} anchored at {}", large.id, anchor);
        Ok(())
    }

    /// Narrow `to` down to tiles whose facing socket pairs with `from`
    fn keep_matching(&mut self, from: Cell, to: Cell) -> Result<(), GenerationFailure> {
        let from_id = self
            .tilemap
            .fixed(&from)
            .ok_or(GenerationFailure::NoPotentialMatch { cell: from, tile: None })?;
        let direction = from
            .direction_to(&to)
            .ok_or(GenerationFailure::InvalidDirection {
                cell: from,
                direction: None,
            })?;
        let index = self
            .tilemap
            .grid()
            .index(&to)
            .ok_or(GenerationFailure::InvalidDirection {
                cell: from,
                direction: Some(direction),
            })?;

        let catalog = self.tilemap.config().catalog.clone();
        let socket = catalog
            .socket(from_id, direction)
            .ok_or(GenerationFailure::TileNotFound(from_id))?;

        match self.tilemap.tile_mut(index) {
            Some(Tile::Superposition(options)) => {
                options.retain(|id| {
                    catalog
                        .socket(*id, direction.opposite())
                        .is_some_and(|theirs| socket.pairs_with(theirs))
                });
                if options.is_empty() {
                    return Err(GenerationFailure::NoSuperpositionOptions { cell: to });
                }
                Ok(())
            }
            Some(Tile::Fixed(id)) => Err(GenerationFailure::NoPotentialMatch {
                cell: to,
                tile: Some(*id),
            }),
            None => Err(GenerationFailure::InvalidDirection {
                cell: from,
                direction: Some(direction),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::tile_config::ids;

    #[test]
    fn test_keep_matching_filters_neighbor() {
        let mut model = Model::init(TilemapConfig::city(3, 3, 1));
        let center = Cell::new(2, 2);
        let above = Cell::new(2, 1);
        model.pick_tile(center, ids::road(Direction::Up.bit() | Direction::Down.bit())).unwrap();
        model.propagate();
        assert_eq!(model.pending_steps(), 4);

        while model.pending_steps() > 0 {
            model.propagate();
        }
        let Some(Tile::Superposition(options)) = model.tilemap().tile(&above) else {
            panic!("cell above should still be open");
        };
        let catalog = model.tilemap().catalog();
        assert!(!options.is_empty());
        assert!(options
            .iter()
            .all(|id| catalog.socket(*id, Direction::Down) == Some(crate::simulation::Socket::Red)));
    }

    #[test]
    fn test_border_pruning_removes_connective_sockets() {
        let model = Model::init(TilemapConfig::city(4, 4, 3));
        let catalog = model.tilemap().catalog();
        let Some(Tile::Superposition(options)) = model.tilemap().tile(&Cell::new(1, 1)) else {
            panic!("corner should be superposed");
        };
        for id in options.iter() {
            for dir in [Direction::Up, Direction::Left] {
                let socket = catalog.socket(*id, dir).unwrap();
                assert!(!socket.is_connective(), "{} faces off-map with {:?}", id, socket);
            }
        }
    }
}
