//! Grid addressing: cells, directions and linear indices

use std::fmt;

use super::config::TILE_SIZE;
use super::types::Position;

/// One of the four orthogonal directions on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    /// Clockwise order, matching the socket order top/right/bottom/left
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// Bit used in road bitmasks (up = 1, left = 2, right = 4, down = 8)
    pub fn bit(self) -> u8 {
        match self {
            Direction::Up => 1,
            Direction::Left => 2,
            Direction::Right => 4,
            Direction::Down => 8,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    /// Unit vector in world space
    pub fn vector(self) -> Position {
        match self {
            Direction::Up => Position::new(0.0, -1.0),
            Direction::Right => Position::new(1.0, 0.0),
            Direction::Down => Position::new(0.0, 1.0),
            Direction::Left => Position::new(-1.0, 0.0),
        }
    }

    /// Unit vector pointing to the right-hand side when heading this way
    pub fn right_hand(self) -> Position {
        let v = self.vector();
        Position::new(-v.y, v.x)
    }

    pub fn angle(self) -> f32 {
        let v = self.vector();
        v.y.atan2(v.x)
    }

    /// Directions whose bits are set in `mask`
    pub fn from_mask(mask: u8) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|dir| mask & dir.bit() != 0)
            .collect()
    }
}

/// A grid coordinate. Both axes are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Top-left corner of the cell in world space
    pub fn origin(&self) -> Position {
        Position::new(
            (self.x as f32 - 1.0) * TILE_SIZE,
            (self.y as f32 - 1.0) * TILE_SIZE,
        )
    }

    pub fn center(&self) -> Position {
        let origin = self.origin();
        Position::new(origin.x + TILE_SIZE / 2.0, origin.y + TILE_SIZE / 2.0)
    }

    /// Direction from this cell to an orthogonally adjacent one
    pub fn direction_to(&self, other: &Cell) -> Option<Direction> {
        let dx = other.x as i64 - self.x as i64;
        let dy = other.y as i64 - self.y as i64;
        match (dx, dy) {
            (0, -1) => Some(Direction::Up),
            (1, 0) => Some(Direction::Right),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Grid dimensions and the addressing arithmetic that goes with them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub horizontal_cells: u32,
    pub vertical_cells: u32,
    deltas: [isize; 4],
}

impl GridSize {
    pub fn new(horizontal_cells: u32, vertical_cells: u32) -> Self {
        let width = horizontal_cells as isize;
        Self {
            horizontal_cells,
            vertical_cells,
            // Indexed by Direction::index()
            deltas: [-width, 1, width, -1],
        }
    }

    pub fn cell_count(&self) -> usize {
        self.horizontal_cells as usize * self.vertical_cells as usize
    }

    pub fn contains(&self, cell: &Cell) -> bool {
        cell.x >= 1 && cell.y >= 1 && cell.x <= self.horizontal_cells && cell.y <= self.vertical_cells
    }

    pub fn index(&self, cell: &Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        Some((cell.y as usize - 1) * self.horizontal_cells as usize + (cell.x as usize - 1))
    }

    pub fn cell_at(&self, index: usize) -> Option<Cell> {
        if index >= self.cell_count() {
            return None;
        }
        let width = self.horizontal_cells as usize;
        Some(Cell::new(
            (index % width) as u32 + 1,
            (index / width) as u32 + 1,
        ))
    }

    /// Neighbor index via the precomputed per-direction delta
    pub fn neighbor_index(&self, index: usize, direction: Direction) -> Option<usize> {
        let width = self.horizontal_cells as usize;
        let column = index % width;
        let blocked = match direction {
            Direction::Left => column == 0,
            Direction::Right => column + 1 == width,
            Direction::Up => index < width,
            Direction::Down => index + width >= self.cell_count(),
        };
        if blocked {
            return None;
        }
        Some((index as isize + self.deltas[direction.index()]) as usize)
    }

    pub fn neighbor(&self, cell: &Cell, direction: Direction) -> Option<Cell> {
        let index = self.index(cell)?;
        self.neighbor_index(index, direction)
            .and_then(|n| self.cell_at(n))
    }

    /// All in-bounds neighbors with the direction leading to them
    pub fn neighbors(&self, cell: &Cell) -> Vec<(Direction, Cell)> {
        Direction::ALL
            .into_iter()
            .filter_map(|dir| self.neighbor(cell, dir).map(|n| (dir, n)))
            .collect()
    }

    /// Cells in scan order (row by row, left to right)
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.cell_count()).filter_map(move |i| self.cell_at(i))
    }

    /// Cell containing a world position
    pub fn cell_at_position(&self, position: &Position) -> Option<Cell> {
        if position.x < 0.0 || position.y < 0.0 {
            return None;
        }
        let cell = Cell::new(
            (position.x / TILE_SIZE).floor() as u32 + 1,
            (position.y / TILE_SIZE).floor() as u32 + 1,
        );
        self.contains(&cell).then_some(cell)
    }

    /// Extent of the grid in world units
    pub fn world_size(&self) -> (f32, f32) {
        (
            self.horizontal_cells as f32 * TILE_SIZE,
            self.vertical_cells as f32 * TILE_SIZE,
        )
    }
}
