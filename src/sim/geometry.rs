//! Grid cells, directions and axis-aligned boxes
//!
//! The play field is a square of `GRID_SIZE` tiles. Pixel space has its
//! origin in the top-left corner with +y pointing down, so `Direction::Up`
//! decreases the row index.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::grid_to_pixel;

/// A grid cell. Signed so that offsets can be applied before clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub col: i32,
    pub row: i32,
}

impl GridPos {
    pub const fn new(col: i32, row: i32) -> Self {
        Self { col, row }
    }

    /// Center cell of the field (player spawn)
    pub const fn center() -> Self {
        Self::new(GRID_SIZE / 2, GRID_SIZE / 2)
    }

    pub fn in_bounds(&self) -> bool {
        (0..GRID_SIZE).contains(&self.col) && (0..GRID_SIZE).contains(&self.row)
    }

    pub fn clamped(self) -> Self {
        Self::new(
            self.col.clamp(0, GRID_SIZE - 1),
            self.row.clamp(0, GRID_SIZE - 1),
        )
    }

    /// Step `steps` cells in `dir`, clamped to the grid
    pub fn offset(self, dir: Direction, steps: i32) -> Self {
        let (dc, dr) = dir.delta();
        Self::new(self.col + dc * steps, self.row + dr * steps).clamped()
    }
}

/// Cardinal move intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    /// (column delta, row delta)
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Unit vector in pixel space
    pub fn unit(&self) -> Vec2 {
        let (dc, dr) = self.delta();
        Vec2::new(dc as f32, dr as f32)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }
}

/// Axis-aligned bounding box in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Footprint of a single tile
    pub fn cell(cell: GridPos) -> Self {
        Self::from_center(grid_to_pixel(cell), Vec2::splat(TILE_SIZE))
    }

    /// Footprint of a full row
    pub fn row(row: i32) -> Self {
        let y = row as f32 * TILE_SIZE;
        Self::new(Vec2::new(0.0, y), Vec2::new(FIELD_SIZE, y + TILE_SIZE))
    }

    /// Footprint of a full column
    pub fn column(col: i32) -> Self {
        let x = col as f32 * TILE_SIZE;
        Self::new(Vec2::new(x, 0.0), Vec2::new(x + TILE_SIZE, FIELD_SIZE))
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Strict overlap: boxes that only share an edge do not overlap
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(margin),
            max: self.max + Vec2::splat(margin),
        }
    }
}

/// The whole play field
pub fn field_bounds() -> Aabb {
    Aabb::new(Vec2::ZERO, Vec2::splat(FIELD_SIZE))
}
