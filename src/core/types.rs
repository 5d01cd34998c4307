//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Game tick counter (simulation time unit)
pub type Tick = u64;

/// Slot identifier for units in the unit store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub u32);

/// Identifier for unit types (index into the catalog)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct UnitTypeId(pub u16);

impl UnitTypeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Identifier for players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u8);

impl PlayerId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Force pool slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForceId(pub usize);

/// Map layer index (surface, underground, ...)
pub type MapLayer = usize;

/// Tile coordinate on a map layer
///
/// `TilePos::INVALID` stands for "no position", which the attack logic reads as
/// "search the whole map".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const INVALID: TilePos = TilePos { x: -1, y: -1 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// False for `INVALID` and any other negative coordinate
    pub fn is_valid(&self) -> bool {
        self.x >= 0 && self.y >= 0
    }

    /// Chebyshev distance, which matches 8-way movement
    pub fn distance(&self, other: &Self) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        dx.max(dy)
    }

    /// All 8 neighbouring tiles (may be out of bounds)
    pub fn neighbors(&self) -> [TilePos; 8] {
        [
            TilePos::new(self.x - 1, self.y - 1),
            TilePos::new(self.x, self.y - 1),
            TilePos::new(self.x + 1, self.y - 1),
            TilePos::new(self.x - 1, self.y),
            TilePos::new(self.x + 1, self.y),
            TilePos::new(self.x - 1, self.y + 1),
            TilePos::new(self.x, self.y + 1),
            TilePos::new(self.x + 1, self.y + 1),
        ]
    }
}

impl Default for TilePos {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Distance between a unit footprint (top-left `pos`, `w`x`h` tiles) and a tile
pub fn footprint_distance(pos: TilePos, w: u32, h: u32, target: TilePos) -> u32 {
    footprint_gap(pos, w, h, target, 1, 1)
}

/// Chebyshev gap between two footprints; 0 when they overlap
pub fn footprint_gap(a: TilePos, aw: u32, ah: u32, b: TilePos, bw: u32, bh: u32) -> u32 {
    let axis = |lo_a: i32, len_a: u32, lo_b: i32, len_b: u32| {
        let hi_a = lo_a + len_a.max(1) as i32 - 1;
        let hi_b = lo_b + len_b.max(1) as i32 - 1;
        (lo_b - hi_a).max(lo_a - hi_b).max(0)
    };
    let dx = axis(a.x, aw, b.x, bw);
    let dy = axis(a.y, ah, b.y, bh);
    dx.max(dy) as u32
}
