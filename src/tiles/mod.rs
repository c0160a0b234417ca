// Tile data consumed by the pathfinder
// The solver only ever asks one question per tile: can I stand here, and what
// does it cost to do so? Anything that can answer that is a TileOracle.

pub mod chunk_map;

pub use chunk_map::{ChunkCoord, ChunkedTileMap, TileChunk, TileStats};

use bitflags::bitflags;

use crate::config::map as map_config;

bitflags! {
    /// Per-tile state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TileFlags: u8 {
        /// Ground that units can move across
        const WALKABLE = 0b0000_0001;
        /// Temporarily taken by a tile entity (tree, building) - blocks movement
        const OCCUPIED = 0b0000_0010;
    }
}

/// A single map tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub flags: TileFlags,
    /// Movement cost multiplier (1.0 = normal ground)
    pub cost: f32,
}

impl Tile {
    /// Blocked tile; also what unloaded terrain reads as
    pub const BLOCKED: Tile = Tile {
        flags: TileFlags::empty(),
        cost: map_config::DEFAULT_TILE_COST,
    };

    /// Plain walkable ground with the default cost
    pub const GROUND: Tile = Tile {
        flags: TileFlags::WALKABLE,
        cost: map_config::DEFAULT_TILE_COST,
    };

    pub fn walkable(cost: f32) -> Self {
        Self {
            flags: TileFlags::WALKABLE,
            cost,
        }
    }

    #[inline]
    pub fn is_walkable(&self) -> bool {
        self.flags.contains(TileFlags::WALKABLE) && !self.flags.contains(TileFlags::OCCUPIED)
    }

    #[inline]
    pub fn walk_data(&self) -> WalkData {
        WalkData {
            walkable: self.is_walkable(),
            cost: self.cost,
        }
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::BLOCKED
    }
}

/// Answer to "can a unit stand on (x, y), and at what cost"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkData {
    pub walkable: bool,
    pub cost: f32,
}

impl WalkData {
    pub const BLOCKED: WalkData = WalkData {
        walkable: false,
        cost: map_config::DEFAULT_TILE_COST,
    };
}

/// Read-only walkability source used by the solver.
///
/// Called from worker threads while the main thread may be mutating the map,
/// so implementations must be `Send + Sync`. Reads are a best-effort snapshot:
/// a search may observe a tile before and its neighbour after an edit.
pub trait TileOracle: Send + Sync {
    fn walk_data(&self, x: i32, y: i32) -> WalkData;
}

impl<F> TileOracle for F
where
    F: Fn(i32, i32) -> WalkData + Send + Sync,
{
    fn walk_data(&self, x: i32, y: i32) -> WalkData {
        self(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupied_tile_blocks_movement() {
        let mut tile = Tile::GROUND;
        assert!(tile.is_walkable());

        tile.flags |= TileFlags::OCCUPIED;
        assert!(!tile.is_walkable());
        assert!(!Tile::BLOCKED.is_walkable());
    }

    #[test]
    fn test_closure_oracle() {
        let oracle = |x: i32, _y: i32| WalkData {
            walkable: x >= 0,
            cost: 2.0,
        };
        assert!(oracle.walk_data(3, -7).walkable);
        assert!(!oracle.walk_data(-1, 0).walkable);
        assert_eq!(oracle.walk_data(0, 0).cost, 2.0);
    }
}
