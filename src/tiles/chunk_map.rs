/// Chunked tile map for an infinite world
///
/// Tiles are stored in fixed 32x32 chunks keyed by chunk coordinate. Chunks
/// stream in and out as the world is explored; anything outside a loaded chunk
/// reads as blocked, so pathfinding never routes through terrain that hasn't
/// been loaded yet.
///
/// Uses DashMap so worker threads can read tiles while the main thread loads,
/// unloads or edits chunks, without a global lock.

use dashmap::DashMap;

use super::{Tile, TileOracle, WalkData};
use crate::config::map as map_config;

/// Chunk coordinate (chunk_x, chunk_y)
pub type ChunkCoord = (i32, i32);

/// Single chunk of tile data (32x32 tiles)
#[derive(Debug, Clone, PartialEq)]
pub struct TileChunk {
    /// Row-major order: index = y * CHUNK_SIZE + x
    tiles: Vec<Tile>,
}

impl TileChunk {
    /// Chunk where every tile is blocked
    pub fn new() -> Self {
        Self::filled(Tile::BLOCKED)
    }

    /// Chunk where every tile is `tile`
    pub fn filled(tile: Tile) -> Self {
        Self {
            tiles: vec![tile; map_config::CHUNK_AREA],
        }
    }

    /// Build a chunk from row-major tile data. Returns None if the length is wrong.
    pub fn from_tiles(tiles: Vec<Tile>) -> Option<Self> {
        if tiles.len() != map_config::CHUNK_AREA {
            tracing::warn!(
                len = tiles.len(),
                expected = map_config::CHUNK_AREA,
                "TileChunk::from_tiles - wrong tile count"
            );
            return None;
        }
        Some(Self { tiles })
    }

    /// Get tile at local chunk coordinates (0-31)
    #[inline]
    pub fn get(&self, local_x: usize, local_y: usize) -> Tile {
        match Self::index(local_x, local_y) {
            Some(index) => self.tiles[index],
            None => Tile::BLOCKED,
        }
    }

    /// Set tile at local chunk coordinates (0-31)
    #[inline]
    pub fn set(&mut self, local_x: usize, local_y: usize, tile: Tile) {
        match Self::index(local_x, local_y) {
            Some(index) => self.tiles[index] = tile,
            None => tracing::warn!(local_x, local_y, "TileChunk::set - invalid local coordinates"),
        }
    }

    #[inline]
    fn index(local_x: usize, local_y: usize) -> Option<usize> {
        let size = map_config::CHUNK_SIZE as usize;
        if local_x >= size || local_y >= size {
            return None;
        }
        Some(local_y * size + local_x)
    }

    pub fn walkable_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_walkable()).count()
    }
}

impl Default for TileChunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about loaded tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileStats {
    pub loaded_chunks: usize,
    pub walkable_count: usize,
    pub blocked_count: usize,
    pub total_tiles: usize,
}

/// Thread-safe chunked tile store
#[derive(Debug, Default)]
pub struct ChunkedTileMap {
    chunks: DashMap<ChunkCoord, TileChunk>,
}

impl ChunkedTileMap {
    pub fn new() -> Self {
        Self {
            chunks: DashMap::new(),
        }
    }

    /// Load (or replace) a chunk
    pub fn load_chunk(&self, chunk_x: i32, chunk_y: i32, chunk: TileChunk) {
        self.chunks.insert((chunk_x, chunk_y), chunk);
        debug_log!("ChunkedTileMap: loaded chunk ({}, {})", chunk_x, chunk_y);
    }

    /// Unload a chunk, handing its data back to the caller
    pub fn unload_chunk(&self, chunk_x: i32, chunk_y: i32) -> Option<TileChunk> {
        let removed = self.chunks.remove(&(chunk_x, chunk_y)).map(|(_, chunk)| chunk);
        if removed.is_some() {
            debug_log!("ChunkedTileMap: unloaded chunk ({}, {})", chunk_x, chunk_y);
        }
        removed
    }

    pub fn is_chunk_loaded(&self, chunk_x: i32, chunk_y: i32) -> bool {
        self.chunks.contains_key(&(chunk_x, chunk_y))
    }

    pub fn loaded_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Get tile at world coordinates. Unloaded terrain reads as blocked.
    #[inline]
    pub fn tile(&self, x: i32, y: i32) -> Tile {
        let chunk_coord = map_config::tile_to_chunk(x, y);
        let (local_x, local_y) = map_config::tile_to_local(x, y);

        match self.chunks.get(&chunk_coord) {
            Some(chunk) => chunk.get(local_x, local_y),
            None => Tile::BLOCKED,
        }
    }

    /// Set tile at world coordinates. Creates a blocked chunk if none is loaded there.
    pub fn set_tile(&self, x: i32, y: i32, tile: Tile) {
        let chunk_coord = map_config::tile_to_chunk(x, y);
        let (local_x, local_y) = map_config::tile_to_local(x, y);

        self.chunks
            .entry(chunk_coord)
            .or_default()
            .set(local_x, local_y, tile);
    }

    /// Set every tile in the rectangle [x, x + width) x [y, y + height).
    /// The part of the rectangle past the edge of the i32 grid is ignored.
    pub fn fill_rect(&self, x: i32, y: i32, width: i32, height: i32, tile: Tile) {
        let end_x = (i64::from(x) + i64::from(width)).min(i64::from(i32::MAX) + 1);
        let end_y = (i64::from(y) + i64::from(height)).min(i64::from(i32::MAX) + 1);

        for ty in i64::from(y)..end_y {
            for tx in i64::from(x)..end_x {
                // Both ranges stay inside i32 after the clamp above
                self.set_tile(tx as i32, ty as i32, tile);
            }
        }
    }

    /// Drop all chunks
    pub fn clear(&self) {
        self.chunks.clear();
    }

    /// Walkable/blocked counts over loaded chunks (debug displays)
    pub fn stats(&self) -> TileStats {
        let loaded_chunks = self.chunks.len();
        let walkable_count: usize = self.chunks.iter().map(|c| c.value().walkable_count()).sum();
        let total_tiles = loaded_chunks * map_config::CHUNK_AREA;

        TileStats {
            loaded_chunks,
            walkable_count,
            blocked_count: total_tiles - walkable_count,
            total_tiles,
        }
    }
}

impl TileOracle for ChunkedTileMap {
    #[inline]
    fn walk_data(&self, x: i32, y: i32) -> WalkData {
        self.tile(x, y).walk_data()
    }
}
