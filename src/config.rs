/// Centralized configuration for the pathfinding broker
///
/// Constants live in small sub-modules (map, pathfinding, threading) so call
/// sites read as `config::map::CHUNK_SIZE`. Runtime-tunable values are grouped
/// in [`BrokerConfig`], which can be loaded from JSON.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::BrokerError;

/// Map configuration constants
pub mod map {
    /// Chunk settings: 32x32 tiles per chunk
    pub const CHUNK_SIZE: i32 = 32;
    pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize; // 1024

    /// Movement cost used for tiles that don't specify one
    pub const DEFAULT_TILE_COST: f32 = 1.0;

    /// Convert tile coordinates to chunk coordinates (works for negative tiles)
    #[inline]
    pub fn tile_to_chunk(x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(CHUNK_SIZE), y.div_euclid(CHUNK_SIZE))
    }

    /// Convert tile coordinates to local coordinates inside their chunk (0-31)
    #[inline]
    pub fn tile_to_local(x: i32, y: i32) -> (usize, usize) {
        (x.rem_euclid(CHUNK_SIZE) as usize, y.rem_euclid(CHUNK_SIZE) as usize)
    }
}

/// Pathfinding configuration constants
pub mod pathfinding {
    /// Capacity of the open set. Searches abort once the frontier reaches
    /// `MAX_OPEN_NODES - 8` (one full neighbour expansion of headroom).
    pub const MAX_OPEN_NODES: usize = 1024;

    /// Headroom kept below the open set capacity
    pub const NEIGHBOUR_HEADROOM: usize = 8;

    pub const ROOT_2: f32 = std::f32::consts::SQRT_2;
    pub const HALF_ROOT_2: f32 = 0.5 * ROOT_2;
}

/// Worker pool configuration constants
pub mod threading {
    use std::time::Duration;

    /// Number of process durations remembered per worker
    pub const HISTORY_LENGTH: usize = 20;

    /// How long an idle worker sleeps before polling the queue again
    pub const IDLE_SLEEP: Duration = Duration::from_millis(5);

    /// Length of the statistics reporting window
    pub const STATS_WINDOW: Duration = Duration::from_secs(1);

    pub const THREAD_NAME_PREFIX: &str = "pathfinding-worker";
}

/// Runtime configuration for a worker pool.
///
/// Every field has a default, so a JSON document only needs the keys it
/// wants to override: `{"thread_count": 2}` is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub thread_count: usize,
    pub idle_sleep_ms: u64,
    pub history_length: usize,
    pub stats_window_ms: u64,
    pub max_open_nodes: usize,
    pub thread_name_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            thread_count: 4,
            idle_sleep_ms: threading::IDLE_SLEEP.as_millis() as u64,
            history_length: threading::HISTORY_LENGTH,
            stats_window_ms: threading::STATS_WINDOW.as_millis() as u64,
            max_open_nodes: pathfinding::MAX_OPEN_NODES,
            thread_name_prefix: threading::THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Default config with a specific worker count
    pub fn with_threads(thread_count: usize) -> Self {
        Self {
            thread_count,
            ..Self::default()
        }
    }

    /// Parse and validate a config from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, BrokerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BrokerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.thread_count == 0 {
            return Err(BrokerError::InvalidThreadCount(self.thread_count));
        }
        if self.history_length == 0 {
            return Err(BrokerError::InvalidConfig(
                "history_length must be at least 1".to_string(),
            ));
        }
        if self.stats_window_ms == 0 {
            return Err(BrokerError::InvalidConfig(
                "stats_window_ms must be at least 1".to_string(),
            ));
        }
        if self.max_open_nodes <= pathfinding::NEIGHBOUR_HEADROOM {
            return Err(BrokerError::InvalidConfig(format!(
                "max_open_nodes must be greater than {}",
                pathfinding::NEIGHBOUR_HEADROOM
            )));
        }
        Ok(())
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn stats_window(&self) -> Duration {
        Duration::from_millis(self.stats_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_tiles_map_to_negative_chunks() {
        assert_eq!(map::tile_to_chunk(0, 0), (0, 0));
        assert_eq!(map::tile_to_chunk(31, 32), (0, 1));
        assert_eq!(map::tile_to_chunk(-1, -32), (-1, -1));
        assert_eq!(map::tile_to_chunk(-33, 5), (-2, 0));
        assert_eq!(map::tile_to_local(-1, -32), (31, 0));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = BrokerConfig::from_json_str(r#"{"thread_count": 2, "idle_sleep_ms": 1}"#).unwrap();
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.idle_sleep(), Duration::from_millis(1));
        assert_eq!(config.history_length, threading::HISTORY_LENGTH);
        assert_eq!(config.max_open_nodes, pathfinding::MAX_OPEN_NODES);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            BrokerConfig::from_json_str(r#"{"thread_count": 0}"#),
            Err(BrokerError::InvalidThreadCount(0))
        ));
        assert!(matches!(
            BrokerConfig::from_json_str(r#"{"max_open_nodes": 8}"#),
            Err(BrokerError::InvalidConfig(_))
        ));
        assert!(matches!(
            BrokerConfig::from_json_str("not json"),
            Err(BrokerError::ConfigParse(_))
        ));
    }
}
