macro_rules! debug_log {
    ($($arg:tt)*) => {
        if cfg!(feature = "debug_logs") {
            tracing::debug!($($arg)*);
        }
    };
}

pub mod config;  // Centralized configuration constants + BrokerConfig
pub mod error;
pub mod logging;
pub mod tiles;  // Chunked tile store and the TileOracle seam
pub mod threading;  // Generic worker pool with main-thread callbacks
pub mod pathing;  // A* solver + Pathfinding front-end

pub use config::BrokerConfig;
pub use error::{BrokerError, JobError};
pub use pathing::{PathNode, PathState, Pathfinding, PathfindingRequest, PathfindingResult};
pub use threading::{CallbackManager, JobHandle, JobProcessor, Outcome};
pub use tiles::{ChunkedTileMap, Tile, TileOracle, WalkData};
