// Asynchronous pathfinding
// Binds the generic worker pool to path requests: one PathProcessor per worker,
// results delivered through update() on the owning thread.

pub mod node;
pub mod processor;
pub mod result;

pub use node::PathNode;
pub use processor::PathProcessor;
pub use result::{PathCallback, PathJob, PathState, PathfindingRequest, PathfindingResult};

use std::sync::{Arc, Weak};

use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::threading::{CallbackManager, JobHandle, JobProcessor, PoolState, PoolSummary, WorkerStatsSnapshot};
use crate::tiles::TileOracle;

/// Pathfinding front-end owned by the game loop
///
/// Workers only hold a weak reference to the tile data. If the map is dropped
/// while jobs are queued, those jobs report `ErrorInternal`.
pub struct Pathfinding {
    manager: CallbackManager<PathJob, PathfindingResult>,
}

impl Pathfinding {
    pub fn new<M>(config: BrokerConfig, map: &Arc<M>) -> Result<Self, BrokerError>
    where
        M: TileOracle + 'static,
    {
        let map: Weak<M> = Arc::downgrade(map);
        let map: Weak<dyn TileOracle> = map;
        Self::with_oracle(config, map)
    }

    pub fn with_oracle(config: BrokerConfig, map: Weak<dyn TileOracle>) -> Result<Self, BrokerError> {
        let max_open = config.max_open_nodes;
        let manager = CallbackManager::new(config, |thread_index| {
            Self::create_processor(thread_index, &map, max_open)
        })?;
        Ok(Self { manager })
    }

    /// Fresh solver for one worker; workers never share scratch state
    pub fn create_processor(
        thread_index: usize,
        map: &Weak<dyn TileOracle>,
        max_open: usize,
    ) -> Box<dyn JobProcessor<PathJob, PathfindingResult>> {
        debug_log!(thread_index, max_open, "Creating path processor");
        Box::new(PathProcessor::with_max_open(map.clone(), max_open))
    }

    /// Queue a path request. The returned handle can cancel it until a worker
    /// picks it up; the request's callback fires on a later `update()`.
    pub fn post(&self, request: PathfindingRequest) -> JobHandle {
        let job = request.job();
        let envelope = self.manager.create_boxed(request.on_completed, job);
        let handle = envelope.handle();
        self.manager.post(envelope);
        handle
    }

    pub fn start(&self) -> Result<(), BrokerError> {
        self.manager.start()
    }

    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Deliver finished requests. Call once per tick from the owning thread.
    pub fn update(&self) {
        self.manager.update();
    }

    pub fn shutdown(&self) {
        self.manager.shutdown();
    }

    pub fn state(&self) -> PoolState {
        self.manager.state()
    }

    pub fn is_running(&self) -> bool {
        self.manager.is_running()
    }

    pub fn thread_count(&self) -> usize {
        self.manager.thread_count()
    }

    pub fn pending_count(&self) -> usize {
        self.manager.pending_count()
    }

    pub fn pooled_count(&self) -> usize {
        self.manager.pooled_count()
    }

    pub fn processed_last_window(&self) -> u64 {
        self.manager.processed_last_window()
    }

    pub fn statistics(&self) -> Vec<WorkerStatsSnapshot> {
        self.manager.statistics()
    }

    pub fn summary(&self) -> PoolSummary {
        self.manager.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threading::Outcome;
    use crate::tiles::{ChunkedTileMap, Tile};
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    type Delivered = Arc<Mutex<Vec<(Outcome, PathfindingResult)>>>;

    fn test_config(threads: usize) -> BrokerConfig {
        BrokerConfig {
            idle_sleep_ms: 1,
            ..BrokerConfig::with_threads(threads)
        }
    }

    fn request(delivered: &Delivered, start: (i32, i32), end: (i32, i32)) -> PathfindingRequest {
        let delivered = Arc::clone(delivered);
        PathfindingRequest::new(start.0, start.1, end.0, end.1, move |outcome, result| {
            delivered.lock().push((outcome, result));
        })
    }

    fn pump_until(pathfinding: &Pathfinding, delivered: &Delivered, count: usize) {
        for _ in 0..2000 {
            pathfinding.update();
            if delivered.lock().len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_requests_resolve_through_update() {
        let map = Arc::new(ChunkedTileMap::new());
        map.fill_rect(0, 0, 16, 16, Tile::GROUND);
        map.set_tile(5, 5, Tile::BLOCKED);

        let pathfinding = Pathfinding::new(test_config(2), &map).unwrap();
        pathfinding.start().unwrap();

        let delivered: Delivered = Arc::default();
        pathfinding.post(request(&delivered, (0, 0), (9, 9)));
        pathfinding.post(request(&delivered, (3, 3), (3, 3)));
        pathfinding.post(request(&delivered, (5, 5), (0, 0)));
        pump_until(&pathfinding, &delivered, 3);

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 3);
        assert!(delivered.iter().all(|(outcome, _)| *outcome == Outcome::Run));

        let mut statuses: Vec<PathState> = delivered.iter().map(|(_, result)| result.status).collect();
        statuses.sort_by_key(|status| status.as_str());
        assert_eq!(
            statuses,
            vec![
                PathState::ErrorStartIsEnd,
                PathState::ErrorStartNotWalkable,
                PathState::Successful
            ]
        );

        let found = delivered
            .iter()
            .find(|(_, result)| result.status.is_success())
            .map(|(_, result)| result.clone())
            .unwrap();
        assert_eq!(found.path.as_ref().and_then(|p| p.first().copied()), Some(PathNode::new(0, 0)));
        assert_eq!(found.path.as_ref().and_then(|p| p.last().copied()), Some(PathNode::new(9, 9)));
    }

    #[test]
    fn test_cancelled_request_is_not_solved() {
        let map = Arc::new(ChunkedTileMap::new());
        map.fill_rect(0, 0, 8, 8, Tile::GROUND);

        let pathfinding = Pathfinding::new(test_config(1), &map).unwrap();
        let delivered: Delivered = Arc::default();

        let handle = pathfinding.post(request(&delivered, (0, 0), (7, 7)));
        assert!(handle.cancel());
        pathfinding.start().unwrap();
        pump_until(&pathfinding, &delivered, 1);

        let delivered = delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, Outcome::Cancelled);
        assert_eq!(delivered[0].1, PathfindingResult::default());
        assert_eq!(delivered[0].1.status, PathState::ErrorInternal);
    }

    #[test]
    fn test_dropped_map_reports_internal_error() {
        let map = Arc::new(ChunkedTileMap::new());
        map.fill_rect(0, 0, 8, 8, Tile::GROUND);

        let pathfinding = Pathfinding::new(test_config(1), &map).unwrap();
        drop(map);

        let delivered: Delivered = Arc::default();
        pathfinding.post(request(&delivered, (0, 0), (7, 7)));
        pathfinding.start().unwrap();
        pump_until(&pathfinding, &delivered, 1);

        let delivered = delivered.lock();
        assert_eq!(delivered[0].0, Outcome::Run);
        assert_eq!(delivered[0].1.status, PathState::ErrorInternal);
    }

    #[test]
    fn test_shutdown_resolves_queued_requests() {
        let map = Arc::new(ChunkedTileMap::new());
        map.fill_rect(0, 0, 32, 32, Tile::GROUND);

        let pathfinding = Pathfinding::new(test_config(4), &map).unwrap();
        pathfinding.start().unwrap();

        let delivered: Delivered = Arc::default();
        for i in 0..50 {
            pathfinding.post(request(&delivered, (0, 0), (31, i % 32)));
        }
        pathfinding.shutdown();

        assert_eq!(delivered.lock().len(), 50);
        assert_eq!(pathfinding.state(), PoolState::Stopped);
        assert_eq!(pathfinding.pending_count(), 0);
        assert_eq!(pathfinding.pooled_count(), 50);
    }
}
