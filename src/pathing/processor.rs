/// A* solver run on pathfinding worker threads
///
/// 8-directional grid search over a [`TileOracle`]:
/// - Cardinal neighbours are tested first (left, right, above, below)
/// - A diagonal is only considered when both cardinals flanking it are walkable,
///   so paths never squeeze between two blocking tiles
/// - Cardinal step cost is the mean of both tile costs, diagonal step cost is
///   √2 times that
/// - The open set is bounded: once it holds `max_open - 8` entries the search
///   gives up with `ErrorPathTooLong`
///
/// Each worker owns one processor and reuses its scratch tables between jobs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Weak;

use super::node::PathNode;
use super::result::{PathJob, PathState, PathfindingResult};
use crate::config::pathfinding as path_config;
use crate::error::JobError;
use crate::threading::JobProcessor;
use crate::tiles::TileOracle;

/// Frontier entry. Ordered so the BinaryHeap pops the lowest priority first,
/// and among equal priorities the entry pushed first.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    priority: f32,
    sequence: u64,
    node: PathNode,
    /// Cost-so-far of `node` when this entry was pushed
    cost: f32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

pub struct PathProcessor {
    map: Weak<dyn TileOracle>,
    max_open: usize,
    open: BinaryHeap<OpenEntry>,
    came_from: HashMap<PathNode, PathNode>,
    cost_so_far: HashMap<PathNode, f32>,
    near: Vec<(PathNode, f32)>,
    sequence: u64,
}

impl PathProcessor {
    /// Solver reading tiles from `map` with the default open set capacity
    pub fn new(map: Weak<dyn TileOracle>) -> Self {
        Self::with_max_open(map, path_config::MAX_OPEN_NODES)
    }

    pub fn with_max_open(map: Weak<dyn TileOracle>, max_open: usize) -> Self {
        let max_open = max_open.max(path_config::NEIGHBOUR_HEADROOM + 1);
        Self {
            map,
            max_open,
            open: BinaryHeap::with_capacity(max_open),
            came_from: HashMap::new(),
            cost_so_far: HashMap::new(),
            near: Vec::with_capacity(8),
            sequence: 0,
        }
    }

    pub fn max_open(&self) -> usize {
        self.max_open
    }

    /// Find a path from `start` to `end`. `map` of `None` means the tile data
    /// is gone and yields `ErrorInternal`.
    ///
    /// Scratch tables are empty when this returns, whatever the outcome.
    pub fn solve(&mut self, start: PathNode, end: PathNode, map: Option<&dyn TileOracle>) -> PathfindingResult {
        self.clear();
        let result = self.search(start, end, map);
        self.clear();
        result
    }

    fn search(&mut self, start: PathNode, end: PathNode, map: Option<&dyn TileOracle>) -> PathfindingResult {
        let Some(map) = map else {
            return PathfindingResult::failed(PathState::ErrorInternal);
        };
        if !map.walk_data(start.x, start.y).walkable {
            return PathfindingResult::failed(PathState::ErrorStartNotWalkable);
        }
        if !map.walk_data(end.x, end.y).walkable {
            return PathfindingResult::failed(PathState::ErrorEndNotWalkable);
        }
        if start == end {
            return PathfindingResult::failed(PathState::ErrorStartIsEnd);
        }

        self.push(start, 0.0, 0.0);
        self.came_from.insert(start, start);
        self.cost_so_far.insert(start, 0.0);

        let limit = self.max_open - path_config::NEIGHBOUR_HEADROOM;
        let mut near = std::mem::take(&mut self.near);

        let result = loop {
            if self.open.len() >= limit {
                debug_log!(%start, %end, open = self.open.len(), "Open set full, giving up");
                break PathfindingResult::failed(PathState::ErrorPathTooLong);
            }
            let Some(entry) = self.open.pop() else {
                // Frontier exhausted: end is unreachable
                break PathfindingResult::failed(PathState::ErrorInternal);
            };

            let current = entry.node;
            let current_total = self.cost_so_far.get(&current).copied().unwrap_or(f32::INFINITY);
            if entry.cost > current_total {
                // Superseded by a cheaper entry for the same node
                continue;
            }

            if current == end {
                break PathfindingResult::found(self.trace_path(end), current_total);
            }

            let current_cost = map.walk_data(current.x, current.y).cost;
            collect_neighbours(current, map, &mut near);

            for &(next, next_cost) in &near {
                let new_cost = current_total + step_cost(current, next, current_cost, next_cost);
                let improves = match self.cost_so_far.get(&next) {
                    Some(&known) => new_cost < known,
                    None => true,
                };
                if improves {
                    self.cost_so_far.insert(next, new_cost);
                    // Heuristic term is the Manhattan step from `current` to `next`
                    // (1 or 2), not the remaining distance to `end`.
                    let priority = new_cost + current.manhattan(next) as f32;
                    self.push(next, priority, new_cost);
                    self.came_from.insert(next, current);
                }
            }
        };

        near.clear();
        self.near = near;
        result
    }

    fn push(&mut self, node: PathNode, priority: f32, cost: f32) {
        self.open.push(OpenEntry {
            priority,
            sequence: self.sequence,
            node,
            cost,
        });
        self.sequence += 1;
    }

    /// Follow backlinks from `end` to the root (which links to itself)
    fn trace_path(&self, end: PathNode) -> Vec<PathNode> {
        let mut path = vec![end];
        let mut child = end;
        while let Some(&previous) = self.came_from.get(&child) {
            if previous == child {
                break;
            }
            path.push(previous);
            child = previous;
        }
        path.reverse();
        path
    }

    fn clear(&mut self) {
        self.open.clear();
        self.came_from.clear();
        self.cost_so_far.clear();
        self.near.clear();
        self.sequence = 0;
    }
}

impl JobProcessor<PathJob, PathfindingResult> for PathProcessor {
    fn process(&mut self, job: PathJob) -> Result<PathfindingResult, JobError> {
        let map = self.map.upgrade();
        Ok(self.solve(job.start, job.end, map.as_deref()))
    }
}

#[inline]
fn step_cost(from: PathNode, to: PathNode, from_cost: f32, to_cost: f32) -> f32 {
    if from.is_diagonal_to(to) {
        path_config::HALF_ROOT_2 * (from_cost + to_cost)
    } else {
        0.5 * from_cost + 0.5 * to_cost
    }
}

/// Walkable neighbours of `node` with their tile costs, without corner cutting
fn collect_neighbours(node: PathNode, map: &dyn TileOracle, near: &mut Vec<(PathNode, f32)>) {
    near.clear();

    let check = |dx: i32, dy: i32, near: &mut Vec<(PathNode, f32)>| -> bool {
        // Past the edge of the grid counts as blocked
        let Some(next) = node.offset(dx, dy) else {
            return false;
        };
        let data = map.walk_data(next.x, next.y);
        if data.walkable {
            near.push((next, data.cost));
        }
        data.walkable
    };

    let left = check(-1, 0, near);
    let right = check(1, 0, near);
    let above = check(0, 1, near);
    let below = check(0, -1, near);

    if left && above {
        check(-1, 1, near);
    }
    if right && above {
        check(1, 1, near);
    }
    if left && below {
        check(-1, -1, near);
    }
    if right && below {
        check(1, -1, near);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::{ChunkedTileMap, Tile, WalkData};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::Arc;

    fn open_grid(width: i32, height: i32) -> ChunkedTileMap {
        let map = ChunkedTileMap::new();
        map.fill_rect(0, 0, width, height, Tile::GROUND);
        map
    }

    fn random_map(seed: u64, size: i32, blocked_chance: f64) -> ChunkedTileMap {
        let mut rng = StdRng::seed_from_u64(seed);
        let map = open_grid(size, size);
        for y in 0..size {
            for x in 0..size {
                if rng.random_bool(blocked_chance) {
                    map.set_tile(x, y, Tile::BLOCKED);
                }
            }
        }
        map
    }

    fn detached_processor() -> PathProcessor {
        let map: Arc<dyn TileOracle> = Arc::new(ChunkedTileMap::new());
        PathProcessor::new(Arc::downgrade(&map))
    }

    fn assert_valid_path(path: &[PathNode], map: &dyn TileOracle) {
        for pair in path.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert_eq!(a.chebyshev(b), 1, "{a} -> {b} is not a single step");
            assert!(map.walk_data(b.x, b.y).walkable);
            if a.is_diagonal_to(b) {
                assert!(map.walk_data(b.x, a.y).walkable, "corner cut at {a} -> {b}");
                assert!(map.walk_data(a.x, b.y).walkable, "corner cut at {a} -> {b}");
            }
        }
    }

    #[test]
    fn test_open_grid_diagonal() {
        let map = open_grid(10, 10);
        let mut processor = detached_processor();

        let result = processor.solve(PathNode::new(0, 0), PathNode::new(9, 9), Some(&map));
        assert_eq!(result.status, PathState::Successful);

        let path = result.path.unwrap();
        assert_eq!(path.len(), 10);
        for (i, node) in path.iter().enumerate() {
            assert_eq!(*node, PathNode::new(i as i32, i as i32));
        }
        assert!((result.cost - 9.0 * path_config::ROOT_2).abs() < 1e-3);
    }

    #[test]
    fn test_start_is_end() {
        let map = open_grid(4, 4);
        let result = detached_processor().solve(PathNode::new(0, 0), PathNode::new(0, 0), Some(&map));
        assert_eq!(result.status, PathState::ErrorStartIsEnd);
        assert!(result.path.is_none());
    }

    #[test]
    fn test_unwalkable_endpoints_checked_start_first() {
        let map = open_grid(4, 4);
        map.set_tile(0, 0, Tile::BLOCKED);
        map.set_tile(3, 3, Tile::BLOCKED);
        let mut processor = detached_processor();

        let both = processor.solve(PathNode::new(0, 0), PathNode::new(3, 3), Some(&map));
        assert_eq!(both.status, PathState::ErrorStartNotWalkable);

        let end_only = processor.solve(PathNode::new(1, 1), PathNode::new(3, 3), Some(&map));
        assert_eq!(end_only.status, PathState::ErrorEndNotWalkable);
        assert!(end_only.path.is_none());

        // Walkability wins over start == end
        let same = processor.solve(PathNode::new(0, 0), PathNode::new(0, 0), Some(&map));
        assert_eq!(same.status, PathState::ErrorStartNotWalkable);
    }

    #[test]
    fn test_missing_map_is_internal_error() {
        let result = detached_processor().solve(PathNode::new(0, 0), PathNode::new(1, 1), None);
        assert_eq!(result.status, PathState::ErrorInternal);
        assert!(result.path.is_none());
    }

    #[test]
    fn test_dropped_map_is_internal_error() {
        let map = Arc::new(open_grid(4, 4));
        let weak: Weak<ChunkedTileMap> = Arc::downgrade(&map);
        let weak: Weak<dyn TileOracle> = weak;
        let mut processor = PathProcessor::new(weak);

        let job = PathJob {
            start: PathNode::new(0, 0),
            end: PathNode::new(3, 3),
        };
        assert_eq!(processor.process(job).unwrap().status, PathState::Successful);

        drop(map);
        assert_eq!(processor.process(job).unwrap().status, PathState::ErrorInternal);
    }

    #[test]
    fn test_diagonal_gap_is_not_crossed() {
        let map = ChunkedTileMap::new();
        map.set_tile(0, 0, Tile::GROUND);
        map.set_tile(1, 1, Tile::GROUND);

        let result = detached_processor().solve(PathNode::new(0, 0), PathNode::new(1, 1), Some(&map));
        assert_eq!(result.status, PathState::ErrorInternal);
        assert!(result.path.is_none());
    }

    #[test]
    fn test_routes_around_diagonal_gap() {
        let map = open_grid(5, 5);
        map.set_tile(2, 1, Tile::BLOCKED);
        map.set_tile(1, 2, Tile::BLOCKED);

        let result = detached_processor().solve(PathNode::new(1, 1), PathNode::new(2, 2), Some(&map));
        assert_eq!(result.status, PathState::Successful);

        let path = result.path.unwrap();
        assert!(path.len() > 2);
        assert_eq!(path.first(), Some(&PathNode::new(1, 1)));
        assert_eq!(path.last(), Some(&PathNode::new(2, 2)));
        assert_valid_path(&path, &map);
    }

    #[test]
    fn test_expensive_tiles_are_avoided() {
        let map = open_grid(5, 3);
        map.set_tile(2, 1, Tile::walkable(10.0));

        let result = detached_processor().solve(PathNode::new(0, 1), PathNode::new(4, 1), Some(&map));
        assert_eq!(result.status, PathState::Successful);

        let path = result.path.unwrap();
        assert!(!path.contains(&PathNode::new(2, 1)));
        assert_valid_path(&path, &map);
        assert!(result.cost < 5.0);
    }

    #[test]
    fn test_open_field_hits_capacity() {
        let plane = |_x: i32, _y: i32| WalkData {
            walkable: true,
            cost: 1.0,
        };
        let mut processor = detached_processor();

        let result = processor.solve(PathNode::new(0, 0), PathNode::new(5000, 0), Some(&plane));
        assert_eq!(result.status, PathState::ErrorPathTooLong);
        assert!(result.path.is_none());

        // Scratch is reset for the next job
        assert!(processor.open.is_empty());
        assert!(processor.came_from.is_empty());
        assert!(processor.cost_so_far.is_empty());
    }

    #[test]
    fn test_small_capacity_rejects_short_searches() {
        let map = open_grid(32, 32);
        let dead: Arc<dyn TileOracle> = Arc::new(ChunkedTileMap::new());
        let mut processor = PathProcessor::with_max_open(Arc::downgrade(&dead), 16);

        let result = processor.solve(PathNode::new(0, 0), PathNode::new(31, 31), Some(&map));
        assert_eq!(result.status, PathState::ErrorPathTooLong);

        let near = processor.solve(PathNode::new(0, 0), PathNode::new(1, 1), Some(&map));
        assert_eq!(near.status, PathState::Successful);
    }

    #[test]
    fn test_search_at_edge_of_grid() {
        let plane = |_x: i32, _y: i32| WalkData {
            walkable: true,
            cost: 1.0,
        };
        let mut processor = detached_processor();

        let result = processor.solve(PathNode::new(i32::MAX, 0), PathNode::new(i32::MAX - 3, 0), Some(&plane));
        assert_eq!(result.status, PathState::Successful);
        let path = result.path.unwrap();
        assert_eq!(path.len(), 4);
        assert!((result.cost - 3.0).abs() < 1e-3);

        let corner = processor.solve(
            PathNode::new(i32::MIN, i32::MIN),
            PathNode::new(i32::MIN + 2, i32::MIN + 2),
            Some(&plane),
        );
        assert_eq!(corner.status, PathState::Successful);
        assert_eq!(corner.len(), 3);
    }

    #[test]
    fn test_chunk_map_edge_of_grid() {
        let map = ChunkedTileMap::new();
        map.fill_rect(i32::MAX - 4, -2, 5, 5, Tile::GROUND);

        let result = detached_processor().solve(PathNode::new(i32::MAX, 0), PathNode::new(i32::MAX - 3, 0), Some(&map));
        assert_eq!(result.status, PathState::Successful);
        assert_valid_path(&result.path.unwrap(), &map);
    }

    #[test]
    fn test_uniform_grid_paths_are_chebyshev_optimal() {
        let map = open_grid(24, 24);
        let mut rng = StdRng::seed_from_u64(7);
        let mut processor = detached_processor();

        for _ in 0..40 {
            let start = PathNode::new(rng.random_range(0..24), rng.random_range(0..24));
            let end = PathNode::new(rng.random_range(0..24), rng.random_range(0..24));
            if start == end {
                continue;
            }

            let result = processor.solve(start, end, Some(&map));
            assert_eq!(result.status, PathState::Successful, "{start} -> {end}");
            let path = result.path.unwrap();
            assert_eq!(path.len(), start.chebyshev(end) as usize + 1, "{start} -> {end}");
            assert_valid_path(&path, &map);
        }
    }

    #[test]
    fn test_solver_is_deterministic() {
        let map = random_map(42, 40, 0.25);
        map.set_tile(0, 0, Tile::GROUND);
        map.set_tile(39, 39, Tile::GROUND);

        let mut reused = detached_processor();
        let first = reused.solve(PathNode::new(0, 0), PathNode::new(39, 39), Some(&map));
        let second = reused.solve(PathNode::new(0, 0), PathNode::new(39, 39), Some(&map));
        let fresh = detached_processor().solve(PathNode::new(0, 0), PathNode::new(39, 39), Some(&map));

        assert_eq!(first, second);
        assert_eq!(first, fresh);
        if let Some(path) = &first.path {
            assert_valid_path(path, &map);
        }
    }

    #[test]
    fn test_random_maps_never_cut_corners() {
        for seed in 0..10 {
            let map = random_map(seed, 30, 0.3);
            map.set_tile(0, 0, Tile::GROUND);
            map.set_tile(29, 29, Tile::GROUND);

            let result = detached_processor().solve(PathNode::new(0, 0), PathNode::new(29, 29), Some(&map));
            match result.status {
                PathState::Successful => assert_valid_path(&result.path.unwrap(), &map),
                PathState::ErrorInternal | PathState::ErrorPathTooLong => assert!(result.path.is_none()),
                other => panic!("unexpected status {other}"),
            }
        }
    }
}
