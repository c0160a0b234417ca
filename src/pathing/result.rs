use std::fmt;

use super::node::PathNode;
use crate::threading::Outcome;

/// Algorithm-level result of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PathState {
    /// Map unavailable, or the search ran out of nodes without reaching the end
    #[default]
    ErrorInternal,
    ErrorStartNotWalkable,
    ErrorEndNotWalkable,
    ErrorStartIsEnd,
    /// Frontier hit its capacity before the end was found
    ErrorPathTooLong,
    Successful,
}

impl PathState {
    pub fn is_success(self) -> bool {
        self == PathState::Successful
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathState::ErrorInternal => "ERROR_INTERNAL",
            PathState::ErrorStartNotWalkable => "ERROR_START_NOT_WALKABLE",
            PathState::ErrorEndNotWalkable => "ERROR_END_NOT_WALKABLE",
            PathState::ErrorStartIsEnd => "ERROR_START_IS_END",
            PathState::ErrorPathTooLong => "ERROR_PATH_TOO_LONG",
            PathState::Successful => "SUCCESSFUL",
        }
    }
}

impl fmt::Display for PathState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pathfinding result delivered to the requester
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathfindingResult {
    /// Start to end inclusive; `None` unless `status` is `Successful`
    pub path: Option<Vec<PathNode>>,
    pub status: PathState,
    /// Accumulated movement cost of `path` (0.0 when there is no path)
    pub cost: f32,
}

impl PathfindingResult {
    pub fn failed(status: PathState) -> Self {
        Self {
            path: None,
            status,
            cost: 0.0,
        }
    }

    pub fn found(path: Vec<PathNode>, cost: f32) -> Self {
        Self {
            path: Some(path),
            status: PathState::Successful,
            cost,
        }
    }

    /// Number of nodes in the path, endpoints included
    pub fn len(&self) -> usize {
        self.path.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Job input handed to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathJob {
    pub start: PathNode,
    pub end: PathNode,
}

/// Completion callback for a path request
pub type PathCallback = Box<dyn FnOnce(Outcome, PathfindingResult) + Send + 'static>;

/// Caller-side request: endpoints plus what to do with the answer
pub struct PathfindingRequest {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub on_completed: PathCallback,
}

impl PathfindingRequest {
    pub fn new<F>(start_x: i32, start_y: i32, end_x: i32, end_y: i32, on_completed: F) -> Self
    where
        F: FnOnce(Outcome, PathfindingResult) + Send + 'static,
    {
        Self {
            start_x,
            start_y,
            end_x,
            end_y,
            on_completed: Box::new(on_completed),
        }
    }

    pub fn job(&self) -> PathJob {
        PathJob {
            start: PathNode::new(self.start_x, self.start_y),
            end: PathNode::new(self.end_x, self.end_y),
        }
    }
}

impl fmt::Debug for PathfindingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathfindingRequest")
            .field("start", &(self.start_x, self.start_y))
            .field("end", &(self.end_x, self.end_y))
            .finish_non_exhaustive()
    }
}
