use std::fmt;

/// Grid coordinate visited by the search. Compared and hashed by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PathNode {
    pub x: i32,
    pub y: i32,
}

impl PathNode {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset by (dx, dy). None past the edge of the i32 grid.
    #[inline]
    pub fn offset(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?))
    }

    /// |dx| + |dy|
    #[inline]
    pub fn manhattan(self, other: PathNode) -> u64 {
        u64::from(self.x.abs_diff(other.x)) + u64::from(self.y.abs_diff(other.y))
    }

    /// max(|dx|, |dy|): number of 8-directional steps between two nodes
    #[inline]
    pub fn chebyshev(self, other: PathNode) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// True if `other` is one diagonal step away
    #[inline]
    pub fn is_diagonal_to(self, other: PathNode) -> bool {
        self.x.abs_diff(other.x) == 1 && self.y.abs_diff(other.y) == 1
    }
}

impl From<(i32, i32)> for PathNode {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl From<PathNode> for (i32, i32) {
    fn from(node: PathNode) -> Self {
        (node.x, node.y)
    }
}

impl fmt::Display for PathNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
