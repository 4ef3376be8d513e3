//! Continuous and block-grid coordinates.
//!
//! Entities live at continuous [`Vec3`] positions; terrain and construction
//! placements use integer [`BlockPos`] cells. A block at `(x, y, z)` occupies
//! the unit cube from `(x, y, z)` to `(x + 1, y + 1, z + 1)`, so an entity
//! standing on it has feet at `y + 1`.

use serde::{Deserialize, Serialize};

/// A point in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Vec3 {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Create a point from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }

    /// Distance ignoring the vertical axis.
    pub fn horizontal_distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        dx.hypot(dz)
    }

    /// Offset this point by the given deltas.
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Return a copy with a different vertical coordinate.
    pub const fn with_y(self, y: f64) -> Self {
        Self::new(self.x, y, self.z)
    }

    /// The block cell containing this point.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_block(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Unit vector in the horizontal plane pointing from `self` to `other`.
    ///
    /// Returns `None` when the two points share the same column.
    pub fn horizontal_direction_to(self, other: Self) -> Option<(f64, f64)> {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        let len = dx.hypot(dz);
        if len < 1e-6 {
            return None;
        }
        Some((dx / len, dz / len))
    }
}

impl core::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl core::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl core::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// An integer block cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// East-west axis.
    pub x: i32,
    /// Vertical axis.
    pub y: i32,
    /// North-south axis.
    pub z: i32,
}

/// The eight lateral neighbor offsets, clockwise from north.
pub const LATERAL_DIRECTIONS: [(i32, i32); 8] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// The six face-adjacent neighbor offsets.
pub const FACE_NEIGHBORS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

impl BlockPos {
    /// Create a block position from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by the given deltas, saturating at the `i32` range.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.z.saturating_add(dz),
        )
    }

    /// The cell directly above.
    pub const fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// The cell directly below.
    pub const fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    /// Center of the block's top face, where an entity standing on it
    /// would have its feet.
    pub fn top_center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 1.0,
            f64::from(self.z) + 0.5,
        )
    }

    /// Center of the block volume.
    pub fn center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }

    /// The six face-adjacent neighbors.
    pub fn face_neighbors(self) -> impl Iterator<Item = Self> {
        FACE_NEIGHBORS
            .into_iter()
            .map(move |(dx, dy, dz)| self.offset(dx, dy, dz))
    }
}

impl core::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}
