//! Axis-aligned bounding volumes
//!
//! Boxes here are always non-empty: "no geometry" is expressed as
//! `Option::None` by the code that builds them, never as inverted sentinel
//! extents.

use super::math::{Vec2, Vec3};

/// Axis-aligned bounding box in 3D
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3D {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Box3D {
    /// Create a new box from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Degenerate box enclosing a single point
    pub fn from_point(point: Vec3) -> Self {
        Self { min: point, max: point }
    }

    /// Smallest box enclosing every point, or `None` for an empty iterator
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut result = Self::from_point(first);
        for point in iter {
            result.expand_to_include(point);
        }
        Some(result)
    }

    /// Grow the box so it encloses `point`
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Smallest box enclosing both boxes
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Box moved by `offset`
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the box
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y &&
        point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this box contains another box entirely
    pub fn contains_box(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y &&
        self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Drop the Z axis
    pub fn to_2d(&self) -> Box2D {
        Box2D::new(self.min.xy(), self.max.xy())
    }
}

/// Axis-aligned bounding box in 2D
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box2D {
    /// Minimum corner
    pub min: Vec2,
    /// Maximum corner
    pub max: Vec2,
}

impl Box2D {
    /// Create a new box from min and max points
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Degenerate box enclosing a single point
    pub fn from_point(point: Vec2) -> Self {
        Self { min: point, max: point }
    }

    /// Grow the box so it encloses `point`
    pub fn expand_to_include(&mut self, point: Vec2) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Smallest box enclosing both boxes
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Union of two optional boxes
    pub fn union_opt(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, None) => a,
            (None, b) => b,
        }
    }

    /// Box moved by `offset`
    pub fn translated(&self, offset: Vec2) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Width and height
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Get the center of the box
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// The four corners, counter-clockwise from `min`
    pub fn corners(&self) -> [Vec2; 4] {
        [
            self.min,
            Vec2::new(self.max.x, self.min.y),
            self.max,
            Vec2::new(self.min.x, self.max.y),
        ]
    }

    /// Distance from the origin to the farthest corner
    pub fn max_distance_from_origin(&self) -> f32 {
        self.corners()
            .iter()
            .map(|c| c.magnitude())
            .fold(0.0, f32::max)
    }

    /// Check if this box contains a point
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x &&
        point.y >= self.min.y && point.y <= self.max.y
    }

    /// Check if this box contains another box entirely
    pub fn contains_box(&self, other: &Self) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Check if this box intersects another box
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x &&
        self.min.y <= other.max.y && self.max.y >= other.min.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box3d_contains_point() {
        let aabb = Box3D::new(
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
        );

        assert!(aabb.contains_point(Vec3::zeros()));
        assert!(aabb.contains_point(Vec3::new(0.5, 0.5, 0.5)));
        assert!(!aabb.contains_point(Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn test_box3d_intersects() {
        let a = Box3D::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let b = Box3D::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));
        let c = Box3D::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(7.0, 7.0, 7.0));

        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_from_points_empty_is_none() {
        assert!(Box3D::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_box2d_union_and_translate() {
        let a = Box2D::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Box2D::new(Vec2::new(-1.0, 0.5), Vec2::new(0.5, 3.0));

        let joined = a.union(&b);
        assert_eq!(joined.min, Vec2::new(-1.0, 0.0));
        assert_eq!(joined.max, Vec2::new(1.0, 3.0));
        assert!(joined.contains_box(&a) && joined.contains_box(&b));

        let moved = a.translated(Vec2::new(2.0, -1.0));
        assert_eq!(moved.min, Vec2::new(2.0, -1.0));
        assert_eq!(moved.max, Vec2::new(3.0, 0.0));
    }

    #[test]
    fn test_union_opt() {
        let a = Box2D::from_point(Vec2::new(1.0, 1.0));
        assert_eq!(Box2D::union_opt(None, None), None);
        assert_eq!(Box2D::union_opt(Some(a), None), Some(a));
        assert_eq!(Box2D::union_opt(None, Some(a)), Some(a));
    }

    #[test]
    fn test_max_distance_from_origin() {
        let b = Box2D::new(Vec2::new(-3.0, 0.0), Vec2::new(1.0, 4.0));
        assert!((b.max_distance_from_origin() - 5.0).abs() < 1e-6);
    }
}
