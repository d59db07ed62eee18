//! # Cameras
//!
//! Camera state a [`Scene`](crate::scene::Scene) turns into projection and
//! camera-transform opcodes, plus the visibility tests entities use to skip
//! off-screen work.
//!
//! ## Coordinate System
//!
//! Right-handed, Y-up. In view space the camera looks down +Z, matching
//! [`Mat4Ext::perspective`], which maps depth to `[0, 1]`.
//!
//! ## 2D visibility
//!
//! A 2D camera exposes a [`VisibilityRegion`]: the circle enclosing what it
//! can see. Sprites carry that region down the tree, converting it into each
//! child's local space, so every `on_screen` test is a single distance check.

use serde::{Deserialize, Serialize};

use crate::foundation::bounds::Box3D;
use crate::foundation::math::{constants, Mat4, Mat4Ext, Quat, Transform2D, Vec2, Vec3, Vec4};

/// Physical orientation of the display
///
/// Each preset rotates the whole 2D scene so "up" stays up for the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenOrientation {
    /// Device upright
    #[default]
    Portrait,
    /// Device upside down
    PortraitUpsideDown,
    /// Device rotated so its top points left
    LandscapeLeft,
    /// Device rotated so its top points right
    LandscapeRight,
}

impl ScreenOrientation {
    /// Rotation about Z applied ahead of the camera, in radians
    pub fn angle(self) -> f32 {
        match self {
            Self::Portrait => 0.0,
            Self::PortraitUpsideDown => constants::PI,
            Self::LandscapeLeft => constants::HALF_PI,
            Self::LandscapeRight => -constants::HALF_PI,
        }
    }

    /// Whether width and height swap on screen
    pub fn is_landscape(self) -> bool {
        matches!(self, Self::LandscapeLeft | Self::LandscapeRight)
    }

    /// Rotation matrix for this orientation
    pub fn rotation_matrix(self) -> Mat4 {
        Mat4::rotation_z(self.angle())
    }
}

/// Circle enclosing what is visible, expressed in some local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityRegion {
    /// Centre of the visible area
    pub center: Vec2,
    /// Radius enclosing the visible area
    pub radius: f32,
}

impl VisibilityRegion {
    /// Region that accepts everything
    pub const UNBOUNDED: Self = Self {
        center: Vec2::new(0.0, 0.0),
        radius: f32::INFINITY,
    };

    /// Create a region
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Whether a circle overlaps the region
    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        (center - self.center).norm() <= self.radius + radius
    }

    /// The same region seen from inside a child with local `transform`
    ///
    /// Radius shrinks by the child's smallest scale factor so the test stays
    /// conservative under non-uniform scale.
    pub fn to_local(&self, transform: &Transform2D) -> Self {
        let scale = transform.min_scale();
        let radius = if scale > 0.0 { self.radius / scale } else { f32::INFINITY };
        Self {
            center: transform.apply_inverse_to(self.center),
            radius,
        }
    }
}

/// Orthographic 2D camera
///
/// `field_of_view` is the visible height in world units; the visible width
/// follows from `aspect_ratio`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera2D {
    /// Camera centre in world space
    pub position: Vec2,
    /// Rotation in radians
    pub angle: f32,
    /// Visible height in world units
    pub field_of_view: f32,
    /// Width / height of the viewport
    pub aspect_ratio: f32,
    /// World units per second applied by [`Camera2D::update`]
    pub velocity: Vec2,
}

impl Camera2D {
    /// Depth range of the orthographic projection
    pub const DEPTH_RANGE: f32 = 1000.0;

    /// Camera at the origin showing `field_of_view` units vertically
    pub fn new(field_of_view: f32, aspect_ratio: f32) -> Self {
        Self {
            position: Vec2::zeros(),
            angle: 0.0,
            field_of_view,
            aspect_ratio,
            velocity: Vec2::zeros(),
        }
    }

    /// Camera placement as a 2D transform
    pub fn transform(&self) -> Transform2D {
        Transform2D::from_position_angle(self.position, self.angle)
    }

    /// Camera world matrix
    pub fn camera_transform(&self) -> Mat4 {
        self.transform().to_matrix()
    }

    /// World-to-camera matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::rotation_z(-self.angle)
            * Mat4::new_translation(&Vec3::new(-self.position.x, -self.position.y, 0.0))
    }

    /// Visible width in world units
    pub fn width(&self) -> f32 {
        self.field_of_view * self.aspect_ratio
    }

    /// Orthographic projection covering the visible area
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::orthographic(self.width(), self.field_of_view, -Self::DEPTH_RANGE, Self::DEPTH_RANGE)
    }

    /// Circle enclosing the visible area in world space
    pub fn visibility_region(&self) -> VisibilityRegion {
        let half = Vec2::new(self.width(), self.field_of_view) * 0.5;
        VisibilityRegion::new(self.position, half.norm())
    }

    /// Advance the camera by its velocity
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self::new(1000.0, 16.0 / 9.0)
    }
}

/// 3D projection model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionType {
    /// Perspective projection using the field of view angle
    #[default]
    Perspective,
    /// Orthographic projection; the field of view is the visible height
    Orthographic,
}

/// 3D camera with quaternion orientation
#[derive(Debug, Clone, PartialEq)]
pub struct Camera3D {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera orientation; local +Z is the view direction
    pub orientation: Quat,
    /// Vertical field of view in radians, or visible height when orthographic
    pub fov: f32,
    /// Distance to near clipping plane
    pub near: f32,
    /// Distance to far clipping plane
    pub far: f32,
    /// Width / height of the viewport
    pub aspect_ratio: f32,
    /// Projection model
    pub projection_type: ProjectionType,
    /// World units per second applied by [`Camera3D::update`]
    pub velocity: Vec3,
}

impl Camera3D {
    /// Perspective camera at `position` looking down +Z
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect_ratio: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            orientation: Quat::identity(),
            fov: fov_degrees * constants::DEG_TO_RAD,
            near,
            far,
            aspect_ratio,
            projection_type: ProjectionType::Perspective,
            velocity: Vec3::zeros(),
        }
    }

    /// Turn the camera to face `target`
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let direction = target - self.position;
        if direction.norm_squared() <= f32::EPSILON {
            log::warn!("Camera look_at target coincides with camera position; orientation unchanged");
            return;
        }
        self.orientation = Quat::face_towards(&direction, &up);
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Camera world matrix
    pub fn camera_transform(&self) -> Mat4 {
        Mat4::new_translation(&self.position) * self.orientation.to_homogeneous()
    }

    /// World-to-camera matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.orientation.inverse().to_homogeneous() * Mat4::new_translation(&-self.position)
    }

    /// Projection matrix for the current projection model
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection_type {
            ProjectionType::Perspective => Mat4::perspective(self.fov, self.aspect_ratio, self.near, self.far),
            ProjectionType::Orthographic => {
                Mat4::orthographic(self.fov * self.aspect_ratio, self.fov, self.near, self.far)
            }
        }
    }

    /// Frustum of everything this camera can see, in world space
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&(self.projection_matrix() * self.view_matrix()))
    }

    /// Advance the camera by its velocity
    pub fn update(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }
}

impl Default for Camera3D {
    fn default() -> Self {
        Self::perspective(Vec3::zeros(), 60.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

/// View frustum for visibility tests
#[derive(Debug, Clone, Copy)]
pub struct Frustum {
    /// Six planes bounding the frustum (left, right, bottom, top, near, far)
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Create a frustum from six planes
    pub fn new(planes: [Plane; 6]) -> Self {
        Self { planes }
    }

    /// Extract frustum planes from a view-projection matrix
    ///
    /// Gribb-Hartmann extraction for clip space with depth in `[0, 1]`.
    /// Plane normals point into the frustum.
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let row = |i: usize| -> Vec4 { matrix.row(i).transpose() };
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Whether a sphere is inside or intersecting the frustum
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(center) >= -radius)
    }

    /// Whether a box is inside or intersecting the frustum
    pub fn intersects_box(&self, bounds: &Box3D) -> bool {
        for plane in &self.planes {
            // Corner furthest along the plane normal
            let mut p = bounds.min;
            if plane.normal.x >= 0.0 { p.x = bounds.max.x; }
            if plane.normal.y >= 0.0 { p.y = bounds.max.y; }
            if plane.normal.z >= 0.0 { p.z = bounds.max.z; }

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

/// Plane defined by normal and distance from origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Normal vector (normalized)
    pub normal: Vec3,
    /// Distance from origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Create a new plane from normal and distance
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal: normal.normalize(), distance }
    }

    /// Plane `ax + by + cz + d = 0`, normalized
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.xyz();
        let length = normal.norm();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self {
            normal: normal / length,
            distance: coefficients.w / length,
        }
    }

    /// Calculate signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }
}
