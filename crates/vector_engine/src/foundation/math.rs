//! Math utilities and types
//!
//! Provides the fundamental math types used by display lists, the render
//! queue and the sprite hierarchy.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

use bytemuck::{Pod, Zeroable};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// RGBA colour with components in `[0, 1]`
///
/// Plain-old-data so it can be written into a display list verbatim.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Color {
    /// Red component
    pub r: f32,
    /// Green component
    pub g: f32,
    /// Blue component
    pub b: f32,
    /// Alpha component
    pub a: f32,
}

impl Color {
    /// Opaque white
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    /// Opaque black
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    /// Opaque red
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    /// Opaque green
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    /// Opaque blue
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    /// Fully transparent black
    pub const CLEAR: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a colour from its components
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// 2D transform: translation, rotation about Z and non-uniform scale
///
/// The matrix form applies scale first, then rotation, then translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D {
    /// Translation in parent space
    pub position: Vec2,
    /// Counter-clockwise rotation in radians
    pub angle: f32,
    /// Scale factors
    pub scale: Vec2,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            position: Vec2::zeros(),
            angle: 0.0,
            scale: Vec2::new(1.0, 1.0),
        }
    }
}

impl Transform2D {
    /// Identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Translation-only transform
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Translation and rotation
    pub fn from_position_angle(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            angle,
            ..Default::default()
        }
    }

    /// Convert to a homogeneous 4x4 matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&Vec3::new(self.position.x, self.position.y, 0.0))
            * Mat4::rotation_z(self.angle)
            * Mat4::new_nonuniform_scaling(&Vec3::new(self.scale.x, self.scale.y, 1.0))
    }

    /// Map a point from local space into parent space
    pub fn apply_to(&self, point: Vec2) -> Vec2 {
        let scaled = point.component_mul(&self.scale);
        let (sin, cos) = self.angle.sin_cos();
        Vec2::new(
            cos * scaled.x - sin * scaled.y,
            sin * scaled.x + cos * scaled.y,
        ) + self.position
    }

    /// Map a point from parent space into local space
    pub fn apply_inverse_to(&self, point: Vec2) -> Vec2 {
        let delta = point - self.position;
        let (sin, cos) = self.angle.sin_cos();
        let unrotated = Vec2::new(
            cos * delta.x + sin * delta.y,
            -sin * delta.x + cos * delta.y,
        );
        Vec2::new(unrotated.x / self.scale.x, unrotated.y / self.scale.y)
    }

    /// Largest absolute scale factor
    pub fn max_scale(&self) -> f32 {
        self.scale.x.abs().max(self.scale.y.abs())
    }

    /// Smallest absolute scale factor
    pub fn min_scale(&self) -> f32 {
        self.scale.x.abs().min(self.scale.y.abs())
    }
}

/// 3D placement carried by `PushTransform3D`
///
/// Same composition order as [`Transform2D`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    /// Translation in parent space
    pub position: Vec3,
    /// Orientation
    pub rotation: Quat,
    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform3D {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform3D {
    /// Translation-only transform
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a homogeneous 4x4 matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Math utility functions
pub mod utils {
    use super::{Mat4, Point3, Vec3};

    /// Transform a point by a homogeneous matrix
    pub fn transform_point(matrix: &Mat4, point: &Vec3) -> Vec3 {
        matrix.transform_point(&Point3::from(*point)).coords
    }
}

/// Extension trait for Mat4 with additional convenience methods
pub trait Mat4Ext {
    /// Create a rotation matrix around the Z axis
    fn rotation_z(angle: f32) -> Mat4;

    /// Create a perspective projection matrix
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an orthographic projection matrix centred on the origin
    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn rotation_z(angle: f32) -> Mat4 {
        Mat4::from_axis_angle(&Vec3::z_axis(), angle)
    }

    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // Depth maps to [0, 1]:
        // P = [a⁻¹/tan(φ/2)    0              0          0         ]
        //     [0               1/tan(φ/2)     0          0         ]
        //     [0               0              f/(f-n)    -nf/(f-n) ]
        //     [0               0              1          0         ]
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (far - near);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = 1.0;

        result
    }

    fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / width;
        result[(1, 1)] = 2.0 / height;
        result[(2, 2)] = 1.0 / (far - near);
        result[(2, 3)] = -near / (far - near);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_transform_2d_matrix_matches_apply() {
        let transform = Transform2D {
            position: Vec2::new(3.0, -2.0),
            angle: constants::HALF_PI,
            scale: Vec2::new(2.0, 0.5),
        };
        let point = Vec2::new(1.0, 4.0);

        let by_matrix = utils::transform_point(&transform.to_matrix(), &Vec3::new(point.x, point.y, 0.0));
        let by_apply = transform.apply_to(point);

        assert_relative_eq!(by_matrix.x, by_apply.x, epsilon = EPSILON);
        assert_relative_eq!(by_matrix.y, by_apply.y, epsilon = EPSILON);
    }

    #[test]
    fn test_transform_2d_inverse_round_trip() {
        let transform = Transform2D {
            position: Vec2::new(-5.0, 7.0),
            angle: 0.7,
            scale: Vec2::new(3.0, 1.5),
        };
        let point = Vec2::new(0.25, -9.0);

        let back = transform.apply_inverse_to(transform.apply_to(point));
        assert_relative_eq!(back, point, epsilon = EPSILON);
    }

    #[test]
    fn test_transform_3d_translation() {
        let transform = Transform3D::from_position(Vec3::new(1.0, 2.0, 3.0));
        let moved = utils::transform_point(&transform.to_matrix(), &Vec3::zeros());
        assert_relative_eq!(moved, Vec3::new(1.0, 2.0, 3.0), epsilon = EPSILON);
    }

    #[test]
    fn test_orthographic_maps_edges_to_unit() {
        let ortho = Mat4::orthographic(20.0, 10.0, -1.0, 1.0);
        let corner = utils::transform_point(&ortho, &Vec3::new(10.0, 5.0, 0.0));
        assert_relative_eq!(corner.x, 1.0, epsilon = EPSILON);
        assert_relative_eq!(corner.y, 1.0, epsilon = EPSILON);
    }
}
