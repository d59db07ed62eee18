//! Scene lights and fog
//!
//! Plain state carried by [`Op::Light`](super::Op::Light) and
//! [`Op::Fog`](super::Op::Fog). The renderer decides how to shade with them.

use crate::foundation::math::{Color, Vec3};

/// Light source category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Uniform light from every direction
    Ambient,
    /// Light from infinitely far away (like sunlight)
    Directional,
    /// Light radiating from a position (like a lightbulb)
    Point,
}

impl LightKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::Ambient => 0,
            Self::Directional => 1,
            Self::Point => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Ambient),
            1 => Some(Self::Directional),
            2 => Some(Self::Point),
            _ => None,
        }
    }
}

/// Light source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Light category
    pub kind: LightKind,
    /// Diffuse colour
    pub color: Color,
    /// Ambient contribution
    pub ambient: Color,
    /// Position for point lights, direction for directional lights
    pub position: Vec3,
    /// Constant, linear and quadratic attenuation factors
    pub attenuation: [f32; 3],
}

impl Light {
    /// Ambient-only light
    pub fn ambient(color: Color) -> Self {
        Self {
            kind: LightKind::Ambient,
            color: Color::BLACK,
            ambient: color,
            position: Vec3::zeros(),
            attenuation: [1.0, 0.0, 0.0],
        }
    }

    /// Directional light shining along `direction`
    pub fn directional(direction: Vec3, color: Color) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            ambient: Color::BLACK,
            position: direction,
            attenuation: [1.0, 0.0, 0.0],
        }
    }

    /// Point light at `position`
    pub fn point(position: Vec3, color: Color, attenuation: [f32; 3]) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            ambient: Color::BLACK,
            position,
            attenuation,
        }
    }
}

/// How fog density grows with distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FogMode {
    /// `exp(-density * distance)`
    Exponential(f32),
    /// Linear ramp between two distances
    Linear {
        /// Distance where fog starts
        start: f32,
        /// Distance where fog is opaque
        end: f32,
    },
}

/// Distance fog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fog {
    /// Fog colour
    pub color: Color,
    /// Density model
    pub mode: FogMode,
}

impl Fog {
    /// Exponential fog
    pub fn exponential(color: Color, density: f32) -> Self {
        Self {
            color,
            mode: FogMode::Exponential(density),
        }
    }

    /// Linear fog between `start` and `end`
    pub fn linear(color: Color, start: f32, end: f32) -> Self {
        Self {
            color,
            mode: FogMode::Linear { start, end },
        }
    }
}
