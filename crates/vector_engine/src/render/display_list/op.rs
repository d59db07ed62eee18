//! Opcode model
//!
//! [`Op`] is the decoded form of one display list entry. [`OpCode`] is its
//! one-byte wire tag; the tag's name is also the label the text importer
//! recognises.

use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Color, Mat4, Transform2D, Transform3D, Vec2, Vec3};
use crate::render::buffer::BufferId;
use crate::render::light::{Fog, Light};
use crate::render::material::MaterialId;

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)*) => {
        /// Wire tag of a display list opcode
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $($(#[$doc])* $name = $value,)*
        }

        impl OpCode {
            /// Every opcode, in tag order
            pub const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            /// Stable name, also used as the record label on import
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Decode a wire tag
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Look an opcode up by its name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($name) => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    /// Set the current colour
    SetColor = 0,
    /// Set the specular colour
    SetSpecularColor = 1,
    /// Bind a texture
    SetTexture = 2,
    /// Unbind the texture
    ClearTexture = 3,
    /// Switch material
    SetMaterial = 4,
    /// Redirect output to a render target
    SetRenderTarget = 5,
    /// Resolve a render target
    ResolveRenderTarget = 6,

    /// Push a 2D transform
    PushTransform = 10,
    /// Push a 3D transform
    PushTransform3D = 11,
    /// Push a translation
    PushTranslation = 12,
    /// Push an arbitrary matrix
    PushMatrix4x4 = 13,
    /// Push a replacement matrix
    SetMatrix4x4 = 14,
    /// Push a replacement set of instance matrices
    SetMatrices4x4 = 15,
    /// Set the world-to-view matrix
    SetWorldToViewMatrix4x4 = 16,
    /// Pop the transform stack
    PopTransform = 17,

    /// Set the camera world matrix
    SetCameraTransform = 20,
    /// Set the projection matrix
    SetProjectionMatrix4x4 = 21,
    /// Set a perspective projection from parameters
    Set3DProjection = 22,

    /// Inline vertex positions
    VertexArray = 30,
    /// Inline normals
    NormalArray = 31,
    /// Inline texture coordinates
    TexelArray = 32,
    /// Inline vertex colours
    ColorArray = 33,
    /// Vertex positions from a buffer
    VertexBuffer = 34,
    /// Normals from a buffer
    NormalBuffer = 35,
    /// Texture coordinates from a buffer
    TexelBuffer = 36,
    /// Vertex colours from a buffer
    ColorBuffer = 37,
    /// Bind an interleaved vertex buffer
    BindBuffer = 38,
    /// Drop the vertex source
    ClearVertexArray = 39,
    /// Drop the normal source
    ClearNormalArray = 40,
    /// Drop the texel source
    ClearTexelArray = 41,
    /// Drop the colour source
    ClearColorArray = 42,
    /// Drop every source
    ClearArrays = 43,

    /// Points by inline indices
    PointsArray = 50,
    /// Line list by inline indices
    LineListArray = 51,
    /// Line strip by inline indices
    LineStripArray = 52,
    /// Triangle list by inline indices
    TriangleListArray = 53,
    /// Triangle strip by inline indices
    TriangleStripArray = 54,
    /// Triangle fan by inline indices
    TriangleFanArray = 55,
    /// Points by index buffer
    PointBuffer = 56,
    /// Line list by index buffer
    LineListBuffer = 57,
    /// Line strip by index buffer
    LineStripBuffer = 58,
    /// Triangle list by index buffer
    TriangleListBuffer = 59,
    /// Triangle strip by index buffer
    TriangleStripBuffer = 60,
    /// Triangle fan by index buffer
    TriangleFanBuffer = 61,

    /// Flat shading
    FlatShading = 70,
    /// Smooth shading
    SmoothShading = 71,
    /// Enable the stencil test
    EnableStencil = 72,
    /// Disable the stencil test
    DisableStencil = 73,
    /// Clear the stencil buffer
    ClearStencil = 74,
    /// Set the viewport
    SetViewport = 75,
    /// Restore the full viewport
    ClearViewport = 76,
    /// Set the scissor rectangle
    SetScissor = 77,
    /// Disable scissoring
    ClearScissor = 78,
    /// Add a light
    Light = 79,
    /// Remove every light
    ClearLights = 80,
    /// Enable fog
    Fog = 81,
    /// Disable fog
    ClearFog = 82,

    /// Debug marker
    Debug = 90,
}

/// Primitive topology of a draw opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    /// Individual points
    Points,
    /// Pairs of vertices
    LineList,
    /// Connected line segments
    LineStrip,
    /// Triples of vertices
    TriangleList,
    /// Strip of triangles sharing edges
    TriangleStrip,
    /// Fan of triangles sharing the first vertex
    TriangleFan,
}

/// One decoded display list entry
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Set the current colour
    SetColor(Color),
    /// Set the specular colour
    SetSpecularColor(Color),
    /// Bind texture by renderer handle
    SetTexture(u32),
    /// Unbind the texture
    ClearTexture,
    /// Switch material
    SetMaterial(MaterialId),
    /// Redirect output to a render target
    SetRenderTarget(u32),
    /// Resolve a render target
    ResolveRenderTarget(u32),

    /// Compose a 2D transform onto the stack
    PushTransform(Transform2D),
    /// Compose a 3D transform onto the stack
    PushTransform3D(Transform3D),
    /// Compose a translation onto the stack
    PushTranslation(Vec3),
    /// Compose a matrix onto the stack
    PushMatrix4x4(Mat4),
    /// Push a matrix that replaces, not composes
    SetMatrix4x4(Mat4),
    /// Push a set of instance matrices that replaces, not composes
    SetMatrices4x4(Vec<Mat4>),
    /// Set the world-to-view matrix
    SetWorldToViewMatrix4x4(Mat4),
    /// Pop one stack entry
    PopTransform,

    /// Camera world matrix
    SetCameraTransform(Mat4),
    /// Projection matrix
    SetProjectionMatrix4x4(Mat4),
    /// Perspective projection from parameters
    Set3DProjection {
        /// Vertical field of view in radians
        fov: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },

    /// Inline vertex positions
    VertexArray(Vec<Vec3>),
    /// Inline normals
    NormalArray(Vec<Vec3>),
    /// Inline texture coordinates
    TexelArray(Vec<Vec2>),
    /// Inline vertex colours
    ColorArray(Vec<Color>),
    /// Vertex positions from a buffer
    VertexBuffer(BufferId),
    /// Normals from a buffer
    NormalBuffer(BufferId),
    /// Texture coordinates from a buffer
    TexelBuffer(BufferId),
    /// Vertex colours from a buffer
    ColorBuffer(BufferId),
    /// Bind an interleaved vertex buffer
    BindBuffer(BufferId),
    /// Drop the vertex source
    ClearVertexArray,
    /// Drop the normal source
    ClearNormalArray,
    /// Drop the texel source
    ClearTexelArray,
    /// Drop the colour source
    ClearColorArray,
    /// Drop every source
    ClearArrays,

    /// Points by inline indices
    PointsArray(Vec<u16>),
    /// Line list by inline indices
    LineListArray(Vec<u16>),
    /// Line strip by inline indices
    LineStripArray(Vec<u16>),
    /// Triangle list by inline indices
    TriangleListArray(Vec<u16>),
    /// Triangle strip by inline indices
    TriangleStripArray(Vec<u16>),
    /// Triangle fan by inline indices
    TriangleFanArray(Vec<u16>),
    /// Points by index buffer
    PointBuffer(BufferId),
    /// Line list by index buffer
    LineListBuffer(BufferId),
    /// Line strip by index buffer
    LineStripBuffer(BufferId),
    /// Triangle list by index buffer
    TriangleListBuffer(BufferId),
    /// Triangle strip by index buffer
    TriangleStripBuffer(BufferId),
    /// Triangle fan by index buffer
    TriangleFanBuffer(BufferId),

    /// Flat shading
    FlatShading,
    /// Smooth shading
    SmoothShading,
    /// Enable the stencil test
    EnableStencil,
    /// Disable the stencil test
    DisableStencil,
    /// Clear the stencil buffer
    ClearStencil,
    /// Set the viewport, in normalized screen coordinates
    SetViewport(Box2D),
    /// Restore the full viewport
    ClearViewport,
    /// Set the scissor rectangle
    SetScissor(Box2D),
    /// Disable scissoring
    ClearScissor,
    /// Add a light
    Light(Light),
    /// Remove every light
    ClearLights,
    /// Enable fog
    Fog(Fog),
    /// Disable fog
    ClearFog,

    /// Debug marker
    Debug(String),
}

impl Op {
    /// Wire tag of this op
    pub fn code(&self) -> OpCode {
        match self {
            Self::SetColor(_) => OpCode::SetColor,
            Self::SetSpecularColor(_) => OpCode::SetSpecularColor,
            Self::SetTexture(_) => OpCode::SetTexture,
            Self::ClearTexture => OpCode::ClearTexture,
            Self::SetMaterial(_) => OpCode::SetMaterial,
            Self::SetRenderTarget(_) => OpCode::SetRenderTarget,
            Self::ResolveRenderTarget(_) => OpCode::ResolveRenderTarget,
            Self::PushTransform(_) => OpCode::PushTransform,
            Self::PushTransform3D(_) => OpCode::PushTransform3D,
            Self::PushTranslation(_) => OpCode::PushTranslation,
            Self::PushMatrix4x4(_) => OpCode::PushMatrix4x4,
            Self::SetMatrix4x4(_) => OpCode::SetMatrix4x4,
            Self::SetMatrices4x4(_) => OpCode::SetMatrices4x4,
            Self::SetWorldToViewMatrix4x4(_) => OpCode::SetWorldToViewMatrix4x4,
            Self::PopTransform => OpCode::PopTransform,
            Self::SetCameraTransform(_) => OpCode::SetCameraTransform,
            Self::SetProjectionMatrix4x4(_) => OpCode::SetProjectionMatrix4x4,
            Self::Set3DProjection { .. } => OpCode::Set3DProjection,
            Self::VertexArray(_) => OpCode::VertexArray,
            Self::NormalArray(_) => OpCode::NormalArray,
            Self::TexelArray(_) => OpCode::TexelArray,
            Self::ColorArray(_) => OpCode::ColorArray,
            Self::VertexBuffer(_) => OpCode::VertexBuffer,
            Self::NormalBuffer(_) => OpCode::NormalBuffer,
            Self::TexelBuffer(_) => OpCode::TexelBuffer,
            Self::ColorBuffer(_) => OpCode::ColorBuffer,
            Self::BindBuffer(_) => OpCode::BindBuffer,
            Self::ClearVertexArray => OpCode::ClearVertexArray,
            Self::ClearNormalArray => OpCode::ClearNormalArray,
            Self::ClearTexelArray => OpCode::ClearTexelArray,
            Self::ClearColorArray => OpCode::ClearColorArray,
            Self::ClearArrays => OpCode::ClearArrays,
            Self::PointsArray(_) => OpCode::PointsArray,
            Self::LineListArray(_) => OpCode::LineListArray,
            Self::LineStripArray(_) => OpCode::LineStripArray,
            Self::TriangleListArray(_) => OpCode::TriangleListArray,
            Self::TriangleStripArray(_) => OpCode::TriangleStripArray,
            Self::TriangleFanArray(_) => OpCode::TriangleFanArray,
            Self::PointBuffer(_) => OpCode::PointBuffer,
            Self::LineListBuffer(_) => OpCode::LineListBuffer,
            Self::LineStripBuffer(_) => OpCode::LineStripBuffer,
            Self::TriangleListBuffer(_) => OpCode::TriangleListBuffer,
            Self::TriangleStripBuffer(_) => OpCode::TriangleStripBuffer,
            Self::TriangleFanBuffer(_) => OpCode::TriangleFanBuffer,
            Self::FlatShading => OpCode::FlatShading,
            Self::SmoothShading => OpCode::SmoothShading,
            Self::EnableStencil => OpCode::EnableStencil,
            Self::DisableStencil => OpCode::DisableStencil,
            Self::ClearStencil => OpCode::ClearStencil,
            Self::SetViewport(_) => OpCode::SetViewport,
            Self::ClearViewport => OpCode::ClearViewport,
            Self::SetScissor(_) => OpCode::SetScissor,
            Self::ClearScissor => OpCode::ClearScissor,
            Self::Light(_) => OpCode::Light,
            Self::ClearLights => OpCode::ClearLights,
            Self::Fog(_) => OpCode::Fog,
            Self::ClearFog => OpCode::ClearFog,
            Self::Debug(_) => OpCode::Debug,
        }
    }

    /// Stable name of this op
    pub fn name(&self) -> &'static str {
        self.code().name()
    }

    /// Topology and inline indices of an array draw
    pub fn array_draw(&self) -> Option<(Primitive, &[u16])> {
        match self {
            Self::PointsArray(i) => Some((Primitive::Points, i)),
            Self::LineListArray(i) => Some((Primitive::LineList, i)),
            Self::LineStripArray(i) => Some((Primitive::LineStrip, i)),
            Self::TriangleListArray(i) => Some((Primitive::TriangleList, i)),
            Self::TriangleStripArray(i) => Some((Primitive::TriangleStrip, i)),
            Self::TriangleFanArray(i) => Some((Primitive::TriangleFan, i)),
            _ => None,
        }
    }

    /// Topology and index buffer of a buffer draw
    pub fn buffer_draw(&self) -> Option<(Primitive, BufferId)> {
        match *self {
            Self::PointBuffer(id) => Some((Primitive::Points, id)),
            Self::LineListBuffer(id) => Some((Primitive::LineList, id)),
            Self::LineStripBuffer(id) => Some((Primitive::LineStrip, id)),
            Self::TriangleListBuffer(id) => Some((Primitive::TriangleList, id)),
            Self::TriangleStripBuffer(id) => Some((Primitive::TriangleStrip, id)),
            Self::TriangleFanBuffer(id) => Some((Primitive::TriangleFan, id)),
            _ => None,
        }
    }

    /// Whether this op draws geometry
    pub fn is_draw(&self) -> bool {
        self.array_draw().is_some() || self.buffer_draw().is_some()
    }

    /// Buffer handle carried by this op, if any
    pub fn buffer(&self) -> Option<BufferId> {
        match *self {
            Self::VertexBuffer(id)
            | Self::NormalBuffer(id)
            | Self::TexelBuffer(id)
            | Self::ColorBuffer(id)
            | Self::BindBuffer(id) => Some(id),
            _ => self.buffer_draw().map(|(_, id)| id),
        }
    }
}
