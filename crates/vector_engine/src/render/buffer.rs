//! Persistent geometry buffers
//!
//! A [`RenderBuffer`] is the CPU-side copy of a GPU buffer: the renderer
//! uploads [`RenderBuffer::as_bytes`] and display lists refer to the buffer
//! by [`BufferId`]. Keeping the contents here lets bounding analysis read
//! vertex positions without asking the renderer.

use bytemuck::{Pod, Zeroable};
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::foundation::bounds::Box3D;
use crate::foundation::math::{Color, Vec2, Vec3};

new_key_type! {
    /// Handle to a buffer held by a [`BufferStore`]
    pub struct BufferId;
}

impl BufferId {
    /// Raw value written into display lists
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }

    /// Rebuild a handle from a value read out of a display list
    pub fn from_raw(raw: u64) -> Self {
        KeyData::from_ffi(raw).into()
    }
}

/// Position + colour vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PcVertex {
    /// Position
    pub position: [f32; 3],
    /// RGBA colour
    pub color: [f32; 4],
}

/// Position + colour + texture coordinate vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PctVertex {
    /// Position
    pub position: [f32; 3],
    /// RGBA colour
    pub color: [f32; 4],
    /// Texture coordinate
    pub texel: [f32; 2],
}

/// Position + normal + texture coordinate vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PntVertex {
    /// Position
    pub position: [f32; 3],
    /// Normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub texel: [f32; 2],
}

impl PctVertex {
    /// Build from engine math types
    pub fn new(position: Vec3, color: Color, texel: Vec2) -> Self {
        Self {
            position: position.into(),
            color: bytemuck::cast(color),
            texel: texel.into(),
        }
    }
}

/// What a buffer holds
#[derive(Debug, Clone, PartialEq)]
pub enum BufferContents {
    /// Bare positions
    Positions(Vec<[f32; 3]>),
    /// Interleaved position + colour
    PositionColor(Vec<PcVertex>),
    /// Interleaved position + colour + texel
    PositionColorTexel(Vec<PctVertex>),
    /// Interleaved position + normal + texel
    PositionNormalTexel(Vec<PntVertex>),
    /// 16-bit element indices
    Indices(Vec<u16>),
}

/// CPU-side contents of one GPU buffer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBuffer {
    contents: BufferContents,
}

impl RenderBuffer {
    /// Wrap buffer contents
    pub fn new(contents: BufferContents) -> Self {
        Self { contents }
    }

    /// Position-only vertex buffer
    pub fn from_positions(positions: &[Vec3]) -> Self {
        Self::new(BufferContents::Positions(
            positions.iter().map(|p| (*p).into()).collect(),
        ))
    }

    /// Index buffer
    pub fn from_indices(indices: &[u16]) -> Self {
        Self::new(BufferContents::Indices(indices.to_vec()))
    }

    /// Buffer contents
    pub fn contents(&self) -> &BufferContents {
        &self.contents
    }

    /// Whether this is an index buffer
    pub fn is_index_buffer(&self) -> bool {
        matches!(self.contents, BufferContents::Indices(_))
    }

    /// Number of vertices, or indices for an index buffer
    pub fn len(&self) -> usize {
        match &self.contents {
            BufferContents::Positions(v) => v.len(),
            BufferContents::PositionColor(v) => v.len(),
            BufferContents::PositionColorTexel(v) => v.len(),
            BufferContents::PositionNormalTexel(v) => v.len(),
            BufferContents::Indices(v) => v.len(),
        }
    }

    /// Whether the buffer has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of vertex `index`; `None` for index buffers or out of range
    pub fn position(&self, index: usize) -> Option<Vec3> {
        let raw = match &self.contents {
            BufferContents::Positions(v) => *v.get(index)?,
            BufferContents::PositionColor(v) => v.get(index)?.position,
            BufferContents::PositionColorTexel(v) => v.get(index)?.position,
            BufferContents::PositionNormalTexel(v) => v.get(index)?.position,
            BufferContents::Indices(_) => return None,
        };
        Some(Vec3::from(raw))
    }

    /// Indices of an index buffer
    pub fn indices(&self) -> Option<&[u16]> {
        match &self.contents {
            BufferContents::Indices(v) => Some(v),
            _ => None,
        }
    }

    /// Box around every vertex position; `None` for index or empty buffers
    pub fn bounding_box(&self) -> Option<Box3D> {
        Box3D::from_points((0..self.len()).map_while(|i| self.position(i)))
    }

    /// Raw bytes for upload
    pub fn as_bytes(&self) -> &[u8] {
        match &self.contents {
            BufferContents::Positions(v) => bytemuck::cast_slice(v),
            BufferContents::PositionColor(v) => bytemuck::cast_slice(v),
            BufferContents::PositionColorTexel(v) => bytemuck::cast_slice(v),
            BufferContents::PositionNormalTexel(v) => bytemuck::cast_slice(v),
            BufferContents::Indices(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Owner of every live render buffer
#[derive(Debug, Default)]
pub struct BufferStore {
    buffers: SlotMap<BufferId, RenderBuffer>,
}

impl BufferStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a buffer and return its handle
    pub fn insert(&mut self, buffer: RenderBuffer) -> BufferId {
        self.buffers.insert(buffer)
    }

    /// Drop a buffer; lists still naming it stop resolving
    pub fn remove(&mut self, id: BufferId) -> Option<RenderBuffer> {
        self.buffers.remove(id)
    }

    /// Look a buffer up
    pub fn get(&self, id: BufferId) -> Option<&RenderBuffer> {
        self.buffers.get(id)
    }

    /// Number of live buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
