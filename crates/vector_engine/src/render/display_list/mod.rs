//! # Display Lists
//!
//! A display list is an append-only byte stream of rendering opcodes with a
//! rewindable read cursor. Scenes write them, render queues merge them, and
//! a renderer drains the result with [`DisplayList::pop_op`].
//!
//! ## Instances
//!
//! [`DisplayList::create_instance`] returns a read-only view sharing the
//! parent's bytes. An instance has its own read cursor, owns no bytes, and
//! sees anything later written to the parent. Lists are `!Send`; they never
//! cross threads.
//!
//! ## Geometry
//!
//! Bounding volumes are computed by replaying the stream; see the methods in
//! the [`bounds`] module.

pub mod bounds;
pub mod codec;
pub mod op;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

pub use codec::{CodecError, CodecErrorKind};
pub use op::{Op, OpCode, Primitive};

use codec::ByteWriter;
use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Color, Mat4, Transform2D, Transform3D, Vec2, Vec3};
use crate::render::buffer::BufferId;
use crate::render::light::{Fog, Light};
use crate::render::material::MaterialId;
use crate::render::RenderResult;

/// Opcode stream
pub struct DisplayList {
    data: Rc<RefCell<Vec<u8>>>,
    cursor: usize,
    instance: bool,
}

impl DisplayList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty list with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Rc::new(RefCell::new(Vec::with_capacity(capacity))),
            cursor: 0,
            instance: false,
        }
    }

    /// Wrap bytes produced by [`DisplayList::to_bytes`], validating them
    pub fn from_bytes(bytes: Vec<u8>) -> RenderResult<Self> {
        let count = codec::validate(&bytes)?;
        log::trace!("Loaded display list: {} ops, {} bytes", count, bytes.len());
        Ok(Self {
            data: Rc::new(RefCell::new(bytes)),
            cursor: 0,
            instance: false,
        })
    }

    /// Copy of the encoded bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.borrow().clone()
    }

    /// Number of bytes visible through this list
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the list holds no ops
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes this list owns; zero for instances
    pub fn owned_bytes(&self) -> usize {
        if self.instance { 0 } else { self.len() }
    }

    /// Allocated byte capacity; zero for instances
    pub fn capacity(&self) -> usize {
        if self.instance { 0 } else { self.data.borrow().capacity() }
    }

    /// Whether this list is an instance of another
    pub fn is_instance(&self) -> bool {
        self.instance
    }

    /// Number of live instances sharing this list's bytes
    pub fn instance_count(&self) -> usize {
        if self.instance { 0 } else { Rc::strong_count(&self.data) - 1 }
    }

    /// Read cursor position in bytes
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn buffer_mut(&mut self) -> RefMut<'_, Vec<u8>> {
        assert!(!self.instance, "display list instances are read-only");
        self.data.borrow_mut()
    }

    /// Append one op at the write position
    pub fn write_op(&mut self, op: &Op) {
        codec::encode_op(&mut self.buffer_mut(), op);
    }

    /// Decode the op at the read cursor and advance past it
    ///
    /// Returns `None` once the cursor reaches the write position.
    ///
    /// # Panics
    /// If the bytes at the cursor are not a valid op. Lists are only built
    /// by the writer or validated by [`DisplayList::from_bytes`], so this
    /// indicates memory corruption or a bug in the writer.
    pub fn pop_op(&mut self) -> Option<Op> {
        let data = self.data.borrow();
        if self.cursor >= data.len() {
            return None;
        }
        match codec::decode_op(&data, self.cursor) {
            Ok((op, next)) => {
                self.cursor = next;
                Some(op)
            }
            Err(err) => panic!("corrupt display list: {}", err),
        }
    }

    /// Reset the read cursor to the start
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Drop every op and rewind, keeping the allocation
    pub fn clear(&mut self) {
        self.buffer_mut().clear();
        self.cursor = 0;
    }

    /// Shrink the allocation to fit the contents
    pub fn compact(&mut self) {
        self.buffer_mut().shrink_to_fit();
    }

    /// Append every op of `other`, regardless of its read cursor
    ///
    /// Instances contribute their parent's bytes. Neither list's read
    /// cursor moves.
    pub fn append(&mut self, other: &DisplayList) {
        if Rc::ptr_eq(&self.data, &other.data) {
            let copy = other.data.borrow().clone();
            self.buffer_mut().extend_from_slice(&copy);
        } else {
            let source = other.data.borrow();
            self.buffer_mut().extend_from_slice(&source);
        }
    }

    /// Read-only list sharing this list's bytes
    ///
    /// Instances of an instance share the same root bytes.
    pub fn create_instance(&self) -> DisplayList {
        DisplayList {
            data: Rc::clone(&self.data),
            cursor: 0,
            instance: true,
        }
    }

    /// Iterate over every op from the start, ignoring the read cursor
    ///
    /// The list cannot be written while the iterator is alive.
    pub fn iter(&self) -> OpIter<'_> {
        OpIter {
            bytes: self.data.borrow(),
            offset: 0,
        }
    }

    /// Decoded copy of every op, ignoring the read cursor
    pub fn ops(&self) -> Vec<Op> {
        self.iter().collect()
    }

    // Typed writers

    /// Set the current colour
    pub fn set_color(&mut self, color: Color) {
        self.write_op(&Op::SetColor(color));
    }

    /// Set the specular colour
    pub fn set_specular_color(&mut self, color: Color) {
        self.write_op(&Op::SetSpecularColor(color));
    }

    /// Bind a texture by renderer handle
    pub fn set_texture(&mut self, texture: u32) {
        self.write_op(&Op::SetTexture(texture));
    }

    /// Unbind the texture
    pub fn clear_texture(&mut self) {
        self.write_op(&Op::ClearTexture);
    }

    /// Switch material
    pub fn set_material(&mut self, material: MaterialId) {
        self.write_op(&Op::SetMaterial(material));
    }

    /// Redirect output to a render target
    pub fn set_render_target(&mut self, target: u32) {
        self.write_op(&Op::SetRenderTarget(target));
    }

    /// Resolve a render target
    pub fn resolve_render_target(&mut self, target: u32) {
        self.write_op(&Op::ResolveRenderTarget(target));
    }

    /// Compose a 2D transform onto the stack
    pub fn push_transform(&mut self, transform: Transform2D) {
        self.write_op(&Op::PushTransform(transform));
    }

    /// Compose a 3D transform onto the stack
    pub fn push_transform_3d(&mut self, transform: Transform3D) {
        self.write_op(&Op::PushTransform3D(transform));
    }

    /// Compose a translation onto the stack
    pub fn push_translation(&mut self, offset: Vec3) {
        self.write_op(&Op::PushTranslation(offset));
    }

    /// Compose a matrix onto the stack
    pub fn push_matrix(&mut self, matrix: Mat4) {
        self.write_op(&Op::PushMatrix4x4(matrix));
    }

    /// Push a matrix that replaces the current one
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.write_op(&Op::SetMatrix4x4(matrix));
    }

    /// Push a set of instance matrices that replaces the current one
    pub fn set_matrices(&mut self, matrices: &[Mat4]) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(OpCode::SetMatrices4x4);
        writer.mat4_array(matrices);
    }

    /// Set the world-to-view matrix
    pub fn set_world_to_view_matrix(&mut self, matrix: Mat4) {
        self.write_op(&Op::SetWorldToViewMatrix4x4(matrix));
    }

    /// Pop the transform stack
    pub fn pop_transform(&mut self) {
        self.write_op(&Op::PopTransform);
    }

    /// Set the camera world matrix
    pub fn set_camera_transform(&mut self, matrix: Mat4) {
        self.write_op(&Op::SetCameraTransform(matrix));
    }

    /// Set the projection matrix
    pub fn set_projection_matrix(&mut self, matrix: Mat4) {
        self.write_op(&Op::SetProjectionMatrix4x4(matrix));
    }

    /// Set a perspective projection from parameters
    pub fn set_3d_projection(&mut self, fov: f32, near: f32, far: f32) {
        self.write_op(&Op::Set3DProjection { fov, near, far });
    }

    fn write_vec3_array(&mut self, code: OpCode, values: &[Vec3]) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(code);
        writer.vec3_array(values);
    }

    fn write_indices(&mut self, code: OpCode, indices: &[u16]) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(code);
        writer.indices(indices);
    }

    /// Inline vertex positions
    pub fn vertex_array(&mut self, vertices: &[Vec3]) {
        self.write_vec3_array(OpCode::VertexArray, vertices);
    }

    /// Inline normals
    pub fn normal_array(&mut self, normals: &[Vec3]) {
        self.write_vec3_array(OpCode::NormalArray, normals);
    }

    /// Inline texture coordinates
    pub fn texel_array(&mut self, texels: &[Vec2]) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(OpCode::TexelArray);
        writer.vec2_array(texels);
    }

    /// Inline vertex colours
    pub fn color_array(&mut self, colors: &[Color]) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(OpCode::ColorArray);
        writer.color_array(colors);
    }

    /// Vertex positions from a buffer
    pub fn vertex_buffer(&mut self, buffer: BufferId) {
        self.write_op(&Op::VertexBuffer(buffer));
    }

    /// Normals from a buffer
    pub fn normal_buffer(&mut self, buffer: BufferId) {
        self.write_op(&Op::NormalBuffer(buffer));
    }

    /// Texture coordinates from a buffer
    pub fn texel_buffer(&mut self, buffer: BufferId) {
        self.write_op(&Op::TexelBuffer(buffer));
    }

    /// Vertex colours from a buffer
    pub fn color_buffer(&mut self, buffer: BufferId) {
        self.write_op(&Op::ColorBuffer(buffer));
    }

    /// Bind an interleaved vertex buffer
    pub fn bind_buffer(&mut self, buffer: BufferId) {
        self.write_op(&Op::BindBuffer(buffer));
    }

    /// Drop the vertex source
    pub fn clear_vertex_array(&mut self) {
        self.write_op(&Op::ClearVertexArray);
    }

    /// Drop the normal source
    pub fn clear_normal_array(&mut self) {
        self.write_op(&Op::ClearNormalArray);
    }

    /// Drop the texel source
    pub fn clear_texel_array(&mut self) {
        self.write_op(&Op::ClearTexelArray);
    }

    /// Drop the colour source
    pub fn clear_color_array(&mut self) {
        self.write_op(&Op::ClearColorArray);
    }

    /// Drop every vertex source
    pub fn clear_arrays(&mut self) {
        self.write_op(&Op::ClearArrays);
    }

    /// Points by inline indices
    pub fn points_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::PointsArray, indices);
    }

    /// Line list by inline indices
    pub fn line_list_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::LineListArray, indices);
    }

    /// Line strip by inline indices
    pub fn line_strip_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::LineStripArray, indices);
    }

    /// Triangle list by inline indices
    pub fn triangle_list_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::TriangleListArray, indices);
    }

    /// Triangle strip by inline indices
    pub fn triangle_strip_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::TriangleStripArray, indices);
    }

    /// Triangle fan by inline indices
    pub fn triangle_fan_array(&mut self, indices: &[u16]) {
        self.write_indices(OpCode::TriangleFanArray, indices);
    }

    /// Points by index buffer
    pub fn point_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::PointBuffer(indices));
    }

    /// Line list by index buffer
    pub fn line_list_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::LineListBuffer(indices));
    }

    /// Line strip by index buffer
    pub fn line_strip_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::LineStripBuffer(indices));
    }

    /// Triangle list by index buffer
    pub fn triangle_list_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::TriangleListBuffer(indices));
    }

    /// Triangle strip by index buffer
    pub fn triangle_strip_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::TriangleStripBuffer(indices));
    }

    /// Triangle fan by index buffer
    pub fn triangle_fan_buffer(&mut self, indices: BufferId) {
        self.write_op(&Op::TriangleFanBuffer(indices));
    }

    /// Flat shading
    pub fn flat_shading(&mut self) {
        self.write_op(&Op::FlatShading);
    }

    /// Smooth shading
    pub fn smooth_shading(&mut self) {
        self.write_op(&Op::SmoothShading);
    }

    /// Enable the stencil test
    pub fn enable_stencil(&mut self) {
        self.write_op(&Op::EnableStencil);
    }

    /// Disable the stencil test
    pub fn disable_stencil(&mut self) {
        self.write_op(&Op::DisableStencil);
    }

    /// Clear the stencil buffer
    pub fn clear_stencil(&mut self) {
        self.write_op(&Op::ClearStencil);
    }

    /// Set the viewport
    pub fn set_viewport(&mut self, viewport: Box2D) {
        self.write_op(&Op::SetViewport(viewport));
    }

    /// Restore the full viewport
    pub fn clear_viewport(&mut self) {
        self.write_op(&Op::ClearViewport);
    }

    /// Set the scissor rectangle
    pub fn set_scissor(&mut self, scissor: Box2D) {
        self.write_op(&Op::SetScissor(scissor));
    }

    /// Disable scissoring
    pub fn clear_scissor(&mut self) {
        self.write_op(&Op::ClearScissor);
    }

    /// Add a light
    pub fn light(&mut self, light: Light) {
        self.write_op(&Op::Light(light));
    }

    /// Remove every light
    pub fn clear_lights(&mut self) {
        self.write_op(&Op::ClearLights);
    }

    /// Enable fog
    pub fn fog(&mut self, fog: Fog) {
        self.write_op(&Op::Fog(fog));
    }

    /// Disable fog
    pub fn clear_fog(&mut self) {
        self.write_op(&Op::ClearFog);
    }

    /// Debug marker
    pub fn debug(&mut self, text: &str) {
        let mut buf = self.buffer_mut();
        let mut writer = ByteWriter::new(&mut buf);
        writer.tag(OpCode::Debug);
        writer.string(text);
    }
}

impl Default for DisplayList {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep copy: the clone owns its bytes even when the source is an instance
impl Clone for DisplayList {
    fn clone(&self) -> Self {
        Self {
            data: Rc::new(RefCell::new(self.data.borrow().clone())),
            cursor: self.cursor,
            instance: false,
        }
    }
}

impl PartialEq for DisplayList {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.data, &other.data) || *self.data.borrow() == *other.data.borrow()
    }
}

impl fmt::Debug for DisplayList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.iter().map(|op| op.name()).collect();
        f.debug_struct("DisplayList")
            .field("bytes", &self.len())
            .field("instance", &self.instance)
            .field("ops", &names)
            .finish()
    }
}

impl Drop for DisplayList {
    fn drop(&mut self) {
        if !self.instance && Rc::strong_count(&self.data) > 1 {
            log::error!(
                "Display list dropped with {} live instance(s); instances keep its {} bytes alive",
                Rc::strong_count(&self.data) - 1,
                self.data.borrow().len()
            );
        }
    }
}

impl<'a> IntoIterator for &'a DisplayList {
    type Item = Op;
    type IntoIter = OpIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ops of a list, independent of its read cursor
pub struct OpIter<'a> {
    bytes: Ref<'a, Vec<u8>>,
    offset: usize,
}

impl Iterator for OpIter<'_> {
    type Item = Op;

    fn next(&mut self) -> Option<Op> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        match codec::decode_op(&self.bytes, self.offset) {
            Ok((op, next)) => {
                self.offset = next;
                Some(op)
            }
            Err(err) => panic!("corrupt display list: {}", err),
        }
    }
}
