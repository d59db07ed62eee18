//! Byte-level encoding of display list opcodes
//!
//! Layout: one tag byte ([`OpCode`]) followed by the payload. Scalars are
//! little-endian. Arrays are a `u32` element count followed by the elements;
//! strings are a `u32` byte length followed by UTF-8. Matrices are sixteen
//! `f32` in column-major order.

use nalgebra::{Quaternion, Unit};
use thiserror::Error;

use super::op::{Op, OpCode};
use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Color, Mat4, Quat, Transform2D, Transform3D, Vec2, Vec3, Vec4};
use crate::render::buffer::BufferId;
use crate::render::light::{Fog, FogMode, Light, LightKind};
use crate::render::material::MaterialId;

/// Failure to decode a stream, with the byte offset it happened at
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at byte {offset}")]
pub struct CodecError {
    /// Offset of the offending byte
    pub offset: usize,
    /// What went wrong
    pub kind: CodecErrorKind,
}

/// Reasons a stream can fail to decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecErrorKind {
    /// Payload runs past the end of the stream
    #[error("truncated payload: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the payload needs
        needed: usize,
        /// Bytes left in the stream
        available: usize,
    },
    /// Tag byte is not an opcode
    #[error("unknown opcode tag {0}")]
    UnknownOpcode(u8),
    /// String payload is not UTF-8
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,
    /// An enumerated field holds an out-of-range value
    #[error("invalid {field} value {value}")]
    InvalidEnum {
        /// Field name
        field: &'static str,
        /// Raw value
        value: u8,
    },
}

/// Appends encoded values to a byte buffer
pub struct ByteWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> ByteWriter<'a> {
    /// Write into `buf`, after its existing contents
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    /// Opcode tag
    pub fn tag(&mut self, code: OpCode) {
        self.buf.push(code as u8);
    }

    /// Single byte
    pub fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Little-endian `u16`
    pub fn u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Little-endian `u32`
    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Little-endian `u64`
    pub fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Little-endian `f32`
    pub fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Array or string length prefix
    pub fn length_prefix(&mut self, len: usize) {
        let len = u32::try_from(len).unwrap_or_else(|_| panic!("display list payload of {} elements exceeds u32", len));
        self.u32(len);
    }

    /// Two floats
    pub fn vec2(&mut self, value: &Vec2) {
        self.f32(value.x);
        self.f32(value.y);
    }

    /// Three floats
    pub fn vec3(&mut self, value: &Vec3) {
        self.f32(value.x);
        self.f32(value.y);
        self.f32(value.z);
    }

    /// Four floats, RGBA
    pub fn color(&mut self, value: &Color) {
        let components: [f32; 4] = bytemuck::cast(*value);
        for component in components {
            self.f32(component);
        }
    }

    /// Sixteen floats, column-major
    pub fn mat4(&mut self, value: &Mat4) {
        for &component in value.as_slice() {
            self.f32(component);
        }
    }

    /// Four floats: i, j, k, w
    pub fn quat(&mut self, value: &Quat) {
        for &component in value.coords.as_slice() {
            self.f32(component);
        }
    }

    /// Position, angle, scale
    pub fn transform_2d(&mut self, value: &Transform2D) {
        self.vec2(&value.position);
        self.f32(value.angle);
        self.vec2(&value.scale);
    }

    /// Position, rotation, scale
    pub fn transform_3d(&mut self, value: &Transform3D) {
        self.vec3(&value.position);
        self.quat(&value.rotation);
        self.vec3(&value.scale);
    }

    /// Min corner then max corner
    pub fn box2d(&mut self, value: &Box2D) {
        self.vec2(&value.min);
        self.vec2(&value.max);
    }

    /// Buffer handle as its 64-bit raw value
    pub fn buffer(&mut self, id: BufferId) {
        self.u64(id.to_raw());
    }

    /// Light description
    pub fn light(&mut self, light: &Light) {
        self.u8(light.kind.to_byte());
        self.color(&light.color);
        self.color(&light.ambient);
        self.vec3(&light.position);
        for factor in light.attenuation {
            self.f32(factor);
        }
    }

    /// Fog description
    pub fn fog(&mut self, fog: &Fog) {
        self.color(&fog.color);
        match fog.mode {
            FogMode::Exponential(density) => {
                self.u8(0);
                self.f32(density);
            }
            FogMode::Linear { start, end } => {
                self.u8(1);
                self.f32(start);
                self.f32(end);
            }
        }
    }

    /// Length-prefixed UTF-8
    pub fn string(&mut self, value: &str) {
        self.length_prefix(value.len());
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Length-prefixed index array
    pub fn indices(&mut self, values: &[u16]) {
        self.length_prefix(values.len());
        for &value in values {
            self.u16(value);
        }
    }

    /// Length-prefixed `Vec3` array
    pub fn vec3_array(&mut self, values: &[Vec3]) {
        self.length_prefix(values.len());
        for value in values {
            self.vec3(value);
        }
    }

    /// Length-prefixed `Vec2` array
    pub fn vec2_array(&mut self, values: &[Vec2]) {
        self.length_prefix(values.len());
        for value in values {
            self.vec2(value);
        }
    }

    /// Length-prefixed colour array
    pub fn color_array(&mut self, values: &[Color]) {
        self.length_prefix(values.len());
        for value in values {
            self.color(value);
        }
    }

    /// Length-prefixed matrix array
    pub fn mat4_array(&mut self, values: &[Mat4]) {
        self.length_prefix(values.len());
        for value in values {
            self.mat4(value);
        }
    }

    /// Tag and payload of one op
    pub fn op(&mut self, op: &Op) {
        self.tag(op.code());
        match op {
            Op::SetColor(c) | Op::SetSpecularColor(c) => self.color(c),
            Op::SetTexture(v) | Op::SetRenderTarget(v) | Op::ResolveRenderTarget(v) => self.u32(*v),
            Op::SetMaterial(id) => self.u32(id.0),
            Op::PushTransform(t) => self.transform_2d(t),
            Op::PushTransform3D(t) => self.transform_3d(t),
            Op::PushTranslation(v) => self.vec3(v),
            Op::PushMatrix4x4(m)
            | Op::SetMatrix4x4(m)
            | Op::SetWorldToViewMatrix4x4(m)
            | Op::SetCameraTransform(m)
            | Op::SetProjectionMatrix4x4(m) => self.mat4(m),
            Op::SetMatrices4x4(ms) => self.mat4_array(ms),
            Op::Set3DProjection { fov, near, far } => {
                self.f32(*fov);
                self.f32(*near);
                self.f32(*far);
            }
            Op::VertexArray(v) | Op::NormalArray(v) => self.vec3_array(v),
            Op::TexelArray(v) => self.vec2_array(v),
            Op::ColorArray(v) => self.color_array(v),
            Op::VertexBuffer(id)
            | Op::NormalBuffer(id)
            | Op::TexelBuffer(id)
            | Op::ColorBuffer(id)
            | Op::BindBuffer(id)
            | Op::PointBuffer(id)
            | Op::LineListBuffer(id)
            | Op::LineStripBuffer(id)
            | Op::TriangleListBuffer(id)
            | Op::TriangleStripBuffer(id)
            | Op::TriangleFanBuffer(id) => self.buffer(*id),
            Op::PointsArray(i)
            | Op::LineListArray(i)
            | Op::LineStripArray(i)
            | Op::TriangleListArray(i)
            | Op::TriangleStripArray(i)
            | Op::TriangleFanArray(i) => self.indices(i),
            Op::SetViewport(b) | Op::SetScissor(b) => self.box2d(b),
            Op::Light(light) => self.light(light),
            Op::Fog(fog) => self.fog(fog),
            Op::Debug(text) => self.string(text),
            Op::ClearTexture
            | Op::PopTransform
            | Op::ClearVertexArray
            | Op::ClearNormalArray
            | Op::ClearTexelArray
            | Op::ClearColorArray
            | Op::ClearArrays
            | Op::FlatShading
            | Op::SmoothShading
            | Op::EnableStencil
            | Op::DisableStencil
            | Op::ClearStencil
            | Op::ClearViewport
            | Op::ClearScissor
            | Op::ClearLights
            | Op::ClearFog => {}
        }
    }
}

/// Result type for decoding
pub type CodecResult<T> = Result<T, CodecError>;

/// Reads encoded values from a byte slice
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Read `bytes` starting at `offset`
    pub fn new(bytes: &'a [u8], offset: usize) -> Self {
        Self { bytes, offset }
    }

    /// Current read offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Whether every byte has been read
    pub fn is_at_end(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn error(&self, kind: CodecErrorKind) -> CodecError {
        CodecError { offset: self.offset, kind }
    }

    fn take(&mut self, needed: usize) -> CodecResult<&'a [u8]> {
        let available = self.bytes.len().saturating_sub(self.offset);
        if needed > available {
            return Err(self.error(CodecErrorKind::Truncated { needed, available }));
        }
        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Single byte
    pub fn u8(&mut self) -> CodecResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    /// Little-endian `u16`
    pub fn u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Little-endian `u32`
    pub fn u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Little-endian `u64`
    pub fn u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Little-endian `f32`
    pub fn f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Length prefix, checked against the bytes left for `element_size`
    fn length_prefix(&mut self, element_size: usize) -> CodecResult<usize> {
        let start = self.offset;
        let count = self.u32()? as usize;
        let needed = count.saturating_mul(element_size);
        let available = self.bytes.len().saturating_sub(self.offset);
        if needed > available {
            return Err(CodecError {
                offset: start,
                kind: CodecErrorKind::Truncated { needed, available },
            });
        }
        Ok(count)
    }

    /// Two floats
    pub fn vec2(&mut self) -> CodecResult<Vec2> {
        Ok(Vec2::new(self.f32()?, self.f32()?))
    }

    /// Three floats
    pub fn vec3(&mut self) -> CodecResult<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    /// Four floats, RGBA
    pub fn color(&mut self) -> CodecResult<Color> {
        Ok(Color::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    /// Sixteen floats, column-major
    pub fn mat4(&mut self) -> CodecResult<Mat4> {
        let mut components = [0.0f32; 16];
        for component in &mut components {
            *component = self.f32()?;
        }
        Ok(Mat4::from_column_slice(&components))
    }

    /// Four floats: i, j, k, w
    pub fn quat(&mut self) -> CodecResult<Quat> {
        let coords = Vec4::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?);
        // Written from a unit quaternion; renormalizing would perturb the bits
        Ok(Unit::new_unchecked(Quaternion::from_vector(coords)))
    }

    /// Position, angle, scale
    pub fn transform_2d(&mut self) -> CodecResult<Transform2D> {
        Ok(Transform2D {
            position: self.vec2()?,
            angle: self.f32()?,
            scale: self.vec2()?,
        })
    }

    /// Position, rotation, scale
    pub fn transform_3d(&mut self) -> CodecResult<Transform3D> {
        Ok(Transform3D {
            position: self.vec3()?,
            rotation: self.quat()?,
            scale: self.vec3()?,
        })
    }

    /// Min corner then max corner
    pub fn box2d(&mut self) -> CodecResult<Box2D> {
        Ok(Box2D::new(self.vec2()?, self.vec2()?))
    }

    /// Buffer handle
    pub fn buffer(&mut self) -> CodecResult<BufferId> {
        Ok(BufferId::from_raw(self.u64()?))
    }

    /// Light description
    pub fn light(&mut self) -> CodecResult<Light> {
        let byte = self.u8()?;
        let kind = LightKind::from_byte(byte)
            .ok_or_else(|| self.error(CodecErrorKind::InvalidEnum { field: "light kind", value: byte }))?;
        Ok(Light {
            kind,
            color: self.color()?,
            ambient: self.color()?,
            position: self.vec3()?,
            attenuation: [self.f32()?, self.f32()?, self.f32()?],
        })
    }

    /// Fog description
    pub fn fog(&mut self) -> CodecResult<Fog> {
        let color = self.color()?;
        let mode = match self.u8()? {
            0 => FogMode::Exponential(self.f32()?),
            1 => FogMode::Linear {
                start: self.f32()?,
                end: self.f32()?,
            },
            value => return Err(self.error(CodecErrorKind::InvalidEnum { field: "fog mode", value })),
        };
        Ok(Fog { color, mode })
    }

    /// Length-prefixed UTF-8
    pub fn string(&mut self) -> CodecResult<String> {
        let start = self.offset;
        let len = self.length_prefix(1)?;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError { offset: start, kind: CodecErrorKind::InvalidUtf8 })
    }

    /// Length-prefixed index array
    pub fn indices(&mut self) -> CodecResult<Vec<u16>> {
        let count = self.length_prefix(2)?;
        (0..count).map(|_| self.u16()).collect()
    }

    /// Length-prefixed `Vec3` array
    pub fn vec3_array(&mut self) -> CodecResult<Vec<Vec3>> {
        let count = self.length_prefix(12)?;
        (0..count).map(|_| self.vec3()).collect()
    }

    /// Length-prefixed `Vec2` array
    pub fn vec2_array(&mut self) -> CodecResult<Vec<Vec2>> {
        let count = self.length_prefix(8)?;
        (0..count).map(|_| self.vec2()).collect()
    }

    /// Length-prefixed colour array
    pub fn color_array(&mut self) -> CodecResult<Vec<Color>> {
        let count = self.length_prefix(16)?;
        (0..count).map(|_| self.color()).collect()
    }

    /// Length-prefixed matrix array
    pub fn mat4_array(&mut self) -> CodecResult<Vec<Mat4>> {
        let count = self.length_prefix(64)?;
        (0..count).map(|_| self.mat4()).collect()
    }

    /// Tag and payload of one op
    pub fn op(&mut self) -> CodecResult<Op> {
        let tag = self.u8()?;
        let code = OpCode::from_byte(tag).ok_or(CodecError {
            offset: self.offset - 1,
            kind: CodecErrorKind::UnknownOpcode(tag),
        })?;

        let op = match code {
            OpCode::SetColor => Op::SetColor(self.color()?),
            OpCode::SetSpecularColor => Op::SetSpecularColor(self.color()?),
            OpCode::SetTexture => Op::SetTexture(self.u32()?),
            OpCode::ClearTexture => Op::ClearTexture,
            OpCode::SetMaterial => Op::SetMaterial(MaterialId(self.u32()?)),
            OpCode::SetRenderTarget => Op::SetRenderTarget(self.u32()?),
            OpCode::ResolveRenderTarget => Op::ResolveRenderTarget(self.u32()?),
            OpCode::PushTransform => Op::PushTransform(self.transform_2d()?),
            OpCode::PushTransform3D => Op::PushTransform3D(self.transform_3d()?),
            OpCode::PushTranslation => Op::PushTranslation(self.vec3()?),
            OpCode::PushMatrix4x4 => Op::PushMatrix4x4(self.mat4()?),
            OpCode::SetMatrix4x4 => Op::SetMatrix4x4(self.mat4()?),
            OpCode::SetMatrices4x4 => Op::SetMatrices4x4(self.mat4_array()?),
            OpCode::SetWorldToViewMatrix4x4 => Op::SetWorldToViewMatrix4x4(self.mat4()?),
            OpCode::PopTransform => Op::PopTransform,
            OpCode::SetCameraTransform => Op::SetCameraTransform(self.mat4()?),
            OpCode::SetProjectionMatrix4x4 => Op::SetProjectionMatrix4x4(self.mat4()?),
            OpCode::Set3DProjection => Op::Set3DProjection {
                fov: self.f32()?,
                near: self.f32()?,
                far: self.f32()?,
            },
            OpCode::VertexArray => Op::VertexArray(self.vec3_array()?),
            OpCode::NormalArray => Op::NormalArray(self.vec3_array()?),
            OpCode::TexelArray => Op::TexelArray(self.vec2_array()?),
            OpCode::ColorArray => Op::ColorArray(self.color_array()?),
            OpCode::VertexBuffer => Op::VertexBuffer(self.buffer()?),
            OpCode::NormalBuffer => Op::NormalBuffer(self.buffer()?),
            OpCode::TexelBuffer => Op::TexelBuffer(self.buffer()?),
            OpCode::ColorBuffer => Op::ColorBuffer(self.buffer()?),
            OpCode::BindBuffer => Op::BindBuffer(self.buffer()?),
            OpCode::ClearVertexArray => Op::ClearVertexArray,
            OpCode::ClearNormalArray => Op::ClearNormalArray,
            OpCode::ClearTexelArray => Op::ClearTexelArray,
            OpCode::ClearColorArray => Op::ClearColorArray,
            OpCode::ClearArrays => Op::ClearArrays,
            OpCode::PointsArray => Op::PointsArray(self.indices()?),
            OpCode::LineListArray => Op::LineListArray(self.indices()?),
            OpCode::LineStripArray => Op::LineStripArray(self.indices()?),
            OpCode::TriangleListArray => Op::TriangleListArray(self.indices()?),
            OpCode::TriangleStripArray => Op::TriangleStripArray(self.indices()?),
            OpCode::TriangleFanArray => Op::TriangleFanArray(self.indices()?),
            OpCode::PointBuffer => Op::PointBuffer(self.buffer()?),
            OpCode::LineListBuffer => Op::LineListBuffer(self.buffer()?),
            OpCode::LineStripBuffer => Op::LineStripBuffer(self.buffer()?),
            OpCode::TriangleListBuffer => Op::TriangleListBuffer(self.buffer()?),
            OpCode::TriangleStripBuffer => Op::TriangleStripBuffer(self.buffer()?),
            OpCode::TriangleFanBuffer => Op::TriangleFanBuffer(self.buffer()?),
            OpCode::FlatShading => Op::FlatShading,
            OpCode::SmoothShading => Op::SmoothShading,
            OpCode::EnableStencil => Op::EnableStencil,
            OpCode::DisableStencil => Op::DisableStencil,
            OpCode::ClearStencil => Op::ClearStencil,
            OpCode::SetViewport => Op::SetViewport(self.box2d()?),
            OpCode::ClearViewport => Op::ClearViewport,
            OpCode::SetScissor => Op::SetScissor(self.box2d()?),
            OpCode::ClearScissor => Op::ClearScissor,
            OpCode::Light => Op::Light(self.light()?),
            OpCode::ClearLights => Op::ClearLights,
            OpCode::Fog => Op::Fog(self.fog()?),
            OpCode::ClearFog => Op::ClearFog,
            OpCode::Debug => Op::Debug(self.string()?),
        };
        Ok(op)
    }
}

/// Append the encoding of `op` to `buf`
pub fn encode_op(buf: &mut Vec<u8>, op: &Op) {
    ByteWriter::new(buf).op(op);
}

/// Decode the op at `offset`, returning it and the offset of the next op
pub fn decode_op(bytes: &[u8], offset: usize) -> CodecResult<(Op, usize)> {
    let mut reader = ByteReader::new(bytes, offset);
    let op = reader.op()?;
    Ok((op, reader.offset()))
}

/// Check that `bytes` holds a whole number of well-formed ops
pub fn validate(bytes: &[u8]) -> CodecResult<usize> {
    let mut reader = ByteReader::new(bytes, 0);
    let mut count = 0;
    while !reader.is_at_end() {
        reader.op()?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalars_are_little_endian() {
        let mut buf = Vec::new();
        let mut writer = ByteWriter::new(&mut buf);
        writer.u32(0x0403_0201);
        writer.u16(0x0605);
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_array_layout() {
        let mut buf = Vec::new();
        encode_op(&mut buf, &Op::LineListArray(vec![7, 9]));
        assert_eq!(buf, vec![OpCode::LineListArray as u8, 2, 0, 0, 0, 7, 0, 9, 0]);
    }

    #[test]
    fn test_truncated_payload_reports_offset() {
        let mut buf = Vec::new();
        encode_op(&mut buf, &Op::ClearArrays);
        encode_op(&mut buf, &Op::SetColor(Color::RED));
        buf.truncate(buf.len() - 2);

        let err = validate(&buf).unwrap_err();
        assert!(matches!(err.kind, CodecErrorKind::Truncated { needed: 4, available: 2 }));
        assert_eq!(err.offset, buf.len() - 2);
    }

    #[test]
    fn test_oversized_array_count_is_truncation() {
        let bytes = vec![OpCode::VertexArray as u8, 0xff, 0xff, 0xff, 0x7f];
        let err = validate(&bytes).unwrap_err();
        assert_eq!(err.offset, 1);
        assert!(matches!(err.kind, CodecErrorKind::Truncated { .. }));
    }

    #[test]
    fn test_unknown_tag() {
        let err = validate(&[OpCode::ClearFog as u8, 250]).unwrap_err();
        assert_eq!(err, CodecError { offset: 1, kind: CodecErrorKind::UnknownOpcode(250) });
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = vec![OpCode::Debug as u8, 2, 0, 0, 0, 0xc3, 0x28];
        let err = validate(&bytes).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::InvalidUtf8);
    }

    #[test]
    fn test_invalid_fog_mode() {
        let mut buf = Vec::new();
        encode_op(&mut buf, &Op::Fog(Fog::exponential(Color::WHITE, 0.5)));
        buf[17] = 9;
        let err = validate(&buf).unwrap_err();
        assert_eq!(err.kind, CodecErrorKind::InvalidEnum { field: "fog mode", value: 9 });
    }
}
