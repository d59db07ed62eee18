//! Text records → display lists
//!
//! Each record whose label is an [`OpCode`] name becomes one op. Payloads
//! come from the record's own tokens, or from its children's tokens when a
//! value list is spelled as a block:
//!
//! ```text
//! SetColor 1 0 0 1
//! PushTranslation 1 0 0
//! VertexArray
//! {
//!     0 0 0
//!     1 1 0
//! }
//! LineListArray { 0 1 }
//! PopTransform
//! ```
//!
//! Unknown labels are skipped. A known label with a malformed payload, or a
//! material the library has never heard of, fails the whole import.

use crate::assets::record::Record;
use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Color, Mat4, Quat, Quaternion, Transform2D, Transform3D, Vec2, Vec3, Vec4};
use crate::render::buffer::BufferId;
use crate::render::display_list::{DisplayList, Op, OpCode};
use crate::render::light::{Fog, Light, LightKind};
use crate::render::material::MaterialLibrary;
use crate::render::{RenderError, RenderResult};

/// Build a display list from records
pub fn import_display_list(records: &[Record], library: &MaterialLibrary) -> RenderResult<DisplayList> {
    let mut list = DisplayList::new();
    import_into(&mut list, records, library, &[])?;
    list.compact();
    log::debug!("Imported display list: {} records, {} bytes", records.len(), list.len());
    Ok(list)
}

/// Append ops built from `records` to `list`
///
/// Buffer-referencing ops carry an integer index into `buffers`.
pub(crate) fn import_into(
    list: &mut DisplayList,
    records: &[Record],
    library: &MaterialLibrary,
    buffers: &[BufferId],
) -> RenderResult<()> {
    for record in records {
        let Some(code) = OpCode::from_name(record.label()) else {
            log::debug!("Ignoring record '{}' on line {}", record.label(), record.line());
            continue;
        };
        let importer = OpImporter { record, library, buffers };
        list.write_op(&importer.build(code)?);
    }
    Ok(())
}

struct OpImporter<'a> {
    record: &'a Record,
    library: &'a MaterialLibrary,
    buffers: &'a [BufferId],
}

impl OpImporter<'_> {
    fn invalid(&self, message: impl Into<String>) -> RenderError {
        RenderError::InvalidValue {
            record: self.record.label().to_string(),
            message: message.into(),
        }
    }

    /// Own tokens as floats, or every child token when there are none
    fn floats(&self) -> RenderResult<Vec<f32>> {
        if self.record.tokens().is_empty() {
            return Ok(self.record.child_floats()?);
        }
        (0..self.record.tokens().len())
            .map(|i| self.record.float(i).map_err(RenderError::from))
            .collect()
    }

    fn integers(&self) -> RenderResult<Vec<i64>> {
        if self.record.tokens().is_empty() {
            return Ok(self.record.child_integers()?);
        }
        (0..self.record.tokens().len())
            .map(|i| self.record.integer(i).map_err(RenderError::from))
            .collect()
    }

    fn float_groups(&self, group: usize) -> RenderResult<Vec<f32>> {
        let values = self.floats()?;
        if values.len() % group != 0 {
            return Err(self.invalid(format!("{} values is not a multiple of {}", values.len(), group)));
        }
        Ok(values)
    }

    fn float_or(&self, index: usize, default: f32) -> RenderResult<f32> {
        if index < self.record.tokens().len() {
            Ok(self.record.float(index)?)
        } else {
            Ok(default)
        }
    }

    fn u32_at(&self, index: usize) -> RenderResult<u32> {
        let value = self.record.integer(index)?;
        u32::try_from(value).map_err(|_| self.invalid(format!("{} does not fit in u32", value)))
    }

    fn color_at(&self, first: usize) -> RenderResult<Color> {
        Ok(Color::new(
            self.record.float(first)?,
            self.record.float(first + 1)?,
            self.record.float(first + 2)?,
            self.float_or(first + 3, 1.0)?,
        ))
    }

    fn matrix(&self) -> RenderResult<Mat4> {
        let values = self.floats()?;
        if values.len() != 16 {
            return Err(self.invalid(format!("matrix needs 16 values, found {}", values.len())));
        }
        Ok(Mat4::from_column_slice(&values))
    }

    fn indices(&self) -> RenderResult<Vec<u16>> {
        self.integers()?
            .into_iter()
            .map(|value| u16::try_from(value).map_err(|_| self.invalid(format!("index {} out of u16 range", value))))
            .collect()
    }

    fn buffer(&self) -> RenderResult<BufferId> {
        let index = self.record.integer(0)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.buffers.get(i).copied())
            .ok_or_else(|| RenderError::InvalidBufferIndex {
                record: self.record.label().to_string(),
                index,
                available: self.buffers.len(),
            })
    }

    fn box2d(&self) -> RenderResult<Box2D> {
        let r = self.record;
        Ok(Box2D::new(
            Vec2::new(r.float(0)?, r.float(1)?),
            Vec2::new(r.float(2)?, r.float(3)?),
        ))
    }

    fn transform_2d(&self) -> RenderResult<Transform2D> {
        let r = self.record;
        Ok(Transform2D {
            position: Vec2::new(r.float(0)?, r.float(1)?),
            angle: self.float_or(2, 0.0)?,
            scale: Vec2::new(self.float_or(3, 1.0)?, self.float_or(4, 1.0)?),
        })
    }

    /// `x y z [qi qj qk qw] [sx sy sz]`
    fn transform_3d(&self) -> RenderResult<Transform3D> {
        let r = self.record;
        let position = Vec3::new(r.float(0)?, r.float(1)?, r.float(2)?);
        let rotation = if r.tokens().len() >= 7 {
            let coords = Vec4::new(r.float(3)?, r.float(4)?, r.float(5)?, r.float(6)?);
            if coords.norm_squared() <= f32::EPSILON {
                return Err(self.invalid("zero-length rotation quaternion"));
            }
            Quat::new_normalize(Quaternion::from_vector(coords))
        } else {
            Quat::identity()
        };
        let scale = Vec3::new(self.float_or(7, 1.0)?, self.float_or(8, 1.0)?, self.float_or(9, 1.0)?);
        Ok(Transform3D { position, rotation, scale })
    }

    /// `Kind r g b [a]` then `x y z` for directional and point lights
    fn light(&self) -> RenderResult<Light> {
        let r = self.record;
        let kind = match r.string(0)? {
            "Ambient" => LightKind::Ambient,
            "Directional" => LightKind::Directional,
            "Point" => LightKind::Point,
            other => return Err(self.invalid(format!("unknown light kind '{}'", other))),
        };
        let color = Color::new(r.float(1)?, r.float(2)?, r.float(3)?, 1.0);
        Ok(match kind {
            LightKind::Ambient => Light::ambient(color),
            LightKind::Directional => Light::directional(Vec3::new(r.float(4)?, r.float(5)?, r.float(6)?), color),
            LightKind::Point => Light::point(
                Vec3::new(r.float(4)?, r.float(5)?, r.float(6)?),
                color,
                [self.float_or(7, 1.0)?, self.float_or(8, 0.0)?, self.float_or(9, 0.0)?],
            ),
        })
    }

    /// `Exponential r g b density` or `Linear r g b start end`
    fn fog(&self) -> RenderResult<Fog> {
        let r = self.record;
        let color = Color::new(r.float(1)?, r.float(2)?, r.float(3)?, 1.0);
        match r.string(0)? {
            "Exponential" => Ok(Fog::exponential(color, r.float(4)?)),
            "Linear" => Ok(Fog::linear(color, r.float(4)?, r.float(5)?)),
            other => Err(self.invalid(format!("unknown fog mode '{}'", other))),
        }
    }

    fn build(&self, code: OpCode) -> RenderResult<Op> {
        let r = self.record;
        let op = match code {
            OpCode::SetColor => Op::SetColor(self.color_at(0)?),
            OpCode::SetSpecularColor => Op::SetSpecularColor(self.color_at(0)?),
            OpCode::SetTexture => Op::SetTexture(self.u32_at(0)?),
            OpCode::ClearTexture => Op::ClearTexture,
            OpCode::SetMaterial => Op::SetMaterial(self.library.get(r.string(0)?)?.id()),
            OpCode::SetRenderTarget => Op::SetRenderTarget(self.u32_at(0)?),
            OpCode::ResolveRenderTarget => Op::ResolveRenderTarget(self.u32_at(0)?),

            OpCode::PushTransform => Op::PushTransform(self.transform_2d()?),
            OpCode::PushTransform3D => Op::PushTransform3D(self.transform_3d()?),
            OpCode::PushTranslation => {
                Op::PushTranslation(Vec3::new(r.float(0)?, r.float(1)?, self.float_or(2, 0.0)?))
            }
            OpCode::PushMatrix4x4 => Op::PushMatrix4x4(self.matrix()?),
            OpCode::SetMatrix4x4 => Op::SetMatrix4x4(self.matrix()?),
            OpCode::SetMatrices4x4 => {
                let values = self.float_groups(16)?;
                Op::SetMatrices4x4(values.chunks_exact(16).map(Mat4::from_column_slice).collect())
            }
            OpCode::SetWorldToViewMatrix4x4 => Op::SetWorldToViewMatrix4x4(self.matrix()?),
            OpCode::PopTransform => Op::PopTransform,

            OpCode::SetCameraTransform => Op::SetCameraTransform(self.matrix()?),
            OpCode::SetProjectionMatrix4x4 => Op::SetProjectionMatrix4x4(self.matrix()?),
            OpCode::Set3DProjection => Op::Set3DProjection {
                fov: r.float(0)?,
                near: r.float(1)?,
                far: r.float(2)?,
            },

            OpCode::VertexArray | OpCode::NormalArray => {
                let values = self.float_groups(3)?;
                let vectors = values.chunks_exact(3).map(|c| Vec3::new(c[0], c[1], c[2])).collect();
                if code == OpCode::VertexArray { Op::VertexArray(vectors) } else { Op::NormalArray(vectors) }
            }
            OpCode::TexelArray => {
                let values = self.float_groups(2)?;
                Op::TexelArray(values.chunks_exact(2).map(|c| Vec2::new(c[0], c[1])).collect())
            }
            OpCode::ColorArray => {
                let values = self.float_groups(4)?;
                Op::ColorArray(values.chunks_exact(4).map(|c| Color::new(c[0], c[1], c[2], c[3])).collect())
            }
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

            OpCode::Debug => Op::Debug(r.string(0)?.to_string()),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::assets::record::RecordError;

    fn import(text: &str, library: &MaterialLibrary) -> RenderResult<DisplayList> {
        let records = Record::parse_str(text)?;
        import_display_list(&records, library)
    }

    #[test]
    fn test_import_translated_line() {
        let text = "\
SetColor 1 0 0 1
PushTranslation 1 0 0
VertexArray
{
    0 0 0
    1 1 0
}
LineListArray
{
    0 1
}
PopTransform
";
        let list = import(text, &MaterialLibrary::new()).unwrap();
        let ops = list.ops();
        assert_eq!(ops[0], Op::SetColor(Color::RED));
        assert_eq!(ops[1], Op::PushTranslation(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(ops[3], Op::LineListArray(vec![0, 1]));
        assert_eq!(ops.len(), 5);

        let bounds = list.bounding_box_2d().unwrap();
        assert_relative_eq!(bounds.min, Vec2::new(1.0, 0.0));
        assert_relative_eq!(bounds.max, Vec2::new(2.0, 1.0));
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let text = "Sparkle 1 2 3\nClearArrays\nNotAnOp\n";
        let list = import(text, &MaterialLibrary::new()).unwrap();
        assert_eq!(list.ops(), vec![Op::ClearArrays]);
    }

    #[test]
    fn test_material_resolution() {
        let mut library = MaterialLibrary::new();
        let glow = library.register("glow", 5, 1);

        let list = import("SetMaterial \"glow\"\n", &library).unwrap();
        assert_eq!(list.ops(), vec![Op::SetMaterial(glow.id())]);

        let err = import("SetMaterial \"missing\"\n", &library).unwrap_err();
        assert!(matches!(err, RenderError::UnknownMaterial(name) if name == "missing"));
    }

    #[test]
    fn test_missing_payload_is_error() {
        let err = import("PushTranslation 1\n", &MaterialLibrary::new()).unwrap_err();
        assert!(matches!(err, RenderError::Record(RecordError::MissingField { index: 1, .. })));
    }

    #[test]
    fn test_ragged_vertex_array_is_error() {
        let err = import("VertexArray { 0 0 0 1 }\n", &MaterialLibrary::new()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidValue { .. }));
    }

    #[test]
    fn test_buffer_ops_need_buffers() {
        let err = import("BindBuffer 0\n", &MaterialLibrary::new()).unwrap_err();
        assert!(matches!(err, RenderError::InvalidBufferIndex { index: 0, available: 0, .. }));
    }

    #[test]
    fn test_state_ops() {
        let text = "\
Light Point 1 1 1 0 5 0
Fog Linear 0.5 0.5 0.5 10 100
SetViewport 0 0 0.5 1
PushTransform 3 4 0.5 2 2
Debug \"hud\"
";
        let ops = import(text, &MaterialLibrary::new()).unwrap().ops();
        assert_eq!(ops[0], Op::Light(Light::point(Vec3::new(0.0, 5.0, 0.0), Color::WHITE, [1.0, 0.0, 0.0])));
        assert_eq!(ops[1], Op::Fog(Fog::linear(Color::new(0.5, 0.5, 0.5, 1.0), 10.0, 100.0)));
        assert_eq!(ops[2], Op::SetViewport(Box2D::new(Vec2::zeros(), Vec2::new(0.5, 1.0))));
        assert_eq!(
            ops[3],
            Op::PushTransform(Transform2D { position: Vec2::new(3.0, 4.0), angle: 0.5, scale: Vec2::new(2.0, 2.0) })
        );
        assert_eq!(ops[4], Op::Debug("hud".to_string()));
    }

    #[test]
    fn test_matrix_from_block() {
        let text = "\
SetMatrix4x4
{
    1 0 0 0
    0 1 0 0
    0 0 1 0
    5 6 7 1
}
";
        let ops = import(text, &MaterialLibrary::new()).unwrap().ops();
        assert_eq!(ops[0], Op::SetMatrix4x4(Mat4::new_translation(&Vec3::new(5.0, 6.0, 7.0))));
    }
}
