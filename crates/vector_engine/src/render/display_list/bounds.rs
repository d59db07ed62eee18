//! Geometry analysis by replaying a display list
//!
//! The replay tracks a transform stack and the current vertex source, and
//! visits every vertex a draw op references, already transformed. Buffer
//! sources need a [`BufferStore`] to resolve; the plain variants of each
//! query skip them.
//!
//! Replay runs on its own cursor, so analysing a list never disturbs a
//! renderer draining it. Instances analyse their parent's bytes.

use super::op::Op;
use super::DisplayList;
use crate::foundation::bounds::{Box2D, Box3D};
use crate::foundation::math::{utils, Mat4, Vec2, Vec3};
use crate::render::buffer::{BufferId, BufferStore};

/// Deepest transform nesting a replay accepts
pub const MAX_TRANSFORM_DEPTH: usize = 20;

enum VertexSource {
    None,
    Array(Vec<Vec3>),
    Buffer(BufferId),
}

/// Replay state: a stack of matrix sets plus the bound vertex source
///
/// Each stack entry is a set so `SetMatrices4x4` can expand every drawn
/// vertex through all of its instance matrices.
struct Replay<'a> {
    buffers: Option<&'a BufferStore>,
    stack: Vec<Vec<Mat4>>,
    source: VertexSource,
}

impl<'a> Replay<'a> {
    fn new(buffers: Option<&'a BufferStore>) -> Self {
        Self {
            buffers,
            stack: vec![vec![Mat4::identity()]],
            source: VertexSource::None,
        }
    }

    fn push(&mut self, matrices: Vec<Mat4>) {
        assert!(
            self.stack.len() < MAX_TRANSFORM_DEPTH,
            "display list transform stack overflow (max depth {})",
            MAX_TRANSFORM_DEPTH
        );
        self.stack.push(matrices);
    }

    fn compose(&mut self, local: &Mat4) {
        let composed = self.top().iter().map(|parent| parent * local).collect();
        self.push(composed);
    }

    fn top(&self) -> &[Mat4] {
        self.stack.last().map_or(&[][..], Vec::as_slice)
    }

    fn position(&self, index: usize) -> Option<Vec3> {
        match &self.source {
            VertexSource::None => None,
            VertexSource::Array(vertices) => vertices.get(index).copied(),
            VertexSource::Buffer(id) => self.buffers?.get(*id)?.position(index),
        }
    }

    /// Whether the bound source can be read at all
    fn source_resolvable(&self, op: &Op) -> bool {
        match &self.source {
            VertexSource::None => {
                log::warn!("{} with no vertex source bound; skipped", op.name());
                false
            }
            VertexSource::Array(_) => true,
            VertexSource::Buffer(id) => match self.buffers {
                None => {
                    log::debug!("{} against buffer source without a buffer store; skipped", op.name());
                    false
                }
                Some(store) if store.get(*id).is_none() => {
                    log::warn!("{} against a buffer that no longer exists; skipped", op.name());
                    false
                }
                Some(_) => true,
            },
        }
    }

    fn draw(&self, op: &Op, indices: &[u16], visit: &mut impl FnMut(Vec3)) {
        if !self.source_resolvable(op) {
            return;
        }
        let mut skipped = 0usize;
        for &index in indices {
            match self.position(usize::from(index)) {
                Some(local) => {
                    for matrix in self.top() {
                        visit(utils::transform_point(matrix, &local));
                    }
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!("{}: {} of {} indices out of range of the vertex source", op.name(), skipped, indices.len());
        }
    }

    fn step(&mut self, op: &Op, visit: &mut impl FnMut(Vec3)) {
        match op {
            Op::PushTransform(transform) => self.compose(&transform.to_matrix()),
            Op::PushTransform3D(transform) => self.compose(&transform.to_matrix()),
            Op::PushTranslation(offset) => self.compose(&Mat4::new_translation(offset)),
            Op::PushMatrix4x4(matrix) => self.compose(matrix),
            Op::SetMatrix4x4(matrix) => self.push(vec![*matrix]),
            Op::SetMatrices4x4(matrices) => self.push(matrices.clone()),
            Op::PopTransform => {
                assert!(self.stack.len() > 1, "display list pops more transforms than it pushes");
                self.stack.pop();
            }
            Op::VertexArray(vertices) => self.source = VertexSource::Array(vertices.clone()),
            Op::VertexBuffer(id) | Op::BindBuffer(id) => self.source = VertexSource::Buffer(*id),
            Op::ClearVertexArray | Op::ClearArrays => self.source = VertexSource::None,
            _ => {
                if let Some((_, indices)) = op.array_draw() {
                    self.draw(op, indices, visit);
                } else if let Some((_, index_buffer)) = op.buffer_draw() {
                    let Some(store) = self.buffers else {
                        log::debug!("{} needs a buffer store to resolve its indices; skipped", op.name());
                        return;
                    };
                    match store.get(index_buffer).and_then(|buffer| buffer.indices()) {
                        Some(indices) => self.draw(op, indices, visit),
                        None => log::warn!("{} names a missing or non-index buffer; skipped", op.name()),
                    }
                }
            }
        }
    }
}

impl DisplayList {
    /// Visit every vertex the list draws, in the space of the list's root
    pub fn for_each_drawn_vertex(&self, buffers: Option<&BufferStore>, mut visit: impl FnMut(Vec3)) {
        let mut replay = Replay::new(buffers);
        for op in self.iter() {
            replay.step(&op, &mut visit);
        }
        if replay.stack.len() > 1 {
            log::warn!("Display list ends with {} unpopped transform(s)", replay.stack.len() - 1);
        }
    }

    fn box_of(&self, buffers: Option<&BufferStore>) -> Option<Box3D> {
        let mut bounds: Option<Box3D> = None;
        self.for_each_drawn_vertex(buffers, |point| {
            bounds = Some(match bounds {
                Some(mut b) => {
                    b.expand_to_include(point);
                    b
                }
                None => Box3D::from_point(point),
            });
        });
        bounds
    }

    /// Box around every drawn vertex; `None` when nothing is drawn
    pub fn bounding_box(&self) -> Option<Box3D> {
        self.box_of(None)
    }

    /// [`DisplayList::bounding_box`], resolving buffer sources
    pub fn bounding_box_with(&self, buffers: &BufferStore) -> Option<Box3D> {
        self.box_of(Some(buffers))
    }

    /// XY projection of [`DisplayList::bounding_box`]
    pub fn bounding_box_2d(&self) -> Option<Box2D> {
        self.bounding_box().map(|b| b.to_2d())
    }

    /// XY projection of [`DisplayList::bounding_box_with`]
    pub fn bounding_box_2d_with(&self, buffers: &BufferStore) -> Option<Box2D> {
        self.bounding_box_with(buffers).map(|b| b.to_2d())
    }

    fn radius_of(&self, buffers: Option<&BufferStore>) -> f32 {
        let mut radius = 0.0f32;
        self.for_each_drawn_vertex(buffers, |point| radius = radius.max(point.norm()));
        radius
    }

    /// Largest distance of a drawn vertex from the origin; zero when nothing
    /// is drawn
    pub fn bounding_radius(&self) -> f32 {
        self.radius_of(None)
    }

    /// [`DisplayList::bounding_radius`], resolving buffer sources
    pub fn bounding_radius_with(&self, buffers: &BufferStore) -> f32 {
        self.radius_of(Some(buffers))
    }

    fn circle_of(&self, buffers: Option<&BufferStore>) -> Option<(Vec2, f32)> {
        let center = self.box_of(buffers)?.to_2d().center();
        let mut radius = 0.0f32;
        self.for_each_drawn_vertex(buffers, |point| {
            radius = radius.max((point.xy() - center).norm());
        });
        Some((center, radius))
    }

    /// Circle in the XY plane enclosing every drawn vertex
    ///
    /// Centred on the 2D bounding box; `None` when nothing is drawn.
    pub fn bounding_circle(&self) -> Option<(Vec2, f32)> {
        self.circle_of(None)
    }

    /// [`DisplayList::bounding_circle`], resolving buffer sources
    pub fn bounding_circle_with(&self, buffers: &BufferStore) -> Option<(Vec2, f32)> {
        self.circle_of(Some(buffers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::foundation::math::{Color, Transform2D};
    use crate::render::buffer::RenderBuffer;

    #[test]
    fn test_translated_line_list_bounds() {
        let mut list = DisplayList::new();
        list.set_color(Color::RED);
        list.push_translation(Vec3::new(1.0, 0.0, 0.0));
        list.vertex_array(&[Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0)]);
        list.line_list_array(&[0, 1]);
        list.pop_transform();

        let bounds = list.bounding_box().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(bounds.max, Vec3::new(2.0, 1.0, 0.0));

        let flat = list.bounding_box_2d().unwrap();
        assert_relative_eq!(flat.min, Vec2::new(1.0, 0.0));
        assert_relative_eq!(flat.max, Vec2::new(2.0, 1.0));
    }

    #[test]
    fn test_empty_list_has_no_bounds() {
        let mut list = DisplayList::new();
        list.set_color(Color::WHITE);
        list.vertex_array(&[Vec3::new(5.0, 5.0, 0.0)]);

        assert!(list.bounding_box().is_none());
        assert!(list.bounding_circle().is_none());
        assert_eq!(list.bounding_radius(), 0.0);
    }

    #[test]
    fn test_only_referenced_vertices_count() {
        let mut list = DisplayList::new();
        list.vertex_array(&[Vec3::new(-9.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)]);
        list.triangle_list_array(&[1, 2, 7]);

        let bounds = list.bounding_box().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(0.0, 0.0, 0.0));
        assert_relative_eq!(bounds.max, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_nested_transforms_compose_parent_first() {
        let mut list = DisplayList::new();
        list.push_translation(Vec3::new(10.0, 0.0, 0.0));
        list.push_transform(Transform2D {
            position: Vec2::zeros(),
            angle: 0.0,
            scale: Vec2::new(2.0, 2.0),
        });
        list.vertex_array(&[Vec3::new(1.0, 1.0, 0.0)]);
        list.points_array(&[0]);
        list.pop_transform();
        list.points_array(&[0]);
        list.pop_transform();

        let bounds = list.bounding_box().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(11.0, 1.0, 0.0));
        assert_relative_eq!(bounds.max, Vec3::new(12.0, 2.0, 0.0));
    }

    #[test]
    fn test_set_matrix_replaces() {
        let mut list = DisplayList::new();
        list.push_translation(Vec3::new(100.0, 0.0, 0.0));
        list.set_matrix(Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)));
        list.vertex_array(&[Vec3::zeros()]);
        list.points_array(&[0]);
        list.pop_transform();
        list.pop_transform();

        let bounds = list.bounding_box().unwrap();
        assert_relative_eq!(bounds.min, Vec3::new(0.0, 3.0, 0.0));
        assert_relative_eq!(bounds.max, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_instance_matrices_expand_vertices() {
        let mut list = DisplayList::new();
        list.set_matrices(&[
            Mat4::new_translation(&Vec3::new(-5.0, 0.0, 0.0)),
            Mat4::new_translation(&Vec3::new(5.0, 0.0, 0.0)),
        ]);
        list.vertex_array(&[Vec3::zeros()]);
        list.points_array(&[0]);
        list.pop_transform();

        let bounds = list.bounding_box().unwrap();
        assert_relative_eq!(bounds.min.x, -5.0);
        assert_relative_eq!(bounds.max.x, 5.0);
    }

    #[test]
    fn test_instance_reports_parent_bounds() {
        let mut parent = DisplayList::new();
        parent.vertex_array(&[Vec3::new(-1.0, 2.0, 0.0), Vec3::new(3.0, -4.0, 0.0)]);
        parent.line_list_array(&[0, 1]);
        let instance = parent.create_instance();

        assert_eq!(instance.bounding_box(), parent.bounding_box());
        assert_eq!(instance.owned_bytes(), 0);
    }

    #[test]
    fn test_buffer_sources_resolve_with_store() {
        let mut store = BufferStore::new();
        let vertices = store.insert(RenderBuffer::from_positions(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 3.0, 0.0),
        ]));
        let indices = store.insert(RenderBuffer::from_indices(&[0, 1, 2]));

        let mut list = DisplayList::new();
        list.bind_buffer(vertices);
        list.triangle_list_buffer(indices);
        list.clear_arrays();

        assert!(list.bounding_box().is_none());
        let bounds = list.bounding_box_with(&store).unwrap();
        assert_relative_eq!(bounds.max, Vec3::new(4.0, 3.0, 0.0));
        assert_relative_eq!(list.bounding_radius_with(&store), 4.0);
    }

    #[test]
    fn test_cleared_source_draws_nothing() {
        let mut list = DisplayList::new();
        list.vertex_array(&[Vec3::new(1.0, 1.0, 0.0)]);
        list.clear_vertex_array();
        list.points_array(&[0]);
        assert!(list.bounding_box().is_none());
    }

    #[test]
    fn test_bounding_circle() {
        let mut list = DisplayList::new();
        list.vertex_array(&[Vec3::new(2.0, 0.0, 0.0), Vec3::new(4.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 0.0)]);
        list.triangle_list_array(&[0, 1, 2]);

        let (center, radius) = list.bounding_circle().unwrap();
        assert_relative_eq!(center, Vec2::new(3.0, 0.5));
        assert_relative_eq!(radius, (1.0f32 + 0.25).sqrt());
        assert_relative_eq!(list.bounding_radius(), 4.0);
    }

    #[test]
    fn test_analysis_leaves_read_cursor() {
        let mut list = DisplayList::new();
        list.vertex_array(&[Vec3::zeros()]);
        list.points_array(&[0]);
        list.pop_op();
        let cursor = list.position();
        let _ = list.bounding_box();
        assert_eq!(list.position(), cursor);
    }

    #[test]
    #[should_panic(expected = "pops more transforms")]
    fn test_unbalanced_pop_panics() {
        let mut list = DisplayList::new();
        list.pop_transform();
        let _ = list.bounding_box();
    }
}
