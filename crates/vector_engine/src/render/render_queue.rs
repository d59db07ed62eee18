//! Render queue for batched rendering
//!
//! Collects `(material, matrix, display list)` submissions during one scene
//! traversal and flushes them into a single stream, grouped so that state
//! changes are minimised:
//!
//! stage → material batch (by layer) → vertex buffer batch → elements
//!
//! Every level lives in a [`FramePool`], so a queue reaches a steady state
//! after a few frames and stops allocating.

use crate::core::config::RenderConfig;
use crate::foundation::collections::{FramePool, Recycle};
use crate::foundation::math::{Mat4, Transform2D, Vec3};
use crate::render::buffer::BufferId;
use crate::render::display_list::DisplayList;
use crate::render::fragment::Fragment;
use crate::render::material::Material;

/// All elements sharing one material within a stage
#[derive(Debug, Default)]
struct MaterialBatch {
    material: Material,
    buffer_batches: Vec<usize>,
}

impl Recycle for MaterialBatch {
    fn recycle(&mut self) {
        self.material = Material::DEFAULT;
        self.buffer_batches.clear();
    }
}

/// Elements sharing one material and one vertex buffer
#[derive(Debug, Default)]
struct BufferBatch {
    buffer: Option<BufferId>,
    elements: Vec<usize>,
}

impl Recycle for BufferBatch {
    fn recycle(&mut self) {
        self.buffer = None;
        self.elements.clear();
    }
}

#[derive(Debug)]
enum ElementList {
    /// Index into the queue's temporary list pool
    Temporary(usize),
    Submitted(DisplayList),
}

#[derive(Debug)]
struct BatchElement {
    matrix: Mat4,
    list: Option<ElementList>,
}

impl Default for BatchElement {
    fn default() -> Self {
        Self {
            matrix: Mat4::identity(),
            list: None,
        }
    }
}

impl Recycle for BatchElement {
    fn recycle(&mut self) {
        self.matrix = Mat4::identity();
        self.list = None;
    }
}

impl Recycle for DisplayList {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Counts from the last [`RenderQueue::draw`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Distinct materials drawn
    pub material_batches: usize,
    /// Distinct (material, buffer) pairs drawn
    pub buffer_batches: usize,
    /// Submitted elements
    pub elements: usize,
    /// Scratch lists handed out by [`RenderQueue::make_temporary_batch_list`]
    pub temporary_lists: usize,
}

/// Per-frame batching of display list submissions
#[derive(Debug)]
pub struct RenderQueue {
    /// Material batch indices per stage, sorted by layer
    stages: Vec<Vec<usize>>,
    material_batches: FramePool<MaterialBatch>,
    buffer_batches: FramePool<BufferBatch>,
    elements: FramePool<BatchElement>,
    temporary_lists: FramePool<DisplayList>,
    generic_list: DisplayList,
    transform_stack: Vec<Mat4>,
    max_depth: usize,
    temporary_capacity: usize,
    stats: QueueStats,
}

impl RenderQueue {
    /// Create a queue sized by `config`
    pub fn new(config: &RenderConfig) -> Self {
        let stage_count = config.queue_stages.max(1);
        log::debug!(
            "Render queue: {} stages, transform depth {}",
            stage_count,
            config.transform_stack_depth
        );
        Self {
            stages: vec![Vec::new(); stage_count],
            material_batches: FramePool::new(),
            buffer_batches: FramePool::new(),
            elements: FramePool::new(),
            temporary_lists: FramePool::new(),
            generic_list: DisplayList::with_capacity(config.scratch_list_capacity),
            transform_stack: Vec::with_capacity(config.transform_stack_depth + 1),
            max_depth: config.transform_stack_depth,
            temporary_capacity: config.temporary_list_capacity,
            stats: QueueStats::default(),
        }
    }

    /// Begin a frame with `base` as the bottom of the transform stack
    pub fn start_render(&mut self, base: Mat4) {
        self.release_frame();
        self.transform_stack.push(base);
    }

    /// Compose `matrix` onto the top of the stack and return the new top
    pub fn push_matrix(&mut self, matrix: &Mat4) -> Mat4 {
        let top = self.matrix();
        assert!(
            self.depth() < self.max_depth,
            "render queue transform stack overflow (max depth {})",
            self.max_depth
        );
        let composed = top * matrix;
        self.transform_stack.push(composed);
        composed
    }

    /// Push a 2D transform
    pub fn push_transform_2d(&mut self, transform: &Transform2D) -> Mat4 {
        self.push_matrix(&transform.to_matrix())
    }

    /// Push a translation
    pub fn push_translation(&mut self, offset: Vec3) -> Mat4 {
        self.push_matrix(&Mat4::new_translation(&offset))
    }

    /// Pop the last push
    pub fn pop_matrix(&mut self) {
        assert!(self.depth() > 0, "render queue transform stack underflow");
        self.transform_stack.pop();
    }

    /// Current top of the transform stack
    pub fn matrix(&self) -> Mat4 {
        match self.transform_stack.last() {
            Some(top) => *top,
            None => panic!("render queue used outside start_render/end_render"),
        }
    }

    /// Pushes above the base matrix
    pub fn depth(&self) -> usize {
        self.transform_stack.len().saturating_sub(1)
    }

    /// Submit `list` to be drawn with `material` at `matrix`
    ///
    /// Elements that share a material and `buffer` are emitted under one
    /// `SetMaterial` and one `BindBuffer`.
    pub fn add_batch(&mut self, material: Material, matrix: Mat4, buffer: Option<BufferId>, list: DisplayList) {
        self.push_element(material, matrix, buffer, ElementList::Submitted(list));
    }

    /// Submit a fragment at the current top matrix
    pub fn add_fragment_batch(&mut self, fragment: &Fragment) {
        let (buffer, list) = fragment.batch_list();
        let matrix = self.matrix();
        self.add_batch(fragment.material(), matrix, buffer, list);
    }

    /// Submit a scratch list owned by the queue and return it for filling
    ///
    /// The list lives until [`RenderQueue::end_render`]. Its byte capacity is
    /// at least `size` and never below `RenderConfig::temporary_list_capacity`.
    pub fn make_temporary_batch_list(&mut self, material: Material, matrix: Mat4, size: usize) -> &mut DisplayList {
        let size = size.max(self.temporary_capacity);
        let index = self.temporary_lists.acquire();
        if self.temporary_lists.get(index).capacity() < size {
            *self.temporary_lists.get_mut(index) = DisplayList::with_capacity(size);
        }
        self.push_element(material, matrix, None, ElementList::Temporary(index));
        self.temporary_lists.get_mut(index)
    }

    /// Scratch list flushed after every stage
    pub fn generic_list(&mut self) -> &mut DisplayList {
        &mut self.generic_list
    }

    /// Emit every batch into `dest`
    pub fn draw(&mut self, dest: &mut DisplayList) {
        let mut stats = QueueStats {
            temporary_lists: self.temporary_lists.live(),
            ..QueueStats::default()
        };

        for stage in &self.stages {
            for &material_index in stage {
                let material_batch = self.material_batches.get(material_index);
                dest.set_material(material_batch.material.id());
                stats.material_batches += 1;

                for &buffer_index in &material_batch.buffer_batches {
                    let buffer_batch = self.buffer_batches.get(buffer_index);
                    if let Some(buffer) = buffer_batch.buffer {
                        dest.bind_buffer(buffer);
                    }
                    stats.buffer_batches += 1;

                    for &element_index in &buffer_batch.elements {
                        let element = self.elements.get(element_index);
                        dest.set_matrix(element.matrix);
                        match &element.list {
                            Some(ElementList::Temporary(index)) => dest.append(self.temporary_lists.get(*index)),
                            Some(ElementList::Submitted(list)) => dest.append(list),
                            None => {}
                        }
                        dest.pop_transform();
                        stats.elements += 1;
                    }

                    if buffer_batch.buffer.is_some() {
                        dest.clear_arrays();
                    }
                }
            }
        }

        dest.append(&self.generic_list);
        log::trace!("Render queue drew {:?}", stats);
        self.stats = stats;
    }

    /// Finish the frame, returning every batch to its pool
    pub fn end_render(&mut self) {
        assert_eq!(
            self.depth(),
            0,
            "render queue ended with {} unpopped transforms",
            self.depth()
        );
        self.release_frame();
    }

    /// Counts from the last draw
    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    fn release_frame(&mut self) {
        for stage in &mut self.stages {
            stage.clear();
        }
        self.elements.reset();
        self.buffer_batches.reset();
        self.material_batches.reset();
        self.temporary_lists.reset();
        self.generic_list.clear();
        self.transform_stack.clear();
    }

    fn push_element(&mut self, material: Material, matrix: Mat4, buffer: Option<BufferId>, list: ElementList) {
        let material_index = self.material_batch(material);
        let buffer_index = self.buffer_batch(material_index, buffer);

        let element_index = self.elements.acquire();
        let element = self.elements.get_mut(element_index);
        element.matrix = matrix;
        element.list = Some(list);
        self.buffer_batches.get_mut(buffer_index).elements.push(element_index);
    }

    /// Find or insert the batch for `material`, keeping its stage sorted by layer
    fn material_batch(&mut self, material: Material) -> usize {
        let mut stage = material.stage();
        if stage >= self.stages.len() {
            log::warn!(
                "Material {:?} asks for stage {} but the queue has {}; using the last",
                material.id(),
                stage,
                self.stages.len()
            );
            stage = self.stages.len() - 1;
        }

        let batches = &self.material_batches;
        if let Some(&existing) = self.stages[stage]
            .iter()
            .find(|&&index| batches.get(index).material == material)
        {
            return existing;
        }

        let index = self.material_batches.acquire();
        self.material_batches.get_mut(index).material = material;

        let batches = &self.material_batches;
        let entries = &mut self.stages[stage];
        let position = entries
            .iter()
            .position(|&entry| batches.get(entry).material.layer() > material.layer())
            .unwrap_or(entries.len());
        entries.insert(position, index);
        index
    }

    fn buffer_batch(&mut self, material_index: usize, buffer: Option<BufferId>) -> usize {
        let batches = &self.buffer_batches;
        if let Some(&existing) = self
            .material_batches
            .get(material_index)
            .buffer_batches
            .iter()
            .find(|&&index| batches.get(index).buffer == buffer)
        {
            return existing;
        }

        let index = self.buffer_batches.acquire();
        self.buffer_batches.get_mut(index).buffer = buffer;
        self.material_batches.get_mut(material_index).buffer_batches.push(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Color;
    use crate::render::buffer::{BufferStore, RenderBuffer};
    use crate::render::display_list::Op;
    use crate::render::material::MaterialLibrary;
    use approx::assert_relative_eq;

    fn queue() -> RenderQueue {
        RenderQueue::new(&RenderConfig::default())
    }

    fn colored(color: Color) -> DisplayList {
        let mut list = DisplayList::new();
        list.set_color(color);
        list
    }

    #[test]
    fn test_transform_stack() {
        let mut queue = queue();
        queue.start_render(Mat4::identity());
        assert_eq!(queue.depth(), 0);

        queue.push_translation(Vec3::new(1.0, 0.0, 0.0));
        let top = queue.push_translation(Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(queue.depth(), 2);
        assert_relative_eq!(top, Mat4::new_translation(&Vec3::new(1.0, 2.0, 0.0)));

        queue.pop_matrix();
        queue.pop_matrix();
        assert_relative_eq!(queue.matrix(), Mat4::identity());
        queue.end_render();
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn test_pop_past_base_panics() {
        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.pop_matrix();
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn test_push_past_max_depth_panics() {
        let mut queue = RenderQueue::new(&RenderConfig {
            transform_stack_depth: 2,
            ..RenderConfig::default()
        });
        queue.start_render(Mat4::identity());
        for _ in 0..3 {
            queue.push_translation(Vec3::x());
        }
    }

    #[test]
    #[should_panic(expected = "unpopped")]
    fn test_unbalanced_end_panics() {
        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.push_translation(Vec3::x());
        queue.end_render();
    }

    #[test]
    fn test_materials_sorted_by_layer_stable() {
        let mut library = MaterialLibrary::new();
        let glow = library.register("glow", 10, 0);
        let hull_a = library.register("hull_a", 1, 0);
        let hull_b = library.register("hull_b", 1, 0);

        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.add_batch(glow, Mat4::identity(), None, colored(Color::RED));
        queue.add_batch(hull_a, Mat4::identity(), None, colored(Color::GREEN));
        queue.add_batch(hull_b, Mat4::identity(), None, colored(Color::BLUE));
        queue.add_batch(hull_a, Mat4::identity(), None, colored(Color::WHITE));

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        let materials: Vec<Op> = out.ops().into_iter().filter(|op| matches!(op, Op::SetMaterial(_))).collect();
        assert_eq!(
            materials,
            vec![
                Op::SetMaterial(hull_a.id()),
                Op::SetMaterial(hull_b.id()),
                Op::SetMaterial(glow.id()),
            ]
        );
        assert_eq!(queue.stats().material_batches, 3);
        assert_eq!(queue.stats().elements, 4);
        queue.end_render();
    }

    #[test]
    fn test_stages_flush_in_order() {
        let mut library = MaterialLibrary::new();
        let overlay = library.register("overlay", -5, 1);
        let world = library.register("world", 5, 0);

        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.add_batch(overlay, Mat4::identity(), None, DisplayList::new());
        queue.add_batch(world, Mat4::identity(), None, DisplayList::new());

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        assert_eq!(out.ops()[0], Op::SetMaterial(world.id()));
        queue.end_render();
    }

    #[test]
    fn test_shared_buffer_bound_once() {
        let mut store = BufferStore::new();
        let vertices = store.insert(RenderBuffer::from_positions(&[Vec3::zeros(), Vec3::x()]));
        let indices = store.insert(RenderBuffer::from_indices(&[0, 1]));

        let mut draw = DisplayList::new();
        draw.line_list_buffer(indices);

        let mut queue = queue();
        queue.start_render(Mat4::identity());
        let a = queue.push_translation(Vec3::new(1.0, 0.0, 0.0));
        queue.add_batch(Material::DEFAULT, a, Some(vertices), draw.create_instance());
        queue.pop_matrix();
        let b = queue.push_translation(Vec3::new(5.0, 0.0, 0.0));
        queue.add_batch(Material::DEFAULT, b, Some(vertices), draw.create_instance());
        queue.pop_matrix();

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        queue.end_render();

        assert_eq!(
            out.ops(),
            vec![
                Op::SetMaterial(Material::DEFAULT.id()),
                Op::BindBuffer(vertices),
                Op::SetMatrix4x4(a),
                Op::LineListBuffer(indices),
                Op::PopTransform,
                Op::SetMatrix4x4(b),
                Op::LineListBuffer(indices),
                Op::PopTransform,
                Op::ClearArrays,
            ]
        );
        assert_eq!(draw.instance_count(), 0);
    }

    #[test]
    fn test_temporary_lists_and_generic_list() {
        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue
            .make_temporary_batch_list(Material::DEFAULT, Mat4::identity(), 64)
            .set_color(Color::RED);
        queue.generic_list().debug("overlay");

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        assert_eq!(
            out.ops(),
            vec![
                Op::SetMaterial(Material::DEFAULT.id()),
                Op::SetMatrix4x4(Mat4::identity()),
                Op::SetColor(Color::RED),
                Op::PopTransform,
                Op::Debug("overlay".to_string()),
            ]
        );
        assert_eq!(queue.stats().temporary_lists, 1);
        queue.end_render();

        // Pools are reused, not regrown
        queue.start_render(Mat4::identity());
        queue.make_temporary_batch_list(Material::DEFAULT, Mat4::identity(), 16);
        assert_eq!(queue.temporary_lists.capacity(), 1);
        assert_eq!(queue.elements.capacity(), 1);
        let mut out = DisplayList::new();
        queue.draw(&mut out);
        assert_eq!(out.ops().len(), 3);
        queue.end_render();
    }

    #[test]
    fn test_temporary_list_capacity_floor() {
        let mut queue = RenderQueue::new(&RenderConfig {
            temporary_list_capacity: 4096,
            ..RenderConfig::default()
        });
        queue.start_render(Mat4::identity());
        let small = queue.make_temporary_batch_list(Material::DEFAULT, Mat4::identity(), 8);
        assert!(small.capacity() >= 4096);
        let large = queue.make_temporary_batch_list(Material::DEFAULT, Mat4::identity(), 10_000);
        assert!(large.capacity() >= 10_000);
        queue.end_render();
    }

    #[test]
    fn test_interleaved_submissions_grouped_by_material_and_buffer() {
        let mut library = MaterialLibrary::new();
        let mat_a = library.register("a", 1, 0);
        let mat_b = library.register("b", 2, 0);
        let mut store = BufferStore::new();
        let buf_x = store.insert(RenderBuffer::from_positions(&[Vec3::zeros()]));
        let buf_y = store.insert(RenderBuffer::from_positions(&[Vec3::x()]));

        let marked = |text: &str| {
            let mut list = DisplayList::new();
            list.debug(text);
            list
        };
        let m1 = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0));
        let m2 = Mat4::new_translation(&Vec3::new(2.0, 0.0, 0.0));
        let m3 = Mat4::new_translation(&Vec3::new(3.0, 0.0, 0.0));

        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.add_batch(mat_a, m1, Some(buf_x), marked("e1"));
        queue.add_batch(mat_b, m2, Some(buf_y), marked("e2"));
        queue.add_batch(mat_a, m3, Some(buf_x), marked("e3"));

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        queue.end_render();

        assert_eq!(
            out.ops(),
            vec![
                Op::SetMaterial(mat_a.id()),
                Op::BindBuffer(buf_x),
                Op::SetMatrix4x4(m1),
                Op::Debug("e1".to_string()),
                Op::PopTransform,
                Op::SetMatrix4x4(m3),
                Op::Debug("e3".to_string()),
                Op::PopTransform,
                Op::ClearArrays,
                Op::SetMaterial(mat_b.id()),
                Op::BindBuffer(buf_y),
                Op::SetMatrix4x4(m2),
                Op::Debug("e2".to_string()),
                Op::PopTransform,
                Op::ClearArrays,
            ]
        );
        assert_eq!(queue.stats().material_batches, 2);
        assert_eq!(queue.stats().buffer_batches, 2);
        assert_eq!(queue.stats().elements, 3);
    }

    #[test]
    fn test_out_of_range_stage_uses_last() {
        let mut library = MaterialLibrary::new();
        let far = library.register("far", 0, 9);
        let mut queue = queue();
        queue.start_render(Mat4::identity());
        queue.add_batch(far, Mat4::identity(), None, DisplayList::new());
        assert_eq!(queue.stages[queue.stage_count() - 1].len(), 1);
        queue.end_render();
    }
}
