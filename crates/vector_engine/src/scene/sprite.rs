//! Drawable payload of an entity

use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Color, Transform2D};
use crate::render::display_list::DisplayList;
use crate::render::fragment::Fragment;
use crate::render::material::Material;
use crate::render::render_queue::RenderQueue;

/// Local transform plus whatever the entity draws
///
/// A sprite draws either a display list of its own (with optional colour and
/// material overrides), a set of fragments, or both.
#[derive(Debug, Clone, Default)]
pub struct Sprite {
    /// Placement relative to the parent entity
    pub transform: Transform2D,
    color: Option<Color>,
    material: Option<Material>,
    display_list: Option<DisplayList>,
    fragments: Vec<Fragment>,
    content_bounds: Option<Box2D>,
    locked_bounds: Option<Box2D>,
}

impl Sprite {
    /// Empty sprite at the parent origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Sprite drawing `list`
    pub fn with_display_list(list: DisplayList) -> Self {
        let mut sprite = Self::new();
        sprite.set_display_list(Some(list));
        sprite
    }

    /// Builder-style placement
    pub fn at(mut self, transform: Transform2D) -> Self {
        self.transform = transform;
        self
    }

    /// Replace the sprite's own display list
    pub fn set_display_list(&mut self, list: Option<DisplayList>) {
        self.display_list = list;
        self.refresh_content_bounds();
    }

    /// The sprite's own display list
    pub fn display_list(&self) -> Option<&DisplayList> {
        self.display_list.as_ref()
    }

    /// Add a fragment
    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
        self.refresh_content_bounds();
    }

    /// Fragments in submission order
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Mutable fragments, e.g. to toggle visibility
    pub fn fragments_mut(&mut self) -> &mut [Fragment] {
        &mut self.fragments
    }

    /// Colour emitted before the display list
    pub fn set_color(&mut self, color: Option<Color>) {
        self.color = color;
    }

    /// Colour override
    pub fn color(&self) -> Option<Color> {
        self.color
    }

    /// Material emitted before the display list
    pub fn set_material(&mut self, material: Option<Material>) {
        self.material = material;
    }

    /// Material override
    pub fn material(&self) -> Option<Material> {
        self.material
    }

    /// Fix the bounds; children and content no longer affect them
    pub fn lock_bounds(&mut self, bounds: Box2D) {
        self.locked_bounds = Some(bounds);
    }

    /// Go back to computed bounds
    pub fn unlock_bounds(&mut self) {
        self.locked_bounds = None;
    }

    /// Bounds set by [`Sprite::lock_bounds`]
    pub fn locked_bounds(&self) -> Option<Box2D> {
        self.locked_bounds
    }

    /// Bounds of the sprite's own display list and fragments, in local space
    pub fn content_bounds(&self) -> Option<Box2D> {
        self.content_bounds
    }

    fn refresh_content_bounds(&mut self) {
        let list_bounds = self.display_list.as_ref().and_then(DisplayList::bounding_box_2d);
        self.content_bounds = self
            .fragments
            .iter()
            .filter_map(|fragment| fragment.bounding_box().map(|b| b.to_2d()))
            .fold(list_bounds, |acc, b| Box2D::union_opt(acc, Some(b)));
    }

    /// Submit the sprite's content at the queue's current matrix
    ///
    /// The caller has already pushed [`Sprite::transform`].
    pub fn draw(&self, queue: &mut RenderQueue) {
        if let Some(list) = &self.display_list {
            let matrix = queue.matrix();
            let generic = queue.generic_list();
            generic.set_matrix(matrix);
            if let Some(material) = self.material {
                generic.set_material(material.id());
            }
            if let Some(color) = self.color {
                generic.set_color(color);
            }
            generic.append(list);
            generic.pop_transform();
        }

        for fragment in self.fragments.iter().filter(|f| f.visible) {
            queue.add_fragment_batch(fragment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RenderConfig;
    use crate::foundation::math::{Mat4, Vec2, Vec3};
    use crate::render::buffer::{BufferStore, RenderBuffer};
    use crate::render::display_list::op::Primitive;
    use crate::render::display_list::Op;
    use approx::assert_relative_eq;

    fn square() -> DisplayList {
        let mut list = DisplayList::new();
        list.vertex_array(&[
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ]);
        list.line_strip_array(&[0, 1, 2, 3, 0]);
        list
    }

    #[test]
    fn test_content_bounds_from_list_and_fragments() {
        let mut store = BufferStore::new();
        let vertices = store.insert(RenderBuffer::from_positions(&[Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 5.0, 0.0)]));
        let indices = store.insert(RenderBuffer::from_indices(&[0, 1]));
        let fragment = Fragment::from_buffers(Material::DEFAULT, vertices, indices, Primitive::LineList, &store);

        let mut sprite = Sprite::with_display_list(square());
        assert_relative_eq!(sprite.content_bounds().unwrap().max, Vec2::new(1.0, 1.0));

        sprite.add_fragment(fragment);
        let bounds = sprite.content_bounds().unwrap();
        assert_relative_eq!(bounds.min, Vec2::new(-1.0, -1.0));
        assert_relative_eq!(bounds.max, Vec2::new(4.0, 5.0));

        sprite.set_display_list(None);
        assert_relative_eq!(sprite.content_bounds().unwrap().min, Vec2::new(3.0, 0.0));
    }

    #[test]
    fn test_empty_sprite_has_no_bounds() {
        assert!(Sprite::new().content_bounds().is_none());
    }

    #[test]
    fn test_draw_stamps_generic_list() {
        let mut sprite = Sprite::with_display_list(square());
        sprite.set_color(Some(Color::GREEN));

        let mut queue = RenderQueue::new(&RenderConfig::default());
        queue.start_render(Mat4::identity());
        let matrix = queue.push_translation(Vec3::new(2.0, 0.0, 0.0));
        sprite.draw(&mut queue);
        queue.pop_matrix();

        let mut out = DisplayList::new();
        queue.draw(&mut out);
        queue.end_render();

        let ops = out.ops();
        assert_eq!(ops[0], Op::SetMatrix4x4(matrix));
        assert_eq!(ops[1], Op::SetColor(Color::GREEN));
        assert_eq!(ops.last(), Some(&Op::PopTransform));
        assert_eq!(ops.len(), 5);
    }
}
