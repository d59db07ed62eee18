//! Entity hierarchy
//!
//! Entities live in a slotmap arena and are linked into a tree by key:
//! parent, first child and a doubly linked sibling chain. New children are
//! prepended, so the most recently added child is visited first.
//!
//! Traversals tolerate callbacks that rearrange the tree. The next sibling
//! is captured before each callback, and an entity that asks to be
//! extracted or destroyed while it is being processed is only unlinked once
//! its own callback returns.

use std::fmt;

use bitflags::bitflags;
use slotmap::{new_key_type, SlotMap};

use crate::foundation::bounds::Box2D;
use crate::foundation::math::Vec2;
use crate::render::camera::VisibilityRegion;
use crate::render::render_queue::RenderQueue;
use crate::scene::sprite::Sprite;

new_key_type! {
    /// Handle to an entity in an [`EntityTree`]
    pub struct EntityId;
}

bitflags! {
    /// Per-entity state
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntityFlags: u8 {
        /// Drawn and hit-tested
        const VISIBLE = 0b0000_0001;
        /// Considered by position queries
        const CLICKABLE = 0b0000_0010;
        /// Inside its own update or draw
        const PROCESSING = 0b0000_0100;
        /// Unlink once processing ends
        const EXTRACT_QUEUED = 0b0000_1000;
        /// Destroy once processing ends
        const DESTROY_QUEUED = 0b0001_0000;
    }
}

/// Custom per-entity logic
pub trait EntityBehavior {
    /// Advance the entity; may rearrange the tree, including removing itself
    fn update(&mut self, _ctx: &mut EntityContext<'_>, _dt: f32) {}

    /// Submit extra geometry at the entity's current matrix
    fn draw(&self, _id: EntityId, _tree: &EntityTree, _queue: &mut RenderQueue) {}
}

/// What an [`EntityBehavior`] sees during update
pub struct EntityContext<'a> {
    id: EntityId,
    tree: &'a mut EntityTree,
}

impl EntityContext<'_> {
    /// Entity being updated
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The whole tree
    pub fn tree(&mut self) -> &mut EntityTree {
        self.tree
    }

    /// The entity's sprite
    pub fn sprite_mut(&mut self) -> Option<&mut Sprite> {
        self.tree.sprite_mut(self.id)
    }

    /// Unlink this entity once its update returns
    pub fn extract_self(&mut self) {
        self.tree.extract(self.id);
    }

    /// Destroy this entity once its update returns
    pub fn destroy_self(&mut self) {
        self.tree.destroy(self.id);
    }
}

struct EntityNode {
    name: String,
    parent: Option<EntityId>,
    first_child: Option<EntityId>,
    next: Option<EntityId>,
    prev: Option<EntityId>,
    flags: EntityFlags,
    sprite: Option<Sprite>,
    behavior: Option<Box<dyn EntityBehavior>>,
}

impl EntityNode {
    fn new(name: &str, sprite: Option<Sprite>) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            first_child: None,
            next: None,
            prev: None,
            flags: EntityFlags::VISIBLE | EntityFlags::CLICKABLE,
            sprite,
            behavior: None,
        }
    }
}

/// Arena of entities under a single root
pub struct EntityTree {
    nodes: SlotMap<EntityId, EntityNode>,
    root: EntityId,
}

impl EntityTree {
    /// Tree holding only the root
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(EntityNode::new("root", None));
        Self { nodes, root }
    }

    /// Root entity; top-level entities are its children
    pub fn root(&self) -> EntityId {
        self.root
    }

    /// Entities other than the root, linked or not
    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Whether only the root exists
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` refers to a live entity
    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Create an unlinked entity
    pub fn create_entity(&mut self, name: &str) -> EntityId {
        self.nodes.insert(EntityNode::new(name, None))
    }

    /// Create an unlinked entity that draws `sprite`
    pub fn create_sprite(&mut self, name: &str, sprite: Sprite) -> EntityId {
        self.nodes.insert(EntityNode::new(name, Some(sprite)))
    }

    fn node(&self, id: EntityId) -> &EntityNode {
        match self.nodes.get(id) {
            Some(node) => node,
            None => panic!("unknown entity {:?}", id),
        }
    }

    fn node_mut(&mut self, id: EntityId) -> &mut EntityNode {
        match self.nodes.get_mut(id) {
            Some(node) => node,
            None => panic!("unknown entity {:?}", id),
        }
    }

    /// Entity name
    pub fn name(&self, id: EntityId) -> Option<&str> {
        self.nodes.get(id).map(|node| node.name.as_str())
    }

    /// Parent, if linked
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(id).and_then(|node| node.parent)
    }

    /// Children in traversal order
    pub fn children(&self, id: EntityId) -> Vec<EntityId> {
        let mut children = Vec::new();
        let mut current = self.nodes.get(id).and_then(|node| node.first_child);
        while let Some(child) = current {
            children.push(child);
            current = self.node(child).next;
        }
        children
    }

    /// Sprite payload
    pub fn sprite(&self, id: EntityId) -> Option<&Sprite> {
        self.nodes.get(id).and_then(|node| node.sprite.as_ref())
    }

    /// Mutable sprite payload
    pub fn sprite_mut(&mut self, id: EntityId) -> Option<&mut Sprite> {
        self.nodes.get_mut(id).and_then(|node| node.sprite.as_mut())
    }

    /// State flags; empty for unknown ids
    pub fn flags(&self, id: EntityId) -> EntityFlags {
        self.nodes.get(id).map_or(EntityFlags::empty(), |node| node.flags)
    }

    /// Whether the entity is drawn
    pub fn is_visible(&self, id: EntityId) -> bool {
        self.flags(id).contains(EntityFlags::VISIBLE)
    }

    /// Show or hide the entity and its children
    pub fn set_visible(&mut self, id: EntityId, visible: bool) {
        self.node_mut(id).flags.set(EntityFlags::VISIBLE, visible);
    }

    /// Whether position queries consider the entity
    pub fn is_clickable(&self, id: EntityId) -> bool {
        self.flags(id).contains(EntityFlags::CLICKABLE)
    }

    /// Include or exclude the entity from position queries
    pub fn set_clickable(&mut self, id: EntityId, clickable: bool) {
        self.node_mut(id).flags.set(EntityFlags::CLICKABLE, clickable);
    }

    /// Attach custom logic
    pub fn set_behavior(&mut self, id: EntityId, behavior: Box<dyn EntityBehavior>) {
        self.node_mut(id).behavior = Some(behavior);
    }

    fn is_ancestor(&self, ancestor: EntityId, id: EntityId) -> bool {
        let mut current = Some(id);
        while let Some(entity) = current {
            if entity == ancestor {
                return true;
            }
            current = self.parent(entity);
        }
        false
    }

    fn assert_linkable(&self, parent: EntityId, entity: EntityId) {
        assert!(entity != self.root, "the root entity cannot be relinked");
        assert!(
            !self.is_ancestor(entity, parent),
            "linking {:?} under {:?} would create a cycle",
            entity,
            parent
        );
    }

    /// Make `child` the first child of `parent`, moving it from wherever it was
    pub fn add_child(&mut self, parent: EntityId, child: EntityId) {
        assert!(self.contains(parent), "unknown entity {:?}", parent);
        self.assert_linkable(parent, child);
        self.detach(child);

        let old_first = self.node(parent).first_child;
        {
            let node = self.node_mut(child);
            node.parent = Some(parent);
            node.next = old_first;
        }
        if let Some(first) = old_first {
            self.node_mut(first).prev = Some(child);
        }
        self.node_mut(parent).first_child = Some(child);
    }

    /// Unlink `child` from `parent`
    ///
    /// Panics if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) {
        assert_eq!(
            self.parent(child),
            Some(parent),
            "{:?} is not a child of {:?}",
            child,
            parent
        );
        self.extract(child);
    }

    /// Insert `entity` right after `anchor` among `anchor`'s siblings
    pub fn append(&mut self, anchor: EntityId, entity: EntityId) {
        let Some(parent) = self.parent(anchor) else {
            panic!("append anchor {:?} is not linked", anchor);
        };
        assert!(anchor != entity, "cannot append an entity after itself");
        self.assert_linkable(parent, entity);
        self.detach(entity);

        let after = self.node(anchor).next;
        {
            let node = self.node_mut(entity);
            node.parent = Some(parent);
            node.prev = Some(anchor);
            node.next = after;
        }
        if let Some(next) = after {
            self.node_mut(next).prev = Some(entity);
        }
        self.node_mut(anchor).next = Some(entity);
    }

    /// Insert `entity` right before `anchor` among `anchor`'s siblings
    pub fn prepend(&mut self, anchor: EntityId, entity: EntityId) {
        let Some(parent) = self.parent(anchor) else {
            panic!("prepend anchor {:?} is not linked", anchor);
        };
        assert!(anchor != entity, "cannot prepend an entity before itself");
        self.assert_linkable(parent, entity);
        self.detach(entity);

        let before = self.node(anchor).prev;
        {
            let node = self.node_mut(entity);
            node.parent = Some(parent);
            node.prev = before;
            node.next = Some(anchor);
        }
        match before {
            Some(prev) => self.node_mut(prev).next = Some(entity),
            None => self.node_mut(parent).first_child = Some(entity),
        }
        self.node_mut(anchor).prev = Some(entity);
    }

    /// Last child, if any
    pub fn last_child(&self, id: EntityId) -> Option<EntityId> {
        let mut current = self.node(id).first_child?;
        while let Some(next) = self.node(current).next {
            current = next;
        }
        Some(current)
    }

    /// Unlink `id` from its parent, deferred while it is being processed
    pub fn extract(&mut self, id: EntityId) {
        let Some(node) = self.nodes.get_mut(id) else {
            log::warn!("Extracting unknown entity {:?}", id);
            return;
        };
        if node.flags.contains(EntityFlags::PROCESSING) {
            node.flags.insert(EntityFlags::EXTRACT_QUEUED);
            log::trace!("Deferring extract of '{}'", node.name);
        } else {
            self.unlink(id);
        }
    }

    /// Remove `id` and its whole subtree, deferred while it is being processed
    pub fn destroy(&mut self, id: EntityId) {
        assert!(id != self.root, "the root entity cannot be destroyed");
        let Some(node) = self.nodes.get_mut(id) else {
            log::warn!("Destroying unknown entity {:?}", id);
            return;
        };
        if node.flags.contains(EntityFlags::PROCESSING) {
            node.flags.insert(EntityFlags::DESTROY_QUEUED);
            log::trace!("Deferring destroy of '{}'", node.name);
            return;
        }

        self.unlink(id);
        let mut pending = vec![id];
        while let Some(entity) = pending.pop() {
            pending.extend(self.children(entity));
            if let Some(node) = self.nodes.remove(entity) {
                log::trace!("Destroyed entity '{}'", node.name);
            }
        }
    }

    /// Immediate unlink that also cancels a pending deferred extract
    fn detach(&mut self, id: EntityId) {
        self.unlink(id);
        self.node_mut(id).flags.remove(EntityFlags::EXTRACT_QUEUED);
    }

    fn unlink(&mut self, id: EntityId) {
        let (parent, prev, next) = {
            let node = self.node_mut(id);
            let links = (node.parent, node.prev, node.next);
            node.parent = None;
            node.prev = None;
            node.next = None;
            links
        };
        if let Some(next) = next {
            self.node_mut(next).prev = prev;
        }
        match (prev, parent) {
            (Some(prev), _) => self.node_mut(prev).next = next,
            (None, Some(parent)) => self.node_mut(parent).first_child = next,
            (None, None) => {}
        }
    }

    /// First entity named `name`, searching `from` then its children depth-first
    pub fn find(&self, from: EntityId, name: &str) -> Option<EntityId> {
        if self.node(from).name == name {
            return Some(from);
        }
        self.children(from).into_iter().find_map(|child| self.find(child, name))
    }

    /// Frontmost visible, clickable sprite under `position`
    ///
    /// `position` is in the parent space of `from`.
    pub fn find_entity_at_position(&self, from: EntityId, position: Vec2) -> Option<EntityId> {
        let node = self.node(from);
        if !node.flags.contains(EntityFlags::VISIBLE | EntityFlags::CLICKABLE) {
            return None;
        }
        let local = match &node.sprite {
            Some(sprite) => sprite.transform.apply_inverse_to(position),
            None => position,
        };

        if let Some(hit) = self
            .children(from)
            .into_iter()
            .find_map(|child| self.find_entity_at_position(child, local))
        {
            return Some(hit);
        }

        let sprite = node.sprite.as_ref()?;
        let bounds = sprite.locked_bounds().or(sprite.content_bounds())?;
        bounds.contains_point(local).then_some(from)
    }

    /// Bounds of the entity and its subtree in the entity's local space
    ///
    /// Child bounds are offset by the child's position only.
    pub fn bounding_box(&self, id: EntityId) -> Option<Box2D> {
        let node = self.node(id);
        if let Some(locked) = node.sprite.as_ref().and_then(Sprite::locked_bounds) {
            return Some(locked);
        }
        let own = node.sprite.as_ref().and_then(Sprite::content_bounds);
        self.children(id).into_iter().fold(own, |acc, child| {
            let offset = self.sprite(child).map_or(Vec2::zeros(), |s| s.transform.position);
            let child_bounds = self.bounding_box(child).map(|b| b.translated(offset));
            Box2D::union_opt(acc, child_bounds)
        })
    }

    /// Largest distance from the entity origin to its bounds
    pub fn bounding_radius(&self, id: EntityId) -> f32 {
        self.bounding_box(id).map_or(0.0, |b| b.max_distance_from_origin())
    }

    /// Whether the entity might be visible in `visibility`
    ///
    /// `visibility` is in the entity's parent space. Entities without
    /// bounds always pass.
    pub fn on_screen(&self, id: EntityId, visibility: &VisibilityRegion) -> bool {
        if !self.is_visible(id) {
            return false;
        }
        let Some(sprite) = self.sprite(id) else {
            return true;
        };
        let Some(bounds) = self.bounding_box(id) else {
            return true;
        };
        let center = sprite.transform.apply_to(bounds.center());
        let radius = bounds.size().norm() * 0.5 * sprite.transform.max_scale();
        visibility.overlaps_circle(center, radius)
    }

    /// Visit the children of `parent`, tolerating changes made by `visit`
    ///
    /// Children are snapshotted up front. One that has been destroyed or moved
    /// away by the time its turn comes is skipped; one added mid-walk waits for
    /// the next traversal.
    fn for_each_child(&mut self, parent: EntityId, mut visit: impl FnMut(&mut Self, EntityId)) {
        for id in self.children(parent) {
            if self.parent(id) == Some(parent) {
                visit(self, id);
            }
        }
    }

    /// Returns whether the entity was already being processed
    fn begin_processing(&mut self, id: EntityId) -> bool {
        let flags = &mut self.node_mut(id).flags;
        let nested = flags.contains(EntityFlags::PROCESSING);
        flags.insert(EntityFlags::PROCESSING);
        nested
    }

    fn end_processing(&mut self, id: EntityId, nested: bool) {
        if nested {
            return;
        }
        let node = self.node_mut(id);
        node.flags.remove(EntityFlags::PROCESSING);
        if node.flags.contains(EntityFlags::DESTROY_QUEUED) {
            self.destroy(id);
        } else if node.flags.contains(EntityFlags::EXTRACT_QUEUED) {
            node.flags.remove(EntityFlags::EXTRACT_QUEUED);
            self.unlink(id);
        }
    }

    /// Update `id`, then its children
    pub fn update(&mut self, id: EntityId, dt: f32) {
        let nested = self.begin_processing(id);

        if let Some(mut behavior) = self.node_mut(id).behavior.take() {
            behavior.update(&mut EntityContext { id, tree: self }, dt);
            let node = self.node_mut(id);
            if node.behavior.is_none() {
                node.behavior = Some(behavior);
            }
        }

        if !self.flags(id).contains(EntityFlags::DESTROY_QUEUED) {
            self.for_each_child(id, |tree, child| tree.update(child, dt));
        }

        self.end_processing(id, nested);
    }

    /// Submit `id` and its on-screen children to `queue`
    ///
    /// `visibility` is in the local space `id` is drawn into.
    pub fn draw(&mut self, id: EntityId, queue: &mut RenderQueue, visibility: &VisibilityRegion) {
        if !self.is_visible(id) {
            return;
        }
        let nested = self.begin_processing(id);

        let transform = self.sprite(id).map(|sprite| sprite.transform);
        if let Some(transform) = &transform {
            queue.push_transform_2d(transform);
        }
        if let Some(sprite) = self.sprite(id) {
            sprite.draw(queue);
        }

        if let Some(behavior) = self.node_mut(id).behavior.take() {
            behavior.draw(id, self, queue);
            let node = self.node_mut(id);
            if node.behavior.is_none() {
                node.behavior = Some(behavior);
            }
        }

        let child_visibility = match &transform {
            Some(transform) => visibility.to_local(transform),
            None => *visibility,
        };
        self.for_each_child(id, |tree, child| {
            if tree.on_screen(child, &child_visibility) {
                tree.draw(child, queue, &child_visibility);
            }
        });

        if transform.is_some() {
            queue.pop_matrix();
        }
        self.end_processing(id, nested);
    }
}

impl Default for EntityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntityTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTree")
            .field("entities", &self.len())
            .field("top_level", &self.children(self.root).len())
            .finish()
    }
}
