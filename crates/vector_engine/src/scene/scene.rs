//! Scene: cameras, lights and an entity tree drawn through a render queue

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::config::RenderConfig;
use crate::foundation::bounds::Box2D;
use crate::foundation::math::{Mat4, Vec2, Vec3};
use crate::render::camera::{Camera2D, Camera3D, ScreenOrientation, VisibilityRegion};
use crate::render::display_list::DisplayList;
use crate::render::light::{Fog, Light};
use crate::render::material::MaterialId;
use crate::render::render_queue::{QueueStats, RenderQueue};
use crate::scene::entity::{EntityId, EntityTree};
use crate::scene::SceneError;

/// A camera the scene owns, or one shared with the caller
///
/// Shared cameras are not advanced by [`Scene::update`].
#[derive(Debug, Clone)]
pub enum CameraSlot<C> {
    /// Updated by the scene
    Owned(C),
    /// Updated by whoever else holds it
    Shared(Rc<RefCell<C>>),
}

impl<C: Clone> CameraSlot<C> {
    /// Snapshot of the camera
    pub fn get(&self) -> C {
        match self {
            CameraSlot::Owned(camera) => camera.clone(),
            CameraSlot::Shared(camera) => camera.borrow().clone(),
        }
    }

    /// Whether the scene owns the camera
    pub fn is_owned(&self) -> bool {
        matches!(self, CameraSlot::Owned(_))
    }
}

/// Per-call overrides for [`Scene::draw`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawSettings {
    /// Viewport used instead of the scene's own
    pub viewport: Option<Box2D>,
    /// Horizontal shift in pixels, for stereo pairs
    pub pixel_offset: f32,
    /// Offset applied in camera space
    pub camera_offset: Option<Vec3>,
}

/// One layer of presentation: world, HUD, debug overlay, ...
#[derive(Debug)]
pub struct Scene {
    camera_2d: CameraSlot<Camera2D>,
    camera_3d: CameraSlot<Camera3D>,
    entities: EntityTree,
    lights: Vec<Option<Light>>,
    fog: Option<Fog>,
    viewport: Option<Box2D>,
    is_3d: bool,
    flat_shading: bool,
    stencil_test: bool,
    orientation: ScreenOrientation,
    screen_width: f32,
    queue: RenderQueue,
}

impl Scene {
    /// Empty 2D scene whose camera shows the screen one unit per pixel
    pub fn new(config: &RenderConfig) -> Self {
        log::info!(
            "Creating scene: {}x{}, {} light slots, {:?}",
            config.screen_width,
            config.screen_height,
            config.max_lights,
            config.orientation
        );
        Self {
            camera_2d: CameraSlot::Owned(Camera2D::new(config.screen_height as f32, config.aspect_ratio())),
            camera_3d: CameraSlot::Owned(Camera3D::default()),
            entities: EntityTree::new(),
            lights: vec![None; config.max_lights],
            fog: None,
            viewport: None,
            is_3d: false,
            flat_shading: false,
            stencil_test: false,
            orientation: config.orientation,
            screen_width: config.screen_width.max(1) as f32,
            queue: RenderQueue::new(config),
        }
    }

    /// The entity tree
    pub fn entities(&self) -> &EntityTree {
        &self.entities
    }

    /// Mutable entity tree
    pub fn entities_mut(&mut self) -> &mut EntityTree {
        &mut self.entities
    }

    /// Advance entities, then any camera the scene owns
    pub fn update(&mut self, dt: f32) {
        let root = self.entities.root();
        self.entities.update(root, dt);

        if let CameraSlot::Owned(camera) = &mut self.camera_2d {
            camera.update(dt);
        }
        if let CameraSlot::Owned(camera) = &mut self.camera_3d {
            camera.update(dt);
        }
    }

    /// Render the scene into `out`
    ///
    /// Every piece of state the scene sets is cleared again at the end, and
    /// the material is reset to the default, so scenes can be drawn back to
    /// back into one list.
    pub fn draw(&mut self, out: &mut DisplayList, settings: &DrawSettings) {
        if self.flat_shading {
            out.flat_shading();
        } else {
            out.smooth_shading();
        }

        let viewport = settings.viewport.or(self.viewport);
        if let Some(viewport) = viewport {
            out.set_viewport(viewport);
        }
        if self.stencil_test {
            out.enable_stencil();
        }

        let stereo = Mat4::new_translation(&Vec3::new(2.0 * settings.pixel_offset / self.screen_width, 0.0, 0.0));
        let offset = settings.camera_offset.unwrap_or_else(Vec3::zeros);
        let mut lights_emitted = false;
        let mut fog_emitted = false;

        let (base, visibility) = if self.is_3d {
            let camera = self.camera_3d.get();
            out.set_projection_matrix(stereo * self.orientation.rotation_matrix() * camera.projection_matrix());
            out.set_camera_transform(camera.camera_transform() * Mat4::new_translation(&offset));
            for light in self.lights.iter().flatten() {
                out.light(*light);
                lights_emitted = true;
            }
            if let Some(fog) = self.fog {
                out.fog(fog);
                fog_emitted = true;
            }
            (Mat4::identity(), VisibilityRegion::UNBOUNDED)
        } else {
            let camera = self.camera_2d.get();
            out.set_projection_matrix(stereo * camera.projection_matrix());
            out.set_camera_transform(Mat4::identity());
            let region = camera.visibility_region();
            let shift: Vec2 = offset.xy();
            let visibility = VisibilityRegion::new(region.center, region.radius + shift.norm());
            let base = self.orientation.rotation_matrix() * Mat4::new_translation(&-offset) * camera.view_matrix();
            (base, visibility)
        };

        self.queue.start_render(base);
        let root = self.entities.root();
        self.entities.draw(root, &mut self.queue, &visibility);
        self.queue.draw(out);
        self.queue.end_render();

        if lights_emitted {
            out.clear_lights();
        }
        if fog_emitted {
            out.clear_fog();
        }
        if self.stencil_test {
            out.disable_stencil();
        }
        if viewport.is_some() {
            out.clear_viewport();
        }
        out.set_material(MaterialId::DEFAULT);
    }

    /// Counts from the last draw
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Put `light` in the first free slot and return the slot
    pub fn add_light(&mut self, light: Light) -> Result<usize, SceneError> {
        match self.lights.iter().position(Option::is_none) {
            Some(slot) => {
                self.lights[slot] = Some(light);
                Ok(slot)
            }
            None => {
                log::warn!("Scene light slots full ({}), dropping {:?}", self.lights.len(), light.kind);
                Err(SceneError::LightSlotsFull {
                    capacity: self.lights.len(),
                })
            }
        }
    }

    /// Empty a light slot
    pub fn remove_light(&mut self, slot: usize) -> Option<Light> {
        self.lights.get_mut(slot).and_then(Option::take)
    }

    /// Empty every light slot
    pub fn clear_lights(&mut self) {
        self.lights.iter_mut().for_each(|slot| *slot = None);
    }

    /// Occupied light slots
    pub fn lights(&self) -> impl Iterator<Item = (usize, &Light)> {
        self.lights
            .iter()
            .enumerate()
            .filter_map(|(slot, light)| light.as_ref().map(|light| (slot, light)))
    }

    /// Enable fog
    pub fn set_fog(&mut self, fog: Fog) {
        self.fog = Some(fog);
    }

    /// Disable fog
    pub fn clear_fog(&mut self) {
        self.fog = None;
    }

    /// Current fog
    pub fn fog(&self) -> Option<Fog> {
        self.fog
    }

    /// Restrict drawing to `viewport` (normalised screen coordinates)
    pub fn set_viewport(&mut self, viewport: Box2D) {
        self.viewport = Some(viewport);
    }

    /// Draw to the whole screen
    pub fn clear_viewport(&mut self) {
        self.viewport = None;
    }

    /// Own a 2D camera
    pub fn set_camera_2d(&mut self, camera: Camera2D) {
        self.camera_2d = CameraSlot::Owned(camera);
    }

    /// Use a camera someone else updates
    pub fn set_camera_2d_reference(&mut self, camera: Rc<RefCell<Camera2D>>) {
        self.camera_2d = CameraSlot::Shared(camera);
    }

    /// Current 2D camera
    pub fn camera_2d(&self) -> Camera2D {
        self.camera_2d.get()
    }

    /// The owned 2D camera, if the scene owns it
    pub fn camera_2d_mut(&mut self) -> Option<&mut Camera2D> {
        match &mut self.camera_2d {
            CameraSlot::Owned(camera) => Some(camera),
            CameraSlot::Shared(_) => None,
        }
    }

    /// Own a 3D camera; switches the scene to 3D
    pub fn set_camera_3d(&mut self, camera: Camera3D) {
        self.camera_3d = CameraSlot::Owned(camera);
        self.is_3d = true;
    }

    /// Use a 3D camera someone else updates; switches the scene to 3D
    pub fn set_camera_3d_reference(&mut self, camera: Rc<RefCell<Camera3D>>) {
        self.camera_3d = CameraSlot::Shared(camera);
        self.is_3d = true;
    }

    /// Current 3D camera
    ///
    /// A new scene owns a default perspective camera.
    pub fn camera_3d(&self) -> Camera3D {
        self.camera_3d.get()
    }

    /// Switch between 2D and 3D drawing
    pub fn set_3d(&mut self, is_3d: bool) {
        self.is_3d = is_3d;
    }

    /// Whether the scene draws in 3D
    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    /// Flat or smooth shading
    pub fn set_flat_shading(&mut self, flat: bool) {
        self.flat_shading = flat;
    }

    /// Stencil testing around the scene
    pub fn set_stencil_test(&mut self, enabled: bool) {
        self.stencil_test = enabled;
    }

    /// Device rotation
    pub fn set_orientation(&mut self, orientation: ScreenOrientation) {
        self.orientation = orientation;
    }

    /// Device rotation
    pub fn orientation(&self) -> ScreenOrientation {
        self.orientation
    }

    /// Add a top-level entity drawn after all others
    pub fn register_entity_on_top(&mut self, id: EntityId) {
        let root = self.entities.root();
        match self.entities.last_child(root) {
            Some(last) if last == id => {}
            Some(last) => self.entities.append(last, id),
            None => self.entities.add_child(root, id),
        }
    }

    /// Add a top-level entity drawn before all others
    pub fn register_entity_on_bottom(&mut self, id: EntityId) {
        let root = self.entities.root();
        self.entities.add_child(root, id);
    }

    /// First entity named `name`
    pub fn find_entity(&self, name: &str) -> Option<EntityId> {
        self.entities.find(self.entities.root(), name)
    }

    /// Frontmost clickable entity under a scene-space position
    pub fn find_entity_at_position(&self, position: Vec2) -> Option<EntityId> {
        self.entities.find_entity_at_position(self.entities.root(), position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Color, Transform2D};
    use crate::render::display_list::Op;
    use crate::scene::sprite::Sprite;
    use approx::assert_relative_eq;

    fn config() -> RenderConfig {
        RenderConfig::default().with_max_lights(2)
    }

    fn dot(x: f32, y: f32) -> Sprite {
        let mut list = DisplayList::new();
        list.vertex_array(&[Vec3::zeros()]);
        list.points_array(&[0]);
        Sprite::with_display_list(list).at(Transform2D::from_position(Vec2::new(x, y)))
    }

    #[test]
    fn test_light_slots_fill_then_fail() {
        let mut scene = Scene::new(&config());
        assert_eq!(scene.add_light(Light::ambient(Color::WHITE)), Ok(0));
        assert_eq!(scene.add_light(Light::ambient(Color::RED)), Ok(1));
        assert_eq!(
            scene.add_light(Light::ambient(Color::BLUE)),
            Err(SceneError::LightSlotsFull { capacity: 2 })
        );

        assert!(scene.remove_light(0).is_some());
        assert_eq!(scene.add_light(Light::ambient(Color::BLUE)), Ok(0));
        assert_eq!(scene.lights().count(), 2);
        scene.clear_lights();
        assert_eq!(scene.lights().count(), 0);
    }

    #[test]
    fn test_2d_draw_order_and_cleanup() {
        let mut scene = Scene::new(&config());
        scene.set_viewport(Box2D::new(Vec2::zeros(), Vec2::new(0.5, 0.5)));
        scene.set_stencil_test(true);
        let id = scene.entities_mut().create_sprite("dot", dot(0.0, 0.0));
        scene.register_entity_on_top(id);

        let mut out = DisplayList::new();
        scene.draw(&mut out, &DrawSettings::default());
        let names: Vec<&str> = out.ops().iter().map(Op::name).collect();
        assert_eq!(
            names,
            vec![
                "SmoothShading",
                "SetViewport",
                "EnableStencil",
                "SetProjectionMatrix4x4",
                "SetCameraTransform",
                "SetMatrix4x4",
                "VertexArray",
                "PointsArray",
                "PopTransform",
                "DisableStencil",
                "ClearViewport",
                "SetMaterial",
            ]
        );
        assert_eq!(out.ops().last(), Some(&Op::SetMaterial(MaterialId::DEFAULT)));
    }

    #[test]
    fn test_2d_culls_entities_outside_camera() {
        let mut scene = Scene::new(&config());
        let near = scene.entities_mut().create_sprite("near", dot(10.0, 10.0));
        let far = scene.entities_mut().create_sprite("far", dot(1.0e6, 0.0));
        scene.register_entity_on_top(near);
        scene.register_entity_on_top(far);

        let mut out = DisplayList::new();
        scene.draw(&mut out, &DrawSettings::default());
        let points = out.ops().iter().filter(|op| matches!(op, Op::PointsArray(_))).count();
        assert_eq!(points, 1);
    }

    #[test]
    fn test_3d_emits_lights_and_fog() {
        let mut scene = Scene::new(&config());
        scene.set_camera_3d(Camera3D::default());
        scene.add_light(Light::directional(Vec3::new(0.0, -1.0, 0.0), Color::WHITE)).unwrap();
        scene.set_fog(Fog::exponential(Color::BLACK, 0.1));
        let far = scene.entities_mut().create_sprite("far", dot(1.0e6, 0.0));
        scene.register_entity_on_bottom(far);

        let mut out = DisplayList::new();
        scene.draw(&mut out, &DrawSettings::default());
        let names: Vec<&str> = out.ops().iter().map(Op::name).collect();
        assert_eq!(
            names,
            vec![
                "SmoothShading",
                "SetProjectionMatrix4x4",
                "SetCameraTransform",
                "Light",
                "Fog",
                "SetMatrix4x4",
                "VertexArray",
                "PointsArray",
                "PopTransform",
                "ClearLights",
                "ClearFog",
                "SetMaterial",
            ]
        );
    }

    #[test]
    fn test_new_scene_draws_3d_with_default_camera() {
        let mut scene = Scene::new(&config());
        scene.set_3d(true);

        let mut out = DisplayList::new();
        scene.draw(&mut out, &DrawSettings::default());
        let expected = scene.orientation().rotation_matrix() * Camera3D::default().projection_matrix();
        match &out.ops()[1] {
            Op::SetProjectionMatrix4x4(matrix) => assert_relative_eq!(*matrix, expected),
            other => panic!("expected a projection matrix, got {:?}", other),
        }
        match &out.ops()[2] {
            Op::SetCameraTransform(matrix) => assert_relative_eq!(*matrix, Camera3D::default().camera_transform()),
            other => panic!("expected a camera transform, got {:?}", other),
        }

        scene.set_3d(false);
        assert!(!scene.is_3d());
        assert_relative_eq!(
            scene.camera_3d().projection_matrix(),
            Camera3D::default().projection_matrix()
        );
    }

    #[test]
    fn test_shared_camera_not_updated() {
        let mut scene = Scene::new(&config());
        let mut owned = Camera2D::default();
        owned.velocity = Vec2::new(1.0, 0.0);
        scene.set_camera_2d(owned.clone());
        scene.update(2.0);
        assert_relative_eq!(scene.camera_2d().position, Vec2::new(2.0, 0.0));

        let shared = Rc::new(RefCell::new(owned));
        scene.set_camera_2d_reference(Rc::clone(&shared));
        scene.update(2.0);
        assert_relative_eq!(shared.borrow().position, Vec2::zeros());
        assert!(scene.camera_2d_mut().is_none());
    }

    #[test]
    fn test_registration_order_and_lookup() {
        let mut scene = Scene::new(&config());
        let a = scene.entities_mut().create_sprite("a", dot(0.0, 0.0));
        let b = scene.entities_mut().create_sprite("b", dot(0.0, 0.0));
        let c = scene.entities_mut().create_sprite("c", dot(0.0, 0.0));
        scene.register_entity_on_top(a);
        scene.register_entity_on_top(b);
        scene.register_entity_on_bottom(c);

        let root = scene.entities().root();
        assert_eq!(scene.entities().children(root), vec![c, a, b]);
        assert_eq!(scene.find_entity("b"), Some(b));
        assert_eq!(scene.find_entity("nobody"), None);
    }
}
