//! End-to-end tests: records and sprites through a scene into a display list

use std::cell::RefCell;
use std::rc::Rc;

use crate::assets::record::Record;
use crate::core::config::RenderConfig;
use crate::foundation::math::{Color, Mat4, Transform2D, Vec2, Vec3};
use crate::render::buffer::BufferStore;
use crate::render::display_list::{DisplayList, Op};
use crate::render::fragment::load_fragment;
use crate::render::import::import_display_list;
use crate::render::material::{MaterialId, MaterialLibrary};
use crate::render::render_queue::RenderQueue;
use crate::scene::{DrawSettings, EntityBehavior, EntityContext, Scene, Sprite};
use approx::assert_relative_eq;

const SHIP: &str = "\
# Translated diagonal
SetColor 1 1 1 1
PushTranslation 1 0 0
VertexArray
{
    0 0 0
    1 1 0
}
LineListArray { 0 1 }
PopTransform
";

const HULL: &str = "\
Fragment
{
    Material \"hull\"
    PBuffer
    {
        0 0 0
        1 0 0
        0 1 0
    }
    IndexBuffer { 0 1 2 }
    DisplayList
    {
        BindBuffer 0
        TriangleListBuffer 1
        ClearArrays
    }
}
";

fn library() -> MaterialLibrary {
    let mut library = MaterialLibrary::new();
    library.register("hull", 1, 0);
    library.register("glow", 8, 0);
    library
}

#[test]
fn test_imported_line_bounds() {
    let records = Record::parse_str(SHIP).unwrap();
    let list = import_display_list(&records, &library()).unwrap();

    let bounds = list.bounding_box().unwrap();
    assert_relative_eq!(bounds.min, Vec3::new(1.0, 0.0, 0.0));
    assert_relative_eq!(bounds.max, Vec3::new(2.0, 1.0, 0.0));

    let instance = list.create_instance();
    assert_eq!(instance.bounding_box(), Some(bounds));
    assert_eq!(instance.owned_bytes(), 0);
    assert_eq!(list.instance_count(), 1);
}

#[test]
fn test_drain_and_rewind_are_repeatable() {
    let records = Record::parse_str(SHIP).unwrap();
    let mut list = import_display_list(&records, &library()).unwrap();

    let mut first = Vec::new();
    while let Some(op) = list.pop_op() {
        first.push(op);
    }
    assert_eq!(list.pop_op(), None);

    list.rewind();
    let mut second = Vec::new();
    while let Some(op) = list.pop_op() {
        second.push(op);
    }
    assert_eq!(first, second);
    assert_eq!(first, list.ops());
}

#[test]
fn test_append_ignores_source_cursor() {
    let records = Record::parse_str(SHIP).unwrap();
    let mut source = import_display_list(&records, &library()).unwrap();
    source.pop_op();
    source.pop_op();
    let before = source.to_bytes();

    let mut dest = DisplayList::new();
    dest.append(&source);
    assert_eq!(dest.to_bytes(), before);
    assert_eq!(source.to_bytes(), before);
    assert_eq!(source.pop_op(), Some(Op::VertexArray(vec![Vec3::zeros(), Vec3::new(1.0, 1.0, 0.0)])));
}

#[test]
fn test_shared_fragment_buffer_bound_once() {
    let library = library();
    let mut store = BufferStore::new();
    let records = Record::parse_str(HULL).unwrap();
    let fragment = load_fragment(&records[0], &mut store, &library).unwrap();
    let vertices = fragment.buffers()[0];
    let hull = library.get("hull").unwrap();

    let mut scene = Scene::new(&RenderConfig::default());
    for (name, x) in [("left", -50.0), ("right", 50.0)] {
        let mut sprite = Sprite::new().at(Transform2D::from_position(Vec2::new(x, 0.0)));
        sprite.add_fragment(fragment.clone());
        let id = scene.entities_mut().create_sprite(name, sprite);
        scene.register_entity_on_top(id);
    }

    let mut out = DisplayList::new();
    scene.draw(&mut out, &DrawSettings::default());
    let ops = out.ops();

    let count = |wanted: &Op| ops.iter().filter(|op| *op == wanted).count();
    assert_eq!(count(&Op::SetMaterial(hull.id())), 1);
    assert_eq!(count(&Op::BindBuffer(vertices)), 1);
    assert_eq!(count(&Op::ClearArrays), 1);
    assert_eq!(ops.iter().filter(|op| matches!(op, Op::TriangleListBuffer(_))).count(), 2);

    let bind = ops.iter().position(|op| *op == Op::BindBuffer(vertices)).unwrap();
    let clear = ops.iter().position(|op| *op == Op::ClearArrays).unwrap();
    assert_eq!(ops[bind - 1], Op::SetMaterial(hull.id()));
    assert!(ops[bind + 1..clear].iter().all(|op| !matches!(op, Op::BindBuffer(_) | Op::ClearArrays)));
    assert_eq!(ops[clear + 1], Op::SetMaterial(MaterialId::DEFAULT));
    assert_eq!(scene.queue_stats().buffer_batches, 1);
    assert_eq!(scene.queue_stats().elements, 2);
}

#[test]
fn test_layers_order_batches_deterministically() {
    let library = library();
    let glow = library.get("glow").unwrap();
    let hull = library.get("hull").unwrap();

    let flush = |order: &[crate::render::material::Material]| {
        let mut queue = RenderQueue::new(&RenderConfig::default());
        queue.start_render(Mat4::identity());
        for material in order {
            queue.add_batch(*material, Mat4::identity(), None, DisplayList::new());
        }
        let mut out = DisplayList::new();
        queue.draw(&mut out);
        queue.end_render();
        out.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::SetMaterial(id) => Some(id),
                _ => None,
            })
            .collect::<Vec<_>>()
    };

    let expected = vec![hull.id(), glow.id()];
    assert_eq!(flush(&[glow, hull]), expected);
    assert_eq!(flush(&[hull, glow, hull]), expected);
    assert_eq!(flush(&[glow, glow, hull]), expected);
}

struct Blinker {
    frames: Rc<RefCell<u32>>,
}

impl EntityBehavior for Blinker {
    fn update(&mut self, ctx: &mut EntityContext<'_>, _dt: f32) {
        *self.frames.borrow_mut() += 1;
        if let Some(sprite) = ctx.sprite_mut() {
            sprite.set_color(Some(Color::RED));
        }
        ctx.destroy_self();
    }
}

#[test]
fn test_entity_removed_during_update_is_not_drawn() {
    let mut scene = Scene::new(&RenderConfig::default());
    let records = Record::parse_str(SHIP).unwrap();
    let list = import_display_list(&records, &library()).unwrap();

    let frames = Rc::new(RefCell::new(0));
    let survivor = scene.entities_mut().create_sprite("survivor", Sprite::with_display_list(list.clone()));
    let blinker = scene.entities_mut().create_sprite("blinker", Sprite::with_display_list(list));
    scene.entities_mut().set_behavior(blinker, Box::new(Blinker { frames: Rc::clone(&frames) }));
    scene.register_entity_on_top(survivor);
    scene.register_entity_on_top(blinker);

    scene.update(0.016);
    scene.update(0.016);
    assert_eq!(*frames.borrow(), 1);
    assert!(!scene.entities().contains(blinker));
    assert_eq!(scene.find_entity("survivor"), Some(survivor));

    let mut out = DisplayList::new();
    scene.draw(&mut out, &DrawSettings::default());
    let draws = out.ops().iter().filter(|op| op.is_draw()).count();
    assert_eq!(draws, 1);
}
