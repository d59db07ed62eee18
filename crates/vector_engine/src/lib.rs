//! # Vector Engine
//!
//! Display-list rendering core for a 2D-oriented game engine.
//!
//! ## Features
//!
//! - **Display lists**: typed opcode streams with a compact byte encoding,
//!   shared instances and bounding analysis
//! - **Render queue**: per-frame batching by material layer and vertex buffer
//! - **Scenes**: cameras, lights and a sprite hierarchy drawn once per frame
//! - **Text import**: display lists and fragments authored as records
//!
//! Nothing here talks to a graphics API. A renderer drains the finished
//! [`DisplayList`](render::DisplayList) with `pop_op`.
//!
//! ## Quick Start
//!
//! ```rust
//! use vector_engine::prelude::*;
//!
//! let config = RenderConfig::default();
//! let mut scene = Scene::new(&config);
//!
//! let mut square = DisplayList::new();
//! square.vertex_array(&[
//!     Vec3::new(-1.0, -1.0, 0.0),
//!     Vec3::new(1.0, -1.0, 0.0),
//!     Vec3::new(1.0, 1.0, 0.0),
//!     Vec3::new(-1.0, 1.0, 0.0),
//! ]);
//! square.line_strip_array(&[0, 1, 2, 3, 0]);
//!
//! let ship = scene.entities_mut().create_sprite("ship", Sprite::with_display_list(square));
//! scene.register_entity_on_top(ship);
//!
//! scene.update(1.0 / 60.0);
//! let mut frame = DisplayList::new();
//! scene.draw(&mut frame, &DrawSettings::default());
//! while let Some(op) = frame.pop_op() {
//!     // hand `op` to the backend
//!     let _ = op;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod core;

pub mod foundation;
pub mod config;
pub mod assets;
pub mod render;
pub mod scene;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{Record, RecordError},
        core::config::{ApplicationConfig, Config, LoggingConfig, RenderConfig},
        foundation::{
            bounds::{Box2D, Box3D},
            math::{Color, Mat4, Quat, Transform2D, Transform3D, Vec2, Vec3},
        },
        render::{
            import_display_list, load_fragment, BufferId, BufferStore, Camera2D, Camera3D, DisplayList, Fog,
            Fragment, Light, Material, MaterialLibrary, Op, OpCode, RenderBuffer, RenderError, RenderQueue,
            RenderResult, ScreenOrientation,
        },
        scene::{DrawSettings, EntityBehavior, EntityContext, EntityId, EntityTree, Scene, SceneError, Sprite},
    };
}
