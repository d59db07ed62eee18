//! Scene composition
//!
//! Ties the entity hierarchy to the render queue. Each frame a [`Scene`]
//! updates its entities, then walks them once to fill the queue and flushes
//! the queue into the caller's display list.
//!
//! ## Architecture
//!
//! ```text
//! Scene (cameras, lights, fog, render state)
//!      ↓
//! EntityTree (sprites, behaviors)
//!      ↓
//! RenderQueue (batched by material and buffer)
//!      ↓
//! DisplayList (consumed by the renderer)
//! ```

pub mod entity;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod sprite;

use thiserror::Error;

pub use entity::{EntityBehavior, EntityContext, EntityFlags, EntityId, EntityTree};
pub use scene::{CameraSlot, DrawSettings, Scene};
pub use sprite::Sprite;

/// Scene errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Every light slot is occupied
    #[error("All {capacity} light slots are occupied")]
    LightSlotsFull {
        /// Number of slots the scene has
        capacity: usize,
    },
}
