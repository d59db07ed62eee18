//! # Rendering Core
//!
//! Backend-agnostic description of what to draw. Nothing in this module talks
//! to a graphics API; it produces [`DisplayList`] opcode streams that a
//! renderer consumes with [`DisplayList::pop_op`].
//!
//! ## Architecture
//!
//! - **Display list**: typed opcode model, byte codec and stream with
//!   geometry analysis
//! - **Render queue**: per-frame batching by material and vertex buffer
//! - **Resources**: materials, render buffers and fragments
//! - **Cameras / lights**: state a scene emits ahead of its geometry
//! - **Import**: translation of text records into display lists
//!
//! ## Error Model
//!
//! Caller bugs (unbalanced transform stacks, corrupt streams) panic.
//! Malformed external data surfaces as [`RenderError`].

pub mod buffer;
pub mod camera;
pub mod display_list;
pub mod fragment;
pub mod import;
pub mod light;
pub mod material;
pub mod render_queue;

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::assets::record::RecordError;

pub use buffer::{BufferContents, BufferId, BufferStore, PcVertex, PctVertex, PntVertex, RenderBuffer};
pub use camera::{Camera2D, Camera3D, Frustum, Plane, ProjectionType, ScreenOrientation, VisibilityRegion};
pub use display_list::{CodecError, DisplayList, Op, OpCode};
pub use fragment::{load_fragment, Fragment};
pub use import::import_display_list;
pub use light::{Fog, FogMode, Light, LightKind};
pub use material::{Material, MaterialId, MaterialLibrary};
pub use render_queue::{QueueStats, RenderQueue};

/// Errors raised while building render resources from external data
#[derive(Error, Debug)]
pub enum RenderError {
    /// A material name was never registered with the library
    #[error("Unknown material: {0}")]
    UnknownMaterial(String),

    /// A record lacks a child the importer requires
    #[error("Missing field '{field}' in record '{record}' (line {line})")]
    MissingField {
        /// Label of the record being imported
        record: String,
        /// Name of the missing child or token
        field: String,
        /// Source line of the record
        line: usize,
    },

    /// A fragment display list names a buffer the fragment does not have
    #[error("Buffer index {index} out of range ({available} buffers) in record '{record}'")]
    InvalidBufferIndex {
        /// Label of the offending opcode record
        record: String,
        /// Index as written in the file
        index: i64,
        /// Number of buffers the fragment declares
        available: usize,
    },

    /// A value does not fit the opcode payload it is destined for
    #[error("Invalid value in record '{record}': {message}")]
    InvalidValue {
        /// Label of the offending record
        record: String,
        /// What was wrong with it
        message: String,
    },

    /// Underlying record access failed
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Bytes handed to [`DisplayList::from_bytes`] are not a valid stream
    #[error("Corrupt display list: {0}")]
    Corrupt(#[from] CodecError),
}

/// Result type for render resource operations
pub type RenderResult<T> = Result<T, RenderError>;
