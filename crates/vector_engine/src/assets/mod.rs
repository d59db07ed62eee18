//! Asset formats
//!
//! Text formats external tooling uses to author display lists and
//! fragments. Translating parsed records into engine objects lives in
//! [`crate::render::import`] and [`crate::render::fragment`].

pub mod record;

pub use record::{Record, RecordError, Token};
