//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and operations
//! - Bounding volumes
//! - Frame-local pools
//! - Logging utilities

pub mod math;
pub mod bounds;
pub mod collections;
pub mod logging;
