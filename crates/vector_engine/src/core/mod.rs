//! # Core Engine Module
//!
//! Shared configuration for the rendering core.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for logging and rendering

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    ApplicationConfig,
    LoggingConfig,
    RenderConfig,
    Config,
    ConfigError,
    ConfigFormat,
};
