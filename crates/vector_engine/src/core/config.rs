//! # Unified Configuration System
//!
//! Configuration for the rendering core and its logging. The fixed caps the
//! engine works with (transform stack depth, light slots, queue stages) are
//! configuration here rather than constants baked into the types.
//!
//! ## Configuration Categories
//!
//! - **Logging Config**: default log filter
//! - **Render Config**: stack depths, slot counts, list capacities, screen
//! - **Application Config**: both of the above, loadable from TOML or RON

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError, ConfigFormat};
use crate::render::camera::ScreenOrientation;

/// # Logging Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log filter, overridden by `RUST_LOG`
    pub level: String,
}

impl LoggingConfig {
    /// Install the logger using this configuration
    pub fn init(&self) {
        crate::foundation::logging::init_with_level(&self.level);
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// # Render Configuration
///
/// Sizes and caps for display lists, render queues and scenes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum nesting of render queue transform pushes
    pub transform_stack_depth: usize,
    /// Number of light slots per scene
    pub max_lights: usize,
    /// Number of render queue stages
    pub queue_stages: usize,
    /// Initial byte capacity of per-frame scratch lists
    pub scratch_list_capacity: usize,
    /// Default byte capacity of temporary batch lists
    pub temporary_list_capacity: usize,
    /// Screen width in pixels
    pub screen_width: u32,
    /// Screen height in pixels
    pub screen_height: u32,
    /// Device orientation applied on top of every camera
    pub orientation: ScreenOrientation,
}

impl RenderConfig {
    /// Screen aspect ratio (width / height)
    pub fn aspect_ratio(&self) -> f32 {
        self.screen_width as f32 / self.screen_height as f32
    }

    /// Set the screen size
    pub fn with_screen_size(mut self, width: u32, height: u32) -> Self {
        self.screen_width = width;
        self.screen_height = height;
        self
    }

    /// Set the number of light slots
    pub fn with_max_lights(mut self, max_lights: usize) -> Self {
        self.max_lights = max_lights;
        self
    }

    /// Set the number of render queue stages
    pub fn with_queue_stages(mut self, stages: usize) -> Self {
        self.queue_stages = stages;
        self
    }

    /// Set the device orientation
    pub fn with_orientation(mut self, orientation: ScreenOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transform_stack_depth < 2 {
            return Err(ConfigError::Invalid("transform stack depth must be at least 2".to_string()));
        }
        if self.queue_stages == 0 {
            return Err(ConfigError::Invalid("render queue needs at least one stage".to_string()));
        }
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(ConfigError::Invalid(format!(
                "screen size {}x{} is empty",
                self.screen_width, self.screen_height
            )));
        }
        Ok(())
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            transform_stack_depth: 20,
            max_lights: 4,
            queue_stages: 2,
            scratch_list_capacity: 64 * 1024,
            temporary_list_capacity: 1024,
            screen_width: 1280,
            screen_height: 720,
            orientation: ScreenOrientation::Portrait,
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration applications load at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Rendering core configuration
    pub render: RenderConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.render.validate()
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.render.transform_stack_depth, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            [render]
            max_lights = 8
            orientation = "LandscapeLeft"
        "#;
        let config = ApplicationConfig::from_str_with(text, ConfigFormat::Toml).unwrap();
        assert_eq!(config.render.max_lights, 8);
        assert_eq!(config.render.orientation, ScreenOrientation::LandscapeLeft);
        assert_eq!(config.render.queue_stages, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_ron_round_trip() {
        let config = ApplicationConfig {
            render: RenderConfig::default().with_screen_size(640, 480).with_queue_stages(3),
            ..Default::default()
        };
        let text = config.to_string_with(ConfigFormat::Ron).unwrap();
        let parsed = ApplicationConfig::from_str_with(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(parsed.render.screen_width, 640);
        assert_eq!(parsed.render.queue_stages, 3);
    }

    #[test]
    fn test_invalid_stage_count_rejected() {
        let config = RenderConfig::default().with_queue_stages(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = ApplicationConfig::load_from_file("settings.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
