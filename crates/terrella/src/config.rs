//! # Controller Configuration
//!
//! Loaded once at startup, either built in code or read from TOML:
//!
//! ```toml
//! thread_name = "Map Layer Thread"
//! frame_interval = 2
//! perf_interval = 0
//! texture_retire_frames = 2
//! max_textures = 4096
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::Deserialize;
use terrella_core::{TerrellaError, TerrellaResult};

/// Configuration for a [`MapController`](crate::MapController).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Name of the mutation thread.
    pub thread_name: String,
    /// Render on every Nth frame-start notification. 1 renders every frame,
    /// 2 gives 30Hz on a 60Hz display.
    pub frame_interval: u32,
    /// Log renderer statistics every N frames. 0 turns it off.
    pub perf_interval: u32,
    /// Completed frames to wait before a removed texture is released.
    pub texture_retire_frames: u64,
    /// Maximum number of live textures.
    pub max_textures: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            thread_name: "Map Layer Thread".to_string(),
            frame_interval: 2,
            perf_interval: 0,
            texture_retire_frames: 2,
            max_textures: 4096,
        }
    }
}

impl ControllerConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidConfig`] on syntax errors, unknown
    /// keys, or values that fail [`ControllerConfig::validate`].
    pub fn from_toml_str(source: &str) -> TerrellaResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| TerrellaError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidConfig`] if the file cannot be read or
    /// its contents are invalid.
    pub fn from_toml_file(path: impl AsRef<Path>) -> TerrellaResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TerrellaError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TerrellaError::InvalidConfig`] naming the offending key.
    pub fn validate(&self) -> TerrellaResult<()> {
        if self.thread_name.is_empty() {
            return Err(TerrellaError::InvalidConfig(
                "thread_name must not be empty".to_string(),
            ));
        }
        if self.frame_interval == 0 {
            return Err(TerrellaError::InvalidConfig(
                "frame_interval must be at least 1".to_string(),
            ));
        }
        if self.max_textures == 0 {
            return Err(TerrellaError::InvalidConfig(
                "max_textures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_interval, 2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ControllerConfig::from_toml_str("perf_interval = 30\n").unwrap();
        assert_eq!(config.perf_interval, 30);
        assert_eq!(config.max_textures, ControllerConfig::default().max_textures);
    }

    #[test]
    fn test_full_toml() {
        let config = ControllerConfig::from_toml_str(
            r#"
            thread_name = "scene writer"
            frame_interval = 1
            perf_interval = 120
            texture_retire_frames = 3
            max_textures = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.thread_name, "scene writer");
        assert_eq!(config.texture_retire_frames, 3);
        assert_eq!(config.max_textures, 16);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            ControllerConfig::from_toml_str("frame_interval = 0"),
            Err(TerrellaError::InvalidConfig(_))
        ));
        assert!(ControllerConfig::from_toml_str("max_textures = 0").is_err());
        assert!(ControllerConfig::from_toml_str("no_such_key = 1").is_err());
        assert!(ControllerConfig::from_toml_str("frame_interval = \"fast\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ControllerConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, TerrellaError::InvalidConfig(_)));
    }
}
