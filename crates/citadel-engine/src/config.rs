//! Engine configuration loaded from JSON.
//!
//! Every field has a default, so a partial document (or `{}`) is valid:
//!
//! ```
//! use citadel_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "max_instances": 256 }"#).unwrap();
//! assert_eq!(config.max_instances, 256);
//! assert_eq!(config.collision.friction, 0.5);
//! ```

use std::path::Path;

use citadel_ecs::glam::{UVec2, Vec3};
use citadel_ecs::transform::Aabb;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// CollisionConfig
// ---------------------------------------------------------------------------

/// Tuning for the collision resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Cell counts of the resolver's static and dynamic grids.
    pub grid_cells: UVec2,
    /// Fraction of the tangential velocity kept as sliding displacement.
    pub friction: f32,
    /// Extra margin added around each bound when querying candidates.
    pub query_padding: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            grid_cells: UVec2::new(32, 32),
            friction: 0.5,
            query_padding: 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the instance pool.
    pub max_instances: usize,
    /// Seconds per [`tick`](crate::facade::EngineEcs::tick).
    pub fixed_dt: f32,
    /// Extent of the ground plane covered by every grid.
    pub world_bounds: Aabb,
    /// Cell counts of the facade's proximity grid.
    pub grid_cells: UVec2,
    pub collision: CollisionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instances: 1024,
            fixed_dt: 1.0 / 60.0,
            world_bounds: Aabb::new(Vec3::new(-256.0, -64.0, -256.0), Vec3::new(256.0, 64.0, 256.0)),
            grid_cells: UVec2::new(64, 64),
            collision: CollisionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "loading engine config");
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_dt > 0.0 && self.fixed_dt.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "fixed_dt must be positive and finite, got {}",
                self.fixed_dt
            )));
        }
        if self.max_instances == 0 {
            return Err(ConfigError::Invalid("max_instances must be at least 1".into()));
        }
        if self.grid_cells.cmpeq(UVec2::ZERO).any() || self.collision.grid_cells.cmpeq(UVec2::ZERO).any() {
            return Err(ConfigError::Invalid("grid cell counts must be non-zero".into()));
        }
        let bounds = &self.world_bounds;
        if !(bounds.max.x > bounds.min.x && bounds.max.z > bounds.min.z) {
            return Err(ConfigError::Invalid(format!(
                "world bounds are empty on the ground plane: {bounds:?}"
            )));
        }
        if !(self.collision.friction >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "friction must be non-negative, got {}",
                self.collision.friction
            )));
        }
        if !(self.collision.query_padding >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "query_padding must be non-negative, got {}",
                self.collision.query_padding
            )));
        }
        Ok(())
    }
}
