//! # Unified Configuration System
//!
//! All pipeline tunables live in explicit, serializable configuration
//! objects constructed at startup and passed by reference into the world
//! system — never read from process-wide globals. This keeps the pipeline
//! testable in isolation (e.g. with a worker pool of size 1).

use crate::spatial::BvhConfig;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Configuration trait: load/save from TOML or RON files
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Tunables for the two-stage culling pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CullingConfig {
    /// Capacity of the SoA scratch columns; candidates beyond it are
    /// dropped per tick, so size this to the worst expected candidate count
    pub soa_capacity: usize,

    /// Fixed worker-pool thread count for the fine-cull fan-out
    pub worker_threads: usize,

    /// BVH construction parameters
    pub bvh: BvhConfig,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            soa_capacity: 1 << 14,
            worker_threads: 4,
            bvh: BvhConfig::default(),
        }
    }
}

impl Config for CullingConfig {}

/// Parameters for the procedural world generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldGenConfig {
    /// Number of objects to generate
    pub object_count: usize,

    /// Positions are sampled uniformly in `[-half_extent, half_extent]³`
    pub half_extent: f32,

    /// Minimum uniform scale
    pub scale_min: f32,

    /// Maximum uniform scale
    pub scale_max: f32,

    /// Geometry tags are sampled from `0..geometry_count`
    pub geometry_count: u32,

    /// Material tags are sampled from `0..material_count`
    pub material_count: u32,
}

impl Default for WorldGenConfig {
    fn default() -> Self {
        Self {
            object_count: 1 << 14,
            half_extent: 2000.0,
            scale_min: 10.0,
            scale_max: 50.0,
            geometry_count: 12,
            material_count: 32,
        }
    }
}

impl Config for WorldGenConfig {}
