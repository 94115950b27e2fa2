//! Tunable constants for sampling, visibility and Bag-of-Words computation.
//!
//! Every section implements `Default` with the values the front end was tuned
//! with, and every field may be omitted from a YAML file:
//!
//! ```yaml
//! sampling:
//!   bucket_size: 10
//!   require_off_image_points: false
//! visibility:
//!   level: 1
//! ```

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Gradient energy a bucket winner must exceed, in normalized intensity units.
/// Equivalent to a 2.5 grey-level centered difference on an 8-bit image.
pub const DEFAULT_GRADIENT_THRESHOLD: f64 = 6.25 / (255.0 * 255.0);

/// Top-level configuration for keyframe construction.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    pub sampling: SamplingConfig,
    pub visibility: VisibilityConfig,
    pub bow: BowConfig,
}

impl KeyframeConfig {
    /// Load a configuration from a YAML file. Missing fields keep their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: KeyframeConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse keyframe config {:?}", path))?;
        Ok(config)
    }
}

/// Point sampling parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Number of admitted candidates competing for one output slot.
    pub bucket_size: usize,
    /// Strict lower bound on the winning squared gradient magnitude.
    pub gradient_threshold: f64,
    /// Pixels kept free at the image border during the in-image test.
    pub image_margin: f64,
    /// Fail with `CloudNotDense` when no point of the cloud is rejected.
    pub require_off_image_points: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            bucket_size: 10,
            gradient_threshold: DEFAULT_GRADIENT_THRESHOLD,
            image_margin: 4.0,
            require_off_image_points: true,
        }
    }
}

/// Cross-keyframe visibility parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Half size of the photometric patch used by the tracker.
    pub patch_half_size: i32,
    /// Pyramid level whose plane bounds the visibility test.
    pub level: usize,
}

impl VisibilityConfig {
    /// Border kept free around projected points: patch half size plus two.
    pub fn border(&self) -> i32 {
        self.patch_half_size + 2
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            patch_half_size: 2,
            level: 0,
        }
    }
}

/// Bag-of-Words transform parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BowConfig {
    /// Levels above the leaves used to group features in the feature vector.
    pub levels_up: usize,
}

impl Default for BowConfig {
    fn default() -> Self {
        Self { levels_up: 4 }
    }
}
