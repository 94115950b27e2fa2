//! Keyframes for dense direct visual odometry.
//!
//! A [`KeyframeRecord`] keeps a sparse high-gradient sample of a frame's dense
//! point cloud, measures how much of another keyframe it can see, and computes
//! descriptors and Bag-of-Words vectors on demand. [`KeyframeMap`] registers
//! records and gates covisibility on the visible ratio.

pub mod atlas;
pub mod camera;
pub mod config;
pub mod error;
pub mod features;
pub mod frame;
pub mod geometry;
pub mod keyframe;
pub mod vocabulary;

pub use atlas::{KeyframeMap, MapConfig};
pub use camera::{CameraModel, PinholeModel};
pub use config::KeyframeConfig;
pub use error::{KeyframeError, RejectedRecord, Result};
pub use features::{FeatureAdapter, FeatureSet};
pub use frame::{Frame, FrameSource, ImagePlane, Point3D, SampledPoint};
pub use geometry::SE3;
pub use keyframe::{KeyframeId, KeyframeRecord, PointSampler, VisibilityEstimator};
pub use vocabulary::{OrbVocabulary, VocabularyAdapter};
