//! Keyframes built from dense frames.
//!
//! A keyframe keeps a sparse, high-gradient subset of its frame's dense cloud
//! ([`PointSampler`]), can measure how much of another keyframe it sees
//! ([`VisibilityEstimator`]) and computes descriptors and Bag-of-Words vectors
//! on demand ([`KeyframeRecord`]).

pub mod record;
pub mod sampling;
pub mod types;
pub mod visibility;

#[cfg(test)]
pub(crate) mod fixtures;

pub use record::{BowFeatures, KeyframeRecord};
pub use sampling::{BucketOutcome, BucketSelector, PointSampler, SamplingOutput, SamplingStats};
pub use types::KeyframeId;
pub use visibility::VisibilityEstimator;
