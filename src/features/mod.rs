//! Keypoint and descriptor extraction interface.
//!
//! Keyframes request descriptors lazily, before relocalization or loop
//! queries. The extractor itself is an external collaborator: anything
//! implementing [`FeatureAdapter`] can be plugged in. With the `opencv`
//! feature enabled, [`OrbExtractor`] wraps OpenCV's ORB detector.

#[cfg(feature = "opencv")]
pub mod orb;

#[cfg(feature = "opencv")]
pub use orb::OrbExtractor;

use crate::error::Result;
use crate::frame::ImagePlane;

/// Length of a binary ORB descriptor in bytes.
pub const DESCRIPTOR_BYTES: usize = 32;

/// A binary descriptor.
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// A detected keypoint in pixel coordinates of the finest level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: i32,
    /// Orientation in degrees, or -1 if not computed.
    pub angle: f32,
    pub response: f32,
}

/// Keypoints with one descriptor per keypoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Keypoint detector and descriptor extractor.
pub trait FeatureAdapter: Send + Sync {
    /// Detect keypoints on `image`, restricted to non-zero pixels of `mask`
    /// when one is given, and compute their descriptors.
    fn extract(&self, image: &ImagePlane, mask: Option<&ImagePlane>) -> Result<FeatureSet>;
}

/// Hamming distance between two binary descriptors.
#[inline]
pub fn descriptor_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}
