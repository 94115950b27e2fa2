//! Frames: the dense reconstruction a keyframe is built from.

use std::sync::Arc;

use crate::camera::CameraModel;
use crate::geometry::SE3;

use super::image::ImagePlane;
use super::point::{Point3D, PointCloud};

/// Read access to a reconstructed camera frame.
///
/// Implementations own the dense cloud and the image pyramid; keyframes only
/// borrow them.
pub trait FrameSource: Send + Sync {
    /// Dense per-pixel cloud in camera coordinates.
    fn pointcloud(&self) -> &[Point3D];

    /// Image plane at pyramid level `level`, finest first.
    fn level(&self, level: usize) -> Option<&ImagePlane>;

    fn num_levels(&self) -> usize;

    /// Camera-to-world pose (`T_wc`).
    fn pose(&self) -> SE3;

    /// Camera the frame was captured with. Bounds the in-image test during
    /// sampling.
    fn camera(&self) -> &Arc<dyn CameraModel>;

    /// Capture time in nanoseconds.
    fn timestamp_ns(&self) -> u64 {
        0
    }
}

/// Owned frame snapshot.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ns: u64,
    pose: SE3,
    camera: Arc<dyn CameraModel>,
    pyramid: Vec<ImagePlane>,
    pointcloud: PointCloud,
}

impl Frame {
    /// Create a frame from an already built pyramid (`pyramid[0]` is the
    /// finest level) and its dense cloud.
    pub fn new(
        timestamp_ns: u64,
        pose: SE3,
        camera: Arc<dyn CameraModel>,
        pyramid: Vec<ImagePlane>,
        pointcloud: PointCloud,
    ) -> Self {
        Self {
            timestamp_ns,
            pose,
            camera,
            pyramid,
            pointcloud,
        }
    }

    /// Wrap into a shareable handle for keyframe construction.
    pub fn into_shared(self) -> Arc<dyn FrameSource> {
        Arc::new(self)
    }
}

impl FrameSource for Frame {
    fn pointcloud(&self) -> &[Point3D] {
        &self.pointcloud
    }

    fn level(&self, level: usize) -> Option<&ImagePlane> {
        self.pyramid.get(level)
    }

    fn num_levels(&self) -> usize {
        self.pyramid.len()
    }

    fn pose(&self) -> SE3 {
        self.pose
    }

    fn camera(&self) -> &Arc<dyn CameraModel> {
        &self.camera
    }

    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }
}
