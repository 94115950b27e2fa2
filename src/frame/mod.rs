//! Frame-level inputs: dense point clouds, image planes and frame sources.

pub mod image;
pub mod point;
pub mod source;

pub use image::ImagePlane;
pub use point::{Point3D, PointCloud, SampledPoint};
pub use source::{Frame, FrameSource};
