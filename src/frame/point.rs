use nalgebra::Vector3;

/// A point of a dense cloud, expressed in the frame's camera coordinates.
///
/// `a` is a validity tag written by the reconstruction: any non-zero value
/// marks a tracked point. It is never interpreted as a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub a: f32,
}

/// Output element of the point sampler. Sampling only selects points.
pub type SampledPoint = Point3D;

/// Dense per-pixel reconstruction attached to a frame.
pub type PointCloud = Vec<Point3D>;

impl Point3D {
    pub fn new(x: f32, y: f32, z: f32, a: f32) -> Self {
        Self { x, y, z, a }
    }

    /// A point tagged as valid.
    pub fn valid(x: f32, y: f32, z: f32) -> Self {
        Self::new(x, y, z, 1.0)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.a != 0.0
    }

    #[inline]
    pub fn xyz(&self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }
}
