//! Camera models used to project keyframe points into images.
//!
//! The keyframe code only depends on the [`CameraModel`] trait. Code that needs
//! the concrete intrinsics asks for them through [`CameraModel::pinhole`],
//! which returns `None` for models that are not plain pinholes.

use std::fmt;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::{Matrix3, Vector2, Vector3};
use serde::Deserialize;

/// Projection of camera-frame points to pixel coordinates.
pub trait CameraModel: fmt::Debug + Send + Sync {
    /// Image width in pixels at the finest level.
    fn width(&self) -> usize;

    /// Image height in pixels at the finest level.
    fn height(&self) -> usize;

    /// Project a point in the camera frame to pixel coordinates.
    ///
    /// Points with non-positive depth produce meaningless (possibly
    /// non-finite) coordinates; callers check depth separately.
    fn project(&self, p: &Vector3<f64>) -> Vector2<f64>;

    /// Whether `uv` lies inside the image with `margin` pixels kept free on
    /// every side.
    fn is_in_image(&self, uv: &Vector2<f64>, margin: f64) -> bool {
        uv.x >= margin
            && uv.y >= margin
            && uv.x < self.width() as f64 - margin
            && uv.y < self.height() as f64 - margin
    }

    /// Pinhole intrinsics, if this model is a pinhole camera.
    fn pinhole(&self) -> Option<&PinholeModel> {
        None
    }
}

/// Undistorted pinhole camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: usize,
    pub height: usize,
}

impl PinholeModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: usize, height: usize) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        }
    }

    /// Load intrinsics from an EuRoC `sensor.yaml`.
    ///
    /// Only the `intrinsics: [fx, fy, cx, cy]` and `resolution: [w, h]` keys
    /// are read; distortion coefficients are ignored because the dense
    /// reconstruction works on rectified images.
    pub fn from_euroc_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let yaml: CameraYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse camera calibration {:?}", path))?;

        if yaml.intrinsics.len() != 4 {
            bail!(
                "Expected 4 intrinsics [fx, fy, cx, cy], got {}",
                yaml.intrinsics.len()
            );
        }
        if yaml.resolution.len() != 2 {
            bail!(
                "Expected resolution [width, height], got {} values",
                yaml.resolution.len()
            );
        }

        Ok(Self::new(
            yaml.intrinsics[0],
            yaml.intrinsics[1],
            yaml.intrinsics[2],
            yaml.intrinsics[3],
            yaml.resolution[0],
            yaml.resolution[1],
        ))
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }
}

impl CameraModel for PinholeModel {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn project(&self, p: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(
            self.fx * p.x / p.z + self.cx,
            self.fy * p.y / p.z + self.cy,
        )
    }

    fn pinhole(&self) -> Option<&PinholeModel> {
        Some(self)
    }
}

/// EuRoC camera sensor.yaml format
#[derive(Debug, Deserialize)]
struct CameraYaml {
    /// [fx, fy, cx, cy] intrinsics
    intrinsics: Vec<f64>,
    /// [width, height]
    resolution: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    fn camera() -> PinholeModel {
        PinholeModel::new(100.0, 100.0, 32.0, 24.0, 64, 48)
    }

    #[test]
    fn test_project_principal_axis() {
        let cam = camera();
        let uv = cam.project(&Vector3::new(0.0, 0.0, 2.0));
        assert_relative_eq!(uv, Vector2::new(32.0, 24.0));

        let uv = cam.project(&Vector3::new(0.2, -0.1, 2.0));
        assert_relative_eq!(uv, Vector2::new(42.0, 19.0));
    }

    #[test]
    fn test_is_in_image_margin() {
        let cam = camera();
        assert!(cam.is_in_image(&Vector2::new(4.0, 4.0), 4.0));
        assert!(!cam.is_in_image(&Vector2::new(3.9, 10.0), 4.0));
        assert!(cam.is_in_image(&Vector2::new(59.9, 43.9), 4.0));
        assert!(!cam.is_in_image(&Vector2::new(60.0, 10.0), 4.0));
        assert!(!cam.is_in_image(&Vector2::new(10.0, 44.0), 4.0));
        assert!(!cam.is_in_image(&Vector2::new(f64::NAN, 10.0), 4.0));
    }

    #[test]
    fn test_pinhole_capability() {
        let cam = camera();
        let model: &dyn CameraModel = &cam;
        let pinhole = model.pinhole().expect("pinhole model exposes intrinsics");
        assert_eq!(pinhole.k()[(0, 2)], 32.0);
    }

    #[test]
    fn test_from_euroc_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sensor_type: camera\nrate_hz: 20\nresolution: [752, 480]\ncamera_model: pinhole\n\
             intrinsics: [458.654, 457.296, 367.215, 248.375]\n\
             distortion_model: radial-tangential\n\
             distortion_coefficients: [-0.28340811, 0.07395907, 0.00019359, 1.76187114e-05]"
        )
        .unwrap();

        let cam = PinholeModel::from_euroc_yaml(file.path()).unwrap();
        assert_eq!(cam.width, 752);
        assert_eq!(cam.height, 480);
        assert_relative_eq!(cam.fx, 458.654);
        assert_relative_eq!(cam.cy, 248.375);
    }

    #[test]
    fn test_from_euroc_yaml_rejects_bad_intrinsics() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "resolution: [752, 480]\nintrinsics: [458.654, 457.296]").unwrap();
        assert!(PinholeModel::from_euroc_yaml(file.path()).is_err());
    }
}
