//! Directional overlap between two keyframes.
//!
//! The ratio answers "how much of `other` can `reference` see": the sampled
//! points of `other` are moved into the reference camera, projected, and
//! counted if they land inside the reference image with a border kept free
//! for the tracker's patch. The denominator is `other`'s point count, so the
//! measure is not symmetric.

use tracing::debug;

use crate::camera::CameraModel;
use crate::config::VisibilityConfig;
use crate::error::{KeyframeError, Result};
use crate::frame::SampledPoint;
use crate::geometry::SE3;

use super::record::KeyframeRecord;

/// Projects one keyframe's points into another keyframe's image.
#[derive(Debug, Clone, Default)]
pub struct VisibilityEstimator {
    config: VisibilityConfig,
}

impl VisibilityEstimator {
    pub fn new(config: VisibilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VisibilityConfig {
        &self.config
    }

    /// Fraction of `other`'s points visible from `reference` at the
    /// configured pyramid level.
    pub fn visible_ratio(&self, reference: &KeyframeRecord, other: &KeyframeRecord) -> Result<f32> {
        self.visible_ratio_at_level(reference, other, self.config.level)
    }

    /// Fraction of `other`'s points visible from `reference` on pyramid
    /// level `level`.
    pub fn visible_ratio_at_level(
        &self,
        reference: &KeyframeRecord,
        other: &KeyframeRecord,
        level: usize,
    ) -> Result<f32> {
        let image = reference.frame().level(level).ok_or_else(|| {
            KeyframeError::InvalidArgument(format!(
                "reference keyframe {} has no pyramid level {}",
                reference.id(),
                level
            ))
        })?;

        let t_ref_other = reference.pose().inverse() * other.pose();
        let ratio = self.ratio_of_points(
            &t_ref_other,
            other.points(),
            reference.camera().as_ref(),
            image.cols(),
            image.rows(),
            level,
        )?;

        debug!(
            "Visibility of {} from {} at level {}: {:.3}",
            other.id(),
            reference.id(),
            level,
            ratio
        );
        Ok(ratio)
    }

    /// Fraction of `points` (expressed in the other camera) that are visible
    /// after applying `t_ref_other` and projecting with `camera` into a
    /// `cols` x `rows` plane of pyramid level `level`.
    pub fn ratio_of_points(
        &self,
        t_ref_other: &SE3,
        points: &[SampledPoint],
        camera: &dyn CameraModel,
        cols: usize,
        rows: usize,
        level: usize,
    ) -> Result<f32> {
        if points.is_empty() {
            return Err(KeyframeError::InvalidArgument(
                "visibility ratio of a keyframe without sampled points".to_string(),
            ));
        }

        let visible = self.count_visible(t_ref_other, points, camera, cols, rows, level);
        Ok(visible as f32 / points.len() as f32)
    }

    /// Number of `points` that project inside the plane with the border free
    /// and stay in front of the reference camera.
    pub fn count_visible(
        &self,
        t_ref_other: &SE3,
        points: &[SampledPoint],
        camera: &dyn CameraModel,
        cols: usize,
        rows: usize,
        level: usize,
    ) -> usize {
        let border = self.config.border() as i64;
        let scale = 1.0 / (1u64 << level.min(63)) as f64;
        let (cols, rows) = (cols as i64, rows as i64);

        points
            .iter()
            .filter(|p| {
                let xyz = t_ref_other.transform_point(&p.xyz());
                if xyz.z <= 0.0 {
                    return false;
                }
                let uv = camera.project(&xyz) * scale;
                let u = uv.x as i64;
                let v = uv.y as i64;
                u - border >= 0 && u + border <= cols && v - border >= 0 && v + border <= rows
            })
            .count()
    }
}
