//! Point sampling: sparse, high-gradient subset of a dense cloud.
//!
//! Points are streamed in input order. Each point that projects inside the
//! image (with margin), has positive depth and a valid tag becomes a
//! candidate scored by its squared centered-difference gradient on the
//! finest image plane. Candidates compete in consecutive buckets of fixed
//! size: when a bucket is full its best candidate is kept if its score is
//! strictly above the gradient threshold, then the bucket is cleared. A
//! trailing bucket that never fills is dropped.

use tracing::{debug, warn};

use crate::camera::CameraModel;
use crate::config::SamplingConfig;
use crate::error::{KeyframeError, Result};
use crate::frame::{FrameSource, ImagePlane, Point3D, SampledPoint};

/// Result of evaluating one full bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BucketOutcome {
    /// The best candidate passed the threshold.
    Emitted { point: SampledPoint, score: f64 },
    /// The best candidate did not exceed the threshold.
    BelowThreshold { max_score: f64 },
}

/// Fixed-size bucket competition, advanced one candidate at a time.
#[derive(Debug, Clone)]
pub struct BucketSelector {
    capacity: usize,
    threshold: f64,
    bucket: Vec<(f64, SampledPoint)>,
}

impl BucketSelector {
    /// `capacity` must be at least one.
    pub fn new(capacity: usize, threshold: f64) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            threshold,
            bucket: Vec::with_capacity(capacity),
        }
    }

    /// Add a scored candidate. Returns the outcome when this candidate fills
    /// the bucket, `None` otherwise.
    pub fn push(&mut self, score: f64, point: SampledPoint) -> Option<BucketOutcome> {
        self.bucket.push((score, point));
        if self.bucket.len() < self.capacity {
            return None;
        }

        // Strict comparison keeps the first of equal scores.
        let mut best = 0;
        for i in 1..self.bucket.len() {
            if self.bucket[i].0 > self.bucket[best].0 {
                best = i;
            }
        }
        let (max_score, winner) = self.bucket[best];
        self.bucket.clear();

        if max_score > self.threshold {
            Some(BucketOutcome::Emitted {
                point: winner,
                score: max_score,
            })
        } else {
            Some(BucketOutcome::BelowThreshold { max_score })
        }
    }

    /// Candidates waiting in the current, not yet full bucket.
    pub fn pending(&self) -> usize {
        self.bucket.len()
    }

    /// Drop the partial bucket, returning how many candidates it held.
    pub fn finish(mut self) -> usize {
        let pending = self.bucket.len();
        self.bucket.clear();
        pending
    }
}

/// Counters collected during one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingStats {
    /// Points in the input cloud.
    pub total: usize,
    /// Points that became scored candidates.
    pub admitted: usize,
    /// Points outside the image margin, behind the camera or invalid.
    pub rejected: usize,
    /// Full buckets evaluated.
    pub buckets: usize,
    /// Points kept.
    pub emitted: usize,
    /// Candidates left in the unfilled trailing bucket.
    pub discarded_tail: usize,
}

/// Sampled points together with the pass statistics.
#[derive(Debug, Clone, Default)]
pub struct SamplingOutput {
    pub points: Vec<SampledPoint>,
    pub stats: SamplingStats,
}

/// Reduces dense clouds to sparse high-gradient point sets.
#[derive(Debug, Clone)]
pub struct PointSampler {
    config: SamplingConfig,
}

impl PointSampler {
    pub fn new(config: SamplingConfig) -> Result<Self> {
        if config.bucket_size == 0 {
            return Err(KeyframeError::InvalidArgument(
                "sampling bucket size must be at least 1".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Whether `p` would be admitted as a candidate: it projects through
    /// `camera` inside `bounds`' image with the configured margin, lies in
    /// front of the camera and carries a valid tag.
    pub fn is_candidate(&self, p: &Point3D, camera: &dyn CameraModel, bounds: &dyn CameraModel) -> bool {
        let uv = camera.project(&p.xyz());
        bounds.is_in_image(&uv, self.config.image_margin) && p.z > 0.0 && p.is_valid()
    }

    /// Sample the cloud of a frame on its finest plane.
    ///
    /// Points are projected with `camera`; the in-image test uses the frame's
    /// own camera.
    pub fn sample_frame(&self, frame: &dyn FrameSource, camera: &dyn CameraModel) -> Result<SamplingOutput> {
        let image = frame
            .level(0)
            .ok_or_else(|| KeyframeError::InvalidArgument("frame has no image levels".to_string()))?;
        self.sample(frame.pointcloud(), image, camera, frame.camera().as_ref())
    }

    /// Sample `cloud`, scoring candidates on `image`.
    pub fn sample(
        &self,
        cloud: &[Point3D],
        image: &ImagePlane,
        camera: &dyn CameraModel,
        bounds: &dyn CameraModel,
    ) -> Result<SamplingOutput> {
        let mut selector = BucketSelector::new(self.config.bucket_size, self.config.gradient_threshold);
        let mut stats = SamplingStats {
            total: cloud.len(),
            ..SamplingStats::default()
        };
        let mut points = Vec::with_capacity(cloud.len() / self.config.bucket_size);

        for p in cloud {
            let score = match self.score(p, image, camera, bounds) {
                Some(score) => score,
                None => {
                    stats.rejected += 1;
                    continue;
                }
            };
            stats.admitted += 1;

            match selector.push(score, *p) {
                Some(BucketOutcome::Emitted { point, .. }) => {
                    stats.buckets += 1;
                    points.push(point);
                }
                Some(BucketOutcome::BelowThreshold { .. }) => stats.buckets += 1,
                None => {}
            }
        }

        stats.discarded_tail = selector.finish();
        stats.emitted = points.len();

        if self.config.require_off_image_points && stats.rejected == 0 {
            warn!(
                "Point cloud of {} points has no point outside the image margin; refusing to sample",
                stats.total
            );
            return Err(KeyframeError::CloudNotDense { total: stats.total });
        }

        debug!(
            "Sampled {} of {} points ({} candidates, {} rejected, {} buckets, {} tail)",
            stats.emitted, stats.total, stats.admitted, stats.rejected, stats.buckets, stats.discarded_tail
        );

        Ok(SamplingOutput { points, stats })
    }

    /// Gradient score of `p`, or `None` if it is not a candidate.
    fn score(
        &self,
        p: &Point3D,
        image: &ImagePlane,
        camera: &dyn CameraModel,
        bounds: &dyn CameraModel,
    ) -> Option<f64> {
        let uv = camera.project(&p.xyz());
        if !(bounds.is_in_image(&uv, self.config.image_margin) && p.z > 0.0 && p.is_valid()) {
            return None;
        }
        if uv.x < 0.0 || uv.y < 0.0 {
            return None;
        }
        let u = uv.x as usize;
        let v = uv.y as usize;
        image.gradient_energy(v, u)
    }
}
