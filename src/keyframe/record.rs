//! KeyframeRecord - a frame retained as a tracking and covisibility anchor.
//!
//! A record is built from a frame snapshot:
//! - the dense cloud is sampled once, in the constructor, and frozen
//! - the pose is copied from the frame
//! - descriptors and the Bag-of-Words representation are computed on first
//!   request and cached for the lifetime of the record
//!
//! The camera model and the vocabulary are shared with every other record of
//! the map; a record never owns them exclusively.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::camera::CameraModel;
use crate::config::KeyframeConfig;
use crate::error::{KeyframeError, RejectedRecord, Result};
use crate::features::{FeatureAdapter, FeatureSet};
use crate::frame::{FrameSource, SampledPoint};
use crate::geometry::SE3;
use crate::vocabulary::{BowVector, FeatureVector, VocabularyAdapter};

use super::sampling::{PointSampler, SamplingStats};
use super::types::KeyframeId;
use super::visibility::VisibilityEstimator;

/// Bag-of-Words representation of a keyframe's descriptors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BowFeatures {
    /// Word histogram, used for place recognition.
    pub bow_vector: BowVector,
    /// Descriptor indices grouped by vocabulary node, used to restrict
    /// matching to features sharing a node.
    pub feature_vector: FeatureVector,
}

/// A keyframe built from a dense frame.
pub struct KeyframeRecord {
    id: KeyframeId,

    /// Camera-to-world transform at construction time.
    pose: SE3,

    /// Sampled points in camera coordinates. Never modified after
    /// construction.
    points: Vec<SampledPoint>,
    sampling_stats: SamplingStats,

    frame: Arc<dyn FrameSource>,
    camera: Arc<dyn CameraModel>,
    vocabulary: Arc<dyn VocabularyAdapter>,
    config: KeyframeConfig,

    // ─────────────────────────────────────────────────────────────────────────
    // Compute-once caches. The lock is held while computing so concurrent
    // callers wait for the first result instead of recomputing it.
    // ─────────────────────────────────────────────────────────────────────────
    features: Mutex<Option<Arc<FeatureSet>>>,
    bow: Mutex<Option<Arc<BowFeatures>>>,

    /// True until the covisibility builder links this keyframe for the first
    /// time.
    first_connection: AtomicBool,
}

impl KeyframeRecord {
    /// Build a provisional keyframe, not yet registered with a map.
    pub fn new(
        frame: Arc<dyn FrameSource>,
        camera: Arc<dyn CameraModel>,
        vocabulary: Arc<dyn VocabularyAdapter>,
        config: KeyframeConfig,
    ) -> Result<Self> {
        Self::with_id(KeyframeId::PROVISIONAL, frame, camera, vocabulary, config)
    }

    /// Build a keyframe with a map-assigned id.
    ///
    /// Fails if sampling fails; see [`PointSampler::sample`].
    pub fn with_id(
        id: KeyframeId,
        frame: Arc<dyn FrameSource>,
        camera: Arc<dyn CameraModel>,
        vocabulary: Arc<dyn VocabularyAdapter>,
        config: KeyframeConfig,
    ) -> Result<Self> {
        let sampler = PointSampler::new(config.sampling.clone())?;
        let sampled = sampler.sample_frame(frame.as_ref(), camera.as_ref())?;

        debug!(
            "Keyframe {} sampled {} points from a cloud of {}",
            id,
            sampled.points.len(),
            sampled.stats.total
        );

        Ok(Self {
            id,
            pose: frame.pose(),
            points: sampled.points,
            sampling_stats: sampled.stats,
            frame,
            camera,
            vocabulary,
            config,
            features: Mutex::new(None),
            bow: Mutex::new(None),
            first_connection: AtomicBool::new(true),
        })
    }

    /// Give a provisional keyframe its map id. Sampled points and caches are
    /// carried over unchanged.
    ///
    /// On refusal the record comes back inside the error.
    pub fn into_registered(self, id: KeyframeId) -> std::result::Result<Self, RejectedRecord> {
        if !self.id.is_provisional() {
            let reason = KeyframeError::AlreadyRegistered(self.id);
            return Err(RejectedRecord::new(reason, self));
        }
        if id.is_provisional() {
            let reason = KeyframeError::InvalidArgument(format!(
                "cannot register keyframe under provisional id {}",
                id.0
            ));
            return Err(RejectedRecord::new(reason, self));
        }
        Ok(Self { id, ..self })
    }

    pub fn id(&self) -> KeyframeId {
        self.id
    }

    pub fn pose(&self) -> SE3 {
        self.pose
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.frame.timestamp_ns()
    }

    pub fn points(&self) -> &[SampledPoint] {
        &self.points
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn sampling_stats(&self) -> &SamplingStats {
        &self.sampling_stats
    }

    pub fn frame(&self) -> &Arc<dyn FrameSource> {
        &self.frame
    }

    pub fn camera(&self) -> &Arc<dyn CameraModel> {
        &self.camera
    }

    pub fn vocabulary(&self) -> &Arc<dyn VocabularyAdapter> {
        &self.vocabulary
    }

    pub fn config(&self) -> &KeyframeConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Visibility
    // ─────────────────────────────────────────────────────────────────────────

    /// Fraction of `other`'s sampled points visible in this keyframe's image.
    pub fn visible_ratio(&self, other: &KeyframeRecord) -> Result<f32> {
        VisibilityEstimator::new(self.config.visibility.clone()).visible_ratio(self, other)
    }

    /// Same as [`visible_ratio`](Self::visible_ratio) on pyramid level `level`.
    pub fn visible_ratio_at_level(&self, other: &KeyframeRecord, level: usize) -> Result<f32> {
        VisibilityEstimator::new(self.config.visibility.clone()).visible_ratio_at_level(self, other, level)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lazy features
    // ─────────────────────────────────────────────────────────────────────────

    /// Descriptors of the finest image plane, extracted on first call.
    ///
    /// A failed extraction is not cached; the next call retries.
    pub fn ensure_descriptors(&self, extractor: &dyn FeatureAdapter) -> Result<Arc<FeatureSet>> {
        let mut slot = self.features.lock();
        if let Some(features) = slot.as_ref() {
            return Ok(Arc::clone(features));
        }

        let image = self.frame.level(0).ok_or_else(|| {
            KeyframeError::InvalidArgument(format!("keyframe {} has no image levels", self.id))
        })?;
        let features = Arc::new(extractor.extract(image, None)?);
        debug!("Keyframe {} extracted {} descriptors", self.id, features.len());

        *slot = Some(Arc::clone(&features));
        Ok(features)
    }

    /// Bag-of-Words vector and feature vector, computed on first call.
    ///
    /// Extracts descriptors first if they are not cached yet.
    pub fn ensure_bag_of_words(&self, extractor: &dyn FeatureAdapter) -> Result<Arc<BowFeatures>> {
        let mut slot = self.bow.lock();
        if let Some(bow) = slot.as_ref() {
            return Ok(Arc::clone(bow));
        }

        let features = self.ensure_descriptors(extractor)?;
        let (bow_vector, feature_vector) = self
            .vocabulary
            .transform(&features.descriptors, self.config.bow.levels_up);
        let bow = Arc::new(BowFeatures {
            bow_vector,
            feature_vector,
        });
        debug!("Keyframe {} BoW vector has {} words", self.id, bow.bow_vector.len());

        *slot = Some(Arc::clone(&bow));
        Ok(bow)
    }

    /// Cached descriptors, without computing them.
    pub fn descriptors(&self) -> Option<Arc<FeatureSet>> {
        self.features.lock().clone()
    }

    /// Cached Bag-of-Words representation, without computing it.
    pub fn bag_of_words(&self) -> Option<Arc<BowFeatures>> {
        self.bow.lock().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_first_connection(&self) -> bool {
        self.first_connection.load(Ordering::SeqCst)
    }

    /// Record that this keyframe has been linked into the covisibility graph.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn mark_connected(&self) -> bool {
        self.first_connection
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl std::fmt::Debug for KeyframeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // A cache that is being computed reports `None` instead of blocking.
        let has_descriptors = self.features.try_lock().map(|slot| slot.is_some());
        let has_bow = self.bow.try_lock().map(|slot| slot.is_some());

        f.debug_struct("KeyframeRecord")
            .field("id", &self.id)
            .field("timestamp_ns", &self.timestamp_ns())
            .field("num_points", &self.points.len())
            .field("has_descriptors", &has_descriptors)
            .field("has_bow", &has_bow)
            .field("first_connection", &self.is_first_connection())
            .finish()
    }
}
