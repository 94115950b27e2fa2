//! Error types shared across the crate.

use thiserror::Error;

use crate::keyframe::{KeyframeId, KeyframeRecord};
use crate::vocabulary::VocabularyError;

pub type Result<T, E = KeyframeError> = std::result::Result<T, E>;

/// Failures surfaced to the map builder.
///
/// Out-of-image candidates during sampling are not errors; they are counted in
/// [`SamplingStats`](crate::keyframe::SamplingStats) and skipped.
#[derive(Debug, Error)]
pub enum KeyframeError {
    /// Every point of the cloud passed the in-image test. A per-pixel dense
    /// cloud always has points inside the border margin, so the frame was not
    /// produced by a dense reconstruction.
    #[error("point cloud is not dense: none of its {total} points fell outside the image margin")]
    CloudNotDense { total: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),

    #[error("keyframe {0} is not registered in the map")]
    UnknownKeyframe(KeyframeId),

    #[error("keyframe {0} is already registered")]
    AlreadyRegistered(KeyframeId),
}

/// A registration the map or the record refused. The record is handed back
/// untouched so the caller keeps its sampled points.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct RejectedRecord {
    #[source]
    pub reason: KeyframeError,
    pub record: Box<KeyframeRecord>,
}

impl RejectedRecord {
    pub fn new(reason: KeyframeError, record: KeyframeRecord) -> Self {
        Self {
            reason,
            record: Box::new(record),
        }
    }

    pub fn into_record(self) -> KeyframeRecord {
        *self.record
    }
}

impl From<RejectedRecord> for KeyframeError {
    fn from(rejected: RejectedRecord) -> Self {
        rejected.reason
    }
}
