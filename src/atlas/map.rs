//! KeyframeMap - registry of the keyframes of one map.
//!
//! The map owns the id counter. Records are built provisionally (outside the
//! map) and promoted on admission, or created directly with a fresh id. Once
//! admitted a record is shared as `Arc<KeyframeRecord>`; the map never
//! mutates it apart from the first-connection flag.
//!
//! Queries:
//! - covisibility candidates, gated by the directional visibility ratio
//! - place recognition candidates, ranked by BoW similarity

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::camera::CameraModel;
use crate::config::KeyframeConfig;
use crate::error::{KeyframeError, RejectedRecord, Result};
use crate::frame::FrameSource;
use crate::keyframe::{KeyframeId, KeyframeRecord};
use crate::vocabulary::{BowVector, OrbVocabulary, VocabularyAdapter};

/// Registry parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Minimum fraction of a keyframe's points that must be visible from the
    /// reference for the pair to count as covisible.
    pub min_visible_ratio: f32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            min_visible_ratio: 0.3,
        }
    }
}

/// A keyframe seen from a reference keyframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Covisible {
    pub keyframe_id: KeyframeId,
    /// Fraction of this keyframe's points visible from the reference.
    pub ratio: f32,
}

/// Place recognition candidate with its BoW similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub keyframe_id: KeyframeId,
    pub score: f64,
}

/// The keyframes of one map.
pub struct KeyframeMap {
    keyframes: HashMap<KeyframeId, Arc<KeyframeRecord>>,

    /// Counter for generating unique keyframe ids.
    next_kf_id: i64,

    /// Most recently admitted keyframe.
    last_keyframe_id: Option<KeyframeId>,

    config: MapConfig,
}

impl KeyframeMap {
    pub fn new() -> Self {
        Self::with_config(MapConfig::default())
    }

    pub fn with_config(config: MapConfig) -> Self {
        Self {
            keyframes: HashMap::new(),
            next_kf_id: 0,
            last_keyframe_id: None,
            config,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a new unique keyframe id.
    pub fn next_keyframe_id(&mut self) -> Result<KeyframeId> {
        let id = KeyframeId::new(self.next_kf_id);
        self.next_kf_id = successor(id)?;
        Ok(id)
    }

    /// Admit a record into the map.
    ///
    /// A provisional record is promoted under a fresh id. A record that
    /// already carries an id keeps it, unless that id is taken. A refused
    /// record is handed back inside the error.
    pub fn admit(&mut self, record: KeyframeRecord) -> std::result::Result<KeyframeId, RejectedRecord> {
        let promote = record.id().is_provisional();
        let id = if promote {
            KeyframeId::new(self.next_kf_id)
        } else {
            record.id()
        };

        if self.keyframes.contains_key(&id) {
            return Err(RejectedRecord::new(KeyframeError::AlreadyRegistered(id), record));
        }
        let next = match successor(id) {
            Ok(next) => next,
            Err(reason) => return Err(RejectedRecord::new(reason, record)),
        };
        let record = if promote { record.into_registered(id)? } else { record };

        self.next_kf_id = self.next_kf_id.max(next);
        info!("Admitted keyframe {} with {} points", id, record.num_points());
        self.keyframes.insert(id, Arc::new(record));
        self.last_keyframe_id = Some(id);
        Ok(id)
    }

    /// Build a keyframe from `frame` under a fresh id and admit it.
    ///
    /// The id is only consumed if construction succeeds.
    pub fn create_keyframe(
        &mut self,
        frame: Arc<dyn FrameSource>,
        camera: Arc<dyn CameraModel>,
        vocabulary: Arc<dyn VocabularyAdapter>,
        config: KeyframeConfig,
    ) -> Result<KeyframeId> {
        let id = KeyframeId::new(self.next_kf_id);
        let record = KeyframeRecord::with_id(id, frame, camera, vocabulary, config)?;
        Ok(self.admit(record)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get(&self, id: KeyframeId) -> Option<&Arc<KeyframeRecord>> {
        self.keyframes.get(&id)
    }

    fn require(&self, id: KeyframeId) -> Result<&Arc<KeyframeRecord>> {
        self.keyframes.get(&id).ok_or(KeyframeError::UnknownKeyframe(id))
    }

    pub fn contains(&self, id: KeyframeId) -> bool {
        self.keyframes.contains_key(&id)
    }

    pub fn keyframe_ids(&self) -> impl Iterator<Item = &KeyframeId> {
        self.keyframes.keys()
    }

    pub fn keyframes(&self) -> impl Iterator<Item = &Arc<KeyframeRecord>> {
        self.keyframes.values()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn last_keyframe_id(&self) -> Option<KeyframeId> {
        self.last_keyframe_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove a keyframe. Holders of the `Arc` keep it alive.
    pub fn remove(&mut self, id: KeyframeId) -> Result<Arc<KeyframeRecord>> {
        let record = self.keyframes.remove(&id).ok_or(KeyframeError::UnknownKeyframe(id))?;
        if self.last_keyframe_id == Some(id) {
            self.last_keyframe_id = None;
        }
        info!("Removed keyframe {}", id);
        Ok(record)
    }

    /// Drop every keyframe for which `keep` returns false.
    ///
    /// Returns the number of keyframes removed.
    pub fn prune<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&KeyframeRecord) -> bool,
    {
        let before = self.keyframes.len();
        self.keyframes.retain(|_, kf| keep(kf.as_ref()));
        let removed = before - self.keyframes.len();

        if let Some(last) = self.last_keyframe_id {
            if !self.keyframes.contains_key(&last) {
                self.last_keyframe_id = None;
            }
        }
        if removed > 0 {
            info!("Pruned {} keyframes, {} remain", removed, self.keyframes.len());
        }
        removed
    }

    /// Remove all keyframes and reset the id counter.
    pub fn clear(&mut self) {
        self.keyframes.clear();
        self.next_kf_id = 0;
        self.last_keyframe_id = None;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Covisibility
    // ─────────────────────────────────────────────────────────────────────────

    /// Keyframes whose visible ratio from `id` reaches
    /// `min_visible_ratio`, best first.
    ///
    /// Keyframes without sampled points have no ratio and are skipped.
    pub fn covisible_keyframes(&self, id: KeyframeId) -> Result<Vec<Covisible>> {
        let reference = self.require(id)?;

        let mut covisible = Vec::new();
        for (other_id, other) in &self.keyframes {
            if *other_id == id || other.points().is_empty() {
                continue;
            }
            let ratio = reference.visible_ratio(other)?;
            if ratio >= self.config.min_visible_ratio {
                covisible.push(Covisible {
                    keyframe_id: *other_id,
                    ratio,
                });
            }
        }

        covisible.sort_by(|a, b| {
            b.ratio
                .partial_cmp(&a.ratio)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.keyframe_id.cmp(&b.keyframe_id))
        });
        Ok(covisible)
    }

    /// Link `id` to its covisible keyframes.
    ///
    /// The keyframe leaves its first-connection state the first time it gets
    /// at least one covisible neighbour.
    pub fn connect(&self, id: KeyframeId) -> Result<Vec<Covisible>> {
        let covisible = self.covisible_keyframes(id)?;
        if !covisible.is_empty() {
            let reference = self.require(id)?;
            if reference.mark_connected() {
                debug!("Keyframe {} connected to {} keyframes", id, covisible.len());
            }
        }
        Ok(covisible)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Place recognition
    // ─────────────────────────────────────────────────────────────────────────

    /// Keyframes similar to `query`, sorted by decreasing score.
    ///
    /// Only keyframes whose BoW vector has already been computed take part.
    pub fn detect_candidates(
        &self,
        query: &BowVector,
        exclude: Option<KeyframeId>,
        max_results: usize,
    ) -> Vec<Candidate> {
        let mut cands: Vec<Candidate> = self
            .keyframes
            .iter()
            .filter(|(kf_id, _)| Some(**kf_id) != exclude)
            .filter_map(|(kf_id, kf)| {
                let bow = kf.bag_of_words()?;
                let score = OrbVocabulary::score(query, &bow.bow_vector);
                (score > 0.0).then_some(Candidate {
                    keyframe_id: *kf_id,
                    score,
                })
            })
            .collect();

        cands.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.keyframe_id.cmp(&b.keyframe_id))
        });
        cands.truncate(max_results);
        cands
    }
}

/// Id that follows `id`, or an error once the id space is exhausted.
fn successor(id: KeyframeId) -> Result<i64> {
    id.0.checked_add(1)
        .ok_or_else(|| KeyframeError::InvalidArgument(format!("no keyframe id left after {}", id)))
}

impl Default for KeyframeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyframeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyframeMap")
            .field("num_keyframes", &self.keyframes.len())
            .field("next_kf_id", &self.next_kf_id)
            .finish()
    }
}
