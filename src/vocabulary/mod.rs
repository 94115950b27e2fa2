//! ORB vocabulary for Bag-of-Words place recognition.
//!
//! Loads a DBoW2 text-format vocabulary tree and turns a keyframe's binary
//! descriptors into:
//! - [`BowVector`]: word histogram with L1-normalized TF-IDF weights
//! - [`FeatureVector`]: feature indices grouped by a node a few levels above
//!   the leaves, used to restrict matching to features sharing a node
//!
//! Keyframes hold the vocabulary through the [`VocabularyAdapter`] trait so
//! that tests and alternative vocabularies can be substituted.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use crate::features::{Descriptor, DESCRIPTOR_BYTES};

/// Word id -> weight.
pub type BowVector = HashMap<u32, f64>;

/// Node id -> indices of the descriptors quantized under that node.
pub type FeatureVector = HashMap<u32, Vec<usize>>;

/// Quantizes descriptors into Bag-of-Words representations.
pub trait VocabularyAdapter: Send + Sync {
    /// Transform `descriptors` into a BoW vector and a feature vector grouped
    /// `levels_up` levels above the leaves.
    fn transform(&self, descriptors: &[Descriptor], levels_up: usize) -> (BowVector, FeatureVector);
}

/// Errors that can occur when loading a vocabulary.
#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("vocabulary I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vocabulary parse error: {0}")]
    Parse(String),
}

/// A node in the vocabulary tree.
#[derive(Debug, Clone)]
pub struct VocabNode {
    pub id: u32,
    /// Parent node id, `u32::MAX` for the root.
    pub parent: u32,
    /// Empty for leaves.
    pub children: Vec<u32>,
    pub descriptor: Descriptor,
    /// IDF weight, non-zero for leaves.
    pub weight: f64,
    pub word_id: Option<u32>,
}

impl VocabNode {
    fn new(id: u32, parent: u32) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            descriptor: [0u8; DESCRIPTOR_BYTES],
            weight: 0.0,
            word_id: None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Hierarchical k-means tree over ORB descriptors (DBoW2 format).
#[derive(Debug)]
pub struct OrbVocabulary {
    /// `nodes[0]` is the root.
    nodes: Vec<VocabNode>,
    /// Word id -> leaf node id.
    words: Vec<u32>,
    k: usize,
    l: usize,
}

impl OrbVocabulary {
    /// Load a vocabulary from a DBoW2 text file.
    ///
    /// ```text
    /// k L scoring weighting
    /// parent_id is_leaf desc[0] ... desc[31] weight
    /// ...
    /// ```
    ///
    /// One line per non-root node, in id order starting at 1.
    pub fn load_from_text<P: AsRef<Path>>(path: P) -> Result<Self, VocabularyError> {
        let file = File::open(path.as_ref())?;
        let vocab = Self::from_reader(BufReader::new(file))?;

        tracing::info!(
            "Loaded vocabulary from {}: k={}, L={}, {} nodes, {} words",
            path.as_ref().display(),
            vocab.k,
            vocab.l,
            vocab.nodes.len(),
            vocab.words.len()
        );
        Ok(vocab)
    }

    /// Parse a DBoW2 text vocabulary from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, VocabularyError> {
        let mut lines = reader.lines();

        let header = lines
            .next()
            .ok_or_else(|| VocabularyError::Parse("empty vocabulary file".to_string()))??;
        let header_parts: Vec<&str> = header.split_whitespace().collect();
        if header_parts.len() < 2 {
            return Err(VocabularyError::Parse(
                "invalid header, expected: k L [scoring weighting]".to_string(),
            ));
        }
        let k: usize = header_parts[0]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid k value".to_string()))?;
        let l: usize = header_parts[1]
            .parse()
            .map_err(|_| VocabularyError::Parse("invalid L value".to_string()))?;

        let mut nodes = vec![VocabNode::new(0, u32::MAX)];
        let mut words = Vec::new();

        for (idx, line) in lines.enumerate() {
            let line = line?;
            let line_num = idx + 2;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            // parent + is_leaf + 32 bytes + weight
            if parts.len() < DESCRIPTOR_BYTES + 3 {
                return Err(VocabularyError::Parse(format!(
                    "line {}: expected {} fields, got {}",
                    line_num,
                    DESCRIPTOR_BYTES + 3,
                    parts.len()
                )));
            }

            let parent_id: u32 = parts[0]
                .parse()
                .map_err(|_| VocabularyError::Parse(format!("line {}: invalid parent id", line_num)))?;
            if parent_id as usize >= nodes.len() {
                return Err(VocabularyError::Parse(format!(
                    "line {}: parent {} not defined before child",
                    line_num, parent_id
                )));
            }
            let is_leaf = parts[1] == "1";

            let node_id = nodes.len() as u32;
            let mut node = VocabNode::new(node_id, parent_id);
            for (i, byte_str) in parts[2..2 + DESCRIPTOR_BYTES].iter().enumerate() {
                node.descriptor[i] = byte_str.parse().map_err(|_| {
                    VocabularyError::Parse(format!("line {}: invalid descriptor byte", line_num))
                })?;
            }
            node.weight = parts[2 + DESCRIPTOR_BYTES]
                .parse()
                .map_err(|_| VocabularyError::Parse(format!("line {}: invalid weight", line_num)))?;

            if is_leaf {
                node.word_id = Some(words.len() as u32);
                words.push(node_id);
            }

            nodes[parent_id as usize].children.push(node_id);
            nodes.push(node);
        }

        Ok(Self { nodes, words, k, l })
    }

    /// Branching factor and depth.
    pub fn params(&self) -> (usize, usize) {
        (self.k, self.l)
    }

    pub fn num_words(&self) -> usize {
        self.words.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Descend from the root following the closest child at each level.
    ///
    /// Returns `(word_id, leaf_node_id)`.
    fn quantize(&self, desc: &Descriptor) -> (u32, u32) {
        let mut node_id = 0usize;

        while let Some((&first, rest)) = self.nodes[node_id].children.split_first() {
            let mut best_child = first;
            let mut best_dist = hamming(desc, &self.nodes[first as usize].descriptor);

            for &child in rest {
                let dist = hamming(desc, &self.nodes[child as usize].descriptor);
                if dist < best_dist {
                    best_dist = dist;
                    best_child = child;
                }
            }
            node_id = best_child as usize;
        }

        (self.nodes[node_id].word_id.unwrap_or(0), node_id as u32)
    }

    /// Ancestor of `leaf_id` `levels_up` levels higher, clamped at the root.
    fn ancestor(&self, leaf_id: u32, levels_up: usize) -> u32 {
        let mut node_id = leaf_id;
        for _ in 0..levels_up {
            let parent = self.nodes[node_id as usize].parent;
            if parent == u32::MAX {
                break;
            }
            node_id = parent;
        }
        node_id
    }

    /// L1 similarity of two normalized BoW vectors: `1 - 0.5 * |v1 - v2|_1`.
    pub fn score(v1: &BowVector, v2: &BowVector) -> f64 {
        let mut diff_sum = 0.0;
        for (word_id, w1) in v1 {
            let w2 = v2.get(word_id).copied().unwrap_or(0.0);
            diff_sum += (w1 - w2).abs();
        }
        for (word_id, w2) in v2 {
            if !v1.contains_key(word_id) {
                diff_sum += w2.abs();
            }
        }
        1.0 - 0.5 * diff_sum
    }
}

impl VocabularyAdapter for OrbVocabulary {
    fn transform(&self, descriptors: &[Descriptor], levels_up: usize) -> (BowVector, FeatureVector) {
        let mut bow = BowVector::new();
        let mut feat = FeatureVector::new();

        for (i, desc) in descriptors.iter().enumerate() {
            let (word_id, leaf_id) = self.quantize(desc);
            *bow.entry(word_id).or_insert(0.0) += self.nodes[leaf_id as usize].weight;
            feat.entry(self.ancestor(leaf_id, levels_up))
                .or_default()
                .push(i);
        }

        let sum: f64 = bow.values().sum();
        if sum > 0.0 {
            for v in bow.values_mut() {
                *v /= sum;
            }
        }

        (bow, feat)
    }
}

#[inline]
fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    crate::features::descriptor_distance(a, b)
}
