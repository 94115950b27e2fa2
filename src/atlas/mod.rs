//! Atlas module - keyframe registry.
//!
//! - [`map::KeyframeMap`] - admits and prunes keyframes, assigns ids, answers
//!   covisibility and place recognition queries

pub mod map;

pub use map::{Candidate, Covisible, KeyframeMap, MapConfig};
