//! Keyframe identity.

/// Identifier of a keyframe within a map.
///
/// Negative values mark a provisional keyframe that has been built but not
/// yet admitted into a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyframeId(pub i64);

impl KeyframeId {
    /// Id carried by keyframes built outside of a map.
    pub const PROVISIONAL: KeyframeId = KeyframeId(-1);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn is_provisional(&self) -> bool {
        self.0 < 0
    }
}

impl Default for KeyframeId {
    fn default() -> Self {
        Self::PROVISIONAL
    }
}

impl std::fmt::Display for KeyframeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_provisional() {
            write!(f, "KF?")
        } else {
            write!(f, "KF{}", self.0)
        }
    }
}
