//! Sub-topic naming for the three record kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of record, matching both the `type` field and the sub-topic suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Header,
    Chunk,
    Completion,
}

impl RecordKind {
    /// Every kind, in emission order.
    pub const ALL: [Self; 3] = [Self::Header, Self::Chunk, Self::Completion];

    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Chunk => "chunk",
            Self::Completion => "completion",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Topics derived from one deployment's base topic.
///
/// # Examples
///
/// ```
/// use chunkwire::record::{RecordKind, TopicSet};
/// let topics = TopicSet::new("esp32/camera");
/// assert_eq!(topics.topic(RecordKind::Chunk), "esp32/camera/chunk");
/// assert_eq!(topics.classify("esp32/camera/header"), Some(RecordKind::Header));
/// assert_eq!(topics.classify("esp32/other/header"), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicSet {
    base: String,
    header: String,
    chunk: String,
    completion: String,
}

impl TopicSet {
    /// Derive the sub-topics of `base`. A trailing `/` on `base` is ignored.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            header: format!("{base}/{}", RecordKind::Header),
            chunk: format!("{base}/{}", RecordKind::Chunk),
            completion: format!("{base}/{}", RecordKind::Completion),
            base,
        }
    }

    /// The base topic the sub-topics hang from.
    #[must_use]
    pub fn base(&self) -> &str { &self.base }

    /// Full topic name for `kind`.
    #[must_use]
    pub fn topic(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Header => &self.header,
            RecordKind::Chunk => &self.chunk,
            RecordKind::Completion => &self.completion,
        }
    }

    /// All three sub-topics, for subscribing.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        RecordKind::ALL
            .iter()
            .map(|kind| self.topic(*kind).to_owned())
            .collect()
    }

    /// Map an inbound topic name back to its record kind.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<RecordKind> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| self.topic(*kind) == topic)
    }
}
