//! Typed capsule IO declarations.
//!
//! A [`NodeDescription`] states how many detections a capsule consumes or
//! produces, which detection types they carry, and which extra-data keys and
//! attributes are attached to them. The composer uses these declarations to
//! order capsules; backends never see them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::detection::DetectionNode;

/// How many detections a capsule consumes or produces per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Size {
    /// No detections (whole-frame detectors on the input side).
    #[default]
    None,
    /// Exactly one detection per invocation.
    Single,
    /// Every matching detection at once.
    All,
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Single => write!(f, "single"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Shape and semantic tags of the data a capsule requires or produces.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeDescription {
    pub size: Size,
    #[serde(default)]
    pub detections: BTreeSet<String>,
    #[serde(default)]
    pub extra_data: BTreeSet<String>,
    #[serde(default)]
    pub attributes: BTreeSet<String>,
}

impl NodeDescription {
    /// A description with the given size and nothing else.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Shorthand for `NodeDescription::new(Size::None)`.
    pub fn none() -> Self {
        Self::new(Size::None)
    }

    pub fn detections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detections.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn extra_data<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_data.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn attributes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.extend(keys.into_iter().map(Into::into));
        self
    }

    /// True if the description carries no detections, extra data or attributes.
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.extra_data.is_empty() && self.attributes.is_empty()
    }

    /// Whether a detection fits this description when used as an input filter.
    ///
    /// The detection type must be one of the declared types and every declared
    /// extra-data key and attribute must already be present on the node.
    pub fn describes(&self, node: &DetectionNode) -> bool {
        if self.size == Size::None {
            return false;
        }
        self.detections.contains(&node.name)
            && self.extra_data.iter().all(|k| node.extra_data.contains_key(k))
            && self.attributes.iter().all(|k| node.attributes.contains_key(k))
    }
}

/// A single item of data that flows between capsules.
///
/// The composer orders capsules over these tags: a capsule that requires a tag
/// runs after every capsule that provides it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum DataTag {
    Detection(String),
    ExtraData(String),
    Attribute(String),
}

impl std::fmt::Display for DataTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detection(name) => write!(f, "detection '{}'", name),
            Self::ExtraData(key) => write!(f, "extra data '{}'", key),
            Self::Attribute(key) => write!(f, "attribute '{}'", key),
        }
    }
}

/// Every tag a description mentions.
pub fn tags(description: &NodeDescription) -> BTreeSet<DataTag> {
    let mut out = BTreeSet::new();
    out.extend(description.detections.iter().cloned().map(DataTag::Detection));
    out.extend(description.extra_data.iter().cloned().map(DataTag::ExtraData));
    out.extend(description.attributes.iter().cloned().map(DataTag::Attribute));
    out
}
