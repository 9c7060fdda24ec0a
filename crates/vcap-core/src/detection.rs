//! Per-frame detection graph.
//!
//! Every detection produced while processing one frame lives in a
//! [`DetectionSet`]. Lineage is recorded as a [`NodeId`] into that set, so a
//! node never owns its parent and the whole graph is dropped with the set at
//! the end of the frame's pass.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DetectionError, Result};
use crate::geometry::{BoundingBox, Point};

/// Slot index of a detection inside its frame's [`DetectionSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single detection in pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionNode {
    /// Detection type, e.g. "face" or "vehicle"
    pub name: String,
    /// Polygon outline, at least three points
    pub coords: Vec<Point>,
    /// Classifier outputs such as `color -> "red"`
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Free-form values attached by capsules, such as a confidence
    #[serde(default)]
    pub extra_data: BTreeMap<String, serde_json::Value>,
    /// The detection this one was derived from, within the same set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    /// Name of the capsule that produced this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl DetectionNode {
    pub fn new(name: impl Into<String>, coords: Vec<Point>) -> Self {
        Self {
            name: name.into(),
            coords,
            attributes: BTreeMap::new(),
            extra_data: BTreeMap::new(),
            parent: None,
            producer: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_data.insert(key.into(), value);
        self
    }

    /// Bounding rectangle of the polygon.
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_coords(&self.coords).unwrap_or_default()
    }

    /// Centre of the bounding rectangle.
    pub fn center(&self) -> Point {
        self.bbox().center()
    }

    /// True if the detection has the given attribute set to `value`.
    pub fn has_attribute(&self, key: &str, value: &str) -> bool {
        self.attributes.get(key).map(|v| v == value).unwrap_or(false)
    }

    /// Reject polygons with fewer than three points or non-finite coordinates.
    pub fn validate(&self) -> Result<()> {
        if self.coords.len() < 3 {
            return Err(DetectionError::InvalidPolygon {
                name: self.name.clone(),
                points: self.coords.len(),
            }
            .into());
        }
        if self.coords.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(DetectionError::NonFiniteCoords(self.name.clone()).into());
        }
        Ok(())
    }
}

/// Frame-scoped arena of detections.
///
/// Every parent index points at an earlier slot. Deserialization enforces
/// the same rule as [`DetectionSet::push_child`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DetectionNode>", into = "Vec<DetectionNode>")]
pub struct DetectionSet {
    nodes: Vec<DetectionNode>,
}

impl TryFrom<Vec<DetectionNode>> for DetectionSet {
    type Error = DetectionError;

    fn try_from(nodes: Vec<DetectionNode>) -> std::result::Result<Self, Self::Error> {
        for (i, node) in nodes.iter().enumerate() {
            if let Some(parent) = node.parent {
                if parent.0 >= i {
                    return Err(DetectionError::ParentNotEarlier {
                        node: NodeId(i),
                        parent,
                    });
                }
            }
        }
        Ok(Self { nodes })
    }
}

impl From<DetectionSet> for Vec<DetectionNode> {
    fn from(set: DetectionSet) -> Self {
        set.nodes
    }
}

impl DetectionSet {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a root detection (any parent it carries is cleared).
    pub fn push(&mut self, mut node: DetectionNode) -> NodeId {
        node.parent = None;
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Add a detection derived from `parent`.
    pub fn push_child(&mut self, parent: NodeId, mut node: DetectionNode) -> Result<NodeId> {
        if parent.0 >= self.nodes.len() {
            return Err(DetectionError::UnknownParent(parent).into());
        }
        node.parent = Some(parent);
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&DetectionNode> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DetectionNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn parent(&self, id: NodeId) -> Option<&DetectionNode> {
        self.get(id)?.parent.and_then(|p| self.get(p))
    }

    /// Ancestors of `id`, nearest first.
    ///
    /// Stops at a parent that does not precede its child, which only a
    /// caller rewriting `parent` through [`DetectionSet::get_mut`] can create.
    pub fn lineage(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut child = id;
        while let Some(p) = self.get(child).and_then(|n| n.parent) {
            if p >= child {
                break;
            }
            out.push(p);
            child = p;
        }
        out
    }

    /// Direct children of `id`, in insertion order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &DetectionNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Detections of the given type, in insertion order.
    pub fn with_class_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (NodeId, &'a DetectionNode)> + 'a {
        self.iter().filter(move |(_, n)| n.name == name)
    }

    pub fn nodes(&self) -> &[DetectionNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<DetectionNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
