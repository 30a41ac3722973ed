use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Node labels of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Label {
    Project,
    Pipeline,
    Job,
    Commit,
    User,
    Runner,
}

impl Label {
    pub const ALL: [Label; 6] = [
        Label::Project,
        Label::Pipeline,
        Label::Job,
        Label::Commit,
        Label::User,
        Label::Runner,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Project => "Project",
            Label::Pipeline => "Pipeline",
            Label::Job => "Job",
            Label::Commit => "Commit",
            Label::User => "User",
            Label::Runner => "Runner",
        }
    }

    /// The merge key property.
    pub fn key_property(self) -> &'static str {
        match self {
            Label::Commit => "sha",
            _ => "id",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKey {
    Int(i64),
    Text(String),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Int(id) => write!(f, "{id}"),
            NodeKey::Text(key) => write!(f, "\"{key}\""),
        }
    }
}

impl From<i64> for NodeKey {
    fn from(value: i64) -> Self {
        NodeKey::Int(value)
    }
}

impl From<&str> for NodeKey {
    fn from(value: &str) -> Self {
        NodeKey::Text(value.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(value: String) -> Self {
        NodeKey::Text(value)
    }
}

/// Identity of a node: its label plus merge key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub label: Label,
    pub key: NodeKey,
}

impl NodeRef {
    pub fn new(label: Label, key: impl Into<NodeKey>) -> Self {
        Self {
            label,
            key: key.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        PropertyValue::Text(value.clone())
    }
}

/// Timestamps are stored as UTC RFC 3339 strings with millisecond precision.
impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Text(value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Null, Into::into)
    }
}

impl From<&NodeKey> for PropertyValue {
    fn from(value: &NodeKey) -> Self {
        match value {
            NodeKey::Int(id) => PropertyValue::Int(*id),
            NodeKey::Text(key) => PropertyValue::Text(key.clone()),
        }
    }
}

/// A node to upsert. `properties` never contains the key property.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescriptor {
    pub node: NodeRef,
    pub properties: BTreeMap<&'static str, PropertyValue>,
}

impl NodeDescriptor {
    pub fn new(node: NodeRef) -> Self {
        Self {
            node,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name, value.into());
        self
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

/// Relationship types of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelType {
    HasPipeline,
    HasJob,
    RanOn,
    TriggeredBy,
    AuthoredBy,
    HasParent,
}

impl RelType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelType::HasPipeline => "HAS_PIPELINE",
            RelType::HasJob => "HAS_JOB",
            RelType::RanOn => "RAN_ON",
            RelType::TriggeredBy => "TRIGGERED_BY",
            RelType::AuthoredBy => "AUTHORED_BY",
            RelType::HasParent => "HAS_PARENT",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of an edge relative to its `source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// An edge between two nodes, anchored at `source`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeDescriptor {
    pub rel: RelType,
    pub source: NodeRef,
    pub target: NodeRef,
    pub direction: Direction,
}

impl EdgeDescriptor {
    pub fn outgoing(rel: RelType, source: NodeRef, target: NodeRef) -> Self {
        Self {
            rel,
            source,
            target,
            direction: Direction::Outgoing,
        }
    }

    pub fn incoming(rel: RelType, source: NodeRef, target: NodeRef) -> Self {
        Self {
            rel,
            source,
            target,
            direction: Direction::Incoming,
        }
    }

    /// `(from, to)` as stored in the graph.
    pub fn endpoints(&self) -> (&NodeRef, &NodeRef) {
        match self.direction {
            Direction::Outgoing => (&self.source, &self.target),
            Direction::Incoming => (&self.target, &self.source),
        }
    }
}

impl fmt::Display for EdgeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = self.endpoints();
        write!(f, "{from}-[:{}]->{to}", self.rel)
    }
}

/// Descriptors produced from one extraction page; one write unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphBatch {
    pub nodes: Vec<NodeDescriptor>,
    pub edges: Vec<EdgeDescriptor>,
}

impl GraphBatch {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn extend(&mut self, other: GraphBatch) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn incoming_edge_is_stored_reversed() {
        let edge = EdgeDescriptor::incoming(
            RelType::HasJob,
            NodeRef::new(Label::Job, 10_i64),
            NodeRef::new(Label::Pipeline, 1_i64),
        );
        let (from, to) = edge.endpoints();
        assert_eq!(from, &NodeRef::new(Label::Pipeline, 1_i64));
        assert_eq!(to, &NodeRef::new(Label::Job, 10_i64));
        assert_eq!(edge.to_string(), "Pipeline(1)-[:HAS_JOB]->Job(10)");
    }

    #[test]
    fn text_keys_are_quoted_in_display() {
        let node = NodeRef::new(Label::Commit, "abc123");
        assert_eq!(node.to_string(), "Commit(\"abc123\")");
        assert_eq!(Label::Commit.key_property(), "sha");
        assert_eq!(Label::User.key_property(), "id");
    }

    #[test]
    fn timestamps_render_with_milliseconds() {
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            PropertyValue::from(timestamp),
            PropertyValue::Text("2024-01-02T03:04:05.000Z".to_string())
        );
        assert!(PropertyValue::from(None::<DateTime<Utc>>).is_null());
    }
}
