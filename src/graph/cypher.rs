//! Cypher rendering of descriptors.

use super::descriptor::{EdgeDescriptor, Label, NodeDescriptor, NodeKey, PropertyValue};

/// A parameterized Cypher statement, independent of the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    /// Never contains `PropertyValue::Null`; nulls are rendered inline.
    pub params: Vec<(String, PropertyValue)>,
}

impl Statement {
    fn new(text: String) -> Self {
        Self {
            text,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.params.push((name.into(), value));
    }
}

fn key_value(key: &NodeKey) -> PropertyValue {
    PropertyValue::from(key)
}

/// `MERGE` on the key, then overwrite every mapped property.
///
/// Null properties are removed from the node.
pub fn upsert_node(node: &NodeDescriptor) -> Statement {
    let label = node.node.label;
    let mut statement = Statement::new(format!(
        "MERGE (n:{label} {{{}: $key}})",
        label.key_property()
    ));
    statement.bind("key", key_value(&node.node.key));

    let mut assignments = Vec::with_capacity(node.properties.len());
    for (i, (name, value)) in node.properties.iter().enumerate() {
        if value.is_null() {
            assignments.push(format!("n.`{name}` = null"));
        } else {
            let param = format!("p{i}");
            assignments.push(format!("n.`{name}` = ${param}"));
            statement.bind(param, value.clone());
        }
    }
    if !assignments.is_empty() {
        statement.text.push_str(" SET ");
        statement.text.push_str(&assignments.join(", "));
    }
    statement
}

/// `MERGE` both endpoints on their keys only, then the relationship.
///
/// Endpoints that do not exist yet become key-only placeholders; existing
/// nodes keep their properties.
pub fn merge_edge(edge: &EdgeDescriptor) -> Statement {
    let (from, to) = edge.endpoints();
    let mut statement = Statement::new(format!(
        "MERGE (a:{} {{{}: $from}}) MERGE (b:{} {{{}: $to}}) MERGE (a)-[:{}]->(b)",
        from.label,
        from.label.key_property(),
        to.label,
        to.label.key_property(),
        edge.rel
    ));
    statement.bind("from", key_value(&from.key));
    statement.bind("to", key_value(&to.key));
    statement
}

pub fn unique_constraint(label: Label) -> Statement {
    let key = label.key_property();
    Statement::new(format!(
        "CREATE CONSTRAINT {}_{key} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
        label.as_str().to_lowercase()
    ))
}

pub const COUNT_NODES: &str = "MATCH (n) RETURN count(n) AS count";
pub const COUNT_RELATIONSHIPS: &str = "MATCH ()-[r]->() RETURN count(r) AS count";
