//! In-memory graph store used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::descriptor::{GraphBatch, NodeDescriptor, NodeRef, PropertyValue, RelType};
use super::store::{GraphCounts, GraphStore};
use crate::error::WriteError;

/// Plain graph state with the same merge semantics as the Cypher statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryGraph {
    pub nodes: BTreeMap<NodeRef, BTreeMap<String, PropertyValue>>,
    pub edges: BTreeSet<(NodeRef, RelType, NodeRef)>,
}

impl MemoryGraph {
    pub fn upsert_node(&mut self, node: &NodeDescriptor) {
        let properties = self.nodes.entry(node.node.clone()).or_default();
        for (name, value) in &node.properties {
            if value.is_null() {
                properties.remove(*name);
            } else {
                properties.insert((*name).to_string(), value.clone());
            }
        }
    }

    /// Creates missing endpoints as key-only placeholders.
    pub fn merge_edge(&mut self, from: &NodeRef, rel: RelType, to: &NodeRef) {
        self.nodes.entry(from.clone()).or_default();
        self.nodes.entry(to.clone()).or_default();
        self.edges.insert((from.clone(), rel, to.clone()));
    }

    pub fn apply(&mut self, batch: &GraphBatch) {
        for node in &batch.nodes {
            self.upsert_node(node);
        }
        for edge in &batch.edges {
            let (from, to) = edge.endpoints();
            self.merge_edge(from, edge.rel, to);
        }
    }

    #[cfg(test)]
    pub fn node(&self, node: &NodeRef) -> Option<&BTreeMap<String, PropertyValue>> {
        self.nodes.get(node)
    }

    #[cfg(test)]
    pub fn has_edge(&self, from: &NodeRef, rel: RelType, to: &NodeRef) -> bool {
        self.edges.contains(&(from.clone(), rel, to.clone()))
    }

    pub fn counts(&self) -> GraphCounts {
        GraphCounts {
            nodes: self.nodes.len(),
            relationships: self.edges.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    graph: RwLock<MemoryGraph>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> MemoryGraph {
        self.graph.read().await.clone()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn prepare(&self) -> Result<(), WriteError> {
        Ok(())
    }

    async fn write(&self, batch: &GraphBatch) -> Result<(), WriteError> {
        self.graph.write().await.apply(batch);
        Ok(())
    }

    async fn counts(&self) -> Result<GraphCounts, WriteError> {
        Ok(self.graph.read().await.counts())
    }
}
