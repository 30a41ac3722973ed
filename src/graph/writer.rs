use std::sync::Arc;

use log::debug;
use serde::Serialize;

use super::descriptor::{EdgeDescriptor, GraphBatch, NodeDescriptor};
use super::store::{GraphCounts, GraphStore};
use crate::error::WriteError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteStats {
    pub batches: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Applies descriptors to one store session.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    stats: WriteStats,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            stats: WriteStats::default(),
        }
    }

    pub async fn prepare(&self) -> Result<(), WriteError> {
        self.store.prepare().await
    }

    pub async fn apply_node(&mut self, node: &NodeDescriptor) -> Result<(), WriteError> {
        self.apply(&GraphBatch {
            nodes: vec![node.clone()],
            edges: Vec::new(),
        })
        .await
    }

    pub async fn apply_edge(&mut self, edge: &EdgeDescriptor) -> Result<(), WriteError> {
        self.apply(&GraphBatch {
            nodes: Vec::new(),
            edges: vec![edge.clone()],
        })
        .await
    }

    /// Writes a batch as one atomic unit. Re-applying a batch is harmless.
    pub async fn apply(&mut self, batch: &GraphBatch) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }

        self.store.write(batch).await?;

        self.stats.batches += 1;
        self.stats.nodes += batch.nodes.len();
        self.stats.edges += batch.edges.len();
        debug!(
            "Committed batch of {} node(s) and {} edge(s)",
            batch.nodes.len(),
            batch.edges.len()
        );
        Ok(())
    }

    pub async fn counts(&self) -> Result<GraphCounts, WriteError> {
        self.store.counts().await
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}
