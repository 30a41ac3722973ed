use async_trait::async_trait;
use serde::Serialize;

use super::descriptor::GraphBatch;
use crate::error::WriteError;

/// Node and relationship totals of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}

/// A graph database session owned by one runner.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensures the uniqueness constraints on every merge key. Idempotent.
    async fn prepare(&self) -> Result<(), WriteError>;

    /// Applies a batch atomically: node upserts first, then edge merges.
    async fn write(&self, batch: &GraphBatch) -> Result<(), WriteError>;

    async fn counts(&self) -> Result<GraphCounts, WriteError>;
}
