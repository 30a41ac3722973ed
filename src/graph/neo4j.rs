//! Neo4j-backed graph store.

use async_trait::async_trait;
use log::{debug, info};
use neo4rs::{query, ConfigBuilder, Graph, Query};

use super::cypher::{self, Statement, COUNT_NODES, COUNT_RELATIONSHIPS};
use super::descriptor::{GraphBatch, Label, PropertyValue};
use super::store::{GraphCounts, GraphStore};
use crate::config::Neo4jSection;
use crate::error::{G2GError, Result, WriteError};

const MAX_CONNECTIONS: usize = 4;
const FETCH_SIZE: usize = 200;

/// A connection pool to one Neo4j database, owned by one runner.
pub struct Neo4jStore {
    graph: Graph,
    uri: String,
}

impl From<Statement> for Query {
    fn from(statement: Statement) -> Self {
        statement
            .params
            .into_iter()
            .fold(query(&statement.text), |q, (name, value)| match value {
                PropertyValue::Bool(b) => q.param(&name, b),
                PropertyValue::Int(i) => q.param(&name, i),
                PropertyValue::Float(f) => q.param(&name, f),
                PropertyValue::Text(s) => q.param(&name, s),
                PropertyValue::Null => q,
            })
    }
}

impl Neo4jStore {
    pub async fn connect(section: &Neo4jSection) -> Result<Self> {
        let uri = section.uri();
        let config = ConfigBuilder::default()
            .uri(uri.as_str())
            .user(section.user.as_str())
            .password(section.password.as_str())
            .db(section.db.as_str())
            .max_connections(MAX_CONNECTIONS)
            .fetch_size(FETCH_SIZE)
            .build()
            .map_err(|e| G2GError::Config(format!("Invalid Neo4j settings: {e}")))?;

        let graph = Graph::connect(config)
            .await
            .map_err(|e| WriteError::new(&uri, e, true))?;

        // Graph::connect is lazy; force a round trip so bad credentials fail here.
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| WriteError::new(&uri, &e, is_retryable(&e)))?;

        info!("Connected to {uri} (database {})", section.db);
        Ok(Self { graph, uri })
    }

    async fn scalar(&self, text: &str) -> std::result::Result<usize, WriteError> {
        let failed = |e: &dyn std::fmt::Display| WriteError::new(text, e, false);

        let mut rows = self.graph.execute(query(text)).await.map_err(|e| failed(&e))?;
        let Some(row) = rows.next().await.map_err(|e| failed(&e))? else {
            return Ok(0);
        };
        let count: i64 = row.get("count").map_err(|e| failed(&e))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn prepare(&self) -> std::result::Result<(), WriteError> {
        for label in Label::ALL {
            let statement = cypher::unique_constraint(label);
            debug!("{}: {}", self.uri, statement.text);
            self.graph
                .run(Query::from(statement))
                .await
                .map_err(|e| WriteError::new(format!("constraint on {label}"), &e, is_retryable(&e)))?;
        }
        Ok(())
    }

    async fn write(&self, batch: &GraphBatch) -> std::result::Result<(), WriteError> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| WriteError::new("begin", &e, is_retryable(&e)))?;

        let statements = batch
            .nodes
            .iter()
            .map(|node| (node.to_string(), cypher::upsert_node(node)))
            .chain(
                batch
                    .edges
                    .iter()
                    .map(|edge| (edge.to_string(), cypher::merge_edge(edge))),
            );

        for (descriptor, statement) in statements {
            if let Err(e) = txn.run(Query::from(statement)).await {
                let error = WriteError::new(descriptor, &e, is_retryable(&e));
                if let Err(rollback) = txn.rollback().await {
                    debug!("Rollback after failed write also failed: {rollback}");
                }
                return Err(error);
            }
        }

        txn.commit()
            .await
            .map_err(|e| WriteError::new("commit", &e, is_retryable(&e)))
    }

    async fn counts(&self) -> std::result::Result<GraphCounts, WriteError> {
        Ok(GraphCounts {
            nodes: self.scalar(COUNT_NODES).await?,
            relationships: self.scalar(COUNT_RELATIONSHIPS).await?,
        })
    }
}

/// Connection-level and transient database failures may succeed on retry;
/// constraint and syntax errors will not.
fn is_retryable(error: &neo4rs::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<std::io::Error>() {
            return true;
        }
        source = e.source();
    }

    let message = error.to_string();
    message.contains("TransientError") || message.to_lowercase().contains("connection")
}
