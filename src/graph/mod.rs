//! Graph schema, mapping and stores.

pub mod cypher;
pub mod descriptor;
pub mod mapper;
pub mod memory;
pub mod neo4j;
pub mod store;
pub mod writer;

pub use descriptor::GraphBatch;
pub use memory::MemoryStore;
pub use neo4j::Neo4jStore;
pub use store::{GraphCounts, GraphStore};
pub use writer::GraphWriter;
