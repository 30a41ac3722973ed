//! GitLab REST access and entity extraction.

pub mod client;
pub mod extractor;
pub mod pagination;
pub mod references;
pub mod types;

pub use client::{GitLabClient, RetryPolicy};
pub use extractor::EntityExtractor;
pub use references::References;
pub use types::{EntityKind, EntityRecord};
