pub mod client;
pub mod domain;
pub mod filter;
pub mod migrate;
pub mod reader;
pub mod response;
pub mod topology;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use domain::normalize_domain;
pub use filter::GraphFilter;
pub use reader::{AggregationScope, GraphReader};
pub use topology::{GenerationSpec, GenerationSummary, TopologyGenerator};
pub use writer::{GraphWriter, UpsertStats};

pub use neo4rs::query;
