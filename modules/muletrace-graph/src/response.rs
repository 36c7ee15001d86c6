use chrono::{DateTime, Utc};
use muletrace_common::EntityKind;
use serde::Serialize;
use uuid::Uuid;

/// One entity as returned by the reader, with its aggregates.
///
/// `connections`, `transactions`, and `total_amount` are computed over the
/// entity's transfer edges per the reader's aggregation scope; by default
/// the entire edge set, independent of the active filter.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    pub id: Uuid,
    pub kind: EntityKind,
    pub key: String,
    pub holder: Option<String>,
    /// Kind-specific headline attribute: bank name, currency, provider,
    /// carrier, or merchant name.
    pub detail: Option<String>,
    pub priority_score: i64,
    pub connections: u64,
    pub transactions: u64,
    pub total_amount: f64,
    pub last_update: DateTime<Utc>,
    pub oss_key: Option<String>,
    pub cluster_id: Option<String>,
}

/// One site and the filtered entities it features.
#[derive(Debug, Clone, Serialize)]
pub struct SiteCluster {
    pub domain: String,
    pub name: String,
    pub entities: Vec<EntityView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferView {
    pub from_id: Uuid,
    pub to_id: Uuid,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub reference: Option<String>,
}

/// The filtered graph: entities clustered by featuring site, standalone
/// entities, and every transfer edge internal to the returned set.
#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    pub clusters: Vec<SiteCluster>,
    pub standalone: Vec<EntityView>,
    pub transfers: Vec<TransferView>,
    pub total_entities: u64,
    /// Store-wide transfer count, not just the filtered view.
    pub total_transfers: u64,
    pub available: bool,
}

impl GraphView {
    /// Empty result annotated as unavailable, distinguishable from a
    /// legitimately empty result set.
    pub fn unavailable() -> Self {
        Self {
            clusters: Vec::new(),
            standalone: Vec::new(),
            transfers: Vec::new(),
            total_entities: 0,
            total_transfers: 0,
            available: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityDetail {
    pub entity: EntityView,
    pub incoming: Vec<TransferView>,
    pub outgoing: Vec<TransferView>,
    pub neighbors: Vec<EntityView>,
    /// Domains of every site featuring this entity.
    pub featured_on: Vec<String>,
}
