use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDateTime, Utc};
use neo4rs::query;
use uuid::Uuid;

use muletrace_common::{EntityKind, MuletraceError};

use crate::filter::GraphFilter;
use crate::response::{EntityDetail, EntityView, GraphView, SiteCluster, TransferView};
use crate::writer::db_err;
use crate::GraphClient;

/// Which transfer edges feed an entity's aggregates.
///
/// `Global` traverses the entity's entire edge set so the numbers reflect
/// overall suspicion signal regardless of the active filter; `Filtered`
/// restricts the traversal to edges whose far end is also in the returned
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationScope {
    Global,
    Filtered,
}

/// Read-side wrapper for the graph: filtered clustering, per-entity
/// aggregation, and entity detail lookups. Read-only; runs concurrently
/// with writers, aggregates are a snapshot as of query time.
pub struct GraphReader {
    client: GraphClient,
    scope: AggregationScope,
}

impl GraphReader {
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            scope: AggregationScope::Global,
        }
    }

    pub fn with_scope(client: GraphClient, scope: AggregationScope) -> Self {
        Self { client, scope }
    }

    /// Execute a filter against the whole graph: entities grouped by the
    /// site(s) featuring them, standalone entities, and every transfer
    /// edge internal to the returned set.
    pub async fn query_graph(&self, filter: &GraphFilter) -> Result<GraphView, MuletraceError> {
        filter.validate()?;
        let compiled = filter.compile();
        let guard = filter.label_guard();

        // Phase 1: entities clustered by featuring site. An entity featured
        // by several sites appears once in each of their clusters.
        let cypher = format!(
            "MATCH (site:Site)-[:FEATURES]->(entity)
             WHERE {guard} AND {clause}
             RETURN site.domain AS domain, site.name AS site_name,
                    entity, labels(entity) AS labels
             ORDER BY site.domain",
            clause = compiled.clause,
        );
        let q = compiled.apply(query(&cypher));

        let mut clusters: Vec<SiteCluster> = Vec::new();
        let mut cluster_index: HashMap<String, usize> = HashMap::new();
        let mut seen_in_cluster: HashMap<String, HashSet<Uuid>> = HashMap::new();

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let domain: String = row.get("domain").unwrap_or_default();
            let site_name: String = row.get("site_name").unwrap_or_default();
            let Some(view) = row_to_entity_view(&row) else {
                continue;
            };

            let idx = *cluster_index.entry(domain.clone()).or_insert_with(|| {
                clusters.push(SiteCluster {
                    domain: domain.clone(),
                    name: if site_name.is_empty() {
                        domain.clone()
                    } else {
                        site_name.clone()
                    },
                    entities: Vec::new(),
                });
                clusters.len() - 1
            });

            if seen_in_cluster.entry(domain).or_default().insert(view.id) {
                clusters[idx].entities.push(view);
            }
        }

        // Phase 2: matching entities with no featuring site at all.
        let cypher = format!(
            "MATCH (entity)
             WHERE {guard} AND {clause}
               AND NOT EXISTS {{ MATCH (:Site)-[:FEATURES]->(entity) }}
             RETURN entity, labels(entity) AS labels
             ORDER BY entity.id",
            clause = compiled.clause,
        );
        let q = compiled.apply(query(&cypher));

        let mut standalone: Vec<EntityView> = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            if let Some(view) = row_to_entity_view(&row) {
                standalone.push(view);
            }
        }

        // Union of returned ids drives aggregation and the edge phase.
        let mut ids: Vec<Uuid> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        for cluster in &clusters {
            for entity in &cluster.entities {
                if seen.insert(entity.id) {
                    ids.push(entity.id);
                }
            }
        }
        for entity in &standalone {
            if seen.insert(entity.id) {
                ids.push(entity.id);
            }
        }

        let aggregates = self.aggregates_for(&ids).await?;
        for cluster in &mut clusters {
            for entity in &mut cluster.entities {
                apply_aggregates(entity, &aggregates);
            }
        }
        for entity in &mut standalone {
            apply_aggregates(entity, &aggregates);
        }

        // Phase 3: edges with both endpoints inside the returned set, so
        // the subgraph is self-contained.
        let transfers = self.transfers_among(&ids).await?;

        let total_transfers = self.total_transfer_count().await?;

        Ok(GraphView {
            total_entities: ids.len() as u64,
            clusters,
            standalone,
            transfers,
            total_transfers,
            available: true,
        })
    }

    /// Full detail for one entity: transfers in both directions, distinct
    /// neighbor entities, and the sites featuring it.
    pub async fn entity_detail(&self, id: Uuid) -> Result<Option<EntityDetail>, MuletraceError> {
        let Some((kind, mut entity)) = self.find_entity(id).await? else {
            return Ok(None);
        };

        let aggregates = self.aggregates_for(&[id]).await?;
        apply_aggregates(&mut entity, &aggregates);

        let label = kind.label();
        let id_str = id.to_string();

        let mut incoming: Vec<TransferView> = Vec::new();
        let mut outgoing: Vec<TransferView> = Vec::new();
        let mut neighbors: Vec<EntityView> = Vec::new();
        let mut neighbor_ids: HashSet<Uuid> = HashSet::new();

        let cypher = format!(
            "MATCH (src)-[t:TRANSFERS_TO]->(n:{label} {{id: $id}})
             RETURN src AS entity, labels(src) AS labels,
                    t.amount AS amount, t.timestamp AS timestamp, t.reference AS reference
             ORDER BY t.timestamp DESC"
        );
        let q = query(&cypher).param("id", id_str.as_str());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let Some(other) = row_to_entity_view(&row) else {
                continue;
            };
            incoming.push(row_to_transfer(&row, other.id, id));
            if neighbor_ids.insert(other.id) {
                neighbors.push(other);
            }
        }

        let cypher = format!(
            "MATCH (n:{label} {{id: $id}})-[t:TRANSFERS_TO]->(dst)
             RETURN dst AS entity, labels(dst) AS labels,
                    t.amount AS amount, t.timestamp AS timestamp, t.reference AS reference
             ORDER BY t.timestamp DESC"
        );
        let q = query(&cypher).param("id", id_str.as_str());
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let Some(other) = row_to_entity_view(&row) else {
                continue;
            };
            outgoing.push(row_to_transfer(&row, id, other.id));
            if neighbor_ids.insert(other.id) {
                neighbors.push(other);
            }
        }

        let cypher = format!(
            "MATCH (s:Site)-[:FEATURES]->(n:{label} {{id: $id}})
             RETURN s.domain AS domain
             ORDER BY s.domain"
        );
        let q = query(&cypher).param("id", id_str.as_str());
        let mut featured_on = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let domain: String = row.get("domain").unwrap_or_default();
            if !domain.is_empty() {
                featured_on.push(domain);
            }
        }

        Ok(Some(EntityDetail {
            entity,
            incoming,
            outgoing,
            neighbors,
            featured_on,
        }))
    }

    async fn find_entity(
        &self,
        id: Uuid,
    ) -> Result<Option<(EntityKind, EntityView)>, MuletraceError> {
        let id_str = id.to_string();
        for kind in EntityKind::ALL {
            let cypher = format!(
                "MATCH (entity:{} {{id: $id}}) RETURN entity, labels(entity) AS labels",
                kind.label()
            );
            let q = query(&cypher).param("id", id_str.as_str());
            let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
            if let Some(row) = stream.next().await.map_err(db_err)? {
                if let Some(view) = row_to_entity_view(&row) {
                    return Ok(Some((kind, view)));
                }
            }
        }
        Ok(None)
    }

    /// Batched per-entity aggregates over TRANSFERS_TO edges in both
    /// directions: distinct neighbors, edge count, summed amount.
    async fn aggregates_for(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, (u64, u64, f64)>, MuletraceError> {
        let mut result = HashMap::new();
        if ids.is_empty() {
            return Ok(result);
        }

        let scope_clause = match self.scope {
            AggregationScope::Global => "",
            AggregationScope::Filtered => "WHERE other.id IN $ids",
        };
        let cypher = format!(
            "MATCH (entity)
             WHERE entity.id IN $ids
             OPTIONAL MATCH (entity)-[t:TRANSFERS_TO]-(other) {scope_clause}
             WITH entity,
                  count(DISTINCT other) AS connections,
                  count(t) AS transactions,
                  sum(coalesce(t.amount, 0.0)) AS total_amount
             RETURN entity.id AS id, connections, transactions, total_amount"
        );
        let id_strs: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let q = query(&cypher).param("ids", id_strs);

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let id_str: String = row.get("id").unwrap_or_default();
            let Ok(id) = Uuid::parse_str(&id_str) else {
                continue;
            };
            let connections: i64 = row.get("connections").unwrap_or(0);
            let transactions: i64 = row.get("transactions").unwrap_or(0);
            let total_amount: f64 = row.get("total_amount").unwrap_or(0.0);
            result.insert(
                id,
                (connections.max(0) as u64, transactions.max(0) as u64, total_amount),
            );
        }
        Ok(result)
    }

    async fn transfers_among(&self, ids: &[Uuid]) -> Result<Vec<TransferView>, MuletraceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let q = query(
            "MATCH (a)-[t:TRANSFERS_TO]->(b)
             WHERE a.id IN $ids AND b.id IN $ids
             RETURN a.id AS from_id, b.id AS to_id,
                    t.amount AS amount, t.timestamp AS timestamp, t.reference AS reference
             ORDER BY t.timestamp DESC",
        )
        .param("ids", ids.iter().map(|id| id.to_string()).collect::<Vec<_>>());

        let mut transfers = Vec::new();
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let from_str: String = row.get("from_id").unwrap_or_default();
            let to_str: String = row.get("to_id").unwrap_or_default();
            let (Ok(from_id), Ok(to_id)) = (Uuid::parse_str(&from_str), Uuid::parse_str(&to_str))
            else {
                continue;
            };
            transfers.push(row_to_transfer(&row, from_id, to_id));
        }
        Ok(transfers)
    }

    /// Store-wide transfer count, independent of the filtered view.
    async fn total_transfer_count(&self) -> Result<u64, MuletraceError> {
        let q = query("MATCH ()-[t:TRANSFERS_TO]->() RETURN count(t) AS total");
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        if let Some(row) = stream.next().await.map_err(db_err)? {
            let total: i64 = row.get("total").unwrap_or(0);
            return Ok(total.max(0) as u64);
        }
        Ok(0)
    }
}

fn apply_aggregates(entity: &mut EntityView, aggregates: &HashMap<Uuid, (u64, u64, f64)>) {
    if let Some((connections, transactions, total_amount)) = aggregates.get(&entity.id) {
        entity.connections = *connections;
        entity.transactions = *transactions;
        entity.total_amount = *total_amount;
    }
}

fn kind_from_labels(labels: &[String]) -> Option<EntityKind> {
    EntityKind::ALL
        .into_iter()
        .find(|kind| labels.iter().any(|l| l == kind.label()))
}

/// Parse a row carrying `entity` and `labels` columns into a view with
/// zeroed aggregates.
pub fn row_to_entity_view(row: &neo4rs::Row) -> Option<EntityView> {
    let node: neo4rs::Node = row.get("entity").ok()?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();
    let kind = kind_from_labels(&labels)?;
    node_to_view(&node, kind)
}

fn node_to_view(node: &neo4rs::Node, kind: EntityKind) -> Option<EntityView> {
    let id_str: String = node.get("id").ok()?;
    let id = Uuid::parse_str(&id_str).ok()?;

    let key: String = node.get(kind.key_property()).unwrap_or_default();

    let holder = match kind {
        EntityKind::BankAccount => non_empty(node.get("account_holder").unwrap_or_default()),
        EntityKind::EWallet => non_empty(node.get("owner_name").unwrap_or_default()),
        _ => None,
    };

    let detail = match kind {
        EntityKind::BankAccount => non_empty(node.get("bank_name").unwrap_or_default()),
        EntityKind::CryptoWallet => non_empty(node.get("currency").unwrap_or_default()),
        EntityKind::EWallet => non_empty(node.get("provider").unwrap_or_default()),
        EntityKind::PhoneNumber => non_empty(node.get("carrier").unwrap_or_default()),
        EntityKind::QrisCode => non_empty(node.get("merchant_name").unwrap_or_default()),
    };

    let priority_score: i64 = node.get("priority_score").unwrap_or(0);

    Some(EntityView {
        id,
        kind,
        key,
        holder,
        detail,
        priority_score,
        connections: 0,
        transactions: 0,
        total_amount: 0.0,
        last_update: parse_datetime_prop(node, "last_update"),
        oss_key: non_empty(node.get("oss_key").unwrap_or_default()),
        cluster_id: non_empty(node.get("cluster_id").unwrap_or_default()),
    })
}

fn row_to_transfer(row: &neo4rs::Row, from_id: Uuid, to_id: Uuid) -> TransferView {
    let amount: f64 = row.get("amount").unwrap_or(0.0);
    let timestamp_str: String = row.get("timestamp").unwrap_or_default();
    let reference: String = row.get("reference").unwrap_or_default();
    TransferView {
        from_id,
        to_id,
        amount,
        timestamp: parse_datetime_str(&timestamp_str).unwrap_or_else(Utc::now),
        reference: non_empty(reference),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Writer stores datetimes as "%Y-%m-%dT%H:%M:%S%.6f" (no timezone,
/// implicitly UTC); some stores echo RFC3339 back. Try both.
fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ndt| ndt.and_utc())
}

pub fn parse_datetime_prop(node: &neo4rs::Node, prop: &str) -> DateTime<Utc> {
    if let Ok(s) = node.get::<String>(prop) {
        if let Some(dt) = parse_datetime_str(&s) {
            return dt;
        }
    }
    Utc::now()
}
