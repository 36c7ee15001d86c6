use chrono::{DateTime, Utc};
use neo4rs::query;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use muletrace_common::{Entity, EntityKind, MuletraceError, SiteRecord, TransferRecord};

use crate::domain::normalize_domain;
use crate::response::TransferView;
use crate::GraphClient;

/// Write-side wrapper for the graph: site/entity upserts and transfer
/// edges. The topology generator writes through the same paths.
pub struct GraphWriter {
    client: GraphClient,
}

/// Outcome of one site batch.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertStats {
    pub domain: String,
    pub written: u32,
    pub skipped_invalid: u32,
    pub failed: u32,
}

impl GraphWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Persist one extraction batch: the site node, every valid entity,
    /// and a FEATURES edge per site/entity pair. Idempotent and safe to
    /// repeat for the same input.
    ///
    /// Site write failure aborts the batch. A single entity failure is
    /// logged and the rest of the batch still writes. A batch where every
    /// candidate fails validation is skipped as `NoValidData`.
    pub async fn upsert_site_data(
        &self,
        site: &SiteRecord,
        entities: &[Entity],
    ) -> Result<UpsertStats, MuletraceError> {
        let mut valid = Vec::with_capacity(entities.len());
        let mut skipped_invalid = 0u32;
        for entity in entities {
            match entity.validate() {
                Ok(()) => valid.push(entity),
                Err(reason) => {
                    warn!(kind = %entity.kind(), reason = reason.as_str(), "Dropping invalid entity from batch");
                    skipped_invalid += 1;
                }
            }
        }

        let domain = normalize_domain(&site.original_url);

        if !entities.is_empty() && valid.is_empty() {
            warn!(domain = domain.as_str(), candidates = entities.len(), "No valid entities in batch, skipping site write");
            return Err(MuletraceError::NoValidData);
        }

        // Site first: entities are cross-linked against it.
        self.upsert_site(site, &domain).await?;

        let mut written = 0u32;
        let mut failed = 0u32;
        for entity in valid {
            let result = async {
                self.upsert_entity(entity).await?;
                self.ensure_features(&domain, entity).await
            }
            .await;

            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    error!(domain = domain.as_str(), key = entity.key().as_str(), error = %e, "Entity write failed, continuing batch");
                    failed += 1;
                }
            }
        }

        info!(
            domain = domain.as_str(),
            written, skipped_invalid, failed, "Site batch stored"
        );

        Ok(UpsertStats {
            domain,
            written,
            skipped_invalid,
            failed,
        })
    }

    /// Create-or-merge the Site node for a normalized domain.
    /// Incoming empty values never blank previously stored ones.
    pub async fn upsert_site(
        &self,
        site: &SiteRecord,
        domain: &str,
    ) -> Result<(), MuletraceError> {
        let q = query(
            "MERGE (s:Site {domain: $domain})
             ON CREATE SET s.id = $id, s.synthetic = $synthetic
             SET s.last_extraction = datetime($now),
                 s.original_url = $original_url,
                 s.name = CASE WHEN $name <> '' THEN $name ELSE coalesce(s.name, '') END,
                 s.language = CASE WHEN $language <> '' THEN $language ELSE coalesce(s.language, '') END,
                 s.notes = CASE WHEN $notes <> '' THEN $notes ELSE coalesce(s.notes, '') END,
                 s.registration_outcome = CASE WHEN $registration_outcome IS NOT NULL
                     THEN $registration_outcome ELSE s.registration_outcome END",
        )
        .param("domain", domain)
        .param("id", Uuid::new_v4().to_string())
        .param("synthetic", site.synthetic)
        .param("now", format_datetime(&Utc::now()))
        .param("original_url", site.original_url.as_str())
        .param("name", site.name.clone().unwrap_or_default())
        .param("language", site.language.clone().unwrap_or_default())
        .param("notes", site.notes.clone().unwrap_or_default())
        .param("registration_outcome", site.registration_outcome);

        self.client.graph.run(q).await.map_err(db_err)
    }

    /// Create-or-match an entity by its kind-scoped key and patch its
    /// attributes: an incoming value wins only when it is present, so a
    /// later sparse extraction never blanks an earlier rich one.
    /// Returns the entity's stored id.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<Uuid, MuletraceError> {
        let meta = entity.meta();
        let kind = entity.kind();

        let mut str_props: Vec<(&str, String)> = vec![
            ("oss_key", meta.oss_key.clone().unwrap_or_default()),
            ("cluster_id", meta.cluster_id.clone().unwrap_or_default()),
        ];
        let mut float_props: Vec<(&str, Option<f64>)> = Vec::new();

        match entity {
            Entity::BankAccount(e) => {
                str_props.push(("bank_name", e.bank_name.clone()));
                str_props.push(("account_holder", e.account_holder.clone()));
                str_props.push(("bank_code", e.bank_code.clone().unwrap_or_default()));
                str_props.push(("account_type", e.account_type.clone().unwrap_or_default()));
                str_props.push(("processing_time", e.processing_time.clone().unwrap_or_default()));
                float_props.push(("min_transfer", e.min_transfer));
                float_props.push(("max_transfer", e.max_transfer));
            }
            Entity::CryptoWallet(e) => {
                str_props.push(("currency", e.currency.clone()));
                str_props.push(("notes", e.notes.clone().unwrap_or_default()));
            }
            Entity::EWallet(e) => {
                str_props.push(("provider", e.provider.clone()));
                str_props.push(("number", e.number.clone()));
                str_props.push(("phone_number", e.phone_number.clone().unwrap_or_default()));
                str_props.push(("owner_name", e.owner_name.clone().unwrap_or_default()));
            }
            Entity::PhoneNumber(e) => {
                str_props.push(("carrier", e.provider.clone().unwrap_or_default()));
            }
            Entity::QrisCode(e) => {
                str_props.push(("merchant_name", e.merchant_name.clone().unwrap_or_default()));
                str_props.push(("category", e.category.clone().unwrap_or_default()));
            }
        }

        let mut set_parts: Vec<String> = vec!["n.last_update = datetime($now)".to_string()];
        for (prop, _) in &str_props {
            set_parts.push(patch_str(prop));
        }
        for (prop, _) in &float_props {
            set_parts.push(patch_float(prop));
        }
        // Zero means unranked: an unranked upsert keeps the stored ranking.
        set_parts.push(
            "n.priority_score = CASE WHEN $priority_score > 0 \
             THEN $priority_score ELSE coalesce(n.priority_score, 0) END"
                .to_string(),
        );

        let cypher = format!(
            "MERGE (n:{label} {{{key_prop}: $key}})
             ON CREATE SET n.id = $id, n.synthetic = $synthetic, n.created_at = datetime($now)
             SET {set}
             RETURN n.id AS id",
            label = kind.label(),
            key_prop = kind.key_property(),
            set = set_parts.join(",\n                 "),
        );

        let mut q = query(&cypher)
            .param("key", entity.key())
            .param("id", meta.id.to_string())
            .param("synthetic", meta.synthetic)
            .param("now", format_datetime(&Utc::now()))
            .param("priority_score", meta.priority_score);
        for (prop, value) in str_props {
            q = q.param(prop, value);
        }
        for (prop, value) in float_props {
            q = q.param(prop, value);
        }

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        if let Some(row) = stream.next().await.map_err(db_err)? {
            let id_str: String = row.get("id").unwrap_or_default();
            if let Ok(id) = Uuid::parse_str(&id_str) {
                return Ok(id);
            }
        }
        Ok(meta.id)
    }

    /// Ensure a FEATURES edge from a site to an entity. MERGE keeps
    /// re-discovery of the same entity on the same site a no-op.
    pub async fn ensure_features(
        &self,
        domain: &str,
        entity: &Entity,
    ) -> Result<(), MuletraceError> {
        let kind = entity.kind();
        let cypher = format!(
            "MATCH (s:Site {{domain: $domain}})
             MATCH (n:{label} {{{key_prop}: $key}})
             MERGE (s)-[:FEATURES]->(n)",
            label = kind.label(),
            key_prop = kind.key_property(),
        );
        let q = query(&cypher)
            .param("domain", domain)
            .param("key", entity.key());

        self.client.graph.run(q).await.map_err(db_err)
    }

    /// Append a transfer edge between two entities resolved by key across
    /// all five kinds. Always creates a fresh edge; parallel transfers
    /// between the same pair stay distinct.
    pub async fn record_transfer(
        &self,
        transfer: &TransferRecord,
    ) -> Result<TransferView, MuletraceError> {
        let from_id = self
            .resolve_entity(&transfer.from_key)
            .await?
            .ok_or_else(|| MuletraceError::EntityNotFound(transfer.from_key.clone()))?;
        let to_id = self
            .resolve_entity(&transfer.to_key)
            .await?
            .ok_or_else(|| MuletraceError::EntityNotFound(transfer.to_key.clone()))?;

        let timestamp = transfer.timestamp.unwrap_or_else(Utc::now);

        let q = query(
            "MATCH (a) WHERE a.id = $from_id
             MATCH (b) WHERE b.id = $to_id
             CREATE (a)-[t:TRANSFERS_TO {
                 amount: $amount,
                 timestamp: datetime($timestamp),
                 reference: $reference,
                 synthetic: $synthetic
             }]->(b)",
        )
        .param("from_id", from_id.to_string())
        .param("to_id", to_id.to_string())
        .param("amount", transfer.amount)
        .param("timestamp", format_datetime(&timestamp))
        .param("reference", transfer.reference.clone().unwrap_or_default())
        .param("synthetic", transfer.synthetic);

        self.client.graph.run(q).await.map_err(db_err)?;

        Ok(TransferView {
            from_id,
            to_id,
            amount: transfer.amount,
            timestamp,
            reference: transfer.reference.clone(),
        })
    }

    /// Resolve a key against its kind-scoped key property, without knowing
    /// the kind in advance.
    pub async fn resolve_entity(&self, key: &str) -> Result<Option<Uuid>, MuletraceError> {
        let arms: Vec<String> = EntityKind::ALL
            .iter()
            .map(|k| format!("(n:{} AND n.{} = $key)", k.label(), k.key_property()))
            .collect();
        let cypher = format!(
            "MATCH (n) WHERE {} RETURN n.id AS id LIMIT 1",
            arms.join(" OR ")
        );
        let q = query(&cypher).param("key", key);

        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        if let Some(row) = stream.next().await.map_err(db_err)? {
            let id_str: String = row.get("id").unwrap_or_default();
            return Ok(Uuid::parse_str(&id_str).ok());
        }
        Ok(None)
    }
}

/// Map a driver error onto the store-level taxonomy. Connection-level
/// failures become StoreUnavailable so retry policy stays with the caller;
/// everything else surfaces unmodified as a database error.
pub(crate) fn db_err(e: neo4rs::Error) -> MuletraceError {
    let msg = e.to_string();
    match e {
        neo4rs::Error::ConnectionError | neo4rs::Error::IOError { .. } => {
            MuletraceError::StoreUnavailable(msg)
        }
        _ => MuletraceError::Database(msg),
    }
}

fn patch_str(prop: &str) -> String {
    format!("n.{prop} = CASE WHEN ${prop} <> '' THEN ${prop} ELSE coalesce(n.{prop}, '') END")
}

fn patch_float(prop: &str) -> String {
    format!("n.{prop} = CASE WHEN ${prop} IS NOT NULL THEN ${prop} ELSE n.{prop} END")
}

/// Format a DateTime<Utc> as a local datetime string without timezone
/// offset; the store's datetime() rejects a +00:00 suffix.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_clause_prefers_incoming_non_empty_value() {
        let clause = patch_str("bank_name");
        assert_eq!(
            clause,
            "n.bank_name = CASE WHEN $bank_name <> '' THEN $bank_name ELSE coalesce(n.bank_name, '') END"
        );
    }

    #[test]
    fn datetime_format_has_no_timezone_suffix() {
        let dt = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_datetime(&dt), "2024-05-01T10:30:00.000000");
    }
}
