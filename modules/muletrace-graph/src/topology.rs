use neo4rs::query;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};

use muletrace_common::{
    BankAccountEntity, EWalletEntity, Entity, EntityMeta, MuletraceError, SiteRecord,
    TransferRecord,
};

use crate::writer::{db_err, GraphWriter};
use crate::GraphClient;

/// Every pooling cluster must contain at least one account at this bank.
const DESIGNATED_BANK: &str = "BCA";

const BANKS: &[&str] = &["BCA", "BRI", "BNI", "Mandiri", "CIMB Niaga"];
const EWALLET_PROVIDERS: &[&str] = &["OVO", "DANA", "GoPay", "LinkAja", "ShopeePay"];

const FIRST_NAMES: &[&str] = &[
    "Budi", "Siti", "Agus", "Dewi", "Rizky", "Putri", "Andi", "Ratna", "Joko", "Lestari",
];
const LAST_NAMES: &[&str] = &[
    "Santoso", "Wijaya", "Pratama", "Saputra", "Hidayat", "Kusuma", "Halim", "Nugroho",
];

/// Parameters for one synthetic network build.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSpec {
    pub players: u32,
    pub sites: u32,
    pub pooling_per_site: u32,
    /// Fix the seed to reproduce the exact same network.
    pub seed: Option<u64>,
}

impl Default for GenerationSpec {
    fn default() -> Self {
        Self {
            players: 20,
            sites: 3,
            pooling_per_site: 3,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub players: u32,
    pub sites: u32,
    pub pooling: u32,
    pub transfers: u32,
    pub aggregator_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyntheticStats {
    pub nodes_by_label: Vec<LabelCount>,
    pub bank_distribution: Vec<LabelCount>,
    pub transfer_count: u64,
}

/// Builds a three-tier synthetic money-flow network for demos and
/// regression tests: standalone "player" accounts feeding per-site
/// "pooling" clusters, which all drain into a single aggregator.
///
/// Shape is deterministic, detail is randomized (seedable). Structural
/// guarantees hold by construction: tier-1 and tier-2 out-degree exactly 1,
/// tier-3 out-degree 0, no edge points back up a tier, and every node and
/// edge carries the synthetic tag so a later wipe removes exactly this
/// output.
pub struct TopologyGenerator {
    client: GraphClient,
    writer: GraphWriter,
}

impl TopologyGenerator {
    pub fn new(client: GraphClient) -> Self {
        Self {
            writer: GraphWriter::new(client.clone()),
            client,
        }
    }

    /// Generate one network. All writes go through the regular upsert and
    /// transfer paths.
    pub async fn generate(
        &self,
        spec: &GenerationSpec,
    ) -> Result<GenerationSummary, MuletraceError> {
        if spec.players == 0 || spec.sites == 0 || spec.pooling_per_site == 0 {
            return Err(MuletraceError::Validation(
                "players, sites, and pooling_per_site must all be at least 1".into(),
            ));
        }
        if spec.players > 1000 || spec.sites > 100 || spec.pooling_per_site > 20 {
            return Err(MuletraceError::Validation(
                "generation spec exceeds supported bounds (players <= 1000, sites <= 100, pooling_per_site <= 20)".into(),
            ));
        }

        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        // Tier 3: the single aggregator. Standalone, receives everything.
        let aggregator = synthetic_bank(&mut rng, "aggregator", "73", 0, "Mandiri");
        let aggregator_key = aggregator.key();
        self.writer.upsert_entity(&aggregator).await?;

        // Tier 2: pooling clusters, one synthetic site each. The first
        // member is always the designated bank, so the at-least-one
        // guarantee holds by construction rather than by chance.
        let mut pooling_keys: Vec<String> = Vec::new();
        let mut transfers = 0u32;
        for site_idx in 0..spec.sites {
            let site = SiteRecord {
                original_url: format!("https://synthetic-{site_idx:02}.invalid/landing"),
                name: Some(format!("Synthetic Site {site_idx:02}")),
                language: Some("id".into()),
                registration_outcome: None,
                notes: None,
                synthetic: true,
            };

            let mut cluster: Vec<Entity> = Vec::new();
            for slot in 0..spec.pooling_per_site {
                let ordinal = site_idx * spec.pooling_per_site + slot;
                let entity = if slot == 0 {
                    synthetic_bank(&mut rng, "pooling", "72", ordinal, DESIGNATED_BANK)
                } else if rng.random_bool(0.7) {
                    let bank = BANKS[rng.random_range(0..BANKS.len())];
                    synthetic_bank(&mut rng, "pooling", "72", ordinal, bank)
                } else {
                    synthetic_ewallet(&mut rng, "pooling", "72", ordinal)
                };
                pooling_keys.push(entity.key());
                cluster.push(entity);
            }

            self.writer.upsert_site_data(&site, &cluster).await?;
        }

        // Tier 2 -> Tier 3: one settlement edge per pooling entity.
        for key in &pooling_keys {
            self.writer
                .record_transfer(&TransferRecord {
                    from_key: key.clone(),
                    to_key: aggregator_key.clone(),
                    amount: random_amount(&mut rng),
                    timestamp: None,
                    reference: Some("settlement".into()),
                    synthetic: true,
                })
                .await?;
            transfers += 1;
        }

        // Tier 1: standalone players, each with exactly one deposit into a
        // randomly chosen pooling entity.
        for ordinal in 0..spec.players {
            let entity = if rng.random_bool(0.6) {
                let bank = BANKS[rng.random_range(0..BANKS.len())];
                synthetic_bank(&mut rng, "player", "71", ordinal, bank)
            } else {
                synthetic_ewallet(&mut rng, "player", "71", ordinal)
            };
            self.writer.upsert_entity(&entity).await?;

            let target = pooling_keys[rng.random_range(0..pooling_keys.len())].clone();
            self.writer
                .record_transfer(&TransferRecord {
                    from_key: entity.key(),
                    to_key: target,
                    amount: random_amount(&mut rng),
                    timestamp: None,
                    reference: Some("deposit".into()),
                    synthetic: true,
                })
                .await?;
            transfers += 1;
        }

        let summary = GenerationSummary {
            players: spec.players,
            sites: spec.sites,
            pooling: pooling_keys.len() as u32,
            transfers,
            aggregator_key,
        };
        info!(
            players = summary.players,
            sites = summary.sites,
            pooling = summary.pooling,
            transfers = summary.transfers,
            "Synthetic network generated"
        );
        Ok(summary)
    }

    /// Remove everything the generator ever wrote, and nothing else.
    /// Returns the number of deleted nodes.
    pub async fn clear_synthetic(&self) -> Result<u64, MuletraceError> {
        self.client
            .graph
            .run(query(
                "MATCH ()-[t:TRANSFERS_TO {synthetic: true}]->() DELETE t",
            ))
            .await
            .map_err(db_err)?;

        let q = query(
            "MATCH (n {synthetic: true})
             DETACH DELETE n
             RETURN count(n) AS deleted",
        );
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let deleted = match stream.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>("deleted").unwrap_or(0).max(0) as u64,
            None => 0,
        };

        warn!(deleted, "Synthetic network cleared");
        Ok(deleted)
    }

    /// Counts of synthetic nodes per label plus the bank distribution of
    /// synthetic accounts.
    pub async fn synthetic_stats(&self) -> Result<SyntheticStats, MuletraceError> {
        let mut nodes_by_label = Vec::new();
        let q = query(
            "MATCH (n {synthetic: true})
             RETURN labels(n)[0] AS label, count(n) AS count
             ORDER BY count DESC",
        );
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let label: String = row.get("label").unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            nodes_by_label.push(LabelCount {
                label,
                count: count.max(0) as u64,
            });
        }

        let mut bank_distribution = Vec::new();
        let q = query(
            "MATCH (a:BankAccount {synthetic: true})
             RETURN a.bank_name AS label, count(a) AS count
             ORDER BY count DESC",
        );
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        while let Some(row) = stream.next().await.map_err(db_err)? {
            let label: String = row.get("label").unwrap_or_default();
            let count: i64 = row.get("count").unwrap_or(0);
            bank_distribution.push(LabelCount {
                label,
                count: count.max(0) as u64,
            });
        }

        let q = query(
            "MATCH ()-[t:TRANSFERS_TO {synthetic: true}]->() RETURN count(t) AS total",
        );
        let mut stream = self.client.graph.execute(q).await.map_err(db_err)?;
        let transfer_count = match stream.next().await.map_err(db_err)? {
            Some(row) => row.get::<i64>("total").unwrap_or(0).max(0) as u64,
            None => 0,
        };

        Ok(SyntheticStats {
            nodes_by_label,
            bank_distribution,
            transfer_count,
        })
    }
}

fn synthetic_meta(tier: &str) -> EntityMeta {
    EntityMeta {
        cluster_id: Some(tier.to_string()),
        synthetic: true,
        ..EntityMeta::new()
    }
}

fn random_name(rng: &mut StdRng) -> String {
    format!(
        "{} {}",
        FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())],
        LAST_NAMES[rng.random_range(0..LAST_NAMES.len())]
    )
}

/// Tier prefix plus ordinal keeps keys unique within a run; the random
/// tail keeps them looking like real account numbers.
fn account_number(rng: &mut StdRng, prefix: &str, ordinal: u32) -> String {
    format!("{prefix}{ordinal:04}{:06}", rng.random_range(0..1_000_000u32))
}

fn random_amount(rng: &mut StdRng) -> f64 {
    rng.random_range(250..=5_000) as f64 * 1000.0
}

fn synthetic_bank(
    rng: &mut StdRng,
    tier: &str,
    prefix: &str,
    ordinal: u32,
    bank: &str,
) -> Entity {
    Entity::BankAccount(BankAccountEntity {
        meta: synthetic_meta(tier),
        account_number: account_number(rng, prefix, ordinal),
        bank_name: bank.to_string(),
        account_holder: random_name(rng),
        bank_code: None,
        account_type: Some("savings".into()),
        min_transfer: None,
        max_transfer: None,
        processing_time: None,
    })
}

fn synthetic_ewallet(rng: &mut StdRng, tier: &str, prefix: &str, ordinal: u32) -> Entity {
    let provider = EWALLET_PROVIDERS[rng.random_range(0..EWALLET_PROVIDERS.len())];
    Entity::EWallet(EWalletEntity {
        meta: synthetic_meta(tier),
        provider: provider.to_string(),
        number: format!("08{prefix}{ordinal:04}{:04}", rng.random_range(0..10_000u32)),
        phone_number: None,
        owner_name: Some(random_name(rng)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_numbers_are_unique_per_ordinal() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = account_number(&mut rng, "71", 0);
        let b = account_number(&mut rng, "71", 1);
        assert_ne!(a[..6], b[..6]);
    }

    #[test]
    fn seeded_runs_produce_identical_detail() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(
            synthetic_bank(&mut a, "player", "71", 3, "BCA").key(),
            synthetic_bank(&mut b, "player", "71", 3, "BCA").key()
        );
    }

    #[test]
    fn default_spec_is_within_bounds() {
        let spec = GenerationSpec::default();
        assert!(spec.players >= 1 && spec.players <= 1000);
        assert!(spec.pooling_per_site >= 1);
    }
}
