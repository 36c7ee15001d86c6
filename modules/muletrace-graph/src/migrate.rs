use neo4rs::query;
use tracing::{info, warn};

use muletrace_common::EntityKind;

use crate::GraphClient;

/// Run idempotent schema migrations: uniqueness constraints on identity
/// keys, plus lookup indexes for the hot query paths.
pub async fn migrate(client: &GraphClient) -> Result<(), neo4rs::Error> {
    let g = &client.graph;

    info!("Running schema migrations...");

    let mut constraints = vec![
        "CREATE CONSTRAINT site_domain IF NOT EXISTS FOR (s:Site) REQUIRE s.domain IS UNIQUE"
            .to_string(),
    ];
    for kind in EntityKind::ALL {
        constraints.push(format!(
            "CREATE CONSTRAINT {lower}_key IF NOT EXISTS FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
            lower = kind.label().to_lowercase(),
            label = kind.label(),
            key = kind.key_property(),
        ));
    }
    for c in &constraints {
        run_ignoring_exists(g, c).await?;
    }
    info!("Key uniqueness constraints created");

    let mut indexes = Vec::new();
    for kind in EntityKind::ALL {
        indexes.push(format!(
            "CREATE INDEX {lower}_id IF NOT EXISTS FOR (n:{label}) ON (n.id)",
            lower = kind.label().to_lowercase(),
            label = kind.label(),
        ));
        indexes.push(format!(
            "CREATE INDEX {lower}_priority IF NOT EXISTS FOR (n:{label}) ON (n.priority_score)",
            lower = kind.label().to_lowercase(),
            label = kind.label(),
        ));
    }
    indexes.push(
        "CREATE INDEX site_last_extraction IF NOT EXISTS FOR (s:Site) ON (s.last_extraction)"
            .to_string(),
    );
    for idx in &indexes {
        run_ignoring_exists(g, idx).await?;
    }
    info!("Lookup indexes created");

    Ok(())
}

/// Run a schema statement, treating "already exists" responses as success.
async fn run_ignoring_exists(g: &neo4rs::Graph, statement: &str) -> Result<(), neo4rs::Error> {
    match g.run(query(statement)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("already exists") || msg.contains("EquivalentSchemaRule") {
                Ok(())
            } else {
                warn!(statement, error = %e, "Schema statement failed");
                Err(e)
            }
        }
    }
}
