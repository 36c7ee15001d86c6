#![cfg(feature = "test-utils")]

// Upsert writer integration tests.
//
// Requirements: Docker (for Neo4j via testcontainers)
//
// Run with: cargo test -p muletrace-graph --features test-utils --test upsert_test

use muletrace_common::{BankAccountEntity, Entity, EntityMeta, MuletraceError, SiteRecord};
use muletrace_graph::{query, GraphClient, GraphWriter};

async fn setup() -> (impl std::any::Any, GraphClient) {
    muletrace_graph::testutil::neo4j_container().await
}

fn bank(number: &str, bank_name: &str, holder: &str) -> Entity {
    Entity::BankAccount(BankAccountEntity {
        meta: EntityMeta::new(),
        account_number: number.into(),
        bank_name: bank_name.into(),
        account_holder: holder.into(),
        bank_code: None,
        account_type: None,
        min_transfer: None,
        max_transfer: None,
        processing_time: None,
    })
}

async fn count(client: &GraphClient, cypher: &str) -> i64 {
    let mut stream = client
        .inner()
        .execute(query(cypher))
        .await
        .expect("count query failed");
    match stream.next().await.expect("stream failed") {
        Some(row) => row.get::<i64>("cnt").unwrap_or(0),
        None => 0,
    }
}

async fn read_account_prop(client: &GraphClient, number: &str, prop: &str) -> String {
    let cypher = format!(
        "MATCH (n:BankAccount {{account_number: $number}}) RETURN n.{prop} AS val"
    );
    let q = query(&cypher).param("number", number);
    let mut stream = client.inner().execute(q).await.expect("query failed");
    match stream.next().await.expect("stream failed") {
        Some(row) => row.get::<String>("val").unwrap_or_default(),
        None => String::new(),
    }
}

#[tokio::test]
async fn repeated_upsert_creates_no_duplicates() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());

    let site = SiteRecord::new("https://agen-judi.example/deposit");
    let entities = vec![bank("1234567890", "BCA", "Budi Santoso")];

    writer.upsert_site_data(&site, &entities).await.expect("first upsert");
    writer.upsert_site_data(&site, &entities).await.expect("second upsert");

    assert_eq!(count(&client, "MATCH (s:Site) RETURN count(s) AS cnt").await, 1);
    assert_eq!(
        count(&client, "MATCH (n:BankAccount) RETURN count(n) AS cnt").await,
        1
    );
    assert_eq!(
        count(&client, "MATCH (:Site)-[f:FEATURES]->(:BankAccount) RETURN count(f) AS cnt").await,
        1
    );
}

#[tokio::test]
async fn pages_of_one_site_collapse_to_one_node() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());

    let entities = vec![bank("5550001111", "BRI", "Siti Wijaya")];
    writer
        .upsert_site_data(&SiteRecord::new("https://example.com/deposit"), &entities)
        .await
        .expect("deposit page");
    writer
        .upsert_site_data(&SiteRecord::new("https://example.com/withdraw"), &entities)
        .await
        .expect("withdraw page");

    assert_eq!(
        count(&client, "MATCH (s:Site {domain: 'https://example.com'}) RETURN count(s) AS cnt").await,
        1
    );
    assert_eq!(
        count(&client, "MATCH (n:BankAccount) RETURN count(n) AS cnt").await,
        1
    );
    assert_eq!(
        count(&client, "MATCH (:Site)-[f:FEATURES]->() RETURN count(f) AS cnt").await,
        1
    );
}

#[tokio::test]
async fn sparse_reextraction_never_blanks_stored_values() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());
    let site = SiteRecord::new("https://example.com/");

    let mut rich = BankAccountEntity {
        meta: EntityMeta::new(),
        account_number: "9876543210".into(),
        bank_name: "BCA".into(),
        account_holder: "John Doe".into(),
        bank_code: Some("014".into()),
        account_type: Some("savings".into()),
        min_transfer: Some(50_000.0),
        max_transfer: None,
        processing_time: None,
    };
    writer
        .upsert_site_data(&site, &[Entity::BankAccount(rich.clone())])
        .await
        .expect("rich upsert");

    // Later, sparser extraction of the same account.
    rich.meta = EntityMeta::new();
    rich.bank_code = None;
    rich.account_type = None;
    rich.processing_time = Some("instant".into());
    writer
        .upsert_site_data(&site, &[Entity::BankAccount(rich)])
        .await
        .expect("sparse upsert");

    assert_eq!(read_account_prop(&client, "9876543210", "bank_code").await, "014");
    assert_eq!(read_account_prop(&client, "9876543210", "account_type").await, "savings");
    assert_eq!(read_account_prop(&client, "9876543210", "processing_time").await, "instant");
    assert_eq!(read_account_prop(&client, "9876543210", "account_holder").await, "John Doe");
}

#[tokio::test]
async fn invalid_entity_is_dropped_and_holder_survives() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());
    let site = SiteRecord::new("https://example.com/");

    writer
        .upsert_site_data(&site, &[bank("1112223334", "BCA", "John Doe")])
        .await
        .expect("initial upsert");

    // A holderless re-observation fails validation and is dropped without
    // aborting the batch; the stored holder is untouched.
    let stats = writer
        .upsert_site_data(
            &site,
            &[bank("1112223334", "BCA", ""), bank("9998887776", "BNI", "Ratna Kusuma")],
        )
        .await
        .expect("partial batch");

    assert_eq!(stats.skipped_invalid, 1);
    assert_eq!(stats.written, 1);
    assert_eq!(read_account_prop(&client, "1112223334", "account_holder").await, "John Doe");
    assert_eq!(
        count(&client, "MATCH (n:BankAccount) RETURN count(n) AS cnt").await,
        2
    );
}

#[tokio::test]
async fn fully_invalid_batch_is_skipped_as_no_valid_data() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());

    let result = writer
        .upsert_site_data(
            &SiteRecord::new("https://example.com/"),
            &[bank("", "BCA", "Budi"), bank("123", "", "Budi")],
        )
        .await;

    assert!(matches!(result, Err(MuletraceError::NoValidData)));
    // The site write is skipped along with the batch.
    assert_eq!(count(&client, "MATCH (s:Site) RETURN count(s) AS cnt").await, 0);
}

#[tokio::test]
async fn empty_batch_still_records_the_site() {
    let (_c, client) = setup().await;
    let writer = GraphWriter::new(client.clone());

    let stats = writer
        .upsert_site_data(&SiteRecord::new("https://empty.example/promo"), &[])
        .await
        .expect("empty batch");

    assert_eq!(stats.written, 0);
    assert_eq!(
        count(&client, "MATCH (s:Site {domain: 'https://empty.example'}) RETURN count(s) AS cnt")
            .await,
        1
    );
}
