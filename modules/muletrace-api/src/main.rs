use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use muletrace_common::Config;
use muletrace_graph::{migrate, GraphClient, GraphReader, GraphWriter, TopologyGenerator};

mod rest;

pub struct AppState {
    pub reader: GraphReader,
    pub writer: GraphWriter,
    pub generator: TopologyGenerator,
    pub client: GraphClient,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("muletrace_api=info".parse()?)
                .add_directive("muletrace_graph=info".parse()?),
        )
        .init();

    let config = Config::from_env();

    let client =
        GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
            .await?;

    migrate::migrate(&client).await?;

    let state = Arc::new(AppState {
        reader: GraphReader::new(client.clone()),
        writer: GraphWriter::new(client.clone()),
        generator: TopologyGenerator::new(client.clone()),
        client,
    });

    let app = Router::new()
        .route("/health", get(rest::health))
        .route("/graph/sites", post(rest::upsert_site_data))
        .route("/graph/entities", get(rest::query_graph))
        .route("/graph/entities/{id}", get(rest::entity_detail))
        .route("/graph/transfers", post(rest::record_transfer))
        .route(
            "/dev/seed-network",
            post(rest::seed_network).delete(rest::clear_network),
        )
        .route("/dev/seed-network/stats", get(rest::network_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!(addr = addr.as_str(), "Muletrace API listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
