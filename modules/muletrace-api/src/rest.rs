use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use muletrace_common::{EntityKind, ExtractionResult, MuletraceError, TransferRecord};
use muletrace_graph::response::GraphView;
use muletrace_graph::{query, GenerationSpec, GraphFilter};

use crate::AppState;

// --- Query structs ---

#[derive(Deserialize)]
pub struct GraphQuery {
    /// Comma-separated: "bank_account,crypto_wallet"
    entity_types: Option<String>,
    /// Comma-separated: "BCA,BRI"
    banks: Option<String>,
    /// Comma-separated: "OVO,DANA"
    e_wallets: Option<String>,
    /// Comma-separated: "Bitcoin,USDT"
    currencies: Option<String>,
    /// Comma-separated: "Telkomsel,XL"
    phone_providers: Option<String>,
    priority_min: Option<i64>,
    priority_max: Option<i64>,
    search: Option<String>,
}

#[derive(Deserialize)]
pub struct SeedQuery {
    players: Option<u32>,
    sites: Option<u32>,
    pooling_per_site: Option<u32>,
    seed: Option<u64>,
}

// --- Helpers ---

fn split_list(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_kinds(raw: &Option<String>) -> Result<Vec<EntityKind>, String> {
    let mut kinds = Vec::new();
    for token in split_list(raw) {
        match EntityKind::parse(&token) {
            Some(kind) => kinds.push(kind),
            None => return Err(format!("unknown entity kind: {token}")),
        }
    }
    Ok(kinds)
}

fn error_json(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// --- Handlers ---

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store_connected = state.client.inner().run(query("RETURN 1")).await.is_ok();
    let status = if store_connected { "healthy" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "store_connected": store_connected,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn upsert_site_data(
    State(state): State<Arc<AppState>>,
    Json(result): Json<ExtractionResult>,
) -> impl IntoResponse {
    let (site, entities) = result.into_entities();

    match state.writer.upsert_site_data(&site, &entities).await {
        Ok(stats) => Json(serde_json::json!({
            "status": "success",
            "stats": stats,
        }))
        .into_response(),
        // A fully invalid batch is a reportable outcome, not a fault.
        Err(MuletraceError::NoValidData) => Json(serde_json::json!({
            "status": "no_valid_data",
        }))
        .into_response(),
        Err(MuletraceError::StoreUnavailable(e)) => {
            warn!(error = %e, "Upsert rejected, store unavailable");
            error_json(StatusCode::SERVICE_UNAVAILABLE, "graph store unavailable")
        }
        Err(e) => {
            warn!(error = %e, "Failed to upsert site data");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn query_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphQuery>,
) -> impl IntoResponse {
    let entity_kinds = match parse_kinds(&params.entity_types) {
        Ok(kinds) => kinds,
        Err(message) => return error_json(StatusCode::BAD_REQUEST, message),
    };

    let filter = GraphFilter {
        entity_kinds,
        banks: split_list(&params.banks),
        wallet_providers: split_list(&params.e_wallets),
        currencies: split_list(&params.currencies),
        phone_providers: split_list(&params.phone_providers),
        priority_min: params.priority_min.unwrap_or(0),
        priority_max: params.priority_max.unwrap_or(100),
        search: params.search.clone(),
    };

    match state.reader.query_graph(&filter).await {
        Ok(view) => Json(view).into_response(),
        Err(MuletraceError::MalformedFilter(message)) => {
            error_json(StatusCode::BAD_REQUEST, message)
        }
        // An unreachable store answers with an annotated empty view,
        // distinguishable from a legitimately empty result.
        Err(MuletraceError::StoreUnavailable(e)) => {
            warn!(error = %e, "Graph query served as unavailable");
            Json(GraphView::unavailable()).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to query graph");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn entity_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let uuid = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return error_json(StatusCode::BAD_REQUEST, "invalid entity id"),
    };

    match state.reader.entity_detail(uuid).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to load entity detail");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn record_transfer(
    State(state): State<Arc<AppState>>,
    Json(transfer): Json<TransferRecord>,
) -> impl IntoResponse {
    match state.writer.record_transfer(&transfer).await {
        Ok(view) => Json(serde_json::json!({
            "status": "success",
            "transfer": view,
        }))
        .into_response(),
        Err(MuletraceError::EntityNotFound(key)) => error_json(
            StatusCode::NOT_FOUND,
            format!("no entity resolves key: {key}"),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to record transfer");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn seed_network(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeedQuery>,
) -> impl IntoResponse {
    let defaults = GenerationSpec::default();
    let spec = GenerationSpec {
        players: params.players.unwrap_or(defaults.players),
        sites: params.sites.unwrap_or(defaults.sites),
        pooling_per_site: params.pooling_per_site.unwrap_or(defaults.pooling_per_site),
        seed: params.seed,
    };

    match state.generator.generate(&spec).await {
        Ok(summary) => Json(serde_json::json!({
            "status": "success",
            "summary": summary,
        }))
        .into_response(),
        Err(MuletraceError::Validation(message)) => error_json(StatusCode::BAD_REQUEST, message),
        Err(e) => {
            warn!(error = %e, "Failed to generate synthetic network");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn clear_network(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.generator.clear_synthetic().await {
        Ok(deleted) => Json(serde_json::json!({
            "status": "success",
            "deleted_nodes": deleted,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to clear synthetic network");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn network_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.generator.synthetic_stats().await {
        Ok(stats) => Json(serde_json::json!({
            "status": "success",
            "stats": stats,
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to load synthetic stats");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
