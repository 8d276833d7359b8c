//! HTTP server for the query pipeline

use crate::pipeline::{PipelineCoordinator, Query};
use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

const NO_INPUT: &str = "No user input provided";

/// Shared application state
pub struct AppState {
    coordinator: Arc<PipelineCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<PipelineCoordinator>) -> Self {
        Self { coordinator }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    routes: BTreeMap<String, String>,
}

/// Build the router. Split from [`run_http_server`] so tests can bind their own listener.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/user_query", post(handle_user_query))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_http_server(host: &str, port: u16, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let routes = state
        .coordinator
        .routes()
        .routes()
        .map(|r| (r.category.to_string(), r.endpoint.to_string()))
        .collect();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        routes,
    })
}

/// Pull a non-blank `user_input` string out of a request body
fn extract_user_input(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let input = value.get("user_input")?.as_str()?;
    if input.trim().is_empty() {
        None
    } else {
        Some(input.to_string())
    }
}

async fn handle_user_query(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let Some(input) = extract_user_input(&body) else {
        tracing::warn!("Rejected /user_query request without user input");
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": NO_INPUT })),
        )
            .into_response();
    };

    let run = state.coordinator.run(Query::new(input)).await;
    let processed = match (&run.error, run.is_done()) {
        (None, true) => serde_json::json!({ "result": run.trace }),
        (error, _) => {
            let message = error
                .clone()
                .unwrap_or_else(|| format!("Pipeline ended in state {:?}", run.state));
            serde_json::json!({ "error": message })
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({ "Processed Query": processed })),
    )
        .into_response()
}
