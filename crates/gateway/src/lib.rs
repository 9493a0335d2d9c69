//! HTTP gateway for clinicdesk.
//!
//! Exposes REST CRUD for the seven record collections, the assistant
//! chat as an SSE stream of conversation updates, and a health check.
//!
//! Built on Axum.

pub mod assistant;
pub mod records;

use axum::extract::DefaultBodyLimit;
use axum::{Router, http::StatusCode, response::Json, routing::get};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use clinicdesk_agent::Orchestrator;
use clinicdesk_core::message::ConversationState;
use clinicdesk_core::record::RecordStore;
use clinicdesk_store::FileRecordStore;

/// Maximum number of in-memory conversations before the oldest is evicted.
const MAX_CONVERSATIONS: usize = 1_000;

/// Request body ceiling (1 MB).
const BODY_LIMIT: usize = 1024 * 1024;

/// Shared state for every route.
pub struct GatewayState {
    pub store: Arc<dyn RecordStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub conversations: RwLock<HashMap<String, ConversationState>>,
    /// Conversations with a run in flight
    pub active: Mutex<HashSet<String>>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(store: Arc<dyn RecordStore>, orchestrator: Arc<Orchestrator>) -> SharedState {
        Arc::new(Self {
            store,
            orchestrator,
            conversations: RwLock::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Build the router with all gateway routes.
///
/// Layers applied:
/// - CORS open to any origin
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .merge(assistant::router())
        .merge(records::router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
///
/// Builds the record store, provider, and orchestrator once and shares
/// them across requests.
pub async fn start(config: clinicdesk_config::AppConfig) -> clinicdesk_core::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = clinicdesk_providers::build_from_config(&config)?
        .default()
        .ok_or_else(|| clinicdesk_core::Error::Config {
            message: format!("provider '{}' is not configured", config.default_provider),
        })?;
    let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(&config.store.data_dir));
    let registry = Arc::new(clinicdesk_actions::default_registry(store.clone()));
    let orchestrator = Arc::new(Orchestrator::from_config(provider, registry, &config));

    let app = build_router(GatewayState::new(store, orchestrator));

    info!(addr = %addr, data_dir = %config.store.data_dir, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
