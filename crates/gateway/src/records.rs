//! REST CRUD over the record collections.
//!
//! - `GET    /api/{collection}`           all records (`?patient=`, `?encounter=` filters)
//! - `GET    /api/{collection}?id=X`      one record
//! - `POST   /api/{collection}`           create
//! - `PUT    /api/{collection}?id=X`      merge update
//! - `DELETE /api/{collection}?id=X`      delete

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use clinicdesk_actions::ListFilter;
use clinicdesk_core::error::StoreError;
use clinicdesk_core::record::{Resource, ResourceKind};

use crate::{ApiError, SharedState, api_error};

pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/api/{collection}",
        get(read_handler)
            .post(create_handler)
            .put(update_handler)
            .delete(delete_handler),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordQuery {
    id: Option<String>,
    patient: Option<String>,
    encounter: Option<String>,
}

#[derive(Serialize)]
struct DeleteResponse {
    message: String,
}

fn kind_of(collection: &str) -> Result<ResourceKind, ApiError> {
    collection
        .parse()
        .map_err(|e: StoreError| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// `GET` and friends need an id; its absence is the caller's fault.
fn required_id(kind: ResourceKind, query: &RecordQuery) -> Result<String, ApiError> {
    query
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("{} ID is required", kind.resource_type()),
            )
        })
}

fn not_found(kind: ResourceKind) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        format!("{} not found", kind.resource_type()),
    )
}

fn store_failure(kind: ResourceKind, verb: &str, e: StoreError) -> ApiError {
    error!(kind = %kind, error = %e, "Store operation failed");
    let label = kind.collection().replace('-', " ");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Failed to {verb} {label}"),
    )
}

fn encounter_matches(resource: &Resource, encounter: &str) -> bool {
    resource
        .get("encounter")
        .and_then(|e| e.get("reference"))
        .and_then(|r| r.as_str())
        .is_some_and(|r| r.strip_prefix("Encounter/") == Some(encounter))
}

async fn read_handler(
    State(state): State<SharedState>,
    Path(collection): Path<String>,
    Query(query): Query<RecordQuery>,
) -> Result<Response, ApiError> {
    let kind = kind_of(&collection)?;

    if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        let record = state
            .store
            .get(kind, id)
            .await
            .map_err(|e| store_failure(kind, "fetch", e))?
            .ok_or_else(|| not_found(kind))?;
        return Ok(Json(record).into_response());
    }

    let records = state
        .store
        .list(kind)
        .await
        .map_err(|e| store_failure(kind, "fetch", e))?;

    let filter = ListFilter {
        patient: query.patient.as_deref(),
        practitioner: None,
        status: None,
    };
    let records: Vec<Resource> = records
        .into_iter()
        .filter(|r| filter.matches(kind, r))
        .filter(|r| match (kind, query.encounter.as_deref()) {
            (ResourceKind::Observations, Some(encounter)) => encounter_matches(r, encounter),
            _ => true,
        })
        .collect();

    Ok(Json(records).into_response())
}

async fn create_handler(
    State(state): State<SharedState>,
    Path(collection): Path<String>,
    Json(body): Json<Resource>,
) -> Result<(StatusCode, Json<Resource>), ApiError> {
    let kind = kind_of(&collection)?;
    let created = state
        .store
        .create(kind, body)
        .await
        .map_err(|e| store_failure(kind, "create", e))?;

    info!(
        kind = %kind,
        id = created.get("id").and_then(|v| v.as_str()).unwrap_or_default(),
        "Record created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_handler(
    State(state): State<SharedState>,
    Path(collection): Path<String>,
    Query(query): Query<RecordQuery>,
    Json(body): Json<Resource>,
) -> Result<Json<Resource>, ApiError> {
    let kind = kind_of(&collection)?;
    let id = required_id(kind, &query)?;

    state
        .store
        .update(kind, &id, body)
        .await
        .map_err(|e| store_failure(kind, "update", e))?
        .map(Json)
        .ok_or_else(|| not_found(kind))
}

async fn delete_handler(
    State(state): State<SharedState>,
    Path(collection): Path<String>,
    Query(query): Query<RecordQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let kind = kind_of(&collection)?;
    let id = required_id(kind, &query)?;

    let deleted = state
        .store
        .delete(kind, &id)
        .await
        .map_err(|e| store_failure(kind, "delete", e))?;
    if !deleted {
        return Err(not_found(kind));
    }

    info!(kind = %kind, id = %id, "Record deleted");
    Ok(Json(DeleteResponse {
        message: format!("{} deleted successfully", kind.resource_type()),
    }))
}
