//! Federation endpoints: fetching a single event and receiving a PDU.

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use trellis_events::{
    check_event_content_hash, prune_event, Event, EventError, EventParts, InternalMetadata,
};
use trellis_store::StoreError;

/// Federation API errors, rendered as `{"errcode": ..., "error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unsupported room version: {0}")]
    UnsupportedRoomVersion(String),
    #[error("invalid event: {0}")]
    BadJson(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn errcode(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "M_NOT_FOUND",
            ApiError::UnsupportedRoomVersion(_) => "M_UNSUPPORTED_ROOM_VERSION",
            ApiError::BadJson(_) => "M_BAD_JSON",
            ApiError::Internal(_) => "M_UNKNOWN",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedRoomVersion(_) | ApiError::BadJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "federation request failed");
        }
        let body = Json(json!({
            "errcode": self.errcode(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<EventError> for ApiError {
    fn from(e: EventError) -> Self {
        match e {
            EventError::UnknownRoomVersion(version) => ApiError::UnsupportedRoomVersion(version),
            EventError::Malformed { .. } | EventError::Canonical(_) | EventError::MissingField(_) => {
                ApiError::BadJson(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadJson(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

/// Request body for `POST /_matrix/federation/v1/pdu`.
#[derive(Debug, Deserialize)]
pub struct SubmitPduRequest {
    /// The version of the room the PDU belongs to. Defaults to the configured
    /// room version.
    #[serde(default)]
    pub room_version: Option<String>,
    pub pdu: Value,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runs a blocking store operation on a pooled connection.
async fn with_conn<T, F>(state: &Arc<AppState>, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection, &AppState) -> Result<T, StoreError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        let conn = state
            .pool
            .get()
            .map_err(|e| ApiError::Internal(format!("db connection failed: {e}")))?;
        f(&conn, &state).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("task join failed: {e}")))?
}

/// Handler for `GET /_matrix/federation/v1/event/{event_id}`.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let lookup_id = event_id.clone();
    let event = with_conn(&state, move |conn, state| {
        trellis_store::get_event(conn, &state.registry, &state.event_config, &lookup_id)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("event {event_id} not found")))?;

    let now = now_ms();
    let pdu = event.get_pdu_json(Some(now))?;

    Ok(Json(json!({
        "origin": state.server_name,
        "origin_server_ts": now,
        "pdus": [pdu],
    })))
}

/// Handler for `POST /_matrix/federation/v1/pdu`.
///
/// The PDU is stored as an outlier. A PDU whose content hash does not match
/// is stored in its redacted form.
pub async fn submit_pdu_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SubmitPduRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(payload) = payload?;
    let room_version = payload
        .room_version
        .unwrap_or_else(|| state.default_room_version.clone());

    let parts = EventParts::from_value(payload.pdu)?
        .with_internal_metadata(InternalMetadata::default().with_outlier(true));
    let event = state
        .registry
        .construct_for_room(&room_version, parts, &state.event_config)?;

    let event_id = event
        .event_id()
        .ok_or_else(|| ApiError::BadJson("pdu has no event_id".to_string()))?
        .to_string();

    let event = checked(event)?;

    let stored = with_conn(&state, move |conn, _| trellis_store::persist_event(conn, &event)).await?;

    tracing::info!(
        event_id = %event_id,
        room_version = %room_version,
        stored,
        "received pdu"
    );

    Ok(Json(json!({ "event_id": event_id })))
}

/// Replaces an event whose content hash does not match with its redacted
/// form.
fn checked(event: Event) -> Result<Event, ApiError> {
    if check_event_content_hash(&event)? {
        return Ok(event);
    }
    tracing::warn!(
        event_id = event.event_id().unwrap_or_default(),
        "content hash mismatch, storing redacted event"
    );
    Ok(prune_event(&event)?)
}
