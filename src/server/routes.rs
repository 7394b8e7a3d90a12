//! HTTP handlers for the contents API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use repodoc_core::{codec, EntryKind};
use serde::{Deserialize, Serialize};

use super::auth::{AuthUser, ErrorBody};
use super::storage::{Contents, ServerStorageError};
use super::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Current caller response
#[derive(Serialize)]
pub struct MeResponse {
    name: String,
}

/// Get current caller info (auth required). Clients use this as a
/// credential probe.
pub async fn me(Extension(user): Extension<AuthUser>) -> Json<MeResponse> {
    Json(MeResponse { name: user.name })
}

#[derive(Serialize)]
struct FileBody {
    name: String,
    path: String,
    content: String,
    version: String,
}

#[derive(Serialize)]
struct EntryBody {
    name: String,
    path: String,
    kind: EntryKind,
}

#[derive(Serialize)]
struct VersionBody {
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct PutBody {
    content: String,
    version: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    version: String,
    message: Option<String>,
}

fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn storage_error(e: ServerStorageError) -> Response {
    match e {
        ServerStorageError::Conflict(path) => ErrorBody::response(
            StatusCode::CONFLICT,
            "conflict",
            format!("{} was changed or already exists", path),
        ),
        ServerStorageError::InvalidPath(path) => ErrorBody::response(
            StatusCode::BAD_REQUEST,
            "invalid_path",
            format!("Invalid path: {}", path),
        ),
        other => {
            tracing::error!("Storage error: {}", other);
            ErrorBody::response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "Failed to access storage",
            )
        }
    }
}

fn read_contents(state: &AppState, path: &str) -> Response {
    match state.storage.read(path) {
        Ok(Some(Contents::File { content, version })) => {
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            Json(FileBody {
                name,
                path: path.trim_matches('/').to_string(),
                content: codec::encode(&content),
                version,
            })
            .into_response()
        }
        Ok(Some(Contents::Dir(entries))) => {
            let body: Vec<EntryBody> = entries
                .into_iter()
                .map(|e| EntryBody {
                    path: join_path(path, &e.name),
                    name: e.name,
                    kind: e.kind,
                })
                .collect();
            Json(body).into_response()
        }
        Ok(None) => ErrorBody::response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Nothing stored at {}", path),
        ),
        Err(e) => storage_error(e),
    }
}

/// Lists the store root.
pub async fn get_root(State(state): State<AppState>) -> Response {
    read_contents(&state, "")
}

/// Reads a file or lists a directory.
pub async fn get_contents(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    read_contents(&state, &path)
}

/// Creates or replaces a blob under the write gate.
pub async fn put_contents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<String>,
    Json(body): Json<PutBody>,
) -> Response {
    let content = match codec::decode(&body.content) {
        Ok(content) => content,
        Err(e) => {
            return ErrorBody::response(StatusCode::BAD_REQUEST, "invalid_content", e.to_string())
        }
    };

    let _guard = match state.gate.acquire().await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!("Rejected write to {}: {}", path, e);
            return ErrorBody::response(StatusCode::SERVICE_UNAVAILABLE, "busy", e.to_string());
        }
    };

    match state.storage.put(&path, &content, body.version.as_deref()) {
        Ok(outcome) => {
            tracing::debug!(
                "{} wrote {}: {}",
                user.name,
                path,
                body.message.as_deref().unwrap_or("")
            );
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(VersionBody {
                    version: outcome.version,
                }),
            )
                .into_response()
        }
        Err(e) => storage_error(e),
    }
}

/// Removes a blob under the write gate.
pub async fn delete_contents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(path): Path<String>,
    Json(body): Json<DeleteBody>,
) -> Response {
    let _guard = match state.gate.acquire().await {
        Ok(guard) => guard,
        Err(e) => {
            tracing::warn!("Rejected delete of {}: {}", path, e);
            return ErrorBody::response(StatusCode::SERVICE_UNAVAILABLE, "busy", e.to_string());
        }
    };

    match state.storage.delete(&path, &body.version) {
        Ok(true) => {
            tracing::debug!(
                "{} deleted {}: {}",
                user.name,
                path,
                body.message.as_deref().unwrap_or("")
            );
            StatusCode::OK.into_response()
        }
        Ok(false) => ErrorBody::response(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Nothing stored at {}", path),
        ),
        Err(e) => storage_error(e),
    }
}
