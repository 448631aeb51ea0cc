//! Document (artifact) endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use quill_shared::Document;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
}

fn default_kind() -> String {
    "text".to_string()
}

/// GET /api/document?id= — all versions of a document, oldest first
pub async fn get_document(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Json<Vec<Document>>> {
    let id = query
        .id
        .ok_or_else(|| ApiError::BadRequest("Missing document id".to_string()))?;

    let versions = state.store.document_versions(id, user.id).await?;
    if versions.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(versions))
}

/// POST /api/document — append a new version (documents are versioned, not
/// updated in place)
pub async fn save_document(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SaveDocumentRequest>,
) -> ApiResult<Json<Document>> {
    if body.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }

    let id = body.id.unwrap_or_else(Uuid::new_v4);
    let doc = state
        .store
        .save_document(id, user.id, &body.title, &body.kind, &body.content)
        .await?;

    Ok(Json(doc))
}
