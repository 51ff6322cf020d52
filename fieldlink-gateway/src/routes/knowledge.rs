//! Knowledge store endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use fieldlink_knowledge::{KnowledgeError, UploadRequest};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::GatewayError;
use crate::routes::form::FormFields;
use crate::state::AppState;

pub async fn upload(
    State(state): State<Arc<AppState>>,
    form: FormFields,
) -> Result<impl IntoResponse, GatewayError> {
    let content = match (&form.file, form.text("text")) {
        (Some(file), _) => {
            info!(file = %file.file_name, bytes = file.bytes.len(), "knowledge file uploaded");
            String::from_utf8(file.bytes.to_vec())
                .map_err(|_| GatewayError::BadRequest("uploaded file is not UTF-8 text".into()))?
        }
        (None, Some(text)) => text.to_string(),
        (None, None) => return Err(GatewayError::MissingField("text or file".into())),
    };

    let threshold = form.parse::<f32>("threshold")?;
    if threshold.is_some_and(|t| !(0.0..=1.0).contains(&t)) {
        return Err(GatewayError::BadRequest("threshold must be within 0..=1".into()));
    }

    let report = state
        .knowledge
        .upload(UploadRequest {
            content,
            threshold,
            force: form.flag("force"),
        })
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": format!("added {} knowledge records", report.added),
        "added": report.added,
        "ids": report.ids,
        "skipped": report.skipped,
    })))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    form: FormFields,
) -> Result<impl IntoResponse, GatewayError> {
    let query = form
        .text("query")
        .ok_or_else(|| GatewayError::MissingField("query".into()))?;
    let top_k = form.parse::<usize>("top_k")?;

    let hits = state.knowledge.search(query, top_k).await?;
    Ok(Json(json!({ "count": hits.len(), "data": hits })))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GatewayError> {
    let records = state.knowledge.list().await?;
    Ok(Json(json!({ "count": records.len(), "data": records })))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let record = state
        .knowledge
        .get(&id)
        .await?
        .ok_or(KnowledgeError::UnknownRecord(id))?;

    Ok(Json(json!({
        "status": "success",
        "id": record.id,
        "text": record.text,
        "metadata": record.metadata,
        "created_at": record.created_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub doc_id: Option<String>,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let doc_id = query
        .doc_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| GatewayError::MissingField("doc_id".into()))?;

    state.knowledge.delete(&doc_id).await?;
    Ok(Json(json!({ "status": "success", "deleted_id": doc_id.trim() })))
}

pub async fn clear(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, GatewayError> {
    let removed = state.knowledge.clear().await?;
    let message = if removed == 0 {
        "knowledge base is empty".to_string()
    } else {
        format!("deleted {} knowledge records", removed)
    };
    Ok(Json(json!({ "status": "success", "deleted": removed, "message": message })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, GatewayError> {
    let records = state.knowledge.export().await?;

    Ok(match query.format {
        ExportFormat::Json => {
            Json(json!({ "count": records.len(), "data": records })).into_response()
        }
        ExportFormat::Text => {
            let body = records
                .iter()
                .map(|record| record.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                body,
            )
                .into_response()
        }
    })
}
