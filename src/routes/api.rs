use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::admin::{totals, QueryForm};
use crate::db;
use crate::error::AppError;
use crate::session::CurrentSession;
use crate::state::AppState;
use crate::storage::{self, transfer, FileFormat};

#[derive(Deserialize)]
pub struct FormatQuery {
    #[serde(default)]
    format: FileFormat,
}

fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn export_reviewer_responses(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Response, AppError> {
    let reviewer = current
        .session
        .reviewer
        .ok_or_else(|| AppError::InvalidInput("select your name first".to_string()))?;

    let responses = db::reviewer_responses(state.pool.as_ref(), reviewer.reviewer_id).await?;
    let body = transfer::responses_csv(&responses)?;
    Ok(attachment(
        "text/csv; charset=utf-8",
        &storage::reviewer_export_name(&reviewer.reviewer_name),
        body,
    ))
}

pub async fn export_all_responses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, AppError> {
    let responses = db::all_responses(state.pool.as_ref()).await?;
    let body = transfer::responses_bytes(&responses, query.format)?;
    Ok(attachment(
        query.format.content_type(),
        &format!("reviewer_responses.{}", query.format.extension()),
        body,
    ))
}

pub async fn export_query(
    State(state): State<Arc<AppState>>,
    Form(form): Form<QueryForm>,
) -> Result<Response, AppError> {
    let sql = form.sql.trim();
    if sql.is_empty() {
        return Err(AppError::InvalidInput("query is empty".to_string()));
    }
    // A bad statement is the admin's mistake, not a server fault.
    let result = db::run_readonly_query(state.pool.as_ref(), sql)
        .await
        .map_err(|e| match e {
            AppError::Database(e) => AppError::InvalidInput(e.to_string()),
            other => other,
        })?;
    let body = transfer::query_bytes(&result, form.format)?;
    Ok(attachment(
        form.format.content_type(),
        &format!("query_response.{}", form.format.extension()),
        body,
    ))
}

pub async fn export_all_tables(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
) -> Result<Response, AppError> {
    let body = transfer::export_bundle(state.pool.as_ref(), query.format).await?;
    Ok(attachment("application/zip", &storage::bundle_export_name(query.format), body))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let pool = state.pool.as_ref();
    let limits = state.config.limits;

    Ok(Json(json!({
        "status": "ok",
        "totals": totals(&state).await?,
        "limits": limits,
        "progress": db::reviewer_progress(pool, limits).await?,
        "coverage": db::document_coverage(pool).await?,
    })))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
