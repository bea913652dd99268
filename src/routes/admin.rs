use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::pages::{base_context, render_template};
use crate::db::{self, QueryResult};
use crate::error::AppError;
use crate::state::AppState;
use crate::storage::{self, transfer, FileFormat};

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub sources: i64,
    pub reviewers: i64,
    pub responses: i64,
}

pub(crate) async fn totals(state: &AppState) -> Result<Totals, AppError> {
    let pool = state.pool.as_ref();
    let reviewers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tbl_reviewer")
        .fetch_one(pool)
        .await?;
    let responses: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tbl_response")
        .fetch_one(pool)
        .await?;
    Ok(Totals {
        sources: db::count_sources(pool).await?,
        reviewers,
        responses,
    })
}

#[derive(Default)]
struct AdminView {
    notice: Option<String>,
    query_sql: String,
    query_result: Option<QueryResult>,
    query_error: Option<String>,
}

async fn render_admin(state: &AppState, view: AdminView) -> Result<Html<String>, AppError> {
    let pool = state.pool.as_ref();
    let limits = state.config.limits;

    let mut ctx = base_context(state, true);
    ctx.insert("totals", &totals(state).await?);
    ctx.insert("limits", &limits);
    ctx.insert("responses", &db::all_responses(pool).await?);
    ctx.insert("progress", &db::reviewer_progress(pool, limits).await?);
    ctx.insert("coverage", &db::document_coverage(pool).await?);
    ctx.insert("notice", &view.notice);
    ctx.insert("query_sql", &view.query_sql);
    ctx.insert("query_result", &view.query_result);
    ctx.insert("query_error", &view.query_error);
    render_template("admin.html", &ctx)
}

pub async fn admin_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    render_admin(&state, AdminView::default()).await
}

#[derive(Deserialize)]
pub struct QueryForm {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub format: FileFormat,
}

pub async fn admin_query(
    State(state): State<Arc<AppState>>,
    Form(form): Form<QueryForm>,
) -> Result<Html<String>, AppError> {
    let sql = form.sql.trim().to_string();
    let mut view = AdminView {
        query_sql: sql.clone(),
        ..AdminView::default()
    };

    if sql.is_empty() {
        view.notice = Some("Enter a query to run.".to_string());
        return render_admin(&state, view).await;
    }

    match db::run_readonly_query(state.pool.as_ref(), &sql).await {
        Ok(result) => {
            tracing::info!(rows = result.rows.len(), "Admin query executed");
            view.query_result = Some(result);
        }
        Err(e) => {
            tracing::warn!(error = %e, "Admin query failed");
            view.query_error = Some(e.to_string());
        }
    }
    render_admin(&state, view).await
}

/// Reads the uploaded `file` field of a multipart form as CSV; a `.parquet`
/// upload is converted.
async fn uploaded_file(mut multipart: Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(e.to_string()))?
    {
        if field.name() == Some("file") {
            let format = FileFormat::from_file_name(field.file_name().unwrap_or_default());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::InvalidInput(e.to_string()))?;
            return storage::import_csv(data.to_vec(), format);
        }
    }
    Err(AppError::InvalidInput("no file was uploaded".to_string()))
}

async fn import_outcome(
    state: &AppState,
    what: &str,
    outcome: Result<usize, AppError>,
) -> Result<Response, AppError> {
    let (status, notice) = match outcome {
        Ok(count) => (StatusCode::OK, format!("Imported {} {}.", count, what)),
        Err(e @ (AppError::InvalidInput(_) | AppError::Csv(_) | AppError::Parquet(_) | AppError::Arrow(_))) => {
            tracing::warn!(error = %e, "Import rejected");
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e))
        }
        Err(e) => return Err(e),
    };
    let view = AdminView {
        notice: Some(notice),
        ..AdminView::default()
    };
    Ok((status, render_admin(state, view).await?).into_response())
}

pub async fn import_sources_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let outcome = match uploaded_file(multipart).await {
        Ok(data) => transfer::import_sources(state.pool.as_ref(), data.as_slice()).await,
        Err(e) => Err(e),
    };
    import_outcome(&state, "sources", outcome).await
}

pub async fn import_reviewers_upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let outcome = match uploaded_file(multipart).await {
        Ok(data) => transfer::import_reviewers(state.pool.as_ref(), data.as_slice()).await,
        Err(e) => Err(e),
    };
    import_outcome(&state, "reviewers", outcome).await
}
