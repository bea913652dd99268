//! Peer review screening for workshop submissions.
//!
//! Reviewers declare conflicts of interest, then score assigned documents on a
//! 1 to 4 rubric; administrators watch progress and export the results.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod storage;
pub mod templates;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use state::AppState;

const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    let reviewer = Router::new()
        .route("/reviewer", get(routes::reviewer_home))
        .route("/reviewer/select", post(routes::select_reviewer))
        .route("/reviewer/coi", get(routes::coi_page).post(routes::submit_conflict))
        .route("/reviewer/review", get(routes::review_page).post(routes::submit_review))
        .route("/reviewer/responses.csv", get(routes::export_reviewer_responses))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_reviewer,
        ));

    let admin = Router::new()
        .route("/admin", get(routes::admin_page))
        .route("/admin/query", post(routes::admin_query))
        .route("/admin/export/query", post(routes::export_query))
        .route("/admin/export/responses", get(routes::export_all_responses))
        .route("/admin/export/tables", get(routes::export_all_tables))
        .route("/admin/import/sources", post(routes::import_sources_upload))
        .route("/admin/import/reviewers", post(routes::import_reviewers_upload))
        .route("/api/status", get(routes::status))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            session::require_admin,
        ))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES));

    Router::new()
        .route("/", get(routes::index))
        .route("/login", get(routes::login_page).post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/health", get(routes::health))
        .merge(reviewer)
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
