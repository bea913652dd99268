use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::pages::{base_context, render_template};
use crate::db::{self, Conflict, NewResponse, Reviewer, Score};
use crate::error::AppError;
use crate::session::CurrentSession;
use crate::state::AppState;

const ALIGNMENT_LABEL: &str = "Alignment with workshop goals";
const SCIENCE_LABEL: &str = "Advancing the science";
const BENEFITS_LABEL: &str = "Benefits to attendee";

fn choose_reviewer_first() -> Response {
    Redirect::to("/reviewer").into_response()
}

pub async fn reviewer_home(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Response, AppError> {
    let reviewers = db::list_reviewers(state.pool.as_ref()).await?;

    let mut ctx = base_context(&state, true);
    ctx.insert("reviewers", &reviewers);
    ctx.insert("selected", &current.session.reviewer);
    Ok(render_template("select_reviewer.html", &ctx)?.into_response())
}

#[derive(Deserialize)]
pub struct SelectForm {
    reviewer_id: i64,
}

pub async fn select_reviewer(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(form): Form<SelectForm>,
) -> Result<Response, AppError> {
    let reviewer = db::get_reviewer(state.pool.as_ref(), form.reviewer_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("reviewer {}", form.reviewer_id)))?;

    tracing::info!(reviewer_id = reviewer.reviewer_id, "Reviewer session started");
    state
        .sessions
        .update(current.id, |s| {
            s.reviewer = Some(reviewer);
            s.current_document = None;
        })
        .await;

    Ok(Redirect::to("/reviewer/coi").into_response())
}

/// Screening is finished once every source has a conflict-log answer.
async fn screening_complete(state: &AppState, reviewer_id: i64) -> Result<(bool, i64, i64), AppError> {
    let total = db::count_sources(state.pool.as_ref()).await?;
    let screened = db::count_screened(state.pool.as_ref(), reviewer_id).await?;
    Ok((screened >= total, screened, total))
}

pub async fn coi_page(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Response, AppError> {
    let Some(reviewer) = current.session.reviewer else {
        return Ok(choose_reviewer_first());
    };

    let (complete, screened, total) = screening_complete(&state, reviewer.reviewer_id).await?;
    if complete {
        return Ok(Redirect::to("/reviewer/review").into_response());
    }

    let Some(candidate) = db::next_conflict_candidate(state.pool.as_ref(), reviewer.reviewer_id).await? else {
        return Ok(Redirect::to("/reviewer/review").into_response());
    };

    let mut ctx = base_context(&state, true);
    ctx.insert("reviewer", &reviewer);
    ctx.insert("screened", &screened);
    ctx.insert("total", &total);
    ctx.insert("candidate", &candidate);
    Ok(render_template("coi.html", &ctx)?.into_response())
}

#[derive(Deserialize)]
pub struct ConflictForm {
    document_id: i64,
    #[serde(default)]
    conflict: String,
}

pub async fn submit_conflict(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(form): Form<ConflictForm>,
) -> Result<Response, AppError> {
    let Some(reviewer) = current.session.reviewer else {
        return Ok(choose_reviewer_first());
    };

    let conflict = Conflict::parse(&form.conflict)
        .ok_or_else(|| AppError::InvalidInput("Select YES or NO".to_string()))?;

    if db::get_source(state.pool.as_ref(), form.document_id).await?.is_none() {
        return Err(AppError::NotFound(format!("document {}", form.document_id)));
    }

    // A resubmitted form must not log the same document twice.
    if !db::is_screened(state.pool.as_ref(), reviewer.reviewer_id, form.document_id).await? {
        db::record_conflict(state.pool.as_ref(), reviewer.reviewer_id, form.document_id, conflict).await?;
        tracing::info!(
            reviewer_id = reviewer.reviewer_id,
            document_id = form.document_id,
            conflict = conflict.as_str(),
            "Conflict screening answer recorded"
        );
    }

    if conflict == Conflict::Yes && current.session.current_document == Some(form.document_id) {
        state.sessions.update(current.id, |s| s.current_document = None).await;
    }

    Ok(Redirect::to("/reviewer/coi").into_response())
}

/// Raw review form; scores arrive as strings so blanks can be reported.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ReviewForm {
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub alignment: String,
    #[serde(default)]
    pub science: String,
    #[serde(default)]
    pub benefits: String,
    #[serde(default)]
    pub comments: String,
}

impl ReviewForm {
    /// Builds the response, or one warning per missing or invalid field.
    pub fn validate(&self, reviewer_id: i64) -> Result<NewResponse, Vec<String>> {
        let mut warnings = Vec::new();

        let mut score = |raw: &str, label: &str| {
            let parsed = Score::parse(raw);
            if parsed.is_none() {
                warnings.push(format!("Please enter a valid score for '{}' to continue.", label));
            }
            parsed
        };
        let alignment = score(&self.alignment, ALIGNMENT_LABEL);
        let science = score(&self.science, SCIENCE_LABEL);
        let benefits = score(&self.benefits, BENEFITS_LABEL);

        let comments = self.comments.trim().to_string();
        if comments.is_empty() {
            warnings.push("Please enter text for 'Area of expertise' to continue.".to_string());
        }

        match (self.document_id, alignment, science, benefits) {
            (Some(document_id), Some(alignment), Some(science), Some(benefits)) if warnings.is_empty() => {
                Ok(NewResponse {
                    reviewer_id,
                    document_id,
                    alignment,
                    science,
                    benefits,
                    comments,
                })
            }
            (None, ..) if warnings.is_empty() => Err(vec!["No document is selected for review.".to_string()]),
            _ => Err(warnings),
        }
    }
}

#[derive(Deserialize)]
pub struct ReviewQuery {
    progress: Option<bool>,
}

struct ReviewView {
    form: ReviewForm,
    warnings: Vec<String>,
    notice: Option<String>,
    show_progress: bool,
}

impl ReviewView {
    fn fresh(show_progress: bool) -> Self {
        Self {
            form: ReviewForm::default(),
            warnings: Vec::new(),
            notice: None,
            show_progress,
        }
    }
}

/// Keeps the session's document while it stays eligible, otherwise draws a new one.
async fn assigned_document(
    state: &AppState,
    current: &CurrentSession,
    reviewer: &Reviewer,
) -> Result<Option<db::Source>, AppError> {
    let pool = state.pool.as_ref();
    let limits = state.config.limits;

    let mut document = None;
    if let Some(document_id) = current.session.current_document {
        if db::check_eligibility(pool, reviewer.reviewer_id, document_id, limits).await?.is_ok() {
            document = db::get_source(pool, document_id).await?;
        }
    }
    if document.is_none() {
        document = db::next_assignment(pool, reviewer.reviewer_id, limits).await?;
    }

    let document_id = document.as_ref().map(|d| d.document_id);
    if document_id != current.session.current_document {
        state.sessions.update(current.id, |s| s.current_document = document_id).await;
    }
    Ok(document)
}

async fn render_review(
    state: &AppState,
    current: &CurrentSession,
    reviewer: &Reviewer,
    mut view: ReviewView,
) -> Result<axum::response::Html<String>, AppError> {
    let pool = state.pool.as_ref();
    let completed = db::count_responses(pool, reviewer.reviewer_id).await?;
    let document = assigned_document(state, current, reviewer).await?;

    // Entered values only carry over while the same document is on screen.
    if view.form.document_id.is_some() && view.form.document_id != document.as_ref().map(|d| d.document_id) {
        view.form = ReviewForm::default();
        view.warnings.clear();
    }

    let responses = if view.show_progress {
        db::reviewer_responses(pool, reviewer.reviewer_id).await?
    } else {
        Vec::new()
    };

    let mut ctx = base_context(state, true);
    ctx.insert("reviewer", reviewer);
    ctx.insert("completed", &completed);
    ctx.insert("cap", &state.config.limits.per_reviewer);
    ctx.insert("complete", &document.is_none());
    ctx.insert("document", &document.as_ref().map(|d| d.display()));
    ctx.insert("form", &view.form);
    ctx.insert("warnings", &view.warnings);
    ctx.insert("notice", &view.notice);
    ctx.insert("show_progress", &view.show_progress);
    ctx.insert("responses", &responses);
    render_template("review.html", &ctx)
}

pub async fn review_page(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<ReviewQuery>,
) -> Result<Response, AppError> {
    let Some(reviewer) = current.session.reviewer.clone() else {
        return Ok(choose_reviewer_first());
    };

    if !screening_complete(&state, reviewer.reviewer_id).await?.0 {
        return Ok(Redirect::to("/reviewer/coi").into_response());
    }

    let view = ReviewView::fresh(query.progress.unwrap_or(true));
    Ok(render_review(&state, &current, &reviewer, view).await?.into_response())
}

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Form(form): Form<ReviewForm>,
) -> Result<Response, AppError> {
    let Some(reviewer) = current.session.reviewer.clone() else {
        return Ok(choose_reviewer_first());
    };

    if !screening_complete(&state, reviewer.reviewer_id).await?.0 {
        return Ok(Redirect::to("/reviewer/coi").into_response());
    }

    let response = match form.validate(reviewer.reviewer_id) {
        Ok(response) => response,
        Err(warnings) => {
            let view = ReviewView {
                form,
                warnings,
                notice: None,
                show_progress: true,
            };
            let page = render_review(&state, &current, &reviewer, view).await?;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
        }
    };

    let pool = state.pool.as_ref();
    if let Err(reason) =
        db::check_eligibility(pool, reviewer.reviewer_id, response.document_id, state.config.limits).await?
    {
        tracing::warn!(
            reviewer_id = reviewer.reviewer_id,
            document_id = response.document_id,
            %reason,
            "Rejected review submission"
        );
        let view = ReviewView {
            notice: Some(format!("Your entry was not saved. {}", reason)),
            ..ReviewView::fresh(true)
        };
        let page = render_review(&state, &current, &reviewer, view).await?;
        return Ok((StatusCode::CONFLICT, page).into_response());
    }

    let screening_order = db::insert_response(pool, &response)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("reviewer {}", reviewer.reviewer_id)))?;

    tracing::info!(
        reviewer_id = reviewer.reviewer_id,
        document_id = response.document_id,
        screening_order,
        "Review response stored"
    );

    state.sessions.update(current.id, |s| s.current_document = None).await;
    Ok(Redirect::to("/reviewer/review").into_response())
}
