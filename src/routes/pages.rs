use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::sync::Arc;
use tera::Context;

use crate::config::Panel;
use crate::error::AppError;
use crate::session::{clear_cookie, session_cookie, session_id, Session};
use crate::state::AppState;

/// Context every page starts from; `base.html` reads these keys.
pub(crate) fn base_context(state: &AppState, logged_in: bool) -> Context {
    let mut ctx = Context::new();
    ctx.insert("workshop_title", &state.config.workshop_title);
    ctx.insert("logged_in", &logged_in);
    ctx
}

pub(crate) fn render_template(name: &str, ctx: &Context) -> Result<Html<String>, AppError> {
    let tera = crate::templates::get_tera();
    Ok(Html(tera.render(name, ctx)?))
}

pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Html<String>, AppError> {
    let logged_in = state.sessions.from_headers(&headers).await.is_some();
    let ctx = base_context(&state, logged_in);
    render_template("index.html", &ctx)
}

#[derive(Deserialize)]
pub struct LoginQuery {
    panel: Option<Panel>,
}

fn panel_name(panel: Panel) -> &'static str {
    match panel {
        Panel::Reviewer => "reviewer",
        Panel::Admin => "admin",
    }
}

fn login_view(state: &AppState, panel: Panel, failed: bool) -> Result<Html<String>, AppError> {
    let mut ctx = base_context(state, false);
    ctx.insert("panel", panel_name(panel));
    ctx.insert("failed", &failed);
    render_template("login.html", &ctx)
}

pub async fn login_page(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Html<String>, AppError> {
    login_view(&state, query.panel.unwrap_or(Panel::Reviewer), false)
}

#[derive(Deserialize)]
pub struct LoginForm {
    panel: Panel,
    #[serde(default)]
    password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if !state.config.verify_password(form.panel, &form.password) {
        tracing::warn!(panel = panel_name(form.panel), "Rejected login attempt");
        let page = login_view(&state, form.panel, true)?;
        return Ok((StatusCode::UNAUTHORIZED, page).into_response());
    }

    // Logging into the second panel upgrades the existing session.
    let existing = match session_id(&headers) {
        Some(id) if state.sessions.update(id, |s| s.grant(form.panel)).await => Some(id),
        _ => None,
    };
    let id = match existing {
        Some(id) => id,
        None => {
            let mut session = Session::default();
            session.grant(form.panel);
            state.sessions.create(session).await
        }
    };

    tracing::info!(panel = panel_name(form.panel), "Login accepted");

    let target = match form.panel {
        Panel::Reviewer => "/reviewer",
        Panel::Admin => "/admin",
    };
    Ok(([(header::SET_COOKIE, session_cookie(id))], Redirect::to(target)).into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(id).await;
    }
    ([(header::SET_COOKIE, clear_cookie())], Redirect::to("/")).into_response()
}
