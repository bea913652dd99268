//! In-memory sessions keyed by a random id carried in a cookie.
//!
//! Sessions are lost when the server stops; reviewers simply log in again.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Panel;
use crate::db::Reviewer;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "screening_session";

#[derive(Debug, Clone, Default)]
pub struct Session {
    pub reviewer_access: bool,
    pub admin_access: bool,
    pub reviewer: Option<Reviewer>,
    /// Document currently shown to the reviewer, kept stable across page loads.
    pub current_document: Option<i64>,
}

impl Session {
    pub fn grant(&mut self, panel: Panel) {
        match panel {
            Panel::Reviewer => self.reviewer_access = true,
            Panel::Admin => self.admin_access = true,
        }
    }

    pub fn allows(&self, panel: Panel) -> bool {
        match panel {
            Panel::Reviewer => self.reviewer_access,
            Panel::Admin => self.admin_access,
        }
    }
}

/// The session attached to a request by [`require_reviewer`] or [`require_admin`].
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: Uuid,
    pub session: Session,
}

#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, session: Session) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, session);
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Applies `f` to the session; returns false when the session is gone.
    pub async fn update<F>(&self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        match self.inner.write().await.get_mut(&id) {
            Some(session) => {
                f(session);
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    pub async fn from_headers(&self, headers: &HeaderMap) -> Option<CurrentSession> {
        let id = session_id(headers)?;
        let session = self.get(id).await?;
        Some(CurrentSession { id, session })
    }
}

/// Reads the session id out of the `Cookie` header.
pub fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

pub fn session_cookie(id: Uuid) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict",
        SESSION_COOKIE, id
    )
}

pub fn clear_cookie() -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        SESSION_COOKIE
    )
}

async fn require(panel: Panel, state: Arc<AppState>, mut request: Request, next: Next) -> Response {
    match state.sessions.from_headers(request.headers()).await {
        Some(current) if current.session.allows(panel) => {
            request.extensions_mut().insert(current);
            next.run(request).await
        }
        _ => {
            let target = match panel {
                Panel::Reviewer => "/login?panel=reviewer",
                Panel::Admin => "/login?panel=admin",
            };
            Redirect::to(target).into_response()
        }
    }
}

pub async fn require_reviewer(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    require(Panel::Reviewer, state, request, next).await
}

pub async fn require_admin(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    require(Panel::Admin, state, request, next).await
}
