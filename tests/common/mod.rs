#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

use workshop_screening::config::{Config, ReviewLimits};
use workshop_screening::db::{self, DbPool};
use workshop_screening::storage::transfer;
use workshop_screening::{build_router, AppState};

pub const REVIEWER_PASSWORD: &str = "reviewer-secret";
pub const ADMIN_PASSWORD: &str = "admin-secret";

pub const SOURCES_CSV: &str = "\
document_id,first_name,last_name,email,institution,authors,title,abstract,biosketch,leverage_plan,early_career,student
1,Ada,Lovelace,ada@example.org,Analytical Society,Charles Babbage,Engines,\"Notes on the engine; part one\",Mathematician,Collaborate,Yes,No
2,Grace,Hopper,grace@example.org,Navy,,Compilers,Machine independent code,Rear admiral,Teach,No,No
3,Alan,Turing,alan@example.org,Bletchley Park,Joan Clarke,Computability,On computable numbers,Logician,Build,Yes,Yes
";

pub const REVIEWERS_CSV: &str = "\
reviewer_id,reviewer_name
10,Rosalind Franklin
20,Barbara McClintock
30,Katherine Johnson
";

/// Single-connection in-memory database with the schema applied.
pub async fn test_pool() -> DbPool {
    let pool = db::create_pool("sqlite::memory:", 1)
        .await
        .expect("Should open in-memory database");
    db::run_migrations(pool.as_ref())
        .await
        .expect("Should run migrations");
    pool
}

pub async fn seeded_pool() -> DbPool {
    let pool = test_pool().await;
    transfer::import_sources(pool.as_ref(), SOURCES_CSV.as_bytes())
        .await
        .expect("Should import sources");
    transfer::import_reviewers(pool.as_ref(), REVIEWERS_CSV.as_bytes())
        .await
        .expect("Should import reviewers");
    pool
}

pub fn test_config(limits: ReviewLimits) -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        max_connections: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        reviewer_password: Some(REVIEWER_PASSWORD.to_string()),
        admin_password: Some(ADMIN_PASSWORD.to_string()),
        limits,
        workshop_title: "Test Workshop".to_string(),
    }
}

pub fn setup_app(pool: DbPool, limits: ReviewLimits) -> Router {
    build_router(Arc::new(AppState::new(pool, test_config(limits))))
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8")
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Logs into `panel` and returns the `name=value` cookie pair.
pub async fn login(app: &Router, panel: &str, password: &str) -> String {
    let response = send(
        app,
        post_form("/login", &format!("panel={}&password={}", panel, password), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "login should redirect");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("login should set a cookie");
    set_cookie.split(';').next().unwrap().to_string()
}

/// Pulls the hidden `document_id` value out of a rendered form.
pub fn hidden_document_id(html: &str) -> i64 {
    let marker = "name=\"document_id\" value=\"";
    let start = html.find(marker).expect("page should carry a document id") + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].parse().unwrap()
}

/// Logs in as a reviewer, selects `reviewer_id`, and answers conflict
/// screening with `YES` for the documents in `conflicts` and `NO` otherwise.
pub async fn reviewer_session(app: &Router, reviewer_id: i64, conflicts: &[i64]) -> String {
    let cookie = login(app, "reviewer", REVIEWER_PASSWORD).await;

    let response = send(
        app,
        post_form("/reviewer/select", &format!("reviewer_id={}", reviewer_id), Some(&cookie)),
    )
    .await;
    assert_eq!(location(&response), "/reviewer/coi");

    loop {
        let response = send(app, get("/reviewer/coi", Some(&cookie))).await;
        if response.status() == StatusCode::SEE_OTHER {
            assert_eq!(location(&response), "/reviewer/review");
            break;
        }
        assert_eq!(response.status(), StatusCode::OK);
        let document_id = hidden_document_id(&body_text(response).await);
        let answer = if conflicts.contains(&document_id) { "YES" } else { "NO" };
        let response = send(
            app,
            post_form(
                "/reviewer/coi",
                &format!("document_id={}&conflict={}", document_id, answer),
                Some(&cookie),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    cookie
}
