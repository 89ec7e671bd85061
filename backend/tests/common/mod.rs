#![allow(dead_code)]

use std::path::PathBuf;

use actix_web::http::header;
use institute_backend::config::AppConfig;
use institute_backend::users::issue_token;
use institute_backend::AppState;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret";

pub fn config(database_url: &str, upload_dir: PathBuf) -> AppConfig {
    let database_url = database_url.to_string();
    let upload_dir = upload_dir.to_string_lossy().to_string();
    AppConfig::from_lookup(PathBuf::from("."), move |key| match key {
        "DATABASE_URL" => Some(database_url.clone()),
        "JWT_SECRET" => Some(SECRET.to_string()),
        "UPLOAD_DIR" => Some(upload_dir.clone()),
        _ => None,
    })
    .expect("test config")
}

/// State backed by a pool that never connects. Requests must be rejected before any query.
pub fn offline_state(upload_dir: PathBuf) -> AppState {
    let url = "postgres://localhost/institute_offline";
    let db = PgPoolOptions::new().connect_lazy(url).expect("lazy pool");
    AppState::new(db, &config(url, upload_dir))
}

/// Connects to `TEST_DATABASE_URL` and applies migrations, or returns `None` when unset.
pub async fn live_state(upload_dir: PathBuf) -> Option<AppState> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db: PgPool = institute_backend::init_db(&url)
        .await
        .expect("connect and migrate test database");
    std::fs::create_dir_all(upload_dir.join("logos")).expect("logo dir");
    Some(AppState::new(db, &config(&url, upload_dir)))
}

pub fn bearer(user_id: Uuid, role: &str) -> (header::HeaderName, String) {
    let token = issue_token(user_id, &format!("{}@school.test", user_id), role, SECRET, 1)
        .expect("token");
    (header::AUTHORIZATION, format!("Bearer {}", token))
}
