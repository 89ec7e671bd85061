pub mod config;
pub mod fees;
pub mod institute;
pub mod models;
pub mod responses;
pub mod roster;
pub mod skills;
pub mod sms;
pub mod storage;
pub mod users;
pub mod validation;

use actix_cors::Cors;
use actix_files as fs;
use actix_web::{middleware, web, App};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::storage::{LocalStorage, StorageProvider};

pub const LOGO_PUBLIC_PATH: &str = "/uploads/logos";

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub max_payload_bytes: usize,
    pub storage: Arc<dyn StorageProvider>,
    pub logo_dir: PathBuf,
}

impl AppState {
    pub fn new(db: PgPool, config: &AppConfig) -> Self {
        let logo_dir = config.logo_dir();
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            token_ttl_hours: config.token_ttl_hours,
            max_payload_bytes: config.max_payload_bytes,
            storage: Arc::new(LocalStorage::new(
                logo_dir.clone(),
                LOGO_PUBLIC_PATH.to_string(),
            )),
            logo_dir,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State whose pool never connects; only for paths that reject before touching the database.
    pub(crate) fn for_tests(jwt_secret: &str) -> Self {
        let db = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/institute_unit_tests")
            .expect("lazy pool");
        let config = AppConfig::from_lookup(PathBuf::from("/tmp/institute-tests"), |key| {
            match key {
                "DATABASE_URL" => Some("postgres://localhost/institute_unit_tests".to_string()),
                "JWT_SECRET" => Some(jwt_secret.to_string()),
                _ => None,
            }
        })
        .expect("test config");
        Self::new(db, &config)
    }
}

pub fn create_app(app_state: web::Data<AppState>) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let logo_dir = app_state.logo_dir.clone();
    let max_payload = app_state.max_payload_bytes;

    App::new()
        .app_data(app_state)
        .app_data(web::PayloadConfig::new(max_payload))
        .app_data(
            web::JsonConfig::default()
                .limit(max_payload)
                .error_handler(responses::json_error_handler),
        )
        .app_data(web::QueryConfig::default().error_handler(responses::query_error_handler))
        .wrap(
            Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .supports_credentials()
                .max_age(3600),
        )
        .wrap(middleware::Logger::default())
        .configure(users::configure)
        .configure(skills::configure)
        .configure(sms::configure)
        .configure(institute::configure)
        .configure(fees::configure)
        .service(fs::Files::new(LOGO_PUBLIC_PATH, logo_dir))
}

pub async fn connect_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

pub async fn init_db(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = connect_pool(database_url).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
