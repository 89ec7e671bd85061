use actix_web::{web, HttpServer};
use institute_backend::config::AppConfig;
use institute_backend::{create_app, init_db, AppState};
use log::{info, warn};
use std::path::{Path, PathBuf};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let project_root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // Loaded before the logger so RUST_LOG in .env takes effect.
    let env_path = project_root.join(".env");
    let env_loaded = dotenv::from_path(&env_path).is_ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if !env_loaded {
        warn!("No .env file at {:?}, using process environment only", env_path);
    }

    let config = AppConfig::from_env(project_root)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let db_pool = init_db(&config.database_url).await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to initialize database: {}", e),
        )
    })?;

    info!("Database initialized successfully");

    std::fs::create_dir_all(config.logo_dir()).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to create logo directory: {}", e),
        )
    })?;

    info!("Logo directory: {:?}", config.logo_dir());

    let app_state = web::Data::new(AppState::new(db_pool, &config));

    info!("Starting server at http://{}", config.bind_addr);

    HttpServer::new(move || create_app(app_state.clone()))
        .bind(config.bind_addr.as_str())?
        .run()
        .await
}
