use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use institute_backend::init_db;
use log::{error, info};
use rand_core::OsRng;
use std::env;
use std::path::Path;

const ROLES: [&str; 4] = ["admin", "teacher", "staff", "student"];

#[tokio::main]
async fn main() {
    if let Some(root) = Path::new(env!("CARGO_MANIFEST_DIR")).parent() {
        let _ = dotenv::from_path(root.join(".env"));
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 4 || args.len() > 5 {
        error!("Usage: {} <email> <password> <full name> [role]", args[0]);
        std::process::exit(1);
    }

    let email = args[1].trim().to_lowercase();
    let password = &args[2];
    let full_name = args[3].trim();
    let role = args.get(4).map(String::as_str).unwrap_or("admin");

    if !ROLES.contains(&role) {
        error!("Unknown role {}, expected one of {:?}", role, ROLES);
        std::process::exit(1);
    }

    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            error!("DATABASE_URL environment variable is required");
            std::process::exit(1);
        }
    };

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(e) => {
            error!("Failed to hash password: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match init_db(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let result = sqlx::query_scalar::<_, uuid::Uuid>(
        "INSERT INTO users (email, password_hash, full_name, role) VALUES ($1, $2, $3, $4)
         ON CONFLICT (email) DO UPDATE
         SET password_hash = EXCLUDED.password_hash, full_name = EXCLUDED.full_name, role = EXCLUDED.role
         RETURNING id",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(&pool)
    .await;

    match result {
        Ok(id) => info!("User {} ({}) saved with id {}", email, role, id),
        Err(e) => {
            error!("Failed to save user {}: {}", email, e);
            std::process::exit(1);
        }
    }
}
