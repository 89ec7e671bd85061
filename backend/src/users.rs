use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::responses;
use crate::AppState;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TEACHER: &str = "teacher";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// The authenticated caller, handed explicitly to every handler that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.eq_ignore_ascii_case(role)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            email: claims.email,
            role: claims.role,
        }
    }
}

pub fn issue_token(
    user_id: Uuid,
    email: &str,
    role: &str,
    secret: &str,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (Utc::now() + Duration::hours(ttl_hours)).timestamp() as usize;

    let claims = Claims {
        id: user_id,
        email: email.to_string(),
        role: role.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Bearer header wins over the `token` cookie when both are present.
fn extract_token(req: &HttpRequest) -> Result<Option<String>, HttpResponse> {
    if let Some(header) = req.headers().get("Authorization") {
        let header_str = header.to_str().unwrap_or("");
        return match header_str.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            _ => Err(responses::unauthorized("Invalid authorization header")),
        };
    }

    Ok(req
        .cookie("token")
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty()))
}

/// Extract and validate the JWT from the request.
pub fn verify_token(req: &HttpRequest, app_state: &AppState) -> Result<AuthUser, HttpResponse> {
    let token = extract_token(req)?
        .ok_or_else(|| responses::unauthorized("Not authorized, no token provided"))?;

    match decode::<Claims>(
        &token,
        &DecodingKey::from_secret(app_state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Ok(data.claims.into()),
        Err(e) => {
            warn!("Rejected token: {}", e);
            Err(responses::unauthorized("Not authorized, token failed"))
        }
    }
}

pub fn require_role(
    req: &HttpRequest,
    app_state: &AppState,
    role: &str,
) -> Result<AuthUser, HttpResponse> {
    let user = verify_token(req, app_state)?;

    if !user.has_role(role) {
        return Err(responses::forbidden(&format!(
            "Access denied. Only {} users can perform this action",
            role
        )));
    }

    Ok(user)
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: String,
    role: String,
}

#[post("/login")]
async fn login(
    app_state: web::Data<AppState>,
    credentials: web::Json<LoginRequest>,
) -> impl Responder {
    let email = credentials.email.trim().to_lowercase();
    if email.is_empty() || credentials.password.is_empty() {
        return responses::bad_request("Email and password are required");
    }

    let user = match sqlx::query_as::<_, UserRow>(
        "SELECT id, email, password_hash, full_name, role FROM users WHERE LOWER(email) = $1",
    )
    .bind(&email)
    .fetch_optional(&app_state.db)
    .await
    {
        Ok(Some(user)) => user,
        Ok(None) => return responses::unauthorized("Invalid credentials"),
        Err(e) => return responses::internal_error("Failed to load user for login", e),
    };

    let parsed_hash = match PasswordHash::new(&user.password_hash) {
        Ok(hash) => hash,
        Err(e) => {
            error!("Failed to parse password hash for user {}: {}", user.id, e);
            return responses::internal_error("Login failed", e);
        }
    };

    if Argon2::default()
        .verify_password(credentials.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return responses::unauthorized("Invalid credentials");
    }

    let token = match issue_token(
        user.id,
        &user.email,
        &user.role,
        &app_state.jwt_secret,
        app_state.token_ttl_hours,
    ) {
        Ok(token) => token,
        Err(e) => return responses::internal_error("JWT encoding error", e),
    };

    responses::ok(serde_json::json!({
        "token": token,
        "user": {
            "id": user.id,
            "email": user.email,
            "fullName": user.full_name,
            "role": user.role,
        }
    }))
}

#[get("/validate")]
async fn validate_token_endpoint(
    req: HttpRequest,
    app_state: web::Data<AppState>,
) -> impl Responder {
    match verify_token(&req, &app_state) {
        Ok(user) => responses::ok(serde_json::json!({
            "id": user.id,
            "email": user.email,
            "role": user.role,
        })),
        Err(response) => response,
    }
}

/// Full name of the caller, used for name-based class ownership.
pub async fn load_full_name(db: &sqlx::PgPool, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT full_name FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .service(login)
            .service(validate_token_endpoint),
    );
}
