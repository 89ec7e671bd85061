use actix_multipart::Multipart;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{delete, get, put, web, HttpRequest, HttpResponse, Responder};
use futures_util::StreamExt as _;
use log::{error, info};
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::institute::{InstituteProfile, DEFAULT_INSTITUTE_NAME, PROFILE_COLUMNS};
use crate::responses::{self, FieldError};
use crate::storage::{MediaError, MediaService, StoredFile};
use crate::users::{require_role, verify_token, ROLE_ADMIN};
use crate::validation;
use crate::AppState;

const MAX_TEXT_FIELD_BYTES: usize = 4 * 1024;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub tagline: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
}

impl ProfileUpdate {
    fn set(&mut self, field: &str, value: String) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "tagline" => &mut self.tagline,
            "phone" => &mut self.phone,
            "email" => &mut self.email,
            "website" => &mut self.website,
            "address" => &mut self.address,
            "country" => &mut self.country,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    /// Overlays the provided fields on the stored profile, trimming each value.
    pub fn apply_to(self, profile: &mut InstituteProfile) {
        let overlay = |target: &mut String, value: Option<String>| {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        };

        overlay(&mut profile.name, self.name);
        overlay(&mut profile.tagline, self.tagline);
        overlay(&mut profile.phone, self.phone);
        overlay(&mut profile.email, self.email);
        overlay(&mut profile.website, self.website);
        overlay(&mut profile.address, self.address);
        overlay(&mut profile.country, self.country);
    }
}

pub fn validate_profile(profile: &InstituteProfile) -> Vec<FieldError> {
    let mut errors = Vec::new();
    validation::required(&mut errors, "name", &profile.name, "Institute name");
    validation::max_chars(&mut errors, "name", &profile.name, 100, "Institute name");
    validation::max_chars(&mut errors, "tagline", &profile.tagline, 200, "Tagline");
    validation::max_chars(&mut errors, "address", &profile.address, 300, "Address");
    validation::optional_phone(&mut errors, "phone", &profile.phone);
    validation::optional_email(&mut errors, "email", &profile.email);
    validation::optional_website(&mut errors, "website", &profile.website);
    errors
}

async fn fetch_profile(db: &PgPool, admin_id: Uuid) -> Result<Option<InstituteProfile>, sqlx::Error> {
    sqlx::query_as::<_, InstituteProfile>(&format!(
        "SELECT {} FROM institute_profiles WHERE admin_id = $1",
        PROFILE_COLUMNS
    ))
    .bind(admin_id)
    .fetch_optional(db)
    .await
}

/// Fetch the caller's profile, inserting the defaults first if none exists.
///
/// Two concurrent first reads both attempt the insert; the unique `admin_id`
/// turns the loser into a no-op and both then read the same row.
pub async fn get_or_create_profile(db: &PgPool, admin_id: Uuid) -> Result<InstituteProfile, sqlx::Error> {
    if let Some(profile) = fetch_profile(db, admin_id).await? {
        return Ok(profile);
    }

    sqlx::query(
        "INSERT INTO institute_profiles (admin_id, name) VALUES ($1, $2)
         ON CONFLICT (admin_id) DO NOTHING",
    )
    .bind(admin_id)
    .bind(DEFAULT_INSTITUTE_NAME)
    .execute(db)
    .await?;

    info!("Created default institute profile for admin {}", admin_id);

    sqlx::query_as::<_, InstituteProfile>(&format!(
        "SELECT {} FROM institute_profiles WHERE admin_id = $1",
        PROFILE_COLUMNS
    ))
    .bind(admin_id)
    .fetch_one(db)
    .await
}

#[derive(FromRow)]
struct UpdatedProfile {
    #[sqlx(flatten)]
    profile: InstituteProfile,
    previous_logo_key: Option<String>,
}

/// The stored logo a successful update leaves unreferenced, if any.
fn replaced_logo(new_logo: Option<&StoredFile>, previous_key: Option<String>) -> Option<String> {
    let new_logo = new_logo?;
    previous_key.filter(|key| *key != new_logo.key)
}

fn media_error_response(err: MediaError) -> HttpResponse {
    match err {
        MediaError::InvalidFileType => responses::bad_request(
            "Invalid logo file type. Allowed: jpg, jpeg, png, webp, svg",
        ),
        MediaError::TooLarge => responses::bad_request("Logo too large. Maximum size is 2MB."),
        MediaError::Io(e) => responses::internal_error("Failed to store logo", e),
    }
}

async fn discard_logo(media: &MediaService, stored: Option<StoredFile>) {
    if let Some(stored) = stored {
        if let Err(MediaError::Io(e)) = media.delete(&stored.key).await {
            error!("Failed to remove unused logo {}: {}", stored.key, e);
        }
    }
}

/// Reads text fields into a [`ProfileUpdate`] and streams an optional `logo` file to storage.
async fn read_multipart(
    mut payload: Multipart,
    media: &MediaService,
    owner: Uuid,
) -> Result<(ProfileUpdate, Option<StoredFile>), HttpResponse> {
    let mut update = ProfileUpdate::default();
    let mut stored: Option<StoredFile> = None;

    while let Some(item) = payload.next().await {
        let mut field = match item {
            Ok(field) => field,
            Err(e) => {
                error!("Multipart error: {}", e);
                discard_logo(media, stored).await;
                return Err(responses::bad_request("Failed to read upload"));
            }
        };

        let (name, filename) = {
            let disposition = field.content_disposition();
            (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().map(str::to_string),
            )
        };

        // Browsers send an empty `logo` part when no file was picked.
        if name == "logo" && filename.as_deref().map(str::trim) == Some("") {
            while let Some(chunk) = field.next().await {
                if let Err(e) = chunk {
                    error!("Multipart field error: {}", e);
                    discard_logo(media, stored).await;
                    return Err(responses::bad_request("Failed to read upload"));
                }
            }
            continue;
        }

        if name == "logo" {
            let filename = filename.unwrap_or_else(|| "logo.png".to_string());
            let stream = field.map(|chunk| {
                chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            });

            match media.save_logo(owner, &filename, stream).await {
                Ok(file) => {
                    discard_logo(media, stored.replace(file)).await;
                }
                Err(err) => {
                    discard_logo(media, stored).await;
                    return Err(media_error_response(err));
                }
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Multipart field error: {}", e);
                    discard_logo(media, stored).await;
                    return Err(responses::bad_request("Failed to read upload"));
                }
            };
            if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
                discard_logo(media, stored).await;
                return Err(responses::bad_request(&format!("Field {} is too long", name)));
            }
            bytes.extend_from_slice(&chunk);
        }

        let value = match String::from_utf8(bytes) {
            Ok(value) => value,
            Err(_) => {
                discard_logo(media, stored).await;
                return Err(responses::bad_request(&format!("Field {} must be UTF-8 text", name)));
            }
        };

        // Unknown form fields are ignored.
        update.set(&name, value);
    }

    Ok((update, stored))
}

async fn read_json(mut payload: web::Payload, limit: usize) -> Result<ProfileUpdate, HttpResponse> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| {
            error!("Failed to read request body: {}", e);
            responses::bad_request("Failed to read request body")
        })?;
        if body.len() + chunk.len() > limit {
            return Err(responses::bad_request("Request body too large"));
        }
        body.extend_from_slice(&chunk);
    }

    if body.is_empty() {
        return Ok(ProfileUpdate::default());
    }

    serde_json::from_slice::<ProfileUpdate>(&body)
        .map_err(|e| responses::bad_request(&format!("Invalid request body: {}", e)))
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

#[get("/profile")]
async fn get_profile(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match get_or_create_profile(&app_state.db, user.id).await {
        Ok(profile) => responses::ok(profile),
        Err(e) => responses::internal_error(&format!("Failed to load institute profile for {}", user.id), e),
    }
}

#[put("/profile")]
async fn update_profile(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    payload: web::Payload,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let media = MediaService::new(app_state.storage.clone());

    let (update, new_logo) = if is_multipart(&req) {
        let multipart = Multipart::new(req.headers(), payload);
        match read_multipart(multipart, &media, user.id).await {
            Ok(parts) => parts,
            Err(response) => return response,
        }
    } else {
        match read_json(payload, app_state.max_payload_bytes).await {
            Ok(update) => (update, None),
            Err(response) => return response,
        }
    };

    let mut profile = match get_or_create_profile(&app_state.db, user.id).await {
        Ok(profile) => profile,
        Err(e) => {
            discard_logo(&media, new_logo).await;
            return responses::internal_error(&format!("Failed to load institute profile for {}", user.id), e);
        }
    };

    update.apply_to(&mut profile);

    let errors = validate_profile(&profile);
    if !errors.is_empty() {
        discard_logo(&media, new_logo).await;
        return responses::validation_failed(errors);
    }

    let (logo_key, logo_url) = match &new_logo {
        Some(stored) => (Some(stored.key.clone()), Some(stored.url.clone())),
        None => (profile.logo_key.clone(), profile.logo_url.clone()),
    };

    // The locked CTE reports the key this update replaced, even under concurrent uploads.
    let updated = sqlx::query_as::<_, UpdatedProfile>(&format!(
        "WITH previous AS (
             SELECT logo_key AS previous_logo_key FROM institute_profiles
             WHERE admin_id = $1 FOR UPDATE
         )
         UPDATE institute_profiles
         SET name = $2, tagline = $3, phone = $4, email = $5, website = $6,
             address = $7, country = $8, logo_key = $9, logo_url = $10, updated_at = NOW()
         FROM previous
         WHERE admin_id = $1
         RETURNING {}, previous.previous_logo_key",
        PROFILE_COLUMNS
    ))
    .bind(user.id)
    .bind(&profile.name)
    .bind(&profile.tagline)
    .bind(&profile.phone)
    .bind(&profile.email)
    .bind(&profile.website)
    .bind(&profile.address)
    .bind(&profile.country)
    .bind(logo_key)
    .bind(logo_url)
    .fetch_one(&app_state.db)
    .await;

    match updated {
        Ok(UpdatedProfile {
            profile: updated,
            previous_logo_key,
        }) => {
            if let Some(old_key) = replaced_logo(new_logo.as_ref(), previous_logo_key) {
                if let Err(MediaError::Io(e)) = media.delete(&old_key).await {
                    error!("Failed to delete previous logo {}: {}", old_key, e);
                }
            }
            responses::ok_with_message("Institute profile updated successfully", updated)
        }
        Err(e) => {
            discard_logo(&media, new_logo).await;
            responses::internal_error(&format!("Failed to update institute profile for {}", user.id), e)
        }
    }
}

#[delete("/profile/logo")]
async fn delete_logo(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let profile = match fetch_profile(&app_state.db, user.id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return responses::not_found("Institute profile not found"),
        Err(e) => {
            return responses::internal_error(&format!("Failed to load institute profile for {}", user.id), e)
        }
    };

    let Some(logo_key) = profile.logo_key.clone() else {
        return responses::bad_request("No logo to delete");
    };

    if let Err(MediaError::Io(e)) = MediaService::new(app_state.storage.clone())
        .delete(&logo_key)
        .await
    {
        return responses::internal_error(&format!("Failed to delete logo {}", logo_key), e);
    }

    match sqlx::query_as::<_, InstituteProfile>(&format!(
        "UPDATE institute_profiles SET logo_key = NULL, logo_url = NULL, updated_at = NOW()
         WHERE admin_id = $1 RETURNING {}",
        PROFILE_COLUMNS
    ))
    .bind(user.id)
    .fetch_one(&app_state.db)
    .await
    {
        Ok(updated) => responses::ok_with_message("Logo deleted successfully", updated),
        Err(e) => responses::internal_error(&format!("Failed to clear logo for {}", user.id), e),
    }
}

#[get("/profiles")]
async fn list_profiles(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    if let Err(response) = require_role(&req, &app_state, ROLE_ADMIN) {
        return response;
    }

    match sqlx::query_as::<_, InstituteProfile>(&format!(
        "SELECT {} FROM institute_profiles ORDER BY updated_at DESC",
        PROFILE_COLUMNS
    ))
    .fetch_all(&app_state.db)
    .await
    {
        Ok(profiles) => responses::ok(profiles),
        Err(e) => responses::internal_error("Failed to list institute profiles", e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/institute")
            .service(get_profile)
            .service(update_profile)
            .service(delete_logo)
            .service(list_profiles),
    );
}
