use std::collections::HashSet;

use actix_web::{get, put, web, HttpRequest, Responder};
use log::info;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::fees::{default_fee_items, FeeItem, FeesParticulars};
use crate::responses::{self, FieldError};
use crate::users::verify_token;
use crate::AppState;

pub const MAX_FEE_ITEMS: usize = 50;

#[derive(Debug, Deserialize)]
struct UpdateFeesRequest {
    #[serde(default)]
    items: Vec<FeeItem>,
}

/// Trims labels and checks the list; errors point at `items[i].field`.
pub fn normalize_items(items: Vec<FeeItem>) -> Result<Vec<FeeItem>, Vec<FieldError>> {
    let mut errors = Vec::new();

    if items.len() > MAX_FEE_ITEMS {
        errors.push(FieldError::new(
            "items",
            format!("At most {} fee items are allowed", MAX_FEE_ITEMS),
        ));
        return Err(errors);
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let label = item.label.trim().to_string();

        if label.is_empty() {
            errors.push(FieldError::new(format!("items[{}].label", index), "Label is required"));
        } else if label.chars().count() > 100 {
            errors.push(FieldError::new(
                format!("items[{}].label", index),
                "Label cannot exceed 100 characters",
            ));
        } else if !seen.insert(label.to_lowercase()) {
            errors.push(FieldError::new(
                format!("items[{}].label", index),
                format!("Duplicate fee item: {}", label),
            ));
        }

        if !item.amount.is_finite() || item.amount < 0.0 {
            errors.push(FieldError::new(
                format!("items[{}].amount", index),
                "Amount must be a non-negative number",
            ));
        }

        normalized.push(FeeItem {
            label,
            amount: item.amount,
        });
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

const FEES_COLUMNS: &str = "id, admin_id, items, updated_at";

/// Same fetch-then-insert pattern as the institute profile.
pub async fn get_or_create_fees(db: &PgPool, admin_id: Uuid) -> Result<FeesParticulars, sqlx::Error> {
    let select = format!("SELECT {} FROM fees_particulars WHERE admin_id = $1", FEES_COLUMNS);

    if let Some(fees) = sqlx::query_as::<_, FeesParticulars>(&select)
        .bind(admin_id)
        .fetch_optional(db)
        .await?
    {
        return Ok(fees);
    }

    sqlx::query(
        "INSERT INTO fees_particulars (admin_id, items) VALUES ($1, $2)
         ON CONFLICT (admin_id) DO NOTHING",
    )
    .bind(admin_id)
    .bind(Json(default_fee_items()))
    .execute(db)
    .await?;

    info!("Created default fee particulars for admin {}", admin_id);

    sqlx::query_as::<_, FeesParticulars>(&select)
        .bind(admin_id)
        .fetch_one(db)
        .await
}

#[get("/particulars")]
async fn get_particulars(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    match get_or_create_fees(&app_state.db, user.id).await {
        Ok(fees) => responses::ok(fees),
        Err(e) => responses::internal_error(&format!("Failed to load fee particulars for {}", user.id), e),
    }
}

#[put("/particulars")]
async fn update_particulars(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    body: web::Json<UpdateFeesRequest>,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let items = match normalize_items(body.into_inner().items) {
        Ok(items) => items,
        Err(errors) => return responses::validation_failed(errors),
    };

    match sqlx::query_as::<_, FeesParticulars>(&format!(
        "INSERT INTO fees_particulars (admin_id, items) VALUES ($1, $2)
         ON CONFLICT (admin_id) DO UPDATE SET items = EXCLUDED.items, updated_at = NOW()
         RETURNING {}",
        FEES_COLUMNS
    ))
    .bind(user.id)
    .bind(Json(items))
    .fetch_one(&app_state.db)
    .await
    {
        Ok(fees) => responses::ok_with_message("Fee particulars updated successfully", fees),
        Err(e) => responses::internal_error(&format!("Failed to update fee particulars for {}", user.id), e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/fees")
            .service(get_particulars)
            .service(update_particulars),
    );
}
