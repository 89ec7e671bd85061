pub mod history;
pub mod recipients;

use actix_web::{get, post, web, HttpRequest, Responder};
use futures_util::future::try_join3;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::class::{ClassRecord, CLASS_COLUMNS};
use crate::models::employee::EmployeeContact;
use crate::models::sms::{SmsRecord, SMS_COLUMNS};
use crate::models::student::StudentContact;
use crate::responses::{self, FieldError};
use crate::users::verify_token;
use crate::validation::parse_id;
use crate::AppState;

use history::{escape_like, HistoryFilter, HistoryQuery};
use recipients::{
    parse_send_request, recipient_count, resolve_recipients, simulate_delivery, ResolveError, SendSmsRequest,
};

#[derive(Debug, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
struct SmsTotals {
    total: i64,
    sent: i64,
    failed: i64,
    pending: i64,
    total_recipients: i64,
    this_month: i64,
}

#[derive(Debug, Deserialize)]
struct ContactQuery {
    #[serde(rename = "classId")]
    class_id: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkDeleteRequest {
    #[serde(default)]
    ids: Value,
}

fn search_pattern(search: &Option<String>) -> Option<String> {
    search
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", escape_like(v)))
}

/// Every id must be a UUID; offending positions are reported as `ids[i]`.
fn parse_bulk_ids(ids: &Value) -> Result<Vec<Uuid>, Vec<FieldError>> {
    let items = match ids.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(vec![FieldError::new(
                "ids",
                "Please provide a non-empty array of SMS ids",
            )])
        }
    };

    let mut parsed = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match item.as_str().and_then(parse_id) {
            Some(id) => parsed.push(id),
            None => errors.push(FieldError::new(format!("ids[{}]", index), "Invalid SMS id")),
        }
    }

    if errors.is_empty() {
        parsed.sort();
        parsed.dedup();
        Ok(parsed)
    } else {
        Err(errors)
    }
}

#[get("/stats")]
async fn get_stats(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let totals = sqlx::query_as::<_, SmsTotals>(
        "SELECT COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COALESCE(SUM(recipient_count), 0)::BIGINT AS total_recipients,
                COUNT(*) FILTER (WHERE created_at >= date_trunc('month', NOW())) AS this_month
         FROM sms_records
         WHERE created_by = $1",
    )
    .bind(user.id)
    .fetch_one(&app_state.db);

    let students = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM students WHERE status = 'active'",
    )
    .fetch_one(&app_state.db);

    let employees = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employees WHERE status = 'active'",
    )
    .fetch_one(&app_state.db);

    match try_join3(totals, students, employees).await {
        Ok((totals, total_students, total_employees)) => responses::ok(json!({
            "sms": totals,
            "totalStudents": total_students,
            "totalEmployees": total_employees,
        })),
        Err(e) => responses::internal_error(&format!("Failed to load SMS stats for user {}", user.id), e),
    }
}

#[get("/history")]
async fn get_history(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let (filter, page) = match HistoryFilter::from_query(user.id, &query) {
        Ok(parsed) => parsed,
        Err(errors) => return responses::validation_failed(errors),
    };

    let mut count_query: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM sms_records");
    filter.push_where(&mut count_query);

    let total = match count_query
        .build_query_scalar::<i64>()
        .fetch_one(&app_state.db)
        .await
    {
        Ok(total) => total,
        Err(e) => {
            return responses::internal_error(&format!("Failed to count SMS history for user {}", user.id), e)
        }
    };

    let mut list_query: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM sms_records", SMS_COLUMNS));
    filter.push_where(&mut list_query);
    list_query
        .push(" ORDER BY created_at DESC, id LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset());

    let records = match list_query
        .build_query_as::<SmsRecord>()
        .fetch_all(&app_state.db)
        .await
    {
        Ok(records) => records,
        Err(e) => {
            return responses::internal_error(&format!("Failed to load SMS history for user {}", user.id), e)
        }
    };

    responses::ok(json!({
        "records": records,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "total": total,
            "totalPages": page.total_pages(total),
        }
    }))
}

#[get("/classes")]
async fn list_classes(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    if let Err(response) = verify_token(&req, &app_state) {
        return response;
    }

    match sqlx::query_as::<_, ClassRecord>(&format!(
        "SELECT {} FROM classes ORDER BY name, section",
        CLASS_COLUMNS
    ))
    .fetch_all(&app_state.db)
    .await
    {
        Ok(classes) => {
            let classes: Vec<Value> = classes
                .iter()
                .map(|class| {
                    json!({
                        "id": class.id,
                        "name": class.name,
                        "section": class.normalized_section(),
                        "label": class.label(),
                    })
                })
                .collect();
            responses::ok(classes)
        }
        Err(e) => responses::internal_error("Failed to list classes for SMS", e),
    }
}

#[get("/students")]
async fn list_students(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    query: web::Query<ContactQuery>,
) -> impl Responder {
    if let Err(response) = verify_token(&req, &app_state) {
        return response;
    }

    let class_label = match query.class_id.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => None,
        Some(raw) => {
            let class_id = match parse_id(raw) {
                Some(id) => id,
                None => return responses::bad_request("Invalid class id"),
            };

            match sqlx::query_as::<_, ClassRecord>(&format!(
                "SELECT {} FROM classes WHERE id = $1",
                CLASS_COLUMNS
            ))
            .bind(class_id)
            .fetch_optional(&app_state.db)
            .await
            {
                Ok(Some(class)) => Some(class.label()),
                Ok(None) => return responses::not_found("Class not found"),
                Err(e) => return responses::internal_error(&format!("Failed to load class {}", class_id), e),
            }
        }
    };

    match sqlx::query_as::<_, StudentContact>(
        "SELECT id, name, select_class, section, phone FROM students
         WHERE status = 'active' AND phone IS NOT NULL AND TRIM(phone) <> ''
           AND ($1::TEXT IS NULL OR select_class = $1)
           AND ($2::TEXT IS NULL OR name ILIKE $2)
         ORDER BY name",
    )
    .bind(class_label)
    .bind(search_pattern(&query.search))
    .fetch_all(&app_state.db)
    .await
    {
        Ok(students) => responses::ok(students),
        Err(e) => responses::internal_error("Failed to list students for SMS", e),
    }
}

#[get("/employees")]
async fn list_employees(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    query: web::Query<ContactQuery>,
) -> impl Responder {
    if let Err(response) = verify_token(&req, &app_state) {
        return response;
    }

    match sqlx::query_as::<_, EmployeeContact>(
        "SELECT id, name, designation, phone FROM employees
         WHERE status = 'active' AND phone IS NOT NULL AND TRIM(phone) <> ''
           AND ($1::TEXT IS NULL OR name ILIKE $1)
         ORDER BY name",
    )
    .bind(search_pattern(&query.search))
    .fetch_all(&app_state.db)
    .await
    {
        Ok(employees) => responses::ok(employees),
        Err(e) => responses::internal_error("Failed to list employees for SMS", e),
    }
}

#[post("/send")]
async fn send_sms(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    body: web::Json<SendSmsRequest>,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let plan = match parse_send_request(&body) {
        Ok(plan) => plan,
        Err(errors) => return responses::validation_failed(errors),
    };

    let resolved = match resolve_recipients(&app_state.db, plan.target).await {
        Ok(resolved) => resolved,
        Err(ResolveError::NotFound(message)) => return responses::not_found(message),
        Err(ResolveError::MissingPhone(message)) => return responses::bad_request(&message),
        Err(ResolveError::Database(e)) => {
            return responses::internal_error(
                &format!("Failed to resolve SMS recipients ({:?}, user {})", plan.target, user.id),
                e,
            )
        }
    };

    if resolved.phones.is_empty() {
        return responses::bad_request("No valid recipients found");
    }

    let Some(count) = recipient_count(resolved.phones.len()) else {
        return responses::bad_request("Too many recipients for one message");
    };

    let status = simulate_delivery(&resolved, &plan.message);

    let record = match sqlx::query_as::<_, SmsRecord>(&format!(
        "INSERT INTO sms_records
            (recipient_type, recipient_name, recipient_count, message, status,
             created_by, class_id, student_ids, employee_ids)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {}",
        SMS_COLUMNS
    ))
    .bind(resolved.recipient_type.as_str())
    .bind(&resolved.label)
    .bind(count)
    .bind(&plan.message)
    .bind(status.as_str())
    .bind(user.id)
    .bind(resolved.class_id)
    .bind(&resolved.student_ids)
    .bind(&resolved.employee_ids)
    .fetch_one(&app_state.db)
    .await
    {
        Ok(record) => record,
        Err(e) => return responses::internal_error(&format!("Failed to record SMS for user {}", user.id), e),
    };

    responses::ok_with_message(
        "SMS sent successfully",
        json!({
            "id": record.id,
            "recipientName": record.recipient_name,
            "recipientCount": record.recipient_count,
            "status": record.status,
        }),
    )
}

#[post("/bulk-delete")]
async fn bulk_delete(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    body: web::Json<BulkDeleteRequest>,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let ids = match parse_bulk_ids(&body.ids) {
        Ok(ids) => ids,
        Err(errors) => return responses::validation_failed(errors),
    };

    match sqlx::query("DELETE FROM sms_records WHERE created_by = $1 AND id = ANY($2)")
        .bind(user.id)
        .bind(&ids)
        .execute(&app_state.db)
        .await
    {
        Ok(result) => responses::ok_with_message(
            "SMS records deleted",
            json!({ "deletedCount": result.rows_affected() }),
        ),
        Err(e) => responses::internal_error(&format!("Failed to delete SMS records for user {}", user.id), e),
    }
}

#[get("/{id}")]
async fn get_sms(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let user = match verify_token(&req, &app_state) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let sms_id = match parse_id(&path.into_inner()) {
        Some(id) => id,
        None => return responses::bad_request("Invalid SMS id"),
    };

    match sqlx::query_as::<_, SmsRecord>(&format!(
        "SELECT {} FROM sms_records WHERE id = $1 AND created_by = $2",
        SMS_COLUMNS
    ))
    .bind(sms_id)
    .bind(user.id)
    .fetch_optional(&app_state.db)
    .await
    {
        Ok(Some(record)) => responses::ok(record),
        Ok(None) => responses::not_found("SMS record not found"),
        Err(e) => responses::internal_error(&format!("Failed to load SMS {} for user {}", sms_id, user.id), e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Fixed paths go before `/{id}`.
    cfg.service(
        web::scope("/api/sms")
            .service(get_stats)
            .service(get_history)
            .service(list_classes)
            .service(list_students)
            .service(list_employees)
            .service(send_sms)
            .service(bulk_delete)
            .service(get_sms),
    );
}
