use std::collections::{HashMap, HashSet};

use actix_web::{get, post, web, HttpRequest, Responder};
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::class::{ClassRecord, CLASS_COLUMNS};
use crate::models::skill_rating::{SkillRatingRow, StudentWithRatings};
use crate::models::student::StudentSummary;
use crate::responses;
use crate::roster::resolve_roster;
use crate::users::{load_full_name, require_role, AuthUser, ROLE_TEACHER};
use crate::validation::parse_id;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveRatingsRequest {
    class_id: Option<String>,
    #[serde(default)]
    ratings: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TeacherClass {
    id: Uuid,
    name: String,
    section: String,
    subject: Option<String>,
    student_count: usize,
}

/// One surviving rating entry, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpsert {
    pub student_id: Uuid,
    pub ratings: Map<String, Value>,
}

fn parse_entry(entry: &Value) -> Option<RatingUpsert> {
    let student_id = entry
        .get("studentId")
        .and_then(Value::as_str)
        .and_then(parse_id)?;

    let ratings = entry.get("ratings")?.as_object()?;
    if !ratings.values().all(Value::is_number) {
        return None;
    }

    Some(RatingUpsert {
        student_id,
        ratings: ratings.clone(),
    })
}

/// Filters raw entries down to the writes that are allowed for this class.
///
/// An empty `allowed` set applies no roster restriction. Repeated student ids
/// keep their first position but take the last submitted ratings.
pub fn plan_rating_upserts(entries: &[Value], allowed: &HashSet<Uuid>) -> Vec<RatingUpsert> {
    let mut planned: Vec<RatingUpsert> = Vec::new();
    let mut positions: HashMap<Uuid, usize> = HashMap::new();

    for upsert in entries.iter().filter_map(parse_entry) {
        if !allowed.is_empty() && !allowed.contains(&upsert.student_id) {
            continue;
        }

        match positions.get(&upsert.student_id) {
            Some(&index) => planned[index] = upsert,
            None => {
                positions.insert(upsert.student_id, planned.len());
                planned.push(upsert);
            }
        }
    }

    planned
}

async fn upsert_ratings(
    db: &PgPool,
    class_id: Uuid,
    teacher_id: Uuid,
    plan: &[RatingUpsert],
) -> Result<u64, sqlx::Error> {
    let rated_at = Utc::now();

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO skill_ratings (class_id, student_id, teacher_id, ratings, last_rated) ",
    );
    builder.push_values(plan, |mut row, upsert| {
        row.push_bind(class_id)
            .push_bind(upsert.student_id)
            .push_bind(teacher_id)
            .push_bind(Value::Object(upsert.ratings.clone()))
            .push_bind(rated_at);
    });
    builder.push(
        " ON CONFLICT (class_id, student_id, teacher_id)
          DO UPDATE SET ratings = EXCLUDED.ratings, last_rated = EXCLUDED.last_rated",
    );

    let result = builder.build().execute(db).await?;
    Ok(result.rows_affected())
}

async fn load_class(db: &PgPool, class_id: Uuid) -> Result<Option<ClassRecord>, sqlx::Error> {
    sqlx::query_as::<_, ClassRecord>(&format!(
        "SELECT {} FROM classes WHERE id = $1",
        CLASS_COLUMNS
    ))
    .bind(class_id)
    .fetch_optional(db)
    .await
}

/// Loads the class and checks the caller teaches it, by id or by name.
async fn load_owned_class(
    app_state: &AppState,
    user: &AuthUser,
    class_id: Uuid,
) -> Result<ClassRecord, actix_web::HttpResponse> {
    let class = match load_class(&app_state.db, class_id).await {
        Ok(Some(class)) => class,
        Ok(None) => return Err(responses::not_found("Class not found")),
        Err(e) => {
            return Err(responses::internal_error(
                &format!("Failed to load class {} for teacher {}", class_id, user.id),
                e,
            ))
        }
    };

    let teacher_name = match load_full_name(&app_state.db, user.id).await {
        Ok(name) => name,
        Err(e) => {
            return Err(responses::internal_error(
                &format!("Failed to load teacher {} (class {})", user.id, class_id),
                e,
            ))
        }
    };

    if !class.is_owned_by(user.id, teacher_name.as_deref()) {
        warn!("Teacher {} denied access to class {}", user.id, class_id);
        return Err(responses::forbidden(
            "Access denied. You are not assigned to this class",
        ));
    }

    Ok(class)
}

#[get("/classes")]
async fn list_teacher_classes(req: HttpRequest, app_state: web::Data<AppState>) -> impl Responder {
    let user = match require_role(&req, &app_state, ROLE_TEACHER) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let teacher_name = match load_full_name(&app_state.db, user.id).await {
        Ok(name) => name,
        Err(e) => {
            return responses::internal_error(&format!("Failed to load teacher {}", user.id), e)
        }
    };

    let classes = match sqlx::query_as::<_, ClassRecord>(&format!(
        "SELECT {} FROM classes
         WHERE teacher_id = $1
            OR (teacher_name IS NOT NULL AND TRIM(teacher_name) <> ''
                AND LOWER(TRIM(teacher_name)) = LOWER(TRIM($2)))
         ORDER BY name, section",
        CLASS_COLUMNS
    ))
    .bind(user.id)
    .bind(teacher_name)
    .fetch_all(&app_state.db)
    .await
    {
        Ok(classes) => classes,
        Err(e) => {
            return responses::internal_error(
                &format!("Failed to list classes for teacher {}", user.id),
                e,
            )
        }
    };

    let mut result = Vec::with_capacity(classes.len());
    for class in classes {
        let student_count = match resolve_roster(&app_state.db, &class).await {
            Ok(ids) => ids.len(),
            Err(e) => {
                return responses::internal_error(
                    &format!("Failed to resolve roster for class {} (teacher {})", class.id, user.id),
                    e,
                )
            }
        };

        result.push(TeacherClass {
            id: class.id,
            section: class.normalized_section(),
            name: class.name,
            subject: class.subject,
            student_count,
        });
    }

    responses::ok(result)
}

#[get("/class/{class_id}/students")]
async fn get_class_students(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let user = match require_role(&req, &app_state, ROLE_TEACHER) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let class_id = match parse_id(&path.into_inner()) {
        Some(id) => id,
        None => return responses::bad_request("Invalid class id"),
    };

    let class = match load_owned_class(&app_state, &user, class_id).await {
        Ok(class) => class,
        Err(response) => return response,
    };

    let context = format!("class {}, teacher {}", class_id, user.id);

    let roster = match resolve_roster(&app_state.db, &class).await {
        Ok(ids) => ids,
        Err(e) => return responses::internal_error(&format!("Failed to resolve roster ({})", context), e),
    };

    if roster.is_empty() {
        return responses::ok(Vec::<StudentWithRatings>::new());
    }

    let students = match sqlx::query_as::<_, StudentSummary>(
        r"SELECT id, name, roll_number, select_class, section, photo_url
          FROM students
          WHERE id = ANY($1)
          ORDER BY NULLIF(regexp_replace(COALESCE(roll_number, ''), '\D', '', 'g'), '')::NUMERIC NULLS LAST,
                   name",
    )
    .bind(&roster)
    .fetch_all(&app_state.db)
    .await
    {
        Ok(students) => students,
        Err(e) => return responses::internal_error(&format!("Failed to fetch students ({})", context), e),
    };

    let student_ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();

    let ratings = match sqlx::query_as::<_, SkillRatingRow>(
        "SELECT student_id, ratings, last_rated FROM skill_ratings
         WHERE class_id = $1 AND teacher_id = $2 AND student_id = ANY($3)",
    )
    .bind(class_id)
    .bind(user.id)
    .bind(&student_ids)
    .fetch_all(&app_state.db)
    .await
    {
        Ok(rows) => rows,
        Err(e) => return responses::internal_error(&format!("Failed to fetch ratings ({})", context), e),
    };

    responses::ok(merge_ratings(students, ratings))
}

fn merge_ratings(
    students: Vec<StudentSummary>,
    ratings: Vec<SkillRatingRow>,
) -> Vec<StudentWithRatings> {
    let mut by_student: HashMap<Uuid, SkillRatingRow> =
        ratings.into_iter().map(|row| (row.student_id, row)).collect();

    students
        .into_iter()
        .map(|student| {
            let existing = by_student.remove(&student.id);
            StudentWithRatings {
                ratings: existing
                    .as_ref()
                    .map(|row| row.ratings.clone())
                    .unwrap_or_else(|| Value::Object(Map::new())),
                last_rated: existing.map(|row| row.last_rated),
                student,
            }
        })
        .collect()
}

#[post("/save")]
async fn save_ratings(
    req: HttpRequest,
    app_state: web::Data<AppState>,
    body: web::Json<SaveRatingsRequest>,
) -> impl Responder {
    let user = match require_role(&req, &app_state, ROLE_TEACHER) {
        Ok(user) => user,
        Err(response) => return response,
    };

    let body = body.into_inner();

    let class_id = match body.class_id.as_deref().and_then(parse_id) {
        Some(id) => id,
        None => return responses::bad_request("Valid class id is required"),
    };

    let entries = match body.ratings.as_array() {
        Some(entries) => entries,
        None => return responses::bad_request("Ratings must be an array"),
    };

    if entries.is_empty() {
        return responses::bad_request("No valid ratings to save");
    }

    let class = match load_owned_class(&app_state, &user, class_id).await {
        Ok(class) => class,
        Err(response) => return response,
    };

    let context = format!("class {}, teacher {}", class_id, user.id);

    let allowed: HashSet<Uuid> = match resolve_roster(&app_state.db, &class).await {
        Ok(ids) => ids.into_iter().collect(),
        Err(e) => return responses::internal_error(&format!("Failed to resolve roster ({})", context), e),
    };

    let plan = plan_rating_upserts(entries, &allowed);
    if plan.is_empty() {
        return responses::bad_request("No valid ratings to save");
    }

    if plan.len() < entries.len() {
        info!(
            "Dropped {} of {} rating entries ({})",
            entries.len() - plan.len(),
            entries.len(),
            context
        );
    }

    match upsert_ratings(&app_state.db, class_id, user.id, &plan).await {
        Ok(_) => responses::ok_with_message(
            "Skill ratings saved successfully",
            serde_json::json!({ "saved": plan.len() }),
        ),
        Err(e) => responses::internal_error(&format!("Failed to save ratings ({})", context), e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/skills")
            .service(list_teacher_classes)
            .service(get_class_students)
            .service(save_ratings),
    );
}
