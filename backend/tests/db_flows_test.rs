//! End-to-end flows against a real Postgres.
//!
//! Set `TEST_DATABASE_URL` to run these; without it each test returns early.
//! Every test seeds its own users, classes and students under fresh ids.

mod common;

use actix_web::{test, web};
use institute_backend::create_app;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use common::{bearer, live_state};

macro_rules! live_app_or_skip {
    ($dir:expr) => {{
        match live_state($dir.path().to_path_buf()).await {
            Some(state) => {
                let db = state.db.clone();
                let app = test::init_service(create_app(web::Data::new(state))).await;
                (app, db)
            }
            None => {
                eprintln!("TEST_DATABASE_URL not set, skipping");
                return;
            }
        }
    }};
}

async fn seed_user(db: &PgPool, full_name: &str, role: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (email, password_hash, full_name, role) VALUES ($1, 'x', $2, $3) RETURNING id",
    )
    .bind(format!("{}@school.test", Uuid::new_v4()))
    .bind(full_name)
    .bind(role)
    .fetch_one(db)
    .await
    .expect("seed user")
}

async fn seed_student(db: &PgPool, name: &str, class: &str, section: &str, phone: Option<&str>) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO students (name, roll_number, select_class, section, phone)
         VALUES ($1, '1', $2, $3, $4) RETURNING id",
    )
    .bind(name)
    .bind(class)
    .bind(section)
    .bind(phone)
    .fetch_one(db)
    .await
    .expect("seed student")
}

async fn seed_student_with_roll(db: &PgPool, name: &str, roll_number: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO students (name, roll_number, select_class, section) VALUES ($1, $2, '4', 'A') RETURNING id",
    )
    .bind(name)
    .bind(roll_number)
    .fetch_one(db)
    .await
    .expect("seed student")
}

async fn seed_class(
    db: &PgPool,
    name: &str,
    section: &str,
    teacher_id: Option<Uuid>,
    teacher_name: Option<&str>,
    student_ids: &[Uuid],
) -> Uuid {
    let ids: Vec<String> = student_ids.iter().map(Uuid::to_string).collect();
    sqlx::query_scalar(
        "INSERT INTO classes (name, section, teacher_id, teacher_name, student_ids)
         VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(name)
    .bind(section)
    .bind(teacher_id)
    .bind(teacher_name)
    .bind(&ids)
    .fetch_one(db)
    .await
    .expect("seed class")
}

async fn rating_rows(db: &PgPool, class_id: Uuid) -> Vec<(Uuid, Value)> {
    sqlx::query_as("SELECT student_id, ratings FROM skill_ratings WHERE class_id = $1 ORDER BY student_id")
        .bind(class_id)
        .fetch_all(db)
        .await
        .expect("rating rows")
}

/// A unique class label so fallback matches never see other tests' students.
fn unique_label() -> String {
    (Uuid::new_v4().as_u128() % 1_000_000_000).to_string()
}

#[actix_web::test]
async fn ratings_outside_the_roster_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let teacher = seed_user(&db, "Anita Rao", "teacher").await;
    let s1 = seed_student(&db, "S1", "5", "A", None).await;
    let s2 = seed_student(&db, "S2", "5", "A", None).await;
    let s3 = seed_student(&db, "S3", "5", "A", None).await;
    let class_id = seed_class(&db, "Class 5", "A", Some(teacher), None, &[s1, s2]).await;

    let req = test::TestRequest::post()
        .uri("/api/skills/save")
        .insert_header(bearer(teacher, "teacher"))
        .set_json(json!({
            "classId": class_id,
            "ratings": [
                { "studentId": s1, "ratings": { "Reading": 4 } },
                { "studentId": s3, "ratings": { "Reading": 5 } },
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let rows = rating_rows(&db, class_id).await;
    assert_eq!(rows, vec![(s1, json!({ "Reading": 4 }))]);
}

#[actix_web::test]
async fn second_save_overwrites_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let teacher = seed_user(&db, "Vikram Sethi", "teacher").await;
    let s1 = seed_student(&db, "S1", "6", "B", None).await;
    let class_id = seed_class(&db, "Class 6", "B", Some(teacher), None, &[s1]).await;

    for score in [2, 5] {
        let req = test::TestRequest::post()
            .uri("/api/skills/save")
            .insert_header(bearer(teacher, "teacher"))
            .set_json(json!({
                "classId": class_id,
                "ratings": [{ "studentId": s1, "ratings": { "Sports": score } }]
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }

    let rows = rating_rows(&db, class_id).await;
    assert_eq!(rows, vec![(s1, json!({ "Sports": 5 }))]);
}

#[actix_web::test]
async fn fully_filtered_save_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let teacher = seed_user(&db, "Meena Iyer", "teacher").await;
    let s1 = seed_student(&db, "S1", "7", "A", None).await;
    let outsider = seed_student(&db, "Outsider", "7", "A", None).await;
    let class_id = seed_class(&db, "Class 7", "A", Some(teacher), None, &[s1]).await;

    let req = test::TestRequest::post()
        .uri("/api/skills/save")
        .insert_header(bearer(teacher, "teacher"))
        .set_json(json!({
            "classId": class_id,
            "ratings": [
                { "studentId": outsider, "ratings": { "Art": 3 } },
                { "studentId": "legacy-id", "ratings": { "Art": 3 } },
            ]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "No valid ratings to save");

    assert!(rating_rows(&db, class_id).await.is_empty());
}

#[actix_web::test]
async fn fallback_roster_matches_label_and_section_by_name_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let label = unique_label();
    let teacher = seed_user(&db, "Farah Khan", "teacher").await;
    let in_class = seed_student(&db, "Zara", &label, "a", None).await;
    let _other_section = seed_student(&db, "Kabir", &label, "B", None).await;
    let class_id = seed_class(
        &db,
        &format!("Class {}", label),
        "N/A",
        None,
        Some("farah khan"),
        &[],
    )
    .await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/skills/class/{}/students", class_id))
        .insert_header(bearer(teacher, "teacher"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    let students = body["data"].as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"], in_class.to_string());
    assert_eq!(students[0]["ratings"], json!({}));
}

#[actix_web::test]
async fn other_teachers_cannot_read_or_save() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let owner = seed_user(&db, "Owner Teacher", "teacher").await;
    let intruder = seed_user(&db, "Intruder Teacher", "teacher").await;
    let s1 = seed_student(&db, "S1", "8", "A", None).await;
    let class_id = seed_class(&db, "Class 8", "A", Some(owner), None, &[s1]).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/skills/class/{}/students", class_id))
        .insert_header(bearer(intruder, "teacher"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/skills/save")
        .insert_header(bearer(intruder, "teacher"))
        .set_json(json!({
            "classId": class_id,
            "ratings": [{ "studentId": s1, "ratings": { "Art": 1 } }]
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);
    assert!(rating_rows(&db, class_id).await.is_empty());
}

#[actix_web::test]
async fn phoneless_student_gets_no_sms_record() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let sender = seed_user(&db, "Front Office", "staff").await;
    let silent = seed_student(&db, "No Phone", "3", "A", None).await;
    let reachable = seed_student(&db, "Has Phone", "3", "A", Some("+91 98765 43210")).await;

    let req = test::TestRequest::post()
        .uri("/api/sms/send")
        .insert_header(bearer(sender, "staff"))
        .set_json(json!({
            "recipientType": "specificStudent",
            "studentId": silent,
            "message": "Fee due Friday"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_records WHERE created_by = $1")
        .bind(sender)
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(count, 0);

    let req = test::TestRequest::post()
        .uri("/api/sms/send")
        .insert_header(bearer(sender, "staff"))
        .set_json(json!({
            "recipientType": "specificStudent",
            "studentId": reachable,
            "message": "Fee due Friday"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["recipientCount"], 1);
    assert_eq!(body["data"]["status"], "sent");

    let req = test::TestRequest::get()
        .uri("/api/sms/history?recipientType=specificStudent&search=fee")
        .insert_header(bearer(sender, "staff"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["records"][0]["recipientName"], "Has Phone");
}

#[actix_web::test]
async fn class_broadcast_uses_the_class_label() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let label = unique_label();
    let sender = seed_user(&db, "Principal", "admin").await;
    seed_student(&db, "A", &label, "A", Some("1112223333")).await;
    seed_student(&db, "B", &label, "B", Some("4445556666")).await;
    seed_student(&db, "C", &label, "A", None).await;
    let class_id = seed_class(&db, &format!("Grade {}", label), "", None, None, &[]).await;

    let req = test::TestRequest::post()
        .uri("/api/sms/send")
        .insert_header(bearer(sender, "admin"))
        .set_json(json!({
            "recipientType": "specificClass",
            "classId": class_id,
            "message": "Sports day on Monday"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["recipientCount"], 2);
    assert_eq!(body["data"]["recipientName"], format!("Class Grade {} (A)", label));

    let sms_id = body["data"]["id"].as_str().unwrap().to_string();
    let req = test::TestRequest::post()
        .uri("/api/sms/bulk-delete")
        .insert_header(bearer(sender, "admin"))
        .set_json(json!({ "ids": [sms_id] }))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["deletedCount"], 1);
}

#[actix_web::test]
async fn profile_and_fees_are_created_once() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);
    let admin = seed_user(&db, "Admin", "admin").await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let req = test::TestRequest::get()
            .uri("/api/institute/profile")
            .insert_header(bearer(admin, "admin"))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        ids.push(body["data"]["id"].clone());
    }
    assert_eq!(ids[0], ids[1]);

    let req = test::TestRequest::put()
        .uri("/api/institute/profile")
        .insert_header(bearer(admin, "admin"))
        .set_json(json!({ "name": "Greenfield Public School", "website": "https://greenfield.edu" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["name"], "Greenfield Public School");

    let req = test::TestRequest::get()
        .uri("/api/fees/particulars")
        .insert_header(bearer(admin, "admin"))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["data"]["items"][0]["label"], "Monthly Tuition Fee");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fees_particulars WHERE admin_id = $1")
        .bind(admin)
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[actix_web::test]
async fn long_roll_numbers_still_sort() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let teacher = seed_user(&db, "Ravi Menon", "teacher").await;
    let long = seed_student_with_roll(&db, "Long", "2024-0001-000123456789").await;
    let short = seed_student_with_roll(&db, "Short", "12").await;
    let blank = seed_student_with_roll(&db, "Blank", "n/a").await;
    let class_id = seed_class(&db, "Class 4", "A", Some(teacher), None, &[blank, long, short]).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/skills/class/{}/students", class_id))
        .insert_header(bearer(teacher, "teacher"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    let order: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec![short.to_string(), long.to_string(), blank.to_string()]);
}

#[actix_web::test]
async fn listed_class_is_accessible_with_non_ascii_name_case() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);

    let teacher = seed_user(&db, "Élodie Durand", "teacher").await;
    let s1 = seed_student(&db, "S1", "2", "A", None).await;
    let class_id = seed_class(&db, "Class 2", "A", None, Some("élodie durand"), &[s1]).await;

    let req = test::TestRequest::get()
        .uri("/api/skills/classes")
        .insert_header(bearer(teacher, "teacher"))
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    let listed = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .any(|c| c["id"] == class_id.to_string());
    assert!(listed);

    let req = test::TestRequest::get()
        .uri(&format!("/api/skills/class/{}/students", class_id))
        .insert_header(bearer(teacher, "teacher"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/skills/save")
        .insert_header(bearer(teacher, "teacher"))
        .set_json(json!({
            "classId": class_id,
            "ratings": [{ "studentId": s1, "ratings": { "Drawing": 3 } }]
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

fn profile_form(fields: &[(&str, Option<&str>, &str)]) -> (String, String) {
    let boundary = "institute-form-boundary";
    let mut body = String::new();
    for (name, filename, value) in fields {
        body.push_str(&format!("--{}\r\n", boundary));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                name, filename
            )),
            None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    (format!("multipart/form-data; boundary={}", boundary), body)
}

#[actix_web::test]
async fn form_update_without_a_picked_logo_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let (app, db) = live_app_or_skip!(dir);
    let admin = seed_user(&db, "Form Admin", "admin").await;

    let (content_type, body) = profile_form(&[("name", None, "Greenfield"), ("logo", Some(""), "")]);
    let req = test::TestRequest::put()
        .uri("/api/institute/profile")
        .insert_header(bearer(admin, "admin"))
        .insert_header((actix_web::http::header::CONTENT_TYPE, content_type))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["name"], "Greenfield");
    assert_eq!(body["data"]["logoUrl"], Value::Null);
}

#[actix_web::test]
async fn replacing_a_logo_removes_the_old_file() {
    let dir = tempfile::tempdir().unwrap();
    let logo_dir = dir.path().join("logos");
    let (app, db) = live_app_or_skip!(dir);
    let admin = seed_user(&db, "Logo Admin", "admin").await;

    let mut keys = Vec::new();
    for data in ["first", "second"] {
        let (content_type, body) = profile_form(&[("logo", Some("crest.png"), data)]);
        let req = test::TestRequest::put()
            .uri("/api/institute/profile")
            .insert_header(bearer(admin, "admin"))
            .insert_header((actix_web::http::header::CONTENT_TYPE, content_type))
            .set_payload(body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let key: Option<String> =
            sqlx::query_scalar("SELECT logo_key FROM institute_profiles WHERE admin_id = $1")
                .bind(admin)
                .fetch_one(&db)
                .await
                .unwrap();
        keys.push(key.unwrap());
    }

    assert_ne!(keys[0], keys[1]);
    assert!(!logo_dir.join(&keys[0]).exists());
    assert_eq!(std::fs::read(logo_dir.join(&keys[1])).unwrap(), b"second");
}
