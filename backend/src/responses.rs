use std::fmt::Display;

use actix_web::{error, HttpRequest, HttpResponse};
use log::error;
use serde::Serialize;
use serde_json::json;

/// A single failed field check, reported as `{ field, message }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "data": data
    }))
}

pub fn ok_with_message<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "message": message,
        "data": data
    }))
}

pub fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "success": false,
        "message": message
    }))
}

pub fn validation_failed(errors: Vec<FieldError>) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "success": false,
        "message": "Validation failed",
        "errors": errors
    }))
}

pub fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(json!({
        "success": false,
        "message": message
    }))
}

pub fn forbidden(message: &str) -> HttpResponse {
    HttpResponse::Forbidden().json(json!({
        "success": false,
        "message": message
    }))
}

pub fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "success": false,
        "message": message
    }))
}

/// Logs the underlying error with its context and hides it from the client.
pub fn internal_error(context: &str, err: impl Display) -> HttpResponse {
    error!("{}: {}", context, err);
    HttpResponse::InternalServerError().json(json!({
        "success": false,
        "message": "Internal server error"
    }))
}

/// Maps body deserialization failures onto the standard 400 envelope.
pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("Invalid request body: {}", err);
    error::InternalError::from_response(err, bad_request(&message)).into()
}

pub fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let message = format!("Invalid query parameters: {}", err);
    error::InternalError::from_response(err, bad_request(&message)).into()
}
