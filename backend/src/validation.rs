//! Field checks shared by the profile, fees and SMS forms.
//!
//! Each check pushes at most one [`FieldError`] so a form can report every
//! problem in one response.

use uuid::Uuid;

use crate::responses::FieldError;

pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim()).ok()
}

pub fn required(errors: &mut Vec<FieldError>, field: &str, value: &str, label: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{} is required", label)));
    }
}

pub fn max_chars(errors: &mut Vec<FieldError>, field: &str, value: &str, max: usize, label: &str) {
    if value.trim().chars().count() > max {
        errors.push(FieldError::new(
            field,
            format!("{} cannot exceed {} characters", label, max),
        ));
    }
}

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && !domain.contains('@')
        && !domain.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

pub fn is_valid_phone(value: &str) -> bool {
    let value = value.trim();
    let len = value.chars().count();
    (7..=20).contains(&len)
        && value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
}

pub fn is_valid_website(value: &str) -> bool {
    let value = value.trim();
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));

    matches!(rest, Some(host) if !host.is_empty() && !host.contains(char::is_whitespace))
}

pub fn optional_email(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if !value.trim().is_empty() && !is_valid_email(value) {
        errors.push(FieldError::new(field, "Please provide a valid email address"));
    }
}

pub fn optional_phone(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if !value.trim().is_empty() && !is_valid_phone(value) {
        errors.push(FieldError::new(field, "Please provide a valid phone number"));
    }
}

pub fn optional_website(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if !value.trim().is_empty() && !is_valid_website(value) {
        errors.push(FieldError::new(
            field,
            "Website must start with http:// or https://",
        ));
    }
}
