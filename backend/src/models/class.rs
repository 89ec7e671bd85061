use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: Uuid,
    pub name: String,
    pub section: String,
    pub teacher_id: Option<Uuid>,
    pub teacher_name: Option<String>,
    pub student_ids: Vec<String>,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const CLASS_COLUMNS: &str =
    "id, name, section, teacher_id, teacher_name, student_ids, subject, created_at";

impl ClassRecord {
    /// Blank and `N/A` sections mean the default section `A`.
    pub fn normalized_section(&self) -> String {
        normalize_section(&self.section)
    }

    pub fn label(&self) -> String {
        class_label(&self.name)
    }

    pub fn is_owned_by(&self, teacher_id: Uuid, teacher_name: Option<&str>) -> bool {
        if self.teacher_id == Some(teacher_id) {
            return true;
        }

        match (self.teacher_name.as_deref(), teacher_name) {
            (Some(owner), Some(name)) => {
                let owner = owner.trim();
                !owner.is_empty() && owner.to_lowercase() == name.trim().to_lowercase()
            }
            _ => false,
        }
    }
}

pub fn normalize_section(section: &str) -> String {
    let trimmed = section.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
        "A".to_string()
    } else {
        trimmed.to_string()
    }
}

/// First run of ASCII digits in the class name, or the trimmed name when it has none.
pub fn class_label(name: &str) -> String {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.is_empty() {
        name.trim().to_string()
    } else {
        digits
    }
}
