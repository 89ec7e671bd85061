use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::student::StudentSummary;

#[derive(Debug, Clone, FromRow)]
pub struct SkillRatingRow {
    pub student_id: Uuid,
    pub ratings: serde_json::Value,
    pub last_rated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithRatings {
    #[serde(flatten)]
    pub student: StudentSummary,
    pub ratings: serde_json::Value,
    pub last_rated: Option<DateTime<Utc>>,
}
