use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: Uuid,
    pub name: String,
    pub roll_number: Option<String>,
    pub select_class: String,
    pub section: String,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentContact {
    pub id: Uuid,
    pub name: String,
    pub select_class: String,
    pub section: String,
    pub phone: Option<String>,
}
