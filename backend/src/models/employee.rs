use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeContact {
    pub id: Uuid,
    pub name: String,
    pub designation: Option<String>,
    pub phone: Option<String>,
}
