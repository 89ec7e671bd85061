use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeItem {
    pub label: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeesParticulars {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub items: Json<Vec<FeeItem>>,
    pub updated_at: DateTime<Utc>,
}

pub fn default_fee_items() -> Vec<FeeItem> {
    [
        "Monthly Tuition Fee",
        "Admission Fee",
        "Registration Fee",
        "Art Material",
        "Transport",
        "Books",
        "Uniform",
        "Fine",
        "Others",
    ]
    .iter()
    .map(|label| FeeItem {
        label: label.to_string(),
        amount: 0.0,
    })
    .collect()
}
