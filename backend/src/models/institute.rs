use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_INSTITUTE_NAME: &str = "My Institute";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InstituteProfile {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub name: String,
    pub tagline: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub address: String,
    pub country: String,
    #[serde(skip_serializing)]
    pub logo_key: Option<String>,
    pub logo_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const PROFILE_COLUMNS: &str = "id, admin_id, name, tagline, phone, email, website, address, \
     country, logo_key, logo_url, updated_at";
