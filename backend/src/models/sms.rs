use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const MAX_SMS_LENGTH: usize = 160;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipientType {
    AllStudents,
    AllEmployees,
    SpecificClass,
    SpecificStudent,
    SpecificEmployee,
}

impl RecipientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientType::AllStudents => "allStudents",
            RecipientType::AllEmployees => "allEmployees",
            RecipientType::SpecificClass => "specificClass",
            RecipientType::SpecificStudent => "specificStudent",
            RecipientType::SpecificEmployee => "specificEmployee",
        }
    }
}

impl FromStr for RecipientType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allStudents" => Ok(RecipientType::AllStudents),
            "allEmployees" => Ok(RecipientType::AllEmployees),
            "specificClass" => Ok(RecipientType::SpecificClass),
            "specificStudent" => Ok(RecipientType::SpecificStudent),
            "specificEmployee" => Ok(RecipientType::SpecificEmployee),
            other => Err(format!("Invalid recipient type: {}", other)),
        }
    }
}

impl fmt::Display for RecipientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Sent,
    Failed,
    Pending,
}

impl SmsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsStatus::Sent => "sent",
            SmsStatus::Failed => "failed",
            SmsStatus::Pending => "pending",
        }
    }
}

impl FromStr for SmsStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sent" => Ok(SmsStatus::Sent),
            "failed" => Ok(SmsStatus::Failed),
            "pending" => Ok(SmsStatus::Pending),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SmsRecord {
    pub id: Uuid,
    pub recipient_type: String,
    pub recipient_name: String,
    pub recipient_count: i32,
    pub message: String,
    pub status: String,
    pub created_by: Uuid,
    pub class_id: Option<Uuid>,
    pub student_ids: Vec<Uuid>,
    pub employee_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub const SMS_COLUMNS: &str = "id, recipient_type, recipient_name, recipient_count, message, \
     status, created_by, class_id, student_ids, employee_ids, created_at";
