use log::info;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::class::{ClassRecord, CLASS_COLUMNS};
use crate::models::employee::EmployeeContact;
use crate::models::sms::{RecipientType, SmsStatus, MAX_SMS_LENGTH};
use crate::models::student::StudentContact;
use crate::responses::FieldError;
use crate::validation::parse_id;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    pub recipient_type: Option<String>,
    #[serde(default)]
    pub message: String,
    pub class_id: Option<String>,
    pub student_id: Option<String>,
    pub employee_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    AllStudents,
    AllEmployees,
    Class(Uuid),
    Student(Uuid),
    Employee(Uuid),
}

impl Target {
    pub fn recipient_type(&self) -> RecipientType {
        match self {
            Target::AllStudents => RecipientType::AllStudents,
            Target::AllEmployees => RecipientType::AllEmployees,
            Target::Class(_) => RecipientType::SpecificClass,
            Target::Student(_) => RecipientType::SpecificStudent,
            Target::Employee(_) => RecipientType::SpecificEmployee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub target: Target,
    pub message: String,
}

fn required_id(
    errors: &mut Vec<FieldError>,
    field: &str,
    raw: Option<&str>,
    label: &str,
) -> Option<Uuid> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => {
            errors.push(FieldError::new(field, format!("{} is required", label)));
            None
        }
        Some(value) => {
            let parsed = parse_id(value);
            if parsed.is_none() {
                errors.push(FieldError::new(field, format!("Invalid {}", label.to_lowercase())));
            }
            parsed
        }
    }
}

/// Checks the message and picks the audience, before anything is looked up.
pub fn parse_send_request(req: &SendSmsRequest) -> Result<SendPlan, Vec<FieldError>> {
    let mut errors = Vec::new();

    let message = req.message.trim().to_string();
    if message.is_empty() {
        errors.push(FieldError::new("message", "Message is required"));
    } else if message.chars().count() > MAX_SMS_LENGTH {
        errors.push(FieldError::new(
            "message",
            format!("Message cannot exceed {} characters", MAX_SMS_LENGTH),
        ));
    }

    let recipient_type = match req.recipient_type.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push(FieldError::new("recipientType", "Recipient type is required"));
            None
        }
        Some(raw) => match raw.parse::<RecipientType>() {
            Ok(kind) => Some(kind),
            Err(message) => {
                errors.push(FieldError::new("recipientType", message));
                None
            }
        },
    };

    let target = recipient_type.and_then(|kind| match kind {
        RecipientType::AllStudents => Some(Target::AllStudents),
        RecipientType::AllEmployees => Some(Target::AllEmployees),
        RecipientType::SpecificClass => {
            required_id(&mut errors, "classId", req.class_id.as_deref(), "Class id").map(Target::Class)
        }
        RecipientType::SpecificStudent => {
            required_id(&mut errors, "studentId", req.student_id.as_deref(), "Student id")
                .map(Target::Student)
        }
        RecipientType::SpecificEmployee => {
            required_id(&mut errors, "employeeId", req.employee_id.as_deref(), "Employee id")
                .map(Target::Employee)
        }
    });

    match target {
        Some(target) if errors.is_empty() => Ok(SendPlan { target, message }),
        _ => Err(errors),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub recipient_type: RecipientType,
    pub label: String,
    pub phones: Vec<String>,
    pub class_id: Option<Uuid>,
    pub student_ids: Vec<Uuid>,
    pub employee_ids: Vec<Uuid>,
}

/// Recipient count as stored, or `None` when it does not fit the column.
pub fn recipient_count(len: usize) -> Option<i32> {
    i32::try_from(len).ok()
}

#[derive(Debug)]
pub enum ResolveError {
    NotFound(&'static str),
    MissingPhone(String),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ResolveError {
    fn from(err: sqlx::Error) -> Self {
        ResolveError::Database(err)
    }
}

fn usable_phone(phone: &Option<String>) -> Option<String> {
    phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

fn from_students(
    recipient_type: RecipientType,
    label: String,
    class_id: Option<Uuid>,
    students: Vec<StudentContact>,
) -> Resolved {
    let (student_ids, phones): (Vec<Uuid>, Vec<String>) = students
        .iter()
        .filter_map(|s| usable_phone(&s.phone).map(|phone| (s.id, phone)))
        .unzip();

    Resolved {
        recipient_type,
        label,
        phones,
        class_id,
        student_ids,
        employee_ids: Vec::new(),
    }
}

fn from_employees(
    recipient_type: RecipientType,
    label: String,
    employees: Vec<EmployeeContact>,
) -> Resolved {
    let (employee_ids, phones): (Vec<Uuid>, Vec<String>) = employees
        .iter()
        .filter_map(|e| usable_phone(&e.phone).map(|phone| (e.id, phone)))
        .unzip();

    Resolved {
        recipient_type,
        label,
        phones,
        class_id: None,
        student_ids: Vec::new(),
        employee_ids,
    }
}

const STUDENT_CONTACT_COLUMNS: &str = "id, name, select_class, section, phone";
const EMPLOYEE_CONTACT_COLUMNS: &str = "id, name, designation, phone";

pub async fn resolve_recipients(db: &PgPool, target: Target) -> Result<Resolved, ResolveError> {
    let kind = target.recipient_type();

    match target {
        Target::AllStudents => {
            let students = sqlx::query_as::<_, StudentContact>(&format!(
                "SELECT {} FROM students
                 WHERE status = 'active' AND phone IS NOT NULL AND TRIM(phone) <> ''
                 ORDER BY name",
                STUDENT_CONTACT_COLUMNS
            ))
            .fetch_all(db)
            .await?;

            Ok(from_students(kind, "All Students".to_string(), None, students))
        }
        Target::AllEmployees => {
            let employees = sqlx::query_as::<_, EmployeeContact>(&format!(
                "SELECT {} FROM employees
                 WHERE status = 'active' AND phone IS NOT NULL AND TRIM(phone) <> ''
                 ORDER BY name",
                EMPLOYEE_CONTACT_COLUMNS
            ))
            .fetch_all(db)
            .await?;

            Ok(from_employees(kind, "All Employees".to_string(), employees))
        }
        Target::Class(class_id) => {
            let class = sqlx::query_as::<_, ClassRecord>(&format!(
                "SELECT {} FROM classes WHERE id = $1",
                CLASS_COLUMNS
            ))
            .bind(class_id)
            .fetch_optional(db)
            .await?
            .ok_or(ResolveError::NotFound("Class not found"))?;

            let students = sqlx::query_as::<_, StudentContact>(&format!(
                "SELECT {} FROM students
                 WHERE select_class = $1 AND status = 'active'
                   AND phone IS NOT NULL AND TRIM(phone) <> ''
                 ORDER BY name",
                STUDENT_CONTACT_COLUMNS
            ))
            .bind(class.label())
            .fetch_all(db)
            .await?;

            let label = format!("Class {} ({})", class.name.trim(), class.normalized_section());
            Ok(from_students(kind, label, Some(class_id), students))
        }
        Target::Student(student_id) => {
            let student = sqlx::query_as::<_, StudentContact>(&format!(
                "SELECT {} FROM students WHERE id = $1",
                STUDENT_CONTACT_COLUMNS
            ))
            .bind(student_id)
            .fetch_optional(db)
            .await?
            .ok_or(ResolveError::NotFound("Student not found"))?;

            if usable_phone(&student.phone).is_none() {
                return Err(ResolveError::MissingPhone(format!(
                    "Student {} does not have a phone number",
                    student.name
                )));
            }

            let label = student.name.clone();
            Ok(from_students(kind, label, None, vec![student]))
        }
        Target::Employee(employee_id) => {
            let employee = sqlx::query_as::<_, EmployeeContact>(&format!(
                "SELECT {} FROM employees WHERE id = $1",
                EMPLOYEE_CONTACT_COLUMNS
            ))
            .bind(employee_id)
            .fetch_optional(db)
            .await?
            .ok_or(ResolveError::NotFound("Employee not found"))?;

            if usable_phone(&employee.phone).is_none() {
                return Err(ResolveError::MissingPhone(format!(
                    "Employee {} does not have a phone number",
                    employee.name
                )));
            }

            let label = employee.name.clone();
            Ok(from_employees(kind, label, vec![employee]))
        }
    }
}

/// No gateway is wired in; every resolved message counts as sent.
pub fn simulate_delivery(resolved: &Resolved, message: &str) -> SmsStatus {
    info!(
        "Simulated SMS to {} recipient(s) [{}], {} chars",
        resolved.phones.len(),
        resolved.label,
        message.chars().count()
    );
    SmsStatus::Sent
}
