//! Which students belong to a class.
//!
//! A class's explicit `student_ids` list is authoritative whenever it holds at
//! least one well-formed id. Older classes were created without a roster, so
//! for those the students are matched by class label and section instead.

use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::class::ClassRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterSource {
    Explicit(Vec<Uuid>),
    Fallback { class_label: String, section: String },
}

impl RosterSource {
    pub fn for_class(class: &ClassRecord) -> Self {
        let explicit = well_formed_ids(&class.student_ids);
        if !explicit.is_empty() {
            return RosterSource::Explicit(explicit);
        }

        RosterSource::Fallback {
            class_label: class.label(),
            section: class.normalized_section(),
        }
    }
}

/// Parses the stored ids, dropping malformed entries and duplicates while keeping order.
pub fn well_formed_ids(raw: &[String]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|id| Uuid::parse_str(id.trim()).ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

pub async fn resolve_roster(db: &PgPool, class: &ClassRecord) -> Result<Vec<Uuid>, sqlx::Error> {
    match RosterSource::for_class(class) {
        RosterSource::Explicit(ids) => Ok(ids),
        RosterSource::Fallback {
            class_label,
            section,
        } => {
            sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM students
                 WHERE select_class = $1 AND LOWER(TRIM(section)) = LOWER($2)
                 ORDER BY name",
            )
            .bind(&class_label)
            .bind(&section)
            .fetch_all(db)
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn class(name: &str, section: &str, student_ids: Vec<String>) -> ClassRecord {
        ClassRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            section: section.to_string(),
            teacher_id: None,
            teacher_name: None,
            student_ids,
            subject: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn explicit_list_is_authoritative() {
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let record = class("Class 7", "B", vec![s1.to_string(), s2.to_string()]);

        assert_eq!(
            RosterSource::for_class(&record),
            RosterSource::Explicit(vec![s1, s2])
        );
    }

    #[test]
    fn malformed_and_duplicate_ids_are_dropped() {
        let s1 = Uuid::new_v4();
        let ids = vec![
            "legacy-42".to_string(),
            s1.to_string(),
            String::new(),
            format!(" {} ", s1),
        ];

        assert_eq!(well_formed_ids(&ids), vec![s1]);
    }

    #[test]
    fn only_malformed_ids_fall_back_to_label_match() {
        let record = class("Class 4 Blue", "N/A", vec!["0".to_string(), "abc".to_string()]);

        assert_eq!(
            RosterSource::for_class(&record),
            RosterSource::Fallback {
                class_label: "4".to_string(),
                section: "A".to_string(),
            }
        );
    }

    #[test]
    fn fallback_keeps_real_section_and_non_numeric_names() {
        let record = class(" Playgroup ", "c", Vec::new());

        assert_eq!(
            RosterSource::for_class(&record),
            RosterSource::Fallback {
                class_label: "Playgroup".to_string(),
                section: "c".to_string(),
            }
        );
    }
}
