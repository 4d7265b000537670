use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Declares a lowercase string enum stored as TEXT in Postgres.
macro_rules! text_enum {
    ($name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(AppError::Invalid(format!(
                        concat!("unknown ", $label, " '{}'"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(Role, "role" {
    Admin => "admin",
    Teacher => "teacher",
    Student => "student",
});

impl Role {
    /// Admins and teachers may record marks, attendance and assessments.
    pub fn can_record(self) -> bool {
        matches!(self, Role::Admin | Role::Teacher)
    }
}

text_enum!(AttendanceStatus, "attendance status" {
    Present => "present",
    Absent => "absent",
    Late => "late",
    Excused => "excused",
});

text_enum!(AssessmentType, "assessment type" {
    Assignment => "assignment",
    Project => "project",
    Quiz => "quiz",
    Lab => "lab",
    Presentation => "presentation",
});

text_enum!(SubmissionStatus, "submission status" {
    Pending => "pending",
    Submitted => "submitted",
    Graded => "graded",
    Late => "late",
});

text_enum!(NotificationKind, "notification type" {
    Info => "info",
    Warning => "warning",
    Success => "success",
    Danger => "danger",
});

/// One mark as seen by the aggregation core.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub subject_name: String,
    pub obtained_score: f64,
    pub max_score: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub subject_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub max_marks: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassRoom {
    pub id: Uuid,
    pub name: String,
    pub section: String,
    pub academic_year: String,
}

impl ClassRoom {
    pub fn label(&self) -> String {
        format!("{}-{} ({})", self.name, self.section, self.academic_year)
    }
}

/// A mark row joined with its student, subject and exam type.
#[derive(Debug, Clone, Serialize)]
pub struct MarkRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub subject_name: String,
    pub subject_code: String,
    pub exam_type: String,
    pub marks_obtained: f64,
    pub max_marks: f64,
    pub date: NaiveDate,
    pub remarks: String,
}

impl MarkRow {
    pub fn score(&self) -> ScoreRecord {
        ScoreRecord {
            subject_name: self.subject_name.clone(),
            obtained_score: self.marks_obtained,
            max_score: self.max_marks,
            date: self.date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub subject_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub note: String,
}

impl AttendanceRow {
    pub fn record(&self) -> AttendanceRecord {
        AttendanceRecord {
            subject_name: self.subject_name.clone(),
            date: self.date,
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub id: Uuid,
    pub title: String,
    pub assessment_type: AssessmentType,
    pub subject_name: String,
    pub classroom: String,
    pub max_score: i32,
    pub due_date: NaiveDate,
    pub description: String,
    pub submission_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: Uuid,
    pub assessment_title: String,
    pub subject_name: String,
    pub student_name: String,
    pub max_score: i32,
    pub score: Option<f64>,
    pub status: SubmissionStatus,
    pub feedback: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub is_read: bool,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchoolCounts {
    pub total_students: i64,
    pub total_teachers: i64,
    pub total_subjects: i64,
    pub total_classes: i64,
}

/// Account registration input. Students carry a roll number and may be
/// enrolled in a classroom straight away.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub roll_number: Option<String>,
    pub classroom_id: Option<Uuid>,
}

/// Input for a single mark entry.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMark {
    pub student: String,
    pub subject_code: String,
    pub exam_type: String,
    pub marks_obtained: f64,
    pub date: NaiveDate,
    #[serde(default)]
    pub remarks: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendance {
    pub student: String,
    pub subject_code: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub title: String,
    pub assessment_type: AssessmentType,
    pub subject_code: String,
    pub classroom_id: Uuid,
    pub max_score: i32,
    pub due_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SubmissionGrade {
    pub score: Option<f64>,
    pub feedback: String,
    pub status: SubmissionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_enums_case_insensitively() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" present ".parse::<AttendanceStatus>().unwrap(), AttendanceStatus::Present);
        assert_eq!("LAB".parse::<AssessmentType>().unwrap(), AssessmentType::Lab);
    }

    #[test]
    fn rejects_unknown_values() {
        let err = "janitor".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "invalid input: unknown role 'janitor'");
    }

    #[test]
    fn only_staff_can_record() {
        assert!(Role::Admin.can_record());
        assert!(Role::Teacher.can_record());
        assert!(!Role::Student.can_record());
    }

    #[test]
    fn classroom_label_matches_section_format() {
        let room = ClassRoom {
            id: Uuid::nil(),
            name: "12th Grade".to_string(),
            section: "A".to_string(),
            academic_year: "2024-2025".to_string(),
        };
        assert_eq!(room.label(), "12th Grade-A (2024-2025)");
    }
}
