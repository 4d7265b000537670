use std::fmt;

use serde::Serialize;

use crate::aggregate::SubjectMap;

pub const MAX_SUGGESTIONS: usize = 4;

const CRITICAL_ATTENDANCE: f64 = 75.0;
const TARGET_ATTENDANCE: f64 = 85.0;
const STRUGGLING_AVERAGE: f64 = 50.0;
const EXCELLENT_AVERAGE: f64 = 90.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory message shown on student dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub severity: Severity,
    #[serde(rename = "icon")]
    pub icon_hint: String,
    pub title: String,
    pub text: String,
}

impl Suggestion {
    fn new(severity: Severity, icon_hint: &str, title: String, text: String) -> Self {
        Self {
            severity,
            icon_hint: icon_hint.to_string(),
            title,
            text,
        }
    }
}

fn attendance_suggestion(attendance_rate: f64) -> Option<Suggestion> {
    if attendance_rate < CRITICAL_ATTENDANCE {
        Some(Suggestion::new(
            Severity::Danger,
            "exclamation-triangle",
            "Critical Attendance".to_string(),
            format!(
                "Your attendance is {attendance_rate:.1}%, which is below 75%. You may be barred from exams."
            ),
        ))
    } else if attendance_rate < TARGET_ATTENDANCE {
        Some(Suggestion::new(
            Severity::Warning,
            "calendar-x",
            "Improve Attendance".to_string(),
            format!(
                "Your attendance is {attendance_rate:.1}%. Aim for at least 85% for better performance."
            ),
        ))
    } else {
        None
    }
}

fn subject_suggestion(subject: &str, average: f64) -> Option<Suggestion> {
    if average < STRUGGLING_AVERAGE {
        Some(Suggestion::new(
            Severity::Danger,
            "book-x",
            format!("Focus on {subject}"),
            format!(
                "Your average in {subject} is {average:.1}%. Consider extra study or seeking help."
            ),
        ))
    } else if average >= EXCELLENT_AVERAGE {
        Some(Suggestion::new(
            Severity::Success,
            "star",
            format!("Excellent in {subject}"),
            format!("Great work! Your {subject} average is {average:.1}%. Keep it up!"),
        ))
    } else {
        None
    }
}

/// Applies the attendance rule, then the per-subject rule in map order,
/// falls back to a single "Good Progress" note, and caps the result.
pub fn generate_suggestions(averages: &SubjectMap<f64>, attendance_rate: f64) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = attendance_suggestion(attendance_rate)
        .into_iter()
        .chain(
            averages
                .iter()
                .filter_map(|(subject, average)| subject_suggestion(subject, *average)),
        )
        .collect();

    if suggestions.is_empty() {
        suggestions.push(Suggestion::new(
            Severity::Info,
            "check-circle",
            "Good Progress".to_string(),
            "You are performing well. Maintain consistency to achieve top grades.".to_string(),
        ));
    }

    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}
