use std::fmt::Write;

use crate::aggregate::submission_percentage;
use crate::dashboard::{StudentDetail, SubjectReport};
use crate::grading::grade_for;

pub fn build_student_report(detail: &StudentDetail) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Student Report: {}", detail.student.full_name);
    let _ = writeln!(
        output,
        "Overall average {:.1}% ({}), attendance {:.1}%",
        detail.overall_avg,
        grade_for(detail.overall_avg),
        detail.att_pct
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subjects");

    if detail.subject_analysis.is_empty() {
        let _ = writeln!(output, "No marks recorded yet.");
    } else {
        for (subject, stats) in detail.subject_analysis.iter() {
            let _ = writeln!(
                output,
                "- {}: avg {:.1}% (best {:.1}%, lowest {:.1}%) latest grade {} across {} marks",
                subject, stats.avg, stats.max, stats.min, stats.grade, stats.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance");

    if detail.att_analysis.is_empty() {
        let _ = writeln!(output, "No attendance recorded yet.");
    } else {
        for (subject, tally) in detail.att_analysis.iter() {
            let _ = writeln!(
                output,
                "- {}: {} of {} present ({:.1}%)",
                subject,
                tally.present,
                tally.total,
                tally.rate()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suggestions");
    for suggestion in &detail.suggestions {
        let _ = writeln!(
            output,
            "- [{}] {}: {}",
            suggestion.severity, suggestion.title, suggestion.text
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Score Trend");

    if detail.trend_data.is_empty() {
        let _ = writeln!(output, "No marks recorded yet.");
    } else {
        for point in &detail.trend_data {
            let _ = writeln!(output, "- {} {}: {:.2}%", point.date, point.subject, point.pct);
        }
    }

    if !detail.submissions.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Submissions");
        for submission in &detail.submissions {
            let _ = writeln!(
                output,
                "- {} ({}): {} {:.2}%",
                submission.assessment_title,
                submission.subject_name,
                submission.status,
                submission_percentage(submission.score, submission.max_score)
            );
        }
    }

    output
}

pub fn build_subject_report(report: &SubjectReport) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "# Subject Report: {} ({})",
        report.subject.name, report.subject.code
    );
    let _ = writeln!(output, "Overall average {:.1}%", report.overall_avg);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Grade Distribution");

    if report.grade_dist.total() == 0 {
        let _ = writeln!(output, "No marks recorded for this subject.");
    } else {
        for (grade, count) in report.grade_dist.iter() {
            let _ = writeln!(output, "- {grade}: {count}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Student Averages");

    if report.student_summary.is_empty() {
        let _ = writeln!(output, "No students with marks in this subject.");
    } else {
        for entry in &report.student_summary {
            let _ = writeln!(output, "- {}: {:.1}%", entry.name, entry.avg);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Marks");

    if report.marks.is_empty() {
        let _ = writeln!(output, "No marks recorded for this subject.");
    } else {
        for mark in &report.marks {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}/{}",
                mark.student_name, mark.exam_type, mark.date, mark.marks_obtained, mark.max_marks
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{student_detail, subject_report};
    use crate::models::{MarkRow, Role, Subject, User};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn arjun() -> User {
        User {
            id: Uuid::from_u128(7),
            username: "student1".to_string(),
            full_name: "Arjun Patel".to_string(),
            email: "arjun@ps10.edu".to_string(),
            role: Role::Student,
        }
    }

    fn mark(student: &User, obtained: f64, day: u32) -> MarkRow {
        MarkRow {
            id: Uuid::new_v4(),
            student_id: student.id,
            student_name: student.full_name.clone(),
            subject_name: "Physics".to_string(),
            subject_code: "PHY102".to_string(),
            exam_type: "Unit Test 1".to_string(),
            marks_obtained: obtained,
            max_marks: 100.0,
            date: NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            remarks: String::new(),
        }
    }

    #[test]
    fn student_report_lists_sections() {
        let student = arjun();
        let marks = vec![mark(&student, 42.0, 4), mark(&student, 38.0, 1)];
        let detail = student_detail(student, &marks, &[], Vec::new());
        let report = build_student_report(&detail);

        assert!(report.starts_with("# Student Report: Arjun Patel\n"));
        assert!(report.contains("Overall average 40.0% (D), attendance 0.0%"));
        assert!(report.contains("- Physics: avg 40.0% (best 42.0%, lowest 38.0%) latest grade D across 2 marks"));
        assert!(report.contains("No attendance recorded yet."));
        assert!(report.contains("- [danger] Critical Attendance:"));
        assert!(report.contains("- [danger] Focus on Physics:"));
        assert!(report.contains("- 2024-02-01 Physics: 38.00%"));
        assert!(!report.contains("## Submissions"));
    }

    #[test]
    fn empty_subject_report_reads_cleanly() {
        let subject = Subject {
            id: Uuid::nil(),
            name: "English".to_string(),
            code: "ENG105".to_string(),
            max_marks: 100,
        };
        let report = build_subject_report(&subject_report(subject, &[]));
        assert!(report.contains("# Subject Report: English (ENG105)"));
        assert!(report.contains("Overall average 0.0%"));
        assert!(report.contains("No students with marks in this subject."));
    }

    #[test]
    fn subject_report_lists_every_grade() {
        let student = arjun();
        let subject = Subject {
            id: Uuid::nil(),
            name: "Physics".to_string(),
            code: "PHY102".to_string(),
            max_marks: 100,
        };
        let report = build_subject_report(&subject_report(subject, &[mark(&student, 81.0, 3)]));
        assert!(report.contains("- A+: 0\n- A: 1\n- B+: 0"));
        assert!(report.contains("- Arjun Patel: 81.0%"));
        assert!(report.contains("- Arjun Patel (Unit Test 1) on 2024-02-03: 81/100"));
    }
}
