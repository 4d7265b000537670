use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::aggregate::{
    self, attendance_tally, attendance_tally_by_subject, rank_by_average, round_to, AttendanceTally,
    SubjectMap, SubjectStats, TrendPoint,
};
use crate::db::{self, AssessmentScope, AttendanceFilter, MarkFilter, MarkOrder, SubmissionFilter};
use crate::error::AppError;
use crate::grading::{grade_distribution, GradeDistribution};
use crate::models::{
    Assessment, AttendanceRecord, AttendanceRow, ClassRoom, MarkRow, Role, SchoolCounts,
    ScoreRecord, Subject, Submission, SubmissionStatus, User,
};
use crate::suggest::{generate_suggestions, Suggestion};

pub const DASHBOARD_TREND_LIMIT: usize = 12;
pub const DETAIL_TREND_LIMIT: usize = 20;
const RECENT_MARKS: usize = 10;
const STUDENT_RECENT_MARKS: usize = 5;
const TOP_PERFORMERS: usize = 5;
const ATTENDANCE_WINDOW_DAYS: i64 = 7;

fn scores(marks: &[MarkRow]) -> Vec<ScoreRecord> {
    marks.iter().map(MarkRow::score).collect()
}

fn attendance_records(rows: &[AttendanceRow]) -> Vec<AttendanceRecord> {
    rows.iter().map(AttendanceRow::record).collect()
}

/// `{name, avg}` pair used by subject and class performance charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedAverage {
    pub name: String,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectAttendance {
    pub subject: String,
    pub pct: f64,
}

/// Averages each student's marks, one decimal, in first-seen order.
/// Students without marks do not appear.
pub fn student_averages(marks: &[MarkRow]) -> Vec<(Uuid, String, f64)> {
    let mut groups: Vec<(Uuid, String, Vec<ScoreRecord>)> = Vec::new();
    for mark in marks {
        match groups.iter_mut().find(|(id, _, _)| *id == mark.student_id) {
            Some(group) => group.2.push(mark.score()),
            None => groups.push((mark.student_id, mark.student_name.clone(), vec![mark.score()])),
        }
    }
    groups
        .into_iter()
        .map(|(id, name, records)| (id, name, round_to(aggregate::overall_average(&records), 1)))
        .collect()
}

/// Class performance chart rows for the given students, in roster order.
pub fn class_performance(students: &[User], marks: &[MarkRow]) -> Vec<NamedAverage> {
    let averages = student_averages(marks);
    students
        .iter()
        .filter_map(|student| {
            averages
                .iter()
                .find(|(id, _, _)| *id == student.id)
                .map(|(_, _, avg)| NamedAverage {
                    name: student.full_name.clone(),
                    avg: *avg,
                })
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    #[serde(flatten)]
    pub counts: SchoolCounts,
    pub grade_dist: GradeDistribution,
    pub subject_avgs: Vec<NamedAverage>,
    pub att_rate: f64,
    pub top_students: Vec<NamedAverage>,
    pub recent_marks: Vec<MarkRow>,
}

/// `marks` newest first; `recent_attendance` already limited to the window.
pub fn admin_dashboard(
    counts: SchoolCounts,
    subjects: &[Subject],
    marks: &[MarkRow],
    recent_attendance: &[AttendanceRecord],
) -> AdminDashboard {
    let records = scores(marks);
    let per_subject = aggregate::per_subject_average(&records);
    let subject_avgs = subjects
        .iter()
        .filter_map(|subject| {
            per_subject.get(&subject.name).map(|avg| NamedAverage {
                name: subject.name.clone(),
                avg: round_to(*avg, 1),
            })
        })
        .collect();

    let ranked = rank_by_average(
        student_averages(marks)
            .into_iter()
            .map(|(_, name, avg)| (name, avg))
            .collect(),
        TOP_PERFORMERS,
    );

    AdminDashboard {
        counts,
        grade_dist: grade_distribution(records.iter().map(aggregate::percentage)),
        subject_avgs,
        att_rate: aggregate::attendance_rate(recent_attendance),
        top_students: ranked
            .into_iter()
            .map(|(name, avg)| NamedAverage { name, avg })
            .collect(),
        recent_marks: marks.iter().take(RECENT_MARKS).cloned().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectLoad {
    pub name: String,
    pub avg: f64,
    pub students: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherDashboard {
    pub subjects: Vec<Subject>,
    pub classes: Vec<ClassRoom>,
    pub student_count: i64,
    pub recent_marks: Vec<MarkRow>,
    pub subject_data: Vec<SubjectLoad>,
    pub pending_assessments: Vec<Assessment>,
}

/// Per taught subject: average percentage and how many distinct students
/// have marks. Subjects without marks report zero.
pub fn subject_loads(subjects: &[Subject], marks: &[MarkRow]) -> Vec<SubjectLoad> {
    subjects
        .iter()
        .map(|subject| {
            let subject_marks: Vec<&MarkRow> = marks
                .iter()
                .filter(|mark| mark.subject_code == subject.code)
                .collect();
            let records: Vec<ScoreRecord> = subject_marks.iter().map(|mark| mark.score()).collect();
            let mut students: Vec<Uuid> = subject_marks.iter().map(|mark| mark.student_id).collect();
            students.sort_unstable();
            students.dedup();
            SubjectLoad {
                name: subject.name.clone(),
                avg: round_to(aggregate::overall_average(&records), 1),
                students: students.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDashboard {
    pub overall_avg: f64,
    pub att_pct: f64,
    pub total_att: usize,
    pub present_att: usize,
    pub subject_chart: Vec<SubjectAverage>,
    pub att_by_subject: Vec<SubjectAttendance>,
    pub trend_data: Vec<TrendPoint>,
    pub recent_marks: Vec<MarkRow>,
    pub pending_submissions: Vec<Submission>,
    pub suggestions: Vec<Suggestion>,
}

/// `marks` must be newest first: suggestion order follows the order in
/// which subjects first appear.
pub fn student_dashboard(
    marks: &[MarkRow],
    attendance: &[AttendanceRow],
    pending_submissions: Vec<Submission>,
) -> StudentDashboard {
    let records = scores(marks);
    let attendance = attendance_records(attendance);
    let tally = attendance_tally(&attendance);
    let per_subject = aggregate::per_subject_average(&records);

    StudentDashboard {
        overall_avg: round_to(aggregate::overall_average(&records), 1),
        att_pct: tally.rate(),
        total_att: tally.total,
        present_att: tally.present,
        subject_chart: per_subject
            .iter()
            .map(|(subject, avg)| SubjectAverage {
                subject: subject.to_string(),
                avg: round_to(*avg, 1),
            })
            .collect(),
        att_by_subject: aggregate::attendance_rate_by_subject(&attendance)
            .iter()
            .map(|(subject, pct)| SubjectAttendance {
                subject: subject.to_string(),
                pct: *pct,
            })
            .collect(),
        trend_data: aggregate::trend_series(&records, DASHBOARD_TREND_LIMIT),
        recent_marks: marks.iter().take(STUDENT_RECENT_MARKS).cloned().collect(),
        pending_submissions,
        suggestions: generate_suggestions(&per_subject, tally.rate()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentSummary {
    pub student: User,
    pub avg: f64,
    pub att_pct: f64,
}

pub fn student_summaries(
    students: Vec<User>,
    marks: &[MarkRow],
    attendance: &[AttendanceRow],
) -> Vec<StudentSummary> {
    students
        .into_iter()
        .map(|student| {
            let records: Vec<ScoreRecord> = marks
                .iter()
                .filter(|mark| mark.student_id == student.id)
                .map(MarkRow::score)
                .collect();
            let present: Vec<AttendanceRecord> = attendance
                .iter()
                .filter(|row| row.student_id == student.id)
                .map(AttendanceRow::record)
                .collect();
            StudentSummary {
                avg: round_to(aggregate::overall_average(&records), 1),
                att_pct: aggregate::attendance_rate(&present),
                student,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDetail {
    pub student: User,
    pub overall_avg: f64,
    pub att_pct: f64,
    pub subject_analysis: SubjectMap<SubjectStats>,
    pub att_analysis: SubjectMap<AttendanceTally>,
    pub trend_data: Vec<TrendPoint>,
    pub marks: Vec<MarkRow>,
    pub attendance: Vec<AttendanceRow>,
    pub submissions: Vec<Submission>,
    pub suggestions: Vec<Suggestion>,
}

pub fn student_detail(
    student: User,
    marks: &[MarkRow],
    attendance: &[AttendanceRow],
    submissions: Vec<Submission>,
) -> StudentDetail {
    let records = scores(marks);
    let attendance_log = attendance_records(attendance);
    let att_pct = aggregate::attendance_rate(&attendance_log);

    StudentDetail {
        student,
        overall_avg: round_to(aggregate::overall_average(&records), 1),
        att_pct,
        subject_analysis: aggregate::subject_stats(&records),
        att_analysis: attendance_tally_by_subject(&attendance_log),
        trend_data: aggregate::trend_series(&records, DETAIL_TREND_LIMIT),
        marks: marks.iter().take(DETAIL_TREND_LIMIT).cloned().collect(),
        attendance: attendance.iter().take(DETAIL_TREND_LIMIT).cloned().collect(),
        submissions,
        suggestions: generate_suggestions(&aggregate::per_subject_average(&records), att_pct),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectReport {
    pub subject: Subject,
    pub grade_dist: GradeDistribution,
    pub student_summary: Vec<NamedAverage>,
    pub overall_avg: f64,
    pub marks: Vec<MarkRow>,
}

pub fn subject_report(subject: Subject, marks: &[MarkRow]) -> SubjectReport {
    let records = scores(marks);
    let ranked = rank_by_average(
        student_averages(marks)
            .into_iter()
            .map(|(_, name, avg)| (name, avg))
            .collect(),
        usize::MAX,
    );

    SubjectReport {
        subject,
        grade_dist: grade_distribution(records.iter().map(aggregate::percentage)),
        student_summary: ranked
            .into_iter()
            .map(|(name, avg)| NamedAverage { name, avg })
            .collect(),
        overall_avg: round_to(aggregate::overall_average(&records), 1),
        marks: marks.iter().take(DETAIL_TREND_LIMIT).cloned().collect(),
    }
}

/// Role-specific dashboard payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Dashboard {
    Admin(AdminDashboard),
    Teacher(TeacherDashboard),
    Student(StudentDashboard),
}

#[instrument(skip(pool, user), fields(user = %user.username, role = %user.role))]
pub async fn load_dashboard(pool: &PgPool, user: &User) -> Result<Dashboard, AppError> {
    let dashboard = match user.role {
        Role::Admin => {
            let counts = db::school_counts(pool).await?;
            let subjects = db::fetch_subjects(pool).await?;
            let marks = db::fetch_marks(pool, &MarkFilter::default(), MarkOrder::NewestFirst, None).await?;
            let window = AttendanceFilter {
                since: Some(aggregate::cutoff_date(ATTENDANCE_WINDOW_DAYS)),
                ..AttendanceFilter::default()
            };
            let attendance = db::fetch_attendance(pool, &window, None).await?;
            Dashboard::Admin(admin_dashboard(
                counts,
                &subjects,
                &marks,
                &attendance_records(&attendance),
            ))
        }
        Role::Teacher => {
            let subjects = db::fetch_teacher_subjects(pool, user.id).await?;
            let classes = db::fetch_teacher_classes(pool, user.id).await?;
            let class_ids: Vec<Uuid> = classes.iter().map(|class| class.id).collect();
            let student_count = db::count_students_in_classes(pool, &class_ids).await?;
            let recent_marks = db::fetch_marks(
                pool,
                &MarkFilter {
                    recorded_by: Some(user.id),
                    ..MarkFilter::default()
                },
                MarkOrder::RecentlyRecorded,
                Some(RECENT_MARKS as i64),
            )
            .await?;
            let subject_marks = db::fetch_marks(
                pool,
                &MarkFilter {
                    subject_ids: Some(subjects.iter().map(|subject| subject.id).collect()),
                    ..MarkFilter::default()
                },
                MarkOrder::NewestFirst,
                None,
            )
            .await?;
            let assessments =
                db::fetch_assessments(pool, AssessmentScope::CreatedBy(user.id), Some(5)).await?;

            Dashboard::Teacher(TeacherDashboard {
                subject_data: subject_loads(&subjects, &subject_marks),
                subjects,
                classes,
                student_count,
                recent_marks,
                pending_assessments: assessments,
            })
        }
        Role::Student => {
            let marks = db::fetch_marks(
                pool,
                &MarkFilter {
                    student_id: Some(user.id),
                    ..MarkFilter::default()
                },
                MarkOrder::NewestFirst,
                None,
            )
            .await?;
            let attendance = db::fetch_attendance(
                pool,
                &AttendanceFilter {
                    student_id: Some(user.id),
                    ..AttendanceFilter::default()
                },
                None,
            )
            .await?;
            let pending = db::fetch_submissions(
                pool,
                &SubmissionFilter {
                    student_id: Some(user.id),
                    statuses: Some(vec![SubmissionStatus::Pending, SubmissionStatus::Submitted]),
                    ..SubmissionFilter::default()
                },
                Some(5),
            )
            .await?;
            Dashboard::Student(student_dashboard(&marks, &attendance, pending))
        }
    };
    info!("dashboard assembled");
    Ok(dashboard)
}

/// Detail view of `student`, guarded so students can only see themselves.
pub async fn load_student_detail(
    pool: &PgPool,
    viewer: &User,
    student: User,
) -> Result<StudentDetail, AppError> {
    if student.role != Role::Student {
        return Err(AppError::NotFound(format!("student '{}'", student.username)));
    }
    if viewer.role == Role::Student && viewer.id != student.id {
        return Err(AppError::Forbidden("access denied".to_string()));
    }

    let marks = db::fetch_marks(
        pool,
        &MarkFilter {
            student_id: Some(student.id),
            ..MarkFilter::default()
        },
        MarkOrder::NewestFirst,
        None,
    )
    .await?;
    let attendance = db::fetch_attendance(
        pool,
        &AttendanceFilter {
            student_id: Some(student.id),
            ..AttendanceFilter::default()
        },
        None,
    )
    .await?;
    let submissions = db::fetch_submissions(
        pool,
        &SubmissionFilter {
            student_id: Some(student.id),
            ..SubmissionFilter::default()
        },
        None,
    )
    .await?;

    Ok(student_detail(student, &marks, &attendance, submissions))
}

/// Mark and attendance filters limited to the listed students.
fn roster_filters(students: &[User]) -> (MarkFilter, AttendanceFilter) {
    let ids: Vec<Uuid> = students.iter().map(|student| student.id).collect();
    (
        MarkFilter {
            student_ids: Some(ids.clone()),
            ..MarkFilter::default()
        },
        AttendanceFilter {
            student_ids: Some(ids),
            ..AttendanceFilter::default()
        },
    )
}

/// Students (optionally one classroom's) with their average and attendance.
pub async fn load_student_list(
    pool: &PgPool,
    viewer: &User,
    classroom_id: Option<Uuid>,
) -> Result<Vec<StudentSummary>, AppError> {
    if viewer.role == Role::Student {
        return Err(AppError::Forbidden("students cannot list other students".to_string()));
    }
    let students = db::fetch_students(pool, classroom_id).await?;
    let (mark_filter, attendance_filter) = roster_filters(&students);
    let marks = db::fetch_marks(pool, &mark_filter, MarkOrder::NewestFirst, None).await?;
    let attendance = db::fetch_attendance(pool, &attendance_filter, None).await?;
    Ok(student_summaries(students, &marks, &attendance))
}

pub async fn load_subject_report(pool: &PgPool, code: &str) -> Result<SubjectReport, AppError> {
    let subject = db::find_subject(pool, code).await?;
    let marks = db::fetch_marks(
        pool,
        &MarkFilter {
            subject_id: Some(subject.id),
            ..MarkFilter::default()
        },
        MarkOrder::NewestFirst,
        None,
    )
    .await?;
    Ok(subject_report(subject, &marks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::Grade;
    use crate::models::AttendanceStatus;
    use crate::suggest::Severity;
    use chrono::NaiveDate;

    fn student(n: u128, name: &str) -> User {
        User {
            id: Uuid::from_u128(n),
            username: format!("student{n}"),
            full_name: name.to_string(),
            email: format!("student{n}@ps10.edu"),
            role: Role::Student,
        }
    }

    fn mark(student: &User, subject: &str, obtained: f64, day: u32) -> MarkRow {
        MarkRow {
            id: Uuid::new_v4(),
            student_id: student.id,
            student_name: student.full_name.clone(),
            subject_name: subject.to_string(),
            subject_code: subject.to_uppercase(),
            exam_type: "Mid Term".to_string(),
            marks_obtained: obtained,
            max_marks: 100.0,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            remarks: String::new(),
        }
    }

    fn present(student: &User, subject: &str, status: AttendanceStatus, day: u32) -> AttendanceRow {
        AttendanceRow {
            id: Uuid::new_v4(),
            student_id: student.id,
            student_name: student.full_name.clone(),
            subject_name: subject.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            status,
            note: String::new(),
        }
    }

    fn subject(name: &str) -> Subject {
        Subject {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: name.to_uppercase(),
            max_marks: 100,
        }
    }

    #[test]
    fn roster_filters_limit_both_fetches() {
        let roster = vec![student(1, "Arjun Patel"), student(2, "Ananya Singh")];
        let (marks, attendance) = roster_filters(&roster);
        let expected = Some(vec![Uuid::from_u128(1), Uuid::from_u128(2)]);
        assert_eq!(marks.student_ids, expected);
        assert_eq!(attendance.student_ids, expected);
        assert_eq!(attendance.student_id, None);
        assert_eq!(attendance.since, None);
    }

    #[test]
    fn student_dashboard_combines_core_outputs() {
        let arjun = student(1, "Arjun Patel");
        let marks = vec![
            mark(&arjun, "Math", 96.0, 20),
            mark(&arjun, "Physics", 35.0, 18),
            mark(&arjun, "Math", 94.0, 2),
            mark(&arjun, "Physics", 45.0, 1),
        ];
        let attendance = vec![
            present(&arjun, "Math", AttendanceStatus::Present, 1),
            present(&arjun, "Math", AttendanceStatus::Present, 2),
            present(&arjun, "Physics", AttendanceStatus::Absent, 1),
            present(&arjun, "Physics", AttendanceStatus::Present, 2),
        ];

        let view = student_dashboard(&marks, &attendance, Vec::new());
        assert_eq!(view.overall_avg, 67.5);
        assert_eq!(view.att_pct, 75.0);
        assert_eq!(view.total_att, 4);
        assert_eq!(view.present_att, 3);
        assert_eq!(
            view.subject_chart,
            vec![
                SubjectAverage { subject: "Math".into(), avg: 95.0 },
                SubjectAverage { subject: "Physics".into(), avg: 40.0 },
            ]
        );
        assert_eq!(view.att_by_subject[1].pct, 50.0);
        assert_eq!(view.trend_data[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(view.recent_marks.len(), 4);

        let titles: Vec<&str> = view.suggestions.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Improve Attendance", "Excellent in Math", "Focus on Physics"]
        );
    }

    #[test]
    fn empty_student_dashboard_uses_zero_policy() {
        let view = student_dashboard(&[], &[], Vec::new());
        assert_eq!(view.overall_avg, 0.0);
        assert_eq!(view.att_pct, 0.0);
        assert!(view.subject_chart.is_empty());
        assert!(view.trend_data.is_empty());
        // Zero attendance reads as critical.
        assert_eq!(view.suggestions.len(), 1);
        assert_eq!(view.suggestions[0].severity, Severity::Danger);
    }

    #[test]
    fn admin_dashboard_ranks_and_omits_empty_subjects() {
        let a = student(1, "Arjun Patel");
        let b = student(2, "Ananya Singh");
        let c = student(3, "Vikram Nair");
        let marks = vec![
            mark(&a, "Math", 91.0, 3),
            mark(&b, "Math", 72.0, 3),
            mark(&c, "Physics", 38.0, 2),
            mark(&a, "Physics", 85.0, 1),
        ];
        let subjects = vec![subject("Math"), subject("Physics"), subject("English")];
        let attendance = vec![
            AttendanceRecord {
                subject_name: "Math".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                status: AttendanceStatus::Present,
            },
            AttendanceRecord {
                subject_name: "Math".into(),
                date: NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
                status: AttendanceStatus::Late,
            },
        ];

        let view = admin_dashboard(SchoolCounts::default(), &subjects, &marks, &attendance);
        assert_eq!(
            view.subject_avgs,
            vec![
                NamedAverage { name: "Math".into(), avg: 81.5 },
                NamedAverage { name: "Physics".into(), avg: 61.5 },
            ]
        );
        assert_eq!(view.att_rate, 50.0);
        assert_eq!(view.top_students[0].name, "Arjun Patel");
        assert_eq!(view.top_students[0].avg, 88.0);
        assert_eq!(view.top_students.last().unwrap().name, "Vikram Nair");
        assert_eq!(view.grade_dist.count(Grade::APlus), 1);
        assert_eq!(view.grade_dist.count(Grade::F), 1);
        assert_eq!(view.grade_dist.total(), 4);
    }

    #[test]
    fn class_performance_skips_students_without_marks() {
        let a = student(1, "Arjun Patel");
        let b = student(2, "Ananya Singh");
        let marks = vec![mark(&b, "Math", 66.66, 1), mark(&b, "Math", 70.0, 2)];
        let rows = class_performance(&[a, b], &marks);
        assert_eq!(
            rows,
            vec![NamedAverage { name: "Ananya Singh".into(), avg: 68.3 }]
        );
        assert!(class_performance(&[], &[]).is_empty());
    }

    #[test]
    fn subject_loads_count_distinct_students() {
        let a = student(1, "Arjun Patel");
        let b = student(2, "Ananya Singh");
        let subjects = vec![subject("Math"), subject("English")];
        let marks = vec![
            mark(&a, "Math", 80.0, 1),
            mark(&a, "Math", 70.0, 2),
            mark(&b, "Math", 60.0, 2),
        ];
        let loads = subject_loads(&subjects, &marks);
        assert_eq!(
            loads,
            vec![
                SubjectLoad { name: "Math".into(), avg: 70.0, students: 2 },
                SubjectLoad { name: "English".into(), avg: 0.0, students: 0 },
            ]
        );
    }

    #[test]
    fn student_detail_reports_latest_grade_and_attendance() {
        let a = student(1, "Arjun Patel");
        let marks = vec![mark(&a, "Math", 58.0, 9), mark(&a, "Math", 92.0, 1)];
        let attendance = vec![
            present(&a, "Math", AttendanceStatus::Present, 9),
            present(&a, "Math", AttendanceStatus::Excused, 8),
        ];
        let detail = student_detail(a, &marks, &attendance, Vec::new());
        let math = detail.subject_analysis.get("Math").unwrap();
        assert_eq!(math.grade, Grade::C);
        assert_eq!(math.max, 92.0);
        assert_eq!(detail.att_analysis.get("Math").unwrap().present, 1);
        assert_eq!(detail.att_pct, 50.0);
        assert_eq!(detail.trend_data[0].pct, 92.0);
    }

    #[test]
    fn subject_report_sorts_students_descending() {
        let a = student(1, "Arjun Patel");
        let b = student(2, "Ananya Singh");
        let marks = vec![mark(&a, "Math", 55.0, 2), mark(&b, "Math", 88.0, 1)];
        let report = subject_report(subject("Math"), &marks);
        assert_eq!(report.student_summary[0].name, "Ananya Singh");
        assert_eq!(report.overall_avg, 71.5);
        assert_eq!(report.grade_dist.count(Grade::A), 1);
    }

    #[test]
    fn summaries_cover_students_without_records() {
        let a = student(1, "Arjun Patel");
        let b = student(2, "Ananya Singh");
        let marks = vec![mark(&a, "Math", 75.0, 1)];
        let attendance = vec![present(&a, "Math", AttendanceStatus::Absent, 1)];
        let rows = student_summaries(vec![a, b], &marks, &attendance);
        assert_eq!(rows[0].avg, 75.0);
        assert_eq!(rows[0].att_pct, 0.0);
        assert_eq!(rows[1].avg, 0.0);
    }

    #[test]
    fn dashboard_json_is_tagged_by_role() {
        let view = Dashboard::Student(student_dashboard(&[], &[], Vec::new()));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["role"], "student");
        assert_eq!(json["overall_avg"], 0.0);
    }
}
